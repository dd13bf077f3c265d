use std::sync::Arc;

use base64::Engine;
use md5::Digest;

use twine_core::error::{Result, TwineError};
use twine_core::traits::ObjectStore as ObjectStoreTrait;

use crate::s3_sign::{rfc1123_now, sign, SignInputs};

/// Percent-encode everything outside the RFC 3986 unreserved set
/// (`A-Za-z0-9-._~`).
pub fn urlencode(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    for b in src.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Configuration for one S3-compatible bucket endpoint.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

/// S3-compatible object store backed by a blocking HTTP client, signing
/// every request with AWS v2 (`s3_sign`).
pub struct S3Store {
    http: reqwest::blocking::Client,
    config: S3Config,
}

impl S3Store {
    pub fn new(config: S3Config) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            config,
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}/{}", self.config.endpoint.trim_end_matches('/'), self.config.bucket, key)
    }

    /// The `CanonicalizedResource` signed into the `Authorization` header
    /// must be textually identical to the path actually placed on the
    /// wire: the key goes in raw, not percent-encoded (the original's
    /// `s3_sign` signs whatever resource string the caller built the URL
    /// from; see `libs3client/request.c`/`sign.c`). `urlencode` is used
    /// by the SPARQL graph-store client's `?graph=` query parameter, not
    /// here.
    fn resource_for(&self, key: &str) -> String {
        format!("/{}/{}", self.config.bucket, key)
    }
}

impl ObjectStoreTrait for S3Store {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let date = rfc1123_now();
        let resource = self.resource_for(key);
        let (auth, _) = sign(
            &self.config.access_key,
            &self.config.secret_key,
            &date,
            &SignInputs {
                method: "GET",
                resource: &resource,
                content_type: "",
                content_md5: "",
                amz_headers: &[],
            },
        );
        let response = self
            .http
            .get(self.url_for(key))
            .header("Date", &date)
            .header("Authorization", &auth)
            .send()
            .map_err(|e| TwineError::Transient(format!("S3 GET {key}: {e}")))?;

        // A missing object is reported by S3-compatible services as
        // either 404 (not found) or, with a restrictive bucket policy,
        // 403 (forbidden) — both are treated as "no such object" rather
        // than an error.
        match response.status().as_u16() {
            200..=299 => {
                let body = response
                    .bytes()
                    .map_err(|e| TwineError::Transient(format!("S3 GET {key} body: {e}")))?;
                Ok(Some(body.to_vec()))
            }
            404 | 403 => Ok(None),
            other => Err(TwineError::UpstreamFailure(format!("S3 GET {key} returned status {other}"))),
        }
    }

    fn put(&self, key: &str, content_type: &str, body: &[u8]) -> Result<()> {
        let date = rfc1123_now();
        let resource = self.resource_for(key);
        let content_md5 = base64::engine::general_purpose::STANDARD.encode(md5::Md5::digest(body));
        let (auth, _) = sign(
            &self.config.access_key,
            &self.config.secret_key,
            &date,
            &SignInputs {
                method: "PUT",
                resource: &resource,
                content_type,
                content_md5: &content_md5,
                amz_headers: &[("x-amz-acl", "public-read")],
            },
        );
        let response = self
            .http
            .put(self.url_for(key))
            .header("Date", &date)
            .header("Authorization", &auth)
            .header("Content-Type", content_type)
            .header("Content-MD5", &content_md5)
            .header("x-amz-acl", "public-read")
            .body(body.to_vec())
            .send()
            .map_err(|e| TwineError::Transient(format!("S3 PUT {key}: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(TwineError::UpstreamFailure(format!(
                "S3 PUT {key} returned status {}",
                response.status()
            )))
        }
    }
}

/// Wraps an `S3Store` so it can be shared behind `Arc<dyn ObjectStore>`.
pub fn shared(config: S3Config) -> Arc<dyn ObjectStoreTrait> {
    Arc::new(S3Store::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_leaves_unreserved_characters_alone() {
        assert_eq!(urlencode("abc-._~XYZ09"), "abc-._~XYZ09");
    }

    #[test]
    fn urlencode_escapes_everything_else() {
        assert_eq!(urlencode("a b/c"), "a%20b%2Fc");
    }

    #[test]
    fn resource_path_matches_the_literal_url_path() {
        let store = S3Store::new(S3Config {
            endpoint: "https://s3.example.com".into(),
            bucket: "my-bucket".into(),
            access_key: "k".into(),
            secret_key: "s".into(),
        });
        let key = "http://example.org/graph/1";
        // The signed resource must be the exact suffix of the request URL,
        // not a re-encoded version of it.
        assert_eq!(store.resource_for(key), "/my-bucket/http://example.org/graph/1");
        assert!(store.url_for(key).ends_with(&store.resource_for(key)));
    }
}
