use std::path::Path;

use toml::Value;

use crate::error::{Result, TwineError};

/// Section/key configuration, loaded from a TOML file.
///
/// Keys are written `section:name` (e.g. `sparql:query`,
/// `twine:workflow`). A section of `*` means "this application's own
/// section" and is resolved against the `app_name` passed to
/// [`Config::load`] before falling back to a top-level `[twine]`
/// section.
#[derive(Debug, Clone)]
pub struct Config {
    root: Value,
    app_name: String,
}

impl Config {
    /// Load configuration from a TOML file. `app_name` is the section
    /// that `*:key` lookups resolve against.
    pub fn load(path: &Path, app_name: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TwineError::BadConfig(format!("cannot read {}: {e}", path.display())))?;
        Self::from_str(&content, app_name)
    }

    pub fn from_str(content: &str, app_name: &str) -> Result<Self> {
        let root: Value = content
            .parse()
            .map_err(|e| TwineError::BadConfig(format!("invalid config: {e}")))?;
        Ok(Self {
            root,
            app_name: app_name.to_string(),
        })
    }

    pub fn empty(app_name: &str) -> Self {
        Self {
            root: Value::Table(Default::default()),
            app_name: app_name.to_string(),
        }
    }

    fn split(key: &str) -> (&str, &str) {
        key.split_once(':').unwrap_or(("", key))
    }

    fn lookup(&self, section: &str, name: &str) -> Option<&Value> {
        let resolved = if section == "*" {
            self.app_name.as_str()
        } else {
            section
        };
        for candidate in [resolved, "twine"] {
            if let Some(Value::Table(t)) = self.root.get(candidate) {
                if let Some(v) = t.get(name) {
                    return Some(v);
                }
            }
        }
        None
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        let (section, name) = Self::split(key);
        self.lookup(section, name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        let (section, name) = Self::split(key);
        self.lookup(section, name).and_then(Value::as_integer).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        let (section, name) = Self::split(key);
        self.lookup(section, name).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Enumerate every key/value pair in `section`, as strings.
    pub fn enumerate_all(&self, section: &str) -> Vec<(String, String)> {
        let resolved = if section == "*" { self.app_name.as_str() } else { section };
        match self.root.get(resolved) {
            Some(Value::Table(t)) => t
                .iter()
                .map(|(k, v)| (k.clone(), value_to_string(v)))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Apply a `-D section:key=value` / `-D section:key` command-line
    /// override. A bare `section:key` (no `=`) sets the key to the
    /// boolean `true`.
    pub fn apply_override(&mut self, spec: &str) -> Result<()> {
        let (keypart, value) = match spec.split_once('=') {
            Some((k, v)) => (k, Value::String(v.to_string())),
            None => (spec, Value::Boolean(true)),
        };
        let (section, name) = Self::split(keypart);
        if section.is_empty() || name.is_empty() {
            return Err(TwineError::BadConfig(format!("malformed override '{spec}'")));
        }
        let root = self
            .root
            .as_table_mut()
            .ok_or_else(|| TwineError::BadConfig("config root is not a table".into()))?;
        let table = root
            .entry(section.to_string())
            .or_insert_with(|| Value::Table(Default::default()));
        table
            .as_table_mut()
            .ok_or_else(|| TwineError::BadConfig(format!("section '{section}' is not a table")))?
            .insert(name.to_string(), value);
        Ok(())
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_section_resolves_against_app_name() {
        let cfg = Config::from_str("[myapp]\ncluster-name = \"foo\"\n", "myapp").unwrap();
        assert_eq!(cfg.get_string("*:cluster-name", "default"), "foo");
    }

    #[test]
    fn missing_key_returns_default() {
        let cfg = Config::empty("myapp");
        assert_eq!(cfg.get_string("sparql:query", "http://localhost/sparql"), "http://localhost/sparql");
        assert_eq!(cfg.get_int("twine:worker-count", 1), 1);
        assert!(!cfg.get_bool("*:cluster-verbose", false));
    }

    #[test]
    fn override_sets_value() {
        let mut cfg = Config::empty("myapp");
        cfg.apply_override("sparql:query=http://example/sparql").unwrap();
        assert_eq!(cfg.get_string("sparql:query", ""), "http://example/sparql");
    }

    #[test]
    fn enumerate_lists_section_keys() {
        let cfg = Config::from_str("[s3]\nendpoint = \"http://x\"\naccess = \"k\"\n", "app").unwrap();
        let mut kv = cfg.enumerate_all("s3");
        kv.sort();
        assert_eq!(kv, vec![("access".to_string(), "k".to_string()), ("endpoint".to_string(), "http://x".to_string())]);
    }
}
