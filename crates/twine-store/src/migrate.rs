use sqlx::PgPool;

use twine_core::error::{Result, TwineError};

/// Identifier used to key this schema's migration bookkeeping.
/// `sqlx::migrate!` tracks applied versions itself in
/// `_sqlx_migrations`; this is recorded only as a comment on the
/// `subject_objects` table so operators inspecting the database have
/// something human-readable to search for.
pub const SCHEMA_IDENTIFIER: &str = "com.github.bbcarchdev.twine";

/// Run pending schema migrations (creating `subject_objects` and
/// `target_media` on a fresh database, or applying whatever has
/// changed since).
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| TwineError::BadConfig(format!("schema migration failed: {e}")))?;
    sqlx::query(&format!("COMMENT ON TABLE subject_objects IS '{SCHEMA_IDENTIFIER}'"))
        .execute(pool)
        .await
        .map_err(|e| TwineError::BadConfig(format!("schema comment failed: {e}")))?;
    Ok(())
}
