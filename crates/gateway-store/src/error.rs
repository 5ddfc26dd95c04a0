use thiserror::Error;

/// Errors surfaced by the registry store.
///
/// Variants are deliberately semantic (`NotFound`, `Conflict`) rather than
/// mirroring SQLite's own vocabulary, so the one `From<StoreError>` impl in
/// `gateway-core` can map them onto the gateway's error kinds without
/// inspecting driver-specific detail.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Maps a raw `sqlx::Error` to `Conflict` when it's a unique-constraint
/// violation, `Database` otherwise. SQLite reports both `UNIQUE constraint
/// failed` and `PRIMARY KEY` violations through the same code path.
pub(crate) fn map_write_error(name: &str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(name.to_string());
        }
    }
    StoreError::Database(err)
}
