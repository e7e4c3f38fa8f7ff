use thiserror::Error;

/// Error taxonomy for the whole crate (spec §7).
///
/// `Config`/`Socket` failures are fatal at startup; `Parse`/`Store` failures are caught per
/// request and turned into a result string on the session; `Framing` never leaves the
/// session handler.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("socket error: {0}")]
    Socket(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("framing error: {0}")]
    Framing(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Config(e.to_string())
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::Store(e.to_string())
    }
}
