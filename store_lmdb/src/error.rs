use thiserror::Error;

#[derive(Debug, Error)]
pub enum LmdbError {
    #[error("LMDB error: {0}")]
    Heed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("environment is closed")]
    Closed,
}

impl From<heed::Error> for LmdbError {
    fn from(e: heed::Error) -> Self {
        LmdbError::Heed(e.to_string())
    }
}

impl From<LmdbError> for meridian_store::StoreError {
    fn from(e: LmdbError) -> Self {
        match e {
            LmdbError::Closed => meridian_store::StoreError::Closed,
            other => meridian_store::StoreError::Backend(other.to_string()),
        }
    }
}
