use thiserror::Error;

/// Failures of the write workflows (loans, reader sign-up, adding books).
///
/// Client-fault variants carry a short message that is safe to return to the caller.
/// `StoreUnavailable` keeps the underlying store error for logging only.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("InvalidInput: {0}")]
    InvalidInput(String),
    #[error("ReferenceNotFound: {0}")]
    ReferenceNotFound(String),
    #[error("StoreUnavailable")]
    StoreUnavailable(#[source] libsql::Error),
    #[error("ConflictDetected: {0}")]
    ConflictDetected(String),
}

impl LibraryError {
    /// Classifies a store error by the constraint SQLite reports.
    pub fn from_store(err: libsql::Error) -> Self {
        let msg = err.to_string();
        if msg.contains("FOREIGN KEY constraint failed") {
            LibraryError::ReferenceNotFound("referenced record does not exist".to_owned())
        } else if msg.contains("UNIQUE constraint failed") {
            LibraryError::ConflictDetected("record already exists".to_owned())
        } else {
            LibraryError::StoreUnavailable(err)
        }
    }

    pub fn is_client_fault(&self) -> bool {
        !matches!(self, LibraryError::StoreUnavailable(_))
    }
}

impl From<libsql::Error> for LibraryError {
    fn from(err: libsql::Error) -> Self {
        LibraryError::from_store(err)
    }
}
