//! Classification of driver errors.

use mongodb::error::{Error, ErrorKind, WriteFailure};
use tracing::trace;

use docrepo_core::error::DocumentStoreError;

/// Maps a driver error onto the store taxonomy.
///
/// Errors carrying a server code become [`DocumentStoreError::Write`]; the repository
/// decides which codes mean a duplicate key.
pub(crate) fn map_error(error: Error) -> DocumentStoreError {
    let mapped = match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) => DocumentStoreError::Write {
            code: write.code,
            message: write.message.clone(),
        },
        ErrorKind::InsertMany(insert) => match insert.write_errors.as_ref().and_then(|errors| errors.first()) {
            Some(write) => DocumentStoreError::Write {
                code: write.code,
                message: write.message.clone(),
            },
            None => DocumentStoreError::Backend(error.to_string()),
        },
        ErrorKind::Command(command) => DocumentStoreError::Write {
            code: command.code,
            message: command.message.clone(),
        },
        _ => DocumentStoreError::Backend(error.to_string()),
    };

    trace!(%error, ?mapped, "classified driver error");
    mapped
}
