//! Mapping of Postgres constraint errors onto store outcomes.

use sqlx::error::ErrorKind;
use sqlx::postgres::PgQueryResult;

use zapper_core::{Error, Result, StoreOutcome};

/// Turn the result of a single-row DELETE into a [`StoreOutcome`].
///
/// Zero affected rows is `NotFound`; a foreign key violation (`23503`) is
/// `ConstraintViolation`; anything else stays an error.
pub(crate) fn delete_outcome(result: sqlx::Result<PgQueryResult>) -> Result<StoreOutcome> {
    match result {
        Ok(done) if done.rows_affected() == 0 => Ok(StoreOutcome::NotFound),
        Ok(_) => Ok(StoreOutcome::Done),
        Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
            Ok(StoreOutcome::ConstraintViolation(
                db_err
                    .constraint()
                    .map(str::to_string)
                    .unwrap_or_else(|| db_err.message().to_string()),
            ))
        }
        Err(e) => Err(Error::Database(e)),
    }
}

/// Map row-rejecting constraint errors on writes to `Error::Validation`.
pub(crate) fn write_error(err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.kind() {
            ErrorKind::CheckViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::ForeignKeyViolation
            | ErrorKind::UniqueViolation => {
                return Error::Validation(db_err.message().to_string());
            }
            _ => {}
        }
    }
    Error::Database(err)
}
