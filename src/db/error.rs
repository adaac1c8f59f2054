use super::record::Table;

// ============================================================================
// Store Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("record not found in {table}: {key}")]
    RecordNotFound { table: Table, key: String },

    #[error("update on {0} requires a condition")]
    MissingCondition(Table),

    #[error("unknown column {column} on {table}")]
    UnknownColumn { table: Table, column: String },

    #[error("type mismatch on column {column}")]
    TypeMismatch { column: String },

    #[error("value out of range: {0}")]
    OutOfRange(String),
}

/// SQLSTATE `numeric_value_out_of_range`
const NUMERIC_OUT_OF_RANGE: &str = "22003";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE) {
                return StoreError::OutOfRange(db_err.message().to_string());
            }

            let detail = db_err
                .constraint()
                .map(str::to_string)
                .unwrap_or_else(|| db_err.message().to_string());

            match db_err.kind() {
                sqlx::error::ErrorKind::CheckViolation
                | sqlx::error::ErrorKind::ForeignKeyViolation
                | sqlx::error::ErrorKind::NotNullViolation => {
                    return StoreError::ConstraintViolation(detail)
                }
                sqlx::error::ErrorKind::UniqueViolation => return StoreError::DuplicateKey(detail),
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}
