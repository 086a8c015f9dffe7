use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum SchemaError {
    #[error("Invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Relational field '{model}.{field}' targets unknown model '{comodel}'")]
    UnknownComodel {
        model: String,
        field: String,
        comodel: String,
    },

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}
