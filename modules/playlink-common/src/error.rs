use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaylinkError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown item: {0}")]
    ItemNotFound(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
