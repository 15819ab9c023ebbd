use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("IO/Terminal error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Record store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Render error: {0}")]
    RenderError(String),
}
