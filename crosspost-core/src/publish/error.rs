use thiserror::Error;

use crate::driver::DriverError;
use crate::session::{AuthError, StoreError};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid publish request: {0}")]
    InvalidRequest(String),
    #[error("authentication failed for {0}")]
    Authentication(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("platform interaction failed: {0}")]
    Interaction(#[from] DriverError),
}
