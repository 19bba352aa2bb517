use thiserror::Error;

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("page evaluation failed: {0}")]
    Evaluation(String),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("page or browser target closed")]
    TargetClosed,
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("session state error: {0}")]
    SessionState(String),
}

impl DriverError {
    /// Whether a poll loop should keep going after seeing this error.
    /// Rendered pages misreport state all the time; only conditions that
    /// doom the rest of the operation abort the loop.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DriverError::Evaluation(_) | DriverError::Timeout(_) | DriverError::Cdp(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_splits_poll_survivable_from_fatal() {
        assert!(DriverError::Evaluation("stale node".into()).is_transient());
        assert!(DriverError::Timeout("selector".into()).is_transient());
        assert!(!DriverError::TargetClosed.is_transient());
        assert!(!DriverError::Launch("no binary".into()).is_transient());
        assert!(!DriverError::SessionState("bad blob".into()).is_transient());
    }
}
