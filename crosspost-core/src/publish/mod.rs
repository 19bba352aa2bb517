mod adapter;
mod error;
mod pipeline;
mod poll;
mod request;

pub use adapter::PlatformAdapter;
pub use error::PublishError;
pub use pipeline::PublishPipeline;
pub use poll::{poll_until, PollOutcome, PollPolicy};
pub use request::{PublishRequest, PublishResult, PublishStage};
