pub mod config;
pub mod driver;
pub mod error;
pub mod platforms;
pub mod publish;
pub mod session;

pub use config::{
    load_crosspost_config, AuthSection, BrowserSection, CrosspostConfig, PathsSection,
    PublishSection,
};
pub use driver::{
    url_matches, BrowserHandle, BrowserLauncher, ChromiumLauncher, DriverError, DriverResult,
    LaunchOptions, PageHandle, SessionHandle,
};
pub use error::{ConfigError, Result};
pub use platforms::{adapter_for, Platform};
pub use publish::{
    PlatformAdapter, PollOutcome, PollPolicy, PublishError, PublishPipeline, PublishRequest,
    PublishResult, PublishStage,
};
pub use session::{
    AuthError, AuthManager, AuthResult, AuthStatus, BrowserLease, BrowserPool, CredentialStore,
    SessionBlob, StoreError, StoreResult,
};
