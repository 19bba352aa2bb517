mod chromium;
mod error;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

pub use chromium::ChromiumLauncher;
pub use error::{DriverError, DriverResult};

/// Launch configuration for the shared browser process. Fixed while the
/// process is alive; see `session::BrowserPool` for the drift policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    pub headless: bool,
    pub executable_path: Option<PathBuf>,
}

impl LaunchOptions {
    pub fn headless(executable_path: Option<PathBuf>) -> Self {
        Self {
            headless: true,
            executable_path,
        }
    }

    pub fn headed(executable_path: Option<PathBuf>) -> Self {
        Self {
            headless: false,
            executable_path,
        }
    }
}

/// One page inside a session. Selectors are CSS; the `text=` prefix asks the
/// driver to match by visible element text instead (platform UIs are often
/// only addressable that way).
#[async_trait(?Send)]
pub trait PageHandle {
    async fn navigate(&self, url: &str) -> DriverResult<()>;
    async fn current_url(&self) -> DriverResult<String>;
    async fn element_count(&self, selector: &str) -> DriverResult<usize>;
    async fn is_visible(&self, selector: &str) -> DriverResult<bool>;
    async fn click(&self, selector: &str) -> DriverResult<()>;
    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()>;
    async fn type_text(&self, selector: &str, value: &str) -> DriverResult<()>;
    async fn press_key(&self, selector: &str, key: &str) -> DriverResult<()>;
    async fn set_input_files(&self, selector: &str, path: &Path) -> DriverResult<()>;
    async fn evaluate(&self, script: &str) -> DriverResult<String>;
    /// Polls the page URL until the predicate accepts it. Returns the matched
    /// URL, `DriverError::Timeout` on expiry, or `DriverError::TargetClosed`
    /// once the page is gone (e.g. closed by a human mid-login).
    async fn wait_for_url(
        &self,
        predicate: &dyn for<'a> Fn(&'a str) -> bool,
        timeout: Duration,
    ) -> DriverResult<String>;
}

/// One isolated cookie/storage jar plus its pages. Bound 1:1 to a publish or
/// verification attempt and destroyed at the end of it, never cached.
#[async_trait(?Send)]
pub trait SessionHandle {
    async fn new_page(&self) -> DriverResult<Box<dyn PageHandle>>;
    /// Serializes the session's login state into an opaque blob. Consumers
    /// must treat the bytes as opaque; only the driver that wrote a blob can
    /// interpret it.
    async fn export_state(&self) -> DriverResult<Vec<u8>>;
    async fn close(&self) -> DriverResult<()>;
}

/// The single OS-level browser process.
#[async_trait(?Send)]
pub trait BrowserHandle {
    async fn new_session(&self, state: Option<&[u8]>) -> DriverResult<Box<dyn SessionHandle>>;
    async fn close(&self) -> DriverResult<()>;
    fn is_alive(&self) -> bool;
}

/// Seam between the resource pool and the rendering engine.
#[async_trait(?Send)]
pub trait BrowserLauncher {
    async fn launch(&self, options: &LaunchOptions) -> DriverResult<Box<dyn BrowserHandle>>;
}

/// URL match policy shared by the login flow and the publish confirmation
/// loop. A current URL matches a target pattern iff it starts with the
/// pattern, OR equals it once query/fragment are stripped from both, OR
/// contains the pattern as a substring. Deliberately permissive: platforms
/// append tracking parameters and redirect through intermediate paths.
pub fn url_matches(current: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    if current.starts_with(pattern) {
        return true;
    }
    if strip_query(current) == strip_query(pattern) {
        return true;
    }
    current.contains(pattern)
}

fn strip_query(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or(raw)
            .to_string(),
    }
}
