use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::driver::{BrowserHandle, BrowserLauncher, DriverResult, LaunchOptions};

/// Reference-counted pool around the single browser process. The process is
/// launched on first acquire, shared by every concurrent lease, and torn
/// down (with a bounded grace period) when the last lease is released.
///
/// An explicit owned object rather than a process-wide global so tests can
/// construct isolated pools; the mutex below is the only shared mutable
/// state in the core.
pub struct BrowserPool {
    launcher: Box<dyn BrowserLauncher>,
    close_grace: Duration,
    state: AsyncMutex<PoolState>,
}

#[derive(Default)]
struct PoolState {
    browser: Option<Arc<dyn BrowserHandle>>,
    ref_count: usize,
    options: Option<LaunchOptions>,
}

/// A caller's claim on the pooled process. Must be handed back through
/// `BrowserPool::release`; dropping an unreleased lease leaks a reference
/// and is logged loudly.
pub struct BrowserLease {
    browser: Arc<dyn BrowserHandle>,
    released: bool,
}

impl BrowserLease {
    pub fn browser(&self) -> &dyn BrowserHandle {
        self.browser.as_ref()
    }
}

impl Drop for BrowserLease {
    fn drop(&mut self) {
        if !self.released {
            warn!("browser lease dropped without release; pool reference leaked");
        }
    }
}

impl BrowserPool {
    pub fn new(launcher: Box<dyn BrowserLauncher>, close_grace: Duration) -> Self {
        Self {
            launcher,
            close_grace,
            state: AsyncMutex::new(PoolState::default()),
        }
    }

    /// Launch-on-demand acquire. While a process is alive its configuration
    /// wins: a differently-configured acquire reuses it and logs the drift
    /// instead of relaunching under concurrent leaseholders. Once the
    /// process is gone, the next acquire launches with its own options.
    pub async fn acquire(&self, options: &LaunchOptions) -> DriverResult<BrowserLease> {
        let mut state = self.state.lock().await;

        if let Some(browser) = state.browser.as_ref().filter(|b| b.is_alive()) {
            if state.options.as_ref() != Some(options) {
                warn!(
                    requested = ?options,
                    active = ?state.options,
                    "pool reusing live browser with different configuration"
                );
            }
            let browser = Arc::clone(browser);
            state.ref_count += 1;
            debug!(ref_count = state.ref_count, "browser lease acquired (reused)");
            return Ok(BrowserLease {
                browser,
                released: false,
            });
        }

        // A failed launch must leave the count untouched, so the count is
        // only bumped after the launcher comes back successfully.
        let browser: Arc<dyn BrowserHandle> = Arc::from(self.launcher.launch(options).await?);
        state.browser = Some(Arc::clone(&browser));
        state.options = Some(options.clone());
        state.ref_count += 1;
        debug!(ref_count = state.ref_count, "browser lease acquired (launched)");
        Ok(BrowserLease {
            browser,
            released: false,
        })
    }

    /// Hands a lease back. When the count reaches zero the process is closed
    /// with a bounded wait; a close that hangs past the grace period is
    /// abandoned rather than blocking the caller.
    pub async fn release(&self, mut lease: BrowserLease) {
        lease.released = true;
        let to_close = {
            let mut state = self.state.lock().await;
            state.ref_count = state.ref_count.saturating_sub(1);
            debug!(ref_count = state.ref_count, "browser lease released");
            if state.ref_count == 0 {
                state.options = None;
                state.browser.take()
            } else {
                None
            }
        };
        drop(lease);

        if let Some(browser) = to_close {
            info!("last lease released; closing browser process");
            match tokio::time::timeout(self.close_grace, browser.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "browser close reported error"),
                Err(_) => warn!(
                    grace_seconds = self.close_grace.as_secs_f64(),
                    "browser close exceeded grace period; abandoning wait"
                ),
            }
        }
    }

    pub async fn ref_count(&self) -> usize {
        self.state.lock().await.ref_count
    }

    pub async fn has_live_browser(&self) -> bool {
        self.state
            .lock()
            .await
            .browser
            .as_ref()
            .is_some_and(|browser| browser.is_alive())
    }
}
