use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AuthSection;
use crate::driver::{url_matches, DriverError, LaunchOptions, SessionHandle};
use crate::publish::PlatformAdapter;

use super::pool::{BrowserLease, BrowserPool};
use super::store::{CredentialStore, SessionBlob, StoreError};

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Derived per-platform authentication snapshot. Never persisted.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AuthStatus {
    pub session_file_exists: bool,
    pub session_valid: bool,
    pub authenticated: bool,
}

/// Decides "is this platform authenticated", invoking the interactive login
/// window only when the caller allows it.
pub struct AuthManager {
    store: Arc<CredentialStore>,
    pool: Arc<BrowserPool>,
    config: AuthSection,
    executable_path: Option<PathBuf>,
}

impl AuthManager {
    pub fn new(
        store: Arc<CredentialStore>,
        pool: Arc<BrowserPool>,
        config: AuthSection,
        executable_path: Option<PathBuf>,
    ) -> Self {
        Self {
            store,
            pool,
            config,
            executable_path,
        }
    }

    pub fn account_file_exists(&self, platform: &str) -> bool {
        self.store.exists(platform)
    }

    /// Loads the stored session into a fresh headless context and checks
    /// whether the platform still accepts it: the session is valid iff none
    /// of the platform's login-required selectors is visible on the
    /// authenticated-only page within the bounded wait.
    pub async fn verify_session(&self, adapter: &dyn PlatformAdapter) -> AuthResult<bool> {
        let platform = adapter.platform_name();
        if !self.store.exists(platform) {
            debug!(platform, "no stored session to verify");
            return Ok(false);
        }
        let blob = self.store.load(platform)?;

        let lease = self
            .pool
            .acquire(&LaunchOptions::headless(self.executable_path.clone()))
            .await?;
        let outcome = self.verify_with_lease(&lease, adapter, &blob).await;
        self.pool.release(lease).await;

        match outcome {
            Ok(valid) => {
                if valid {
                    info!(platform, "stored session accepted");
                } else {
                    warn!(platform, "stored session rejected; login required");
                }
                Ok(valid)
            }
            Err(err) => Err(err),
        }
    }

    async fn verify_with_lease(
        &self,
        lease: &BrowserLease,
        adapter: &dyn PlatformAdapter,
        blob: &SessionBlob,
    ) -> AuthResult<bool> {
        let session = lease.browser().new_session(Some(blob.as_bytes())).await?;
        let outcome = self.probe_login_state(session.as_ref(), adapter).await;
        if let Err(err) = session.close().await {
            debug!(error = %err, "session close after verification failed");
        }
        outcome
    }

    async fn probe_login_state(
        &self,
        session: &dyn SessionHandle,
        adapter: &dyn PlatformAdapter,
    ) -> AuthResult<bool> {
        let page = session.new_page().await?;
        page.navigate(adapter.upload_url()).await?;

        // Give the page a bounded chance to land on the authenticated URL;
        // a redirect elsewhere is itself a signal, so timeout is not fatal.
        let upload_url = adapter.upload_url().to_string();
        let settle = Duration::from_secs(self.config.verify_timeout_seconds);
        if let Err(err) = page
            .wait_for_url(&|url| url_matches(url, &upload_url), settle)
            .await
        {
            match err {
                DriverError::Timeout(_) => {}
                other => return Err(other.into()),
            }
        }

        for selector in adapter.login_required_selectors() {
            match page.is_visible(selector).await {
                Ok(true) => {
                    debug!(selector, "login-required selector visible");
                    return Ok(false);
                }
                Ok(false) => {}
                Err(err) if err.is_transient() => {
                    debug!(selector, error = %err, "selector probe failed; skipping");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(true)
    }

    /// Opens a headed login window and waits for one of: navigation onto the
    /// platform's success URL (persist and succeed), the window being closed
    /// by the operator, or the overall timeout. Nothing is persisted on the
    /// failure paths.
    pub async fn interactive_login(&self, adapter: &dyn PlatformAdapter) -> AuthResult<bool> {
        let platform = adapter.platform_name();
        info!(platform, "starting interactive login");

        let lease = self
            .pool
            .acquire(&LaunchOptions::headed(self.executable_path.clone()))
            .await?;
        let outcome = self.login_with_lease(&lease, adapter).await;
        self.pool.release(lease).await;
        outcome
    }

    async fn login_with_lease(
        &self,
        lease: &BrowserLease,
        adapter: &dyn PlatformAdapter,
    ) -> AuthResult<bool> {
        let platform = adapter.platform_name();
        let session = lease.browser().new_session(None).await?;
        let outcome = self.drive_login(session.as_ref(), adapter).await;
        if let Err(err) = session.close().await {
            debug!(error = %err, "session close after login failed");
        }

        if matches!(outcome, Ok(true)) {
            info!(platform, "interactive login succeeded; session persisted");
        }
        outcome
    }

    async fn drive_login(
        &self,
        session: &dyn SessionHandle,
        adapter: &dyn PlatformAdapter,
    ) -> AuthResult<bool> {
        let platform = adapter.platform_name();
        let page = session.new_page().await?;
        page.navigate(adapter.login_url()).await?;
        info!(platform, "login page open; waiting for the operator to finish");

        let pattern = adapter.success_url_pattern().to_string();
        let timeout = Duration::from_secs(self.config.login_timeout_seconds);
        match page
            .wait_for_url(&|url| url_matches(url, &pattern), timeout)
            .await
        {
            Ok(url) => {
                debug!(platform, url, "login navigation observed");
                let state = session.export_state().await?;
                self.store.save(platform, &SessionBlob::new(state))?;
                Ok(true)
            }
            Err(DriverError::Timeout(_)) => {
                warn!(platform, "login window timed out before completing");
                Ok(false)
            }
            Err(DriverError::TargetClosed) => {
                warn!(platform, "login window closed before completing");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// The composed state machine: missing session and `auto_login` off is a
    /// terminal no; otherwise verify, and fall back to interactive login
    /// when allowed.
    pub async fn ensure_authenticated(
        &self,
        adapter: &dyn PlatformAdapter,
        auto_login: bool,
    ) -> AuthResult<bool> {
        let platform = adapter.platform_name();

        if !self.store.exists(platform) {
            if auto_login {
                info!(platform, "no stored session; opening login window");
                return self.interactive_login(adapter).await;
            }
            warn!(platform, "no stored session and auto-login disabled");
            return Ok(false);
        }

        if self.verify_session(adapter).await? {
            return Ok(true);
        }

        if auto_login {
            info!(platform, "stored session invalid; opening login window");
            return self.interactive_login(adapter).await;
        }
        warn!(platform, "stored session invalid and auto-login disabled");
        Ok(false)
    }

    pub async fn status(&self, adapter: &dyn PlatformAdapter) -> AuthResult<AuthStatus> {
        let session_file_exists = self.store.exists(adapter.platform_name());
        let session_valid = if session_file_exists {
            self.verify_session(adapter).await?
        } else {
            false
        };
        Ok(AuthStatus {
            session_file_exists,
            session_valid,
            authenticated: session_file_exists && session_valid,
        })
    }
}
