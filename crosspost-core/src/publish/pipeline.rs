use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::config::PublishSection;
use crate::driver::{url_matches, LaunchOptions, SessionHandle};
use crate::session::{AuthManager, BrowserPool, CredentialStore, SessionBlob};

use super::adapter::PlatformAdapter;
use super::error::PublishError;
use super::poll::{poll_until, PollOutcome, PollPolicy};
use super::request::{PublishRequest, PublishResult, PublishStage};

/// Template method over a `PlatformAdapter`: authentication, upload-page
/// navigation, media submission with an await-processing loop, metadata,
/// optional cover and schedule, publish click with an await-confirmation
/// loop, and session refresh. Resource cleanup runs on every exit path —
/// the pool is shared across runs, so a leaked lease here starves everyone.
pub struct PublishPipeline {
    store: Arc<CredentialStore>,
    pool: Arc<BrowserPool>,
    auth: AuthManager,
    config: PublishSection,
    launch: LaunchOptions,
}

impl PublishPipeline {
    pub fn new(
        store: Arc<CredentialStore>,
        pool: Arc<BrowserPool>,
        auth: AuthManager,
        config: PublishSection,
        launch: LaunchOptions,
    ) -> Self {
        Self {
            store,
            pool,
            auth,
            config,
            launch,
        }
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    fn poll_policy(&self, max_attempts: usize) -> PollPolicy {
        PollPolicy::new(max_attempts, Duration::from_millis(self.config.poll_interval_ms))
            .with_jitter(Duration::from_millis(self.config.poll_jitter_ms))
    }

    fn confirm_attempts(&self) -> usize {
        let interval = self.config.poll_interval_ms.max(1);
        ((self.config.confirm_timeout_seconds * 1000) / interval).max(1) as usize
    }

    /// Runs one publish attempt end to end. Never panics and never leaks the
    /// lease: every failure is folded into the returned `PublishResult`.
    pub async fn run(
        &self,
        adapter: &dyn PlatformAdapter,
        request: &PublishRequest,
        auto_login: bool,
    ) -> PublishResult {
        let platform = adapter.platform_name();
        let mut result = PublishResult::begin(platform);
        info!(platform, run_id = %result.run_id, title = %request.title, "publish run starting");

        if let Err(err) = request.validate(Local::now()) {
            warn!(platform, error = %err, "publish request rejected");
            result.finish_failure(err);
            return result;
        }

        // Step 1: authentication is terminal for the run on failure. Login
        // problems are reported, not retried, so an unattended run can never
        // block waiting on a human.
        match self.auth.ensure_authenticated(adapter, auto_login).await {
            Ok(true) => {}
            Ok(false) => {
                result.finish_failure(PublishError::Authentication(platform.to_string()));
                return result;
            }
            Err(err) => {
                result.finish_failure(err);
                return result;
            }
        }

        let blob = match self.store.load(platform) {
            Ok(blob) => blob,
            Err(err) => {
                result.finish_failure(PublishError::from(err));
                return result;
            }
        };

        // Step 2: one lease and one session for the whole attempt.
        let lease = match self.pool.acquire(&self.launch).await {
            Ok(lease) => lease,
            Err(err) => {
                result.finish_failure(PublishError::from(err));
                return result;
            }
        };
        let session = match lease.browser().new_session(Some(blob.as_bytes())).await {
            Ok(session) => session,
            Err(err) => {
                self.pool.release(lease).await;
                result.finish_failure(PublishError::from(err));
                return result;
            }
        };

        let outcome = self
            .drive(adapter, session.as_ref(), request, &mut result)
            .await;

        // Step 8: cookies may rotate during a publish; persist the refreshed
        // state while the session is still open. A storage failure here is
        // surfaced, never dropped.
        let outcome = match outcome {
            Ok(()) => self.refresh_session(platform, session.as_ref()).await,
            Err(err) => Err(err),
        };

        if let Err(err) = session.close().await {
            debug!(platform, error = %err, "session close after publish failed");
        }
        self.pool.release(lease).await;

        match outcome {
            Ok(()) => {
                result.finish_success();
                info!(
                    platform,
                    run_id = %result.run_id,
                    stage = %result.stage,
                    warnings = result.warnings.len(),
                    "publish run finished"
                );
            }
            Err(err) => {
                warn!(platform, run_id = %result.run_id, stage = %result.stage, error = %err, "publish run failed");
                result.finish_failure(err);
            }
        }
        result
    }

    async fn refresh_session(
        &self,
        platform: &str,
        session: &dyn SessionHandle,
    ) -> Result<(), PublishError> {
        let state = session.export_state().await?;
        self.store.save(platform, &SessionBlob::new(state))?;
        Ok(())
    }

    async fn drive(
        &self,
        adapter: &dyn PlatformAdapter,
        session: &dyn SessionHandle,
        request: &PublishRequest,
        result: &mut PublishResult,
    ) -> Result<(), PublishError> {
        let platform = adapter.platform_name();
        let page = session.new_page().await?;
        let page = page.as_ref();

        page.navigate(adapter.upload_url()).await?;
        if let Ok(url) = page.current_url().await {
            result.last_url = Some(url);
        }

        // Step 3: submit the file, then poll for the processing signal.
        adapter.submit_media(page, &request.media_path).await?;
        result.advance(PublishStage::MediaSubmitted);
        info!(platform, media = %request.media_path.display(), "media submitted");

        let processing = self.poll_policy(self.config.processing_max_attempts);
        match poll_until(&processing, |attempt| async move {
            if attempt > 0 && attempt % 10 == 0 {
                debug!(platform, attempt, "still waiting for media processing");
            }
            Ok(adapter.media_processed(page).await?.then_some(()))
        })
        .await
        {
            PollOutcome::Completed(()) => {
                result.advance(PublishStage::MediaProcessed);
                info!(platform, "media processing signal observed");
            }
            PollOutcome::Exhausted { attempts } => {
                // Completion detection false-negatives constantly across
                // third-party UIs; blocking forever is worse than moving on.
                warn!(platform, attempts, "media processing not confirmed; continuing");
                result.warn(format!(
                    "media processing not confirmed after {attempts} checks; continued anyway"
                ));
                result.advance(PublishStage::MediaProcessed);
            }
            PollOutcome::Fatal(err) => return Err(err.into()),
        }

        // Step 4: title is truncated, never rejected; tags go in insertion
        // order and a single bad tag degrades instead of aborting.
        let title = truncate_chars(&request.title, adapter.title_limit());
        if title.chars().count() < request.title.chars().count() {
            debug!(platform, limit = adapter.title_limit(), "title truncated to platform limit");
        }
        adapter.fill_title(page, &title).await?;
        adapter.fill_description(page, &request.description).await?;
        for tag in &request.tags {
            match adapter.append_tag(page, tag).await {
                Ok(()) => {}
                Err(err) if err.is_transient() => {
                    warn!(platform, tag, error = %err, "tag not applied; continuing");
                    result.warn(format!("tag '{tag}' not applied"));
                }
                Err(err) => return Err(err.into()),
            }
        }
        result.advance(PublishStage::MetadataApplied);
        info!(platform, tags = request.tags.len(), "metadata applied");

        // Step 5: cover is best-effort all the way through.
        match &request.cover_path {
            None => debug!(platform, "no cover supplied; skipping"),
            Some(path) if !path.exists() => {
                info!(platform, cover = %path.display(), "cover file missing; skipping");
            }
            Some(path) => match adapter.apply_cover(page, path).await {
                Ok(()) => {
                    result.advance(PublishStage::CoverApplied);
                    info!(platform, "cover applied");
                }
                Err(err) => {
                    warn!(platform, error = %err, "cover not applied; continuing");
                    result.warn("cover image not applied".to_string());
                }
            },
        }

        // Step 6: re-check the clock — validation passed earlier, but a long
        // processing wait can push the timestamp into the past.
        if let Some(at) = request.scheduled_at {
            if at > Local::now() {
                adapter.apply_schedule(page, at).await?;
                result.advance(PublishStage::ScheduleApplied);
                info!(platform, scheduled_at = %at, "schedule applied");
            } else {
                warn!(platform, scheduled_at = %at, "scheduled time no longer in the future; publishing immediately");
                result.warn("scheduled time already passed; published immediately".to_string());
            }
        }

        if !request.extra.is_empty() {
            if let Err(err) = adapter.apply_extras(page, &request.extra).await {
                warn!(platform, error = %err, "platform extras not applied; continuing");
                result.warn("platform-specific extras not applied".to_string());
            }
        }

        // Step 7: click, then watch for either a success-URL navigation or a
        // confirmation dialog that needs acknowledging.
        adapter.click_publish(page).await?;
        result.advance(PublishStage::Submitted);
        info!(platform, "publish clicked; awaiting confirmation");

        let pattern = adapter.success_url_pattern().to_string();
        let confirm = self.poll_policy(self.confirm_attempts());
        let confirmation = poll_until(&confirm, |_| {
            let pattern = pattern.clone();
            async move {
                if adapter.acknowledge_confirmation(page).await? {
                    debug!(platform, "confirmation dialog acknowledged");
                }
                let url = page.current_url().await?;
                Ok(url_matches(&url, &pattern).then_some(url))
            }
        })
        .await;

        match confirmation {
            PollOutcome::Completed(url) => {
                result.last_url = Some(url);
                result.advance(PublishStage::Confirmed);
                info!(platform, "publish confirmed by navigation");
            }
            PollOutcome::Exhausted { .. } => {
                // The click went through; most of the flakiness lives in
                // *detecting* success. Optimistic by policy — the warning and
                // last-known URL keep the window auditable.
                if let Ok(url) = page.current_url().await {
                    result.last_url = Some(url);
                }
                warn!(platform, last_url = ?result.last_url, "no publish confirmation observed; assuming success");
                result.warn("publish confirmation not observed; assumed success".to_string());
            }
            PollOutcome::Fatal(err) => return Err(err.into()),
        }

        Ok(())
    }
}

/// Character-based truncation: platform limits count characters, and byte
/// slicing would split CJK text.
fn truncate_chars(value: &str, limit: usize) -> String {
    value.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("完整的中文标题超出限制", 5), "完整的中文");
        assert_eq!(truncate_chars("short", 30), "short");
        assert_eq!(truncate_chars("", 10), "");
    }
}
