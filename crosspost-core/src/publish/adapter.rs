use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Local};

use crate::driver::{DriverResult, PageHandle};

/// The platform-specific half of the publish pipeline. The pipeline runs
/// unmodified against any implementation of this trait; this seam is what
/// keeps the orchestration layer reusable across destinations.
///
/// Descriptor accessors feed the shared auth and navigation logic; the stage
/// hooks are invoked in pipeline order against one page.
#[async_trait(?Send)]
pub trait PlatformAdapter {
    fn platform_name(&self) -> &str;
    fn login_url(&self) -> &str;
    fn upload_url(&self) -> &str;
    fn success_url_pattern(&self) -> &str;
    /// Ordered: the first visible match decides that login is required.
    fn login_required_selectors(&self) -> &[&str];
    /// Hard cap the platform places on titles; the pipeline truncates to
    /// this instead of letting the page reject the publish.
    fn title_limit(&self) -> usize {
        30
    }

    /// Step 3: hand the media file to the page.
    async fn submit_media(&self, page: &dyn PageHandle, media: &Path) -> DriverResult<()>;

    /// Step 3 polling probe: one check for the platform's
    /// "processing complete" signal.
    async fn media_processed(&self, page: &dyn PageHandle) -> DriverResult<bool>;

    /// Step 4 hooks. `append_tag` is called once per tag, in request order.
    async fn fill_title(&self, page: &dyn PageHandle, title: &str) -> DriverResult<()>;
    async fn fill_description(&self, page: &dyn PageHandle, description: &str)
        -> DriverResult<()>;
    async fn append_tag(&self, page: &dyn PageHandle, tag: &str) -> DriverResult<()>;

    /// Step 5. Only invoked when the cover file exists.
    async fn apply_cover(&self, page: &dyn PageHandle, cover: &Path) -> DriverResult<()>;

    /// Step 6. Only invoked for a strictly-future timestamp.
    async fn apply_schedule(&self, page: &dyn PageHandle, at: DateTime<Local>)
        -> DriverResult<()>;

    /// Adapter-defined extra fields (location, product links, draft flags).
    /// Failures here degrade; they never fail the publish.
    async fn apply_extras(
        &self,
        _page: &dyn PageHandle,
        _extra: &serde_json::Map<String, serde_json::Value>,
    ) -> DriverResult<()> {
        Ok(())
    }

    /// Step 7: the primary action.
    async fn click_publish(&self, page: &dyn PageHandle) -> DriverResult<()>;

    /// Step 7 polling aid: acknowledge a secondary "confirm publish" dialog
    /// if one is showing. Returns whether anything was acknowledged.
    async fn acknowledge_confirmation(&self, _page: &dyn PageHandle) -> DriverResult<bool> {
        Ok(false)
    }
}
