use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::driver::{DriverResult, PageHandle};
use crate::publish::PlatformAdapter;

use super::{click_first_visible, settle_visible, upload_to_first_input, visible_lenient, with_hash_prefix};

const LOGIN_SELECTORS: &[&str] = &[
    "text=手机号登录",
    "text=扫码登录",
    "text=登录",
    ".login-btn",
];

// The upload widget has been restyled repeatedly; completion is detected
// through whichever of these shows up first.
const PREVIEW_SELECTORS: &[&str] = &[
    "div.upload-content div.preview-new",
    "div.preview-new",
    "div[class*='preview']",
    "img[class*='preview']",
];

const SUCCESS_TEXTS: &[&str] = &["text=上传成功", "text=已上传", "text=完成"];

const PROGRESS_SELECTORS: &[&str] = &[
    "div.el-progress-bar",
    "div[class*='progress']",
    "div[class*='uploading']",
];

const EDITOR_SELECTORS: &[&str] = &[
    "input[placeholder*='填写标题']",
    "div[class*='title']",
    "div[class*='content']",
];

const COVER_BUTTON_SELECTORS: &[&str] = &["text=封面", "div[class*='cover']"];

const COVER_INPUT_SELECTORS: &[&str] = &[
    "input[type='file'][accept='image/png, image/jpeg, image/*']",
    "input[type='file'][accept*='image']",
];

const FINISH_SELECTORS: &[&str] = &["text=确认", "text=确定"];

/// Xiaohongshu creator studio. Success is a navigation to `/publish/success`
/// (sometimes with `published=true` instead), so the confirmation loop leans
/// entirely on the URL.
pub struct XiaohongshuAdapter;

#[async_trait(?Send)]
impl PlatformAdapter for XiaohongshuAdapter {
    fn platform_name(&self) -> &str {
        "xiaohongshu"
    }

    fn login_url(&self) -> &str {
        "https://creator.xiaohongshu.com/"
    }

    fn upload_url(&self) -> &str {
        "https://creator.xiaohongshu.com/publish/publish?from=homepage&target=video"
    }

    fn success_url_pattern(&self) -> &str {
        "https://creator.xiaohongshu.com/publish/success"
    }

    fn login_required_selectors(&self) -> &[&str] {
        LOGIN_SELECTORS
    }

    fn title_limit(&self) -> usize {
        20
    }

    async fn submit_media(&self, page: &dyn PageHandle, media: &Path) -> DriverResult<()> {
        page.set_input_files("input[type='file']", media).await
    }

    /// Multi-strategy completion probe: a preview element, an explicit
    /// success text, or (no progress bar + the metadata editor showing).
    async fn media_processed(&self, page: &dyn PageHandle) -> DriverResult<bool> {
        for selector in PREVIEW_SELECTORS {
            if visible_lenient(page, selector).await? {
                debug!(selector, "preview element visible; upload complete");
                return Ok(true);
            }
        }
        for selector in SUCCESS_TEXTS {
            if visible_lenient(page, selector).await? {
                debug!(selector, "success text visible; upload complete");
                return Ok(true);
            }
        }
        for selector in PROGRESS_SELECTORS {
            if visible_lenient(page, selector).await? {
                return Ok(false);
            }
        }
        for selector in EDITOR_SELECTORS {
            if visible_lenient(page, selector).await? {
                debug!(selector, "metadata editor visible; assuming upload complete");
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn fill_title(&self, page: &dyn PageHandle, title: &str) -> DriverResult<()> {
        let title_input = "input[placeholder*='填写标题']";
        if page.element_count(title_input).await? > 0 {
            return page.fill(title_input, title).await;
        }
        page.click(".notranslate").await?;
        page.type_text(".notranslate", title).await
    }

    async fn fill_description(
        &self,
        page: &dyn PageHandle,
        description: &str,
    ) -> DriverResult<()> {
        if description.is_empty() {
            return Ok(());
        }
        let editor = "div.tiptap-container div[contenteditable]";
        page.click(editor).await?;
        page.fill(editor, description).await
    }

    async fn append_tag(&self, page: &dyn PageHandle, tag: &str) -> DriverResult<()> {
        let editor = "div.tiptap-container div[contenteditable]";
        page.type_text(editor, &format!(" {}", with_hash_prefix(tag)))
            .await?;
        page.press_key(editor, "Enter").await
    }

    async fn apply_cover(&self, page: &dyn PageHandle, cover: &Path) -> DriverResult<()> {
        if !click_first_visible(page, COVER_BUTTON_SELECTORS, "cover button").await? {
            warn!("cover button not found; skipping cover");
            return Ok(());
        }
        sleep(Duration::from_secs(2)).await;
        settle_visible(page, ".canvas-container > .cover-container", Duration::from_secs(10))
            .await?;

        if !upload_to_first_input(page, COVER_INPUT_SELECTORS, cover).await? {
            warn!("no image input found in cover dialog");
            return Ok(());
        }
        sleep(Duration::from_secs(2)).await;
        if !click_first_visible(page, FINISH_SELECTORS, "cover confirm").await? {
            warn!("cover confirm button not found");
        }
        Ok(())
    }

    async fn apply_schedule(
        &self,
        page: &dyn PageHandle,
        at: DateTime<Local>,
    ) -> DriverResult<()> {
        page.click("text=定时发布").await?;
        let input = "input[placeholder*='选择日期']";
        settle_visible(page, input, Duration::from_secs(5)).await?;
        page.click(input).await?;
        page.fill(input, &at.format("%Y-%m-%d %H:%M").to_string())
            .await?;
        page.press_key(input, "Enter").await
    }

    async fn click_publish(&self, page: &dyn PageHandle) -> DriverResult<()> {
        page.click("text=发布").await
    }
}
