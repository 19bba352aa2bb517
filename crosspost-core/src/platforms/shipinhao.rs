use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::driver::{DriverResult, PageHandle};
use crate::publish::PlatformAdapter;

use super::{settle_visible, visible_lenient, with_hash_prefix};

const LOGIN_SELECTORS: &[&str] = &["text=扫码登录", "text=登录", ".login-btn"];

/// WeChat Channels (视频号) creator platform. The publish button stays
/// disabled until server-side processing finishes, which doubles as the
/// completion signal.
pub struct ShipinhaoAdapter;

#[async_trait(?Send)]
impl PlatformAdapter for ShipinhaoAdapter {
    fn platform_name(&self) -> &str {
        "shipinhao"
    }

    fn login_url(&self) -> &str {
        "https://channels.weixin.qq.com"
    }

    fn upload_url(&self) -> &str {
        "https://channels.weixin.qq.com/platform/post/create"
    }

    fn success_url_pattern(&self) -> &str {
        "https://channels.weixin.qq.com/platform/post/list"
    }

    fn login_required_selectors(&self) -> &[&str] {
        LOGIN_SELECTORS
    }

    fn title_limit(&self) -> usize {
        16
    }

    async fn submit_media(&self, page: &dyn PageHandle, media: &Path) -> DriverResult<()> {
        page.set_input_files("input[type='file']", media).await
    }

    async fn media_processed(&self, page: &dyn PageHandle) -> DriverResult<bool> {
        // An upload error banner with a delete action means the file must be
        // resubmitted; report "not done" and let the budget decide.
        if visible_lenient(page, "div.status-msg.error").await? {
            warn!("channel reports an upload error; waiting for recovery");
            return Ok(false);
        }
        let publish_disabled = page
            .evaluate(
                r#"(() => {
    const buttons = Array.from(document.querySelectorAll("div.form-btns button"));
    const publish = buttons.find((b) => (b.innerText || "").includes("发表"));
    if (!publish) return "missing";
    return publish.className.includes("weui-desktop-btn_disabled") ? "disabled" : "enabled";
})()"#,
            )
            .await?;
        Ok(publish_disabled == "enabled")
    }

    async fn fill_title(&self, page: &dyn PageHandle, title: &str) -> DriverResult<()> {
        page.click("div.input-editor").await?;
        page.type_text("div.input-editor", &format!("{title}\n"))
            .await?;
        // The dedicated short-title field mirrors the main title when shown.
        let short_title = "input[placeholder*='短标题']";
        if page.element_count(short_title).await? > 0 {
            page.fill(short_title, &format_short_title(title)).await?;
        }
        Ok(())
    }

    async fn fill_description(
        &self,
        page: &dyn PageHandle,
        description: &str,
    ) -> DriverResult<()> {
        if description.is_empty() {
            return Ok(());
        }
        page.type_text("div.input-editor", &format!("{description}\n"))
            .await
    }

    async fn append_tag(&self, page: &dyn PageHandle, tag: &str) -> DriverResult<()> {
        page.type_text("div.input-editor", &with_hash_prefix(tag))
            .await?;
        page.press_key("div.input-editor", " ").await
    }

    async fn apply_cover(&self, page: &dyn PageHandle, cover: &Path) -> DriverResult<()> {
        page.click("text=个人主页卡片").await?;
        settle_visible(page, "div.weui-desktop-dialog", Duration::from_secs(5)).await?;
        page.click("text=上传封面").await?;
        sleep(Duration::from_secs(1)).await;
        page.set_input_files("div.single-cover-uploader-wrap input[type='file']", cover)
            .await?;
        sleep(Duration::from_secs(1)).await;
        page.click("text=确认").await
    }

    async fn apply_schedule(
        &self,
        page: &dyn PageHandle,
        at: DateTime<Local>,
    ) -> DriverResult<()> {
        page.click("text=定时").await?;
        page.click("input[placeholder='请选择发表时间']").await?;
        let day = at.day();
        let pick_day = format!(
            r#"(() => {{
    const cells = Array.from(document.querySelectorAll("table.weui-desktop-picker__table a"));
    for (const cell of cells) {{
        if (cell.className.includes("weui-desktop-picker__disabled")) continue;
        if ((cell.innerText || "").trim() === "{day}") {{
            cell.click();
            return "picked";
        }}
    }}
    return "missing";
}})()"#,
        );
        if page.evaluate(&pick_day).await? != "picked" {
            warn!(day, "calendar day not selectable; leaving schedule unset");
            return Ok(());
        }
        page.click("input[placeholder='请选择时间']").await?;
        page.fill("input[placeholder='请选择时间']", &at.format("%H:%M").to_string())
            .await?;
        page.click("div.input-editor").await
    }

    async fn apply_extras(
        &self,
        page: &dyn PageHandle,
        extra: &serde_json::Map<String, serde_json::Value>,
    ) -> DriverResult<()> {
        if extra
            .get("declare_original")
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
        {
            self.declare_original(page).await?;
        }
        Ok(())
    }

    async fn click_publish(&self, page: &dyn PageHandle) -> DriverResult<()> {
        page.click("text=发表").await
    }

    async fn acknowledge_confirmation(&self, page: &dyn PageHandle) -> DriverResult<bool> {
        if visible_lenient(page, "text=继续发表").await? {
            page.click("text=继续发表").await?;
            return Ok(true);
        }
        Ok(false)
    }
}

impl ShipinhaoAdapter {
    async fn declare_original(&self, page: &dyn PageHandle) -> DriverResult<()> {
        if !visible_lenient(page, "text=视频为原创").await? {
            debug!("original declaration not offered for this upload");
            return Ok(());
        }
        page.click("text=视频为原创").await?;
        if visible_lenient(page, "text=我已阅读并同意").await? {
            page.click("text=我已阅读并同意").await?;
            page.click("text=声明原创").await?;
        }
        Ok(())
    }
}

/// Channels constrains the short title to 6–16 chars from a restricted
/// alphabet; pad or trim the main title to fit.
fn format_short_title(title: &str) -> String {
    const ALLOWED_SPECIAL: &str = "《》“”:+?%°";
    let mut formatted: String = title
        .chars()
        .filter_map(|ch| {
            if ch.is_alphanumeric() || ALLOWED_SPECIAL.contains(ch) {
                Some(ch)
            } else if ch == ',' {
                Some(' ')
            } else {
                None
            }
        })
        .collect();

    let count = formatted.chars().count();
    if count > 16 {
        formatted = formatted.chars().take(16).collect();
    } else if count < 6 {
        formatted.extend(std::iter::repeat(' ').take(6 - count));
    }
    formatted
}
