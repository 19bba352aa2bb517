use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::time::sleep;
use tracing::debug;

use crate::driver::{DriverResult, PageHandle};
use crate::publish::PlatformAdapter;

use super::{settle_visible, visible_lenient};

const LOGIN_SELECTORS: &[&str] = &[
    "text=立即登录",
    "text=扫码登录",
    "text=登录",
    ".login-btn",
];

/// Kuaishou creator platform. Everything (title, description, tags) goes
/// through one description editor; processing is done once the "上传中"
/// indicator disappears.
pub struct KuaishouAdapter;

#[async_trait(?Send)]
impl PlatformAdapter for KuaishouAdapter {
    fn platform_name(&self) -> &str {
        "kuaishou"
    }

    fn login_url(&self) -> &str {
        "https://cp.kuaishou.com"
    }

    fn upload_url(&self) -> &str {
        "https://cp.kuaishou.com/article/publish/video"
    }

    fn success_url_pattern(&self) -> &str {
        "https://cp.kuaishou.com/article/manage/video"
    }

    fn login_required_selectors(&self) -> &[&str] {
        LOGIN_SELECTORS
    }

    async fn submit_media(&self, page: &dyn PageHandle, media: &Path) -> DriverResult<()> {
        settle_visible(page, "button[class^='_upload-btn']", Duration::from_secs(10)).await?;
        page.set_input_files("input[type='file']", media).await?;
        sleep(Duration::from_millis(300)).await;
        // A first-run feature tour sometimes blocks the editor.
        if visible_lenient(page, "text=Skip").await? {
            page.click("text=Skip").await?;
        }
        Ok(())
    }

    async fn media_processed(&self, page: &dyn PageHandle) -> DriverResult<bool> {
        Ok(page.element_count("text=上传中").await? == 0)
    }

    async fn fill_title(&self, page: &dyn PageHandle, title: &str) -> DriverResult<()> {
        page.click("#work-description-edit").await?;
        page.type_text("#work-description-edit", &format!("{title}\n"))
            .await
    }

    async fn fill_description(
        &self,
        page: &dyn PageHandle,
        description: &str,
    ) -> DriverResult<()> {
        if description.is_empty() {
            return Ok(());
        }
        page.type_text("#work-description-edit", &format!("{description}\n"))
            .await
    }

    async fn append_tag(&self, page: &dyn PageHandle, tag: &str) -> DriverResult<()> {
        let editor = "#work-description-edit";
        let topic = tag.trim_start_matches('#');
        page.type_text(editor, "#").await?;
        sleep(Duration::from_millis(300)).await;
        page.type_text(editor, topic).await?;
        sleep(Duration::from_millis(500)).await;
        page.press_key(editor, "Enter").await
    }

    async fn apply_cover(&self, page: &dyn PageHandle, cover: &Path) -> DriverResult<()> {
        page.click("text=封面设置").await?;
        settle_visible(page, "div.ant-modal-body", Duration::from_secs(5)).await?;
        page.click("text=上传封面").await?;
        page.set_input_files("div[class*='upload'] input[type='file']", cover)
            .await?;
        page.click("text=确认").await
    }

    async fn apply_schedule(
        &self,
        page: &dyn PageHandle,
        at: DateTime<Local>,
    ) -> DriverResult<()> {
        debug!("switching to scheduled publication");
        page.click("text=定时发布").await?;
        let input = "div.ant-picker-input input[placeholder='选择日期时间']";
        settle_visible(page, input, Duration::from_secs(5)).await?;
        page.click(input).await?;
        page.fill(input, &at.format("%Y-%m-%d %H:%M:%S").to_string())
            .await?;
        page.press_key(input, "Enter").await
    }

    async fn click_publish(&self, page: &dyn PageHandle) -> DriverResult<()> {
        page.click("text=发布").await
    }

    /// Kuaishou raises a secondary "确认发布" dialog after the first click.
    async fn acknowledge_confirmation(&self, page: &dyn PageHandle) -> DriverResult<bool> {
        if visible_lenient(page, "text=确认发布").await? {
            page.click("text=确认发布").await?;
            return Ok(true);
        }
        Ok(false)
    }
}
