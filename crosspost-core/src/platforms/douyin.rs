use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::driver::{DriverResult, PageHandle};
use crate::publish::PlatformAdapter;

use super::{settle_visible, with_hash_prefix};

const LOGIN_SELECTORS: &[&str] = &[
    "text=手机号登录",
    "text=扫码登录",
    "text=登录",
    ".login-btn",
];

/// Douyin creator studio. The upload page swaps the drop zone for a
/// "重新上传" control once server-side processing finishes, which is the
/// completion signal the pipeline polls for.
pub struct DouyinAdapter;

#[async_trait(?Send)]
impl PlatformAdapter for DouyinAdapter {
    fn platform_name(&self) -> &str {
        "douyin"
    }

    fn login_url(&self) -> &str {
        "https://creator.douyin.com/"
    }

    fn upload_url(&self) -> &str {
        "https://creator.douyin.com/creator-micro/content/upload"
    }

    fn success_url_pattern(&self) -> &str {
        "https://creator.douyin.com/creator-micro/content/manage"
    }

    fn login_required_selectors(&self) -> &[&str] {
        LOGIN_SELECTORS
    }

    fn title_limit(&self) -> usize {
        30
    }

    async fn submit_media(&self, page: &dyn PageHandle, media: &Path) -> DriverResult<()> {
        page.set_input_files("div[class^='container'] input", media)
            .await
    }

    async fn media_processed(&self, page: &dyn PageHandle) -> DriverResult<bool> {
        page.is_visible("text=重新上传").await
    }

    async fn fill_title(&self, page: &dyn PageHandle, title: &str) -> DriverResult<()> {
        let title_input = "input[placeholder*='填写作品标题']";
        if page.element_count(title_input).await? > 0 {
            return page.fill(title_input, title).await;
        }
        // Older layout exposes a contenteditable zone instead of an input.
        page.click(".notranslate").await?;
        page.type_text(".notranslate", title).await?;
        page.press_key(".notranslate", "Enter").await
    }

    async fn fill_description(
        &self,
        page: &dyn PageHandle,
        description: &str,
    ) -> DriverResult<()> {
        if description.is_empty() {
            return Ok(());
        }
        page.type_text(".zone-container", description).await
    }

    async fn append_tag(&self, page: &dyn PageHandle, tag: &str) -> DriverResult<()> {
        page.type_text(".zone-container", &with_hash_prefix(tag))
            .await?;
        page.press_key(".zone-container", " ").await
    }

    async fn apply_cover(&self, page: &dyn PageHandle, cover: &Path) -> DriverResult<()> {
        page.click("text=选择封面").await?;
        settle_visible(page, "div.dy-creator-content-modal", Duration::from_secs(5)).await?;
        page.click("text=设置竖封面").await?;
        sleep(Duration::from_secs(2)).await;
        page.set_input_files(
            "div[class^='semi-upload'] input.semi-upload-hidden-input",
            cover,
        )
        .await?;
        sleep(Duration::from_secs(2)).await;
        page.click("text=完成").await
    }

    async fn apply_schedule(
        &self,
        page: &dyn PageHandle,
        at: DateTime<Local>,
    ) -> DriverResult<()> {
        page.click("text=定时发布").await?;
        let input = ".semi-input[placeholder='日期和时间']";
        settle_visible(page, input, Duration::from_secs(5)).await?;
        page.click(input).await?;
        page.fill(input, &at.format("%Y-%m-%d %H:%M").to_string())
            .await?;
        page.press_key(input, "Enter").await
    }

    async fn apply_extras(
        &self,
        page: &dyn PageHandle,
        extra: &serde_json::Map<String, serde_json::Value>,
    ) -> DriverResult<()> {
        if let Some(location) = extra.get("location").and_then(|value| value.as_str()) {
            self.set_location(page, location).await?;
        }
        if let (Some(link), Some(title)) = (
            extra.get("product_link").and_then(|value| value.as_str()),
            extra.get("product_title").and_then(|value| value.as_str()),
        ) {
            self.set_product_link(page, link, title).await?;
        }
        Ok(())
    }

    async fn click_publish(&self, page: &dyn PageHandle) -> DriverResult<()> {
        page.click("text=发布").await
    }

    async fn acknowledge_confirmation(&self, page: &dyn PageHandle) -> DriverResult<bool> {
        // Publishing blocks until a cover exists; pick the first recommended
        // frame and confirm the follow-up prompt.
        if !page.is_visible("text=请设置封面后再发布").await? {
            return Ok(false);
        }
        debug!("cover-required prompt detected; selecting recommended cover");
        page.click("[class^='recommendCover-']").await?;
        sleep(Duration::from_millis(500)).await;
        if page.is_visible("text=是否确认应用此封面？").await? {
            page.click("text=确定").await?;
        }
        Ok(true)
    }
}

impl DouyinAdapter {
    async fn set_location(&self, page: &dyn PageHandle, location: &str) -> DriverResult<()> {
        page.click("text=输入地理位置").await?;
        sleep(Duration::from_secs(2)).await;
        page.type_text("div.semi-select input", location).await?;
        if settle_visible(page, "div[role='listbox'] [role='option']", Duration::from_secs(5))
            .await?
        {
            page.click("div[role='listbox'] [role='option']").await?;
        } else {
            warn!(location, "no location suggestions appeared");
        }
        Ok(())
    }

    async fn set_product_link(
        &self,
        page: &dyn PageHandle,
        link: &str,
        title: &str,
    ) -> DriverResult<()> {
        page.click("text=添加标签").await?;
        if !settle_visible(page, "[role='listbox']", Duration::from_secs(5)).await? {
            warn!("product tag listbox did not open");
            return Ok(());
        }
        page.click("text=购物车").await?;
        settle_visible(
            page,
            "input[placeholder='粘贴商品链接']",
            Duration::from_secs(5),
        )
        .await?;
        page.fill("input[placeholder='粘贴商品链接']", link).await?;
        page.click("text=添加链接").await?;
        sleep(Duration::from_secs(2)).await;

        let short_title_input = "input[placeholder='请输入商品短标题']";
        if settle_visible(page, short_title_input, Duration::from_secs(10)).await? {
            let short_title: String = title.chars().take(10).collect();
            page.fill(short_title_input, &short_title).await?;
            page.click("text=完成编辑").await?;
        } else {
            warn!("product dialog did not open; leaving product link unset");
        }
        Ok(())
    }
}
