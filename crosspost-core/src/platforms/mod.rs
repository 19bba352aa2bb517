mod douyin;
mod kuaishou;
mod shipinhao;
mod xiaohongshu;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::driver::{DriverError, DriverResult, PageHandle};
use crate::publish::PlatformAdapter;

pub use douyin::DouyinAdapter;
pub use kuaishou::KuaishouAdapter;
pub use shipinhao::ShipinhaoAdapter;
pub use xiaohongshu::XiaohongshuAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Douyin,
    Xiaohongshu,
    Kuaishou,
    Shipinhao,
}

impl Platform {
    pub fn all() -> [Platform; 4] {
        [
            Platform::Douyin,
            Platform::Xiaohongshu,
            Platform::Kuaishou,
            Platform::Shipinhao,
        ]
    }

    pub fn adapter(&self) -> Box<dyn PlatformAdapter> {
        match self {
            Platform::Douyin => Box::new(DouyinAdapter),
            Platform::Xiaohongshu => Box::new(XiaohongshuAdapter),
            Platform::Kuaishou => Box::new(KuaishouAdapter),
            Platform::Shipinhao => Box::new(ShipinhaoAdapter),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Platform::Douyin => "douyin",
            Platform::Xiaohongshu => "xiaohongshu",
            Platform::Kuaishou => "kuaishou",
            Platform::Shipinhao => "shipinhao",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for Platform {
    type Err = DriverError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "douyin" => Ok(Platform::Douyin),
            "xiaohongshu" | "xhs" => Ok(Platform::Xiaohongshu),
            "kuaishou" => Ok(Platform::Kuaishou),
            "shipinhao" | "tencent" => Ok(Platform::Shipinhao),
            other => Err(DriverError::Configuration(format!(
                "unsupported platform: {other}"
            ))),
        }
    }
}

pub fn adapter_for(platform: Platform) -> Box<dyn PlatformAdapter> {
    platform.adapter()
}

/// Clicks the first selector in the list with a visible match. UI class
/// names rot independently per platform, so every adapter addresses
/// clickable chrome through an ordered candidate list.
pub(crate) async fn click_first_visible(
    page: &dyn PageHandle,
    selectors: &[&str],
    what: &str,
) -> DriverResult<bool> {
    for selector in selectors {
        match page.is_visible(selector).await {
            Ok(true) => {
                page.click(selector).await?;
                debug!(selector, what, "clicked");
                return Ok(true);
            }
            Ok(false) => {}
            Err(err) if err.is_transient() => {
                debug!(selector, error = %err, "candidate probe failed; trying next");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(false)
}

/// Attaches a file to the first selector that resolves to an input.
pub(crate) async fn upload_to_first_input(
    page: &dyn PageHandle,
    selectors: &[&str],
    file: &Path,
) -> DriverResult<bool> {
    for selector in selectors {
        match page.element_count(selector).await {
            Ok(count) if count > 0 => {
                page.set_input_files(selector, file).await?;
                return Ok(true);
            }
            Ok(_) => {}
            Err(err) if err.is_transient() => {
                debug!(selector, error = %err, "input probe failed; trying next");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(false)
}

/// Short bounded wait for an element (dialogs, modal bodies) to show up.
pub(crate) async fn settle_visible(
    page: &dyn PageHandle,
    selector: &str,
    timeout: Duration,
) -> DriverResult<bool> {
    let step = Duration::from_millis(250);
    let mut waited = Duration::ZERO;
    loop {
        match page.is_visible(selector).await {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(err) if err.is_transient() => {}
            Err(err) => return Err(err),
        }
        if waited >= timeout {
            return Ok(false);
        }
        sleep(step).await;
        waited += step;
    }
}

/// Visibility probe that treats transient failures as "not visible" but
/// still surfaces fatal ones, so detection loops stay tolerant without
/// hiding a dead page.
pub(crate) async fn visible_lenient(
    page: &dyn PageHandle,
    selector: &str,
) -> DriverResult<bool> {
    match page.is_visible(selector).await {
        Ok(visible) => Ok(visible),
        Err(err) if err.is_transient() => Ok(false),
        Err(err) => Err(err),
    }
}

pub(crate) fn with_hash_prefix(tag: &str) -> String {
    let clean = tag.trim_start_matches('#');
    format!("#{clean}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn platform_names_round_trip() {
        for platform in Platform::all() {
            let parsed = Platform::from_str(&platform.to_string()).unwrap();
            assert_eq!(parsed, platform);
        }
    }

    #[test]
    fn tencent_is_an_alias_for_shipinhao() {
        assert_eq!(Platform::from_str("tencent").unwrap(), Platform::Shipinhao);
    }

    #[test]
    fn unknown_platform_is_rejected() {
        assert!(Platform::from_str("bilibili").is_err());
    }

    #[test]
    fn adapters_expose_consistent_descriptors() {
        for platform in Platform::all() {
            let adapter = platform.adapter();
            assert_eq!(adapter.platform_name(), platform.to_string());
            assert!(adapter.login_url().starts_with("https://"));
            assert!(adapter.upload_url().starts_with("https://"));
            assert!(adapter.success_url_pattern().starts_with("https://"));
            assert!(!adapter.login_required_selectors().is_empty());
            assert!(adapter.title_limit() > 0);
        }
    }

    #[test]
    fn hash_prefix_is_idempotent() {
        assert_eq!(with_hash_prefix("cat"), "#cat");
        assert_eq!(with_hash_prefix("#cat"), "#cat");
    }
}
