use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CrosspostConfig {
    pub paths: PathsSection,
    pub browser: BrowserSection,
    pub auth: AuthSection,
    pub publish: PublishSection,
}

impl CrosspostConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.base_dir).join(path)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub base_dir: String,
    pub logs_dir: String,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            base_dir: ".".to_string(),
            logs_dir: "logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub executable_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub close_grace_seconds: u64,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            sandbox: false,
            disable_gpu: false,
            close_grace_seconds: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Bound on the post-navigation settle wait during session verification.
    pub verify_timeout_seconds: u64,
    /// Overall bound on an interactive login window staying open.
    pub login_timeout_seconds: u64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            verify_timeout_seconds: 10,
            login_timeout_seconds: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishSection {
    pub poll_interval_ms: u64,
    pub poll_jitter_ms: u64,
    pub processing_max_attempts: usize,
    pub confirm_timeout_seconds: u64,
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            poll_jitter_ms: 0,
            processing_max_attempts: 120,
            confirm_timeout_seconds: 30,
        }
    }
}

pub fn load_crosspost_config<P: AsRef<Path>>(path: P) -> Result<CrosspostConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_usable_without_a_config_file() {
        let config = CrosspostConfig::default();
        assert!(config.browser.headless);
        assert_eq!(config.publish.processing_max_attempts, 120);
        assert_eq!(config.publish.poll_interval_ms, 1000);
        assert_eq!(config.auth.login_timeout_seconds, 200);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crosspost.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            "[browser]\nheadless = false\n\n[publish]\nprocessing_max_attempts = 5\n"
        )
        .unwrap();

        let config = load_crosspost_config(&path).unwrap();
        assert!(!config.browser.headless);
        assert_eq!(config.publish.processing_max_attempts, 5);
        assert_eq!(config.publish.confirm_timeout_seconds, 30);
    }

    #[test]
    fn resolve_path_keeps_absolute_and_joins_relative() {
        let mut config = CrosspostConfig::default();
        config.paths.base_dir = "/srv/crosspost".to_string();
        assert_eq!(
            config.resolve_path("cookies"),
            PathBuf::from("/srv/crosspost/cookies")
        );
        assert_eq!(config.resolve_path("/tmp/x"), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn missing_file_surfaces_io_error_with_path() {
        let err = load_crosspost_config("/definitely/not/here.toml").unwrap_err();
        match err {
            ConfigError::Io { path, .. } => {
                assert_eq!(path, PathBuf::from("/definitely/not/here.toml"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
