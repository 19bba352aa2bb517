#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::time::{sleep, Instant};

use crosspost_core::{
    AuthManager, AuthSection, BrowserHandle, BrowserLauncher, BrowserPool, CredentialStore,
    DriverError, DriverResult, LaunchOptions, PageHandle, PlatformAdapter, PublishPipeline,
    PublishSection, SessionBlob, SessionHandle,
};

#[derive(Default)]
pub struct WorldState {
    pub launches: usize,
    pub fail_next_launches: usize,
    pub closes: usize,
    pub close_hangs: bool,
    pub alive: bool,
    pub url: String,
    pub visible: HashSet<String>,
    pub exported_state: Vec<u8>,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
    pub page_closed: bool,
    pub events: Vec<String>,
}

/// Scriptable stand-in for the whole driver stack: one shared state cell
/// observed by the launcher, browser, session and page mocks.
#[derive(Clone, Default)]
pub struct MockWorld {
    state: Rc<RefCell<WorldState>>,
}

impl MockWorld {
    pub fn new() -> Self {
        let world = Self::default();
        world.state.borrow_mut().exported_state = br#"{"cookies":[]}"#.to_vec();
        world
    }

    pub fn launcher(&self) -> MockLauncher {
        MockLauncher {
            world: self.clone(),
        }
    }

    pub fn set_url(&self, url: &str) {
        self.state.borrow_mut().url = url.to_string();
    }

    pub fn url(&self) -> String {
        self.state.borrow().url.clone()
    }

    pub fn set_visible(&self, selector: &str) {
        self.state.borrow_mut().visible.insert(selector.to_string());
    }

    pub fn clear_visible(&self, selector: &str) {
        self.state.borrow_mut().visible.remove(selector);
    }

    pub fn close_page(&self) {
        self.state.borrow_mut().page_closed = true;
    }

    pub fn fail_next_launches(&self, count: usize) {
        self.state.borrow_mut().fail_next_launches = count;
    }

    pub fn make_close_hang(&self) {
        self.state.borrow_mut().close_hangs = true;
    }

    pub fn set_exported_state(&self, bytes: &[u8]) {
        self.state.borrow_mut().exported_state = bytes.to_vec();
    }

    pub fn launches(&self) -> usize {
        self.state.borrow().launches
    }

    pub fn closes(&self) -> usize {
        self.state.borrow().closes
    }

    pub fn alive(&self) -> bool {
        self.state.borrow().alive
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.borrow().sessions_opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.state.borrow().sessions_closed
    }

    pub fn events(&self) -> Vec<String> {
        self.state.borrow().events.clone()
    }

    pub fn has_event(&self, needle: &str) -> bool {
        self.state
            .borrow()
            .events
            .iter()
            .any(|event| event.contains(needle))
    }

    fn record(&self, event: String) {
        self.state.borrow_mut().events.push(event);
    }
}

pub struct MockLauncher {
    world: MockWorld,
}

#[async_trait(?Send)]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self, options: &LaunchOptions) -> DriverResult<Box<dyn BrowserHandle>> {
        {
            let mut state = self.world.state.borrow_mut();
            if state.fail_next_launches > 0 {
                state.fail_next_launches -= 1;
                return Err(DriverError::Launch("scripted launch failure".into()));
            }
            state.launches += 1;
            state.alive = true;
            state
                .events
                .push(format!("launch headless={}", options.headless));
        }
        Ok(Box::new(MockBrowser {
            world: self.world.clone(),
        }))
    }
}

pub struct MockBrowser {
    world: MockWorld,
}

#[async_trait(?Send)]
impl BrowserHandle for MockBrowser {
    async fn new_session(&self, state: Option<&[u8]>) -> DriverResult<Box<dyn SessionHandle>> {
        {
            let mut world = self.world.state.borrow_mut();
            world.sessions_opened += 1;
            world
                .events
                .push(format!("session with_state={}", state.is_some()));
        }
        Ok(Box::new(MockSession {
            world: self.world.clone(),
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        let hangs = self.world.state.borrow().close_hangs;
        if hangs {
            std::future::pending::<()>().await;
        }
        let mut state = self.world.state.borrow_mut();
        state.closes += 1;
        state.alive = false;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.world.state.borrow().alive
    }
}

pub struct MockSession {
    world: MockWorld,
}

#[async_trait(?Send)]
impl SessionHandle for MockSession {
    async fn new_page(&self) -> DriverResult<Box<dyn PageHandle>> {
        Ok(Box::new(MockPage {
            world: self.world.clone(),
        }))
    }

    async fn export_state(&self) -> DriverResult<Vec<u8>> {
        Ok(self.world.state.borrow().exported_state.clone())
    }

    async fn close(&self) -> DriverResult<()> {
        self.world.state.borrow_mut().sessions_closed += 1;
        Ok(())
    }
}

pub struct MockPage {
    world: MockWorld,
}

#[async_trait(?Send)]
impl PageHandle for MockPage {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        let mut state = self.world.state.borrow_mut();
        state.url = url.to_string();
        state.events.push(format!("navigate {url}"));
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let state = self.world.state.borrow();
        if state.page_closed {
            return Err(DriverError::TargetClosed);
        }
        Ok(state.url.clone())
    }

    async fn element_count(&self, selector: &str) -> DriverResult<usize> {
        Ok(usize::from(self.world.state.borrow().visible.contains(selector)))
    }

    async fn is_visible(&self, selector: &str) -> DriverResult<bool> {
        Ok(self.world.state.borrow().visible.contains(selector))
    }

    async fn click(&self, selector: &str) -> DriverResult<()> {
        self.world.record(format!("click {selector}"));
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        self.world.record(format!("fill {selector}={value}"));
        Ok(())
    }

    async fn type_text(&self, selector: &str, value: &str) -> DriverResult<()> {
        self.world.record(format!("type {selector}={value}"));
        Ok(())
    }

    async fn press_key(&self, selector: &str, key: &str) -> DriverResult<()> {
        self.world.record(format!("press {selector}={key}"));
        Ok(())
    }

    async fn set_input_files(&self, selector: &str, path: &Path) -> DriverResult<()> {
        self.world
            .record(format!("upload {selector}={}", path.display()));
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> DriverResult<String> {
        Ok(String::new())
    }

    async fn wait_for_url(
        &self,
        predicate: &dyn for<'a> Fn(&'a str) -> bool,
        timeout: Duration,
    ) -> DriverResult<String> {
        let started = Instant::now();
        loop {
            {
                let state = self.world.state.borrow();
                if state.page_closed {
                    return Err(DriverError::TargetClosed);
                }
                if predicate(&state.url) {
                    return Ok(state.url.clone());
                }
            }
            if started.elapsed() >= timeout {
                return Err(DriverError::Timeout("url match".into()));
            }
            sleep(Duration::from_millis(10)).await;
        }
    }
}

pub const MOCK_LOGIN_URL: &str = "https://mock.example/login";
pub const MOCK_UPLOAD_URL: &str = "https://mock.example/upload";
pub const MOCK_SUCCESS_URL: &str = "https://mock.example/manage";
pub const MOCK_LOGIN_SELECTOR: &str = ".login-required";

/// Recording adapter with scriptable hook behavior, driven by the same
/// world as the page mocks.
pub struct MockAdapter {
    pub world: MockWorld,
    pub name: String,
    /// `Some(n)`: `media_processed` reports done on probe n (0-based).
    /// `None`: the signal never appears.
    pub processing_ready_on: Option<usize>,
    pub fail_tag: Option<String>,
    pub fatal_on_title: bool,
    /// URL the page "navigates" to when publish is clicked.
    pub publish_navigates_to: Option<String>,
    processing_probes: Cell<usize>,
    pub titles_seen: RefCell<Vec<String>>,
    pub tags_seen: RefCell<Vec<String>>,
    pub covers_seen: RefCell<Vec<PathBuf>>,
    pub schedule_seen: RefCell<Option<DateTime<Local>>>,
    pub extras_seen: RefCell<Vec<String>>,
}

impl MockAdapter {
    pub fn new(world: &MockWorld) -> Self {
        Self {
            world: world.clone(),
            name: "mockplat".to_string(),
            processing_ready_on: Some(0),
            fail_tag: None,
            fatal_on_title: false,
            publish_navigates_to: Some(MOCK_SUCCESS_URL.to_string()),
            processing_probes: Cell::new(0),
            titles_seen: RefCell::new(Vec::new()),
            tags_seen: RefCell::new(Vec::new()),
            covers_seen: RefCell::new(Vec::new()),
            schedule_seen: RefCell::new(None),
            extras_seen: RefCell::new(Vec::new()),
        }
    }
}

#[async_trait(?Send)]
impl PlatformAdapter for MockAdapter {
    fn platform_name(&self) -> &str {
        &self.name
    }

    fn login_url(&self) -> &str {
        MOCK_LOGIN_URL
    }

    fn upload_url(&self) -> &str {
        MOCK_UPLOAD_URL
    }

    fn success_url_pattern(&self) -> &str {
        MOCK_SUCCESS_URL
    }

    fn login_required_selectors(&self) -> &[&str] {
        const SELECTORS: &[&str] = &[MOCK_LOGIN_SELECTOR];
        SELECTORS
    }

    fn title_limit(&self) -> usize {
        10
    }

    async fn submit_media(&self, _page: &dyn PageHandle, media: &Path) -> DriverResult<()> {
        self.world.record(format!("submit_media {}", media.display()));
        Ok(())
    }

    async fn media_processed(&self, _page: &dyn PageHandle) -> DriverResult<bool> {
        let probe = self.processing_probes.get();
        self.processing_probes.set(probe + 1);
        Ok(self
            .processing_ready_on
            .map(|ready| probe >= ready)
            .unwrap_or(false))
    }

    async fn fill_title(&self, _page: &dyn PageHandle, title: &str) -> DriverResult<()> {
        if self.fatal_on_title {
            return Err(DriverError::TargetClosed);
        }
        self.titles_seen.borrow_mut().push(title.to_string());
        Ok(())
    }

    async fn fill_description(
        &self,
        _page: &dyn PageHandle,
        description: &str,
    ) -> DriverResult<()> {
        self.world.record(format!("description {description}"));
        Ok(())
    }

    async fn append_tag(&self, _page: &dyn PageHandle, tag: &str) -> DriverResult<()> {
        if self.fail_tag.as_deref() == Some(tag) {
            return Err(DriverError::Evaluation(format!("tag {tag} rejected")));
        }
        self.tags_seen.borrow_mut().push(tag.to_string());
        Ok(())
    }

    async fn apply_cover(&self, _page: &dyn PageHandle, cover: &Path) -> DriverResult<()> {
        self.covers_seen.borrow_mut().push(cover.to_path_buf());
        Ok(())
    }

    async fn apply_schedule(
        &self,
        _page: &dyn PageHandle,
        at: DateTime<Local>,
    ) -> DriverResult<()> {
        *self.schedule_seen.borrow_mut() = Some(at);
        Ok(())
    }

    async fn apply_extras(
        &self,
        _page: &dyn PageHandle,
        extra: &serde_json::Map<String, serde_json::Value>,
    ) -> DriverResult<()> {
        let mut seen = self.extras_seen.borrow_mut();
        for key in extra.keys() {
            seen.push(key.clone());
        }
        Ok(())
    }

    async fn click_publish(&self, _page: &dyn PageHandle) -> DriverResult<()> {
        self.world.record("click_publish".to_string());
        if let Some(url) = &self.publish_navigates_to {
            self.world.set_url(url);
        }
        Ok(())
    }
}

/// One isolated store + pool + mock world per test.
pub struct Harness {
    pub world: MockWorld,
    pub store: Arc<CredentialStore>,
    pub pool: Arc<BrowserPool>,
    pub dir: tempfile::TempDir,
}

pub fn harness() -> Harness {
    let world = MockWorld::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(CredentialStore::new(dir.path()));
    let pool = Arc::new(BrowserPool::new(
        Box::new(world.launcher()),
        Duration::from_millis(100),
    ));
    Harness {
        world,
        store,
        pool,
        dir,
    }
}

impl Harness {
    pub fn auth(&self) -> AuthManager {
        self.auth_with(AuthSection {
            verify_timeout_seconds: 1,
            login_timeout_seconds: 2,
        })
    }

    pub fn auth_with(&self, config: AuthSection) -> AuthManager {
        AuthManager::new(
            Arc::clone(&self.store),
            Arc::clone(&self.pool),
            config,
            None,
        )
    }

    pub fn pipeline(&self) -> PublishPipeline {
        self.pipeline_with(PublishSection {
            poll_interval_ms: 1,
            poll_jitter_ms: 0,
            processing_max_attempts: 3,
            confirm_timeout_seconds: 0,
        })
    }

    pub fn pipeline_with(&self, config: PublishSection) -> PublishPipeline {
        PublishPipeline::new(
            Arc::clone(&self.store),
            Arc::clone(&self.pool),
            self.auth(),
            config,
            LaunchOptions::headless(None),
        )
    }

    pub fn seed_session(&self, platform: &str) {
        self.store
            .save(platform, &SessionBlob::new(br#"{"cookies":[]}"#.to_vec()))
            .expect("seed session blob");
    }

    pub fn media_file(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"fake media bytes").expect("write media file");
        path
    }
}
