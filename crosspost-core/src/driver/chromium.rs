use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::dom::{
    GetDocumentParams, QuerySelectorParams, SetFileInputFilesParams,
};
use chromiumoxide::cdp::browser_protocol::network::{Cookie, CookieParam};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::BrowserSection;

use super::error::{DriverError, DriverResult};
use super::{BrowserHandle, BrowserLauncher, LaunchOptions, PageHandle, SessionHandle};

const URL_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Production launcher over chromiumoxide. Everything above this file talks
/// to the capability traits only.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    config: BrowserSection,
}

impl ChromiumLauncher {
    pub fn new(config: BrowserSection) -> Self {
        Self { config }
    }

    fn executable_for(&self, options: &LaunchOptions) -> Option<PathBuf> {
        options
            .executable_path
            .clone()
            .or_else(|| self.config.executable_path.as_ref().map(PathBuf::from))
            .or_else(detect_executable)
    }

    fn build_chromium_config(&self, options: &LaunchOptions) -> DriverResult<ChromiumConfig> {
        let mut builder = ChromiumConfig::builder();
        if let Some(executable) = self.executable_for(options) {
            debug!(executable = %executable.display(), "using local chrome executable");
            builder = builder.chrome_executable(executable);
        }
        if !options.headless {
            builder = builder.with_head();
        }
        if !self.config.sandbox {
            builder = builder.no_sandbox();
        }

        let mut args = vec![
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-infobars".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--no-first-run".to_string(),
        ];
        if self.config.disable_gpu {
            args.push("--disable-gpu".to_string());
        }
        builder = builder.args(args);

        builder.build().map_err(DriverError::Configuration)
    }
}

#[async_trait(?Send)]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, options: &LaunchOptions) -> DriverResult<Box<dyn BrowserHandle>> {
        let chromium_config = self.build_chromium_config(options)?;
        info!(headless = options.headless, "launching chromium process");
        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| DriverError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "chromium handler reported error");
                }
            }
        });

        Ok(Box::new(ChromiumBrowser {
            browser: Arc::new(AsyncMutex::new(browser)),
            handler_task: RefCell::new(Some(handler_task)),
            alive: AtomicBool::new(true),
        }))
    }
}

struct ChromiumBrowser {
    browser: Arc<AsyncMutex<Browser>>,
    handler_task: RefCell<Option<JoinHandle<()>>>,
    alive: AtomicBool,
}

#[async_trait(?Send)]
impl BrowserHandle for ChromiumBrowser {
    async fn new_session(&self, state: Option<&[u8]>) -> DriverResult<Box<dyn SessionHandle>> {
        let initial_cookies = match state {
            Some(bytes) => Some(decode_state(bytes)?),
            None => None,
        };
        Ok(Box::new(ChromiumSession {
            browser: Arc::clone(&self.browser),
            pages: RefCell::new(Vec::new()),
            pending_cookies: RefCell::new(initial_cookies),
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        info!("shutting down chromium process");
        {
            let mut browser = self.browser.lock().await;
            if let Err(err) = browser.close().await {
                warn!(error = %err, "failed to close browser gracefully");
            }
        }
        let handler = self.handler_task.borrow_mut().take();
        if let Some(handle) = handler {
            if let Err(err) = handle.await {
                warn!(error = %err, "browser handler join error");
            }
        }
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Session-state blob layout. Private to this driver; everyone else sees
/// opaque bytes.
#[derive(Serialize)]
struct ExportedState<'a> {
    cookies: &'a [Cookie],
}

#[derive(Deserialize)]
struct ImportedState {
    #[serde(default)]
    cookies: Vec<CookieParam>,
}

fn decode_state(bytes: &[u8]) -> DriverResult<Vec<CookieParam>> {
    let state: ImportedState = serde_json::from_slice(bytes)
        .map_err(|err| DriverError::SessionState(format!("unreadable session blob: {err}")))?;
    Ok(state.cookies)
}

struct ChromiumSession {
    browser: Arc<AsyncMutex<Browser>>,
    pages: RefCell<Vec<Page>>,
    // Cookie restore is deferred to the first page because Network.setCookies
    // needs a target to ride on.
    pending_cookies: RefCell<Option<Vec<CookieParam>>>,
}

#[async_trait(?Send)]
impl SessionHandle for ChromiumSession {
    async fn new_page(&self) -> DriverResult<Box<dyn PageHandle>> {
        let page = {
            let browser = self.browser.lock().await;
            let params = CreateTargetParams::new("about:blank");
            browser.new_page(params).await.map_err(map_cdp)?
        };
        let pending = self.pending_cookies.borrow_mut().take();
        if let Some(cookies) = pending {
            if !cookies.is_empty() {
                debug!(count = cookies.len(), "restoring persisted cookies");
                page.set_cookies(cookies).await.map_err(map_cdp)?;
            }
        }
        self.pages.borrow_mut().push(page.clone());
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn export_state(&self) -> DriverResult<Vec<u8>> {
        let page = self
            .pages
            .borrow()
            .last()
            .cloned()
            .ok_or_else(|| DriverError::SessionState("no open page to export from".to_string()))?;
        let cookies = page.get_cookies().await.map_err(map_cdp)?;
        serde_json::to_vec(&ExportedState { cookies: &cookies })
            .map_err(|err| DriverError::SessionState(format!("failed to encode blob: {err}")))
    }

    async fn close(&self) -> DriverResult<()> {
        let pages: Vec<Page> = self.pages.borrow_mut().drain(..).collect();
        for page in pages {
            if let Err(err) = page.close().await {
                debug!(error = %err, "page already gone during session close");
            }
        }
        Ok(())
    }
}

struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn eval_string(&self, script: &str) -> DriverResult<String> {
        let result = self.page.evaluate(script).await.map_err(map_cdp)?;
        result
            .into_value::<String>()
            .map_err(|err| DriverError::Evaluation(format!("unexpected script result: {err}")))
    }

    async fn find_and(&self, selector: &str, action: &str, describe: &str) -> DriverResult<()> {
        let script = format!(
            r#"(() => {{
    const el = {finder};
    if (!el) return "missing";
    {action}
    return "ok";
}})()"#,
            finder = finder_expression(selector),
            action = action,
        );
        match self.eval_string(&script).await?.as_str() {
            "ok" => Ok(()),
            _ => Err(DriverError::Evaluation(format!(
                "no element matching {selector} to {describe}"
            ))),
        }
    }
}

#[async_trait(?Send)]
impl PageHandle for ChromiumPage {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(DriverError::Configuration)?;
        self.page.goto(params).await.map_err(map_cdp)?;
        self.page.wait_for_navigation().await.map_err(map_cdp)?;
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.eval_string("window.location.href").await
    }

    async fn element_count(&self, selector: &str) -> DriverResult<usize> {
        let script = format!(
            r#"(() => {{
    try {{
        return String({count});
    }} catch (_) {{
        return "-1";
    }}
}})()"#,
            count = count_expression(selector),
        );
        let raw = self.eval_string(&script).await?;
        raw.parse::<i64>()
            .ok()
            .filter(|count| *count >= 0)
            .map(|count| count as usize)
            .ok_or_else(|| DriverError::Evaluation(format!("invalid selector: {selector}")))
    }

    async fn is_visible(&self, selector: &str) -> DriverResult<bool> {
        let script = format!(
            r#"(() => {{
    const el = {finder};
    if (!el) return "no";
    const rect = el.getBoundingClientRect();
    if (!rect || rect.width < 2 || rect.height < 2) return "no";
    const style = window.getComputedStyle(el);
    if (style.display === "none" || style.visibility === "hidden") return "no";
    return "yes";
}})()"#,
            finder = finder_expression(selector),
        );
        Ok(self.eval_string(&script).await? == "yes")
    }

    async fn click(&self, selector: &str) -> DriverResult<()> {
        self.find_and(selector, "el.click();", "click").await
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        let action = format!(
            r#"if (typeof el.focus === "function") el.focus();
    if ("value" in el) {{ el.value = {value}; }} else {{ el.textContent = {value}; }}
    el.dispatchEvent(new Event("input", {{ bubbles: true }}));
    el.dispatchEvent(new Event("change", {{ bubbles: true }}));"#,
            value = js_literal(value),
        );
        self.find_and(selector, &action, "fill").await
    }

    async fn type_text(&self, selector: &str, value: &str) -> DriverResult<()> {
        // Per-character key events so reactive editors (hashtag pickers,
        // contenteditable zones) see real typing rather than one mutation.
        let action = format!(
            r#"if (typeof el.focus === "function") el.focus();
    for (const ch of {value}) {{
        el.dispatchEvent(new KeyboardEvent("keydown", {{ key: ch, bubbles: true }}));
        if ("value" in el) {{ el.value += ch; }} else {{ el.textContent += ch; }}
        el.dispatchEvent(new Event("input", {{ bubbles: true }}));
        el.dispatchEvent(new KeyboardEvent("keyup", {{ key: ch, bubbles: true }}));
    }}
    el.dispatchEvent(new Event("change", {{ bubbles: true }}));"#,
            value = js_literal(value),
        );
        self.find_and(selector, &action, "type into").await
    }

    async fn press_key(&self, selector: &str, key: &str) -> DriverResult<()> {
        let action = format!(
            r#"const opts = {{ key: {key}, bubbles: true }};
    el.dispatchEvent(new KeyboardEvent("keydown", opts));
    el.dispatchEvent(new KeyboardEvent("keyup", opts));"#,
            key = js_literal(key),
        );
        self.find_and(selector, &action, "press key on").await
    }

    async fn set_input_files(&self, selector: &str, path: &Path) -> DriverResult<()> {
        // Some platforms keep the input hidden until a pointer hovers the
        // drop zone; unhide it so CDP can attach the file.
        let unhide = format!(
            r#"(() => {{
    const nodes = document.querySelectorAll({selector});
    nodes.forEach((input) => {{
        if (input && input.style) {{
            input.style.display = "block";
            input.style.opacity = "1";
            input.style.visibility = "visible";
        }}
    }});
    return String(nodes.length);
}})()"#,
            selector = js_literal(selector),
        );
        let _ = self.eval_string(&unhide).await;

        let document = self
            .page
            .execute(GetDocumentParams::builder().depth(0).build())
            .await
            .map_err(map_cdp)?;
        let root = document.result.root.node_id;

        let query = self
            .page
            .execute(QuerySelectorParams::new(root, selector))
            .await
            .map_err(map_cdp)?;
        let node_id = query.result.node_id;
        if *node_id.inner() <= 0 {
            return Err(DriverError::Evaluation(format!(
                "no file input matching {selector}"
            )));
        }

        let mut set_files =
            SetFileInputFilesParams::new(vec![path.to_string_lossy().into_owned()]);
        set_files.node_id = Some(node_id);
        self.page.execute(set_files).await.map_err(map_cdp)?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> DriverResult<String> {
        self.eval_string(script).await
    }

    async fn wait_for_url(
        &self,
        predicate: &dyn for<'a> Fn(&'a str) -> bool,
        timeout: Duration,
    ) -> DriverResult<String> {
        let started = Instant::now();
        loop {
            let url = self.current_url().await?;
            if predicate(&url) {
                return Ok(url);
            }
            if started.elapsed() >= timeout {
                return Err(DriverError::Timeout(format!(
                    "url match (last seen {url})"
                )));
            }
            sleep(URL_POLL_INTERVAL).await;
        }
    }
}

/// JS expression that resolves a selector to a single element or null.
/// `text=` selectors scan visible nodes and prefer the tightest match, which
/// is how button-by-label addressing stays usable on class-mangled UIs.
fn finder_expression(selector: &str) -> String {
    match selector.strip_prefix("text=") {
        Some(text) => format!(
            r#"(() => {{
    const needle = {needle};
    const nodes = document.querySelectorAll("button,[role=\"button\"],a,label,span,div,p");
    let best = null;
    let bestLen = Infinity;
    for (const node of nodes) {{
        const rect = node.getBoundingClientRect();
        if (!rect || rect.width < 2 || rect.height < 2) continue;
        const text = (node.innerText || node.textContent || "").trim();
        if (!text || !text.includes(needle)) continue;
        if (text.length < bestLen) {{
            best = node;
            bestLen = text.length;
        }}
    }}
    return best;
}})()"#,
            needle = js_literal(text.trim_matches('"')),
        ),
        None => format!("document.querySelector({})", js_literal(selector)),
    }
}

fn count_expression(selector: &str) -> String {
    match selector.strip_prefix("text=") {
        Some(_) => format!("({} ? 1 : 0)", finder_expression(selector)),
        None => format!(
            "document.querySelectorAll({}).length",
            js_literal(selector)
        ),
    }
}

fn js_literal(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn map_cdp(err: CdpError) -> DriverError {
    let text = err.to_string();
    if text.contains("closed") || text.contains("detached") || text.contains("Not attached") {
        DriverError::TargetClosed
    } else {
        DriverError::Cdp(err)
    }
}

/// Probes well-known install locations so a plain `crosspostctl` run finds
/// the local Chrome without configuration, as the upstream tooling does.
fn detect_executable() -> Option<PathBuf> {
    let candidates: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/opt/google/chrome/chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ]
    };
    candidates.iter().map(PathBuf::from).find(|path| path.exists())
}
