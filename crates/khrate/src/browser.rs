//! Headless browser sessions.
//!
//! Scrapers talk to the browser through [`BrowserLauncher`] and
//! [`PageSession`] so the page flow can be exercised without Chrome. The
//! calls are blocking and are expected to run on a blocking thread.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use headless_chrome::{Browser, LaunchOptions, Tab};

const FRAME_DETACHED: &str = "Navigating frame was detached";

const DOCUMENT_MARKER: &str = "window.__khrateStaleDocument";

const RELOAD_POLL_INTERVAL: Duration = Duration::from_millis(100);

const LAUNCH_FLAGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--single-process",
    "--no-zygote",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),
    #[error("Timed out waiting for {0}")]
    Timeout(String),
    #[error("Navigating frame was detached")]
    FrameDetached,
    #[error("Navigation failed: {0}")]
    Navigation(String),
    #[error("Element not found: {0}")]
    Element(String),
    #[error("Browser protocol error: {0}")]
    Protocol(String),
}

impl BrowserError {
    fn classify(err: anyhow::Error) -> Self {
        let detached = err.chain().any(|cause| {
            let cause = cause.to_string();
            cause == FRAME_DETACHED || cause == format!("Navigate failed: {FRAME_DETACHED}")
        });
        if detached {
            return BrowserError::FrameDetached;
        }

        let message = format!("{err:#}");
        let lower = message.to_lowercase();
        if err.downcast_ref::<headless_chrome::util::Timeout>().is_some()
            || lower.contains("timed out")
            || lower.contains("timeout")
        {
            BrowserError::Timeout(message)
        } else if lower.contains("navigate failed") || lower.contains("net::err_") {
            BrowserError::Navigation(message)
        } else {
            BrowserError::Protocol(message)
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaunchSettings {
    /// Upper bound for page loads and readiness waits.
    pub navigation_timeout: Duration,
}

pub trait BrowserLauncher: Send + Sync {
    fn launch(&self, settings: &LaunchSettings) -> Result<Box<dyn PageSession>, BrowserError>;
}

/// One isolated, non-persistent browser tab.
pub trait PageSession {
    fn set_user_agent(&mut self, user_agent: &str) -> Result<(), BrowserError>;
    /// Loads `url` and returns once the navigation has finished.
    fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;
    /// Blocks until `selector` matches an element or `timeout` expires.
    fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError>;
    /// Sets the `value` property of the first element matching `selector`.
    fn fill(&mut self, selector: &str, value: &str) -> Result<(), BrowserError>;
    /// Clicks the first element matching `selector`. Does not wait for any
    /// navigation it triggers; see [`submit_and_wait`].
    fn click(&mut self, selector: &str) -> Result<(), BrowserError>;
    /// Tags the current document so a later reload can be told apart.
    fn mark_document(&mut self) -> Result<(), BrowserError>;
    /// Whether the current document still carries the tag set by
    /// [`PageSession::mark_document`].
    fn document_marked(&mut self) -> Result<bool, BrowserError>;
    /// Serialized DOM of the current page.
    fn content(&mut self) -> Result<String, BrowserError>;
    fn close(self: Box<Self>) -> Result<(), BrowserError>;
}

/// Runs `f` inside a fresh session and releases the session exactly once,
/// whatever `f` returns. A failed close is logged and does not replace the
/// result of `f`.
pub fn with_session<T, E, F>(
    launcher: &dyn BrowserLauncher,
    settings: &LaunchSettings,
    f: F,
) -> Result<T, E>
where
    E: From<BrowserError>,
    F: FnOnce(&mut dyn PageSession) -> Result<T, E>,
{
    let mut session = launcher.launch(settings)?;
    let result = f(session.as_mut());
    if let Err(e) = session.close() {
        log::warn!("Failed to close browser session: {e}");
    }
    result
}

/// Clicks `submit` and waits until the click has replaced the current
/// document and `ready_selector` matches in the new one. Fails with
/// [`BrowserError::Timeout`] if the page is still the old one once `timeout`
/// has elapsed.
pub fn submit_and_wait(
    session: &mut dyn PageSession,
    submit: &str,
    ready_selector: &str,
    timeout: Duration,
) -> Result<(), BrowserError> {
    let deadline = Instant::now() + timeout;
    session.mark_document()?;
    session.click(submit)?;

    loop {
        match session.document_marked() {
            Ok(false) => break,
            Ok(true) => {}
            // Evaluation fails while the old document is being torn down.
            Err(e) => log::debug!("Document check failed during reload: {e}"),
        }
        if Instant::now() >= deadline {
            return Err(BrowserError::Timeout(format!(
                "a new document after clicking '{submit}'"
            )));
        }
        std::thread::sleep(RELOAD_POLL_INTERVAL);
    }

    session.wait_for(
        ready_selector,
        deadline.saturating_duration_since(Instant::now()),
    )
}

/// Launches a local headless Chrome per session.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    executable: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }
}

impl BrowserLauncher for ChromeLauncher {
    fn launch(&self, settings: &LaunchSettings) -> Result<Box<dyn PageSession>, BrowserError> {
        log::debug!("Launching headless Chrome");

        let options = LaunchOptions {
            headless: true,
            sandbox: false,
            path: self.executable.clone(),
            args: LAUNCH_FLAGS.iter().map(|flag| OsStr::new(*flag)).collect(),
            idle_browser_timeout: settings.navigation_timeout.saturating_mul(2),
            ..Default::default()
        };

        let browser = Browser::new(options)
            .map_err(|e| BrowserError::Launch(format!("{e:#}")))
            .inspect_err(|e| log::error!("{e}"))?;
        let tab = browser
            .new_tab()
            .map_err(|e| BrowserError::Launch(format!("{e:#}")))?;
        tab.set_default_timeout(settings.navigation_timeout);

        Ok(Box::new(ChromeSession { browser, tab }))
    }
}

struct ChromeSession {
    browser: Browser,
    tab: Arc<Tab>,
}

impl PageSession for ChromeSession {
    fn set_user_agent(&mut self, user_agent: &str) -> Result<(), BrowserError> {
        self.tab
            .set_user_agent(user_agent, None, None)
            .map_err(BrowserError::classify)
    }

    fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        log::debug!("Navigating to {url}");
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map(|_| ())
            .map_err(BrowserError::classify)
    }

    fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        log::debug!("Waiting up to {timeout:?} for '{selector}'");
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map(|_| ())
            .map_err(|e| match BrowserError::classify(e) {
                BrowserError::Timeout(_) => BrowserError::Timeout(format!("'{selector}'")),
                other => other,
            })
    }

    fn fill(&mut self, selector: &str, value: &str) -> Result<(), BrowserError> {
        log::debug!("Setting '{selector}' to {value:?}");
        let element = self
            .tab
            .find_element(selector)
            .map_err(|_| BrowserError::Element(selector.to_string()))?;
        element
            .call_js_fn(
                "function(value) { this.value = value; }",
                vec![serde_json::Value::from(value)],
                false,
            )
            .map(|_| ())
            .map_err(BrowserError::classify)
    }

    fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        log::debug!("Clicking '{selector}'");
        let element = self
            .tab
            .find_element(selector)
            .map_err(|_| BrowserError::Element(selector.to_string()))?;
        element
            .click()
            .map(|_| ())
            .map_err(BrowserError::classify)
    }

    fn mark_document(&mut self) -> Result<(), BrowserError> {
        self.tab
            .evaluate(&format!("{DOCUMENT_MARKER} = true"), false)
            .map(|_| ())
            .map_err(BrowserError::classify)
    }

    fn document_marked(&mut self) -> Result<bool, BrowserError> {
        let result = self
            .tab
            .evaluate(&format!("{DOCUMENT_MARKER} === true"), false)
            .map_err(BrowserError::classify)?;
        Ok(result.value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    fn content(&mut self) -> Result<String, BrowserError> {
        self.tab.get_content().map_err(BrowserError::classify)
    }

    fn close(self: Box<Self>) -> Result<(), BrowserError> {
        let ChromeSession { browser, tab } = *self;
        let closed = tab.close(false).map_err(BrowserError::classify);
        // Dropping the browser kills the Chrome process.
        drop(browser);
        log::debug!("Browser session closed");
        closed.map(|_| ())
    }
}
