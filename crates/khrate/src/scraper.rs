use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::browser::{
    BrowserError, BrowserLauncher, ChromeLauncher, LaunchSettings, PageSession, submit_and_wait,
    with_session,
};
use crate::parser::{ExtractError, parse_nbc_rates, parse_nssf_rate, parse_tax_rates};
use crate::recipe::Recipes;
use crate::types::{NbcRates, NssfRate, Source, TaxExchangeRate};

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("Browser task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ScraperError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ScraperError::Browser(BrowserError::Timeout(_)))
    }

    pub fn is_frame_detached(&self) -> bool {
        matches!(self, ScraperError::Browser(BrowserError::FrameDetached))
    }

    pub fn is_extraction(&self) -> bool {
        matches!(
            self,
            ScraperError::Extract(_) | ScraperError::Browser(BrowserError::Element(_))
        )
    }
}

#[derive(Debug, Clone)]
pub struct ScraperSettings {
    pub chrome_executable: Option<PathBuf>,
    /// Bound on every page load and readiness wait.
    pub render_timeout: Duration,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            render_timeout: Duration::from_secs(30),
        }
    }
}

/// Scrapes the three rate sources. Every call runs in its own browser
/// session; nothing is cached between calls.
#[derive(Clone)]
pub struct RateScraper {
    launcher: Arc<dyn BrowserLauncher>,
    recipes: Arc<Recipes>,
    render_timeout: Duration,
}

impl RateScraper {
    pub fn new(
        launcher: impl BrowserLauncher + 'static,
        recipes: Recipes,
        render_timeout: Duration,
    ) -> Self {
        Self {
            launcher: Arc::new(launcher),
            recipes: Arc::new(recipes),
            render_timeout,
        }
    }

    pub fn with_chrome(recipes: Recipes, settings: ScraperSettings) -> Self {
        Self::new(
            ChromeLauncher::new(settings.chrome_executable),
            recipes,
            settings.render_timeout,
        )
    }

    /// Central bank rates for `date` (`YYYY-MM-DD`). The date is echoed back
    /// verbatim in the result.
    pub async fn fetch_nbc_rates(&self, date: &str) -> Result<NbcRates, ScraperError> {
        log::info!("Fetching {} rates for {}...", Source::Nbc, date);
        let recipe = self.recipes.nbc.clone();
        let date_filter = date.to_string();

        let html = self
            .render(Source::Nbc, move |session, timeout| {
                if let Some(user_agent) = &recipe.user_agent {
                    session.set_user_agent(user_agent)?;
                }
                session.navigate(&recipe.url)?;
                session.wait_for(&recipe.date_input, timeout)?;
                session.fill(&recipe.date_input, &date_filter)?;
                submit_and_wait(session, &recipe.submit, &recipe.ready_selector, timeout)
            })
            .await?;

        let (value, official_exchange_rate) = parse_nbc_rates(&html, &self.recipes.nbc)
            .inspect_err(|e| log::error!("Failed to parse NBC page: {e}"))?;

        Ok(NbcRates {
            ok: true,
            value,
            official_exchange_rate,
            date: date.to_string(),
        })
    }

    pub async fn fetch_nssf_rate(&self) -> Result<NssfRate, ScraperError> {
        log::info!("Fetching {} rate...", Source::Nssf);
        let recipe = self.recipes.nssf.clone();

        let html = self
            .render(Source::Nssf, move |session, timeout| {
                session.navigate(&recipe.url)?;
                session.wait_for(&recipe.ready_selector, timeout)
            })
            .await?;

        Ok(parse_nssf_rate(&html, &self.recipes.nssf)
            .inspect_err(|e| log::error!("Failed to parse NSSF page: {e}"))?)
    }

    pub async fn fetch_tax_rates(&self) -> Result<TaxExchangeRate, ScraperError> {
        log::info!("Fetching {} rates...", Source::Tax);
        let recipe = self.recipes.tax.clone();

        let html = self
            .render(Source::Tax, move |session, timeout| {
                session.navigate(&recipe.url)?;
                session.wait_for(&recipe.ready_selector, timeout)
            })
            .await?;

        Ok(parse_tax_rates(&html, &self.recipes.tax)
            .inspect_err(|e| log::error!("Failed to parse tax page: {e}"))?)
    }

    /// Runs `steps` in a fresh session on a blocking thread and returns the
    /// rendered HTML.
    async fn render<F>(&self, source: Source, steps: F) -> Result<String, ScraperError>
    where
        F: FnOnce(&mut dyn PageSession, Duration) -> Result<(), BrowserError> + Send + 'static,
    {
        let launcher = Arc::clone(&self.launcher);
        let settings = LaunchSettings {
            navigation_timeout: self.render_timeout,
        };

        let html = tokio::task::spawn_blocking(move || {
            with_session(&*launcher, &settings, |session| {
                steps(&mut *session, settings.navigation_timeout)?;
                session.content()
            })
        })
        .await
        .inspect_err(|e| log::error!("{source} browser task failed: {e}"))?
        .inspect_err(|e| log::error!("{source} browser error: {e}"))?;

        log::debug!("Rendered {} bytes from {}", html.len(), source.slug());
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        launches: AtomicUsize,
        closes: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    impl Counters {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    struct FakeLauncher {
        html: String,
        fail_navigate: Option<BrowserError>,
        click_navigates: bool,
        counters: Arc<Counters>,
    }

    struct FakeSession {
        html: String,
        fail_navigate: Option<BrowserError>,
        click_navigates: bool,
        marked: bool,
        counters: Arc<Counters>,
    }

    impl BrowserLauncher for FakeLauncher {
        fn launch(&self, _: &LaunchSettings) -> Result<Box<dyn PageSession>, BrowserError> {
            self.counters.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession {
                html: self.html.clone(),
                fail_navigate: self.fail_navigate.clone(),
                click_navigates: self.click_navigates,
                marked: false,
                counters: Arc::clone(&self.counters),
            }))
        }
    }

    impl PageSession for FakeSession {
        fn set_user_agent(&mut self, user_agent: &str) -> Result<(), BrowserError> {
            self.counters.record(format!("user_agent {user_agent}"));
            Ok(())
        }
        fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
            self.counters.record(format!("navigate {url}"));
            match self.fail_navigate.clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
        fn wait_for(&mut self, selector: &str, _: Duration) -> Result<(), BrowserError> {
            self.counters.record(format!("wait_for {selector}"));
            Ok(())
        }
        fn fill(&mut self, selector: &str, value: &str) -> Result<(), BrowserError> {
            self.counters.record(format!("fill {selector} {value}"));
            Ok(())
        }
        fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
            self.counters.record(format!("click {selector}"));
            if self.click_navigates {
                self.marked = false;
            }
            Ok(())
        }
        fn mark_document(&mut self) -> Result<(), BrowserError> {
            self.marked = true;
            Ok(())
        }
        fn document_marked(&mut self) -> Result<bool, BrowserError> {
            Ok(self.marked)
        }
        fn content(&mut self) -> Result<String, BrowserError> {
            Ok(self.html.clone())
        }
        fn close(self: Box<Self>) -> Result<(), BrowserError> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn scraper(html: &str, fail_navigate: Option<BrowserError>) -> (RateScraper, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let launcher = FakeLauncher {
            html: html.to_string(),
            fail_navigate,
            click_navigates: true,
            counters: Arc::clone(&counters),
        };
        (
            RateScraper::new(launcher, Recipes::default(), Duration::from_secs(1)),
            counters,
        )
    }

    fn assert_released_once(counters: &Counters) {
        assert_eq!(counters.launches.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_nbc_rates_fills_date_and_echoes_it() {
        let html =
            fs::read_to_string("fixtures/nbc_exchange_rate.html").expect("Failed to read fixture");
        let (scraper, counters) = scraper(&html, None);

        let rates = scraper.fetch_nbc_rates("2024-01-15").await.unwrap();

        assert!(rates.ok);
        assert_eq!(rates.date, "2024-01-15");
        assert_eq!(rates.value.len(), 3);
        assert_eq!(rates.official_exchange_rate, Some(4100));
        assert_released_once(&counters);

        let calls = counters.calls.lock().unwrap().clone();
        assert!(calls[0].starts_with("user_agent Mozilla/5.0"));
        assert!(calls.contains(&"fill #datepicker 2024-01-15".to_string()));
        assert!(calls.contains(&r#"click input[name="view"]"#.to_string()));
        assert_eq!(calls.last().unwrap(), "wait_for table.tbl-responsive");
    }

    #[tokio::test]
    async fn test_nbc_submit_without_reload_times_out() {
        let html =
            fs::read_to_string("fixtures/nbc_exchange_rate.html").expect("Failed to read fixture");
        let counters = Arc::new(Counters::default());
        let launcher = FakeLauncher {
            html,
            fail_navigate: None,
            click_navigates: false,
            counters: Arc::clone(&counters),
        };
        let scraper = RateScraper::new(launcher, Recipes::default(), Duration::from_millis(300));

        let err = scraper.fetch_nbc_rates("2024-01-15").await.unwrap_err();

        assert!(err.is_timeout());
        assert_released_once(&counters);
        let calls = counters.calls.lock().unwrap().clone();
        assert_eq!(calls.last().unwrap(), r#"click input[name="view"]"#);
    }

    #[tokio::test]
    async fn test_nssf_keeps_default_user_agent() {
        let html = fs::read_to_string("fixtures/nssf_home.html").expect("Failed to read fixture");
        let (scraper, counters) = scraper(&html, None);

        let rate = scraper.fetch_nssf_rate().await.unwrap();

        assert_eq!(rate.exchange_month, "2024-1");
        assert_released_once(&counters);
        let calls = counters.calls.lock().unwrap().clone();
        assert!(calls.iter().all(|c| !c.starts_with("user_agent")));
    }

    #[tokio::test]
    async fn test_navigation_timeout_releases_session() {
        let (scraper, counters) = scraper(
            "",
            Some(BrowserError::Timeout("navigation".into())),
        );

        let err = scraper.fetch_tax_rates().await.unwrap_err();

        assert!(err.is_timeout());
        assert!(!err.is_frame_detached());
        assert_released_once(&counters);
    }

    #[tokio::test]
    async fn test_frame_detached_is_reported() {
        let (scraper, counters) = scraper("", Some(BrowserError::FrameDetached));

        let err = scraper.fetch_nbc_rates("2024-01-15").await.unwrap_err();

        assert!(err.is_frame_detached());
        assert_released_once(&counters);
    }

    #[tokio::test]
    async fn test_extraction_failure_releases_session() {
        let (scraper, counters) = scraper("<html><body>maintenance</body></html>", None);

        let err = scraper.fetch_nssf_rate().await.unwrap_err();

        assert!(err.is_extraction());
        assert!(!err.is_timeout());
        assert_released_once(&counters);
    }

    #[tokio::test]
    async fn test_each_request_gets_its_own_session() {
        let html =
            fs::read_to_string("fixtures/tax_exchange_rate.html").expect("Failed to read fixture");
        let (scraper, counters) = scraper(&html, None);

        let (a, b) = tokio::join!(scraper.fetch_tax_rates(), scraper.fetch_tax_rates());

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(counters.launches.load(Ordering::SeqCst), 2);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 2);
    }
}
