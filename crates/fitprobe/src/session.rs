//! Scenario sessions.
//!
//! A [`Session`] owns one page context for the length of one scenario.
//! [`with_session`] runs a scenario body under a deadline and closes the
//! driver on every exit path: success, error or timeout.
//!
//! ```ignore
//! let status = with_session(driver, config, Duration::from_secs(30), |session| {
//!     Box::pin(async move {
//!         session.login().await?;
//!         session.goto("submit-recipe").await
//!     })
//! })
//! .await;
//! ```

use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::config::ProbeConfig;
use crate::driver::PageDriver;
use crate::intercept::ResponseWatch;
use crate::result::{ProbeError, ProbeResult};
use crate::selector::{resolve, CandidateList, ElementRef, Scope, Selector};
use crate::wait::{wait_for_any_visible, WaitOptions};

/// Email field on the login form
pub fn email_field() -> CandidateList {
    CandidateList::css([r#"input[name="email"]"#, r#"input[type="email"]"#])
}

/// Password field on the login form
pub fn password_field() -> CandidateList {
    CandidateList::css([r#"input[name="password"]"#, r#"input[type="password"]"#])
}

/// Submit control of any form
pub fn submit_button() -> CandidateList {
    CandidateList::css([r#"button[type="submit"]"#, r#"input[type="submit"]"#])
}

/// Anything that proves the browse page rendered after login
pub fn browse_markers() -> CandidateList {
    CandidateList::new([
        Selector::text("browse recipes"),
        Selector::css_with_text("button", "filter"),
        Selector::test_id("browse-list"),
        Selector::test_id("recipe-card"),
    ])
}

/// One page context, owned for the length of a scenario
#[derive(Debug)]
pub struct Session<D: PageDriver> {
    driver: D,
    config: ProbeConfig,
    logged_in: bool,
    login_watch: Option<ResponseWatch>,
}

impl<D: PageDriver> Session<D> {
    /// Wrap a freshly launched driver
    #[must_use]
    pub const fn new(driver: D, config: ProbeConfig) -> Self {
        Self {
            driver,
            config,
            logged_in: false,
            login_watch: None,
        }
    }

    /// The page driver
    #[must_use]
    pub const fn driver(&self) -> &D {
        &self.driver
    }

    /// The page driver, mutably
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Run configuration
    #[must_use]
    pub const fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Whether [`Session::login`] succeeded
    #[must_use]
    pub const fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    /// Wait options bounded by the element timeout
    #[must_use]
    pub fn element_wait(&self) -> WaitOptions {
        self.config.timeouts.element().into()
    }

    /// Navigate to an app path relative to the base URL
    pub async fn goto(&mut self, path: &str) -> ProbeResult<()> {
        let url = self.config.url(path);
        let limit = self.config.timeouts.navigation();
        debug!(%url, "navigating");
        tokio::time::timeout(limit, self.driver.navigate(&url))
            .await
            .map_err(|_| ProbeError::timeout(format!("navigation to {url}"), limit.as_millis() as u64))?
    }

    /// Current page URL
    pub async fn current_url(&self) -> ProbeResult<String> {
        self.driver.current_url().await
    }

    /// Resolve a candidate chain on the whole page
    pub async fn resolve(&self, candidates: &CandidateList) -> ProbeResult<ElementRef> {
        resolve(&self.driver, candidates, &Scope::Page).await
    }

    /// Wait until the first match of any candidate is visible
    pub async fn wait_visible(
        &self,
        candidates: &CandidateList,
        timeout: Duration,
    ) -> ProbeResult<ElementRef> {
        wait_for_any_visible(&self.driver, &Scope::Page, candidates, timeout.into()).await
    }

    /// Fill the login form on the current page and submit it
    pub async fn submit_credentials(&mut self, email: &str, password: &str) -> ProbeResult<()> {
        let wait = self.element_wait();
        let email_input =
            wait_for_any_visible(&self.driver, &Scope::Page, &email_field(), wait).await?;
        self.driver.fill(&email_input, email).await?;
        let password_input = self.resolve(&password_field()).await?;
        self.driver.fill(&password_input, password).await?;
        let submit = self.resolve(&submit_button()).await?;
        self.driver.click(&submit).await
    }

    /// Log in with the configured credentials and wait for the browse page.
    ///
    /// The login API response is watched; a non-2xx answer fails the login
    /// with its status and the start of its body.
    ///
    /// # Errors
    ///
    /// [`ProbeError::Config`] without credentials,
    /// [`ProbeError::AssertionFailed`] when the login API rejects the
    /// credentials, [`ProbeError::Timeout`] when no post-login marker shows up.
    pub async fn login(&mut self) -> ProbeResult<()> {
        let credentials = self.config.credentials()?.clone();
        if self.login_watch.is_none() {
            let watch = ResponseWatch::login();
            watch.install(&mut self.driver).await?;
            self.login_watch = Some(watch);
        }
        self.goto("auth").await?;
        self.submit_credentials(&credentials.email, &credentials.password)
            .await?;
        let marker = self
            .wait_visible(&browse_markers(), self.config.timeouts.login())
            .await;
        if let Some(failure) = self.rejected_login().await {
            return Err(failure);
        }
        let marker = marker?;
        self.logged_in = true;
        info!(email = %credentials.email, %marker, "logged in");
        Ok(())
    }

    /// Failure for a recorded non-2xx login response, if any
    async fn rejected_login(&self) -> Option<ProbeError> {
        let watch = self.login_watch.as_ref()?;
        let responses = match watch.responses(&self.driver).await {
            Ok(responses) => responses,
            Err(e) => {
                debug!(error = %e, "login responses unreadable");
                return None;
            }
        };
        let response = responses.into_iter().next().filter(|r| !r.is_ok())?;
        Some(ProbeError::assertion(format!(
            "Login failed: HTTP {} \u{2013} {}",
            response.status, response.body
        )))
    }

    /// Close the page and browser
    pub async fn close(mut self) -> ProbeResult<()> {
        self.driver.close().await
    }
}

/// Run `body` against a new session and always close the driver.
///
/// The body is bounded by `limit`; expiry becomes [`ProbeError::Timeout`].
/// A failure to close is logged and does not mask the body's result.
pub async fn with_session<D, T, F>(
    driver: D,
    config: ProbeConfig,
    limit: Duration,
    body: F,
) -> ProbeResult<T>
where
    D: PageDriver,
    F: for<'a> FnOnce(&'a mut Session<D>) -> BoxFuture<'a, ProbeResult<T>>,
{
    let mut session = Session::new(driver, config);
    let outcome = match tokio::time::timeout(limit, body(&mut session)).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::timeout("scenario", limit.as_millis() as u64)),
    };
    if let Err(e) = session.driver.close().await {
        warn!(error = %e, "failed to close session");
    }
    outcome
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Timeouts;
    use crate::driver::{MockDriver, MockElement};

    fn config() -> ProbeConfig {
        ProbeConfig::new()
            .with_base_url("https://app.test")
            .unwrap()
            .with_credentials("qa@example.com", "secret")
            .with_timeouts(Timeouts::uniform(50))
    }

    fn login_page() -> MockDriver {
        MockDriver::new()
            .with_element(r#"input[name="email"]"#, MockElement::visible())
            .with_element(r#"input[name="password"]"#, MockElement::visible())
            .with_element(r#"button[type="submit"]"#, MockElement::visible())
            .with_click_navigation(r#"button[type="submit"]"#, "https://app.test/")
            .with_element(
                "text=browse recipes",
                MockElement::visible().with_text("Browse Recipes"),
            )
    }

    mod navigation_tests {
        use super::*;

        #[tokio::test]
        async fn test_goto_joins_base_url() {
            let mut session = Session::new(MockDriver::new(), config());
            session.goto("submit-recipe").await.unwrap();
            assert_eq!(
                session.current_url().await.unwrap(),
                "https://app.test/submit-recipe"
            );
        }
    }

    mod login_tests {
        use super::*;

        #[tokio::test]
        async fn test_login_fills_and_waits_for_marker() {
            let mut session = Session::new(login_page(), config());
            session.login().await.unwrap();
            assert!(session.is_logged_in());
            assert_eq!(session.current_url().await.unwrap(), "https://app.test/");
            let history = session.driver().history();
            assert!(history.contains(&"navigate:https://app.test/auth".to_string()));
            assert!(history.iter().any(|h| h.starts_with("click:button")));
        }

        #[tokio::test]
        async fn test_login_without_credentials() {
            let config = ProbeConfig::new().with_timeouts(Timeouts::uniform(50));
            let mut session = Session::new(login_page(), config);
            let err = session.login().await.unwrap_err();
            assert!(matches!(err, ProbeError::Config { .. }));
            assert!(!session.driver().was_called("navigate"));
        }

        #[tokio::test]
        async fn test_login_installs_response_watch_before_navigation() {
            let mut session = Session::new(login_page(), config());
            session.login().await.unwrap();
            let history = session.driver().history();
            let installed = history.iter().position(|c| c == "add_init_script").unwrap();
            let navigated = history.iter().position(|c| c.starts_with("navigate:")).unwrap();
            assert!(installed < navigated);
            let scripts = session.driver().init_scripts();
            assert_eq!(scripts.len(), 1);
            assert!(scripts[0].contains("/auth/login"));
        }

        #[tokio::test]
        async fn test_login_reports_rejected_response() {
            let driver = MockDriver::new()
                .with_element(r#"input[name="email"]"#, MockElement::visible())
                .with_element(r#"input[name="password"]"#, MockElement::visible())
                .with_element(r#"button[type="submit"]"#, MockElement::visible())
                .with_eval_result(serde_json::json!([{
                    "url": "https://api.test/api/v1/auth/login",
                    "status": 401,
                    "body": "{\"message\":\"Invalid credentials\"}"
                }]));
            let mut session = Session::new(driver, config());
            let err = session.login().await.unwrap_err();
            assert!(matches!(err, ProbeError::AssertionFailed { .. }));
            assert_eq!(
                err.to_string(),
                "Assertion failed: Login failed: HTTP 401 \u{2013} {\"message\":\"Invalid credentials\"}"
            );
            assert!(!session.is_logged_in());
        }

        #[tokio::test]
        async fn test_login_accepts_ok_response() {
            let driver = login_page().with_eval_result(serde_json::json!([
                {"url": "https://api.test/auth/login", "status": 200, "body": "{}"}
            ]));
            let mut session = Session::new(driver, config());
            session.login().await.unwrap();
            assert!(session.is_logged_in());
        }

        #[tokio::test]
        async fn test_login_ignores_unreadable_responses() {
            let driver = login_page().with_eval_result(serde_json::json!("not a list"));
            let mut session = Session::new(driver, config());
            session.login().await.unwrap();
        }

        #[tokio::test]
        async fn test_login_times_out_without_marker() {
            let driver = MockDriver::new()
                .with_element(r#"input[name="email"]"#, MockElement::visible())
                .with_element(r#"input[name="password"]"#, MockElement::visible())
                .with_element(r#"button[type="submit"]"#, MockElement::visible());
            let mut session = Session::new(driver, config());
            let err = session.login().await.unwrap_err();
            assert!(err.is_timeout());
            assert!(!session.is_logged_in());
        }
    }

    mod teardown_tests {
        use super::*;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        #[tokio::test]
        async fn test_closes_after_success() {
            let closed = Arc::new(AtomicBool::new(false));
            let driver = MockDriver::new().with_close_signal(Arc::clone(&closed));
            let visited = with_session(driver, config(), Duration::from_secs(1), |s| {
                Box::pin(async move {
                    s.goto("auth").await?;
                    s.current_url().await
                })
            })
            .await
            .unwrap();
            assert_eq!(visited, "https://app.test/auth");
            assert!(closed.load(Ordering::SeqCst));
        }

        #[tokio::test]
        async fn test_closes_after_error() {
            let closed = Arc::new(AtomicBool::new(false));
            let driver = MockDriver::new().with_close_signal(Arc::clone(&closed));
            let err = with_session(driver, config(), Duration::from_secs(1), |s| {
                Box::pin(async move {
                    s.resolve(&CandidateList::css(["#missing"])).await?;
                    Ok(())
                })
            })
            .await
            .unwrap_err();
            assert!(err.is_no_match());
            assert!(closed.load(Ordering::SeqCst));
        }

        #[tokio::test]
        async fn test_times_out_scenario() {
            let closed = Arc::new(AtomicBool::new(false));
            let driver = MockDriver::new().with_close_signal(Arc::clone(&closed));
            let err = with_session(driver, config(), Duration::from_millis(20), |_s| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                })
            })
            .await
            .unwrap_err();
            assert!(matches!(err, ProbeError::Timeout { ref what, ms: 20 } if what == "scenario"));
            assert!(closed.load(Ordering::SeqCst));
        }
    }
}
