//! Bounded waits.
//!
//! Every wait polls an async check until it succeeds or the deadline passes,
//! then fails with [`ProbeError::Timeout`]. Check errors count as "not yet":
//! elements routinely detach and re-render while a page settles.

use std::future::Future;
use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;
use tracing::debug;

use crate::driver::PageDriver;
use crate::result::{ProbeError, ProbeResult};
use crate::selector::{CandidateList, ElementRef, Scope, Selector};

/// Default timeout for wait operations (5 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options with the given timeout
    #[must_use]
    pub const fn timeout_ms(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl From<Duration> for WaitOptions {
    fn from(timeout: Duration) -> Self {
        Self::timeout_ms(timeout.as_millis() as u64)
    }
}

/// Poll `check` until it yields a value.
///
/// The check runs at least once, even with a zero timeout. A check still
/// pending at the deadline is dropped.
pub async fn poll_for<T, F, Fut>(what: &str, options: WaitOptions, mut check: F) -> ProbeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProbeResult<Option<T>>>,
{
    let deadline = Instant::now() + options.timeout();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, check()).await {
            Ok(Ok(Some(value))) => return Ok(value),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => debug!(what, error = %e, "wait check failed, retrying"),
            Err(_) => {
                debug!(what, "wait check still pending at deadline");
                return Err(ProbeError::timeout(what, options.timeout_ms));
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(ProbeError::timeout(what, options.timeout_ms));
        }
        tokio::time::sleep(options.poll_interval().min(deadline - now)).await;
    }
}

/// Poll an async predicate until it returns true
pub async fn wait_until<F, Fut>(what: &str, options: WaitOptions, mut predicate: F) -> ProbeResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProbeResult<bool>>,
{
    poll_for(what, options, || {
        let check = predicate();
        async move { Ok(check.await?.then_some(())) }
    })
    .await
}

/// Wait until the page URL matches `pattern`; returns the URL
pub async fn wait_for_url<D>(driver: &D, pattern: &Regex, options: WaitOptions) -> ProbeResult<String>
where
    D: PageDriver + ?Sized,
{
    let what = format!("URL matching {pattern}");
    poll_for(&what, options, move || async move {
        let url = driver.current_url().await?;
        Ok(pattern.is_match(&url).then_some(url))
    })
    .await
}

/// Wait until `element` is visible
pub async fn wait_for_visible<D>(driver: &D, element: &ElementRef, options: WaitOptions) -> ProbeResult<()>
where
    D: PageDriver + ?Sized,
{
    wait_until(&format!("{element} to be visible"), options, move || {
        driver.is_visible(element)
    })
    .await
}

/// Wait until some element in `scope` containing `text` is visible
pub async fn wait_for_text<D>(
    driver: &D,
    scope: &Scope,
    text: &str,
    options: WaitOptions,
) -> ProbeResult<ElementRef>
where
    D: PageDriver + ?Sized,
{
    let candidates = CandidateList::new([Selector::text(text)]);
    wait_for_any_visible(driver, scope, &candidates, options).await
}

/// Wait until some match of any candidate is visible.
///
/// Candidates are checked in order on every poll, and every match of a
/// candidate in document order; returns the first visible one.
pub async fn wait_for_any_visible<D>(
    driver: &D,
    scope: &Scope,
    candidates: &CandidateList,
    options: WaitOptions,
) -> ProbeResult<ElementRef>
where
    D: PageDriver + ?Sized,
{
    let what = format!(
        "any of [{}] to be visible",
        candidates
            .candidates()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" | ")
    );
    poll_for(&what, options, move || async move {
        for selector in candidates.candidates() {
            let count = driver.count(scope, selector).await?;
            for index in 0..count {
                let element = ElementRef::new(scope.clone(), selector.clone()).nth(index);
                if driver.is_visible(&element).await? {
                    return Ok(Some(element));
                }
            }
        }
        Ok(None)
    })
    .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::driver::{MockDriver, MockElement};
    use std::sync::atomic::{AtomicUsize, Ordering};

    mod options_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let options = WaitOptions::new();
            assert_eq!(options.timeout_ms, 5_000);
            assert_eq!(options.poll_interval(), Duration::from_millis(50));
        }

        #[test]
        fn test_from_duration() {
            let options = WaitOptions::from(Duration::from_secs(8));
            assert_eq!(options.timeout_ms, 8_000);
        }
    }

    mod wait_until_tests {
        use super::*;

        #[tokio::test]
        async fn test_immediate_success() {
            wait_until("ready", WaitOptions::timeout_ms(0), || async { Ok(true) })
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn test_succeeds_after_retries() {
            let calls = AtomicUsize::new(0);
            wait_until("third call", WaitOptions::timeout_ms(1_000).with_poll_interval(1), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n >= 2) }
            })
            .await
            .unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), 3);
        }

        #[tokio::test]
        async fn test_errors_are_retried() {
            let calls = AtomicUsize::new(0);
            wait_until("flaky", WaitOptions::timeout_ms(1_000).with_poll_interval(1), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ProbeError::page("detached"))
                    } else {
                        Ok(true)
                    }
                }
            })
            .await
            .unwrap();
        }

        #[tokio::test]
        async fn test_timeout() {
            let err = wait_until("never", WaitOptions::timeout_ms(200), || async { Ok(false) })
                .await
                .unwrap_err();
            assert!(err.is_timeout());
            assert_eq!(err.to_string(), "Timed out after 200ms waiting for never");
        }

        #[tokio::test]
        async fn test_hung_check_is_bounded() {
            let started = Instant::now();
            let err = wait_until("hung driver", WaitOptions::timeout_ms(100), || {
                std::future::pending::<ProbeResult<bool>>()
            })
            .await
            .unwrap_err();
            assert!(err.is_timeout());
            assert!(started.elapsed() < Duration::from_secs(5));
        }
    }

    mod page_wait_tests {
        use super::*;

        #[tokio::test]
        async fn test_wait_for_url() {
            let driver = MockDriver::new().with_url("https://app.test/recipe/abc_123");
            let pattern = Regex::new(r"/recipe/[A-Za-z0-9_-]+$").unwrap();
            let url = wait_for_url(&driver, &pattern, WaitOptions::timeout_ms(10))
                .await
                .unwrap();
            assert_eq!(url, "https://app.test/recipe/abc_123");
        }

        #[tokio::test]
        async fn test_wait_for_url_timeout() {
            let driver = MockDriver::new().with_url("https://app.test/submit-recipe");
            let pattern = Regex::new(r"/recipe/[A-Za-z0-9_-]+$").unwrap();
            let err = wait_for_url(&driver, &pattern, WaitOptions::timeout_ms(100))
                .await
                .unwrap_err();
            assert!(err.is_timeout());
        }

        #[tokio::test]
        async fn test_wait_for_any_visible_skips_hidden() {
            let driver = MockDriver::new()
                .with_element("[data-testid=\"browse-list\"]", MockElement::hidden())
                .with_element("a[href^=\"/recipe/\"]", MockElement::visible());
            let candidates =
                CandidateList::css(["[data-testid=\"browse-list\"]", "a[href^=\"/recipe/\"]"]);
            let element = wait_for_any_visible(&driver, &Scope::Page, &candidates, WaitOptions::timeout_ms(10))
                .await
                .unwrap();
            assert_eq!(element.selector, Selector::css("a[href^=\"/recipe/\"]"));
        }

        #[tokio::test]
        async fn test_wait_for_any_visible_finds_later_match() {
            let driver = MockDriver::new().with_element("text=Browse Recipes", MockElement::hidden());
            driver.push_element("text=Browse Recipes", MockElement::visible());
            let candidates = CandidateList::new([Selector::text("Browse Recipes")]);
            let element = wait_for_any_visible(&driver, &Scope::Page, &candidates, WaitOptions::timeout_ms(10))
                .await
                .unwrap();
            assert_eq!(element.index, 1);
        }

        #[tokio::test]
        async fn test_wait_for_text() {
            let driver = MockDriver::new()
                .with_element("text=no recipes", MockElement::visible().with_text("No recipes yet"));
            let element = wait_for_text(&driver, &Scope::Page, "no recipes", WaitOptions::timeout_ms(10))
                .await
                .unwrap();
            assert_eq!(element.selector, Selector::text("no recipes"));
        }

        #[tokio::test]
        async fn test_wait_for_visible_timeout() {
            let driver = MockDriver::new().with_element("h1", MockElement::hidden());
            let h1 = ElementRef::page(Selector::css("h1"));
            let err = wait_for_visible(&driver, &h1, WaitOptions::timeout_ms(100))
                .await
                .unwrap_err();
            assert!(err.is_timeout());
        }
    }
}
