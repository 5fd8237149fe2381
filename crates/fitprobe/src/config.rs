//! Run configuration.
//!
//! Built from the process environment (`BASE_URL`, `TEST_EMAIL`,
//! `TEST_PASSWORD`, `CHROMIUM_PATH`, `HEADLESS`) through an injectable lookup,
//! then adjusted with `with_*` setters.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::result::{ProbeError, ProbeResult};

/// Deployment targeted when `BASE_URL` is unset
pub const DEFAULT_BASE_URL: &str = "https://fitrecipes-staging.vercel.app/";

/// Login credentials for the target application
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account email
    pub email: String,
    /// Account password (never serialized)
    #[serde(skip_serializing, default)]
    pub password: String,
}

impl Credentials {
    /// Create credentials
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Bounds for every wait, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Page navigation
    pub navigation_ms: u64,
    /// Element appearance
    pub element_ms: u64,
    /// First recipe link on the browse page
    pub detail_link_ms: u64,
    /// Redirect after submitting a form
    pub redirect_ms: u64,
    /// Post-login marker
    pub login_ms: u64,
    /// Whole scenario
    pub scenario_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation_ms: 30_000,
            element_ms: 5_000,
            detail_link_ms: 8_000,
            redirect_ms: 8_000,
            login_ms: 10_000,
            scenario_ms: 30_000,
        }
    }
}

impl Timeouts {
    /// Navigation timeout
    #[must_use]
    pub const fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    /// Element timeout
    #[must_use]
    pub const fn element(&self) -> Duration {
        Duration::from_millis(self.element_ms)
    }

    /// Detail-link timeout
    #[must_use]
    pub const fn detail_link(&self) -> Duration {
        Duration::from_millis(self.detail_link_ms)
    }

    /// Redirect timeout
    #[must_use]
    pub const fn redirect(&self) -> Duration {
        Duration::from_millis(self.redirect_ms)
    }

    /// Login timeout
    #[must_use]
    pub const fn login(&self) -> Duration {
        Duration::from_millis(self.login_ms)
    }

    /// Scenario timeout
    #[must_use]
    pub const fn scenario(&self) -> Duration {
        Duration::from_millis(self.scenario_ms)
    }

    /// Every bound scaled down to `ms`, for fast mock runs
    #[must_use]
    pub const fn uniform(ms: u64) -> Self {
        Self {
            navigation_ms: ms,
            element_ms: ms,
            detail_link_ms: ms,
            redirect_ms: ms,
            login_ms: ms,
            scenario_ms: ms,
        }
    }
}

/// Browser launch options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            chromium_path: None,
            sandbox: true,
        }
    }
}

impl BrowserConfig {
    /// Set viewport dimensions
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Disable sandbox (for containers)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Base URL of the deployment, always ending in `/`
    pub base_url: String,
    /// Login credentials, if provided
    pub credentials: Option<Credentials>,
    /// Browser options
    pub browser: BrowserConfig,
    /// Wait bounds
    pub timeouts: Timeouts,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials: None,
            browser: BrowserConfig::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl ProbeConfig {
    /// Create the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read configuration from the process environment
    pub fn from_env() -> ProbeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup` (variable name to value)
    ///
    /// # Errors
    ///
    /// Fails when `BASE_URL` is not an http(s) URL or `HEADLESS` is not a
    /// boolean.
    pub fn from_lookup<F>(lookup: F) -> ProbeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self::new();
        if let Some(base_url) = get("BASE_URL") {
            config = config.with_base_url(base_url)?;
        }
        if let (Some(email), Some(password)) = (get("TEST_EMAIL"), get("TEST_PASSWORD")) {
            config.credentials = Some(Credentials::new(email, password));
        }
        if let Some(path) = get("CHROMIUM_PATH") {
            config.browser.chromium_path = Some(path);
        }
        if let Some(headless) = get("HEADLESS") {
            config.browser.headless = parse_bool("HEADLESS", &headless)?;
        }
        Ok(config)
    }

    /// Set the base URL; a trailing `/` is added when missing
    ///
    /// # Errors
    ///
    /// Fails unless the URL starts with `http://` or `https://`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> ProbeResult<Self> {
        let mut base_url = base_url.into().trim().to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ProbeError::config(format!(
                "BASE_URL must be an http(s) URL, got {base_url:?}"
            )));
        }
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        self.base_url = base_url;
        Ok(self)
    }

    /// Set credentials
    #[must_use]
    pub fn with_credentials(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(email, password));
        self
    }

    /// Set browser options
    #[must_use]
    pub fn with_browser(mut self, browser: BrowserConfig) -> Self {
        self.browser = browser;
        self
    }

    /// Set headless mode
    #[must_use]
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.browser.headless = headless;
        self
    }

    /// Set wait bounds
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Credentials, required by scenarios that log in
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Config`] when `TEST_EMAIL` or `TEST_PASSWORD`
    /// was not provided.
    pub fn credentials(&self) -> ProbeResult<&Credentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| ProbeError::config("TEST_EMAIL and TEST_PASSWORD must be set"))
    }

    /// Whether credentials are available
    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Absolute URL for an app path (`"auth"`, `"/recipe/1"`)
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn parse_bool(key: &str, value: &str) -> ProbeResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ProbeError::config(format!(
            "{key} must be a boolean, got {other:?}"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    mod env_tests {
        use super::*;

        #[test]
        fn test_defaults_without_env() {
            let config = ProbeConfig::from_lookup(lookup(&[])).unwrap();
            assert_eq!(config.base_url, DEFAULT_BASE_URL);
            assert!(config.credentials.is_none());
            assert!(config.browser.headless);
        }

        #[test]
        fn test_reads_every_variable() {
            let config = ProbeConfig::from_lookup(lookup(&[
                ("BASE_URL", "http://localhost:5173"),
                ("TEST_EMAIL", "qa@example.com"),
                ("TEST_PASSWORD", "hunter2"),
                ("CHROMIUM_PATH", "/usr/bin/chromium"),
                ("HEADLESS", "false"),
            ]))
            .unwrap();
            assert_eq!(config.base_url, "http://localhost:5173/");
            assert_eq!(config.credentials().unwrap().email, "qa@example.com");
            assert_eq!(config.browser.chromium_path.as_deref(), Some("/usr/bin/chromium"));
            assert!(!config.browser.headless);
        }

        #[test]
        fn test_partial_credentials_ignored() {
            let config = ProbeConfig::from_lookup(lookup(&[("TEST_EMAIL", "qa@example.com")])).unwrap();
            assert!(!config.has_credentials());
            assert!(matches!(config.credentials(), Err(ProbeError::Config { .. })));
        }

        #[test]
        fn test_blank_values_ignored() {
            let config = ProbeConfig::from_lookup(lookup(&[("BASE_URL", "  ")])).unwrap();
            assert_eq!(config.base_url, DEFAULT_BASE_URL);
        }

        #[test]
        fn test_bad_base_url() {
            let err = ProbeConfig::from_lookup(lookup(&[("BASE_URL", "staging")])).unwrap_err();
            assert!(err.to_string().contains("BASE_URL"));
        }

        #[test]
        fn test_bad_headless() {
            assert!(ProbeConfig::from_lookup(lookup(&[("HEADLESS", "maybe")])).is_err());
        }
    }

    mod url_tests {
        use super::*;

        #[test]
        fn test_url_joins_paths() {
            let config = ProbeConfig::new();
            assert_eq!(config.url("auth"), "https://fitrecipes-staging.vercel.app/auth");
            assert_eq!(
                config.url("/submit-recipe"),
                "https://fitrecipes-staging.vercel.app/submit-recipe"
            );
            assert_eq!(config.url(""), DEFAULT_BASE_URL);
        }
    }

    mod secrecy_tests {
        use super::*;

        #[test]
        fn test_password_redacted_in_debug() {
            let config = ProbeConfig::new().with_credentials("qa@example.com", "hunter2");
            let debug = format!("{config:?}");
            assert!(debug.contains("qa@example.com"));
            assert!(!debug.contains("hunter2"));
        }

        #[test]
        fn test_password_not_serialized() {
            let config = ProbeConfig::new().with_credentials("qa@example.com", "hunter2");
            let json = serde_json::to_string(&config).unwrap();
            assert!(!json.contains("hunter2"));
        }
    }

    #[test]
    fn test_timeouts() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.redirect(), Duration::from_secs(8));
        assert_eq!(timeouts.scenario(), Duration::from_secs(30));
        assert_eq!(Timeouts::uniform(5).login_ms, 5);
    }
}
