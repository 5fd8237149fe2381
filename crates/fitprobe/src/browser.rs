//! Chromium-backed [`PageDriver`] over the Chrome DevTools Protocol.
//!
//! Element operations run as page scripts built from [`ElementRef::to_js`],
//! so every [`Selector`](crate::selector::Selector) variant works the same
//! way it does in queries. Writes go through the native value setters and
//! fire `input`/`change` events, which controlled React inputs require.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::BrowserConfig;
use crate::driver::{DriverFactory, PageDriver};
use crate::field::{ControlDescriptor, CONTROL_SELECTOR};
use crate::result::{ProbeError, ProbeResult};
use crate::selector::{ElementRef, Scope, Selector};

const VISIBLE_JS: &str = "!!(el.offsetWidth || el.offsetHeight || el.getClientRects().length) \
     && getComputedStyle(el).visibility !== 'hidden'";

const SET_VALUE_JS: &str = "const proto = el instanceof HTMLTextAreaElement \
     ? HTMLTextAreaElement.prototype \
     : el instanceof HTMLSelectElement ? HTMLSelectElement.prototype : HTMLInputElement.prototype; \
     const setter = Object.getOwnPropertyDescriptor(proto, 'value'); \
     if (setter && setter.set) { setter.set.call(el, v); } else { el.value = v; } \
     el.dispatchEvent(new Event('input', { bubbles: true })); \
     el.dispatchEvent(new Event('change', { bubbles: true }));";

/// One Chromium instance with a single page
#[derive(Debug)]
pub struct ChromiumDriver {
    browser: Mutex<Browser>,
    page: Page,
    handle: tokio::task::JoinHandle<()>,
}

impl ChromiumDriver {
    /// Launch Chromium and open a blank page
    ///
    /// # Errors
    ///
    /// Returns error if the browser cannot be launched or the page cannot be opened
    pub async fn launch(config: &BrowserConfig) -> ProbeResult<Self> {
        let mut builder = CdpConfig::builder()
            .window_size(config.viewport_width, config.viewport_height)
            .viewport(Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
                ..Viewport::default()
            });
        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = config.chromium_path {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder
            .build()
            .map_err(|message| ProbeError::BrowserLaunchError { message })?;

        let (browser, mut handler) =
            Browser::launch(cdp_config)
                .await
                .map_err(|e| ProbeError::BrowserLaunchError {
                    message: e.to_string(),
                })?;
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ProbeError::PageError {
                message: e.to_string(),
            })?;
        info!(headless = config.headless, "chromium launched");
        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handle,
        })
    }

    async fn eval(&self, script: String) -> ProbeResult<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| ProbeError::script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    /// Run `body` with `el` bound to the element; null when it is missing
    async fn on_element(&self, element: &ElementRef, body: &str) -> ProbeResult<Value> {
        self.eval(format!(
            "(() => {{ const el = {}; if (!el) return null; {body} }})()",
            element.to_js()
        ))
        .await
    }

    /// Like [`Self::on_element`], but a missing element is an input error
    async fn on_present(&self, element: &ElementRef, body: &str) -> ProbeResult<Value> {
        let value = self.on_element(element, body).await?;
        if value.is_null() {
            return Err(ProbeError::input(format!("{element} not found")));
        }
        Ok(value)
    }

    async fn flag(&self, element: &ElementRef, body: &str) -> ProbeResult<bool> {
        Ok(self.on_element(element, body).await?.as_bool().unwrap_or(false))
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn navigate(&mut self, url: &str) -> ProbeResult<()> {
        debug!(%url, "cdp navigate");
        self.page
            .goto(url)
            .await
            .map_err(|e| ProbeError::NavigationError {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn current_url(&self) -> ProbeResult<String> {
        // Client-side routing does not always surface through the target info
        let href = self.eval("location.href".to_string()).await?;
        Ok(href.as_str().unwrap_or_default().to_string())
    }

    async fn evaluate(&self, script: &str) -> ProbeResult<Value> {
        self.eval(script.to_string()).await
    }

    async fn add_init_script(&mut self, script: &str) -> ProbeResult<()> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(script))
            .await
            .map_err(|e| ProbeError::script(e.to_string()))?;
        Ok(())
    }

    async fn count(&self, scope: &Scope, selector: &Selector) -> ProbeResult<usize> {
        let count = self
            .eval(selector.to_count_query(&scope.root_js()))
            .await?
            .as_u64()
            .unwrap_or(0);
        Ok(count as usize)
    }

    async fn is_visible(&self, element: &ElementRef) -> ProbeResult<bool> {
        self.flag(element, &format!("return {VISIBLE_JS};")).await
    }

    async fn is_enabled(&self, element: &ElementRef) -> ProbeResult<bool> {
        self.flag(
            element,
            "return !el.disabled && el.getAttribute('aria-disabled') !== 'true';",
        )
        .await
    }

    async fn text_content(&self, element: &ElementRef) -> ProbeResult<Option<String>> {
        let value = self.on_element(element, "return el.textContent || '';").await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> ProbeResult<Option<String>> {
        let body = format!(
            "return el.getAttribute({});",
            Value::String(name.to_string())
        );
        let value = self.on_element(element, &body).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn click(&self, element: &ElementRef) -> ProbeResult<()> {
        let clicked = self
            .on_present(
                element,
                "if (el.disabled) return false; \
                 el.scrollIntoView({ block: 'center' }); el.click(); return true;",
            )
            .await?;
        if clicked == Value::Bool(false) {
            return Err(ProbeError::input(format!("{element} is disabled")));
        }
        Ok(())
    }

    async fn fill(&self, element: &ElementRef, value: &str) -> ProbeResult<()> {
        let body = format!(
            "const v = {}; el.focus(); {SET_VALUE_JS} return true;",
            Value::String(value.to_string())
        );
        self.on_present(element, &body).await?;
        Ok(())
    }

    async fn read_value(&self, element: &ElementRef) -> ProbeResult<String> {
        let value = self
            .on_element(element, "return el.value == null ? '' : String(el.value);")
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProbeError::page(format!("{element} not found")))
    }

    async fn is_checked(&self, element: &ElementRef) -> ProbeResult<bool> {
        let value = self.on_present(element, "return !!el.checked;").await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn check(&self, element: &ElementRef) -> ProbeResult<()> {
        let checked = self
            .on_present(
                element,
                "if (el.disabled) return false; if (!el.checked) el.click(); return !!el.checked;",
            )
            .await?;
        if checked == Value::Bool(false) {
            return Err(ProbeError::input(format!("{element} could not be checked")));
        }
        Ok(())
    }

    async fn select_index(&self, element: &ElementRef, index: usize) -> ProbeResult<()> {
        let body = format!(
            "if (!el.options || el.options.length <= {index}) return false; \
             const v = el.options[{index}].value; {SET_VALUE_JS} return true;"
        );
        if self.on_present(element, &body).await? == Value::Bool(false) {
            return Err(ProbeError::input(format!(
                "{element} has no option at index {index}"
            )));
        }
        Ok(())
    }

    async fn controls(&self, scope: &Scope) -> ProbeResult<Vec<ControlDescriptor>> {
        let query = Selector::css(CONTROL_SELECTOR).to_query_all(&scope.root_js());
        let script = format!(
            "({query}).map((el, index) => ({{ \
               index, \
               tag: el.tagName.toLowerCase(), \
               typeAttr: el.getAttribute('type'), \
               name: el.getAttribute('name'), \
               placeholder: el.getAttribute('placeholder'), \
               value: el.value == null ? '' : String(el.value), \
               checked: !!el.checked, \
               optionCount: el.options ? el.options.length : 0, \
               selectedIndex: el.options && el.selectedIndex >= 0 ? el.selectedIndex : null \
             }}))"
        );
        let value = self.eval(script).await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(value)?)
    }

    async fn close(&mut self) -> ProbeResult<()> {
        let browser = self.browser.get_mut();
        let result = browser.close().await;
        if let Err(e) = browser.wait().await {
            debug!(error = %e, "chromium process did not exit cleanly");
        }
        self.handle.abort();
        result.map_err(|e| ProbeError::BrowserLaunchError {
            message: e.to_string(),
        })?;
        debug!("chromium closed");
        Ok(())
    }
}

/// Launches one [`ChromiumDriver`] per scenario
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    config: BrowserConfig,
}

impl ChromiumLauncher {
    /// Launcher with the given browser options
    #[must_use]
    pub const fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    /// Browser options
    #[must_use]
    pub const fn config(&self) -> &BrowserConfig {
        &self.config
    }
}

#[async_trait]
impl DriverFactory for ChromiumLauncher {
    type Driver = ChromiumDriver;

    async fn create(&self) -> ProbeResult<ChromiumDriver> {
        ChromiumDriver::launch(&self.config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launcher_keeps_config() {
        let launcher = ChromiumLauncher::new(BrowserConfig::default().with_no_sandbox());
        assert!(!launcher.config().sandbox);
        assert!(launcher.config().headless);
    }
}
