//! Network interception for fetch and XMLHttpRequest.
//!
//! Rules are compiled into an init script that runs before any page script,
//! wraps both transports and answers matching requests with a synthetic JSON
//! response. Everything else passes through to the original primitive.
//!
//! Matching is on method (case-insensitive, `*` for any) plus a
//! case-insensitive URL substring. The first matching rule wins.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::driver::PageDriver;
use crate::result::{ProbeError, ProbeResult};

/// Identifier the recipe-create rule answers with
pub const MOCKED_RECIPE_ID: &str = "e2e-mocked-id";

/// Page global holding interception state
const STATE_GLOBAL: &str = "__fitprobeIntercept";

/// Page global holding watched responses
const WATCH_GLOBAL: &str = "__fitprobeResponses";

/// URL fragment of the login API call
pub const LOGIN_API_PATH: &str = "/auth/login";

/// Longest body prefix kept for a watched response
pub const WATCHED_BODY_LIMIT: usize = 200;

/// HTTP methods for request matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    /// GET request
    Get,
    /// POST request
    Post,
    /// PUT request
    Put,
    /// DELETE request
    Delete,
    /// PATCH request
    Patch,
    /// HEAD request
    Head,
    /// OPTIONS request
    Options,
    /// Any method; only ever chosen explicitly
    Any,
}

impl HttpMethod {
    /// Parse a method name (any case). `*` selects [`HttpMethod::Any`];
    /// unknown names yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            "*" => Some(Self::Any),
            _ => None,
        }
    }

    /// Canonical upper-case name (`*` for any)
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Any => "*",
        }
    }

    /// Check whether a request method (any case) satisfies this rule method
    #[must_use]
    pub fn accepts(&self, request_method: &str) -> bool {
        *self == Self::Any || self.as_str().eq_ignore_ascii_case(request_method.trim())
    }
}

/// Response synthesized for an intercepted request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticResponse {
    /// HTTP status code
    pub status: u16,
    /// Content-Type header
    pub content_type: String,
    /// JSON body
    pub body: Value,
}

impl SyntheticResponse {
    /// A JSON response
    #[must_use]
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            content_type: "application/json".to_string(),
            body,
        }
    }

    /// `201 Created` with `{"ok":true,"id":id}`
    #[must_use]
    pub fn created(id: &str) -> Self {
        Self::json(201, serde_json::json!({ "ok": true, "id": id }))
    }

    /// Reason phrase for the status line
    #[must_use]
    pub const fn status_text(&self) -> &'static str {
        match self.status {
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            500 => "Internal Server Error",
            _ => "",
        }
    }
}

/// One interception rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptRule {
    /// Method to match
    pub method: HttpMethod,
    /// Substring the URL must contain (case-insensitive)
    pub url_contains: String,
    /// Response to synthesize
    pub response: SyntheticResponse,
}

impl InterceptRule {
    /// Create a rule
    #[must_use]
    pub fn new(method: HttpMethod, url_contains: impl Into<String>, response: SyntheticResponse) -> Self {
        Self {
            method,
            url_contains: url_contains.into(),
            response,
        }
    }

    /// `POST *recipe*` answered with `201 {"ok":true,"id":"e2e-mocked-id"}`
    #[must_use]
    pub fn recipe_create() -> Self {
        Self::new(
            HttpMethod::Post,
            "recipe",
            SyntheticResponse::created(MOCKED_RECIPE_ID),
        )
    }

    /// Check if a request matches this rule
    #[must_use]
    pub fn matches(&self, method: &str, url: &str) -> bool {
        self.method.accepts(method)
            && url
                .to_lowercase()
                .contains(&self.url_contains.to_lowercase())
    }
}

/// Rule as serialized into the page
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScriptRule<'a> {
    method: &'static str,
    url_contains: String,
    status: u16,
    status_text: &'static str,
    content_type: &'a str,
    body: &'a Value,
}

impl<'a> From<&'a InterceptRule> for ScriptRule<'a> {
    fn from(rule: &'a InterceptRule) -> Self {
        Self {
            method: rule.method.as_str(),
            url_contains: rule.url_contains.to_lowercase(),
            status: rule.response.status,
            status_text: rule.response.status_text(),
            content_type: &rule.response.content_type,
            body: &rule.response.body,
        }
    }
}

/// A request answered by a rule, as recorded in the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptHit {
    /// Index of the matching rule
    pub rule: usize,
    /// Request method (upper case)
    pub method: String,
    /// Request URL
    pub url: String,
}

/// A rule that never matched a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptionMismatch {
    /// Index of the rule
    pub rule: usize,
    /// Method it expected
    pub method: HttpMethod,
    /// URL substring it expected
    pub url_contains: String,
}

/// Interception rule set for one page context
#[derive(Debug, Clone, Default)]
pub struct NetworkInterception {
    rules: Vec<InterceptRule>,
    installed: bool,
}

impl NetworkInterception {
    /// Create an empty rule set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rule set mocking recipe creation
    #[must_use]
    pub fn recipe_submission() -> Self {
        Self::new().with_rule(InterceptRule::recipe_create())
    }

    /// Add a rule
    #[must_use]
    pub fn with_rule(mut self, rule: InterceptRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Add a rule
    ///
    /// # Errors
    ///
    /// Fails once the rules have been installed.
    pub fn route(&mut self, rule: InterceptRule) -> ProbeResult<()> {
        if self.installed {
            return Err(ProbeError::InvalidState {
                message: "rules cannot change after install".to_string(),
            });
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Add a POST rule
    pub fn post(&mut self, url_contains: &str, response: SyntheticResponse) -> ProbeResult<()> {
        self.route(InterceptRule::new(HttpMethod::Post, url_contains, response))
    }

    /// Registered rules
    #[must_use]
    pub fn rules(&self) -> &[InterceptRule] {
        &self.rules
    }

    /// Whether the rules have been installed into a page
    #[must_use]
    pub const fn is_installed(&self) -> bool {
        self.installed
    }

    /// Index of the first rule matching a request
    #[must_use]
    pub fn matching_rule(&self, method: &str, url: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.matches(method, url))
    }

    /// Response the page would synthesize, or `None` for pass-through
    #[must_use]
    pub fn intercept(&self, method: &str, url: &str) -> Option<&SyntheticResponse> {
        self.matching_rule(method, url)
            .map(|index| &self.rules[index].response)
    }

    /// Generate the init script implementing the rules
    pub fn init_script(&self) -> ProbeResult<String> {
        let rules: Vec<ScriptRule<'_>> = self.rules.iter().map(ScriptRule::from).collect();
        let rules_json = serde_json::to_string(&rules)?;
        Ok(INIT_SCRIPT_TEMPLATE
            .replace("__STATE__", STATE_GLOBAL)
            .replace("__RULES__", &rules_json))
    }

    /// Install into the driver's page context before any page script runs.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::InvalidState`] on a second install.
    pub async fn install<D>(&mut self, driver: &mut D) -> ProbeResult<()>
    where
        D: PageDriver + ?Sized,
    {
        if self.installed {
            return Err(ProbeError::InvalidState {
                message: "network interception is already installed for this page".to_string(),
            });
        }
        let script = self.init_script()?;
        driver.add_init_script(&script).await?;
        self.installed = true;
        info!(rules = self.rules.len(), "network interception installed");
        Ok(())
    }

    /// Requests answered so far in the current document
    pub async fn hits<D>(&self, driver: &D) -> ProbeResult<Vec<InterceptHit>>
    where
        D: PageDriver + ?Sized,
    {
        let value = driver
            .evaluate(&format!(
                "(window.{STATE_GLOBAL} ? window.{STATE_GLOBAL}.hits : [])"
            ))
            .await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Rules with no hit in `hits`
    #[must_use]
    pub fn unmatched_rules(&self, hits: &[InterceptHit]) -> Vec<InterceptionMismatch> {
        self.rules
            .iter()
            .enumerate()
            .filter(|(index, _)| !hits.iter().any(|h| h.rule == *index))
            .map(|(rule, r)| InterceptionMismatch {
                rule,
                method: r.method,
                url_contains: r.url_contains.clone(),
            })
            .collect()
    }

    /// Log a warning for every rule that was never hit
    pub async fn report_mismatches<D>(&self, driver: &D) -> ProbeResult<Vec<InterceptionMismatch>>
    where
        D: PageDriver + ?Sized,
    {
        let hits = self.hits(driver).await?;
        let mismatches = self.unmatched_rules(&hits);
        for mismatch in &mismatches {
            warn!(
                rule = mismatch.rule,
                method = mismatch.method.as_str(),
                url_contains = %mismatch.url_contains,
                "interception rule never matched a request"
            );
        }
        Ok(mismatches)
    }
}

/// A response seen by a [`ResponseWatch`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedResponse {
    /// Request URL
    pub url: String,
    /// HTTP status
    pub status: u16,
    /// Start of the body, at most [`WATCHED_BODY_LIMIT`] characters
    #[serde(default)]
    pub body: String,
}

impl WatchedResponse {
    /// Whether the status is 2xx
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self.status, 200..=299)
    }
}

/// Records responses to requests whose URL contains a substring.
///
/// Unlike [`NetworkInterception`] nothing is answered or altered; the page
/// keeps talking to the real backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseWatch {
    url_contains: String,
}

impl ResponseWatch {
    /// Watch URLs containing `url_contains` (case-insensitive)
    #[must_use]
    pub fn new(url_contains: impl Into<String>) -> Self {
        Self {
            url_contains: url_contains.into(),
        }
    }

    /// Watch the login API call
    #[must_use]
    pub fn login() -> Self {
        Self::new(LOGIN_API_PATH)
    }

    /// Generate the init script recording matching responses
    pub fn init_script(&self) -> ProbeResult<String> {
        let needle = serde_json::to_string(&self.url_contains.to_lowercase())?;
        Ok(WATCH_SCRIPT_TEMPLATE
            .replace("__STATE__", WATCH_GLOBAL)
            .replace("__URL__", &needle)
            .replace("__LIMIT__", &WATCHED_BODY_LIMIT.to_string()))
    }

    /// Install into the driver's page context before any page script runs
    pub async fn install<D>(&self, driver: &mut D) -> ProbeResult<()>
    where
        D: PageDriver + ?Sized,
    {
        driver.add_init_script(&self.init_script()?).await?;
        debug!(url_contains = %self.url_contains, "response watch installed");
        Ok(())
    }

    /// Responses recorded so far in the current document, oldest first
    pub async fn responses<D>(&self, driver: &D) -> ProbeResult<Vec<WatchedResponse>>
    where
        D: PageDriver + ?Sized,
    {
        let value = driver
            .evaluate(&format!("(window.{WATCH_GLOBAL} || [])"))
            .await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(value)?)
    }
}

const WATCH_SCRIPT_TEMPLATE: &str = r#"(() => {
  if (window.__STATE__) return;
  const seen = [];
  Object.defineProperty(window, '__STATE__', { value: seen });
  const needle = __URL__;
  const watched = (url) => String(url || '').toLowerCase().includes(needle);
  const head = (text) => String(text || '').slice(0, __LIMIT__);

  const origFetch = window.fetch;
  if (origFetch) {
    window.fetch = function (input) {
      const isRequest = typeof Request !== 'undefined' && input instanceof Request;
      const url = isRequest ? input.url : String(input);
      const pending = origFetch.apply(this, arguments);
      if (!watched(url)) return pending;
      return pending.then((response) => {
        const record = (body) => seen.push({ url, status: response.status, body: head(body) });
        response.clone().text().then(record, () => record(''));
        return response;
      });
    };
  }

  const XHR = window.XMLHttpRequest;
  if (XHR) {
    const origOpen = XHR.prototype.open;
    XHR.prototype.open = function (method, url) {
      if (watched(url)) {
        const xhr = this;
        xhr.addEventListener('loadend', () => {
          if (!xhr.status) return;
          let body = '';
          try { body = xhr.responseText; } catch (e) {}
          seen.push({ url: String(url), status: xhr.status, body: head(body) });
        });
      }
      return origOpen.apply(this, arguments);
    };
  }
})();"#;

const INIT_SCRIPT_TEMPLATE: &str = r#"(() => {
  if (window.__STATE__) return;
  const rules = __RULES__;
  const state = { rules, hits: [] };
  Object.defineProperty(window, '__STATE__', { value: state });

  const find = (method, url) => {
    const m = String(method || 'GET').trim().toUpperCase();
    const u = String(url || '').toLowerCase();
    for (let i = 0; i < rules.length; i++) {
      const r = rules[i];
      if ((r.method === '*' || r.method === m) && u.includes(r.urlContains)) {
        state.hits.push({ rule: i, method: m, url: String(url) });
        return r;
      }
    }
    return null;
  };

  const origFetch = window.fetch;
  if (origFetch) {
    window.fetch = function (input, init) {
      const isRequest = typeof Request !== 'undefined' && input instanceof Request;
      const url = isRequest ? input.url : String(input);
      const method = (init && init.method) || (isRequest ? input.method : 'GET');
      const rule = find(method, url);
      if (!rule) return origFetch.apply(this, arguments);
      return Promise.resolve(new Response(JSON.stringify(rule.body), {
        status: rule.status,
        statusText: rule.statusText,
        headers: { 'Content-Type': rule.contentType },
      }));
    };
  }

  const XHR = window.XMLHttpRequest;
  if (XHR) {
    const origOpen = XHR.prototype.open;
    const origSend = XHR.prototype.send;
    XHR.prototype.open = function (method, url) {
      this.__fitprobeRequest = { method, url: String(url) };
      return origOpen.apply(this, arguments);
    };
    XHR.prototype.send = function () {
      const req = this.__fitprobeRequest;
      const rule = req ? find(req.method, req.url) : null;
      if (!rule) return origSend.apply(this, arguments);
      const xhr = this;
      const text = JSON.stringify(rule.body);
      const define = (key, value) =>
        Object.defineProperty(xhr, key, { configurable: true, get: () => value });
      define('readyState', 4);
      define('status', rule.status);
      define('statusText', rule.statusText);
      define('responseURL', req.url);
      define('responseText', text);
      define('response', xhr.responseType === 'json' ? rule.body : text);
      xhr.getResponseHeader = (name) =>
        String(name).toLowerCase() === 'content-type' ? rule.contentType : null;
      xhr.getAllResponseHeaders = () => 'content-type: ' + rule.contentType + '\r\n';
      ['readystatechange', 'load', 'loadend'].forEach((type) => xhr.dispatchEvent(new Event(type)));
    };
  }
})();"#;
