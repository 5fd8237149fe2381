//! Selector resolution with ranked fallback chains.
//!
//! Production UIs drift: class names change, test ids get added later. A
//! [`CandidateList`] holds several selectors for the same element, most
//! specific first, and [`resolve`] returns the first one that matches
//! anything in the given [`Scope`].
//!
//! ```ignore
//! let title = resolve(
//!     &driver,
//!     &CandidateList::new([
//!         Selector::css(r#"input[name="title"], #title, [placeholder*="title" i]"#),
//!         Selector::css(r#"form input[type="text"]"#),
//!     ]),
//!     &Scope::Page,
//! )
//! .await?;
//! driver.fill(&title, "Test E2E Pasta").await?;
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::driver::PageDriver;
use crate::result::{ProbeError, ProbeResult};

/// Selector for locating elements
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selector {
    /// CSS selector (e.g., `button[type="submit"]`)
    Css(String),
    /// Test ID selector (`data-testid` attribute)
    TestId(String),
    /// Smallest elements whose text contains the needle (case-insensitive)
    Text(String),
    /// CSS selector filtered by text content (case-insensitive)
    CssWithText {
        /// Base CSS selector
        css: String,
        /// Text content to match
        text: String,
    },
    /// Containers matching `css` that hold a `child` whose text contains `text`
    HasChild {
        /// Container CSS selector
        css: String,
        /// Child CSS selector
        child: String,
        /// Text the child must contain (case-insensitive)
        text: String,
    },
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create a test ID selector
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// Create a text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create a CSS selector with a text filter
    #[must_use]
    pub fn css_with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self::CssWithText {
            css: css.into(),
            text: text.into(),
        }
    }

    /// Select headings (any level) whose text contains `name`
    #[must_use]
    pub fn heading(name: impl Into<String>) -> Self {
        Self::css_with_text("h1, h2, h3, h4, h5, h6", name)
    }

    /// Create a container selector (`css:has(child:has-text(text))`)
    #[must_use]
    pub fn has_child(
        css: impl Into<String>,
        child: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::HasChild {
            css: css.into(),
            child: child.into(),
            text: text.into(),
        }
    }

    /// JavaScript expression evaluating to an array of matches under `root`.
    ///
    /// `root` is itself an expression; a null root yields an empty array.
    #[must_use]
    pub fn to_query_all(&self, root: &str) -> String {
        let includes = "const inc = (el, t) => (el.textContent || '').toLowerCase().includes(t.toLowerCase());";
        match self {
            Self::Css(css) => format!(
                "((r) => r ? Array.from(r.querySelectorAll({})) : [])({root})",
                js_string(css)
            ),
            Self::TestId(id) => format!(
                "((r) => r ? Array.from(r.querySelectorAll({})) : [])({root})",
                js_string(&format!("[data-testid={}]", js_string(id)))
            ),
            Self::Text(text) => format!(
                "((r) => {{ {includes} if (!r) return []; const t = {}; \
                 const base = r.body || r; \
                 return Array.from(base.querySelectorAll('*')).filter(el => \
                 !el.closest({NON_RENDERED}) && inc(el, t) \
                 && !Array.from(el.children).some(c => inc(c, t))); }})({root})",
                js_string(text)
            ),
            Self::CssWithText { css, text } => format!(
                "((r) => {{ {includes} if (!r) return []; \
                 return Array.from(r.querySelectorAll({})).filter(el => inc(el, {})); }})({root})",
                js_string(css),
                js_string(text)
            ),
            Self::HasChild { css, child, text } => format!(
                "((r) => {{ {includes} if (!r) return []; \
                 return Array.from(r.querySelectorAll({})).filter(el => \
                 Array.from(el.querySelectorAll({})).some(c => inc(c, {}))); }})({root})",
                js_string(css),
                js_string(child),
                js_string(text)
            ),
        }
    }

    /// JavaScript expression counting matches under `root`
    #[must_use]
    pub fn to_count_query(&self, root: &str) -> String {
        format!("({}).length", self.to_query_all(root))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(css) => write!(f, "{css}"),
            Self::TestId(id) => write!(f, "[data-testid=\"{id}\"]"),
            Self::Text(text) => write!(f, "text={text}"),
            Self::CssWithText { css, text } => write!(f, "{css}:has-text(\"{text}\")"),
            Self::HasChild { css, child, text } => {
                write!(f, "{css}:has({child}:has-text(\"{text}\"))")
            }
        }
    }
}

/// Elements whose text never renders; text search ignores them
const NON_RENDERED: &str = "'script, style, noscript, template, title, head'";

/// Quote a string as a JavaScript string literal
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Where a query runs: the whole document, or under a located element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// The whole page
    Page,
    /// Descendants of a located element
    Element(Box<ElementRef>),
}

impl Scope {
    /// Scope to descendants of `element`
    #[must_use]
    pub fn element(element: ElementRef) -> Self {
        Self::Element(Box::new(element))
    }

    /// Scope to the first element matching a CSS selector on the page
    #[must_use]
    pub fn first(css: impl Into<String>) -> Self {
        Self::element(ElementRef::page(Selector::css(css)))
    }

    /// JavaScript expression for the scope root (may evaluate to null)
    #[must_use]
    pub fn root_js(&self) -> String {
        match self {
            Self::Page => "document".to_string(),
            Self::Element(element) => element.to_js(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page => write!(f, "page"),
            Self::Element(element) => write!(f, "{element}"),
        }
    }
}

/// Handle to one live element: the `index`-th match of `selector` in `scope`.
///
/// Valid for the current page load only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementRef {
    /// Scope the selector is evaluated in
    pub scope: Scope,
    /// Selector that produced the element
    pub selector: Selector,
    /// Position among the matches, in document order
    pub index: usize,
}

impl ElementRef {
    /// First match of `selector` within `scope`
    #[must_use]
    pub const fn new(scope: Scope, selector: Selector) -> Self {
        Self {
            scope,
            selector,
            index: 0,
        }
    }

    /// First match of `selector` on the whole page
    #[must_use]
    pub const fn page(selector: Selector) -> Self {
        Self::new(Scope::Page, selector)
    }

    /// Address the `index`-th match instead
    #[must_use]
    pub const fn nth(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// JavaScript expression evaluating to the element or null
    #[must_use]
    pub fn to_js(&self) -> String {
        format!(
            "(({})[{}] || null)",
            self.selector.to_query_all(&self.scope.root_js()),
            self.index
        )
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if matches!(self.scope, Scope::Page) {
            write!(f, "{} >> nth={}", self.selector, self.index)
        } else {
            write!(f, "{} >> {} >> nth={}", self.scope, self.selector, self.index)
        }
    }
}

/// Ordered candidate selectors, most specific first.
///
/// Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateList {
    candidates: Vec<Selector>,
}

impl CandidateList {
    /// Build a list from selectors in preference order
    #[must_use]
    pub fn new(candidates: impl IntoIterator<Item = Selector>) -> Self {
        Self {
            candidates: candidates.into_iter().collect(),
        }
    }

    /// Build a list of CSS selectors in preference order
    #[must_use]
    pub fn css<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(candidates.into_iter().map(Selector::css))
    }

    /// Candidates in preference order
    #[must_use]
    pub fn candidates(&self) -> &[Selector] {
        &self.candidates
    }

    /// Number of candidates
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether the list is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// The error raised when every candidate misses
    #[must_use]
    pub fn no_match(&self) -> ProbeError {
        ProbeError::NoMatch {
            candidates: self.candidates.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Return the first element of the first candidate with at least one match.
///
/// Candidates are tried left to right and evaluation stops at the first hit.
///
/// # Errors
///
/// Returns [`ProbeError::NoMatch`] carrying every candidate when none match,
/// or the driver's error if a count query fails.
pub async fn resolve<D>(
    driver: &D,
    candidates: &CandidateList,
    scope: &Scope,
) -> ProbeResult<ElementRef>
where
    D: PageDriver + ?Sized,
{
    for selector in candidates.candidates() {
        let count = driver.count(scope, selector).await?;
        debug!(%selector, %scope, count, "candidate selector evaluated");
        if count > 0 {
            return Ok(ElementRef::new(scope.clone(), selector.clone()));
        }
    }
    Err(candidates.no_match())
}

/// Like [`resolve`], but a miss is `Ok(None)` instead of an error.
///
/// Used for optional form fields that only some builds render.
pub async fn resolve_optional<D>(
    driver: &D,
    candidates: &CandidateList,
    scope: &Scope,
) -> ProbeResult<Option<ElementRef>>
where
    D: PageDriver + ?Sized,
{
    match resolve(driver, candidates, scope).await {
        Ok(element) => Ok(Some(element)),
        Err(ProbeError::NoMatch { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;

    mod selector_tests {
        use super::*;

        #[test]
        fn test_css_query_uses_query_selector_all() {
            let query = Selector::css("button.primary").to_query_all("document");
            assert!(query.contains("querySelectorAll(\"button.primary\")"));
            assert!(query.ends_with("(document)"));
        }

        #[test]
        fn test_css_query_escapes_quotes() {
            let query = Selector::css(r#"input[name="title"]"#).to_query_all("document");
            assert!(query.contains(r#""input[name=\"title\"]""#));
        }

        #[test]
        fn test_test_id_selector() {
            let query = Selector::test_id("recipe-card").to_query_all("document");
            assert!(query.contains("data-testid"));
            assert!(query.contains("recipe-card"));
        }

        #[test]
        fn test_text_selector_is_case_insensitive() {
            let query = Selector::text("Browse Recipes").to_query_all("document");
            assert!(query.contains("toLowerCase"));
            assert!(query.contains("Browse Recipes"));
        }

        #[test]
        fn test_text_selector_skips_non_rendered_elements() {
            let query = Selector::text("Browse Recipes").to_query_all("document");
            assert!(query.contains("r.body || r"));
            assert!(query.contains("!el.closest('script, style, noscript, template, title, head')"));
        }

        #[test]
        fn test_has_child_selector() {
            let selector = Selector::has_child(".rounded-lg", "h3", "Recipe Info");
            let query = selector.to_query_all("document");
            assert!(query.contains("\".rounded-lg\""));
            assert!(query.contains("\"h3\""));
            assert_eq!(
                selector.to_string(),
                ".rounded-lg:has(h3:has-text(\"Recipe Info\"))"
            );
        }

        #[test]
        fn test_count_query() {
            let query = Selector::css("li").to_count_query("document");
            assert!(query.ends_with(".length"));
        }

        #[test]
        fn test_display() {
            assert_eq!(Selector::css("form").to_string(), "form");
            assert_eq!(
                Selector::test_id("step-item").to_string(),
                "[data-testid=\"step-item\"]"
            );
            assert_eq!(Selector::text("no recipes").to_string(), "text=no recipes");
        }
    }

    mod element_ref_tests {
        use super::*;

        #[test]
        fn test_nth() {
            let element = ElementRef::page(Selector::css("li")).nth(3);
            assert_eq!(element.index, 3);
            assert!(element.to_js().contains("[3]"));
        }

        #[test]
        fn test_scoped_js_nests_root() {
            let element = ElementRef::new(Scope::first("form"), Selector::css("textarea"));
            let js = element.to_js();
            assert!(js.contains("\"form\""));
            assert!(js.contains("\"textarea\""));
        }

        #[test]
        fn test_display_includes_scope() {
            let element = ElementRef::new(Scope::first("form"), Selector::css("select")).nth(1);
            assert_eq!(element.to_string(), "form >> nth=0 >> select >> nth=1");
        }
    }

    mod resolve_tests {
        use super::*;

        #[tokio::test]
        async fn test_first_candidate_wins_when_present() {
            let driver = MockDriver::new()
                .with_element("#title", MockDriver::visible())
                .with_element("form input[type=\"text\"]", MockDriver::visible());
            let candidates = CandidateList::css(["#title", "form input[type=\"text\"]"]);

            let element = resolve(&driver, &candidates, &Scope::Page).await.unwrap();
            assert_eq!(element.selector, Selector::css("#title"));
            assert_eq!(element.index, 0);
        }

        #[tokio::test]
        async fn test_falls_back_to_second_candidate() {
            let driver =
                MockDriver::new().with_element("form input[type=\"text\"]", MockDriver::visible());
            let candidates = CandidateList::css(["#title", "form input[type=\"text\"]"]);

            let element = resolve(&driver, &candidates, &Scope::Page).await.unwrap();
            assert_eq!(element.selector, Selector::css("form input[type=\"text\"]"));
        }

        #[tokio::test]
        async fn test_no_match_carries_candidates() {
            let driver = MockDriver::new();
            let candidates = CandidateList::css(["#title", "[placeholder*=\"title\" i]"]);

            let err = resolve(&driver, &candidates, &Scope::Page)
                .await
                .unwrap_err();
            match err {
                ProbeError::NoMatch { candidates } => {
                    assert_eq!(candidates, vec!["#title", "[placeholder*=\"title\" i]"]);
                }
                other => panic!("expected NoMatch, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_stops_at_first_hit() {
            let driver = MockDriver::new()
                .with_element("a", MockDriver::visible())
                .with_element("b", MockDriver::visible());
            let candidates = CandidateList::css(["a", "b"]);

            let _ = resolve(&driver, &candidates, &Scope::Page).await.unwrap();
            assert_eq!(driver.history(), vec!["count:a".to_string()]);
        }

        #[tokio::test]
        async fn test_resolve_optional_miss_is_none() {
            let driver = MockDriver::new();
            let candidates = CandidateList::css(["#prepTime"]);
            let found = resolve_optional(&driver, &candidates, &Scope::Page)
                .await
                .unwrap();
            assert!(found.is_none());
        }

        #[tokio::test]
        async fn test_empty_list_is_no_match() {
            let driver = MockDriver::new();
            let err = resolve(&driver, &CandidateList::new([]), &Scope::Page)
                .await
                .unwrap_err();
            assert!(err.is_no_match());
        }
    }
}
