//! PageDriver - the injected browser capability.
//!
//! Everything the harness does to a live page goes through [`PageDriver`].
//! Two implementations ship with the crate:
//!
//! - `ChromiumDriver` (feature `browser`) drives Chromium over CDP
//! - [`MockDriver`] keeps an in-memory page model for unit tests
//!
//! Elements are addressed with [`ElementRef`]; a reference is only valid for
//! the page load it was resolved against.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::field::{ControlDescriptor, CONTROL_SELECTOR};
use crate::result::{ProbeError, ProbeResult};
use crate::selector::{ElementRef, Scope, Selector};

/// Abstract page automation capability
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to an absolute URL and wait for the load to settle
    async fn navigate(&mut self, url: &str) -> ProbeResult<()>;

    /// Current page URL
    async fn current_url(&self) -> ProbeResult<String>;

    /// Evaluate a JavaScript expression and return its JSON value
    async fn evaluate(&self, script: &str) -> ProbeResult<Value>;

    /// Register a script that runs before any page script on every new document
    async fn add_init_script(&mut self, script: &str) -> ProbeResult<()>;

    /// Count matches of `selector` within `scope`
    async fn count(&self, scope: &Scope, selector: &Selector) -> ProbeResult<usize>;

    /// Whether the element exists and is rendered
    async fn is_visible(&self, element: &ElementRef) -> ProbeResult<bool>;

    /// Whether the element exists and is not disabled
    async fn is_enabled(&self, element: &ElementRef) -> ProbeResult<bool>;

    /// Text content of the element, `None` when missing
    async fn text_content(&self, element: &ElementRef) -> ProbeResult<Option<String>>;

    /// Attribute value, `None` when absent
    async fn attribute(&self, element: &ElementRef, name: &str) -> ProbeResult<Option<String>>;

    /// Click the element
    async fn click(&self, element: &ElementRef) -> ProbeResult<()>;

    /// Replace the element's value, firing input and change events
    async fn fill(&self, element: &ElementRef, value: &str) -> ProbeResult<()>;

    /// Read the element's current value
    async fn read_value(&self, element: &ElementRef) -> ProbeResult<String>;

    /// Whether a checkbox or radio is checked
    async fn is_checked(&self, element: &ElementRef) -> ProbeResult<bool>;

    /// Check a checkbox or radio
    async fn check(&self, element: &ElementRef) -> ProbeResult<()>;

    /// Select the option at `index` of a `<select>`
    async fn select_index(&self, element: &ElementRef, index: usize) -> ProbeResult<()>;

    /// Snapshot every control matching [`CONTROL_SELECTOR`] within `scope`
    async fn controls(&self, scope: &Scope) -> ProbeResult<Vec<ControlDescriptor>>;

    /// Rewrite the location client-side and append a heading.
    ///
    /// Used when a submission never redirects on its own.
    async fn patch_location(&mut self, path: &str, heading: &str) -> ProbeResult<()> {
        let script = format!(
            "(() => {{ history.pushState({{}}, '', {path}); \
             window.dispatchEvent(new PopStateEvent('popstate')); \
             const h = document.createElement('h1'); h.textContent = {heading}; \
             document.body.appendChild(h); return location.href; }})()",
            path = Value::String(path.to_string()),
            heading = Value::String(heading.to_string()),
        );
        self.evaluate(&script).await?;
        Ok(())
    }

    /// Release the page and browser
    async fn close(&mut self) -> ProbeResult<()>;
}

/// Creates one fresh driver per scenario
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Driver type produced
    type Driver: PageDriver + 'static;

    /// Launch a new driver
    async fn create(&self) -> ProbeResult<Self::Driver>;
}

#[async_trait]
impl<F, D> DriverFactory for F
where
    F: Fn() -> ProbeResult<D> + Send + Sync,
    D: PageDriver + 'static,
{
    type Driver = D;

    async fn create(&self) -> ProbeResult<D> {
        self()
    }
}

// ============================================================================
// MockDriver
// ============================================================================

/// Element in the mock page model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockElement {
    /// Rendered
    pub visible: bool,
    /// Not disabled
    pub enabled: bool,
    /// Text content
    pub text: Option<String>,
    /// Value (form elements)
    pub value: String,
    /// HTML attributes
    pub attributes: Vec<(String, String)>,
}

impl MockElement {
    /// A visible, enabled element
    #[must_use]
    pub const fn visible() -> Self {
        Self {
            visible: true,
            enabled: true,
            text: None,
            value: String::new(),
            attributes: Vec::new(),
        }
    }

    /// A present but hidden element
    #[must_use]
    pub const fn hidden() -> Self {
        Self {
            visible: false,
            enabled: true,
            text: None,
            value: String::new(),
            attributes: Vec::new(),
        }
    }

    /// Set the text content
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set an HTML attribute
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Mark as disabled
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Form control in the mock page model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockControl {
    /// Control state
    pub descriptor: ControlDescriptor,
    /// Reads of the value fail
    pub fail_read: bool,
    /// Writes (fill, check, select) fail
    pub fail_write: bool,
}

impl MockControl {
    /// Wrap a descriptor
    #[must_use]
    pub const fn new(descriptor: ControlDescriptor) -> Self {
        Self {
            descriptor,
            fail_read: false,
            fail_write: false,
        }
    }

    /// Make value reads fail
    #[must_use]
    pub const fn failing_read(mut self) -> Self {
        self.fail_read = true;
        self
    }

    /// Make writes fail
    #[must_use]
    pub const fn failing_write(mut self) -> Self {
        self.fail_write = true;
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    url: String,
    elements: HashMap<String, Vec<MockElement>>,
    controls: Vec<MockControl>,
    aliases: HashMap<String, usize>,
    click_navigations: HashMap<String, String>,
    click_reveals: HashMap<String, Vec<(String, MockElement)>>,
    redirects: HashMap<String, String>,
    eval_results: VecDeque<Value>,
    init_scripts: Vec<String>,
    history: Vec<String>,
    closed: bool,
}

/// In-memory page for unit testing.
///
/// Elements are keyed by the `Display` form of their selector and scopes are
/// ignored. Controls are addressed either positionally through
/// [`CONTROL_SELECTOR`] or through an alias selector.
#[derive(Debug, Default)]
pub struct MockDriver {
    state: Mutex<MockState>,
    close_signal: Option<Arc<AtomicBool>>,
}

impl MockDriver {
    /// Create an empty mock page
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for [`MockElement::visible`]
    #[must_use]
    pub const fn visible() -> MockElement {
        MockElement::visible()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&mut self) -> &mut MockState {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start at `url`
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.state_mut().url = url.into();
        self
    }

    /// Add one match for `selector`
    #[must_use]
    pub fn with_element(mut self, selector: impl Into<String>, element: MockElement) -> Self {
        self.state_mut()
            .elements
            .entry(selector.into())
            .or_default()
            .push(element);
        self
    }

    /// Append a form control (document order)
    #[must_use]
    pub fn with_control(mut self, control: MockControl) -> Self {
        self.state_mut().controls.push(control);
        self
    }

    /// Append a form control from a descriptor; its index is reassigned
    #[must_use]
    pub fn with_descriptor(mut self, mut descriptor: ControlDescriptor) -> Self {
        let state = self.state_mut();
        descriptor.index = state.controls.len();
        state.controls.push(MockControl::new(descriptor));
        self
    }

    /// Route `selector` to the control at `index`
    #[must_use]
    pub fn with_control_alias(mut self, selector: impl Into<String>, index: usize) -> Self {
        self.state_mut().aliases.insert(selector.into(), index);
        self
    }

    /// Clicking `selector` navigates to `url`
    #[must_use]
    pub fn with_click_navigation(
        mut self,
        selector: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        self.state_mut()
            .click_navigations
            .insert(selector.into(), url.into());
        self
    }

    /// Clicking `selector` adds `element` as a match for `revealed`
    #[must_use]
    pub fn with_click_reveal(
        mut self,
        selector: impl Into<String>,
        revealed: impl Into<String>,
        element: MockElement,
    ) -> Self {
        self.state_mut()
            .click_reveals
            .entry(selector.into())
            .or_default()
            .push((revealed.into(), element));
        self
    }

    /// Navigating to `from` lands on `to`
    #[must_use]
    pub fn with_redirect(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.state_mut().redirects.insert(from.into(), to.into());
        self
    }

    /// Queue a result for the next `evaluate`
    #[must_use]
    pub fn with_eval_result(mut self, value: Value) -> Self {
        self.state_mut().eval_results.push_back(value);
        self
    }

    /// Raise `signal` when the driver is closed
    #[must_use]
    pub fn with_close_signal(mut self, signal: Arc<AtomicBool>) -> Self {
        self.close_signal = Some(signal);
        self
    }

    /// Add a match for `selector` on a running mock
    pub fn push_element(&self, selector: impl Into<String>, element: MockElement) {
        self.lock()
            .elements
            .entry(selector.into())
            .or_default()
            .push(element);
    }

    /// Recorded calls, in order
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }

    /// Check if a method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.lock().history.iter().any(|c| c.starts_with(method))
    }

    /// Init scripts registered so far
    #[must_use]
    pub fn init_scripts(&self) -> Vec<String> {
        self.lock().init_scripts.clone()
    }

    /// Snapshot of the control at `index`
    #[must_use]
    pub fn control(&self, index: usize) -> Option<ControlDescriptor> {
        self.lock()
            .controls
            .get(index)
            .map(|c| c.descriptor.clone())
    }

    /// Snapshot of all controls
    #[must_use]
    pub fn control_states(&self) -> Vec<ControlDescriptor> {
        self.lock()
            .controls
            .iter()
            .map(|c| c.descriptor.clone())
            .collect()
    }

    /// Whether `close` was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl MockState {
    fn record(&mut self, call: impl Into<String>) {
        self.history.push(call.into());
    }

    fn control_index(&self, element: &ElementRef) -> Option<usize> {
        if element.selector == Selector::css(CONTROL_SELECTOR) {
            return (element.index < self.controls.len()).then_some(element.index);
        }
        self.aliases.get(&element.selector.to_string()).copied()
    }

    fn element(&self, element: &ElementRef) -> Option<&MockElement> {
        self.elements
            .get(&element.selector.to_string())
            .and_then(|matches| matches.get(element.index))
    }

    fn control_mut(&mut self, element: &ElementRef) -> ProbeResult<&mut MockControl> {
        let index = self
            .control_index(element)
            .ok_or_else(|| ProbeError::input(format!("no control at {element}")))?;
        self.controls
            .get_mut(index)
            .ok_or_else(|| ProbeError::input(format!("no control at {element}")))
    }

    fn writable_control(&mut self, element: &ElementRef) -> ProbeResult<&mut ControlDescriptor> {
        let control = self.control_mut(element)?;
        if control.fail_write {
            return Err(ProbeError::input(format!("{element} rejected the write")));
        }
        Ok(&mut control.descriptor)
    }
}

/// Scheme and host of `url`, without trailing slash
fn origin_of(url: &str) -> &str {
    let after_scheme = url.find("://").map_or(0, |i| i + 3);
    match url[after_scheme..].find('/') {
        Some(i) => &url[..after_scheme + i],
        None => url,
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn navigate(&mut self, url: &str) -> ProbeResult<()> {
        let state = self.state_mut();
        state.record(format!("navigate:{url}"));
        state.url = state
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> ProbeResult<String> {
        Ok(self.lock().url.clone())
    }

    async fn evaluate(&self, _script: &str) -> ProbeResult<Value> {
        let mut state = self.lock();
        state.record("evaluate");
        Ok(state.eval_results.pop_front().unwrap_or(Value::Null))
    }

    async fn add_init_script(&mut self, script: &str) -> ProbeResult<()> {
        let state = self.state_mut();
        state.record("add_init_script");
        state.init_scripts.push(script.to_string());
        Ok(())
    }

    async fn count(&self, _scope: &Scope, selector: &Selector) -> ProbeResult<usize> {
        let mut state = self.lock();
        let key = selector.to_string();
        state.record(format!("count:{key}"));
        if *selector == Selector::css(CONTROL_SELECTOR) {
            return Ok(state.controls.len());
        }
        let registered = state.elements.get(&key).map_or(0, Vec::len);
        if registered == 0 && state.aliases.contains_key(&key) {
            return Ok(1);
        }
        Ok(registered)
    }

    async fn is_visible(&self, element: &ElementRef) -> ProbeResult<bool> {
        let state = self.lock();
        if let Some(found) = state.element(element) {
            return Ok(found.visible);
        }
        Ok(state.control_index(element).is_some())
    }

    async fn is_enabled(&self, element: &ElementRef) -> ProbeResult<bool> {
        let state = self.lock();
        if let Some(found) = state.element(element) {
            return Ok(found.enabled);
        }
        Ok(state.control_index(element).is_some())
    }

    async fn text_content(&self, element: &ElementRef) -> ProbeResult<Option<String>> {
        Ok(self.lock().element(element).and_then(|e| e.text.clone()))
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> ProbeResult<Option<String>> {
        Ok(self.lock().element(element).and_then(|e| {
            e.attributes
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        }))
    }

    async fn click(&self, element: &ElementRef) -> ProbeResult<()> {
        let mut state = self.lock();
        let key = element.selector.to_string();
        state.record(format!("click:{key}"));
        match state.element(element) {
            Some(found) if !found.enabled => {
                return Err(ProbeError::input(format!("{element} is disabled")));
            }
            Some(_) => {}
            None if state.control_index(element).is_some() => {}
            None => return Err(ProbeError::input(format!("{element} not found"))),
        }
        if let Some(target) = state.click_navigations.get(&key).cloned() {
            state.url = target;
        }
        if let Some(revealed) = state.click_reveals.remove(&key) {
            for (selector, found) in revealed {
                state.elements.entry(selector).or_default().push(found);
            }
        }
        Ok(())
    }

    async fn fill(&self, element: &ElementRef, value: &str) -> ProbeResult<()> {
        let mut state = self.lock();
        state.record(format!("fill:{element}"));
        if state.control_index(element).is_some() {
            state.writable_control(element)?.value = value.to_string();
            return Ok(());
        }
        let key = element.selector.to_string();
        let found = state
            .elements
            .get_mut(&key)
            .and_then(|matches| matches.get_mut(element.index))
            .ok_or_else(|| ProbeError::input(format!("{element} not found")))?;
        found.value = value.to_string();
        Ok(())
    }

    async fn read_value(&self, element: &ElementRef) -> ProbeResult<String> {
        let mut state = self.lock();
        if state.control_index(element).is_some() {
            let control = state.control_mut(element)?;
            if control.fail_read {
                return Err(ProbeError::page(format!("{element} detached")));
            }
            return Ok(control.descriptor.value.clone());
        }
        state
            .element(element)
            .map(|e| e.value.clone())
            .ok_or_else(|| ProbeError::page(format!("{element} not found")))
    }

    async fn is_checked(&self, element: &ElementRef) -> ProbeResult<bool> {
        let mut state = self.lock();
        let control = state.control_mut(element)?;
        if control.fail_read {
            return Err(ProbeError::page(format!("{element} detached")));
        }
        Ok(control.descriptor.checked)
    }

    async fn check(&self, element: &ElementRef) -> ProbeResult<()> {
        let mut state = self.lock();
        state.record(format!("check:{element}"));
        state.writable_control(element)?.checked = true;
        Ok(())
    }

    async fn select_index(&self, element: &ElementRef, index: usize) -> ProbeResult<()> {
        let mut state = self.lock();
        state.record(format!("select:{element}"));
        let control = state.writable_control(element)?;
        if index >= control.option_count {
            return Err(ProbeError::input(format!(
                "{element} has {} options, cannot select index {index}",
                control.option_count
            )));
        }
        control.value = format!("option-{index}");
        control.selected_index = Some(index);
        Ok(())
    }

    async fn controls(&self, _scope: &Scope) -> ProbeResult<Vec<ControlDescriptor>> {
        let mut state = self.lock();
        state.record("controls");
        Ok(state
            .controls
            .iter()
            .enumerate()
            .map(|(index, c)| ControlDescriptor {
                index,
                ..c.descriptor.clone()
            })
            .collect())
    }

    async fn patch_location(&mut self, path: &str, heading: &str) -> ProbeResult<()> {
        let state = self.state_mut();
        state.record(format!("patch_location:{path}"));
        state.url = format!("{}{path}", origin_of(&state.url));
        state
            .elements
            .entry("h1".to_string())
            .or_default()
            .push(MockElement::visible().with_text(heading));
        Ok(())
    }

    async fn close(&mut self) -> ProbeResult<()> {
        let state = self.state_mut();
        state.record("close");
        state.closed = true;
        if let Some(signal) = &self.close_signal {
            signal.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}
