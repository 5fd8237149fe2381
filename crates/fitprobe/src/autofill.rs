//! Auto-fill of every empty control in a scope.
//!
//! Forms under test change faster than the tests do. Instead of naming every
//! field, a scenario fills the fields it cares about and lets [`AutoFill`]
//! put a deterministic value into everything still empty, so client-side
//! `required` validation never blocks the submit.
//!
//! Groups run in a fixed order (short text, number, URL-like, multi-line,
//! select, checkbox, radio), controls within a group in document order.
//! Credential fields (`email`, `password`) are never touched.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::driver::PageDriver;
use crate::field::{classify, ControlDescriptor, FieldKind, CONTROL_SELECTOR};
use crate::result::ProbeResult;
use crate::selector::{ElementRef, Scope, Selector};

/// Fill groups in processing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillGroup {
    /// Single-line text inputs
    ShortText,
    /// Numeric inputs
    Number,
    /// `type=url` inputs and inputs with an `http` placeholder
    Url,
    /// Textareas
    Multiline,
    /// Dropdowns
    Select,
    /// Checkboxes (at most one checked per pass)
    Checkbox,
    /// Radios (at most one checked per pass)
    Radio,
}

impl FillGroup {
    /// Every group, in processing order
    pub const ORDER: [Self; 7] = [
        Self::ShortText,
        Self::Number,
        Self::Url,
        Self::Multiline,
        Self::Select,
        Self::Checkbox,
        Self::Radio,
    ];

    /// Whether a classified control belongs to this group.
    ///
    /// A short-text input with an `http` placeholder is in both the short
    /// text and URL groups; short text runs first, so the URL group then
    /// finds it filled.
    #[must_use]
    pub fn contains(self, control: &ControlDescriptor, kind: FieldKind) -> bool {
        if control.is_credential() {
            return false;
        }
        match self {
            Self::ShortText => kind == FieldKind::ShortText,
            Self::Number => kind == FieldKind::Number,
            Self::Url => {
                kind == FieldKind::Url
                    || (kind == FieldKind::ShortText && control.looks_like_url())
            }
            Self::Multiline => kind == FieldKind::MultilineText,
            Self::Select => kind == FieldKind::Select,
            Self::Checkbox => kind == FieldKind::Checkbox,
            Self::Radio => kind == FieldKind::Radio,
        }
    }

    /// Value policy kind applied to members of this group
    #[must_use]
    pub const fn policy_kind(self) -> FieldKind {
        match self {
            Self::ShortText => FieldKind::ShortText,
            Self::Number => FieldKind::Number,
            Self::Url => FieldKind::Url,
            Self::Multiline => FieldKind::MultilineText,
            Self::Select => FieldKind::Select,
            Self::Checkbox => FieldKind::Checkbox,
            Self::Radio => FieldKind::Radio,
        }
    }
}

/// Observed state of one control at decision time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldState {
    /// Current value
    pub value: String,
    /// Checked state
    pub checked: bool,
    /// Selected option index (selects only)
    pub selected_index: Option<usize>,
}

impl FieldState {
    /// A state with only a value
    #[must_use]
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// State of a control as captured in its descriptor
    #[must_use]
    pub fn of(control: &ControlDescriptor) -> Self {
        Self {
            value: control.value.clone(),
            checked: control.checked,
            selected_index: control.selected_index,
        }
    }
}

/// What the policy wants done to a control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillAction {
    /// Leave it alone
    Skip,
    /// Write this value
    Write(String),
    /// Check it
    Check,
    /// Select the option at this index
    SelectIndex(usize),
}

/// Synthetic value per field kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillPolicy {
    /// Value for short text
    pub short_text: String,
    /// Value for numbers
    pub number: String,
    /// Value for URLs
    pub url: String,
    /// Value for textareas
    pub multiline: String,
    /// Option index for selects
    pub select_index: usize,
}

impl Default for FillPolicy {
    fn default() -> Self {
        Self {
            short_text: "E2E".to_string(),
            number: "1".to_string(),
            url: "https://example.com/e2e.jpg".to_string(),
            multiline: "E2E content".to_string(),
            select_index: 1,
        }
    }
}

impl FillPolicy {
    /// Create the default policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the short text value
    #[must_use]
    pub fn with_short_text(mut self, value: impl Into<String>) -> Self {
        self.short_text = value.into();
        self
    }

    /// Set the numeric value
    #[must_use]
    pub fn with_number(mut self, value: impl Into<String>) -> Self {
        self.number = value.into();
        self
    }

    /// Set the URL value
    #[must_use]
    pub fn with_url(mut self, value: impl Into<String>) -> Self {
        self.url = value.into();
        self
    }

    /// Set the textarea value
    #[must_use]
    pub fn with_multiline(mut self, value: impl Into<String>) -> Self {
        self.multiline = value.into();
        self
    }

    /// Set the select option index
    #[must_use]
    pub const fn with_select_index(mut self, index: usize) -> Self {
        self.select_index = index;
        self
    }

    /// Decide what to do with a control of `kind` in `state`.
    ///
    /// A control with any value (whitespace included) or a checked control
    /// is left alone. A select is always moved to the policy index unless
    /// that option is already the selected one; a placeholder option may
    /// carry a value of its own.
    #[must_use]
    pub fn decide(&self, kind: FieldKind, state: &FieldState) -> FillAction {
        match kind {
            FieldKind::Checkbox | FieldKind::Radio => {
                if state.checked {
                    FillAction::Skip
                } else {
                    FillAction::Check
                }
            }
            FieldKind::Select => {
                if state.selected_index == Some(self.select_index) {
                    FillAction::Skip
                } else {
                    FillAction::SelectIndex(self.select_index)
                }
            }
            _ if !state.value.is_empty() => FillAction::Skip,
            FieldKind::ShortText => FillAction::Write(self.short_text.clone()),
            FieldKind::Number => FillAction::Write(self.number.clone()),
            FieldKind::Url => FillAction::Write(self.url.clone()),
            FieldKind::MultilineText => FillAction::Write(self.multiline.clone()),
        }
    }
}

/// Result of one control's fill attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum FillOutcome {
    /// Value written
    Filled(String),
    /// Checkbox or radio checked
    Checked,
    /// Option index selected
    Selected(usize),
    /// Had a value (or the group was already satisfied)
    AlreadyFilled,
    /// Read or write failed; the pass continued
    Skipped(String),
}

impl FillOutcome {
    /// Whether the page was modified
    #[must_use]
    pub const fn is_change(&self) -> bool {
        matches!(self, Self::Filled(_) | Self::Checked | Self::Selected(_))
    }
}

/// One line of a [`FillReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillEntry {
    /// Control position within the scope
    pub index: usize,
    /// Group that processed it
    pub group: FillGroup,
    /// `name` attribute, if any
    pub name: Option<String>,
    /// What happened
    pub outcome: FillOutcome,
}

/// Informational record of an auto-fill pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillReport {
    /// Entries in processing order
    pub entries: Vec<FillEntry>,
}

impl FillReport {
    /// Whether anything on the page changed
    #[must_use]
    pub fn changed(&self) -> bool {
        self.entries.iter().any(|e| e.outcome.is_change())
    }

    /// Number of controls modified
    #[must_use]
    pub fn filled_count(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_change()).count()
    }

    /// Entries whose attempt failed
    pub fn skipped(&self) -> impl Iterator<Item = &FillEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, FillOutcome::Skipped(_)))
    }

    /// Entries for the control at `index`
    pub fn for_control(&self, index: usize) -> impl Iterator<Item = &FillEntry> {
        self.entries.iter().filter(move |e| e.index == index)
    }

    fn push(&mut self, control: &ControlDescriptor, group: FillGroup, outcome: FillOutcome) {
        self.entries.push(FillEntry {
            index: control.index,
            group,
            name: control.name.clone(),
            outcome,
        });
    }
}

/// Auto-fill engine
#[derive(Debug, Clone, Default)]
pub struct AutoFill {
    policy: FillPolicy,
}

impl AutoFill {
    /// Engine with the default policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with a custom policy
    #[must_use]
    pub const fn with_policy(policy: FillPolicy) -> Self {
        Self { policy }
    }

    /// The active policy
    #[must_use]
    pub const fn policy(&self) -> &FillPolicy {
        &self.policy
    }

    /// Fill every empty, fillable control within `scope`.
    ///
    /// Per-control failures become [`FillOutcome::Skipped`]; only a failure
    /// to enumerate the scope's controls is returned as an error.
    pub async fn fill_empty<D>(&self, driver: &D, scope: &Scope) -> ProbeResult<FillReport>
    where
        D: PageDriver + ?Sized,
    {
        let controls: Vec<(ControlDescriptor, FieldKind)> = driver
            .controls(scope)
            .await?
            .into_iter()
            .filter_map(|c| classify(&c).map(|kind| (c, kind)))
            .collect();

        let mut report = FillReport::default();
        for group in FillGroup::ORDER {
            let members: Vec<&ControlDescriptor> = controls
                .iter()
                .filter(|(c, kind)| group.contains(c, *kind))
                .map(|(c, _)| c)
                .collect();
            if members.is_empty() {
                continue;
            }
            if group.policy_kind().is_checkable() {
                self.fill_checkable(driver, scope, group, &members, &mut report)
                    .await;
            } else {
                for control in members {
                    let outcome = self.fill_one(driver, scope, group, control).await;
                    report.push(control, group, outcome);
                }
            }
        }

        info!(
            scope = %scope,
            filled = report.filled_count(),
            skipped = report.skipped().count(),
            "auto-fill pass complete"
        );
        Ok(report)
    }

    async fn fill_one<D>(
        &self,
        driver: &D,
        scope: &Scope,
        group: FillGroup,
        control: &ControlDescriptor,
    ) -> FillOutcome
    where
        D: PageDriver + ?Sized,
    {
        let element = control_ref(scope, control);
        let value = match driver.read_value(&element).await {
            Ok(value) => value,
            Err(e) => {
                debug!(%element, error = %e, "value unreadable, treating as empty");
                String::new()
            }
        };

        let state = FieldState {
            value,
            ..FieldState::of(control)
        };
        let action = self.policy.decide(group.policy_kind(), &state);
        let result = match &action {
            FillAction::Skip => return FillOutcome::AlreadyFilled,
            FillAction::Write(text) => driver
                .fill(&element, text)
                .await
                .map(|()| FillOutcome::Filled(text.clone())),
            FillAction::SelectIndex(index) => driver
                .select_index(&element, *index)
                .await
                .map(|()| FillOutcome::Selected(*index)),
            FillAction::Check => driver
                .check(&element)
                .await
                .map(|()| FillOutcome::Checked),
        };

        match result {
            Ok(outcome) => {
                debug!(%element, ?group, ?outcome, "control filled");
                outcome
            }
            Err(e) => {
                debug!(%element, ?group, error = %e, "fill skipped");
                FillOutcome::Skipped(e.to_string())
            }
        }
    }

    async fn fill_checkable<D>(
        &self,
        driver: &D,
        scope: &Scope,
        group: FillGroup,
        members: &[&ControlDescriptor],
        report: &mut FillReport,
    ) where
        D: PageDriver + ?Sized,
    {
        let mut states = Vec::with_capacity(members.len());
        for control in members {
            let element = control_ref(scope, control);
            let checked = match driver.is_checked(&element).await {
                Ok(checked) => checked,
                Err(e) => {
                    debug!(%element, error = %e, "checked state unreadable, using snapshot");
                    control.checked
                }
            };
            states.push(checked);
        }

        if states.iter().any(|checked| *checked) {
            for (control, checked) in members.iter().zip(&states) {
                if *checked {
                    report.push(control, group, FillOutcome::AlreadyFilled);
                }
            }
            return;
        }

        for control in members {
            let state = FieldState::default();
            if self.policy.decide(group.policy_kind(), &state) != FillAction::Check {
                continue;
            }
            let element = control_ref(scope, control);
            match driver.check(&element).await {
                Ok(()) => {
                    debug!(%element, ?group, "checked first member of group");
                    report.push(control, group, FillOutcome::Checked);
                    return;
                }
                Err(e) => {
                    debug!(%element, ?group, error = %e, "check skipped");
                    report.push(control, group, FillOutcome::Skipped(e.to_string()));
                }
            }
        }
    }
}

/// Fill every empty control in `scope` with the default policy
pub async fn fill_empty<D>(driver: &D, scope: &Scope) -> ProbeResult<FillReport>
where
    D: PageDriver + ?Sized,
{
    AutoFill::new().fill_empty(driver, scope).await
}

fn control_ref(scope: &Scope, control: &ControlDescriptor) -> ElementRef {
    ElementRef::new(scope.clone(), Selector::css(CONTROL_SELECTOR)).nth(control.index)
}
