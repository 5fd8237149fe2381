//! Classification of interactive form controls.
//!
//! A control is described by a [`ControlDescriptor`] snapshot taken from the
//! live DOM; [`classify`] maps it to the [`FieldKind`] that decides how the
//! auto-filler treats it.

use serde::{Deserialize, Serialize};

/// CSS selector for every control the classifier considers
pub const CONTROL_SELECTOR: &str = "input, textarea, select";

/// Control names that are never auto-filled
pub const CREDENTIAL_NAMES: [&str; 2] = ["email", "password"];

/// Kind of interactive control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Single-line text input
    ShortText,
    /// Numeric input
    Number,
    /// URL input
    Url,
    /// Textarea
    MultilineText,
    /// Single-select dropdown
    Select,
    /// Checkbox
    Checkbox,
    /// Radio button
    Radio,
}

impl FieldKind {
    /// Whether the kind is toggled rather than typed into
    #[must_use]
    pub const fn is_checkable(self) -> bool {
        matches!(self, Self::Checkbox | Self::Radio)
    }

    /// Short lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShortText => "short_text",
            Self::Number => "number",
            Self::Url => "url",
            Self::MultilineText => "multiline_text",
            Self::Select => "select",
            Self::Checkbox => "checkbox",
            Self::Radio => "radio",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one control matched by [`CONTROL_SELECTOR`].
///
/// `index` is the position among all matches in document order within the
/// queried scope. Valid for the current page load only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlDescriptor {
    /// Position among the scope's controls
    pub index: usize,
    /// Lowercase tag name (`input`, `textarea`, `select`)
    pub tag: String,
    /// Raw `type` attribute, if present
    pub type_attr: Option<String>,
    /// `name` attribute, if present
    pub name: Option<String>,
    /// `placeholder` attribute, if present
    pub placeholder: Option<String>,
    /// Current value
    pub value: String,
    /// Checked state (checkable controls only)
    pub checked: bool,
    /// Number of `<option>` children (selects only)
    pub option_count: usize,
    /// Index of the selected option (selects only)
    pub selected_index: Option<usize>,
}

impl ControlDescriptor {
    /// Describe a control by tag name
    #[must_use]
    pub fn new(index: usize, tag: impl Into<String>) -> Self {
        Self {
            index,
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// `<input type=...>` shorthand
    #[must_use]
    pub fn input(index: usize, type_attr: impl Into<String>) -> Self {
        Self::new(index, "input").with_type(type_attr)
    }

    /// Set the `type` attribute
    #[must_use]
    pub fn with_type(mut self, type_attr: impl Into<String>) -> Self {
        self.type_attr = Some(type_attr.into());
        self
    }

    /// Set the `name` attribute
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the `placeholder` attribute
    #[must_use]
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    /// Set the current value
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    /// Set the checked state
    #[must_use]
    pub const fn with_checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    /// Set the option count
    #[must_use]
    pub const fn with_options(mut self, option_count: usize) -> Self {
        self.option_count = option_count;
        self
    }

    /// Set the selected option index
    #[must_use]
    pub const fn with_selected(mut self, index: usize) -> Self {
        self.selected_index = Some(index);
        self
    }

    /// Whether the control carries a credential name (`email`, `password`)
    #[must_use]
    pub fn is_credential(&self) -> bool {
        self.name.as_deref().is_some_and(|name| {
            CREDENTIAL_NAMES
                .iter()
                .any(|c| name.eq_ignore_ascii_case(c))
        })
    }

    /// Whether the placeholder hints at a URL (contains "http", any case)
    #[must_use]
    pub fn looks_like_url(&self) -> bool {
        self.placeholder
            .as_deref()
            .is_some_and(|p| p.to_ascii_lowercase().contains("http"))
    }

    fn is_tag(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }
}

/// Classify a control, or reject it.
///
/// The explicit `type` attribute wins over the tag name. A plain `<input>`
/// with no or empty type is short text. Anything else (hidden, submit, file,
/// date, buttons, unknown tags) is not a fillable field.
#[must_use]
pub fn classify(control: &ControlDescriptor) -> Option<FieldKind> {
    let type_attr = control
        .type_attr
        .as_deref()
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty());

    if let Some(kind) = type_attr.as_deref().and_then(kind_for_type) {
        return Some(kind);
    }
    if control.is_tag("textarea") {
        return Some(FieldKind::MultilineText);
    }
    if control.is_tag("select") {
        return Some(FieldKind::Select);
    }
    if control.is_tag("input") && type_attr.is_none() {
        return Some(FieldKind::ShortText);
    }
    None
}

fn kind_for_type(type_attr: &str) -> Option<FieldKind> {
    match type_attr {
        "checkbox" => Some(FieldKind::Checkbox),
        "radio" => Some(FieldKind::Radio),
        "number" => Some(FieldKind::Number),
        "url" => Some(FieldKind::Url),
        "text" => Some(FieldKind::ShortText),
        _ => None,
    }
}
