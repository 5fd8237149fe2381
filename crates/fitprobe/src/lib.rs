//! Fitprobe: end-to-end test harness for the FitRecipes web app
//!
//! Drives a deployed build through a real browser and checks the flows a
//! user depends on: login, browsing, recipe details and recipe submission.
//! Submissions never reach the backend; the recipe-create call is answered
//! in the page by a synthetic `201`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      FITPROBE Architecture                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌──────────────┐   ┌──────────────────────┐    │
//! │  │ Scenario   │──►│ Session      │──►│ PageDriver           │    │
//! │  │ Runner     │   │ (one page)   │   │ Chromium / Mock      │    │
//! │  └────────────┘   └──────┬───────┘   └──────────────────────┘    │
//! │                          │                                        │
//! │        ┌─────────────────┼──────────────────┐                     │
//! │        ▼                 ▼                  ▼                     │
//! │  ┌───────────┐   ┌──────────────┐   ┌──────────────────┐         │
//! │  │ Selector  │   │ AutoFill     │   │ Network          │         │
//! │  │ Resolver  │   │ (classifier) │   │ Interception     │         │
//! │  └───────────┘   └──────────────┘   └──────────────────┘         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use fitprobe::prelude::*;
//!
//! let config = ProbeConfig::from_env()?;
//! let runner = ScenarioRunner::new(ChromiumLauncher::new(config.browser.clone()), config);
//! let report = runner.run().await;
//! assert!(report.is_success());
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

/// Fill-empty-fields engine
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod autofill;

/// Chromium driver over CDP
#[cfg(feature = "browser")]
#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::doc_markdown
)]
pub mod browser;

/// Run configuration from the environment
pub mod config;

/// Page driver seam and the in-memory mock
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod driver;

/// Form control classification
pub mod field;

/// In-page fetch/XHR interception
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod intercept;

mod result;

/// End-to-end scenarios and the runner
#[allow(clippy::missing_errors_doc)]
pub mod scenario;

/// Selector chains and resolution
pub mod selector;

/// One page context per scenario
pub mod session;

/// Bounded waits
pub mod wait;

pub use autofill::{
    fill_empty, AutoFill, FieldState, FillAction, FillEntry, FillGroup, FillOutcome, FillPolicy,
    FillReport,
};
#[cfg(feature = "browser")]
pub use browser::{ChromiumDriver, ChromiumLauncher};
pub use config::{BrowserConfig, Credentials, ProbeConfig, Timeouts, DEFAULT_BASE_URL};
pub use driver::{DriverFactory, MockControl, MockDriver, MockElement, PageDriver};
pub use field::{classify, ControlDescriptor, FieldKind, CONTROL_SELECTOR, CREDENTIAL_NAMES};
pub use intercept::{
    HttpMethod, InterceptHit, InterceptRule, InterceptionMismatch, NetworkInterception,
    ResponseWatch, SyntheticResponse, WatchedResponse, LOGIN_API_PATH, MOCKED_RECIPE_ID,
    WATCHED_BODY_LIMIT,
};
pub use result::{ProbeError, ProbeResult};
pub use scenario::recipe::{submit_recipe, RecipeDraft, SubmitOutcome};
pub use scenario::{
    ScenarioId, ScenarioResult, ScenarioRunner, ScenarioStatus, SuiteReport, SLOW_FACTOR,
};
pub use selector::{resolve, resolve_optional, CandidateList, ElementRef, Scope, Selector};
pub use session::{with_session, Session};
pub use wait::{
    poll_for, wait_for_any_visible, wait_for_text, wait_for_url, wait_for_visible, wait_until,
    WaitOptions, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::autofill::*;
    #[cfg(feature = "browser")]
    pub use super::browser::*;
    pub use super::config::*;
    pub use super::driver::*;
    pub use super::field::*;
    pub use super::intercept::*;
    pub use super::result::*;
    pub use super::scenario::recipe::{submit_recipe, RecipeDraft, SubmitOutcome};
    pub use super::scenario::*;
    pub use super::selector::*;
    pub use super::session::*;
    pub use super::wait::*;
}
