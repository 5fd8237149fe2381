//! Scenario catalogue and runner.
//!
//! Each [`ScenarioId`] names one end-to-end check against the recipe app.
//! [`ScenarioRunner`] runs them sequentially, one fresh browser session
//! each, and collects a [`SuiteReport`].

pub mod auth;
pub mod browse;
pub mod recipe;

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ProbeConfig;
use crate::driver::{DriverFactory, PageDriver};
use crate::result::ProbeResult;
use crate::session::{with_session, Session};

/// Scenarios slower than this factor get a longer budget
pub const SLOW_FACTOR: u32 = 3;

/// Every scenario in the catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioId {
    /// The auth page renders a login form
    AuthPageShowsLoginForm,
    /// The auth page links to sign-up
    AuthPageLinksToSignup,
    /// A Google sign-in control, if any, points at Google
    AuthPageOffersGoogleLogin,
    /// Wrong credentials show an error and stay on /auth
    InvalidLoginShowsError,
    /// Valid credentials reach the browse page
    ValidLoginReachesBrowse,
    /// Logging out returns to /auth
    LogoutReturnsToAuth,
    /// Browse shows recipe cards or an empty state
    BrowseShowsRecipesOrEmptyState,
    /// A trending section, if any, is visible
    BrowseShowsTrending,
    /// A recipe detail page shows title, ingredients and steps
    RecipeDetailSections,
    /// A recipe detail page shows every section heading
    RecipeDetailHeadings,
    /// A recipe detail page shows description, time, servings, rating and image
    RecipeDetailOverview,
    /// A recipe detail page fills its info, ingredient, instruction and chef cards
    RecipeDetailCards,
    /// A recipe detail page offers rating and commenting
    RecipeDetailRatingAndComments,
    /// Submitting a recipe lands on its detail page
    SubmitRecipeCreatesRecipe,
    /// Submitting without a title is blocked by validation
    SubmitRecipeRejectsMissingTitle,
}

impl ScenarioId {
    /// Every scenario, in run order
    pub const ALL: [Self; 15] = [
        Self::AuthPageShowsLoginForm,
        Self::AuthPageLinksToSignup,
        Self::AuthPageOffersGoogleLogin,
        Self::InvalidLoginShowsError,
        Self::ValidLoginReachesBrowse,
        Self::LogoutReturnsToAuth,
        Self::BrowseShowsRecipesOrEmptyState,
        Self::BrowseShowsTrending,
        Self::RecipeDetailSections,
        Self::RecipeDetailHeadings,
        Self::RecipeDetailOverview,
        Self::RecipeDetailCards,
        Self::RecipeDetailRatingAndComments,
        Self::SubmitRecipeCreatesRecipe,
        Self::SubmitRecipeRejectsMissingTitle,
    ];

    /// Stable kebab-case name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AuthPageShowsLoginForm => "auth-page-shows-login-form",
            Self::AuthPageLinksToSignup => "auth-page-links-to-signup",
            Self::AuthPageOffersGoogleLogin => "auth-page-offers-google-login",
            Self::InvalidLoginShowsError => "invalid-login-shows-error",
            Self::ValidLoginReachesBrowse => "valid-login-reaches-browse",
            Self::LogoutReturnsToAuth => "logout-returns-to-auth",
            Self::BrowseShowsRecipesOrEmptyState => "browse-shows-recipes-or-empty-state",
            Self::BrowseShowsTrending => "browse-shows-trending",
            Self::RecipeDetailSections => "recipe-detail-sections",
            Self::RecipeDetailHeadings => "recipe-detail-headings",
            Self::RecipeDetailOverview => "recipe-detail-overview",
            Self::RecipeDetailCards => "recipe-detail-cards",
            Self::RecipeDetailRatingAndComments => "recipe-detail-rating-and-comments",
            Self::SubmitRecipeCreatesRecipe => "submit-recipe-creates-recipe",
            Self::SubmitRecipeRejectsMissingTitle => "submit-recipe-rejects-missing-title",
        }
    }

    /// Look up a scenario by name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }

    /// Whether the runner logs in before the body runs
    #[must_use]
    pub const fn needs_login(self) -> bool {
        !matches!(
            self,
            Self::AuthPageShowsLoginForm
                | Self::AuthPageLinksToSignup
                | Self::AuthPageOffersGoogleLogin
                | Self::InvalidLoginShowsError
        )
    }

    /// Whether the scenario gets [`SLOW_FACTOR`] times the usual budget
    #[must_use]
    pub const fn is_slow(self) -> bool {
        matches!(self, Self::SubmitRecipeCreatesRecipe)
    }

    /// Run the scenario body on an already prepared session
    pub fn run<'a, D: PageDriver>(
        self,
        session: &'a mut Session<D>,
    ) -> BoxFuture<'a, ProbeResult<ScenarioStatus>> {
        match self {
            Self::AuthPageShowsLoginForm => Box::pin(auth::login_form_is_shown(session)),
            Self::AuthPageLinksToSignup => Box::pin(auth::signup_link_works(session)),
            Self::AuthPageOffersGoogleLogin => Box::pin(auth::google_login_offered(session)),
            Self::InvalidLoginShowsError => Box::pin(auth::invalid_login_is_rejected(session)),
            Self::ValidLoginReachesBrowse => Box::pin(auth::valid_login_reaches_browse(session)),
            Self::LogoutReturnsToAuth => Box::pin(auth::logout_returns_to_auth(session)),
            Self::BrowseShowsRecipesOrEmptyState => {
                Box::pin(browse::recipes_or_empty_state(session))
            }
            Self::BrowseShowsTrending => Box::pin(browse::trending_if_present(session)),
            Self::RecipeDetailSections => Box::pin(recipe::detail_sections(session)),
            Self::RecipeDetailHeadings => Box::pin(recipe::detail_headings(session)),
            Self::RecipeDetailOverview => Box::pin(recipe::detail_overview(session)),
            Self::RecipeDetailCards => Box::pin(recipe::detail_cards(session)),
            Self::RecipeDetailRatingAndComments => {
                Box::pin(recipe::rating_and_comments(session))
            }
            Self::SubmitRecipeCreatesRecipe => Box::pin(recipe::submit_creates_recipe(session)),
            Self::SubmitRecipeRejectsMissingTitle => {
                Box::pin(recipe::submit_rejects_missing_title(session))
            }
        }
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a scenario ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioStatus {
    /// Every assertion held
    Passed,
    /// Preconditions absent on this deployment (e.g. no recipes yet)
    Skipped {
        /// Why
        reason: String,
    },
    /// An assertion, wait or driver call failed
    Failed {
        /// The error, rendered
        error: String,
    },
}

impl ScenarioStatus {
    /// Create a skipped status
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Whether the scenario failed
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Outcome of one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Scenario name
    pub name: String,
    /// How it ended
    #[serde(flatten)]
    pub status: ScenarioStatus,
    /// Wall-clock duration
    pub duration_ms: u64,
}

/// Outcome of a suite run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Deployment under test
    pub base_url: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Per-scenario results, in run order
    pub results: Vec<ScenarioResult>,
}

impl SuiteReport {
    /// Empty report for a run starting now
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            started_at: Utc::now(),
            results: Vec::new(),
        }
    }

    /// Number of passed scenarios
    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(|s| matches!(s, ScenarioStatus::Passed))
    }

    /// Number of failed scenarios
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(ScenarioStatus::is_failed)
    }

    /// Number of skipped scenarios
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ScenarioStatus::Skipped { .. }))
    }

    /// Whether nothing failed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Total duration of all scenarios
    #[must_use]
    pub fn total_duration_ms(&self) -> u64 {
        self.results.iter().map(|r| r.duration_ms).sum()
    }

    /// Serialize as pretty JSON
    pub fn to_json(&self) -> ProbeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn count(&self, pred: impl Fn(&ScenarioStatus) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.status)).count()
    }
}

/// Sequential scenario runner
#[derive(Debug)]
pub struct ScenarioRunner<F: DriverFactory> {
    factory: F,
    config: ProbeConfig,
    scenarios: Vec<ScenarioId>,
    filter: Option<String>,
    fail_fast: bool,
}

impl<F: DriverFactory> ScenarioRunner<F> {
    /// Runner over the whole catalogue
    #[must_use]
    pub fn new(factory: F, config: ProbeConfig) -> Self {
        Self {
            factory,
            config,
            scenarios: ScenarioId::ALL.to_vec(),
            filter: None,
            fail_fast: false,
        }
    }

    /// Restrict to an explicit list
    #[must_use]
    pub fn with_scenarios(mut self, scenarios: impl IntoIterator<Item = ScenarioId>) -> Self {
        self.scenarios = scenarios.into_iter().collect();
        self
    }

    /// Only run scenarios whose name contains `filter`
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Stop after the first failure
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Scenarios that will run, in order
    #[must_use]
    pub fn selected(&self) -> Vec<ScenarioId> {
        self.scenarios
            .iter()
            .copied()
            .filter(|id| {
                self.filter
                    .as_deref()
                    .map_or(true, |f| id.name().contains(f))
            })
            .collect()
    }

    /// Run every selected scenario
    pub async fn run(&self) -> SuiteReport {
        let mut report = SuiteReport::new(&self.config.base_url);
        for id in self.selected() {
            let started = Instant::now();
            info!(scenario = %id, "scenario started");
            let status = self.run_one(id).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            match &status {
                ScenarioStatus::Failed { error } => {
                    warn!(scenario = %id, duration_ms, %error, "scenario failed");
                }
                other => info!(scenario = %id, duration_ms, status = ?other, "scenario finished"),
            }
            let failed = status.is_failed();
            report.results.push(ScenarioResult {
                name: id.name().to_string(),
                status,
                duration_ms,
            });
            if failed && self.fail_fast {
                break;
            }
        }
        report
    }

    async fn run_one(&self, id: ScenarioId) -> ScenarioStatus {
        if id.needs_login() {
            if let Err(e) = self.config.credentials() {
                return ScenarioStatus::Failed {
                    error: e.to_string(),
                };
            }
        }
        let driver = match self.factory.create().await {
            Ok(driver) => driver,
            Err(e) => {
                return ScenarioStatus::Failed {
                    error: e.to_string(),
                }
            }
        };
        let mut limit = self.config.timeouts.scenario();
        if id.is_slow() {
            limit *= SLOW_FACTOR;
        }
        let outcome = with_session(driver, self.config.clone(), limit, move |session| {
            Box::pin(async move {
                if id.needs_login() {
                    session.login().await?;
                }
                id.run(session).await
            })
        })
        .await;
        outcome.unwrap_or_else(|e| ScenarioStatus::Failed {
            error: e.to_string(),
        })
    }
}
