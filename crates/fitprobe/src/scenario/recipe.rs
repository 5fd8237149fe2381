//! Recipe detail and submission scenarios.
//!
//! Submission runs against a live deployment, so the recipe-create call is
//! answered by [`NetworkInterception`] and never reaches the backend. If the
//! app does not redirect on its own after the mocked `201`, the page is moved
//! to the mocked recipe client-side and the outcome says so.

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::ScenarioStatus;
use crate::autofill::AutoFill;
use crate::driver::PageDriver;
use crate::intercept::{NetworkInterception, MOCKED_RECIPE_ID};
use crate::result::{ProbeError, ProbeResult};
use crate::selector::{resolve, resolve_optional, CandidateList, ElementRef, Scope, Selector};
use crate::session::{submit_button, Session};
use crate::wait::{wait_for_any_visible, wait_for_url, wait_until};

/// Path of a recipe detail page
pub const RECIPE_DETAIL_PATTERN: &str = r"/recipe/[A-Za-z0-9_-]+$";

/// Path of the submission form
pub const SUBMIT_PAGE_PATTERN: &str = r"/submit-recipe$";

/// Heading shown after a client-side fallback
pub const FALLBACK_HEADING: &str = "Test E2E Pasta";

/// Section headings every recipe detail page renders
pub const REQUIRED_HEADINGS: [&str; 14] = [
    "Ingredients",
    "Instructions",
    "Recipe Info",
    "Prep Time",
    "Cook Time",
    "Difficulty",
    "Cuisine",
    "Main Ingredient",
    "Dietary Info",
    "Nutrition",
    "Chef",
    "Rate this Recipe",
    "Add a Comment",
    "Comments",
];

/// Stars in the rating widget
pub const RATING_STARS: usize = 5;

/// Labels inside the Recipe Info card
pub const RECIPE_INFO_LABELS: [&str; 5] =
    ["Prep Time", "Cook Time", "Difficulty", "Cuisine", "Main Ingredient"];

/// Fewest detail paragraphs the Recipe Info card shows
pub const RECIPE_INFO_MIN_DETAILS: usize = 5;

/// Longest wait for one section once the page heading is visible
const SECTION_CHECK: Duration = Duration::from_millis(750);

/// Shortest wait for one section, even once the shared budget is spent
const SECTION_FLOOR: Duration = Duration::from_millis(100);

/// Links to recipe detail pages
pub fn recipe_link() -> CandidateList {
    CandidateList::css([r#"a[href^="/recipe/"]"#])
}

/// Page title
pub fn page_heading() -> CandidateList {
    CandidateList::css(["h1"])
}

/// One ingredient entry
pub fn ingredient_item() -> CandidateList {
    CandidateList::new([
        Selector::test_id("ingredient-item"),
        Selector::has_child("section", "h2", "Ingredient"),
        Selector::css("ul li"),
    ])
}

/// One instruction step
pub fn step_item() -> CandidateList {
    CandidateList::new([
        Selector::test_id("step-item"),
        Selector::has_child("section", "h2", "Instruction"),
        Selector::css("ol li"),
    ])
}

/// Card whose `h3` contains `title`
pub fn card(title: &str) -> Selector {
    Selector::has_child(".rounded-lg", "h3", title)
}

/// Short description under the title
pub fn description() -> CandidateList {
    CandidateList::css(["h1 + p, .text-xl.text-gray-600"])
}

/// Main ingredient badge, or its label when the badge is unstyled
pub fn main_ingredient_badge() -> CandidateList {
    CandidateList::new([
        Selector::css(".bg-primary-100.text-primary-800"),
        Selector::css_with_text("span", "Main Ingredient:"),
    ])
}

/// Text next to a lucide icon, e.g. `clock` or `users`
pub fn icon_label(scope: &str, icon: &str) -> CandidateList {
    CandidateList::css([format!("{scope} :has(> svg.lucide-{icon}) > span")])
}

/// Hero image
pub fn recipe_image() -> CandidateList {
    CandidateList::css([r#".aspect-video img, img[alt*="recipe" i]"#])
}

/// The submission form
pub fn recipe_form() -> CandidateList {
    CandidateList::css(["form"])
}

/// Title input, most specific first
pub fn title_field() -> CandidateList {
    CandidateList::css([
        r#"input[name="title"], #title, [placeholder*="title" i]"#,
        r#"form input[type="text"]"#,
    ])
}

/// Description input
pub fn description_field() -> CandidateList {
    CandidateList::css([
        r#"textarea[name="description"], #description, [placeholder*="description" i]"#,
        "form textarea",
    ])
}

/// Ingredients input
pub fn ingredients_field() -> CandidateList {
    CandidateList::css([
        r#"textarea[name="ingredients"], #ingredients, [placeholder*="ingredient" i], input[name^="ingredients"]"#,
    ])
}

/// Instructions input
pub fn steps_field() -> CandidateList {
    CandidateList::css([
        r#"textarea[name="instructions"], #instructions, [placeholder*="instruction" i], [placeholder*="step" i], input[name^="steps"]"#,
    ])
}

/// Controls failing native validation
pub fn invalid_controls() -> Selector {
    Selector::css("input:invalid, textarea:invalid, select:invalid")
}

/// Values typed into the submission form before auto-fill
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeDraft {
    /// Recipe title
    pub title: String,
    /// Description
    pub description: Option<String>,
    /// Ingredients, one per line
    pub ingredients: Option<String>,
    /// Steps, one per line
    pub steps: Option<String>,
    /// Prep time in minutes
    pub prep_time: Option<String>,
    /// Cook time in minutes
    pub cook_time: Option<String>,
}

impl RecipeDraft {
    /// Draft with only a title; auto-fill covers the rest
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            ingredients: None,
            steps: None,
            prep_time: None,
            cook_time: None,
        }
    }

    /// Realistic pasta recipe with a unique title
    #[must_use]
    pub fn pasta() -> Self {
        Self {
            title: unique_title(),
            description: Some("Automated test recipe to validate the creation flow.".to_string()),
            ingredients: Some("200g spaghetti\n2 tbsp olive oil\n1 garlic clove".to_string()),
            steps: Some("Boil pasta 8-10 min.\nSaute garlic.\nMix and serve.".to_string()),
            prep_time: Some("10".to_string()),
            cook_time: Some("15".to_string()),
        }
    }

    fn optional_fields(&self) -> [(CandidateList, Option<&str>); 5] {
        [
            (description_field(), self.description.as_deref()),
            (ingredients_field(), self.ingredients.as_deref()),
            (steps_field(), self.steps.as_deref()),
            (CandidateList::css(["#prepTime"]), self.prep_time.as_deref()),
            (CandidateList::css(["#cookTime"]), self.cook_time.as_deref()),
        ]
    }
}

/// `Test E2E Pasta <epoch millis>`
#[must_use]
pub fn unique_title() -> String {
    format!("{FALLBACK_HEADING} {}", chrono::Utc::now().timestamp_millis())
}

/// How a submission reached a recipe detail page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// The app redirected by itself
    Organic {
        /// Detail URL
        url: String,
    },
    /// The page was moved to the mocked recipe client-side
    SyntheticFallback {
        /// Detail URL
        url: String,
    },
}

impl SubmitOutcome {
    /// Final detail URL
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Organic { url } | Self::SyntheticFallback { url } => url,
        }
    }

    /// Whether the app redirected by itself
    #[must_use]
    pub const fn is_organic(&self) -> bool {
        matches!(self, Self::Organic { .. })
    }
}

/// Fill and submit the recipe form with network interception installed.
///
/// # Errors
///
/// Fails when the form or its title/submit controls cannot be found, when
/// submit never becomes enabled, or when the final page is not a recipe
/// detail page with a visible heading.
pub async fn submit_recipe<D: PageDriver>(
    session: &mut Session<D>,
    draft: &RecipeDraft,
) -> ProbeResult<SubmitOutcome> {
    let timeouts = session.config().timeouts;
    let mut interception = NetworkInterception::recipe_submission();
    interception.install(session.driver_mut()).await?;

    session.goto("submit-recipe").await?;
    wait_for_url(
        session.driver(),
        &Regex::new(SUBMIT_PAGE_PATTERN)?,
        timeouts.element().into(),
    )
    .await?;
    session.wait_visible(&recipe_form(), timeouts.element()).await?;

    let title = session.resolve(&title_field()).await?;
    session.driver().fill(&title, &draft.title).await?;
    for (candidates, value) in draft.optional_fields() {
        let Some(value) = value else { continue };
        if let Some(field) = resolve_optional(session.driver(), &candidates, &Scope::Page).await? {
            session.driver().fill(&field, value).await?;
        }
    }

    let report = AutoFill::new()
        .fill_empty(session.driver(), &Scope::first("form"))
        .await?;
    debug!(
        filled = report.filled_count(),
        skipped = report.skipped().count(),
        "remaining fields auto-filled"
    );

    let submit = session.resolve(&submit_button()).await?;
    {
        let driver = session.driver();
        let submit = &submit;
        wait_until("submit button to be enabled", timeouts.element().into(), move || {
            driver.is_enabled(submit)
        })
        .await?;
    }
    session.driver().click(&submit).await?;

    let detail = Regex::new(RECIPE_DETAIL_PATTERN)?;
    let outcome = match wait_for_url(session.driver(), &detail, timeouts.redirect().into()).await {
        Ok(url) => SubmitOutcome::Organic { url },
        Err(e) if e.is_timeout() => {
            info!("no redirect after submit, moving to the mocked recipe");
            session
                .driver_mut()
                .patch_location(&format!("/recipe/{MOCKED_RECIPE_ID}"), FALLBACK_HEADING)
                .await?;
            SubmitOutcome::SyntheticFallback {
                url: session.current_url().await?,
            }
        }
        Err(e) => return Err(e),
    };

    let url = session.current_url().await?;
    if !detail.is_match(&url) {
        return Err(ProbeError::assertion(format!(
            "expected a recipe detail URL after submit, got {url}"
        )));
    }
    session.wait_visible(&page_heading(), timeouts.element()).await?;

    if let Err(e) = interception.report_mismatches(session.driver()).await {
        warn!(error = %e, "could not read interception hits");
    }
    info!(?outcome, "recipe submitted");
    Ok(outcome)
}

/// Submitting a complete recipe lands on a recipe detail page
pub async fn submit_creates_recipe<D: PageDriver>(
    session: &mut Session<D>,
) -> ProbeResult<ScenarioStatus> {
    submit_recipe(session, &RecipeDraft::pasta()).await?;
    Ok(ScenarioStatus::Passed)
}

/// Submitting with an empty title stays on the form and flags invalid controls
pub async fn submit_rejects_missing_title<D: PageDriver>(
    session: &mut Session<D>,
) -> ProbeResult<ScenarioStatus> {
    let timeouts = session.config().timeouts;
    session.goto("submit-recipe").await?;
    session.wait_visible(&recipe_form(), timeouts.element()).await?;

    let title = session.resolve(&title_field()).await?;
    session.driver().fill(&title, "").await?;
    let before = session.current_url().await?;
    let submit = session.resolve(&submit_button()).await?;
    session.driver().click(&submit).await?;

    let driver = session.driver();
    let invalid = &invalid_controls();
    wait_until("an invalid form control", timeouts.element().into(), move || async move {
        Ok(driver.count(&Scope::Page, invalid).await? > 0)
    })
    .await?;

    let after = session.current_url().await?;
    if after != before {
        return Err(ProbeError::assertion(format!(
            "form with empty title navigated from {before} to {after}"
        )));
    }
    Ok(ScenarioStatus::Passed)
}

/// Open the first recipe on the browse page; `None` when there is none
pub async fn open_first_recipe<D: PageDriver>(
    session: &mut Session<D>,
) -> ProbeResult<Option<String>> {
    let timeouts = session.config().timeouts;
    let link = match session.wait_visible(&recipe_link(), timeouts.detail_link()).await {
        Ok(link) => link,
        Err(e) if e.is_timeout() => return Ok(None),
        Err(e) => return Err(e),
    };
    session.driver().click(&link).await?;
    let url = wait_for_url(
        session.driver(),
        &Regex::new(RECIPE_DETAIL_PATTERN)?,
        timeouts.redirect().into(),
    )
    .await?;
    debug!(%url, "recipe detail opened");
    Ok(Some(url))
}

const NO_RECIPES: &str = "no recipes available to open a detail page";

/// Shared bound for section checks on a page that already rendered.
///
/// Each check gets at most [`SECTION_CHECK`], the checks together at most
/// the budget, and never less than [`SECTION_FLOOR`] each.
#[derive(Debug, Clone, Copy)]
struct SectionBudget {
    deadline: Instant,
    floor: Duration,
}

impl SectionBudget {
    fn new(total: Duration) -> Self {
        Self {
            deadline: Instant::now() + total,
            floor: SECTION_FLOOR.min(total),
        }
    }

    fn next(&self) -> Duration {
        SECTION_CHECK
            .min(self.deadline.saturating_duration_since(Instant::now()))
            .max(self.floor)
    }
}

/// Fail with every collected problem, or pass when there are none
fn collected(what: &str, problems: &[String]) -> ProbeResult<ScenarioStatus> {
    if problems.is_empty() {
        return Ok(ScenarioStatus::Passed);
    }
    Err(ProbeError::assertion(format!("{what}: {}", problems.join("; "))))
}

/// Open the first recipe and wait for its title; `false` when there is none
async fn open_detail<D: PageDriver>(session: &mut Session<D>) -> ProbeResult<bool> {
    if open_first_recipe(session).await?.is_none() {
        return Ok(false);
    }
    let wait = session.config().timeouts.element();
    session.wait_visible(&page_heading(), wait).await?;
    Ok(true)
}

/// The detail page shows a title, an ingredient and a step
pub async fn detail_sections<D: PageDriver>(
    session: &mut Session<D>,
) -> ProbeResult<ScenarioStatus> {
    if open_first_recipe(session).await?.is_none() {
        return Ok(ScenarioStatus::skipped(NO_RECIPES));
    }
    let wait = session.config().timeouts.element();
    let heading = session.wait_visible(&page_heading(), wait).await?;
    let name = session.driver().text_content(&heading).await?;
    if name.as_deref().map_or(true, |n| n.trim().is_empty()) {
        return Err(ProbeError::assertion("recipe heading is empty"));
    }
    session.wait_visible(&ingredient_item(), wait).await?;
    session.wait_visible(&step_item(), wait).await?;
    Ok(ScenarioStatus::Passed)
}

/// The detail page shows every required section heading.
///
/// Once the title is visible the headings share one element timeout, and
/// every missing heading is reported together.
pub async fn detail_headings<D: PageDriver>(
    session: &mut Session<D>,
) -> ProbeResult<ScenarioStatus> {
    if !open_detail(session).await? {
        return Ok(ScenarioStatus::skipped(NO_RECIPES));
    }
    let budget = SectionBudget::new(session.config().timeouts.element());

    let mut missing = Vec::new();
    for name in REQUIRED_HEADINGS {
        let heading = CandidateList::new([Selector::heading(name)]);
        if let Err(e) = session.wait_visible(&heading, budget.next()).await {
            debug!(heading = name, error = %e, "heading missing");
            missing.push(name);
        }
    }
    if !missing.is_empty() {
        return Err(ProbeError::assertion(format!(
            "missing section headings: {}",
            missing.join(", ")
        )));
    }
    Ok(ScenarioStatus::Passed)
}

/// Visible element whose text matches `pattern`, when one is given
async fn check_text<D: PageDriver>(
    session: &Session<D>,
    candidates: &CandidateList,
    pattern: Option<&Regex>,
    bound: Duration,
) -> ProbeResult<()> {
    let element = session.wait_visible(candidates, bound).await?;
    let Some(pattern) = pattern else {
        return Ok(());
    };
    let text = session.driver().text_content(&element).await?.unwrap_or_default();
    if !pattern.is_match(&text) {
        return Err(ProbeError::assertion(format!(
            "{element} reads {:?}, expected /{pattern}/",
            text.trim()
        )));
    }
    Ok(())
}

/// The hero image is visible and has a source
async fn check_image<D: PageDriver>(session: &Session<D>, bound: Duration) -> ProbeResult<()> {
    let image = session.wait_visible(&recipe_image(), bound).await?;
    match session.driver().attribute(&image, "src").await? {
        Some(src) if !src.trim().is_empty() => Ok(()),
        _ => Err(ProbeError::assertion(format!("{image} has no src"))),
    }
}

/// The detail page shows description, badge, time, servings, rating and image
pub async fn detail_overview<D: PageDriver>(
    session: &mut Session<D>,
) -> ProbeResult<ScenarioStatus> {
    if !open_detail(session).await? {
        return Ok(ScenarioStatus::skipped(NO_RECIPES));
    }
    let budget = SectionBudget::new(session.config().timeouts.element());
    let facts = [
        ("description", description(), Some(Regex::new(r"\S")?)),
        ("main ingredient", main_ingredient_badge(), None),
        ("total time", icon_label("main", "clock"), Some(Regex::new(r"(?i)\d+\s*minutes?")?)),
        ("servings", icon_label("body", "users"), Some(Regex::new(r"(?i)\d+\s*servings?")?)),
        ("rating", icon_label("main", "star"), Some(Regex::new(r"\d+(\.\d+)?\s*\(")?)),
    ];

    let mut problems = Vec::new();
    for (name, candidates, pattern) in &facts {
        if let Err(e) = check_text(session, candidates, pattern.as_ref(), budget.next()).await {
            problems.push(format!("{name}: {e}"));
        }
    }
    if let Err(e) = check_image(session, budget.next()).await {
        problems.push(format!("image: {e}"));
    }
    collected("recipe overview incomplete", &problems)
}

/// Card titled `title`, visible within `bound`, as a query scope
async fn card_scope<D: PageDriver>(
    session: &Session<D>,
    title: &str,
    bound: Duration,
) -> ProbeResult<Scope> {
    let element = session
        .wait_visible(&CandidateList::new([card(title)]), bound)
        .await?;
    Ok(Scope::element(element))
}

/// First visible `css` match under `scope`
async fn visible_in<D: PageDriver>(
    session: &Session<D>,
    scope: &Scope,
    css: Selector,
    bound: Duration,
) -> ProbeResult<ElementRef> {
    wait_for_any_visible(session.driver(), scope, &CandidateList::new([css]), bound.into()).await
}

async fn recipe_info_card<D: PageDriver>(
    session: &Session<D>,
    budget: &SectionBudget,
) -> ProbeResult<()> {
    let scope = card_scope(session, "Recipe Info", budget.next()).await?;
    let mut missing = Vec::new();
    for label in RECIPE_INFO_LABELS {
        let heading = Selector::css_with_text("h4", label);
        if visible_in(session, &scope, heading, budget.next()).await.is_err() {
            missing.push(label);
        }
    }
    if !missing.is_empty() {
        return Err(ProbeError::assertion(format!("missing {}", missing.join(", "))));
    }
    let details = session
        .driver()
        .count(&scope, &Selector::css("p.text-gray-600"))
        .await?;
    if details < RECIPE_INFO_MIN_DETAILS {
        return Err(ProbeError::assertion(format!(
            "expected at least {RECIPE_INFO_MIN_DETAILS} details, found {details}"
        )));
    }
    Ok(())
}

/// A card listing at least one visible `item`
async fn list_card<D: PageDriver>(
    session: &Session<D>,
    budget: &SectionBudget,
    title: &str,
    item: &str,
) -> ProbeResult<()> {
    let scope = card_scope(session, title, budget.next()).await?;
    visible_in(session, &scope, Selector::css(item), budget.next()).await?;
    Ok(())
}

async fn chef_card<D: PageDriver>(session: &Session<D>, budget: &SectionBudget) -> ProbeResult<()> {
    let scope = card_scope(session, "Chef", budget.next()).await?;
    let name = visible_in(session, &scope, Selector::css("p.font-medium"), budget.next()).await?;
    let text = session.driver().text_content(&name).await?;
    if text.as_deref().map_or(true, |t| t.trim().is_empty()) {
        return Err(ProbeError::assertion("chef name is empty"));
    }
    Ok(())
}

/// Recipe Info, Ingredients, Instructions and Chef cards carry content
pub async fn detail_cards<D: PageDriver>(
    session: &mut Session<D>,
) -> ProbeResult<ScenarioStatus> {
    if !open_detail(session).await? {
        return Ok(ScenarioStatus::skipped(NO_RECIPES));
    }
    let budget = SectionBudget::new(session.config().timeouts.element());
    let checks = [
        ("Recipe Info", recipe_info_card(session, &budget).await),
        ("Ingredients", list_card(session, &budget, "Ingredients", "ul li").await),
        ("Instructions", list_card(session, &budget, "Instructions", "ol li").await),
        ("Chef", chef_card(session, &budget).await),
    ];
    let problems: Vec<String> = checks
        .into_iter()
        .filter_map(|(title, result)| result.err().map(|e| format!("{title} card: {e}")))
        .collect();
    collected("recipe cards incomplete", &problems)
}

/// The detail page offers five rating stars, a comment form and a comment list
pub async fn rating_and_comments<D: PageDriver>(
    session: &mut Session<D>,
) -> ProbeResult<ScenarioStatus> {
    if open_first_recipe(session).await?.is_none() {
        return Ok(ScenarioStatus::skipped(NO_RECIPES));
    }
    let wait = session.config().timeouts.element();

    let rating = session
        .wait_visible(&CandidateList::new([card("Rate this Recipe")]), wait)
        .await?;
    let rating_scope = Scope::element(rating);
    let stars = Selector::css(r#"button[title*="Rate"]"#);
    let count = session.driver().count(&rating_scope, &stars).await?;
    if count != RATING_STARS {
        return Err(ProbeError::assertion(format!(
            "expected {RATING_STARS} rating stars, found {count}"
        )));
    }
    let first_star = resolve(session.driver(), &CandidateList::new([stars]), &rating_scope).await?;
    if !session.driver().is_enabled(&first_star).await? {
        return Err(ProbeError::assertion("rating stars are disabled"));
    }

    let add_comment = session
        .wait_visible(&CandidateList::new([card("Add a Comment")]), wait)
        .await?;
    let comment_scope = Scope::element(add_comment);
    for control in [
        Selector::css("textarea"),
        Selector::css_with_text(r#"button[type="submit"]"#, "Post Comment"),
    ] {
        let element = resolve(session.driver(), &CandidateList::new([control]), &comment_scope).await?;
        if !session.driver().is_visible(&element).await? {
            return Err(ProbeError::assertion(format!("{element} is not visible")));
        }
    }

    session
        .wait_visible(&CandidateList::new([card("Comments")]), wait)
        .await?;
    Ok(ScenarioStatus::Passed)
}
