//! Browse page scenarios.

use std::time::Duration;

use tracing::{debug, info};

use super::ScenarioStatus;
use crate::driver::PageDriver;
use crate::result::{ProbeError, ProbeResult};
use crate::selector::{resolve_optional, CandidateList, Scope, Selector};
use crate::session::Session;

/// Soft checks get a short bound of their own
const SOFT_CHECK: Duration = Duration::from_secs(3);

/// A recipe card or link, or the empty-state message
pub fn recipes_or_empty_state_markers() -> CandidateList {
    CandidateList::new([
        Selector::test_id("recipe-card"),
        Selector::css(r#"a[href^="/recipe/"]"#),
        Selector::text("no recipes"),
    ])
}

/// Filter control
pub fn filter_control() -> CandidateList {
    CandidateList::new([
        Selector::css_with_text("button", "Filter"),
        Selector::test_id("filter-button"),
        Selector::css(r#"button[aria-label*="filter" i]"#),
    ])
}

/// Sort control
pub fn sort_control() -> CandidateList {
    CandidateList::new([
        Selector::css_with_text("button", "Sort"),
        Selector::test_id("sort-button"),
        Selector::css(r#"select[name*="sort" i]"#),
        Selector::css(r#"[role="combobox"][aria-label*="sort" i]"#),
    ])
}

/// Trending section heading
pub fn trending_heading() -> CandidateList {
    CandidateList::new([Selector::heading("trending")])
}

/// A trending section, when the build has one, is visible
pub async fn trending_if_present<D: PageDriver>(
    session: &mut Session<D>,
) -> ProbeResult<ScenarioStatus> {
    let heading = trending_heading();
    if resolve_optional(session.driver(), &heading, &Scope::Page)
        .await?
        .is_none()
    {
        info!("no trending section on this build");
        return Ok(ScenarioStatus::skipped("trending section not present"));
    }
    let found = session
        .wait_visible(&heading, session.config().timeouts.element())
        .await?;
    debug!(%found, "trending section visible");
    Ok(ScenarioStatus::Passed)
}

/// The browse page lists recipes or says there are none.
///
/// Filter and sort controls are checked softly: their absence is logged,
/// not failed, since not every build renders them.
pub async fn recipes_or_empty_state<D: PageDriver>(
    session: &mut Session<D>,
) -> ProbeResult<ScenarioStatus> {
    let found = session
        .wait_visible(
            &recipes_or_empty_state_markers(),
            session.config().timeouts.detail_link(),
        )
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ProbeError::assertion("browse page shows neither recipes nor an empty state")
            } else {
                e
            }
        })?;
    info!(%found, "browse content visible");

    let soft = SOFT_CHECK.min(session.config().timeouts.element());
    for (name, control) in [("filter", filter_control()), ("sort", sort_control())] {
        match session.wait_visible(&control, soft).await {
            Ok(element) => debug!(control = name, %element, "browse control visible"),
            Err(e) => info!(control = name, error = %e, "browse control not found on this build"),
        }
    }
    Ok(ScenarioStatus::Passed)
}
