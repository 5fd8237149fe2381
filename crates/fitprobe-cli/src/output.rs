//! Human-readable rendering of reports and the catalogue

use console::style;
use fitprobe::{ScenarioId, ScenarioStatus, SuiteReport};
use serde::Serialize;

/// One catalogue row
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioInfo {
    /// Kebab-case name
    pub name: &'static str,
    /// Logs in before running
    pub needs_login: bool,
    /// Gets the extended budget
    pub slow: bool,
}

impl From<ScenarioId> for ScenarioInfo {
    fn from(id: ScenarioId) -> Self {
        Self {
            name: id.name(),
            needs_login: id.needs_login(),
            slow: id.is_slow(),
        }
    }
}

/// Every scenario, in run order
#[must_use]
pub fn catalogue() -> Vec<ScenarioInfo> {
    ScenarioId::ALL.into_iter().map(ScenarioInfo::from).collect()
}

/// Render the catalogue as text
#[must_use]
pub fn render_catalogue(color: bool) -> String {
    let mut out = String::new();
    for info in catalogue() {
        let mut tags = Vec::new();
        if info.needs_login {
            tags.push("login");
        }
        if info.slow {
            tags.push("slow");
        }
        let tags = if tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", tags.join(", "))
        };
        out.push_str(&format!(
            "{}{}\n",
            info.name,
            style(tags).dim().force_styling(color)
        ));
    }
    out
}

/// Render a suite report as text, one line per scenario plus a summary
#[must_use]
pub fn render_report(report: &SuiteReport, color: bool) -> String {
    let mut out = format!(
        "{} {}\n\n",
        style("fitprobe").bold().force_styling(color),
        report.base_url
    );
    for result in &report.results {
        let line = match &result.status {
            ScenarioStatus::Passed => format!(
                "{} {} ({}ms)",
                style("PASS").green().force_styling(color),
                result.name,
                result.duration_ms
            ),
            ScenarioStatus::Skipped { reason } => format!(
                "{} {} ({reason})",
                style("SKIP").yellow().force_styling(color),
                result.name
            ),
            ScenarioStatus::Failed { error } => format!(
                "{} {} ({}ms)\n     {error}",
                style("FAIL").red().force_styling(color),
                result.name,
                result.duration_ms
            ),
        };
        out.push_str(&line);
        out.push('\n');
    }
    let summary = format!(
        "{} passed, {} failed, {} skipped in {:.1}s",
        report.passed(),
        report.failed(),
        report.skipped(),
        report.total_duration_ms() as f64 / 1000.0
    );
    let summary = if report.is_success() {
        style(summary).green()
    } else {
        style(summary).red()
    };
    out.push('\n');
    out.push_str(&summary.force_styling(color).to_string());
    out.push('\n');
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use fitprobe::ScenarioResult;

    fn report() -> SuiteReport {
        let mut report = SuiteReport::new("https://app.test/");
        report.results.push(ScenarioResult {
            name: "auth-page-shows-login-form".to_string(),
            status: ScenarioStatus::Passed,
            duration_ms: 1200,
        });
        report.results.push(ScenarioResult {
            name: "recipe-detail-sections".to_string(),
            status: ScenarioStatus::skipped("no recipes"),
            duration_ms: 300,
        });
        report
    }

    #[test]
    fn test_plain_report() {
        let text = render_report(&report(), false);
        assert!(text.contains("PASS auth-page-shows-login-form (1200ms)"));
        assert!(text.contains("SKIP recipe-detail-sections (no recipes)"));
        assert!(text.contains("1 passed, 0 failed, 1 skipped in 1.5s"));
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn test_failure_shows_error_line() {
        let mut report = report();
        report.results.push(ScenarioResult {
            name: "logout-returns-to-auth".to_string(),
            status: ScenarioStatus::Failed {
                error: "Timed out after 5000ms waiting for URL matching /auth".to_string(),
            },
            duration_ms: 5000,
        });
        let text = render_report(&report, false);
        assert!(text.contains("FAIL logout-returns-to-auth"));
        assert!(text.contains("     Timed out after 5000ms"));
    }

    #[test]
    fn test_colored_report_has_escapes() {
        assert!(render_report(&report(), true).contains('\u{1b}'));
    }

    #[test]
    fn test_catalogue_tags() {
        let text = render_catalogue(false);
        assert!(text.contains("auth-page-shows-login-form\n"));
        assert!(text.contains("submit-recipe-creates-recipe [login, slow]"));
        assert_eq!(text.lines().count(), ScenarioId::ALL.len());
    }
}
