//! Authentication scenarios.

use regex::Regex;
use tracing::debug;

use super::ScenarioStatus;
use crate::driver::PageDriver;
use crate::result::{ProbeError, ProbeResult};
use crate::selector::{resolve_optional, CandidateList, Scope, Selector};
use crate::session::Session;
use crate::wait::{poll_for, wait_for_url};

/// URL of the auth page
pub const AUTH_PATTERN: &str = r"/auth";

/// URL of a sign-up page
pub const SIGNUP_PATTERN: &str = r"/signup|/register";

/// Host every Google sign-in link points at
pub const GOOGLE_OAUTH_HOST: &str = "accounts.google.com";

/// A form holding both credential inputs
pub fn login_form() -> CandidateList {
    CandidateList::css([r#"form:has(input[name="email"]):has(input[name="password"])"#])
}

/// Links or buttons leading to sign-up
pub fn signup_control() -> CandidateList {
    CandidateList::new([
        Selector::css_with_text("a", "Sign up"),
        Selector::css_with_text("a", "Signup"),
        Selector::css_with_text("a", "Register"),
        Selector::css_with_text("button", "Sign up"),
    ])
}

/// Forms a sign-up control may open in place
pub fn signup_form() -> CandidateList {
    CandidateList::css([
        r#"form:has(input[name="confirmPassword"])"#,
        r#"form:has(input[name="confirm_password"])"#,
        r#"form:has(input[name="email"]):has(input[name="password"])"#,
    ])
}

/// Google sign-in control
pub fn google_control() -> CandidateList {
    CandidateList::new([
        Selector::css_with_text("button", "Google"),
        Selector::css_with_text("a", "Google"),
        Selector::css_with_text("button", "Sign in with Google"),
        Selector::css(r#"a[href*="accounts.google.com"]"#),
    ])
}

/// Error message or alert after a rejected login
pub fn login_error() -> CandidateList {
    CandidateList::new([
        Selector::text("invalid"),
        Selector::text("incorrect"),
        Selector::text("wrong"),
        Selector::text("failed"),
        Selector::css(r#"[role="alert"], .error, .text-red-500, .text-destructive"#),
    ])
}

/// Controls that only render for a logged-in user on the browse page
pub fn browse_controls() -> CandidateList {
    CandidateList::new([
        Selector::css_with_text("button", "Filter"),
        Selector::test_id("browse-list"),
        Selector::test_id("recipe-card"),
    ])
}

/// The logout control
pub fn logout_control() -> CandidateList {
    CandidateList::new([
        Selector::css(r#"[title="Logout"]"#),
        Selector::css(r#"[aria-label="Logout"]"#),
        Selector::css_with_text("button", "Logout"),
    ])
}

/// Opening the app unauthenticated lands on /auth with a login form
pub async fn login_form_is_shown<D: PageDriver>(
    session: &mut Session<D>,
) -> ProbeResult<ScenarioStatus> {
    session.goto("").await?;
    let wait = session.element_wait();
    wait_for_url(session.driver(), &Regex::new(AUTH_PATTERN)?, wait).await?;
    session
        .wait_visible(&login_form(), session.config().timeouts.element())
        .await?;
    Ok(ScenarioStatus::Passed)
}

/// Match counts of every candidate, in order
async fn candidate_counts<D: PageDriver>(
    driver: &D,
    candidates: &CandidateList,
) -> ProbeResult<Vec<usize>> {
    let mut counts = Vec::with_capacity(candidates.len());
    for selector in candidates.candidates() {
        counts.push(driver.count(&Scope::Page, selector).await?);
    }
    Ok(counts)
}

/// The sign-up control leads to a sign-up page or opens a new form.
///
/// Forms already on the page before the click do not count.
pub async fn signup_link_works<D: PageDriver>(
    session: &mut Session<D>,
) -> ProbeResult<ScenarioStatus> {
    session.goto("auth").await?;
    let wait = session.element_wait();
    let signup = session.wait_visible(&signup_control(), wait.timeout()).await?;
    let forms = &signup_form();
    let before = &candidate_counts(session.driver(), forms).await?;
    if let Err(e) = session.driver().click(&signup).await {
        debug!(error = %e, "sign-up click failed, checking for an inline form");
    }

    let driver = session.driver();
    let signup_url = &Regex::new(SIGNUP_PATTERN)?;
    poll_for("sign-up page or a new form", wait, move || async move {
        if signup_url.is_match(&driver.current_url().await?) {
            return Ok(Some(()));
        }
        let after = candidate_counts(driver, forms).await?;
        Ok(after.iter().zip(before).any(|(a, b)| a > b).then_some(()))
    })
    .await?;
    Ok(ScenarioStatus::Passed)
}

/// A Google sign-in control, when offered, points at Google's OAuth host
pub async fn google_login_offered<D: PageDriver>(
    session: &mut Session<D>,
) -> ProbeResult<ScenarioStatus> {
    session.goto("auth").await?;
    session
        .wait_visible(&login_form(), session.config().timeouts.element())
        .await?;
    let google = google_control();
    if resolve_optional(session.driver(), &google, &Scope::Page)
        .await?
        .is_none()
    {
        return Ok(ScenarioStatus::skipped("no Google sign-in on this build"));
    }
    let control = session
        .wait_visible(&google, session.config().timeouts.element())
        .await?;
    match session.driver().attribute(&control, "href").await? {
        Some(href) if !href.contains(GOOGLE_OAUTH_HOST) => Err(ProbeError::assertion(format!(
            "Google sign-in points at {href}, expected {GOOGLE_OAUTH_HOST}"
        ))),
        href => {
            debug!(%control, ?href, "Google sign-in offered");
            Ok(ScenarioStatus::Passed)
        }
    }
}

/// Wrong credentials show an error and keep the user on /auth
pub async fn invalid_login_is_rejected<D: PageDriver>(
    session: &mut Session<D>,
) -> ProbeResult<ScenarioStatus> {
    session.goto("auth").await?;
    session
        .submit_credentials("invalid@example.com", "NotTheRightOne!")
        .await?;
    let error = session
        .wait_visible(&login_error(), session.config().timeouts.element())
        .await?;
    debug!(%error, "login error shown");

    let url = session.current_url().await?;
    if !Regex::new(AUTH_PATTERN)?.is_match(&url) {
        return Err(ProbeError::assertion(format!(
            "rejected login left /auth for {url}"
        )));
    }
    Ok(ScenarioStatus::Passed)
}

/// After login the browse page shows its controls
pub async fn valid_login_reaches_browse<D: PageDriver>(
    session: &mut Session<D>,
) -> ProbeResult<ScenarioStatus> {
    let url = session.current_url().await?;
    let base_url = &session.config().base_url;
    if !url.starts_with(base_url.as_str()) || Regex::new(AUTH_PATTERN)?.is_match(&url) {
        return Err(ProbeError::assertion(format!(
            "expected the browse page under {base_url}, got {url}"
        )));
    }
    session
        .wait_visible(&browse_controls(), session.config().timeouts.login())
        .await?;
    Ok(ScenarioStatus::Passed)
}

/// Logging out returns to /auth
pub async fn logout_returns_to_auth<D: PageDriver>(
    session: &mut Session<D>,
) -> ProbeResult<ScenarioStatus> {
    let wait = session.element_wait();
    let logout = session.wait_visible(&logout_control(), wait.timeout()).await?;
    session.driver().click(&logout).await?;
    wait_for_url(session.driver(), &Regex::new(AUTH_PATTERN)?, wait).await?;
    Ok(ScenarioStatus::Passed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{ProbeConfig, Timeouts};
    use crate::driver::{MockDriver, MockElement};

    fn session(driver: MockDriver) -> Session<MockDriver> {
        let config = ProbeConfig::new()
            .with_base_url("https://app.test")
            .unwrap()
            .with_timeouts(Timeouts::uniform(30));
        Session::new(driver, config)
    }

    fn auth_page() -> MockDriver {
        MockDriver::new()
            .with_element(r#"input[name="email"]"#, MockElement::visible())
            .with_element(r#"input[name="password"]"#, MockElement::visible())
            .with_element(r#"button[type="submit"]"#, MockElement::visible())
    }

    #[tokio::test]
    async fn test_login_form_requires_auth_redirect() {
        let mut s = session(MockDriver::new().with_element(
            r#"form:has(input[name="email"]):has(input[name="password"])"#,
            MockElement::visible(),
        ));
        let err = login_form_is_shown(&mut s).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_signup_link_navigates() {
        let driver = MockDriver::new()
            .with_element(r#"a:has-text("Register")"#, MockElement::visible())
            .with_click_navigation(r#"a:has-text("Register")"#, "https://app.test/register");
        let mut s = session(driver);
        assert_eq!(signup_link_works(&mut s).await.unwrap(), ScenarioStatus::Passed);
    }

    const LOGIN_FORM: &str = r#"form:has(input[name="email"]):has(input[name="password"])"#;

    #[tokio::test]
    async fn test_signup_opens_inline_form() {
        let driver = MockDriver::new()
            .with_element(LOGIN_FORM, MockElement::visible())
            .with_element(r#"a:has-text("Sign up")"#, MockElement::visible())
            .with_click_reveal(
                r#"a:has-text("Sign up")"#,
                r#"form:has(input[name="confirmPassword"])"#,
                MockElement::visible(),
            );
        let mut s = session(driver);
        assert_eq!(signup_link_works(&mut s).await.unwrap(), ScenarioStatus::Passed);
    }

    #[tokio::test]
    async fn test_signup_click_without_effect_fails() {
        let driver = MockDriver::new()
            .with_element(LOGIN_FORM, MockElement::visible())
            .with_element(r#"a:has-text("Register")"#, MockElement::visible());
        let mut s = session(driver);
        let err = signup_link_works(&mut s).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(s.driver().was_called("click"));
    }

    mod google_tests {
        use super::*;

        fn google_page(control: MockElement) -> MockDriver {
            MockDriver::new()
                .with_element(LOGIN_FORM, MockElement::visible())
                .with_element(r#"a:has-text("Google")"#, control)
        }

        #[tokio::test]
        async fn test_google_link_to_oauth_host() {
            let control = MockElement::visible()
                .with_attribute("href", "https://accounts.google.com/o/oauth2/auth?client_id=x");
            let mut s = session(google_page(control));
            assert_eq!(google_login_offered(&mut s).await.unwrap(), ScenarioStatus::Passed);
        }

        #[tokio::test]
        async fn test_google_button_without_href() {
            let driver = MockDriver::new()
                .with_element(LOGIN_FORM, MockElement::visible())
                .with_element(r#"button:has-text("Google")"#, MockElement::visible());
            let mut s = session(driver);
            assert_eq!(google_login_offered(&mut s).await.unwrap(), ScenarioStatus::Passed);
        }

        #[tokio::test]
        async fn test_google_link_elsewhere_fails() {
            let control =
                MockElement::visible().with_attribute("href", "https://login.example.com/google");
            let mut s = session(google_page(control));
            let err = google_login_offered(&mut s).await.unwrap_err();
            assert!(matches!(err, ProbeError::AssertionFailed { .. }));
            assert!(err.to_string().contains("login.example.com"));
        }

        #[tokio::test]
        async fn test_google_absent_is_skipped() {
            let driver = MockDriver::new().with_element(LOGIN_FORM, MockElement::visible());
            let mut s = session(driver);
            let status = google_login_offered(&mut s).await.unwrap();
            assert!(matches!(status, ScenarioStatus::Skipped { .. }));
        }

        #[tokio::test]
        async fn test_google_needs_the_auth_page() {
            let mut s = session(MockDriver::new());
            assert!(google_login_offered(&mut s).await.unwrap_err().is_timeout());
        }
    }

    #[tokio::test]
    async fn test_invalid_login_with_alert() {
        let driver = auth_page().with_element(
            r#"[role="alert"], .error, .text-red-500, .text-destructive"#,
            MockElement::visible().with_text("Invalid credentials"),
        );
        let mut s = session(driver);
        assert_eq!(
            invalid_login_is_rejected(&mut s).await.unwrap(),
            ScenarioStatus::Passed
        );
    }

    #[tokio::test]
    async fn test_invalid_login_that_navigates_away_fails() {
        let driver = auth_page()
            .with_element("text=invalid", MockElement::visible())
            .with_click_navigation(r#"button[type="submit"]"#, "https://app.test/browse");
        let mut s = session(driver);
        let err = invalid_login_is_rejected(&mut s).await.unwrap_err();
        assert!(matches!(err, ProbeError::AssertionFailed { .. }));
    }

    #[tokio::test]
    async fn test_logout() {
        let driver = MockDriver::new()
            .with_url("https://app.test/")
            .with_element(r#"[aria-label="Logout"]"#, MockElement::visible())
            .with_click_navigation(r#"[aria-label="Logout"]"#, "https://app.test/auth");
        let mut s = session(driver);
        assert_eq!(logout_returns_to_auth(&mut s).await.unwrap(), ScenarioStatus::Passed);
    }

    #[tokio::test]
    async fn test_valid_login_rejects_auth_url() {
        let driver = MockDriver::new().with_url("https://app.test/auth");
        let mut s = session(driver);
        assert!(valid_login_reaches_browse(&mut s).await.is_err());
    }
}
