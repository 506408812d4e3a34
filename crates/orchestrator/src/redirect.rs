//! Resolved-URL classification after the tab loads.
//!
//! The only authentication signal this system has: a redirect onto a
//! login-looking path. Anything off the expected host is treated as a
//! navigation failure.

use url::Url;

/// Path fragments that indicate a login/auth redirect.
pub const AUTH_PATH_FRAGMENTS: &[&str] = &["/login", "/sign-in", "/auth"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// Still on the expected host, no auth path. Proceed.
    Ok,
    /// Redirected to a login/sign-in/auth path.
    Auth,
    /// Redirected off the expected host entirely.
    ForeignHost,
}

pub fn classify_resolved_url(expected: &str, resolved: &str) -> RedirectOutcome {
    let Ok(expected) = Url::parse(expected) else {
        return RedirectOutcome::ForeignHost;
    };
    let Ok(resolved) = Url::parse(resolved) else {
        return RedirectOutcome::ForeignHost;
    };

    if resolved.host_str() != expected.host_str() {
        return RedirectOutcome::ForeignHost;
    }

    let path = resolved.path().to_lowercase();
    if AUTH_PATH_FRAGMENTS.iter().any(|frag| path.contains(frag)) {
        return RedirectOutcome::Auth;
    }

    RedirectOutcome::Ok
}
