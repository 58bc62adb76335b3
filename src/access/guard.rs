//! Route authorization guard.
//!
//! Flow Overview:
//! 1) While identity resolution is outstanding the guard is `Loading` and does nothing.
//! 2) No identity on a non-public path redirects to the login entry point with the
//!    original path as return target.
//! 3) Identity without a profile waits one bounded window, then redirects to login.
//! 4) With a profile, `/login` bounces to the role's landing route and any path the
//!    role cannot reach (or a mismatched required role) redirects there too.
//!
//! Redirects away from a page the user is already on use history *replace* so the
//! back button cannot re-enter the loop. [`evaluate`] is pure; [`GuardMachine`]
//! drives it across asynchronous resolutions and discards stale ones.

use serde::Serialize;
use std::time::{Duration, Instant};
use url::form_urlencoded;
use utoipa::ToSchema;

use super::identity::{Identity, Profile};
use super::role::{LOGIN_ROUTE, RETURN_PARAM, Role, RouteTable, normalize_path};

/// Fallback target when the computed redirect would land on the current path.
const LOOP_BREAK_ROUTE: &str = "/";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityState {
    Resolving,
    Absent,
    Present(Identity),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProfileState {
    Resolving,
    /// Resolution finished without a profile, or the wait window elapsed.
    Missing,
    Ready(Profile),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Redirect { to: String, replace: bool },
    Pending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    Loading,
    Unauthorized,
    AuthorizedAllowed,
    AuthorizedRedirected,
}

/// Everything the guard needs for one decision.
#[derive(Clone, Debug)]
pub struct GuardInput<'a> {
    pub path: &'a str,
    pub identity: &'a IdentityState,
    pub profile: &'a ProfileState,
    pub required_role: Option<Role>,
}

/// Decide what to do with a page request.
#[must_use]
pub fn evaluate(table: &RouteTable, input: &GuardInput<'_>) -> Decision {
    let Some(path) = normalize_path(input.path) else {
        // Unparseable paths never render.
        return Decision::Redirect {
            to: LOGIN_ROUTE.to_string(),
            replace: true,
        };
    };
    let is_login = path == LOGIN_ROUTE;
    let is_public = table.is_public(path);

    match (input.identity, input.profile) {
        (IdentityState::Resolving, _) => Decision::Pending,
        (IdentityState::Absent, _) => {
            if is_public {
                Decision::Allow
            } else {
                Decision::Redirect {
                    to: login_with_return(input.path),
                    replace: false,
                }
            }
        }
        (IdentityState::Present(_), ProfileState::Resolving) => {
            if is_public && !is_login {
                Decision::Allow
            } else {
                Decision::Pending
            }
        }
        (IdentityState::Present(_), ProfileState::Missing) => {
            if is_public {
                Decision::Allow
            } else {
                Decision::Redirect {
                    to: login_with_return(input.path),
                    replace: true,
                }
            }
        }
        (IdentityState::Present(_), ProfileState::Ready(profile)) => {
            let role = profile.effective_role();
            let landing = table.default_route(role);
            let denied = is_login
                || !table.can_access_route(role, path)
                || input.required_role.is_some_and(|required| required != role);
            if !denied {
                return Decision::Allow;
            }
            let to = if normalize_path(landing) == Some(path) {
                LOOP_BREAK_ROUTE
            } else {
                landing
            };
            Decision::Redirect {
                to: to.to_string(),
                replace: true,
            }
        }
    }
}

/// Login URL carrying `path` as the return target.
#[must_use]
pub fn login_with_return(path: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(path.as_bytes()).collect();
    format!("{LOGIN_ROUTE}?{RETURN_PARAM}={encoded}")
}

/// Ticket for one navigation. Resolutions carrying an older ticket are dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Navigation {
    generation: u64,
}

/// Stateful driver around [`evaluate`] for one client session.
#[derive(Debug)]
pub struct GuardMachine {
    table: RouteTable,
    profile_timeout: Duration,
    generation: u64,
    path: String,
    required_role: Option<Role>,
    identity: IdentityState,
    profile: ProfileState,
    profile_deadline: Option<Instant>,
    state: GuardState,
}

impl GuardMachine {
    #[must_use]
    pub fn new(table: RouteTable, profile_timeout: Duration) -> Self {
        Self {
            table,
            profile_timeout,
            generation: 0,
            path: LOOP_BREAK_ROUTE.to_string(),
            required_role: None,
            identity: IdentityState::Resolving,
            profile: ProfileState::Resolving,
            profile_deadline: None,
            state: GuardState::Loading,
        }
    }

    #[must_use]
    pub fn state(&self) -> GuardState {
        self.state
    }

    /// Start evaluating a new path. Any resolution still in flight becomes stale.
    pub fn navigate(&mut self, path: &str, required_role: Option<Role>) -> Navigation {
        self.generation = self.generation.wrapping_add(1);
        self.path = path.to_string();
        self.required_role = required_role;
        self.identity = IdentityState::Resolving;
        self.profile = ProfileState::Resolving;
        self.profile_deadline = None;
        self.state = GuardState::Loading;
        Navigation {
            generation: self.generation,
        }
    }

    /// Apply the identity lookup result. Returns `None` for a stale ticket.
    pub fn resolve_identity(
        &mut self,
        ticket: Navigation,
        identity: Option<Identity>,
        now: Instant,
    ) -> Option<Decision> {
        if !self.is_current(ticket) {
            return None;
        }
        match identity {
            Some(identity) => {
                self.identity = IdentityState::Present(identity);
                // An unrepresentable deadline expires at once.
                self.profile_deadline =
                    Some(now.checked_add(self.profile_timeout).unwrap_or(now));
            }
            None => self.identity = IdentityState::Absent,
        }
        Some(self.decide())
    }

    /// Apply the profile lookup result. Returns `None` for a stale ticket.
    pub fn resolve_profile(
        &mut self,
        ticket: Navigation,
        profile: Option<Profile>,
    ) -> Option<Decision> {
        if !self.is_current(ticket) || !matches!(self.identity, IdentityState::Present(_)) {
            return None;
        }
        self.profile = profile.map_or(ProfileState::Missing, ProfileState::Ready);
        self.profile_deadline = None;
        Some(self.decide())
    }

    /// Force the login redirect once the profile wait window has elapsed.
    pub fn tick(&mut self, now: Instant) -> Option<Decision> {
        let deadline = self.profile_deadline?;
        if now < deadline || self.profile != ProfileState::Resolving {
            return None;
        }
        self.profile = ProfileState::Missing;
        self.profile_deadline = None;
        Some(self.decide())
    }

    fn is_current(&self, ticket: Navigation) -> bool {
        ticket.generation == self.generation
    }

    fn decide(&mut self) -> Decision {
        let decision = evaluate(
            &self.table,
            &GuardInput {
                path: &self.path,
                identity: &self.identity,
                profile: &self.profile,
                required_role: self.required_role,
            },
        );
        self.state = match (&decision, &self.identity) {
            (Decision::Pending, _) => GuardState::Loading,
            (Decision::Allow, _) => GuardState::AuthorizedAllowed,
            (Decision::Redirect { .. }, IdentityState::Present(_)) => {
                GuardState::AuthorizedRedirected
            }
            (Decision::Redirect { .. }, _) => GuardState::Unauthorized,
        };
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::identity::ProfileStatus;
    use uuid::Uuid;

    fn identity() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email_confirmed: true,
        }
    }

    fn profile(role: Role) -> Profile {
        Profile {
            role,
            status: ProfileStatus::Active,
        }
    }

    fn decide(
        path: &str,
        identity: &IdentityState,
        profile: &ProfileState,
        required_role: Option<Role>,
    ) -> Decision {
        evaluate(
            &RouteTable::default(),
            &GuardInput {
                path,
                identity,
                profile,
                required_role,
            },
        )
    }

    #[test]
    fn teacher_on_admin_page_goes_to_landing_route() {
        let decision = decide(
            "/admin/settings",
            &IdentityState::Present(identity()),
            &ProfileState::Ready(profile(Role::Teacher)),
            None,
        );
        assert_eq!(
            decision,
            Decision::Redirect {
                to: "/teacher/dashboard".to_string(),
                replace: true,
            }
        );
    }

    #[test]
    fn resolving_identity_is_pending_even_on_public_paths() {
        for path in ["/", "/login", "/admin"] {
            assert_eq!(
                decide(
                    path,
                    &IdentityState::Resolving,
                    &ProfileState::Resolving,
                    None
                ),
                Decision::Pending
            );
        }
    }

    #[test]
    fn anonymous_on_protected_path_carries_return_target() {
        let decision = decide(
            "/student/dashboard",
            &IdentityState::Absent,
            &ProfileState::Resolving,
            None,
        );
        assert_eq!(
            decision,
            Decision::Redirect {
                to: "/login?redirect=%2Fstudent%2Fdashboard".to_string(),
                replace: false,
            }
        );
        assert_eq!(
            decide("/results", &IdentityState::Absent, &ProfileState::Missing, None),
            Decision::Allow
        );
    }

    #[test]
    fn login_with_profile_bounces_to_landing_with_replace() {
        let decision = decide(
            "/login",
            &IdentityState::Present(identity()),
            &ProfileState::Ready(profile(Role::Student)),
            None,
        );
        assert_eq!(
            decision,
            Decision::Redirect {
                to: "/student/dashboard".to_string(),
                replace: true,
            }
        );
    }

    #[test]
    fn required_role_mismatch_redirects() {
        let decision = decide(
            "/profile",
            &IdentityState::Present(identity()),
            &ProfileState::Ready(profile(Role::Teacher)),
            Some(Role::Admin),
        );
        assert_eq!(
            decision,
            Decision::Redirect {
                to: "/teacher/dashboard".to_string(),
                replace: true,
            }
        );
    }

    #[test]
    fn redirect_onto_current_path_breaks_the_loop() {
        let decision = decide(
            "/teacher/dashboard",
            &IdentityState::Present(identity()),
            &ProfileState::Ready(profile(Role::Teacher)),
            Some(Role::Admin),
        );
        assert_eq!(
            decision,
            Decision::Redirect {
                to: "/".to_string(),
                replace: true,
            }
        );
    }

    #[test]
    fn inactive_profile_is_treated_as_anonymous() {
        let suspended = Profile {
            role: Role::Admin,
            status: ProfileStatus::Suspended,
        };
        let decision = decide(
            "/admin/settings",
            &IdentityState::Present(identity()),
            &ProfileState::Ready(suspended),
            None,
        );
        assert_eq!(
            decision,
            Decision::Redirect {
                to: "/results".to_string(),
                replace: true,
            }
        );
    }

    #[test]
    fn allowed_path_renders() {
        let decision = decide(
            "/teacher/classes",
            &IdentityState::Present(identity()),
            &ProfileState::Ready(profile(Role::Teacher)),
            Some(Role::Teacher),
        );
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn machine_waits_for_profile_then_times_out_to_login() {
        let mut machine = GuardMachine::new(RouteTable::default(), Duration::from_secs(2));
        let start = Instant::now();
        let ticket = machine.navigate("/student/dashboard", None);
        assert_eq!(machine.state(), GuardState::Loading);

        let decision = machine.resolve_identity(ticket, Some(identity()), start);
        assert_eq!(decision, Some(Decision::Pending));
        assert_eq!(machine.state(), GuardState::Loading);

        assert_eq!(machine.tick(start + Duration::from_millis(1_999)), None);
        assert_eq!(machine.state(), GuardState::Loading);

        let decision = machine.tick(start + Duration::from_secs(2));
        assert_eq!(
            decision,
            Some(Decision::Redirect {
                to: "/login?redirect=%2Fstudent%2Fdashboard".to_string(),
                replace: true,
            })
        );
        assert_eq!(machine.state(), GuardState::AuthorizedRedirected);
    }

    #[test]
    fn machine_with_unbounded_timeout_fails_closed() {
        let mut machine = GuardMachine::new(RouteTable::default(), Duration::MAX);
        let start = Instant::now();
        let ticket = machine.navigate("/student/dashboard", None);
        let _ = machine.resolve_identity(ticket, Some(identity()), start);
        assert!(matches!(
            machine.tick(start),
            Some(Decision::Redirect { .. })
        ));
    }

    #[test]
    fn machine_settles_when_profile_arrives_in_time() {
        let mut machine = GuardMachine::new(RouteTable::default(), Duration::from_secs(2));
        let start = Instant::now();
        let ticket = machine.navigate("/student/dashboard", None);
        let _ = machine.resolve_identity(ticket, Some(identity()), start);
        let decision = machine.resolve_profile(ticket, Some(profile(Role::Student)));
        assert_eq!(decision, Some(Decision::Allow));
        assert_eq!(machine.state(), GuardState::AuthorizedAllowed);
        assert_eq!(machine.tick(start + Duration::from_secs(5)), None);
    }

    #[test]
    fn machine_discards_stale_resolutions() {
        let mut machine = GuardMachine::new(RouteTable::default(), Duration::from_secs(2));
        let now = Instant::now();
        let stale = machine.navigate("/admin", None);
        let fresh = machine.navigate("/results", None);

        assert_eq!(machine.resolve_identity(stale, None, now), None);
        assert_eq!(machine.state(), GuardState::Loading);

        assert_eq!(
            machine.resolve_identity(fresh, None, now),
            Some(Decision::Allow)
        );
        assert_eq!(machine.state(), GuardState::AuthorizedAllowed);
    }

    #[test]
    fn machine_marks_unauthenticated_redirects() {
        let mut machine = GuardMachine::new(RouteTable::default(), Duration::from_secs(2));
        let ticket = machine.navigate("/teacher", None);
        let decision = machine.resolve_identity(ticket, None, Instant::now());
        assert!(matches!(decision, Some(Decision::Redirect { .. })));
        assert_eq!(machine.state(), GuardState::Unauthorized);
    }
}
