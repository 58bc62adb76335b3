//! Roles and the static route table.
//!
//! Every role maps to a set of allowed path prefixes and a landing route. The
//! mapping is exhaustive over [`Role`] so adding a role forces a table entry.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Authentication entry point. Guard redirects carry the original path here.
pub const LOGIN_ROUTE: &str = "/login";
/// Query parameter holding the return target on [`LOGIN_ROUTE`].
pub const RETURN_PARAM: &str = "redirect";

const PUBLIC_ROUTES: &[&str] = &[
    "/",
    LOGIN_ROUTE,
    "/signup",
    "/forgot-password",
    "/results",
    "/results/request",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Teacher,
    Student,
    Anonymous,
}

impl Role {
    /// Parse a stored role name. Unknown names degrade to `Anonymous`.
    #[must_use]
    pub fn parse_lossy(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Self::Admin,
            "teacher" => Self::Teacher,
            "student" => Self::Student,
            _ => Self::Anonymous,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Student => "student",
            Self::Anonymous => "anonymous",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allowed prefixes and landing route for one role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleRoutes {
    pub allowed_prefixes: Vec<String>,
    pub default_route: String,
}

impl RoleRoutes {
    fn new(prefixes: &[&str], default_route: &str) -> Self {
        Self {
            allowed_prefixes: prefixes.iter().map(ToString::to_string).collect(),
            default_route: default_route.to_string(),
        }
    }
}

/// Static role → route configuration plus the role-independent public set.
#[derive(Clone, Debug)]
pub struct RouteTable {
    admin: RoleRoutes,
    teacher: RoleRoutes,
    student: RoleRoutes,
    anonymous: RoleRoutes,
    public_routes: Vec<String>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            admin: RoleRoutes::new(
                &["/admin", "/teacher", "/student", "/profile"],
                "/admin/dashboard",
            ),
            teacher: RoleRoutes::new(&["/teacher", "/profile"], "/teacher/dashboard"),
            student: RoleRoutes::new(&["/student", "/profile"], "/student/dashboard"),
            anonymous: RoleRoutes::new(&[], "/results"),
            public_routes: PUBLIC_ROUTES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl RouteTable {
    #[must_use]
    pub fn routes(&self, role: Role) -> &RoleRoutes {
        match role {
            Role::Admin => &self.admin,
            Role::Teacher => &self.teacher,
            Role::Student => &self.student,
            Role::Anonymous => &self.anonymous,
        }
    }

    /// Landing route after authentication. Pure: same role, same answer.
    #[must_use]
    pub fn default_route(&self, role: Role) -> &str {
        &self.routes(role).default_route
    }

    #[must_use]
    pub fn is_public(&self, path: &str) -> bool {
        let Some(path) = normalize_path(path) else {
            return false;
        };
        self.public_routes.iter().any(|route| route == path)
    }

    /// Whether `role` may view `path`. Public routes are open to every role.
    #[must_use]
    pub fn can_access_route(&self, role: Role, path: &str) -> bool {
        let Some(normalized) = normalize_path(path) else {
            return false;
        };
        if self.public_routes.iter().any(|route| route == normalized) {
            return true;
        }
        self.routes(role)
            .allowed_prefixes
            .iter()
            .any(|prefix| matches_prefix(normalized, prefix))
    }
}

/// Strip query/fragment and trailing slashes. Rejects relative or dot-segment paths.
pub(crate) fn normalize_path(path: &str) -> Option<&str> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    if !path.starts_with('/') {
        return None;
    }
    if path.split('/').any(|segment| segment == ".." || segment == ".") {
        return None;
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        Some("/")
    } else {
        Some(trimmed)
    }
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_route_is_stable_per_role() {
        let table = RouteTable::default();
        for role in [Role::Admin, Role::Teacher, Role::Student, Role::Anonymous] {
            assert_eq!(table.default_route(role), table.default_route(role));
        }
        assert_eq!(table.default_route(Role::Teacher), "/teacher/dashboard");
        assert_eq!(table.default_route(Role::Anonymous), "/results");
    }

    #[test]
    fn teacher_cannot_reach_admin_pages() {
        let table = RouteTable::default();
        assert!(!table.can_access_route(Role::Teacher, "/admin/settings"));
        assert!(table.can_access_route(Role::Teacher, "/teacher/classes/9"));
        assert!(table.can_access_route(Role::Admin, "/admin/settings"));
    }

    #[test]
    fn prefix_match_respects_segment_boundaries() {
        let table = RouteTable::default();
        assert!(!table.can_access_route(Role::Student, "/studentship"));
        assert!(table.can_access_route(Role::Student, "/student"));
        assert!(table.can_access_route(Role::Student, "/student/"));
    }

    #[test]
    fn public_routes_open_to_every_role() {
        let table = RouteTable::default();
        for role in [Role::Admin, Role::Teacher, Role::Student, Role::Anonymous] {
            assert!(table.can_access_route(role, "/results?student=S1"));
            assert!(table.can_access_route(role, LOGIN_ROUTE));
        }
        assert!(!table.can_access_route(Role::Anonymous, "/student/dashboard"));
    }

    #[test]
    fn dot_segments_fail_closed() {
        let table = RouteTable::default();
        assert!(!table.can_access_route(Role::Teacher, "/teacher/../admin/settings"));
        assert!(!table.is_public("/results/../admin"));
        assert!(!table.can_access_route(Role::Admin, "admin"));
    }

    #[test]
    fn role_parse_is_lossy_and_closed() {
        assert_eq!(Role::parse_lossy(" Teacher "), Role::Teacher);
        assert_eq!(Role::parse_lossy("admin"), Role::Admin);
        assert_eq!(Role::parse_lossy("superuser"), Role::Anonymous);
        assert_eq!(Role::Student.to_string(), "student");
    }
}
