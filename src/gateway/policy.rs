// ============================================================================
// Authorization Policy
// ============================================================================
//
// Static, ordered route table. The first pattern matching the request path
// decides what the caller needs:
//
//   /health           -> public
//   /admin/**         -> role in {ADMIN}
//   /**               -> any authenticated caller
//
// Pattern segments: a literal, `*` for exactly one segment, `**` for zero or
// more segments.
//
// ============================================================================

use std::collections::HashSet;
use std::fmt;

use crate::auth::AuthContext;

pub mod roles {
    pub const ADMIN: &str = "ADMIN";
    pub const CUSTOMER: &str = "CUSTOMER";
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    One,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn new(pattern: &str) -> Self {
        let segments = path_segments(pattern)
            .map(|s| match s {
                "**" => Segment::Any,
                "*" => Segment::One,
                literal => Segment::Literal(literal.to_string()),
            })
            .collect();

        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        let path: Vec<&str> = path_segments(path).collect();
        match_segments(&self.segments, &path)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// Empty segments are ignored, so `/admin/` and `/admin` are the same path.
fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::Any, rest)) => (0..=path.len()).any(|skip| match_segments(rest, &path[skip..])),
        Some((Segment::One, rest)) => !path.is_empty() && match_segments(rest, &path[1..]),
        Some((Segment::Literal(lit), rest)) => {
            path.first().is_some_and(|p| *p == lit.as_str()) && match_segments(rest, &path[1..])
        }
    }
}

/// What a route demands of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    /// Caller's role must be one of these (exact, case-sensitive).
    Roles(HashSet<String>),
}

impl Access {
    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Access::Roles(roles.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone)]
pub struct RouteRule {
    pub pattern: RoutePattern,
    pub access: Access,
}

impl RouteRule {
    pub fn new(pattern: &str, access: Access) -> Self {
        Self {
            pattern: RoutePattern::new(pattern),
            access,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    /// No identity on a route that needs one (401).
    Unauthenticated,
    /// Identity present, role not permitted (403).
    Forbidden,
}

#[derive(Debug, Clone)]
pub struct AuthorizationPolicy {
    rules: Vec<RouteRule>,
}

impl AuthorizationPolicy {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    /// The gateway's route table.
    pub fn default_table() -> Self {
        use roles::{ADMIN, CUSTOMER};

        Self::new(vec![
            RouteRule::new("/health", Access::Public),
            RouteRule::new("/api/auth/login", Access::Public),
            RouteRule::new("/auth/**", Access::Public),
            RouteRule::new("/admin/**", Access::roles([ADMIN])),
            RouteRule::new("/api/admin/**", Access::roles([ADMIN])),
            RouteRule::new("/users/**", Access::roles([ADMIN, CUSTOMER])),
            RouteRule::new("/api/users/**", Access::roles([ADMIN, CUSTOMER])),
            RouteRule::new("/api/products/**", Access::Public),
            RouteRule::new("/**", Access::Authenticated),
        ])
    }

    /// First rule whose pattern matches `path`.
    pub fn rule_for(&self, path: &str) -> Option<&RouteRule> {
        self.rules.iter().find(|rule| rule.pattern.matches(path))
    }

    /// Paths that match no rule require an authenticated caller.
    pub fn evaluate(&self, path: &str, auth: Option<&AuthContext>) -> AccessDecision {
        let access = self
            .rule_for(path)
            .map(|rule| &rule.access)
            .unwrap_or(&Access::Authenticated);

        match (access, auth) {
            (Access::Public, _) => AccessDecision::Allow,
            (_, None) => AccessDecision::Unauthenticated,
            (Access::Authenticated, Some(_)) => AccessDecision::Allow,
            (Access::Roles(allowed), Some(ctx)) if allowed.contains(&ctx.role) => {
                AccessDecision::Allow
            }
            (Access::Roles(_), Some(_)) => AccessDecision::Forbidden,
        }
    }
}

impl Default for AuthorizationPolicy {
    fn default() -> Self {
        Self::default_table()
    }
}
