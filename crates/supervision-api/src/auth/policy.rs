//! Route policy table.
//!
//! Maps (method, path) to the set of scopes of which a caller must hold at
//! least one. Patterns are path templates whose parameter segments are
//! written `:name` or `{name}`; a parameter matches exactly one non-empty
//! segment. There are no wildcards.

use std::collections::BTreeSet;

/// Scopes required by a route; a caller needs at least one of them.
pub type ScopeSet = BTreeSet<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

/// One registered route and its required scopes.
#[derive(Debug, Clone)]
pub struct RouteRequirement {
    method: String,
    pattern: String,
    segments: Vec<Segment>,
    scopes: ScopeSet,
}

impl RouteRequirement {
    fn new(method: &str, pattern: &str, scopes: ScopeSet) -> Self {
        let segments = split_path(pattern)
            .map(|segment| {
                if segment.starts_with(':')
                    || (segment.starts_with('{') && segment.ends_with('}'))
                {
                    Segment::Param
                } else {
                    Segment::Literal(segment.to_string())
                }
            })
            .collect();

        Self {
            method: method.to_ascii_uppercase(),
            pattern: pattern.to_string(),
            segments,
            scopes,
        }
    }

    /// HTTP method (uppercase).
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Path pattern as registered.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Required scopes.
    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Literal(_)))
            .count()
    }

    fn matches(&self, method: &str, segments: &[&str]) -> bool {
        self.method.eq_ignore_ascii_case(method)
            && self.segments.len() == segments.len()
            && self
                .segments
                .iter()
                .zip(segments)
                .all(|(pattern, actual)| match pattern {
                    Segment::Literal(literal) => literal == actual,
                    Segment::Param => !actual.is_empty(),
                })
    }
}

/// Segments of a path, ignoring the leading slash and one trailing slash.
fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    path.split('/').filter(move |_| !path.is_empty())
}

/// Immutable-after-startup table of route requirements.
#[derive(Debug, Clone, Default)]
pub struct RoutePolicy {
    routes: Vec<RouteRequirement>,
}

impl RoutePolicy {
    /// An empty table; every route is unmatched.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route. Re-registering the same method and pattern replaces
    /// the earlier scopes.
    pub fn register<I, S>(&mut self, method: &str, pattern: &str, scopes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let route = RouteRequirement::new(method, pattern, scopes.into_iter().map(Into::into).collect());

        if let Some(existing) = self.routes.iter_mut().find(|existing| {
            existing.method == route.method && existing.segments == route.segments
        }) {
            tracing::debug!(
                target: "api.auth.policy",
                method = %route.method,
                pattern = %route.pattern,
                "Replacing route requirement"
            );
            *existing = route;
        } else {
            self.routes.push(route);
        }
    }

    /// Builder-style [`RoutePolicy::register`].
    #[must_use]
    pub fn with_route(mut self, method: &str, pattern: &str, scopes: &[&str]) -> Self {
        self.register(method, pattern, scopes.iter().copied());
        self
    }

    /// Scopes required for `method` and `path`, or `None` when no route
    /// matches. The most specific match (most literal segments) wins.
    pub fn required_scopes(&self, method: &str, path: &str) -> Option<&ScopeSet> {
        let segments: Vec<&str> = split_path(path).collect();

        self.routes
            .iter()
            .filter(|route| route.matches(method, &segments))
            .max_by_key(|route| route.literal_count())
            .map(|route| &route.scopes)
    }

    /// Registered routes in registration order.
    pub fn routes(&self) -> &[RouteRequirement] {
        &self.routes
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

const STUDENT: &str = "read:student";
const SUPERVISOR: &str = "read:supervisor";
const ADMIN: &str = "read:admin";

/// Route requirements of the supervision backend.
pub fn supervision_routes() -> RoutePolicy {
    let both: &[&str] = &[SUPERVISOR, STUDENT];

    RoutePolicy::new()
        .with_route("GET", "/verify", both)
        // Questions
        .with_route("POST", "/newQuestion", &[STUDENT])
        .with_route("POST", "/newAnswer", both)
        .with_route("GET", "/getQuestions", both)
        // Applications
        .with_route("GET", "/getApplications", both)
        .with_route("GET", "/getApplicationsForStudent", &[STUDENT])
        .with_route("GET", "/getAllAcceptedRequests", both)
        .with_route("GET", "/getSpecificApplications/:id", both)
        .with_route("POST", "/createApplication", both)
        .with_route("PATCH", "/declineApplication", both)
        .with_route("PATCH", "/addSecondReader/:id", &[SUPERVISOR])
        .with_route("PATCH", "/disableAlert/:id", both)
        // Projects
        .with_route("GET", "/getSupervisors", both)
        .with_route("GET", "/getProjectStatus", both)
        .with_route("GET", "/getProjects", both)
        .with_route("GET", "/getProjectID", both)
        .with_route("GET", "/getProjectName/:id", both)
        .with_route("GET", "/getUsername/:id", both)
        .with_route("POST", "/createProject", both)
        // Gantt chart and feedback
        .with_route("GET", "/getGanttItem/:id", both)
        .with_route("GET", "/getGantt/:id", both)
        .with_route("GET", "/getFeedback/:id", both)
        .with_route("POST", "/createGanttItem", both)
        .with_route("PATCH", "/completeGanttItem", both)
        .with_route("PATCH", "/updateFeedback", both)
        .with_route("DELETE", "/deleteGanttItem/:id", both)
        // Users
        .with_route("POST", "/createSupervisorUser", &[ADMIN])
        .with_route("POST", "/createStudentUser", both)
}
