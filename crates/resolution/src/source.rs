//! Resolution method identification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of resolver that produced (or failed to produce) a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    /// Leading label of the request host.
    Subdomain,
    /// Configured header names, then query parameter names.
    HeaderOrQuery,
    /// First path segment.
    PathSegment,
    /// Identity claims, optionally cross-validated against the request domain.
    Claim,
    /// Ordered fallback over other resolvers.
    Composite,
}

impl ResolutionMethod {
    /// Returns true if the method reads the URL the caller used (host or
    /// path) rather than caller-chosen values.
    pub fn is_url_based(&self) -> bool {
        matches!(self, ResolutionMethod::Subdomain | ResolutionMethod::PathSegment)
    }
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionMethod::Subdomain => write!(f, "subdomain"),
            ResolutionMethod::HeaderOrQuery => write!(f, "header_or_query"),
            ResolutionMethod::PathSegment => write!(f, "path_segment"),
            ResolutionMethod::Claim => write!(f, "claim"),
            ResolutionMethod::Composite => write!(f, "composite"),
        }
    }
}
