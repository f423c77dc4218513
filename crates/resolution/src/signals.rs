//! Request signals read by resolvers.
//!
//! Resolvers never see transport framing. The request boundary reduces each
//! inbound request to a [`RequestSignals`] value: host, path, headers, query
//! parameters and the caller's identity claims.

use axum::http::{header::HOST, request::Parts};
use serde::{Deserialize, Serialize};

/// One identity claim (name/value pair) from the caller's credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type, e.g. `tenant_id` or `role`.
    pub name: String,
    /// Claim value.
    pub value: String,
}

impl Claim {
    /// Creates a claim.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Verified identity claims attached to a request by the authentication
/// layer, as a request extension.
///
/// Palisade does not verify credentials. Whatever inserts this extension is
/// responsible for having done so.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityClaims(pub Vec<Claim>);

impl IdentityClaims {
    /// Creates a claim set.
    pub fn new(claims: impl IntoIterator<Item = Claim>) -> Self {
        Self(claims.into_iter().collect())
    }
}

/// Everything a resolver may inspect about a request.
///
/// # Example
///
/// ```
/// use palisade_resolution::signals::RequestSignals;
///
/// let signals = RequestSignals::new()
///     .with_host("acme.app.com:8443")
///     .with_path("/api/invoices")
///     .with_header("X-Tenant-ID", "t-acme")
///     .with_claim("role", "billing");
///
/// assert_eq!(signals.header("x-tenant-id"), Some("t-acme"));
/// assert!(signals.has_claim("role", "billing"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSignals {
    host: Option<String>,
    path: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    claims: Vec<Claim>,
}

impl RequestSignals {
    /// Creates empty signals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds signals from the head of an HTTP request.
    ///
    /// Header values that are not visible ASCII are skipped. Claims come from
    /// an [`IdentityClaims`] extension when present.
    pub fn from_parts(parts: &Parts) -> Self {
        let host = parts
            .headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| parts.uri.authority().map(|a| a.as_str().to_string()));

        let headers = parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let query = parts
            .uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        let claims = parts
            .extensions
            .get::<IdentityClaims>()
            .map(|c| c.0.clone())
            .unwrap_or_default();

        Self {
            host,
            path: parts.uri.path().to_string(),
            headers,
            query,
            claims,
        }
    }

    /// Sets the host (may include a port).
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a query parameter.
    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Adds an identity claim.
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.push(Claim::new(name, value));
        self
    }

    /// Returns the host, if known.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Returns the path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the first value of a header, matching the name
    /// case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the first value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the first value of a claim.
    pub fn claim(&self, name: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    /// Returns all claims in order.
    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    /// Returns `true` if any claim has exactly this name and value.
    pub fn has_claim(&self, name: &str, value: &str) -> bool {
        self.claims.iter().any(|c| c.name == name && c.value == value)
    }
}
