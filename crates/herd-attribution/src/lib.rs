//! # Herd Attribution
//!
//! Collaborator interfaces around the lifecycle core:
//!
//! - [`IdentityResolver`] — resolves the caller identity from a request-like
//!   context. The core never validates credentials; it only consumes the
//!   resolved identity when attributing an operation in logs.
//! - [`RedirectUriBuilder`] — formats a browser-facing URI pointing at a
//!   cluster host. Pure formatting, no I/O; invoked by the web layer, never
//!   by the lifecycle core.
//!
//! Both take their configuration explicitly at construction. Nothing here
//! reads ambient process-wide state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Result type for attribution operations.
pub type AttributionResult<T> = std::result::Result<T, AttributionError>;

/// Errors from identity resolution and URI building.
#[derive(Debug, Clone, Error)]
pub enum AttributionError {
    /// Security is enabled but the request carried no authenticated user.
    #[error("security enabled but caller not authenticated")]
    Unauthenticated,

    /// No identity in the request and no configured fallback.
    #[error("cannot determine caller identity from request or configuration")]
    NoIdentity,

    /// The assembled redirect target was not a valid URI.
    #[error("invalid redirect target: {reason}")]
    InvalidTarget { reason: String },
}

/// Resolved caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request-like context an identity is resolved from.
///
/// A deliberately small surface: whatever web layer sits above the core maps
/// its request type into this.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Identity established by an authentication filter, if any.
    pub authenticated_user: Option<String>,
    /// Query-style parameters.
    pub params: HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_authenticated_user(mut self, user: impl Into<String>) -> Self {
        self.authenticated_user = Some(user.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Request parameter naming the caller when security is off.
pub const CALLER_PARAM: &str = "caller";

/// Resolves a caller identity from a request-like context.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, ctx: &RequestContext) -> AttributionResult<CallerIdentity>;
}

/// Identity resolver with explicit configuration.
///
/// - Security enabled: the authenticated user is required; an
///   unauthenticated request is an error, never silently attributed.
/// - Security disabled: the `caller` request parameter wins, then the
///   configured default identity.
#[derive(Debug, Clone)]
pub struct ConfiguredIdentityResolver {
    security_enabled: bool,
    default_identity: Option<String>,
}

impl ConfiguredIdentityResolver {
    pub fn new(security_enabled: bool, default_identity: Option<String>) -> Self {
        Self {
            security_enabled,
            default_identity,
        }
    }
}

impl IdentityResolver for ConfiguredIdentityResolver {
    fn resolve(&self, ctx: &RequestContext) -> AttributionResult<CallerIdentity> {
        if self.security_enabled {
            return ctx
                .authenticated_user
                .as_deref()
                .map(CallerIdentity::new)
                .ok_or(AttributionError::Unauthenticated);
        }

        if let Some(caller) = ctx.params.get(CALLER_PARAM) {
            return Ok(CallerIdentity::new(caller));
        }

        self.default_identity
            .as_deref()
            .map(CallerIdentity::new)
            .ok_or(AttributionError::NoIdentity)
    }
}

/// Builds browser-facing redirect URIs pointing at cluster hosts.
#[derive(Debug, Clone)]
pub struct RedirectUriBuilder {
    scheme: String,
    /// Port used instead of the host's advertised port when the scheme is
    /// https (TLS terminators commonly listen elsewhere).
    https_port_override: Option<u16>,
}

impl RedirectUriBuilder {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            https_port_override: None,
        }
    }

    pub fn with_https_port_override(mut self, port: u16) -> Self {
        self.https_port_override = Some(port);
        self
    }

    /// Build a redirect URI for `path` on `hostname`, attributed to
    /// `caller`.
    ///
    /// Extra query parameters are appended in iteration order after the
    /// caller attribution.
    pub fn build(
        &self,
        hostname: &str,
        info_port: u16,
        path: &str,
        caller: &CallerIdentity,
        params: &[(&str, &str)],
    ) -> AttributionResult<Url> {
        let port = match (self.scheme.as_str(), self.https_port_override) {
            ("https", Some(port)) => port,
            _ => info_port,
        };

        let base = format!("{}://{}:{}", self.scheme, hostname, port);
        let mut url = Url::parse(&base).map_err(|e| AttributionError::InvalidTarget {
            reason: e.to_string(),
        })?;

        url.set_path(path);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(CALLER_PARAM, caller.as_str());
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }
}
