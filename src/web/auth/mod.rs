//! Bearer-token authentication for the API.
//!
//! Two tokens are configured: the API token for regular clients and the admin
//! token for administrative endpoints. The admin token is accepted everywhere.

pub mod extractors;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use subtle::ConstantTimeEq;

/// Tokens accepted by the API.
#[derive(Clone)]
pub struct AuthConfig {
    api_token: Arc<str>,
    admin_token: Arc<str>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig").finish_non_exhaustive()
    }
}

/// Privilege level granted by a presented token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    Client,
    Admin,
}

impl AuthConfig {
    pub fn new(api_token: &str, admin_token: &str) -> Self {
        Self {
            api_token: Arc::from(api_token),
            admin_token: Arc::from(admin_token),
        }
    }

    /// Resolve a presented token to a role. Both comparisons always run.
    pub fn role_for(&self, token: &str) -> Option<Role> {
        let is_admin = constant_time_eq(token, &self.admin_token);
        let is_client = constant_time_eq(token, &self.api_token);
        if is_admin {
            Some(Role::Admin)
        } else if is_client {
            Some(Role::Client)
        } else {
            None
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Length-independent constant-time string comparison.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let max_len = a.len().max(b.len());
    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];
    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);
    (lengths_equal & contents_equal).into()
}
