//! Caller identity as handed to us by the identity subsystem.
//!
//! Token verification lives upstream; requests reach the core with the
//! resolved user id and the two flags the core cares about.

use crate::error::{ServiceError, ServiceResult};
use axum::http::HeaderMap;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ANONYMOUS_HEADER: &str = "x-user-anonymous";
pub const MODERATOR_HEADER: &str = "x-user-moderator";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub is_anonymous: bool,
    pub is_moderator: bool,
}

impl Caller {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_anonymous: false,
            is_moderator: false,
        }
    }

    pub fn anonymous(user_id: impl Into<String>) -> Self {
        Self {
            is_anonymous: true,
            ..Self::user(user_id)
        }
    }

    pub fn moderator(user_id: impl Into<String>) -> Self {
        Self {
            is_moderator: true,
            ..Self::user(user_id)
        }
    }

    /// Reads the gateway headers. `None` when no identity was attached.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())?;
        Some(Self {
            user_id: user_id.to_string(),
            is_anonymous: header_flag(headers, ANONYMOUS_HEADER),
            is_moderator: header_flag(headers, MODERATOR_HEADER),
        })
    }
}

fn header_flag(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Gate for every privileged write: an identity is required and it must not
/// be an anonymous session.
pub fn require_writer(caller: Option<&Caller>) -> ServiceResult<&Caller> {
    let caller = caller
        .ok_or_else(|| ServiceError::Unauthenticated("sign in required".into()))?;
    if caller.is_anonymous {
        return Err(ServiceError::PermissionDenied(
            "anonymous accounts cannot perform this action".into(),
        ));
    }
    Ok(caller)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_identity_headers() {
        let mut headers = HeaderMap::new();
        assert!(Caller::from_headers(&headers).is_none());

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("u-1"));
        headers.insert(MODERATOR_HEADER, HeaderValue::from_static("true"));
        let caller = Caller::from_headers(&headers).expect("caller");
        assert_eq!(caller.user_id, "u-1");
        assert!(caller.is_moderator);
        assert!(!caller.is_anonymous);
    }

    #[test]
    fn writer_gate_distinguishes_missing_and_anonymous() {
        assert!(matches!(
            require_writer(None),
            Err(ServiceError::Unauthenticated(_))
        ));
        let anon = Caller::anonymous("guest");
        assert!(matches!(
            require_writer(Some(&anon)),
            Err(ServiceError::PermissionDenied(_))
        ));
        let user = Caller::user("u-1");
        assert_eq!(require_writer(Some(&user)).unwrap().user_id, "u-1");
    }
}
