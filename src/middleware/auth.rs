use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{error::AppError, models::UserId};

/// Header set by the upstream authentication filter
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller, taken from [`USER_ID_HEADER`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

impl AuthUser {
    pub fn id(self) -> UserId {
        self.0
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts.headers.get(USER_ID_HEADER).ok_or_else(|| {
            AppError::Unauthorized("Authentication credentials were not provided.".to_string())
        })?;

        raw.to_str()
            .ok()
            .and_then(|value| value.trim().parse::<UserId>().ok())
            .filter(|id| *id > 0)
            .map(AuthUser)
            .ok_or_else(|| AppError::Unauthorized("Invalid user identity.".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<AuthUser, AppError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_valid_header() {
        assert_eq!(extract(Some("42")).await.unwrap(), AuthUser(42));
    }

    #[tokio::test]
    async fn test_missing_or_invalid_header() {
        for header in [None, Some(""), Some("abc"), Some("0"), Some("-3")] {
            assert!(matches!(
                extract(header).await,
                Err(AppError::Unauthorized(_))
            ));
        }
    }
}
