use crate::{
    error::AppError,
    models::{Role, User},
    policy::Identity,
    utils::jwt::decode_jwt,
};
use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response, Extension};
use sea_orm::{DatabaseConnection, EntityTrait};
use uuid::Uuid;

/// Identity middleware.
///
/// Decodes the bearer token the identity collaborator issued, then loads
/// the user row so role and organization reflect the store, not stale
/// claims. The resulting [`Identity`] is placed in request extensions.
pub async fn auth_middleware(
    Extension(db): Extension<DatabaseConnection>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(&headers).ok_or(AppError::Unauthorized)?;

    let claims = decode_jwt(&token).map_err(|_| AppError::Unauthorized)?;

    let user_id: Uuid = claims.sub.parse().map_err(|_| AppError::Unauthorized)?;

    let user = User::find_by_id(user_id)
        .one(&db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let identity = Identity {
        user_id: user.id,
        organization_id: user.organization_id,
        role: user.role,
    };
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;

    let token = auth_header.strip_prefix("Bearer ")?;
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Gate for admin-only routes. User and organization administration is
/// reserved to system_admin.
pub fn require_admin(identity: &Identity) -> crate::error::AppResult<()> {
    if identity.role != Role::SystemAdmin {
        return Err(AppError::AccessDenied);
    }
    Ok(())
}

use axum::extract::FromRequestParts;

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn missing_or_empty_bearer_is_none() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer "),
        );
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn require_admin_rejects_non_admins() {
        let org = Uuid::new_v4();
        let admin = Identity {
            user_id: Uuid::new_v4(),
            organization_id: org,
            role: Role::SystemAdmin,
        };
        let chief = Identity {
            user_id: Uuid::new_v4(),
            organization_id: org,
            role: Role::PoliceChief,
        };
        assert!(require_admin(&admin).is_ok());
        assert!(require_admin(&chief).is_err());
    }
}
