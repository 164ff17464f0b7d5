use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    config::JwtConfig,
    dto::auth::{Claims, TokenType},
    entity::{
        Users,
        users::{Column as UserCol, Role},
    },
    error::AppError,
    state::AppState,
};

/// The caller, as currently stored. Role changes and account deletion apply
/// to the next request even when the presented token is older.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

/// `Some` when the request carries a valid bearer token for a live account.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl MaybeAuthUser {
    pub fn user_id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|u| u.user_id)
    }
}

/// Passes when the caller holds one of `allowed`. Admin passes every check.
pub fn authorize(user: &AuthUser, allowed: &[Role]) -> Result<(), AppError> {
    if user.role == Role::Admin || allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    authorize(user, &[Role::Admin])
}

/// Resource ownership: the owner or an admin.
pub fn ensure_owner(user: &AuthUser, owner_id: Option<Uuid>) -> Result<(), AppError> {
    if user.role == Role::Admin || owner_id == Some(user.user_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub fn issue_token(
    config: &JwtConfig,
    user_id: Uuid,
    role: Role,
    typ: TokenType,
) -> Result<String, AppError> {
    let now = Utc::now();
    let ttl = match typ {
        TokenType::Access => Duration::minutes(config.access_ttl_minutes),
        TokenType::Refresh => Duration::hours(config.refresh_ttl_hours),
    };
    let expiration = now
        .checked_add_signed(ttl)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        typ,
        exp: expiration.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

/// Decodes a token of the expected type and returns the subject.
pub fn decode_token(config: &JwtConfig, token: &str, expected: TokenType) -> Result<Uuid, AppError> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized)?;

    if decoded.claims.typ != expected {
        return Err(AppError::Unauthorized);
    }

    Uuid::parse_str(&decoded.claims.sub).map_err(|_| AppError::Unauthorized)
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

async fn load_user(state: &AppState, user_id: Uuid) -> Result<AuthUser, AppError> {
    let user = Users::find_by_id(user_id)
        .filter(UserCol::DeletedAt.is_null())
        .one(&state.orm)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(AuthUser {
        user_id: user.id,
        email: user.email,
        role: user.role,
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;
        let user_id = decode_token(&state.config.jwt, token, TokenType::Access)?;
        load_user(state, user_id).await
    }
}

impl OptionalFromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(None);
        };
        match decode_token(&state.config.jwt, token, TokenType::Access) {
            Ok(user_id) => match load_user(state, user_id).await {
                Ok(user) => Ok(Some(user)),
                Err(AppError::Unauthorized) => Ok(None),
                Err(err) => Err(err),
            },
            Err(_) => {
                tracing::debug!("ignoring invalid bearer token on optional-auth route");
                Ok(None)
            }
        }
    }
}

impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user =
            <AuthUser as OptionalFromRequestParts<AppState>>::from_request_parts(parts, state).await?;
        Ok(MaybeAuthUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            email: "someone@example.com".into(),
            role,
        }
    }

    fn jwt() -> JwtConfig {
        JwtConfig {
            secret: "test-secret".into(),
            access_ttl_minutes: 5,
            refresh_ttl_hours: 1,
        }
    }

    #[test]
    fn admin_passes_every_role_check() {
        let admin = user(Role::Admin);
        assert!(authorize(&admin, &[Role::Seller]).is_ok());
        assert!(authorize(&admin, &[Role::Customer]).is_ok());
        assert!(ensure_admin(&admin).is_ok());
    }

    #[test]
    fn customers_cannot_reach_seller_or_admin_routes() {
        let customer = user(Role::Customer);
        assert!(matches!(
            authorize(&customer, &[Role::Seller]),
            Err(AppError::Forbidden)
        ));
        assert!(ensure_admin(&customer).is_err());
        assert!(authorize(&user(Role::Seller), &[Role::Seller]).is_ok());
    }

    #[test]
    fn ownership_allows_owner_and_admin_only() {
        let seller = user(Role::Seller);
        assert!(ensure_owner(&seller, Some(seller.user_id)).is_ok());
        assert!(ensure_owner(&seller, Some(Uuid::new_v4())).is_err());
        assert!(ensure_owner(&seller, None).is_err());
        assert!(ensure_owner(&user(Role::Admin), None).is_ok());
    }

    #[test]
    fn refresh_tokens_are_not_access_tokens() {
        let config = jwt();
        let id = Uuid::new_v4();
        let refresh = issue_token(&config, id, Role::Customer, TokenType::Refresh).unwrap();
        assert!(decode_token(&config, &refresh, TokenType::Access).is_err());
        assert_eq!(decode_token(&config, &refresh, TokenType::Refresh).unwrap(), id);
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let token = issue_token(&jwt(), Uuid::new_v4(), Role::Customer, TokenType::Access).unwrap();
        let other = JwtConfig {
            secret: "other".into(),
            ..jwt()
        };
        assert!(matches!(
            decode_token(&other, &token, TokenType::Access),
            Err(AppError::Unauthorized)
        ));
    }
}
