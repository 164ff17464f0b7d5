use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::Utc;
use password_hash::rand_core::OsRng;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, SqlErr};
use uuid::Uuid;

use crate::{
    audit,
    dto::auth::{LoginRequest, LoginResponse, RefreshRequest, RegisterRequest, TokenPair, TokenType},
    entity::{
        Users,
        users::{ActiveModel as UserActive, Column as UserCol, Model as UserModel, Role},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, decode_token, issue_token},
    models::User,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> AppResult<()> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest("Invalid email address".into()))
    }
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

fn verify_password(password: &str, hash: &str) -> bool {
    // Anonymised accounts carry a hash that never parses.
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

fn token_pair(state: &AppState, user: &UserModel) -> AppResult<TokenPair> {
    let jwt = &state.config.jwt;
    Ok(TokenPair {
        access_token: issue_token(jwt, user.id, user.role, TokenType::Access)?,
        refresh_token: issue_token(jwt, user.id, user.role, TokenType::Refresh)?,
        token_type: "Bearer".into(),
        expires_in: jwt.access_ttl_minutes * 60,
    })
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let email = normalize_email(&payload.email);
    validate_email(&email)?;
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let display_name = payload
        .display_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        password_hash: Set(hash_password(&payload.password)?),
        display_name: Set(display_name),
        role: Set(Role::Customer),
        created_at: Set(Utc::now().into()),
        deleted_at: Set(None),
    }
    .insert(&state.orm)
    .await
    .map_err(|err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::conflict("email_taken", "Email is already taken")
        }
        _ => AppError::OrmError(err),
    })?;

    audit::record(state, Some(user.id), "user_register", "user", user.id, None).await;

    let tokens = token_pair(state, &user)?;
    Ok(ApiResponse::success(
        "User created",
        LoginResponse {
            user: User::from(user),
            tokens,
        },
        Some(Meta::empty()),
    ))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let email = normalize_email(&payload.email);
    let user = Users::find()
        .filter(UserCol::Email.eq(email))
        .filter(UserCol::DeletedAt.is_null())
        .one(&state.orm)
        .await?;

    let user = match user {
        Some(u) if verify_password(&payload.password, &u.password_hash) => u,
        _ => return Err(AppError::BadRequest("Invalid email or password".into())),
    };

    audit::record(state, Some(user.id), "user_login", "user", user.id, None).await;

    let tokens = token_pair(state, &user)?;
    Ok(ApiResponse::success(
        "Logged in",
        LoginResponse {
            user: User::from(user),
            tokens,
        },
        Some(Meta::empty()),
    ))
}

pub async fn refresh_tokens(
    state: &AppState,
    payload: RefreshRequest,
) -> AppResult<ApiResponse<TokenPair>> {
    let user_id = decode_token(&state.config.jwt, &payload.refresh_token, TokenType::Refresh)?;
    let user = Users::find_by_id(user_id)
        .filter(UserCol::DeletedAt.is_null())
        .one(&state.orm)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(ApiResponse::success(
        "Token refreshed",
        token_pair(state, &user)?,
        Some(Meta::empty()),
    ))
}

pub async fn me(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let user = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Current user", User::from(user), None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn email_shape_is_checked() {
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("nobody").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a@localhost").is_err());
    }

    #[test]
    fn password_hashes_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("anything", "!"));
    }
}
