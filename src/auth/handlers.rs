use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            LoginRequest, LoginResponse, MessageResponse, PublicUser, RefreshRequest,
            RefreshResponse, SignupRequest, TokenObtainRequest, TokenObtainResponse,
        },
        jwt::{AuthUser, JwtKeys, TokenError},
        resolver::{resolve_email, resolve_identifier, Resolution},
        services::register_user,
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/token", post(token_obtain))
        .route("/token/refresh", post(token_refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn non_blank(v: Option<&str>) -> Option<&str> {
    v.filter(|s| !s.trim().is_empty())
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    register_user(state.users.as_ref(), &payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User created successfully".into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let (Some(email), Some(password)) = (
        non_blank(payload.email.as_deref()),
        non_blank(payload.password.as_deref()),
    ) else {
        warn!("login missing email or password");
        return Err(AppError::MissingCredentials);
    };

    let user = match resolve_email(state.users.as_ref(), email, password).await? {
        Resolution::Matched(user) => user,
        Resolution::NoMatch(_) => return Err(AppError::InvalidCredentials),
    };

    let keys = JwtKeys::from_ref(&state);
    let pair = keys.issue_pair(user.id)?;

    info!(
        user_id = %user.id,
        access_expires_at = %pair.access_expires_at,
        refresh_expires_at = %pair.refresh_expires_at,
        "user logged in"
    );
    Ok(Json(LoginResponse {
        refresh: pair.refresh,
        access: pair.access,
        user_id: user.id,
        email: user.email,
    }))
}

#[instrument(skip(state, payload))]
pub async fn token_obtain(
    State(state): State<AppState>,
    Json(payload): Json<TokenObtainRequest>,
) -> Result<Json<TokenObtainResponse>, AppError> {
    let (Some(identifier), Some(password)) =
        (payload.identifier(), non_blank(payload.password.as_deref()))
    else {
        return Err(AppError::NoActiveAccount);
    };

    let user = resolve_identifier(state.users.as_ref(), identifier, password)
        .await?
        .into_user()
        .ok_or(AppError::NoActiveAccount)?;

    let pair = JwtKeys::from_ref(&state).issue_pair(user.id)?;

    info!(user_id = %user.id, "token pair issued");
    Ok(Json(TokenObtainResponse {
        message: "Login successful".into(),
        access: pair.access,
        refresh: pair.refresh,
    }))
}

#[instrument(skip(state, payload))]
pub async fn token_refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AppError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_refresh(&payload.refresh).map_err(|e| {
        warn!(error = %e, "refresh token rejected");
        e
    })?;

    // A deleted or deactivated account cannot keep minting access tokens.
    match state.users.find_by_id(claims.sub).await? {
        Some(user) if user.is_active => {}
        _ => {
            warn!(user_id = %claims.sub, "refresh for missing or inactive user");
            return Err(AppError::Token(TokenError::UnknownSubject));
        }
    }

    let access = keys.sign_access(claims.sub)?;
    Ok(Json(RefreshResponse { access }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %user_id, "token subject no longer exists");
            AppError::Token(TokenError::UnknownSubject)
        })?;

    Ok(Json(PublicUser::from(user)))
}
