use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        claims::Identity,
        extractors::{require_auth, AuthUser},
        password::{hash_password, verify_password},
        validators::{validate_email, validate_password},
    },
    db::DbError,
    error::AppError,
    images::services::{discard_image, read_single_image, store_image},
    payload::Payload,
    response::{ApiResponse, ApiResult},
    state::AppState,
    users::{
        dto::{
            FilterEmailRequest, LoginRequest, PublicUser, RefreshRequest, RegisterRequest,
            SortRequest, TokenPair,
        },
        repo_types::{NewUser, SortOrder, User},
    },
};

const INVALID_EMAIL: &str = "Parameter email tidak sesuai format";
const SHORT_PASSWORD: &str = "Password minimal 8 karakter";
const BAD_CREDENTIALS: &str = "Username atau password salah";
const BAD_REFRESH: &str = "Refresh token tidak valid";

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/add", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
}

pub fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/getAll", get(list_users))
        .route(
            "/updateProfileImage",
            patch(update_profile_image)
                .layer(DefaultBodyLimit::max(state.config.upload.max_bytes)),
        )
        .route("/delete", delete(delete_me))
        .route("/filterEmail", get(filter_email))
        .route("/sortByEmail", get(sort_by_email))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
}

fn identity_of(user: &User) -> Identity {
    Identity {
        user_id: user.id,
        email: user.email.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        profile_image: user.profile_image.clone(),
    }
}

/// Signs a fresh access/refresh pair and persists the refresh session.
async fn issue_pair(state: &AppState, user: &User) -> Result<TokenPair, AppError> {
    let identity = identity_of(user);
    let access = state.keys.sign_access(&identity)?;
    let refresh = state.keys.sign_refresh(&identity)?;
    state
        .sessions
        .create(refresh.jti, user.id, refresh.expires_at)
        .await?;
    Ok(TokenPair {
        token: access.token,
        refresh_token: refresh.token,
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Payload(mut payload): Payload<RegisterRequest>,
) -> ApiResult<()> {
    payload.email = payload.email.trim().to_lowercase();

    if !validate_email(&payload.email, &state.config.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::Validation(INVALID_EMAIL.into()));
    }
    if !validate_password(&payload.password) {
        warn!("password too short");
        return Err(AppError::Validation(SHORT_PASSWORD.into()));
    }

    let new = NewUser {
        email: payload.email,
        password_hash: hash_password(&payload.password)?,
        first_name: payload.first_name.trim().to_string(),
        last_name: payload.last_name.trim().to_string(),
    };

    let user = state.users.create(&new).await.map_err(|e| match e {
        DbError::UniqueViolation { .. } => {
            warn!(email = %new.email, "email already registered");
            AppError::Conflict("Email sudah terdaftar".into())
        }
        other => other.into(),
    })?;

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok(ApiResponse::message("Registrasi berhasil silahkan login"))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Payload(mut payload): Payload<LoginRequest>,
) -> ApiResult<TokenPair> {
    payload.email = payload.email.trim().to_lowercase();

    if !validate_email(&payload.email, &state.config.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::Validation(INVALID_EMAIL.into()));
    }
    if !validate_password(&payload.password) {
        return Err(AppError::Validation(SHORT_PASSWORD.into()));
    }

    let Some(user) = state.users.find_by_email(&payload.email).await? else {
        warn!(email = %payload.email, "login unknown email");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
    };

    let ok = verify_password(&payload.password, &user.password_hash).map_err(|e| {
        error!(error = %e, user_id = user.id, "stored password hash unreadable");
        AppError::Internal(e)
    })?;
    if !ok {
        warn!(user_id = user.id, "login invalid password");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
    }

    let pair = issue_pair(&state, &user).await?;
    info!(user_id = user.id, "user logged in");
    Ok(ApiResponse::ok("Login Sukses", pair))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Payload(payload): Payload<RefreshRequest>,
) -> ApiResult<TokenPair> {
    if payload.refresh_token.trim().is_empty() {
        return Err(AppError::Validation("Parameter refreshToken tidak boleh kosong".into()));
    }

    let claims = state
        .keys
        .verify_refresh(payload.refresh_token.trim())
        .map_err(|e| {
            warn!(error = %e, "refresh token rejected");
            AppError::Unauthorized(BAD_REFRESH.into())
        })?;

    // rotation: the old session is gone whether or not the rest succeeds
    if !state.sessions.consume(claims.jti, claims.sub).await? {
        warn!(user_id = claims.sub, "refresh session unknown or revoked");
        return Err(AppError::Unauthorized(BAD_REFRESH.into()));
    }

    let Some(user) = state.users.find_by_id(claims.sub).await? else {
        return Err(AppError::Unauthorized(BAD_REFRESH.into()));
    };

    let pair = issue_pair(&state, &user).await?;
    info!(user_id = user.id, "tokens refreshed");
    Ok(ApiResponse::ok("Refresh token berhasil", pair))
}

#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> ApiResult<()> {
    let revoked = state.sessions.revoke_all(identity.user_id).await?;
    info!(revoked, "user logged out");
    Ok(ApiResponse::message("Logout Sukses"))
}

#[instrument(skip(state, _identity))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(_identity): AuthUser,
) -> ApiResult<Vec<PublicUser>> {
    let users = state.users.list_all().await?;
    Ok(ApiResponse::ok(
        "Success Get All Users",
        users.into_iter().map(PublicUser::from).collect(),
    ))
}

#[instrument(skip(state, identity, mp), fields(user_id = identity.user_id))]
pub async fn update_profile_image(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    mp: Result<Multipart, MultipartRejection>,
) -> ApiResult<PublicUser> {
    let image = read_single_image(mp).await?;
    let file_name = store_image(&state, image).await?;

    let swapped = match state
        .users
        .replace_profile_image(identity.user_id, &file_name)
        .await
    {
        Ok(Some(swapped)) => swapped,
        Ok(None) => {
            discard_image(&state, Some(&file_name)).await;
            return Err(AppError::NotFound("User tidak ditemukan".into()));
        }
        Err(e) => {
            discard_image(&state, Some(&file_name)).await;
            return Err(e.into());
        }
    };

    if swapped.previous_image.as_deref() != Some(file_name.as_str()) {
        discard_image(&state, swapped.previous_image.as_deref()).await;
    }

    info!(file_name = %file_name, "profile image updated");
    Ok(ApiResponse::ok(
        "Update Profile Image berhasil",
        PublicUser::from(swapped.user),
    ))
}

#[instrument(skip(state, identity), fields(user_id = identity.user_id))]
pub async fn delete_me(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> ApiResult<()> {
    let Some(deleted) = state.users.delete(identity.user_id).await? else {
        return Err(AppError::NotFound("User tidak ditemukan".into()));
    };

    discard_image(&state, deleted.user.profile_image.as_deref()).await;
    for file_name in &deleted.product_images {
        discard_image(&state, Some(file_name)).await;
    }

    info!(products = deleted.product_images.len(), "user deleted");
    Ok(ApiResponse::message("Delete Profile berhasil"))
}

#[instrument(skip(state, _identity, payload))]
pub async fn filter_email(
    State(state): State<AppState>,
    AuthUser(_identity): AuthUser,
    Payload(payload): Payload<FilterEmailRequest>,
) -> ApiResult<Vec<PublicUser>> {
    let provider = payload
        .email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::Validation("Parameter email tidak boleh kosong".into()))?;

    let providers = &state.config.filter_providers;
    if !providers.iter().any(|p| *p == provider) {
        return Err(AppError::Validation(format!(
            "Format Email Tidak Valid, masukkan {}",
            providers.join(" atau ")
        )));
    }

    let users = state.users.filter_by_provider(&provider).await?;
    Ok(ApiResponse::ok(
        "Filter Berhasil",
        users.into_iter().map(PublicUser::from).collect(),
    ))
}

#[instrument(skip(state, _identity, payload))]
pub async fn sort_by_email(
    State(state): State<AppState>,
    AuthUser(_identity): AuthUser,
    Payload(payload): Payload<SortRequest>,
) -> ApiResult<Vec<PublicUser>> {
    let raw = payload
        .sort_type
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Parameter sortType tidak boleh kosong".into()))?;
    let order = SortOrder::parse(&raw)
        .ok_or_else(|| AppError::Validation("Masukkan asc atau desc".into()))?;

    let users = state.users.sort_by_email(order).await?;
    Ok(ApiResponse::ok(
        "Sort Berhasil",
        users.into_iter().map(PublicUser::from).collect(),
    ))
}
