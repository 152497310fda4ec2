use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{
    auth::create_jwt,
    errors::{ApiError, ApiResult},
    models::user::{validate_username, LoginRequest, LoginResponse},
    AppState,
};

/// `POST /login` auto-creates the user on first use with the supplied
/// password; subsequent calls with the same username verify the
/// stored hash instead.
#[utoipa::path(
    post,
    path = "/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated, bearer token returned", body = LoginResponse),
        (status = 400, description = "Invalid username or password"),
        (status = 401, description = "Password does not match an existing account"),
    )
)]
pub async fn login(State(state): State<Arc<AppState>>, Json(body): Json<LoginRequest>) -> ApiResult<Json<LoginResponse>> {
    validate_username(&body.username).map_err(ApiError::Validation)?;
    if body.password.is_empty() {
        return Err(ApiError::Validation("password must not be empty".to_string()));
    }

    let user = match state.deps.users.find_by_username(&body.username).await? {
        Some(existing) => {
            let valid = bcrypt::verify(&body.password, &existing.password_hash)
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            if !valid {
                return Err(ApiError::Unauthenticated);
            }
            existing
        }
        None => {
            let hash = bcrypt::hash(&body.password, bcrypt::DEFAULT_COST).map_err(|e| ApiError::Internal(e.to_string()))?;
            state.deps.users.create(&body.username, &hash).await?
        }
    };

    let token = create_jwt(&user, &state.config.jwt_secret).map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(LoginResponse { token, user: user.into() }))
}
