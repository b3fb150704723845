/// /api/auth/* endpoints
use crate::{
    account::{LoginRequest, LoginResponse, RegisterRequest, UserInfo},
    api::extract::ValidatedJson,
    context::AppContext,
    error::ApiResult,
    response::ApiResponse,
};
use axum::{extract::State, routing::post, Router};

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
}

/// Register a new user
async fn register(
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> ApiResult<ApiResponse<UserInfo>> {
    let user = ctx
        .user_manager
        .register(&req.username, &req.password, req.role.as_deref())
        .await?;

    Ok(ApiResponse::created(user, "User registered successfully"))
}

/// Exchange credentials for a token
async fn login(
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> ApiResult<ApiResponse<LoginResponse>> {
    let session = ctx.user_manager.login(&req.username, &req.password).await?;

    Ok(ApiResponse::ok(session, "Login successful"))
}
