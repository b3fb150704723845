/// /api/gadgets/* endpoints
use crate::{
    api::extract::{parse_optional_json, ValidatedJson},
    auth::{
        policy::{AdminOnly, AnyRole, FieldOperatives},
        Authorized,
    },
    context::AppContext,
    db::{models::Gadget, GadgetChanges},
    error::ApiResult,
    gadget::{
        CreateGadgetRequest, GadgetView, ListGadgetsQuery, SelfDestructCodeResponse,
        SelfDestructOutcome, SelfDestructRequest, UpdateGadgetRequest,
    },
    response::ApiResponse,
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    routing::{get, post},
    Router,
};
use serde::Serialize;

/// Build gadget routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/gadgets", get(list_gadgets).post(create_gadget))
        .route(
            "/api/gadgets/:id",
            get(get_gadget)
                .patch(update_gadget)
                .delete(decommission_gadget),
        )
        .route("/api/gadgets/:id/self-destruct", post(self_destruct))
}

/// Payload of a self-destruct response; the shape depends on the phase
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SelfDestructData {
    Initiated(SelfDestructCodeResponse),
    Destroyed(Gadget),
}

async fn list_gadgets(
    State(ctx): State<AppContext>,
    _auth: Authorized<AnyRole>,
    Query(query): Query<ListGadgetsQuery>,
) -> ApiResult<ApiResponse<Vec<GadgetView>>> {
    let status = query.status_filter()?;
    let gadgets = ctx.gadget_manager.list(status).await?;

    Ok(ApiResponse::ok(
        gadgets.into_iter().map(GadgetView::new).collect(),
        "Gadgets retrieved successfully",
    ))
}

async fn get_gadget(
    State(ctx): State<AppContext>,
    _auth: Authorized<AnyRole>,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<GadgetView>> {
    let gadget = ctx.gadget_manager.get(&id).await?;

    Ok(ApiResponse::ok(
        GadgetView::new(gadget),
        "Gadget retrieved successfully",
    ))
}

async fn create_gadget(
    State(ctx): State<AppContext>,
    auth: Authorized<AdminOnly>,
    ValidatedJson(req): ValidatedJson<CreateGadgetRequest>,
) -> ApiResult<ApiResponse<Gadget>> {
    tracing::debug!(user = %auth.identity.username, name = %req.name, "create_gadget");
    let gadget = ctx.gadget_manager.create(&req.name).await?;

    Ok(ApiResponse::created(gadget, "Gadget created successfully"))
}

async fn update_gadget(
    State(ctx): State<AppContext>,
    auth: Authorized<AdminOnly>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateGadgetRequest>,
) -> ApiResult<ApiResponse<Gadget>> {
    tracing::debug!(user = %auth.identity.username, id = %id, "update_gadget");
    let changes = GadgetChanges::try_from(req)?;
    let gadget = ctx.gadget_manager.update(&id, changes).await?;

    Ok(ApiResponse::ok(gadget, "Gadget updated successfully"))
}

async fn decommission_gadget(
    State(ctx): State<AppContext>,
    auth: Authorized<AdminOnly>,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<Gadget>> {
    tracing::debug!(user = %auth.identity.username, id = %id, "decommission_gadget");
    let gadget = ctx.gadget_manager.decommission(&id).await?;

    Ok(ApiResponse::ok(gadget, "Gadget decommissioned successfully"))
}

/// Phase 1 without a body (or without a code), phase 2 with `confirmationCode`
async fn self_destruct(
    State(ctx): State<AppContext>,
    auth: Authorized<FieldOperatives>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<ApiResponse<SelfDestructData>> {
    let req: SelfDestructRequest = parse_optional_json(&body)?;
    tracing::debug!(
        user = %auth.identity.username,
        id = %id,
        confirming = req.code().is_some(),
        "self_destruct"
    );

    match ctx.gadget_manager.self_destruct(&id, req.code()).await? {
        SelfDestructOutcome::Initiated { code } => Ok(ApiResponse::ok(
            SelfDestructData::Initiated(SelfDestructCodeResponse { code }),
            "Self-destruct sequence initiated. Use the provided code to confirm.",
        )),
        SelfDestructOutcome::Destroyed(gadget) => Ok(ApiResponse::ok(
            SelfDestructData::Destroyed(gadget),
            "Gadget has been destroyed",
        )),
    }
}
