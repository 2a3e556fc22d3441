//! Refund route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::info;

use crate::db::RefundRepository;
use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::{PendingRefund, RefundActionRequest};
use crate::services::refunds::{RefundWorkflow, parse_action, parse_refund_type};
use crate::state::AppState;

/// Response of `POST /api/refund/{id}/action`.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub message: String,
}

/// `GET /api/refund`
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
) -> Result<Json<Vec<PendingRefund>>> {
    Ok(Json(RefundRepository::new(state.pool()).list_pending().await?))
}

/// `POST /api/refund/{id}/action`
pub async fn action(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<i64>,
    Json(request): Json<RefundActionRequest>,
) -> Result<Json<ActionResponse>> {
    let action = parse_action(&request.action)?;
    let refund_type = parse_refund_type(request.refund_type.as_deref())?;

    let workflow = RefundWorkflow::new(
        RefundRepository::new(state.pool()),
        state.stripe().clone(),
        state.config().stripe.timeout,
    );
    let parent = workflow.resolve(id, refund_type).await?;
    let outcome = workflow.act(parent, action).await?;

    info!(
        refund = %parent,
        employee = %user.username,
        reason = request.reason.as_deref().unwrap_or_default(),
        "Refund decision recorded"
    );

    Ok(Json(ActionResponse {
        message: outcome.message(),
    }))
}
