//! Order route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dreampos_core::{OrderId, OrderStatus};

use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{OrderChanges, OrderFilter, OrderItemDetail, OrderSummary, RefundContact};
use crate::services::orders::OrderService;
use crate::state::AppState;

/// Query parameters for `GET /api/order`.
#[derive(Debug, Default, Deserialize)]
pub struct OrderQuery {
    pub id: Option<OrderId>,
    pub status: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TryFrom<OrderQuery> for OrderFilter {
    type Error = AppError;

    fn try_from(query: OrderQuery) -> Result<Self> {
        let status = query
            .status
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::parse::<OrderStatus>)
            .transpose()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        if query.limit.is_some_and(|l| l <= 0) || query.offset.is_some_and(|o| o < 0) {
            return Err(AppError::BadRequest(
                "limit must be positive and offset non-negative".to_owned(),
            ));
        }
        Ok(Self {
            id: query.id,
            status,
            from: query.from,
            to: query.to,
            limit: query.limit,
            offset: query.offset,
        })
    }
}

/// Response of `POST /api/order`.
#[derive(Debug, Serialize)]
pub struct CreatedOrder {
    pub id: OrderId,
}

/// `GET /api/order`
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Query(query): Query<OrderQuery>,
) -> Result<Json<Vec<OrderSummary>>> {
    let filter = OrderFilter::try_from(query)?;
    Ok(Json(OrderService::new(state.pool()).list(&filter).await?))
}

/// `POST /api/order`
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(changes): Json<OrderChanges>,
) -> Result<(StatusCode, Json<CreatedOrder>)> {
    let id = OrderService::new(state.pool()).create(user.id, &changes).await?;
    Ok((StatusCode::CREATED, Json(CreatedOrder { id })))
}

/// `PUT /api/order/{id}`
pub async fn modify(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Path(id): Path<OrderId>,
    Json(changes): Json<OrderChanges>,
) -> Result<StatusCode> {
    OrderService::new(state.pool()).modify(id, &changes).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/order/{id}/items`
pub async fn items(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<Vec<OrderItemDetail>>> {
    Ok(Json(OrderService::new(state.pool()).items(id).await?))
}

/// `POST /api/order/{id}/refund`
pub async fn request_refund(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Path(id): Path<OrderId>,
    Json(contact): Json<RefundContact>,
) -> Result<StatusCode> {
    OrderService::new(state.pool())
        .request_refund(id, &contact)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/order/{id}/refund`
pub async fn cancel_refund(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<StatusCode> {
    OrderService::new(state.pool()).cancel_refund(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_query_status_accepts_either_spelling() {
        let filter = OrderFilter::try_from(OrderQuery {
            status: Some("refund_pending".to_owned()),
            ..OrderQuery::default()
        })
        .unwrap();
        assert_eq!(filter.status, Some(OrderStatus::RefundPending));

        let filter = OrderFilter::try_from(OrderQuery {
            status: Some("CLOSED".to_owned()),
            ..OrderQuery::default()
        })
        .unwrap();
        assert_eq!(filter.status, Some(OrderStatus::Closed));
    }

    #[test]
    fn test_query_rejects_unknown_status_and_bad_paging() {
        assert!(OrderFilter::try_from(OrderQuery {
            status: Some("archived".to_owned()),
            ..OrderQuery::default()
        })
        .is_err());
        assert!(OrderFilter::try_from(OrderQuery {
            limit: Some(0),
            ..OrderQuery::default()
        })
        .is_err());
    }
}
