//! Reservation route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dreampos_core::{ReservationId, ReservationStatus};

use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{
    CreateReservationRequest, RefundContact, Reservation, ReservationCounts, ReservationDetail,
    ReservationFilter, ServiceEntry, StaffEntry, UpdateReservationRequest,
};
use crate::services::reservations::ReservationService;
use crate::state::AppState;

/// Query parameters for `GET /api/reservation`.
#[derive(Debug, Default, Deserialize)]
pub struct ReservationQuery {
    pub status: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl TryFrom<ReservationQuery> for ReservationFilter {
    type Error = AppError;

    fn try_from(query: ReservationQuery) -> Result<Self> {
        let status = query
            .status
            .as_deref()
            .filter(|s| !s.trim().is_empty() && !s.trim().eq_ignore_ascii_case("all"))
            .map(str::parse::<ReservationStatus>)
            .transpose()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        Ok(Self {
            status,
            from: query.from,
            to: query.to,
            search: query
                .search
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty()),
        })
    }
}

/// Query parameters for `GET /api/reservation/counts`.
#[derive(Debug, Deserialize)]
pub struct CountsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Response of `POST /api/reservation`.
#[derive(Debug, Serialize)]
pub struct CreatedReservation {
    pub id: ReservationId,
}

/// `GET /api/reservation`
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Query(query): Query<ReservationQuery>,
) -> Result<Json<Vec<Reservation>>> {
    let filter = ReservationFilter::try_from(query)?;
    Ok(Json(ReservationService::new(state.pool()).list(&filter).await?))
}

/// `GET /api/reservation/counts`
pub async fn counts(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Query(query): Query<CountsQuery>,
) -> Result<Json<ReservationCounts>> {
    let counts = ReservationService::new(state.pool())
        .counts(query.from, query.to)
        .await?;
    Ok(Json(counts))
}

/// `GET /api/reservation/services`
pub async fn services(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
) -> Result<Json<Vec<ServiceEntry>>> {
    Ok(Json(ReservationService::new(state.pool()).services().await?))
}

/// `GET /api/reservation/staff`
pub async fn staff(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
) -> Result<Json<Vec<StaffEntry>>> {
    Ok(Json(ReservationService::new(state.pool()).staff().await?))
}

/// `GET /api/reservation/{id}`
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Path(id): Path<ReservationId>,
) -> Result<Json<ReservationDetail>> {
    Ok(Json(ReservationService::new(state.pool()).get(id).await?))
}

/// `POST /api/reservation`
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Json(request): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<CreatedReservation>)> {
    let id = ReservationService::new(state.pool())
        .create(&request, state.sms().cloned())
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedReservation { id })))
}

/// `PUT /api/reservation/{id}`
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Path(id): Path<ReservationId>,
    Json(request): Json<UpdateReservationRequest>,
) -> Result<StatusCode> {
    ReservationService::new(state.pool())
        .update(id, &request)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/reservation/{id}/refund`
pub async fn request_refund(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Path(id): Path<ReservationId>,
    Json(contact): Json<RefundContact>,
) -> Result<StatusCode> {
    ReservationService::new(state.pool())
        .request_refund(id, &contact)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/reservation/{id}/refund`
pub async fn cancel_refund(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Path(id): Path<ReservationId>,
) -> Result<StatusCode> {
    ReservationService::new(state.pool())
        .cancel_refund(id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_all_status_means_no_filter() {
        let filter = ReservationFilter::try_from(ReservationQuery {
            status: Some("all".to_owned()),
            search: Some("  ".to_owned()),
            ..ReservationQuery::default()
        })
        .unwrap();
        assert_eq!(filter.status, None);
        assert_eq!(filter.search, None);
    }

    #[test]
    fn test_legacy_status_filter() {
        let filter = ReservationFilter::try_from(ReservationQuery {
            status: Some("RESERVED".to_owned()),
            ..ReservationQuery::default()
        })
        .unwrap();
        assert_eq!(filter.status, Some(ReservationStatus::Pending));
    }
}
