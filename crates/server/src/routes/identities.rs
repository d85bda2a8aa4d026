//! Identity issuance and promotion routes
//!
//! Consumed by the customer bootstrap: first visit requests a canonical
//! record for the locally generated temporary id; registration exchanges it
//! for a durable identity and merges history.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use shoptalk_shared::{CustomerProfile, Identity, IdentityId};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IssueIdentityRequest {
    pub temporary_id: Option<IdentityId>,
    #[serde(default)]
    pub profile: CustomerProfile,
    /// Device/browser signals for fraud/dedup heuristics; opaque here
    #[serde(default)]
    pub device_fingerprint: Option<String>,
}

/// POST /identities
pub async fn issue_identity(
    State(app_state): State<AppState>,
    Json(req): Json<IssueIdentityRequest>,
) -> ApiResult<Json<Identity>> {
    if let Some(fingerprint) = &req.device_fingerprint {
        tracing::debug!(fingerprint = %fingerprint, "Identity issuance with device signals");
    }
    let identity = app_state
        .identities
        .register(req.temporary_id, &req.profile)
        .await;
    Ok(Json(identity))
}

#[derive(Debug, Deserialize)]
pub struct PromoteIdentityRequest {
    pub profile: CustomerProfile,
}

/// POST /identities/:id/promote
pub async fn promote_identity(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PromoteIdentityRequest>,
) -> ApiResult<Json<Identity>> {
    let identity = app_state
        .identities
        .promote(&IdentityId::from(id), &req.profile, &app_state.store)
        .await?;
    Ok(Json(identity))
}
