use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app_state::AppState;
use crate::models::{Address, ApiResponse, IndexSet};

#[derive(Debug, Serialize)]
pub struct OracleSummary {
    pub account: Address,
    pub registered_at: DateTime<Utc>,
    /// `None` until the indexes have been fetched from the ledger
    pub indexes: Option<IndexSet>,
}

/// Lists the registered oracles with whatever index assignments are cached.
/// Never triggers a ledger lookup.
pub async fn list_oracles(State(app_state): State<AppState>) -> Json<ApiResponse<Vec<OracleSummary>>> {
    let mut oracles = Vec::with_capacity(app_state.registry.len());
    for identity in app_state.registry.identities() {
        oracles.push(OracleSummary {
            account: identity.handle,
            registered_at: identity.registered_at,
            indexes: app_state.cache.peek(identity.handle).await,
        });
    }

    Json(ApiResponse::ok(oracles))
}
