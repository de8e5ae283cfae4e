//! API route handlers.
//!
//! Every handler that talks to the router opens a fresh session, performs
//! its one operation and logs out again. The router allows a single admin
//! session at a time, so holding one open would lock out the admin UI.

use axum::extract::{Path, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use tracing::{debug, warn};

use iptime_client::{PortForwardManager, RouterClient, RuleSelector};

use crate::error::{ApiError, Result};
use crate::models::{
    ActionResponse, AddRuleRequest, BatchResponse, BatchResult, HealthResponse, RuleResponse,
    RulesResponse, SystemInfoResponse, UpdateRuleRequest,
};
use crate::state::AppState;

/// Bearer-token gate for everything but the health check.
pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    if let Some(expected) = &state.config.api_token {
        let header = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let Some(token) = header.and_then(|value| value.strip_prefix("Bearer ")) else {
            return Err(ApiError::MissingToken);
        };
        if token != expected {
            return Err(ApiError::InvalidToken);
        }
    }
    Ok(next.run(request).await)
}

/// GET /api/health - Liveness probe, no auth.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        router_ip: state.config.router.base_url.clone(),
    })
}

/// GET /api/system/info - Scrape model and firmware.
pub async fn system_info(State(state): State<AppState>) -> Result<Json<SystemInfoResponse>> {
    let client = open_session(&state).await?;
    let info = client.system_info().await;
    client.logout().await;

    match info {
        Some(info) if !info.is_empty() => Ok(Json(SystemInfoResponse {
            status: "success",
            data: info,
        })),
        _ => Err(ApiError::OperationFailed(
            "Failed to get system info".to_string(),
        )),
    }
}

/// GET /api/portforward - List all rules.
pub async fn list_rules(State(state): State<AppState>) -> Result<Json<RulesResponse>> {
    let client = open_session(&state).await?;
    let rules = PortForwardManager::new(&client).list_rules().await;
    client.logout().await;

    let count = rules.len();
    Ok(Json(RulesResponse {
        status: "success",
        data: rules,
        count,
    }))
}

/// POST /api/portforward - Add one rule.
pub async fn add_rule(
    State(state): State<AppState>,
    Json(req): Json<AddRuleRequest>,
) -> Result<Json<ActionResponse>> {
    // Validation answers before the router is contacted.
    let rule = req.into_new_rule()?;

    let client = open_session(&state).await?;
    let added = PortForwardManager::new(&client).add_rule(&rule).await;
    client.logout().await;

    if added {
        Ok(Json(ActionResponse::success("Rule added successfully")))
    } else {
        Err(ApiError::OperationFailed("Failed to add rule".to_string()))
    }
}

/// POST /api/portforward/batch - Add several rules in one session.
pub async fn batch_add_rules(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<BatchResponse>> {
    let Some(entries) = body.get("rules").and_then(serde_json::Value::as_array) else {
        return Err(ApiError::BadRequest(
            "Invalid request: rules array required".to_string(),
        ));
    };

    let client = open_session(&state).await?;
    let manager = PortForwardManager::new(&client);

    let mut results = Vec::with_capacity(entries.len());
    for entry in entries {
        let description = entry
            .get("description")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        let request: AddRuleRequest = serde_json::from_value(entry.clone()).unwrap_or_default();
        let success = match request.into_new_rule() {
            Ok(rule) => manager.add_rule(&rule).await,
            Err(e) => {
                warn!(error = %e, "batch entry rejected");
                false
            }
        };
        results.push(BatchResult {
            description,
            success,
        });
    }

    client.logout().await;
    Ok(Json(BatchResponse {
        status: "success",
        results,
    }))
}

/// GET /api/portforward/{rule} - Fetch one rule by id or name.
pub async fn get_rule(
    State(state): State<AppState>,
    Path(rule): Path<String>,
) -> Result<Json<RuleResponse>> {
    let selector = parse_selector(&rule);

    let client = open_session(&state).await?;
    let found = PortForwardManager::new(&client).get_rule(&selector).await;
    client.logout().await;

    match found {
        Some(rule) => Ok(Json(RuleResponse {
            status: "success",
            rule,
        })),
        None => Err(ApiError::RuleNotFound),
    }
}

/// PUT /api/portforward/{rule} - Update one rule by id or name.
pub async fn update_rule(
    State(state): State<AppState>,
    Path(rule): Path<String>,
    body: Option<Json<UpdateRuleRequest>>,
) -> Result<Json<ActionResponse>> {
    let selector = parse_selector(&rule);
    let update = body.map(|Json(req)| req).unwrap_or_default().into_update();

    let client = open_session(&state).await?;
    let updated = PortForwardManager::new(&client)
        .update_rule(&selector, &update)
        .await;
    client.logout().await;

    if updated {
        Ok(Json(ActionResponse::success("Rule updated successfully")))
    } else {
        Err(ApiError::OperationFailed(
            "Failed to update rule".to_string(),
        ))
    }
}

/// DELETE /api/portforward/{rule} - Delete one rule by id or name.
pub async fn delete_rule(
    State(state): State<AppState>,
    Path(rule): Path<String>,
) -> Result<Json<ActionResponse>> {
    let selector = parse_selector(&rule);

    let client = open_session(&state).await?;
    let deleted = PortForwardManager::new(&client).delete_rule(&selector).await;
    client.logout().await;

    if deleted {
        Ok(Json(ActionResponse::success("Rule deleted successfully")))
    } else {
        Err(ApiError::OperationFailed(
            "Failed to delete rule".to_string(),
        ))
    }
}

/// Fallback for unmatched paths.
pub async fn endpoint_not_found() -> ApiError {
    ApiError::EndpointNotFound
}

/// Opens and authenticates a fresh router session for one request.
async fn open_session(state: &AppState) -> Result<RouterClient> {
    let client = RouterClient::new(state.config.router.clone())
        .map_err(|e| ApiError::OperationFailed(e.to_string()))?;
    if !client.login().await {
        return Err(ApiError::LoginFailed);
    }
    debug!("router session opened");
    Ok(client)
}

/// All-digit identifiers select by listing position, anything else by name.
fn parse_selector(raw: &str) -> RuleSelector {
    match raw.parse::<usize>() {
        Ok(id) => RuleSelector::Id(id),
        Err(_) => RuleSelector::from(raw),
    }
}
