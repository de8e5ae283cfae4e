//! API request and response models.

use iptime_client::{ForwardRule, NewRule, RuleUpdate, SystemInfo};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Response body for GET /api/health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub router_ip: String,
}

/// Response body for GET /api/system/info.
#[derive(Debug, Serialize)]
pub struct SystemInfoResponse {
    pub status: &'static str,
    pub data: SystemInfo,
}

/// Response body for GET /api/portforward.
#[derive(Debug, Serialize)]
pub struct RulesResponse {
    pub status: &'static str,
    pub data: Vec<ForwardRule>,
    pub count: usize,
}

/// Response body for GET /api/portforward/{rule}.
#[derive(Debug, Serialize)]
pub struct RuleResponse {
    pub status: &'static str,
    pub rule: ForwardRule,
}

/// Response body for the mutating routes.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub status: &'static str,
    pub message: &'static str,
}

impl ActionResponse {
    pub(crate) fn success(message: &'static str) -> Self {
        Self {
            status: "success",
            message,
        }
    }
}

/// Request body for POST /api/portforward and entries of the batch route.
#[derive(Debug, Default, Deserialize)]
pub struct AddRuleRequest {
    pub description: Option<String>,
    pub internal_ip: Option<String>,
    pub external_port: Option<u16>,
    pub internal_port: Option<u16>,
    pub protocol: Option<String>,
}

impl AddRuleRequest {
    /// Validates the required fields, first missing one wins.
    pub(crate) fn into_new_rule(self) -> Result<NewRule, ApiError> {
        let Some(description) = self.description else {
            return Err(missing_field("description"));
        };
        let Some(internal_ip) = self.internal_ip else {
            return Err(missing_field("internal_ip"));
        };
        let Some(external_port) = self.external_port else {
            return Err(missing_field("external_port"));
        };

        let mut rule = NewRule::new(description, internal_ip, external_port);
        if let Some(port) = self.internal_port {
            rule = rule.with_internal_port(port);
        }
        if let Some(protocol) = self.protocol {
            rule = rule.with_protocol(protocol);
        }
        Ok(rule)
    }
}

fn missing_field(field: &str) -> ApiError {
    ApiError::BadRequest(format!("Missing required field: {field}"))
}

/// Request body for PUT /api/portforward/{rule}. Every field optional; an
/// absent body is an empty update.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateRuleRequest {
    pub description: Option<String>,
    pub internal_ip: Option<String>,
    pub external_port: Option<u16>,
    pub internal_port: Option<u16>,
    pub protocol: Option<String>,
}

impl UpdateRuleRequest {
    pub(crate) fn into_update(self) -> RuleUpdate {
        RuleUpdate {
            description: self.description,
            internal_ip: self.internal_ip,
            external_port: self.external_port,
            internal_port: self.internal_port,
            protocol: self.protocol,
        }
    }
}

/// Per-entry outcome of the batch route.
#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub description: Option<String>,
    pub success: bool,
}

/// Response body for POST /api/portforward/batch.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub status: &'static str,
    pub results: Vec<BatchResult>,
}
