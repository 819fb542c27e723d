//! Client for the remote scheduling gateway.
//!
//! The gateway exposes nine named operations behind a single endpoint:
//!
//! ```text
//! POST {url}/mcp/call_tool
//! { "tool_name": "search_contacts", "arguments": { "query": "jane", "limit": 5 } }
//! ```
//!
//! Operations are modelled as the closed [`GatewayTool`] enum, so an
//! unsupported operation name is rejected before any request is built.
//!
//! # Timeouts and retries
//!
//! Every call has a single bounded wait: `gateway.timeout_secs` for
//! lookups and `gateway.schedule_timeout_secs` for the composite
//! scheduling call. A call is attempted at most twice:
//!
//! | Failure | Read-only tool | Mutating tool |
//! |---------|----------------|---------------|
//! | connection refused / DNS | retry once | retry once |
//! | timeout | retry once | no retry |
//! | HTTP 5xx | retry once | no retry |
//! | HTTP 4xx, error body, malformed body | no retry | no retry |
//!
//! A mutating call that timed out may still have executed remotely, so it
//! is never repeated automatically.
//!
//! # Offline mode
//!
//! Without `gateway.url`, every call fails immediately with
//! [`GatewayError::NotConfigured`] and no network activity.

use async_trait::async_trait;
use concierge_core::models::{SchedulingRequest, SchedulingStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

use crate::config::GatewayConfig;

/// Maximum number of network attempts for one call.
pub const MAX_ATTEMPTS: u32 = 2;

const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Wire names of the supported operations, in declaration order.
pub const TOOL_NAMES: [&str; 9] = [
    "get_contact_info",
    "list_opportunities",
    "trigger_webhook",
    "get_pipeline_info",
    "create_note",
    "search_contacts",
    "get_activity_history",
    "create_opportunity",
    "create_contact_add_notes_schedule_appointment",
];

/// Whether the named operation only reads remote state.
pub fn is_read_only(name: &str) -> bool {
    matches!(
        name,
        "get_contact_info"
            | "list_opportunities"
            | "get_pipeline_info"
            | "search_contacts"
            | "get_activity_history"
    )
}

/// The remote gateway's operations with their typed arguments.
///
/// Serializes to the wire envelope `{ "tool_name": …, "arguments": { … } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool_name", content = "arguments", rename_all = "snake_case")]
pub enum GatewayTool {
    GetContactInfo {
        contact_id: String,
    },
    ListOpportunities {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pipeline_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },
    TriggerWebhook {
        event: String,
        #[serde(default)]
        payload: Value,
    },
    GetPipelineInfo {
        pipeline_id: String,
    },
    CreateNote {
        contact_id: String,
        body: String,
    },
    SearchContacts {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },
    GetActivityHistory {
        contact_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },
    CreateOpportunity {
        contact_id: String,
        pipeline_id: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        monetary_value: Option<f64>,
    },
    #[serde(rename = "create_contact_add_notes_schedule_appointment")]
    CreateContactNoteSchedule {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phone: Option<String>,
        notes: String,
        calendar_id: String,
        start_time: String,
    },
}

impl GatewayTool {
    /// Parse a dynamic `(name, arguments)` pair into a typed operation.
    pub fn parse(name: &str, arguments: Value) -> Result<Self, GatewayError> {
        if !TOOL_NAMES.contains(&name) {
            return Err(GatewayError::UnsupportedTool(name.to_string()));
        }
        let arguments = if arguments.is_null() {
            Value::Object(Default::default())
        } else {
            arguments
        };
        serde_json::from_value(serde_json::json!({
            "tool_name": name,
            "arguments": arguments,
        }))
        .map_err(|e| GatewayError::InvalidArguments {
            tool: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Every supported operation name.
    pub fn names() -> &'static [&'static str] {
        &TOOL_NAMES
    }

    pub fn name(&self) -> &'static str {
        match self {
            GatewayTool::GetContactInfo { .. } => TOOL_NAMES[0],
            GatewayTool::ListOpportunities { .. } => TOOL_NAMES[1],
            GatewayTool::TriggerWebhook { .. } => TOOL_NAMES[2],
            GatewayTool::GetPipelineInfo { .. } => TOOL_NAMES[3],
            GatewayTool::CreateNote { .. } => TOOL_NAMES[4],
            GatewayTool::SearchContacts { .. } => TOOL_NAMES[5],
            GatewayTool::GetActivityHistory { .. } => TOOL_NAMES[6],
            GatewayTool::CreateOpportunity { .. } => TOOL_NAMES[7],
            GatewayTool::CreateContactNoteSchedule { .. } => TOOL_NAMES[8],
        }
    }

    /// Read-only operations are safe to repeat.
    pub fn is_idempotent(&self) -> bool {
        is_read_only(self.name())
    }

    fn uses_schedule_timeout(&self) -> bool {
        matches!(self, GatewayTool::CreateContactNoteSchedule { .. })
    }
}

/// Gateway failure classes.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    #[error("scheduling gateway is not configured")]
    NotConfigured,
    #[error("scheduling gateway timed out after {0:?}")]
    Timeout(Duration),
    #[error("scheduling gateway unreachable: {0}")]
    Unreachable(String),
    #[error("scheduling gateway reported an error{}: {message}", http_suffix(.status))]
    Remote { status: Option<u16>, message: String },
    #[error("malformed gateway response: {0}")]
    MalformedResponse(String),
    #[error("scheduling finished partially (contact id: {contact_id:?}, no appointment id)")]
    Incomplete { contact_id: Option<String> },
    #[error("unsupported gateway tool: {0}")]
    UnsupportedTool(String),
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

fn http_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl GatewayError {
    /// The scheduling status this failure surfaces as.
    pub fn status(&self) -> SchedulingStatus {
        match self {
            GatewayError::NotConfigured
            | GatewayError::Timeout(_)
            | GatewayError::Unreachable(_) => SchedulingStatus::GatewayUnavailable,
            GatewayError::Remote { .. }
            | GatewayError::MalformedResponse(_)
            | GatewayError::Incomplete { .. }
            | GatewayError::UnsupportedTool(_)
            | GatewayError::InvalidArguments { .. } => SchedulingStatus::RemoteError,
        }
    }
}

/// Identifiers returned by a successful composite scheduling call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleConfirmation {
    pub contact_id: String,
    pub appointment_id: String,
}

/// The operation the appointment orchestrator depends on.
#[async_trait]
pub trait SchedulingGateway: Send + Sync {
    async fn create_contact_and_schedule(
        &self,
        request: &SchedulingRequest,
    ) -> Result<ScheduleConfirmation, GatewayError>;
}

/// A failed attempt and whether it may be repeated.
struct Attempt {
    error: GatewayError,
    retryable: bool,
}

/// HTTP client for the scheduling gateway.
pub struct GatewayClient {
    endpoint: Option<String>,
    http: reqwest::Client,
    timeout: Duration,
    schedule_timeout: Duration,
    attempts: AtomicU64,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> anyhow::Result<Self> {
        Self::with_timeouts(
            config.endpoint().map(str::to_string),
            Duration::from_secs(config.timeout_secs),
            Duration::from_secs(config.schedule_timeout_secs),
        )
    }

    pub fn with_timeouts(
        endpoint: Option<String>,
        timeout: Duration,
        schedule_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
            http,
            timeout,
            schedule_timeout,
            attempts: AtomicU64::new(0),
        })
    }

    /// A client that refuses every call.
    pub fn offline() -> Self {
        Self {
            endpoint: None,
            http: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
            schedule_timeout: Duration::from_secs(30),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Total network attempts made by this client.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Invoke a typed operation and return the remote result payload.
    pub async fn invoke(&self, tool: &GatewayTool) -> Result<Value, GatewayError> {
        let Some(base) = self.endpoint.as_deref() else {
            tracing::debug!(tool = tool.name(), "gateway not configured, refusing call");
            return Err(GatewayError::NotConfigured);
        };

        let url = format!("{}/mcp/call_tool", base);
        let timeout = if tool.uses_schedule_timeout() {
            self.schedule_timeout
        } else {
            self.timeout
        };

        let mut attempt_no = 0;
        loop {
            attempt_no += 1;
            self.attempts.fetch_add(1, Ordering::SeqCst);

            match self.send_once(&url, tool, timeout).await {
                Ok(value) => {
                    tracing::info!(tool = tool.name(), attempt = attempt_no, "gateway call succeeded");
                    return Ok(value);
                }
                Err(Attempt { error, retryable }) if retryable && attempt_no < MAX_ATTEMPTS => {
                    tracing::warn!(tool = tool.name(), attempt = attempt_no, error = %error, "gateway call failed, retrying once");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(Attempt { error, .. }) => {
                    tracing::error!(tool = tool.name(), attempt = attempt_no, error = %error, "gateway call failed");
                    return Err(error);
                }
            }
        }
    }

    /// Invoke an operation given by name with untyped arguments.
    pub async fn invoke_named(&self, name: &str, arguments: Value) -> Result<Value, GatewayError> {
        let tool = GatewayTool::parse(name, arguments)?;
        self.invoke(&tool).await
    }

    async fn send_once(
        &self,
        url: &str,
        tool: &GatewayTool,
        timeout: Duration,
    ) -> Result<Value, Attempt> {
        let idempotent = tool.is_idempotent();

        let response = self
            .http
            .post(url)
            .timeout(timeout)
            .json(tool)
            .send()
            .await
            .map_err(|e| classify_send_error(e, timeout, idempotent))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| Attempt {
            retryable: idempotent,
            error: if e.is_timeout() {
                GatewayError::Timeout(timeout)
            } else {
                GatewayError::Unreachable(e.to_string())
            },
        })?;

        if status.is_server_error() {
            return Err(Attempt {
                error: GatewayError::Remote {
                    status: Some(status.as_u16()),
                    message: error_message(&body),
                },
                retryable: idempotent,
            });
        }
        if !status.is_success() {
            return Err(Attempt {
                error: GatewayError::Remote {
                    status: Some(status.as_u16()),
                    message: error_message(&body),
                },
                retryable: false,
            });
        }

        parse_tool_response(&body).map_err(|error| Attempt {
            error,
            retryable: false,
        })
    }
}

fn classify_send_error(e: reqwest::Error, timeout: Duration, idempotent: bool) -> Attempt {
    if e.is_connect() {
        // The request never reached the service; repeating it cannot duplicate work.
        Attempt {
            error: GatewayError::Unreachable(e.to_string()),
            retryable: true,
        }
    } else if e.is_timeout() {
        Attempt {
            error: GatewayError::Timeout(timeout),
            retryable: idempotent,
        }
    } else {
        Attempt {
            error: GatewayError::Unreachable(e.to_string()),
            retryable: idempotent,
        }
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => extract_error(&json).unwrap_or_else(|| truncate(body)),
        Err(_) => truncate(body),
    }
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(200).collect()
}

/// Application-level error carried in a response body, if any.
fn extract_error(json: &Value) -> Option<String> {
    match json.get("error") {
        Some(Value::String(s)) => return Some(s.clone()),
        Some(Value::Object(obj)) => {
            return Some(
                obj.get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            )
        }
        Some(Value::Null) | None => {}
        Some(other) => return Some(other.to_string()),
    }

    let failed = json.get("success").and_then(Value::as_bool) == Some(false)
        || json.get("status").and_then(Value::as_str) == Some("error");
    failed.then(|| {
        json.get("message")
            .and_then(Value::as_str)
            .unwrap_or("request was not successful")
            .to_string()
    })
}

/// Parse a 2xx response body into its result payload.
fn parse_tool_response(body: &str) -> Result<Value, GatewayError> {
    let json: Value =
        serde_json::from_str(body).map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

    if let Some(message) = extract_error(&json) {
        return Err(GatewayError::Remote {
            status: None,
            message,
        });
    }

    Ok(json.get("result").cloned().unwrap_or(json))
}

fn find_id(payload: &Value, flat: &[&str], nested: &str) -> Option<String> {
    let as_id = |v: &Value| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };

    flat.iter()
        .find_map(|k| payload.get(*k).and_then(as_id))
        .or_else(|| payload.get(nested).and_then(|o| o.get("id")).and_then(as_id))
}

/// Pull both identifiers out of a composite scheduling result.
pub fn parse_confirmation(payload: &Value) -> Result<ScheduleConfirmation, GatewayError> {
    let contact_id = find_id(payload, &["contact_id", "contactId"], "contact");
    let appointment_id = find_id(payload, &["appointment_id", "appointmentId"], "appointment");

    match (contact_id, appointment_id) {
        (Some(contact_id), Some(appointment_id)) => Ok(ScheduleConfirmation {
            contact_id,
            appointment_id,
        }),
        (contact_id, _) => Err(GatewayError::Incomplete { contact_id }),
    }
}

/// Build the composite operation for a scheduling request.
pub fn schedule_tool(request: &SchedulingRequest) -> GatewayTool {
    let contact = &request.contact;
    GatewayTool::CreateContactNoteSchedule {
        name: contact.name.clone(),
        email: contact.email.clone(),
        phone: contact.phone.as_ref().map(|p| p.to_string()),
        notes: format!(
            "Requested: {}. Conversation summary: {}",
            request.calendar.label(),
            if contact.summary.is_empty() {
                "(none)"
            } else {
                contact.summary.as_str()
            }
        ),
        calendar_id: request.calendar_id.to_string(),
        start_time: request.window.start.format("%Y-%m-%dT%H:%M:%S").to_string(),
    }
}

#[async_trait]
impl SchedulingGateway for GatewayClient {
    async fn create_contact_and_schedule(
        &self,
        request: &SchedulingRequest,
    ) -> Result<ScheduleConfirmation, GatewayError> {
        let payload = self.invoke(&schedule_tool(request)).await?;
        parse_confirmation(&payload)
    }
}
