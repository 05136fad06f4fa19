//! Ticket creation pipeline: mapping early-exit, payload shaping,
//! execute-command dispatch, and result extraction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::falcon::{CommandRequest, DispatchError, FalconClient};
use crate::mapping::{MappingError, MappingStore};
use crate::types::{INCIDENT_SYSTEM_ID, ITSM_INTEGRATION, SIR_INCIDENT_SYSTEM_ID, TrackedEntity};

/// Operation binding for one ticket class.
#[derive(Debug, Clone, Copy)]
pub struct IncidentBinding {
    pub operation_id: &'static str,
    pub ticket_type: &'static str,
    pub external_system_id: &'static str,
}

/// Standard incident class (ServiceNow `incident` table).
pub const INCIDENT_BINDING: IncidentBinding = IncidentBinding {
    operation_id: "PostApiNowTableIncident",
    ticket_type: "incident",
    external_system_id: INCIDENT_SYSTEM_ID,
};

/// Security-incident class (ServiceNow `sn_si_incident` table).
pub const SIR_INCIDENT_BINDING: IncidentBinding = IncidentBinding {
    operation_id: "PostApiNowTableSnSiIncident",
    ticket_type: "sn_si_incident",
    external_system_id: SIR_INCIDENT_SYSTEM_ID,
};

/// Ticket-creation request fields accepted on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateIncidentRequest {
    #[serde(default)]
    pub config_id: String,
    #[serde(default)]
    pub entity_id: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub assignment_group: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub impact: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub urgency: String,
    #[serde(default)]
    pub work_notes: String,
    /// JSON-encoded object of additional ticket columns.
    #[serde(default)]
    pub custom_fields: String,
}

/// Outcome of one create-ticket call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentOutcome {
    pub exists: bool,
    pub ticket_id: String,
    pub ticket_type: String,
}

#[derive(Debug, Error)]
pub enum IncidentError {
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("failed to execute command: {0}")]
    Dispatch(#[source] DispatchError),
    #[error("failed to execute command - nil response")]
    NilResponse,
    #[error("failed to execute command - empty response")]
    EmptyResponse,
    #[error("failed to execute command - empty resources in response payload")]
    EmptyResources,
    #[error("failed to execute command: ServiceNow Error: {0}")]
    ServiceNow(String),
}

/// Builds the outbound ticket body from the request fields.
///
/// Optional columns are included only when non-empty. `custom_fields` is
/// merged in last and may overwrite them; a malformed document is dropped
/// without failing the create.
pub fn build_ticket_payload(request: &CreateIncidentRequest) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert(
        "short_description".to_string(),
        Value::String(request.short_description.clone()),
    );
    let optional = [
        ("assignment_group", &request.assignment_group),
        ("category", &request.category),
        ("description", &request.description),
        ("impact", &request.impact),
        ("severity", &request.severity),
        ("state", &request.state),
        ("urgency", &request.urgency),
        ("work_notes", &request.work_notes),
    ];
    for (field, value) in optional {
        if !value.is_empty() {
            payload.insert(field.to_string(), Value::String(value.clone()));
        }
    }
    if !request.custom_fields.is_empty() {
        match serde_json::from_str::<Map<String, Value>>(&request.custom_fields) {
            Ok(fields) => {
                for (field, value) in fields {
                    payload.insert(field, value);
                }
            }
            Err(error) => {
                debug!(%error, "ignoring malformed custom_fields");
            }
        }
    }
    payload
}

/// Ticket identifiers pulled out of a ServiceNow response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketRef {
    pub sys_id: String,
    pub sys_class_name: String,
}

/// Extracts the created ticket from a response body, honoring an `error`
/// field over any `result` that may accompany it.
pub fn extract_ticket(response_body: &Value) -> Result<TicketRef, IncidentError> {
    if let Some(error) = response_body.get("error") {
        return Err(IncidentError::ServiceNow(stringify_error(error)));
    }
    let result = response_body.get("result");
    let field = |name: &str| {
        result
            .and_then(|r| r.get(name))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Ok(TicketRef {
        sys_id: field("sys_id"),
        sys_class_name: field("sys_class_name"),
    })
}

fn stringify_error(error: &Value) -> String {
    match error {
        Value::String(text) => text.clone(),
        other => serde_json::to_string(other)
            .unwrap_or_else(|_| "unrepresentable ServiceNow error payload".to_string()),
    }
}

/// Creates (if absent) a ticket for `request.entity_id` in the bound class
/// and records the mapping.
pub async fn create_ticket(
    client: &FalconClient,
    binding: IncidentBinding,
    request: &CreateIncidentRequest,
) -> Result<IncidentOutcome, IncidentError> {
    let mappings = MappingStore::new(client.object_store());
    if let Some(existing) = mappings
        .lookup(&request.entity_id, binding.external_system_id)
        .await?
    {
        debug!(
            entity_id = %request.entity_id,
            ticket_id = %existing.external_entity_id,
            "entity already materialized, skipping ticket create"
        );
        return Ok(IncidentOutcome {
            exists: true,
            ticket_id: existing.external_entity_id,
            ticket_type: binding.ticket_type.to_string(),
        });
    }

    let command = CommandRequest {
        integration: ITSM_INTEGRATION.to_string(),
        operation: binding.operation_id.to_string(),
        config_id: request.config_id.clone(),
        payload: Value::Object(build_ticket_payload(request)),
    };
    let response = client
        .dispatcher()
        .execute(command)
        .await
        .map_err(IncidentError::Dispatch)?
        .ok_or(IncidentError::NilResponse)?;
    let payload = response.payload.ok_or(IncidentError::EmptyResponse)?;
    let resource = payload.resources.first().ok_or(IncidentError::EmptyResources)?;
    let ticket = extract_ticket(&resource.response_body)?;

    if !ticket.sys_id.is_empty() {
        mappings
            .upsert(&TrackedEntity {
                internal_entity_id: request.entity_id.clone(),
                external_entity_id: ticket.sys_id.clone(),
                external_system_id: binding.external_system_id.to_string(),
            })
            .await?;
    }

    Ok(IncidentOutcome {
        exists: false,
        ticket_id: ticket.sys_id,
        ticket_type: ticket.sys_class_name,
    })
}
