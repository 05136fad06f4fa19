//! The five request handlers.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use snowlink_core::{
    CreateIncidentRequest, DedupStore, INCIDENT_BINDING, IncidentBinding, MappingStore,
    SIR_INCIDENT_BINDING, TimeBucket, TrackedEntity, create_ticket,
};

use crate::http::{AppState, access_token, api_error, recover_workflow, trace_id};

#[derive(Debug, Deserialize)]
pub struct CheckEntityRequest {
    #[serde(default)]
    internal_entity_id: String,
    #[serde(default)]
    external_system_id: String,
}

#[derive(Debug, Serialize)]
struct CheckEntityResponse {
    exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    ext_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ext_system_id: Option<String>,
}

/// POST /check-external-entity
pub async fn check_external_entity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckEntityRequest>,
) -> Response {
    let token = access_token(&headers);
    let client = match state.clients.client(token.as_deref()).await {
        Ok(client) => client,
        Err(error) => return client_error(&error),
    };
    let mappings = MappingStore::new(client.object_store());
    match mappings
        .lookup(&request.internal_entity_id, &request.external_system_id)
        .await
    {
        Ok(Some(record)) => (
            StatusCode::OK,
            Json(CheckEntityResponse {
                exists: true,
                ext_id: Some(record.external_entity_id),
                ext_system_id: Some(record.external_system_id),
            }),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::OK,
            Json(CheckEntityResponse {
                exists: false,
                ext_id: None,
                ext_system_id: None,
            }),
        )
            .into_response(),
        Err(error) => {
            error!(%error, entity = %request.internal_entity_id, "external entity lookup failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
        }
    }
}

/// POST /create-entity-mapping
pub async fn create_entity_mapping(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(record): Json<TrackedEntity>,
) -> Response {
    let token = access_token(&headers);
    let client = match state.clients.client(token.as_deref()).await {
        Ok(client) => client,
        Err(error) => return client_error(&error),
    };
    let mappings = MappingStore::new(client.object_store());
    match mappings.upsert(&record).await {
        Ok(()) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(error) => {
            error!(%error, entity = %record.internal_entity_id, "mapping write failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
        }
    }
}

/// POST /create-incident
pub async fn create_incident(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateIncidentRequest>,
) -> Response {
    run_incident(state, headers, request, INCIDENT_BINDING, "/create-incident").await
}

/// POST /create-sir-incident
pub async fn create_sir_incident(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateIncidentRequest>,
) -> Response {
    run_incident(
        state,
        headers,
        request,
        SIR_INCIDENT_BINDING,
        "/create-sir-incident",
    )
    .await
}

async fn run_incident(
    state: AppState,
    headers: HeaderMap,
    request: CreateIncidentRequest,
    binding: IncidentBinding,
    url: &str,
) -> Response {
    let trace = trace_id(&headers);
    let trace_for_body = trace.clone();
    recover_workflow(url, &trace, async move {
        debug!(trace_id = %trace_for_body, entity = %request.entity_id, "ticket create requested");
        let token = access_token(&headers);
        let client = match state.clients.client(token.as_deref()).await {
            Ok(client) => client,
            Err(error) => return client_error(&error),
        };
        match create_ticket(&client, binding, &request).await {
            Ok(outcome) => {
                let status = if outcome.exists {
                    StatusCode::OK
                } else {
                    StatusCode::CREATED
                };
                (status, Json(outcome)).into_response()
            }
            Err(error) => {
                error!(
                    %error,
                    trace_id = %trace_for_body,
                    entity = %request.entity_id,
                    "ticket creation failed"
                );
                api_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
            }
        }
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct ThrottleRequest {
    #[serde(default)]
    internal_entity_id: String,
    #[serde(default)]
    dedup_obj_type: String,
    #[serde(default)]
    dedup_obj_id: String,
    #[serde(default)]
    time_bucket: String,
}

#[derive(Debug, Serialize)]
struct ThrottleResponse {
    allowed: bool,
}

/// POST /throttle
pub async fn throttle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ThrottleRequest>,
) -> Response {
    let bucket = match request.time_bucket.parse::<TimeBucket>() {
        Ok(bucket) => bucket,
        Err(error) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    };
    let token = access_token(&headers);
    let client = match state.clients.client(token.as_deref()).await {
        Ok(client) => client,
        Err(error) => return client_error(&error),
    };
    let dedup = DedupStore::new(client.object_store(), state.clock.clone());
    match dedup
        .check_and_claim(
            &request.internal_entity_id,
            &request.dedup_obj_type,
            &request.dedup_obj_id,
            bucket,
        )
        .await
    {
        Ok(exists) => (StatusCode::OK, Json(ThrottleResponse { allowed: !exists })).into_response(),
        Err(error) => {
            error!(%error, entity = %request.internal_entity_id, "throttle check failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
        }
    }
}

fn client_error(error: &anyhow::Error) -> Response {
    error!(%error, "falcon client construction failed");
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("error creating Falcon client: {error}"),
    )
}
