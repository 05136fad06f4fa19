//! End-to-end handler tests over the router with in-memory storage and a
//! scripted command dispatcher.

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use time::macros::datetime;
use tower::ServiceExt;

use snowlink_bridge::client::{LocalClientFactory, SharedClientFactory};
use snowlink_bridge::http::{AppState, build_router};
use snowlink_core::{
    CommandPayload, CommandResource, CommandResponse, FixedClock, InMemoryCommandDispatcher,
    SharedClock, SystemClock,
};

fn app(factory: SharedClientFactory, clock: SharedClock) -> Router {
    build_router(AppState {
        clients: factory,
        clock,
    })
}

fn local_app() -> Router {
    app(Arc::new(LocalClientFactory::new()), Arc::new(SystemClock))
}

/// Dispatcher that replies with `body` and records each outbound payload.
fn scripted_factory(body: Value, calls: Arc<Mutex<Vec<Value>>>) -> SharedClientFactory {
    let dispatcher = InMemoryCommandDispatcher::new(move |request| {
        calls.lock().unwrap().push(request.payload.clone());
        Ok(Some(CommandResponse {
            payload: Some(CommandPayload {
                resources: vec![CommandResource {
                    response_body: body.clone(),
                }],
            }),
        }))
    });
    Arc::new(LocalClientFactory::new().with_dispatcher(Arc::new(dispatcher)))
}

async fn post_json(app: Router, path: &str, body: Value) -> (StatusCode, Value) {
    post_json_traced(app, path, body, None).await
}

async fn post_json_traced(
    app: Router,
    path: &str,
    body: Value,
    trace_id: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(trace_id) = trace_id {
        builder = builder.header("x-cs-traceid", trace_id);
    }
    let response = app
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn error_message(body: &Value) -> &str {
    body["errors"][0]["message"].as_str().unwrap()
}

#[tokio::test]
async fn throttle_allows_first_sight_and_blocks_the_second() {
    let factory: SharedClientFactory = Arc::new(LocalClientFactory::new());
    let app = app(factory, Arc::new(SystemClock));
    let request = json!({
        "internal_entity_id": "e",
        "dedup_obj_type": "alert",
        "dedup_obj_id": "a1",
        "time_bucket": "forever"
    });

    let (status, body) = post_json(app.clone(), "/throttle", request.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "allowed": true }));

    let (status, body) = post_json(app, "/throttle", request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "allowed": false }));
}

#[tokio::test]
async fn throttle_reopens_across_the_five_minute_boundary() {
    let factory: SharedClientFactory = Arc::new(LocalClientFactory::new());
    let before = app(
        factory.clone(),
        Arc::new(FixedClock(datetime!(2023-05-15 10:19:59.999 UTC))),
    );
    let after = app(
        factory,
        Arc::new(FixedClock(datetime!(2023-05-15 10:20:00 UTC))),
    );
    let request = json!({
        "internal_entity_id": "e",
        "dedup_obj_type": "alert",
        "dedup_obj_id": "a1",
        "time_bucket": "5 minutes"
    });

    let (_, body) = post_json(before, "/throttle", request.clone()).await;
    assert_eq!(body, json!({ "allowed": true }));

    let (_, body) = post_json(after, "/throttle", request).await;
    assert_eq!(body, json!({ "allowed": true }));
}

#[tokio::test]
async fn throttle_rejects_unknown_buckets() {
    let (status, body) = post_json(
        local_app(),
        "/throttle",
        json!({
            "internal_entity_id": "e",
            "dedup_obj_type": "alert",
            "dedup_obj_id": "a1",
            "time_bucket": "1 hour"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = error_message(&body);
    assert!(message.contains("unsupported time bucket value"));
    assert!(message.contains("forever, 5 minutes, 30 minutes"));
}

#[tokio::test]
async fn create_incident_cold_path_creates_ticket_and_mapping() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let factory = scripted_factory(
        json!({ "result": { "sys_id": "c2a8d3", "sys_class_name": "incident" } }),
        calls.clone(),
    );
    let app = app(factory, Arc::new(SystemClock));

    let (status, body) = post_json(
        app.clone(),
        "/create-incident",
        json!({
            "config_id": "cfg-1",
            "entity_id": "entity123",
            "short_description": "s"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body,
        json!({ "exists": false, "ticket_id": "c2a8d3", "ticket_type": "incident" })
    );
    assert_eq!(calls.lock().unwrap().len(), 1);

    let (status, body) = post_json(
        app,
        "/check-external-entity",
        json!({
            "internal_entity_id": "entity123",
            "external_system_id": "servicenow_incident"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "exists": true,
            "ext_id": "c2a8d3",
            "ext_system_id": "servicenow_incident"
        })
    );
}

#[tokio::test]
async fn create_incident_warm_path_skips_dispatch() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let factory = scripted_factory(json!({}), calls.clone());
    let app = app(factory, Arc::new(SystemClock));

    let (status, body) = post_json(
        app.clone(),
        "/create-entity-mapping",
        json!({
            "internal_entity_id": "entity123",
            "external_entity_id": "ticket123",
            "external_system_id": "servicenow_incident"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body,
        json!({
            "internal_entity_id": "entity123",
            "external_entity_id": "ticket123",
            "external_system_id": "servicenow_incident"
        })
    );

    let (status, body) = post_json(
        app,
        "/create-incident",
        json!({
            "config_id": "cfg-1",
            "entity_id": "entity123",
            "short_description": "s"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "exists": true, "ticket_id": "ticket123", "ticket_type": "incident" })
    );
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn servicenow_error_object_is_serialized_with_sorted_keys() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let factory = scripted_factory(
        json!({
            "result": { "sys_id": "x" },
            "error": { "message": "Validation Error", "code": "VAL1001" }
        }),
        calls,
    );
    let app = app(factory, Arc::new(SystemClock));

    let (status, body) = post_json(
        app.clone(),
        "/create-incident",
        json!({
            "config_id": "cfg-1",
            "entity_id": "entity123",
            "short_description": "s"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        error_message(&body),
        "failed to execute command: ServiceNow Error: {\"code\":\"VAL1001\",\"message\":\"Validation Error\"}"
    );

    // No mapping must survive the failed create.
    let (_, body) = post_json(
        app,
        "/check-external-entity",
        json!({
            "internal_entity_id": "entity123",
            "external_system_id": "servicenow_incident"
        }),
    )
    .await;
    assert_eq!(body, json!({ "exists": false }));
}

#[tokio::test]
async fn custom_fields_merge_into_the_outbound_payload() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let factory = scripted_factory(
        json!({ "result": { "sys_id": "t1", "sys_class_name": "incident" } }),
        calls.clone(),
    );
    let app = app(factory, Arc::new(SystemClock));

    let (status, _) = post_json(
        app,
        "/create-incident",
        json!({
            "config_id": "cfg-1",
            "entity_id": "entity123",
            "short_description": "s",
            "custom_fields": "{\"u_a\":\"1\",\"u_b\":42}"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let calls = calls.lock().unwrap();
    assert_eq!(
        calls[0],
        json!({ "short_description": "s", "u_a": "1", "u_b": 42 })
    );
}

#[tokio::test]
async fn malformed_custom_fields_are_dropped_and_the_create_succeeds() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let factory = scripted_factory(
        json!({ "result": { "sys_id": "t1", "sys_class_name": "incident" } }),
        calls.clone(),
    );
    let app = app(factory, Arc::new(SystemClock));

    let (status, _) = post_json(
        app,
        "/create-incident",
        json!({
            "config_id": "cfg-1",
            "entity_id": "entity123",
            "short_description": "s",
            "custom_fields": "{not json"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let calls = calls.lock().unwrap();
    assert_eq!(calls[0], json!({ "short_description": "s" }));
}

#[tokio::test]
async fn sir_incidents_are_scoped_to_their_own_class() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let factory = scripted_factory(
        json!({ "result": { "sys_id": "sir1", "sys_class_name": "sn_si_incident" } }),
        calls,
    );
    let app = app(factory, Arc::new(SystemClock));

    let (status, body) = post_json(
        app.clone(),
        "/create-sir-incident",
        json!({
            "config_id": "cfg-1",
            "entity_id": "entity123",
            "short_description": "s"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["ticket_type"], "sn_si_incident");

    // The standard class sees no mapping for the same entity.
    let (_, body) = post_json(
        app,
        "/check-external-entity",
        json!({
            "internal_entity_id": "entity123",
            "external_system_id": "servicenow_incident"
        }),
    )
    .await;
    assert_eq!(body, json!({ "exists": false }));
}

#[tokio::test]
async fn workflow_panics_become_structured_500s() {
    let dispatcher = InMemoryCommandDispatcher::new(|_| panic!("dispatch exploded"));
    let factory: SharedClientFactory =
        Arc::new(LocalClientFactory::new().with_dispatcher(Arc::new(dispatcher)));
    let app = app(factory, Arc::new(SystemClock));

    let (status, body) = post_json_traced(
        app,
        "/create-incident",
        json!({
            "config_id": "cfg-1",
            "entity_id": "entity123",
            "short_description": "s"
        }),
        Some("trace-1"),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        error_message(&body),
        "Internal fn error: dispatch exploded (trace_id: 'trace-1')"
    );
}

#[tokio::test]
async fn health_reports_ok() {
    let response = local_app()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}
