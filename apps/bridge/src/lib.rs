//! HTTP surface of the Falcon to ServiceNow ITSM bridge.
//!
//! Security workflows call these endpoints to create ServiceNow tickets for
//! internal entities, maintain the entity-to-ticket mapping, and throttle
//! downstream actions with bucketed deduplication.
pub mod client;
pub mod config;
pub mod handlers;
pub mod http;
pub mod telemetry;
