pub mod authentication;
pub mod configuration;
pub mod dispatch;
pub mod domain;
pub mod email_client;
pub mod helpers;
pub mod ingestion;
pub mod routes;
pub mod startup;
pub mod store;
pub mod telemetry;
