pub mod app_state;
pub mod authentication;
pub mod code_emails;
pub mod configuration;
pub mod domain;
pub mod email_client;
pub mod expiry_worker;
mod routers;
pub mod startup;
pub mod telemetry;
pub mod users;
pub mod verification_codes;
