//! Shared library for Kinlog Lambda functions.
//!
//! This crate provides configuration, persistence, authentication and the domain
//! logic (calendar, meal planner, reports, assistant) used across all Lambda functions.

pub mod access;
pub mod agents;
pub mod auth;
pub mod calendar;
pub mod children;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod http;
pub mod meals;
pub mod models;
pub mod reports;
pub mod secrets;

pub use access::{child_access, family_role, ChildAccess, Role};
pub use agents::{AgentContext, AssistantClient};
pub use auth::{authenticated_user, extract_user_from_context, validate_token, AuthenticatedUser, CognitoClaims};
pub use config::{AgentConfig, Config};
pub use error::{Error, Result};
pub use http::{ApiResponse, DateRange, Pagination};
pub use secrets::{get_database_credentials, get_secret, DatabaseCredentials};

