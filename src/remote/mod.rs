//! Remote agent service integration.
//!
//! Provides the JSON transport to the agent endpoints and the typed
//! operations of the query endpoint.

mod gateway;
mod service;

pub use gateway::{Endpoint, Gateway, HttpGateway};
pub use service::EvaluationService;
