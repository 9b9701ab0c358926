//! RecordGate Service
//!
//! HTTP data service that reads resources from local storage and returns
//! only the records the covering policies permit for the requesting user
//! and purpose.

pub mod config;
pub mod routes;
pub mod state;

pub use config::{ConfigOverrides, ServiceConfig};
pub use routes::create_router;
pub use state::{AppState, ReadRequest};
