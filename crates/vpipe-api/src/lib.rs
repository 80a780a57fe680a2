//! Thin HTTP surface over the job lifecycle core.
//!
//! Submission (`POST /jobs`) and inspection (`GET /jobs`, `GET /jobs/{id}`)
//! only; the heavy lifting lives in the worker. The dispatcher that moves a
//! freshly persisted job into the pending queue also lives here, right next
//! to its only caller.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use dispatcher::Dispatcher;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
