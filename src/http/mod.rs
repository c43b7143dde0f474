//! HTTP management API consumed by the presentation layer
//!
//! - GET /api/recordings - List recordings, newest first
//! - GET /api/recordings/:id - Get one recording
//! - DELETE /api/recordings/:id - Delete a recording and its audio
//! - GET /api/recordings/:id/audio - Stream the finished audio file
//! - GET /api/health - Health check

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ErrorResponse};
pub use routes::{cors_layer, create_router};
pub use state::AppState;
