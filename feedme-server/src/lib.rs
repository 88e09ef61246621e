pub mod api;
pub mod app;

pub use api::{router, ApiError, ApiState};
pub use app::{App, ServerError};
