//! REST API module.
//!
//! Handlers for the roster endpoints. Bodies follow the frontend contract:
//! `{success, ...}` on success and the error envelope from [`crate::errors`] otherwise.

mod clients;
mod coaches;
mod feed;
mod search;

pub use clients::*;
pub use coaches::*;
pub use feed::*;
pub use search::*;

use axum::Json;

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<Json<T>, crate::errors::AppError>;
