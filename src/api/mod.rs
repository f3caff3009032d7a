//! API Module
//!
//! HTTP handlers and routing for the cache administration REST API. The
//! lookup path used by channel code does not go through HTTP; it uses the
//! facades the engine publishes to the variable store.

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
