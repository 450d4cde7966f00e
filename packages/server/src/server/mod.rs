// HTTP server setup (Axum)
pub mod app;
pub mod routes;
pub mod worker;

pub use app::*;
pub use worker::{spawn_event_worker, EventQueue, EVENT_QUEUE_DEPTH};
