//! HTTP facade and process wiring for the taskforge service.

pub mod callbacks;
pub mod capabilities;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod router;
pub mod routes;
pub mod state;
