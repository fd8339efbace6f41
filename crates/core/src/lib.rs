//! Domain core for the taskforge task execution service.
//!
//! Pure logic only: the script pool (compile cache, per-call engine,
//! capability binding, cancellation), the two-tier script cache, the script
//! store contract, the Modbus protocol CSV parser, and the shared error
//! taxonomy. I/O adapters (Redis, MySQL, the config registry, HTTP) live in
//! their own crates and plug in through the traits defined here.

pub mod error;
pub mod modbus;
pub mod properties;
pub mod script;

pub use error::CoreError;
