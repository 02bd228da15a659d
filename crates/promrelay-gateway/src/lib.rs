//! promrelay gateway library entry.
//!
//! Wires config, the upstream client, the fetch coordinator and the response
//! assembler into axum routers. Consumed by the binary (`main.rs`) and by
//! integration tests.

pub mod app_state;
pub mod assemble;
pub mod config;
pub mod fetch;
pub mod obs;
pub mod ops;
pub mod router;
pub mod server;
pub mod transport;
pub mod upstream;
