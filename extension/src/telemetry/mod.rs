//! Lifecycle telemetry from the sandbox host.
//!
//! [`event`] decodes the batches the host pushes; [`server`] owns the HTTP
//! endpoint that receives them and fires the runtime-done hook.

pub mod event;
pub mod server;

pub use event::{contains_runtime_done, decode_events, DecodeError, Event, EventType, RUNTIME_DONE};
pub use server::{
    RuntimeDoneHook, ServerConfig, ServerError, TelemetryServer, DEFAULT_ADDR, TELEMETRY_PATH,
};
