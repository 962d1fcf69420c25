pub mod config;
pub mod telemetry;

pub use config::{ConfigError, ExtensionConfig};
pub use telemetry::{
    contains_runtime_done, decode_events, DecodeError, Event, EventType, RuntimeDoneHook,
    ServerConfig, ServerError, TelemetryServer, DEFAULT_ADDR, RUNTIME_DONE, TELEMETRY_PATH,
};
