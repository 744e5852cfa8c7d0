pub mod baseline;
pub mod config;
pub mod controller;
pub mod downlink;
pub mod gps;
pub mod status;
pub mod termination;

pub use baseline::LaunchBaseline;
pub use config::{ConfigError, JsonFileStore, KeyValueStore, MemoryStore, MissionConfig};
pub use controller::{MissionController, MissionIo};
pub use downlink::TelemetryDownlink;
pub use gps::{Environment, GpsFix};
pub use status::{StatusSink, SystemStatus};
pub use termination::{Termination, TerminationLatch};
