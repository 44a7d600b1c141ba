pub mod config;
pub mod events;
pub mod id;
pub mod logging;
pub mod network;
pub mod preemption;
pub mod routing;
pub mod telemetry;
pub mod trip;
