use thiserror::Error;

use crate::simulation::id::Id;
use crate::simulation::network::signals::TrafficSignal;
use crate::simulation::network::Link;

/// One position/speed sample of the emergency vehicle, taken once per simulation tick by the
/// external simulation adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleTelemetry {
    pub link: Id<Link>,
    /// distance from the upstream end of the link, in meters
    pub offset: f64,
    /// instantaneous speed in m/s
    pub speed: f32,
    pub time: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("no telemetry available for vehicle {0}")]
    Unavailable(String),
}

/// Read side of the external simulation adapter. A failing read is an expected condition (the
/// vehicle may momentarily be unavailable) and must never take the controller down; see the
/// preemption controller for how a failed tick is handled.
pub trait TelemetryProvider {
    fn current_telemetry(&self, vehicle: &str) -> Result<VehicleTelemetry, TelemetryError>;
}

/// Command side of the external simulation adapter. The preemption controller issues all signal
/// overrides through this interface and never mutates simulator internals directly.
pub trait SignalCommands {
    /// Forces the signal into the phase at the given index of its program.
    fn set_phase(&mut self, signal: &Id<TrafficSignal>, phase: usize);
    /// Hands the signal back to its normal timing program.
    fn restore_program(&mut self, signal: &Id<TrafficSignal>);
}
