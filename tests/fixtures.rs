#![allow(dead_code)]

use std::cell::RefCell;

use greenwave::simulation::id::Id;
use greenwave::simulation::network::signals::{Phase, TrafficSignal};
use greenwave::simulation::network::{Link, Network, Node};
use greenwave::simulation::telemetry::{
    SignalCommands, TelemetryError, TelemetryProvider, VehicleTelemetry,
};

pub const FIFTY_KMH: f32 = 50. / 3.6;

/// a -in-> b -out-> c, 1000m links, with a signal at b whose first phase serves the in link.
pub fn signalised_corridor() -> Network {
    let mut network = Network::new();
    for (ext, x) in [("a", 13.40), ("b", 13.42), ("c", 13.44)] {
        let id = network.node_ids.create_id(ext);
        network.add_node(Node::new(id, x, 52.5));
    }
    for (ext, from, to) in [("in", "a", "b"), ("out", "b", "c")] {
        let id = network.link_ids.create_id(ext);
        let from = network.node_ids.get_from_ext(from).unwrap();
        let to = network.node_ids.get_from_ext(to).unwrap();
        network.add_link(Link::new(id, from, to, 1000., FIFTY_KMH));
    }
    let in_link = network.link_ids.get_from_ext("in").unwrap();
    let node_b = network.node_ids.get_from_ext("b").unwrap();
    let signal_id = network.signal_ids.create_id("signal-b");
    network.add_signal(TrafficSignal::new(
        signal_id,
        node_b,
        vec![
            Phase::new(vec![in_link], 45),
            Phase::new(vec![], 45),
        ],
    ));
    network
}

/// Telemetry stub that answers from a closure over the queried tick counter.
pub struct ScriptedTelemetry<F: Fn(u32) -> Option<VehicleTelemetry>> {
    clock: RefCell<u32>,
    script: F,
}

impl<F: Fn(u32) -> Option<VehicleTelemetry>> ScriptedTelemetry<F> {
    pub fn new(script: F) -> Self {
        ScriptedTelemetry {
            clock: RefCell::new(0),
            script,
        }
    }
}

impl<F: Fn(u32) -> Option<VehicleTelemetry>> TelemetryProvider for ScriptedTelemetry<F> {
    fn current_telemetry(&self, vehicle: &str) -> Result<VehicleTelemetry, TelemetryError> {
        let now = *self.clock.borrow();
        *self.clock.borrow_mut() += 1;
        (self.script)(now).ok_or_else(|| TelemetryError::Unavailable(vehicle.to_string()))
    }
}

/// Records every command the controller issues, in order.
#[derive(Default)]
pub struct RecordingCommands {
    pub log: Vec<(u32, String)>,
    pub now: u32,
}

impl RecordingCommands {
    pub fn commands(&self) -> Vec<&str> {
        self.log.iter().map(|(_, c)| c.as_str()).collect()
    }
}

impl SignalCommands for RecordingCommands {
    fn set_phase(&mut self, signal: &Id<TrafficSignal>, phase: usize) {
        self.log.push((self.now, format!("{signal}:phase-{phase}")));
    }

    fn restore_program(&mut self, signal: &Id<TrafficSignal>) {
        self.log.push((self.now, format!("{signal}:restore")));
    }
}
