use crate::simulation::id::Id;
use crate::simulation::network::{Link, Node};

/// The fixed cyclic program of a traffic signal. Only the static description lives here; all
/// mutable control state (preemption state, fallback counters, cooldowns) is owned by the
/// preemption controller instance governing the signal.
#[derive(Debug)]
pub struct TrafficSignal {
    pub id: Id<TrafficSignal>,
    pub node: Id<Node>,
    pub phases: Vec<Phase>,
}

/// One entry of a signal's phase program. A phase is identified by its index in the program and
/// grants green to the approach links it serves.
#[derive(Debug, Clone)]
pub struct Phase {
    serves: Vec<Id<Link>>,
    /// nominal duration in seconds under normal operation
    pub duration: u32,
}

impl TrafficSignal {
    pub fn new(id: Id<TrafficSignal>, node: Id<Node>, phases: Vec<Phase>) -> Self {
        TrafficSignal { id, node, phases }
    }

    /// Indices of all phases that grant green to the given approach link, in program order.
    pub fn compatible_phases(&self, approach: &Id<Link>) -> Vec<usize> {
        self.phases
            .iter()
            .enumerate()
            .filter(|(_, phase)| phase.serves.contains(approach))
            .map(|(i, _)| i)
            .collect()
    }
}

impl Phase {
    pub fn new(serves: Vec<Id<Link>>, duration: u32) -> Self {
        Phase { serves, duration }
    }

    pub fn serves(&self) -> &[Id<Link>] {
        &self.serves
    }
}
