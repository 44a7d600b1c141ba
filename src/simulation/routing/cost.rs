use geo::{Distance, Haversine, Point};

use crate::simulation::network::{Link, LinkSpeeds, Network, Node};
use crate::simulation::routing::weights::WeightPair;

/// Speeds below this floor are treated as this value when estimating travel times, so that a
/// stalled link yields a large but finite cost.
pub const MIN_SPEED: f32 = 0.1;

/// Combines link attributes and a weight pair into scalar edge costs and goal estimates. The
/// speed snapshot and the network-wide maximum speed are fixed at construction, i.e. once per
/// search.
pub struct CostModel<'n> {
    speeds: &'n LinkSpeeds,
    max_speed: f64,
}

impl<'n> CostModel<'n> {
    pub fn new(network: &'n Network, speeds: &'n LinkSpeeds) -> Self {
        CostModel {
            speeds,
            max_speed: speeds.max_speed(network) as f64,
        }
    }

    /// Estimated time to traverse the link under the current snapshot, in seconds.
    pub fn travel_time(&self, link: &Link) -> f64 {
        link.length / self.speeds.speed(link).max(MIN_SPEED) as f64
    }

    pub fn edge_cost(&self, link: &Link, weights: &WeightPair) -> f64 {
        weights.distance() * link.length + weights.time() * self.travel_time(link)
    }

    /// Estimate of the remaining effort from a node to the goal. Because the weight pair evolves
    /// while the frontier advances, an estimate computed early in the search is not guaranteed to
    /// remain a lower bound later on; see the router for the consequences.
    pub fn heuristic(&self, node: &Node, goal: &Node, weights: &WeightPair) -> f64 {
        let crow_flies = Self::great_circle(node, goal);
        weights.distance() * crow_flies + weights.time() * (crow_flies / self.max_speed)
    }

    /// Great-circle distance between two junctions in meters.
    pub fn great_circle(a: &Node, b: &Node) -> f64 {
        Haversine::distance(Point::new(a.x, a.y), Point::new(b.x, b.y))
    }
}
