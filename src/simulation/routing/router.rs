use std::cmp::Ordering;

use keyed_priority_queue::KeyedPriorityQueue;
use nohash_hasher::{IntMap, IntSet};
use thiserror::Error;
use tracing::debug;

use crate::simulation::id::Id;
use crate::simulation::network::{Link, LinkSpeeds, Network, Node};
use crate::simulation::routing::cost::CostModel;
use crate::simulation::routing::weights::{WeightPair, Weighting};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("identifier {0} is not part of the network")]
    InvalidNode(String),
    #[error("no path from {from} to {to} in the current network snapshot")]
    NoPathFound { from: String, to: String },
}

/// The ordered sequence of links computed for one trip, with the weight pair that priced each
/// link. A route is immutable once returned by the router and is discarded when the trip ends.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    legs: Vec<RouteLeg>,
    distance: f64,
    est_time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteLeg {
    pub link: Id<Link>,
    pub weights: WeightPair,
}

impl Route {
    pub fn legs(&self) -> &[RouteLeg] {
        &self.legs
    }

    /// total length in meters
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// estimated travel time in seconds, under the speed snapshot the route was computed with
    pub fn est_time(&self) -> f64 {
        self.est_time
    }
}

/// Best-first search over the road network. Unlike textbook A*, the weight pair is recomputed at
/// every node expansion from the distance and time progressed up to that node, so the effective
/// cost function evolves as the frontier advances toward the goal. This sacrifices the classic
/// admissibility guarantee: the search is deliberately best-effort, and path optimality under
/// evolving weights is not provable.
///
/// Ties on equal f-score break on the lower heuristic value, then on the lower internal node id,
/// so that identical inputs always yield identical routes.
pub struct AdaptiveAStarRouter<'n, W: Weighting> {
    network: &'n Network,
    cost: CostModel<'n>,
    weighting: W,
}

struct NodeLabel {
    g: f64,
    cum_distance: f64,
    cum_time: f64,
    prev: Option<(Id<Node>, Id<Link>, WeightPair)>,
}

/// Priority of an open-set entry. Ord is reversed so that the keyed queue, which pops its maximum
/// entry, hands out the entry with the lowest f-score first.
struct OpenEntry {
    f: f64,
    h: f64,
    node: u64,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.h.total_cmp(&self.h))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl<'n, W: Weighting> AdaptiveAStarRouter<'n, W> {
    /// The speed snapshot is taken by the caller once per trip request; the search never reads
    /// live values after that.
    pub fn new(network: &'n Network, speeds: &'n LinkSpeeds, weighting: W) -> Self {
        AdaptiveAStarRouter {
            network,
            cost: CostModel::new(network, speeds),
            weighting,
        }
    }

    /// Computes a route from the link the vehicle currently occupies to the link it must reach.
    /// The search runs between the downstream node of the start link and the upstream node of the
    /// goal link; both boundary links become part of the route.
    pub fn route(
        &self,
        start_link: &Id<Link>,
        goal_link: &Id<Link>,
        depart_time: u32,
    ) -> Result<Route, RoutingError> {
        self.check_link(start_link)?;
        self.check_link(goal_link)?;

        let start = self.network.get_link(start_link);
        let goal = self.network.get_link(goal_link);
        let start_weights = self.weighting.weights(0.0, depart_time);

        if start_link == goal_link {
            let leg = RouteLeg {
                link: start.id.clone(),
                weights: start_weights,
            };
            return Ok(Route {
                legs: vec![leg],
                distance: start.length,
                est_time: self.cost.travel_time(start),
            });
        }

        let start_node = start.to.clone();
        let goal_node = goal.from.clone();
        let total_estimate = CostModel::great_circle(
            self.network.get_node(&start_node),
            self.network.get_node(&goal_node),
        );

        let mut labels: IntMap<Id<Node>, NodeLabel> = IntMap::default();
        let mut closed: IntSet<Id<Node>> = IntSet::default();
        let mut open: KeyedPriorityQueue<Id<Node>, OpenEntry> = KeyedPriorityQueue::new();

        labels.insert(
            start_node.clone(),
            NodeLabel {
                g: self.cost.edge_cost(start, &start_weights),
                cum_distance: start.length,
                cum_time: self.cost.travel_time(start),
                prev: None,
            },
        );
        let h = self.cost.heuristic(
            self.network.get_node(&start_node),
            self.network.get_node(&goal_node),
            &start_weights,
        );
        open.push(
            start_node.clone(),
            OpenEntry {
                f: labels.get(&start_node).unwrap().g + h,
                h,
                node: start_node.internal(),
            },
        );

        while let Some((node_id, _)) = open.pop() {
            let (g, cum_distance, cum_time) = {
                let label = labels.get(&node_id).unwrap();
                (label.g, label.cum_distance, label.cum_time)
            };

            if node_id == goal_node {
                return Ok(self.assemble(
                    &labels,
                    &node_id,
                    start,
                    goal,
                    start_weights,
                    self.expansion_weights(cum_distance, cum_time, total_estimate, depart_time),
                ));
            }
            closed.insert(node_id.clone());

            // the core difference to textbook A*: re-derive the weight pair from the progress at
            // this node and price every outgoing link with it
            let weights = self.expansion_weights(cum_distance, cum_time, total_estimate, depart_time);

            let out_links = &self.network.get_node(&node_id).out_links;
            for link_id in out_links {
                let link = self.network.get_link(link_id);
                if closed.contains(&link.to) {
                    continue;
                }

                let tentative_g = g + self.cost.edge_cost(link, &weights);
                let known_g = labels.get(&link.to).map(|l| l.g).unwrap_or(f64::INFINITY);
                if tentative_g >= known_g {
                    continue;
                }

                labels.insert(
                    link.to.clone(),
                    NodeLabel {
                        g: tentative_g,
                        cum_distance: cum_distance + link.length,
                        cum_time: cum_time + self.cost.travel_time(link),
                        prev: Some((node_id.clone(), link.id.clone(), weights)),
                    },
                );
                let h = self.cost.heuristic(
                    self.network.get_node(&link.to),
                    self.network.get_node(&goal_node),
                    &weights,
                );
                open.push(
                    link.to.clone(),
                    OpenEntry {
                        f: tentative_g + h,
                        h,
                        node: link.to.internal(),
                    },
                );
            }
        }

        debug!(
            start = %start_link,
            goal = %goal_link,
            "open set exhausted before reaching the goal"
        );
        Err(RoutingError::NoPathFound {
            from: start_link.external().to_string(),
            to: goal_link.external().to_string(),
        })
    }

    fn check_link(&self, link: &Id<Link>) -> Result<(), RoutingError> {
        if link.internal() as usize >= self.network.links.len() {
            return Err(RoutingError::InvalidNode(link.external().to_string()));
        }
        Ok(())
    }

    fn expansion_weights(
        &self,
        cum_distance: f64,
        cum_time: f64,
        total_estimate: f64,
        depart_time: u32,
    ) -> WeightPair {
        let progress = if total_estimate <= f64::EPSILON {
            1.0
        } else {
            (cum_distance / total_estimate).min(1.0)
        };
        self.weighting
            .weights(progress, depart_time + cum_time.round() as u32)
    }

    fn assemble(
        &self,
        labels: &IntMap<Id<Node>, NodeLabel>,
        goal_node: &Id<Node>,
        start: &Link,
        goal: &Link,
        start_weights: WeightPair,
        goal_weights: WeightPair,
    ) -> Route {
        let mut legs = Vec::new();
        let mut current = goal_node.clone();
        while let Some((prev_node, link, weights)) = &labels.get(&current).unwrap().prev {
            legs.push(RouteLeg {
                link: link.clone(),
                weights: *weights,
            });
            current = prev_node.clone();
        }
        legs.push(RouteLeg {
            link: start.id.clone(),
            weights: start_weights,
        });
        legs.reverse();
        legs.push(RouteLeg {
            link: goal.id.clone(),
            weights: goal_weights,
        });

        let goal_label = labels.get(goal_node).unwrap();
        Route {
            legs,
            distance: goal_label.cum_distance + goal.length,
            est_time: goal_label.cum_time + self.cost.travel_time(goal),
        }
    }
}
