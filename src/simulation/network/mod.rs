pub mod signals;

use nohash_hasher::IntMap;

use crate::simulation::id::{Id, IdStore};
use crate::simulation::network::signals::TrafficSignal;

/// The road network the router and the preemption controller operate on. Loading and parsing of
/// network file formats happens outside of this crate; whatever loads a network builds it through
/// [`Network::add_node`], [`Network::add_link`] and [`Network::add_signal`]. The core treats the
/// network as read-only for the duration of one search.
#[derive(Debug, Default)]
pub struct Network {
    pub node_ids: IdStore<Node>,
    pub link_ids: IdStore<Link>,
    pub signal_ids: IdStore<TrafficSignal>,
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    pub signals: Vec<TrafficSignal>,
}

#[derive(Debug)]
pub struct Node {
    pub id: Id<Node>,
    /// longitude in degrees
    pub x: f64,
    /// latitude in degrees
    pub y: f64,
    pub in_links: Vec<Id<Link>>,
    pub out_links: Vec<Id<Link>>,
    pub signal: Option<Id<TrafficSignal>>,
}

#[derive(Debug)]
pub struct Link {
    pub id: Id<Link>,
    pub from: Id<Node>,
    pub to: Id<Node>,
    /// length in meters
    pub length: f64,
    /// free flow speed in m/s
    pub freespeed: f32,
}

impl Network {
    pub fn new() -> Self {
        Network::default()
    }

    pub fn add_node(&mut self, node: Node) {
        assert_eq!(
            node.id.internal(),
            self.nodes.len() as u64,
            "internal id {} and slot in node vec {} were not the same. Probably, node id {} already exists.",
            node.id.internal(),
            self.nodes.len(),
            node.id.external()
        );
        self.nodes.push(node);
    }

    pub fn add_link(&mut self, link: Link) {
        assert_eq!(
            link.id.internal(),
            self.links.len() as u64,
            "internal id {} and slot in link vec {} were not the same. Probably, link id {} already exists.",
            link.id.internal(),
            self.links.len(),
            link.id.external()
        );

        // wire up in and out links and push link to the links vec
        self.nodes
            .get_mut(link.from.internal() as usize)
            .unwrap()
            .out_links
            .push(link.id.clone());
        self.nodes
            .get_mut(link.to.internal() as usize)
            .unwrap()
            .in_links
            .push(link.id.clone());
        self.links.push(link);
    }

    /// Registers a signal and attaches it to its junction. Signals are created once at
    /// network-load time and persist for the whole simulation run.
    pub fn add_signal(&mut self, signal: TrafficSignal) {
        assert_eq!(
            signal.id.internal(),
            self.signals.len() as u64,
            "internal id {} and slot in signal vec {} were not the same. Probably, signal id {} already exists.",
            signal.id.internal(),
            self.signals.len(),
            signal.id.external()
        );

        let node = self.nodes.get_mut(signal.node.internal() as usize).unwrap();
        assert!(
            node.signal.is_none(),
            "node {} already carries signal {:?}",
            node.id.external(),
            node.signal
        );
        node.signal = Some(signal.id.clone());
        self.signals.push(signal);
    }

    pub fn get_node(&self, id: &Id<Node>) -> &Node {
        self.nodes.get(id.internal() as usize).unwrap()
    }

    pub fn get_link(&self, id: &Id<Link>) -> &Link {
        self.links.get(id.internal() as usize).unwrap()
    }

    pub fn get_signal(&self, id: &Id<TrafficSignal>) -> &TrafficSignal {
        self.signals.get(id.internal() as usize).unwrap()
    }
}

impl Node {
    pub fn new(id: Id<Node>, x: f64, y: f64) -> Self {
        Node {
            id,
            x,
            y,
            in_links: Vec::new(),
            out_links: Vec::new(),
            signal: None,
        }
    }
}

impl Link {
    pub fn new(id: Id<Link>, from: Id<Node>, to: Id<Node>, length: f64, freespeed: f32) -> Self {
        Link {
            id,
            from,
            to,
            length,
            freespeed,
        }
    }
}

/// Snapshot of the live speed estimates per link. The router takes one snapshot at search start
/// and works against it for the whole search; a link without a live estimate falls back to its
/// free flow speed.
#[derive(Debug, Default)]
pub struct LinkSpeeds {
    speeds: IntMap<Id<Link>, f32>,
}

impl LinkSpeeds {
    pub fn new() -> Self {
        LinkSpeeds::default()
    }

    pub fn set(&mut self, link: Id<Link>, speed: f32) {
        self.speeds.insert(link, speed);
    }

    pub fn speed(&self, link: &Link) -> f32 {
        self.speeds.get(&link.id).copied().unwrap_or(link.freespeed)
    }

    /// The fastest speed reachable anywhere in the network under this snapshot. Used as the
    /// divisor of the time part of the search heuristic.
    pub fn max_speed(&self, network: &Network) -> f32 {
        network
            .links
            .iter()
            .map(|link| self.speed(link).max(link.freespeed))
            .fold(1.0, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::{Link, LinkSpeeds, Network, Node};
    use crate::simulation::network::signals::{Phase, TrafficSignal};

    #[test]
    fn add_node() {
        let mut network = Network::new();
        let id = network.node_ids.create_id("node-id");
        let node = Node::new(id.clone(), 1., 1.);

        assert_eq!(0, network.nodes.len());
        network.add_node(node);
        assert_eq!(1, network.nodes.len());
        assert_eq!(id, network.get_node(&id).id);
    }

    #[test]
    #[should_panic]
    fn add_node_reject_duplicate() {
        let mut network = Network::new();
        let id = network.node_ids.create_id("node-id");
        let node = Node::new(id.clone(), 1., 1.);
        let duplicate = Node::new(id.clone(), 2., 2.);

        network.add_node(node);
        network.add_node(duplicate); // expecting panic here.
    }

    #[test]
    fn add_link() {
        let mut network = Network::new();
        let from = Node::new(network.node_ids.create_id("from"), 0., 0.);
        let to = Node::new(network.node_ids.create_id("to"), 3., 4.);
        let id = network.link_ids.create_id("link-id");
        let link = Link::new(id.clone(), from.id.clone(), to.id.clone(), 100., 13.89);

        network.add_node(from);
        network.add_node(to);
        network.add_link(link);

        assert_eq!(2, network.nodes.len());
        assert_eq!(1, network.links.len());

        let link = network.get_link(&id);
        let from = network.get_node(&link.from);
        let to = network.get_node(&link.to);

        assert_eq!(id, link.id);
        assert_eq!(0, from.in_links.len());
        assert_eq!(1, from.out_links.len());
        assert_eq!(&id, from.out_links.first().unwrap());
        assert_eq!(0, to.out_links.len());
        assert_eq!(1, to.in_links.len());
        assert_eq!(&id, to.in_links.first().unwrap());
    }

    #[test]
    fn add_signal_attaches_to_node() {
        let mut network = Network::new();
        let node_id = network.node_ids.create_id("junction");
        network.add_node(Node::new(node_id.clone(), 0., 0.));

        let signal_id = network.signal_ids.create_id("signal");
        network.add_signal(TrafficSignal::new(
            signal_id.clone(),
            node_id.clone(),
            vec![Phase::new(vec![], 30)],
        ));

        assert_eq!(Some(signal_id.clone()), network.get_node(&node_id).signal);
        assert_eq!(signal_id, network.get_signal(&signal_id).id);
    }

    #[test]
    fn link_speeds_fall_back_to_freespeed() {
        let mut network = Network::new();
        let from = network.node_ids.create_id("from");
        let to = network.node_ids.create_id("to");
        network.add_node(Node::new(from.clone(), 0., 0.));
        network.add_node(Node::new(to.clone(), 1., 1.));
        let link_id = network.link_ids.create_id("link");
        network.add_link(Link::new(link_id.clone(), from, to, 100., 13.89));

        let mut speeds = LinkSpeeds::new();
        let link = network.get_link(&link_id);
        assert_eq!(13.89, speeds.speed(link));

        speeds.set(link_id.clone(), 2.5);
        let link = network.get_link(&link_id);
        assert_eq!(2.5, speeds.speed(link));
        // max speed never drops below free flow
        assert_eq!(13.89, speeds.max_speed(&network));
    }
}
