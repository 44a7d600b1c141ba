use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::fs;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use derive_builder::Builder;
use serde::Serialize;

use crate::simulation::config::{Config, WriteEvents};
use crate::simulation::id::Id;
use crate::simulation::network::signals::TrafficSignal;
use crate::simulation::network::Link;
use crate::simulation::preemption::{SignalState, TransitionCause};
use crate::simulation::routing::weights::{Severity, WeightPair};
use crate::simulation::trip::TripOutcome;

pub trait EventTrait: Debug + Any {
    //This can't be a const, because traits with const fields are not dyn compatible.
    fn type_(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn time(&self) -> u32;
}

type OnEventFn = dyn Fn(&dyn EventTrait) + 'static;

/// The EventsManager holds call-backs for event processing. Rust has no reflection, so event
/// consumers register per concrete event type; this allows compile-time checking of the event
/// types.
#[derive(Default)]
pub struct EventsManager {
    per_type: HashMap<TypeId, Vec<Rc<OnEventFn>>>,
    catch_all: Vec<Box<OnEventFn>>,
    finish: Vec<Box<dyn Fn() + 'static>>,
}

impl Debug for EventsManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EventsManager {{ per_type: {:?}, catch_all: {:?}, finish: {:?} }}",
            self.per_type.len(),
            self.catch_all.len(),
            self.finish.len()
        )
    }
}

impl EventsManager {
    pub fn new() -> Self {
        EventsManager::default()
    }

    /// Creates a manager with the output subscribers the config asks for.
    pub fn from_config(config: &Config) -> Self {
        let mut manager = EventsManager::new();
        if WriteEvents::Json == config.output.write_events {
            let dir = &config.output.output_dir;
            fs::create_dir_all(dir).expect("Failed to create output directory for events");
            JsonEventsWriter::register(&mut manager, &dir.join("events.jsonl"));
        }
        manager
    }

    pub fn publish_event(&mut self, event: &dyn EventTrait) {
        let tid = event.as_any().type_id();
        if let Some(list) = self.per_type.get(&tid).cloned() {
            for h in list {
                h(event);
            }
        }
        for h in &self.catch_all {
            h(event);
        }
    }

    pub fn finish(&mut self) {
        for f in self.finish.iter_mut() {
            f()
        }
    }

    /// This function is used to register callbacks for specific event types.
    pub fn on<E, F>(&mut self, f: F)
    where
        E: EventTrait,
        F: Fn(&E) + 'static,
    {
        let type_id = TypeId::of::<E>();
        let entry = self.per_type.entry(type_id).or_default();
        entry.push(Rc::new(move |ev: &dyn EventTrait| {
            if let Some(e) = ev.as_any().downcast_ref::<E>() {
                f(e);
            }
        }));
    }

    /// This function is used to register callbacks for all event types.
    pub fn on_any<F>(&mut self, f: F)
    where
        F: Fn(&dyn EventTrait) + 'static,
    {
        self.catch_all.push(Box::new(f));
    }

    pub fn on_finish<F>(&mut self, f: F)
    where
        F: Fn() + 'static,
    {
        self.finish.push(Box::new(f));
    }
}

#[derive(Builder, Debug, Serialize)]
pub struct RouteComputedEvent {
    pub time: u32,
    pub vehicle: String,
    pub start_link: Id<Link>,
    pub goal_link: Id<Link>,
    pub severity: Severity,
    pub distance: f64,
    pub est_time: f64,
    pub legs: usize,
}

impl RouteComputedEvent {
    pub const TYPE: &'static str = "routeComputed";
}

impl EventTrait for RouteComputedEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
}

#[derive(Builder, Debug, Serialize)]
pub struct SignalStateEvent {
    pub time: u32,
    pub signal: Id<TrafficSignal>,
    pub from: SignalState,
    pub to: SignalState,
    pub cause: TransitionCause,
}

impl SignalStateEvent {
    pub const TYPE: &'static str = "signalState";
}

impl EventTrait for SignalStateEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
}

#[derive(Builder, Debug, Serialize)]
pub struct RouteProgressEvent {
    pub time: u32,
    pub vehicle: String,
    /// fraction of the route distance covered
    pub progress: f64,
    pub distance_covered: f64,
    pub speed: f32,
    pub weights: WeightPair,
}

impl RouteProgressEvent {
    pub const TYPE: &'static str = "routeProgress";
}

impl EventTrait for RouteProgressEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
}

#[derive(Builder, Debug, Serialize)]
pub struct TripEndedEvent {
    pub time: u32,
    pub vehicle: String,
    pub outcome: TripOutcome,
}

impl TripEndedEvent {
    pub const TYPE: &'static str = "tripEnded";
}

impl EventTrait for TripEndedEvent {
    fn type_(&self) -> &'static str {
        Self::TYPE
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn time(&self) -> u32 {
        self.time
    }
}

/// Writes events as JSON lines for external analysis tooling.
pub struct JsonEventsWriter;

impl JsonEventsWriter {
    pub fn register(manager: &mut EventsManager, path: &Path) {
        let file = File::create(path)
            .unwrap_or_else(|e| panic!("Failed to create events file at {path:?}: {e}"));
        let out = Rc::new(RefCell::new(BufWriter::new(file)));

        let writer = out.clone();
        manager.on::<RouteComputedEvent, _>(move |e| Self::write(&writer, e.type_(), e));
        let writer = out.clone();
        manager.on::<SignalStateEvent, _>(move |e| Self::write(&writer, e.type_(), e));
        let writer = out.clone();
        manager.on::<RouteProgressEvent, _>(move |e| Self::write(&writer, e.type_(), e));
        let writer = out.clone();
        manager.on::<TripEndedEvent, _>(move |e| Self::write(&writer, e.type_(), e));

        manager.on_finish(move || {
            out.borrow_mut().flush().expect("Failed to flush events file");
        });
    }

    fn write<E: Serialize>(out: &Rc<RefCell<BufWriter<File>>>, type_: &str, event: &E) {
        let mut value = serde_json::to_value(event).expect("Failed to serialize event");
        if let serde_json::Value::Object(map) = &mut value {
            map.insert("type".to_string(), type_.into());
        }
        writeln!(out.borrow_mut(), "{value}").expect("Failed to write event");
    }
}
