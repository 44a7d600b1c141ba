use nohash_hasher::IntMap;
use serde::Serialize;
use tracing::{info, warn};

use crate::simulation::config::{CommandLineArgs, Config};
use crate::simulation::events::{
    EventsManager, RouteComputedEventBuilder, RouteProgressEventBuilder, TripEndedEventBuilder,
};
use crate::simulation::id::Id;
use crate::simulation::network::{Link, LinkSpeeds, Network};
use crate::simulation::preemption::{PreemptionController, TransitionCause};
use crate::simulation::routing::router::{AdaptiveAStarRouter, Route, RoutingError};
use crate::simulation::routing::weights::{AdaptiveWeights, Severity, Weighting};
use crate::simulation::telemetry::{SignalCommands, TelemetryProvider, VehicleTelemetry};

/// A vehicle closer than this to the downstream end of the goal link counts as arrived.
const ARRIVAL_TOLERANCE: f64 = 1.0;

/// One trip request, validated against the network before the core is invoked.
#[derive(Debug, Clone)]
pub struct TripRequest {
    pub start_link: String,
    pub goal_link: String,
    pub severity: Severity,
    pub depart_time: u32,
    pub vehicle: String,
}

impl From<&CommandLineArgs> for TripRequest {
    fn from(args: &CommandLineArgs) -> Self {
        TripRequest {
            start_link: args.start.clone(),
            goal_link: args.goal.clone(),
            severity: args.severity,
            depart_time: args.depart_time,
            vehicle: args.vehicle.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripState {
    EnRoute,
    Arrived,
    Aborted,
}

/// How a trip ended. An extreme travel time is still an `Arrived` outcome; gridlock along the
/// way is data in the event stream, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TripOutcome {
    Arrived { travel_time: u32, distance: f64 },
    Aborted,
}

/// Couples the fixed route of one emergency trip with the preemption controller driving the
/// signals along it. The route is computed once at trip start and never changes afterwards;
/// re-routing mid-trip is a known limitation, not supported on purpose.
pub struct Trip<'n> {
    network: &'n Network,
    route: Route,
    route_index: IntMap<Id<Link>, usize>,
    controller: PreemptionController<'n>,
    weights: AdaptiveWeights,
    vehicle: String,
    depart_time: u32,
    state: TripState,
    progress_interval: u32,
    next_progress_at: u32,
}

impl<'n> Trip<'n> {
    /// Validates the request, computes the route against a snapshot of the live speeds and arms
    /// the preemption controller for every signal along the route.
    pub fn prepare(
        network: &'n Network,
        speeds: &LinkSpeeds,
        config: &Config,
        request: TripRequest,
        events: &mut EventsManager,
    ) -> Result<Self, RoutingError> {
        let start = network
            .link_ids
            .get_from_ext(&request.start_link)
            .ok_or_else(|| RoutingError::InvalidNode(request.start_link.clone()))?;
        let goal = network
            .link_ids
            .get_from_ext(&request.goal_link)
            .ok_or_else(|| RoutingError::InvalidNode(request.goal_link.clone()))?;

        let weights = AdaptiveWeights::new(request.severity, &config.routing);
        let router = AdaptiveAStarRouter::new(network, speeds, weights.clone());
        let route = router.route(&start, &goal, request.depart_time)?;

        info!(
            vehicle = %request.vehicle,
            start = %start,
            goal = %goal,
            legs = route.legs().len(),
            distance = route.distance(),
            est_time = route.est_time(),
            "route computed"
        );
        events.publish_event(
            &RouteComputedEventBuilder::default()
                .time(request.depart_time)
                .vehicle(request.vehicle.clone())
                .start_link(start)
                .goal_link(goal)
                .severity(request.severity)
                .distance(route.distance())
                .est_time(route.est_time())
                .legs(route.legs().len())
                .build()
                .unwrap(),
        );

        let route_index = route
            .legs()
            .iter()
            .enumerate()
            .map(|(i, leg)| (leg.link.clone(), i))
            .collect();
        let controller =
            PreemptionController::from_route(network, &route, config.preemption.clone());

        Ok(Trip {
            network,
            route,
            route_index,
            controller,
            weights,
            vehicle: request.vehicle,
            depart_time: request.depart_time,
            state: TripState::EnRoute,
            progress_interval: config.routing.progress_interval,
            next_progress_at: request.depart_time + config.routing.progress_interval,
        })
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn state(&self) -> TripState {
        self.state
    }

    pub fn vehicle(&self) -> &str {
        &self.vehicle
    }

    pub fn controller(&self) -> &PreemptionController<'n> {
        &self.controller
    }

    /// Advances the trip by one simulation step: reads one telemetry sample, drives every signal
    /// on the route and checks for arrival. A failed telemetry read is logged and degrades the
    /// signals for this tick; it never ends the trip.
    pub fn tick(
        &mut self,
        now: u32,
        telemetry: &dyn TelemetryProvider,
        commands: &mut dyn SignalCommands,
        events: &mut EventsManager,
    ) {
        if self.state != TripState::EnRoute {
            return;
        }

        match telemetry.current_telemetry(&self.vehicle) {
            Ok(sample) => {
                self.controller.tick(now, Some(&sample), commands, events);
                self.monitor(now, &sample, events);
                if self.has_arrived(&sample) {
                    self.state = TripState::Arrived;
                    self.controller.release_engaged(
                        now,
                        TransitionCause::Cleared,
                        commands,
                        events,
                    );
                    let outcome = TripOutcome::Arrived {
                        travel_time: now.saturating_sub(self.depart_time),
                        distance: self.distance_covered(&sample).unwrap_or(self.route.distance()),
                    };
                    info!(vehicle = %self.vehicle, ?outcome, "destination reached");
                    events.publish_event(
                        &TripEndedEventBuilder::default()
                            .time(now)
                            .vehicle(self.vehicle.clone())
                            .outcome(outcome)
                            .build()
                            .unwrap(),
                    );
                }
            }
            Err(e) => {
                warn!(vehicle = %self.vehicle, error = %e, "telemetry read failed");
                self.controller.tick(now, None, commands, events);
            }
        }
    }

    /// Aborts the trip and releases every engaged signal back to normal operation. Works without
    /// vehicle telemetry.
    pub fn abort(
        &mut self,
        now: u32,
        commands: &mut dyn SignalCommands,
        events: &mut EventsManager,
    ) {
        if self.state != TripState::EnRoute {
            return;
        }
        self.controller
            .release_engaged(now, TransitionCause::TripAborted, commands, events);
        self.state = TripState::Aborted;
        info!(vehicle = %self.vehicle, "trip aborted");
        events.publish_event(
            &TripEndedEventBuilder::default()
                .time(now)
                .vehicle(self.vehicle.clone())
                .outcome(TripOutcome::Aborted)
                .build()
                .unwrap(),
        );
    }

    fn monitor(&mut self, now: u32, sample: &VehicleTelemetry, events: &mut EventsManager) {
        if now < self.next_progress_at {
            return;
        }
        let Some(distance_covered) = self.distance_covered(sample) else {
            return;
        };
        self.next_progress_at = now + self.progress_interval;

        let progress = if self.route.distance() > 0. {
            (distance_covered / self.route.distance()).clamp(0., 1.)
        } else {
            1.
        };
        let weights = self.weights.weights(progress, now);
        info!(
            vehicle = %self.vehicle,
            progress,
            distance_covered,
            speed = sample.speed,
            w_distance = weights.distance(),
            w_time = weights.time(),
            "route progress"
        );
        events.publish_event(
            &RouteProgressEventBuilder::default()
                .time(now)
                .vehicle(self.vehicle.clone())
                .progress(progress)
                .distance_covered(distance_covered)
                .speed(sample.speed)
                .weights(weights)
                .build()
                .unwrap(),
        );
    }

    fn has_arrived(&self, sample: &VehicleTelemetry) -> bool {
        let last = self.route.legs().len() - 1;
        match self.route_index.get(&sample.link) {
            Some(&i) if i == last => {
                let goal = self.network.get_link(&sample.link);
                sample.offset + ARRIVAL_TOLERANCE >= goal.length
            }
            _ => false,
        }
    }

    fn distance_covered(&self, sample: &VehicleTelemetry) -> Option<f64> {
        let &i = self.route_index.get(&sample.link)?;
        let behind: f64 = self.route.legs()[..i]
            .iter()
            .map(|leg| self.network.get_link(&leg.link).length)
            .sum();
        Some(behind + sample.offset.min(self.network.get_link(&sample.link).length))
    }
}
