pub mod low_speed_timer;

use nohash_hasher::IntMap;
use serde::Serialize;
use tracing::{info, warn};

use crate::simulation::config;
use crate::simulation::events::{EventsManager, SignalStateEventBuilder};
use crate::simulation::id::Id;
use crate::simulation::network::signals::TrafficSignal;
use crate::simulation::network::{Link, Network};
use crate::simulation::preemption::low_speed_timer::LowSpeedTimer;
use crate::simulation::routing::router::Route;
use crate::simulation::telemetry::{SignalCommands, VehicleTelemetry};

/// Control state of one signal on the active route. The variants carry the timestamps their
/// transitions depend on, so the state value is self-contained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignalState {
    Normal,
    Preempted { dwell_started: u32 },
    Fallback { since: u32 },
    Gridlocked { until: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionCause {
    /// the vehicle came within the trigger distance
    Approach,
    /// the vehicle stayed below crawl speed for longer than the stuck limit
    VehicleStuck,
    /// the fallback window elapsed, preemption is re-attempted
    FallbackElapsed,
    /// all fallback cycles are used up, the intersection is quarantined
    Gridlock,
    /// the gridlock cooldown ran out
    CooldownExpired,
    /// the vehicle passed through the intersection
    Cleared,
    TelemetryLost,
    TripAborted,
}

#[derive(Debug)]
struct SignalControl {
    signal: Id<TrafficSignal>,
    /// position of the link entering the junction in the route
    approach_index: usize,
    state: SignalState,
    fallback_cycles: u32,
    low_speed: LowSpeedTimer,
    /// phase indices compatible with the approach link, cycled while preempted
    phase_plan: Vec<usize>,
    phase_cursor: usize,
    /// set once the vehicle has passed the junction; suppresses any further engagement
    retired: bool,
}

/// Drives one state machine per traffic signal on the active route. The registry of signal
/// states is owned here and nowhere else; external code observes signals through the recorded
/// transition events or through [`PreemptionController::state_of`].
///
/// `tick` is invoked once per simulation step and issues at most one phase command per signal
/// per call. A signal reaching `Gridlocked` is a recorded outcome, not an error. The route is
/// fixed and the router does not reroute around it.
pub struct PreemptionController<'n> {
    network: &'n Network,
    config: config::Preemption,
    /// controls in route order, so ticks and their recorded events are deterministic
    controls: Vec<SignalControl>,
    registry: IntMap<Id<TrafficSignal>, usize>,
    route_links: Vec<Id<Link>>,
    route_index: IntMap<Id<Link>, usize>,
}

impl<'n> PreemptionController<'n> {
    pub fn from_route(network: &'n Network, route: &Route, config: config::Preemption) -> Self {
        let route_links: Vec<Id<Link>> = route.legs().iter().map(|leg| leg.link.clone()).collect();
        let route_index: IntMap<Id<Link>, usize> = route_links
            .iter()
            .enumerate()
            .map(|(i, link)| (link.clone(), i))
            .collect();

        let mut controls = Vec::new();
        let mut registry = IntMap::default();
        // the junction at the downstream end of the final link is never crossed
        for (i, link_id) in route_links.iter().enumerate().take(route_links.len().saturating_sub(1)) {
            let node = network.get_node(&network.get_link(link_id).to);
            let Some(signal_id) = &node.signal else {
                continue;
            };
            if registry.contains_key(signal_id) {
                continue;
            }

            let signal = network.get_signal(signal_id);
            let phase_plan = signal.compatible_phases(link_id);
            if phase_plan.is_empty() {
                warn!(
                    signal = %signal_id,
                    approach = %link_id,
                    "no phase serves the approach link, signal will not be preempted"
                );
                continue;
            }

            registry.insert(signal_id.clone(), controls.len());
            controls.push(SignalControl {
                signal: signal_id.clone(),
                approach_index: i,
                state: SignalState::Normal,
                fallback_cycles: 0,
                low_speed: LowSpeedTimer::new(config.stuck_speed),
                phase_plan,
                phase_cursor: 0,
                retired: false,
            });
        }

        info!(
            signals = controls.len(),
            links = route_links.len(),
            "preemption controller armed for route"
        );

        PreemptionController {
            network,
            config,
            controls,
            registry,
            route_links,
            route_index,
        }
    }

    /// Advances every signal on the route by one simulation step. A missing telemetry sample
    /// degrades all engaged signals to normal operation for this tick and is logged, never
    /// propagated.
    pub fn tick(
        &mut self,
        now: u32,
        telemetry: Option<&VehicleTelemetry>,
        commands: &mut dyn SignalCommands,
        events: &mut EventsManager,
    ) {
        // cooldowns run on the simulation clock alone, with or without telemetry
        for i in 0..self.controls.len() {
            self.tick_cooldown(i, now, events);
        }

        let Some(telemetry) = telemetry else {
            warn!("no vehicle telemetry this tick, degrading engaged signals to normal operation");
            self.release_engaged(now, TransitionCause::TelemetryLost, commands, events);
            return;
        };
        let Some(&vehicle_index) = self.route_index.get(&telemetry.link) else {
            warn!(
                link = %telemetry.link,
                "telemetry reports a link that is not on the route, degrading engaged signals"
            );
            self.release_engaged(now, TransitionCause::TelemetryLost, commands, events);
            return;
        };

        for i in 0..self.controls.len() {
            self.tick_signal(i, now, telemetry, vehicle_index, commands, events);
        }
    }

    /// Best-effort cleanup: hands every engaged signal back to its normal program. Used when the
    /// trip is aborted and when telemetry is lost; works without any vehicle telemetry and
    /// cannot fail.
    pub fn release_engaged(
        &mut self,
        now: u32,
        cause: TransitionCause,
        commands: &mut dyn SignalCommands,
        events: &mut EventsManager,
    ) {
        for control in &mut self.controls {
            if matches!(
                control.state,
                SignalState::Preempted { .. } | SignalState::Fallback { .. }
            ) {
                commands.restore_program(&control.signal);
                Self::transition(control, now, SignalState::Normal, cause, events);
            }
        }
    }

    pub fn state_of(&self, signal: &Id<TrafficSignal>) -> Option<SignalState> {
        self.registry
            .get(signal)
            .map(|&i| self.controls[i].state)
    }

    pub fn fallback_cycles(&self, signal: &Id<TrafficSignal>) -> Option<u32> {
        self.registry
            .get(signal)
            .map(|&i| self.controls[i].fallback_cycles)
    }

    fn tick_cooldown(&mut self, i: usize, now: u32, events: &mut EventsManager) {
        if let SignalState::Gridlocked { until } = self.controls[i].state {
            if now >= until {
                let control = &mut self.controls[i];
                control.fallback_cycles = 0;
                Self::transition(
                    control,
                    now,
                    SignalState::Normal,
                    TransitionCause::CooldownExpired,
                    events,
                );
            }
        }
    }

    fn tick_signal(
        &mut self,
        i: usize,
        now: u32,
        telemetry: &VehicleTelemetry,
        vehicle_index: usize,
        commands: &mut dyn SignalCommands,
        events: &mut EventsManager,
    ) {
        let cfg = self.config.clone();
        let (approach_index, state) = {
            let control = &self.controls[i];
            (control.approach_index, control.state)
        };

        if vehicle_index > approach_index {
            let control = &mut self.controls[i];
            if !control.retired {
                if matches!(
                    control.state,
                    SignalState::Preempted { .. } | SignalState::Fallback { .. }
                ) {
                    commands.restore_program(&control.signal);
                    Self::transition(
                        control,
                        now,
                        SignalState::Normal,
                        TransitionCause::Cleared,
                        events,
                    );
                }
                control.retired = true;
            }
            return;
        }
        if self.controls[i].retired {
            return;
        }

        match state {
            SignalState::Normal => {
                let distance = self.distance_to_signal(approach_index, telemetry, vehicle_index);
                if distance <= cfg.trigger_distance {
                    let control = &mut self.controls[i];
                    control.phase_cursor = 0;
                    commands.set_phase(&control.signal, control.phase_plan[0]);
                    control.low_speed.reset();
                    Self::transition(
                        control,
                        now,
                        SignalState::Preempted { dwell_started: now },
                        TransitionCause::Approach,
                        events,
                    );
                }
            }
            SignalState::Preempted { dwell_started } => {
                let control = &mut self.controls[i];
                control.low_speed.update(now, telemetry.speed);
                if control.low_speed.is_stuck(now, cfg.stuck_after) {
                    control.fallback_cycles += 1;
                    control.low_speed.reset();
                    commands.restore_program(&control.signal);
                    if control.fallback_cycles >= cfg.max_fallback_cycles {
                        Self::transition(
                            control,
                            now,
                            SignalState::Gridlocked {
                                until: now + cfg.gridlock_cooldown,
                            },
                            TransitionCause::Gridlock,
                            events,
                        );
                    } else {
                        Self::transition(
                            control,
                            now,
                            SignalState::Fallback { since: now },
                            TransitionCause::VehicleStuck,
                            events,
                        );
                    }
                } else if now.saturating_sub(dwell_started) >= cfg.phase_dwell
                    && control.phase_plan.len() > 1
                {
                    // hold the next compatible phase; same state, fresh dwell
                    control.phase_cursor = (control.phase_cursor + 1) % control.phase_plan.len();
                    commands.set_phase(&control.signal, control.phase_plan[control.phase_cursor]);
                    control.state = SignalState::Preempted { dwell_started: now };
                }
            }
            SignalState::Fallback { since } => {
                if now.saturating_sub(since) >= cfg.fallback_duration {
                    let control = &mut self.controls[i];
                    control.phase_cursor = 0;
                    commands.set_phase(&control.signal, control.phase_plan[0]);
                    control.low_speed.reset();
                    Self::transition(
                        control,
                        now,
                        SignalState::Preempted { dwell_started: now },
                        TransitionCause::FallbackElapsed,
                        events,
                    );
                }
            }
            // quarantined until the cooldown expires, handled in tick_cooldown
            SignalState::Gridlocked { .. } => {}
        }
    }

    /// Remaining route distance from the vehicle position to the downstream end of the approach
    /// link.
    fn distance_to_signal(
        &self,
        approach_index: usize,
        telemetry: &VehicleTelemetry,
        vehicle_index: usize,
    ) -> f64 {
        let current = self.network.get_link(&telemetry.link);
        let mut distance = (current.length - telemetry.offset).max(0.);
        for link_id in &self.route_links[vehicle_index + 1..=approach_index] {
            distance += self.network.get_link(link_id).length;
        }
        distance
    }

    fn transition(
        control: &mut SignalControl,
        now: u32,
        to: SignalState,
        cause: TransitionCause,
        events: &mut EventsManager,
    ) {
        let from = control.state;
        info!(signal = %control.signal, ?from, ?to, ?cause, "signal state transition");
        control.state = to;
        events.publish_event(
            &SignalStateEventBuilder::default()
                .time(now)
                .signal(control.signal.clone())
                .from(from)
                .to(to)
                .cause(cause)
                .build()
                .unwrap(),
        );
    }
}
