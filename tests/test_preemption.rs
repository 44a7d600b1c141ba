use std::cell::RefCell;
use std::rc::Rc;

use greenwave::simulation::config;
use greenwave::simulation::events::{EventsManager, SignalStateEvent};
use greenwave::simulation::logging::init_std_out_logging;
use greenwave::simulation::network::{LinkSpeeds, Network};
use greenwave::simulation::preemption::{PreemptionController, SignalState, TransitionCause};
use greenwave::simulation::routing::router::{AdaptiveAStarRouter, Route};
use greenwave::simulation::routing::weights::{FixedWeights, WeightPair};
use greenwave::simulation::telemetry::VehicleTelemetry;

use crate::fixtures::{signalised_corridor, RecordingCommands};

mod fixtures;

fn route_through(network: &Network) -> Route {
    let speeds = LinkSpeeds::new();
    let router = AdaptiveAStarRouter::new(network, &speeds, FixedWeights(WeightPair::fixed(0.5)));
    router
        .route(
            &network.link_ids.get_from_ext("in").unwrap(),
            &network.link_ids.get_from_ext("out").unwrap(),
            0,
        )
        .unwrap()
}

fn collect_transitions(
    events: &mut EventsManager,
) -> Rc<RefCell<Vec<(u32, SignalState, TransitionCause)>>> {
    let collected = Rc::new(RefCell::new(Vec::new()));
    let sink = collected.clone();
    events.on::<SignalStateEvent, _>(move |e| sink.borrow_mut().push((e.time, e.to, e.cause)));
    collected
}

/// vehicle standing 400m before the junction
fn stuck_sample(network: &Network, time: u32) -> VehicleTelemetry {
    VehicleTelemetry {
        link: network.link_ids.get_from_ext("in").unwrap(),
        offset: 600.,
        speed: 0.,
        time,
    }
}

#[test]
fn three_failed_fallback_cycles_end_in_gridlock() {
    let _guard = init_std_out_logging();
    let network = signalised_corridor();
    let route = route_through(&network);
    let mut controller =
        PreemptionController::from_route(&network, &route, config::Preemption::default());
    let signal = network.signal_ids.get_from_ext("signal-b").unwrap();

    let mut events = EventsManager::new();
    let transitions = collect_transitions(&mut events);
    let mut commands = RecordingCommands::default();

    for now in 0..=96 {
        commands.now = now;
        let sample = stuck_sample(&network, now);
        controller.tick(now, Some(&sample), &mut commands, &mut events);
    }

    // preempted at 0; the low-speed streak begins with the first preempted sample at 1 and
    // must exceed 10s, so each fallback fires 12s after (re-)preemption
    assert_eq!(
        vec![
            (0, SignalState::Preempted { dwell_started: 0 }, TransitionCause::Approach),
            (12, SignalState::Fallback { since: 12 }, TransitionCause::VehicleStuck),
            (27, SignalState::Preempted { dwell_started: 27 }, TransitionCause::FallbackElapsed),
            (39, SignalState::Fallback { since: 39 }, TransitionCause::VehicleStuck),
            (54, SignalState::Preempted { dwell_started: 54 }, TransitionCause::FallbackElapsed),
            (66, SignalState::Gridlocked { until: 96 }, TransitionCause::Gridlock),
            (96, SignalState::Normal, TransitionCause::CooldownExpired),
            (96, SignalState::Preempted { dwell_started: 96 }, TransitionCause::Approach),
        ],
        *transitions.borrow()
    );

    // the quarantine window forces normal operation: between the restore command at 66 and the
    // renewed preemption at 96 no command reaches the signal, regardless of telemetry
    let during_cooldown: Vec<&(u32, String)> = commands
        .log
        .iter()
        .filter(|(t, _)| (66..96).contains(t))
        .collect();
    assert_eq!(1, during_cooldown.len());
    assert_eq!((66, "signal-b:restore".to_string()), *during_cooldown[0]);

    // counter was reset when the cooldown expired
    assert_eq!(Some(0), controller.fallback_cycles(&signal));
}

#[test]
fn low_speed_streak_of_exactly_ten_seconds_does_not_fall_back() {
    let network = signalised_corridor();
    let route = route_through(&network);
    let mut controller =
        PreemptionController::from_route(&network, &route, config::Preemption::default());
    let signal = network.signal_ids.get_from_ext("signal-b").unwrap();

    let mut events = EventsManager::new();
    let transitions = collect_transitions(&mut events);
    let mut commands = RecordingCommands::default();

    // preempted at 0, then crawling from 1 to 11 -- a streak of exactly 10.0s -- then moving
    for now in 0..=20 {
        commands.now = now;
        let speed = if (1..=11).contains(&now) { 0. } else { 10. };
        let sample = VehicleTelemetry {
            link: network.link_ids.get_from_ext("in").unwrap(),
            offset: 600.,
            speed,
            time: now,
        };
        controller.tick(now, Some(&sample), &mut commands, &mut events);
    }

    assert!(matches!(
        controller.state_of(&signal),
        Some(SignalState::Preempted { .. })
    ));
    assert!(transitions
        .borrow()
        .iter()
        .all(|(_, _, cause)| *cause != TransitionCause::VehicleStuck));
}

#[test]
fn gridlocked_signal_ignores_telemetry_until_cooldown_expires() {
    let network = signalised_corridor();
    let route = route_through(&network);
    let mut controller =
        PreemptionController::from_route(&network, &route, config::Preemption::default());
    let signal = network.signal_ids.get_from_ext("signal-b").unwrap();

    let mut events = EventsManager::new();
    let mut commands = RecordingCommands::default();

    for now in 0..=66 {
        commands.now = now;
        let sample = stuck_sample(&network, now);
        controller.tick(now, Some(&sample), &mut commands, &mut events);
    }
    assert_eq!(
        Some(SignalState::Gridlocked { until: 96 }),
        controller.state_of(&signal)
    );

    // telemetry loss, movement, more crawling -- none of it matters while quarantined
    controller.tick(70, None, &mut commands, &mut events);
    assert_eq!(
        Some(SignalState::Gridlocked { until: 96 }),
        controller.state_of(&signal)
    );
    for now in 71..96 {
        commands.now = now;
        let sample = stuck_sample(&network, now);
        controller.tick(now, Some(&sample), &mut commands, &mut events);
    }
    assert_eq!(
        Some(SignalState::Gridlocked { until: 96 }),
        controller.state_of(&signal)
    );

    commands.now = 96;
    let sample = stuck_sample(&network, 96);
    controller.tick(96, Some(&sample), &mut commands, &mut events);
    assert!(matches!(
        controller.state_of(&signal),
        Some(SignalState::Preempted { .. })
    ));
}

#[test]
fn release_engaged_restores_without_telemetry() {
    let network = signalised_corridor();
    let route = route_through(&network);
    let mut controller =
        PreemptionController::from_route(&network, &route, config::Preemption::default());
    let signal = network.signal_ids.get_from_ext("signal-b").unwrap();

    let mut events = EventsManager::new();
    let mut commands = RecordingCommands::default();

    let sample = stuck_sample(&network, 0);
    controller.tick(0, Some(&sample), &mut commands, &mut events);
    assert!(matches!(
        controller.state_of(&signal),
        Some(SignalState::Preempted { .. })
    ));

    controller.release_engaged(1, TransitionCause::TripAborted, &mut commands, &mut events);
    assert_eq!(Some(SignalState::Normal), controller.state_of(&signal));
    assert_eq!(
        vec!["signal-b:phase-0", "signal-b:restore"],
        commands.commands()
    );
}
