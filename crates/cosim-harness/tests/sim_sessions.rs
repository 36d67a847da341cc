//! Simulated bridge sessions on virtual time.
//!
//! Every deadline here is real-sized (seconds to minutes) and still costs
//! nothing: Turmoil advances the clock only when all hosts are idle.

use std::time::Duration;

use cosim_core::{BridgeConfig, BridgeError, ClockError, SignalMap, Wire};
use cosim_harness::{
    PeerStep, RecordingScheduler, Scenario, SleepScheduler, StalledScheduler, ToggleScheduler,
};
use cosim_proto::{Envelope, Outbound};

fn wire_map(name: &str, wire: &Wire) -> SignalMap {
    let mut signals = SignalMap::new();
    signals.register_wire(name, wire).unwrap();
    signals
}

fn fast_shutdown() -> BridgeConfig {
    BridgeConfig { shutdown_grace: Duration::from_millis(10), ..BridgeConfig::default() }
}

#[test]
fn end_to_end_example() {
    let wire = Wire::logic(1);
    let outcome = Scenario::new()
        .config(fast_shutdown())
        .signals(wire_map("x", &wire))
        .steps([
            PeerStep::send("TICK:0;"),
            PeerStep::wait(Duration::from_millis(50)),
            PeerStep::send("TICK:1;"),
            PeerStep::wait(Duration::from_millis(50)),
            PeerStep::send("DRIVE:x:1;"),
            PeerStep::wait(Duration::from_millis(50)),
            PeerStep::send("END;"),
        ])
        .run()
        .unwrap();

    assert!(outcome.error.is_none(), "{:?}", outcome.error);
    assert_eq!(
        outcome.received,
        vec![
            Envelope::new(0, Outbound::Update { name: "x".into(), value: "x".into() }),
            Envelope::new(0, Outbound::TickComplete),
            Envelope::new(1000, Outbound::TickComplete),
            Envelope::new(1000, Outbound::Update { name: "x".into(), value: "1".into() }),
            Envelope::new(1000, Outbound::End),
        ]
    );
    assert_eq!(outcome.local_time, 1000);
    assert_eq!(wire.get(), "1");
}

#[test]
fn ticks_arrive_through_latency() {
    let outcome = Scenario::new()
        .config(fast_shutdown())
        .latency(Duration::from_millis(20))
        .seed(12345)
        .step(PeerStep::send("TICK:0;TICK:1;TICK:1;TICK:3;TICK:4;TICK:4;TICK:4;END;"))
        .run()
        .unwrap();

    assert!(outcome.error.is_none(), "{:?}", outcome.error);
    assert_eq!(outcome.tick_completions(), vec![0, 1000, 1001, 3000, 4000, 4001, 4002]);
    assert_eq!(outcome.end_count(), 1);
}

#[test]
fn chunked_stream_is_framed_the_same() {
    let script = "TICK:0;DRIVE:bus:0101;TICK:2\nTICK:2;;  \nEND;";

    let plain = Scenario::new()
        .config(fast_shutdown())
        .signals(wire_map("bus", &Wire::logic(4)))
        .step(PeerStep::send(script))
        .run()
        .unwrap();
    let chunked = Scenario::new()
        .config(fast_shutdown())
        .signals(wire_map("bus", &Wire::logic(4)))
        .step(PeerStep::send(script))
        .chunked(7)
        .run()
        .unwrap();

    assert!(plain.error.is_none(), "{:?}", plain.error);
    assert_eq!(plain.tick_completions(), vec![0, 2000, 2001]);
    assert_eq!(plain.tick_completions(), chunked.tick_completions());
    assert_eq!(plain.commands, chunked.commands);
    assert_eq!(plain.local_time, chunked.local_time);
}

#[test]
fn scheduler_sees_jump_and_step_deltas() {
    let scheduler = RecordingScheduler::new();
    let outcome = Scenario::new()
        .config(fast_shutdown())
        .scheduler(scheduler.clone())
        .step(PeerStep::send("TICK:0;TICK:0;TICK:2;TICK:2;END;"))
        .run()
        .unwrap();

    assert!(outcome.error.is_none());
    assert_eq!(scheduler.deltas(), vec![0, 1, 1999, 1]);
    assert_eq!(outcome.local_time, 2001);
}

#[test]
fn output_changes_during_advance_precede_tick_complete() {
    let clock = Wire::new("0");
    let outcome = Scenario::new()
        .config(fast_shutdown())
        .signals(wire_map("clk", &clock))
        .scheduler(ToggleScheduler::new(clock.clone()))
        .step(PeerStep::send("TICK:1;TICK:2;END;"))
        .run()
        .unwrap();

    assert!(outcome.error.is_none());
    assert_eq!(
        outcome.updates(),
        vec![
            (0, "clk".to_string(), "0".to_string()),
            (1000, "clk".to_string(), "1".to_string()),
            (2000, "clk".to_string(), "0".to_string()),
        ]
    );
    let bodies: Vec<_> = outcome.received.iter().map(Envelope::encode).collect();
    assert_eq!(
        bodies,
        vec![
            "@0:UPDATE:clk=0\n",
            "@1000:UPDATE:clk=1\n",
            "@1000:TICK_COMPLETE\n",
            "@2000:UPDATE:clk=0\n",
            "@2000:TICK_COMPLETE\n",
            "@2000:END\n",
        ]
    );
}

#[test]
fn stalled_simulator_hits_hang_timeout() {
    let outcome = Scenario::new()
        .config(fast_shutdown())
        .scheduler(StalledScheduler)
        .step(PeerStep::send("TICK:1;"))
        .run()
        .unwrap();

    assert!(matches!(
        outcome.error,
        Some(BridgeError::HangTimeout { after }) if after == Duration::from_secs(5)
    ));
    assert_eq!(outcome.tick_completions(), vec![0]);
    assert_eq!(outcome.end_count(), 1);
    assert_eq!(outcome.local_time, 0);
    assert!(outcome.elapsed >= Duration::from_secs(5));
}

#[test]
fn slow_simulator_within_budget_completes() {
    // 1000 units at 1ms each: one second per tick, under the 5s budget.
    let outcome = Scenario::new()
        .config(fast_shutdown())
        .scheduler(SleepScheduler::new(Duration::from_millis(1)))
        .step(PeerStep::send("TICK:1;TICK:2;END;"))
        .run()
        .unwrap();

    assert!(outcome.error.is_none(), "{:?}", outcome.error);
    assert_eq!(outcome.tick_completions(), vec![1000, 2000]);
    assert!(outcome.elapsed >= Duration::from_secs(2));
}

#[test]
fn silent_peer_hits_inactivity_timeout() {
    let outcome = Scenario::new()
        .config(BridgeConfig::launching())
        .step(PeerStep::send("TICK:0;"))
        .step(PeerStep::wait(Duration::from_secs(300)))
        .run()
        .unwrap();

    assert!(matches!(outcome.error, Some(BridgeError::InactivityTimeout { .. })));
    assert_eq!(outcome.tick_completions(), vec![0]);
    // Detected on the first liveness poll past the deadline.
    assert!(outcome.elapsed >= Duration::from_secs(120));
    assert!(outcome.elapsed < Duration::from_secs(130));
}

#[test]
fn quiet_peer_without_inactivity_deadline_is_fine() {
    let outcome = Scenario::new()
        .config(fast_shutdown())
        .step(PeerStep::send("TICK:0;"))
        .step(PeerStep::wait(Duration::from_secs(200)))
        .step(PeerStep::send("TICK:1;END;"))
        .run()
        .unwrap();

    assert!(outcome.error.is_none(), "{:?}", outcome.error);
    assert_eq!(outcome.tick_completions(), vec![0, 1000]);
}

#[test]
fn absent_peer_hits_connect_timeout() {
    let outcome = Scenario::new().config(BridgeConfig::launching()).without_peer().run().unwrap();

    assert!(matches!(
        outcome.error,
        Some(BridgeError::ConnectTimeout { after }) if after == Duration::from_secs(120)
    ));
    assert!(outcome.elapsed >= Duration::from_secs(120));
}

#[test]
fn hangup_without_end_is_a_communication_error() {
    let outcome = Scenario::new()
        .config(fast_shutdown())
        .step(PeerStep::send("TICK:0;"))
        .step(PeerStep::Hangup)
        .run()
        .unwrap();

    assert!(matches!(outcome.error, Some(BridgeError::Communication { .. })));
    // END still reaches the half-closed peer.
    assert_eq!(outcome.end_count(), 1);
}

#[test]
fn regression_answers_tick_then_ends() {
    let outcome = Scenario::new()
        .config(fast_shutdown())
        .step(PeerStep::send("TICK:3;TICK:1;TICK:9;"))
        .run()
        .unwrap();

    assert!(matches!(
        outcome.error,
        Some(BridgeError::Clock(ClockError::Regression { local: 3000, remote: 1, ratio: 1000 }))
    ));
    assert_eq!(outcome.tick_completions(), vec![3000, 3000]);
    assert_eq!(outcome.end_count(), 1);
    // TICK:9 was never dispatched.
    assert_eq!(outcome.commands, 2);
}

#[test]
fn malformed_drive_is_fatal() {
    let outcome = Scenario::new()
        .config(fast_shutdown())
        .signals(wire_map("bus", &Wire::logic(4)))
        .step(PeerStep::send("DRIVE:bus:01;"))
        .run()
        .unwrap();

    assert!(matches!(
        outcome.error,
        Some(BridgeError::DriveApplication { ref name, .. }) if name == "bus"
    ));
    assert_eq!(outcome.end_count(), 1);
}
