//! Fuzz target for the [`Session`] dispatcher and clock
//!
//! # Strategy
//!
//! - Messages: well-formed commands mixed with arbitrary text
//! - Ticks: arbitrary remote times, including regressions and huge values
//! - Advances: completed or failed (hang) at random
//!
//! # Invariants
//!
//! - Local time NEVER decreases
//! - A failed tick leaves the local time unchanged
//! - Every tick is answered with exactly one `TICK_COMPLETE`
//! - No tick stays in flight after it is answered
//! - Known commands survive a render/parse cycle
//! - NEVER panic on any message

#![no_main]

use std::{ops::Sub, time::Duration};

use arbitrary::Arbitrary;
use cosim_core::{BridgeConfig, ClockConfig, ClockUnit, Session, SessionAction, SignalMap, Wire};
use cosim_proto::{Command, Outbound};
use libfuzzer_sys::fuzz_target;

/// Time as Duration since epoch 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct FuzzInstant(Duration);

impl Sub for FuzzInstant {
    type Output = Duration;

    fn sub(self, other: Self) -> Duration {
        self.0.saturating_sub(other.0)
    }
}

#[derive(Debug, Arbitrary)]
enum Message {
    Tick(u64),
    SmallTick(u8),
    Drive { signal: u8, value: String },
    End,
    Raw(String),
}

#[derive(Debug, Arbitrary)]
struct Step {
    message: Message,
    advance_completes: bool,
    elapsed_ms: u16,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    ratio: u16,
    min_step: u8,
    steps: Vec<Step>,
}

fuzz_target!(|input: FuzzInput| {
    let config = BridgeConfig {
        clock: ClockConfig {
            ratio: u64::from(input.ratio.max(1)),
            unit: ClockUnit::Ps,
            min_step: u64::from(input.min_step.max(1)),
        },
        ..BridgeConfig::default()
    };

    let mut signals = SignalMap::new();
    signals.register_wire("a", &Wire::logic(1)).unwrap();
    signals.register_wire("b", &Wire::new("0")).unwrap();
    let names = ["a", "b", "nope"];

    let mut session: Session<FuzzInstant> = Session::new(&config, signals).unwrap();
    let mut now = Duration::ZERO;

    for step in input.steps {
        now += Duration::from_millis(u64::from(step.elapsed_ms));
        let command = match step.message {
            Message::Tick(remote) => Command::Tick(remote),
            Message::SmallTick(remote) => Command::Tick(u64::from(remote)),
            Message::Drive { signal, value } => Command::Drive {
                name: names[usize::from(signal) % names.len()].to_string(),
                value,
            },
            Message::End => Command::End,
            Message::Raw(raw) => Command::parse(&raw),
        };

        if !matches!(command, Command::Unknown(_)) {
            let rendered = command.to_string();
            if let Command::Drive { value, .. } = &command {
                // Values with separators or colons are not representable.
                if !value.is_empty() && !value.contains([':', ';', '\n']) && value.trim() == value {
                    assert_eq!(Command::parse(&rendered), command);
                }
            } else {
                assert_eq!(Command::parse(&rendered), command);
            }
        }

        let before = session.local_time();
        let is_tick = matches!(command, Command::Tick(_));
        let result = session.handle_command(command, FuzzInstant(now));

        match result {
            Ok(actions) => {
                for action in actions {
                    if let SessionAction::Advance(advance) = action {
                        let completed = step.advance_completes.then_some(&advance);
                        let answer = session.complete_tick(completed);
                        assert_eq!(answer, vec![SessionAction::Send(Outbound::TickComplete)]);
                        if !step.advance_completes {
                            assert_eq!(session.local_time(), before);
                        }
                    }
                }
            },
            Err(_) if is_tick => {
                assert!(session.tick_in_flight());
                let answer = session.complete_tick(None);
                assert_eq!(answer, vec![SessionAction::Send(Outbound::TickComplete)]);
                assert_eq!(session.local_time(), before);
            },
            Err(_) => {},
        }

        assert!(!session.tick_in_flight());
        assert!(session.local_time() >= before, "local time went backwards");
    }
});
