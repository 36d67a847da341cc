//! Property-based tests over simulated sessions.
//!
//! Random tick scripts go through the full stack: peer, simulated network,
//! framer, dispatcher, clock and back.

use std::time::Duration;

use cosim_core::BridgeConfig;
use cosim_harness::{PeerStep, Scenario, ScenarioOutcome};
use proptest::prelude::*;

fn run_ticks(remotes: &[u64], chunk_seed: Option<u64>) -> ScenarioOutcome {
    let mut script: String = remotes.iter().map(|r| format!("TICK:{r};")).collect();
    script.push_str("END;");

    let mut scenario = Scenario::new()
        .config(BridgeConfig { shutdown_grace: Duration::from_millis(10), ..BridgeConfig::default() })
        .latency(Duration::from_millis(5))
        .step(PeerStep::send(script));
    if let Some(seed) = chunk_seed {
        scenario = scenario.chunked(seed);
    }
    scenario.run().expect("simulation should complete")
}

/// Sorted remote times, so every script is non-decreasing.
fn tick_script() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0u64..20, 1..12).prop_map(|mut v| {
        v.sort_unstable();
        v
    })
}

#[test]
fn prop_tick_completions_are_monotonic() {
    proptest!(ProptestConfig::with_cases(32), |(remotes in tick_script())| {
        let outcome = run_ticks(&remotes, None);

        prop_assert!(outcome.error.is_none(), "{:?}", outcome.error);
        let times = outcome.tick_completions();
        prop_assert_eq!(times.len(), remotes.len());

        // PROPERTY: local time never decreases across answered ticks
        for pair in times.windows(2) {
            prop_assert!(pair[0] <= pair[1], "local time went backwards: {:?}", times);
        }

        // PROPERTY: each answer lands inside the requested coarse timestamp
        for (remote, time) in remotes.iter().zip(&times) {
            prop_assert!(*time >= remote * 1000 && *time < (remote + 1) * 1000);
        }
    });
}

#[test]
fn prop_chunked_delivery_is_deterministic() {
    proptest!(ProptestConfig::with_cases(16), |(
        remotes in tick_script(),
        seed in any::<u64>(),
    )| {
        let first = run_ticks(&remotes, Some(seed));
        let second = run_ticks(&remotes, Some(seed));
        let whole = run_ticks(&remotes, None);

        // PROPERTY: same seed, same session
        prop_assert_eq!(&first.received, &second.received);
        prop_assert_eq!(first.elapsed, second.elapsed);

        // PROPERTY: how bytes are split never changes what is answered
        prop_assert_eq!(first.tick_completions(), whole.tick_completions());
        prop_assert_eq!(first.local_time, whole.local_time);
    });
}
