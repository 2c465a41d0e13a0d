//! Property tests for the smoothing approach law.

use std::num::NonZeroU32;

use amg_telemetry_bridge_lib::core::smoothing::{SmoothingEngine, Transition};
use amg_telemetry_bridge_lib::dashboard::DialProfile;
use amg_telemetry_bridge_lib::core::DrivingMode;
use proptest::prelude::*;

fn responsiveness() -> impl Strategy<Value = NonZeroU32> {
    (1u32..=60).prop_map(|n| NonZeroU32::new(n).unwrap())
}

fn value() -> impl Strategy<Value = f64> {
    -1.0e4..1.0e4f64
}

fn mode() -> impl Strategy<Value = DrivingMode> {
    prop::sample::select(DrivingMode::ALL.to_vec())
}

/// Enough ticks for `n` to reach the snap threshold and snap.
fn tick_budget(n: NonZeroU32) -> usize {
    5 * n.get() as usize + 2
}

proptest! {
    /// Any transition settles exactly on its target within O(n) ticks.
    #[test]
    fn converges_within_linear_ticks(from in value(), to in value(), n in responsiveness()) {
        let mut transition = Transition::between(from, to, n);
        for _ in 0..tick_budget(n) {
            transition.tick();
        }
        prop_assert!(transition.is_settled());
        prop_assert_eq!(transition.displayed(), to);
    }

    /// Progress never decreases and the displayed value never leaves the
    /// segment between source and target.
    #[test]
    fn never_overshoots(from in value(), to in value(), n in responsiveness()) {
        let (low, high) = if from <= to { (from, to) } else { (to, from) };
        let slack = 1e-9 * (1.0 + low.abs().max(high.abs()));
        let mut transition = Transition::between(from, to, n);
        let mut last_progress = transition.progress();

        for _ in 0..tick_budget(n) {
            transition.tick();
            let shown = transition.displayed();
            prop_assert!(transition.progress() >= last_progress);
            prop_assert!(transition.progress() <= 1.0);
            prop_assert!(shown >= low - slack && shown <= high + slack, "{} outside [{}, {}]", shown, low, high);
            last_progress = transition.progress();
        }
    }

    /// Retargeting mid-flight never makes the displayed value jump.
    #[test]
    fn retarget_is_continuous(
        targets in prop::collection::vec(value(), 1..8),
        ticks in prop::collection::vec(0usize..10, 8),
        n in responsiveness(),
    ) {
        let mut engine = SmoothingEngine::new(n);
        engine.set_target(0u8, 0.0);
        for (target, ticks) in targets.iter().zip(&ticks) {
            for _ in 0..*ticks {
                engine.tick();
            }
            let before = engine.displayed(&0);
            engine.set_target(0u8, *target);
            prop_assert_eq!(engine.displayed(&0), before);
            prop_assert_eq!(engine.progress(&0), Some(0.0));
        }
    }

    /// The dial morphs between any two mode profiles without leaving their bounds.
    #[test]
    fn dial_profiles_morph_and_settle(from in mode(), to in mode(), n in responsiveness()) {
        let start = DialProfile::for_mode(from);
        let end = DialProfile::for_mode(to);
        let mut transition = Transition::between(start, end, n);

        for _ in 0..tick_budget(n) {
            transition.tick();
            let shown = transition.displayed();
            let (low, high) = (start.start_angle.min(end.start_angle), start.start_angle.max(end.start_angle));
            prop_assert!(shown.start_angle >= low - 1e-9 && shown.start_angle <= high + 1e-9);
        }
        prop_assert_eq!(transition.displayed(), end);
    }
}
