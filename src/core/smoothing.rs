//! Continuous smoothing of discrete telemetry updates
//! Each channel eases from the value it is currently showing towards its
//! latest target. Progress approaches 1 asymptotically: every tick covers
//! `1/n` of the remaining distance, so movement starts fast and decelerates.

use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroU32;

/// Once progress is within this distance of 1 it snaps to 1.
pub const SNAP_EPSILON: f64 = 0.01;

/// A value that can be blended between two states.
pub trait Interpolate: Clone {
    /// Returns `from + (to - from) * progress`, field by field.
    fn interpolate(from: &Self, to: &Self, progress: f64) -> Self;
}

/// Blends one numeric field. A NaN on either side keeps `from`.
pub fn lerp(from: f64, to: f64, progress: f64) -> f64 {
    if from.is_nan() || to.is_nan() {
        from
    } else {
        from + (to - from) * progress
    }
}

impl Interpolate for f64 {
    fn interpolate(from: &Self, to: &Self, progress: f64) -> Self {
        lerp(*from, *to, progress)
    }
}

impl<const N: usize> Interpolate for [f64; N] {
    fn interpolate(from: &Self, to: &Self, progress: f64) -> Self {
        std::array::from_fn(|i| lerp(from[i], to[i], progress))
    }
}

/// Advances a progress value by one tick of the asymptotic approach law.
pub fn advance_progress(progress: f64, responsiveness: NonZeroU32) -> f64 {
    if progress < 1.0 - SNAP_EPSILON {
        (progress + (1.0 - progress) / f64::from(responsiveness.get())).min(1.0)
    } else {
        1.0
    }
}

/// Transition state of a single smoothed channel
#[derive(Debug, Clone)]
pub struct Transition<V> {
    previous: V,
    current: V,
    progress: f64,
    responsiveness: NonZeroU32,
}

impl<V: Interpolate> Transition<V> {
    /// Creates a transition resting on `value`.
    pub fn at_rest(value: V, responsiveness: NonZeroU32) -> Self {
        Self {
            previous: value.clone(),
            current: value,
            progress: 1.0,
            responsiveness,
        }
    }

    /// Creates a transition that will animate from `from` towards `to`.
    pub fn between(from: V, to: V, responsiveness: NonZeroU32) -> Self {
        Self {
            previous: from,
            current: to,
            progress: 0.0,
            responsiveness,
        }
    }

    /// Starts easing towards `target` from whatever is displayed right now.
    pub fn retarget(&mut self, target: V) {
        self.previous = self.displayed();
        self.current = target;
        self.progress = 0.0;
    }

    pub fn tick(&mut self) {
        self.progress = advance_progress(self.progress, self.responsiveness);
    }

    /// The value to draw now. A settled transition shows its target exactly.
    pub fn displayed(&self) -> V {
        if self.is_settled() {
            self.current.clone()
        } else {
            V::interpolate(&self.previous, &self.current, self.progress)
        }
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn target(&self) -> &V {
        &self.current
    }

    pub fn is_settled(&self) -> bool {
        self.progress >= 1.0
    }

    pub fn responsiveness(&self) -> NonZeroU32 {
        self.responsiveness
    }

    pub fn set_responsiveness(&mut self, responsiveness: NonZeroU32) {
        self.responsiveness = responsiveness;
    }
}

/// Per-channel smoothing for one UI session
#[derive(Debug, Clone)]
pub struct SmoothingEngine<C, V> {
    default_responsiveness: NonZeroU32,
    overrides: HashMap<C, NonZeroU32>,
    channels: HashMap<C, Transition<V>>,
}

impl<C, V> SmoothingEngine<C, V>
where
    C: Eq + Hash + Clone,
    V: Interpolate,
{
    pub fn new(default_responsiveness: NonZeroU32) -> Self {
        Self {
            default_responsiveness,
            overrides: HashMap::new(),
            channels: HashMap::new(),
        }
    }

    /// Sets the number of ticks `channel` takes to characteristically converge.
    pub fn set_responsiveness(&mut self, channel: C, responsiveness: NonZeroU32) {
        if let Some(transition) = self.channels.get_mut(&channel) {
            transition.set_responsiveness(responsiveness);
        }
        self.overrides.insert(channel, responsiveness);
    }

    pub fn responsiveness(&self, channel: &C) -> NonZeroU32 {
        self.overrides
            .get(channel)
            .copied()
            .unwrap_or(self.default_responsiveness)
    }

    /// Registers `channel` resting on `value`, replacing any earlier state.
    pub fn insert(&mut self, channel: C, value: V) {
        let responsiveness = self.responsiveness(&channel);
        self.channels
            .insert(channel, Transition::at_rest(value, responsiveness));
    }

    /// Points `channel` at a new target. The first target seen for a channel
    /// places it at rest on that value.
    pub fn set_target(&mut self, channel: C, value: V) {
        match self.channels.get_mut(&channel) {
            Some(transition) => transition.retarget(value),
            None => self.insert(channel, value),
        }
    }

    /// Advances every channel by one frame.
    pub fn tick(&mut self) {
        for transition in self.channels.values_mut() {
            transition.tick();
        }
    }

    pub fn displayed(&self, channel: &C) -> Option<V> {
        self.channels.get(channel).map(Transition::displayed)
    }

    pub fn progress(&self, channel: &C) -> Option<f64> {
        self.channels.get(channel).map(Transition::progress)
    }

    pub fn is_settled(&self) -> bool {
        self.channels.values().all(Transition::is_settled)
    }

    pub fn transition(&self, channel: &C) -> Option<&Transition<V>> {
        self.channels.get(channel)
    }
}
