//! Quorum stabilization and repeat-suppression for discrete gestures.
//!
//! Static shapes flicker frame to frame; a shape only becomes an event once
//! it wins a quorum of the recent history, and a repeated event inside the
//! cooldown interval is suppressed. Instant gestures (pointer, drag, scroll,
//! click) are already debounced by the classifier and pass straight through.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::classifier::{GestureLabel, GestureSample, Source};
use crate::config::StabilizerConfig;
use crate::landmarks::Handedness;

/// A sample that survived stabilization and cooldown.
pub type StableGestureEvent = GestureSample;

type CooldownKey = (GestureLabel, Handedness, Source);

/// Keyed min-interval gate. The stabilizer keys it on (gesture, hand,
/// source); the voice loop keys a separate one on the resolved command, so
/// a spoken phrase never delays a gesture.
#[derive(Debug)]
pub struct CooldownRegistry<K> {
    last_fire: HashMap<K, Instant>,
    min_interval: Duration,
}

impl<K: Eq + std::hash::Hash> CooldownRegistry<K> {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_fire: HashMap::new(),
            min_interval,
        }
    }

    /// Returns true when the key may fire; the fire time is recorded in the
    /// same call so back-to-back checks collapse.
    pub fn check_and_update(&mut self, key: K, now: Instant) -> bool {
        if let Some(&last) = self.last_fire.get(&key) {
            if now.duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_fire.insert(key, now);
        true
    }
}

#[derive(Debug)]
pub struct GestureStabilizer {
    cfg: StabilizerConfig,
    history: HashMap<(Handedness, Source), VecDeque<GestureLabel>>,
    cooldown: CooldownRegistry<CooldownKey>,
}

impl GestureStabilizer {
    pub fn new(cfg: StabilizerConfig) -> Self {
        let cooldown = CooldownRegistry::new(Duration::from_millis(cfg.cooldown_ms));
        Self {
            cfg,
            history: HashMap::new(),
            cooldown,
        }
    }

    /// Push one sample; returns it back as a stable event if it clears
    /// quorum and cooldown.
    pub fn accept(
        &mut self,
        sample: GestureSample,
        source: Source,
        now: Instant,
    ) -> Option<StableGestureEvent> {
        if sample.label.is_instant() {
            return Some(sample);
        }

        let window = self.cfg.window;
        let history = self
            .history
            .entry((sample.hand, source))
            .or_insert_with(|| VecDeque::with_capacity(window));
        if history.len() == window {
            history.pop_front();
        }
        history.push_back(sample.label);

        let votes = history.iter().filter(|&&l| l == sample.label).count();
        if votes < self.cfg.quorum {
            return None;
        }

        if !self
            .cooldown
            .check_and_update((sample.label, sample.hand, source), now)
        {
            return None;
        }
        Some(sample)
    }
}
