use serde::{Deserialize, Serialize};

use crate::{models::TickResult, settings::InterventionSettings};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum InterventionPhase {
    Idle,
    Accumulating,
    Triggered,
}

impl Default for InterventionPhase {
    fn default() -> Self {
        InterventionPhase::Idle
    }
}

/// Per-session streak counters. Lives in memory only.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreakState {
    pub bad_streak_count: u32,
    pub low_attention_flag: bool,
}

impl StreakState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one tick into the streak and return whether it was bad.
    pub fn observe(&mut self, tick: &TickResult, rules: &InterventionSettings) -> bool {
        let bad = is_bad_tick(tick, rules);
        if bad {
            self.bad_streak_count = self.bad_streak_count.saturating_add(1);
        } else {
            self.bad_streak_count = 0;
        }
        self.low_attention_flag = self.bad_streak_count >= rules.low_attention_streak;
        bad
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_accumulating(&self) -> bool {
        self.bad_streak_count > 0
    }
}

/// Low attention or a negative emotion.
pub fn is_bad_tick(tick: &TickResult, rules: &InterventionSettings) -> bool {
    tick.attention_score <= rules.bad_attention_threshold || tick.emotion.is_negative()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Emotion;
    use chrono::Utc;

    fn tick(emotion: Emotion, attention_score: f64) -> TickResult {
        TickResult {
            emotion,
            confidence: 1.0,
            attention_score,
            face_count: 1,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn classification_boundaries() {
        let rules = InterventionSettings::default();

        assert!(is_bad_tick(&tick(Emotion::Happy, 0.5), &rules));
        assert!(!is_bad_tick(&tick(Emotion::Happy, 0.51), &rules));
        assert!(is_bad_tick(&tick(Emotion::Fear, 0.9), &rules));
        assert!(!is_bad_tick(&tick(Emotion::Other("bored".into()), 0.7), &rules));
    }

    #[test]
    fn streak_equals_trailing_bad_run() {
        let rules = InterventionSettings::default();
        let good = tick(Emotion::Happy, 0.8);
        let bad = tick(Emotion::Sad, 0.36);
        let pattern = [&bad, &bad, &good, &bad, &bad, &bad, &good, &bad];

        let mut state = StreakState::new();
        let mut run = 0u32;
        for t in pattern {
            let was_bad = state.observe(t, &rules);
            run = if was_bad { run + 1 } else { 0 };
            assert_eq!(state.bad_streak_count, run);
            assert_eq!(state.low_attention_flag, run >= 2);
        }
    }

    #[test]
    fn reset_clears_everything() {
        let rules = InterventionSettings::default();
        let mut state = StreakState::new();
        for _ in 0..4 {
            state.observe(&tick(Emotion::Angry, 0.4), &rules);
        }
        assert!(state.low_attention_flag);

        state.reset();

        assert_eq!(state, StreakState::default());
        assert!(!state.is_accumulating());
    }
}
