use chrono::Utc;
use rand::{rngs::StdRng, SeedableRng};
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    models::{
        CloseReason, ClosedEpisode, MicroBreakContent, MicroBreakEpisode, TickResult,
        TriggerReason,
    },
    settings::InterventionSettings,
};

use super::content::select_content;
use super::state::{InterventionPhase, StreakState};

#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub bad: bool,
    pub streak: StreakState,
    /// Set only on the tick that opened a new episode.
    pub opened: Option<MicroBreakEpisode>,
}

/// Decides when sustained disengagement warrants a micro-break.
///
/// The active-episode slot is the re-entrancy lock: while it is occupied no
/// tick can open another episode, however long the bad streak grows. Only
/// `dismiss`, a tracking stop or the end of the session frees it.
pub struct InterventionEngine {
    rules: InterventionSettings,
    streak: StreakState,
    episode: Option<MicroBreakEpisode>,
    episodes_opened: u32,
    rng: StdRng,
}

impl InterventionEngine {
    pub fn new(rules: InterventionSettings) -> Self {
        Self::with_rng(rules, StdRng::from_entropy())
    }

    pub fn with_rng(rules: InterventionSettings, rng: StdRng) -> Self {
        Self {
            rules,
            streak: StreakState::new(),
            episode: None,
            episodes_opened: 0,
            rng,
        }
    }

    pub fn phase(&self) -> InterventionPhase {
        if self.episode.is_some() {
            InterventionPhase::Triggered
        } else if self.streak.is_accumulating() {
            InterventionPhase::Accumulating
        } else {
            InterventionPhase::Idle
        }
    }

    pub fn streak(&self) -> StreakState {
        self.streak
    }

    pub fn active_episode(&self) -> Option<&MicroBreakEpisode> {
        self.episode.as_ref()
    }

    pub fn episodes_opened(&self) -> u32 {
        self.episodes_opened
    }

    pub fn on_tick(
        &mut self,
        tick: &TickResult,
        library: &[MicroBreakContent],
        now: Instant,
    ) -> TickOutcome {
        let bad = self.streak.observe(tick, &self.rules);

        let opened = if self.streak.bad_streak_count >= self.rules.trigger_streak
            && self.episode.is_none()
        {
            let reason = if tick.emotion.is_negative() {
                TriggerReason::NegativeEmotion
            } else {
                TriggerReason::LowAttention
            };
            let episode = MicroBreakEpisode {
                id: Uuid::new_v4().to_string(),
                trigger_reason: reason,
                content: select_content(library, &mut self.rng),
                started_at: Utc::now(),
                is_active: true,
                opened_at: now,
            };
            self.episode = Some(episode.clone());
            self.episodes_opened += 1;
            Some(episode)
        } else {
            None
        };

        TickOutcome {
            bad,
            streak: self.streak,
            opened,
        }
    }

    /// The learner pressed "continue". The streak restarts from zero so the
    /// very next bad tick cannot re-open a break immediately.
    pub fn dismiss(&mut self, now: Instant) -> Option<ClosedEpisode> {
        let closed = self.close(CloseReason::Dismissed, now)?;
        self.streak.reset();
        Some(closed)
    }

    pub fn on_tracking_started(&mut self) {
        self.streak.reset();
    }

    /// Camera off: reset the streak and close any open episode so the lock
    /// is not orphaned.
    pub fn on_tracking_stopped(&mut self, now: Instant) -> Option<ClosedEpisode> {
        self.streak.reset();
        self.close(CloseReason::TrackingStopped, now)
    }

    pub fn end_session(&mut self, now: Instant) -> Option<ClosedEpisode> {
        self.streak.reset();
        self.close(CloseReason::SessionEnded, now)
    }

    fn close(&mut self, reason: CloseReason, now: Instant) -> Option<ClosedEpisode> {
        let mut episode = self.episode.take()?;
        episode.is_active = false;
        let duration_ms = episode.elapsed_at(now).as_millis() as u64;
        Some(ClosedEpisode {
            episode,
            duration_ms,
            close_reason: reason,
        })
    }
}
