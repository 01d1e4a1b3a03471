use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::{models::AlertReason, settings::AlertSettings};

/// One-shot alert flags for a session, plus the student-break watermark.
///
/// The policy methods are pure apart from flipping these flags; sending is
/// the dispatcher's job.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertFlags {
    pub multiple_episodes_raised: bool,
    pub long_episode_raised: bool,
    #[serde(skip)]
    pub last_student_break_alert_at: Option<Instant>,
}

impl AlertFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called after each episode opens with the session's running total.
    pub fn on_episode_opened(
        &mut self,
        episodes_opened: u32,
        rules: &AlertSettings,
    ) -> Option<AlertReason> {
        if self.multiple_episodes_raised || episodes_opened < rules.multiple_episodes_threshold {
            return None;
        }
        self.multiple_episodes_raised = true;
        Some(AlertReason::MultipleEpisodes)
    }

    /// Called by the periodic check while an episode is open.
    pub fn check_long_episode(
        &mut self,
        elapsed: Duration,
        rules: &AlertSettings,
    ) -> Option<AlertReason> {
        if self.long_episode_raised || elapsed <= rules.long_episode_after() {
            return None;
        }
        self.long_episode_raised = true;
        Some(AlertReason::LongEpisode)
    }

    /// The learner asked for a break from the overlay. Rate limited, not one-shot.
    pub fn on_student_break(&mut self, now: Instant, rules: &AlertSettings) -> Option<AlertReason> {
        if let Some(last) = self.last_student_break_alert_at {
            if now.saturating_duration_since(last) < rules.student_break_cooldown() {
                return None;
            }
        }
        self.last_student_break_alert_at = Some(now);
        Some(AlertReason::StudentBreak)
    }

    /// The long-episode timer only needs to run until that alert has fired.
    pub fn wants_long_episode_checks(&self) -> bool {
        !self.long_episode_raised
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiple_episodes_fires_once_at_threshold() {
        let rules = AlertSettings::default();
        let mut flags = AlertFlags::new();

        let raised: Vec<Option<AlertReason>> = (1..=6)
            .map(|total| flags.on_episode_opened(total, &rules))
            .collect();

        assert_eq!(
            raised,
            vec![
                None,
                None,
                Some(AlertReason::MultipleEpisodes),
                None,
                None,
                None
            ]
        );
    }

    #[test]
    fn long_episode_needs_more_than_sixty_seconds() {
        let rules = AlertSettings::default();
        let mut flags = AlertFlags::new();

        assert_eq!(flags.check_long_episode(Duration::from_secs(60), &rules), None);
        assert_eq!(
            flags.check_long_episode(Duration::from_secs(65), &rules),
            Some(AlertReason::LongEpisode)
        );
        assert_eq!(flags.check_long_episode(Duration::from_secs(600), &rules), None);
        assert!(!flags.wants_long_episode_checks());
    }

    #[test]
    fn student_break_is_rate_limited() {
        let rules = AlertSettings::default();
        let mut flags = AlertFlags::new();
        let t0 = Instant::now();

        assert_eq!(flags.on_student_break(t0, &rules), Some(AlertReason::StudentBreak));
        assert_eq!(flags.on_student_break(t0 + Duration::from_secs(30), &rules), None);
        assert_eq!(flags.on_student_break(t0 + Duration::from_secs(59), &rules), None);
        assert_eq!(
            flags.on_student_break(t0 + Duration::from_secs(60), &rules),
            Some(AlertReason::StudentBreak)
        );
        // Watermark moved: the next window starts at t0 + 60s.
        assert_eq!(flags.on_student_break(t0 + Duration::from_secs(100), &rules), None);
    }
}
