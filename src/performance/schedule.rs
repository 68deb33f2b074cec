use crate::config::{HumanDuration, LoadOptions};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

/// Ramping-VU schedule: the target VU count moves linearly from the previous
/// stage's target to each stage's target over that stage's duration.
#[derive(Debug, Clone)]
pub struct Schedule {
    start_vus: u64,
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

impl Schedule {
    pub fn new(start_vus: u64, stages: Vec<Stage>) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for stage in &stages {
            acc = acc.saturating_add(stage.duration);
            cumulative_ends.push(acc);
        }

        Self {
            start_vus,
            stages,
            cumulative_ends,
        }
    }

    /// `vus` + `duration` is a single flat stage starting at `vus`.
    pub fn from_options(options: &LoadOptions) -> Self {
        if !options.stages.is_empty() {
            let stages = options
                .stages
                .iter()
                .map(|s| Stage {
                    duration: s.duration.get(),
                    target: s.target,
                })
                .collect();
            return Self::new(options.start_vus.unwrap_or(0), stages);
        }

        let vus = options.vus.unwrap_or(1);
        let duration = options
            .duration
            .map(HumanDuration::get)
            .unwrap_or(Duration::ZERO);
        Self::new(vus, vec![Stage { duration, target: vus }])
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    pub fn max_target(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .chain(std::iter::once(self.start_vus))
            .max()
            .unwrap_or(0)
    }

    fn stage_index(&self, elapsed: Duration) -> Option<usize> {
        if self.stages.is_empty() || elapsed >= self.total_duration() {
            return None;
        }
        // First stage whose end lies strictly after `elapsed`.
        Some(self.cumulative_ends.partition_point(|end| *end <= elapsed))
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let Some(idx) = self.stage_index(elapsed) else {
            return if self.stages.is_empty() {
                self.start_vus
            } else {
                self.stages.last().map(|s| s.target).unwrap_or(self.start_vus)
            };
        };

        let stage_start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };
        let stage = &self.stages[idx];
        let from = if idx == 0 {
            self.start_vus
        } else {
            self.stages[idx - 1].target
        };

        if stage.duration.is_zero() {
            return stage.target;
        }

        let from = from as i128;
        let delta = stage.target as i128 - from;
        let num = elapsed.saturating_sub(stage_start).as_nanos() as i128;
        let den = stage.duration.as_nanos().max(1) as i128;

        // A ramp-up starts each VU at the beginning of its slot, a ramp-down
        // keeps it until the end.
        let progress = delta * num;
        let step = if delta > 0 {
            (progress + den - 1).div_euclid(den)
        } else {
            progress.div_euclid(den)
        };

        (from + step).clamp(0, u64::MAX as i128) as u64
    }

    /// Human-readable description of the stage active at `elapsed`.
    pub fn phase_description(&self, elapsed: Duration) -> String {
        let Some(idx) = self.stage_index(elapsed) else {
            return "Finishing".to_string();
        };
        let from = if idx == 0 {
            self.start_vus
        } else {
            self.stages[idx - 1].target
        };
        let to = self.stages[idx].target;
        let kind = match to.cmp(&from) {
            std::cmp::Ordering::Greater => "Ramping up",
            std::cmp::Ordering::Less => "Ramping down",
            std::cmp::Ordering::Equal => "Holding",
        };
        format!(
            "{} {}→{} VUs (stage {}/{})",
            kind,
            from,
            to,
            idx + 1,
            self.stages.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageConfig;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn home_front() -> Schedule {
        Schedule::new(
            0,
            vec![
                Stage { duration: secs(1), target: 1 },
                Stage { duration: secs(120), target: 10 },
                Stage { duration: secs(60), target: 15 },
                Stage { duration: secs(120), target: 15 },
                Stage { duration: secs(60), target: 0 },
            ],
        )
    }

    #[test]
    fn test_total_duration_and_max() {
        let schedule = home_front();
        assert_eq!(schedule.total_duration(), secs(361));
        assert_eq!(schedule.max_target(), 15);
        assert!(!schedule.is_done(secs(360)));
        assert!(schedule.is_done(secs(361)));
    }

    #[test]
    fn test_linear_interpolation() {
        let schedule = home_front();
        assert_eq!(schedule.target_at(Duration::ZERO), 0);
        assert_eq!(schedule.target_at(secs(1)), 1);
        // Halfway through 1 -> 10 over 120s, 4.5 VUs rounds up.
        assert_eq!(schedule.target_at(secs(61)), 6);
        assert_eq!(schedule.target_at(secs(121)), 10);
        assert_eq!(schedule.target_at(secs(200)), 15);
        // Ramp down 15 -> 0 over the last 60s, 7.5 VUs rounds down.
        assert_eq!(schedule.target_at(secs(331)), 7);
        assert_eq!(schedule.target_at(secs(361)), 0);
        assert_eq!(schedule.target_at(secs(1000)), 0);
    }

    #[test]
    fn test_single_ramp_stage_starts_a_vu_immediately() {
        let schedule = Schedule::new(0, vec![Stage { duration: secs(10), target: 1 }]);
        assert_eq!(schedule.target_at(Duration::ZERO), 0);
        assert_eq!(schedule.target_at(Duration::from_millis(100)), 1);
        assert_eq!(schedule.target_at(Duration::from_millis(9_900)), 1);
    }

    #[test]
    fn test_short_ramp_reaches_its_peak() {
        // serap-proximo: 1s -> 4
        let schedule = Schedule::new(0, vec![Stage { duration: secs(1), target: 4 }]);
        assert_eq!(schedule.target_at(Duration::from_millis(100)), 1);
        assert_eq!(schedule.target_at(Duration::from_millis(800)), 4);
    }

    #[test]
    fn test_long_first_stage_starts_immediately() {
        // sgp-stress: 30s -> 1
        let schedule = Schedule::new(
            0,
            vec![
                Stage { duration: secs(30), target: 1 },
                Stage { duration: secs(1), target: 1 },
            ],
        );
        assert_eq!(schedule.target_at(Duration::from_millis(100)), 1);
    }

    #[test]
    fn test_constant_from_vus_and_duration() {
        let options = LoadOptions {
            vus: Some(3),
            duration: Some(HumanDuration(secs(10))),
            ..Default::default()
        };
        let schedule = Schedule::from_options(&options);
        assert_eq!(schedule.target_at(Duration::ZERO), 3);
        assert_eq!(schedule.target_at(secs(5)), 3);
        assert_eq!(schedule.total_duration(), secs(10));
    }

    #[test]
    fn test_from_options_uses_start_vus() {
        let options = LoadOptions {
            start_vus: Some(4),
            stages: vec![StageConfig {
                duration: HumanDuration(secs(10)),
                target: 8,
            }],
            ..Default::default()
        };
        let schedule = Schedule::from_options(&options);
        assert_eq!(schedule.target_at(Duration::ZERO), 4);
        assert_eq!(schedule.target_at(secs(5)), 6);
    }

    #[test]
    fn test_zero_length_stage_jumps() {
        let schedule = Schedule::new(
            0,
            vec![
                Stage { duration: Duration::ZERO, target: 5 },
                Stage { duration: secs(10), target: 5 },
            ],
        );
        assert_eq!(schedule.target_at(Duration::ZERO), 5);
    }

    #[test]
    fn test_phase_description() {
        let schedule = home_front();
        assert_eq!(
            schedule.phase_description(secs(30)),
            "Ramping up 1→10 VUs (stage 2/5)"
        );
        assert_eq!(
            schedule.phase_description(secs(200)),
            "Holding 15→15 VUs (stage 4/5)"
        );
        assert_eq!(
            schedule.phase_description(secs(340)),
            "Ramping down 15→0 VUs (stage 5/5)"
        );
        assert_eq!(schedule.phase_description(secs(400)), "Finishing");
    }
}
