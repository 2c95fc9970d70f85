//! Dependency risk classifier
//!
//! Converts usage metrics into an integer score via threshold cut points,
//! then maps the cumulative score to a risk tier. Thresholds come from
//! configuration; the defaults are documented starting policy.

use crate::config::{DependencyConfig, RiskCutoffs};
use crate::safety::types::DependencyRisk;
use crate::session::DependencyMetrics;

/// Scored dependency assessment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyAssessment {
    pub score: u32,
    pub risk: DependencyRisk,
    /// A non-blocking step-back prompt is due this session
    pub step_back_due: bool,
}

/// Points contributed by one metric against its cut points
fn points(value: u64, cutoffs: &RiskCutoffs) -> u32 {
    if value >= cutoffs.high {
        3
    } else if value >= cutoffs.medium {
        2
    } else if value >= cutoffs.low {
        1
    } else {
        0
    }
}

/// Score usage metrics into a dependency risk tier.
pub fn classify_dependency(
    metrics: &DependencyMetrics,
    config: &DependencyConfig,
) -> DependencyAssessment {
    let score = points(metrics.daily_sessions as u64, &config.daily_usage)
        + points(metrics.weekly_sessions as u64, &config.weekly_usage)
        + points(metrics.avg_session_secs, &config.avg_session_secs)
        + points(metrics.consecutive_days as u64, &config.consecutive_days);

    let risk = if score >= config.score_high {
        DependencyRisk::High
    } else if score >= config.score_medium {
        DependencyRisk::Medium
    } else {
        DependencyRisk::Low
    };

    let step_back_due = config.step_back_frequency > 0
        && metrics.total_sessions > 0
        && metrics.total_sessions % config.step_back_frequency == 0;

    DependencyAssessment {
        score,
        risk,
        step_back_due,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(
        daily: u32,
        weekly: u32,
        avg_secs: u64,
        consecutive: u32,
    ) -> DependencyMetrics {
        DependencyMetrics {
            daily_sessions: daily,
            weekly_sessions: weekly,
            avg_session_secs: avg_secs,
            consecutive_days: consecutive,
            daily_time_secs: 0,
            total_sessions: 1,
        }
    }

    #[test]
    fn test_light_usage_is_low() {
        let assessment = classify_dependency(&metrics(0, 2, 10 * 60, 1), &DependencyConfig::default());
        assert_eq!(assessment.risk, DependencyRisk::Low);
    }

    #[test]
    fn test_heavy_usage_is_high() {
        let assessment =
            classify_dependency(&metrics(4, 20, 70 * 60, 10), &DependencyConfig::default());
        assert_eq!(assessment.score, 12);
        assert_eq!(assessment.risk, DependencyRisk::High);
    }

    #[test]
    fn test_moderate_usage_is_medium() {
        // 2 daily (2) + 5 weekly (1) + 20min avg (1) = 4
        let assessment =
            classify_dependency(&metrics(2, 5, 20 * 60, 0), &DependencyConfig::default());
        assert_eq!(assessment.score, 4);
        assert_eq!(assessment.risk, DependencyRisk::Medium);
    }

    #[test]
    fn test_risk_monotonic_in_each_metric() {
        let config = DependencyConfig::default();
        let base = metrics(1, 4, 10 * 60, 2);
        let base_risk = classify_dependency(&base, &config).risk;

        for bumped in [
            metrics(4, 4, 10 * 60, 2),
            metrics(1, 20, 10 * 60, 2),
            metrics(1, 4, 90 * 60, 2),
            metrics(1, 4, 10 * 60, 9),
        ] {
            assert!(classify_dependency(&bumped, &config).risk >= base_risk);
        }
    }

    #[test]
    fn test_step_back_cadence() {
        let config = DependencyConfig::default();
        let mut m = metrics(1, 1, 60, 1);

        m.total_sessions = 3;
        assert!(classify_dependency(&m, &config).step_back_due);
        m.total_sessions = 4;
        assert!(!classify_dependency(&m, &config).step_back_due);
        m.total_sessions = 6;
        assert!(classify_dependency(&m, &config).step_back_due);
    }
}
