//! Harbor configuration management
//!
//! Every numeric policy knob in the safety pipeline is configurable. The
//! dependency-risk cut points in particular are documented starting policy,
//! not clinically validated values, so deployments must be able to tune them
//! without a rebuild.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Main Harbor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarborConfig {
    /// Crypto primitive configuration
    #[serde(default)]
    pub crypto: CryptoConfig,

    /// Audit log configuration
    #[serde(default)]
    pub audit: AuditConfig,

    /// Threat scanner configuration
    #[serde(default)]
    pub threat: ThreatConfig,

    /// Dependency monitoring configuration
    #[serde(default)]
    pub dependency: DependencyConfig,

    /// Youth protection configuration
    #[serde(default)]
    pub youth: YouthConfig,

    /// Memory store configuration
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl HarborConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: HarborConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants
    pub fn validate(&self) -> Result<()> {
        if self.crypto.pbkdf2_iterations < CryptoConfig::MIN_ITERATIONS {
            return Err(Error::Config(format!(
                "pbkdf2_iterations must be at least {}",
                CryptoConfig::MIN_ITERATIONS
            )));
        }
        if self.threat.max_requests_authenticated < self.threat.max_requests_anonymous {
            return Err(Error::Config(
                "authenticated rate limit must not be below the anonymous limit".to_string(),
            ));
        }
        if self.dependency.score_medium >= self.dependency.score_high {
            return Err(Error::Config(
                "dependency score_medium must be below score_high".to_string(),
            ));
        }
        Ok(())
    }
}

/// Crypto primitive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// PBKDF2-HMAC-SHA512 iteration count for key derivation
    pub pbkdf2_iterations: u32,
}

impl CryptoConfig {
    /// Hard floor on KDF work factor
    pub const MIN_ITERATIONS: u32 = 100_000;
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: 210_000,
        }
    }
}

/// Audit log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Server-side secret mixed into audit integrity hashes.
    /// Supplied by the deployment; never derived from user material.
    pub server_secret: String,

    /// Retention window in days for audit events covering PHI-like access
    pub retention_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            server_secret: String::new(),
            retention_days: 2555, // 7 years
        }
    }
}

/// Threat scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatConfig {
    /// Sliding rate window in seconds
    pub rate_window_secs: u64,

    /// Maximum requests per window for anonymous callers
    pub max_requests_anonymous: u32,

    /// Maximum requests per window for authenticated callers
    pub max_requests_authenticated: u32,

    /// Entries kept per user in the suspicious-activity ledger
    pub activity_ledger_size: usize,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            rate_window_secs: 15 * 60,
            max_requests_anonymous: 100,
            max_requests_authenticated: 1000,
            activity_ledger_size: 100,
        }
    }
}

/// One set of ascending cut points mapping a metric to a 3/2/1 point score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCutoffs {
    /// Metric value scoring 1 point
    pub low: u64,
    /// Metric value scoring 2 points
    pub medium: u64,
    /// Metric value scoring 3 points
    pub high: u64,
}

/// Dependency monitoring configuration.
///
/// Defaults reproduce the documented starting policy; none of the numbers
/// below are validated against real usage data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyConfig {
    /// Sessions allowed per rolling day before session start is refused
    pub daily_session_limit: u32,

    /// Total session time allowed per rolling day, in seconds
    pub daily_time_limit_secs: u64,

    /// Consecutive active days before session start is refused
    pub consecutive_days_limit: u32,

    /// A non-required step-back prompt fires every N sessions
    pub step_back_frequency: u64,

    /// Cut points for sessions in the last day
    pub daily_usage: RiskCutoffs,

    /// Cut points for sessions in the last week
    pub weekly_usage: RiskCutoffs,

    /// Cut points for average session length, in seconds
    pub avg_session_secs: RiskCutoffs,

    /// Cut points for consecutive active days
    pub consecutive_days: RiskCutoffs,

    /// Cumulative score at or above which risk is high
    pub score_high: u32,

    /// Cumulative score at or above which risk is medium
    pub score_medium: u32,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            daily_session_limit: 3,
            daily_time_limit_secs: 2 * 60 * 60,
            consecutive_days_limit: 7,
            step_back_frequency: 3,
            daily_usage: RiskCutoffs {
                low: 1,
                medium: 2,
                high: 3,
            },
            weekly_usage: RiskCutoffs {
                low: 5,
                medium: 10,
                high: 15,
            },
            avg_session_secs: RiskCutoffs {
                low: 15 * 60,
                medium: 30 * 60,
                high: 60 * 60,
            },
            consecutive_days: RiskCutoffs {
                low: 3,
                medium: 5,
                high: 7,
            },
            score_high: 8,
            score_medium: 4,
        }
    }
}

/// Youth protection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouthConfig {
    /// Upper age bound (inclusive) for the child group
    pub child_max_age: u32,

    /// Upper age bound (inclusive) for the teen group
    pub teen_max_age: u32,

    /// Upper age bound (inclusive) for the young-adult group
    pub young_adult_max_age: u32,

    /// Session duration cap for children, in seconds
    pub child_session_cap_secs: u64,

    /// Session duration cap for teens, in seconds
    pub teen_session_cap_secs: u64,
}

impl Default for YouthConfig {
    fn default() -> Self {
        Self {
            child_max_age: 12,
            teen_max_age: 17,
            young_adult_max_age: 25,
            child_session_cap_secs: 20 * 60,
            teen_session_cap_secs: 30 * 60,
        }
    }
}

/// Memory store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Default row cap on retrieval queries
    pub default_retrieve_limit: usize,

    /// Importance at or above which consent is required
    /// (unless the source is a therapeutic standard)
    pub consent_importance_threshold: u8,

    /// Timeout for calls into the backing store, in milliseconds
    pub backend_timeout_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            default_retrieve_limit: 20,
            consent_importance_threshold: 8,
            backend_timeout_ms: 2000,
        }
    }
}
