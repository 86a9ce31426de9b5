//! # Session Configuration
//!
//! Authored, per-level configuration loaded once per session.
//!
//! ## Usage
//! ```rust,ignore
//! use kenzan_common::config::TrimProfile;
//!
//! let profile = TrimProfile::load("levels/camellia.ron")?;
//! let report = profile.rules.validate();
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProfileError;
use crate::outcome::OutcomeMapping;
use crate::rules::RuleSet;

// ============================================================================
// Session Config
// ============================================================================

/// Timing and presentation policy for one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Grace window requested after a deliberate cut (seconds)
    pub grace_period_secs: f32,
    pub dramatic_failure: DramaticFailureConfig,
    /// Also disable collision response when freezing a failed arrangement
    pub disable_collisions_on_fail: bool,
    /// Default watchdog for released parts (real seconds)
    pub fall_timeout_secs: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 0.35,
            dramatic_failure: DramaticFailureConfig::default(),
            disable_collisions_on_fail: true,
            fall_timeout_secs: 4.0,
        }
    }
}

impl SessionConfig {
    pub fn grace_period(&self) -> Duration {
        secs(self.grace_period_secs)
    }

    pub fn fall_timeout(&self) -> Duration {
        secs(self.fall_timeout_secs)
    }
}

/// Slow motion, then pause, then result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DramaticFailureConfig {
    pub enabled: bool,
    /// Time scale requested during the slow-motion stage
    pub slow_motion_scale: f32,
    /// Real (unscaled) seconds spent in slow motion
    pub slow_motion_real_secs: f32,
    /// Real seconds held paused before the result is applied
    pub pause_hold_real_secs: f32,
}

impl Default for DramaticFailureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            slow_motion_scale: 0.2,
            slow_motion_real_secs: 1.2,
            pause_hold_real_secs: 0.0,
        }
    }
}

impl DramaticFailureConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn slow_motion_duration(&self) -> Duration {
        secs(self.slow_motion_real_secs)
    }

    pub fn pause_hold(&self) -> Duration {
        secs(self.pause_hold_real_secs)
    }
}

/// Authored seconds to a `Duration`, rounded to whole microseconds so a
/// value like `0.4` is exactly 400ms rather than its f32 approximation.
fn secs(value: f32) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_micros((f64::from(value) * 1e6).round() as u64)
    } else {
        Duration::ZERO
    }
}

// ============================================================================
// Trim Profile
// ============================================================================

/// Everything authored for one level: rules, outcome mapping, timing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimProfile {
    pub name: String,
    pub rules: RuleSet,
    pub outcome: OutcomeMapping,
    pub session: SessionConfig,
}

impl TrimProfile {
    /// Parse from RON text and validate curves and tolerances.
    pub fn from_ron_str(text: &str) -> Result<Self, ProfileError> {
        let profile: TrimProfile = ron::from_str(text)?;
        profile.check()?;
        Ok(profile)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ProfileError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let profile = Self::from_ron_str(&text)?;
        tracing::info!(profile = %profile.name, path = %path.display(), "Loaded trim profile");
        Ok(profile)
    }

    pub fn to_ron_string(&self) -> Result<String, ProfileError> {
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(6)
            .indentor("    ".to_string());
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ProfileError> {
        let path = path.as_ref();
        let text = self.to_ron_string()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ProfileError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, text).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn check(&self) -> Result<(), ProfileError> {
        self.rules.check()?;
        self.outcome
            .validate()
            .map_err(|(mapping, source)| ProfileError::Curve { mapping, source })
    }
}
