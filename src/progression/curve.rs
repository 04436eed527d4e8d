//! XP rewards and the level curve.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Difficulty;

/// Rejected progression configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("XP rewards must strictly increase with difficulty (easy {easy}, medium {medium}, hard {hard})")]
    NonIncreasingXp { easy: u32, medium: u32, hard: u32 },

    #[error("XP reward for easy tasks must be positive")]
    ZeroXp,

    #[error("level curve step must be positive")]
    ZeroLevelStep,

    #[error("unknown level curve '{0}', expected 'linear' or 'progressive'")]
    UnknownCurve(String),

    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

/// XP awarded per difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpTable {
    pub easy: u32,
    pub medium: u32,
    pub hard: u32,
}

impl XpTable {
    pub fn xp_for(&self, difficulty: Difficulty) -> u32 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.easy == 0 {
            return Err(ConfigError::ZeroXp);
        }
        if !(self.easy < self.medium && self.medium < self.hard) {
            return Err(ConfigError::NonIncreasingXp {
                easy: self.easy,
                medium: self.medium,
                hard: self.hard,
            });
        }
        Ok(())
    }
}

impl Default for XpTable {
    fn default() -> Self {
        Self {
            easy: 10,
            medium: 20,
            hard: 30,
        }
    }
}

/// Maps cumulative XP to a level. Everyone starts at level 1 with 0 XP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "curve", rename_all = "snake_case")]
pub enum LevelCurve {
    /// Every `xp_per_level` XP is one level.
    Linear { xp_per_level: u64 },
    /// Going from level `n` to `n + 1` costs `base + (n - 1) * increment` XP.
    Progressive { base: u64, increment: u64 },
}

impl LevelCurve {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Linear { xp_per_level: 0 } | Self::Progressive { base: 0, .. } => {
                Err(ConfigError::ZeroLevelStep)
            }
            _ => Ok(()),
        }
    }

    /// XP it costs to go from `level` to `level + 1`. Always positive for a
    /// validated curve.
    pub fn step_cost(&self, level: u32) -> u64 {
        match *self {
            Self::Linear { xp_per_level } => xp_per_level,
            Self::Progressive { base, increment } => {
                base.saturating_add(increment.saturating_mul(u64::from(level.saturating_sub(1))))
            }
        }
    }

    /// Cumulative XP at which `level` is reached.
    pub fn threshold(&self, level: u32) -> u64 {
        match *self {
            Self::Linear { xp_per_level } => {
                xp_per_level.saturating_mul(u64::from(level.saturating_sub(1)))
            }
            Self::Progressive { base, increment } => {
                let steps = u64::from(level.saturating_sub(1));
                // sum_{n=1}^{steps} (base + (n - 1) * increment)
                let triangular = steps.saturating_mul(steps.saturating_sub(1)) / 2;
                base.saturating_mul(steps)
                    .saturating_add(increment.saturating_mul(triangular))
            }
        }
    }

    /// Level reached with `total_xp` cumulative XP.
    pub fn level_for_xp(&self, total_xp: u64) -> u32 {
        match *self {
            Self::Linear { xp_per_level } => {
                let level = total_xp / xp_per_level.max(1) + 1;
                u32::try_from(level).unwrap_or(u32::MAX)
            }
            Self::Progressive { .. } => {
                // Highest level whose threshold is reached; thresholds never decrease
                let (mut low, mut high) = (1u32, u32::MAX);
                while low < high {
                    let mid = low + (high - low) / 2 + 1;
                    if self.threshold(mid) <= total_xp {
                        low = mid;
                    } else {
                        high = mid - 1;
                    }
                }
                low
            }
        }
    }

    /// XP still missing to reach the level after the one `total_xp` is at.
    pub fn xp_to_next_level(&self, total_xp: u64) -> u64 {
        let next = self.level_for_xp(total_xp).saturating_add(1);
        self.threshold(next).saturating_sub(total_xp)
    }
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self::Linear { xp_per_level: 100 }
    }
}

/// Immutable tuning handed to the progression engine at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionConfig {
    pub xp_table: XpTable,
    pub level_curve: LevelCurve,
}

impl ProgressionConfig {
    pub fn new(xp_table: XpTable, level_curve: LevelCurve) -> Result<Self, ConfigError> {
        xp_table.validate()?;
        level_curve.validate()?;
        Ok(Self {
            xp_table,
            level_curve,
        })
    }

    pub fn xp_for(&self, difficulty: Difficulty) -> u32 {
        self.xp_table.xp_for(difficulty)
    }

    pub fn calculate_level_from_xp(&self, total_xp: u64) -> u32 {
        self.level_curve.level_for_xp(total_xp)
    }

    pub fn calculate_xp_needed_for_next_level(&self, total_xp: u64) -> u64 {
        self.level_curve.xp_to_next_level(total_xp)
    }
}
