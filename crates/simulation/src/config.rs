//! Scheduler configuration.
//!
//! Plain scalars with serde support. [`SchedulerConfig::from_env`] overlays
//! environment variables on the defaults for the soak runner and tests.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound on worker threads.
pub const MAX_THREADS: usize = 64;

/// How the collision world is locked for read-only queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockingPolicy {
    /// Every access takes the exclusive lock.
    ExclusiveLocksOnly,
    /// Queries share the lock; only mutation is exclusive.
    #[default]
    AllowSharedLocks,
}

/// Configuration for [`TaskScheduler`](crate::TaskScheduler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker thread count. Zero runs every tick on the calling thread.
    pub threads: usize,

    /// Ticks a line-of-sight result may go unqueried before it is dropped.
    pub los_cache_expiry: u32,

    /// Queue AABB refreshes until the next pre-step instead of doing them
    /// immediately.
    pub defer_aabb_update: bool,

    pub locking_policy: LockingPolicy,

    /// Fixed physics rate (steps/second).
    pub physics_fps: f32,

    /// Cap on steps simulated in one frame.
    pub max_steps_per_frame: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            los_cache_expiry: 5,
            defer_aabb_update: true,
            locking_policy: LockingPolicy::AllowSharedLocks,
            physics_fps: 60.0,
            max_steps_per_frame: 20,
        }
    }
}

impl SchedulerConfig {
    /// Configuration with every field at its default except the thread count.
    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads,
            ..Self::default()
        }
    }

    /// Defaults overlaid with `STRIDER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(threads) = parse(&lookup, "STRIDER_PHYSICS_THREADS")? {
            config.threads = threads;
        }
        if let Some(fps) = parse::<f32>(&lookup, "STRIDER_PHYSICS_FPS")? {
            if fps != config.physics_fps {
                log::warn!("Using custom physics framerate {fps}");
            }
            config.physics_fps = fps;
        }
        if let Some(expiry) = parse(&lookup, "STRIDER_LOS_CACHE_EXPIRY")? {
            config.los_cache_expiry = expiry;
        }
        if let Some(defer) = parse_flag(&lookup, "STRIDER_DEFER_AABB_UPDATE")? {
            config.defer_aabb_update = defer;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.physics_fps <= 0.0 || !self.physics_fps.is_finite() {
            return Err(ConfigError::NonPositiveRate(self.physics_fps));
        }
        if self.threads > MAX_THREADS {
            return Err(ConfigError::TooManyThreads {
                requested: self.threads,
                max: MAX_THREADS,
            });
        }
        if self.max_steps_per_frame == 0 {
            return Err(ConfigError::NoSteps);
        }
        Ok(())
    }

    /// Length of one physics step in seconds.
    #[inline]
    pub fn physics_dt(&self) -> f32 {
        1.0 / self.physics_fps
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::Unparsable { name, value })
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<bool>, ConfigError> {
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::Unparsable { name, value }),
    }
}
