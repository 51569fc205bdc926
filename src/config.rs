//! Configuration for the shared icon registry

use serde::{Deserialize, Serialize};

/// Environment override for [`SharedIconConfig::initial_capacity`]
pub const ENV_INITIAL_CAPACITY: &str = "MARKER_ICONS_INITIAL_CAPACITY";
/// Environment override for [`SharedIconConfig::shard_amount`]
pub const ENV_SHARD_AMOUNT: &str = "MARKER_ICONS_SHARD_AMOUNT";

/// Configuration for the shared icon registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedIconConfig {
    /// Number of distinct icon keys to reserve room for
    pub initial_capacity: usize,
    /// Number of lock shards in the key map (power of two, at least 2)
    pub shard_amount: usize,
}

impl Default for SharedIconConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 64,
            shard_amount: default_shard_amount(),
        }
    }
}

impl SharedIconConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with any `MARKER_ICONS_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(capacity) = read_env_usize(ENV_INITIAL_CAPACITY) {
            config = config.with_initial_capacity(capacity);
        }
        if let Some(shards) = read_env_usize(ENV_SHARD_AMOUNT) {
            config = config.with_shard_amount(shards);
        }
        config
    }

    /// Set the initial capacity
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Set the shard count, rounded up to a power of two
    pub fn with_shard_amount(mut self, shards: usize) -> Self {
        self.shard_amount = normalize_shard_amount(shards);
        self
    }
}

fn default_shard_amount() -> usize {
    normalize_shard_amount(num_cpus::get() * 4)
}

// dashmap asserts on shard counts that are not a power of two above one
fn normalize_shard_amount(shards: usize) -> usize {
    shards.max(2).checked_next_power_of_two().unwrap_or(2)
}

fn read_env_usize(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Ignoring {}={:?}: {}", name, raw, e);
            None
        }
    }
}
