//! Engine configuration.

/// Default upper bound on array cardinality
pub const DEFAULT_MAX_ARRAY_CARDINALITY: usize = 1024;

/// Settings that influence typing and evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Seed for `RANDOM()`; drawn from entropy when absent
    pub random_seed: Option<u64>,
    /// Pins the statement clock (microseconds since the epoch)
    pub fixed_timestamp_micros: Option<i64>,
    /// Offset applied by `LOCALTIMESTAMP`
    pub time_zone_offset_secs: i32,
    /// Largest array the type resolver and `ARRAY(subquery)` will build
    pub max_array_cardinality: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            random_seed: None,
            fixed_timestamp_micros: None,
            time_zone_offset_secs: 0,
            max_array_cardinality: DEFAULT_MAX_ARRAY_CARDINALITY,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn with_fixed_timestamp(mut self, micros: i64) -> Self {
        self.fixed_timestamp_micros = Some(micros);
        self
    }

    pub fn with_time_zone_offset(mut self, secs: i32) -> Self {
        self.time_zone_offset_secs = secs;
        self
    }

    pub fn with_max_array_cardinality(mut self, max: usize) -> Self {
        self.max_array_cardinality = max;
        self
    }
}
