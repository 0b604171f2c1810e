//! Per-statement evaluation state.

use crate::access::{RangeContext, RangeIterators, Value, MICROS_PER_DAY};
use crate::config::EngineConfig;
use crate::expression::coercion::{StandardTypeRegistry, TypeRegistry};
use crate::expression::{ExpressionError, ExpressionResult};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Services the evaluator calls back into for routines and sequences.
pub trait SessionServices: Send + Sync {
    fn invoke_routine(&self, name: &str, args: &[Value]) -> ExpressionResult<Value>;
    fn next_sequence_value(&self, name: &str) -> ExpressionResult<Value>;
}

/// State an expression is evaluated against: the current row of every range
/// position, the statement clock and the session random source.
pub struct Session {
    config: EngineConfig,
    registry: Arc<dyn TypeRegistry>,
    range_iterators: RangeIterators,
    statement_timestamp: i64,
    rng: Mutex<StdRng>,
    services: Option<Arc<dyn SessionServices>>,
}

impl Session {
    pub fn new(config: EngineConfig) -> Self {
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let statement_timestamp = config.fixed_timestamp_micros.unwrap_or_else(system_micros);
        Session {
            config,
            registry: Arc::new(StandardTypeRegistry::new()),
            range_iterators: RangeIterators::new(),
            statement_timestamp,
            rng: Mutex::new(rng),
            services: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn TypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_services(mut self, services: Arc<dyn SessionServices>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &dyn TypeRegistry {
        self.registry.as_ref()
    }

    pub fn services(&self) -> Option<&dyn SessionServices> {
        self.services.as_deref()
    }

    pub fn range_iterators(&self) -> &RangeIterators {
        &self.range_iterators
    }

    pub fn range_iterators_mut(&mut self) -> &mut RangeIterators {
        &mut self.range_iterators
    }

    /// Position `row` under `range_position`
    pub fn set_current_row(&mut self, range_position: usize, row: Vec<Value>) {
        self.range_iterators.set_current(range_position, row);
    }

    /// Start a new statement: clears positioned rows and re-reads the clock
    pub fn begin_statement(&mut self) {
        self.range_iterators.clear_all();
        self.statement_timestamp = self
            .config
            .fixed_timestamp_micros
            .unwrap_or_else(system_micros);
    }

    /// CURRENT_TIMESTAMP, constant for the whole statement
    pub fn current_timestamp(&self) -> i64 {
        self.statement_timestamp
    }

    /// LOCALTIMESTAMP: the statement clock shifted by the session time zone
    pub fn local_timestamp(&self) -> ExpressionResult<i64> {
        let offset = self.config.time_zone_offset_secs as i64 * 1_000_000;
        self.statement_timestamp
            .checked_add(offset)
            .ok_or_else(|| ExpressionError::overflow("LOCALTIMESTAMP"))
    }

    /// CURRENT_DATE in days since the epoch
    pub fn current_date(&self) -> ExpressionResult<i32> {
        let days = self.local_timestamp()?.div_euclid(MICROS_PER_DAY);
        i32::try_from(days).map_err(|_| ExpressionError::overflow("CURRENT_DATE"))
    }

    /// Next value in [0, 1) from the session random source
    pub fn next_random(&self) -> f64 {
        self.rng.lock().gen::<f64>()
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new(EngineConfig::default())
    }
}

impl RangeContext for Session {
    fn current_row(&self, range_position: usize) -> Option<&[Value]> {
        self.range_iterators.current_row(range_position)
    }
}

fn system_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}
