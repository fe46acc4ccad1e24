//! Scalar metrics sinks.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Receives named scalar values reported during training.
pub trait EventStorage: Send + Sync {
    fn put_scalar(&self, name: &str, value: f64, smoothing_hint: bool);
}

/// Forwards every scalar to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventStorage;

impl EventStorage for LogEventStorage {
    fn put_scalar(&self, name: &str, value: f64, smoothing_hint: bool) {
        log::info!("{name} = {value} (smoothing: {smoothing_hint})");
    }
}

/// In-memory scalar history, keyed by name.
#[derive(Debug, Default)]
pub struct ScalarHistory {
    scalars: Mutex<HashMap<String, Vec<f64>>>,
}

impl ScalarHistory {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a half-written entry.
    fn scalars(&self) -> MutexGuard<'_, HashMap<String, Vec<f64>>> {
        self.scalars.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn latest(&self, name: &str) -> Option<f64> {
        self.scalars()
            .get(name)
            .and_then(|values| values.last().copied())
    }

    pub fn history(&self, name: &str) -> Vec<f64> {
        self.scalars().get(name).cloned().unwrap_or_default()
    }
}

impl EventStorage for ScalarHistory {
    fn put_scalar(&self, name: &str, value: f64, _smoothing_hint: bool) {
        self.scalars()
            .entry(name.to_string())
            .or_default()
            .push(value);
    }
}
