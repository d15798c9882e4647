use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;
use tracing::{debug, info};

use crate::data::types::{ForecastRecord, Role, RoleValue};

/// The accepted forecast batch shown by the display layer.
///
/// Contents are swapped whole: readers hold an `Arc` to one batch and never
/// observe a half-written one. Every `replace` bumps a revision on a watch
/// channel so bound views know to reset.
pub struct ForecastCollection {
    records: RwLock<Arc<Vec<ForecastRecord>>>,
    resets: watch::Sender<u64>,
}

impl ForecastCollection {
    pub fn new() -> Self {
        let (resets, _) = watch::channel(0);
        Self {
            records: RwLock::new(Arc::new(Vec::new())),
            resets,
        }
    }

    /// Discard the current batch and store `records` in its place.
    pub fn replace(&self, records: Vec<ForecastRecord>) {
        let count = records.len();
        let batch = Arc::new(records);
        {
            let mut guard = self.records.write().unwrap_or_else(PoisonError::into_inner);
            *guard = batch;
        }
        self.resets.send_modify(|revision| *revision += 1);

        if let Some(current) = self.current() {
            info!(
                "Forecast replaced: {} records for '{}' (now {:.1}°C, {})",
                count, current.city_name, current.temperature, current.condition_description
            );
        } else {
            info!("Forecast replaced: {} records", count);
        }
    }

    /// The whole batch as one consistent view.
    pub fn snapshot(&self) -> Arc<Vec<ForecastRecord>> {
        Arc::clone(&self.records.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Record at `index`, or a zeroed record when out of range.
    pub fn at(&self, index: usize) -> ForecastRecord {
        match self.snapshot().get(index) {
            Some(record) => record.clone(),
            None => {
                debug!("Forecast index {} out of range", index);
                ForecastRecord::default()
            }
        }
    }

    pub fn field_by_role(&self, index: usize, role: Role) -> Option<RoleValue> {
        self.snapshot().get(index).map(|record| record.field(role))
    }

    /// The "now" sample of the current batch.
    pub fn current(&self) -> Option<ForecastRecord> {
        self.snapshot().iter().find(|r| r.is_current).cloned()
    }

    /// Revision counter, bumped once per `replace`.
    pub fn subscribe_resets(&self) -> watch::Receiver<u64> {
        self.resets.subscribe()
    }
}

impl Default for ForecastCollection {
    fn default() -> Self {
        Self::new()
    }
}
