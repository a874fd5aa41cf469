//! Shared ownership of the current dataset.
//!
//! Readers clone an [`Arc`] to the dataset and keep using it for as long as
//! they like; a refresh builds a complete new dataset and swaps the
//! reference in one step, so nobody observes a half-built table.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use corona_board_spatial::GeoRegistry;
use tokio::sync::broadcast;

use crate::CaseDataset;
use crate::queries::{DaySliceQuery, DayTable, day_slice};

const EVENT_CAPACITY: usize = 16;

/// Notification sent to subscribers after the dataset changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetEvent {
    /// A new dataset replaced the previous one.
    Replaced {
        /// Generation of the new dataset.
        generation: u64,
        /// Number of records in the new dataset.
        records: usize,
    },
}

/// A dataset together with the generation it was published under.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Starts at 0 and increases by one on every replacement.
    pub generation: u64,
    /// The dataset itself.
    pub dataset: Arc<CaseDataset>,
}

#[derive(Debug, Default)]
struct DayCache {
    generation: u64,
    tables: BTreeMap<DaySliceQuery, Arc<DayTable>>,
}

/// Owner of the current [`CaseDataset`].
#[derive(Debug)]
pub struct DatasetHandle {
    current: RwLock<Snapshot>,
    cache: Mutex<DayCache>,
    events: broadcast::Sender<DatasetEvent>,
}

impl DatasetHandle {
    /// Publishes `dataset` as generation 0.
    #[must_use]
    pub fn new(dataset: CaseDataset) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            current: RwLock::new(Snapshot {
                generation: 0,
                dataset: Arc::new(dataset),
            }),
            cache: Mutex::new(DayCache::default()),
            events,
        }
    }

    /// The dataset readers should use right now.
    #[must_use]
    pub fn current(&self) -> Snapshot {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swaps in a new dataset and returns its generation.
    ///
    /// Cached day tables are dropped and subscribers are notified.
    pub fn replace(&self, dataset: CaseDataset) -> u64 {
        let records = dataset.len();
        let generation = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            let generation = current.generation + 1;
            *current = Snapshot {
                generation,
                dataset: Arc::new(dataset),
            };

            // still holding the write lock, so no reader can pair the new
            // generation with the old cache
            let mut cache = self.lock_cache();
            cache.generation = generation;
            cache.tables.clear();
            generation
        };

        log::info!("Published case dataset generation {generation} ({records} records)");

        // no subscribers is fine
        self.events
            .send(DatasetEvent::Replaced {
                generation,
                records,
            })
            .ok();

        generation
    }

    /// Receives a [`DatasetEvent`] for every later replacement.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DatasetEvent> {
        self.events.subscribe()
    }

    /// [`day_slice`] over the current dataset, memoized per query until the
    /// next replacement.
    #[must_use]
    pub fn cached_day_slice(
        &self,
        registry: &GeoRegistry,
        query: DaySliceQuery,
    ) -> Option<Arc<DayTable>> {
        let snapshot = self.current();

        {
            let cache = self.lock_cache();
            if cache.generation == snapshot.generation
                && let Some(table) = cache.tables.get(&query)
            {
                return Some(Arc::clone(table));
            }
        }

        let table = Arc::new(day_slice(&snapshot.dataset, registry, query)?);

        let mut cache = self.lock_cache();
        if cache.generation == snapshot.generation {
            cache.tables.insert(query, Arc::clone(&table));
        } else {
            log::debug!(
                "Not caching day {} computed against generation {}",
                query.day,
                snapshot.generation
            );
        }

        Some(table)
    }

    /// Number of cached day tables.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.lock_cache().tables.len()
    }

    fn lock_cache(&self) -> MutexGuard<'_, DayCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
