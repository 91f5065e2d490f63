//! The dataset store: per-identity shared futures with LRU eviction.
//!
//! Each cache entry holds the pending computation itself (a
//! [`Shared`] future), not just its result, so a second caller arriving
//! while the first is still fetching awaits the same work. Failed entries
//! are dropped once they resolve so the next caller retries.
//!
//! The population table has its own slot outside the identity map. It is
//! fetched at most once per store (unless the fetch fails) and never
//! evicted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use covid_map_series::{
    decode_cumulative, decode_populations, to_change, to_per_capita, to_trailing_average,
};
use covid_map_series_models::{
    Dataset, DatasetIdentity, PopulationTable, Representation, Resource, Scale, TrailingWindow,
};
use covid_map_source::DatasetSource;
use futures::FutureExt as _;
use futures::future::{BoxFuture, Shared};

use crate::{DatasetError, StoreConfig};

type DatasetResult = Result<Arc<Dataset>, DatasetError>;
type PopulationResult = Result<Arc<PopulationTable>, DatasetError>;
type SharedDataset = Shared<BoxFuture<'static, DatasetResult>>;
type SharedPopulation = Shared<BoxFuture<'static, PopulationResult>>;

struct Entry {
    /// Distinguishes this computation from a later one under the same key.
    id: u64,
    future: SharedDataset,
    last_access: u64,
}

impl Entry {
    fn is_complete(&self) -> bool {
        self.future.peek().is_some()
    }
}

#[derive(Default)]
struct State {
    datasets: HashMap<DatasetIdentity, Entry>,
    population: Option<(u64, SharedPopulation)>,
    next_id: u64,
    clock: u64,
}

impl State {
    const fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    const fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Evicts least-recently-used completed entries until at most
    /// `capacity` remain. In-flight entries are skipped, so the map may
    /// briefly exceed the limit while many computations are pending.
    fn evict(&mut self, capacity: usize) {
        while self.datasets.len() > capacity {
            let victim = self
                .datasets
                .iter()
                .filter(|(_, entry)| entry.is_complete())
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(identity, _)| *identity);

            let Some(identity) = victim else {
                break;
            };

            log::debug!("Evicting dataset {identity}");
            self.datasets.remove(&identity);
        }
    }
}

struct Inner {
    source: Arc<dyn DatasetSource>,
    config: StoreConfig,
    state: Mutex<State>,
}

/// Memoized, concurrency-safe resolver of derived datasets.
///
/// Cloning is cheap and every clone shares the same cache.
#[derive(Clone)]
pub struct DatasetStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DatasetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetStore")
            .field("config", &self.inner.config)
            .field("cached", &self.len())
            .finish_non_exhaustive()
    }
}

impl DatasetStore {
    /// Creates an empty store reading upstream documents from `source`.
    #[must_use]
    pub fn new(source: Arc<dyn DatasetSource>, config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                config,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Returns the dataset for `identity`, computing it (and whatever it
    /// derives from) on first request.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if fetching or decoding an upstream
    /// document fails. The failure is not cached.
    pub async fn get_dataset(&self, identity: DatasetIdentity) -> DatasetResult {
        self.resolve(identity).await
    }

    /// Returns the dataset addressed by a bit flag
    /// (quantity | representation | scale) and a trailing window size.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::InvalidParameter`] before any I/O if the
    /// flag is out of range or the window is zero, otherwise as
    /// [`Self::get_dataset`].
    pub async fn get_dataset_by_flag(&self, flag: u8, window: u32) -> DatasetResult {
        let identity = identity_from_flag(flag, window)?;
        self.resolve(identity).await
    }

    /// Returns the county population table, fetching it on first request.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if fetching or decoding fails. The failure
    /// is not cached.
    pub async fn get_population_table(&self) -> PopulationResult {
        self.population().await
    }

    /// Identities currently cached (complete or in flight), sorted.
    #[must_use]
    pub fn cached_identities(&self) -> Vec<DatasetIdentity> {
        let mut identities: Vec<_> = self.lock().datasets.keys().copied().collect();
        identities.sort();
        identities
    }

    /// Number of cached datasets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().datasets.len()
    }

    /// Whether no datasets are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().datasets.is_empty()
    }

    /// Whether the population table is cached (complete or in flight).
    #[must_use]
    pub fn has_population_table(&self) -> bool {
        self.lock().population.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up or creates the shared computation for `identity` and
    /// returns a future that awaits it, dropping the entry on failure.
    fn resolve(&self, identity: DatasetIdentity) -> BoxFuture<'static, DatasetResult> {
        let (id, future) = {
            let mut state = self.lock();
            let now = state.tick();

            if let Some(entry) = state.datasets.get_mut(&identity) {
                log::debug!("Dataset cache hit: {identity}");
                entry.last_access = now;
                (entry.id, entry.future.clone())
            } else {
                log::debug!("Dataset cache miss: {identity}");
                let id = state.next_id();
                let future = self.compute(identity).shared();
                state.datasets.insert(
                    identity,
                    Entry {
                        id,
                        future: future.clone(),
                        last_access: now,
                    },
                );
                state.evict(self.inner.config.max_datasets);
                (id, future)
            }
        };

        let store = self.clone();
        async move {
            let result = future.await;
            if let Err(e) = &result {
                store.forget_dataset(identity, id, e);
            }
            result
        }
        .boxed()
    }

    fn forget_dataset(&self, identity: DatasetIdentity, id: u64, error: &DatasetError) {
        let mut state = self.lock();
        if state.datasets.get(&identity).is_some_and(|e| e.id == id) {
            log::warn!("Dropping failed dataset {identity}: {error}");
            state.datasets.remove(&identity);
        }
    }

    /// Builds (without starting) the computation for `identity`.
    fn compute(&self, identity: DatasetIdentity) -> BoxFuture<'static, DatasetResult> {
        let store = self.clone();
        async move {
            if identity.scale == Scale::PerCapita {
                let (total, populations) = futures::future::try_join(
                    store.resolve(identity.with_scale(Scale::Total)),
                    store.population(),
                )
                .await?;
                return Ok(Arc::new(Dataset {
                    identity,
                    dates: Arc::clone(&total.dates),
                    series: to_per_capita(&total.series, &populations),
                }));
            }

            if identity.representation == Representation::Change {
                let cumulative = store
                    .resolve(identity.with_representation(Representation::Cumulative))
                    .await?;
                return Ok(Arc::new(Dataset {
                    identity,
                    dates: Arc::clone(&cumulative.dates),
                    series: to_change(&cumulative.series),
                }));
            }

            if !identity.window.is_base() {
                let raw = store
                    .resolve(identity.with_window(TrailingWindow::BASE))
                    .await?;
                let series = to_trailing_average(&raw.series, identity.window).into_owned();
                return Ok(Arc::new(Dataset {
                    identity,
                    dates: Arc::clone(&raw.dates),
                    series,
                }));
            }

            store.load_base(identity).await
        }
        .boxed()
    }

    /// Fetches and decodes the cumulative document for the identity's
    /// quantity.
    async fn load_base(&self, identity: DatasetIdentity) -> DatasetResult {
        let resource = Resource::for_quantity(identity.quantity);
        log::info!("Loading {resource} from source");

        let text = self.inner.source.fetch(resource).await?;
        let (dates, series) = decode_cumulative(&text)?;

        log::info!(
            "Loaded {resource}: {} counties x {} dates",
            series.len(),
            dates.len()
        );

        Ok(Arc::new(Dataset {
            identity,
            dates: Arc::new(dates),
            series,
        }))
    }

    fn population(&self) -> BoxFuture<'static, PopulationResult> {
        let (id, future) = {
            let mut state = self.lock();
            if let Some((id, future)) = &state.population {
                (*id, future.clone())
            } else {
                let id = state.next_id();
                let source = Arc::clone(&self.inner.source);
                let future = async move {
                    log::info!("Loading populations from source");
                    let text = source.fetch(Resource::Populations).await?;
                    let table = decode_populations(&text)?;
                    Ok(Arc::new(table))
                }
                .boxed()
                .shared();
                state.population = Some((id, future.clone()));
                (id, future)
            }
        };

        let store = self.clone();
        async move {
            let result = future.await;
            if let Err(e) = &result {
                let mut state = store.lock();
                if state.population.as_ref().is_some_and(|(p, _)| *p == id) {
                    log::warn!("Dropping failed population table: {e}");
                    state.population = None;
                }
            }
            result
        }
        .boxed()
    }
}

fn identity_from_flag(flag: u8, window: u32) -> Result<DatasetIdentity, DatasetError> {
    let window = TrailingWindow::new(window).map_err(|e| DatasetError::InvalidParameter {
        message: e.to_string(),
    })?;
    DatasetIdentity::from_flag(flag, window).map_err(|e| DatasetError::InvalidParameter {
        message: e.to_string(),
    })
}
