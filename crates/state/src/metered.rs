//! Metering wrapper shared by the typed stores
//!
//! [`MeteringWrapper`] owns the raw store and the store's sensors. Typed
//! stores compose it and route every data operation through
//! [`MeteringWrapper::measure`] or [`MeteringWrapper::measure_mut`], which
//! check that the store is initialized and record exactly one latency
//! observation per call, failed calls included.
//!
//! # Lifecycle
//!
//! - `init`: sensors are created first, then the raw store's `init` runs,
//!   timed on the `restore` sensor
//! - `close`: the raw store is closed and the sensors are removed; both
//!   are always attempted and the raw store's error is reported first

use std::sync::Arc;

use strata_core::metrics::{maybe_measure_latency, Sensor, StreamsMetrics};
use strata_core::traits::{CachedStateStore, RawFlushListener, StateStore};
use strata_core::{Clock, ProcessorContext, Result, StreamsError};
use tracing::{debug, warn};

use crate::metrics::{StoreScope, StoreSensors, FLUSH, RESTORE};

struct Initialized {
    context: ProcessorContext,
    metrics: Arc<StreamsMetrics>,
    scope: StoreScope,
    sensors: StoreSensors,
}

fn initialized<'a>(state: &'a Option<Initialized>, store: &str) -> Result<&'a Initialized> {
    state.as_ref().ok_or_else(|| StreamsError::not_initialized(store))
}

fn sensor_for<'a>(
    state: &'a Option<Initialized>,
    store: &str,
    operation: &str,
) -> Result<(&'a Initialized, &'a Arc<Sensor>)> {
    let state = initialized(state, store)?;
    let sensor = state.sensors.get(operation).ok_or_else(|| {
        StreamsError::InvalidOperation(format!(
            "store {} has no sensor for operation {}",
            store, operation
        ))
    })?;
    Ok((state, sensor))
}

/// Raw store plus its sensors.
pub struct MeteringWrapper<S: ?Sized> {
    metrics_scope: String,
    wrapped: Box<S>,
    state: Option<Initialized>,
}

impl<S: StateStore + ?Sized> MeteringWrapper<S> {
    /// Wrap `wrapped`; `metrics_scope` names the store type in metric tags.
    pub fn new(wrapped: Box<S>, metrics_scope: impl Into<String>) -> Self {
        Self {
            metrics_scope: metrics_scope.into(),
            wrapped,
            state: None,
        }
    }

    /// Store name.
    pub fn name(&self) -> &str {
        self.wrapped.name()
    }

    /// The raw store.
    pub fn wrapped(&self) -> &S {
        &self.wrapped
    }

    /// The raw store, mutably.
    pub fn wrapped_mut(&mut self) -> &mut S {
        &mut self.wrapped
    }

    /// True between `init` and `close`.
    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Context bound at `init`.
    pub fn context(&self) -> Result<&ProcessorContext> {
        self.initialized().map(|state| &state.context)
    }

    fn initialized(&self) -> Result<&Initialized> {
        initialized(&self.state, self.wrapped.name())
    }

    /// Create sensors for `operations` (plus `flush` and `restore`), then
    /// initialize the raw store under the `restore` sensor.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if already initialized, or the raw
    /// store's init error, in which case the sensors are removed again.
    pub fn init(&mut self, context: &ProcessorContext, operations: &[&'static str]) -> Result<()> {
        if self.state.is_some() {
            return Err(StreamsError::InvalidOperation(format!(
                "store {} is already initialized",
                self.name()
            )));
        }
        let scope = StoreScope {
            thread_id: context.thread_id().to_string(),
            task_id: context.task_id().to_string(),
            store_name: self.name().to_string(),
            metrics_scope: self.metrics_scope.clone(),
        };
        let mut all_operations = operations.to_vec();
        all_operations.extend_from_slice(&[FLUSH, RESTORE]);
        let metrics = Arc::clone(context.metrics());
        let sensors = StoreSensors::register(&metrics, &scope, &all_operations);

        let restore = sensors.get(RESTORE).cloned();
        let result = match restore {
            Some(sensor) => maybe_measure_latency(
                || self.wrapped.init(context),
                context.clock().as_ref(),
                &sensor,
            ),
            None => self.wrapped.init(context),
        };
        if let Err(e) = result {
            warn!(target: "strata::state", store = %scope.store_name, error = %e, "Store init failed");
            if let Err(cleanup) =
                metrics.remove_all_store_level_sensors(&scope.thread_id, &scope.task_id, &scope.store_name)
            {
                warn!(target: "strata::state", store = %scope.store_name, error = %cleanup, "Failed to remove store sensors");
            }
            return Err(e);
        }

        debug!(
            target: "strata::state",
            store = %scope.store_name,
            task_id = %scope.task_id,
            thread_id = %scope.thread_id,
            "Initialized metered store"
        );
        self.state = Some(Initialized {
            context: context.clone(),
            metrics,
            scope,
            sensors,
        });
        Ok(())
    }

    /// Sensor and clock for an iterator that records when closed.
    pub fn iterator_metering(&self, operation: &str) -> Result<(Arc<Sensor>, Arc<dyn Clock>)> {
        let (state, sensor) = sensor_for(&self.state, self.name(), operation)?;
        Ok((Arc::clone(sensor), Arc::clone(state.context.clock())))
    }

    /// Run a read operation on the raw store, timed on `operation`.
    pub fn measure<T>(&self, operation: &str, action: impl FnOnce(&S) -> Result<T>) -> Result<T> {
        let (state, sensor) = sensor_for(&self.state, self.name(), operation)?;
        let wrapped = &*self.wrapped;
        maybe_measure_latency(|| action(wrapped), state.context.clock().as_ref(), sensor)
    }

    /// Run a write operation on the raw store, timed on `operation`.
    pub fn measure_mut<T>(
        &mut self,
        operation: &str,
        action: impl FnOnce(&mut S) -> Result<T>,
    ) -> Result<T> {
        let (state, sensor) = sensor_for(&self.state, self.wrapped.name(), operation)?;
        let wrapped = &mut *self.wrapped;
        maybe_measure_latency(|| action(wrapped), state.context.clock().as_ref(), sensor)
    }

    /// Flush the raw store, timed on `flush`.
    pub fn flush(&mut self) -> Result<()> {
        self.measure_mut(FLUSH, |store| store.flush())
    }

    /// Close the raw store and remove the store's sensors.
    ///
    /// Both steps run even if one fails. If both fail, the raw store's
    /// error is returned.
    pub fn close(&mut self) -> Result<()> {
        let closed = self.wrapped.close();
        let cleaned = match self.state.take() {
            Some(state) => state.metrics.remove_all_store_level_sensors(
                &state.scope.thread_id,
                &state.scope.task_id,
                &state.scope.store_name,
            ),
            None => Ok(()),
        };
        if let Err(e) = &closed {
            warn!(target: "strata::state", store = %self.name(), error = %e, "Failed to close store");
        }
        if let Err(e) = &cleaned {
            warn!(target: "strata::state", store = %self.name(), error = %e, "Failed to remove store sensors");
        }
        debug!(target: "strata::state", store = %self.name(), "Closed metered store");
        closed.and(cleaned)
    }

    /// True if the raw store is open.
    pub fn is_open(&self) -> bool {
        self.wrapped.is_open()
    }

    /// True if the raw store is persistent.
    pub fn persistent(&self) -> bool {
        self.wrapped.persistent()
    }

    /// Caching capability of the raw store.
    pub fn caching(&mut self) -> Option<&mut dyn CachedStateStore> {
        self.wrapped.caching()
    }

    /// Register a raw flush listener on the raw store's cache.
    ///
    /// Returns false without registering if the raw store does not cache.
    pub fn set_raw_flush_listener(&mut self, listener: RawFlushListener, send_old_values: bool) -> bool {
        let registered = match self.wrapped.caching() {
            Some(cache) => cache.set_flush_listener(listener, send_old_values),
            None => false,
        };
        debug!(
            target: "strata::state",
            store = %self.name(),
            registered,
            send_old_values,
            "Flush listener registration"
        );
        registered
    }
}
