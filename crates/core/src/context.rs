//! Processing context handed to stores and processor nodes
//!
//! A context describes the task a store or node belongs to: application
//! and task ids, the id of the owning worker thread, ambient default
//! codecs, the metrics handle, the clock, and the timestamp of the record
//! currently being processed.
//!
//! The owning worker id is supplied by the caller rather than read from the
//! current thread, so metric tags do not depend on which OS thread happens
//! to run the code.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::config::StreamsConfig;
use crate::error::Result;
use crate::metrics::{InMemoryMetricsRegistry, StreamsMetrics};
use crate::serdes::DefaultSerdes;
use crate::time::{Clock, SystemClock};
use crate::types::TaskId;

/// Default worker id used when none is given.
pub const DEFAULT_THREAD_ID: &str = "stream-thread-0";

struct ContextInner {
    application_id: String,
    task_id: TaskId,
    thread_id: String,
    default_serdes: DefaultSerdes,
    metrics: Arc<StreamsMetrics>,
    clock: Arc<dyn Clock>,
    record_timestamp: AtomicI64,
}

/// Context of one processing task.
///
/// Cloning is cheap; clones share the record timestamp.
#[derive(Clone)]
pub struct ProcessorContext {
    inner: Arc<ContextInner>,
}

impl ProcessorContext {
    /// Start building a context for `application_id`.
    pub fn builder(application_id: impl Into<String>) -> ProcessorContextBuilder {
        ProcessorContextBuilder::new(application_id)
    }

    /// Context configured from `config`, with an in-memory registry.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the config is invalid.
    pub fn from_config(
        config: &StreamsConfig,
        task_id: TaskId,
        thread_id: impl Into<String>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = InMemoryMetricsRegistry::with_sample_window(
            config.recording_level()?,
            i64::try_from(config.metrics_sample_window_ms).unwrap_or(i64::MAX),
        );
        Ok(Self::builder(config.application_id.clone())
            .task_id(task_id)
            .thread_id(thread_id)
            .default_serdes(DefaultSerdes::from_config(config))
            .metrics(Arc::new(StreamsMetrics::new(Arc::new(registry))))
            .build())
    }

    /// Application id.
    pub fn application_id(&self) -> &str {
        &self.inner.application_id
    }

    /// Task id.
    pub fn task_id(&self) -> TaskId {
        self.inner.task_id
    }

    /// Id of the worker thread owning the task.
    pub fn thread_id(&self) -> &str {
        &self.inner.thread_id
    }

    /// Ambient default codecs.
    pub fn default_serdes(&self) -> &DefaultSerdes {
        &self.inner.default_serdes
    }

    /// Metrics handle.
    pub fn metrics(&self) -> &Arc<StreamsMetrics> {
        &self.inner.metrics
    }

    /// Clock used for latency measurement.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// Timestamp of the record being processed.
    pub fn timestamp(&self) -> i64 {
        self.inner.record_timestamp.load(Ordering::Acquire)
    }

    /// Set the timestamp of the record being processed.
    pub fn set_record_timestamp(&self, timestamp: i64) {
        self.inner.record_timestamp.store(timestamp, Ordering::Release);
    }

    /// Current wall-clock time in milliseconds.
    pub fn current_system_time_ms(&self) -> i64 {
        self.inner.clock.milliseconds()
    }
}

impl fmt::Debug for ProcessorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorContext")
            .field("application_id", &self.inner.application_id)
            .field("task_id", &self.inner.task_id)
            .field("thread_id", &self.inner.thread_id)
            .field("timestamp", &self.timestamp())
            .finish()
    }
}

/// Builder for [`ProcessorContext`].
pub struct ProcessorContextBuilder {
    application_id: String,
    task_id: TaskId,
    thread_id: String,
    default_serdes: DefaultSerdes,
    metrics: Option<Arc<StreamsMetrics>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ProcessorContextBuilder {
    /// Builder with task `0_0`, no default codecs, an INFO-level registry and
    /// the system clock.
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            task_id: TaskId::new(0, 0),
            thread_id: DEFAULT_THREAD_ID.to_string(),
            default_serdes: DefaultSerdes::none(),
            metrics: None,
            clock: None,
        }
    }

    /// Set the task id.
    pub fn task_id(mut self, task_id: TaskId) -> Self {
        self.task_id = task_id;
        self
    }

    /// Set the owning worker id.
    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = thread_id.into();
        self
    }

    /// Set the ambient default codecs.
    pub fn default_serdes(mut self, default_serdes: DefaultSerdes) -> Self {
        self.default_serdes = default_serdes;
        self
    }

    /// Set the metrics handle.
    pub fn metrics(mut self, metrics: Arc<StreamsMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the context.
    pub fn build(self) -> ProcessorContext {
        let metrics = self.metrics.unwrap_or_else(|| {
            Arc::new(StreamsMetrics::new(Arc::new(InMemoryMetricsRegistry::new(
                crate::metrics::RecordingLevel::Info,
            ))))
        });
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn Clock>);
        ProcessorContext {
            inner: Arc::new(ContextInner {
                application_id: self.application_id,
                task_id: self.task_id,
                thread_id: self.thread_id,
                default_serdes: self.default_serdes,
                metrics,
                clock,
                record_timestamp: AtomicI64::new(0),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RecordingLevel;
    use crate::time::MockClock;

    #[test]
    fn test_builder_defaults() {
        let context = ProcessorContext::builder("app").build();
        assert_eq!(context.application_id(), "app");
        assert_eq!(context.task_id(), TaskId::new(0, 0));
        assert_eq!(context.thread_id(), DEFAULT_THREAD_ID);
        assert_eq!(
            context.metrics().registry().recording_level(),
            RecordingLevel::Info
        );
    }

    #[test]
    fn test_clones_share_record_timestamp() {
        let context = ProcessorContext::builder("app").build();
        let clone = context.clone();
        context.set_record_timestamp(42);
        assert_eq!(clone.timestamp(), 42);
    }

    #[test]
    fn test_system_time_comes_from_clock() {
        let context = ProcessorContext::builder("app")
            .clock(Arc::new(MockClock::new(1_234)))
            .build();
        assert_eq!(context.current_system_time_ms(), 1_234);
    }

    #[test]
    fn test_from_config() {
        let config = StreamsConfig::from_toml_str(
            "application_id = \"app\"\nmetrics_recording_level = \"DEBUG\"\ndefault_key_serde = \"string\"\n",
        )
        .unwrap();
        let context = ProcessorContext::from_config(&config, TaskId::new(1, 2), "t-1").unwrap();
        assert_eq!(context.task_id().to_string(), "1_2");
        assert_eq!(context.thread_id(), "t-1");
        assert_eq!(
            context.metrics().registry().recording_level(),
            RecordingLevel::Debug
        );
        assert!(context.default_serdes().key::<String>().unwrap().is_some());
    }
}
