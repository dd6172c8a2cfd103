//! Processor trait

use strata_core::{ProcessorContext, Result};

use crate::record::Record;

/// Downstream stage of a processor node.
pub trait Processor<K, V>: Send {
    /// Called once before the first record.
    fn init(&mut self, _context: &ProcessorContext) -> Result<()> {
        Ok(())
    }

    /// Handle one record.
    fn process(&mut self, record: Record<K, V>) -> Result<()>;

    /// Called once after the last record.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Processor backed by a closure.
pub struct FnProcessor<F> {
    f: F,
}

/// Build a processor from a closure handling each record.
///
/// ```
/// use strata_processor::{processor_fn, Processor, Record};
///
/// let mut seen = 0;
/// let mut processor = processor_fn(|_record: Record<String, i64>| {
///     seen += 1;
///     Ok(())
/// });
/// processor.process(Record::new("k".to_string(), 1, 0)).unwrap();
/// drop(processor);
/// assert_eq!(seen, 1);
/// ```
pub fn processor_fn<K, V, F>(f: F) -> FnProcessor<F>
where
    F: FnMut(Record<K, V>) -> Result<()> + Send,
{
    FnProcessor { f }
}

impl<K, V, F> Processor<K, V> for FnProcessor<F>
where
    F: FnMut(Record<K, V>) -> Result<()> + Send,
{
    fn process(&mut self, record: Record<K, V>) -> Result<()> {
        (self.f)(record)
    }
}
