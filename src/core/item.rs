use crate::error::BatchError;

/// Result of [`ItemReader::read`].
///
/// - `Ok(Some(item))` when an item was read
/// - `Ok(None)` when the input is exhausted
/// - `Err(BatchError)` when the current record could not be read
pub type ItemReaderResult<I> = Result<Option<I>, BatchError>;

/// Result of [`ItemProcessor::process`].
///
/// `Ok(None)` filters the item: it is counted but never handed to the writer.
pub type ItemProcessorResult<O> = Result<Option<O>, BatchError>;

/// Result of the [`ItemWriter`] operations.
pub type ItemWriterResult = Result<(), BatchError>;

/// Retrieval of input for a step, one item at a time.
///
/// Once `read` has returned `Ok(None)` every subsequent call must return
/// `Ok(None)` as well.
pub trait ItemReader<I> {
    fn read(&self) -> ItemReaderResult<I>;
}

/// Business logic applied to every item read.
///
/// Implementations must not perform I/O: the same input always yields the
/// same output.
pub trait ItemProcessor<I, O> {
    fn process(&self, item: &I) -> ItemProcessorResult<O>;
}

/// Output of a step, one chunk at a time.
///
/// A call to `write` receives the whole chunk and must apply it entirely or
/// not at all. The slice is only borrowed for the duration of the call.
pub trait ItemWriter<O> {
    fn write(&self, items: &[O]) -> ItemWriterResult;

    fn flush(&self) -> ItemWriterResult {
        Ok(())
    }

    fn open(&self) -> ItemWriterResult {
        Ok(())
    }

    fn close(&self) -> ItemWriterResult {
        Ok(())
    }
}

/// Processor handing every item over unchanged.
#[derive(Default)]
pub struct PassThroughProcessor;

impl<T: Clone> ItemProcessor<T, T> for PassThroughProcessor {
    fn process(&self, item: &T) -> ItemProcessorResult<T> {
        Ok(Some(item.clone()))
    }
}
