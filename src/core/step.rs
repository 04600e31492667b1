use std::{
    cell::Cell,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{BatchError, ErrorKind};

use super::{
    build_name,
    chunk::Chunk,
    item::{ItemProcessor, ItemReader, ItemWriter},
    tasklet::{Tasklet, TaskletStepBuilder},
    transaction::{CommitScope, RESOURCELESS, TransactionManager},
};

/// Status of a step or job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchStatus {
    /// Created but not started yet.
    Starting,
    /// Running.
    Started,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }
}

/// What a chunk-oriented step does with a record that fails to parse or to
/// transform.
///
/// Write and resource errors always abort the step, whatever the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkipPolicy {
    /// Abort on the first record-local error.
    #[default]
    FailFast,
    /// Skip up to `n` record-local errors; the next one aborts the step.
    Limit(usize),
}

impl SkipPolicy {
    fn should_skip(&self, error: &BatchError, skipped: usize) -> bool {
        if !error.is_record_local() {
            return false;
        }
        match self {
            SkipPolicy::FailFast => false,
            SkipPolicy::Limit(limit) => skipped < *limit,
        }
    }
}

/// The error that ended a failed step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub kind: ErrorKind,
    /// 1-based number of the chunk being written, for write failures.
    pub chunk: Option<usize>,
    pub message: String,
}

/// Counters and status of one run of a step.
///
/// Only the running step mutates it; once the status is terminal the values
/// are final.
#[derive(Debug)]
pub struct StepExecution {
    pub id: Uuid,
    pub name: String,
    pub status: BatchStatus,
    pub start_time: Instant,
    pub end_time: Instant,
    pub duration: Duration,
    /// Input lines consumed, including lines that failed to parse
    pub read_count: usize,
    /// Items committed to the output
    pub write_count: usize,
    pub read_skip_count: usize,
    pub process_skip_count: usize,
    /// Items the processor chose not to pass on
    pub filter_count: usize,
    pub commit_count: usize,
    pub rollback_count: usize,
    /// Items accepted into a chunk that was never committed
    pub discarded_count: usize,
    pub failure: Option<StepFailure>,
}

impl StepExecution {
    pub fn new(name: &str) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: BatchStatus::Starting,
            start_time: now,
            end_time: now,
            duration: Duration::default(),
            read_count: 0,
            write_count: 0,
            read_skip_count: 0,
            process_skip_count: 0,
            filter_count: 0,
            commit_count: 0,
            rollback_count: 0,
            discarded_count: 0,
            failure: None,
        }
    }

    /// Records skipped on error plus records filtered by the processor.
    pub fn skip_count(&self) -> usize {
        self.read_skip_count + self.process_skip_count + self.filter_count
    }

    pub(crate) fn record_failure(&mut self, error: &BatchError, chunk: Option<usize>) {
        match chunk {
            Some(chunk) => error!("Step {} failed on chunk {}: {}", self.name, chunk, error),
            None => error!("Step {} failed: {}", self.name, error),
        }
        self.failure = Some(StepFailure {
            kind: error.kind(),
            chunk,
            message: error.to_string(),
        });
    }

    pub(crate) fn finish(&mut self, start_time: Instant) {
        self.status = if self.failure.is_none() {
            BatchStatus::Completed
        } else {
            BatchStatus::Failed
        };
        self.start_time = start_time;
        self.end_time = Instant::now();
        self.duration = start_time.elapsed();
    }
}

/// An independent, sequential phase of a job.
pub trait Step {
    fn get_name(&self) -> &str;

    /// Runs the step to a terminal status, recording counters and failure
    /// into `step_execution`.
    ///
    /// # Returns
    /// - `Ok(())`: the step completed
    /// - `Err(BatchError::Step)`: the step failed, see `step_execution.failure`
    /// - `Err(BatchError::StepAlreadyComplete)`: the step already completed
    ///   and does not allow a new start; nothing was executed
    fn execute(&self, step_execution: &mut StepExecution) -> Result<(), BatchError>;

    /// Checks, without running anything, that the step may start now.
    ///
    /// A job calls it on every step before running the first one.
    fn can_start(&self) -> Result<(), BatchError> {
        Ok(())
    }
}

/// Remembers the last terminal status of a step within the process and
/// refuses to start a completed step again unless explicitly allowed.
pub(crate) struct RestartGuard {
    allow_start_if_complete: bool,
    last_status: Cell<Option<BatchStatus>>,
}

impl RestartGuard {
    pub(crate) fn new(allow_start_if_complete: bool) -> Self {
        Self {
            allow_start_if_complete,
            last_status: Cell::new(None),
        }
    }

    pub(crate) fn allows_start(&self, name: &str) -> Result<(), BatchError> {
        match self.last_status.get() {
            Some(BatchStatus::Completed) if !self.allow_start_if_complete => {
                Err(BatchError::StepAlreadyComplete(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn check(&self, name: &str) -> Result<(), BatchError> {
        match self.last_status.get() {
            Some(BatchStatus::Completed) if !self.allow_start_if_complete => {
                warn!("Step {} already completed and cannot be started again", name);
                Err(BatchError::StepAlreadyComplete(name.to_string()))
            }
            Some(BatchStatus::Completed) => {
                info!("Step {} already completed, starting a new run", name);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn record(&self, status: BatchStatus) {
        self.last_status.set(Some(status));
    }

    pub(crate) fn last_status(&self) -> Option<BatchStatus> {
        self.last_status.get()
    }
}

enum ChunkState<I> {
    Reading,
    Transforming(I),
    Accumulating,
    Flushing,
    Completed,
    Failed,
}

/// Step reading items one at a time, transforming them, and writing them in
/// chunks of `chunk_size`, each chunk in its own commit scope.
pub struct ChunkOrientedStep<'a, I, O> {
    name: String,
    reader: &'a dyn ItemReader<I>,
    processor: &'a dyn ItemProcessor<I, O>,
    writer: &'a dyn ItemWriter<O>,
    transaction_manager: &'a dyn TransactionManager,
    chunk_size: usize,
    skip_policy: SkipPolicy,
    restart: RestartGuard,
}

impl<I, O> Step for ChunkOrientedStep<'_, I, O> {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn can_start(&self) -> Result<(), BatchError> {
        self.restart.allows_start(&self.name)
    }

    fn execute(&self, step_execution: &mut StepExecution) -> Result<(), BatchError> {
        self.restart.check(&self.name)?;

        let start_time = Instant::now();
        step_execution.status = BatchStatus::Started;

        info!(
            "Start of step: {}, id: {}",
            step_execution.name, step_execution.id
        );

        match self.writer.open() {
            Ok(()) => {
                self.process_chunks(step_execution);
                self.close_writer(step_execution);
            }
            Err(error) => {
                let error = BatchError::Resource(format!("unable to open writer: {}", error));
                step_execution.record_failure(&error, None);
            }
        }

        step_execution.finish(start_time);
        self.restart.record(step_execution.status);

        info!(
            "End of step: {}, id: {}, status: {:?}, read: {}, written: {}, skipped: {}, commits: {}",
            step_execution.name,
            step_execution.id,
            step_execution.status,
            step_execution.read_count,
            step_execution.write_count,
            step_execution.skip_count(),
            step_execution.commit_count
        );

        if step_execution.status == BatchStatus::Completed {
            Ok(())
        } else {
            Err(BatchError::Step(self.name.clone()))
        }
    }
}

impl<I, O> ChunkOrientedStep<'_, I, O> {
    /// Last terminal status reached by this step in the current process.
    pub fn last_status(&self) -> Option<BatchStatus> {
        self.restart.last_status()
    }

    fn process_chunks(&self, step_execution: &mut StepExecution) {
        let mut chunk: Chunk<O> = Chunk::new(self.chunk_size);
        let mut exhausted = false;
        let mut state = ChunkState::Reading;

        loop {
            state = match state {
                ChunkState::Reading => match self.reader.read() {
                    Ok(Some(item)) => {
                        step_execution.read_count += 1;
                        ChunkState::Transforming(item)
                    }
                    Ok(None) => {
                        debug!("Reader exhausted after {} items", step_execution.read_count);
                        exhausted = true;
                        if chunk.is_empty() {
                            ChunkState::Completed
                        } else {
                            ChunkState::Flushing
                        }
                    }
                    Err(error) => {
                        if error.is_record_local() {
                            step_execution.read_count += 1;
                        }
                        if self.should_skip(step_execution, &error) {
                            warn!("Skipping unreadable record: {}", error);
                            step_execution.read_skip_count += 1;
                            ChunkState::Reading
                        } else {
                            Self::abort(step_execution, &mut chunk, &error, None)
                        }
                    }
                },
                ChunkState::Transforming(item) => match self.processor.process(&item) {
                    Ok(Some(processed)) => {
                        chunk.add_item(processed);
                        ChunkState::Accumulating
                    }
                    Ok(None) => {
                        debug!("Item filtered by processor");
                        step_execution.filter_count += 1;
                        ChunkState::Reading
                    }
                    Err(error) => {
                        if self.should_skip(step_execution, &error) {
                            warn!("Skipping record that failed processing: {}", error);
                            step_execution.process_skip_count += 1;
                            ChunkState::Reading
                        } else {
                            Self::abort(step_execution, &mut chunk, &error, None)
                        }
                    }
                },
                ChunkState::Accumulating => {
                    if chunk.is_full() {
                        ChunkState::Flushing
                    } else {
                        ChunkState::Reading
                    }
                }
                ChunkState::Flushing => {
                    let chunk_number = step_execution.commit_count + 1;
                    match self.write_chunk(step_execution, &chunk) {
                        Ok(()) => {
                            chunk.clear();
                            if exhausted {
                                ChunkState::Completed
                            } else {
                                ChunkState::Reading
                            }
                        }
                        Err(error) => {
                            Self::abort(step_execution, &mut chunk, &error, Some(chunk_number))
                        }
                    }
                }
                ChunkState::Completed | ChunkState::Failed => break,
            };
        }
    }

    /// Writes the chunk inside its own commit scope.
    ///
    /// Counters are only updated once the commit succeeded. Any error rolls the
    /// scope back, so none of the chunk's items are visible afterwards.
    fn write_chunk(
        &self,
        step_execution: &mut StepExecution,
        chunk: &Chunk<O>,
    ) -> Result<(), BatchError> {
        let items = chunk.get_items();
        debug!(
            "Writing chunk {} of {} items",
            step_execution.commit_count + 1,
            items.len()
        );

        let scope = CommitScope::begin(self.transaction_manager)?;

        let written = self.writer.write(items).and_then(|()| self.writer.flush());

        let result = match written {
            Ok(()) => scope.commit(),
            Err(error) => {
                if let Err(rollback_error) = scope.rollback() {
                    warn!("Rollback failed: {}", rollback_error);
                }
                Err(error)
            }
        };

        match result {
            Ok(()) => {
                step_execution.commit_count += 1;
                step_execution.write_count += items.len();
                debug!("Chunk {} committed", step_execution.commit_count);
                Ok(())
            }
            Err(error) => {
                step_execution.rollback_count += 1;
                warn!(
                    "Chunk {} rolled back: {}",
                    step_execution.commit_count + 1,
                    error
                );
                Err(error)
            }
        }
    }

    fn should_skip(&self, step_execution: &StepExecution, error: &BatchError) -> bool {
        let skipped = step_execution.read_skip_count + step_execution.process_skip_count;
        self.skip_policy.should_skip(error, skipped)
    }

    fn abort(
        step_execution: &mut StepExecution,
        chunk: &mut Chunk<O>,
        error: &BatchError,
        chunk_number: Option<usize>,
    ) -> ChunkState<I> {
        step_execution.discarded_count += chunk.len();
        chunk.clear();
        step_execution.record_failure(error, chunk_number);
        ChunkState::Failed
    }

    fn close_writer(&self, step_execution: &mut StepExecution) {
        if let Err(error) = self.writer.close() {
            if step_execution.failure.is_none() {
                let error = BatchError::Resource(format!("unable to close writer: {}", error));
                step_execution.record_failure(&error, None);
            } else {
                warn!("Error closing writer after failure: {}", error);
            }
        }
    }
}

/// Entry point for building steps.
///
/// ```
/// use flatfile_batch_rs::core::item::{
///     ItemReader, ItemReaderResult, ItemWriter, ItemWriterResult, PassThroughProcessor,
/// };
/// use flatfile_batch_rs::core::step::{Step, StepBuilder, StepExecution};
/// use std::cell::{Cell, RefCell};
///
/// struct Numbers(RefCell<Vec<u32>>);
///
/// impl ItemReader<u32> for Numbers {
///     fn read(&self) -> ItemReaderResult<u32> {
///         Ok(self.0.borrow_mut().pop())
///     }
/// }
///
/// #[derive(Default)]
/// struct Sum(Cell<u32>);
///
/// impl ItemWriter<u32> for Sum {
///     fn write(&self, items: &[u32]) -> ItemWriterResult {
///         self.0.set(self.0.get() + items.iter().sum::<u32>());
///         Ok(())
///     }
/// }
///
/// let reader = Numbers(RefCell::new(vec![1, 2, 3]));
/// let processor = PassThroughProcessor;
/// let writer = Sum::default();
///
/// let step = StepBuilder::new("numbers")
///     .chunk::<u32, u32>(2)
///     .reader(&reader)
///     .processor(&processor)
///     .writer(&writer)
///     .build()
///     .unwrap();
///
/// let mut execution = StepExecution::new(step.get_name());
/// step.execute(&mut execution).unwrap();
/// assert_eq!(execution.write_count, 3);
/// assert_eq!(execution.commit_count, 2);
/// assert_eq!(writer.0.get(), 6);
/// ```
pub struct StepBuilder {
    name: String,
}

impl StepBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// Builder for a step with a random name.
    pub fn unnamed() -> Self {
        Self { name: build_name() }
    }

    pub fn chunk<'a, I, O>(self, chunk_size: u16) -> ChunkOrientedStepBuilder<'a, I, O> {
        ChunkOrientedStepBuilder::new(&self.name).chunk_size(chunk_size)
    }

    pub fn tasklet<'a>(self, tasklet: &'a dyn Tasklet) -> TaskletStepBuilder<'a> {
        TaskletStepBuilder::new(&self.name).tasklet(tasklet)
    }
}

pub struct ChunkOrientedStepBuilder<'a, I, O> {
    name: String,
    reader: Option<&'a dyn ItemReader<I>>,
    processor: Option<&'a dyn ItemProcessor<I, O>>,
    writer: Option<&'a dyn ItemWriter<O>>,
    /// Defaults to a resourceless manager
    transaction_manager: Option<&'a dyn TransactionManager>,
    chunk_size: u16,
    skip_policy: SkipPolicy,
    allow_start_if_complete: bool,
}

impl<'a, I, O> ChunkOrientedStepBuilder<'a, I, O> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reader: None,
            processor: None,
            writer: None,
            transaction_manager: None,
            chunk_size: 10,
            skip_policy: SkipPolicy::FailFast,
            allow_start_if_complete: false,
        }
    }

    pub fn reader(mut self, reader: &'a dyn ItemReader<I>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn processor(mut self, processor: &'a dyn ItemProcessor<I, O>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn writer(mut self, writer: &'a dyn ItemWriter<O>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Transactional resource committed or rolled back around every chunk.
    /// Usually the writer itself.
    pub fn transaction_manager(mut self, transaction_manager: &'a dyn TransactionManager) -> Self {
        self.transaction_manager = Some(transaction_manager);
        self
    }

    pub fn chunk_size(mut self, chunk_size: u16) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn skip_policy(mut self, skip_policy: SkipPolicy) -> Self {
        self.skip_policy = skip_policy;
        self
    }

    /// Shorthand for `skip_policy(SkipPolicy::Limit(skip_limit))`.
    pub fn skip_limit(self, skip_limit: usize) -> Self {
        self.skip_policy(SkipPolicy::Limit(skip_limit))
    }

    pub fn allow_start_if_complete(mut self, allow: bool) -> Self {
        self.allow_start_if_complete = allow;
        self
    }

    pub fn build(self) -> Result<ChunkOrientedStep<'a, I, O>, BatchError> {
        if self.chunk_size == 0 {
            return Err(BatchError::Configuration(format!(
                "chunk size of step {} must be greater than zero",
                self.name
            )));
        }

        let missing = |part: &str| {
            BatchError::Configuration(format!("{} is required for building step {}", part, self.name))
        };

        let reader = self.reader.ok_or_else(|| missing("Reader"))?;
        let processor = self.processor.ok_or_else(|| missing("Processor"))?;
        let writer = self.writer.ok_or_else(|| missing("Writer"))?;

        Ok(ChunkOrientedStep {
            reader,
            processor,
            writer,
            transaction_manager: self.transaction_manager.unwrap_or(&RESOURCELESS),
            chunk_size: self.chunk_size.into(),
            skip_policy: self.skip_policy,
            restart: RestartGuard::new(self.allow_start_if_complete),
            name: self.name,
        })
    }
}
