use std::time::{Duration, Instant};

use log::{error, info};
use serde::Serialize;
use uuid::Uuid;

use crate::{BatchError, ErrorKind};

use super::{
    build_name,
    step::{BatchStatus, Step, StepExecution, StepFailure},
};

/// Type alias for job execution results.
///
/// `Err` is reserved for invocations that could not start at all. A job whose
/// step failed still returns `Ok`, with a [`BatchStatus::Failed`] execution.
type JobResult<T> = Result<T, BatchError>;

/// Represents a job that can be executed.
///
/// A job is a container for a sequence of steps executed in order. `run`
/// blocks the caller until every step has reached a terminal status or one
/// of them failed.
pub trait Job {
    /// Runs the job and returns the result of the job execution.
    ///
    /// # Returns
    /// - `Ok(JobExecution)` once the job reached `Completed` or `Failed`
    /// - `Err(BatchError::Configuration)` when the job has no step
    /// - `Err(BatchError::StepAlreadyComplete)` when a completed step may not
    ///   be started again
    fn run(&self) -> JobResult<JobExecution>;
}

/// Represents the execution of a job.
///
/// Aggregates the executions of the steps that ran, in order.
#[derive(Debug)]
pub struct JobExecution {
    pub id: Uuid,
    pub name: String,
    pub status: BatchStatus,
    /// The time when the job started executing
    pub start: Instant,
    /// The time when the job finished executing
    pub end: Instant,
    /// The total duration of the job execution
    pub duration: Duration,
    pub step_executions: Vec<StepExecution>,
}

impl JobExecution {
    pub fn read_count(&self) -> usize {
        self.step_executions.iter().map(|step| step.read_count).sum()
    }

    pub fn write_count(&self) -> usize {
        self.step_executions.iter().map(|step| step.write_count).sum()
    }

    pub fn skip_count(&self) -> usize {
        self.step_executions.iter().map(|step| step.skip_count()).sum()
    }

    pub fn commit_count(&self) -> usize {
        self.step_executions.iter().map(|step| step.commit_count).sum()
    }

    /// Records accepted into chunks that were never committed.
    pub fn discarded_count(&self) -> usize {
        self.step_executions.iter().map(|step| step.discarded_count).sum()
    }

    /// Failure of the step that stopped the job, if any.
    pub fn failure(&self) -> Option<&StepFailure> {
        self.step_executions
            .iter()
            .rev()
            .find_map(|step| step.failure.as_ref())
    }

    pub fn report(&self) -> ExecutionReport {
        let failure = self.failure();
        ExecutionReport {
            job_name: self.name.clone(),
            status: self.status,
            read: self.read_count(),
            written: self.write_count(),
            skipped: self.skip_count(),
            commits: self.commit_count(),
            discarded: self.discarded_count(),
            error_kind: failure.map(|failure| failure.kind),
            error_message: failure.map(|failure| failure.message.clone()),
            duration_ms: self.duration.as_millis(),
        }
    }
}

/// Read-only summary of a finished job, for operators.
///
/// On failure, `written` is the number of records durably committed before
/// the failing chunk or record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub job_name: String,
    pub status: BatchStatus,
    pub read: usize,
    pub written: usize,
    pub skipped: usize,
    pub commits: usize,
    pub discarded: usize,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub duration_ms: u128,
}

/// A configured job: a name and its steps in execution order.
pub struct JobInstance<'a> {
    id: Uuid,
    name: String,
    steps: Vec<&'a dyn Step>,
}

impl JobInstance<'_> {
    pub fn get_name(&self) -> &str {
        &self.name
    }
}

impl Job for JobInstance<'_> {
    fn run(&self) -> JobResult<JobExecution> {
        if self.steps.is_empty() {
            return Err(BatchError::Configuration(format!(
                "job {} has no step",
                self.name
            )));
        }

        for step in &self.steps {
            if let Err(error) = step.can_start() {
                error!("Job {} refused to start: {}", self.name, error);
                return Err(error);
            }
        }

        let start = Instant::now();

        info!("Start of job: {}, id: {}", self.name, self.id);

        let mut step_executions = Vec::with_capacity(self.steps.len());
        let mut status = BatchStatus::Completed;

        for step in &self.steps {
            let mut step_execution = StepExecution::new(step.get_name());

            match step.execute(&mut step_execution) {
                Ok(()) => step_executions.push(step_execution),
                Err(BatchError::StepAlreadyComplete(name)) => {
                    error!("Job {} refused to start: step {} already completed", self.name, name);
                    return Err(BatchError::StepAlreadyComplete(name));
                }
                Err(_) => {
                    status = BatchStatus::Failed;
                    step_executions.push(step_execution);
                    break;
                }
            }
        }

        let job_execution = JobExecution {
            id: self.id,
            name: self.name.clone(),
            status,
            start,
            end: Instant::now(),
            duration: start.elapsed(),
            step_executions,
        };

        match job_execution.failure() {
            Some(failure) => error!(
                "End of job: {}, id: {}, status: {:?}, error: {:?}, committed records: {}",
                self.name,
                self.id,
                status,
                failure.kind,
                job_execution.write_count()
            ),
            None => info!(
                "End of job: {}, id: {}, status: {:?}",
                self.name, self.id, status
            ),
        }

        Ok(job_execution)
    }
}

/// Builder for creating a job instance.
///
/// ```ignore
/// use flatfile_batch_rs::core::job::JobBuilder;
///
/// let job = JobBuilder::new()
///     .name("load-persons".to_string())
///     .start(&load_step)
///     .next(&cleanup_step)
///     .build();
/// ```
#[derive(Default)]
pub struct JobBuilder<'a> {
    /// Optional name for the job (generated randomly if not specified)
    name: Option<String>,
    steps: Vec<&'a dyn Step>,
}

impl<'a> JobBuilder<'a> {
    pub fn new() -> Self {
        Self {
            name: None,
            steps: Vec::new(),
        }
    }

    pub fn name(mut self, name: String) -> JobBuilder<'a> {
        self.name = Some(name);
        self
    }

    /// Sets the first step of the job.
    ///
    /// Semantically identical to `next()`, reads better for the initial step.
    pub fn start(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    pub fn next(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> JobInstance<'a> {
        JobInstance {
            id: Uuid::new_v4(),
            name: self.name.unwrap_or_else(build_name),
            steps: self.steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::{Job, JobBuilder};
    use crate::{
        BatchError, ErrorKind,
        core::{
            step::{BatchStatus, Step, StepExecution},
            tasklet::{RepeatStatus, Tasklet},
        },
    };

    /// Step reporting fixed counters, optionally failing.
    struct FixedStep {
        name: &'static str,
        written: usize,
        fail: bool,
        runs: Cell<usize>,
    }

    impl FixedStep {
        fn new(name: &'static str, written: usize, fail: bool) -> Self {
            Self {
                name,
                written,
                fail,
                runs: Cell::new(0),
            }
        }
    }

    impl Step for FixedStep {
        fn get_name(&self) -> &str {
            self.name
        }

        fn execute(&self, step_execution: &mut StepExecution) -> Result<(), BatchError> {
            self.runs.set(self.runs.get() + 1);
            step_execution.read_count = self.written + usize::from(self.fail);
            step_execution.write_count = self.written;
            step_execution.commit_count = self.written;
            if self.fail {
                step_execution.record_failure(&BatchError::ItemReader("bad line".to_string()), None);
                step_execution.status = BatchStatus::Failed;
                Err(BatchError::Step(self.name.to_string()))
            } else {
                step_execution.status = BatchStatus::Completed;
                Ok(())
            }
        }
    }

    #[test]
    fn job_completes_when_all_steps_complete() {
        let load = FixedStep::new("load", 3, false);
        let cleanup = FixedStep::new("cleanup", 0, false);

        let job = JobBuilder::new()
            .name("import".to_string())
            .start(&load)
            .next(&cleanup)
            .build();

        let execution = job.run().unwrap();

        assert_eq!(execution.status, BatchStatus::Completed);
        assert_eq!(execution.step_executions.len(), 2);
        assert_eq!(execution.write_count(), 3);
        assert!(execution.failure().is_none());

        let report = execution.report();
        assert_eq!(report.job_name, "import");
        assert_eq!(report.written, 3);
        assert_eq!(report.error_kind, None);
    }

    #[test]
    fn failed_step_fails_the_job_and_stops_it() {
        let load = FixedStep::new("load", 2, true);
        let cleanup = FixedStep::new("cleanup", 0, false);

        let job = JobBuilder::new().start(&load).next(&cleanup).build();

        let execution = job.run().unwrap();

        assert_eq!(execution.status, BatchStatus::Failed);
        assert_eq!(cleanup.runs.get(), 0);

        let report = execution.report();
        assert_eq!(report.status, BatchStatus::Failed);
        assert_eq!(report.error_kind, Some(ErrorKind::Parse));
        assert_eq!(report.written, 2);
        assert_eq!(report.read, 3);
    }

    #[test]
    fn job_without_steps_is_a_configuration_error() {
        let job = JobBuilder::new().build();
        assert!(matches!(job.run(), Err(BatchError::Configuration(_))));
    }

    #[test]
    fn unnamed_job_gets_a_random_name() {
        let job = JobBuilder::new().build();
        assert_eq!(job.get_name().len(), 8);
    }

    struct NoopTasklet;

    impl Tasklet for NoopTasklet {
        fn execute(&self, _step_execution: &StepExecution) -> Result<RepeatStatus, BatchError> {
            Ok(RepeatStatus::Finished)
        }
    }

    #[derive(Default)]
    struct CountingTasklet {
        runs: Cell<usize>,
    }

    impl Tasklet for CountingTasklet {
        fn execute(&self, _step_execution: &StepExecution) -> Result<RepeatStatus, BatchError> {
            self.runs.set(self.runs.get() + 1);
            Ok(RepeatStatus::Finished)
        }
    }

    #[test]
    fn refused_restart_of_a_later_step_runs_no_earlier_step() {
        let load_tasklet = CountingTasklet::default();
        let cleanup_tasklet = CountingTasklet::default();

        let load = crate::core::step::StepBuilder::new("load")
            .tasklet(&load_tasklet)
            .allow_start_if_complete(true)
            .build()
            .unwrap();
        let cleanup = crate::core::step::StepBuilder::new("cleanup")
            .tasklet(&cleanup_tasklet)
            .build()
            .unwrap();
        let job = JobBuilder::new().start(&load).next(&cleanup).build();

        assert_eq!(job.run().unwrap().status, BatchStatus::Completed);

        let rerun = job.run();

        assert!(matches!(rerun, Err(BatchError::StepAlreadyComplete(name)) if name == "cleanup"));
        assert_eq!(load_tasklet.runs.get(), 1);
        assert_eq!(cleanup_tasklet.runs.get(), 1);
    }

    #[test]
    fn rerunning_a_job_with_a_completed_step_is_refused() {
        let step = crate::core::step::StepBuilder::new("noop")
            .tasklet(&NoopTasklet)
            .build()
            .unwrap();
        let job = JobBuilder::new().start(&step).build();

        assert!(job.run().is_ok());
        assert!(matches!(job.run(), Err(BatchError::StepAlreadyComplete(_))));
    }
}
