use std::time::Instant;

use log::{debug, info};

use crate::BatchError;

use super::step::{BatchStatus, RestartGuard, Step, StepExecution};

/// Outcome of one tasklet invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatStatus {
    /// The tasklet wants to be called again.
    Continuable,
    /// The tasklet has finished executing.
    Finished,
}

/// A single task run as a step, outside the read/process/write pattern
/// (file cleanup, archiving).
pub trait Tasklet {
    fn execute(&self, step_execution: &StepExecution) -> Result<RepeatStatus, BatchError>;
}

pub struct TaskletStep<'a> {
    name: String,
    tasklet: &'a dyn Tasklet,
    restart: RestartGuard,
}

impl Step for TaskletStep<'_> {
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

        loop {
            match self.tasklet.execute(step_execution) {
                Ok(RepeatStatus::Continuable) => debug!("Tasklet continuable, calling again"),
                Ok(RepeatStatus::Finished) => break,
                Err(error) => {
                    step_execution.record_failure(&error, None);
                    break;
                }
            }
        }

        step_execution.finish(start_time);
        self.restart.record(step_execution.status);

        info!(
            "End of step: {}, id: {}, status: {:?}",
            step_execution.name, step_execution.id, step_execution.status
        );

        if step_execution.status == BatchStatus::Completed {
            Ok(())
        } else {
            Err(BatchError::Step(self.name.clone()))
        }
    }
}

pub struct TaskletStepBuilder<'a> {
    name: String,
    tasklet: Option<&'a dyn Tasklet>,
    allow_start_if_complete: bool,
}

impl<'a> TaskletStepBuilder<'a> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tasklet: None,
            allow_start_if_complete: false,
        }
    }

    pub fn tasklet(mut self, tasklet: &'a dyn Tasklet) -> Self {
        self.tasklet = Some(tasklet);
        self
    }

    pub fn allow_start_if_complete(mut self, allow: bool) -> Self {
        self.allow_start_if_complete = allow;
        self
    }

    pub fn build(self) -> Result<TaskletStep<'a>, BatchError> {
        let tasklet = self.tasklet.ok_or_else(|| {
            BatchError::Configuration(format!(
                "Tasklet is required for building step {}",
                self.name
            ))
        })?;

        Ok(TaskletStep {
            name: self.name,
            tasklet,
            restart: RestartGuard::new(self.allow_start_if_complete),
        })
    }
}
