//! # File Cleanup Tasklet
//!
//! Deletes a file once the steps before it have completed, typically the
//! flat file a load step has just imported.
//!
//! ```rust
//! use flatfile_batch_rs::core::step::{Step, StepBuilder, StepExecution};
//! use flatfile_batch_rs::tasklet::file::DeleteFileTasklet;
//! use std::env::temp_dir;
//! use std::fs;
//!
//! # fn example() -> Result<(), flatfile_batch_rs::BatchError> {
//! let input = temp_dir().join("persons-to-delete.csv");
//! fs::write(&input, "joão;123.456.789-00").unwrap();
//!
//! let tasklet = DeleteFileTasklet::new(&input);
//! let step = StepBuilder::new("delete-input").tasklet(&tasklet).build()?;
//!
//! let mut step_execution = StepExecution::new(step.get_name());
//! step.execute(&mut step_execution)?;
//! assert!(!input.exists());
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{info, warn};

use crate::{
    BatchError,
    core::{
        step::StepExecution,
        tasklet::{RepeatStatus, Tasklet},
    },
};

pub struct DeleteFileTasklet {
    path: PathBuf,
    ignore_missing: bool,
}

impl DeleteFileTasklet {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ignore_missing: false,
        }
    }

    /// When set, a file that is already gone is not an error.
    pub fn ignore_missing(mut self, ignore: bool) -> Self {
        self.ignore_missing = ignore;
        self
    }
}

impl Tasklet for DeleteFileTasklet {
    fn execute(&self, _step_execution: &StepExecution) -> Result<RepeatStatus, BatchError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("File deleted: {}", self.path.display());
                Ok(RepeatStatus::Finished)
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound && self.ignore_missing => {
                warn!("File already absent: {}", self.path.display());
                Ok(RepeatStatus::Finished)
            }
            Err(error) => Err(BatchError::Tasklet(format!(
                "unable to delete {}: {}",
                self.path.display(),
                error
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn should_delete_the_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "maria;987-654-321-00")?;
        let (_, path) = file.keep()?;

        let tasklet = DeleteFileTasklet::new(&path);
        let status = tasklet.execute(&StepExecution::new("cleanup"))?;

        assert_eq!(status, RepeatStatus::Finished);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error_by_default() {
        let tasklet = DeleteFileTasklet::new("/nonexistent/persons.csv");

        let result = tasklet.execute(&StepExecution::new("cleanup"));

        assert!(matches!(result, Err(BatchError::Tasklet(_))));
    }

    #[test]
    fn missing_file_can_be_ignored() {
        let tasklet = DeleteFileTasklet::new("/nonexistent/persons.csv").ignore_missing(true);

        let result = tasklet.execute(&StepExecution::new("cleanup"));

        assert_eq!(result.unwrap(), RepeatStatus::Finished);
    }
}
