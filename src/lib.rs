#![cfg_attr(docsrs, feature(doc_cfg))]

/*!
 # Flat-file batch loading for Rust

 Reads a delimited flat file one record at a time, normalizes each record,
 and writes the results into a relational table in chunks. Every chunk is
 committed in its own transaction: once a chunk is committed it stays
 committed, and a failing chunk leaves nothing behind.

 ## Core Concepts

- **Job:** The entire batch process, one or more `Step`s run in order.
- **Step:** An independent phase of a job. A chunk-oriented step reads,
  processes and writes; a tasklet step runs a single task such as deleting
  the imported file.
- **ItemReader:** Retrieval of the input, one item at a time.
- **ItemProcessor:** Business transformation of one item. It may also filter
  the item out.
- **ItemWriter:** Output of a step, one chunk of items at a time.
- **TransactionManager:** Commit boundary around each chunk written.

 ## Features

| **Feature**   | **Description**                                                  |
|---------------|------------------------------------------------------------------|
| csv           | Enables the delimited flat-file `ItemReader`                     |
| rdbc-sqlite   | Enables the transactional SQLite `ItemWriter`                    |
| logger        | Enables a logger `ItemWriter`, useful for dry runs               |
| full          | Enables all available features                                   |

 ## Failure handling

 By default a step fails fast: the first record that cannot be parsed or
 normalized stops it, and the chunk being accumulated is discarded. With a
 skip limit, up to that many such records are skipped and counted instead.
 Write and resource errors always stop the step. The resulting
 [`ExecutionReport`](core::job::ExecutionReport) tells how many records were
 read, written and skipped, and why the job failed.

 ## Getting Started

```rust
# use flatfile_batch_rs::{
#     core::{
#         job::{Job, JobBuilder},
#         step::{BatchStatus, StepBuilder},
#     },
#     item::logger::LoggerWriter,
#     person::{person_reader, Person, PersonNormalizer, RawPerson},
#     BatchError,
# };
fn main() -> Result<(), BatchError> {
    let input = "joão;123.456.789-00
maria;987-654-321-00
carlos;111.222.333-44";

    let reader = person_reader(input.as_bytes());
    let processor = PersonNormalizer;
    let writer = LoggerWriter::default();

    let step = StepBuilder::new("load-persons")
        .chunk::<RawPerson, Person>(2)
        .reader(&reader)
        .processor(&processor)
        .writer(&writer)
        .build()?;

    let job = JobBuilder::new().start(&step).build();
    let execution = job.run()?;

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.write_count(), 3);
    assert_eq!(execution.commit_count(), 2);

    Ok(())
}
```

 ## License
 Licensed under either of Apache License, Version 2.0 or MIT license, at your
 option.
 */

/// Core module for batch operations
pub mod core;

/// Error types for batch operations
pub mod error;

#[doc(inline)]
pub use error::*;

/// Set of item readers / writers (delimited file reader, SQLite writer)
pub mod item;

/// Tasklets run as standalone steps
pub mod tasklet;

/// The person import: record types, normalization and table layout
pub mod person;

/// Environment configuration of the person import
pub mod config;
