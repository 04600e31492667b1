use std::{fs::File, process::ExitCode};

use anyhow::{Context, Result};
use flatfile_batch_rs::{
    BatchError,
    config::ImportConfig,
    core::{
        item::ItemWriter,
        job::{Job, JobBuilder},
        step::{BatchStatus, StepBuilder},
        transaction::{ResourcelessTransactionManager, TransactionManager},
    },
    item::{logger::LoggerWriter, rdbc::SqliteItemWriterBuilder},
    person::{
        CREATE_PERSON_TABLE, PERSON_FIELDS, PERSON_TABLE, Person, PersonBinder, PersonNormalizer,
        RawPerson, person_reader,
    },
    tasklet::file::DeleteFileTasklet,
};
use log::info;
use sqlx::sqlite::SqlitePoolOptions;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ImportConfig::from_env()?;
    info!("Importing {} into {}", config.input.display(), config.database_url);

    // Lazy so a dry run never touches the database
    let pool = SqlitePoolOptions::new()
        .connect_lazy(&config.database_url)
        .with_context(|| format!("invalid database url {}", config.database_url))?;

    if !config.dry_run {
        sqlx::query(CREATE_PERSON_TABLE)
            .execute(&pool)
            .await
            .context("unable to create the person table")?;
    }

    let input = File::open(&config.input).map_err(|error| {
        BatchError::Resource(format!(
            "unable to open {}: {}",
            config.input.display(),
            error
        ))
    })?;
    let reader = person_reader(input);

    let processor = PersonNormalizer;

    let binder = PersonBinder;
    let sqlite_writer = SqliteItemWriterBuilder::new()
        .pool(&pool)
        .table(PERSON_TABLE)
        .add_column(PERSON_FIELDS[0])
        .add_column(PERSON_FIELDS[1])
        .item_binder(&binder)
        .build()?;
    let logger_writer = LoggerWriter::default();
    let resourceless = ResourcelessTransactionManager;

    let (writer, transaction_manager): (&dyn ItemWriter<Person>, &dyn TransactionManager) =
        if config.dry_run {
            (&logger_writer, &resourceless)
        } else {
            (&sqlite_writer, &sqlite_writer)
        };

    let load_step = StepBuilder::new("load-persons")
        .chunk::<RawPerson, Person>(config.chunk_size)
        .reader(&reader)
        .processor(&processor)
        .writer(writer)
        .transaction_manager(transaction_manager)
        .skip_policy(config.skip_policy)
        .allow_start_if_complete(config.allow_start_if_complete)
        .build()?;

    let cleanup = DeleteFileTasklet::new(&config.input);
    let cleanup_step = StepBuilder::new("delete-input")
        .tasklet(&cleanup)
        .allow_start_if_complete(true)
        .build()?;

    let mut job = JobBuilder::new()
        .name("import-persons".to_string())
        .start(&load_step);
    if config.delete_input_on_success && !config.dry_run {
        job = job.next(&cleanup_step);
    }
    let job = job.build();

    let execution = job.run()?;
    let report = execution.report();
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(if report.status == BatchStatus::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
