#![allow(dead_code)]

pub mod mocks;

use std::io::Write;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tempfile::NamedTempFile;

use flatfile_batch_rs::person::CREATE_PERSON_TABLE;

pub use mocks::MockPersonWriter;

/// Input of the reference run: three persons, two chunks of two.
pub const THREE_PERSONS: &str = "joão;123.456.789-00
maria;987-654-321-00
carlos;111.222.333-44";

/// A single connection keeps the in-memory database alive for the whole test.
pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

pub async fn person_pool() -> SqlitePool {
    let pool = memory_pool().await;
    sqlx::query(CREATE_PERSON_TABLE)
        .execute(&pool)
        .await
        .unwrap();
    pool
}

/// Person table rejecting a second row with the same id number.
pub async fn unique_person_pool() -> SqlitePool {
    let pool = memory_pool().await;
    sqlx::query("CREATE TABLE person (name TEXT NOT NULL, id_number TEXT NOT NULL UNIQUE)")
        .execute(&pool)
        .await
        .unwrap();
    pool
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Rows of the person table in insertion order.
pub async fn persons(pool: &SqlitePool) -> Vec<(String, String)> {
    sqlx::query_as("SELECT name, id_number FROM person ORDER BY rowid")
        .fetch_all(pool)
        .await
        .unwrap()
}

pub fn input_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file.flush().unwrap();
    file
}
