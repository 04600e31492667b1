use std::{cell::RefCell, future::Future};

use log::{debug, error, warn};
use sqlx::{Pool, QueryBuilder, Sqlite, Transaction};
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::BatchError;
use crate::core::item::{ItemWriter, ItemWriterResult};
use crate::core::transaction::TransactionManager;
use crate::item::rdbc::DatabaseItemBinder;

// SQLITE_MAX_VARIABLE_NUMBER default since SQLite 3.32
const SQLITE_BIND_LIMIT: usize = 32766;

/// Runs a driver future to completion from synchronous step code.
///
/// Requires a multi-threaded tokio runtime: the current worker is handed over
/// to the runtime while blocking.
fn block_on<F: Future>(future: F) -> Result<F::Output, BatchError> {
    let handle = Handle::try_current().map_err(|error| {
        BatchError::Resource(format!("no tokio runtime available: {}", error))
    })?;

    if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
        return Err(BatchError::Resource(
            "SQLite writer requires a multi-threaded tokio runtime".to_string(),
        ));
    }

    Ok(tokio::task::block_in_place(|| handle.block_on(future)))
}

/// A writer inserting items into a SQLite table using SQLx.
///
/// Each call to [`ItemWriter::write`] issues a parameterized multi-row
/// `INSERT INTO <table> (<columns>) VALUES (...), (...)`, one row per item.
/// Chunks larger than the SQLite bind-parameter limit are split into several
/// statements.
///
/// The writer is also the [`TransactionManager`] of its pool. Registered on a
/// step with `.transaction_manager(&writer)`, every chunk is written inside a
/// transaction the step commits or rolls back. Used without a commit scope,
/// each `write` runs in a transaction of its own. Either way a chunk is never
/// partially applied.
///
/// Database calls are bridged from the synchronous step with
/// `tokio::task::block_in_place`, so the step must run on a multi-threaded
/// tokio runtime.
///
/// # Examples
///
/// ```no_run
/// use flatfile_batch_rs::item::rdbc::sqlite_writer::SqliteItemWriterBuilder;
/// use flatfile_batch_rs::item::rdbc::DatabaseItemBinder;
/// use sqlx::{query_builder::Separated, Sqlite, SqlitePool};
///
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// struct UserBinder;
///
/// impl DatabaseItemBinder<User, Sqlite> for UserBinder {
///     fn bind(&self, item: &User, mut query_builder: Separated<Sqlite, &str>) {
///         query_builder.push_bind(item.id);
///         query_builder.push_bind(item.name.clone());
///     }
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = SqlitePool::connect("sqlite://users.db").await?;
/// let binder = UserBinder;
///
/// let writer = SqliteItemWriterBuilder::new()
///     .pool(&pool)
///     .table("users")
///     .add_column("id")
///     .add_column("name")
///     .item_binder(&binder)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct SqliteItemWriter<'a, O> {
    pool: &'a Pool<Sqlite>,
    table: &'a str,
    columns: Vec<&'a str>,
    item_binder: &'a dyn DatabaseItemBinder<O, Sqlite>,
    /// Transaction of the current commit scope, if any
    transaction: RefCell<Option<Transaction<'static, Sqlite>>>,
}

impl<O> SqliteItemWriter<'_, O> {
    fn insert(
        &self,
        transaction: &mut Transaction<'static, Sqlite>,
        items: &[O],
    ) -> ItemWriterResult {
        let rows_per_statement = (SQLITE_BIND_LIMIT / self.columns.len()).max(1);

        for rows in items.chunks(rows_per_statement) {
            let mut query_builder = QueryBuilder::new("INSERT INTO ");
            query_builder.push(self.table);
            query_builder.push(" (");
            query_builder.push(self.columns.join(","));
            query_builder.push(") ");

            query_builder.push_values(rows, |b, item| {
                self.item_binder.bind(item, b);
            });

            let query = query_builder.build();

            block_on(query.execute(&mut **transaction))?.map_err(|e| {
                error!("Failed to write items to SQLite table {}: {}", self.table, e);
                BatchError::ItemWriter(format!("SQLite write failed: {}", e))
            })?;
        }

        debug!(
            "Successfully wrote {} items to SQLite table {}",
            items.len(),
            self.table
        );

        Ok(())
    }

    fn rollback_quietly(transaction: Transaction<'static, Sqlite>) {
        match block_on(transaction.rollback()) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!("SQLite rollback failed: {}", error),
            Err(error) => warn!("SQLite rollback failed: {}", error),
        }
    }
}

impl<O> ItemWriter<O> for SqliteItemWriter<'_, O> {
    fn write(&self, items: &[O]) -> ItemWriterResult {
        if items.is_empty() {
            return Ok(());
        }

        let mut current = self.transaction.borrow_mut();

        if let Some(transaction) = current.as_mut() {
            return self.insert(transaction, items);
        }

        let mut transaction = block_on(self.pool.begin())?
            .map_err(|e| BatchError::Resource(format!("SQLite connection unavailable: {}", e)))?;

        match self.insert(&mut transaction, items) {
            Ok(()) => block_on(transaction.commit())?
                .map_err(|e| BatchError::ItemWriter(format!("SQLite commit failed: {}", e))),
            Err(error) => {
                Self::rollback_quietly(transaction);
                Err(error)
            }
        }
    }

    /// Checks that a connection can be acquired before anything is read.
    fn open(&self) -> ItemWriterResult {
        let connection = block_on(self.pool.acquire())?;
        connection
            .map(|_| ())
            .map_err(|e| BatchError::Resource(format!("SQLite connection unavailable: {}", e)))
    }

    fn close(&self) -> ItemWriterResult {
        if let Some(transaction) = self.transaction.borrow_mut().take() {
            warn!("Closing SQLite writer with an open transaction, rolling back");
            Self::rollback_quietly(transaction);
        }
        Ok(())
    }
}

impl<O> TransactionManager for SqliteItemWriter<'_, O> {
    fn begin(&self) -> Result<(), BatchError> {
        let mut current = self.transaction.borrow_mut();

        if current.is_some() {
            return Err(BatchError::ItemWriter(
                "a SQLite transaction is already active".to_string(),
            ));
        }

        let transaction = block_on(self.pool.begin())?
            .map_err(|e| BatchError::Resource(format!("SQLite connection unavailable: {}", e)))?;
        *current = Some(transaction);

        Ok(())
    }

    fn commit(&self) -> Result<(), BatchError> {
        match self.transaction.borrow_mut().take() {
            Some(transaction) => block_on(transaction.commit())?
                .map_err(|e| BatchError::ItemWriter(format!("SQLite commit failed: {}", e))),
            None => Ok(()),
        }
    }

    fn rollback(&self) -> Result<(), BatchError> {
        match self.transaction.borrow_mut().take() {
            Some(transaction) => block_on(transaction.rollback())?
                .map_err(|e| BatchError::ItemWriter(format!("SQLite rollback failed: {}", e))),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct SqliteItemWriterBuilder<'a, O> {
    pool: Option<&'a Pool<Sqlite>>,
    table: Option<&'a str>,
    columns: Vec<&'a str>,
    item_binder: Option<&'a dyn DatabaseItemBinder<O, Sqlite>>,
}

impl<'a, O> SqliteItemWriterBuilder<'a, O> {
    pub fn new() -> Self {
        Self {
            pool: None,
            table: None,
            columns: Vec::new(),
            item_binder: None,
        }
    }

    pub fn pool(mut self, pool: &'a Pool<Sqlite>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn table(mut self, table: &'a str) -> Self {
        self.table = Some(table);
        self
    }

    /// Adds a column; the binder must push one value per column, in order.
    pub fn add_column(mut self, column: &'a str) -> Self {
        self.columns.push(column);
        self
    }

    pub fn item_binder(mut self, item_binder: &'a dyn DatabaseItemBinder<O, Sqlite>) -> Self {
        self.item_binder = Some(item_binder);
        self
    }

    pub fn build(self) -> Result<SqliteItemWriter<'a, O>, BatchError> {
        let pool = self
            .pool
            .ok_or_else(|| BatchError::Configuration("Pool is mandatory".to_string()))?;
        let table = self
            .table
            .ok_or_else(|| BatchError::Configuration("Table name is mandatory".to_string()))?;
        let item_binder = self
            .item_binder
            .ok_or_else(|| BatchError::Configuration("Item binder is mandatory".to_string()))?;

        if self.columns.is_empty() {
            return Err(BatchError::Configuration(
                "One or more columns are required".to_string(),
            ));
        }

        Ok(SqliteItemWriter {
            pool,
            table,
            columns: self.columns,
            item_binder,
            transaction: RefCell::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::{SqlitePool, query_builder::Separated, sqlite::SqlitePoolOptions};

    #[derive(Clone, Debug, PartialEq)]
    struct TestUser {
        id: i32,
        name: String,
        email: String,
    }

    struct TestUserBinder;
    impl DatabaseItemBinder<TestUser, Sqlite> for TestUserBinder {
        fn bind(&self, item: &TestUser, mut query_builder: Separated<Sqlite, &str>) {
            query_builder.push_bind(item.id);
            query_builder.push_bind(item.name.clone());
            query_builder.push_bind(item.email.clone());
        }
    }

    async fn setup_test_db() -> Result<SqlitePool, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(pool)
    }

    fn user(id: i32) -> TestUser {
        TestUser {
            id,
            name: format!("User {}", id),
            email: format!("user{}@example.com", id),
        }
    }

    async fn count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn writer<'a>(
        pool: &'a SqlitePool,
        binder: &'a TestUserBinder,
    ) -> SqliteItemWriter<'a, TestUser> {
        SqliteItemWriterBuilder::new()
            .pool(pool)
            .table("users")
            .add_column("id")
            .add_column("name")
            .add_column("email")
            .item_binder(binder)
            .build()
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_write_without_commit_scope() {
        let pool = setup_test_db().await.unwrap();
        let binder = TestUserBinder;
        let writer = writer(&pool, &binder);

        writer.write(&[user(1), user(2), user(3)]).unwrap();

        assert_eq!(count(&pool).await, 3);
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM users ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(names, vec!["User 1", "User 2", "User 3"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_write_empty_items() {
        let pool = setup_test_db().await.unwrap();
        let binder = TestUserBinder;
        let writer = writer(&pool, &binder);

        assert!(writer.write(&[]).is_ok());
        assert_eq!(count(&pool).await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_commit_makes_rows_visible() {
        let pool = setup_test_db().await.unwrap();
        let binder = TestUserBinder;
        let writer = writer(&pool, &binder);

        writer.begin().unwrap();
        writer.write(&[user(1), user(2)]).unwrap();
        writer.commit().unwrap();

        assert_eq!(count(&pool).await, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rollback_discards_the_whole_chunk() {
        let pool = setup_test_db().await.unwrap();
        let binder = TestUserBinder;
        let writer = writer(&pool, &binder);

        writer.begin().unwrap();
        writer.write(&[user(1)]).unwrap();
        writer.write(&[user(2)]).unwrap();
        writer.rollback().unwrap();

        assert_eq!(count(&pool).await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_constraint_violation_applies_nothing() {
        let pool = setup_test_db().await.unwrap();
        let binder = TestUserBinder;
        let writer = writer(&pool, &binder);

        writer.write(&[user(1)]).unwrap();

        let mut duplicate = user(3);
        duplicate.email = user(1).email;

        let result = writer.write(&[user(2), duplicate]);

        match result {
            Err(BatchError::ItemWriter(msg)) => assert!(msg.contains("SQLite write failed")),
            other => panic!("Expected BatchError::ItemWriter, got {:?}", other),
        }
        assert_eq!(count(&pool).await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_nested_begin_is_refused() {
        let pool = setup_test_db().await.unwrap();
        let binder = TestUserBinder;
        let writer = writer(&pool, &binder);

        writer.begin().unwrap();
        assert!(writer.begin().is_err());
        writer.rollback().unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_close_rolls_back_open_transaction() {
        let pool = setup_test_db().await.unwrap();
        let binder = TestUserBinder;
        let writer = writer(&pool, &binder);

        writer.begin().unwrap();
        writer.write(&[user(1)]).unwrap();
        writer.close().unwrap();

        assert_eq!(count(&pool).await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_large_batch_insert_is_split_into_statements() {
        let pool = setup_test_db().await.unwrap();
        let binder = TestUserBinder;
        let writer = writer(&pool, &binder);

        // 3 columns: more than one statement's worth of bind parameters
        let users: Vec<TestUser> = (1..=11_000).map(user).collect();

        writer.write(&users).unwrap();

        assert_eq!(count(&pool).await, 11_000);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_current_thread_runtime_is_a_resource_error() {
        let pool = setup_test_db().await.unwrap();
        let binder = TestUserBinder;
        let writer = writer(&pool, &binder);

        assert!(matches!(writer.open(), Err(BatchError::Resource(_))));
    }

    #[test]
    fn test_build_requires_pool_table_binder_and_columns() {
        let result = SqliteItemWriterBuilder::<TestUser>::new()
            .table("users")
            .add_column("id")
            .build();
        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }
}
