use sqlx::{Database, query_builder::Separated};

/// Transactional SQLite writer.
pub mod sqlite_writer;

/// Trait for binding item data to database query parameters.
///
/// Generic over the SQLx database type so binders can be written once per
/// item type and database.
///
/// # Example
///
/// ```no_run
/// use flatfile_batch_rs::item::rdbc::DatabaseItemBinder;
/// use sqlx::{query_builder::Separated, Sqlite};
///
/// struct Person {
///     name: String,
///     id_number: String,
/// }
///
/// struct PersonBinder;
///
/// impl DatabaseItemBinder<Person, Sqlite> for PersonBinder {
///     fn bind(&self, item: &Person, mut query_builder: Separated<Sqlite, &str>) {
///         query_builder.push_bind(item.name.clone());
///         query_builder.push_bind(item.id_number.clone());
///     }
/// }
/// ```
pub trait DatabaseItemBinder<O, DB: Database> {
    /// Pushes one bind parameter per configured column, in column order.
    fn bind(&self, item: &O, query_builder: Separated<DB, &str>);
}

pub use sqlite_writer::{SqliteItemWriter, SqliteItemWriterBuilder};
