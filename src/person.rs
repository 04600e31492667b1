//! The person import: `name;id_number` lines normalized into the `person`
//! table.

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    BatchError,
    core::item::{ItemProcessor, ItemProcessorResult},
};

/// Target table of the import.
pub const PERSON_TABLE: &str = "person";

/// Field names of an input line, also the target column names.
pub const PERSON_FIELDS: [&str; 2] = ["name", "id_number"];

pub const PERSON_DELIMITER: u8 = b';';

pub const CREATE_PERSON_TABLE: &str = "CREATE TABLE IF NOT EXISTS person (
    name TEXT NOT NULL,
    id_number TEXT NOT NULL
)";

/// One input line as read, before normalization.
///
/// A field present on the line is `Some`, even when empty. `None` means the
/// field is missing from the source altogether.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawPerson {
    #[serde(default, deserialize_with = "present")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub id_number: Option<String>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(Some)
}

/// A normalized record: upper-case name, id number without `.` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Person {
    pub name: String,
    pub id_number: String,
}

/// Uppercases the name and strips `.` and `-` from the id number.
#[derive(Default)]
pub struct PersonNormalizer;

impl ItemProcessor<RawPerson, Person> for PersonNormalizer {
    fn process(&self, item: &RawPerson) -> ItemProcessorResult<Person> {
        let name = item
            .name
            .as_deref()
            .ok_or_else(|| BatchError::ItemProcessor("person without name".to_string()))?;
        let id_number = item.id_number.as_deref().ok_or_else(|| {
            BatchError::ItemProcessor(format!("person {} without id number", name))
        })?;

        Ok(Some(Person {
            name: name.to_uppercase(),
            id_number: id_number.replace('.', "").replace('-', ""),
        }))
    }
}

#[cfg(feature = "csv")]
pub use reader::person_reader;

#[cfg(feature = "csv")]
mod reader {
    use std::io::Read;

    use crate::item::csv::csv_reader::{CsvItemReader, CsvItemReaderBuilder};

    use super::{PERSON_DELIMITER, PERSON_FIELDS};

    /// Reader of `name;id_number` lines, without header row.
    pub fn person_reader<R: Read>(source: R) -> CsvItemReader<R> {
        CsvItemReaderBuilder::new()
            .delimiter(PERSON_DELIMITER)
            .has_headers(false)
            .names(&PERSON_FIELDS)
            .from_reader(source)
    }
}

#[cfg(feature = "rdbc-sqlite")]
pub use binder::PersonBinder;

#[cfg(feature = "rdbc-sqlite")]
mod binder {
    use sqlx::{Sqlite, query_builder::Separated};

    use crate::item::rdbc::DatabaseItemBinder;

    use super::Person;

    /// Binds `name`, `id_number` in [`PERSON_FIELDS`](super::PERSON_FIELDS) order.
    #[derive(Default)]
    pub struct PersonBinder;

    impl DatabaseItemBinder<Person, Sqlite> for PersonBinder {
        fn bind(&self, item: &Person, mut query_builder: Separated<Sqlite, &str>) {
            query_builder.push_bind(item.name.clone());
            query_builder.push_bind(item.id_number.clone());
        }
    }
}
