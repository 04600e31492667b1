use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter, Terminator, Trim};
use log::debug;
use serde::de::DeserializeOwned;
use std::{
    cell::{Cell, RefCell},
    fs::File,
    io::Read,
    path::Path,
};

use crate::{
    core::item::{ItemReader, ItemReaderResult},
    error::BatchError,
};

/// A delimited-record item reader that implements the `ItemReader` trait.
///
/// Every input line is split on the delimiter and deserialized into `T` with
/// Serde. When field names are declared with
/// [`CsvItemReaderBuilder::names`], each line must carry exactly that many
/// fields; a line that does not is reported as an `ItemReader` error for that
/// call only and the next call moves on to the following line.
///
/// # Implementation Details
///
/// - Streams the source: one record is held in memory at a time
/// - Uses a `RefCell` for the record iterator so `read` can take `&self`
/// - I/O failures of the underlying source are reported as `Resource` errors,
///   everything else (field count, encoding, deserialization) as `ItemReader`
/// - Once the source is exhausted, `read` keeps returning `Ok(None)`
///
/// # Examples
///
/// ```
/// use flatfile_batch_rs::item::csv::csv_reader::CsvItemReaderBuilder;
/// use flatfile_batch_rs::core::item::ItemReader;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// struct Record {
///     name: String,
///     id_number: String,
/// }
///
/// let data = "maria;987-654-321-00\ncarlos;111.222.333-44";
///
/// let reader = CsvItemReaderBuilder::new()
///     .delimiter(b';')
///     .names(&["name", "id_number"])
///     .from_reader(data.as_bytes());
///
/// let record: Record = reader.read().unwrap().unwrap();
/// assert_eq!(record.name, "maria");
/// assert_eq!(record.id_number, "987-654-321-00");
///
/// let record: Record = reader.read().unwrap().unwrap();
/// assert_eq!(record.name, "carlos");
///
/// assert!(ItemReader::<Record>::read(&reader).unwrap().is_none());
/// assert!(ItemReader::<Record>::read(&reader).unwrap().is_none());
/// ```
pub struct CsvItemReader<R> {
    records: RefCell<StringRecordsIntoIter<R>>,
    /// Declared field names, used both to check the field count and to map
    /// fields onto struct members
    names: Option<StringRecord>,
    exhausted: Cell<bool>,
}

impl<R: Read> CsvItemReader<R> {
    fn to_batch_error(error: csv::Error) -> BatchError {
        if error.is_io_error() {
            BatchError::Resource(error.to_string())
        } else {
            BatchError::ItemReader(error.to_string())
        }
    }

    fn check_field_count(&self, record: &StringRecord) -> Result<(), BatchError> {
        match &self.names {
            Some(names) if names.len() != record.len() => {
                let line = record
                    .position()
                    .map(|position| position.line())
                    .unwrap_or_default();
                Err(BatchError::ItemReader(format!(
                    "line {}: expected {} fields ({}), found {}",
                    line,
                    names.len(),
                    names.iter().collect::<Vec<_>>().join(", "),
                    record.len()
                )))
            }
            _ => Ok(()),
        }
    }
}

impl<R: Read, T: DeserializeOwned> ItemReader<T> for CsvItemReader<R> {
    /// Reads the next item from the delimited source.
    ///
    /// # Returns
    /// - `Ok(Some(record))` if a record is successfully read
    /// - `Ok(None)` if there are no more records to read
    /// - `Err(BatchError::ItemReader(error))` if the current line is malformed
    /// - `Err(BatchError::Resource(error))` if the source cannot be read
    fn read(&self) -> ItemReaderResult<T> {
        if self.exhausted.get() {
            return Ok(None);
        }

        let next = self.records.borrow_mut().next();

        match next {
            Some(Ok(string_record)) => {
                self.check_field_count(&string_record)?;

                let result: Result<T, _> = string_record.deserialize(self.names.as_ref());

                match result {
                    Ok(record) => Ok(Some(record)),
                    Err(error) => Err(BatchError::ItemReader(error.to_string())),
                }
            }
            Some(Err(error)) => Err(Self::to_batch_error(error)),
            None => {
                debug!("End of delimited input");
                self.exhausted.set(true);
                Ok(None)
            }
        }
    }
}

/// A builder for configuring delimited item reading.
///
/// # Default Configuration
///
/// - Delimiter: comma (,)
/// - Terminator: CRLF (accepts `\n` and `\r\n`)
/// - Headers: disabled
/// - Field names: none (field count checked against the first record)
/// - Trimming: All fields trimmed
#[derive(Default)]
pub struct CsvItemReaderBuilder {
    delimiter: u8,
    terminator: Terminator,
    has_headers: bool,
    names: Option<Vec<String>>,
}

impl CsvItemReaderBuilder {
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            terminator: Terminator::CRLF,
            has_headers: false,
            names: None,
        }
    }

    /// Sets the delimiter character, e.g. `b';'`.
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    /// Whether the first line is a header row to be skipped.
    pub fn has_headers(mut self, yes: bool) -> Self {
        self.has_headers = yes;
        self
    }

    /// Declares the field names of every line, in order.
    ///
    /// Lines with a different number of fields are rejected one by one, and
    /// the names are matched against the members of the target type.
    pub fn names(mut self, names: &[&str]) -> Self {
        self.names = Some(names.iter().map(|name| name.to_string()).collect());
        self
    }

    /// Creates a `CsvItemReader` from any source implementing `Read`.
    pub fn from_reader<R: Read>(self, rdr: R) -> CsvItemReader<R> {
        let rdr = ReaderBuilder::new()
            .trim(Trim::All)
            .delimiter(self.delimiter)
            .terminator(self.terminator)
            .has_headers(self.has_headers)
            // With declared names the field count is checked line by line against them
            .flexible(self.names.is_some())
            .from_reader(rdr);

        CsvItemReader {
            records: RefCell::new(rdr.into_records()),
            names: self.names.map(StringRecord::from),
            exhausted: Cell::new(false),
        }
    }

    /// Creates a `CsvItemReader` from a file path.
    ///
    /// # Errors
    /// `BatchError::Resource` if the file cannot be opened.
    pub fn from_path<P: AsRef<Path>>(self, path: P) -> Result<CsvItemReader<File>, BatchError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|error| {
            BatchError::Resource(format!("unable to open {}: {}", path.display(), error))
        })?;

        Ok(self.from_reader(file))
    }
}
