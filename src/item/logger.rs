use std::{cell::Cell, fmt::Debug};

use log::info;

use crate::core::item::{ItemWriter, ItemWriterResult};

/// Writer logging every item instead of persisting it, for dry runs.
#[derive(Default)]
pub struct LoggerWriter {
    logged: Cell<usize>,
}

impl LoggerWriter {
    /// Number of items logged so far.
    pub fn logged_count(&self) -> usize {
        self.logged.get()
    }
}

impl<T> ItemWriter<T> for LoggerWriter
where
    T: Debug,
{
    fn write(&self, items: &[T]) -> ItemWriterResult {
        items.iter().for_each(|item| info!("Record:{:?}", item));
        self.logged.set(self.logged.get() + items.len());
        Ok(())
    }
}
