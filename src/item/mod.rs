#[cfg(feature = "logger")]
/// This module provides a logger item writer, useful for dry runs and debugging.
pub mod logger;

#[cfg(feature = "csv")]
/// This module provides a delimited flat-file item reader.
pub mod csv;

#[cfg(feature = "rdbc-sqlite")]
/// This module provides a transactional RDBC (SQLite) item writer.
pub mod rdbc;
