//! Configuration of the person import, read from environment variables.
//!
//! | Variable                  | Default                         |
//! |---------------------------|---------------------------------|
//! | `FILE_INPUT`              | required                        |
//! | `DATABASE_URL`            | `sqlite://persons.db?mode=rwc`  |
//! | `CHUNK_SIZE`              | `2`                             |
//! | `SKIP_LIMIT`              | unset: fail fast                |
//! | `ALLOW_START_IF_COMPLETE` | `true`                          |
//! | `DELETE_INPUT_ON_SUCCESS` | `false`                         |
//! | `DRY_RUN`                 | `false`                         |

use std::{env, path::PathBuf, str::FromStr};

use crate::{BatchError, core::step::SkipPolicy};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://persons.db?mode=rwc";

pub const DEFAULT_CHUNK_SIZE: u16 = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    pub input: PathBuf,
    pub database_url: String,
    pub chunk_size: u16,
    pub skip_policy: SkipPolicy,
    pub allow_start_if_complete: bool,
    pub delete_input_on_success: bool,
    pub dry_run: bool,
}

impl ImportConfig {
    pub fn from_env() -> Result<Self, BatchError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let input = lookup("FILE_INPUT")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| BatchError::Configuration("FILE_INPUT is required".to_string()))?;

        let chunk_size = parse(&lookup, "CHUNK_SIZE")?.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(BatchError::Configuration(
                "CHUNK_SIZE must be greater than zero".to_string(),
            ));
        }

        let skip_policy = match parse::<usize, _>(&lookup, "SKIP_LIMIT")? {
            Some(limit) => SkipPolicy::Limit(limit),
            None => SkipPolicy::FailFast,
        };

        Ok(Self {
            input,
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            chunk_size,
            skip_policy,
            allow_start_if_complete: parse(&lookup, "ALLOW_START_IF_COMPLETE")?.unwrap_or(true),
            delete_input_on_success: parse(&lookup, "DELETE_INPUT_ON_SUCCESS")?.unwrap_or(false),
            dry_run: parse(&lookup, "DRY_RUN")?.unwrap_or(false),
        })
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, BatchError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value.trim().parse().map(Some).map_err(|error| {
            BatchError::Configuration(format!("invalid {} {:?}: {}", key, value, error))
        }),
    }
}
