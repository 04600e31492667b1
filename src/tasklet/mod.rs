//! # Tasklet Module
//!
//! Tasklet implementations for housekeeping around a load, run as their own
//! steps outside the chunk-oriented pattern.

pub mod file;
