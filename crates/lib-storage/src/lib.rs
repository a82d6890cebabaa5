//! # lib-storage
//!
//! Portable storage contract shared by ReDD storage backends.
//!
//! This crate provides the vocabulary a backend adapter implements:
//! - Portable open flags ([`IoFlags`]) independent of any platform's `O_*` values
//! - Seek origins ([`Relative`])
//! - The [`Storage`] trait with the read/write/position/resize/close contract

pub mod flags;
pub mod storage;

pub use flags::*;
pub use storage::*;
