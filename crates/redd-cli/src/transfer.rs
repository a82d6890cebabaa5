//! Streaming between ReDD storage and local readers/writers.

use crate::OutputFormat;
use anyhow::{Context, Result};
use lib_storage::Storage;
use serde::Serialize;
use std::io::{Read, Write};

/// Copy a storage from its current position to `out`. Returns bytes copied.
pub fn copy_to_writer<S: Storage>(src: &mut S, out: &mut impl Write, buffer_size: usize) -> Result<u64> {
    let mut buf = vec![0u8; buffer_size];
    let mut total = 0u64;

    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).context("Failed to write local output")?;
        total += n as u64;
        if n < buf.len() {
            // short read only happens at end of file
            break;
        }
    }

    out.flush()?;
    Ok(total)
}

/// Copy everything from `input` into a storage. Returns bytes copied.
pub fn copy_from_reader<S: Storage>(input: &mut impl Read, dst: &mut S, buffer_size: usize) -> Result<u64> {
    let mut buf = vec![0u8; buffer_size];
    let mut total = 0u64;

    loop {
        let n = input.read(&mut buf).context("Failed to read local input")?;
        if n == 0 {
            break;
        }
        dst.write(&buf[..n])?;
        total += n as u64;
    }

    dst.flush()?;
    Ok(total)
}

/// What `stat` reports about a remote file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileStat {
    pub name: String,
    pub size: i64,
}

/// Determine the size of an open storage.
pub fn stat<S: Storage>(name: &str, storage: &mut S) -> Result<FileStat> {
    let size = storage.size()?;
    Ok(FileStat {
        name: name.to_string(),
        size,
    })
}

/// Print a [`FileStat`] in the requested format.
pub fn write_stat(stat: &FileStat, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    match format {
        OutputFormat::Text => {
            writeln!(out, "File: {}", stat.name)?;
            writeln!(out, "Size: {} bytes", stat.size)?;
        }
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(stat)?)?;
        }
    }
    Ok(())
}
