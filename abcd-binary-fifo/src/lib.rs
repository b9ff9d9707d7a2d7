// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Timestamped binary FIFO.
//!
//! An insertion-ordered collection of `(instant, bytes)` pairs with a
//! configurable expiration time. The deque is never emptied except by
//! [`BinaryFifo::update`]; entries never move relative to one another
//! except after [`BinaryFifo::load_from_file`], which sorts (the file may
//! be a concatenation of several dumps).
//!
//! The file format is repeated records of `{i64 nanoseconds since the
//! Unix epoch, u64 payload length, payload bytes}`, little-endian.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// One stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datum {
    pub timestamp: SystemTime,
    pub data: Vec<u8>,
}

/// Errors of the file persistence paths.
#[derive(Debug, thiserror::Error)]
pub enum FifoError {
    #[error("file error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Default)]
pub struct BinaryFifo {
    expiration_time: Duration,
    buffer: VecDeque<Datum>,
}

impl BinaryFifo {
    /// A FIFO that retains entries for `expiration_time`. A zero
    /// expiration retains everything.
    pub fn new(expiration_time: Duration) -> Self {
        BinaryFifo {
            expiration_time,
            buffer: VecDeque::new(),
        }
    }

    pub fn set_expiration_time(&mut self, expiration_time: Duration) {
        self.expiration_time = expiration_time;
    }

    pub fn expiration_time(&self) -> Duration {
        self.expiration_time
    }

    /// Append `data` with the current time as its timestamp.
    pub fn push(&mut self, data: Vec<u8>) {
        self.push_at(data, SystemTime::now());
    }

    /// Append `data` with an explicit timestamp.
    pub fn push_at(&mut self, data: Vec<u8>, timestamp: SystemTime) {
        self.buffer.push_back(Datum { timestamp, data });
    }

    /// Append several payloads, all stamped with the current time.
    pub fn push_vector(&mut self, data: Vec<Vec<u8>>) {
        let now = SystemTime::now();
        for entry in data {
            self.push_at(entry, now);
        }
    }

    /// Pop entries from the front while the front's age exceeds the
    /// expiration time. Idempotent; safe to call before any read.
    pub fn update(&mut self) {
        if self.expiration_time.is_zero() {
            return;
        }
        let now = SystemTime::now();
        while let Some(front) = self.buffer.front() {
            let age = now
                .duration_since(front.timestamp)
                .unwrap_or(Duration::ZERO);
            if age > self.expiration_time {
                self.buffer.pop_front();
            } else {
                break;
            }
        }
    }

    /// Payloads whose timestamps lie in `[from, to)`, in storage order.
    pub fn get_data(&self, from: SystemTime, to: SystemTime) -> Vec<Vec<u8>> {
        self.range(from, to).map(|datum| datum.data.clone()).collect()
    }

    /// Timestamps of the entries in `[from, to)`, as nanoseconds since
    /// the Unix epoch.
    pub fn get_timestamps(&self, from: SystemTime, to: SystemTime) -> Vec<i64> {
        self.range(from, to)
            .map(|datum| nanos_since_epoch(datum.timestamp))
            .collect()
    }

    fn range(&self, from: SystemTime, to: SystemTime) -> impl Iterator<Item = &Datum> {
        self.buffer
            .iter()
            .skip_while(move |datum| datum.timestamp < from)
            .take_while(move |datum| datum.timestamp < to)
    }

    /// Number of stored entries.
    pub fn count(&self) -> usize {
        self.buffer.len()
    }

    /// Total byte size of the stored payloads.
    pub fn size(&self) -> usize {
        self.buffer.iter().map(|datum| datum.data.len()).sum()
    }

    /// Write the entries in `[from, to)` to `path`, one record per entry.
    pub fn save_to_file<P: AsRef<Path>>(
        &self,
        path: P,
        from: SystemTime,
        to: SystemTime,
    ) -> Result<(), FifoError> {
        let mut writer = BufWriter::new(File::create(path)?);
        for datum in self.range(from, to) {
            writer.write_all(&nanos_since_epoch(datum.timestamp).to_le_bytes())?;
            writer.write_all(&(datum.data.len() as u64).to_le_bytes())?;
            writer.write_all(&datum.data)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Append the records of `path` to the buffer, then re-sort the whole
    /// buffer by timestamp.
    ///
    /// A truncated trailing record is discarded with a warning.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), FifoError> {
        let mut reader = BufReader::new(File::open(path)?);

        loop {
            let mut stamp = [0u8; 8];
            match reader.read_exact(&mut stamp) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err.into()),
            }
            let nanos = i64::from_le_bytes(stamp);

            let mut length = [0u8; 8];
            let mut data = Vec::new();
            let complete = reader.read_exact(&mut length).is_ok() && {
                data = vec![0u8; u64::from_le_bytes(length) as usize];
                reader.read_exact(&mut data).is_ok()
            };
            if !complete {
                tracing::warn!("truncated record at the end of the FIFO file, discarding");
                break;
            }

            self.buffer.push_back(Datum {
                timestamp: system_time_from_nanos(nanos),
                data,
            });
        }

        self.buffer
            .make_contiguous()
            .sort_by_key(|datum| datum.timestamp);

        Ok(())
    }
}

fn nanos_since_epoch(timestamp: SystemTime) -> i64 {
    match timestamp.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_nanos() as i64,
        Err(err) => -(err.duration().as_nanos() as i64),
    }
}

fn system_time_from_nanos(nanos: i64) -> SystemTime {
    if nanos >= 0 {
        UNIX_EPOCH + Duration::from_nanos(nanos as u64)
    } else {
        UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
    }
}

#[cfg(test)]
mod tests;
