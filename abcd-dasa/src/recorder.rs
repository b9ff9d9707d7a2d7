// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Run files and byte-accurate frame routing.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{EXTENSION_EVENTS, EXTENSION_RAW, EXTENSION_WAVEFORMS};

const EVENTS_PREFIX: &str = "data_abcd_events";
const WAVEFORMS_PREFIX: &str = "data_abcd_waveforms";

/// Which of the three run files the `start` command enables.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingEnable {
    pub events: bool,
    pub waveforms: bool,
    pub raw: bool,
}

impl RecordingEnable {
    pub fn any(&self) -> bool {
        self.events || self.waveforms || self.raw
    }
}

/// Final byte sizes reported by the close event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordingSizes {
    pub events: u64,
    pub waveforms: u64,
    pub raw: u64,
}

struct RunFile {
    name: PathBuf,
    writer: BufWriter<File>,
    size: u64,
}

impl RunFile {
    fn create(name: PathBuf) -> io::Result<Self> {
        let writer = BufWriter::new(File::create(&name)?);
        Ok(RunFile {
            name,
            writer,
            size: 0,
        })
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.size += bytes.len() as u64;
        Ok(())
    }
}

/// The open run files of one recording.
///
/// Only frames whose topic begins with the events (resp. waveforms)
/// prefix are routed to the respective file; the raw file receives every
/// frame verbatim, topic, separator space and payload included.
#[derive(Default)]
pub struct RecordingFiles {
    events: Option<RunFile>,
    waveforms: Option<RunFile>,
    raw: Option<RunFile>,
}

impl RecordingFiles {
    /// Derive the per-file names from `base_name` and create the enabled
    /// files.
    pub fn open(base_name: &str, enable: RecordingEnable) -> io::Result<Self> {
        let mut files = RecordingFiles::default();
        if enable.events {
            files.events = Some(RunFile::create(PathBuf::from(format!(
                "{base_name}_events.{EXTENSION_EVENTS}"
            )))?);
        }
        if enable.waveforms {
            files.waveforms = Some(RunFile::create(PathBuf::from(format!(
                "{base_name}_waveforms.{EXTENSION_WAVEFORMS}"
            )))?);
        }
        if enable.raw {
            files.raw = Some(RunFile::create(PathBuf::from(format!(
                "{base_name}_raw.{EXTENSION_RAW}"
            )))?);
        }
        Ok(files)
    }

    pub fn is_open(&self) -> bool {
        self.events.is_some() || self.waveforms.is_some() || self.raw.is_some()
    }

    /// File names of the open files, for the start event message.
    pub fn names(&self) -> Vec<String> {
        [&self.events, &self.waveforms, &self.raw]
            .into_iter()
            .flatten()
            .map(|file| file.name.display().to_string())
            .collect()
    }

    /// Route one received frame to the files it belongs to.
    pub fn route_frame(&mut self, topic: &str, payload: &[u8]) -> io::Result<()> {
        if topic.starts_with(EVENTS_PREFIX) {
            if let Some(file) = &mut self.events {
                file.write(payload)?;
            }
        } else if topic.starts_with(WAVEFORMS_PREFIX) {
            if let Some(file) = &mut self.waveforms {
                file.write(payload)?;
            }
        }

        if let Some(file) = &mut self.raw {
            file.write(topic.as_bytes())?;
            file.write(b" ")?;
            file.write(payload)?;
        }

        Ok(())
    }

    /// Current byte sizes.
    pub fn sizes(&self) -> RecordingSizes {
        RecordingSizes {
            events: self.events.as_ref().map_or(0, |file| file.size),
            waveforms: self.waveforms.as_ref().map_or(0, |file| file.size),
            raw: self.raw.as_ref().map_or(0, |file| file.size),
        }
    }

    /// Flush the buffered writers to disk.
    pub fn flush(&mut self) -> io::Result<()> {
        for file in [&mut self.events, &mut self.waveforms, &mut self.raw]
            .into_iter()
            .flatten()
        {
            file.writer.flush()?;
        }
        Ok(())
    }

    /// Flush and close every file, returning the final sizes.
    pub fn close(mut self) -> io::Result<RecordingSizes> {
        self.flush()?;
        Ok(self.sizes())
    }
}
