// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The vendor-neutral device seam.

use serde_json::Value;

/// Errors of the device layer. Vendor wrappers map their SDK codes onto
/// these kinds; the session maps them onto error states.
#[derive(Debug, thiserror::Error)]
pub enum DigitizerError {
    #[error("unable to open the digitizer: {0}")]
    Open(String),
    #[error("configuration rejected by the digitizer: {0}")]
    Configure(String),
    #[error("unable to control the acquisition: {0}")]
    Acquisition(String),
    #[error("unable to read from the digitizer: {0}")]
    Readout(String),
}

/// One completed capture fetched from the device.
///
/// Samples are signed device counts; the session converts them to the
/// unsigned wire scale when it buffers the waveform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub timestamp: u64,
    pub channel: u8,
    pub samples: Vec<i16>,
    pub gates: Vec<Vec<u8>>,
}

/// The verbs the session needs from a digitizer. Everything
/// vendor-specific lives behind this trait.
pub trait Digitizer {
    /// Open the physical device.
    fn open(&mut self) -> Result<(), DigitizerError>;

    /// Apply the channel configuration tree.
    fn configure(&mut self, config: &Value) -> Result<(), DigitizerError>;

    /// Start the acquisition.
    fn start(&mut self) -> Result<(), DigitizerError>;

    /// Stop the acquisition.
    fn stop(&mut self) -> Result<(), DigitizerError>;

    /// True when at least one completed capture is ready to fetch.
    fn poll(&mut self) -> Result<bool, DigitizerError>;

    /// Fetch the completed captures.
    fn fetch(&mut self) -> Result<Vec<Capture>, DigitizerError>;

    /// Release the device. Must be safe to call in any state; the session
    /// routes every error path through it.
    fn close(&mut self);
}
