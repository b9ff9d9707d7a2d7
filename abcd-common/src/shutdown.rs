// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-wide termination flag.
//!
//! The flag is write-once from the signal handler and read-only from the
//! state actions: every long-running action consults it between iterations
//! and steers toward the shutdown states.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};

static TERMINATION: LazyLock<Arc<AtomicBool>> = LazyLock::new(|| Arc::new(AtomicBool::new(false)));

/// Register SIGINT, SIGTERM and SIGHUP onto the termination flag.
///
/// Idempotent; call once before entering the state loop.
pub fn install_signal_handlers() -> io::Result<()> {
    for signal in [SIGINT, SIGTERM, SIGHUP] {
        signal_hook::flag::register(signal, Arc::clone(&TERMINATION))?;
    }
    Ok(())
}

/// True once a termination signal was delivered.
pub fn should_terminate() -> bool {
    TERMINATION.load(Ordering::Relaxed)
}

/// Set the flag directly, as a signal would.
///
/// Used by tests and by actions that decide to shut the process down
/// (e.g. on a `quit` command).
pub fn request_termination() {
    TERMINATION.store(true, Ordering::Relaxed);
}
