//! FME global performance counters
//!
//! ```text
//! Uninitialized ─init→ Initialized ─start→ Started ─stop→ Stopped
//!                           │  ↑______start_______│         │
//!                           └──────────destroy──────────────┴→ Destroyed
//! ```
//!
//! Every operation on one [`PerfCounter`] holds its mutex for the whole call,
//! so concurrent start/stop/print on the same instance are serialized while
//! distinct instances proceed in parallel.
//!
//! `stop` without `start` measures from zero. A second `start` replaces the
//! baseline. Printing before `start` shows zeros; printing between `start`
//! and `stop` reads the live counters.
//!
//! The free functions ([`init`], [`start`], [`stop`], [`print`],
//! [`destroy`]) take optional arguments and reject `None` with
//! `InvalidArgument` before touching hardware.

use crate::dfl;
use crate::error::{FpgaError, Result};
use crate::handle::{Handle, HandleInner};
use crate::zone::Zone;
use fpga_chip::dfl::id;
use fpga_chip::perf::{CounterDef, BLOCK_SIZE, COUNTERS};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    Initialized,
    Started,
    Stopped,
    Destroyed,
}

#[derive(Debug)]
struct CounterState {
    lifecycle: Lifecycle,
    base: usize,
    start: Option<Vec<u64>>,
    stop: Option<Vec<u64>>,
}

/// Change of one counter over the measured interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterDelta {
    /// Counter name
    pub name: &'static str,
    /// Events (or clocks) counted, modulo the counter width
    pub value: u64,
}

/// Snapshot-based view of the global performance counters of a device
#[derive(Debug)]
pub struct PerfCounter {
    handle: Arc<HandleInner>,
    state: Mutex<CounterState>,
}

impl PerfCounter {
    /// Counter state for a device handle; call [`Self::init`] before use
    pub fn new(handle: &Handle) -> Self {
        Self {
            handle: Arc::clone(handle.inner()),
            state: Mutex::new(CounterState {
                lifecycle: Lifecycle::Uninitialized,
                base: 0,
                start: None,
                stop: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CounterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locate the counter block
    ///
    /// # Errors
    ///
    /// `InvalidState` if already initialized or destroyed, or the handle is
    /// closed. `InvalidArgument` if the resource has no counter block.
    pub fn init(&self) -> Result<()> {
        let mut state = self.lock();
        match state.lifecycle {
            Lifecycle::Uninitialized => {}
            Lifecycle::Destroyed => return Err(destroyed()),
            _ => {
                return Err(FpgaError::invalid_state(
                    "Performance counters already initialized",
                ))
            }
        }

        self.handle.ensure_open()?;
        let window = self.handle.window(0)?;
        let base = dfl::find(
            window.as_ref(),
            id::FME_GLOBAL_PERF,
            self.handle.config().max_features,
        )?;

        if base + BLOCK_SIZE > window.size() {
            return Err(FpgaError::invalid_state(format!(
                "Counter block at {base:#x} exceeds window of {:#x} bytes",
                window.size()
            )));
        }

        tracing::debug!("Performance counters of {} at {base:#x}", self.handle.id());
        state.base = base;
        state.lifecycle = Lifecycle::Initialized;
        Ok(())
    }

    /// Record the baseline snapshot
    ///
    /// # Errors
    ///
    /// `InvalidState` unless initialized and not destroyed. A failed counter
    /// read discards the snapshot and leaves the state unchanged.
    pub fn start(&self) -> Result<()> {
        let mut state = self.lock();
        Self::ensure_ready(&state)?;

        let snapshot = self.snapshot(state.base)?;
        state.start = Some(snapshot);
        state.stop = None;
        state.lifecycle = Lifecycle::Started;
        Ok(())
    }

    /// Record the end snapshot
    ///
    /// # Errors
    ///
    /// Same as [`Self::start`].
    pub fn stop(&self) -> Result<()> {
        let mut state = self.lock();
        Self::ensure_ready(&state)?;

        let snapshot = self.snapshot(state.base)?;
        state.stop = Some(snapshot);
        state.lifecycle = Lifecycle::Stopped;
        Ok(())
    }

    /// Per-counter deltas in declaration order
    ///
    /// # Errors
    ///
    /// `InvalidState` unless initialized and not destroyed; propagates
    /// counter reads while started.
    pub fn deltas(&self) -> Result<Vec<CounterDelta>> {
        let state = self.lock();
        Self::ensure_ready(&state)?;
        self.compute(&state)
    }

    /// Write one `name : delta` line per counter
    ///
    /// # Errors
    ///
    /// Same as [`Self::deltas`], plus `Io` if the sink fails.
    pub fn print(&self, sink: &mut dyn Write) -> Result<()> {
        let state = self.lock();
        Self::ensure_ready(&state)?;

        for delta in self.compute(&state)? {
            writeln!(sink, "{:<24} : {}", delta.name, delta.value)
                .map_err(|e| FpgaError::io("performance counter sink", e))?;
        }
        Ok(())
    }

    /// Release the counter state
    ///
    /// # Errors
    ///
    /// `InvalidState` if already destroyed.
    pub fn destroy(&self) -> Result<()> {
        let mut state = self.lock();
        if state.lifecycle == Lifecycle::Destroyed {
            return Err(destroyed());
        }
        state.lifecycle = Lifecycle::Destroyed;
        state.start = None;
        state.stop = None;
        Ok(())
    }

    fn ensure_ready(state: &CounterState) -> Result<()> {
        match state.lifecycle {
            Lifecycle::Uninitialized => Err(FpgaError::invalid_state(
                "Performance counters not initialized",
            )),
            Lifecycle::Destroyed => Err(destroyed()),
            _ => Ok(()),
        }
    }

    fn snapshot(&self, base: usize) -> Result<Vec<u64>> {
        let zone = Zone::new(Arc::clone(&self.handle), 0);
        COUNTERS
            .iter()
            .map(|c| zone.read(base + c.offset).map(|raw| raw & c.mask()))
            .collect()
    }

    fn compute(&self, state: &CounterState) -> Result<Vec<CounterDelta>> {
        let end = match (&state.start, &state.stop) {
            (None, None) => return Ok(zeroed()),
            (_, Some(stop)) => stop.clone(),
            (Some(_), None) => self.snapshot(state.base)?,
        };
        let begin = state.start.clone().unwrap_or_else(|| vec![0; COUNTERS.len()]);

        Ok(COUNTERS
            .iter()
            .zip(begin.iter().zip(&end))
            .map(|(c, (&start, &stop))| delta(c, start, stop))
            .collect())
    }
}

fn delta(counter: &CounterDef, start: u64, stop: u64) -> CounterDelta {
    CounterDelta {
        name: counter.name,
        value: counter.delta(start, stop),
    }
}

fn zeroed() -> Vec<CounterDelta> {
    COUNTERS.iter().map(|c| delta(c, 0, 0)).collect()
}

fn destroyed() -> FpgaError {
    FpgaError::invalid_state("Performance counters destroyed")
}

fn required(counter: Option<&PerfCounter>) -> Result<&PerfCounter> {
    counter.ok_or_else(|| FpgaError::invalid_argument("Null performance counter"))
}

/// [`PerfCounter::init`] on an optional counter
///
/// # Errors
///
/// `InvalidArgument` for `None`, otherwise as [`PerfCounter::init`].
pub fn init(counter: Option<&PerfCounter>) -> Result<()> {
    required(counter)?.init()
}

/// [`PerfCounter::start`] on an optional counter
///
/// # Errors
///
/// `InvalidArgument` for `None`, otherwise as [`PerfCounter::start`].
pub fn start(counter: Option<&PerfCounter>) -> Result<()> {
    required(counter)?.start()
}

/// [`PerfCounter::stop`] on an optional counter
///
/// # Errors
///
/// `InvalidArgument` for `None`, otherwise as [`PerfCounter::stop`].
pub fn stop(counter: Option<&PerfCounter>) -> Result<()> {
    required(counter)?.stop()
}

/// [`PerfCounter::print`] with optional sink and counter
///
/// # Errors
///
/// `InvalidArgument` if either is `None`, otherwise as
/// [`PerfCounter::print`].
pub fn print(sink: Option<&mut dyn Write>, counter: Option<&PerfCounter>) -> Result<()> {
    let sink = sink.ok_or_else(|| FpgaError::invalid_argument("Null output sink"))?;
    required(counter)?.print(sink)
}

/// [`PerfCounter::destroy`] on an optional counter
///
/// # Errors
///
/// `InvalidArgument` for `None`, otherwise as [`PerfCounter::destroy`].
pub fn destroy(counter: Option<&PerfCounter>) -> Result<()> {
    required(counter)?.destroy()
}
