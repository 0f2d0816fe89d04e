//! Outer-loop timing: clock, cycle barrier, statistics and RT setup.
//!
//! ## Cycle Barrier
//! The clock thread calls [`CycleBarrier::request_cycle`], which marks a
//! cycle pending and blocks until the worker reports
//! [`CycleBarrier::complete_cycle`]. The worker checks for a pending cycle
//! before dequeuing commands, so a cycle's force update, safety check and
//! transition all happen-before the next external command. At most one cycle
//! is ever pending; a slow cycle delays the next tick and is counted as an
//! overrun instead of piling up.
//!
//! ## RT Setup Sequence
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)`.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity` to the configured core.
//! 4. `sched_setscheduler(SCHED_FIFO, priority)`.
//!
//! Without the `rt` feature every RT call is a no-op.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, trace, warn};

// ─── Time Source ────────────────────────────────────────────────────

/// Wall-clock source for timestamps and operation timeouts [s].
pub trait TimeSource: Send + Sync {
    /// Seconds since the UNIX epoch.
    fn now(&self) -> f64;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Manually advanced clock for simulations and tests.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    bits: Arc<AtomicU64>,
}

impl ManualTimeSource {
    /// Clock starting at `start` seconds.
    pub fn new(start: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    /// Set the current time.
    pub fn set(&self, now: f64) {
        self.bits.store(now.to_bits(), Ordering::SeqCst);
    }

    /// Move the clock forward by `seconds`.
    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Last cycle duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum cycle duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Number of overruns detected.
    pub overruns: u64,
    /// Maximum wake-up latency [ns].
    pub max_latency_ns: i64,
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleStats {
    /// Create a new zeroed stats instance.
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
            max_latency_ns: 0,
        }
    }

    /// Record a cycle duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        if duration_ns < self.min_cycle_ns {
            self.min_cycle_ns = duration_ns;
        }
        if duration_ns > self.max_cycle_ns {
            self.max_cycle_ns = duration_ns;
        }
        self.sum_cycle_ns += duration_ns;
        if latency_ns > self.max_latency_ns {
            self.max_latency_ns = latency_ns;
        }
    }

    /// Average cycle time [ns] (returns 0 if no cycles).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl std::fmt::Display for CycleStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let min = if self.cycle_count == 0 { 0 } else { self.min_cycle_ns };
        write!(
            f,
            "cycles={} min={}µs avg={}µs max={}µs overruns={} max_latency={}µs",
            self.cycle_count,
            min / 1000,
            self.avg_cycle_ns() / 1000,
            self.max_cycle_ns / 1000,
            self.overruns,
            self.max_latency_ns / 1000,
        )
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Errors during RT setup or cycle execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    /// RT system call failed.
    RtSetup(String),
    /// The barrier was shut down while waiting.
    Shutdown,
    /// Cycle took longer than its budget.
    CycleOverrun {
        /// Actual cycle duration [ns].
        actual_ns: i64,
        /// Configured cycle budget [ns].
        budget_ns: i64,
    },
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RtSetup(msg) => write!(f, "RT setup error: {msg}"),
            Self::Shutdown => write!(f, "cycle barrier shut down"),
            Self::CycleOverrun {
                actual_ns,
                budget_ns,
            } => write!(f, "cycle overrun: {actual_ns}ns > {budget_ns}ns budget"),
        }
    }
}

impl std::error::Error for CycleError {}

// ─── Cycle Barrier ──────────────────────────────────────────────────

#[derive(Debug, Default)]
struct BarrierState {
    pending: bool,
    requested: u64,
    completed: u64,
    work: bool,
    shutdown: bool,
}

/// Condition-variable rendezvous between the clock and the worker.
#[derive(Debug, Default)]
pub struct CycleBarrier {
    state: Mutex<BarrierState>,
    cond: Condvar,
}

impl CycleBarrier {
    /// New barrier with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a cycle pending and block until the worker completes it.
    ///
    /// Returns the cycle number, or `CycleError::Shutdown` if the barrier is
    /// shut down before completion.
    pub fn request_cycle(&self) -> Result<u64, CycleError> {
        let mut state = self.lock();
        if state.shutdown {
            return Err(CycleError::Shutdown);
        }
        if !state.pending {
            state.pending = true;
            state.requested += 1;
        }
        let target = state.requested;
        self.cond.notify_all();
        while state.completed < target && !state.shutdown {
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.completed >= target {
            Ok(target)
        } else {
            Err(CycleError::Shutdown)
        }
    }

    /// Worker side: consume the pending cycle, if any.
    pub fn take_request(&self) -> bool {
        std::mem::take(&mut self.lock().pending)
    }

    /// Worker side: report the consumed cycle as done.
    pub fn complete_cycle(&self) {
        let mut state = self.lock();
        state.completed = state.requested;
        self.cond.notify_all();
    }

    /// Producer side: wake the worker because a command was queued.
    pub fn notify_work(&self) {
        self.lock().work = true;
        self.cond.notify_all();
    }

    /// Worker side: block until a cycle is pending, work was signalled,
    /// the barrier shut down or `timeout` elapsed.
    pub fn wait_for_work(&self, timeout: Duration) {
        let state = self.lock();
        let (mut state, _) = self
            .cond
            .wait_timeout_while(state, timeout, |s| !(s.pending || s.work || s.shutdown))
            .unwrap_or_else(PoisonError::into_inner);
        state.work = false;
    }

    /// Release every waiter; further requests fail.
    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.cond.notify_all();
    }

    /// The barrier has been shut down.
    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }
}

// ─── Outer-Loop Clock ───────────────────────────────────────────────

/// Tick source that requests one cycle per period.
pub struct OuterLoopClock {
    barrier: Arc<CycleBarrier>,
    period: Duration,
    stats: CycleStats,
}

impl OuterLoopClock {
    /// Clock ticking every `period`.
    pub fn new(barrier: Arc<CycleBarrier>, period: Duration) -> Self {
        Self {
            barrier,
            period,
            stats: CycleStats::new(),
        }
    }

    /// Statistics collected so far.
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Tick until `running` clears, the barrier shuts down or `max_cycles`
    /// cycles ran (`0` runs forever). Overruns are logged and counted.
    pub fn run(&mut self, running: &AtomicBool, max_cycles: u64) -> CycleStats {
        let budget_ns = self.period.as_nanos() as i64;
        let mut next_wake = Instant::now();

        while running.load(Ordering::SeqCst) {
            if max_cycles != 0 && self.stats.cycle_count >= max_cycles {
                break;
            }
            next_wake += self.period;

            let start = Instant::now();
            let cycle = match self.barrier.request_cycle() {
                Ok(cycle) => cycle,
                Err(CycleError::Shutdown) => break,
                Err(e) => {
                    warn!("cycle request failed: {e}");
                    break;
                }
            };
            let duration_ns = start.elapsed().as_nanos() as i64;
            self.stats.record(duration_ns, 0);
            trace!(cycle, duration_ns, "outer loop cycle");

            if duration_ns > budget_ns {
                self.stats.overruns += 1;
                warn!(
                    "{}",
                    CycleError::CycleOverrun {
                        actual_ns: duration_ns,
                        budget_ns,
                    }
                );
            }

            let now = Instant::now();
            if let Some(remaining) = next_wake.checked_duration_since(now) {
                std::thread::sleep(remaining);
            } else {
                // Late: restart the schedule from now instead of bursting.
                next_wake = now;
            }
        }

        debug!("outer loop clock stopped: {}", self.stats);
        self.stats.clone()
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CycleError> {
    Ok(())
}

/// Touch stack pages so the RT thread does not fault on them later.
#[cfg(feature = "rt")]
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference into `buf`.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(not(feature = "rt"))]
fn prefault_stack() {}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CycleError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` is a valid sched_param; pid 0 is the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), CycleError> {
    Ok(())
}

/// Lock memory once for the whole process.
pub fn rt_lock_memory() -> Result<(), CycleError> {
    rt_mlockall()
}

/// Pin the calling thread and give it `SCHED_FIFO` priority.
pub fn rt_setup_thread(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────
