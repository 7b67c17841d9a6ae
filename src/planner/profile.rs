use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// A snapshot of plan dispatch profiling metrics.
///
/// Profiling is enabled via the `SLUICE_PROFILE` environment variable. Each
/// dispatch call increments exactly one exit counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchProfileSnapshot {
    /// Total nanoseconds spent inside the dispatcher, delegated work included.
    pub dispatch_ns: u64,
    /// Number of dispatch calls.
    pub dispatch_count: u64,
    /// Calls answered by the fast path.
    pub fast_path: u64,
    /// Calls whose plan build failed.
    pub build_error: u64,
    /// Calls rejected by the privilege gate.
    pub privilege_denied: u64,
    /// Calls routed to prepared-plan re-optimization.
    pub prepared: u64,
    /// Calls returning a non-logical plan unchanged.
    pub passthrough: u64,
    /// Calls handed to the standard optimizer.
    pub optimized: u64,
    /// Calls rejected because the cascades planner was requested.
    pub cascades_rejected: u64,
}

#[derive(Default)]
struct DispatchProfileCounters {
    dispatch_ns: AtomicU64,
    dispatch_count: AtomicU64,
    fast_path: AtomicU64,
    build_error: AtomicU64,
    privilege_denied: AtomicU64,
    prepared: AtomicU64,
    passthrough: AtomicU64,
    optimized: AtomicU64,
    cascades_rejected: AtomicU64,
}

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();
static PROFILE_COUNTERS: OnceLock<DispatchProfileCounters> = OnceLock::new();

fn profiling_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| std::env::var_os("SLUICE_PROFILE").is_some())
}

fn counters() -> Option<&'static DispatchProfileCounters> {
    profiling_enabled().then(|| PROFILE_COUNTERS.get_or_init(DispatchProfileCounters::default))
}

pub(crate) fn profile_timer() -> Option<Instant> {
    profiling_enabled().then(Instant::now)
}

/// Dispatcher exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchExit {
    FastPath,
    BuildError,
    PrivilegeDenied,
    Prepared,
    Passthrough,
    Optimized,
    CascadesRejected,
}

pub(crate) fn record_dispatch(exit: DispatchExit, start: Option<Instant>) {
    let Some(counters) = counters() else {
        return;
    };
    if let Some(start) = start {
        let nanos = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
        counters.dispatch_ns.fetch_add(nanos, Ordering::Relaxed);
    }
    counters.dispatch_count.fetch_add(1, Ordering::Relaxed);
    let counter = match exit {
        DispatchExit::FastPath => &counters.fast_path,
        DispatchExit::BuildError => &counters.build_error,
        DispatchExit::PrivilegeDenied => &counters.privilege_denied,
        DispatchExit::Prepared => &counters.prepared,
        DispatchExit::Passthrough => &counters.passthrough,
        DispatchExit::Optimized => &counters.optimized,
        DispatchExit::CascadesRejected => &counters.cascades_rejected,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Retrieves a snapshot of the dispatch counters.
///
/// Returns `None` when `SLUICE_PROFILE` is unset. With `reset`, counters are
/// zeroed as they are read.
///
/// ```no_run
/// use sluice::planner::profile::profile_snapshot;
///
/// if let Some(snapshot) = profile_snapshot(true) {
///     println!("fast path hits: {}", snapshot.fast_path);
/// }
/// ```
pub fn profile_snapshot(reset: bool) -> Option<DispatchProfileSnapshot> {
    let counters = counters()?;
    let load = |counter: &AtomicU64| {
        if reset {
            counter.swap(0, Ordering::Relaxed)
        } else {
            counter.load(Ordering::Relaxed)
        }
    };
    Some(DispatchProfileSnapshot {
        dispatch_ns: load(&counters.dispatch_ns),
        dispatch_count: load(&counters.dispatch_count),
        fast_path: load(&counters.fast_path),
        build_error: load(&counters.build_error),
        privilege_denied: load(&counters.privilege_denied),
        prepared: load(&counters.prepared),
        passthrough: load(&counters.passthrough),
        optimized: load(&counters.optimized),
        cascades_rejected: load(&counters.cascades_rejected),
    })
}
