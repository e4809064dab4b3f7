//! Real-time setup for the control tick thread (Linux SCHED_FIFO / affinity /
//! mlockall; macOS mlockall only).
//!
//! Runs on the control thread itself through `RunnerOpts::on_control_start`,
//! so priority and affinity apply to that thread and not to the step service
//! or the polling main loop. Failures are logged and never abort the run.

use crate::cli::{RtArgs, RtLock};
use vent_config::RunnerCfg;

/// Resolved real-time request: CLI flags first, then `[runner]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtPlan {
    pub priority: i32,
    pub lock: RtLock,
    pub cpu: usize,
}

impl RtPlan {
    /// `None` when real-time mode is off.
    pub fn resolve(args: &RtArgs, runner: &RunnerCfg) -> Option<Self> {
        if !(args.rt || runner.realtime) {
            return None;
        }
        let lock = args.rt_lock.unwrap_or(if runner.lock_memory {
            RtLock::All
        } else {
            RtLock::os_default()
        });
        Some(Self {
            priority: args.rt_prio.unwrap_or(runner.rt_priority),
            lock,
            cpu: args.rt_cpu.or(runner.cpu).unwrap_or(0),
        })
    }
}

#[cfg(unix)]
fn lock_memory(lock: RtLock) -> std::io::Result<()> {
    use libc::{MCL_CURRENT, MCL_FUTURE, mlockall};
    let flags = match lock {
        RtLock::None => return Ok(()),
        RtLock::Current => MCL_CURRENT,
        RtLock::All => MCL_CURRENT | MCL_FUTURE,
    };
    // SAFETY: mlockall only changes paging policy for this process.
    let rc = unsafe { mlockall(flags) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(target_os = "linux")]
fn memlock_limit_hint() -> Option<String> {
    let mut rlim = std::mem::MaybeUninit::<libc::rlimit>::uninit();
    // SAFETY: getrlimit writes a full rlimit on success.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, rlim.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: rc == 0 above.
    let cur = unsafe { rlim.assume_init() }.rlim_cur;
    Some(if cur == libc::RLIM_INFINITY {
        "memlock limit: unlimited".to_string()
    } else {
        format!("memlock limit: {} KiB", cur / 1024)
    })
}

#[cfg(target_os = "linux")]
fn apply_memory_lock(lock: RtLock) {
    let Err(err) = lock_memory(lock) else {
        tracing::info!(?lock, "memory locked");
        return;
    };
    let retryable = matches!(err.raw_os_error(), Some(c) if c == libc::EPERM || c == libc::ENOMEM);
    if lock == RtLock::All && retryable && lock_memory(RtLock::Current).is_ok() {
        tracing::warn!(error = %err, "mlockall(current|future) failed; locked current pages only");
        return;
    }
    let hint = if retryable {
        memlock_limit_hint().unwrap_or_default()
    } else {
        String::new()
    };
    tracing::warn!(
        error = %err,
        hint = %hint,
        "mlockall failed; needs CAP_IPC_LOCK (or root) and a sufficient 'ulimit -l'"
    );
}

/// SCHED_FIFO for the calling thread, priority clamped to the system range.
#[cfg(target_os = "linux")]
fn apply_fifo(priority: i32) -> eyre::Result<i32> {
    use libc::{SCHED_FIFO, sched_get_priority_max, sched_get_priority_min, sched_param};
    // SAFETY: plain queries with a valid policy constant.
    let (min, max) = unsafe { (sched_get_priority_min(SCHED_FIFO), sched_get_priority_max(SCHED_FIFO)) };
    let (min, max) = if min < 0 || max < 0 { (1, 99) } else { (min, max) };
    let param = sched_param {
        sched_priority: priority.clamp(min, max),
    };
    // SAFETY: pid 0 is the calling thread; param outlives the call.
    let rc = unsafe { libc::sched_setscheduler(0, SCHED_FIFO, &param) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) {
            eyre::bail!("{err}; needs CAP_SYS_NICE or root (try 'sudo setcap cap_sys_nice=ep ventctl')");
        }
        return Err(err.into());
    }
    Ok(param.sched_priority)
}

/// Pin the calling thread to `cpu` when the current mask allows it.
#[cfg(target_os = "linux")]
fn apply_affinity(cpu: usize) -> eyre::Result<()> {
    let set_size = std::mem::size_of::<libc::cpu_set_t>();
    if cpu >= set_size * 8 {
        eyre::bail!("CPU {cpu} exceeds cpu_set_t capacity {}", set_size * 8);
    }
    // SAFETY: sysconf has no preconditions.
    let online = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    let online = usize::try_from(online).unwrap_or(0);
    if online == 0 {
        eyre::bail!("no online CPUs reported");
    }
    if cpu >= online {
        eyre::bail!("requested CPU {cpu} >= online {online}");
    }
    // SAFETY: cpu_set_t is plain data; the CPU_* helpers index within its
    // capacity (checked above) and sched_*affinity get the matching size.
    unsafe {
        let mut allowed: libc::cpu_set_t = std::mem::zeroed();
        if libc::sched_getaffinity(0, set_size, &mut allowed) == 0 && !libc::CPU_ISSET(cpu, &allowed) {
            eyre::bail!("CPU {cpu} not permitted by current affinity mask");
        }
        let mut desired: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut desired);
        libc::CPU_SET(cpu, &mut desired);
        if libc::sched_setaffinity(0, set_size, &desired) != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
    }
    Ok(())
}

#[cfg(target_os = "linux")]
pub fn apply_to_current_thread(plan: RtPlan) {
    use std::sync::OnceLock;
    static MEMLOCK_ONCE: OnceLock<()> = OnceLock::new();

    // Memory locking is process-wide; scheduling is per thread.
    MEMLOCK_ONCE.get_or_init(|| apply_memory_lock(plan.lock));
    match apply_fifo(plan.priority) {
        Ok(prio) => tracing::info!(prio, "control thread running SCHED_FIFO"),
        Err(err) => tracing::warn!(error = %err, prio = plan.priority, "SCHED_FIFO not applied"),
    }
    match apply_affinity(plan.cpu) {
        Ok(()) => tracing::info!(cpu = plan.cpu, "control thread pinned"),
        Err(err) => tracing::warn!(error = %err, cpu = plan.cpu, "affinity not applied"),
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn apply_to_current_thread(plan: RtPlan) {
    use std::sync::OnceLock;
    static MEMLOCK_ONCE: OnceLock<()> = OnceLock::new();
    MEMLOCK_ONCE.get_or_init(|| match lock_memory(plan.lock) {
        Ok(()) => tracing::info!(lock = ?plan.lock, "memory locked"),
        Err(err) => tracing::warn!(error = %err, "mlockall failed"),
    });
    tracing::warn!("SCHED_FIFO and affinity are unavailable on this OS; only mlockall applied");
}

#[cfg(not(unix))]
pub fn apply_to_current_thread(plan: RtPlan) {
    tracing::warn!(?plan, "real-time mode is not supported on this OS");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(rt: bool) -> RtArgs {
        RtArgs {
            rt,
            rt_prio: None,
            rt_lock: None,
            rt_cpu: None,
        }
    }

    #[test]
    fn off_unless_requested() {
        assert_eq!(RtPlan::resolve(&args(false), &RunnerCfg::default()), None);
    }

    #[test]
    fn config_enables_and_fills_defaults() {
        let runner = RunnerCfg {
            realtime: true,
            rt_priority: 70,
            lock_memory: true,
            cpu: Some(2),
            ..RunnerCfg::default()
        };
        let plan = RtPlan::resolve(&args(false), &runner).unwrap();
        assert_eq!(
            plan,
            RtPlan {
                priority: 70,
                lock: RtLock::All,
                cpu: 2
            }
        );
    }

    #[test]
    fn flags_override_config() {
        let a = RtArgs {
            rt: true,
            rt_prio: Some(10),
            rt_lock: Some(RtLock::None),
            rt_cpu: Some(1),
        };
        let plan = RtPlan::resolve(&a, &RunnerCfg::default()).unwrap();
        assert_eq!(plan.priority, 10);
        assert_eq!(plan.lock, RtLock::None);
        assert_eq!(plan.cpu, 1);
    }
}
