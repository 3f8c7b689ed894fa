//! Best-effort process memory sampling.

use sysinfo::{get_current_pid, Pid, ProcessExt, System, SystemExt};

/// Samples the resident set size of the current process.
///
/// The reading is observational — it reflects the whole process, not the
/// engine's own allocations — and may be unavailable on exotic platforms,
/// in which case sampling quietly yields nothing.
pub(crate) struct MemoryProbe {
    system: System,
    pid: Pid,
}

impl MemoryProbe {
    pub(crate) fn new() -> Option<Self> {
        let pid = get_current_pid().ok()?;
        Some(Self { system: System::new(), pid })
    }

    /// Current RSS in bytes, or `None` when the platform refuses.
    pub(crate) fn sample(&mut self) -> Option<u64> {
        if !self.system.refresh_process(self.pid) {
            return None;
        }
        self.system.process(self.pid).map(|p| p.memory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_reads_a_plausible_rss() {
        let mut probe = MemoryProbe::new().expect("current pid should resolve");
        let rss = probe.sample().expect("own process should be visible");
        // A running test binary occupies at least a few pages.
        assert!(rss > 4096);
    }
}
