//! Process and system load snapshot for the `status` endpoint.

use hoard_proto::{CpuStatus, LoadStatus, MemoryStatus, ProcessStatus, SystemStatus};
use sysinfo::{ProcessesToUpdate, System};

/// Sample this process and the host it runs on.
///
/// Values are best-effort: a first sample reports zero CPU (usage needs two
/// observations) and platforms without load averages report zeroes.
#[must_use]
pub fn snapshot() -> (ProcessStatus, SystemStatus) {
    let mut system = System::new();
    system.refresh_memory();
    let process = sysinfo::get_current_pid().ok().and_then(|pid| {
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(|process| {
            let total_memory = system.total_memory();
            let rss = process.memory();
            ProcessStatus {
                cpu: CpuStatus { percent: f64::from(process.cpu_usage()) / 100.0 },
                memory: MemoryStatus {
                    percent: if total_memory == 0 { 0.0 } else { rss as f64 / total_memory as f64 },
                    rss,
                },
                threads: process.tasks().map_or(1, |tasks| tasks.len()),
            }
        })
    });
    let process = process.unwrap_or(ProcessStatus {
        cpu: CpuStatus { percent: 0.0 },
        memory: MemoryStatus { percent: 0.0, rss: 0 },
        threads: 0,
    });
    let load = System::load_average();
    let system = SystemStatus {
        load: LoadStatus { t1: load.one, t5: load.five, t15: load.fifteen },
    };
    (process, system)
}
