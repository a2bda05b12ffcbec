use std::io;

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum AffinityError {
    #[error("failed to get local cpu count: {0}")]
    CpuCount(#[source] io::Error),
    #[error("cpu ({cpu}) out of range (0..{max})")]
    OutOfRange { cpu: usize, max: usize },
    #[error("sched_setaffinity() failed: {0}")]
    SetAffinity(#[source] io::Error),
    #[error("sched_getaffinity() failed: {0}")]
    GetAffinity(#[source] io::Error),
}

fn num_configured_cores() -> Result<usize, AffinityError> {
    let ret = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
    if ret < 0 {
        Err(AffinityError::CpuCount(io::Error::last_os_error()))
    } else {
        Ok(ret as usize)
    }
}

fn pin_to_core(core_id: usize) -> Result<(), AffinityError> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core_id, &mut set);
        let ret = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
        if ret == 0 {
            Ok(())
        } else {
            Err(AffinityError::SetAffinity(io::Error::last_os_error()))
        }
    }
}

/// Number of CPUs the calling thread may run on.
pub fn bound_cpu_count() -> Result<usize, AffinityError> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        let ret = libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set);
        if ret != 0 {
            return Err(AffinityError::GetAffinity(io::Error::last_os_error()));
        }
        Ok(libc::CPU_COUNT(&set) as usize)
    }
}

/// Pin to `cpu` when given; otherwise warn if the process floats over many CPUs.
pub fn check_system(cpu: Option<usize>) -> Result<(), AffinityError> {
    let nr_cpus = num_configured_cores()?;

    let Some(cpu) = cpu else {
        let count = bound_cpu_count()?;
        if count > 2 {
            warn!(
                "CPU affinity is not set (bound to {} cpus). Performance may be impacted.",
                count
            );
        }
        return Ok(());
    };

    if cpu >= nr_cpus {
        return Err(AffinityError::OutOfRange {
            cpu,
            max: nr_cpus.saturating_sub(1),
        });
    }
    pin_to_core(cpu)?;
    info!("pinned to cpu {}", cpu);
    Ok(())
}
