use std::fmt;

/// Compute target for matrix kernels.
///
/// There is no GPU backend; "accelerated" means the row-parallel rayon
/// kernels in `Matrix::matmul`, which only pay off with more than one
/// hardware thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Accelerated,
    Cpu,
}

impl Device {
    /// Capability probe: prefers `Accelerated` when the host exposes more
    /// than one hardware thread.
    pub fn detect() -> Device {
        Device::from_parallelism(
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        )
    }

    pub fn from_parallelism(threads: usize) -> Device {
        if threads > 1 { Device::Accelerated } else { Device::Cpu }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Accelerated => write!(f, "accelerated ({} threads)", rayon::current_num_threads()),
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_thread_falls_back_to_cpu() {
        assert_eq!(Device::from_parallelism(1), Device::Cpu);
        assert_eq!(Device::from_parallelism(0), Device::Cpu);
        assert_eq!(Device::from_parallelism(8), Device::Accelerated);
    }
}
