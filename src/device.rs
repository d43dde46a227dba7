use candle_core::Device;
use tracing::{info, warn};

use crate::error::Result;

/// Picks the accelerator compiled in, falling back to CPU when it is
/// unavailable or `force_cpu` is set.
pub fn select_device(force_cpu: bool) -> Result<Device> {
    if force_cpu {
        info!("CPU forced on the command line");
        return Ok(Device::Cpu);
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => return Ok(device),
            Err(e) => warn!("CUDA not available: {}, falling back to CPU", e),
        }
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => return Ok(device),
            Err(e) => warn!("Metal not available: {}, falling back to CPU", e),
        }
    }

    #[cfg(not(any(feature = "cuda", feature = "metal")))]
    warn!("Built without GPU support, running on CPU");

    Ok(Device::Cpu)
}

pub fn device_name(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_cpu() {
        let device = select_device(true).unwrap();
        assert_eq!(device_name(&device), "cpu");
    }
}
