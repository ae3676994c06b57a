//! Compute device selection
//!
//! Detection runs once at construction; the result is immutable for the
//! process lifetime. Built in `main` and injected into the stages that
//! load models, rather than living behind a process-wide global.

use candle_core::Device;

/// Kind of compute backing model inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cuda,
    Cpu,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Cuda => write!(f, "cuda"),
            DeviceKind::Cpu => write!(f, "cpu"),
        }
    }
}

/// One-shot device probe shared by all model loaders
pub struct DeviceSelector {
    kind: DeviceKind,
    device: Device,
}

impl DeviceSelector {
    /// Probe for accelerated compute, falling back to CPU.
    ///
    /// No failure mode: a CUDA probe error selects the CPU.
    pub fn detect() -> Self {
        let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);
        let kind = if device.is_cuda() {
            DeviceKind::Cuda
        } else {
            DeviceKind::Cpu
        };
        tracing::info!(device = %kind, "Compute device selected");
        Self { kind, device }
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn is_cuda(&self) -> bool {
        self.kind == DeviceKind::Cuda
    }

    /// Candle device handle for tensor placement
    pub fn candle_device(&self) -> &Device {
        &self.device
    }
}
