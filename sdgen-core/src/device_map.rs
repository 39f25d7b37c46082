use candle_core::{DType, Device};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceMap {
    ForceCpu,
    Ordinal(usize),
}

impl DeviceMap {
    pub fn from_cpu_flag(cpu: bool) -> Self {
        if cpu {
            Self::ForceCpu
        } else {
            Self::default()
        }
    }
}

impl Default for DeviceMap {
    fn default() -> Self {
        Self::Ordinal(0)
    }
}

/// Numeric precision the weights and activations are kept in.
///
/// Half precision is only picked on an accelerator: CPU kernels for f16 are
/// either missing or slower than f32.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precision {
    Half,
    Full,
}

impl Precision {
    pub fn for_device(device: &Device, force_f32: bool) -> Self {
        if !force_f32 && (device.is_cuda() || device.is_metal()) {
            Self::Half
        } else {
            Self::Full
        }
    }

    pub fn dtype(self) -> DType {
        match self {
            Self::Half => DType::F16,
            Self::Full => DType::F32,
        }
    }

    /// Suffix of the hub weight files published for this precision.
    pub fn weight_suffix(self) -> &'static str {
        match self {
            Self::Half => ".fp16.safetensors",
            Self::Full => ".safetensors",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_flag_forces_cpu() {
        assert_eq!(DeviceMap::from_cpu_flag(true), DeviceMap::ForceCpu);
        assert_eq!(DeviceMap::from_cpu_flag(false), DeviceMap::Ordinal(0));
    }

    #[test]
    fn cpu_never_runs_in_half_precision() {
        assert_eq!(Precision::for_device(&Device::Cpu, false), Precision::Full);
        assert_eq!(Precision::for_device(&Device::Cpu, true), Precision::Full);
        assert_eq!(Precision::Full.dtype(), DType::F32);
    }

    #[test]
    fn half_precision_uses_fp16_weights() {
        assert_eq!(Precision::Half.dtype(), DType::F16);
        assert_eq!(Precision::Half.weight_suffix(), ".fp16.safetensors");
        assert_eq!(Precision::Full.weight_suffix(), ".safetensors");
    }
}
