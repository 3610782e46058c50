//! GPU device abstraction.
//!
//! [`GpuBackend`] is the seam between fan policy and the vendor tooling that
//! actually reads sensors and drives fans. Devices are addressed by index,
//! fans by index within their device.

use async_trait::async_trait;

use crate::error::DeviceError;

/// Live load figures of one GPU. Every field is optional since boards
/// differ in what they report.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GpuTelemetry {
    /// Core utilization in percent.
    pub utilization: Option<u32>,
    pub memory_used_mib: Option<u64>,
    pub memory_total_mib: Option<u64>,
    pub power_watts: Option<f32>,
    pub power_limit_watts: Option<f32>,
}

/// Backend for GPU telemetry and fan control.
///
/// # Example
///
/// ```no_run
/// use nvfand::{error::DeviceError, gpu::{GpuBackend, GpuTelemetry}};
///
/// #[derive(Debug)]
/// struct Passive;
///
/// #[async_trait::async_trait]
/// impl GpuBackend for Passive {
///     async fn device_count(&self) -> Result<u32, DeviceError> { Ok(1) }
///     async fn name(&self, _gpu: u32) -> Result<String, DeviceError> { Ok("Passive".into()) }
///     async fn temperature(&self, _gpu: u32) -> Result<i32, DeviceError> { Ok(40) }
///     async fn telemetry(&self, _gpu: u32) -> Result<GpuTelemetry, DeviceError> { Ok(GpuTelemetry::default()) }
///     async fn fan_count(&self, _gpu: u32) -> Result<u32, DeviceError> { Ok(0) }
///     async fn fan_speed(&self, _gpu: u32, _fan: u32) -> Result<u32, DeviceError> { Ok(0) }
///     async fn set_fan_speed(&self, _gpu: u32, _fan: u32, _speed: u32) -> Result<(), DeviceError> { Ok(()) }
///     async fn restore_auto(&self, _gpu: u32) -> Result<(), DeviceError> { Ok(()) }
///     async fn enable_persistence(&self, _gpu: u32) -> Result<(), DeviceError> { Ok(()) }
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GpuBackend: Send + Sync {
    /// Number of GPUs visible to the backend.
    async fn device_count(&self) -> Result<u32, DeviceError>;

    /// Marketing name of a GPU.
    async fn name(&self, gpu: u32) -> Result<String, DeviceError>;

    /// Core temperature in degrees Celsius.
    async fn temperature(&self, gpu: u32) -> Result<i32, DeviceError>;

    async fn telemetry(&self, gpu: u32) -> Result<GpuTelemetry, DeviceError>;

    /// Number of fans attached to a GPU.
    async fn fan_count(&self, gpu: u32) -> Result<u32, DeviceError>;

    /// Current speed of one fan in percent.
    async fn fan_speed(&self, gpu: u32, fan: u32) -> Result<u32, DeviceError>;

    /// Takes manual control of one fan and sets its speed in percent.
    async fn set_fan_speed(&self, gpu: u32, fan: u32, speed: u32) -> Result<(), DeviceError>;

    /// Hands every fan of a GPU back to the driver's automatic policy.
    async fn restore_auto(&self, gpu: u32) -> Result<(), DeviceError>;

    /// Keeps the driver loaded between clients so that fan settings stick.
    async fn enable_persistence(&self, gpu: u32) -> Result<(), DeviceError>;
}
