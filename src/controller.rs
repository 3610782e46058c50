use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::warn;

use crate::{
    error::DeviceError,
    gpu::{GpuBackend, GpuTelemetry},
};

/// Read-only view of one GPU for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuSnapshot {
    pub index: u32,
    pub name: String,
    pub temperature: Option<i32>,
    pub telemetry: GpuTelemetry,
    /// Per-fan speed in percent; `None` where the read failed.
    pub fan_speeds: Vec<Option<u32>>,
}

/// Fan fan-out over a [`GpuBackend`].
///
/// Every speed pushed through here is clamped to `[min_speed, 100]`.
#[derive(Clone)]
pub struct GpuFans {
    backend: Arc<dyn GpuBackend>,
    min_speed: u32,
}

impl std::fmt::Debug for GpuFans {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuFans")
            .field("min_speed", &self.min_speed)
            .finish_non_exhaustive()
    }
}

impl GpuFans {
    pub fn new(backend: Arc<dyn GpuBackend>, min_speed: u32) -> Self {
        Self {
            backend,
            min_speed: min_speed.min(100),
        }
    }

    pub fn backend(&self) -> &dyn GpuBackend {
        self.backend.as_ref()
    }

    pub fn clamp(&self, speed: i64) -> u32 {
        let clamped = speed.clamp(i64::from(self.min_speed), 100);
        u32::try_from(clamped).unwrap_or(100)
    }

    pub async fn device_count(&self) -> Result<u32, DeviceError> {
        self.backend.device_count().await
    }

    pub async fn temperature(&self, gpu: u32) -> Result<i32, DeviceError> {
        self.backend.temperature(gpu).await
    }

    /// Writes one clamped speed to every fan of `gpu`.
    ///
    /// All fans are attempted; the first failure is returned.
    pub async fn set_gpu_speed(&self, gpu: u32, speed: i64) -> Result<(), DeviceError> {
        let speed = self.clamp(speed);
        let fans = self.backend.fan_count(gpu).await?;
        if fans == 0 {
            return Err(DeviceError::NoFans(gpu));
        }

        stream::iter(0..fans)
            .fold(Ok(()), |acc, fan| async move {
                let res = self.backend.set_fan_speed(gpu, fan, speed).await;
                if let Err(e) = &res {
                    warn!("GPU {gpu} fan {fan}: {e}");
                }
                acc.and(res)
            })
            .await
    }

    /// Sets every GPU to the same speed; returns how many GPUs failed.
    pub async fn set_all(&self, count: u32, speed: i64) -> u32 {
        stream::iter(0..count)
            .fold(0, |failures, gpu| async move {
                match self.set_gpu_speed(gpu, speed).await {
                    Ok(()) => failures,
                    Err(_) => failures + 1,
                }
            })
            .await
    }

    pub async fn reset_to_auto(&self, gpu: u32) -> Result<(), DeviceError> {
        self.backend.restore_auto(gpu).await
    }

    /// Restores driver control on each GPU, attempting all of them.
    pub async fn reset_all(&self, gpus: impl IntoIterator<Item = u32>) -> u32 {
        stream::iter(gpus)
            .fold(0, |failures, gpu| async move {
                match self.reset_to_auto(gpu).await {
                    Ok(()) => failures,
                    Err(e) => {
                        warn!("GPU {gpu}: failed to restore auto fan control: {e}");
                        failures + 1
                    }
                }
            })
            .await
    }

    /// Collects name, temperature, telemetry and fan speeds of one GPU.
    ///
    /// Only a missing name is an error; other fields degrade to `None`.
    pub async fn snapshot(&self, gpu: u32) -> Result<GpuSnapshot, DeviceError> {
        let name = self.backend.name(gpu).await?;
        let temperature = self.backend.temperature(gpu).await.ok();
        let telemetry = self.backend.telemetry(gpu).await.unwrap_or_default();
        let fans = self.backend.fan_count(gpu).await.unwrap_or(0);

        let fan_speeds: Vec<Option<u32>> = stream::iter(0..fans)
            .then(|fan| async move { self.backend.fan_speed(gpu, fan).await.ok() })
            .collect()
            .await;

        Ok(GpuSnapshot {
            index: gpu,
            name,
            temperature,
            telemetry,
            fan_speeds,
        })
    }
}
