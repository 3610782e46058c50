//! Periodic reconciliation of configured fan modes against the hardware.
//!
//! The loop never changes a device's mode. It reads the mode document every
//! tick and only remembers, per device, whether it last left the fans under
//! its own control, so that the switch back to Auto restores the driver
//! exactly once.

use std::time::Duration;

use anyhow::Result;
use log::{debug, info, warn};
use tokio::time::{MissedTickBehavior, interval};

use crate::{
    app_context::DaemonContext,
    config::{Mode, device_key},
    fan_curve::Curve,
};

/// Per-device bookkeeping carried across ticks.
#[derive(Debug, Default)]
pub struct Reconciler {
    managed: Vec<bool>,
    visited: Vec<bool>,
    curve: Option<Curve>,
}

impl Reconciler {
    pub fn new(device_count: u32) -> Self {
        let n = device_count as usize;
        Self {
            managed: vec![false; n],
            visited: vec![false; n],
            curve: None,
        }
    }

    /// Whether the fans of `gpu` are currently held by the daemon.
    pub fn is_managed(&self, gpu: u32) -> bool {
        self.managed.get(gpu as usize).copied().unwrap_or(false)
    }

    /// Drops the cached curve so the next curve-mode device re-reads it.
    pub fn invalidate_curve(&mut self) {
        self.curve = None;
    }

    /// Runs one pass over every device.
    pub async fn tick(&mut self, ctx: &DaemonContext) {
        if ctx.flags.take_reload() {
            info!("Reloading fan curve (SIGHUP)");
            self.invalidate_curve();
        }

        let doc = ctx.config.read();

        for gpu in 0..ctx.device_count {
            let idx = gpu as usize;
            if idx >= self.managed.len() {
                break;
            }
            self.visited[idx] = true;

            match doc.mode(&device_key(gpu)) {
                Mode::Auto => {
                    if self.managed[idx] {
                        info!("GPU {gpu}: restoring driver fan control");
                        if let Err(e) = ctx.fans.reset_to_auto(gpu).await {
                            warn!("GPU {gpu}: {e}");
                        }
                        self.managed[idx] = false;
                    }
                }
                Mode::Manual { speed } => {
                    self.push(ctx, gpu, i64::from(speed)).await;
                }
                Mode::Curve => {
                    let temp = match ctx.fans.temperature(gpu).await {
                        Ok(t) => t,
                        Err(e) => {
                            warn!("GPU {gpu}: skipping tick, temperature unavailable: {e}");
                            continue;
                        }
                    };
                    let speed = self.curve(ctx).interpolate(temp);
                    debug!("GPU {gpu}: {temp}°C -> {speed}%");
                    self.push(ctx, gpu, i64::from(speed)).await;
                }
            }
        }
    }

    /// Hands every device seen by the loop back to the driver.
    ///
    /// Returns the number of devices whose restore failed.
    pub async fn restore_all(&mut self, ctx: &DaemonContext) -> u32 {
        let gpus: Vec<u32> = (0..ctx.device_count)
            .filter(|gpu| self.visited.get(*gpu as usize).copied().unwrap_or(false))
            .collect();

        info!("Shutting down, resetting {} GPU(s) to auto", gpus.len());
        let failures = ctx.fans.reset_all(gpus).await;
        self.managed.iter_mut().for_each(|m| *m = false);
        failures
    }

    async fn push(&mut self, ctx: &DaemonContext, gpu: u32, speed: i64) {
        if let Err(e) = ctx.fans.set_gpu_speed(gpu, speed).await {
            warn!("GPU {gpu}: failed to set fan speed: {e}");
        }
        // Even a partial write may have taken the fans out of auto.
        self.managed[gpu as usize] = true;
    }

    fn curve(&mut self, ctx: &DaemonContext) -> &Curve {
        self.curve
            .get_or_insert_with(|| ctx.curves.load().unwrap_or_default())
    }
}

/// Runs the daemon loop until shutdown is requested, then restores every
/// device to driver control.
pub async fn run(ctx: &DaemonContext) -> Result<()> {
    let mut reconciler = Reconciler::new(ctx.device_count);
    let mut ticker = interval(Duration::from_secs(u64::from(ctx.tick_seconds.max(1))));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Reconciling {} GPU(s) every {}s",
        ctx.device_count, ctx.tick_seconds
    );

    loop {
        tokio::select! {
            _instant = ticker.tick() => {}
            () = ctx.flags.wait_for_shutdown() => {}
        }

        if ctx.flags.shutdown_requested() {
            break;
        }
        reconciler.tick(ctx).await;
    }

    let failures = reconciler.restore_all(ctx).await;
    if failures > 0 {
        warn!("{failures} GPU(s) could not be returned to driver control");
    }
    Ok(())
}
