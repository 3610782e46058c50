//! Daemon-wide context handed to the reconciliation loop.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use log::info;
use tokio::{
    signal::unix::{Signal, SignalKind, signal},
    sync::Notify,
};

use crate::{config::ConfigStore, controller::GpuFans, fan_curve::CurveStore, settings::Settings};

/// Cooperative stop and reload requests.
///
/// The reload request is polled once per tick. Shutdown also wakes every
/// [`wait_for_shutdown`](Self::wait_for_shutdown) caller at once.
#[derive(Debug, Clone, Default)]
pub struct ControlFlags {
    shutdown: Arc<AtomicBool>,
    reload: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl ControlFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been requested.
    pub async fn wait_for_shutdown(&self) {
        loop {
            // Registered before the check so a request in between is not lost.
            let notified = self.wake.notified();
            if self.shutdown_requested() {
                return;
            }
            notified.await;
        }
    }

    pub fn request_reload(&self) {
        self.reload.store(true, Ordering::SeqCst);
    }

    /// Returns whether a reload was requested and clears the request.
    pub fn take_reload(&self) -> bool {
        self.reload.swap(false, Ordering::SeqCst)
    }
}

/// SIGTERM, SIGINT and SIGHUP streams of the daemon.
#[derive(Debug)]
pub struct SignalListener {
    terminate: Signal,
    interrupt: Signal,
    hangup: Signal,
}

impl SignalListener {
    /// Installs the handlers. Must be called from within the runtime.
    pub fn new() -> Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?,
            interrupt: signal(SignalKind::interrupt()).context("Failed to listen for SIGINT")?,
            hangup: signal(SignalKind::hangup()).context("Failed to listen for SIGHUP")?,
        })
    }

    /// Turns SIGTERM and SIGINT into a shutdown request and SIGHUP into a
    /// reload request. Returns once shutdown has been requested.
    pub async fn forward(mut self, flags: ControlFlags) {
        loop {
            tokio::select! {
                _ = self.terminate.recv() => {
                    info!("Received SIGTERM, shutting down");
                    flags.request_shutdown();
                }
                _ = self.interrupt.recv() => {
                    info!("Received SIGINT, shutting down");
                    flags.request_shutdown();
                }
                _ = self.hangup.recv() => {
                    info!("Received SIGHUP, reload requested");
                    flags.request_reload();
                }
                () = flags.wait_for_shutdown() => return,
            }
        }
    }
}

/// Everything the daemon needs for one run.
#[derive(Debug, Clone)]
pub struct DaemonContext {
    pub fans: GpuFans,
    pub config: ConfigStore,
    pub curves: CurveStore,
    pub device_count: u32,
    pub tick_seconds: u16,
    pub flags: ControlFlags,
}

impl DaemonContext {
    /// Builds the stores from `settings` and queries the device count once.
    pub async fn new(settings: &Settings, fans: GpuFans) -> Result<Self> {
        let device_count = fans
            .device_count()
            .await
            .context("Failed to enumerate GPUs")?;

        Ok(Self {
            fans,
            config: ConfigStore::new(settings.config_path()),
            curves: CurveStore::new(settings.curve_path()),
            device_count,
            tick_seconds: settings.tick_seconds,
            flags: ControlFlags::new(),
        })
    }
}
