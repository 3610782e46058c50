//! # nvfand
//!
//! A Linux daemon and command-line tool driving GPU fans from a per-device
//! policy.
//!
//! ## Features
//!
//! - **Modes**: leave fans to the driver, pin them at a fixed speed, or
//!   follow a temperature curve, chosen per GPU
//! - **Fan Curves**: up to 20 points, linear interpolation, builtin default
//! - **Reconciliation**: periodic loop that only touches hardware it owns and
//!   hands every fan back to the driver on shutdown
//! - **Crash-safe Storage**: JSON files replaced atomically
//! - **Interactive Console**: dashboard and curve editor over stdin
//!
//! ## Architecture
//!
//! - [`ConfigStore`](config::ConfigStore) and
//!   [`CurveStore`](fan_curve::CurveStore) - persisted state
//! - [`GpuBackend`](gpu::GpuBackend) - device seam, implemented by
//!   [`NvidiaCli`](drivers::nvidia::NvidiaCli)
//! - [`reconciler::run`] - the daemon loop over a
//!   [`DaemonContext`](app_context::DaemonContext)
//! - [`Console`](console::Console) - line-command session
//!
//! ## Example
//!
//! ```no_run
//! use nvfand::{application::Application, cli::Command, settings::Settings};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let stdin = std::io::stdin();
//!     Application::builder()
//!         .with_settings(Settings::load(None)?)
//!         .build()?
//!         .run(Command::Daemon { daemonize: false }, stdin.lock(), &mut std::io::stdout())
//!         .await
//! }
//! ```

pub mod app_context;
pub mod application;
pub mod cli;
pub mod config;
pub mod console;
pub mod controller;
pub mod curve_editor;
pub mod drivers;
pub mod error;
pub mod fan_curve;
pub mod gpu;
pub mod reconciler;
pub mod session;
pub mod settings;
pub mod storage;
