//! Application entry point and builder pattern implementation.

use std::{
    io::{BufRead, Write},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use log::{info, warn};

use crate::{
    app_context::{DaemonContext, SignalListener},
    cli::{Command, CurveAction},
    config::{ConfigStore, Mode, device_key},
    console::{Console, render_curve_table, render_gpu_line, render_status},
    controller::GpuFans,
    drivers::nvidia::NvidiaCli,
    fan_curve::{CurveStore, Upsert},
    gpu::GpuBackend,
    reconciler,
    settings::Settings,
};

/// One invocation of the program: settings, stores and the GPU backend.
///
/// # Example
///
/// ```no_run
/// use nvfand::{application::Application, cli::Command, settings::Settings};
///
/// # async fn example() -> anyhow::Result<()> {
/// let app = Application::builder()
///     .with_settings(Settings::load(None)?)
///     .build()?;
///
/// let stdin = std::io::stdin();
/// app.run(Command::Status, stdin.lock(), &mut std::io::stdout()).await?;
/// # Ok(())
/// # }
/// ```
pub struct Application {
    settings: Settings,
    fans: GpuFans,
    config: ConfigStore,
    curves: CurveStore,
}

impl Application {
    /// Creates a new ApplicationBuilder for constructing Application instances.
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Carries over files from older releases, then executes `command`.
    ///
    /// Interactive commands read from `input`; all user-facing output goes
    /// to `out`.
    pub async fn run<R: BufRead, W: Write>(
        &self,
        command: Command,
        input: R,
        out: &mut W,
    ) -> Result<()> {
        self.migrate();

        match command {
            Command::Daemon { .. } => self.daemon().await,
            Command::Set { speed, gpu } => self.set_speed(speed, gpu, out).await,
            Command::Auto => self.auto(out).await,
            Command::Curve { action } => self.curve(action, input, out).await,
            Command::List => self.list(out).await,
            Command::Status => self.status(out).await,
            Command::Console => {
                let count = self.device_count().await?;
                Console::dashboard(
                    self.fans.clone(),
                    self.config.clone(),
                    self.curves.clone(),
                    count,
                )
                .run(input, out)
                .await
            }
        }
    }

    fn migrate(&self) {
        match self
            .config
            .migrate_legacy(&self.settings.legacy_paths(), &self.curves)
        {
            Ok(report) if report.config_migrated || report.curve_migrated => {
                info!("Legacy files migrated: {report:?}");
            }
            Ok(_) => {}
            Err(e) => warn!("Legacy migration failed: {e}"),
        }
    }

    async fn device_count(&self) -> Result<u32> {
        self.fans
            .device_count()
            .await
            .context("Failed to enumerate GPUs")
    }

    async fn daemon(&self) -> Result<()> {
        let ctx = DaemonContext::new(&self.settings, self.fans.clone()).await?;
        let signals = SignalListener::new()?;

        for gpu in 0..ctx.device_count {
            if let Err(e) = self.fans.backend().enable_persistence(gpu).await {
                warn!("GPU {gpu}: failed to enable persistence mode: {e}");
            }
        }

        info!("nvfand {} started", env!("CARGO_PKG_VERSION"));
        let ((), res) = tokio::join!(signals.forward(ctx.flags.clone()), reconciler::run(&ctx));
        res?;
        info!("nvfand stopped");
        Ok(())
    }

    async fn set_speed<W: Write>(&self, speed: u32, gpu: Option<u32>, out: &mut W) -> Result<()> {
        let count = self.device_count().await?;
        let mode = Mode::Manual { speed };

        let targets: Vec<u32> = match gpu {
            Some(g) if g < count => vec![g],
            Some(g) => bail!("Invalid GPU index {g}. Use 'nvfand list' to see available GPUs."),
            None => (0..count).collect(),
        };

        self.config
            .write_modes(targets.iter().map(|&g| (device_key(g), mode)))
            .context("Failed to save fan mode")?;

        for &g in &targets {
            if let Err(e) = self.fans.set_gpu_speed(g, i64::from(speed)).await {
                writeln!(out, "GPU {g}: {e}")?;
            }
        }

        match gpu {
            Some(g) => writeln!(out, "GPU {g} set to fixed speed {speed}%.")?,
            None => writeln!(out, "All GPUs set to fixed speed {speed}%.")?,
        }
        Ok(())
    }

    async fn auto<W: Write>(&self, out: &mut W) -> Result<()> {
        let count = self.device_count().await?;

        self.config
            .write_modes((0..count).map(|g| (device_key(g), Mode::Auto)))
            .context("Failed to save fan mode")?;

        let failures = self.fans.reset_all(0..count).await;
        if failures > 0 {
            writeln!(out, "{failures} GPU(s) could not be reset.")?;
        }
        writeln!(out, "All GPU fans set to auto (driver-controlled).")?;
        Ok(())
    }

    async fn curve<R: BufRead, W: Write>(
        &self,
        action: CurveAction,
        input: R,
        out: &mut W,
    ) -> Result<()> {
        match action {
            CurveAction::Enable => {
                let count = self.device_count().await?;
                self.config
                    .write_modes((0..count).map(|g| (device_key(g), Mode::Curve)))
                    .context("Failed to save fan mode")?;
                writeln!(out, "All GPUs set to curve mode.")?;
            }
            CurveAction::Set { temp, speed } => {
                let verb = match self.curves.upsert_point(temp, speed)? {
                    Upsert::Inserted => "added",
                    Upsert::Updated => "updated",
                };
                writeln!(out, "Curve point {temp}°C -> {speed}% {verb}.")?;
            }
            CurveAction::Show => match self.curves.load() {
                Some(curve) if !curve.is_empty() => write!(out, "{}", render_curve_table(&curve))?,
                _ => writeln!(out, "No fan curve set; the builtin default curve is in use.")?,
            },
            CurveAction::Reset => {
                self.curves.reset().context("Failed to reset fan curve")?;
                writeln!(out, "Fan curve reset to the preset.")?;
            }
            CurveAction::Edit => {
                Console::editor(self.config.clone(), self.curves.clone())
                    .run(input, out)
                    .await?;
            }
        }
        Ok(())
    }

    async fn list<W: Write>(&self, out: &mut W) -> Result<()> {
        let count = self.device_count().await?;
        writeln!(out, "Detected {count} GPU{}", if count == 1 { "" } else { "s" })?;

        for gpu in 0..count {
            match self.fans.snapshot(gpu).await {
                Ok(snapshot) => writeln!(out, "{}", render_gpu_line(&snapshot))?,
                Err(e) => writeln!(out, "  GPU {gpu}: {e}")?,
            }
        }
        Ok(())
    }

    async fn status<W: Write>(&self, out: &mut W) -> Result<()> {
        let count = self.device_count().await?;
        let doc = self.config.read();

        for gpu in 0..count {
            match self.fans.snapshot(gpu).await {
                Ok(snapshot) => write!(
                    out,
                    "{}",
                    render_status(&snapshot, doc.mode(&device_key(gpu)))
                )?,
                Err(e) => writeln!(out, "GPU {gpu}: {e}")?,
            }
        }
        Ok(())
    }
}

/// Builder pattern for creating Application instances.
pub struct ApplicationBuilder {
    settings: Option<Settings>,
    backend: Option<Arc<dyn GpuBackend>>,
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self {
            settings: None,
            backend: None,
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Overrides the GPU backend; [`NvidiaCli`] is used otherwise.
    pub fn with_backend(mut self, backend: Arc<dyn GpuBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Builds the Application instance with the provided configuration.
    pub fn build(self) -> Result<Application> {
        let settings = self
            .settings
            .ok_or_else(|| anyhow::anyhow!("Settings are required"))?;
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(NvidiaCli::new()));

        Ok(Application {
            fans: GpuFans::new(backend, u32::from(settings.min_fan_speed)),
            config: ConfigStore::new(settings.config_path()),
            curves: CurveStore::new(settings.curve_path()),
            settings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fan_curve::{Curve, CurvePoint},
        gpu::{GpuTelemetry, MockGpuBackend},
    };
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use std::{fs, io::Cursor};
    use tempfile::{TempDir, tempdir};

    fn settings(dir: &TempDir) -> Settings {
        Settings {
            config_dir: dir.path().join("nvfand"),
            legacy_config_file: dir.path().join("legacy.conf"),
            legacy_curve_file: dir.path().join("legacy_curve.json"),
            ..Settings::default()
        }
    }

    fn app(dir: &TempDir, mock: MockGpuBackend) -> Application {
        Application::builder()
            .with_settings(settings(dir))
            .with_backend(Arc::new(mock))
            .build()
            .unwrap()
    }

    async fn run(app: &Application, command: Command) -> Result<String> {
        let mut out = Vec::new();
        app.run(command, Cursor::new(String::new()), &mut out).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    fn two_gpus() -> MockGpuBackend {
        let mut mock = MockGpuBackend::new();
        mock.expect_device_count().returning(|| Ok(2));
        mock
    }

    #[test]
    fn build_requires_settings() {
        assert!(Application::builder().build().is_err());
    }

    #[tokio::test]
    async fn set_single_gpu_writes_and_applies() {
        let dir = tempdir().unwrap();
        let mut mock = two_gpus();
        mock.expect_fan_count().with(eq(1)).returning(|_| Ok(2));
        mock.expect_set_fan_speed()
            .withf(|gpu, _, speed| *gpu == 1 && *speed == 80)
            .times(2)
            .returning(|_, _, _| Ok(()));
        let app = app(&dir, mock);

        let out = run(
            &app,
            Command::Set {
                speed: 80,
                gpu: Some(1),
            },
        )
        .await
        .unwrap();

        assert_eq!(out, "GPU 1 set to fixed speed 80%.\n");
        let doc = app.config.read();
        assert_eq!(doc.mode("gpu1"), Mode::Manual { speed: 80 });
        assert_eq!(doc.mode("gpu0"), Mode::Auto);
    }

    #[tokio::test]
    async fn set_rejects_unknown_gpu() {
        let dir = tempdir().unwrap();
        let app = app(&dir, two_gpus());

        let res = run(
            &app,
            Command::Set {
                speed: 50,
                gpu: Some(2),
            },
        )
        .await;

        assert!(res.is_err());
        assert!(app.config.read().is_empty());
    }

    #[tokio::test]
    async fn auto_resets_every_gpu() {
        let dir = tempdir().unwrap();
        let mut mock = two_gpus();
        mock.expect_restore_auto().times(2).returning(|_| Ok(()));
        let app = app(&dir, mock);
        app.config.write_mode("gpu0", Mode::Curve).unwrap();

        let out = run(&app, Command::Auto).await.unwrap();

        assert_eq!(out, "All GPU fans set to auto (driver-controlled).\n");
        assert_eq!(app.config.read().mode("gpu0"), Mode::Auto);
    }

    #[tokio::test]
    async fn curve_enable_does_not_touch_fans() {
        let dir = tempdir().unwrap();
        let app = app(&dir, two_gpus());

        run(
            &app,
            Command::Curve {
                action: CurveAction::Enable,
            },
        )
        .await
        .unwrap();

        let doc = app.config.read();
        assert_eq!(doc.mode("gpu0"), Mode::Curve);
        assert_eq!(doc.mode("gpu1"), Mode::Curve);
    }

    #[tokio::test]
    async fn curve_set_then_show() {
        let dir = tempdir().unwrap();
        let app = app(&dir, MockGpuBackend::new());

        let added = run(
            &app,
            Command::Curve {
                action: CurveAction::Set { temp: 55, speed: 60 },
            },
        )
        .await
        .unwrap();
        let updated = run(
            &app,
            Command::Curve {
                action: CurveAction::Set { temp: 55, speed: 65 },
            },
        )
        .await
        .unwrap();
        let shown = run(
            &app,
            Command::Curve {
                action: CurveAction::Show,
            },
        )
        .await
        .unwrap();

        assert_eq!(added, "Curve point 55°C -> 60% added.\n");
        assert_eq!(updated, "Curve point 55°C -> 65% updated.\n");
        assert!(shown.contains("|     55 °C    |     65 %        |"));
    }

    #[tokio::test]
    async fn curve_show_without_curve() {
        let dir = tempdir().unwrap();
        let app = app(&dir, MockGpuBackend::new());

        let out = run(
            &app,
            Command::Curve {
                action: CurveAction::Show,
            },
        )
        .await
        .unwrap();

        assert!(out.contains("builtin default"));
    }

    #[tokio::test]
    async fn curve_reset_writes_preset() {
        let dir = tempdir().unwrap();
        let app = app(&dir, MockGpuBackend::new());

        run(
            &app,
            Command::Curve {
                action: CurveAction::Reset,
            },
        )
        .await
        .unwrap();

        assert_eq!(app.curves.load(), Some(Curve::preset()));
    }

    #[tokio::test]
    async fn legacy_files_migrated_before_command() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("legacy.conf"), "65\n").unwrap();
        fs::write(dir.path().join("legacy_curve.json"), r#"{"40": 45, "70": 90}"#).unwrap();
        let app = app(&dir, MockGpuBackend::new());

        run(
            &app,
            Command::Curve {
                action: CurveAction::Show,
            },
        )
        .await
        .unwrap();

        assert_eq!(app.config.read().mode("gpu0"), Mode::Manual { speed: 65 });
        assert_eq!(
            app.curves.load(),
            Some(Curve::from_points([(40, 45), (70, 90)].map(CurvePoint::from)))
        );
    }

    #[tokio::test]
    async fn list_and_status() {
        let dir = tempdir().unwrap();
        let mut mock = MockGpuBackend::new();
        mock.expect_device_count().returning(|| Ok(1));
        mock.expect_name().returning(|_| Ok("RTX 4080".into()));
        mock.expect_temperature().returning(|_| Ok(48));
        mock.expect_telemetry()
            .returning(|_| Ok(GpuTelemetry::default()));
        mock.expect_fan_count().returning(|_| Ok(1));
        mock.expect_fan_speed().returning(|_, _| Ok(35));
        let app = app(&dir, mock);

        let list = run(&app, Command::List).await.unwrap();
        let status = run(&app, Command::Status).await.unwrap();

        assert_eq!(list, "Detected 1 GPU\n  GPU 0: RTX 4080 (1 fan)\n");
        assert!(status.contains("Mode: Auto (driver-controlled)"));
        assert!(status.contains("Temperature: 48°C"));
        assert!(status.contains("Fan 0: 35%"));
    }
}
