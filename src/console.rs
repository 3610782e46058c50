//! Line-oriented interactive console.
//!
//! Reads one command per line and dispatches it to the screen on top of the
//! [`ScreenStack`]. The dashboard changes per-GPU modes (written through and
//! applied at once); the editor works on a [`EditorSession`] and only
//! touches disk on `save`.

use std::{
    fmt::Write as _,
    io::{BufRead, Write},
};

use anyhow::Result;
use log::warn;

use crate::{
    config::{ConfigStore, Mode, device_key},
    controller::{GpuFans, GpuSnapshot},
    error::EditError,
    fan_curve::{Curve, CurveStore, SPEED_MAX, SPEED_MIN},
    session::{DashboardSession, EditorSession, Screen, ScreenStack, cycle_mode},
};

const DASHBOARD_HELP: &str = "\
Dashboard commands:
  status              show all GPUs
  select <N>          select GPU N
  auto                return the selected GPU to driver control
  manual <SPEED>      pin the selected GPU at SPEED% (30-100)
  curve               drive the selected GPU from the fan curve
  cycle               auto -> manual -> curve -> auto
  up | down           change a manual speed by 5%
  all auto|curve      set every GPU
  all manual <SPEED>  pin every GPU
  edit                open the curve editor (curve mode only)
  quit                leave, keeping changes
  discard             leave, restoring the modes found on entry";

const EDITOR_HELP: &str = "\
Editor commands:
  show                print the curve
  next | prev         select another point
  add | del           add a point after the selection, delete the selection
  left | right        move the selected point by 5°C
  up | down           change the selected speed by 5%
  temp <N>            set the selected temperature
  speed <N>           set the selected speed (30-100)
  reset               replace the curve with the preset
  save                save and leave
  quit                leave (refused with unsaved changes)
  discard             leave without saving";

enum Flow {
    Stay,
    Enter(Screen),
    Leave,
}

/// Interactive session over a reader and a writer.
///
/// # Example
///
/// ```no_run
/// use nvfand::{config::ConfigStore, console::Console, fan_curve::CurveStore};
///
/// # async fn example() -> anyhow::Result<()> {
/// let mut console = Console::editor(ConfigStore::new("config.json"), CurveStore::new("curve.json"));
/// let stdin = std::io::stdin();
/// console.run(stdin.lock(), &mut std::io::stdout()).await?;
/// # Ok(())
/// # }
/// ```
pub struct Console {
    config: ConfigStore,
    curves: CurveStore,
    fans: Option<GpuFans>,
    screens: ScreenStack,
    dashboard: DashboardSession,
    editor: Option<EditorSession>,
}

impl Console {
    /// Console starting on the dashboard.
    pub fn dashboard(
        fans: GpuFans,
        config: ConfigStore,
        curves: CurveStore,
        device_count: u32,
    ) -> Self {
        let doc = config.read();
        let initial = (0..device_count)
            .map(|gpu| doc.mode(&device_key(gpu)))
            .collect();

        Self {
            config,
            curves,
            fans: Some(fans),
            screens: ScreenStack::new(Screen::Dashboard),
            dashboard: DashboardSession::new(initial),
            editor: None,
        }
    }

    /// Console consisting of the curve editor alone.
    pub fn editor(config: ConfigStore, curves: CurveStore) -> Self {
        let editor = EditorSession::open(&curves);
        Self {
            config,
            curves,
            fans: None,
            screens: ScreenStack::new(Screen::Editor),
            dashboard: DashboardSession::new(Vec::new()),
            editor: Some(editor),
        }
    }

    /// Processes commands until the last screen is left or input ends.
    ///
    /// End of input leaves every screen; unsaved editor changes are dropped.
    pub async fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<()> {
        self.show_current(out).await?;
        let mut lines = input.lines();

        while let Some(screen) = self.screens.current() {
            write!(out, "{}", prompt(screen))?;
            out.flush()?;

            let Some(line) = lines.next().transpose()? else {
                writeln!(out)?;
                if self.editor.as_ref().is_some_and(EditorSession::is_dirty) {
                    writeln!(out, "Unsaved curve changes discarded.")?;
                }
                break;
            };
            let words: Vec<&str> = line.split_whitespace().collect();
            if words.is_empty() {
                continue;
            }

            let flow = match screen {
                Screen::Dashboard => self.dashboard_command(&words, out).await?,
                Screen::Editor => self.editor_command(&words, out)?,
            };

            match flow {
                Flow::Stay => {}
                Flow::Enter(next) => {
                    if next == Screen::Editor {
                        self.editor = Some(EditorSession::open(&self.curves));
                    }
                    self.screens.enter(next);
                    self.show_current(out).await?;
                }
                Flow::Leave => {
                    if screen == Screen::Editor {
                        self.editor = None;
                    }
                    if self.screens.leave().is_some() {
                        self.show_current(out).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn show_current<W: Write>(&mut self, out: &mut W) -> Result<()> {
        match self.screens.current() {
            Some(Screen::Dashboard) => self.print_status(out).await,
            Some(Screen::Editor) => {
                if let Some(editor) = &self.editor {
                    write!(out, "{}", render_editor(editor))?;
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn dashboard_command<W: Write>(&mut self, words: &[&str], out: &mut W) -> Result<Flow> {
        let gpu = self.dashboard.selected();
        let current = self.config.read().mode(&device_key(gpu));

        match words {
            ["status"] => self.print_status(out).await?,
            ["select", n] => match n.parse::<u32>() {
                Ok(n) if self.dashboard.select(n) => writeln!(out, "GPU {n} selected.")?,
                _ => writeln!(
                    out,
                    "No such GPU: {n} ({} detected).",
                    self.dashboard.device_count()
                )?,
            },
            ["auto"] => self.apply_mode(gpu, Mode::Auto, out).await?,
            ["curve"] => self.apply_mode(gpu, Mode::Curve, out).await?,
            ["manual", n] => match parse_manual_speed(n) {
                Some(speed) => self.apply_mode(gpu, Mode::Manual { speed }, out).await?,
                None => writeln!(out, "Speed must be {SPEED_MIN}-{SPEED_MAX}.")?,
            },
            ["cycle"] => self.apply_mode(gpu, cycle_mode(current), out).await?,
            [dir @ ("up" | "down")] => match current {
                Mode::Manual { speed } => {
                    let speed = if *dir == "up" {
                        speed.saturating_add(5)
                    } else {
                        speed.saturating_sub(5)
                    };
                    let speed = speed.clamp(SPEED_MIN as u32, SPEED_MAX as u32);
                    self.apply_mode(gpu, Mode::Manual { speed }, out).await?;
                }
                _ => writeln!(out, "GPU {gpu} is not in manual mode.")?,
            },
            ["all", rest @ ..] => {
                let mode = match rest {
                    ["auto"] => Some(Mode::Auto),
                    ["curve"] => Some(Mode::Curve),
                    ["manual", n] => parse_manual_speed(n).map(|speed| Mode::Manual { speed }),
                    _ => None,
                };
                match mode {
                    Some(mode) => {
                        for gpu in 0..self.dashboard.device_count() {
                            self.apply_mode(gpu, mode, out).await?;
                        }
                    }
                    None => writeln!(out, "Usage: all auto | all curve | all manual <30-100>")?,
                }
            }
            ["edit"] => {
                if current == Mode::Curve {
                    return Ok(Flow::Enter(Screen::Editor));
                }
                writeln!(out, "GPU {gpu} is not in curve mode; use 'curve' first.")?;
            }
            ["quit"] => return Ok(Flow::Leave),
            ["discard"] => {
                if self.dashboard.is_dirty() {
                    let initial = self.dashboard.initial_modes().to_vec();
                    for (gpu, mode) in (0..).zip(initial) {
                        self.apply_mode(gpu, mode, out).await?;
                    }
                }
                return Ok(Flow::Leave);
            }
            ["help"] => writeln!(out, "{DASHBOARD_HELP}")?,
            _ => writeln!(out, "Unknown command '{}'. Type 'help'.", words.join(" "))?,
        }
        Ok(Flow::Stay)
    }

    fn editor_command<W: Write>(&mut self, words: &[&str], out: &mut W) -> Result<Flow> {
        let Some(editor) = self.editor.as_mut() else {
            return Ok(Flow::Leave);
        };

        let outcome: Result<(), EditError> = match words {
            ["show"] => {
                write!(out, "{}", render_editor(editor))?;
                return Ok(Flow::Stay);
            }
            ["next"] => {
                editor.select_next();
                Ok(())
            }
            ["prev"] => {
                editor.select_prev();
                Ok(())
            }
            ["add"] => editor.add(),
            ["del"] => match editor.delete() {
                Ok(false) => {
                    writeln!(out, "A curve needs at least two points.")?;
                    Ok(())
                }
                other => other.map(|_| ()),
            },
            ["left"] => editor.step_temperature(-1),
            ["right"] => editor.step_temperature(1),
            ["up"] => editor.step_speed(1),
            ["down"] => editor.step_speed(-1),
            ["temp", n] => match n.parse::<i32>() {
                Ok(t) => editor.set_temperature(t).map(|_| ()),
                Err(_) => {
                    writeln!(out, "Temperature must be a number.")?;
                    return Ok(Flow::Stay);
                }
            },
            ["speed", n] => match n.parse::<i32>() {
                Ok(s) => editor.set_speed(s),
                Err(_) => {
                    writeln!(out, "Speed must be a number.")?;
                    return Ok(Flow::Stay);
                }
            },
            ["reset"] => {
                editor.reset();
                write!(out, "{}", render_editor(editor))?;
                return Ok(Flow::Stay);
            }
            ["save"] => {
                return match editor.save(&self.curves) {
                    Ok(_) => {
                        writeln!(out, "Fan curve saved.")?;
                        Ok(Flow::Leave)
                    }
                    Err(e) => {
                        writeln!(out, "Error: {e}")?;
                        Ok(Flow::Stay)
                    }
                };
            }
            ["quit"] => {
                if editor.is_dirty() {
                    writeln!(
                        out,
                        "Unsaved changes: 'save' to keep them or 'discard' to drop them."
                    )?;
                    return Ok(Flow::Stay);
                }
                return Ok(Flow::Leave);
            }
            ["discard"] => return Ok(Flow::Leave),
            ["help"] => {
                writeln!(out, "{EDITOR_HELP}")?;
                return Ok(Flow::Stay);
            }
            _ => {
                writeln!(out, "Unknown command '{}'. Type 'help'.", words.join(" "))?;
                return Ok(Flow::Stay);
            }
        };

        match outcome {
            Ok(()) => writeln!(out, "{}", render_selection(editor))?,
            Err(e) => writeln!(out, "{}", capitalize(&e.to_string()))?,
        }
        Ok(Flow::Stay)
    }

    /// Writes the mode and applies it to the hardware right away.
    async fn apply_mode<W: Write>(&mut self, gpu: u32, mode: Mode, out: &mut W) -> Result<()> {
        if let Err(e) = self.config.write_mode(&device_key(gpu), mode) {
            writeln!(out, "Error: {e}")?;
            return Ok(());
        }
        self.dashboard.mark_dirty();

        if let Some(fans) = &self.fans {
            let applied = match mode {
                Mode::Auto => fans.reset_to_auto(gpu).await,
                Mode::Manual { speed } => fans.set_gpu_speed(gpu, i64::from(speed)).await,
                Mode::Curve => match fans.temperature(gpu).await {
                    Ok(temp) => {
                        let curve = self.curves.load().unwrap_or_default();
                        fans.set_gpu_speed(gpu, i64::from(curve.interpolate(temp)))
                            .await
                    }
                    Err(e) => Err(e),
                },
            };
            if let Err(e) = applied {
                writeln!(out, "GPU {gpu}: {e}")?;
            }
        }

        writeln!(out, "GPU {gpu}: {mode}")?;
        Ok(())
    }

    /// Prints every GPU. Curve-mode fans are driven from here while the
    /// dashboard is open, as the daemon would.
    async fn print_status<W: Write>(&self, out: &mut W) -> Result<()> {
        let Some(fans) = &self.fans else {
            return Ok(());
        };
        let doc = self.config.read();
        let curve = self.curves.load();
        let builtin = Curve::new();

        for gpu in 0..self.dashboard.device_count() {
            let mode = doc.mode(&device_key(gpu));
            let snapshot = match fans.snapshot(gpu).await {
                Ok(s) => s,
                Err(e) => {
                    writeln!(out, "GPU {gpu}: {e}")?;
                    continue;
                }
            };

            if mode == Mode::Curve {
                if let Some(temp) = snapshot.temperature {
                    let speed = curve.as_ref().unwrap_or(&builtin).interpolate(temp);
                    if let Err(e) = fans.set_gpu_speed(gpu, i64::from(speed)).await {
                        warn!("GPU {gpu}: {e}");
                    }
                }
            }

            let marker = if gpu == self.dashboard.selected() && self.dashboard.device_count() > 1 {
                "> "
            } else {
                ""
            };
            write!(out, "{marker}{}", render_status(&snapshot, mode))?;
            if mode == Mode::Curve {
                write!(out, "{}", render_curve_summary(curve.as_ref(), snapshot.temperature))?;
            }
        }
        Ok(())
    }
}

fn prompt(screen: Screen) -> &'static str {
    match screen {
        Screen::Dashboard => "nvfand> ",
        Screen::Editor => "curve> ",
    }
}

fn parse_manual_speed(word: &str) -> Option<u32> {
    word.parse::<u32>()
        .ok()
        .filter(|s| (SPEED_MIN as u32..=SPEED_MAX as u32).contains(s))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>() + ".",
        None => String::new(),
    }
}

/// Status block of one GPU as shown by `status` and the dashboard.
pub fn render_status(snapshot: &GpuSnapshot, mode: Mode) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "GPU {}: {}", snapshot.index, snapshot.name);
    let _ = writeln!(s, "  Mode: {mode}");

    match snapshot.temperature {
        Some(t) => {
            let _ = writeln!(s, "  Temperature: {t}°C");
        }
        None => {
            let _ = writeln!(s, "  Temperature: N/A");
        }
    }

    let t = &snapshot.telemetry;
    if let Some(util) = t.utilization {
        let _ = writeln!(s, "  Utilization: {util}%");
    }
    if let (Some(used), Some(total)) = (t.memory_used_mib, t.memory_total_mib) {
        let _ = writeln!(
            s,
            "  Memory: {:.1} / {:.1} GiB",
            used as f64 / 1024.0,
            total as f64 / 1024.0
        );
    }
    if let (Some(power), Some(limit)) = (t.power_watts, t.power_limit_watts) {
        let _ = writeln!(s, "  Power: {power:.0} W / {limit:.0} W");
    }

    for (fan, speed) in snapshot.fan_speeds.iter().enumerate() {
        if let Some(speed) = speed {
            let _ = writeln!(s, "  Fan {fan}: {speed}%");
        }
    }
    s.push('\n');
    s
}

/// One line per GPU for `list`.
pub fn render_gpu_line(snapshot: &GpuSnapshot) -> String {
    let fans = snapshot.fan_speeds.len();
    format!(
        "  GPU {}: {} ({fans} fan{})",
        snapshot.index,
        snapshot.name,
        if fans == 1 { "" } else { "s" }
    )
}

/// Table printed by `curve show`.
pub fn render_curve_table(curve: &Curve) -> String {
    let rule = "+--------------+-----------------+\n";
    let mut s = String::from("Current fan curve:\n");
    s.push_str(rule);
    s.push_str("| Temperature  | Fan Speed       |\n");
    s.push_str(rule);
    for p in curve.points() {
        let _ = writeln!(s, "| {:6} °C    | {:6} %        |", p.temperature, p.speed);
    }
    s.push_str(rule);
    s
}

fn render_curve_summary(curve: Option<&Curve>, temperature: Option<i32>) -> String {
    let Some(curve) = curve else {
        return "  Curve: (no curve file - using default)\n\n".to_string();
    };
    let mut s = String::new();
    if let Some(temp) = temperature {
        let _ = writeln!(s, "  Curve: {temp}°C -> {}%", curve.interpolate(temp));
    }
    let points: Vec<String> = curve
        .points()
        .iter()
        .map(|p| format!("{}°C:{}%", p.temperature, p.speed))
        .collect();
    let _ = writeln!(s, "  Points: {}\n", points.join(" "));
    s
}

fn render_selection(editor: &EditorSession) -> String {
    let draft = editor.draft();
    match editor.selected_point() {
        Some(p) => {
            let pos = draft.position(p.id).map_or(0, |i| i + 1);
            format!(
                "Point {pos}/{}: {}°C -> {}%",
                draft.len(),
                p.temperature,
                p.speed
            )
        }
        None => "No points. Use 'add' to create one.".to_string(),
    }
}

fn render_editor(editor: &EditorSession) -> String {
    let draft = editor.draft();
    let mut s = format!("Fan curve ({} points)", draft.len());
    if editor.is_dirty() {
        s.push_str(" [modified]");
    }
    s.push('\n');

    for p in draft.points() {
        let marker = if Some(p.id) == editor.selected() { ">" } else { " " };
        let _ = writeln!(s, "  {marker} {:3}°C -> {:3}%", p.temperature, p.speed);
    }
    let _ = writeln!(s, "{}", render_selection(editor));
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::DeviceError,
        fan_curve::CurvePoint,
        gpu::{GpuTelemetry, MockGpuBackend},
    };
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use std::{io::Cursor, sync::Arc};
    use tempfile::{TempDir, tempdir};

    struct Fixture {
        _dir: TempDir,
        config: ConfigStore,
        curves: CurveStore,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        Fixture {
            config: ConfigStore::new(dir.path().join("config.json")),
            curves: CurveStore::new(dir.path().join("curve.json")),
            _dir: dir,
        }
    }

    fn quiet_backend() -> MockGpuBackend {
        let mut mock = MockGpuBackend::new();
        mock.expect_name().returning(|gpu| Ok(format!("GPU Model {gpu}")));
        mock.expect_temperature().returning(|_| Ok(60));
        mock.expect_telemetry().returning(|_| Ok(GpuTelemetry::default()));
        mock.expect_fan_count().returning(|_| Ok(1));
        mock.expect_fan_speed().returning(|_, _| Ok(40));
        mock
    }

    async fn run_editor(fx: &Fixture, script: &str) -> String {
        let mut console = Console::editor(fx.config.clone(), fx.curves.clone());
        let mut out = Vec::new();
        console
            .run(Cursor::new(script.to_string()), &mut out)
            .await
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    async fn run_dashboard(fx: &Fixture, mock: MockGpuBackend, gpus: u32, script: &str) -> String {
        let fans = GpuFans::new(Arc::new(mock), 30);
        let mut console = Console::dashboard(fans, fx.config.clone(), fx.curves.clone(), gpus);
        let mut out = Vec::new();
        console
            .run(Cursor::new(script.to_string()), &mut out)
            .await
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn editor_save_persists_changes() {
        let fx = fixture();

        let out = run_editor(&fx, "up\nright\nsave\n").await;

        assert!(out.contains("Point 1/6: 35°C -> 35%"));
        assert!(out.contains("Fan curve saved."));
        assert_eq!(fx.curves.load().unwrap().points()[0], CurvePoint::from((35, 35)));
    }

    #[tokio::test]
    async fn editor_quit_refused_while_dirty() {
        let fx = fixture();

        let out = run_editor(&fx, "add\nquit\ndiscard\n").await;

        assert!(out.contains("Unsaved changes"));
        assert!(fx.curves.load().is_none());
    }

    #[tokio::test]
    async fn editor_end_of_input_discards() {
        let fx = fixture();
        fx.curves.upsert_point(40, 50).unwrap();
        fx.curves.upsert_point(60, 70).unwrap();

        let out = run_editor(&fx, "del\nspeed 90\n").await;

        assert!(out.contains("A curve needs at least two points."));
        assert!(out.contains("Unsaved curve changes discarded."));
        assert_eq!(fx.curves.load().unwrap().points()[0], CurvePoint::from((40, 50)));
    }

    #[tokio::test]
    async fn editor_reports_full_curve() {
        let fx = fixture();
        for i in 0..20 {
            fx.curves.upsert_point(i * 5, 50).unwrap();
        }

        let out = run_editor(&fx, "add\nquit\n").await;

        assert!(out.contains("Fan curve points have reached the maximum of 20."));
    }

    #[tokio::test]
    async fn editor_rejects_garbage() {
        let fx = fixture();

        let out = run_editor(&fx, "temp hot\nfly\nquit\n").await;

        assert!(out.contains("Temperature must be a number."));
        assert!(out.contains("Unknown command 'fly'"));
    }

    #[tokio::test]
    async fn dashboard_manual_writes_and_applies() {
        let fx = fixture();
        let mut mock = quiet_backend();
        mock.expect_set_fan_speed()
            .with(eq(0), eq(0), eq(75))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let out = run_dashboard(&fx, mock, 1, "manual 75\nquit\n").await;

        assert!(out.contains("GPU 0: Fixed speed 75%"));
        assert_eq!(fx.config.read().mode("gpu0"), Mode::Manual { speed: 75 });
    }

    #[tokio::test]
    async fn dashboard_rejects_out_of_range_speed() {
        let fx = fixture();
        let mut mock = quiet_backend();
        mock.expect_set_fan_speed().never();

        let out = run_dashboard(&fx, mock, 1, "manual 10\nquit\n").await;

        assert!(out.contains("Speed must be 30-100."));
        assert!(fx.config.read().is_empty());
    }

    #[tokio::test]
    async fn dashboard_discard_restores_initial_modes() {
        let fx = fixture();
        fx.config.write_mode("gpu0", Mode::Manual { speed: 60 }).unwrap();
        let mut mock = quiet_backend();
        mock.expect_restore_auto().returning(|_| Ok(()));
        mock.expect_set_fan_speed().returning(|_, _, _| Ok(()));

        run_dashboard(&fx, mock, 1, "auto\ndiscard\n").await;

        assert_eq!(fx.config.read().mode("gpu0"), Mode::Manual { speed: 60 });
    }

    #[tokio::test]
    async fn dashboard_all_sets_every_gpu() {
        let fx = fixture();
        let mut mock = quiet_backend();
        mock.expect_set_fan_speed().returning(|_, _, _| Ok(()));

        run_dashboard(&fx, mock, 2, "all curve\nquit\n").await;

        let doc = fx.config.read();
        assert_eq!(doc.mode("gpu0"), Mode::Curve);
        assert_eq!(doc.mode("gpu1"), Mode::Curve);
    }

    #[tokio::test]
    async fn dashboard_edit_requires_curve_mode() {
        let fx = fixture();

        let out = run_dashboard(&fx, quiet_backend(), 1, "edit\nquit\n").await;

        assert!(out.contains("GPU 0 is not in curve mode"));
    }

    #[tokio::test]
    async fn editor_returns_to_dashboard() {
        let fx = fixture();
        fx.config.write_mode("gpu0", Mode::Curve).unwrap();
        let mut mock = quiet_backend();
        mock.expect_set_fan_speed().returning(|_, _, _| Ok(()));

        let out = run_dashboard(&fx, mock, 1, "edit\nsave\nquit\n").await;

        assert!(out.contains("curve> "));
        assert!(out.matches("GPU 0: GPU Model 0").count() >= 2);
        assert_eq!(fx.curves.load(), Some(Curve::preset()));
    }

    #[tokio::test]
    async fn dashboard_cycle_and_step() {
        let fx = fixture();
        let mut mock = quiet_backend();
        mock.expect_set_fan_speed().returning(|_, _, _| Ok(()));

        run_dashboard(&fx, mock, 1, "cycle\nup\nup\n").await;

        assert_eq!(fx.config.read().mode("gpu0"), Mode::Manual { speed: 60 });
    }

    #[tokio::test]
    async fn dashboard_reports_device_failures() {
        let fx = fixture();
        let mut mock = quiet_backend();
        mock.expect_restore_auto()
            .returning(|gpu| Err(DeviceError::NotFound(gpu)));

        let out = run_dashboard(&fx, mock, 1, "auto\n").await;

        assert!(out.contains("GPU 0: GPU 0 not found"));
        assert_eq!(fx.config.read().mode("gpu0"), Mode::Auto);
    }

    #[test]
    fn status_rendering() {
        let snapshot = GpuSnapshot {
            index: 1,
            name: "RTX 3090".into(),
            temperature: Some(52),
            telemetry: GpuTelemetry {
                utilization: Some(20),
                memory_used_mib: Some(2048),
                memory_total_mib: Some(24576),
                power_watts: Some(110.4),
                power_limit_watts: Some(350.0),
            },
            fan_speeds: vec![Some(45), None],
        };

        assert_eq!(
            render_status(&snapshot, Mode::Manual { speed: 45 }),
            "GPU 1: RTX 3090\n  Mode: Fixed speed 45%\n  Temperature: 52°C\n  Utilization: 20%\n  Memory: 2.0 / 24.0 GiB\n  Power: 110 W / 350 W\n  Fan 0: 45%\n\n"
        );
        assert_eq!(render_gpu_line(&snapshot), "  GPU 1: RTX 3090 (2 fans)");
    }

    #[test]
    fn curve_table() {
        let curve = Curve::from_points([(30, 30), (60, 65)].map(CurvePoint::from));

        let table = render_curve_table(&curve);

        assert!(table.contains("|     30 °C    |     30 %        |"));
        assert!(table.contains("|     60 °C    |     65 %        |"));
    }
}
