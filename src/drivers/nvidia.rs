//! NVIDIA backend driven through the vendor command-line tools.
//!
//! Telemetry comes from `nvidia-smi`, fan control from `nvidia-settings`,
//! which needs an X display and Coolbits enabled.
//!
//! `nvidia-settings` numbers fans across the whole host. The backend reads
//! which `[fan:N]` targets hang off each GPU once, and translates the
//! per-GPU fan indices of [`GpuBackend`] into those host-wide targets, so a
//! write to one GPU never reaches another GPU's fans.

use std::{
    env,
    path::{Path, PathBuf},
    str::FromStr,
};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::{process::Command, sync::OnceCell};

use crate::{
    error::DeviceError,
    gpu::{GpuBackend, GpuTelemetry},
};

const SMI: &str = "nvidia-smi";
const SETTINGS: &str = "nvidia-settings";
const DEFAULT_DISPLAY: &str = ":0";

#[derive(Debug, Clone)]
pub struct NvidiaCli {
    display: String,
    smi_path: PathBuf,
    settings_path: PathBuf,
    fans: OnceCell<FanMap>,
}

impl Default for NvidiaCli {
    fn default() -> Self {
        Self::new()
    }
}

impl NvidiaCli {
    /// Uses the tools from `$PATH` and `$DISPLAY`, or `:0` when the daemon
    /// runs without one.
    pub fn new() -> Self {
        Self::with_tools(SMI, SETTINGS)
    }

    /// Uses `nvidia-smi` and `nvidia-settings` from explicit locations.
    pub fn with_tools(smi: impl AsRef<Path>, settings: impl AsRef<Path>) -> Self {
        let display = env::var("DISPLAY").unwrap_or_else(|_| DEFAULT_DISPLAY.to_string());
        Self {
            display,
            smi_path: smi.as_ref().to_path_buf(),
            settings_path: settings.as_ref().to_path_buf(),
            fans: OnceCell::new(),
        }
    }

    async fn smi(&self, args: &[String]) -> Result<String, DeviceError> {
        run(Command::new(&self.smi_path).args(args), SMI).await
    }

    async fn settings(&self, args: &[String]) -> Result<String, DeviceError> {
        run(
            Command::new(&self.settings_path)
                .env("DISPLAY", &self.display)
                .args(args),
            SETTINGS,
        )
        .await
    }

    async fn query_gpu(&self, gpu: u32, fields: &str) -> Result<String, DeviceError> {
        let out = self
            .smi(&[
                "-i".into(),
                gpu.to_string(),
                format!("--query-gpu={fields}"),
                "--format=csv,noheader,nounits".into(),
            ])
            .await?;
        out.lines()
            .next()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .ok_or(DeviceError::NotFound(gpu))
    }

    /// GPU to fan association, read on first use.
    async fn fan_map(&self) -> Result<&FanMap, DeviceError> {
        self.fans
            .get_or_try_init(|| async {
                let listing = self
                    .settings(&["-q".into(), "gpus".into(), "-V".into()])
                    .await?;
                let map = FanMap::from_gpu_listing(&listing);
                if map.has_fans() {
                    debug!("Fan map: {map:?}");
                    return Ok(map);
                }

                let fans = self.settings(&["-q".into(), "fans".into()]).await?;
                let map = FanMap::from_fan_listing(&fans, map.gpu_count());
                if !map.has_fans() {
                    warn!("Cannot tell which fans belong to which GPU; fan control disabled");
                }
                Ok(map)
            })
            .await
    }
}

#[async_trait]
impl GpuBackend for NvidiaCli {
    async fn device_count(&self) -> Result<u32, DeviceError> {
        let out = self
            .smi(&["--query-gpu=count".into(), "--format=csv,noheader".into()])
            .await?;
        let line = out.lines().next().unwrap_or_default();
        parse_value(line).ok_or_else(|| DeviceError::Parse {
            tool: SMI,
            output: out.clone(),
        })
    }

    async fn name(&self, gpu: u32) -> Result<String, DeviceError> {
        self.query_gpu(gpu, "name").await
    }

    async fn temperature(&self, gpu: u32) -> Result<i32, DeviceError> {
        let line = self.query_gpu(gpu, "temperature.gpu").await?;
        parse_value(&line).ok_or(DeviceError::Parse {
            tool: SMI,
            output: line,
        })
    }

    async fn telemetry(&self, gpu: u32) -> Result<GpuTelemetry, DeviceError> {
        let line = self
            .query_gpu(
                gpu,
                "utilization.gpu,memory.used,memory.total,power.draw,power.limit",
            )
            .await?;
        parse_telemetry(&line).ok_or(DeviceError::Parse {
            tool: SMI,
            output: line,
        })
    }

    async fn fan_count(&self, gpu: u32) -> Result<u32, DeviceError> {
        let count = self.fan_map().await?.fans(gpu).len();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn fan_speed(&self, gpu: u32, fan: u32) -> Result<u32, DeviceError> {
        let target = self.fan_map().await?.target(gpu, fan)?;
        let out = self
            .settings(&[
                "-t".into(),
                "-q".into(),
                format!("[fan:{target}]/GPUCurrentFanSpeed"),
            ])
            .await?;
        parse_value(out.trim()).ok_or(DeviceError::Parse {
            tool: SETTINGS,
            output: out,
        })
    }

    async fn set_fan_speed(&self, gpu: u32, fan: u32, speed: u32) -> Result<(), DeviceError> {
        let target = self.fan_map().await?.target(gpu, fan)?;
        let speed = speed.min(100);
        self.settings(&[
            "-a".into(),
            format!("[gpu:{gpu}]/GPUFanControlState=1"),
            "-a".into(),
            format!("[fan:{target}]/GPUTargetFanSpeed={speed}"),
        ])
        .await?;
        debug!("Set GPU {gpu} fan {fan} ([fan:{target}]) to {speed}%");
        Ok(())
    }

    async fn restore_auto(&self, gpu: u32) -> Result<(), DeviceError> {
        self.settings(&["-a".into(), format!("[gpu:{gpu}]/GPUFanControlState=0")])
            .await?;
        info!("GPU {gpu} fans returned to driver control");
        Ok(())
    }

    async fn enable_persistence(&self, gpu: u32) -> Result<(), DeviceError> {
        self.smi(&["-i".into(), gpu.to_string(), "-pm".into(), "1".into()])
            .await?;
        Ok(())
    }
}

/// Host-wide `[fan:N]` targets of each GPU, indexed by GPU.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct FanMap(Vec<Vec<u32>>);

impl FanMap {
    /// Parses `nvidia-settings -q gpus -V`, where the fans a GPU drives are
    /// listed below its `[gpu:N]` header.
    fn from_gpu_listing(output: &str) -> Self {
        let mut gpus: Vec<Vec<u32>> = Vec::new();
        let mut current = None;

        for line in output.lines() {
            if let Some(gpu) = target_index(line, "gpu") {
                let idx = gpu as usize;
                if gpus.len() <= idx {
                    gpus.resize(idx + 1, Vec::new());
                }
                current = Some(idx);
            } else if let (Some(idx), Some(fan)) = (current, target_index(line, "fan")) {
                gpus[idx].push(fan);
            }
        }
        Self(gpus)
    }

    /// Falls back on `nvidia-settings -q fans`. The listing says nothing
    /// about ownership, so it is only usable with a single GPU.
    fn from_fan_listing(output: &str, gpu_count: usize) -> Self {
        if gpu_count > 1 {
            return Self(vec![Vec::new(); gpu_count]);
        }
        let fans = output
            .lines()
            .filter_map(|line| target_index(line, "fan"))
            .collect();
        Self(vec![fans])
    }

    fn gpu_count(&self) -> usize {
        self.0.len()
    }

    fn has_fans(&self) -> bool {
        self.0.iter().any(|fans| !fans.is_empty())
    }

    fn fans(&self, gpu: u32) -> &[u32] {
        self.0.get(gpu as usize).map(Vec::as_slice).unwrap_or_default()
    }

    fn target(&self, gpu: u32, fan: u32) -> Result<u32, DeviceError> {
        self.fans(gpu)
            .get(fan as usize)
            .copied()
            .ok_or(DeviceError::UnknownFan { gpu, fan })
    }
}

/// Number in the first `[kind:N]` target of `line`.
fn target_index(line: &str, kind: &str) -> Option<u32> {
    let marker = format!("[{kind}:");
    let rest = &line[line.find(&marker)? + marker.len()..];
    rest[..rest.find(']')?].parse().ok()
}

async fn run(command: &mut Command, tool: &'static str) -> Result<String, DeviceError> {
    let output = command
        .output()
        .await
        .map_err(|source| DeviceError::Spawn { tool, source })?;

    if !output.status.success() {
        return Err(DeviceError::Command {
            tool,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parses one `nvidia-smi` field; placeholder values are `None`.
fn parse_value<T: FromStr>(field: &str) -> Option<T> {
    match field.trim() {
        "" | "N/A" | "[N/A]" | "[Not Supported]" => None,
        value => value.parse().ok(),
    }
}

/// Parses `utilization, memory.used, memory.total, power.draw, power.limit`.
fn parse_telemetry(line: &str) -> Option<GpuTelemetry> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    let [util, used, total, power, limit] = parts.as_slice() else {
        return None;
    };

    Some(GpuTelemetry {
        utilization: parse_value(util),
        memory_used_mib: parse_value(used),
        memory_total_mib: parse_value(total),
        power_watts: parse_value(power),
        power_limit_watts: parse_value(limit),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::GpuFans;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::sync::Arc;

    #[test]
    fn parse_value_handles_placeholders() {
        assert_eq!(parse_value::<u32>(" 42 "), Some(42));
        assert_eq!(parse_value::<f32>("115.25"), Some(115.25));
        assert_eq!(parse_value::<u32>("[N/A]"), None);
        assert_eq!(parse_value::<u32>("N/A"), None);
        assert_eq!(parse_value::<u32>("[Not Supported]"), None);
        assert_eq!(parse_value::<u32>(""), None);
        assert_eq!(parse_value::<u32>("abc"), None);
    }

    #[test]
    fn telemetry_line() {
        let telemetry = parse_telemetry("37, 1024, 8192, 115.25, 220.00").unwrap();

        assert_eq!(
            telemetry,
            GpuTelemetry {
                utilization: Some(37),
                memory_used_mib: Some(1024),
                memory_total_mib: Some(8192),
                power_watts: Some(115.25),
                power_limit_watts: Some(220.0),
            }
        );
    }

    #[test]
    fn telemetry_line_with_unsupported_fields() {
        let telemetry = parse_telemetry("12, 300, 4096, [N/A], [Not Supported]").unwrap();

        assert_eq!(telemetry.utilization, Some(12));
        assert_eq!(telemetry.power_watts, None);
        assert_eq!(telemetry.power_limit_watts, None);
    }

    #[test]
    fn telemetry_line_with_wrong_arity() {
        assert_eq!(parse_telemetry("12, 300"), None);
    }

    const TWO_GPU_LISTING: &str = "\
2 GPUs on host:0

    [0] host:0[gpu:0] (NVIDIA GeForce RTX 3090)

      Has the following names:
        GPU-0

      Is connected to the following fans:
        [0] host:0[fan:0] (Fan 0)
        [1] host:0[fan:1] (Fan 1)

    [1] host:0[gpu:1] (NVIDIA GeForce RTX 3060)

      Has the following names:
        GPU-1

      Is connected to the following fans:
        [2] host:0[fan:2] (Fan 2)
";

    #[test]
    fn gpu_listing_assigns_fans_to_their_gpu() {
        let map = FanMap::from_gpu_listing(TWO_GPU_LISTING);

        assert_eq!(map, FanMap(vec![vec![0, 1], vec![2]]));
        assert_eq!(map.target(1, 0).unwrap(), 2);
        assert!(matches!(
            map.target(1, 1),
            Err(DeviceError::UnknownFan { gpu: 1, fan: 1 })
        ));
        assert!(map.fans(5).is_empty());
    }

    #[test]
    fn fan_listing_only_trusted_for_single_gpu() {
        let output = "2 Fans on host:0\n\n    [0] host:0[fan:0] (Fan 0)\n    [1] host:0[fan:1] (Fan 1)\n";

        assert_eq!(FanMap::from_fan_listing(output, 1), FanMap(vec![vec![0, 1]]));
        assert_eq!(FanMap::from_fan_listing(output, 0), FanMap(vec![vec![0, 1]]));
        assert!(!FanMap::from_fan_listing(output, 2).has_fans());
    }

    #[test]
    fn target_index_parsing() {
        assert_eq!(target_index("    [3] host:0[fan:12] (Fan 12)", "fan"), Some(12));
        assert_eq!(target_index("    [3] host:0[fan:12] (Fan 12)", "gpu"), None);
        assert_eq!(target_index("[gpu:x]", "gpu"), None);
    }

    /// Fake `nvidia-settings` that logs its arguments and answers the GPU
    /// listing query.
    fn fake_settings(dir: &Path) -> (PathBuf, PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let listing = dir.join("gpus.txt");
        let log = dir.join("calls.log");
        let script = dir.join("nvidia-settings");
        std::fs::write(&listing, TWO_GPU_LISTING).unwrap();
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nprintf '%s\\n' \"$*\" >> '{}'\nif [ \"$*\" = '-q gpus -V' ]; then cat '{}'; fi\n",
                log.display(),
                listing.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (script, log)
    }

    #[tokio::test]
    #[serial]
    async fn gpu_speed_only_reaches_own_fans() {
        let dir = tempfile::tempdir().unwrap();
        let (script, log) = fake_settings(dir.path());
        let cli = NvidiaCli::with_tools("/nonexistent/nvidia-smi", script);
        let fans = GpuFans::new(Arc::new(cli), 30);

        fans.set_gpu_speed(1, 40).await.unwrap();

        let calls = std::fs::read_to_string(log).unwrap();
        assert_eq!(
            calls.lines().collect::<Vec<_>>(),
            [
                "-q gpus -V",
                "-a [gpu:1]/GPUFanControlState=1 -a [fan:2]/GPUTargetFanSpeed=40",
            ]
        );
    }

    #[tokio::test]
    #[serial]
    async fn fan_counts_are_per_gpu() {
        let dir = tempfile::tempdir().unwrap();
        let (script, log) = fake_settings(dir.path());
        let cli = NvidiaCli::with_tools("/nonexistent/nvidia-smi", script);

        assert_eq!(cli.fan_count(0).await.unwrap(), 2);
        assert_eq!(cli.fan_count(1).await.unwrap(), 1);
        assert_eq!(cli.fan_count(2).await.unwrap(), 0);
        assert!(matches!(
            cli.set_fan_speed(1, 1, 50).await,
            Err(DeviceError::UnknownFan { gpu: 1, fan: 1 })
        ));
        assert_eq!(std::fs::read_to_string(log).unwrap(), "-q gpus -V\n");
    }

    #[tokio::test]
    #[serial]
    async fn missing_tool_is_spawn_error() {
        let err = run(
            &mut Command::new("/nonexistent/nvidia-smi"),
            SMI,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DeviceError::Spawn { tool: SMI, .. }));
    }

    #[tokio::test]
    #[serial]
    async fn failing_tool_is_command_error() {
        let err = run(Command::new("sh").args(["-c", "echo boom >&2; exit 3"]), SMI)
            .await
            .unwrap_err();

        match err {
            DeviceError::Command { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
