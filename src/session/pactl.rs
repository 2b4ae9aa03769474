//! PulseAudio / PipeWire mixer access through the `pactl` command.
//!
//! `pactl --format=json list sink-inputs` reports one entry per playback
//! stream together with the owning process id. A process may own several
//! streams; volume writes go to all of them and reads report their average.

use super::{AudioSessionProvider, ProcessInfo, SessionError, SessionInfo, SessionResult};
use crate::log_debug;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command;

/// `pactl` reports volumes as 16.16 fixed point, 0x10000 = 100 %.
const PA_VOLUME_NORM: f32 = 65_536.0;
const PROCESS_ID_PROPERTY: &str = "application.process.id";

#[derive(Debug, Deserialize)]
pub(super) struct SinkInput {
    index: u32,
    #[serde(default)]
    volume: BTreeMap<String, ChannelVolume>,
    #[serde(default)]
    properties: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChannelVolume {
    value: u32,
}

impl SinkInput {
    fn pid(&self) -> Option<u32> {
        match self.properties.get(PROCESS_ID_PROPERTY)? {
            serde_json::Value::String(raw) => raw.trim().parse().ok(),
            serde_json::Value::Number(num) => num.as_u64().and_then(|n| u32::try_from(n).ok()),
            _ => None,
        }
    }

    fn volume_percent(&self) -> Option<f32> {
        if self.volume.is_empty() {
            return None;
        }
        let total: f32 = self
            .volume
            .values()
            .map(|channel| channel.value as f32 / PA_VOLUME_NORM * 100.0)
            .sum();
        Some(total / self.volume.len() as f32)
    }
}

pub(super) fn parse_sink_inputs(json: &str) -> SessionResult<Vec<SinkInput>> {
    serde_json::from_str(json)
        .map_err(|err| SessionError::Backend(format!("unreadable pactl output: {err}")))
}

/// Mixer provider for Linux desktops running PulseAudio or pipewire-pulse.
#[derive(Debug, Clone)]
pub struct PactlSessions {
    pactl_cmd: String,
}

impl PactlSessions {
    pub fn new(pactl_cmd: impl Into<String>) -> Self {
        Self {
            pactl_cmd: pactl_cmd.into(),
        }
    }

    fn run(&self, args: &[&str]) -> SessionResult<String> {
        let output = Command::new(&self.pactl_cmd)
            .args(args)
            .output()
            .map_err(|err| SessionError::Backend(format!("failed to run {}: {err}", self.pactl_cmd)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SessionError::Backend(format!(
                "{} {} exited with {}: {}",
                self.pactl_cmd,
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn sink_inputs(&self) -> SessionResult<Vec<SinkInput>> {
        let stdout = self.run(&["--format=json", "list", "sink-inputs"])?;
        parse_sink_inputs(&stdout)
    }

    fn streams_for(&self, pid: u32) -> SessionResult<Vec<SinkInput>> {
        Ok(self
            .sink_inputs()?
            .into_iter()
            .filter(|input| input.pid() == Some(pid))
            .collect())
    }
}

impl Default for PactlSessions {
    fn default() -> Self {
        Self::new("pactl")
    }
}

impl AudioSessionProvider for PactlSessions {
    fn list_sessions(&self) -> SessionResult<Vec<SessionInfo>> {
        let mut by_pid: BTreeMap<u32, (f32, usize)> = BTreeMap::new();
        for input in self.sink_inputs()? {
            let (Some(pid), Some(volume)) = (input.pid(), input.volume_percent()) else {
                continue;
            };
            let entry = by_pid.entry(pid).or_insert((0.0, 0));
            entry.0 += volume;
            entry.1 += 1;
        }
        Ok(by_pid
            .into_iter()
            .map(|(pid, (total, count))| SessionInfo {
                pid,
                volume_percent: total / count as f32,
            })
            .collect())
    }

    fn get_volume(&self, pid: u32) -> SessionResult<Option<f32>> {
        let volumes: Vec<f32> = self
            .streams_for(pid)?
            .iter()
            .filter_map(SinkInput::volume_percent)
            .collect();
        if volumes.is_empty() {
            return Ok(None);
        }
        Ok(Some(volumes.iter().sum::<f32>() / volumes.len() as f32))
    }

    fn set_volume(&self, pid: u32, volume_percent: f32) -> SessionResult<()> {
        let level = raw_volume(volume_percent);
        for input in self.streams_for(pid)? {
            let index = input.index.to_string();
            self.run(&["set-sink-input-volume", &index, &level])?;
        }
        Ok(())
    }

    fn get_peak(&self, pid: u32) -> SessionResult<Option<f32>> {
        // pactl has no per-stream peak meter.
        let _ = pid;
        Ok(None)
    }

    fn resolve_executable_path(&self, pid: u32) -> String {
        match fs::read_link(Path::new("/proc").join(pid.to_string()).join("exe")) {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(err) => {
                log_debug(&format!("cannot resolve executable for pid {pid}: {err}"));
                String::new()
            }
        }
    }

    fn list_processes(&self) -> SessionResult<Vec<ProcessInfo>> {
        let entries = fs::read_dir("/proc")
            .map_err(|err| SessionError::Backend(format!("cannot read /proc: {err}")))?;
        let mut processes = Vec::new();
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            // Processes can exit between read_dir and this read.
            let Ok(comm) = fs::read_to_string(entry.path().join("comm")) else {
                continue;
            };
            processes.push(ProcessInfo {
                pid,
                name: comm.trim().to_string(),
            });
        }
        Ok(processes)
    }

    fn name(&self) -> &'static str {
        "pactl"
    }
}

/// Raw `pactl` volume for `percent`. Keeps fractional and boosted (>100 %)
/// levels so a restore writes back exactly what was read.
fn raw_volume(percent: f32) -> String {
    ((percent.max(0.0) / 100.0 * PA_VOLUME_NORM).round() as u32).to_string()
}
