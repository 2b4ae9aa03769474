//! Microphone listening via CPAL.
//!
//! The CPAL callback only re-slices incoming buffers into fixed 16-bit blocks;
//! a consumer thread measures each block and talks to the engine so the audio
//! thread never waits on the engine lock.

use super::dispatch::{block_len, f32_to_i16, u16_to_i16, BlockDispatcher};
use super::meter::{peak_percent, LiveMeter};
use crate::engine::{DuckingEngine, NoiseVerdict};
use crate::log_debug;
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// List microphone names so the CLI can expose a human-friendly selector.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.input_devices().context("no input devices available")?;
    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            names.push(name);
        }
    }
    Ok(names)
}

fn open_device(preferred_device: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match preferred_device {
        Some(name) => {
            let mut devices = host.input_devices().context("no input devices available")?;
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| anyhow!("input device '{name}' not found"))
        }
        None => host
            .default_input_device()
            .context("no default input device available"),
    }
}

/// Measure one block and forward it as qualifying noise when its peak is
/// above the configured minimum microphone volume.
pub fn forward_mic_block(
    engine: &DuckingEngine,
    block: &[i16],
    meter: Option<&LiveMeter>,
) -> Option<NoiseVerdict> {
    let percent = peak_percent(block);
    if let Some(meter) = meter {
        meter.set_percent(percent);
    }
    if percent <= engine.settings().min_mic_volume {
        return None;
    }
    log_debug(&format!("heard mic at qualifying volume: {percent:.1}"));
    Some(engine.on_qualifying_noise(engine.now()))
}

/// A running microphone capture feeding the engine.
pub struct MicListener {
    stream: Option<cpal::Stream>,
    consumer: Option<JoinHandle<()>>,
    device_name: String,
    dropped: Arc<AtomicUsize>,
    meter: LiveMeter,
}

impl MicListener {
    /// Open the device (by name, or the system default) and start listening.
    /// Failing to open or start the device is returned to the caller.
    pub fn start(
        preferred_device: Option<&str>,
        block_ms: u64,
        channel_capacity: usize,
        engine: Arc<DuckingEngine>,
        meter: LiveMeter,
    ) -> Result<Self> {
        let device = open_device(preferred_device)?;
        let device_name = device
            .name()
            .unwrap_or_else(|_| "unknown input device".to_string());
        let default_config = device
            .default_input_config()
            .with_context(|| format!("input device '{device_name}' has no usable config"))?;
        let format = default_config.sample_format();
        let stream_config: StreamConfig = default_config.into();
        let channels = usize::from(stream_config.channels.max(1));
        let samples_per_block = block_len(stream_config.sample_rate.0, channels, block_ms);

        log_debug(&format!(
            "Mic config: device={device_name} format={format:?} sample_rate={}Hz channels={channels} block={samples_per_block}",
            stream_config.sample_rate.0
        ));

        let (sender, receiver) = bounded::<Vec<i16>>(channel_capacity.max(1));
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = BlockDispatcher::new(samples_per_block, sender, dropped.clone());

        // The stream callback owns the dispatcher (and with it the only
        // sender), so dropping the stream ends the consumer loop.
        let err_fn = |err| log_debug(&format!("audio_stream_error: {err}"));
        let stream = match format {
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _| dispatcher.push(data, f32_to_i16),
                err_fn,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _| dispatcher.push(data, |sample| sample),
                err_fn,
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &stream_config,
                move |data: &[u16], _| dispatcher.push(data, u16_to_i16),
                err_fn,
                None,
            ),
            other => return Err(anyhow!("unsupported sample format: {other:?}")),
        }
        .with_context(|| {
            format!(
                "failed to open input device '{device_name}'. {}",
                mic_permission_hint()
            )
        })?;

        let consumer_meter = meter.clone();
        let consumer = thread::Builder::new()
            .name("autoduck-mic".to_string())
            .spawn(move || {
                while let Ok(block) = receiver.recv() {
                    forward_mic_block(&engine, &block, Some(&consumer_meter));
                }
            })
            .context("failed to spawn microphone consumer thread")?;

        stream
            .play()
            .with_context(|| format!("failed to start input device '{device_name}'"))?;

        Ok(Self {
            stream: Some(stream),
            consumer: Some(consumer),
            device_name,
            dropped,
            meter,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Blocks the host could not hand over because the consumer fell behind.
    pub fn dropped_blocks(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop capturing and release the device. Any reduction already applied
    /// keeps running until its own restore deadline.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                log_debug(&format!("failed to pause audio stream: {err}"));
            }
            drop(stream);
        }
        if let Some(consumer) = self.consumer.take() {
            if consumer.join().is_err() {
                log_debug("microphone consumer thread panicked");
            }
        }
        self.meter.reset();
    }
}

impl Drop for MicListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn mic_permission_hint() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "macOS: System Settings > Privacy & Security > Microphone (enable your terminal)."
    }
    #[cfg(target_os = "linux")]
    {
        "Linux: check PipeWire/PulseAudio permissions and ensure the device is not muted."
    }
    #[cfg(target_os = "windows")]
    {
        "Windows: Settings > Privacy & Security > Microphone (allow access for your terminal)."
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        "Check OS microphone permissions."
    }
}
