use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Interleaved (frame-major) f32 samples with a fixed channel count.
///
/// Blocks are owned by whoever drives the chain and reused from one callback to
/// the next; `set_frames` only reallocates when the block grows past its capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    samples: Vec<f32>,
    channels: usize,
}

impl AudioBlock {
    pub fn silent(frames: usize, channels: usize) -> Self {
        let channels = channels.max(1);
        Self { samples: vec![0.0; frames * channels], channels }
    }

    /// Wraps interleaved samples. A trailing partial frame is dropped.
    pub fn from_interleaved(mut samples: Vec<f32>, channels: usize) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels;
        samples.truncate(whole);
        Self { samples, channels }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    pub fn set_frames(&mut self, frames: usize) {
        self.samples.resize(frames * self.channels, 0.0);
    }

    /// Replaces the contents with `data`, keeping the channel count.
    pub fn copy_from_interleaved(&mut self, data: &[f32]) {
        let whole = data.len() - data.len() % self.channels;
        self.samples.clear();
        self.samples.extend_from_slice(&data[..whole]);
    }

    /// Equal-weight mix-down into `mono`. Mono input is copied unchanged.
    pub fn mix_to_mono(&self, mono: &mut Vec<f32>) {
        mono.clear();
        if self.channels == 1 {
            mono.extend_from_slice(&self.samples);
            return;
        }
        let scale = 1.0 / self.channels as f32;
        mono.extend(
            self.samples
                .chunks_exact(self.channels)
                .map(|frame| frame.iter().sum::<f32>() * scale),
        );
    }

    /// Duplicates each mono sample to every channel. `mono` must hold exactly
    /// `frames()` samples.
    pub fn broadcast_from_mono(&mut self, mono: &[f32]) {
        if self.channels == 1 {
            self.samples.copy_from_slice(mono);
            return;
        }
        for (frame, &s) in self.samples.chunks_exact_mut(self.channels).zip(mono) {
            frame.fill(s);
        }
    }

    /// Raw `input` scaled by `gain`, channel-mapped onto this block's shape.
    /// Frames or channels `input` does not cover are silent.
    pub fn attenuated_copy_from(&mut self, input: &AudioBlock, gain: f32) {
        self.samples.fill(0.0);
        let in_ch = input.channels;
        for (out_frame, in_frame) in self
            .samples
            .chunks_exact_mut(self.channels)
            .zip(input.samples.chunks_exact(in_ch))
        {
            for (c, o) in out_frame.iter_mut().enumerate() {
                *o = in_frame[c.min(in_ch - 1)] * gain;
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid stream configuration: {0}")]
pub struct InvalidStreamConfig(&'static str);

/// Device and format of a running stream. Fixed for the life of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// `None` means the system default device.
    pub device: Option<String>,
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub block_size_frames: u32,
}

impl StreamConfig {
    pub fn new(
        device: Option<String>,
        sample_rate_hz: u32,
        channels: u16,
        block_size_frames: u32,
    ) -> Result<Self, InvalidStreamConfig> {
        if sample_rate_hz == 0 {
            return Err(InvalidStreamConfig("sample rate must be positive"));
        }
        if channels == 0 {
            return Err(InvalidStreamConfig("channel count must be positive"));
        }
        if block_size_frames == 0 {
            return Err(InvalidStreamConfig("block size must be positive"));
        }
        Ok(Self { device, sample_rate_hz, channels, block_size_frames })
    }

    /// Wall-clock time the callback has to finish one block.
    pub fn block_budget(&self) -> Duration {
        Duration::from_secs_f64(f64::from(self.block_size_frames) / f64::from(self.sample_rate_hz))
    }

    pub fn device_label(&self) -> &str {
        self.device.as_deref().unwrap_or("system default")
    }
}

impl fmt::Display for StreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {} Hz, {} ch, {} frames",
            self.device_label(),
            self.sample_rate_hz,
            self.channels,
            self.block_size_frames
        )
    }
}
