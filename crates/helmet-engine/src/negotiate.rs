use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::block::StreamConfig;
use crate::devices::AudioHost;

/// One `(sample rate, channels, block size)` combination to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub block_size_frames: u32,
}

impl Candidate {
    pub const fn new(sample_rate_hz: u32, channels: u16, block_size_frames: u32) -> Self {
        Self { sample_rate_hz, channels, block_size_frames }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz/{}ch/{}", self.sample_rate_hz, self.channels, self.block_size_frames)
    }
}

/// Highest quality first. The low-rate mono entry doubles as the conservative
/// fallback once the default device is reached.
pub const DEFAULT_CANDIDATES: [Candidate; 6] = [
    Candidate::new(44_100, 2, 1024),
    Candidate::new(44_100, 1, 1024),
    Candidate::new(22_050, 2, 512),
    Candidate::new(22_050, 1, 512),
    Candidate::new(48_000, 2, 1024),
    Candidate::new(48_000, 1, 1024),
];

/// Name fragments of audio HATs and interfaces worth preferring over the default.
pub const DEFAULT_DEVICE_PATTERNS: [&str; 3] = ["wm8960", "usb", "alsa"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub device: Option<String>,
    pub candidate: Candidate,
    pub error: String,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let device = self.device.as_deref().unwrap_or("system default");
        write!(f, "{device} {}: {}", self.candidate, self.error)
    }
}

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("no working audio configuration after {} attempts: {}", .attempts.len(), describe(.attempts))]
    NoWorkingAudioConfig { attempts: Vec<Attempt> },
}

fn describe(attempts: &[Attempt]) -> String {
    if attempts.is_empty() {
        return "no candidates given".to_string();
    }
    attempts.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Picks a working stream configuration by trial.
///
/// Every candidate is tried on the preferred device (first duplex device whose
/// name matches a pattern) before the system default gets a turn, so a mono
/// configuration on the preferred hardware beats stereo on the default. The
/// first configuration that opens wins.
pub struct DeviceNegotiator<'h, H: AudioHost> {
    host: &'h H,
    candidates: Vec<Candidate>,
    patterns: Vec<String>,
}

impl<'h, H: AudioHost> DeviceNegotiator<'h, H> {
    pub fn new(host: &'h H) -> Self {
        Self {
            host,
            candidates: DEFAULT_CANDIDATES.to_vec(),
            patterns: DEFAULT_DEVICE_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn patterns(mut self, patterns: Vec<String>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn preferred_device(&self) -> Option<String> {
        let devices = match self.host.query_devices() {
            Ok(d) => d,
            Err(e) => {
                warn!("could not query audio devices: {e:#}");
                return None;
            }
        };
        for d in &devices {
            debug!(
                name = %d.name,
                inputs = d.max_input_channels,
                outputs = d.max_output_channels,
                "found audio device"
            );
        }
        let picked = devices
            .into_iter()
            .find(|d| d.is_duplex() && d.matches_any(&self.patterns))
            .map(|d| d.name);
        match &picked {
            Some(name) => info!("preferred audio device: {name}"),
            None => info!("no preferred audio device found, using system default"),
        }
        picked
    }

    pub fn negotiate(&self) -> Result<StreamConfig, NegotiationError> {
        let mut targets: Vec<Option<String>> = Vec::with_capacity(2);
        if let Some(name) = self.preferred_device() {
            targets.push(Some(name));
        }
        targets.push(None);

        let mut attempts = Vec::new();
        for device in &targets {
            for &candidate in &self.candidates {
                let config = match StreamConfig::new(
                    device.clone(),
                    candidate.sample_rate_hz,
                    candidate.channels,
                    candidate.block_size_frames,
                ) {
                    Ok(c) => c,
                    Err(e) => {
                        attempts.push(Attempt {
                            device: device.clone(),
                            candidate,
                            error: e.to_string(),
                        });
                        continue;
                    }
                };
                debug!(%config, "trying audio configuration");
                match self.host.probe(&config) {
                    Ok(()) => {
                        info!(%config, "audio configuration works");
                        return Ok(config);
                    }
                    Err(e) => {
                        debug!(%config, "audio configuration failed: {e:#}");
                        attempts.push(Attempt {
                            device: device.clone(),
                            candidate,
                            error: format!("{e:#}"),
                        });
                    }
                }
            }
        }
        Err(NegotiationError::NoWorkingAudioConfig { attempts })
    }
}
