use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use helmet_params::ParameterStore;
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, warn};

use crate::block::StreamConfig;
use crate::processor::{BlockProcessor, StreamStats};

/// Capability summary for one audio device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub max_input_channels: u16,
    pub max_output_channels: u16,
    pub default_sample_rate: Option<u32>,
    pub is_default_input: bool,
    pub is_default_output: bool,
}

impl DeviceInfo {
    /// Only full-duplex devices can carry the voice changer.
    pub fn is_duplex(&self) -> bool {
        self.max_input_channels >= 1 && self.max_output_channels >= 1
    }

    pub fn matches_any(&self, patterns: &[String]) -> bool {
        let name = self.name.to_lowercase();
        patterns.iter().any(|p| name.contains(&p.to_lowercase()))
    }
}

/// The audio I/O layer the engine drives.
///
/// Dropping (or [`AudioHost::close`]-ing) a stream handle stops it; in-flight
/// callbacks finish on their own.
pub trait AudioHost {
    type Stream;

    fn query_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Opens a running duplex stream that feeds every captured block through
    /// `processor` and plays the result.
    fn open_duplex(&self, config: &StreamConfig, processor: BlockProcessor) -> Result<Self::Stream>;

    fn close(&self, stream: Self::Stream) {
        drop(stream);
    }

    /// Opens and immediately closes a stream to see whether `config` works.
    fn probe(&self, config: &StreamConfig) -> Result<()> {
        let processor = BlockProcessor::new(
            config,
            Arc::new(ParameterStore::default()),
            Arc::new(StreamStats::default()),
        );
        let stream = self.open_duplex(config, processor)?;
        self.close(stream);
        Ok(())
    }
}

/// [`AudioHost`] backed by the platform's default cpal host.
pub struct CpalHost {
    host: cpal::Host,
}

impl Default for CpalHost {
    fn default() -> Self {
        Self { host: cpal::default_host() }
    }
}

/// Input and output halves joined by a sample ring. Dropping it stops both.
pub struct CpalDuplex {
    _input: cpal::Stream,
    _output: cpal::Stream,
}

impl CpalHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve(&self, name: Option<&str>) -> Result<(cpal::Device, cpal::Device)> {
        match name {
            Some(wanted) => {
                let device = self
                    .host
                    .devices()?
                    .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                    .with_context(|| format!("device `{wanted}` not found"))?;
                Ok((device.clone(), device))
            }
            None => {
                let input = self
                    .host
                    .default_input_device()
                    .context("no default input device")?;
                let output = self
                    .host
                    .default_output_device()
                    .context("no default output device")?;
                Ok((input, output))
            }
        }
    }
}

impl AudioHost for CpalHost {
    type Stream = CpalDuplex;

    fn query_devices(&self) -> Result<Vec<DeviceInfo>> {
        let default_in = self.host.default_input_device().and_then(|d| d.name().ok());
        let default_out = self.host.default_output_device().and_then(|d| d.name().ok());

        let mut out = Vec::new();
        for dev in self.host.devices()? {
            let name = dev.name().unwrap_or_else(|_| "<unknown>".to_string());
            let max_input_channels = dev
                .supported_input_configs()
                .map(|cfgs| cfgs.map(|c| c.channels()).max().unwrap_or(0))
                .unwrap_or(0);
            let max_output_channels = dev
                .supported_output_configs()
                .map(|cfgs| cfgs.map(|c| c.channels()).max().unwrap_or(0))
                .unwrap_or(0);
            let default_sample_rate = dev
                .default_input_config()
                .or_else(|_| dev.default_output_config())
                .map(|c| c.sample_rate().0)
                .ok();
            out.push(DeviceInfo {
                is_default_input: default_in.as_deref() == Some(name.as_str()),
                is_default_output: default_out.as_deref() == Some(name.as_str()),
                name,
                max_input_channels,
                max_output_channels,
                default_sample_rate,
            });
        }
        Ok(out)
    }

    fn open_duplex(&self, config: &StreamConfig, processor: BlockProcessor) -> Result<CpalDuplex> {
        let (in_dev, out_dev) = self.resolve(config.device.as_deref())?;

        let in_format = in_dev
            .default_input_config()
            .context("no default input config")?
            .sample_format();
        let out_format = out_dev
            .default_output_config()
            .context("no default output config")?
            .sample_format();

        let stream_cfg = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate_hz),
            buffer_size: cpal::BufferSize::Fixed(config.block_size_frames),
        };

        // Eight blocks of slack between capture and playback.
        let block_samples = config.block_size_frames as usize * usize::from(config.channels);
        let (mut producer, consumer) = RingBuffer::<f32>::new(block_samples * 8);
        // One block of silence up front so playback does not start on an underrun.
        for _ in 0..block_samples {
            let _ = producer.push(0.0);
        }
        let stats = Arc::clone(processor.stats());

        let input = match in_format {
            SampleFormat::F32 => build_input::<f32>(&in_dev, &stream_cfg, processor, producer, block_samples),
            SampleFormat::I16 => build_input::<i16>(&in_dev, &stream_cfg, processor, producer, block_samples),
            SampleFormat::U16 => build_input::<u16>(&in_dev, &stream_cfg, processor, producer, block_samples),
            other => Err(anyhow!("unsupported input format: {other:?}")),
        }?;
        let output = match out_format {
            SampleFormat::F32 => build_output::<f32>(&out_dev, &stream_cfg, consumer, stats),
            SampleFormat::I16 => build_output::<i16>(&out_dev, &stream_cfg, consumer, stats),
            SampleFormat::U16 => build_output::<u16>(&out_dev, &stream_cfg, consumer, stats),
            other => Err(anyhow!("unsupported output format: {other:?}")),
        }?;

        input.play().context("failed to play input stream")?;
        output.play().context("failed to play output stream")?;
        debug!(%config, ?in_format, ?out_format, "duplex stream open");

        Ok(CpalDuplex { _input: input, _output: output })
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut processor: BlockProcessor,
    mut ring: Producer<f32>,
    block_samples: usize,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let stats = Arc::clone(processor.stats());
    let err_stats = Arc::clone(&stats);
    let mut captured = Vec::<f32>::with_capacity(block_samples);
    let mut processed = Vec::<f32>::with_capacity(block_samples);

    let stream = device.build_input_stream::<T, _, _>(
        config,
        move |data: &[T], _| {
            captured.clear();
            captured.extend(data.iter().map(|&s| f32::from_sample(s)));
            processed.resize(captured.len(), 0.0);
            processor.process_interleaved(&captured, &mut processed);

            if ring.slots() < processed.len() {
                stats.record_overrun();
                return;
            }
            for &s in &processed {
                let _ = ring.push(s);
            }
        },
        move |err| {
            err_stats.record_device_error();
            warn!("input stream error: {err}");
        },
        None,
    )?;
    Ok(stream)
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut ring: Consumer<f32>,
    stats: Arc<StreamStats>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let err_stats = Arc::clone(&stats);
    let stream = device.build_output_stream::<T, _, _>(
        config,
        move |out: &mut [T], _| {
            if ring.slots() < out.len() {
                stats.record_underrun();
                out.fill(T::EQUILIBRIUM);
                return;
            }
            for o in out.iter_mut() {
                *o = T::from_sample(ring.pop().unwrap_or(0.0).clamp(-1.0, 1.0));
            }
        },
        move |err| {
            err_stats.record_device_error();
            warn!("output stream error: {err}");
        },
        None,
    )?;
    Ok(stream)
}

/// Pretty-print for CLI
pub fn print_devices(host: &impl AudioHost, patterns: &[String]) -> Result<()> {
    let list = host.query_devices()?;
    if list.is_empty() {
        println!("(no devices found)");
        return Ok(());
    }
    for (i, d) in list.iter().enumerate() {
        let mut marks = Vec::new();
        if d.is_default_input {
            marks.push("*I");
        }
        if d.is_default_output {
            marks.push("*O");
        }
        if d.is_duplex() && d.matches_any(patterns) {
            marks.push("pref");
        }
        if !marks.is_empty() {
            print!("[{}] ", marks.join(" "));
        }
        let rate = d
            .default_sample_rate
            .map(|r| format!("{r} Hz"))
            .unwrap_or_else(|| "? Hz".to_string());
        println!(
            "{:>2}  {}  (in: {} ch, out: {} ch, {})",
            i, d.name, d.max_input_channels, d.max_output_channels, rate
        );
    }
    Ok(())
}
