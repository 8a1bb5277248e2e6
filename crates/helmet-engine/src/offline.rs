//! Non-real-time rendering of WAV files through the offline chain.

use std::path::Path;

use anyhow::{Context, Result};
use helmet_params::EffectParameters;
use tracing::info;

use crate::block::AudioBlock;
use crate::chain::{BlockOutcome, EffectChain};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSummary {
    pub frames: usize,
    pub channels: u16,
    pub sample_rate: u32,
    pub degraded_blocks: usize,
}

/// Renders `input` to a 32-bit float WAV at `output`, block by block.
pub fn render_file(
    input: &Path,
    output: &Path,
    params: &EffectParameters,
    block_frames: usize,
) -> Result<RenderSummary> {
    let mut reader = hound::WavReader::open(input)
        .with_context(|| format!("failed to open {}", input.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .context("failed to decode float samples")?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .context("failed to decode integer samples")?
        }
    };

    let out_spec = hound::WavSpec {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(output, out_spec)
        .with_context(|| format!("failed to create {}", output.display()))?;

    let block_frames = block_frames.max(1);
    let mut chain = EffectChain::offline(spec.sample_rate, block_frames);
    let mut block_in = AudioBlock::silent(block_frames, channels);
    let mut block_out = AudioBlock::silent(block_frames, channels);
    let mut degraded_blocks = 0;

    for chunk in samples.chunks(block_frames * channels) {
        block_in.copy_from_interleaved(chunk);
        block_out.set_frames(block_in.frames());
        if chain.process(&block_in, params, &mut block_out) != BlockOutcome::Processed {
            degraded_blocks += 1;
        }
        for &s in block_out.samples() {
            writer.write_sample(s)?;
        }
    }
    writer.finalize().context("failed to finalize output file")?;

    let summary = RenderSummary {
        frames: samples.len() / channels,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        degraded_blocks,
    };
    info!(
        input = %input.display(),
        output = %output.display(),
        frames = summary.frames,
        degraded_blocks,
        "render finished"
    );
    Ok(summary)
}
