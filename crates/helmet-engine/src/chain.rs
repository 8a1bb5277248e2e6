use helmet_params::EffectParameters;

use crate::block::AudioBlock;
use crate::dsp::{NotchFilter, PitchShift, RoomReverb, Saturation, Stage, StageError, Volume};

/// Gain applied to the raw input when a processed block cannot be written back.
pub const MISMATCH_PASSTHROUGH_GAIN: f32 = 0.5;

/// What replaces a stage's output when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageFallback {
    /// The signal as it was before the failed stage.
    PassThrough,
    Silence,
}

/// Fail-open policy for the chain.
#[derive(Debug, Clone)]
pub struct FailurePolicy {
    overrides: Vec<(&'static str, StageFallback)>,
    default: StageFallback,
    /// Attenuation of the raw input on a block-level mismatch.
    pub mismatch_gain: f32,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            overrides: Vec::new(),
            default: StageFallback::PassThrough,
            mismatch_gain: MISMATCH_PASSTHROUGH_GAIN,
        }
    }
}

impl FailurePolicy {
    pub fn with_fallback(mut self, stage: &'static str, fallback: StageFallback) -> Self {
        self.overrides.retain(|(name, _)| *name != stage);
        self.overrides.push((stage, fallback));
        self
    }

    pub fn fallback_for(&self, stage: &str) -> StageFallback {
        self.overrides
            .iter()
            .find(|(name, _)| *name == stage)
            .map(|(_, f)| *f)
            .unwrap_or(self.default)
    }
}

/// Result of one block through the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    Processed,
    /// Some stages failed and were replaced by their fallback.
    Degraded { failed_stages: u32 },
    /// The processed signal did not fit the output block; the output holds the
    /// attenuated raw input instead.
    Mismatch,
}

/// A serial chain of stages over a mono working signal. Owns the stages.
///
/// Per block: mix down to mono, run each stage, broadcast back to the output
/// channel count. The chain keeps scratch buffers only; its output depends on
/// nothing but the input block and the parameters.
pub struct EffectChain {
    stages: Vec<Box<dyn Stage>>,
    policy: FailurePolicy,
    sample_rate: u32,
    max_frames: usize,
    mono: Vec<f32>,
    backup: Vec<f32>,
}

impl EffectChain {
    pub fn new(sample_rate: u32, max_frames: usize) -> Self {
        Self {
            stages: Vec::new(),
            policy: FailurePolicy::default(),
            sample_rate,
            max_frames,
            mono: Vec::with_capacity(max_frames),
            backup: Vec::with_capacity(max_frames),
        }
    }

    /// notch → pitch → distortion → volume.
    pub fn realtime(sample_rate: u32, max_frames: usize) -> Self {
        let mut chain = Self::new(sample_rate, max_frames);
        chain.push(Box::new(NotchFilter::default()));
        chain.push(Box::new(PitchShift::default()));
        chain.push(Box::new(Saturation));
        chain.push(Box::new(Volume));
        chain
    }

    /// The real-time chain plus a room reverb ahead of the volume stage.
    pub fn offline(sample_rate: u32, max_frames: usize) -> Self {
        let mut chain = Self::new(sample_rate, max_frames);
        chain.push(Box::new(NotchFilter::default()));
        chain.push(Box::new(PitchShift::default()));
        chain.push(Box::new(Saturation));
        chain.push(Box::new(RoomReverb::default()));
        chain.push(Box::new(Volume));
        chain
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn push(&mut self, mut stage: Box<dyn Stage>) {
        stage.prepare(self.sample_rate, self.max_frames);
        self.stages.push(stage);
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.stages.iter().map(|s| s.name())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Processes `input` into `output`. Never fails: stage failures fall back
    /// per the policy, and a shape mismatch yields attenuated pass-through.
    pub fn process(
        &mut self,
        input: &AudioBlock,
        params: &EffectParameters,
        output: &mut AudioBlock,
    ) -> BlockOutcome {
        input.mix_to_mono(&mut self.mono);

        let mut failed_stages = 0;
        for stage in self.stages.iter_mut() {
            self.backup.clear();
            self.backup.extend_from_slice(&self.mono);
            let result = stage
                .process(&mut self.mono, params, self.sample_rate)
                .and_then(|()| ensure_finite(&self.mono));
            if result.is_err() {
                failed_stages += 1;
                match self.policy.fallback_for(stage.name()) {
                    StageFallback::PassThrough => self.mono.copy_from_slice(&self.backup),
                    StageFallback::Silence => self.mono.fill(0.0),
                }
            }
        }

        if self.mono.len() != output.frames() {
            output.attenuated_copy_from(input, self.policy.mismatch_gain);
            return BlockOutcome::Mismatch;
        }
        output.broadcast_from_mono(&self.mono);

        if failed_stages == 0 {
            BlockOutcome::Processed
        } else {
            BlockOutcome::Degraded { failed_stages }
        }
    }

    /// Allocating convenience wrapper around [`EffectChain::process`].
    pub fn render(
        &mut self,
        input: &AudioBlock,
        params: &EffectParameters,
        out_channels: usize,
    ) -> (AudioBlock, BlockOutcome) {
        let mut out = AudioBlock::silent(input.frames(), out_channels);
        let outcome = self.process(input, params, &mut out);
        (out, outcome)
    }
}

fn ensure_finite(signal: &[f32]) -> Result<(), StageError> {
    if signal.iter().all(|s| s.is_finite()) {
        Ok(())
    } else {
        Err(StageError::NonFinite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const SR: u32 = 44_100;

    struct Exploding;

    impl Stage for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }
        fn process(
            &mut self,
            signal: &mut [f32],
            _params: &EffectParameters,
            _sample_rate: u32,
        ) -> Result<(), StageError> {
            signal.fill(f32::NAN);
            Ok(())
        }
    }

    struct Refusing;

    impl Stage for Refusing {
        fn name(&self) -> &'static str {
            "refusing"
        }
        fn process(
            &mut self,
            signal: &mut [f32],
            _params: &EffectParameters,
            _sample_rate: u32,
        ) -> Result<(), StageError> {
            signal.fill(9.0);
            Err(StageError::Unsupported("test"))
        }
    }

    fn param_grid() -> Vec<EffectParameters> {
        let mut grid = Vec::new();
        for pitch_shift in [-1.0, -0.3, 0.0, 0.7] {
            for distortion_gain in [1.0, 1.5, 8.0] {
                for volume in [0.0, 0.5, 1.0] {
                    grid.push(EffectParameters {
                        pitch_shift,
                        distortion_gain,
                        reverb_amount: 0.5,
                        volume,
                    });
                }
            }
        }
        grid
    }

    #[test]
    fn silence_stays_silent() {
        let mut chain = EffectChain::realtime(SR, 1024);
        let input = AudioBlock::silent(1024, 2);
        for params in param_grid() {
            let (out, outcome) = chain.render(&input, &params, 2);
            assert_eq!(outcome, BlockOutcome::Processed);
            assert!(out.samples().iter().all(|&s| s == 0.0), "{params:?}");
        }
    }

    #[test]
    fn zero_volume_mutes_everything() {
        let mut chain = EffectChain::realtime(SR, 512);
        let samples: Vec<f32> = (0..512).map(|i| ((i as f32) * 0.05).sin()).collect();
        let input = AudioBlock::from_interleaved(samples, 1);
        for params in param_grid().into_iter().filter(|p| p.volume == 0.0) {
            let (out, _) = chain.render(&input, &params, 1);
            assert!(out.samples().iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn dc_block_at_half_volume() {
        let mut chain = EffectChain::realtime(SR, 1024);
        let input = AudioBlock::from_interleaved(vec![0.1; 1024], 1);
        let params = EffectParameters {
            pitch_shift: 0.0,
            distortion_gain: 1.0,
            reverb_amount: 0.5,
            volume: 0.5,
        };
        let (out, outcome) = chain.render(&input, &params, 1);
        assert_eq!(outcome, BlockOutcome::Processed);
        assert_eq!(out.frames(), 1024);
        for &s in out.samples() {
            assert_abs_diff_eq!(s, 0.05, epsilon = 5e-3);
        }
    }

    #[test]
    fn stereo_in_is_mixed_and_broadcast() {
        let mut chain = EffectChain::new(SR, 4);
        chain.push(Box::new(Volume));
        let input = AudioBlock::from_interleaved(vec![1.0, 0.0, 0.0, 1.0], 2);
        let params = EffectParameters { volume: 0.5, ..EffectParameters::neutral() };
        let (out, _) = chain.render(&input, &params, 2);
        assert_eq!(out.samples(), &[0.25, 0.25, 0.25, 0.25]);
    }

    #[test]
    fn notch_is_skipped_at_low_sample_rates() {
        let mut chain = EffectChain::realtime(1500, 256);
        let input = AudioBlock::from_interleaved(vec![0.2; 256], 1);
        let params = EffectParameters { volume: 0.5, ..EffectParameters::neutral() };
        let (out, outcome) = chain.render(&input, &params, 1);
        assert_eq!(outcome, BlockOutcome::Degraded { failed_stages: 1 });
        for &s in out.samples() {
            assert_abs_diff_eq!(s, 0.1, epsilon = 1e-6);
        }
    }

    #[test]
    fn failing_stages_pass_the_previous_signal_through() {
        let mut chain = EffectChain::new(SR, 4);
        chain.push(Box::new(Exploding));
        chain.push(Box::new(Refusing));
        chain.push(Box::new(Volume));
        let input = AudioBlock::from_interleaved(vec![0.4; 4], 1);
        let params = EffectParameters { volume: 0.5, ..EffectParameters::neutral() };
        let (out, outcome) = chain.render(&input, &params, 1);
        assert_eq!(outcome, BlockOutcome::Degraded { failed_stages: 2 });
        assert_eq!(out.samples(), &[0.2; 4]);
    }

    #[test]
    fn policy_can_silence_a_stage() {
        let policy = FailurePolicy::default().with_fallback("refusing", StageFallback::Silence);
        let mut chain = EffectChain::new(SR, 4).with_policy(policy);
        chain.push(Box::new(Refusing));
        let input = AudioBlock::from_interleaved(vec![0.4; 4], 1);
        let (out, _) = chain.render(&input, &EffectParameters::neutral(), 1);
        assert_eq!(out.samples(), &[0.0; 4]);
    }

    #[test]
    fn mismatched_output_gets_attenuated_input() {
        let mut chain = EffectChain::realtime(SR, 8);
        let input = AudioBlock::from_interleaved(vec![0.8; 8], 2);
        let mut output = AudioBlock::silent(6, 2);
        let outcome = chain.process(&input, &EffectParameters::default(), &mut output);
        assert_eq!(outcome, BlockOutcome::Mismatch);
        assert_eq!(&output.samples()[..8], &[0.4; 8]);
        assert_eq!(&output.samples()[8..], &[0.0; 4]);
    }

    #[test]
    fn offline_chain_adds_reverb() {
        let names: Vec<_> = EffectChain::offline(SR, 64).stage_names().collect();
        assert_eq!(names, ["notch", "pitch", "distortion", "reverb", "volume"]);
        let names: Vec<_> = EffectChain::realtime(SR, 64).stage_names().collect();
        assert_eq!(names, ["notch", "pitch", "distortion", "volume"]);
    }
}
