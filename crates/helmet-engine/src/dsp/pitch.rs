use helmet_params::EffectParameters;

use super::stage::{Stage, StageError};

/// Resampling pitch shift by `2^pitch_shift` with linear interpolation.
///
/// The resampled signal is truncated or zero-padded back to the block length,
/// so the block size never drifts.
#[derive(Default)]
pub struct PitchShift {
    scratch: Vec<f32>,
}

impl Stage for PitchShift {
    fn name(&self) -> &'static str {
        "pitch"
    }

    fn prepare(&mut self, _sample_rate: u32, max_frames: usize) {
        self.scratch.reserve(max_frames);
    }

    fn process(
        &mut self,
        signal: &mut [f32],
        params: &EffectParameters,
        _sample_rate: u32,
    ) -> Result<(), StageError> {
        let n = signal.len();
        if params.pitch_shift == 0.0 || n == 0 {
            return Ok(());
        }
        let ratio = 2f64.powf(f64::from(params.pitch_shift));
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(StageError::Unsupported("pitch ratio out of range"));
        }
        let resampled_len = (n as f64 / ratio) as usize;
        if resampled_len == 0 {
            return Ok(());
        }

        // Positions spread evenly over [0, n - 1]; only the first `n` are kept.
        let step = if resampled_len > 1 {
            (n - 1) as f64 / (resampled_len - 1) as f64
        } else {
            0.0
        };
        let kept = resampled_len.min(n);
        self.scratch.clear();
        for i in 0..kept {
            let pos = i as f64 * step;
            let lo = (pos.floor() as usize).min(n - 1);
            let hi = (lo + 1).min(n - 1);
            let frac = (pos - lo as f64) as f32;
            self.scratch.push(signal[lo] + (signal[hi] - signal[lo]) * frac);
        }

        signal[..kept].copy_from_slice(&self.scratch);
        signal[kept..].fill(0.0);
        Ok(())
    }
}
