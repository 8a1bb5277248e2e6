use biquad::{Biquad, Coefficients, DirectForm1, Hertz, Type};
use helmet_params::EffectParameters;

use super::stage::{Stage, StageError};

pub const FEEDBACK_NOTCH_HZ: f32 = 1000.0;
pub const FEEDBACK_NOTCH_Q: f32 = 30.0;

/// Second-order IIR notch that suppresses mic/speaker feedback resonance.
///
/// Filter state starts from zero on every block.
pub struct NotchFilter {
    center_hz: f32,
    q: f32,
}

impl NotchFilter {
    pub fn new(center_hz: f32, q: f32) -> Self {
        Self { center_hz, q }
    }

    fn coefficients(&self, sample_rate: u32) -> Result<Coefficients<f32>, StageError> {
        let fs = sample_rate as f32;
        // The normalized center must sit strictly inside (0, Nyquist).
        if self.center_hz <= 0.0 || self.center_hz >= fs / 2.0 {
            return Err(StageError::Unsupported("notch frequency outside (0, Nyquist)"));
        }
        let fs = Hertz::<f32>::from_hz(fs)
            .map_err(|_| StageError::Unsupported("invalid sample rate"))?;
        let f0 = Hertz::<f32>::from_hz(self.center_hz)
            .map_err(|_| StageError::Unsupported("invalid notch frequency"))?;
        Coefficients::<f32>::from_params(Type::Notch, fs, f0, self.q)
            .map_err(|_| StageError::Unsupported("notch coefficients out of range"))
    }
}

impl Default for NotchFilter {
    fn default() -> Self {
        Self::new(FEEDBACK_NOTCH_HZ, FEEDBACK_NOTCH_Q)
    }
}

impl Stage for NotchFilter {
    fn name(&self) -> &'static str {
        "notch"
    }

    fn process(
        &mut self,
        signal: &mut [f32],
        _params: &EffectParameters,
        sample_rate: u32,
    ) -> Result<(), StageError> {
        let mut filter = DirectForm1::<f32>::new(self.coefficients(sample_rate)?);
        for s in signal.iter_mut() {
            *s = filter.run(*s);
        }
        Ok(())
    }
}
