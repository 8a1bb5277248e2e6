use helmet_params::EffectParameters;

use super::stage::{Stage, StageError};

/// `tanh(x * g) / g`: output stays bounded by `1 / g` whatever the gain.
pub struct Saturation;

impl Stage for Saturation {
    fn name(&self) -> &'static str {
        "distortion"
    }

    fn process(
        &mut self,
        signal: &mut [f32],
        params: &EffectParameters,
        _sample_rate: u32,
    ) -> Result<(), StageError> {
        let g = params.distortion_gain;
        if g > 1.0 {
            for s in signal.iter_mut() {
                *s = (*s * g).tanh() / g;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unity_gain_is_a_no_op() {
        let mut sig = vec![0.9, -0.3, 0.0, 0.42];
        let params = EffectParameters { distortion_gain: 1.0, ..EffectParameters::neutral() };
        Saturation.process(&mut sig, &params, 44_100).unwrap();
        assert_eq!(sig, vec![0.9, -0.3, 0.0, 0.42]);
    }

    #[test]
    fn output_is_bounded_by_inverse_gain() {
        let mut sig = vec![1.0, -1.0, 50.0];
        let params = EffectParameters { distortion_gain: 4.0, ..EffectParameters::neutral() };
        Saturation.process(&mut sig, &params, 44_100).unwrap();
        assert!(sig.iter().all(|s| s.abs() <= 0.25));
    }
}
