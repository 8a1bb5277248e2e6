use helmet_params::EffectParameters;

use super::stage::{Stage, StageError};

/// Linear output volume.
pub struct Volume;

impl Stage for Volume {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn process(
        &mut self,
        signal: &mut [f32],
        params: &EffectParameters,
        _sample_rate: u32,
    ) -> Result<(), StageError> {
        let g = params.volume;
        for s in signal.iter_mut() {
            *s *= g;
        }
        Ok(())
    }
}
