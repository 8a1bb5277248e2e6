use helmet_params::EffectParameters;
use thiserror::Error;

/// Numerical failure inside one stage. Never leaves the chain.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StageError {
    #[error("stage produced non-finite samples")]
    NonFinite,
    #[error("unsupported configuration: {0}")]
    Unsupported(&'static str),
}

/// Real-time safe processing stage.
/// - process() must not allocate past what prepare() reserved, and must not lock.
/// - `signal` is the mono working signal, nominally in [-1, 1].
pub trait Stage: Send {
    fn name(&self) -> &'static str;

    fn prepare(&mut self, _sample_rate: u32, _max_frames: usize) {}

    fn process(
        &mut self,
        signal: &mut [f32],
        params: &EffectParameters,
        sample_rate: u32,
    ) -> Result<(), StageError>;
}
