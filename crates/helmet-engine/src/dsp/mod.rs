pub mod gain;
pub mod notch;
pub mod pitch;
pub mod reverb;
pub mod saturate;
pub mod stage;

pub use gain::Volume;
pub use notch::NotchFilter;
pub use pitch::PitchShift;
pub use reverb::RoomReverb;
pub use saturate::Saturation;
pub use stage::{Stage, StageError};
