//! Effect parameters shared between the control path and the audio path.
//!
//! [`ParameterStore`] is the only shared-mutable object in the voice changer.
//! The audio callback takes a [`EffectParameters`] snapshot once per block; the
//! control server applies [`ParameterUpdate`]s through a [`ControlChannel`].

pub mod control;
pub mod store;

pub use control::ControlChannel;
pub use store::ParameterStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// JSON keys used by the control transport.
pub const FIELD_PITCH_SHIFT: &str = "pitch_shift";
pub const FIELD_DISTORTION_GAIN: &str = "distortion_gain";
pub const FIELD_REVERB_ROOM_SIZE: &str = "reverb_room_size";
pub const FIELD_VOLUME: &str = "volume";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParamError {
    #[error("invalid value for `{field}`: {reason}")]
    InvalidParameter { field: &'static str, reason: String },
    #[error("malformed settings payload: {0}")]
    Malformed(String),
}

/// Current effect settings. Always holds the last validated values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectParameters {
    /// Octave-scaled resampling exponent; the pitch ratio is `2^pitch_shift`.
    #[serde(default = "default_pitch_shift")]
    pub pitch_shift: f32,
    /// `1.0` disables the saturation stage.
    #[serde(default = "default_distortion_gain")]
    pub distortion_gain: f32,
    #[serde(rename = "reverb_room_size", default = "default_reverb_amount")]
    pub reverb_amount: f32,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

fn default_pitch_shift() -> f32 {
    -0.3
}

fn default_distortion_gain() -> f32 {
    1.5
}

fn default_reverb_amount() -> f32 {
    0.5
}

fn default_volume() -> f32 {
    0.8
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self {
            pitch_shift: default_pitch_shift(),
            distortion_gain: default_distortion_gain(),
            reverb_amount: default_reverb_amount(),
            volume: default_volume(),
        }
    }
}

impl EffectParameters {
    /// Parameters that leave a signal untouched apart from the notch filter.
    pub fn neutral() -> Self {
        Self { pitch_shift: 0.0, distortion_gain: 1.0, reverb_amount: 0.0, volume: 1.0 }
    }

    /// Checks every field against its domain.
    pub fn validate(&self) -> Result<(), ParamError> {
        ParameterUpdate::from(*self).validate()
    }
}

/// A partial update. `None` leaves the stored field unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParameterUpdate {
    pub pitch_shift: Option<f32>,
    pub distortion_gain: Option<f32>,
    pub reverb_amount: Option<f32>,
    pub volume: Option<f32>,
}

impl From<EffectParameters> for ParameterUpdate {
    fn from(p: EffectParameters) -> Self {
        Self {
            pitch_shift: Some(p.pitch_shift),
            distortion_gain: Some(p.distortion_gain),
            reverb_amount: Some(p.reverb_amount),
            volume: Some(p.volume),
        }
    }
}

impl ParameterUpdate {
    pub fn is_empty(&self) -> bool {
        self.pitch_shift.is_none()
            && self.distortion_gain.is_none()
            && self.reverb_amount.is_none()
            && self.volume.is_none()
    }

    /// Parses a JSON object holding any subset of the wire keys.
    ///
    /// Values must be JSON numbers; `null` counts as omitted and unknown keys
    /// are ignored.
    pub fn from_json(body: &[u8]) -> Result<Self, ParamError> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| ParamError::Malformed(e.to_string()))?;
        let obj = value
            .as_object()
            .ok_or_else(|| ParamError::Malformed("expected a JSON object".to_string()))?;

        let field = |name: &'static str| -> Result<Option<f32>, ParamError> {
            match obj.get(name) {
                None | Some(serde_json::Value::Null) => Ok(None),
                Some(serde_json::Value::Number(n)) => n
                    .as_f64()
                    .map(|v| Some(v as f32))
                    .ok_or_else(|| invalid(name, "not representable as a float")),
                Some(other) => Err(invalid(name, &format!("expected a number, got {other}"))),
            }
        };

        Ok(Self {
            pitch_shift: field(FIELD_PITCH_SHIFT)?,
            distortion_gain: field(FIELD_DISTORTION_GAIN)?,
            reverb_amount: field(FIELD_REVERB_ROOM_SIZE)?,
            volume: field(FIELD_VOLUME)?,
        })
    }

    /// Rejects the whole update if any provided field is outside its domain.
    pub fn validate(&self) -> Result<(), ParamError> {
        if let Some(v) = self.pitch_shift {
            finite(FIELD_PITCH_SHIFT, v)?;
        }
        if let Some(v) = self.distortion_gain {
            finite(FIELD_DISTORTION_GAIN, v)?;
            if v < 1.0 {
                return Err(invalid(FIELD_DISTORTION_GAIN, &format!("{v} is below 1.0")));
            }
        }
        if let Some(v) = self.reverb_amount {
            unit_range(FIELD_REVERB_ROOM_SIZE, v)?;
        }
        if let Some(v) = self.volume {
            unit_range(FIELD_VOLUME, v)?;
        }
        Ok(())
    }

    pub(crate) fn apply_to(&self, params: &mut EffectParameters) {
        if let Some(v) = self.pitch_shift {
            params.pitch_shift = v;
        }
        if let Some(v) = self.distortion_gain {
            params.distortion_gain = v;
        }
        if let Some(v) = self.reverb_amount {
            params.reverb_amount = v;
        }
        if let Some(v) = self.volume {
            params.volume = v;
        }
    }
}

fn invalid(field: &'static str, reason: &str) -> ParamError {
    ParamError::InvalidParameter { field, reason: reason.to_string() }
}

fn finite(field: &'static str, v: f32) -> Result<(), ParamError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, "must be finite"))
    }
}

fn unit_range(field: &'static str, v: f32) -> Result<(), ParamError> {
    finite(field, v)?;
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(invalid(field, &format!("{v} is outside [0, 1]")))
    }
}
