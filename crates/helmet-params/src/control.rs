use std::sync::Arc;

use tracing::info;

use crate::{EffectParameters, ParamError, ParameterStore, ParameterUpdate};

/// Get/set surface over the [`ParameterStore`] for an external transport.
#[derive(Debug, Clone)]
pub struct ControlChannel {
    store: Arc<ParameterStore>,
}

impl ControlChannel {
    pub fn new(store: Arc<ParameterStore>) -> Self {
        Self { store }
    }

    pub fn get_settings(&self) -> EffectParameters {
        self.store.get()
    }

    /// Applies a JSON body holding any subset of the settings keys.
    pub fn update_settings(&self, body: &[u8]) -> Result<EffectParameters, ParamError> {
        let update = ParameterUpdate::from_json(body)?;
        self.apply(&update)
    }

    pub fn apply(&self, update: &ParameterUpdate) -> Result<EffectParameters, ParamError> {
        let applied = self.store.set(update)?;
        info!(
            pitch_shift = applied.pitch_shift,
            distortion_gain = applied.distortion_gain,
            reverb_room_size = applied.reverb_amount,
            volume = applied.volume,
            "settings changed"
        );
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> ControlChannel {
        ControlChannel::new(Arc::new(ParameterStore::default()))
    }

    #[test]
    fn update_then_get() {
        let ctl = channel();
        ctl.update_settings(br#"{"distortion_gain": 3.0}"#).unwrap();
        let got = ctl.get_settings();
        assert_eq!(got.distortion_gain, 3.0);
        assert_eq!(got.volume, EffectParameters::default().volume);
    }

    #[test]
    fn rejected_update_keeps_previous_state() {
        let ctl = channel();
        let before = ctl.get_settings();
        assert!(ctl.update_settings(br#"{"volume": 2.0}"#).is_err());
        assert!(ctl.update_settings(br#"{"pitch_shift": 0.1, "volume": true}"#).is_err());
        assert_eq!(ctl.get_settings(), before);
    }

    #[test]
    fn clones_share_one_store() {
        let a = channel();
        let b = a.clone();
        a.update_settings(br#"{"volume": 0.1}"#).unwrap();
        assert_eq!(b.get_settings().volume, 0.1);
    }
}
