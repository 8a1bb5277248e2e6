use parking_lot::Mutex;
use tracing::debug;

use crate::{EffectParameters, ParamError, ParameterUpdate};

/// Effect parameters behind one lock.
///
/// The lock is only held for a struct copy or a field assignment, so the audio
/// thread never waits longer than that on the control path.
#[derive(Debug, Default)]
pub struct ParameterStore {
    inner: Mutex<EffectParameters>,
}

impl ParameterStore {
    pub fn new(initial: EffectParameters) -> Result<Self, ParamError> {
        initial.validate()?;
        Ok(Self { inner: Mutex::new(initial) })
    }

    /// Snapshot of all four fields taken in a single critical section.
    #[inline]
    pub fn get(&self) -> EffectParameters {
        *self.inner.lock()
    }

    /// Applies `update` atomically: either every provided field is written or,
    /// if any of them is out of its domain, nothing is.
    pub fn set(&self, update: &ParameterUpdate) -> Result<EffectParameters, ParamError> {
        update.validate()?;
        let applied = {
            let mut guard = self.inner.lock();
            update.apply_to(&mut guard);
            *guard
        };
        debug!(?applied, "effect parameters updated");
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn out_of_range_volume_is_rejected_atomically() {
        let store = ParameterStore::default();
        let before = store.get();
        let update = ParameterUpdate {
            pitch_shift: Some(0.5),
            volume: Some(1.7),
            ..Default::default()
        };
        assert!(matches!(
            store.set(&update),
            Err(ParamError::InvalidParameter { field: "volume", .. })
        ));
        assert_eq!(store.get(), before);
    }

    #[test]
    fn omitted_fields_are_left_unchanged() {
        let store = ParameterStore::new(EffectParameters::neutral()).unwrap();
        store
            .set(&ParameterUpdate { volume: Some(0.3), ..Default::default() })
            .unwrap();
        let got = store.get();
        assert_eq!(got.volume, 0.3);
        assert_eq!(got.pitch_shift, 0.0);
        assert_eq!(got.distortion_gain, 1.0);
        assert_eq!(got.reverb_amount, 0.0);
    }

    #[test]
    fn rejects_invalid_initial_values() {
        let bad = EffectParameters { volume: 4.0, ..Default::default() };
        assert!(ParameterStore::new(bad).is_err());
    }

    #[test]
    fn many_concurrent_writers_keep_snapshots_consistent() {
        const ROUNDS: usize = 2_000;
        const PER_FIELD: usize = 4;
        const WRITERS: usize = 4 * PER_FIELD;

        // Inside the most restrictive domain; distinct per writer on the last round.
        fn value(writer: usize, round: usize) -> f32 {
            0.1 + 0.2 * writer as f32 + (round % 10) as f32 * 0.01
        }

        let store = Arc::new(ParameterStore::new(EffectParameters::neutral()).unwrap());
        let barrier = Arc::new(Barrier::new(WRITERS));

        let writers: Vec<_> = (0..WRITERS)
            .map(|t| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                let (field, writer) = (t % 4, t / 4);
                thread::spawn(move || {
                    barrier.wait();
                    for round in 0..ROUNDS {
                        let v = value(writer, round);
                        let mut u = ParameterUpdate::default();
                        match field {
                            0 => u.pitch_shift = Some(v),
                            1 => u.distortion_gain = Some(v + 1.0),
                            2 => u.reverb_amount = Some(v),
                            _ => u.volume = Some(v),
                        }
                        // `set` reports the values as of its own critical section.
                        let applied = store.set(&u).unwrap();
                        match field {
                            0 => assert_eq!(applied.pitch_shift, v),
                            1 => assert_eq!(applied.distortion_gain, v + 1.0),
                            2 => assert_eq!(applied.reverb_amount, v),
                            _ => assert_eq!(applied.volume, v),
                        }
                        store.get().validate().unwrap();
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        let finals: Vec<f32> = (0..PER_FIELD).map(|w| value(w, ROUNDS - 1)).collect();
        let got = store.get();
        assert!(finals.contains(&got.pitch_shift), "pitch {}", got.pitch_shift);
        assert!(finals.iter().any(|&v| v + 1.0 == got.distortion_gain));
        assert!(finals.contains(&got.reverb_amount), "reverb {}", got.reverb_amount);
        assert!(finals.contains(&got.volume), "volume {}", got.volume);
    }
}
