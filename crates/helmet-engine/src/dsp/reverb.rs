//! Schroeder room reverb used by the offline renderer.
//!
//! Four parallel damped combs feed two series all-passes. Unlike the real-time
//! stages this one keeps its delay lines across blocks, so a rendered file gets
//! a continuous tail.

use helmet_params::EffectParameters;

use super::stage::{Stage, StageError};

const COMB_TUNING: [usize; 4] = [1116, 1188, 1277, 1356];
const ALLPASS_TUNING: [usize; 2] = [556, 441];
const TUNING_RATE: f32 = 44_100.0;
const DAMPING: f32 = 0.2;
const ALLPASS_FEEDBACK: f32 = 0.5;
const MAX_WET: f32 = 0.35;

struct Comb {
    buf: Vec<f32>,
    pos: usize,
    store: f32,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self { buf: vec![0.0; len.max(1)], pos: 0, store: 0.0 }
    }

    #[inline]
    fn tick(&mut self, x: f32, feedback: f32) -> f32 {
        let out = self.buf[self.pos];
        self.store = out * (1.0 - DAMPING) + self.store * DAMPING;
        self.buf[self.pos] = x + self.store * feedback;
        self.pos = (self.pos + 1) % self.buf.len();
        out
    }
}

struct AllPass {
    buf: Vec<f32>,
    pos: usize,
}

impl AllPass {
    fn new(len: usize) -> Self {
        Self { buf: vec![0.0; len.max(1)], pos: 0 }
    }

    #[inline]
    fn tick(&mut self, x: f32) -> f32 {
        let delayed = self.buf[self.pos];
        self.buf[self.pos] = x + delayed * ALLPASS_FEEDBACK;
        self.pos = (self.pos + 1) % self.buf.len();
        delayed - x
    }
}

/// Mixes a room tail into the signal in proportion to `reverb_amount`.
#[derive(Default)]
pub struct RoomReverb {
    combs: Vec<Comb>,
    allpasses: Vec<AllPass>,
}

impl Stage for RoomReverb {
    fn name(&self) -> &'static str {
        "reverb"
    }

    fn prepare(&mut self, sample_rate: u32, _max_frames: usize) {
        let scale = sample_rate as f32 / TUNING_RATE;
        let scaled = |len: usize| (len as f32 * scale).round() as usize;
        self.combs = COMB_TUNING.iter().map(|&l| Comb::new(scaled(l))).collect();
        self.allpasses = ALLPASS_TUNING.iter().map(|&l| AllPass::new(scaled(l))).collect();
    }

    fn process(
        &mut self,
        signal: &mut [f32],
        params: &EffectParameters,
        _sample_rate: u32,
    ) -> Result<(), StageError> {
        let room = params.reverb_amount;
        if room <= 0.0 {
            return Ok(());
        }
        if self.combs.is_empty() {
            return Err(StageError::Unsupported("reverb used before prepare"));
        }
        let feedback = 0.7 + 0.28 * room;
        let wet = MAX_WET * room;
        let comb_scale = 1.0 / self.combs.len() as f32;
        for s in signal.iter_mut() {
            let x = *s;
            let mut acc = 0.0;
            for comb in &mut self.combs {
                acc += comb.tick(x, feedback);
            }
            let mut y = acc * comb_scale;
            for ap in &mut self.allpasses {
                y = ap.tick(y);
            }
            *s = x * (1.0 - wet) + y * wet;
        }
        Ok(())
    }
}
