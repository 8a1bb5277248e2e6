use std::ops::Sub;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use helmet_params::ParameterStore;

use crate::block::{AudioBlock, StreamConfig};
use crate::chain::{BlockOutcome, EffectChain};

/// Counters written by the audio thread and read by the supervisor.
///
/// The callback never logs; these are the only trace of trouble on the hot path.
#[derive(Debug, Default)]
pub struct StreamStats {
    blocks: AtomicU64,
    degraded_blocks: AtomicU64,
    stage_failures: AtomicU64,
    mismatches: AtomicU64,
    panics: AtomicU64,
    overruns: AtomicU64,
    underruns: AtomicU64,
    device_errors: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub blocks: u64,
    pub degraded_blocks: u64,
    pub stage_failures: u64,
    pub mismatches: u64,
    pub panics: u64,
    pub overruns: u64,
    pub underruns: u64,
    pub device_errors: u64,
}

impl StreamStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocks: self.blocks.load(Ordering::Relaxed),
            degraded_blocks: self.degraded_blocks.load(Ordering::Relaxed),
            stage_failures: self.stage_failures.load(Ordering::Relaxed),
            mismatches: self.mismatches.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            device_errors: self.device_errors.load(Ordering::Relaxed),
        }
    }

    pub fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_error(&self) {
        self.device_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, outcome: BlockOutcome) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
        match outcome {
            BlockOutcome::Processed => {}
            BlockOutcome::Degraded { failed_stages } => {
                self.degraded_blocks.fetch_add(1, Ordering::Relaxed);
                self.stage_failures.fetch_add(u64::from(failed_stages), Ordering::Relaxed);
            }
            BlockOutcome::Mismatch => {
                self.mismatches.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_panic(&self) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
        self.panics.fetch_add(1, Ordering::Relaxed);
    }
}

impl Sub for StatsSnapshot {
    type Output = StatsSnapshot;

    fn sub(self, earlier: StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            blocks: self.blocks.saturating_sub(earlier.blocks),
            degraded_blocks: self.degraded_blocks.saturating_sub(earlier.degraded_blocks),
            stage_failures: self.stage_failures.saturating_sub(earlier.stage_failures),
            mismatches: self.mismatches.saturating_sub(earlier.mismatches),
            panics: self.panics.saturating_sub(earlier.panics),
            overruns: self.overruns.saturating_sub(earlier.overruns),
            underruns: self.underruns.saturating_sub(earlier.underruns),
            device_errors: self.device_errors.saturating_sub(earlier.device_errors),
        }
    }
}

/// Everything the audio callback needs for one block: parameter snapshot,
/// chain, and reusable blocks sized for the negotiated configuration.
pub struct BlockProcessor {
    chain: EffectChain,
    store: Arc<ParameterStore>,
    stats: Arc<StreamStats>,
    input: AudioBlock,
    output: AudioBlock,
}

impl BlockProcessor {
    pub fn new(config: &StreamConfig, store: Arc<ParameterStore>, stats: Arc<StreamStats>) -> Self {
        let chain = EffectChain::realtime(config.sample_rate_hz, config.block_size_frames as usize);
        Self::with_chain(config, chain, store, stats)
    }

    /// Like [`BlockProcessor::new`] but runs `chain` instead of the real-time chain.
    pub fn with_chain(
        config: &StreamConfig,
        chain: EffectChain,
        store: Arc<ParameterStore>,
        stats: Arc<StreamStats>,
    ) -> Self {
        let frames = config.block_size_frames as usize;
        let channels = usize::from(config.channels);
        Self {
            chain,
            store,
            stats,
            input: AudioBlock::silent(frames, channels),
            output: AudioBlock::silent(frames, channels),
        }
    }

    pub fn stats(&self) -> &Arc<StreamStats> {
        &self.stats
    }

    /// Processes one interleaved block. Both slices use the stream's channel
    /// count. A panic inside the chain turns this block into silence.
    pub fn process_interleaved(&mut self, input: &[f32], output: &mut [f32]) {
        let params = self.store.get();
        self.input.copy_from_interleaved(input);
        self.output.set_frames(output.len() / self.output.channels());

        let chain = &mut self.chain;
        let block_in = &self.input;
        let block_out = &mut self.output;
        let result =
            catch_unwind(AssertUnwindSafe(|| chain.process(block_in, &params, block_out)));

        match result {
            Ok(outcome) => {
                self.stats.record(outcome);
                let produced = self.output.samples();
                let n = produced.len().min(output.len());
                output[..n].copy_from_slice(&produced[..n]);
                output[n..].fill(0.0);
            }
            Err(_) => {
                self.stats.record_panic();
                output.fill(0.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{Stage, StageError, Volume};
    use helmet_params::{EffectParameters, ParameterUpdate};

    /// Panics on its first block only.
    struct PanicsOnce {
        fired: bool,
    }

    impl Stage for PanicsOnce {
        fn name(&self) -> &'static str {
            "panics-once"
        }

        fn process(
            &mut self,
            _signal: &mut [f32],
            _params: &EffectParameters,
            _sample_rate: u32,
        ) -> Result<(), StageError> {
            if !self.fired {
                self.fired = true;
                panic!("stage blew up");
            }
            Ok(())
        }
    }

    fn processor(channels: u16) -> (BlockProcessor, Arc<ParameterStore>) {
        let store = Arc::new(ParameterStore::new(EffectParameters::neutral()).unwrap());
        let config = StreamConfig::new(None, 44_100, channels, 256).unwrap();
        let p = BlockProcessor::new(&config, Arc::clone(&store), Arc::default());
        (p, store)
    }

    #[test]
    fn picks_up_parameter_changes_between_blocks() {
        let (mut p, store) = processor(1);
        let input = vec![0.0; 256];
        let mut out = vec![1.0; 256];
        p.process_interleaved(&input, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));

        store.set(&ParameterUpdate { volume: Some(0.0), ..Default::default() }).unwrap();
        let input = vec![0.3; 256];
        p.process_interleaved(&input, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(p.stats().snapshot().blocks, 2);
    }

    #[test]
    fn counts_mismatched_blocks() {
        let (mut p, _) = processor(2);
        // Output shorter than input: the chain falls back to attenuated input.
        let input = vec![0.6; 512];
        let mut out = vec![0.0; 256];
        p.process_interleaved(&input, &mut out);
        assert!(out.iter().all(|&s| (s - 0.3).abs() < 1e-6));
        assert_eq!(p.stats().snapshot().mismatches, 1);
    }

    #[test]
    fn panicking_chain_silences_one_block() {
        let store = Arc::new(
            ParameterStore::new(EffectParameters { volume: 0.5, ..EffectParameters::neutral() })
                .unwrap(),
        );
        let config = StreamConfig::new(None, 44_100, 2, 64).unwrap();
        let mut chain = EffectChain::new(config.sample_rate_hz, 64);
        chain.push(Box::new(PanicsOnce { fired: false }));
        chain.push(Box::new(Volume));
        let mut p = BlockProcessor::with_chain(&config, chain, store, Arc::default());

        let input = vec![0.4; 128];
        let mut out = vec![1.0; 128];
        p.process_interleaved(&input, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        let stats = p.stats().snapshot();
        assert_eq!(stats.panics, 1);
        assert_eq!(stats.blocks, 1);

        p.process_interleaved(&input, &mut out);
        assert!(out.iter().all(|&s| (s - 0.2).abs() < 1e-6));
        let stats = p.stats().snapshot();
        assert_eq!(stats.panics, 1);
        assert_eq!(stats.blocks, 2);
        assert_eq!(stats.degraded_blocks, 0);
    }

    #[test]
    fn snapshot_deltas() {
        let stats = StreamStats::default();
        let before = stats.snapshot();
        stats.record_overrun();
        stats.record_underrun();
        stats.record_underrun();
        let delta = stats.snapshot() - before;
        assert_eq!(delta.overruns, 1);
        assert_eq!(delta.underruns, 2);
        assert_eq!(delta.blocks, 0);
    }
}
