//! Real-time voice transformation engine.
//!
//! A [`StreamEngine`] negotiates a working device configuration, then runs
//! every captured block through an [`EffectChain`] reading its settings from a
//! shared [`helmet_params::ParameterStore`].

pub mod block;
pub mod chain;
pub mod devices;
pub mod dsp;
pub mod negotiate;
pub mod offline;
pub mod processor;

pub use block::{AudioBlock, InvalidStreamConfig, StreamConfig};
pub use chain::{BlockOutcome, EffectChain, FailurePolicy, StageFallback};
pub use devices::{AudioHost, CpalHost, DeviceInfo};
pub use negotiate::{Candidate, DeviceNegotiator, NegotiationError};
pub use processor::{BlockProcessor, StatsSnapshot, StreamStats};

use std::sync::Arc;

use helmet_params::ParameterStore;
use thiserror::Error;
use tracing::{error, info};

use negotiate::{DEFAULT_CANDIDATES, DEFAULT_DEVICE_PATTERNS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Negotiating,
    Running,
    /// Shut down for good.
    Stopped,
    /// Negotiation exhausted every candidate.
    Failed,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error("failed to open audio stream: {0:#}")]
    Device(anyhow::Error),
    #[error("cannot start from state {0:?}")]
    InvalidState(EngineState),
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub candidates: Vec<Candidate>,
    pub device_patterns: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            candidates: DEFAULT_CANDIDATES.to_vec(),
            device_patterns: DEFAULT_DEVICE_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Owns the running stream.
///
/// `Idle → Negotiating → Running`, back to `Idle` on [`StreamEngine::stop`].
/// Failed negotiation ends in `Failed`; [`StreamEngine::shutdown`] ends in
/// `Stopped`. Both are terminal.
pub struct StreamEngine<H: AudioHost> {
    host: H,
    store: Arc<ParameterStore>,
    stats: Arc<StreamStats>,
    cfg: EngineConfig,
    state: EngineState,
    config: Option<StreamConfig>,
    stream: Option<H::Stream>,
}

impl<H: AudioHost> StreamEngine<H> {
    pub fn new(host: H, store: Arc<ParameterStore>, cfg: EngineConfig) -> Self {
        Self {
            host,
            store,
            stats: Arc::new(StreamStats::default()),
            cfg,
            state: EngineState::Idle,
            config: None,
            stream: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The configuration of the running stream, if any.
    pub fn config(&self) -> Option<&StreamConfig> {
        self.config.as_ref()
    }

    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.stats)
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn stream_mut(&mut self) -> Option<&mut H::Stream> {
        self.stream.as_mut()
    }

    /// Negotiates a configuration and opens the duplex stream.
    pub fn start(&mut self) -> Result<StreamConfig, EngineError> {
        if self.state != EngineState::Idle {
            return Err(EngineError::InvalidState(self.state));
        }

        self.state = EngineState::Negotiating;
        let negotiated = DeviceNegotiator::new(&self.host)
            .candidates(self.cfg.candidates.clone())
            .patterns(self.cfg.device_patterns.clone())
            .negotiate();
        let config = match negotiated {
            Ok(c) => c,
            Err(e) => {
                error!("{e}");
                self.state = EngineState::Failed;
                return Err(e.into());
            }
        };

        let processor = BlockProcessor::new(&config, Arc::clone(&self.store), Arc::clone(&self.stats));
        let stream = match self.host.open_duplex(&config, processor) {
            Ok(s) => s,
            Err(e) => {
                self.state = EngineState::Idle;
                return Err(EngineError::Device(e));
            }
        };

        info!(
            %config,
            budget_ms = config.block_budget().as_secs_f64() * 1000.0,
            "stream running"
        );
        self.stream = Some(stream);
        self.config = Some(config.clone());
        self.state = EngineState::Running;
        Ok(config)
    }

    /// Closes the stream and returns to `Idle`. No-op unless running.
    pub fn stop(&mut self) {
        if self.state != EngineState::Running {
            return;
        }
        self.close_stream();
        self.state = EngineState::Idle;
        info!("stream stopped");
    }

    /// Closes any open stream and moves to `Stopped`. Repeated calls and calls
    /// after a failed negotiation are no-ops.
    pub fn shutdown(&mut self) {
        if matches!(self.state, EngineState::Stopped | EngineState::Failed) {
            return;
        }
        self.close_stream();
        self.state = EngineState::Stopped;
        info!("engine shut down");
    }

    fn close_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.host.close(stream);
        }
        self.config = None;
    }
}

impl<H: AudioHost> Drop for StreamEngine<H> {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.host.close(stream);
        }
    }
}
