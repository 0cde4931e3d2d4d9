//! Minimal audio processing graph: context, source nodes and the analyser

use super::fft::{time_domain_byte, SpectrumAnalyser};
use super::media::{MediaStreamHandle, SampleTap};
use super::AnalyserConfig;
use std::collections::HashSet;
use thiserror::Error;

/// Identifies a node within one context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// Lifecycle of an audio context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Running,
    Closed,
}

/// Audio engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Audio context is closed")]
    ContextClosed,

    #[error("Stream {0} has no audio track")]
    NoAudioTrack(u64),

    #[error("Unknown node: {0:?}")]
    UnknownNode(NodeId),

    #[error("Invalid FFT size: {0} (must be a power of two between 32 and 32768)")]
    InvalidFftSize(usize),

    #[error("Smoothing time constant out of range: {0}")]
    InvalidSmoothing(f32),

    #[error("Invalid decibel range: min {min} must be below max {max}")]
    InvalidDecibelRange { min: f32, max: f32 },
}

/// Audio processing context.
///
/// Owns node identities and the connections between them. The destination
/// node stands for the audible output; nothing in this crate connects to it.
#[derive(Debug)]
pub struct AudioContext {
    state: ContextState,
    sample_rate: u32,
    next_node: u32,
    nodes: HashSet<NodeId>,
    edges: Vec<(NodeId, NodeId)>,
    destination: NodeId,
}

impl AudioContext {
    pub fn new(sample_rate: u32) -> Self {
        let destination = NodeId(0);
        Self {
            state: ContextState::Running,
            sample_rate,
            next_node: 1,
            nodes: HashSet::from([destination]),
            edges: Vec::new(),
            destination,
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The audible output sink
    pub fn destination(&self) -> NodeId {
        self.destination
    }

    fn allocate(&mut self) -> Result<NodeId, EngineError> {
        if self.state == ContextState::Closed {
            return Err(EngineError::ContextClosed);
        }
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id);
        Ok(id)
    }

    pub fn create_analyser(&mut self, config: &AnalyserConfig) -> Result<AnalyserNode, EngineError> {
        config.validate()?;
        let id = self.allocate()?;
        Ok(AnalyserNode::new(id, config))
    }

    /// Create a source reading the first audio track of `stream`
    pub fn create_media_stream_source(
        &mut self,
        stream: &MediaStreamHandle,
    ) -> Result<MediaStreamSourceNode, EngineError> {
        let track = stream
            .first_audio_track()
            .ok_or(EngineError::NoAudioTrack(stream.id()))?;
        let tap = track
            .tap()
            .cloned()
            .ok_or(EngineError::NoAudioTrack(stream.id()))?;
        let id = self.allocate()?;

        Ok(MediaStreamSourceNode {
            id,
            stream_id: stream.id(),
            track_id: track.id(),
            tap,
        })
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), EngineError> {
        if self.state == ContextState::Closed {
            return Err(EngineError::ContextClosed);
        }
        for node in [from, to] {
            if !self.nodes.contains(&node) {
                return Err(EngineError::UnknownNode(node));
            }
        }
        if !self.is_connected(from, to) {
            self.edges.push((from, to));
        }
        Ok(())
    }

    /// Remove every outgoing connection of `node`, returning how many there were
    pub fn disconnect(&mut self, node: NodeId) -> usize {
        let before = self.edges.len();
        self.edges.retain(|&(from, _)| from != node);
        before - self.edges.len()
    }

    pub fn is_connected(&self, from: NodeId, to: NodeId) -> bool {
        self.edges.contains(&(from, to))
    }

    pub fn outputs_of(&self, node: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|&&(from, _)| from == node)
            .map(|&(_, to)| to)
            .collect()
    }

    /// Whether any path leads from `node` to the audible output
    pub fn reaches_destination(&self, node: NodeId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if current == self.destination {
                return true;
            }
            if seen.insert(current) {
                stack.extend(self.outputs_of(current));
            }
        }
        false
    }

    /// Close the context. Returns false if it was already closed.
    pub fn close(&mut self) -> bool {
        if self.state == ContextState::Closed {
            return false;
        }
        self.state = ContextState::Closed;
        log::debug!("Audio context closed ({} Hz)", self.sample_rate);
        true
    }
}

/// Source node fed by one media track
#[derive(Debug, Clone)]
pub struct MediaStreamSourceNode {
    id: NodeId,
    stream_id: u64,
    track_id: u64,
    tap: SampleTap,
}

impl MediaStreamSourceNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    pub fn track_id(&self) -> u64 {
        self.track_id
    }
}

/// Analyser node: sums its inputs and exposes time and frequency data
pub struct AnalyserNode {
    id: NodeId,
    analyser: SpectrumAnalyser,
    time: Vec<f32>,
    spectrum_current: bool,
}

impl AnalyserNode {
    fn new(id: NodeId, config: &AnalyserConfig) -> Self {
        Self {
            id,
            analyser: SpectrumAnalyser::new(config),
            time: vec![0.0; config.fft_size],
            spectrum_current: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn fft_size(&self) -> usize {
        self.time.len()
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.analyser.bin_count()
    }

    /// Pull the newest block from every source connected to this node.
    ///
    /// Returns the number of inputs mixed. Time and frequency reads that follow
    /// all observe this same block.
    pub fn render_quantum(&mut self, context: &AudioContext, sources: &[MediaStreamSourceNode]) -> usize {
        self.time.iter_mut().for_each(|s| *s = 0.0);
        self.spectrum_current = false;

        if context.state() == ContextState::Closed {
            return 0;
        }

        let mut mixed = 0;
        for source in sources {
            if context.is_connected(source.id, self.id) {
                source.tap.mix_latest_into(&mut self.time);
                mixed += 1;
            }
        }
        mixed
    }

    /// Copy the current block as bytes centred at 128.
    ///
    /// When `out` is shorter than the FFT size, the oldest samples are copied.
    pub fn get_byte_time_domain_data(&self, out: &mut [u8]) {
        for (slot, &sample) in out.iter_mut().zip(self.time.iter()) {
            *slot = time_domain_byte(sample);
        }
    }

    /// Copy the smoothed spectrum as bytes.
    ///
    /// Smoothing advances at most once per render quantum.
    pub fn get_byte_frequency_data(&mut self, out: &mut [u8]) {
        if !self.spectrum_current {
            self.analyser.analyse(&self.time);
            self.spectrum_current = true;
        }
        self.analyser.write_bytes(out);
    }
}
