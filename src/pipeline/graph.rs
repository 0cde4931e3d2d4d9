//! Analysis graph: one context, one analyser, one source per stream

use crate::audio::{
    AnalyserConfig, AnalyserNode, AudioContext, ContextState, EngineError, MediaStreamHandle,
    MediaStreamSourceNode, NodeId, DEFAULT_SAMPLE_RATE,
};
use thiserror::Error;

/// Graph construction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("No streams to analyse")]
    NoStreams,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// The analysis graph for one capture session.
///
/// Sources fan in to a single analyser. The analyser has no outputs, so the
/// captured audio is never played back.
pub struct AnalysisGraph {
    context: AudioContext,
    analyser: Option<AnalyserNode>,
    sources: Vec<MediaStreamSourceNode>,
    waveform: Vec<u8>,
    spectrum: Vec<u8>,
}

impl AnalysisGraph {
    /// Build the graph for `streams`; nothing is created if any stream is unusable
    pub fn build(streams: &[MediaStreamHandle], config: &AnalyserConfig) -> Result<Self, GraphError> {
        if streams.is_empty() {
            return Err(GraphError::NoStreams);
        }
        config.validate()?;
        if let Some(stream) = streams.iter().find(|s| s.first_audio_track().is_none()) {
            return Err(EngineError::NoAudioTrack(stream.id()).into());
        }

        let sample_rate = streams
            .iter()
            .filter_map(|s| s.first_audio_track())
            .filter_map(|t| t.tap())
            .map(|tap| tap.sample_rate())
            .next()
            .unwrap_or(DEFAULT_SAMPLE_RATE);

        let mut context = AudioContext::new(sample_rate);
        let analyser = context.create_analyser(config)?;

        let mut sources = Vec::with_capacity(streams.len());
        for stream in streams {
            let source = context.create_media_stream_source(stream)?;
            context.connect(source.id(), analyser.id())?;
            sources.push(source);
        }

        let bins = analyser.frequency_bin_count();
        log::info!(
            "Analysis graph ready: {} source(s), {} bins at {} Hz",
            sources.len(),
            bins,
            sample_rate
        );

        Ok(Self {
            context,
            analyser: Some(analyser),
            sources,
            waveform: vec![0; bins],
            spectrum: vec![0; bins],
        })
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    pub fn sources(&self) -> &[MediaStreamSourceNode] {
        &self.sources
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn analyser_id(&self) -> Option<NodeId> {
        self.analyser.as_ref().map(|a| a.id())
    }

    pub fn bin_count(&self) -> usize {
        self.spectrum.len()
    }

    pub fn is_closed(&self) -> bool {
        self.context.state() == ContextState::Closed
    }

    /// Whether the analyser, or any source, can reach the audible output
    pub fn has_output_path(&self) -> bool {
        self.analyser_id()
            .into_iter()
            .chain(self.sources.iter().map(|s| s.id()))
            .any(|node| self.context.reaches_destination(node))
    }

    /// Render one quantum and fill both buffers from it.
    ///
    /// Returns `None` once the graph has been torn down.
    pub(crate) fn capture(&mut self) -> Option<(&[u8], &[u8])> {
        if self.is_closed() {
            return None;
        }
        let analyser = self.analyser.as_mut()?;

        analyser.render_quantum(&self.context, &self.sources);
        analyser.get_byte_time_domain_data(&mut self.waveform);
        analyser.get_byte_frequency_data(&mut self.spectrum);

        Some((self.waveform.as_slice(), self.spectrum.as_slice()))
    }

    /// Disconnect every source from the analyser, returning how many were connected
    pub(crate) fn disconnect_sources(&mut self) -> usize {
        let context = &mut self.context;
        self.sources
            .drain(..)
            .filter(|source| context.disconnect(source.id()) > 0)
            .count()
    }

    /// Disconnect and drop the analyser. Returns false if it was already gone.
    pub(crate) fn disconnect_analyser(&mut self) -> bool {
        match self.analyser.take() {
            Some(analyser) => {
                self.context.disconnect(analyser.id());
                true
            }
            None => false,
        }
    }

    /// Close the context. Returns false if it was already closed.
    pub(crate) fn close_context(&mut self) -> bool {
        self.context.close()
    }
}
