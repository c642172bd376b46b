//! Graph assembly and teardown
//!
//! Builds the playback graph in a fixed order: presentation sink,
//! preferred codec filters, the source (via its strategy), the
//! strategy's pre-run hook, then rendering and run. Any failure tears
//! the partial graph down completely before the error propagates; a
//! session never ends up with a half-built graph.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::bridge::FrameBridge;
use crate::codecs::CodecPolicy;
use crate::graph::{GraphBackend, GraphError, OwnedFilter, ResourceLedger, RunState};
use crate::source::SourceStrategy;

/// Attempts made waiting for an asynchronous stop to settle.
const STOP_RETRY_ATTEMPTS: u32 = 5;
/// First wait between attempts; doubles per attempt.
const STOP_RETRY_BACKOFF: Duration = Duration::from_millis(10);
/// How long a single run-state poll may block.
const STOP_POLL_TIMEOUT: Duration = Duration::from_millis(200);

const VIDEO_RENDERER: &str = "Enhanced Video Renderer";
const AUDIO_RENDERER: &str = "Default DirectSound Device";

#[derive(Debug, Error)]
pub enum BuildError {
    /// The graph could not be assembled; it has been torn down.
    #[error("graph construction failed: {0}")]
    Construction(String),
    /// The graph did not reach the stopped state within the retry
    /// budget. Teardown proceeds regardless.
    #[error("graph did not stop in time")]
    TeardownTimeout,
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Stop the graph and wait for the transition to settle, backing off
/// between polls. Stopping is asynchronous at the native boundary.
pub fn stop_graph_with_retry(graph: &mut dyn GraphBackend) -> Result<(), BuildError> {
    graph.stop()?;
    let mut backoff = STOP_RETRY_BACKOFF;
    for attempt in 0..STOP_RETRY_ATTEMPTS {
        if graph.run_state(STOP_POLL_TIMEOUT)? == RunState::Stopped {
            return Ok(());
        }
        tracing::debug!("graph still stopping (attempt {})", attempt + 1);
        std::thread::sleep(backoff);
        backoff *= 2;
    }
    Err(BuildError::TeardownTimeout)
}

// ============================================================================
// Pipeline
// ============================================================================

/// A built playback graph and every filter the builder added to it.
/// Teardown removes exactly those filters, in reverse build order, and
/// is idempotent.
pub struct Pipeline {
    graph: Box<dyn GraphBackend>,
    filters: Vec<OwnedFilter>,
    strategy: Box<dyn SourceStrategy>,
    ledger: Arc<ResourceLedger>,
    torn_down: bool,
}

impl Pipeline {
    pub fn graph(&mut self) -> &mut dyn GraphBackend {
        self.graph.as_mut()
    }

    pub fn strategy(&mut self) -> &mut dyn SourceStrategy {
        self.strategy.as_mut()
    }

    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        &self.ledger
    }

    /// Forward a stream format change to the source strategy.
    pub fn media_type_changed(&mut self) -> Result<(), BuildError> {
        self.strategy.on_media_type_changed(self.graph.as_mut())
    }

    /// Stop the graph and remove every filter this builder added.
    /// Safe to call more than once; later calls are no-ops. A stop
    /// timeout is reported but does not abort the teardown.
    pub fn teardown(&mut self) -> Result<(), BuildError> {
        if self.torn_down {
            tracing::debug!("teardown already done");
            return Ok(());
        }
        self.torn_down = true;

        let stop_result = stop_graph_with_retry(self.graph.as_mut());
        if matches!(stop_result, Err(BuildError::TeardownTimeout)) {
            tracing::warn!("graph did not stop in time, tearing down anyway");
        }

        self.strategy.free_source(self.graph.as_mut());
        release_filters(self.graph.as_mut(), &mut self.filters);
        stop_result
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("strategy", &self.strategy.name())
            .field("filters", &self.filters.len())
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if !self.torn_down {
            if let Err(err) = self.teardown() {
                tracing::warn!("teardown on drop: {}", err);
            }
        }
    }
}

/// Remove filters from the graph in reverse build order and release
/// the engine's references to them.
fn release_filters(graph: &mut dyn GraphBackend, filters: &mut Vec<OwnedFilter>) {
    while let Some(filter) = filters.pop() {
        if let Err(err) = graph.remove_filter(filter.handle()) {
            tracing::warn!("could not remove {}: {}", filter.name(), err);
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

pub struct PipelineBuilder {
    codec_policy: Box<dyn CodecPolicy>,
}

impl PipelineBuilder {
    pub fn new(codec_policy: Box<dyn CodecPolicy>) -> Self {
        Self { codec_policy }
    }

    /// Assemble and start the graph. On any failure the partial graph
    /// is torn down before the error is returned.
    pub fn build(
        &self,
        mut graph: Box<dyn GraphBackend>,
        mut strategy: Box<dyn SourceStrategy>,
        bridge: Arc<FrameBridge>,
    ) -> Result<Pipeline, BuildError> {
        let ledger = ResourceLedger::new();
        let mut filters: Vec<OwnedFilter> = Vec::new();

        let result = self.assemble(
            graph.as_mut(),
            strategy.as_mut(),
            bridge,
            &ledger,
            &mut filters,
        );

        match result {
            Ok(()) => Ok(Pipeline {
                graph,
                filters,
                strategy,
                ledger,
                torn_down: false,
            }),
            Err(err) => {
                tracing::error!("graph construction failed: {}", err);
                if let Err(stop_err) = stop_graph_with_retry(graph.as_mut()) {
                    tracing::warn!("stop during failed build: {}", stop_err);
                }
                strategy.free_source(graph.as_mut());
                release_filters(graph.as_mut(), &mut filters);
                Err(BuildError::Construction(err.to_string()))
            }
        }
    }

    fn assemble(
        &self,
        graph: &mut dyn GraphBackend,
        strategy: &mut dyn SourceStrategy,
        bridge: Arc<FrameBridge>,
        ledger: &Arc<ResourceLedger>,
        filters: &mut Vec<OwnedFilter>,
    ) -> Result<(), BuildError> {
        tracing::info!("building graph for {}", strategy.name());

        // Renderer first: everything downstream connects to it.
        let video = graph.add_filter_by_name(VIDEO_RENDERER)?;
        filters.push(OwnedFilter::new(video, VIDEO_RENDERER, ledger.clone()));
        graph.set_presentation_sink(bridge);

        let audio = graph.add_filter_by_name(AUDIO_RENDERER)?;
        filters.push(OwnedFilter::new(audio, AUDIO_RENDERER, ledger.clone()));

        self.add_preferred_codecs(graph, strategy.required_capabilities(), ledger, filters);

        let source_filters = strategy.add_source(graph, ledger)?;
        let source = source_filters
            .first()
            .map(|f| f.handle())
            .ok_or_else(|| BuildError::Construction("strategy added no source".to_string()))?;
        filters.extend(source_filters);

        strategy.on_before_graph_running(graph)?;

        graph.render_unconnected_outputs(source)?;

        // Captions default to off; some graphs cannot disable them.
        // That is a degraded state, not a failure.
        if let Err(err) = graph.set_line21_enabled(false) {
            tracing::warn!("could not disable closed captions: {}", err);
        }

        graph.run()?;
        tracing::info!("graph running, {} native objects", ledger.live());
        Ok(())
    }

    /// Add decoder filters for each required capability class, walking
    /// the policy's fallback chain until one is accepted. A class with
    /// no working decoder is left to the graph's own connection logic.
    fn add_preferred_codecs(
        &self,
        graph: &mut dyn GraphBackend,
        required: u32,
        ledger: &Arc<ResourceLedger>,
        filters: &mut Vec<OwnedFilter>,
    ) {
        for class in [required & crate::codecs::VIDEO_ANY, required & crate::codecs::AUDIO_ANY] {
            if class == 0 {
                continue;
            }
            for codec in self.codec_policy.preferred_chain(class) {
                match graph.add_filter_by_name(&codec.name) {
                    Ok(handle) => {
                        tracing::debug!("added codec {}", codec.name);
                        filters.push(OwnedFilter::new(handle, codec.name, ledger.clone()));
                        break;
                    }
                    Err(err) => {
                        tracing::debug!("codec {} unavailable: {}, trying next", codec.name, err);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::StaticCodecPolicy;
    use crate::sim::SimBackend;
    use crate::source::FileSource;

    fn builder() -> PipelineBuilder {
        PipelineBuilder::new(Box::new(StaticCodecPolicy::new()))
    }

    fn file_strategy() -> Box<dyn SourceStrategy> {
        Box::new(FileSource::new("/media/movie.mkv"))
    }

    #[test]
    fn test_clean_lifecycle_balances_resources() {
        let sim = SimBackend::new();
        let mut pipeline = builder()
            .build(Box::new(sim.clone()), file_strategy(), Arc::new(FrameBridge::new()))
            .unwrap();

        assert_eq!(sim.state(), RunState::Running);
        assert!(pipeline.ledger().live() > 0);
        assert!(sim.filter_count() > 0);

        pipeline.teardown().unwrap();
        assert_eq!(pipeline.ledger().live(), 0);
        assert_eq!(sim.filter_count(), 0);
        assert_eq!(sim.state(), RunState::Stopped);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let sim = SimBackend::new();
        let mut pipeline = builder()
            .build(Box::new(sim.clone()), file_strategy(), Arc::new(FrameBridge::new()))
            .unwrap();

        pipeline.teardown().unwrap();
        pipeline.teardown().unwrap();
        assert_eq!(sim.filter_count(), 0);
    }

    #[test]
    fn test_render_failure_tears_down_partial_graph() {
        let sim = SimBackend::new();
        sim.fail_render();

        let err = builder()
            .build(Box::new(sim.clone()), file_strategy(), Arc::new(FrameBridge::new()))
            .unwrap_err();

        assert!(matches!(err, BuildError::Construction(_)));
        // No partial graph is left behind.
        assert_eq!(sim.filter_count(), 0);
        assert_eq!(sim.state(), RunState::Stopped);
    }

    #[test]
    fn test_codec_fallback_walks_chain() {
        let sim = SimBackend::new();
        sim.fail_filter("LAV Video Decoder");

        let _pipeline = builder()
            .build(Box::new(sim.clone()), file_strategy(), Arc::new(FrameBridge::new()))
            .unwrap();

        let names = sim.filter_names();
        assert!(!names.iter().any(|n| n == "LAV Video Decoder"));
        assert!(names.iter().any(|n| n == "Microsoft DTV-DVD Video Decoder"));
    }

    #[test]
    fn test_line21_failure_is_tolerated() {
        let sim = SimBackend::new();
        sim.fail_line21();

        let pipeline = builder()
            .build(Box::new(sim.clone()), file_strategy(), Arc::new(FrameBridge::new()))
            .unwrap();
        assert!(!pipeline.is_torn_down());
        assert_eq!(sim.state(), RunState::Running);
    }

    #[test]
    fn test_stop_retry_waits_out_async_stop() {
        let mut sim = SimBackend::new();
        sim.set_stop_polls(3);
        sim.run().unwrap();

        stop_graph_with_retry(&mut sim).unwrap();
        assert_eq!(sim.state(), RunState::Stopped);
    }

    #[test]
    fn test_stop_retry_gives_up_with_timeout() {
        let mut sim = SimBackend::new();
        sim.set_stop_polls(100);
        sim.run().unwrap();

        let err = stop_graph_with_retry(&mut sim).unwrap_err();
        assert!(matches!(err, BuildError::TeardownTimeout));
    }

    #[test]
    fn test_drop_tears_down() {
        let sim = SimBackend::new();
        {
            let _pipeline = builder()
                .build(Box::new(sim.clone()), file_strategy(), Arc::new(FrameBridge::new()))
                .unwrap();
        }
        assert_eq!(sim.filter_count(), 0);
    }
}
