//! Source strategies
//!
//! How the media gets into the graph differs per source kind (plain
//! file, transport stream, disc); everything else about the pipeline
//! is shared. A [`SourceStrategy`] supplies the source-specific steps
//! and the builder composes them into the common build order.

use std::path::Path;
use std::sync::Arc;

use crate::builder::{stop_graph_with_retry, BuildError};
use crate::codecs;
use crate::graph::{
    FilterHandle, GraphBackend, GraphError, GraphResult, OwnedFilter, ResourceLedger,
    VideoResolution,
};
use crate::settings::PlayerSettings;

const FILE_SOURCE: &str = "File Source (Async.)";
const TS_READER: &str = "Ts Reader";
const DVD_NAVIGATOR: &str = "DVD Navigator";

/// Source-specific build steps, invoked by the builder in order:
/// `add_source`, then `on_before_graph_running`, then (much later)
/// `free_source` during teardown.
pub trait SourceStrategy: Send {
    fn name(&self) -> &str;

    /// Codec capability classes this source's streams need.
    fn required_capabilities(&self) -> u32;

    /// Whether this source plays a navigated disc. Disc sessions read
    /// time from the navigator and seek through it.
    fn is_disc(&self) -> bool {
        false
    }

    /// Add the source filter(s). The first returned filter is the one
    /// the builder renders from.
    fn add_source(
        &mut self,
        graph: &mut dyn GraphBackend,
        ledger: &Arc<ResourceLedger>,
    ) -> GraphResult<Vec<OwnedFilter>>;

    /// Hook between source insertion and rendering.
    fn on_before_graph_running(&mut self, _graph: &mut dyn GraphBackend) -> GraphResult<()> {
        Ok(())
    }

    /// React to a stream format change under the running graph. Most
    /// sources never see one.
    fn on_media_type_changed(&mut self, _graph: &mut dyn GraphBackend) -> Result<(), BuildError> {
        Ok(())
    }

    /// Source-specific cleanup during teardown, before the builder
    /// removes the filters.
    fn free_source(&mut self, _graph: &mut dyn GraphBackend) {}
}

// ============================================================================
// Plain file
// ============================================================================

pub struct FileSource {
    path: String,
}

impl FileSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Capability guess from the file extension, used to pick which
    /// decoder classes to pre-insert.
    fn capabilities_for(path: &str) -> u32 {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "mpg" | "mpeg" | "vob" => codecs::VIDEO_MPEG2 | codecs::AUDIO_MPEG | codecs::AUDIO_AC3,
            "avi" | "divx" => codecs::VIDEO_DIVX | codecs::AUDIO_MPEG,
            "mkv" | "mp4" | "mov" => {
                codecs::VIDEO_H264 | codecs::VIDEO_HEVC | codecs::AUDIO_AAC | codecs::AUDIO_AC3
            }
            _ => codecs::VIDEO_ANY | codecs::AUDIO_ANY,
        }
    }
}

impl SourceStrategy for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn required_capabilities(&self) -> u32 {
        Self::capabilities_for(&self.path)
    }

    fn add_source(
        &mut self,
        graph: &mut dyn GraphBackend,
        ledger: &Arc<ResourceLedger>,
    ) -> GraphResult<Vec<OwnedFilter>> {
        let handle = graph.add_source_filter(&self.path, FILE_SOURCE)?;
        Ok(vec![OwnedFilter::new(handle, FILE_SOURCE, ledger.clone())])
    }
}

// ============================================================================
// Transport stream
// ============================================================================

/// Live transport-stream source. Channel changes swap the elementary
/// streams under the running graph; the reader signals this as a media
/// type change.
pub struct TsSource {
    path: String,
    reader: Option<FilterHandle>,
    last_resolution: Option<VideoResolution>,
}

impl TsSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), reader: None, last_resolution: None }
    }

    /// Check whether the new streams would need a different filter
    /// chain. The result is informational only, see
    /// `on_media_type_changed`.
    fn chain_compatible(&self, resolution: VideoResolution) -> bool {
        match self.last_resolution {
            Some(last) => last == resolution,
            None => true,
        }
    }

}

impl SourceStrategy for TsSource {
    fn name(&self) -> &str {
        "transport-stream"
    }

    fn required_capabilities(&self) -> u32 {
        codecs::VIDEO_MPEG2 | codecs::VIDEO_H264 | codecs::AUDIO_ANY
    }

    fn add_source(
        &mut self,
        graph: &mut dyn GraphBackend,
        ledger: &Arc<ResourceLedger>,
    ) -> GraphResult<Vec<OwnedFilter>> {
        let handle = graph.add_source_filter(&self.path, TS_READER)?;
        self.reader = Some(handle);
        self.last_resolution = graph.video_resolution().ok();
        Ok(vec![OwnedFilter::new(handle, TS_READER, ledger.clone())])
    }

    /// Stop the graph, analyse the new streams, reconnect, run again.
    ///
    /// The decoder chain handles format changes across reconnects in
    /// practice, so the graph is never rebuilt from scratch; the
    /// compatibility analysis only feeds the log.
    fn on_media_type_changed(&mut self, graph: &mut dyn GraphBackend) -> Result<(), BuildError> {
        stop_graph_with_retry(graph)?;

        let resolution = graph.video_resolution()?;
        let compatible = self.chain_compatible(resolution);
        tracing::info!(
            "media type changed to {}x{}, chain compatible: {}, reconnecting",
            resolution.width,
            resolution.height,
            compatible
        );
        self.last_resolution = Some(resolution);

        graph.reconnect_all()?;
        graph.run()?;
        Ok(())
    }

    fn free_source(&mut self, _graph: &mut dyn GraphBackend) {
        self.reader = None;
        self.last_resolution = None;
    }
}

// ============================================================================
// Disc
// ============================================================================

/// DVD source: the navigator filter is the source, pointed at the
/// disc's video directory, with the user's language defaults applied
/// before the graph runs.
pub struct DiscSource {
    directory: String,
    settings: PlayerSettings,
    navigator: Option<FilterHandle>,
}

impl DiscSource {
    pub fn new(directory: impl Into<String>, settings: PlayerSettings) -> Self {
        Self { directory: directory.into(), settings, navigator: None }
    }
}

impl SourceStrategy for DiscSource {
    fn name(&self) -> &str {
        "disc"
    }

    fn required_capabilities(&self) -> u32 {
        codecs::VIDEO_MPEG2 | codecs::AUDIO_MPEG | codecs::AUDIO_AC3
    }

    fn is_disc(&self) -> bool {
        true
    }

    fn add_source(
        &mut self,
        graph: &mut dyn GraphBackend,
        ledger: &Arc<ResourceLedger>,
    ) -> GraphResult<Vec<OwnedFilter>> {
        let handle = graph.add_filter_by_name(DVD_NAVIGATOR)?;
        self.navigator = Some(handle);
        let filter = OwnedFilter::new(handle, DVD_NAVIGATOR, ledger.clone());

        let disc = graph
            .disc_control()
            .ok_or_else(|| GraphError::FilterNotFound("disc control".to_string()))?;
        disc.set_disc_directory(&self.directory)?;

        // Language selection is only honored before playback starts;
        // a failure here leaves the disc defaults in place.
        crate::dvd::DvdNavigator::apply_default_languages(disc, &self.settings);

        Ok(vec![filter])
    }

    fn on_before_graph_running(&mut self, graph: &mut dyn GraphBackend) -> GraphResult<()> {
        // The navigator's subpicture pin is marked manual-connect.
        if let Some(navigator) = self.navigator {
            graph.render_manual_pins(navigator)?;
        }
        Ok(())
    }

    fn free_source(&mut self, _graph: &mut dyn GraphBackend) {
        self.navigator = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBackend;
    use std::time::Duration;

    #[test]
    fn test_file_capabilities_from_extension() {
        assert_eq!(
            FileSource::capabilities_for("/media/film.mpg") & codecs::VIDEO_MPEG2,
            codecs::VIDEO_MPEG2
        );
        assert_eq!(
            FileSource::capabilities_for("/media/film.mkv") & codecs::VIDEO_H264,
            codecs::VIDEO_H264
        );
        // Unknown extensions get the full set.
        assert_eq!(
            FileSource::capabilities_for("/media/film.xyz"),
            codecs::VIDEO_ANY | codecs::AUDIO_ANY
        );
    }

    #[test]
    fn test_ts_media_change_reconnects_without_rebuild() {
        let mut sim = SimBackend::new();
        let ledger = ResourceLedger::new();
        let mut ts = TsSource::new("/stream/channel.ts");
        let filters = ts.add_source(&mut sim, &ledger).unwrap();
        sim.run().unwrap();

        // The stream geometry changes with the channel.
        sim.set_resolution(1920, 1080);
        ts.on_media_type_changed(&mut sim).unwrap();

        assert_eq!(sim.reconnect_count(), 1);
        assert_eq!(sim.state(), crate::graph::RunState::Running);
        // Same filter set before and after: no rebuild happened.
        assert_eq!(sim.filter_count(), 1);
        drop(filters);
    }

    #[test]
    fn test_ts_media_change_with_slow_stop() {
        let mut sim = SimBackend::new();
        sim.set_stop_polls(2);
        let ledger = ResourceLedger::new();
        let mut ts = TsSource::new("/stream/channel.ts");
        let _filters = ts.add_source(&mut sim, &ledger).unwrap();
        sim.run().unwrap();

        ts.on_media_type_changed(&mut sim).unwrap();
        assert_eq!(sim.reconnect_count(), 1);
    }

    #[test]
    fn test_disc_source_configures_navigator() {
        let mut sim = SimBackend::new();
        sim.set_total_title_time(Duration::from_secs(5400));
        let ledger = ResourceLedger::new();

        let mut settings = PlayerSettings::default();
        settings.preferred_audio_language = "de".to_string();
        let mut disc = DiscSource::new("/dev/dvd/VIDEO_TS", settings);

        let filters = disc.add_source(&mut sim, &ledger).unwrap();
        assert_eq!(filters.len(), 1);
        assert_eq!(sim.disc_directory().as_deref(), Some("/dev/dvd/VIDEO_TS"));
        assert_eq!(sim.selected_audio_lcid(), Some(1031));

        disc.on_before_graph_running(&mut sim).unwrap();
        assert_eq!(sim.manual_render_count(), 1);
    }

    #[test]
    fn test_disc_language_failure_is_tolerated() {
        let mut sim = SimBackend::new();
        sim.fail_language_selection();
        let ledger = ResourceLedger::new();

        let mut disc = DiscSource::new("/dev/dvd/VIDEO_TS", PlayerSettings::default());
        // Still builds; the disc keeps its own defaults.
        disc.add_source(&mut sim, &ledger).unwrap();
        assert_eq!(sim.selected_audio_lcid(), None);
    }
}
