//! Simulated graph backend
//!
//! In-process implementation of [`GraphBackend`] and [`DiscControl`]
//! for tests and the demo player. Deterministic filter bookkeeping,
//! stop transitions that take a configurable number of polls to
//! settle, and injectable failures for the renderer connection and the
//! transient native calls.
//!
//! The backend is a cloneable handle over shared state, so a test can
//! keep one clone for inspection after handing the other to the
//! engine.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::graph::{
    ButtonDirection, DiscControl, DiscLocation, DiscMenu, DiscTimecode, FilterHandle, GraphBackend,
    GraphError, GraphResult, Hns, PresentationSink, RunState, SeekCaps, VideoResolution,
};

// Native code the navigator returns for language selection outside the
// Stop domain.
const SIM_ERR_WRONG_DOMAIN: i32 = 631;
const SIM_ERR_LINE21: i32 = 0x4265;

struct SimState {
    // graph
    filters: Vec<(FilterHandle, String)>,
    next_handle: u64,
    state: RunState,
    stopping_from: Option<RunState>,
    stop_polls_left: u32,
    stop_polls: u32,
    sink: Option<Arc<dyn PresentationSink>>,
    fail_filters: Vec<String>,
    fail_render: bool,
    fail_next_run: bool,
    line21_fails: bool,
    renders: u32,
    manual_renders: u32,
    reconnects: u32,

    // seeking / audio
    duration: Hns,
    position: Hns,
    rate: f64,
    caps: SeekCaps,
    volume: Option<i32>,
    line21_enabled: bool,
    frame_skipping: Option<bool>,
    resolution: VideoResolution,

    // disc
    disc_directory: Option<String>,
    title_count: u32,
    chapters_per_title: u32,
    location: DiscLocation,
    total_title_time: DiscTimecode,
    language_selection_fails: bool,
    last_command_handle: Option<u64>,
    last_shown_menu: Option<DiscMenu>,
    last_selected_position: Option<(u32, u32)>,
    last_activated_position: Option<(u32, u32)>,
    last_relative_button: Option<ButtonDirection>,
    activate_count: u32,
    last_played_title: Option<u32>,
    last_played_chapter: Option<u32>,
    last_play_at: Option<DiscTimecode>,
    subpicture_enabled: Option<bool>,
    selected_audio_lcid: Option<u32>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            next_handle: 1,
            state: RunState::Stopped,
            stopping_from: None,
            stop_polls_left: 0,
            stop_polls: 0,
            sink: None,
            fail_filters: Vec::new(),
            fail_render: false,
            fail_next_run: false,
            line21_fails: false,
            renders: 0,
            manual_renders: 0,
            reconnects: 0,
            duration: 0,
            position: 0,
            rate: 1.0,
            caps: SeekCaps { can_seek_forwards: true, can_seek_backwards: true },
            volume: None,
            line21_enabled: true,
            frame_skipping: None,
            resolution: VideoResolution { width: 720, height: 576 },
            disc_directory: None,
            title_count: 1,
            chapters_per_title: 1,
            location: DiscLocation::default(),
            total_title_time: DiscTimecode::default(),
            language_selection_fails: false,
            last_command_handle: None,
            last_shown_menu: None,
            last_selected_position: None,
            last_activated_position: None,
            last_relative_button: None,
            activate_count: 0,
            last_played_title: None,
            last_played_chapter: None,
            last_play_at: None,
            subpicture_enabled: None,
            selected_audio_lcid: None,
        }
    }
}

#[derive(Clone)]
pub struct SimBackend {
    inner: Arc<Mutex<SimState>>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(SimState::default())) }
    }

    // --- configuration ---

    /// Make adding the named filter fail.
    pub fn fail_filter(&self, name: &str) {
        self.inner.lock().fail_filters.push(name.to_string());
    }

    /// Make rendering fail, as when no renderer can be connected.
    pub fn fail_render(&self) {
        self.inner.lock().fail_render = true;
    }

    /// Make the closed-caption toggle return a native error.
    pub fn fail_line21(&self) {
        self.inner.lock().line21_fails = true;
    }

    /// Make the next run call fail.
    pub fn fail_next_run(&self) {
        self.inner.lock().fail_next_run = true;
    }

    /// Make language selection fail as if outside the Stop domain.
    pub fn fail_language_selection(&self) {
        self.inner.lock().language_selection_fails = true;
    }

    /// Number of run-state polls a stop takes before it settles.
    pub fn set_stop_polls(&self, polls: u32) {
        self.inner.lock().stop_polls = polls;
    }

    pub fn set_duration(&self, duration: Duration) {
        self.inner.lock().duration = (duration.as_nanos() / 100) as Hns;
    }

    pub fn set_position(&self, position: Duration) {
        self.inner.lock().position = (position.as_nanos() / 100) as Hns;
    }

    pub fn set_seek_caps(&self, caps: SeekCaps) {
        self.inner.lock().caps = caps;
    }

    pub fn set_resolution(&self, width: u32, height: u32) {
        self.inner.lock().resolution = VideoResolution { width, height };
    }

    pub fn set_disc_layout(&self, titles: u32, chapters_per_title: u32) {
        let mut inner = self.inner.lock();
        inner.title_count = titles;
        inner.chapters_per_title = chapters_per_title;
    }

    pub fn set_location(&self, title: u32, chapter: u32) {
        let mut inner = self.inner.lock();
        inner.location.title = title;
        inner.location.chapter = chapter;
    }

    pub fn set_total_title_time(&self, time: Duration) {
        self.inner.lock().total_title_time = DiscTimecode::from_duration(time);
    }

    // --- inspection ---

    pub fn filter_names(&self) -> Vec<String> {
        self.inner.lock().filters.iter().map(|(_, n)| n.clone()).collect()
    }

    pub fn filter_count(&self) -> usize {
        self.inner.lock().filters.len()
    }

    pub fn state(&self) -> RunState {
        self.inner.lock().state
    }

    pub fn current_position(&self) -> Duration {
        Duration::from_nanos(self.inner.lock().position.max(0) as u64 * 100)
    }

    pub fn current_rate(&self) -> f64 {
        self.inner.lock().rate
    }

    pub fn last_volume(&self) -> Option<i32> {
        self.inner.lock().volume
    }

    pub fn line21_enabled(&self) -> bool {
        self.inner.lock().line21_enabled
    }

    pub fn frame_skipping(&self) -> Option<bool> {
        self.inner.lock().frame_skipping
    }

    pub fn render_count(&self) -> u32 {
        self.inner.lock().renders
    }

    pub fn manual_render_count(&self) -> u32 {
        self.inner.lock().manual_renders
    }

    pub fn reconnect_count(&self) -> u32 {
        self.inner.lock().reconnects
    }

    pub fn disc_directory(&self) -> Option<String> {
        self.inner.lock().disc_directory.clone()
    }

    pub fn last_command_handle(&self) -> Option<u64> {
        self.inner.lock().last_command_handle
    }

    pub fn last_shown_menu(&self) -> Option<DiscMenu> {
        self.inner.lock().last_shown_menu
    }

    pub fn last_selected_position(&self) -> Option<(u32, u32)> {
        self.inner.lock().last_selected_position
    }

    pub fn last_activated_position(&self) -> Option<(u32, u32)> {
        self.inner.lock().last_activated_position
    }

    pub fn last_relative_button(&self) -> Option<ButtonDirection> {
        self.inner.lock().last_relative_button
    }

    pub fn last_played_title(&self) -> Option<u32> {
        self.inner.lock().last_played_title
    }

    pub fn last_played_chapter(&self) -> Option<u32> {
        self.inner.lock().last_played_chapter
    }

    pub fn last_play_at(&self) -> Option<DiscTimecode> {
        self.inner.lock().last_play_at
    }

    pub fn selected_audio_lcid(&self) -> Option<u32> {
        self.inner.lock().selected_audio_lcid
    }

    pub fn activate_count(&self) -> u32 {
        self.inner.lock().activate_count
    }

    pub fn subpicture_enabled(&self) -> Option<bool> {
        self.inner.lock().subpicture_enabled
    }

    /// Deliver a frame through the registered presentation sink.
    pub fn deliver_frame(&self, width: u32, height: u32, data: &[u8]) {
        let sink = self.inner.lock().sink.clone();
        if let Some(sink) = sink {
            sink.present_frame(width, height, width, height, data);
        }
    }

    fn next_command_handle(inner: &mut SimState) -> Option<u64> {
        let handle = inner.next_handle;
        inner.next_handle += 1;
        inner.last_command_handle = Some(handle);
        Some(handle)
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBackend for SimBackend {
    fn add_source_filter(&mut self, path: &str, name: &str) -> GraphResult<FilterHandle> {
        let mut inner = self.inner.lock();
        if inner.fail_filters.iter().any(|f| f == name) {
            return Err(GraphError::AddFilter(name.to_string()));
        }
        let handle = FilterHandle(inner.next_handle);
        inner.next_handle += 1;
        inner.filters.push((handle, format!("{} [{}]", name, path)));
        Ok(handle)
    }

    fn add_filter_by_name(&mut self, name: &str) -> GraphResult<FilterHandle> {
        let mut inner = self.inner.lock();
        if inner.fail_filters.iter().any(|f| f == name) {
            return Err(GraphError::AddFilter(name.to_string()));
        }
        let handle = FilterHandle(inner.next_handle);
        inner.next_handle += 1;
        inner.filters.push((handle, name.to_string()));
        Ok(handle)
    }

    fn render_unconnected_outputs(&mut self, _from: FilterHandle) -> GraphResult<()> {
        let mut inner = self.inner.lock();
        if inner.fail_render {
            return Err(GraphError::Render("video renderer".to_string()));
        }
        inner.renders += 1;
        Ok(())
    }

    fn render_manual_pins(&mut self, _from: FilterHandle) -> GraphResult<()> {
        let mut inner = self.inner.lock();
        if inner.fail_render {
            return Err(GraphError::Render("manual pins".to_string()));
        }
        inner.manual_renders += 1;
        Ok(())
    }

    fn reconnect_all(&mut self) -> GraphResult<()> {
        self.inner.lock().reconnects += 1;
        Ok(())
    }

    fn remove_filter(&mut self, handle: FilterHandle) -> GraphResult<()> {
        self.inner.lock().filters.retain(|(h, _)| *h != handle);
        Ok(())
    }

    fn set_presentation_sink(&mut self, sink: Arc<dyn PresentationSink>) {
        self.inner.lock().sink = Some(sink);
    }

    fn run(&mut self) -> GraphResult<()> {
        let mut inner = self.inner.lock();
        if inner.fail_next_run {
            inner.fail_next_run = false;
            return Err(GraphError::Control("run failed".to_string()));
        }
        inner.stopping_from = None;
        inner.state = RunState::Running;
        Ok(())
    }

    fn pause(&mut self) -> GraphResult<()> {
        let mut inner = self.inner.lock();
        inner.stopping_from = None;
        inner.state = RunState::Paused;
        Ok(())
    }

    fn stop(&mut self) -> GraphResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != RunState::Stopped && inner.stopping_from.is_none() {
            inner.stopping_from = Some(inner.state);
            inner.stop_polls_left = inner.stop_polls;
        }
        Ok(())
    }

    fn run_state(&mut self, _timeout: Duration) -> GraphResult<RunState> {
        let mut inner = self.inner.lock();
        if let Some(from) = inner.stopping_from {
            if inner.stop_polls_left > 0 {
                inner.stop_polls_left -= 1;
                return Ok(from);
            }
            inner.stopping_from = None;
            inner.state = RunState::Stopped;
        }
        Ok(inner.state)
    }

    fn duration(&mut self) -> GraphResult<Hns> {
        Ok(self.inner.lock().duration)
    }

    fn position(&mut self) -> GraphResult<Hns> {
        Ok(self.inner.lock().position)
    }

    fn seek_absolute(&mut self, position: Hns) -> GraphResult<()> {
        let mut inner = self.inner.lock();
        if position < 0 || (inner.duration > 0 && position > inner.duration) {
            return Err(GraphError::Seek(format!("position {} out of range", position)));
        }
        inner.position = position;
        Ok(())
    }

    fn seek_caps(&mut self) -> GraphResult<SeekCaps> {
        Ok(self.inner.lock().caps)
    }

    fn rate(&mut self) -> GraphResult<f64> {
        Ok(self.inner.lock().rate)
    }

    fn set_rate(&mut self, rate: f64) -> GraphResult<()> {
        self.inner.lock().rate = rate;
        Ok(())
    }

    fn set_volume_hundredth_db(&mut self, volume: i32) -> GraphResult<()> {
        self.inner.lock().volume = Some(volume);
        Ok(())
    }

    fn set_line21_enabled(&mut self, enabled: bool) -> GraphResult<()> {
        let mut inner = self.inner.lock();
        if inner.line21_fails {
            return Err(GraphError::Native(SIM_ERR_LINE21));
        }
        inner.line21_enabled = enabled;
        Ok(())
    }

    fn enable_frame_skipping(&mut self, enabled: bool) -> GraphResult<()> {
        self.inner.lock().frame_skipping = Some(enabled);
        Ok(())
    }

    fn video_resolution(&mut self) -> GraphResult<VideoResolution> {
        Ok(self.inner.lock().resolution)
    }

    fn disc_control(&mut self) -> Option<&mut dyn DiscControl> {
        Some(self)
    }
}

impl DiscControl for SimBackend {
    fn set_disc_directory(&mut self, path: &str) -> GraphResult<()> {
        self.inner.lock().disc_directory = Some(path.to_string());
        Ok(())
    }

    fn show_menu(&mut self, menu: DiscMenu) -> GraphResult<Option<u64>> {
        let mut inner = self.inner.lock();
        inner.last_shown_menu = Some(menu);
        Ok(Self::next_command_handle(&mut inner))
    }

    fn select_at_position(&mut self, x: u32, y: u32) -> GraphResult<()> {
        self.inner.lock().last_selected_position = Some((x, y));
        Ok(())
    }

    fn activate_at_position(&mut self, x: u32, y: u32) -> GraphResult<()> {
        self.inner.lock().last_activated_position = Some((x, y));
        Ok(())
    }

    fn select_relative_button(&mut self, dir: ButtonDirection) -> GraphResult<()> {
        self.inner.lock().last_relative_button = Some(dir);
        Ok(())
    }

    fn activate_button(&mut self) -> GraphResult<()> {
        self.inner.lock().activate_count += 1;
        Ok(())
    }

    fn play_title(&mut self, title: u32) -> GraphResult<Option<u64>> {
        let mut inner = self.inner.lock();
        inner.last_played_title = Some(title);
        inner.location.title = title;
        Ok(Self::next_command_handle(&mut inner))
    }

    fn play_chapter(&mut self, chapter: u32) -> GraphResult<Option<u64>> {
        let mut inner = self.inner.lock();
        inner.last_played_chapter = Some(chapter);
        inner.location.chapter = chapter;
        Ok(Self::next_command_handle(&mut inner))
    }

    fn play_at_time(&mut self, time: DiscTimecode) -> GraphResult<Option<u64>> {
        let mut inner = self.inner.lock();
        inner.last_play_at = Some(time);
        inner.location.time = time;
        Ok(Self::next_command_handle(&mut inner))
    }

    fn title_count(&mut self) -> GraphResult<u32> {
        Ok(self.inner.lock().title_count)
    }

    fn chapter_count(&mut self, _title: u32) -> GraphResult<u32> {
        Ok(self.inner.lock().chapters_per_title)
    }

    fn current_location(&mut self) -> GraphResult<DiscLocation> {
        Ok(self.inner.lock().location)
    }

    fn total_title_time(&mut self) -> GraphResult<DiscTimecode> {
        Ok(self.inner.lock().total_title_time)
    }

    fn select_default_audio_language(&mut self, lcid: u32) -> GraphResult<()> {
        let mut inner = self.inner.lock();
        if inner.language_selection_fails {
            return Err(GraphError::Native(SIM_ERR_WRONG_DOMAIN));
        }
        inner.selected_audio_lcid = Some(lcid);
        Ok(())
    }

    fn select_default_menu_language(&mut self, _lcid: u32) -> GraphResult<()> {
        if self.inner.lock().language_selection_fails {
            return Err(GraphError::Native(SIM_ERR_WRONG_DOMAIN));
        }
        Ok(())
    }

    fn select_default_subpicture_language(&mut self, _lcid: u32) -> GraphResult<()> {
        if self.inner.lock().language_selection_fails {
            return Err(GraphError::Native(SIM_ERR_WRONG_DOMAIN));
        }
        Ok(())
    }

    fn set_subpicture_state(&mut self, enabled: bool) -> GraphResult<()> {
        self.inner.lock().subpicture_enabled = Some(enabled);
        Ok(())
    }

    fn source_resolution(&mut self) -> GraphResult<VideoResolution> {
        Ok(self.inner.lock().resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_settles_after_polls() {
        let mut sim = SimBackend::new();
        sim.set_stop_polls(2);
        sim.run().unwrap();
        sim.stop().unwrap();

        let t = Duration::from_millis(10);
        assert_eq!(sim.run_state(t).unwrap(), RunState::Running);
        assert_eq!(sim.run_state(t).unwrap(), RunState::Running);
        assert_eq!(sim.run_state(t).unwrap(), RunState::Stopped);
        assert_eq!(sim.run_state(t).unwrap(), RunState::Stopped);
    }

    #[test]
    fn test_filter_bookkeeping() {
        let mut sim = SimBackend::new();
        let a = sim.add_filter_by_name("Video Renderer").unwrap();
        let b = sim.add_source_filter("/media/clip.mkv", "File Source").unwrap();
        assert_eq!(sim.filter_count(), 2);

        sim.remove_filter(a).unwrap();
        assert_eq!(sim.filter_count(), 1);
        // Removing twice is harmless.
        sim.remove_filter(a).unwrap();
        sim.remove_filter(b).unwrap();
        assert_eq!(sim.filter_count(), 0);
    }

    #[test]
    fn test_injected_failures() {
        let mut sim = SimBackend::new();
        sim.fail_filter("LAV Video Decoder");
        assert!(sim.add_filter_by_name("LAV Video Decoder").is_err());
        assert!(sim.add_filter_by_name("LAV Audio Decoder").is_ok());

        sim.fail_render();
        assert!(sim.render_unconnected_outputs(FilterHandle(1)).is_err());

        sim.fail_line21();
        assert!(matches!(
            sim.set_line21_enabled(false),
            Err(GraphError::Native(code)) if code == SIM_ERR_LINE21
        ));
    }

    #[test]
    fn test_seek_rejects_out_of_range() {
        let mut sim = SimBackend::new();
        sim.set_duration(Duration::from_secs(60));
        sim.seek_absolute(30 * 10_000_000).unwrap();
        assert!(sim.seek_absolute(61 * 10_000_000).is_err());
        assert!(sim.seek_absolute(-1).is_err());
        assert_eq!(sim.current_position(), Duration::from_secs(30));
    }

    #[test]
    fn test_command_handles_are_unique() {
        let mut sim = SimBackend::new();
        let a = sim.play_title(1).unwrap();
        let b = sim.play_chapter(2).unwrap();
        let c = sim.show_menu(DiscMenu::Root).unwrap();
        assert!(a.is_some() && b.is_some() && c.is_some());
        assert_ne!(a, b);
        assert_ne!(b, c);
    }
}
