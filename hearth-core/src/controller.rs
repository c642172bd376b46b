//! Playback controller
//!
//! Owns one playback session end to end: it asks the builder for a
//! pipeline, drains graph events on its tick, commits debounced seeks,
//! routes disc notifications through the navigator, and walks the
//! session state machine:
//!
//! ```text
//! Stopped ──open──► Active ◄──resume/pause──► Paused
//!    ▲                │  │
//!    │     Complete   │  │ stop
//!    ├────── Ended ◄──┘  │
//!    └───────────────────┘
//! ```
//!
//! `stop` is idempotent and fires the stopped notification exactly
//! once per session.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::bridge::FrameBridge;
use crate::builder::{stop_graph_with_retry, BuildError, Pipeline, PipelineBuilder};
use crate::dvd::{DisplayRect, DvdError, DvdNavigator, NavigatorAction};
use crate::events::{EventQueue, GraphEvent};
use crate::graph::{duration_to_hns, hns_to_duration, ButtonDirection, GraphBackend, GraphError};
use crate::seek::{SeekDirection, SeekNegotiator, SeekStatus};
use crate::source::SourceStrategy;

/// Rates closer to 1.0 than this are normal playback.
pub const PLAYBACK_RATE_PLAY_THRESHOLD: f64 = 0.05;

const EVENT_QUEUE_CAPACITY: usize = 128;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Dvd(#[from] DvdError),
    #[error("no active playback session")]
    NotActive,
}

/// Session state. `Ended` means the media finished by itself; the
/// graph is still alive until `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Stopped,
    Active,
    Paused,
    Ended,
}

/// Callbacks toward the UI layer. All default to no-ops.
pub trait PlayerEventSink: Send + Sync {
    fn on_started(&self) {}
    fn on_state_ready(&self) {}
    fn on_playback_state_changed(&self) {}
    fn on_stopped(&self) {}
    fn on_ended(&self) {}
    fn on_error(&self, _code: i32) {}
}

pub struct NullEventSink;
impl PlayerEventSink for NullEventSink {}

/// Linear 0..=100 volume to the hundredth-decibel scale the audio
/// interface expects (-10000 silence, 0 full).
pub fn volume_to_hundredth_db(volume: u32) -> i32 {
    let v = volume.min(100) as f64;
    (((v * 99.0 / 100.0 + 1.0).log10() - 2.0) * 5000.0) as i32
}

// ============================================================================
// Controller
// ============================================================================

pub struct PlaybackController {
    builder: PipelineBuilder,
    pipeline: Option<Pipeline>,
    bridge: Arc<FrameBridge>,
    events: Arc<EventQueue>,
    seek: SeekNegotiator,
    dvd: DvdNavigator,
    sink: Box<dyn PlayerEventSink>,
    state: PlayerState,
    is_disc: bool,
    volume: u32,
    muted: bool,
}

impl PlaybackController {
    pub fn new(builder: PipelineBuilder, sink: Box<dyn PlayerEventSink>) -> Self {
        Self {
            builder,
            pipeline: None,
            bridge: Arc::new(FrameBridge::new()),
            events: Arc::new(EventQueue::new(EVENT_QUEUE_CAPACITY)),
            seek: SeekNegotiator::new(),
            dvd: DvdNavigator::new(),
            sink,
            state: PlayerState::Stopped,
            is_disc: false,
            volume: 100,
            muted: false,
        }
    }

    // --- accessors ---

    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Where the graph's notification pump delivers events.
    pub fn event_queue(&self) -> Arc<EventQueue> {
        self.events.clone()
    }

    pub fn bridge(&self) -> Arc<FrameBridge> {
        self.bridge.clone()
    }

    pub fn dvd(&self) -> &DvdNavigator {
        &self.dvd
    }

    pub fn is_seeking(&self) -> bool {
        self.seek.is_seeking()
    }

    // --- lifecycle ---

    /// Build the graph and start playback. On failure everything
    /// built so far is torn down and the session stays stopped.
    pub fn open(
        &mut self,
        graph: Box<dyn GraphBackend>,
        strategy: Box<dyn SourceStrategy>,
    ) -> Result<(), PlayerError> {
        if self.pipeline.is_some() {
            self.stop();
        }

        let mut pipeline = self.builder.build(graph, strategy, self.bridge.clone())?;
        self.is_disc = pipeline.strategy().is_disc();

        let volume = if self.muted { 0 } else { self.volume };
        if let Err(err) = pipeline
            .graph()
            .set_volume_hundredth_db(volume_to_hundredth_db(volume))
        {
            tracing::warn!("initial volume not applied: {}", err);
        }

        self.pipeline = Some(pipeline);
        self.dvd.reset();
        self.state = PlayerState::Active;
        self.sink.on_started();
        self.sink.on_state_ready();
        Ok(())
    }

    /// Stop and tear down the session. Idempotent; notifies exactly
    /// once.
    pub fn stop(&mut self) {
        if self.state == PlayerState::Stopped {
            tracing::debug!("already stopped");
            return;
        }

        self.seek.cancel();
        self.dvd.abandon_pending();
        self.dvd.reset();
        self.events.clear();

        if let Some(mut pipeline) = self.pipeline.take() {
            if let Err(err) = pipeline.teardown() {
                tracing::warn!("teardown: {}", err);
            }
        }

        self.state = PlayerState::Stopped;
        self.is_disc = false;
        self.sink.on_stopped();
    }

    pub fn pause(&mut self) -> Result<(), PlayerError> {
        if self.state != PlayerState::Active {
            return Ok(());
        }
        self.stop_seeking();
        let pipeline = self.pipeline.as_mut().ok_or(PlayerError::NotActive)?;
        pipeline.graph().pause()?;
        self.state = PlayerState::Paused;
        self.sink.on_playback_state_changed();
        Ok(())
    }

    /// Resume paused playback. A graph that refuses to run again is
    /// unrecoverable: the session is shut down before the error is
    /// returned.
    pub fn resume(&mut self) -> Result<(), PlayerError> {
        if self.state != PlayerState::Paused {
            return Ok(());
        }
        self.stop_seeking();
        let pipeline = self.pipeline.as_mut().ok_or(PlayerError::NotActive)?;
        if let Err(err) = pipeline.graph().run() {
            tracing::error!("resume failed, shutting down: {}", err);
            self.stop();
            return Err(err.into());
        }
        self.state = PlayerState::Active;
        self.sink.on_playback_state_changed();
        Ok(())
    }

    /// Seek back to the start and play from there.
    pub fn restart(&mut self) -> Result<(), PlayerError> {
        let pipeline = self.pipeline.as_mut().ok_or(PlayerError::NotActive)?;
        self.seek.cancel();
        let graph = pipeline.graph();
        if let Err(err) = graph.set_rate(1.0) {
            tracing::debug!("rate reset: {}", err);
        }
        graph.seek_absolute(0)?;
        graph.run()?;
        self.state = PlayerState::Active;
        self.sink.on_playback_state_changed();
        Ok(())
    }

    /// Abandon any seek in progress and return to normal rate.
    fn stop_seeking(&mut self) {
        self.seek.cancel();
        if let Some(pipeline) = self.pipeline.as_mut() {
            let graph = pipeline.graph();
            match graph.rate() {
                Ok(rate) if (rate - 1.0).abs() >= PLAYBACK_RATE_PLAY_THRESHOLD => {
                    if let Err(err) = graph.set_rate(1.0) {
                        tracing::debug!("rate reset: {}", err);
                    }
                }
                Ok(_) => {}
                Err(err) => tracing::debug!("rate query: {}", err),
            }
        }
    }

    // --- tick ---

    /// Engine idle tick: drain events, apply navigator side effects,
    /// commit a debounced seek once its quiet period elapsed.
    pub fn tick(&mut self, now: Instant) {
        let mut request_stop = false;

        for event in self.events.drain() {
            match &event {
                GraphEvent::Complete => {
                    tracing::info!("playback complete");
                    if self.state == PlayerState::Active || self.state == PlayerState::Paused {
                        self.state = PlayerState::Ended;
                        self.sink.on_ended();
                    }
                }
                GraphEvent::ErrorAbort(code) => {
                    tracing::error!("graph aborted: {:#x}", code);
                    self.sink.on_error(*code);
                    request_stop = true;
                }
                GraphEvent::MediaTypeChanged => {
                    if let Some(pipeline) = self.pipeline.as_mut() {
                        if let Err(err) = pipeline.media_type_changed() {
                            tracing::error!("media type change failed: {}", err);
                            self.sink.on_error(0);
                            request_stop = true;
                        }
                    }
                }
                _ => {
                    if !self.is_disc {
                        tracing::debug!("disc event outside a disc session: {:?}", event);
                        continue;
                    }
                    let Some(pipeline) = self.pipeline.as_mut() else {
                        continue;
                    };
                    let Some(disc) = pipeline.graph().disc_control() else {
                        tracing::debug!("disc event without navigator: {:?}", event);
                        continue;
                    };
                    let actions = self.dvd.handle_event(&event, disc, now);
                    for action in actions {
                        match action {
                            NavigatorAction::RequestStop => request_stop = true,
                            NavigatorAction::EnableFrameSkipping(enabled) => {
                                if let Err(err) = pipeline.graph().enable_frame_skipping(enabled) {
                                    tracing::debug!("frame skipping toggle: {}", err);
                                }
                            }
                        }
                    }
                }
            }
        }

        if request_stop {
            self.stop();
            return;
        }

        let duration = self.duration();
        if let Some(target) = self.seek.on_idle_tick(duration, now) {
            if let Err(err) = self.apply_seek(target, now) {
                tracing::warn!("seek to {:?} failed: {}", target, err);
            }
        }
    }

    fn apply_seek(&mut self, target: Duration, now: Instant) -> Result<(), PlayerError> {
        let pipeline = self.pipeline.as_mut().ok_or(PlayerError::NotActive)?;
        if self.is_disc {
            let graph = pipeline.graph();
            let disc = graph.disc_control().ok_or(PlayerError::NotActive)?;
            self.dvd.play_at(disc, target, now)?;
        } else {
            pipeline.graph().seek_absolute(duration_to_hns(target))?;
        }
        Ok(())
    }

    // --- position / duration ---

    pub fn current_time(&mut self) -> Duration {
        if self.is_disc {
            return self.dvd.current_time();
        }
        match self.pipeline.as_mut().map(|p| p.graph().position()) {
            Some(Ok(hns)) => hns_to_duration(hns),
            _ => Duration::ZERO,
        }
    }

    /// Direct seek. Positions at or beyond the end are ignored, like
    /// the boundary clamp in stepped seeking.
    pub fn set_current_time(&mut self, time: Duration) -> Result<(), PlayerError> {
        let duration = self.duration();
        if !duration.is_zero() && time >= duration {
            tracing::debug!("seek to {:?} beyond duration {:?}, ignored", time, duration);
            return Ok(());
        }
        let now = Instant::now();
        self.apply_seek(time, now)
    }

    pub fn duration(&mut self) -> Duration {
        if self.is_disc {
            return self.dvd.title_duration();
        }
        match self.pipeline.as_mut().map(|p| p.graph().duration()) {
            Some(Ok(hns)) => hns_to_duration(hns),
            _ => Duration::ZERO,
        }
    }

    // --- stepped seeking ---

    /// Register a skip gesture; the seek itself happens on a later
    /// tick once the debounce interval passes.
    pub fn seek_relative(&mut self, direction: SeekDirection, now: Instant) -> Option<SeekStatus> {
        if self.state != PlayerState::Active && self.state != PlayerState::Paused {
            return None;
        }
        let position = self.current_time();
        let duration = self.duration();
        self.seek.on_gesture(direction, position, duration, now)
    }

    pub fn can_seek_forwards(&mut self) -> bool {
        self.pipeline
            .as_mut()
            .and_then(|p| p.graph().seek_caps().ok())
            .map(|c| c.can_seek_forwards)
            .unwrap_or(false)
    }

    pub fn can_seek_backwards(&mut self) -> bool {
        self.pipeline
            .as_mut()
            .and_then(|p| p.graph().seek_caps().ok())
            .map(|c| c.can_seek_backwards)
            .unwrap_or(false)
    }

    // --- rate ---

    pub fn playback_rate(&mut self) -> f64 {
        self.pipeline
            .as_mut()
            .and_then(|p| p.graph().rate().ok())
            .unwrap_or(1.0)
    }

    /// Returns true when the rate actually changed.
    pub fn set_playback_rate(&mut self, rate: f64) -> Result<bool, PlayerError> {
        let pipeline = self.pipeline.as_mut().ok_or(PlayerError::NotActive)?;
        let graph = pipeline.graph();
        let current = graph.rate()?;
        if (current - rate).abs() < PLAYBACK_RATE_PLAY_THRESHOLD {
            return Ok(false);
        }
        graph.set_rate(rate)?;
        self.sink.on_playback_state_changed();
        Ok(true)
    }

    // --- volume ---

    pub fn set_volume(&mut self, volume: u32) -> Result<(), PlayerError> {
        self.volume = volume.min(100);
        self.apply_volume()
    }

    pub fn set_mute(&mut self, mute: bool) -> Result<(), PlayerError> {
        self.muted = mute;
        self.apply_volume()
    }

    pub fn volume(&self) -> u32 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    fn apply_volume(&mut self) -> Result<(), PlayerError> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(());
        };
        let volume = if self.muted { 0 } else { self.volume };
        pipeline
            .graph()
            .set_volume_hundredth_db(volume_to_hundredth_db(volume))?;
        Ok(())
    }

    // --- device reset ---

    /// Free GUI-side device resources: the bridge drops its surfaces
    /// (waiting for any in-flight frame) and the graph is stopped.
    pub fn release_gui_resources(&mut self) {
        self.bridge.release_resources();
        if let Some(pipeline) = self.pipeline.as_mut() {
            if let Err(err) = stop_graph_with_retry(pipeline.graph()) {
                tracing::warn!("stop for device reset: {}", err);
            }
        }
    }

    /// Rebuild GUI-side resources after the device returned and put
    /// the graph back into its pre-reset run state.
    pub fn realloc_gui_resources(&mut self) {
        self.bridge.realloc_resources();
        if let Some(pipeline) = self.pipeline.as_mut() {
            let result = match self.state {
                PlayerState::Active => pipeline.graph().run(),
                PlayerState::Paused => pipeline.graph().pause(),
                _ => Ok(()),
            };
            if let Err(err) = result {
                tracing::error!("graph did not restart after device reset: {}", err);
            }
        }
    }

    // --- disc surface ---

    pub fn in_dvd_menu(&self) -> bool {
        self.dvd.menu_active()
    }

    pub fn show_dvd_menu(&mut self, now: Instant) -> Result<(), PlayerError> {
        let (dvd, disc) = self.disc_control()?;
        dvd.show_menu(disc, now)?;
        Ok(())
    }

    pub fn dvd_pointer_moved(
        &mut self,
        px: i32,
        py: i32,
        display: DisplayRect,
    ) -> Result<(), PlayerError> {
        let (dvd, disc) = self.disc_control()?;
        dvd.pointer_moved(disc, px, py, display)?;
        Ok(())
    }

    pub fn dvd_pointer_clicked(
        &mut self,
        px: i32,
        py: i32,
        display: DisplayRect,
    ) -> Result<(), PlayerError> {
        let (dvd, disc) = self.disc_control()?;
        dvd.pointer_clicked(disc, px, py, display)?;
        Ok(())
    }

    pub fn dvd_navigate(&mut self, dir: ButtonDirection) -> Result<(), PlayerError> {
        let (dvd, disc) = self.disc_control()?;
        dvd.navigate(disc, dir)?;
        Ok(())
    }

    pub fn dvd_activate(&mut self) -> Result<(), PlayerError> {
        let (dvd, disc) = self.disc_control()?;
        dvd.activate(disc)?;
        Ok(())
    }

    pub fn dvd_titles(&mut self) -> Result<Vec<String>, PlayerError> {
        let (dvd, disc) = self.disc_control()?;
        Ok(dvd.titles(disc)?)
    }

    pub fn dvd_chapters(&mut self) -> Result<Vec<String>, PlayerError> {
        let (dvd, disc) = self.disc_control()?;
        Ok(dvd.chapters(disc)?)
    }

    pub fn dvd_play_title(&mut self, title: u32, now: Instant) -> Result<(), PlayerError> {
        let (dvd, disc) = self.disc_control()?;
        dvd.play_title(disc, title, now)?;
        Ok(())
    }

    pub fn dvd_next_chapter(&mut self, now: Instant) -> Result<(), PlayerError> {
        let (dvd, disc) = self.disc_control()?;
        dvd.next_chapter(disc, now)?;
        Ok(())
    }

    pub fn dvd_prev_chapter(&mut self, now: Instant) -> Result<(), PlayerError> {
        let (dvd, disc) = self.disc_control()?;
        dvd.prev_chapter(disc, now)?;
        Ok(())
    }

    fn disc_control(
        &mut self,
    ) -> Result<(&DvdNavigator, &mut dyn crate::graph::DiscControl), PlayerError> {
        if !self.is_disc {
            return Err(PlayerError::NotActive);
        }
        let pipeline = self.pipeline.as_mut().ok_or(PlayerError::NotActive)?;
        let disc = pipeline
            .graph()
            .disc_control()
            .ok_or(PlayerError::NotActive)?;
        Ok((&self.dvd, disc))
    }
}
