//! Filter-graph boundary
//!
//! The host multimedia framework (filter graph, pins, media control,
//! media seeking, disc navigator) is a collaborator, not part of this
//! crate. This module defines the traits the engine drives it through,
//! the shared error type, and the RAII guard that keeps native object
//! lifetimes balanced.
//!
//! Time positions at this boundary are expressed in 100-nanosecond
//! units, matching the native seeking interface.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Time units
// ============================================================================

/// Position / duration in 100-nanosecond units.
pub type Hns = i64;

/// 100-nanosecond units per second.
pub const HNS_PER_SECOND: Hns = 10_000_000;

/// 100-nanosecond units per millisecond.
pub const HNS_PER_MS: Hns = 10_000;

pub fn duration_to_hns(d: Duration) -> Hns {
    (d.as_nanos() / 100) as Hns
}

pub fn hns_to_duration(hns: Hns) -> Duration {
    Duration::from_nanos((hns.max(0) as u64) * 100)
}

// ============================================================================
// Errors
// ============================================================================

/// Error type for graph boundary operations
#[derive(Debug, Clone)]
pub enum GraphError {
    /// Filter not found or couldn't be created
    FilterNotFound(String),
    /// Failed to add a filter to the graph
    AddFilter(String),
    /// Failed to connect pins
    Connect(String),
    /// Failed to render an output pin
    Render(String),
    /// Run/pause/stop control error
    Control(String),
    /// Seeking error
    Seek(String),
    /// Source path does not exist
    FileNotFound(String),
    /// Native result code with no finer classification
    Native(i32),
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FilterNotFound(s) => write!(f, "Filter not found: {}", s),
            Self::AddFilter(s) => write!(f, "Failed to add filter: {}", s),
            Self::Connect(s) => write!(f, "Failed to connect: {}", s),
            Self::Render(s) => write!(f, "Failed to render: {}", s),
            Self::Control(s) => write!(f, "Playback control error: {}", s),
            Self::Seek(s) => write!(f, "Seek error: {}", s),
            Self::FileNotFound(s) => write!(f, "File not found: {}", s),
            Self::Native(code) => write!(f, "Native error code {:#x}", code),
        }
    }
}

impl std::error::Error for GraphError {}

pub type GraphResult<T> = Result<T, GraphError>;

// ============================================================================
// Run state / capabilities
// ============================================================================

/// Graph run state as reported by the media control interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Paused,
    Running,
}

/// Seek capabilities reported by the media seeking interface.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeekCaps {
    pub can_seek_forwards: bool,
    pub can_seek_backwards: bool,
}

/// Video stream geometry published by the source/renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoResolution {
    pub width: u32,
    pub height: u32,
}

// ============================================================================
// Presentation sink
// ============================================================================

/// Receives decoded frames from the renderer's presenter callback.
///
/// `present_frame` is invoked on the renderer's delivery thread, never
/// on the thread that drives the graph.
pub trait PresentationSink: Send + Sync {
    fn present_frame(&self, width: u32, height: u32, aspect_x: u32, aspect_y: u32, data: &[u8]);
}

// ============================================================================
// Graph backend
// ============================================================================

/// Opaque identifier for a filter instance inside the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterHandle(pub u64);

/// The host filter-graph framework, as the engine sees it.
///
/// Implementations wrap the native graph builder plus its media control,
/// seeking and audio interfaces. [`crate::sim::SimBackend`] provides an
/// in-process implementation for tests and the demo player.
pub trait GraphBackend: Send {
    // --- graph assembly ---

    /// Add the source filter for a media path.
    fn add_source_filter(&mut self, path: &str, name: &str) -> GraphResult<FilterHandle>;

    /// Add a filter by its registered name (codec, renderer, navigator).
    fn add_filter_by_name(&mut self, name: &str) -> GraphResult<FilterHandle>;

    /// Connect every unconnected output pin downstream. Fails if the
    /// video renderer cannot be reached.
    fn render_unconnected_outputs(&mut self, from: FilterHandle) -> GraphResult<()>;

    /// Render output pins whose names mark them as manual-connect only.
    fn render_manual_pins(&mut self, from: FilterHandle) -> GraphResult<()>;

    /// Disconnect and re-render every stream after a media type change.
    fn reconnect_all(&mut self) -> GraphResult<()>;

    /// Remove a filter from the graph. Removing an unknown handle is a
    /// no-op.
    fn remove_filter(&mut self, handle: FilterHandle) -> GraphResult<()>;

    /// Register the sink the video renderer delivers frames to.
    fn set_presentation_sink(&mut self, sink: std::sync::Arc<dyn PresentationSink>);

    // --- transport ---

    fn run(&mut self) -> GraphResult<()>;
    fn pause(&mut self) -> GraphResult<()>;

    /// Request a stop. Stopping is asynchronous: the state transition
    /// completes some time after this returns, observed via `run_state`.
    fn stop(&mut self) -> GraphResult<()>;

    /// Poll the current run state, waiting up to `timeout` for a
    /// transition in progress to settle.
    fn run_state(&mut self, timeout: Duration) -> GraphResult<RunState>;

    // --- seeking ---

    fn duration(&mut self) -> GraphResult<Hns>;
    fn position(&mut self) -> GraphResult<Hns>;
    fn seek_absolute(&mut self, position: Hns) -> GraphResult<()>;
    fn seek_caps(&mut self) -> GraphResult<SeekCaps>;
    fn rate(&mut self) -> GraphResult<f64>;
    fn set_rate(&mut self, rate: f64) -> GraphResult<()>;

    // --- audio / auxiliary ---

    /// Set audio volume in hundredth-decibel, range -10000 (silence)
    /// to 0 (full scale).
    fn set_volume_hundredth_db(&mut self, volume: i32) -> GraphResult<()>;

    /// Disable/enable the closed-caption line-21 service. A native
    /// failure here is transient: callers log and continue.
    fn set_line21_enabled(&mut self, enabled: bool) -> GraphResult<()>;

    /// Allow or forbid the renderer to skip late frames.
    fn enable_frame_skipping(&mut self, enabled: bool) -> GraphResult<()>;

    /// Geometry of the connected video stream, once known.
    fn video_resolution(&mut self) -> GraphResult<VideoResolution>;

    /// Disc command surface, when the graph contains a disc navigator.
    /// Mirrors interface querying at the native boundary.
    fn disc_control(&mut self) -> Option<&mut dyn DiscControl> {
        None
    }
}

// ============================================================================
// Disc control
// ============================================================================

/// Relative button directions on a disc menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonDirection {
    Upper,
    Lower,
    Left,
    Right,
}

/// Which disc menu to bring up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscMenu {
    Root,
    Title,
    Chapter,
}

/// Disc timecode as hours/minutes/seconds/frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscTimecode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
}

impl DiscTimecode {
    pub fn from_duration(d: Duration) -> Self {
        let total = d.as_secs();
        Self {
            hours: (total / 3600) as u8,
            minutes: ((total / 60) % 60) as u8,
            seconds: (total % 60) as u8,
            frames: 0,
        }
    }

    pub fn to_duration(self) -> Duration {
        Duration::from_secs(
            self.hours as u64 * 3600 + self.minutes as u64 * 60 + self.seconds as u64,
        )
    }
}

/// Current playback location on the disc.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscLocation {
    pub title: u32,
    pub chapter: u32,
    pub time: DiscTimecode,
}

/// The disc navigator's command surface.
///
/// Navigation commands are asynchronous: they return a command handle
/// when the navigator accepted the command and will report completion
/// later through a `DvdCommandComplete` event, or `None` when the
/// command completed synchronously.
pub trait DiscControl: Send {
    /// Point the navigator at the disc's video directory.
    fn set_disc_directory(&mut self, path: &str) -> GraphResult<()>;

    // --- menus / buttons ---

    fn show_menu(&mut self, menu: DiscMenu) -> GraphResult<Option<u64>>;
    fn select_at_position(&mut self, x: u32, y: u32) -> GraphResult<()>;
    fn activate_at_position(&mut self, x: u32, y: u32) -> GraphResult<()>;
    fn select_relative_button(&mut self, dir: ButtonDirection) -> GraphResult<()>;
    fn activate_button(&mut self) -> GraphResult<()>;

    // --- title / chapter / time ---

    fn play_title(&mut self, title: u32) -> GraphResult<Option<u64>>;
    fn play_chapter(&mut self, chapter: u32) -> GraphResult<Option<u64>>;
    fn play_at_time(&mut self, time: DiscTimecode) -> GraphResult<Option<u64>>;
    fn title_count(&mut self) -> GraphResult<u32>;
    fn chapter_count(&mut self, title: u32) -> GraphResult<u32>;
    fn current_location(&mut self) -> GraphResult<DiscLocation>;
    fn total_title_time(&mut self) -> GraphResult<DiscTimecode>;

    // --- stream defaults ---

    /// Select the default audio language. Only valid in the Stop
    /// domain; elsewhere the navigator returns a transient code.
    fn select_default_audio_language(&mut self, lcid: u32) -> GraphResult<()>;
    fn select_default_menu_language(&mut self, lcid: u32) -> GraphResult<()>;
    fn select_default_subpicture_language(&mut self, lcid: u32) -> GraphResult<()>;
    fn set_subpicture_state(&mut self, enabled: bool) -> GraphResult<()>;

    /// Pixel resolution of the source video, for pointer translation.
    fn source_resolution(&mut self) -> GraphResult<VideoResolution>;
}

// ============================================================================
// Native object accounting
// ============================================================================

/// Reference-count ledger for native objects held by one playback
/// session. The count returns to zero after a complete teardown.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    live: AtomicI64,
}

impl ResourceLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Native objects currently alive in this session.
    pub fn live(&self) -> i64 {
        self.live.load(Ordering::SeqCst)
    }

    fn acquire(&self) {
        self.live.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// RAII guard over a filter the engine added to the graph.
///
/// Dropping the guard only releases the engine's reference count; the
/// filter must be removed from the graph separately (the builder does
/// both, in order).
#[derive(Debug)]
pub struct OwnedFilter {
    handle: FilterHandle,
    name: String,
    ledger: Arc<ResourceLedger>,
}

impl OwnedFilter {
    pub fn new(handle: FilterHandle, name: impl Into<String>, ledger: Arc<ResourceLedger>) -> Self {
        ledger.acquire();
        Self { handle, name: name.into(), ledger }
    }

    pub fn handle(&self) -> FilterHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for OwnedFilter {
    fn drop(&mut self) {
        self.ledger.release();
        tracing::trace!("released filter {}", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hns_round_trip() {
        let d = Duration::from_millis(61_500);
        assert_eq!(hns_to_duration(duration_to_hns(d)), d);
        assert_eq!(duration_to_hns(Duration::from_secs(1)), HNS_PER_SECOND);
    }

    #[test]
    fn test_negative_hns_clamps_to_zero() {
        assert_eq!(hns_to_duration(-500), Duration::ZERO);
    }

    #[test]
    fn test_owned_filter_balances_ledger() {
        let ledger = ResourceLedger::new();
        {
            let _a = OwnedFilter::new(FilterHandle(1), "source", ledger.clone());
            let _b = OwnedFilter::new(FilterHandle(2), "renderer", ledger.clone());
            assert_eq!(ledger.live(), 2);
        }
        assert_eq!(ledger.live(), 0);
    }

    #[test]
    fn test_timecode_round_trip() {
        let tc = DiscTimecode::from_duration(Duration::from_secs(2 * 3600 + 13 * 60 + 42));
        assert_eq!(tc.hours, 2);
        assert_eq!(tc.minutes, 13);
        assert_eq!(tc.seconds, 42);
        assert_eq!(tc.to_duration(), Duration::from_secs(2 * 3600 + 13 * 60 + 42));
    }
}
