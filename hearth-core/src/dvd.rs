//! Disc navigation state machine
//!
//! Tracks the navigator's domain, menu/button state and the single
//! outstanding asynchronous command, and translates user input into
//! navigator calls. Domain state changes only in response to
//! `DvdDomainChange` notifications; user input never mutates it
//! directly.
//!
//! The navigator issues commands but never stops the player itself;
//! a Stop-domain notification surfaces as [`NavigatorAction::RequestStop`]
//! for the controller to act on.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

use crate::events::GraphEvent;
use crate::graph::{
    ButtonDirection, DiscControl, DiscMenu, DiscTimecode, GraphError, VideoResolution,
};
use crate::settings::PlayerSettings;

// ============================================================================
// Domains / errors
// ============================================================================

/// Navigator domain, as reported by domain-change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DvdDomain {
    FirstPlay,
    VideoManagerMenu,
    VideoTitleSetMenu,
    Title,
    Stop,
}

impl DvdDomain {
    pub fn is_menu(self) -> bool {
        matches!(self, Self::VideoManagerMenu | Self::VideoTitleSetMenu)
    }
}

/// What kind of user interaction the disc currently expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuMode {
    None,
    Buttons,
    Still,
}

#[derive(Debug, Error)]
pub enum DvdError {
    /// A navigation command is already outstanding.
    #[error("navigation command already in flight")]
    CommandRejected,
    #[error("navigator error: {0}")]
    Graph(#[from] GraphError),
}

/// Side effects the controller must apply after event routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigatorAction {
    /// The navigator entered the Stop domain.
    RequestStop,
    /// Toggle renderer frame skipping (off during stills).
    EnableFrameSkipping(bool),
}

// ============================================================================
// User operation mask
// ============================================================================
//
// Bit set means the operation is currently forbidden by the disc.
// Numbering follows the DVD user-operation table.

pub const UOP_MENU_CALL_TITLE: u32 = 1 << 10;
pub const UOP_MENU_CALL_ROOT: u32 = 1 << 11;
pub const UOP_MENU_CALL_CHAPTER: u32 = 1 << 15;

/// Pick the menu to show, preferring root over title over chapter,
/// skipping menus the current operation mask forbids.
fn preferred_menu(uops: u32) -> Option<DiscMenu> {
    if uops & UOP_MENU_CALL_ROOT == 0 {
        Some(DiscMenu::Root)
    } else if uops & UOP_MENU_CALL_TITLE == 0 {
        Some(DiscMenu::Title)
    } else if uops & UOP_MENU_CALL_CHAPTER == 0 {
        Some(DiscMenu::Chapter)
    } else {
        None
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// Rectangle the video occupies in UI coordinates, for pointer
/// translation into source-video pixels.
#[derive(Debug, Clone, Copy)]
pub struct DisplayRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl DisplayRect {
    /// Map a UI point into source pixels. `None` when the point lies
    /// outside the rectangle or the rectangle is degenerate.
    fn map_to_source(&self, px: i32, py: i32, source: VideoResolution) -> Option<(u32, u32)> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let rel_x = (px - self.x) as f64 / self.width as f64;
        let rel_y = (py - self.y) as f64 / self.height as f64;
        if !(0.0..1.0).contains(&rel_x) || !(0.0..1.0).contains(&rel_y) {
            return None;
        }
        Some((
            (rel_x * source.width as f64) as u32,
            (rel_y * source.height as f64) as u32,
        ))
    }
}

// ============================================================================
// Navigator
// ============================================================================

#[derive(Debug)]
struct PendingCommand {
    handle: u64,
    issued: Instant,
}

pub struct DvdNavigator {
    domain: DvdDomain,
    menu_active: bool,
    menu_mode: MenuMode,
    button_count: u32,
    focused_button: u32,
    still_active: bool,
    uops: u32,
    current_title: u32,
    current_chapter: u32,
    current_time: Duration,
    title_duration: Duration,
    /// Single outstanding async command. Completions arrive on the
    /// event pump thread, hence the lock.
    pending: Mutex<Option<PendingCommand>>,
}

impl DvdNavigator {
    pub fn new() -> Self {
        Self {
            domain: DvdDomain::FirstPlay,
            menu_active: false,
            menu_mode: MenuMode::None,
            button_count: 0,
            focused_button: 0,
            still_active: false,
            uops: 0,
            current_title: 0,
            current_chapter: 0,
            current_time: Duration::ZERO,
            title_duration: Duration::ZERO,
            pending: Mutex::new(None),
        }
    }

    // --- accessors ---

    pub fn domain(&self) -> DvdDomain {
        self.domain
    }

    pub fn menu_active(&self) -> bool {
        self.menu_active
    }

    pub fn menu_mode(&self) -> MenuMode {
        self.menu_mode
    }

    pub fn button_count(&self) -> u32 {
        self.button_count
    }

    pub fn focused_button(&self) -> u32 {
        self.focused_button
    }

    pub fn current_title(&self) -> u32 {
        self.current_title
    }

    pub fn current_chapter(&self) -> u32 {
        self.current_chapter
    }

    pub fn current_time(&self) -> Duration {
        self.current_time
    }

    pub fn title_duration(&self) -> Duration {
        self.title_duration
    }

    pub fn has_pending_command(&self) -> bool {
        self.pending.lock().is_some()
    }

    // --- command slot ---

    /// Run a navigator call under the single-command rule. Rejected
    /// when a command is still outstanding; a returned handle occupies
    /// the slot until its completion event arrives.
    fn issue<F>(&self, now: Instant, call: F) -> Result<(), DvdError>
    where
        F: FnOnce() -> Result<Option<u64>, GraphError>,
    {
        let mut slot = self.pending.lock();
        if let Some(pending) = slot.as_ref() {
            tracing::debug!(
                "command {} still in flight ({}ms old), rejecting",
                pending.handle,
                now.duration_since(pending.issued).as_millis()
            );
            return Err(DvdError::CommandRejected);
        }
        if let Some(handle) = call()? {
            *slot = Some(PendingCommand { handle, issued: now });
        }
        Ok(())
    }

    /// Completion from the event pump. A handle that does not match
    /// the outstanding command is stale and discarded.
    pub fn on_command_complete(&self, handle: u64) {
        let mut slot = self.pending.lock();
        match slot.as_ref() {
            Some(pending) if pending.handle == handle => {
                tracing::debug!("command {} complete", handle);
                *slot = None;
            }
            _ => tracing::debug!("stale command completion {} discarded", handle),
        }
    }

    /// Abandon any outstanding command, e.g. when playback stops. A
    /// later completion for it will be discarded as stale.
    pub fn abandon_pending(&self) {
        if self.pending.lock().take().is_some() {
            tracing::debug!("outstanding navigation command abandoned");
        }
    }

    // --- event routing ---

    /// Route a navigator notification. Returns the side effects the
    /// caller must apply.
    pub fn handle_event(
        &mut self,
        event: &GraphEvent,
        nav: &mut dyn DiscControl,
        now: Instant,
    ) -> Vec<NavigatorAction> {
        let mut actions = Vec::new();
        match event {
            GraphEvent::DvdDomainChange(domain) => {
                self.domain = *domain;
                match domain {
                    DvdDomain::FirstPlay => {
                        tracing::debug!("domain=firstplay");
                        self.menu_active = false;
                    }
                    DvdDomain::Stop => {
                        tracing::debug!("domain=stop");
                        actions.push(NavigatorAction::RequestStop);
                    }
                    DvdDomain::VideoManagerMenu => {
                        tracing::debug!("domain=videomanagermenu (menu)");
                        self.menu_active = true;
                    }
                    DvdDomain::VideoTitleSetMenu => {
                        tracing::debug!("domain=videotitlesetmenu (menu)");
                        self.menu_active = true;
                    }
                    DvdDomain::Title => {
                        self.menu_active = false;
                    }
                }
            }

            GraphEvent::DvdButtonChange { count, focused } => {
                tracing::debug!("button change: buttons {}, focused {}", count, focused);
                self.button_count = *count;
                self.focused_button = *focused;
                if *count == 0 {
                    self.menu_mode = MenuMode::None;
                } else {
                    // A focused button set appeared outside a menu: the
                    // disc wants interaction, bring the menu up.
                    if !self.menu_active && *focused > 0 {
                        self.menu_active = true;
                        if let Err(err) = self.show_menu(nav, now) {
                            tracing::debug!("auto menu call failed: {}", err);
                        }
                    }
                    if self.menu_active {
                        self.menu_mode = if self.still_active {
                            MenuMode::Still
                        } else {
                            MenuMode::Buttons
                        };
                    }
                }
            }

            GraphEvent::DvdStillOn { buttons_available } => {
                tracing::debug!("still on, buttons {}", buttons_available);
                self.still_active = true;
                if *buttons_available && self.menu_active {
                    self.menu_mode = MenuMode::Still;
                }
                actions.push(NavigatorAction::EnableFrameSkipping(false));
            }

            GraphEvent::DvdStillOff => {
                tracing::debug!("still off");
                self.still_active = false;
                if self.menu_mode == MenuMode::Still {
                    self.menu_mode = MenuMode::Buttons;
                }
                actions.push(NavigatorAction::EnableFrameSkipping(true));
            }

            GraphEvent::DvdValidUopsChange(uops) => {
                tracing::debug!("valid uops changed: {:#x}", uops);
                self.uops = *uops;
            }

            GraphEvent::DvdTitleChange(title) => {
                self.current_title = *title;
                self.refresh_title_duration(nav);
            }

            GraphEvent::DvdChapterStart(chapter) => {
                tracing::debug!("chapter start: {}", chapter);
                self.current_chapter = *chapter;
            }

            GraphEvent::DvdCurrentTime(time) => {
                self.current_time = *time;
            }

            GraphEvent::DvdCommandComplete(handle) => {
                self.on_command_complete(*handle);
            }

            GraphEvent::DvdNoFirstPlayChain => {
                tracing::debug!("no first-play chain, starting title 1");
                if let Err(err) = self.issue(now, || nav.play_title(1)) {
                    tracing::warn!("could not start title 1: {}", err);
                }
            }

            GraphEvent::DvdError(code) => {
                tracing::error!("navigator error {:#x}", code);
            }
            GraphEvent::DvdWarning(code) => {
                tracing::debug!("navigator warning {:#x}", code);
            }
            GraphEvent::DvdAudioStreamChange(stream) => {
                tracing::debug!("audio stream changed to {}", stream);
            }
            GraphEvent::DvdSubpictureStreamChange(stream) => {
                tracing::debug!("subpicture stream changed to {}", stream);
            }

            _ => {}
        }
        actions
    }

    fn refresh_title_duration(&mut self, nav: &mut dyn DiscControl) {
        match nav.total_title_time() {
            Ok(tc) => self.title_duration = tc.to_duration(),
            Err(err) => tracing::debug!("total title time unavailable: {}", err),
        }
    }

    // --- user operations ---

    /// Bring up a disc menu, honoring the current operation mask.
    pub fn show_menu(&self, nav: &mut dyn DiscControl, now: Instant) -> Result<(), DvdError> {
        let Some(menu) = preferred_menu(self.uops) else {
            tracing::debug!("all menu calls currently forbidden");
            return Ok(());
        };
        tracing::debug!("showing {:?} menu", menu);
        self.issue(now, || nav.show_menu(menu))
    }

    /// Whether pointer/button input is currently routed to the disc.
    pub fn handles_input(&self) -> bool {
        self.menu_mode != MenuMode::None
            && self.button_count > 0
            && (self.domain.is_menu() || self.domain == DvdDomain::Title)
    }

    /// Move button focus to the button under a UI point.
    pub fn pointer_moved(
        &self,
        nav: &mut dyn DiscControl,
        px: i32,
        py: i32,
        display: DisplayRect,
    ) -> Result<(), DvdError> {
        if !self.handles_input() {
            return Ok(());
        }
        let source = nav.source_resolution()?;
        if let Some((sx, sy)) = display.map_to_source(px, py, source) {
            nav.select_at_position(sx, sy)?;
        }
        Ok(())
    }

    /// Activate the button under a UI point.
    pub fn pointer_clicked(
        &self,
        nav: &mut dyn DiscControl,
        px: i32,
        py: i32,
        display: DisplayRect,
    ) -> Result<(), DvdError> {
        if !self.handles_input() {
            return Ok(());
        }
        let source = nav.source_resolution()?;
        if let Some((sx, sy)) = display.map_to_source(px, py, source) {
            nav.activate_at_position(sx, sy)?;
        }
        Ok(())
    }

    /// Move button focus with a directional key.
    pub fn navigate(&self, nav: &mut dyn DiscControl, dir: ButtonDirection) -> Result<(), DvdError> {
        if !self.handles_input() {
            return Ok(());
        }
        nav.select_relative_button(dir)?;
        Ok(())
    }

    /// Activate the focused button.
    pub fn activate(&self, nav: &mut dyn DiscControl) -> Result<(), DvdError> {
        if !self.handles_input() {
            return Ok(());
        }
        nav.activate_button()?;
        Ok(())
    }

    // --- titles / chapters / time ---

    pub fn titles(&self, nav: &mut dyn DiscControl) -> Result<Vec<String>, DvdError> {
        let count = nav.title_count()?;
        Ok((1..=count).map(|i| format!("Title {}", i)).collect())
    }

    pub fn chapters(&self, nav: &mut dyn DiscControl) -> Result<Vec<String>, DvdError> {
        let title = nav.current_location()?.title;
        let count = nav.chapter_count(title)?;
        Ok((1..=count).map(|i| format!("Chapter {}", i)).collect())
    }

    pub fn play_title(
        &self,
        nav: &mut dyn DiscControl,
        title: u32,
        now: Instant,
    ) -> Result<(), DvdError> {
        tracing::debug!("play title {}", title);
        self.issue(now, || nav.play_title(title))
    }

    pub fn play_chapter(
        &self,
        nav: &mut dyn DiscControl,
        chapter: u32,
        now: Instant,
    ) -> Result<(), DvdError> {
        tracing::debug!("play chapter {}", chapter);
        self.issue(now, || nav.play_chapter(chapter))
    }

    pub fn next_chapter(&self, nav: &mut dyn DiscControl, now: Instant) -> Result<(), DvdError> {
        let location = nav.current_location()?;
        let count = nav.chapter_count(location.title)?;
        if location.chapter < count {
            self.play_chapter(nav, location.chapter + 1, now)?;
        }
        Ok(())
    }

    pub fn prev_chapter(&self, nav: &mut dyn DiscControl, now: Instant) -> Result<(), DvdError> {
        let location = nav.current_location()?;
        if location.chapter > 1 {
            self.play_chapter(nav, location.chapter - 1, now)?;
        }
        Ok(())
    }

    /// Seek within the current title by absolute time.
    pub fn play_at(
        &self,
        nav: &mut dyn DiscControl,
        time: Duration,
        now: Instant,
    ) -> Result<(), DvdError> {
        let clamped = if self.title_duration.is_zero() {
            time
        } else {
            time.min(self.title_duration)
        };
        self.issue(now, || nav.play_at_time(DiscTimecode::from_duration(clamped)))
    }

    // --- defaults ---

    /// Apply language preferences. Only honored by the navigator in
    /// the Stop domain; failures elsewhere are transient and logged.
    pub fn apply_default_languages(nav: &mut dyn DiscControl, settings: &PlayerSettings) {
        if let Some(lcid) = lcid_for(&settings.preferred_audio_language) {
            if let Err(err) = nav.select_default_audio_language(lcid) {
                tracing::info!("default audio language not set: {}", err);
            }
        }
        if let Some(lcid) = lcid_for(&settings.preferred_subtitle_language) {
            if let Err(err) = nav.select_default_menu_language(lcid) {
                tracing::info!("default menu language not set: {}", err);
            }
            if let Err(err) = nav.select_default_subpicture_language(lcid) {
                tracing::info!("default subpicture language not set: {}", err);
            }
        }
        if let Err(err) = nav.set_subpicture_state(settings.enable_subtitles) {
            tracing::info!("subpicture state not set: {}", err);
        }
    }

    /// Forget disc state for a new session. The command slot is
    /// abandoned, not waited for.
    pub fn reset(&mut self) {
        self.abandon_pending();
        self.domain = DvdDomain::FirstPlay;
        self.menu_active = false;
        self.menu_mode = MenuMode::None;
        self.button_count = 0;
        self.focused_button = 0;
        self.still_active = false;
        self.uops = 0;
        self.current_title = 0;
        self.current_chapter = 0;
        self.current_time = Duration::ZERO;
        self.title_duration = Duration::ZERO;
    }
}

impl Default for DvdNavigator {
    fn default() -> Self {
        Self::new()
    }
}

/// Locale identifier for a two-letter language code, for the subset of
/// languages the settings UI offers.
fn lcid_for(code: &str) -> Option<u32> {
    match code {
        "en" => Some(1033),
        "de" => Some(1031),
        "fr" => Some(1036),
        "es" => Some(3082),
        "it" => Some(1040),
        "nl" => Some(1043),
        "ja" => Some(1041),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBackend;

    fn menu_rect() -> DisplayRect {
        DisplayRect { x: 0, y: 0, width: 1280, height: 720 }
    }

    fn enter_menu(navi: &mut DvdNavigator, sim: &mut SimBackend, now: Instant) {
        navi.handle_event(
            &GraphEvent::DvdDomainChange(DvdDomain::VideoManagerMenu),
            sim,
            now,
        );
        navi.handle_event(
            &GraphEvent::DvdButtonChange { count: 4, focused: 1 },
            sim,
            now,
        );
    }

    #[test]
    fn test_domain_and_menu_state_track_events() {
        let mut sim = SimBackend::new();
        let mut navi = DvdNavigator::new();
        let now = Instant::now();
        assert_eq!(navi.domain(), DvdDomain::FirstPlay);
        assert!(!navi.menu_active());

        navi.handle_event(
            &GraphEvent::DvdDomainChange(DvdDomain::VideoManagerMenu),
            &mut sim,
            now,
        );
        assert!(navi.menu_active());

        navi.handle_event(&GraphEvent::DvdDomainChange(DvdDomain::Title), &mut sim, now);
        assert_eq!(navi.domain(), DvdDomain::Title);
        assert!(!navi.menu_active());
    }

    #[test]
    fn test_stop_domain_requests_player_stop() {
        let mut sim = SimBackend::new();
        let mut navi = DvdNavigator::new();
        let actions = navi.handle_event(
            &GraphEvent::DvdDomainChange(DvdDomain::Stop),
            &mut sim,
            Instant::now(),
        );
        assert_eq!(actions, vec![NavigatorAction::RequestStop]);
    }

    #[test]
    fn test_still_toggles_frame_skipping() {
        let mut sim = SimBackend::new();
        let mut navi = DvdNavigator::new();
        let now = Instant::now();

        let actions = navi.handle_event(
            &GraphEvent::DvdStillOn { buttons_available: false },
            &mut sim,
            now,
        );
        assert_eq!(actions, vec![NavigatorAction::EnableFrameSkipping(false)]);

        let actions = navi.handle_event(&GraphEvent::DvdStillOff, &mut sim, now);
        assert_eq!(actions, vec![NavigatorAction::EnableFrameSkipping(true)]);
    }

    #[test]
    fn test_single_command_slot() {
        let mut sim = SimBackend::new();
        let navi = DvdNavigator::new();
        let now = Instant::now();

        navi.play_title(&mut sim, 2, now).unwrap();
        assert!(navi.has_pending_command());

        // Second command while the first is in flight.
        let err = navi.play_chapter(&mut sim, 3, now).unwrap_err();
        assert!(matches!(err, DvdError::CommandRejected));

        let handle = sim.last_command_handle().unwrap();
        navi.on_command_complete(handle);
        assert!(!navi.has_pending_command());
        navi.play_chapter(&mut sim, 3, now).unwrap();
    }

    #[test]
    fn test_stale_completion_is_discarded() {
        let mut sim = SimBackend::new();
        let navi = DvdNavigator::new();
        let now = Instant::now();

        navi.play_title(&mut sim, 1, now).unwrap();
        let stale = sim.last_command_handle().unwrap();

        // Stop abandons the command; its completion arrives later.
        navi.abandon_pending();
        assert!(!navi.has_pending_command());
        navi.on_command_complete(stale);
        assert!(!navi.has_pending_command());

        // A fresh command is unaffected by the stale handle.
        navi.play_title(&mut sim, 2, now).unwrap();
        navi.on_command_complete(stale);
        assert!(navi.has_pending_command());
    }

    #[test]
    fn test_pointer_translation_scales_to_source() {
        let mut sim = SimBackend::new();
        let mut navi = DvdNavigator::new();
        let now = Instant::now();
        enter_menu(&mut navi, &mut sim, now);

        // Source video is 720x576; the UI shows it at 1280x720.
        navi.pointer_moved(&mut sim, 640, 360, menu_rect()).unwrap();
        assert_eq!(sim.last_selected_position(), Some((360, 288)));

        navi.pointer_clicked(&mut sim, 1279, 719, menu_rect()).unwrap();
        let (ax, ay) = sim.last_activated_position().unwrap();
        assert!(ax < 720 && ay < 576);
    }

    #[test]
    fn test_pointer_ignored_outside_menu() {
        let mut sim = SimBackend::new();
        let navi = DvdNavigator::new();

        // Title domain, no buttons: input stays with the player.
        navi.pointer_moved(&mut sim, 640, 360, menu_rect()).unwrap();
        assert_eq!(sim.last_selected_position(), None);
    }

    #[test]
    fn test_pointer_ignored_outside_display_rect() {
        let mut sim = SimBackend::new();
        let mut navi = DvdNavigator::new();
        let now = Instant::now();
        enter_menu(&mut navi, &mut sim, now);

        let rect = DisplayRect { x: 100, y: 100, width: 640, height: 360 };
        navi.pointer_moved(&mut sim, 50, 50, rect).unwrap();
        assert_eq!(sim.last_selected_position(), None);
    }

    #[test]
    fn test_buttons_outside_menu_bring_up_preferred_menu() {
        let mut sim = SimBackend::new();
        let mut navi = DvdNavigator::new();
        let now = Instant::now();

        // Root menu forbidden, title menu allowed.
        navi.handle_event(
            &GraphEvent::DvdValidUopsChange(UOP_MENU_CALL_ROOT),
            &mut sim,
            now,
        );
        navi.handle_event(&GraphEvent::DvdDomainChange(DvdDomain::Title), &mut sim, now);
        navi.handle_event(
            &GraphEvent::DvdButtonChange { count: 2, focused: 1 },
            &mut sim,
            now,
        );

        assert_eq!(sim.last_shown_menu(), Some(DiscMenu::Title));
        assert_eq!(navi.menu_mode(), MenuMode::Buttons);
    }

    #[test]
    fn test_button_change_with_focus_activates_menu() {
        let mut sim = SimBackend::new();
        let mut navi = DvdNavigator::new();
        let now = Instant::now();
        navi.handle_event(&GraphEvent::DvdDomainChange(DvdDomain::Title), &mut sim, now);

        navi.handle_event(
            &GraphEvent::DvdButtonChange { count: 3, focused: 1 },
            &mut sim,
            now,
        );
        assert!(navi.menu_active());
        assert_eq!(navi.menu_mode(), MenuMode::Buttons);
        assert!(sim.last_shown_menu().is_some());
    }

    #[test]
    fn test_button_change_without_focus_stays_passive() {
        let mut sim = SimBackend::new();
        let mut navi = DvdNavigator::new();
        let now = Instant::now();
        navi.handle_event(&GraphEvent::DvdDomainChange(DvdDomain::Title), &mut sim, now);

        // Buttons with nothing focused are informational only.
        navi.handle_event(
            &GraphEvent::DvdButtonChange { count: 3, focused: 0 },
            &mut sim,
            now,
        );
        assert!(!navi.menu_active());
        assert_eq!(navi.menu_mode(), MenuMode::None);
        assert_eq!(sim.last_shown_menu(), None);
    }

    #[test]
    fn test_still_with_buttons_switches_menu_mode() {
        let mut sim = SimBackend::new();
        let mut navi = DvdNavigator::new();
        let now = Instant::now();
        enter_menu(&mut navi, &mut sim, now);
        assert_eq!(navi.menu_mode(), MenuMode::Buttons);

        navi.handle_event(
            &GraphEvent::DvdStillOn { buttons_available: true },
            &mut sim,
            now,
        );
        assert_eq!(navi.menu_mode(), MenuMode::Still);

        navi.handle_event(&GraphEvent::DvdStillOff, &mut sim, now);
        assert_eq!(navi.menu_mode(), MenuMode::Buttons);
    }

    #[test]
    fn test_no_first_play_chain_starts_title_one() {
        let mut sim = SimBackend::new();
        let mut navi = DvdNavigator::new();
        navi.handle_event(&GraphEvent::DvdNoFirstPlayChain, &mut sim, Instant::now());
        assert_eq!(sim.last_played_title(), Some(1));
    }

    #[test]
    fn test_chapter_navigation_clamps_at_edges() {
        let mut sim = SimBackend::new();
        sim.set_disc_layout(3, 5);
        sim.set_location(1, 5);
        let navi = DvdNavigator::new();
        let now = Instant::now();

        // Already at the last chapter: no command issued.
        navi.next_chapter(&mut sim, now).unwrap();
        assert!(!navi.has_pending_command());

        sim.set_location(1, 1);
        navi.prev_chapter(&mut sim, now).unwrap();
        assert!(!navi.has_pending_command());

        sim.set_location(1, 2);
        navi.prev_chapter(&mut sim, now).unwrap();
        assert_eq!(sim.last_played_chapter(), Some(1));
    }

    #[test]
    fn test_title_enumeration_names() {
        let mut sim = SimBackend::new();
        sim.set_disc_layout(2, 8);
        let navi = DvdNavigator::new();
        assert_eq!(navi.titles(&mut sim).unwrap(), vec!["Title 1", "Title 2"]);
        assert_eq!(navi.chapters(&mut sim).unwrap().len(), 8);
    }
}
