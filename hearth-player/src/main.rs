//! # Hearth Player
//!
//! Scripted playback session against the simulated graph backend.
//! Exercises the whole engine surface from the command line: build,
//! transport, stepped seeking, disc navigation, device reset, stop.

use anyhow::Result;
use std::time::{Duration, Instant};

use hearth_core::codecs::StaticCodecPolicy;
use hearth_core::controller::{PlaybackController, PlayerEventSink, PlayerState};
use hearth_core::builder::PipelineBuilder;
use hearth_core::dvd::DvdDomain;
use hearth_core::events::GraphEvent;
use hearth_core::seek::SeekDirection;
use hearth_core::settings::PlayerSettings;
use hearth_core::sim::SimBackend;
use hearth_core::source::{DiscSource, FileSource};

struct PrintSink;

impl PlayerEventSink for PrintSink {
    fn on_started(&self) {
        println!("event: started");
    }
    fn on_playback_state_changed(&self) {
        println!("event: playback state changed");
    }
    fn on_stopped(&self) {
        println!("event: stopped");
    }
    fn on_ended(&self) {
        println!("event: ended");
    }
    fn on_error(&self, code: i32) {
        println!("event: error {:#x}", code);
    }
}

fn print_state(label: &str, controller: &PlaybackController) {
    let state = match controller.state() {
        PlayerState::Stopped => "stopped",
        PlayerState::Active => "active",
        PlayerState::Paused => "paused",
        PlayerState::Ended => "ended",
    };
    println!("[{}] state={}", label, state);
}

fn file_session(settings: &PlayerSettings) -> Result<()> {
    println!("--- file session ---");
    let sim = SimBackend::new();
    sim.set_duration(Duration::from_secs(30 * 60));
    sim.set_position(Duration::from_secs(0));

    let builder = PipelineBuilder::new(Box::new(StaticCodecPolicy::with_preferences(settings)));
    let mut controller = PlaybackController::new(builder, Box::new(PrintSink));

    controller.open(
        Box::new(sim.clone()),
        Box::new(FileSource::new("/media/movie.mkv")),
    )?;
    println!("filters: {:?}", sim.filter_names());
    print_state("open", &controller);

    // A frame arrives through the presentation sink.
    sim.deliver_frame(1920, 1080, &vec![0u8; 1920 * 1080 * 4]);
    let bridge = controller.bridge();
    println!(
        "bridge: {:?} generation {}",
        bridge.video_size(),
        bridge.generation()
    );

    // Two forward skips, committed after the debounce.
    let now = Instant::now();
    controller.seek_relative(SeekDirection::Forward, now);
    controller.seek_relative(SeekDirection::Forward, now);
    controller.tick(now + Duration::from_millis(1100));
    println!("position after seek: {:?}", controller.current_time());

    controller.pause()?;
    print_state("pause", &controller);
    controller.resume()?;
    print_state("resume", &controller);

    // Device reset mid-session.
    controller.release_gui_resources();
    controller.realloc_gui_resources();
    print_state("device reset", &controller);

    controller.event_queue().push(GraphEvent::Complete);
    controller.tick(Instant::now());
    print_state("complete", &controller);

    controller.stop();
    print_state("stop", &controller);
    println!("filters after stop: {:?}", sim.filter_names());
    Ok(())
}

fn disc_session(settings: &PlayerSettings) -> Result<()> {
    println!("--- disc session ---");
    let sim = SimBackend::new();
    sim.set_disc_layout(3, 12);
    sim.set_total_title_time(Duration::from_secs(5400));

    let builder = PipelineBuilder::new(Box::new(StaticCodecPolicy::new()));
    let mut controller = PlaybackController::new(builder, Box::new(PrintSink));

    controller.open(
        Box::new(sim.clone()),
        Box::new(DiscSource::new("/dev/dvd/VIDEO_TS", settings.clone())),
    )?;
    print_state("open", &controller);

    let queue = controller.event_queue();
    queue.push(GraphEvent::DvdDomainChange(DvdDomain::VideoManagerMenu));
    queue.push(GraphEvent::DvdButtonChange { count: 4, focused: 1 });
    controller.tick(Instant::now());
    println!("in menu: {}", controller.in_dvd_menu());

    println!("titles: {:?}", controller.dvd_titles()?);
    controller.dvd_play_title(2, Instant::now())?;
    queue.push(GraphEvent::DvdDomainChange(DvdDomain::Title));
    queue.push(GraphEvent::DvdTitleChange(2));
    if let Some(handle) = sim.last_command_handle() {
        queue.push(GraphEvent::DvdCommandComplete(handle));
    }
    controller.tick(Instant::now());
    println!(
        "title {} of {:?}, duration {:?}",
        controller.dvd().current_title(),
        sim.last_played_title(),
        controller.dvd().title_duration()
    );

    controller.dvd_next_chapter(Instant::now())?;
    println!("chapter command: {:?}", sim.last_played_chapter());

    queue.push(GraphEvent::DvdDomainChange(DvdDomain::Stop));
    controller.tick(Instant::now());
    print_state("disc stop", &controller);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("hearth {}", hearth_core::VERSION);

    let settings = PlayerSettings::load();
    file_session(&settings)?;
    disc_session(&settings)?;
    Ok(())
}
