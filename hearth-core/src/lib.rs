//! # Hearth Core
//!
//! Filter-graph playback engine: graph assembly, frame hand-off,
//! stepped seeking, disc navigation and the playback state machine.

// ============================================================================
// Graph boundary
// ============================================================================
pub mod graph;
pub mod events;
pub mod sim;

// ============================================================================
// Playback engine
// ============================================================================
pub mod builder;
pub mod bridge;
pub mod seek;
pub mod dvd;
pub mod controller;

// ============================================================================
// Sources / Codecs / Settings
// ============================================================================
pub mod source;
pub mod codecs;
pub mod settings;

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
