//! Frame hand-off between the renderer's delivery thread and the UI
//!
//! The video renderer presents decoded frames on its own thread; the UI
//! draws on another. The bridge owns a double buffer guarded by one
//! frame lock:
//!
//! ```text
//! ┌───────────┐  present_frame   ┌─────────────┐   render_with   ┌────────┐
//! │ Presenter │ ───────────────► │ FrameBridge │ ──────────────► │   UI   │
//! │  thread   │   (blit + swap)  │ (frame lock)│  (bind front)   │ thread │
//! └───────────┘                  └─────────────┘                 └────────┘
//! ```
//!
//! The lock is held for the whole blit, so suspending the bridge for a
//! device reset waits for any in-flight delivery to finish its copy
//! before the owned surfaces are freed. Deliveries while suspended are
//! cheap no-ops.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::graph::PresentationSink;

// ============================================================================
// Owned surfaces
// ============================================================================

/// The device objects the bridge owns: a front texture the UI binds and
/// a back surface the presenter blits into. Swapped, never copied.
struct OwnedSurfaces {
    front: Vec<u8>,
    back: Vec<u8>,
    width: u32,
    height: u32,
    aspect_x: u32,
    aspect_y: u32,
}

impl OwnedSurfaces {
    fn allocate(width: u32, height: u32, aspect_x: u32, aspect_y: u32, len: usize) -> Self {
        Self {
            front: vec![0u8; len],
            back: vec![0u8; len],
            width,
            height,
            aspect_x,
            aspect_y,
        }
    }
}

/// Immutable view of the current frame, valid for the duration of a
/// `render_with` callback.
pub struct PresentedFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub aspect_x: u32,
    pub aspect_y: u32,
    pub generation: u64,
    pub data: &'a [u8],
}

// ============================================================================
// Frame bridge
// ============================================================================

pub struct FrameBridge {
    surfaces: Mutex<Option<OwnedSurfaces>>,
    /// Fast-path flag, authoritative only together with the frame lock.
    suspended: AtomicBool,
    /// Strictly increasing, bumped once per completed swap.
    generation: AtomicU64,
    /// Packed (width << 32 | height) for lock-free size queries.
    dimensions: AtomicU64,
    aspect: AtomicU64,
    frames_presented: AtomicU64,
    frames_skipped: AtomicU64,
    /// Artificial blit latency for concurrency tests.
    #[cfg(test)]
    blit_delay_ms: AtomicU64,
    #[cfg(test)]
    blit_started: AtomicBool,
}

impl FrameBridge {
    pub fn new() -> Self {
        Self {
            surfaces: Mutex::new(None),
            suspended: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            dimensions: AtomicU64::new(0),
            aspect: AtomicU64::new(0),
            frames_presented: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            #[cfg(test)]
            blit_delay_ms: AtomicU64::new(0),
            #[cfg(test)]
            blit_started: AtomicBool::new(false),
        }
    }

    /// Draw the current frame. Calls `draw` with a consistent view
    /// under the frame lock and returns true, or returns false without
    /// calling it when suspended or before the first frame arrives.
    pub fn render_with<F>(&self, draw: F) -> bool
    where
        F: FnOnce(&PresentedFrame<'_>),
    {
        if self.suspended.load(Ordering::Acquire) {
            return false;
        }

        let guard = self.surfaces.lock();
        if self.suspended.load(Ordering::Acquire) {
            return false;
        }
        let Some(surfaces) = guard.as_ref() else {
            return false;
        };
        if self.generation.load(Ordering::Acquire) == 0 {
            return false;
        }

        draw(&PresentedFrame {
            width: surfaces.width,
            height: surfaces.height,
            aspect_x: surfaces.aspect_x,
            aspect_y: surfaces.aspect_y,
            generation: self.generation.load(Ordering::Acquire),
            data: &surfaces.front,
        });
        true
    }

    /// Free the owned device objects ahead of a device reset.
    ///
    /// Blocks on the frame lock, so an in-flight delivery finishes its
    /// copy before the surfaces go away. Returns with the bridge
    /// suspended; it stays suspended until `realloc_resources`.
    pub fn release_resources(&self) {
        self.suspended.store(true, Ordering::Release);
        let mut guard = self.surfaces.lock();
        if guard.take().is_some() {
            tracing::debug!("frame bridge surfaces released");
        }
    }

    /// Lift the suspension after the device came back. The next
    /// delivered frame reallocates the surfaces.
    pub fn realloc_resources(&self) {
        let _guard = self.surfaces.lock();
        self.suspended.store(false, Ordering::Release);
        tracing::debug!("frame bridge resumed");
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    /// Swap counter. 0 until the first frame has been delivered.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Current video dimensions, (0, 0) before the first frame.
    pub fn video_size(&self) -> (u32, u32) {
        let packed = self.dimensions.load(Ordering::Acquire);
        ((packed >> 32) as u32, packed as u32)
    }

    /// Current pixel aspect ratio, (0, 0) before the first frame.
    pub fn aspect_ratio(&self) -> (u32, u32) {
        let packed = self.aspect.load(Ordering::Acquire);
        ((packed >> 32) as u32, packed as u32)
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented.load(Ordering::Relaxed)
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn set_blit_delay_ms(&self, ms: u64) {
        self.blit_delay_ms.store(ms, Ordering::Relaxed);
    }

    fn blit(&self, dst: &mut [u8], src: &[u8]) {
        #[cfg(test)]
        {
            self.blit_started.store(true, Ordering::SeqCst);
            let ms = self.blit_delay_ms.load(Ordering::Relaxed);
            if ms > 0 {
                std::thread::sleep(std::time::Duration::from_millis(ms));
            }
        }
        let len = src.len().min(dst.len());
        dst[..len].copy_from_slice(&src[..len]);
    }
}

impl Default for FrameBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationSink for FrameBridge {
    /// Called on the renderer's delivery thread for every frame.
    fn present_frame(&self, width: u32, height: u32, aspect_x: u32, aspect_y: u32, data: &[u8]) {
        // Fast path: nothing to do while the device is down.
        if self.suspended.load(Ordering::Acquire) {
            self.frames_skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut guard = self.surfaces.lock();

        // Suspension may have happened while we waited for the lock.
        if self.suspended.load(Ordering::Acquire) {
            self.frames_skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let needs_realloc = match guard.as_ref() {
            Some(s) => s.width != width || s.height != height || s.back.len() != data.len(),
            None => true,
        };
        if needs_realloc {
            tracing::debug!("frame bridge realloc for {}x{}", width, height);
            *guard = Some(OwnedSurfaces::allocate(
                width,
                height,
                aspect_x,
                aspect_y,
                data.len(),
            ));
        }

        let Some(surfaces) = guard.as_mut() else {
            return;
        };
        surfaces.aspect_x = aspect_x;
        surfaces.aspect_y = aspect_y;

        self.blit(&mut surfaces.back, data);
        std::mem::swap(&mut surfaces.front, &mut surfaces.back);

        self.dimensions
            .store(((width as u64) << 32) | height as u64, Ordering::Release);
        self.aspect
            .store(((aspect_x as u64) << 32) | aspect_y as u64, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.frames_presented.fetch_add(1, Ordering::Relaxed);
    }
}
