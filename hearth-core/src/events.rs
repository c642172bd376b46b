//! Graph event delivery
//!
//! The native framework raises notifications asynchronously; the engine
//! receives them as typed [`GraphEvent`] values in a bounded queue that
//! the UI idle loop drains once per tick. Draining moves ownership out
//! of the queue, which is the acknowledge-and-free step the native
//! event interface requires.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::dvd::DvdDomain;

// ============================================================================
// Events
// ============================================================================

/// A notification raised by the graph or the disc navigator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    /// Playback reached the end of the media.
    Complete,
    /// The graph aborted with a native error code.
    ErrorAbort(i32),
    /// The source's stream format changed under the running graph.
    MediaTypeChanged,

    // --- disc navigator ---
    /// Current playback time within the title changed.
    DvdCurrentTime(Duration),
    /// A new chapter started.
    DvdChapterStart(u32),
    /// A new title started.
    DvdTitleChange(u32),
    /// Async navigation command finished; carries its handle.
    DvdCommandComplete(u64),
    /// A still frame is showing; user input may be required.
    DvdStillOn { buttons_available: bool },
    /// The still frame ended.
    DvdStillOff,
    /// Menu button set changed.
    DvdButtonChange { count: u32, focused: u32 },
    /// The disc has no first-play program chain.
    DvdNoFirstPlayChain,
    /// The set of permitted user operations changed.
    DvdValidUopsChange(u32),
    /// The navigator moved to a different domain.
    DvdDomainChange(DvdDomain),
    /// Fatal navigator error.
    DvdError(i32),
    /// Non-fatal navigator warning.
    DvdWarning(i32),
    /// Subpicture stream selection changed.
    DvdSubpictureStreamChange(i32),
    /// Audio stream selection changed.
    DvdAudioStreamChange(i32),
}

// ============================================================================
// Event Queue
// ============================================================================

/// Bounded event queue between the graph's notification thread and the
/// engine tick. When full, the oldest event is dropped and counted.
pub struct EventQueue {
    events: Mutex<VecDeque<GraphEvent>>,
    max_size: usize,
    total_events: AtomicU64,
    dropped_events: AtomicU64,
}

impl EventQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_size)),
            max_size,
            total_events: AtomicU64::new(0),
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Push an event. Called from the notification thread.
    pub fn push(&self, event: GraphEvent) {
        let mut queue = self.events.lock();

        if queue.len() >= self.max_size {
            let dropped = queue.pop_front();
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("event queue full, dropped {:?}", dropped);
        }

        queue.push_back(event);
        self.total_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Drain every queued event, oldest first.
    pub fn drain(&self) -> Vec<GraphEvent> {
        self.events.lock().drain(..).collect()
    }

    pub fn pop(&self) -> Option<GraphEvent> {
        self.events.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn total_events(&self) -> u64 {
        self.total_events.load(Ordering::Relaxed)
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_preserves_order() {
        let q = EventQueue::new(8);
        q.push(GraphEvent::DvdTitleChange(1));
        q.push(GraphEvent::DvdChapterStart(3));
        q.push(GraphEvent::Complete);

        let drained = q.drain();
        assert_eq!(
            drained,
            vec![
                GraphEvent::DvdTitleChange(1),
                GraphEvent::DvdChapterStart(3),
                GraphEvent::Complete,
            ]
        );
        assert!(q.is_empty());
    }

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let q = EventQueue::new(3);
        for i in 0..5 {
            q.push(GraphEvent::DvdChapterStart(i));
        }

        assert_eq!(q.len(), 3);
        assert_eq!(q.dropped_events(), 2);
        assert_eq!(q.total_events(), 5);
        // Oldest two were dropped
        assert_eq!(q.pop(), Some(GraphEvent::DvdChapterStart(2)));
    }

    #[test]
    fn test_queue_push_from_other_thread() {
        use std::sync::Arc;

        let q = Arc::new(EventQueue::new(64));
        let producer = q.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..32 {
                producer.push(GraphEvent::DvdChapterStart(i));
            }
        });
        handle.join().unwrap();

        assert_eq!(q.drain().len(), 32);
        assert_eq!(q.dropped_events(), 0);
    }
}
