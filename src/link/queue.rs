//! Bounded frame queue between the radio context and the main loop.
//!
//! The radio side never blocks: when the queue is full the new frame is
//! dropped and the overrun counter is incremented. Link events travel on a
//! separate unbounded channel so a burst of notifications cannot hide a
//! disconnect.

use crate::link::types::{LinkEvent, MAX_FRAME_LEN};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Producer handle held by the radio context.
#[derive(Debug, Clone)]
pub struct RadioHandle {
    frames: Sender<Vec<u8>>,
    events: Sender<LinkEvent>,
    overruns: Arc<AtomicU32>,
}

impl RadioHandle {
    /// Enqueue a notification frame without blocking.
    ///
    /// Frames longer than [`MAX_FRAME_LEN`] are truncated. Returns `false`
    /// when the frame was dropped.
    pub fn push_frame(&self, frame: &[u8]) -> bool {
        let len = frame.len().min(MAX_FRAME_LEN);
        match self.frames.try_send(frame[..len].to_vec()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let count = self.overruns.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!("Frame queue overrun, dropped frame ({} total)", count);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Post a link event to the main loop.
    pub fn post_event(&self, event: LinkEvent) {
        let _ = self.events.send(event);
    }

    /// Number of frames dropped so far.
    pub fn overrun_count(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }
}

/// Consumer side, owned by the session.
#[derive(Debug)]
pub struct Inbox {
    frames: Receiver<Vec<u8>>,
    events: Receiver<LinkEvent>,
    overruns: Arc<AtomicU32>,
}

impl Inbox {
    /// Pop one frame, if any.
    pub fn pop_frame(&self) -> Option<Vec<u8>> {
        self.frames.try_recv().ok()
    }

    /// Pop one link event, if any.
    pub fn pop_event(&self) -> Option<LinkEvent> {
        self.events.try_recv().ok()
    }

    /// Drop all queued frames.
    pub fn clear_frames(&self) {
        while self.frames.try_recv().is_ok() {}
    }

    /// Number of frames dropped so far.
    pub fn overrun_count(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }
}

/// Create a frame queue holding at most `capacity` frames.
pub fn channel(capacity: usize) -> (RadioHandle, Inbox) {
    let (frame_tx, frame_rx) = channel::bounded(capacity.max(1));
    let (event_tx, event_rx) = channel::unbounded();
    let overruns = Arc::new(AtomicU32::new(0));

    (
        RadioHandle {
            frames: frame_tx,
            events: event_tx,
            overruns: overruns.clone(),
        },
        Inbox {
            frames: frame_rx,
            events: event_rx,
            overruns,
        },
    )
}
