//! Victim selection for frame reclamation.
//!
//! A policy only orders candidates. The frame manager decides whether a proposed frame
//! can actually be evicted (it may be pinned, unowned or busy) and keeps asking until a
//! usable victim turns up.

use alloc::{collections::VecDeque, vec::Vec};

use pmm::FrameNumber;

/// Pluggable eviction policy.
pub trait EvictionPolicy: Send {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// A frame was taken from the free pool.
    fn on_allocate(&mut self, frame: FrameNumber);

    /// A frame went back to the free pool.
    fn on_release(&mut self, frame: FrameNumber);

    /// Returns the next candidate. Repeated calls must eventually cycle through every
    /// tracked frame.
    fn propose(&mut self) -> Option<FrameNumber>;

    /// Whether recently accessed candidates should be spared once, with their accessed
    /// bit cleared.
    fn second_chance(&self) -> bool {
        false
    }
}

/// The clock algorithm: a hand sweeps over resident frames, sparing accessed ones once.
#[derive(Default)]
pub struct Clock {
    frames: Vec<FrameNumber>,
    hand: usize,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvictionPolicy for Clock {
    fn name(&self) -> &'static str {
        "clock"
    }

    fn on_allocate(&mut self, frame: FrameNumber) {
        self.frames.push(frame);
    }

    fn on_release(&mut self, frame: FrameNumber) {
        if let Some(pos) = self.frames.iter().position(|&f| f == frame) {
            self.frames.remove(pos);
            if pos < self.hand {
                self.hand -= 1;
            }
        }
        if self.hand >= self.frames.len() {
            self.hand = 0;
        }
    }

    fn propose(&mut self) -> Option<FrameNumber> {
        if self.frames.is_empty() {
            return None;
        }
        let frame = self.frames[self.hand];
        self.hand = (self.hand + 1) % self.frames.len();
        Some(frame)
    }

    fn second_chance(&self) -> bool {
        true
    }
}

/// First in, first out. Ignores access history.
#[derive(Default)]
pub struct Fifo {
    queue: VecDeque<FrameNumber>,
}

impl Fifo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvictionPolicy for Fifo {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn on_allocate(&mut self, frame: FrameNumber) {
        self.queue.push_back(frame);
    }

    fn on_release(&mut self, frame: FrameNumber) {
        self.queue.retain(|&f| f != frame);
    }

    fn propose(&mut self) -> Option<FrameNumber> {
        // A proposed frame is either evicted and refilled, making it the newest, or
        // skipped. Both move it to the back.
        let frame = self.queue.pop_front()?;
        self.queue.push_back(frame);
        Some(frame)
    }
}
