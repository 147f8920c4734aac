//! Frame history for the dynamic program.
//!
//! Frames live in a growable arena addressed by index and linked as a ring:
//! `next(i)` and `prev(i)` wrap around the arena. `head` is the most recently
//! written frame, `tail` the oldest frame whose output has not been emitted.
//! Frames from `tail` to `head` are active; the rest are free slots that are
//! overwritten as the head advances.
//!
//! When the head would run into the tail, a block of fresh frames is spliced
//! in after the head instead of overwriting undecided history. The number of
//! such expansions is bounded; exceeding it is reported as
//! [`Error::ConvergenceStall`].

use crate::candidates::Cross;
use crate::error::{Error, Result};

/// Expansions allowed before the ring gives up.
pub const MAX_GROWTH: usize = 5;

/// One hypothesis of a frame in the dynamic program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DpCandidate {
    /// Period in samples, `None` for the unvoiced hypothesis.
    pub lag: Option<usize>,
    /// Correlation peak (or frame maximum for the unvoiced hypothesis).
    pub peak: f64,
    pub local_cost: f64,
    /// Cost of the best path ending here.
    pub path_cost: f64,
    /// Index of the best predecessor in the previous frame.
    pub back: usize,
}

/// Dynamic-programming record of one frame.
#[derive(Debug, Clone, Default)]
pub struct Dprec {
    pub cands: Vec<DpCandidate>,
}

impl Dprec {
    /// Index of the candidate with the lowest path cost; the first wins ties.
    pub fn best(&self) -> usize {
        let mut best = 0;
        for (k, c) in self.cands.iter().enumerate().skip(1) {
            if c.path_cost < self.cands[best].path_cost {
                best = k;
            }
        }
        best
    }
}

/// One analysis step.
#[derive(Debug, Clone)]
pub struct Frame {
    pub cross: Cross,
    pub dp: Dprec,
    pub rms: f64,
}

impl Frame {
    pub fn new(nlags: usize, n_cands: usize) -> Self {
        Self {
            cross: Cross::new(nlags),
            dp: Dprec {
                cands: Vec::with_capacity(n_cands),
            },
            rms: 0.0,
        }
    }
}

/// Index-addressed ring of frames.
#[derive(Debug, Clone)]
pub struct FrameRing {
    frames: Vec<Frame>,
    head: usize,
    tail: usize,
    grow_by: usize,
    growths: usize,
    nlags: usize,
    n_cands: usize,
}

impl FrameRing {
    /// A ring of `capacity` frames (at least 2) that grows by the same
    /// amount when full.
    pub fn new(capacity: usize, nlags: usize, n_cands: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            frames: (0..capacity).map(|_| Frame::new(nlags, n_cands)).collect(),
            head: 0,
            tail: 0,
            grow_by: capacity,
            growths: 0,
            nlags,
            n_cands,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn head(&self) -> usize {
        self.head
    }

    #[inline]
    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Expansions performed so far.
    #[inline]
    pub fn growths(&self) -> usize {
        self.growths
    }

    #[inline]
    pub fn next(&self, i: usize) -> usize {
        if i + 1 == self.frames.len() {
            0
        } else {
            i + 1
        }
    }

    #[inline]
    pub fn prev(&self, i: usize) -> usize {
        if i == 0 {
            self.frames.len() - 1
        } else {
            i - 1
        }
    }

    #[inline]
    pub fn frame(&self, i: usize) -> &Frame {
        &self.frames[i]
    }

    #[inline]
    pub fn frame_mut(&mut self, i: usize) -> &mut Frame {
        &mut self.frames[i]
    }

    /// Number of frames from `tail` to `head` inclusive.
    pub fn span(&self) -> usize {
        if self.head >= self.tail {
            self.head - self.tail + 1
        } else {
            self.frames.len() - self.tail + self.head + 1
        }
    }

    pub fn advance_head(&mut self) {
        self.head = self.next(self.head);
    }

    pub fn set_tail(&mut self, i: usize) {
        self.tail = i;
    }

    /// Make sure the head slot can be written without reaching the tail.
    ///
    /// Splices a block of fresh frames after the head when the slot after
    /// it is the tail.
    pub fn make_room(&mut self) -> Result<()> {
        if self.head != self.prev(self.tail) {
            return Ok(());
        }
        if self.growths > MAX_GROWTH {
            return Err(Error::ConvergenceStall {
                growths: self.growths,
            });
        }
        let at = self.head + 1;
        let (nlags, n_cands) = (self.nlags, self.n_cands);
        self.frames
            .splice(at..at, (0..self.grow_by).map(|_| Frame::new(nlags, n_cands)));
        if self.tail >= at {
            self.tail += self.grow_by;
        }
        self.growths += 1;
        log::debug!(
            "frame ring grown to {} frames ({} expansions)",
            self.frames.len(),
            self.growths
        );
        Ok(())
    }

    /// The frame before `i` and frame `i` itself, mutably.
    pub fn prev_and_current(&mut self, i: usize) -> (&Frame, &mut Frame) {
        let p = self.prev(i);
        if p < i {
            let (before, after) = self.frames.split_at_mut(i);
            (&before[p], &mut after[0])
        } else {
            let (before, after) = self.frames.split_at_mut(p);
            (&after[0], &mut before[i])
        }
    }

    /// Forget all history. Capacity is kept.
    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.growths = 0;
        for frame in &mut self.frames {
            frame.dp.cands.clear();
            frame.rms = 0.0;
        }
    }
}
