//! Streaming tracking session.
//!
//! A [`RaptSession`] owns every piece of state the tracker carries between
//! chunks: decimation filter memory, stationarity history, the frame ring and
//! the convergence bookkeeping. Nothing is global, so independent sessions
//! can run side by side.
//!
//! The session works on fixed-size chunks. Chunk `n` must start at sample
//! `n * step_size()` of the signal and hold `buffer_size()` samples, except
//! for the final chunk, which may be shorter. Consecutive chunks therefore
//! overlap by `buffer_size() - step_size()` samples. [`RaptTracker`] does
//! this bookkeeping for arbitrary pushes.

use log::{debug, warn};

use crate::candidates::{CandidateExtractor, SearchRange};
use crate::decimate::{ChunkEdge, Decimator};
use crate::dp::{backtrack, find_convergence, DpWeights, LagRange};
use crate::error::{Error, Result};
use crate::params::F0Params;
use crate::pitch::PitchFrame;
use crate::ring::FrameRing;
use crate::stationarity::{StationarityAnalyzer, STAT_INTERVAL, STAT_WINDOW};

/// Samples read per chunk, in seconds (before padding).
const READ_SPAN: f64 = 0.2;
/// Initial frame ring span, in seconds.
const RING_SPAN: f64 = 1.5;
/// Undecided history that triggers a convergence check, in seconds.
const HISTORY_SPAN: f64 = 0.5;
/// Undecided history after which output is forced, in seconds.
const OUTPUT_LIMIT: f64 = 1.0;
/// Target rate of the coarse correlation pass, in Hz.
const COARSE_RATE: f64 = 2000.0;

/// Sizes derived from the sample rate and parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Frame step in samples.
    pub step: usize,
    /// Correlation window in samples.
    pub size: usize,
    /// Shortest and longest lag searched.
    pub start: usize,
    pub stop: usize,
    pub nlags: usize,
    /// Samples one correlation frame touches.
    pub ncomp: usize,
    pub decimate: usize,
    /// Samples a chunk needs beyond its frames.
    pub pad: usize,
    pub frames_per_chunk: usize,
    pub buffer_size: usize,
    pub step_size: usize,
    pub ring_capacity: usize,
    pub history_frames: usize,
    pub output_limit_frames: usize,
}

impl Geometry {
    /// Derive the geometry from validated parameters.
    pub fn new(sample_rate: f64, params: &F0Params) -> Self {
        let fs = sample_rate;
        let step = (params.frame_step * fs).round() as usize;
        let size = (params.wind_dur * fs).round() as usize;
        let frame_interval = step as f64 / fs;
        let start = (fs / params.max_f0).round() as usize;
        let stop = (fs / params.min_f0).round() as usize;
        let nlags = stop - start + 1;
        let ncomp = size + stop + 1;

        let read = (READ_SPAN * fs) as usize;
        let frames_per_chunk = if ncomp >= step {
            read.saturating_sub(ncomp) / step + 1
        } else {
            read / step
        }
        .max(1);

        let downpatch = ((fs * 0.005) as usize + 1) / 2;
        let stat_wsize = (STAT_WINDOW * fs) as isize;
        let agap = (STAT_INTERVAL * fs) as isize;
        let ind = (agap - stat_wsize) / 2;
        let stat_reach = usize::try_from(stat_wsize + ind).unwrap_or(0);
        let pad = downpatch + stat_reach.max(ncomp);

        Self {
            step,
            size,
            start,
            stop,
            nlags,
            ncomp,
            decimate: ((fs / COARSE_RATE) as usize).max(1),
            pad,
            frames_per_chunk,
            buffer_size: frames_per_chunk * step + pad,
            step_size: frames_per_chunk * step,
            ring_capacity: ((RING_SPAN / frame_interval) as usize).max(2),
            history_frames: (HISTORY_SPAN / frame_interval) as usize,
            output_limit_frames: (OUTPUT_LIMIT / frame_interval) as usize,
        }
    }

    /// Analysis frames a chunk of `len` samples yields.
    pub fn frames_in(&self, len: usize) -> usize {
        if len < self.pad {
            0
        } else {
            (len - self.pad) / self.step
        }
    }
}

/// One streaming tracking session.
#[derive(Debug, Clone)]
pub struct RaptSession {
    sample_rate: f64,
    params: F0Params,
    geometry: Geometry,
    weights: DpWeights,
    decimator: Option<Decimator>,
    extractor: CandidateExtractor,
    stationarity: StationarityAnalyzer,
    ring: FrameRing,
    /// Frames written to the ring but not yet emitted.
    active: usize,
    /// Whether any frame has been written since the last reset.
    started: bool,
    /// Set when a chunk failed partway; cleared by `reset`.
    failed: bool,
}

impl RaptSession {
    /// Validate `params` and set up a session for `sample_rate`.
    ///
    /// # Errors
    ///
    /// - `Error::Config` for invalid parameters
    /// - `Error::FilterComputation` when the decimation filter cannot be
    ///   designed
    pub fn new(sample_rate: f64, params: &F0Params) -> Result<Self> {
        let params = params.checked(sample_rate)?;
        let geometry = Geometry::new(sample_rate, &params);
        if geometry.size < 2 || geometry.nlags < 4 {
            return Err(Error::Config(format!(
                "window of {} samples over {} lags is too small to track",
                geometry.size, geometry.nlags
            )));
        }
        let decimator = if geometry.decimate > 1 {
            Some(Decimator::new(sample_rate, geometry.decimate)?)
        } else {
            None
        };
        let range = SearchRange {
            size: geometry.size,
            start: geometry.start,
            nlags: geometry.nlags,
        };
        let frame_interval = geometry.step as f64 / sample_rate;
        debug!(
            "session at {} Hz: step {}, window {}, lags {}..={}, decimate {}, chunk {} (+{} pad), ring {}",
            sample_rate,
            geometry.step,
            geometry.size,
            geometry.start,
            geometry.stop,
            geometry.decimate,
            geometry.step_size,
            geometry.pad,
            geometry.ring_capacity
        );
        Ok(Self {
            sample_rate,
            weights: DpWeights::new(&params, frame_interval, geometry.nlags),
            decimator,
            extractor: CandidateExtractor::new(
                range,
                params.cand_thresh,
                params.lag_weight,
                params.n_cands,
            ),
            stationarity: StationarityAnalyzer::new(sample_rate, geometry.step),
            ring: FrameRing::new(geometry.ring_capacity, geometry.nlags, params.n_cands),
            active: 0,
            started: false,
            failed: false,
            params,
            geometry,
        })
    }

    /// Samples every non-final chunk must hold.
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.geometry.buffer_size
    }

    /// Distance in samples between the starts of consecutive chunks.
    #[inline]
    pub fn step_size(&self) -> usize {
        self.geometry.step_size
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Validated parameters, with the frame step rounded to whole samples.
    #[inline]
    pub fn params(&self) -> &F0Params {
        &self.params
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Seconds between output frames.
    #[inline]
    pub fn frame_interval(&self) -> f64 {
        self.geometry.step as f64 / self.sample_rate
    }

    /// Frames analyzed but not yet emitted.
    #[inline]
    pub fn pending_frames(&self) -> usize {
        self.active
    }

    /// Start over with a new signal. Configuration is kept.
    pub fn reset(&mut self) {
        if let Some(decimator) = &mut self.decimator {
            decimator.reset();
        }
        self.stationarity.reset();
        self.ring.reset();
        self.active = 0;
        self.started = false;
        self.failed = false;
    }

    /// Analyze one chunk and return the frames finalized by it, oldest first.
    ///
    /// Set `last` on the final chunk to flush every remaining frame. A chunk
    /// too short for one analysis frame yields no new frames.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidParameter` when a non-final chunk is not exactly
    ///   `buffer_size()` samples long
    /// - `Error::StationarityUnavailable` when stationarity statistics cannot
    ///   be computed
    /// - `Error::ConvergenceStall` when the frame ring cannot grow any more
    /// - `Error::SessionFailed` for every chunk after one of the failures
    ///   above, until [`reset`](Self::reset) is called
    pub fn process(&mut self, chunk: &[f64], last: bool) -> Result<Vec<PitchFrame>> {
        if self.failed {
            return Err(Error::SessionFailed);
        }
        if !last && chunk.len() != self.geometry.buffer_size {
            return Err(Error::InvalidParameter(format!(
                "non-final chunk must hold {} samples, got {}",
                self.geometry.buffer_size,
                chunk.len()
            )));
        }
        let result = self.process_chunk(chunk, last);
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn process_chunk(&mut self, chunk: &[f64], last: bool) -> Result<Vec<PitchFrame>> {
        let nframes = self.geometry.frames_in(chunk.len());
        if nframes > 0 {
            self.analyze(chunk, nframes, last)?;
            self.active += nframes;
        }
        debug!(
            "chunk of {} samples: {} frames, {} pending{}",
            chunk.len(),
            nframes,
            self.active,
            if last { ", last" } else { "" }
        );

        if self.active == 0 || (!last && self.active < self.geometry.history_frames) {
            return Ok(Vec::new());
        }
        self.emit(last)
    }

    /// Compute candidates and path costs for `nframes` frames of `chunk`.
    fn analyze(&mut self, chunk: &[f64], nframes: usize, last: bool) -> Result<()> {
        let g = self.geometry;
        let edge = if !self.started {
            ChunkEdge::First
        } else if last {
            ChunkEdge::Last
        } else {
            ChunkEdge::Middle
        };

        let coarse: &[f64] = match &mut self.decimator {
            Some(decimator) => {
                let out_len = ((nframes - 1) * g.step + g.ncomp) / g.decimate;
                decimator.process(chunk, out_len, g.step_size, edge)
            }
            None => chunk,
        };
        let stat = self
            .stationarity
            .analyze(chunk, nframes, g.step, !self.started)?;

        if self.started {
            self.ring.advance_head();
        }
        for i in 0..nframes {
            self.ring.make_room()?;
            let head = self.ring.head();
            let offset = i * g.step;
            let signal = chunk.get(offset..).unwrap_or(&[]);
            let coarse = coarse.get(offset / g.decimate..).unwrap_or(&[]);

            let (prev, frame) = self.ring.prev_and_current(head);
            frame.rms = stat.rms[i];
            let peaks = self
                .extractor
                .extract(signal, coarse, g.decimate, &mut frame.cross);
            self.weights
                .load_candidates(&mut frame.dp, peaks, frame.cross.max_val);
            let prev = if !self.started && i == 0 {
                None
            } else {
                Some(&prev.dp)
            };
            self.weights
                .accumulate(&mut frame.dp, prev, stat.stat[i], stat.rms_ratio[i]);

            if i + 1 < nframes {
                self.ring.advance_head();
            }
        }
        self.started = true;
        Ok(())
    }

    /// Emit the frames whose path is decided.
    fn emit(&mut self, last: bool) -> Result<Vec<PitchFrame>> {
        let head = self.ring.head();
        let best = self.ring.frame(head).dp.best();
        let (from, cand) = if last {
            (head, best)
        } else {
            match find_convergence(&self.ring) {
                Some(point) => point,
                None if self.active < self.geometry.output_limit_frames => {
                    debug!("no convergence over {} frames, waiting", self.active);
                    return Ok(Vec::new());
                }
                None => {
                    warn!(
                        "no convergence over {} frames, emitting best path",
                        self.active
                    );
                    (head, best)
                }
            }
        };

        let range = LagRange {
            sample_rate: self.sample_rate,
            start: self.geometry.start,
            stop: self.geometry.stop,
        };
        let mut out = backtrack(&self.ring, from, cand, range);
        self.ring.set_tail(self.ring.next(from));
        self.active -= out.len();
        out.reverse();
        debug!("emitted {} frames, {} still pending", out.len(), self.active);
        Ok(out)
    }
}

/// Chunking front end for [`RaptSession`].
///
/// Accepts samples in pieces of any size and feeds the session exactly the
/// chunks it expects, so the output does not depend on how the input was
/// split.
#[derive(Debug, Clone)]
pub struct RaptTracker {
    session: RaptSession,
    pending: Vec<f64>,
}

impl RaptTracker {
    pub fn new(sample_rate: f64, params: &F0Params) -> Result<Self> {
        let session = RaptSession::new(sample_rate, params)?;
        Ok(Self {
            pending: Vec::with_capacity(session.buffer_size() * 2),
            session,
        })
    }

    #[inline]
    pub fn session(&self) -> &RaptSession {
        &self.session
    }

    /// Add samples and return any frames finalized so far.
    ///
    /// After an error every push fails with `Error::SessionFailed` until
    /// [`finish`](Self::finish) resets the tracker.
    pub fn push(&mut self, samples: &[f64]) -> Result<Vec<PitchFrame>> {
        self.pending.extend_from_slice(samples);
        let size = self.session.buffer_size();
        let step = self.session.step_size();
        let mut out = Vec::new();
        // a full chunk is only known not to be the last once more input follows it
        while self.pending.len() > size {
            out.extend(self.session.process(&self.pending[..size], false)?);
            self.pending.drain(..step);
        }
        Ok(out)
    }

    /// Flush the remaining input and return the last frames.
    ///
    /// The tracker is reset afterwards and can take a new signal.
    pub fn finish(&mut self) -> Result<Vec<PitchFrame>> {
        let out = self.session.process(&self.pending, true);
        self.pending.clear();
        self.session.reset();
        out
    }
}
