//! # rapt
//!
//! Streaming fundamental frequency (F0) tracking with RAPT, the Robust
//! Algorithm for Pitch Tracking (Talkin 1995).
//!
//! Audio arrives in chunks. Each analysis frame gets a set of period
//! candidates from normalized cross-correlation, and a dynamic program picks
//! one voiced candidate or the unvoiced hypothesis per frame. Output for a
//! frame is released once the best paths of all current hypotheses agree on
//! it, so results stream out with bounded delay.
//!
//! # Pipeline
//!
//! - **Decimation**: low-pass FIR and downsampling to about 2 kHz
//! - **Candidates**: coarse correlation on the decimated signal, refined in
//!   small patches at full rate
//! - **Stationarity**: LPC spectral distance and RMS ratio between windows,
//!   used to price voicing changes
//! - **Frame ring**: growable history of undecided frames
//! - **Dynamic program**: path costs, convergence detection and backtracking
//!
//! # Quick Start
//!
//! ```no_run
//! use rapt::{F0Params, Sound, TrackOptions};
//!
//! let sound = Sound::from_file("audio.wav")?;
//! let pitch = sound.to_pitch_rapt(&F0Params::with_range(60.0, 400.0), &TrackOptions::default())?;
//! let f0 = pitch.values();
//! # Ok::<(), rapt::Error>(())
//! ```
//!
//! For live input, feed samples (PCM16 scale) to a [`RaptTracker`]:
//!
//! ```no_run
//! use rapt::{F0Params, RaptTracker};
//!
//! let mut tracker = RaptTracker::new(16000.0, &F0Params::default())?;
//! # let blocks: Vec<Vec<f64>> = Vec::new();
//! for block in &blocks {
//!     for frame in tracker.push(block)? {
//!         println!("{:.1} Hz", frame.frequency);
//!     }
//! }
//! let tail = tracker.finish()?;
//! # Ok::<(), rapt::Error>(())
//! ```

// Module declarations
pub mod candidates;
pub mod decimate;
pub mod dp;
pub mod error;
pub mod output;
pub mod params;
pub mod pitch;
pub mod ring;
pub mod session;
pub mod sigproc;
pub mod sound;
pub mod stationarity;

// WASM bindings (enabled with "wasm" feature)
#[cfg(feature = "wasm")]
pub mod wasm;

// Python bindings (enabled with "python" feature)
#[cfg(feature = "python")]
pub mod python;

/// Error types for rapt operations.
pub use error::{Error, Result};

/// Output formatting.
///
/// - `OutputMode`: period, F0, log F0 or all per-frame values
/// - `OutputFormat`: mode plus unvoiced sentinels
/// - `format_frames`: flatten frames into output values
pub use output::{format_frames, OutputFormat, OutputMode};

/// Tracker parameters.
pub use params::F0Params;

/// Pitch (F0) results and whole-signal tracking.
///
/// - `Pitch`: F0 contour with timing
/// - `PitchFrame`: one output frame
/// - `TrackOptions`: dither settings of the whole-signal driver
/// - `track_samples`: track a PCM16-scale signal
/// - `sound_to_pitch_rapt`: track a `Sound`
pub use pitch::{sound_to_pitch_rapt, track_samples, Interpolation, Pitch, PitchFrame, TrackOptions};

/// Streaming sessions.
///
/// - `RaptSession`: fixed-chunk tracking state
/// - `RaptTracker`: accepts input in pieces of any size
/// - `Geometry`: sizes derived from sample rate and parameters
pub use session::{Geometry, RaptSession, RaptTracker};

/// Sound loading and basic operations.
pub use sound::Sound;
