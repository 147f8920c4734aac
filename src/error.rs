//! Error types for rapt.
//!
//! This module defines the error types that can occur while loading audio,
//! validating tracker parameters, and running a tracking session.
//! All errors implement `std::error::Error` via the `thiserror` crate.
//!
//! # Error Handling Philosophy
//!
//! - **Configuration errors are fatal**: invalid parameters are rejected
//!   before any processing starts
//! - **Session errors abort the session**: filter, stationarity and
//!   convergence failures are returned from the call that hit them and the
//!   session should be reset or rebuilt
//! - **Short input is not an error**: a final chunk too short for one
//!   analysis window simply produces no frames

use thiserror::Error;

/// Result type alias using rapt's Error type.
///
/// # Example
///
/// ```no_run
/// use rapt::{F0Params, Result, Sound, TrackOptions};
///
/// fn track_file(path: &str) -> Result<()> {
///     let sound = Sound::from_file(path)?;
///     let pitch = sound.to_pitch_rapt(&F0Params::default(), &TrackOptions::default())?;
///     println!("{} frames", pitch.n_frames());
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while tracking F0.
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading audio file.
    ///
    /// This wraps errors from the `hound` WAV library.
    #[error("Failed to read audio file: {0}")]
    AudioRead(#[from] hound::Error),

    /// Error with I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Audio file must be mono.
    ///
    /// For multi-channel files, use `Sound::from_file_channel()` to
    /// explicitly select which channel to analyze.
    #[error("Audio must be mono (single channel), got {0} channels")]
    NotMono(u16),

    /// Invalid argument outside the F0 parameter set.
    ///
    /// Channel indices, dither amplitude and similar driver options.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Inconsistent tracker configuration.
    ///
    /// Returned by [`F0Params::checked`](crate::F0Params::checked) and
    /// session construction when, for example:
    ///
    /// - `min_f0 >= max_f0`
    /// - `max_f0` is at or above the Nyquist frequency
    /// - the frame step is outside `[1/sample_rate, 0.1]` seconds
    #[error("Invalid tracker configuration: {0}")]
    Config(String),

    /// The decimation low-pass filter could not be designed.
    ///
    /// Raised for a degenerate cutoff. The session cannot produce a
    /// coarse signal and must be reconfigured.
    #[error("Decimation filter computation failed: {0}")]
    FilterComputation(String),

    /// Stationarity statistics could not be produced for this chunk.
    ///
    /// Buffer reservation failed or the LPC analysis could not run.
    #[error("Stationarity analysis unavailable: {0}")]
    StationarityUnavailable(String),

    /// The frame ring had to grow too many times without the dynamic
    /// program converging.
    ///
    /// This usually points at a parameter misconfiguration rather than a
    /// transient condition.
    #[error("Dynamic program failed to converge after {growths} frame ring expansions")]
    ConvergenceStall {
        /// Number of expansions already performed.
        growths: usize,
    },

    /// An earlier chunk failed and left the session mid-frame.
    ///
    /// Every further chunk is refused until the session is reset.
    #[error("Session failed on an earlier chunk and must be reset")]
    SessionFailed,
}
