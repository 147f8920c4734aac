//! Tracker parameters.
//!
//! [`F0Params`] holds every tunable of the tracker. Values are plain data
//! and serialize with serde so a partial JSON file can override the
//! defaults:
//!
//! ```
//! let params: rapt::F0Params = serde_json::from_str(r#"{ "min_f0": 80.0 }"#).unwrap();
//! assert_eq!(params.min_f0, 80.0);
//! assert_eq!(params.max_f0, 240.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest frame step accepted, in seconds.
pub const MAX_FRAME_STEP: f64 = 0.1;

/// Analysis parameters for the RAPT tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct F0Params {
    /// Only correlation peaks above `cand_thresh * max` become candidates.
    pub cand_thresh: f64,
    /// Linear lag penalty favoring short periods.
    pub lag_weight: f64,
    /// Weight of the inter-frame frequency change.
    pub freq_weight: f64,
    /// Fixed cost of a voicing transition.
    pub trans_cost: f64,
    /// Amplitude-change contribution to a voicing transition.
    pub trans_amp: f64,
    /// Spectral-change contribution to a voicing transition.
    pub trans_spec: f64,
    /// Added to the unvoiced hypothesis cost; positive values favor voicing.
    pub voice_bias: f64,
    /// Cost of an octave jump between voiced frames.
    pub double_cost: f64,
    /// Lowest F0 searched, in Hz.
    pub min_f0: f64,
    /// Highest F0 searched, in Hz.
    pub max_f0: f64,
    /// Frame step in seconds.
    pub frame_step: f64,
    /// Correlation window duration in seconds.
    pub wind_dur: f64,
    /// Maximum number of hypotheses per frame, unvoiced slot included.
    pub n_cands: usize,
}

impl Default for F0Params {
    fn default() -> Self {
        Self {
            cand_thresh: 0.3,
            lag_weight: 0.3,
            freq_weight: 0.02,
            trans_cost: 0.005,
            trans_amp: 0.5,
            trans_spec: 0.5,
            voice_bias: 0.0,
            double_cost: 0.35,
            min_f0: 60.0,
            max_f0: 240.0,
            frame_step: 0.005,
            wind_dur: 0.0075,
            n_cands: 20,
        }
    }
}

impl F0Params {
    /// Parameters with the given F0 search range and defaults elsewhere.
    pub fn with_range(min_f0: f64, max_f0: f64) -> Self {
        Self {
            min_f0,
            max_f0,
            ..Self::default()
        }
    }

    /// Validate against a sample rate and return a normalized copy.
    ///
    /// The frame step is rounded to a whole number of samples before it is
    /// range-checked, so the returned `frame_step` is exactly
    /// `round(frame_step * sample_rate) / sample_rate`.
    ///
    /// # Errors
    ///
    /// `Error::Config` when the search range does not fit below Nyquist,
    /// the frame step falls outside `[1/sample_rate, 0.1]`, or any weight is
    /// not usable.
    pub fn checked(&self, sample_rate: f64) -> Result<Self> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(Error::Config(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }
        if !self.min_f0.is_finite() || !self.max_f0.is_finite() {
            return Err(Error::Config(format!(
                "F0 range must be finite, got {} to {}",
                self.min_f0, self.max_f0
            )));
        }
        if self.max_f0 <= self.min_f0 {
            return Err(Error::Config(format!(
                "min_f0 ({}) must be below max_f0 ({})",
                self.min_f0, self.max_f0
            )));
        }
        if self.max_f0 >= sample_rate / 2.0 {
            return Err(Error::Config(format!(
                "max_f0 ({}) must be below the Nyquist frequency ({})",
                self.max_f0,
                sample_rate / 2.0
            )));
        }
        if self.min_f0 < sample_rate / 10000.0 {
            return Err(Error::Config(format!(
                "min_f0 ({}) must be at least sample_rate/10000 ({})",
                self.min_f0,
                sample_rate / 10000.0
            )));
        }

        let frame_step = (sample_rate * self.frame_step).round() / sample_rate;
        if !(frame_step >= 1.0 / sample_rate && frame_step <= MAX_FRAME_STEP) {
            return Err(Error::Config(format!(
                "frame_step ({}) must lie within [{}, {}] seconds",
                self.frame_step,
                1.0 / sample_rate,
                MAX_FRAME_STEP
            )));
        }
        if !(self.wind_dur * sample_rate >= 2.0) {
            return Err(Error::Config(format!(
                "wind_dur ({}) must cover at least two samples",
                self.wind_dur
            )));
        }
        if self.n_cands < 2 {
            return Err(Error::Config(format!(
                "n_cands must be at least 2, got {}",
                self.n_cands
            )));
        }
        if !(0.0..=1.0).contains(&self.cand_thresh) {
            return Err(Error::Config(format!(
                "cand_thresh must lie within [0, 1], got {}",
                self.cand_thresh
            )));
        }
        let weights = [
            ("lag_weight", self.lag_weight),
            ("freq_weight", self.freq_weight),
            ("trans_cost", self.trans_cost),
            ("trans_amp", self.trans_amp),
            ("trans_spec", self.trans_spec),
            ("voice_bias", self.voice_bias),
            ("double_cost", self.double_cost),
        ];
        if let Some((name, value)) = weights.iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::Config(format!("{} must be finite, got {}", name, value)));
        }

        Ok(Self {
            frame_step,
            ..self.clone()
        })
    }
}
