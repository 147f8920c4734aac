//! Pitch - Fundamental frequency (F0) contour.
//!
//! [`PitchFrame`] is what a tracking session emits for one analysis step.
//! [`Pitch`] collects the frames of a whole signal with their timing, and
//! [`track_samples`] / [`sound_to_pitch_rapt`] run the complete tracker:
//!
//! 1. Validate parameters
//! 2. Add low-level Gaussian dither so digital silence still has energy
//! 3. Pad the end of the signal so the last frames are analyzed
//! 4. Stream everything through a [`RaptTracker`]
//! 5. Return exactly one frame per frame step of the unpadded signal

use ndarray::Array1;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::params::F0Params;
use crate::session::RaptTracker;
use crate::sound::Sound;

/// Scale of 16-bit PCM, the sample scale the tracker expects.
pub const PCM16_SCALE: f64 = 32768.0;

/// Tracking result for a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchFrame {
    /// F0 in Hz (0 = unvoiced).
    pub frequency: f64,
    pub voiced: bool,
    /// RMS energy of the stationarity window.
    pub rms: f64,
    /// Correlation peak of the chosen hypothesis.
    pub peak: f64,
}

impl PitchFrame {
    /// An unvoiced frame with no energy.
    pub fn silent() -> Self {
        Self {
            frequency: 0.0,
            voiced: false,
            rms: 0.0,
            peak: 0.0,
        }
    }
}

/// Interpolation method for getting values at specific times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Value of the nearest frame.
    Nearest,
    /// Linear between the two neighbouring frames.
    Linear,
}

/// Driver options around the core tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackOptions {
    /// Standard deviation of the added Gaussian dither, in PCM16 units.
    /// Zero disables dithering.
    pub dither: f64,
    /// Seed of the dither generator.
    pub seed: u64,
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self {
            dither: 50.0,
            seed: 1,
        }
    }
}

/// Pitch (F0) contour.
#[derive(Debug, Clone)]
pub struct Pitch {
    /// List of pitch frames.
    frames: Vec<PitchFrame>,
    /// Time step between frames.
    time_step: f64,
    /// Minimum pitch in Hz.
    pitch_floor: f64,
    /// Maximum pitch in Hz.
    pitch_ceiling: f64,
    sample_rate: f64,
}

impl Pitch {
    /// Create a new Pitch object. Frame `i` is at time `i * time_step`.
    pub fn new(
        frames: Vec<PitchFrame>,
        time_step: f64,
        pitch_floor: f64,
        pitch_ceiling: f64,
        sample_rate: f64,
    ) -> Self {
        Self {
            frames,
            time_step,
            pitch_floor,
            pitch_ceiling,
            sample_rate,
        }
    }

    /// Get the pitch frames.
    #[inline]
    pub fn frames(&self) -> &[PitchFrame] {
        &self.frames
    }

    /// Get the number of frames.
    #[inline]
    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    /// Get the time step between frames.
    #[inline]
    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Get the minimum pitch in Hz.
    #[inline]
    pub fn pitch_floor(&self) -> f64 {
        self.pitch_floor
    }

    /// Get the maximum pitch in Hz.
    #[inline]
    pub fn pitch_ceiling(&self) -> f64 {
        self.pitch_ceiling
    }

    /// Sample rate of the analyzed signal.
    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Time of frame `i` in seconds.
    #[inline]
    pub fn frame_time(&self, i: usize) -> f64 {
        i as f64 * self.time_step
    }

    /// Get array of frame times.
    pub fn times(&self) -> Array1<f64> {
        Array1::from_iter((0..self.frames.len()).map(|i| self.frame_time(i)))
    }

    /// Get array of pitch values (0 for unvoiced).
    pub fn values(&self) -> Array1<f64> {
        Array1::from_iter(self.frames.iter().map(|f| f.frequency))
    }

    /// Pitch values with `unvoiced` in place of unvoiced frames.
    ///
    /// The language bindings report NaN for unvoiced frames.
    pub fn values_or(&self, unvoiced: f64) -> Array1<f64> {
        Array1::from_iter(
            self.frames
                .iter()
                .map(|f| if f.voiced { f.frequency } else { unvoiced }),
        )
    }

    /// Voicing decisions as 1.0 (voiced) and 0.0 (unvoiced).
    pub fn voicing(&self) -> Array1<f64> {
        Array1::from_iter(self.frames.iter().map(|f| if f.voiced { 1.0 } else { 0.0 }))
    }

    /// Get array of frame RMS values.
    pub fn rms(&self) -> Array1<f64> {
        Array1::from_iter(self.frames.iter().map(|f| f.rms))
    }

    /// Get array of correlation peaks.
    pub fn peaks(&self) -> Array1<f64> {
        Array1::from_iter(self.frames.iter().map(|f| f.peak))
    }

    /// Fraction of frames that are voiced.
    pub fn voiced_fraction(&self) -> f64 {
        if self.frames.is_empty() {
            return 0.0;
        }
        self.frames.iter().filter(|f| f.voiced).count() as f64 / self.frames.len() as f64
    }

    /// Get pitch value at a specific time.
    ///
    /// Returns `None` outside the contour or when the relevant frames are
    /// unvoiced. Linear interpolation falls back to the nearest voiced
    /// neighbour when only one side is voiced.
    pub fn get_value_at_time(&self, time: f64, interpolation: Interpolation) -> Option<f64> {
        if self.n_frames() == 0 {
            return None;
        }

        let idx_float = time / self.time_step;
        if idx_float < -0.5 || idx_float > self.n_frames() as f64 - 0.5 {
            return None;
        }

        match interpolation {
            Interpolation::Nearest => {
                let idx = (idx_float.round().max(0.0) as usize).min(self.n_frames() - 1);
                let frame = &self.frames[idx];
                frame.voiced.then_some(frame.frequency)
            }
            Interpolation::Linear => {
                let idx = idx_float.floor() as isize;
                let frac = idx_float - idx as f64;

                let last = self.n_frames() as isize - 1;
                let f1 = &self.frames[idx.clamp(0, last) as usize];
                let f2 = &self.frames[(idx + 1).clamp(0, last) as usize];

                match (f1.voiced, f2.voiced) {
                    (true, true) => Some(f1.frequency * (1.0 - frac) + f2.frequency * frac),
                    (true, false) => Some(f1.frequency),
                    (false, true) => Some(f2.frequency),
                    (false, false) => None,
                }
            }
        }
    }
}

/// End padding, in frames, needed to analyze the last frames of a signal.
fn padding_frames(sample_rate: f64, step: usize, min_f0: f64) -> usize {
    let fsp = sample_rate * (10.0 / step as f64);
    let alpha = (0.00275 * fsp + 0.5) as usize;
    let beta = ((9600.0 / min_f0 - 168.0) * fsp / 96000.0 + 0.5).max(0.0) as usize;
    alpha + beta + 3
}

/// Gaussian noise source (polar Box-Muller) with a fixed seed.
struct Dither {
    rng: ChaCha8Rng,
    amplitude: f64,
    spare: Option<f64>,
}

impl Dither {
    fn new(amplitude: f64, seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            amplitude,
            spare: None,
        }
    }

    fn gaussian(&mut self) -> f64 {
        if let Some(v) = self.spare.take() {
            return v;
        }
        loop {
            let u = 2.0 * self.rng.random::<f64>() - 1.0;
            let v = 2.0 * self.rng.random::<f64>() - 1.0;
            let s = u * u + v * v;
            if s > 0.0 && s < 1.0 {
                let m = (-2.0 * s.ln() / s).sqrt();
                self.spare = Some(v * m);
                return u * m;
            }
        }
    }

    fn apply(&mut self, samples: &mut [f64]) {
        if self.amplitude == 0.0 {
            return;
        }
        for s in samples {
            *s += self.amplitude * self.gaussian();
        }
    }
}

/// Track F0 over a whole signal given in PCM16 scale.
///
/// Returns exactly `ceil(samples.len() / step)` frames, where `step` is the
/// frame step in samples. Frames the tracker could not reach are unvoiced.
///
/// # Errors
///
/// Parameter errors, and any error raised by the tracking session.
pub fn track_samples(
    samples: &[f64],
    sample_rate: f64,
    params: &F0Params,
    options: &TrackOptions,
) -> Result<Vec<PitchFrame>> {
    if !options.dither.is_finite() || options.dither < 0.0 {
        return Err(Error::InvalidParameter(format!(
            "dither must be a non-negative amplitude, got {}",
            options.dither
        )));
    }
    let mut tracker = RaptTracker::new(sample_rate, params)?;
    let step = tracker.session().geometry().step;
    let n_frames = samples.len().div_ceil(step);
    let pad = padding_frames(sample_rate, step, tracker.session().params().min_f0) * step;

    let mut dither = Dither::new(options.dither, options.seed);
    let mut frames = Vec::with_capacity(n_frames + 1);
    let mut block = Vec::with_capacity(tracker.session().buffer_size());
    for piece in samples.chunks(tracker.session().buffer_size().max(1)) {
        block.clear();
        block.extend_from_slice(piece);
        dither.apply(&mut block);
        frames.extend(tracker.push(&block)?);
    }
    let mut tail = vec![0.0; pad];
    dither.apply(&mut tail);
    frames.extend(tracker.push(&tail)?);
    frames.extend(tracker.finish()?);

    log::debug!(
        "tracked {} samples: {} frames analyzed, {} returned",
        samples.len(),
        frames.len(),
        n_frames
    );
    frames.resize(n_frames, PitchFrame::silent());
    Ok(frames)
}

/// Compute the F0 contour of a sound with RAPT.
///
/// Sound samples are normalized to [-1, 1] and are scaled to PCM16 range
/// before tracking, so RMS values are in PCM16 units.
pub fn sound_to_pitch_rapt(sound: &Sound, params: &F0Params, options: &TrackOptions) -> Result<Pitch> {
    let samples: Vec<f64> = sound.samples().iter().map(|s| s * PCM16_SCALE).collect();
    let checked = params.checked(sound.sample_rate())?;
    let frames = track_samples(&samples, sound.sample_rate(), &checked, options)?;
    Ok(Pitch::new(
        frames,
        checked.frame_step,
        checked.min_f0,
        checked.max_f0,
        sound.sample_rate(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn frame(frequency: f64) -> PitchFrame {
        PitchFrame {
            frequency,
            voiced: frequency > 0.0,
            rms: 1.0,
            peak: 0.9,
        }
    }

    #[test]
    fn test_value_at_time() {
        let pitch = Pitch::new(
            vec![frame(100.0), frame(110.0), frame(0.0), frame(130.0)],
            0.01,
            60.0,
            240.0,
            16000.0,
        );
        assert_eq!(pitch.get_value_at_time(0.0, Interpolation::Nearest), Some(100.0));
        assert_abs_diff_eq!(
            pitch.get_value_at_time(0.005, Interpolation::Linear).unwrap(),
            105.0,
            epsilon = 1e-9
        );
        assert_eq!(pitch.get_value_at_time(0.02, Interpolation::Nearest), None);
        assert_eq!(pitch.get_value_at_time(0.025, Interpolation::Linear), Some(130.0));
        assert_eq!(pitch.get_value_at_time(1.0, Interpolation::Linear), None);
    }

    #[test]
    fn test_arrays() {
        let pitch = Pitch::new(vec![frame(100.0), frame(0.0)], 0.005, 60.0, 240.0, 16000.0);
        assert_eq!(pitch.times().to_vec(), vec![0.0, 0.005]);
        assert_eq!(pitch.values().to_vec(), vec![100.0, 0.0]);
        assert_eq!(pitch.voicing().to_vec(), vec![1.0, 0.0]);
        assert_eq!(pitch.voiced_fraction(), 0.5);
        let masked = pitch.values_or(f64::NAN);
        assert_eq!(masked[0], 100.0);
        assert!(masked[1].is_nan());
    }

    #[test]
    fn test_padding_frames_at_16k() {
        // fsp = 2000: alpha = 6, beta = round((160 - 168) * ...) clamps to 0
        assert_eq!(padding_frames(16000.0, 80, 60.0), 9);
        // 9600/40 - 168 = 72: beta = round(72 * 2000 / 96000) = 2
        assert_eq!(padding_frames(16000.0, 80, 40.0), 11);
    }

    #[test]
    fn test_dither_is_seeded() {
        let mut a = vec![0.0; 64];
        let mut b = vec![0.0; 64];
        Dither::new(50.0, 7).apply(&mut a);
        Dither::new(50.0, 7).apply(&mut b);
        assert_eq!(a, b);
        let rms = (a.iter().map(|v| v * v).sum::<f64>() / 64.0).sqrt();
        assert!(rms > 20.0 && rms < 100.0);
    }

    #[test]
    fn test_output_length_matches_frame_count() {
        let samples = vec![0.0; 1001];
        let frames = track_samples(&samples, 16000.0, &F0Params::default(), &TrackOptions::default())
            .unwrap();
        assert_eq!(frames.len(), 13);
        assert!(frames.iter().all(|f| !f.voiced));
    }

    #[test]
    fn test_negative_dither_rejected() {
        let options = TrackOptions {
            dither: -1.0,
            ..TrackOptions::default()
        };
        assert!(matches!(
            track_samples(&[0.0; 100], 16000.0, &F0Params::default(), &options),
            Err(Error::InvalidParameter(_))
        ));
    }
}
