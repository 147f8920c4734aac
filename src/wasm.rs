//! WASM bindings for rapt.
//!
//! JavaScript wrappers for the whole-signal tracker and the streaming
//! tracker, built with wasm-bindgen.
//!
//! # Usage from JavaScript
//!
//! ```javascript
//! import init, { Sound, Tracker } from './pkg/rapt.js';
//!
//! await init();
//!
//! const sound = Sound.from_wav(new Uint8Array(buffer));
//! const pitch = sound.to_pitch_rapt(60, 240, 0.005, 0);
//! const f0 = pitch.values();          // Float64Array, NaN when unvoiced
//!
//! // live input, samples in PCM16 scale
//! const tracker = new Tracker(16000, 60, 240);
//! const frames = tracker.push(block); // [f0, voicing, rms, peak, ...]
//! ```
//!
//! # Building for WASM
//!
//! ```bash
//! wasm-pack build --target web --features wasm
//! ```

use std::io::Cursor;
use wasm_bindgen::prelude::*;

use crate::output::{format_frames, OutputFormat, OutputMode};
use crate::params::F0Params;
use crate::pitch::{Pitch as RustPitch, PitchFrame, TrackOptions};
use crate::session::RaptTracker;
use crate::sound::Sound as RustSound;

/// Initialize the WASM module.
///
/// Sets up panic hooks for readable errors in the browser console.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

fn js_error(e: crate::Error) -> JsError {
    JsError::new(&e.to_string())
}

/// Audio samples with sample rate.
#[wasm_bindgen]
pub struct Sound {
    inner: RustSound,
}

#[wasm_bindgen]
impl Sound {
    /// Create a Sound from samples in [-1, 1].
    #[wasm_bindgen(constructor)]
    pub fn new(samples: &[f64], sample_rate: f64) -> Sound {
        Sound {
            inner: RustSound::from_slice(samples, sample_rate),
        }
    }

    /// Create a Sound from mono WAV file bytes.
    pub fn from_wav(wav_bytes: &[u8]) -> Result<Sound, JsError> {
        Self::decode(wav_bytes, None)
    }

    /// Create a Sound from one channel of a WAV file (0 = left).
    pub fn from_wav_channel(wav_bytes: &[u8], channel: usize) -> Result<Sound, JsError> {
        Self::decode(wav_bytes, Some(channel))
    }

    fn decode(wav_bytes: &[u8], channel: Option<usize>) -> Result<Sound, JsError> {
        let reader = hound::WavReader::new(Cursor::new(wav_bytes))
            .map_err(|e| JsError::new(&format!("Failed to read WAV: {}", e)))?;
        let inner = RustSound::from_wav_reader(reader, channel).map_err(js_error)?;
        Ok(Sound { inner })
    }

    pub fn n_samples(&self) -> usize {
        self.inner.n_samples()
    }

    pub fn sample_rate(&self) -> f64 {
        self.inner.sample_rate()
    }

    pub fn duration(&self) -> f64 {
        self.inner.duration()
    }

    /// Track F0 with default weights and dither.
    ///
    /// # Arguments
    ///
    /// * `min_f0` - Lowest F0 in Hz (e.g., 60)
    /// * `max_f0` - Highest F0 in Hz (e.g., 240)
    /// * `frame_step` - Frame step in seconds (e.g., 0.005)
    /// * `voice_bias` - Positive values favor voiced decisions
    pub fn to_pitch_rapt(
        &self,
        min_f0: f64,
        max_f0: f64,
        frame_step: f64,
        voice_bias: f64,
    ) -> Result<Pitch, JsError> {
        let params = F0Params {
            frame_step,
            voice_bias,
            ..F0Params::with_range(min_f0, max_f0)
        };
        let inner = self
            .inner
            .to_pitch_rapt(&params, &TrackOptions::default())
            .map_err(js_error)?;
        Ok(Pitch { inner })
    }
}

/// Pitch (F0) contour.
#[wasm_bindgen]
pub struct Pitch {
    inner: RustPitch,
}

#[wasm_bindgen]
impl Pitch {
    pub fn n_frames(&self) -> usize {
        self.inner.n_frames()
    }

    pub fn time_step(&self) -> f64 {
        self.inner.time_step()
    }

    /// F0 in Hz for voiced frames, NaN for unvoiced.
    pub fn values(&self) -> Vec<f64> {
        self.inner.values_or(f64::NAN).to_vec()
    }

    pub fn times(&self) -> Vec<f64> {
        self.inner.times().to_vec()
    }

    /// 1 for voiced frames, 0 for unvoiced.
    pub fn voicing(&self) -> Vec<f64> {
        self.inner.voicing().to_vec()
    }

    pub fn rms(&self) -> Vec<f64> {
        self.inner.rms().to_vec()
    }

    pub fn peaks(&self) -> Vec<f64> {
        self.inner.peaks().to_vec()
    }
}

/// Streaming tracker for live input.
///
/// Frames come back flattened as `[f0, voicing, rms, peak]` quadruples.
#[wasm_bindgen]
pub struct Tracker {
    inner: RaptTracker,
}

#[wasm_bindgen]
impl Tracker {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64, min_f0: f64, max_f0: f64) -> Result<Tracker, JsError> {
        let inner = RaptTracker::new(sample_rate, &F0Params::with_range(min_f0, max_f0))
            .map_err(js_error)?;
        Ok(Tracker { inner })
    }

    /// Feed samples in PCM16 scale.
    pub fn push(&mut self, samples: &[f64]) -> Result<Vec<f64>, JsError> {
        let frames = self.inner.push(samples).map_err(js_error)?;
        Ok(self.flatten(&frames))
    }

    /// Flush the remaining frames and start over.
    pub fn finish(&mut self) -> Result<Vec<f64>, JsError> {
        let frames = self.inner.finish().map_err(js_error)?;
        Ok(self.flatten(&frames))
    }

    fn flatten(&self, frames: &[PitchFrame]) -> Vec<f64> {
        format_frames(
            frames,
            self.inner.session().sample_rate(),
            &OutputFormat::new(OutputMode::Full),
        )
    }
}
