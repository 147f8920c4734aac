//! Python bindings for rapt using PyO3.
//!
//! Mirrors the wasm bindings: a `Sound` that tracks a whole signal, the
//! resulting `Pitch`, and a streaming `Tracker`.
//!
//! # Usage from Python
//!
//! ```python
//! import rapt
//!
//! sound = rapt.Sound("audio.wav")
//! pitch = sound.to_pitch_rapt(min_f0=60, max_f0=240)
//! times = pitch.xs()
//! frequencies = pitch.selected_array['frequency']   # NaN when unvoiced
//!
//! # live input, samples in PCM16 scale
//! tracker = rapt.Tracker(16000, min_f0=60, max_f0=240)
//! frames = tracker.push(block)   # shape (n, 4): f0, voicing, rms, peak
//! frames = tracker.finish()
//! ```
//!
//! # Building
//!
//! ```bash
//! maturin develop --features python
//! ```

use std::path::PathBuf;

use numpy::{PyArray1, PyArray2, PyArrayMethods, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::output::{format_frames, OutputFormat, OutputMode};
use crate::params::F0Params;
use crate::pitch::{Pitch as RustPitch, PitchFrame, TrackOptions};
use crate::session::RaptTracker;
use crate::sound::Sound as RustSound;

fn value_error(e: crate::Error) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Audio samples with sample rate.
///
/// Examples
/// --------
/// >>> sound = rapt.Sound("audio.wav")
/// >>> sound = rapt.Sound(samples, sampling_frequency=16000)
#[pyclass(name = "Sound")]
pub struct PySound {
    inner: RustSound,
}

#[pymethods]
impl PySound {
    /// Create a Sound from a WAV path or a numpy array in [-1, 1].
    #[new]
    #[pyo3(signature = (path_or_samples, sampling_frequency=None))]
    fn new(
        py: Python<'_>,
        path_or_samples: PyObject,
        sampling_frequency: Option<f64>,
    ) -> PyResult<Self> {
        if let Ok(path_str) = path_or_samples.extract::<String>(py) {
            let sound = RustSound::from_file(PathBuf::from(&path_str)).map_err(|e| {
                PyValueError::new_err(format!("Failed to load audio file: {}", e))
            })?;
            return Ok(PySound { inner: sound });
        }

        if let Ok(arr) = path_or_samples.extract::<Bound<'_, PyArray1<f64>>>(py) {
            let sample_rate = sampling_frequency.ok_or_else(|| {
                PyValueError::new_err("sampling_frequency is required when providing samples array")
            })?;
            let samples: Vec<f64> = arr.to_vec()?;
            return Ok(PySound {
                inner: RustSound::from_slice(&samples, sample_rate),
            });
        }

        Err(PyValueError::new_err(
            "path_or_samples must be a file path string or numpy array",
        ))
    }

    /// Load one channel of a multi-channel WAV file (0 = left).
    #[staticmethod]
    fn from_file_channel(path: &str, channel: usize) -> PyResult<Self> {
        let sound = RustSound::from_file_channel(path, channel).map_err(|e| {
            PyValueError::new_err(format!("Failed to load audio file: {}", e))
        })?;
        Ok(PySound { inner: sound })
    }

    #[getter]
    fn n_samples(&self) -> usize {
        self.inner.n_samples()
    }

    #[getter]
    fn sampling_frequency(&self) -> f64 {
        self.inner.sample_rate()
    }

    #[getter]
    fn duration(&self) -> f64 {
        self.inner.duration()
    }

    /// Get the audio samples as a numpy array.
    fn values<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.inner.samples().to_vec().to_pyarray(py)
    }

    /// Track F0 with RAPT.
    ///
    /// Parameters
    /// ----------
    /// min_f0, max_f0 : float
    ///     F0 search range in Hz
    /// frame_step : float
    ///     Frame step in seconds
    /// voice_bias : float
    ///     Positive values favor voiced decisions
    /// dither : float
    ///     Dither amplitude in 16-bit PCM units (0 disables)
    #[pyo3(signature = (min_f0=60.0, max_f0=240.0, frame_step=0.005, voice_bias=0.0, dither=50.0))]
    fn to_pitch_rapt(
        &self,
        min_f0: f64,
        max_f0: f64,
        frame_step: f64,
        voice_bias: f64,
        dither: f64,
    ) -> PyResult<PyPitch> {
        let params = F0Params {
            frame_step,
            voice_bias,
            ..F0Params::with_range(min_f0, max_f0)
        };
        let options = TrackOptions {
            dither,
            ..TrackOptions::default()
        };
        let inner = self
            .inner
            .to_pitch_rapt(&params, &options)
            .map_err(value_error)?;
        Ok(PyPitch { inner })
    }

    fn __repr__(&self) -> String {
        self.inner.to_string()
    }
}

/// Pitch (F0) contour.
#[pyclass(name = "Pitch")]
pub struct PyPitch {
    inner: RustPitch,
}

#[pymethods]
impl PyPitch {
    #[getter]
    fn n_frames(&self) -> usize {
        self.inner.n_frames()
    }

    #[getter]
    fn time_step(&self) -> f64 {
        self.inner.time_step()
    }

    /// Frame times in seconds.
    fn xs<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.inner.times().to_vec().to_pyarray(py)
    }

    /// F0 in Hz, NaN for unvoiced frames.
    fn values<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.inner.values_or(f64::NAN).to_vec().to_pyarray(py)
    }

    /// Dict with 'frequency' (NaN when unvoiced) and 'strength' (peak).
    #[getter]
    fn selected_array<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new(py);
        dict.set_item("frequency", self.values(py))?;
        dict.set_item("strength", self.inner.peaks().to_vec().to_pyarray(py))?;
        Ok(dict)
    }

    fn voicing<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.inner.voicing().to_vec().to_pyarray(py)
    }

    fn rms<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.inner.rms().to_vec().to_pyarray(py)
    }

    /// F0 at `time`, linearly interpolated; None when unvoiced.
    fn get_value_at_time(&self, time: f64) -> Option<f64> {
        self.inner
            .get_value_at_time(time, crate::pitch::Interpolation::Linear)
    }

    fn __repr__(&self) -> String {
        format!(
            "Pitch({} frames, {:.3}s step, {:.0}-{:.0} Hz)",
            self.inner.n_frames(),
            self.inner.time_step(),
            self.inner.pitch_floor(),
            self.inner.pitch_ceiling()
        )
    }
}

/// Streaming tracker for samples in 16-bit PCM scale.
#[pyclass(name = "Tracker")]
pub struct PyTracker {
    inner: RaptTracker,
}

impl PyTracker {
    fn to_rows<'py>(&self, py: Python<'py>, frames: &[PitchFrame]) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let format = OutputFormat::new(OutputMode::Full);
        let flat = format_frames(frames, self.inner.session().sample_rate(), &format);
        let rows = flat.len() / format.mode.width();
        flat.to_pyarray(py).reshape([rows, format.mode.width()])
    }
}

#[pymethods]
impl PyTracker {
    #[new]
    #[pyo3(signature = (sampling_frequency, min_f0=60.0, max_f0=240.0))]
    fn new(sampling_frequency: f64, min_f0: f64, max_f0: f64) -> PyResult<Self> {
        let inner = RaptTracker::new(sampling_frequency, &F0Params::with_range(min_f0, max_f0))
            .map_err(value_error)?;
        Ok(PyTracker { inner })
    }

    /// Feed samples; returns the finalized frames as rows of
    /// (f0, voicing, rms, peak).
    fn push<'py>(
        &mut self,
        py: Python<'py>,
        samples: Bound<'py, PyArray1<f64>>,
    ) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let samples: Vec<f64> = samples.to_vec()?;
        let frames = self.inner.push(&samples).map_err(value_error)?;
        self.to_rows(py, &frames)
    }

    /// Flush the remaining frames and start over.
    fn finish<'py>(&mut self, py: Python<'py>) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let frames = self.inner.finish().map_err(value_error)?;
        self.to_rows(py, &frames)
    }
}

/// rapt - Streaming RAPT F0 tracking.
#[pymodule]
fn rapt(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PySound>()?;
    m.add_class::<PyPitch>()?;
    m.add_class::<PyTracker>()?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
