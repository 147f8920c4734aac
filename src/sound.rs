//! Sound - Audio samples with sample rate.
//!
//! The input container of the tracker. Samples are stored as `f64`,
//! normalized to [-1.0, 1.0] for integer WAV formats. The tracker itself
//! works in 16-bit PCM scale, so [`Sound::to_pitch_rapt`] rescales on the
//! way in.
//!
//! # Mono Audio Only
//!
//! Multi-channel files require explicit channel selection via
//! [`Sound::from_file_channel`].

use std::io::Read;
use std::path::Path;

use ndarray::Array1;

use crate::error::{Error, Result};
use crate::params::F0Params;
use crate::pitch::{Pitch, TrackOptions};

/// Audio samples with sample rate.
///
/// # Example
///
/// ```no_run
/// use rapt::Sound;
///
/// let sound = Sound::from_file("audio.wav")?;
/// println!("Duration: {:.3}s", sound.duration());
/// # Ok::<(), rapt::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Sound {
    /// Audio samples as a 1D array.
    samples: Array1<f64>,

    /// Sample rate in Hz.
    sample_rate: f64,
}

impl Sound {
    /// Create a Sound from samples and sample rate.
    pub fn new(samples: Array1<f64>, sample_rate: f64) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Create a Sound from a slice of samples.
    ///
    /// Copies the data. Use `new()` with an Array1 to avoid the copy.
    pub fn from_slice(samples: &[f64], sample_rate: f64) -> Self {
        Self {
            samples: Array1::from_vec(samples.to_vec()),
            sample_rate,
        }
    }

    /// Load audio from a mono WAV file.
    ///
    /// Integer formats (8, 16, 24, 32 bit) are normalized to [-1.0, 1.0] by
    /// dividing by 2^(bits-1). Float formats are loaded as-is.
    ///
    /// # Errors
    ///
    /// - `Error::NotMono` if the file has more than one channel
    /// - `Error::AudioRead` if the file cannot be read
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_wav_reader(hound::WavReader::open(path)?, None)
    }

    /// Load a specific channel from a WAV file (left channel = 0).
    ///
    /// # Errors
    ///
    /// - `Error::InvalidParameter` if the channel index is out of range
    /// - `Error::AudioRead` if the file cannot be read
    pub fn from_file_channel<P: AsRef<Path>>(path: P, channel: usize) -> Result<Self> {
        Self::from_wav_reader(hound::WavReader::open(path)?, Some(channel))
    }

    /// Decode WAV data from any reader.
    ///
    /// Without a `channel` the data must be mono.
    pub fn from_wav_reader<R: Read>(reader: hound::WavReader<R>, channel: Option<usize>) -> Result<Self> {
        let spec = reader.spec();
        let n_channels = spec.channels as usize;
        let channel = match channel {
            None if n_channels != 1 => return Err(Error::NotMono(spec.channels)),
            None => 0,
            Some(c) if c >= n_channels => {
                return Err(Error::InvalidParameter(format!(
                    "Channel {} does not exist. File has {} channels.",
                    c, n_channels
                )));
            }
            Some(c) => c,
        };

        let interleaved: Vec<f64> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .map(|s| s.map(f64::from))
                .collect::<std::result::Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as f64;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f64 / max_val))
                    .collect::<std::result::Result<_, _>>()?
            }
        };

        // interleaved frames: [L0, R0, L1, R1, ...]
        let samples: Vec<f64> = interleaved
            .into_iter()
            .skip(channel)
            .step_by(n_channels)
            .collect();

        Ok(Self {
            samples: Array1::from_vec(samples),
            sample_rate: spec.sample_rate as f64,
        })
    }

    /// Get the audio samples.
    #[inline]
    pub fn samples(&self) -> &Array1<f64> {
        &self.samples
    }

    /// Get the sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Get the number of samples.
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    /// Get the total duration in seconds.
    #[inline]
    pub fn duration(&self) -> f64 {
        self.n_samples() as f64 / self.sample_rate
    }

    /// Get the sample period (1 / sample_rate).
    #[inline]
    pub fn dx(&self) -> f64 {
        1.0 / self.sample_rate
    }

    /// Compute the F0 contour with RAPT.
    ///
    /// See [`crate::pitch::sound_to_pitch_rapt`].
    pub fn to_pitch_rapt(&self, params: &F0Params, options: &TrackOptions) -> Result<Pitch> {
        crate::pitch::sound_to_pitch_rapt(self, params, options)
    }
}

impl std::fmt::Display for Sound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Sound({} samples, {} Hz, {:.3}s)",
            self.n_samples(),
            self.sample_rate,
            self.duration()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wav_bytes(channels: u16, frames: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in frames {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_mono_wav_is_normalized() {
        let bytes = wav_bytes(1, &[16384, -32768, 0]);
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let sound = Sound::from_wav_reader(reader, None).unwrap();
        assert_eq!(sound.sample_rate(), 8000.0);
        assert_eq!(sound.samples().to_vec(), vec![0.5, -1.0, 0.0]);
    }

    #[test]
    fn test_stereo_needs_channel() {
        let bytes = wav_bytes(2, &[100, 200, 300, 400]);
        let reader = hound::WavReader::new(Cursor::new(bytes.clone())).unwrap();
        assert!(matches!(
            Sound::from_wav_reader(reader, None),
            Err(Error::NotMono(2))
        ));

        let reader = hound::WavReader::new(Cursor::new(bytes.clone())).unwrap();
        let right = Sound::from_wav_reader(reader, Some(1)).unwrap();
        assert_eq!(right.n_samples(), 2);
        assert_eq!(right.samples()[1], 400.0 / 32768.0);

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            Sound::from_wav_reader(reader, Some(2)),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_duration() {
        let sound = Sound::from_slice(&[0.0; 8000], 16000.0);
        assert_eq!(sound.duration(), 0.5);
        assert_eq!(sound.to_string(), "Sound(8000 samples, 16000 Hz, 0.500s)");
    }
}
