//! Conversion of tracked frames into flat output streams.

use serde::{Deserialize, Serialize};

use crate::pitch::PitchFrame;

/// What to write for each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Pitch period in samples.
    Period,
    /// F0 in Hz.
    #[default]
    F0,
    /// Natural log of F0.
    LogF0,
    /// F0, voicing flag, RMS and correlation peak, four values per frame.
    Full,
}

impl OutputMode {
    /// Values written per frame.
    pub fn width(self) -> usize {
        match self {
            OutputMode::Full => 4,
            _ => 1,
        }
    }
}

/// Output mode plus the values that stand in for unvoiced frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputFormat {
    pub mode: OutputMode,
    /// Unvoiced value for period and F0 output.
    pub unvoiced_value: f64,
    /// Unvoiced value for log F0 output.
    pub log_unvoiced: f64,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            mode: OutputMode::F0,
            unvoiced_value: 0.0,
            log_unvoiced: -1.0e10,
        }
    }
}

impl OutputFormat {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

/// Flatten `frames` into `format.mode.width()` values per frame.
pub fn format_frames(frames: &[PitchFrame], sample_rate: f64, format: &OutputFormat) -> Vec<f64> {
    let mut out = Vec::with_capacity(frames.len() * format.mode.width());
    for f in frames {
        let voiced = f.voiced && f.frequency > 0.0;
        match format.mode {
            OutputMode::Period => out.push(if voiced {
                sample_rate / f.frequency
            } else {
                format.unvoiced_value
            }),
            OutputMode::F0 => out.push(if voiced {
                f.frequency
            } else {
                format.unvoiced_value
            }),
            OutputMode::LogF0 => out.push(if voiced {
                f.frequency.ln()
            } else {
                format.log_unvoiced
            }),
            OutputMode::Full => out.extend_from_slice(&[
                f.frequency,
                if voiced { 1.0 } else { 0.0 },
                f.rms,
                f.peak,
            ]),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn frames() -> Vec<PitchFrame> {
        vec![
            PitchFrame {
                frequency: 200.0,
                voiced: true,
                rms: 1200.0,
                peak: 0.95,
            },
            PitchFrame::silent(),
        ]
    }

    #[test]
    fn test_modes() {
        let fs = 16000.0;
        assert_eq!(
            format_frames(&frames(), fs, &OutputFormat::new(OutputMode::Period)),
            vec![80.0, 0.0]
        );
        assert_eq!(
            format_frames(&frames(), fs, &OutputFormat::default()),
            vec![200.0, 0.0]
        );
        let log = format_frames(&frames(), fs, &OutputFormat::new(OutputMode::LogF0));
        assert_relative_eq!(log[0], 200.0f64.ln());
        assert_eq!(log[1], -1.0e10);
        assert_eq!(
            format_frames(&frames(), fs, &OutputFormat::new(OutputMode::Full)),
            vec![200.0, 1.0, 1200.0, 0.95, 0.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_custom_unvoiced_value() {
        let format = OutputFormat {
            unvoiced_value: -1.0,
            ..OutputFormat::default()
        };
        assert_eq!(format_frames(&frames(), 16000.0, &format), vec![200.0, -1.0]);
    }

    #[test]
    fn test_mode_from_json() {
        let format: OutputFormat = serde_json::from_str(r#"{"mode": "logf0"}"#).unwrap();
        assert_eq!(format.mode, OutputMode::LogF0);
        assert_eq!(format.log_unvoiced, -1.0e10);
    }
}
