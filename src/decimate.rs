//! Streaming low-pass decimator.
//!
//! A linear-phase FIR filter (Hanning-windowed sinc, cutoff `0.5/d`)
//! followed by keeping every `d`-th output. Filter memory is carried across
//! calls so consecutive chunks filter as one continuous signal.

use std::f64::consts::PI;

use crate::error::{Error, Result};

/// Position of a chunk within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkEdge {
    /// First chunk: filter memory starts at zero.
    First,
    /// Interior chunk: memory comes from the previous call.
    Middle,
    /// Last chunk: the tail of the signal is flushed through the filter.
    Last,
}

/// Half of a symmetric low-pass FIR, `coeffs[0]` being the center tap.
///
/// `taps` is forced odd. Returns the `(taps + 1) / 2` unique coefficients.
pub fn lowpass_half(taps: usize, cutoff: f64) -> Vec<f64> {
    let taps = taps | 1;
    let n = (taps + 1) / 2;
    let mut coef = vec![0.0; n];
    coef[0] = 2.0 * cutoff;
    let twopi = 2.0 * PI;
    for (i, c) in coef.iter_mut().enumerate().skip(1) {
        let x = i as f64;
        *c = (x * twopi * cutoff).sin() / (PI * x);
    }
    // Hanning taper, applied from the outermost tap inward
    let fn_ = twopi / taps as f64;
    for i in 0..n {
        coef[n - 1 - i] *= 0.5 - 0.5 * (fn_ * (i as f64 + 0.5)).cos();
    }
    coef
}

/// Decimating FIR filter with streaming state.
#[derive(Debug, Clone)]
pub struct Decimator {
    factor: usize,
    half: usize,
    /// Full symmetric impulse response.
    coeffs: Vec<f64>,
    state: Vec<f64>,
    mem: Vec<f64>,
    output: Vec<f64>,
}

impl Decimator {
    /// Design the filter for `factor` at `sample_rate`.
    ///
    /// The filter spans about 5 ms. Fails with `Error::FilterComputation`
    /// when the cutoff is degenerate or the filter is too short to
    /// decimate by `factor`.
    pub fn new(sample_rate: f64, factor: usize) -> Result<Self> {
        let mut decimator = Self {
            factor: 0,
            half: 0,
            coeffs: Vec::new(),
            state: Vec::new(),
            mem: Vec::new(),
            output: Vec::new(),
        };
        decimator.configure(sample_rate, factor)?;
        Ok(decimator)
    }

    /// Redesign the filter if `factor` changed. Clears filter memory.
    pub fn configure(&mut self, sample_rate: f64, factor: usize) -> Result<()> {
        if factor != self.factor || self.coeffs.is_empty() {
            if factor < 2 {
                return Err(Error::FilterComputation(format!(
                    "decimation factor must be at least 2, got {}",
                    factor
                )));
            }
            let cutoff = 0.5 / factor as f64;
            let taps = ((sample_rate * 0.005) as usize) | 1;
            if !(cutoff > 0.0 && cutoff < 0.5) || taps < 3 || factor >= taps {
                return Err(Error::FilterComputation(format!(
                    "degenerate low-pass design: {} taps, cutoff {} for factor {}",
                    taps, cutoff, factor
                )));
            }
            let half_coeffs = lowpass_half(taps, cutoff);
            let half = half_coeffs.len();
            self.coeffs.clear();
            self.coeffs.extend(half_coeffs[1..].iter().rev());
            self.coeffs.extend_from_slice(&half_coeffs);
            self.half = half;
            self.factor = factor;
            log::debug!(
                "decimator: factor {}, {} taps, cutoff {:.4}",
                factor,
                self.coeffs.len(),
                cutoff
            );
        }
        self.reset();
        Ok(())
    }

    /// Forget filter memory.
    pub fn reset(&mut self) {
        self.state.clear();
        self.state.resize(self.half.saturating_sub(1), 0.0);
    }

    #[inline]
    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Number of filter taps.
    #[inline]
    pub fn taps(&self) -> usize {
        self.coeffs.len()
    }

    /// Filter and decimate `input`, producing `out_len` samples.
    ///
    /// `resume_at` is the input index where the next chunk will start; the
    /// samples just before it become the filter memory for that chunk.
    /// A [`ChunkEdge::Last`] call also flushes the remaining input through
    /// the filter and appends those samples.
    pub fn process(
        &mut self,
        input: &[f64],
        out_len: usize,
        resume_at: usize,
        edge: ChunkEdge,
    ) -> &[f64] {
        self.output.clear();
        if input.is_empty() || out_len == 0 {
            return &self.output;
        }
        let half = self.half;
        let skip = self.factor;
        let sample = |i: usize| input.get(i).copied().unwrap_or(0.0);

        self.mem.clear();
        if edge == ChunkEdge::First {
            self.mem.resize(half - 1, 0.0);
        } else {
            self.mem.extend_from_slice(&self.state);
        }
        self.mem.extend((0..half).map(sample));
        let mut next = half;

        for _ in 0..out_len {
            let y = Self::convolve(&self.coeffs, &mut self.mem, skip, || {
                let v = sample(next);
                next += 1;
                v
            });
            self.output.push(y);
        }

        if edge == ChunkEdge::Last {
            let resid = input.len().saturating_sub(out_len * skip);
            for _ in 0..resid / skip {
                let y = Self::convolve(&self.coeffs, &mut self.mem, skip, || 0.0);
                self.output.push(y);
            }
        } else {
            self.state.clear();
            self.state.extend(
                (0..half - 1).map(|i| (resume_at + i).checked_sub(half - 1).map_or(0.0, sample)),
            );
        }
        &self.output
    }

    /// One output sample, then slide the window by `skip` new samples.
    fn convolve(coeffs: &[f64], mem: &mut [f64], skip: usize, mut feed: impl FnMut() -> f64) -> f64 {
        let taps = coeffs.len();
        let sum = coeffs.iter().zip(mem.iter()).map(|(c, m)| c * m).sum();
        mem.copy_within(skip..taps, 0);
        for slot in &mut mem[taps - skip..] {
            *slot = feed();
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_lowpass_has_unit_dc_gain() {
        let half = lowpass_half(81, 0.0625);
        let dc = half[0] + 2.0 * half[1..].iter().sum::<f64>();
        assert_abs_diff_eq!(dc, 1.0, epsilon = 0.01);
    }

    #[test]
    fn test_degenerate_factor_rejected() {
        assert!(matches!(
            Decimator::new(16000.0, 1),
            Err(Error::FilterComputation(_))
        ));
        // 0.005 s at 200 Hz is a single tap
        assert!(matches!(
            Decimator::new(200.0, 2),
            Err(Error::FilterComputation(_))
        ));
    }

    #[test]
    fn test_constant_passes_through() {
        let mut dec = Decimator::new(16000.0, 8).unwrap();
        assert_eq!(dec.taps(), 81);
        let input = vec![1000.0; 1600];
        let out = dec.process(&input, 200, 800, ChunkEdge::First).to_vec();
        assert_eq!(out.len(), 200);
        // away from the zero-filled start and the end of the input
        for &v in &out[10..190] {
            assert_abs_diff_eq!(v, 1000.0, epsilon = 10.0);
        }
    }

    #[test]
    fn test_chunks_match_single_pass() {
        let fs = 16000.0;
        let input: Vec<f64> = (0..4000)
            .map(|i| 3000.0 * (2.0 * PI * 180.0 * i as f64 / fs).sin() + (i % 7) as f64 * 50.0)
            .collect();

        let mut whole = Decimator::new(fs, 8).unwrap();
        let reference = whole.process(&input, 400, 0, ChunkEdge::First).to_vec();

        let mut chunked = Decimator::new(fs, 8).unwrap();
        let resume = 1600;
        let first = chunked
            .process(&input[..2400], 200, resume, ChunkEdge::First)
            .to_vec();
        let second = chunked
            .process(&input[resume..], 200, resume, ChunkEdge::Middle)
            .to_vec();

        assert_eq!(first[..200], reference[..200]);
        assert_eq!(second[..], reference[200..400]);
    }

    #[test]
    fn test_last_chunk_flushes_tail() {
        let mut dec = Decimator::new(16000.0, 8).unwrap();
        let input = vec![100.0; 800];
        let out = dec.process(&input, 90, 0, ChunkEdge::Last);
        // 800 - 90*8 = 80 remaining samples -> 10 extra outputs
        assert_eq!(out.len(), 100);
    }
}
