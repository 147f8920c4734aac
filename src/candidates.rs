//! Per-frame pitch candidates.
//!
//! Candidates come from a two-pass correlation search:
//!
//! 1. A coarse normalized cross-correlation over the whole lag range on the
//!    decimated signal. Local maxima above `cand_thresh * max` are refined
//!    by parabolic interpolation and mapped back to full-rate lags.
//! 2. A fine pass at the full rate, evaluated only in 7-lag patches around
//!    the coarse candidates. Its local maxima are the frame's candidates.
//!
//! Both passes apply the same pruning: when a frame yields `n_cands` or more
//! peaks, only the `n_cands - 1` strongest are kept, leaving room for the
//! unvoiced hypothesis added by the dynamic program.

use crate::sigproc::{CorrelationPeak, CrossCorrelator};

/// Width of the fine-pass correlation patch, in lags.
pub const PATCH_LAGS: usize = 7;

/// Correlation values of one analysis window over a lag range.
#[derive(Debug, Clone, Default)]
pub struct Cross {
    /// `correl[i]` is the normalized correlation at lag `first_lag + i`.
    pub correl: Vec<f64>,
    pub first_lag: usize,
    pub max_val: f64,
    pub max_loc: Option<usize>,
    /// RMS of the mean-removed reference window.
    pub rms: f64,
}

impl Cross {
    pub fn new(nlags: usize) -> Self {
        Self {
            correl: vec![0.0; nlags],
            ..Self::default()
        }
    }

    #[inline]
    pub fn nlags(&self) -> usize {
        self.correl.len()
    }

    /// Correlation at an absolute lag, if it lies in range.
    pub fn at(&self, lag: usize) -> Option<f64> {
        lag.checked_sub(self.first_lag)
            .and_then(|i| self.correl.get(i).copied())
    }

    fn record(&mut self, peak: CorrelationPeak, first_lag: usize, size: usize) {
        self.first_lag = first_lag;
        self.max_val = peak.value;
        self.max_loc = peak.lag;
        self.rms = (peak.energy / size.max(1) as f64).sqrt();
    }
}

/// A correlation peak: lag in samples and its strength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub lag: usize,
    pub value: f64,
}

/// Collect local maxima of `cross` above `thresh * cross.max_val`.
///
/// A sample counts as a peak when it is at least as large as both
/// neighbors, so shoulders and plateaus qualify. The first and the last two
/// lags are never reported.
pub fn find_peaks(cross: &Cross, thresh: f64, peaks: &mut Vec<Peak>) {
    peaks.clear();
    let c = &cross.correl;
    let clip = thresh * cross.max_val;
    for i in 1..c.len().saturating_sub(2) {
        let q = c[i];
        if q > clip && q >= c[i + 1] && q >= c[i - 1] {
            peaks.push(Peak {
                lag: i + cross.first_lag,
                value: q,
            });
        }
    }
}

/// Vertex of the parabola through `(-1, y[0]), (0, y[1]), (1, y[2])`.
///
/// Returns `(offset, value)`; a flat parabola gives `(0, y[1])`.
pub fn parabolic_peak(y: &[f64]) -> (f64, f64) {
    let (y0, y1, y2) = (y[0], y[1], y[2]);
    let a = (y2 - y1) + 0.5 * (y0 - y2);
    if a.abs() > 0.000001 {
        let xp = (y0 - y2) / (4.0 * a);
        (xp, y1 - a * xp * xp)
    } else {
        (0.0, y1)
    }
}

/// Keep the `keep` strongest peaks, strongest first.
///
/// Partial bubble sort from the back: each pass floats the strongest
/// remaining peak to the front.
pub fn keep_strongest(peaks: &mut Vec<Peak>, keep: usize) {
    let n = peaks.len();
    if n == 0 {
        return;
    }
    for pass in 0..keep.min(n) {
        for i in (pass + 1..n).rev() {
            if peaks[i].value > peaks[i - 1].value {
                peaks.swap(i, i - 1);
            }
        }
    }
    peaks.truncate(keep);
}

/// Lag-search geometry shared by every frame of a session.
#[derive(Debug, Clone, Copy)]
pub struct SearchRange {
    /// Correlation window length in samples.
    pub size: usize,
    /// Shortest lag searched.
    pub start: usize,
    pub nlags: usize,
}

/// Two-pass candidate search with reusable buffers.
#[derive(Debug, Clone)]
pub struct CandidateExtractor {
    range: SearchRange,
    cand_thresh: f64,
    /// `lag_weight / nlags`
    lag_weight: f64,
    n_cands: usize,
    correlator: CrossCorrelator,
    coarse: Cross,
    peaks: Vec<Peak>,
    locs: Vec<usize>,
}

impl CandidateExtractor {
    pub fn new(range: SearchRange, cand_thresh: f64, lag_weight: f64, n_cands: usize) -> Self {
        Self {
            range,
            cand_thresh,
            lag_weight: lag_weight / range.nlags as f64,
            n_cands,
            correlator: CrossCorrelator::new(),
            coarse: Cross::default(),
            peaks: Vec::new(),
            locs: Vec::new(),
        }
    }

    /// Candidates for one frame.
    ///
    /// `signal` starts at the frame's first sample at the full rate and
    /// `coarse` at the same instant in the signal decimated by `decimate`
    /// (pass the full-rate signal with `decimate == 1` to skip decimation).
    /// The full-rate correlation is left in `cross` for the final lag
    /// refinement; the returned peaks are at most `n_cands - 1`.
    pub fn extract(
        &mut self,
        signal: &[f64],
        coarse: &[f64],
        decimate: usize,
        cross: &mut Cross,
    ) -> &[Peak] {
        let SearchRange { size, start, nlags } = self.range;
        let dec = decimate.max(1);
        let dec_nlags = 1 + nlags / dec;
        let dec_start = (start / dec).max(1);
        let dec_size = 1 + size / dec;

        self.coarse.correl.resize(dec_nlags, 0.0);
        let peak = self.correlator.full(
            coarse,
            dec_size,
            dec_start,
            dec_nlags,
            &mut self.coarse.correl,
        );
        self.coarse.record(peak, dec_start, dec_size);
        find_peaks(&self.coarse, self.cand_thresh, &mut self.peaks);

        // back to the full rate
        for p in &mut self.peaks {
            let j = p.lag - dec_start - 1;
            let (xp, yp) = parabolic_peak(&self.coarse.correl[j..j + 3]);
            let refined = (p.lag * dec) as isize + (0.5 + xp * dec as f64) as isize;
            p.lag = refined.max(0) as usize;
            p.value = yp * (1.0 - self.lag_weight * p.lag as f64);
        }
        if self.peaks.len() >= self.n_cands {
            keep_strongest(&mut self.peaks, self.n_cands - 1);
        }

        self.locs.clear();
        self.locs.extend(self.peaks.iter().map(|p| p.lag));
        if cross.correl.len() < nlags {
            cross.correl.resize(nlags, 0.0);
        }
        let peak = self.correlator.patches(
            signal,
            size,
            start,
            nlags,
            PATCH_LAGS,
            &self.locs,
            &mut cross.correl,
        );
        cross.record(peak, start, size);
        log::trace!(
            "frame: coarse max {:.3} at {:?}, fine max {:.3} at {:?}, rms {:.1}",
            self.coarse.max_val,
            self.coarse.max_loc,
            cross.max_val,
            cross.max_loc,
            cross.rms
        );

        find_peaks(cross, self.cand_thresh, &mut self.peaks);
        if self.peaks.len() >= self.n_cands {
            keep_strongest(&mut self.peaks, self.n_cands - 1);
        }
        &self.peaks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    fn cross_from(values: &[f64], first_lag: usize) -> Cross {
        let max_val = values.iter().cloned().fold(0.0, f64::max);
        Cross {
            correl: values.to_vec(),
            first_lag,
            max_val,
            max_loc: None,
            rms: 0.0,
        }
    }

    #[test]
    fn test_plateaus_and_shoulders_are_peaks() {
        let cross = cross_from(&[0.0, 0.5, 0.5, 0.2, 0.9, 0.3, 0.1, 0.0], 10);
        let mut peaks = Vec::new();
        find_peaks(&cross, 0.3, &mut peaks);
        let lags: Vec<usize> = peaks.iter().map(|p| p.lag).collect();
        assert_eq!(lags, vec![11, 12, 14]);
    }

    #[test]
    fn test_peaks_below_threshold_dropped() {
        let cross = cross_from(&[0.0, 0.2, 0.0, 0.9, 0.0, 0.0], 0);
        let mut peaks = Vec::new();
        find_peaks(&cross, 0.3, &mut peaks);
        assert_eq!(peaks, vec![Peak { lag: 3, value: 0.9 }]);
    }

    #[test]
    fn test_parabolic_peak_symmetric() {
        let (xp, yp) = parabolic_peak(&[0.5, 1.0, 0.5]);
        assert_eq!(xp, 0.0);
        assert_abs_diff_eq!(yp, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_parabolic_peak_offset() {
        // y = 1 - (x - 0.25)^2
        let f = |x: f64| 1.0 - (x - 0.25) * (x - 0.25);
        let (xp, yp) = parabolic_peak(&[f(-1.0), f(0.0), f(1.0)]);
        assert_abs_diff_eq!(xp, 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(yp, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_keep_strongest_orders_by_value() {
        let mut peaks: Vec<Peak> = [0.4, 0.9, 0.1, 0.7, 0.8]
            .iter()
            .enumerate()
            .map(|(i, &value)| Peak { lag: i, value })
            .collect();
        keep_strongest(&mut peaks, 3);
        let values: Vec<f64> = peaks.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![0.9, 0.8, 0.7]);
    }

    #[test]
    fn test_extract_finds_period_of_sine() {
        let fs = 16000.0;
        let f0 = 125.0; // 128-sample period
        let signal: Vec<f64> = (0..1200)
            .map(|i| 6000.0 * (2.0 * PI * f0 * i as f64 / fs).sin())
            .collect();
        let range = SearchRange {
            size: 120,
            start: 67,
            nlags: 200,
        };
        let mut extractor = CandidateExtractor::new(range, 0.3, 0.3, 20);
        let mut cross = Cross::new(range.nlags);
        let peaks = extractor.extract(&signal, &signal, 1, &mut cross).to_vec();
        // one and two periods, in lag order
        let lags: Vec<usize> = peaks.iter().map(|p| p.lag).collect();
        assert_eq!(lags, vec![128, 256]);
        assert!(cross.max_val > 0.99);
        assert_eq!(cross.at(128), Some(peaks[0].value));
    }

    #[test]
    fn test_extract_on_silence_yields_nothing() {
        let range = SearchRange {
            size: 120,
            start: 67,
            nlags: 200,
        };
        let mut extractor = CandidateExtractor::new(range, 0.3, 0.3, 20);
        let mut cross = Cross::new(range.nlags);
        let silence = vec![0.0; 1000];
        let coarse = vec![0.0; 125];
        assert!(extractor.extract(&silence, &coarse, 8, &mut cross).is_empty());
        assert_eq!(cross.max_val, 0.0);
    }
}
