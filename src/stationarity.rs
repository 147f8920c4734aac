//! Spectral stationarity between neighbouring analysis windows.
//!
//! For each frame an LPC model of the current 30 ms window is compared with
//! the window 20 ms earlier. The Itakura distance between the two gives a
//! stationarity score (`0.2 / (d - 0.8)`, so identical spectra score 1.0
//! and abrupt changes score near zero) and the ratio of their RMS energies
//! is reported alongside. Both feed the voicing transition cost.
//!
//! The analyzer keeps the last half-window of each chunk so the first
//! frames of the next chunk still have a "previous window", and a small
//! cache of recent window models so overlapping windows are not analyzed
//! twice.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::sigproc::{a_to_aca, itakura, lpc, window_energy, Window, WindowKind, MAX_LPC_ORDER};

/// Stationarity analysis window, in seconds.
pub const STAT_WINDOW: f64 = 0.030;
/// Distance between the compared windows, in seconds.
pub const STAT_INTERVAL: f64 = 0.020;

const PREEMPHASIS: f64 = 0.4;
const STABILIZATION: f64 = 30.0;

/// Per-frame results of one [`StationarityAnalyzer::analyze`] call.
#[derive(Debug, Clone, Default)]
pub struct Stat {
    pub stat: Vec<f64>,
    pub rms: Vec<f64>,
    pub rms_ratio: Vec<f64>,
}

impl Stat {
    fn resize(&mut self, n: usize) -> Result<()> {
        for v in [&mut self.stat, &mut self.rms, &mut self.rms_ratio] {
            v.clear();
            v.try_reserve(n).map_err(|e| {
                Error::StationarityUnavailable(format!("cannot hold {} frames: {}", n, e))
            })?;
            v.resize(n, 0.0);
        }
        Ok(())
    }

    fn set(&mut self, j: usize, s: Similarity) {
        self.stat[j] = s.stat;
        self.rms[j] = s.rms;
        self.rms_ratio[j] = s.rms_ratio;
    }

    pub fn len(&self) -> usize {
        self.stat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stat.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Similarity {
    stat: f64,
    rms: f64,
    rms_ratio: f64,
}

/// Neutral values for a frame with no analyzable window.
const NEUTRAL: Similarity = Similarity {
    stat: 0.002,
    rms: 0.0,
    rms_ratio: 1.0,
};

/// LPC model summary of one analysis window.
#[derive(Debug, Clone)]
struct WindowStat {
    autocorr: Vec<f64>,
    err: f64,
    rms: f64,
}

/// Recent window models, oldest first.
#[derive(Debug, Clone)]
pub struct WindowStatCache {
    capacity: usize,
    entries: VecDeque<WindowStat>,
}

impl WindowStatCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity + 1),
        }
    }

    fn save(&mut self, stat: WindowStat) {
        if self.capacity == 0 {
            return;
        }
        self.entries.push_back(stat);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// The model saved `capacity` windows ago, once that many exist.
    fn oldest(&self) -> Option<&WindowStat> {
        if self.capacity > 0 && self.entries.len() == self.capacity {
            self.entries.front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Scores window pairs; owns the windows, scratch space and model cache.
#[derive(Debug, Clone)]
struct Scorer {
    order: usize,
    lpc_window: Window,
    energy_window: Window,
    cache: WindowStatCache,
    scratch: Vec<f64>,
}

impl Scorer {
    fn model(&mut self, data: &[f64]) -> Result<WindowStat> {
        let model = lpc(
            self.order,
            STABILIZATION,
            data,
            &self.lpc_window,
            PREEMPHASIS,
            &mut self.scratch,
        )
        .ok_or_else(|| {
            Error::StationarityUnavailable(format!("LPC of order {} failed", self.order))
        })?;
        let rms = window_energy(data, &self.energy_window, &mut self.scratch);
        Ok(WindowStat {
            autocorr: model.autocorr,
            err: model.norm_err,
            rms,
        })
    }

    /// Compare `cur` with `prev` (or the cached model of the window that
    /// preceded it). `prev == None` marks the first window of a session.
    fn similarity(&mut self, prev: Option<&[f64]>, cur: &[f64]) -> Result<Similarity> {
        let model = lpc(
            self.order,
            STABILIZATION,
            cur,
            &self.lpc_window,
            PREEMPHASIS,
            &mut self.scratch,
        )
        .ok_or_else(|| {
            Error::StationarityUnavailable(format!("LPC of order {} failed", self.order))
        })?;
        let rms = window_energy(cur, &self.energy_window, &mut self.scratch);

        let (t, rms_ratio) = match prev {
            Some(prev) => {
                let cached = self.cache.oldest().cloned();
                let before = match cached {
                    Some(cached) => cached,
                    None => self.model(prev)?,
                };
                let (b, c) = a_to_aca(&model.coeffs[1..]);
                let t = itakura(&b, c, &before.autocorr[1..], before.err) - 0.8;
                let ratio = if before.rms > 0.0 {
                    (0.001 + rms) / before.rms
                } else if rms > 0.0 {
                    2.0
                } else {
                    1.0
                };
                (t, ratio)
            }
            None => (10.0, 1.0),
        };

        self.cache.save(WindowStat {
            autocorr: model.autocorr,
            err: model.norm_err,
            rms,
        });
        Ok(Similarity {
            stat: 0.2 / t,
            rms,
            rms_ratio,
        })
    }
}

/// Streaming stationarity analysis.
#[derive(Debug, Clone)]
pub struct StationarityAnalyzer {
    /// Window length in samples.
    size: usize,
    /// Gap between compared windows in samples.
    agap: usize,
    /// Offset of the window relative to the frame start (may be negative).
    ind: isize,
    /// Samples carried across chunks: half a span of history then the
    /// start of the current chunk.
    mem: Vec<f64>,
    scorer: Scorer,
    stat: Stat,
}

impl StationarityAnalyzer {
    /// Analyzer for `sample_rate` with frames `step` samples apart.
    pub fn new(sample_rate: f64, step: usize) -> Self {
        let size = (STAT_WINDOW * sample_rate) as usize;
        let agap = (STAT_INTERVAL * sample_rate) as usize;
        let ind = (agap as isize - size as isize) / 2;
        let mut order = (2.0 + sample_rate / 1000.0) as usize;
        if order > MAX_LPC_ORDER {
            log::warn!(
                "stationarity LPC order {} clamped to {}",
                order,
                MAX_LPC_ORDER
            );
            order = MAX_LPC_ORDER;
        }
        let reuse = if step > 0 { agap / step } else { 0 };
        log::debug!(
            "stationarity: window {} samples, gap {}, offset {}, order {}, model reuse {}",
            size,
            agap,
            ind,
            order,
            reuse
        );
        Self {
            size,
            agap,
            ind,
            mem: vec![0.0; size + agap],
            scorer: Scorer {
                order,
                lpc_window: Window::new(WindowKind::Hanning, size.saturating_sub(1)),
                energy_window: Window::new(WindowKind::Hanning, size),
                cache: WindowStatCache::new(reuse),
                scratch: Vec::new(),
            },
            stat: Stat::default(),
        }
    }

    /// Samples the first frame reaches past its start, or before it when
    /// negative.
    #[inline]
    pub fn window_offset(&self) -> isize {
        self.ind
    }

    #[inline]
    pub fn window_size(&self) -> usize {
        self.size
    }

    /// Forget all history: carried samples and cached models.
    pub fn reset(&mut self) {
        self.mem.fill(0.0);
        self.scorer.cache.clear();
    }

    /// Statistics for `nframes` frames `step` samples apart at the start of
    /// `data`. `first` marks the first chunk of a session.
    pub fn analyze(&mut self, data: &[f64], nframes: usize, step: usize, first: bool) -> Result<&Stat> {
        if first {
            self.reset();
        }
        self.stat.resize(nframes)?;

        let size = self.size as isize;
        let agap = self.agap as isize;
        let istep = step as isize;
        let end = data.len() as isize;
        let memsize = self.mem.len();
        let half = memsize / 2;
        let sample = |i: isize| {
            usize::try_from(i)
                .ok()
                .and_then(|i| data.get(i))
                .copied()
                .unwrap_or(0.0)
        };

        for (k, slot) in self.mem[half..].iter_mut().enumerate() {
            *slot = sample(k as isize);
        }

        for j in 0..nframes {
            let q = self.ind + j as isize * istep;
            let p = q - agap;
            let result = if p >= 0 && q >= 0 && q + size <= end {
                let (p, q) = (p as usize, q as usize);
                self.scorer
                    .similarity(Some(&data[p..p + self.size]), &data[q..q + self.size])?
            } else if first {
                if p < 0 && q >= 0 && q + size <= end {
                    let q = q as usize;
                    self.scorer.similarity(None, &data[q..q + self.size])?
                } else {
                    NEUTRAL
                }
            } else if p < 0 && q + size <= end {
                let cur = (half as isize + self.ind) as usize;
                let s = self
                    .scorer
                    .similarity(Some(&self.mem[..self.size]), &self.mem[cur..cur + self.size])?;
                if p + istep < 0 {
                    self.mem.copy_within(step..memsize, 0);
                    let r = q + size;
                    for (k, slot) in self.mem[memsize - step..].iter_mut().enumerate() {
                        *slot = sample(r + k as isize);
                    }
                }
                s
            } else {
                NEUTRAL
            };
            self.stat.set(j, result);
        }

        // keep the end of this chunk's frames as history for the next one
        let last = (nframes * step) as isize;
        for (k, slot) in self.mem[..half].iter_mut().rev().enumerate() {
            let i = last - 1 - k as isize;
            if i < 0 {
                break;
            }
            *slot = sample(i);
        }
        Ok(&self.stat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    /// Deterministic texture repeating every 320 samples (20 ms at 16 kHz).
    fn texture(i: usize) -> f64 {
        (i * 7919 % 320) as f64 / 160.0 - 1.0
    }

    /// Periodic in 320 samples, so windows one gap apart are identical.
    fn signal(n: usize, fs: f64) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64 / fs;
                4000.0 * (2.0 * PI * 150.0 * t).sin()
                    + 1500.0 * (2.0 * PI * 900.0 * t).sin()
                    + 300.0 * texture(i)
            })
            .collect()
    }

    #[test]
    fn test_geometry_at_16k() {
        let analyzer = StationarityAnalyzer::new(16000.0, 80);
        assert_eq!(analyzer.window_size(), 480);
        assert_eq!(analyzer.window_offset(), -80);
        assert_eq!(analyzer.scorer.order, 18);
        assert_eq!(analyzer.scorer.cache.capacity, 4);
    }

    #[test]
    fn test_stationary_signal_scores_near_one() {
        let fs = 16000.0;
        let data = signal(4000, fs);
        let mut analyzer = StationarityAnalyzer::new(fs, 80);
        let stat = analyzer.analyze(&data, 30, 80, true).unwrap();
        // frames whose previous window lies inside the data
        for j in 5..30 {
            assert_abs_diff_eq!(stat.stat[j], 1.0, epsilon = 1e-3);
            assert_abs_diff_eq!(stat.rms_ratio[j], 1.0, epsilon = 1e-3);
            assert!(stat.rms[j] > 0.0);
        }
    }

    #[test]
    fn test_first_window_is_neutral() {
        let fs = 16000.0;
        let data = signal(4000, fs);
        let mut analyzer = StationarityAnalyzer::new(fs, 80);
        let stat = analyzer.analyze(&data, 10, 80, true).unwrap();
        // frame 0: window starts before the data
        assert_eq!(stat.stat[0], 0.002);
        assert_eq!(stat.rms_ratio[0], 1.0);
        // frame 1: no previous window yet
        assert_abs_diff_eq!(stat.stat[1], 0.02, epsilon = 1e-12);
        assert_eq!(stat.rms_ratio[1], 1.0);
    }

    #[test]
    fn test_onset_lowers_stationarity() {
        let fs = 16000.0;
        let mut data = vec![0.0; 4000];
        for (i, v) in data.iter_mut().enumerate().skip(2000) {
            let t = i as f64 / fs;
            *v = 4000.0 * (2.0 * PI * 150.0 * t).sin() + 1500.0 * (2.0 * PI * 900.0 * t).sin();
        }
        for (i, v) in data.iter_mut().enumerate().take(2000) {
            *v = 20.0 * texture(i);
        }
        let mut analyzer = StationarityAnalyzer::new(fs, 80);
        let stat = analyzer.analyze(&data, 40, 80, true).unwrap();
        // window 1840..2320 holds the onset, its predecessor only texture
        let onset = 24;
        assert!(stat.rms_ratio[onset] > 10.0);
        assert_abs_diff_eq!(stat.stat[10], 1.0, epsilon = 1e-3);
        assert!(stat.stat[onset] < 0.8 * stat.stat[10]);
    }

    #[test]
    fn test_cache_keeps_capacity_entries() {
        let mut cache = WindowStatCache::new(2);
        for i in 0..5 {
            cache.save(WindowStat {
                autocorr: vec![1.0],
                err: i as f64,
                rms: 0.0,
            });
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.oldest().map(|w| w.err), Some(3.0));
    }
}
