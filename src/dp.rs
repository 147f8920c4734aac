//! Dynamic-programming path selection.
//!
//! Every frame carries its voiced candidates plus one unvoiced hypothesis.
//! Path costs accumulate as
//!
//! ```text
//! dp[i][k] = min_j (transition(j, k) + dp[i-1][j]) + local(k)
//! ```
//!
//! with local costs from the correlation peaks and transition costs from
//! frequency continuity (voiced to voiced) or from the stationarity
//! features (voicing changes). Output is produced by tracing back-pointers
//! from a frame where the paths of all current candidates have merged.

use crate::candidates::Peak;
use crate::params::F0Params;
use crate::pitch::PitchFrame;
use crate::ring::{DpCandidate, Dprec, FrameRing};

/// Cost weights derived once per session.
#[derive(Debug, Clone, Copy)]
pub struct DpWeights {
    /// `lag_weight / nlags`
    pub lag_weight: f64,
    /// `freq_weight / frame_interval`
    pub freq_weight: f64,
    pub trans_cost: f64,
    pub trans_amp: f64,
    pub trans_spec: f64,
    pub voice_bias: f64,
    pub double_cost: f64,
}

impl DpWeights {
    pub fn new(params: &F0Params, frame_interval: f64, nlags: usize) -> Self {
        Self {
            lag_weight: params.lag_weight / nlags as f64,
            freq_weight: params.freq_weight / frame_interval,
            trans_cost: params.trans_cost,
            trans_amp: params.trans_amp,
            trans_spec: params.trans_spec,
            voice_bias: params.voice_bias,
            double_cost: params.double_cost,
        }
    }

    /// Cost of moving from hypothesis `from` to `to` between two frames.
    ///
    /// `stat` and `rms_ratio` describe the current frame.
    pub fn transition(&self, from: Option<usize>, to: Option<usize>, stat: f64, rms_ratio: f64) -> f64 {
        match (from, to) {
            (Some(prev), Some(cur)) => {
                let d = (cur as f64 / prev as f64).ln();
                let ln2 = std::f64::consts::LN_2;
                let t = d
                    .abs()
                    .min(self.double_cost + (d + ln2).abs())
                    .min(self.double_cost + (d - ln2).abs());
                t * self.freq_weight
            }
            (None, Some(_)) => {
                self.trans_cost + self.trans_spec * stat + self.trans_amp / rms_ratio
            }
            (Some(_), None) => {
                self.trans_cost + self.trans_spec * stat + self.trans_amp * rms_ratio
            }
            (None, None) => 0.0,
        }
    }

    /// Fill `dp` with the voiced `peaks` and the unvoiced hypothesis.
    ///
    /// `max_val` is the frame's highest correlation.
    pub fn load_candidates(&self, dp: &mut Dprec, peaks: &[Peak], max_val: f64) {
        dp.cands.clear();
        dp.cands.extend(peaks.iter().map(|p| DpCandidate {
            lag: Some(p.lag),
            peak: p.value,
            local_cost: 1.0 - p.value * (1.0 - p.lag as f64 * self.lag_weight),
            path_cost: 0.0,
            back: 0,
        }));
        dp.cands.push(DpCandidate {
            lag: None,
            peak: max_val,
            local_cost: self.voice_bias + max_val,
            path_cost: 0.0,
            back: 0,
        });
    }

    /// Accumulate path costs of `cur` given the previous frame.
    ///
    /// Without a previous frame the path cost is the local cost.
    pub fn accumulate(&self, cur: &mut Dprec, prev: Option<&Dprec>, stat: f64, rms_ratio: f64) {
        let prev = match prev {
            Some(prev) if !prev.cands.is_empty() => prev,
            _ => {
                for c in &mut cur.cands {
                    c.path_cost = c.local_cost;
                    c.back = 0;
                }
                return;
            }
        };
        for c in &mut cur.cands {
            let mut best = f64::MAX;
            let mut back = 0;
            for (j, p) in prev.cands.iter().enumerate() {
                let err = self.transition(p.lag, c.lag, stat, rms_ratio) + p.path_cost;
                if err < best {
                    best = err;
                    back = j;
                }
            }
            c.path_cost = best + c.local_cost;
            c.back = back;
        }
    }
}

/// Find the most recent frame where the paths of all head candidates merge.
///
/// Returns the frame index and the candidate all paths pass through there,
/// or `None` when the paths stay apart all the way back to the tail.
pub fn find_convergence(ring: &FrameRing) -> Option<(usize, usize)> {
    let tail = ring.tail();
    let mut frame = ring.head();
    if frame == tail {
        return None;
    }
    let mut paths: Vec<usize> = ring.frame(frame).dp.cands.iter().map(|c| c.back).collect();
    loop {
        frame = ring.prev(frame);
        if let Some(&first) = paths.first() {
            if paths.iter().all(|&p| p == first) {
                return Some((frame, first));
            }
        }
        let cands = &ring.frame(frame).dp.cands;
        for p in &mut paths {
            *p = cands[*p].back;
        }
        if frame == tail {
            return None;
        }
    }
}

/// Analysis constants needed to turn a lag into a frequency.
#[derive(Debug, Clone, Copy)]
pub struct LagRange {
    pub sample_rate: f64,
    pub start: usize,
    pub stop: usize,
}

/// Trace back from candidate `cand` of frame `from` down to the tail.
///
/// Frames are returned newest first. The lag of a voiced frame strictly
/// inside the search range is refined by a parabola through the frame's
/// correlation at the neighbouring lags.
pub fn backtrack(ring: &FrameRing, from: usize, cand: usize, range: LagRange) -> Vec<PitchFrame> {
    let mut out = Vec::with_capacity(ring.span());
    let mut frame = from;
    let mut cand = cand;
    loop {
        let f = ring.frame(frame);
        let c = f.dp.cands[cand];
        out.push(match c.lag {
            Some(lag) if lag > 0 => {
                let mut period = lag as f64;
                if lag > range.start && lag < range.stop {
                    let around = (f.cross.at(lag - 1), f.cross.at(lag), f.cross.at(lag + 1));
                    if let (Some(before), Some(max), Some(after)) = around {
                        let den = 2.0 * (after + before - 2.0 * max);
                        if den.abs() > 0.000001 {
                            period += (before - after) / den;
                        }
                    }
                }
                PitchFrame {
                    frequency: range.sample_rate / period,
                    voiced: true,
                    rms: f.rms,
                    peak: c.peak,
                }
            }
            _ => PitchFrame {
                frequency: 0.0,
                voiced: false,
                rms: f.rms,
                peak: c.peak,
            },
        });
        cand = c.back;
        if frame == ring.tail() {
            break;
        }
        frame = ring.prev(frame);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn weights() -> DpWeights {
        DpWeights::new(&F0Params::default(), 0.01, 100)
    }

    fn cand(lag: Option<usize>, local_cost: f64) -> DpCandidate {
        DpCandidate {
            lag,
            peak: 0.9,
            local_cost,
            path_cost: 0.0,
            back: 0,
        }
    }

    /// Ring of frames with the given `(lag, local cost)` hypotheses,
    /// accumulated in order starting at slot 0.
    fn ring_with(frames: &[Vec<(Option<usize>, f64)>]) -> FrameRing {
        let w = weights();
        let mut ring = FrameRing::new(frames.len() + 2, 10, 4);
        for (i, hyps) in frames.iter().enumerate() {
            if i > 0 {
                ring.advance_head();
            }
            let head = ring.head();
            let (prev, cur) = ring.prev_and_current(head);
            cur.dp.cands = hyps.iter().map(|&(lag, cost)| cand(lag, cost)).collect();
            let prev = if i == 0 { None } else { Some(&prev.dp) };
            w.accumulate(&mut cur.dp, prev, 1.0, 1.0);
        }
        ring
    }

    #[test]
    fn test_octave_jump_costs_double_cost() {
        let w = weights();
        let same = w.transition(Some(100), Some(100), 0.0, 1.0);
        let octave = w.transition(Some(100), Some(50), 0.0, 1.0);
        assert_eq!(same, 0.0);
        assert_abs_diff_eq!(octave, 0.35 * w.freq_weight, epsilon = 1e-12);
    }

    #[test]
    fn test_voicing_transitions_use_ratio_direction() {
        let w = weights();
        let onset = w.transition(None, Some(80), 0.4, 4.0);
        let offset = w.transition(Some(80), None, 0.4, 4.0);
        assert_abs_diff_eq!(onset, 0.005 + 0.5 * 0.4 + 0.5 / 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(offset, 0.005 + 0.5 * 0.4 + 0.5 * 4.0, epsilon = 1e-12);
        assert_eq!(w.transition(None, None, 0.4, 4.0), 0.0);
    }

    #[test]
    fn test_unvoiced_slot_always_appended() {
        let w = weights();
        let mut dp = Dprec::default();
        w.load_candidates(&mut dp, &[Peak { lag: 50, value: 0.8 }], 0.8);
        assert_eq!(dp.cands.len(), 2);
        assert_eq!(dp.cands[1].lag, None);
        assert_abs_diff_eq!(dp.cands[1].local_cost, 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(
            dp.cands[0].local_cost,
            1.0 - 0.8 * (1.0 - 50.0 * 0.003),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_paths_merge_and_trace_known_lags() {
        // lags 80 then 82 then 84 are cheap, everything else is expensive
        let frames = vec![
            vec![(Some(80), 0.1), (Some(160), 0.9), (None, 0.9)],
            vec![(Some(82), 0.1), (Some(164), 0.9), (None, 0.9)],
            vec![(Some(84), 0.1), (Some(168), 0.9), (None, 0.9)],
            vec![(Some(84), 0.1), (Some(42), 0.9), (None, 0.9)],
        ];
        let ring = ring_with(&frames);
        let (frame, cand) = find_convergence(&ring).unwrap();
        // every hypothesis of the last frame comes from the cheap lag of frame 2
        assert_eq!((frame, cand), (2, 0));

        let range = LagRange {
            sample_rate: 8000.0,
            start: 20,
            stop: 200,
        };
        // correlation buffers are flat, so lags are reported unrefined
        let out = backtrack(&ring, frame, cand, range);
        let freqs: Vec<f64> = out.iter().map(|f| f.frequency).collect();
        assert_eq!(freqs, vec![8000.0 / 84.0, 8000.0 / 82.0, 8000.0 / 80.0]);
        assert!(out.iter().all(|f| f.voiced));
    }

    #[test]
    fn test_no_convergence_when_paths_stay_apart() {
        // two isolated tracks: voiced and unvoiced never cross over
        let frames = vec![
            vec![(Some(80), 0.0), (None, 0.0)],
            vec![(Some(80), 0.0), (None, 0.0)],
            vec![(Some(80), 0.0), (None, 0.0)],
        ];
        let ring = ring_with(&frames);
        assert_eq!(find_convergence(&ring), None);

        let head = ring.head();
        let best = ring.frame(head).dp.best();
        let out = backtrack(&ring, head, best, LagRange {
            sample_rate: 8000.0,
            start: 20,
            stop: 200,
        });
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_parabolic_refinement_of_emitted_lag() {
        let frames = vec![vec![(Some(100), 0.1), (None, 0.9)]];
        let mut ring = ring_with(&frames);
        {
            let cross = &mut ring.frame_mut(0).cross;
            cross.first_lag = 95;
            // peak between 100 and 101
            cross.correl[4] = 0.8;
            cross.correl[5] = 0.95;
            cross.correl[6] = 0.9;
        }
        let out = backtrack(&ring, 0, 0, LagRange {
            sample_rate: 8000.0,
            start: 95,
            stop: 110,
        });
        let (before, max, after) = (0.8, 0.95, 0.9);
        let period = 100.0 + (before - after) / (2.0 * (after + before - 2.0 * max));
        assert!(period > 100.0 && period < 101.0);
        assert_abs_diff_eq!(out[0].frequency, 8000.0 / period, epsilon = 1e-9);
    }
}
