//! Signal-processing kernels used by the tracker.
//!
//! - Analysis windows with optional first-order pre-emphasis
//! - Autocorrelation, Levinson-Durbin recursion and windowed LPC
//! - Itakura distance between an LPC model and an autocorrelation sequence
//! - Normalized cross-correlation over a lag range, either everywhere
//!   ([`CrossCorrelator::full`]) or in narrow patches around chosen lags
//!   ([`CrossCorrelator::patches`])
//!
//! All kernels work on samples in 16-bit PCM scale. The energy floors in the
//! correlation kernels are tuned for that scale.

use std::f64::consts::PI;

/// Highest LPC order supported by [`lpc`].
pub const MAX_LPC_ORDER: usize = 60;

/// Added to the energy product in the patch correlation to damp
/// low-energy segments.
const PATCH_ENERGY_FLOOR: f64 = 10000.0;

/// Analysis window shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Rectangular,
    Hamming,
    Cos4,
    Hanning,
}

impl WindowKind {
    /// RMS of the window, used to undo its attenuation of the signal energy.
    pub fn rms_correction(self) -> f64 {
        match self {
            WindowKind::Rectangular => 1.0,
            WindowKind::Hamming => 0.630397,
            WindowKind::Cos4 => 0.443149,
            WindowKind::Hanning => 0.612372,
        }
    }
}

/// Precomputed window coefficients.
#[derive(Debug, Clone)]
pub struct Window {
    kind: WindowKind,
    coeffs: Vec<f64>,
}

impl Window {
    /// Build a window of `n` points.
    pub fn new(kind: WindowKind, n: usize) -> Self {
        let arg = 2.0 * PI / n.max(1) as f64;
        let coeffs = (0..n)
            .map(|i| {
                let x = (i as f64 + 0.5) * arg;
                match kind {
                    WindowKind::Rectangular => 1.0,
                    WindowKind::Hamming => 0.54 - 0.46 * x.cos(),
                    WindowKind::Cos4 => {
                        let c = 0.5 - 0.5 * x.cos();
                        c * c * c * c
                    }
                    WindowKind::Hanning => 0.5 - 0.5 * x.cos(),
                }
            })
            .collect();
        Self { kind, coeffs }
    }

    #[inline]
    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    #[inline]
    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    /// Window `data` into `out`.
    ///
    /// With a nonzero `preemp` the output is `w[i] * (x[i+1] - preemp * x[i])`
    /// and `data` must hold `len() + 1` samples; otherwise `len()` samples
    /// are used. Missing samples read as zero.
    pub fn apply(&self, data: &[f64], preemp: f64, out: &mut Vec<f64>) {
        let x = |i: usize| data.get(i).copied().unwrap_or(0.0);
        out.clear();
        if preemp != 0.0 {
            out.extend(
                self.coeffs
                    .iter()
                    .enumerate()
                    .map(|(i, w)| w * (x(i + 1) - preemp * x(i))),
            );
        } else {
            out.extend(self.coeffs.iter().enumerate().map(|(i, w)| w * x(i)));
        }
    }
}

/// Normalized autocorrelation of `s` up to `order`.
///
/// Returns `(r, rms)` with `r[0] == 1`. A silent frame yields the
/// autocorrelation of white noise and an RMS of 1.
pub fn autocorrelation(s: &[f64], order: usize) -> (Vec<f64>, f64) {
    let n = s.len();
    let sum0: f64 = s.iter().map(|v| v * v).sum();
    let mut r = vec![0.0; order + 1];
    r[0] = 1.0;
    if sum0 == 0.0 || n == 0 {
        return (r, 1.0);
    }
    for (i, ri) in r.iter_mut().enumerate().skip(1) {
        if i >= n {
            break;
        }
        let sum: f64 = s[..n - i].iter().zip(&s[i..]).map(|(a, b)| a * b).sum();
        *ri = sum / sum0;
    }
    (r, (sum0 / n as f64).sqrt())
}

/// Levinson-Durbin recursion.
///
/// Solves for `order` predictor coefficients given `r[0..=order]`. The
/// returned coefficients exclude the leading 1 of `A(z) = 1 + a1 z^-1 + ...`.
/// Returns `(reflection, predictor, residual_energy)`.
pub fn durbin(r: &[f64], order: usize) -> (Vec<f64>, Vec<f64>, f64) {
    let mut k = vec![0.0; order];
    let mut a = vec![0.0; order];
    if order == 0 {
        return (k, a, r[0]);
    }
    let mut b = vec![0.0; order];

    let mut e = r[0];
    k[0] = -r[1] / e;
    a[0] = k[0];
    e *= 1.0 - k[0] * k[0];
    for i in 1..order {
        let mut s = 0.0;
        for j in 0..i {
            s -= a[j] * r[i - j];
        }
        k[i] = (s - r[i + 1]) / e;
        a[i] = k[i];
        b[..=i].copy_from_slice(&a[..=i]);
        for j in 0..i {
            a[j] += k[i] * b[i - j - 1];
        }
        e *= 1.0 - k[i] * k[i];
    }
    (k, a, e)
}

/// Result of a windowed LPC analysis.
#[derive(Debug, Clone)]
pub struct Lpc {
    /// Predictor polynomial with `coeffs[0] == 1`.
    pub coeffs: Vec<f64>,
    /// Normalized (and stabilized) autocorrelation, `autocorr[0] == 1`.
    pub autocorr: Vec<f64>,
    pub reflection: Vec<f64>,
    /// Normalized prediction error.
    pub norm_err: f64,
    /// RMS of the windowed frame, corrected for window attenuation.
    pub rms: f64,
}

/// Windowed LPC analysis of one frame.
///
/// `data` must hold `window.len() + 1` samples when `preemp` is nonzero.
/// `stabilization` is a white-noise floor in dB below the signal; values
/// above 1 scale the off-zero autocorrelation lags by
/// `1 / (1 + 10^(-stabilization/20))`.
///
/// Returns `None` for an empty window, a zero order, or an order above
/// [`MAX_LPC_ORDER`].
pub fn lpc(
    order: usize,
    stabilization: f64,
    data: &[f64],
    window: &Window,
    preemp: f64,
    scratch: &mut Vec<f64>,
) -> Option<Lpc> {
    if window.is_empty() || order == 0 || order > MAX_LPC_ORDER {
        return None;
    }
    window.apply(data, preemp, scratch);
    let (mut r, en) = autocorrelation(scratch, order);
    if stabilization > 1.0 {
        let ffact = 1.0 / (1.0 + (-stabilization / 20.0 * 10f64.ln()).exp());
        for v in r.iter_mut().skip(1) {
            *v *= ffact;
        }
    }
    let (reflection, predictor, err) = durbin(&r, order);
    let mut coeffs = Vec::with_capacity(order + 1);
    coeffs.push(1.0);
    coeffs.extend_from_slice(&predictor);
    Some(Lpc {
        coeffs,
        autocorr: r,
        reflection,
        norm_err: err,
        rms: en / window.kind().rms_correction(),
    })
}

/// Autocorrelation of the predictor coefficients.
///
/// `a` excludes the leading 1. Returns `(b, c)` where `c` is the zero-lag
/// term and `b[i-1]` is twice the lag-`i` term, ready for [`itakura`].
pub fn a_to_aca(a: &[f64]) -> (Vec<f64>, f64) {
    let p = a.len();
    let c = 1.0 + a.iter().map(|v| v * v).sum::<f64>();
    let b = (1..=p)
        .map(|i| {
            let s = a[i - 1] + (0..p - i).map(|j| a[j] * a[j + i]).sum::<f64>();
            2.0 * s
        })
        .collect();
    (b, c)
}

/// Itakura distance of a model (`b`, `c` from [`a_to_aca`]) against the
/// autocorrelation lags `r[1..]` of another frame with prediction error
/// `gain`. Identical models give 1.
pub fn itakura(b: &[f64], c: f64, r: &[f64], gain: f64) -> f64 {
    let s: f64 = b.iter().zip(r).map(|(b, r)| b * r).sum();
    (c + s) / gain
}

/// RMS of `data[..window.len()]` after windowing.
pub fn window_energy(data: &[f64], window: &Window, scratch: &mut Vec<f64>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    window.apply(data, 0.0, scratch);
    let sum: f64 = scratch.iter().map(|v| v * v).sum();
    (sum / window.len() as f64).sqrt()
}

/// Strongest point of a correlation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationPeak {
    /// Energy of the mean-removed reference window.
    pub energy: f64,
    /// Lag of the maximum, if any positive correlation was seen.
    pub lag: Option<usize>,
    pub value: f64,
}

/// Normalized cross-correlation with a reusable mean-removal buffer.
#[derive(Debug, Default, Clone)]
pub struct CrossCorrelator {
    buf: Vec<f64>,
}

impl CrossCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `total` samples of `data` (zero past its end) and remove the
    /// mean of the first `size`. Returns the reference energy.
    fn load(&mut self, data: &[f64], size: usize, total: usize) -> f64 {
        self.buf.clear();
        self.buf
            .extend((0..total).map(|i| data.get(i).copied().unwrap_or(0.0)));
        let n = size.min(total);
        if n == 0 {
            return 0.0;
        }
        let mean = self.buf[..n].iter().sum::<f64>() / n as f64;
        for v in &mut self.buf {
            *v -= mean;
        }
        self.buf[..n].iter().map(|v| v * v).sum()
    }

    #[inline]
    fn dot(&self, a: usize, b: usize, size: usize) -> f64 {
        self.buf[a..a + size]
            .iter()
            .zip(&self.buf[b..b + size])
            .map(|(x, y)| x * y)
            .sum()
    }

    /// Correlate the `size`-sample reference at the start of `data` with
    /// every lag in `[start, start + nlags)`, writing `correl[..nlags]`.
    ///
    /// A silent reference produces all zeros and no peak.
    pub fn full(
        &mut self,
        data: &[f64],
        size: usize,
        start: usize,
        nlags: usize,
        correl: &mut [f64],
    ) -> CorrelationPeak {
        let engr = self.load(data, size, size + start + nlags);
        let correl = &mut correl[..nlags];
        let mut peak = CorrelationPeak {
            energy: engr,
            lag: None,
            value: 0.0,
        };
        if engr <= 0.0 {
            correl.fill(0.0);
            return peak;
        }

        let mut engc: f64 = self.buf[start..start + size]
            .iter()
            .map(|v| v * v)
            .sum::<f64>()
            .max(1.0);
        for (i, out) in correl.iter_mut().enumerate() {
            let lag = start + i;
            let t = self.dot(0, lag, size) / (engc * engr).sqrt();
            *out = t;
            engc -= self.buf[lag] * self.buf[lag];
            engc += self.buf[lag + size] * self.buf[lag + size];
            if engc < 1.0 {
                engc = 1.0;
            }
            if t > peak.value {
                peak.value = t;
                peak.lag = Some(lag);
            }
        }
        peak
    }

    /// Correlate only in `patch`-lag windows centered on each of `locs`.
    ///
    /// `correl[..nlags]` covers lags `[start, start + nlags)`; entries outside
    /// the patches are zero. Patches are clamped to the lag range.
    #[allow(clippy::too_many_arguments)]
    pub fn patches(
        &mut self,
        data: &[f64],
        size: usize,
        start: usize,
        nlags: usize,
        patch: usize,
        locs: &[usize],
        correl: &mut [f64],
    ) -> CorrelationPeak {
        let engr = self.load(data, size, size + start + nlags);
        let correl = &mut correl[..nlags];
        correl.fill(0.0);
        let mut peak = CorrelationPeak {
            energy: engr,
            lag: None,
            value: 0.0,
        };
        if engr <= 0.0 || nlags == 0 {
            return peak;
        }

        let patch = patch.min(nlags);
        let last_start = start + nlags - patch;
        for &loc in locs {
            let first = loc
                .saturating_sub(patch / 2)
                .clamp(start, last_start);
            let mut engc: f64 = self.buf[first..first + size].iter().map(|v| v * v).sum();
            for lag in first..first + patch {
                let sum = self.dot(0, lag, size);
                if engc < 1.0 {
                    engc = 1.0;
                }
                let t = sum / (PATCH_ENERGY_FLOOR + engc * engr).sqrt();
                correl[lag - start] = t;
                engc -= self.buf[lag] * self.buf[lag];
                engc += self.buf[lag + size] * self.buf[lag + size];
                if t > peak.value {
                    peak.value = t;
                    peak.lag = Some(lag);
                }
            }
        }
        peak
    }
}
