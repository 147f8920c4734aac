//! End-to-end tracking tests on synthetic signals.

use approx::assert_abs_diff_eq;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rapt::{
    track_samples, Error, F0Params, Interpolation, PitchFrame, RaptSession, RaptTracker, Sound,
    TrackOptions,
};

const FS: f64 = 16000.0;

fn sine(freq: f64, amplitude: f64, seconds: f64) -> Vec<f64> {
    let n = (seconds * FS) as usize;
    (0..n)
        .map(|i| amplitude * (2.0 * std::f64::consts::PI * freq * i as f64 / FS).sin())
        .collect()
}

fn noise(amplitude: f64, n: usize, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n).map(|_| amplitude * (2.0 * rng.random::<f64>() - 1.0)).collect()
}

fn no_dither() -> TrackOptions {
    TrackOptions {
        dither: 0.0,
        ..TrackOptions::default()
    }
}

/// Push `signal` in pieces of the given sizes (cycled) and collect all output.
fn track_in_pieces(signal: &[f64], sizes: &[usize]) -> Vec<PitchFrame> {
    let mut tracker = RaptTracker::new(FS, &F0Params::default()).unwrap();
    let mut out = Vec::new();
    let mut at = 0;
    for &size in sizes.iter().cycle() {
        if at >= signal.len() {
            break;
        }
        let end = (at + size).min(signal.len());
        out.extend(tracker.push(&signal[at..end]).unwrap());
        at = end;
    }
    out.extend(tracker.finish().unwrap());
    out
}

#[test]
fn test_steady_sine_is_tracked() {
    let signal = sine(150.0, 8000.0, 1.0);
    let frames = track_samples(&signal, FS, &F0Params::default(), &no_dither()).unwrap();
    assert_eq!(frames.len(), 200);
    for frame in &frames[5..185] {
        assert!(frame.voiced, "unvoiced frame in steady sine: {:?}", frame);
        assert_abs_diff_eq!(frame.frequency, 150.0, epsilon = 1.0);
    }
}

#[test]
fn test_sound_contour() {
    let samples: Vec<f64> = sine(200.0, 0.25, 0.5).into_iter().collect();
    let sound = Sound::from_slice(&samples, FS);
    let pitch = sound
        .to_pitch_rapt(&F0Params::with_range(80.0, 400.0), &TrackOptions::default())
        .unwrap();
    assert_eq!(pitch.n_frames(), 100);
    assert_eq!(pitch.time_step(), 0.005);
    let f0 = pitch.get_value_at_time(0.25, Interpolation::Linear).unwrap();
    assert_abs_diff_eq!(f0, 200.0, epsilon = 1.5);
    assert!(pitch.voiced_fraction() > 0.8);
    // sine RMS is about 5800 in PCM16 units; the Hanning window scales it by ~0.61
    let rms = pitch.rms()[50];
    assert!(rms > 2800.0 && rms < 4500.0, "rms {}", rms);
}

#[test]
fn test_silence_is_unvoiced() {
    let frames = track_samples(&vec![0.0; 8000], FS, &F0Params::default(), &no_dither()).unwrap();
    assert_eq!(frames.len(), 100);
    assert!(frames.iter().all(|f| !f.voiced && f.frequency == 0.0));
}

#[test]
fn test_white_noise_is_unvoiced() {
    let signal = noise(3000.0, 16000, 11);
    let frames = track_samples(&signal, FS, &F0Params::default(), &no_dither()).unwrap();
    let voiced = frames.iter().filter(|f| f.voiced).count();
    assert!(voiced * 100 <= frames.len(), "{} voiced frames in noise", voiced);
}

#[test]
fn test_repeated_runs_are_identical() {
    let mut signal = sine(120.0, 4000.0, 0.8);
    for (s, n) in signal.iter_mut().zip(noise(500.0, 12800, 3)) {
        *s += n;
    }
    let a = track_samples(&signal, FS, &F0Params::default(), &TrackOptions::default()).unwrap();
    let b = track_samples(&signal, FS, &F0Params::default(), &TrackOptions::default()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_chunking_does_not_change_output() {
    let mut signal = sine(180.0, 6000.0, 2.0);
    for (s, n) in signal.iter_mut().zip(noise(800.0, 32000, 5)) {
        *s += n;
    }
    let whole = track_in_pieces(&signal, &[signal.len()]);
    let small = track_in_pieces(&signal, &[1, 37, 500, 4096]);
    let blocks = track_in_pieces(&signal, &[3320]);
    assert!(!whole.is_empty());
    assert_eq!(whole, small);
    assert_eq!(whole, blocks);
}

#[test]
fn test_frames_stream_out_before_finish() {
    let signal = sine(150.0, 8000.0, 2.0);
    let mut tracker = RaptTracker::new(FS, &F0Params::default()).unwrap();
    let early = tracker.push(&signal).unwrap();
    assert!(!early.is_empty());
    let rest = tracker.finish().unwrap();
    let geometry = *tracker.session().geometry();
    // every complete chunk plus the final partial one
    let chunks = (signal.len() - geometry.buffer_size - 1) / geometry.step_size + 1;
    let remainder = signal.len() - chunks * geometry.step_size;
    let expected = chunks * geometry.frames_per_chunk + geometry.frames_in(remainder);
    assert_eq!(early.len() + rest.len(), expected);
}

#[test]
fn test_invalid_configuration() {
    let cases = [
        F0Params::with_range(250.0, 100.0),
        F0Params::with_range(60.0, 9000.0),
        F0Params::with_range(60.0, f64::NAN),
        F0Params::with_range(f64::NAN, 240.0),
        F0Params {
            frame_step: 0.5,
            ..F0Params::default()
        },
        F0Params {
            n_cands: 1,
            ..F0Params::default()
        },
    ];
    for params in &cases {
        assert!(
            matches!(RaptSession::new(FS, params), Err(Error::Config(_))),
            "{:?} accepted",
            params
        );
    }
    assert!(matches!(
        RaptSession::new(0.0, &F0Params::default()),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_short_input_yields_no_frames() {
    let mut session = RaptSession::new(FS, &F0Params::default()).unwrap();
    let out = session.process(&sine(150.0, 8000.0, 0.01), true).unwrap();
    assert!(out.is_empty());
}

#[test]
fn test_driver_frame_count() {
    for n in [0, 1, 80, 81, 4000, 16001] {
        let frames = track_samples(&vec![0.0; n], FS, &F0Params::default(), &no_dither()).unwrap();
        assert_eq!(frames.len(), n.div_ceil(80), "{} samples", n);
    }
}

#[test]
fn test_low_sample_rate() {
    let fs = 8000.0;
    let signal: Vec<f64> = (0..8000)
        .map(|i| 8000.0 * (2.0 * std::f64::consts::PI * 100.0 * i as f64 / fs).sin())
        .collect();
    let frames = track_samples(&signal, fs, &F0Params::default(), &no_dither()).unwrap();
    assert_eq!(frames.len(), 200);
    let voiced: Vec<&PitchFrame> = frames[5..185].iter().filter(|f| f.voiced).collect();
    assert!(voiced.len() > 170);
    for frame in voiced {
        assert_abs_diff_eq!(frame.frequency, 100.0, epsilon = 1.0);
    }
}
