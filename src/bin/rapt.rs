//! CLI for RAPT pitch tracking

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use rapt::{format_frames, track_samples, F0Params, OutputFormat, OutputMode, Sound, TrackOptions};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Pitch period in samples
    Period,
    /// F0 in Hz
    F0,
    /// Natural log of F0
    LogF0,
    /// F0, voicing, RMS and correlation peak per frame
    Full,
}

impl From<Mode> for OutputMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Period => OutputMode::Period,
            Mode::F0 => OutputMode::F0,
            Mode::LogF0 => OutputMode::LogF0,
            Mode::Full => OutputMode::Full,
        }
    }
}

#[derive(Parser)]
#[command(name = "rapt", about = "Track F0 with the RAPT algorithm", version)]
struct Args {
    /// Input file: WAV, or raw little-endian f32 samples with --raw
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file (stdout when omitted)
    #[arg(short = 'o', long = "output", value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Read INPUT as raw f32 samples in 16-bit PCM scale
    #[arg(long, requires = "sample_rate")]
    raw: bool,

    /// Sample rate of raw input in Hz
    #[arg(short = 's', long = "sample-rate")]
    sample_rate: Option<f64>,

    /// Channel of a multi-channel WAV file
    #[arg(long)]
    channel: Option<usize>,

    /// JSON file with tracker parameters
    #[arg(short = 'c', long = "config", value_name = "JSON")]
    config: Option<PathBuf>,

    /// Frame shift in samples
    #[arg(short = 'p', long = "frame-shift")]
    frame_shift: Option<usize>,

    /// Minimum F0 in Hz
    #[arg(short = 'L', long = "min-f0")]
    min_f0: Option<f64>,

    /// Maximum F0 in Hz
    #[arg(short = 'H', long = "max-f0")]
    max_f0: Option<f64>,

    /// Voicing bias; positive values favor voiced frames
    #[arg(short = 'b', long = "voice-bias", allow_negative_numbers = true)]
    voice_bias: Option<f64>,

    /// What to write per frame
    #[arg(short = 'm', long = "mode", value_enum, default_value = "f0")]
    mode: Mode,

    /// Value written for unvoiced frames in period and F0 mode
    #[arg(long = "unvoiced", default_value_t = 0.0, allow_negative_numbers = true)]
    unvoiced: f64,

    /// Dither amplitude in 16-bit PCM units (0 disables)
    #[arg(long, default_value_t = 50.0)]
    dither: f64,

    /// Write binary little-endian f32 instead of text
    #[arg(long)]
    binary: bool,
}

fn read_raw(path: &PathBuf) -> anyhow::Result<Vec<f64>> {
    let mut bytes = Vec::new();
    File::open(path)
        .with_context(|| format!("cannot open {}", path.display()))?
        .read_to_end(&mut bytes)?;
    if bytes.len() % 4 != 0 {
        bail!("{} is not a whole number of f32 samples", path.display());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
        .collect())
}

fn load_params(args: &Args, sample_rate: f64) -> anyhow::Result<F0Params> {
    let mut params = match &args.config {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
            serde_json::from_reader(file)
                .with_context(|| format!("invalid parameters in {}", path.display()))?
        }
        None => F0Params::default(),
    };
    if let Some(shift) = args.frame_shift {
        params.frame_step = shift as f64 / sample_rate;
    }
    if let Some(v) = args.min_f0 {
        params.min_f0 = v;
    }
    if let Some(v) = args.max_f0 {
        params.max_f0 = v;
    }
    if let Some(v) = args.voice_bias {
        params.voice_bias = v;
    }
    Ok(params)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    let (samples, sample_rate) = if args.raw {
        let rate = args.sample_rate.context("--raw needs --sample-rate")?;
        (read_raw(&args.input)?, rate)
    } else {
        let sound = match args.channel {
            Some(c) => Sound::from_file_channel(&args.input, c),
            None => Sound::from_file(&args.input),
        }
        .with_context(|| format!("cannot read {}", args.input.display()))?;
        log::info!("{}", sound);
        let scaled = sound.samples().iter().map(|s| s * rapt::pitch::PCM16_SCALE).collect();
        (scaled, sound.sample_rate())
    };

    let params = load_params(&args, sample_rate)?;
    let options = TrackOptions {
        dither: args.dither,
        ..TrackOptions::default()
    };
    let frames = track_samples(&samples, sample_rate, &params, &options)?;

    let format = OutputFormat {
        mode: args.mode.into(),
        unvoiced_value: args.unvoiced,
        ..OutputFormat::default()
    };
    let values = format_frames(&frames, sample_rate, &format);

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let mut out = BufWriter::new(sink);
    if args.binary {
        for v in &values {
            out.write_all(&(*v as f32).to_le_bytes())?;
        }
    } else {
        for row in values.chunks(format.mode.width()) {
            let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(out, "{}", line.join(" "))?;
        }
    }
    out.flush()?;
    Ok(())
}
