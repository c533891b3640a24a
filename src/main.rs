use anyhow::{Context, Result};
use clap::Parser;
use mic_capture::{
    AmplitudePipeline, AudioBackendFactory, AudioSource, CaptureSession, Config,
    MonoAmplitudeSequence, MonoDownmixer,
};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "mic-capture")]
#[command(about = "Capture microphone audio and print per-chunk mono amplitude levels")]
struct Args {
    /// Configuration file (extension optional, missing file is fine)
    #[arg(short, long, default_value = "config/mic-capture")]
    config: String,

    /// Replay a WAV file instead of the live microphone
    #[arg(short, long)]
    file: Option<String>,

    /// Chunk interval in milliseconds (overrides config)
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// How long to record in seconds
    #[arg(short, long, default_value = "10")]
    duration_secs: u64,

    /// Print one JSON object per chunk instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct AmplitudeSummary {
    sequence: u64,
    sample_rate: u32,
    samples: usize,
    peak: f32,
    rms: f32,
}

impl From<&MonoAmplitudeSequence> for AmplitudeSummary {
    fn from(mono: &MonoAmplitudeSequence) -> Self {
        Self {
            sequence: mono.sequence,
            sample_rate: mono.sample_rate,
            samples: mono.len(),
            peak: mono.peak(),
            rms: mono.rms(),
        }
    }
}

fn print_amplitude(mono: &MonoAmplitudeSequence, json: bool) {
    let summary = AmplitudeSummary::from(mono);

    if json {
        match serde_json::to_string(&summary) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize amplitude summary: {}", e),
        }
    } else {
        println!(
            "chunk {:>4}: {:>6} samples @ {}Hz  peak {:.3}  rms {:.3}",
            summary.sequence, summary.samples, summary.sample_rate, summary.peak, summary.rms
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine readable
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    let source = match args.file {
        Some(path) => AudioSource::File(path),
        None => cfg.source(),
    };
    info!("Audio source: {:?}", source);

    let provider = AudioBackendFactory::create(source, cfg.backend_config())
        .context("Failed to create audio provider")?;

    let mut session = CaptureSession::new(cfg.session_config(), provider);

    let json = args.json;
    let pipeline = AmplitudePipeline::attach(&session, MonoDownmixer::default(), move |mono| {
        print_amplitude(&mono, json)
    });

    session
        .initialize()
        .await
        .context("Microphone initialization failed")?;
    session
        .start(args.interval_ms)
        .await
        .context("Failed to start recording")?;

    info!("Recording for {} seconds (Ctrl+C to stop early)", args.duration_secs);

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.duration_secs)) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    session.stop().await;
    pipeline.shutdown(&session).await;

    let stats = session.stats();
    if json {
        println!("{}", serde_json::to_string(&stats)?);
    } else {
        info!(
            "Session {} finished: {} chunks emitted, {} delivered, {} dropped",
            stats.session_id, stats.chunks_emitted, stats.sequences_delivered, stats.chunks_dropped
        );
    }

    Ok(())
}
