//! Sonotap identifier (sonotap-id) - Main entry point
//!
//! `run` drives the identification scheduler against an audio tap. With no
//! mixing engine attached, a built-in test tone feeds the tap and the
//! visualizer so the whole pipeline can be exercised end to end.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sonotap_common::config::{AudioFormat, TomlConfig};
use sonotap_common::db::{Database, FingerprintCache, MetadataSource, PlayHistoryStore, TrackMetadata};
use sonotap_common::events::{EventBus, TapEvent};
use sonotap_id::scheduler::SchedulerSettings;
use sonotap_id::{
    DigestFingerprinter, FingerprintAlgorithm, IdentificationScheduler, MetadataLookupService,
};
use sonotap_tap::capture::CaptureSettings;
use sonotap_tap::visualization::linear_to_db;
use sonotap_tap::{AudioTapBuffer, SampleCapture, VisualizerFacade};
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for sonotap-id
#[derive(Parser, Debug)]
#[command(name = "sonotap-id")]
#[command(about = "Audio tap identification and play history for Sonotap")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "SONOTAP_CONFIG")]
    config: Option<PathBuf>,

    /// Database path (overrides the config file)
    #[arg(short, long, global = true, env = "SONOTAP_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the identification scheduler (default)
    Run(RunArgs),

    /// Print play history statistics as JSON
    Stats {
        /// Number of top artists and tracks
        #[arg(long, default_value = "10")]
        top: i64,
    },

    /// List cached fingerprints that have no metadata yet
    Untagged {
        #[arg(long, default_value = "20")]
        limit: i64,
    },

    /// Attach metadata to a cached fingerprint
    Tag {
        /// Fingerprint hash, as printed by `untagged`
        hash: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        artist: String,
        #[arg(long)]
        album: Option<String>,
    },

    /// Print the content digest of a file
    FingerprintFile { path: PathBuf },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Identification interval in seconds (overrides the config file)
    #[arg(long)]
    interval: Option<u64>,

    /// Do not feed the built-in test tone
    #[arg(long)]
    no_tone: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging starts at info until the config file names a level; RUST_LOG wins
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new(log_filter("info"))));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = TomlConfig::load(cli.config.as_deref()).context("Invalid configuration")?;
    if let Some(path) = cli.database {
        config.database_path = path;
    }

    if !from_env {
        if let Err(e) = filter_handle.reload(EnvFilter::new(log_filter(&config.logging.level))) {
            warn!("Failed to apply configured log level: {}", e);
        }
    }

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run(config, args).await,
        Command::Stats { top } => stats(&config, top).await,
        Command::Untagged { limit } => untagged(&config, limit).await,
        Command::Tag {
            hash,
            title,
            artist,
            album,
        } => tag(&config, &hash, title, artist, album).await,
        Command::FingerprintFile { path } => fingerprint_file(&path),
    }
}

fn log_filter(level: &str) -> String {
    format!("sonotap_id={0},sonotap_tap={0},sonotap_common={0}", level)
}

async fn run(mut config: TomlConfig, args: RunArgs) -> Result<()> {
    if let Some(interval) = args.interval {
        config.identification.interval_secs = interval;
        config.validate().context("Invalid interval")?;
    }

    info!("Starting sonotap-id version {}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());

    let db = Arc::new(Database::open(&config.database_path));
    db.pool().await.context("Failed to open database")?;
    info!("Database initialized");

    let format = config.audio;
    let ident = &config.identification;
    let window_seconds = u32::try_from(ident.tap_window_seconds).context("Tap window too large")?;
    let tap = Arc::new(AudioTapBuffer::new(format, window_seconds)?);
    let visualizer = Arc::new(VisualizerFacade::new(format, &config.visualization)?);
    info!(
        capacity_bytes = tap.capacity(),
        fft_size = config.visualization.fft_size,
        "Audio tap and visualizer ready"
    );

    let events = Arc::new(EventBus::new(100));
    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(log_events(events.subscribe(), cancel.clone())));
    tasks.push(tokio::spawn(poll_visualizer(Arc::clone(&visualizer), cancel.clone())));
    if !args.no_tone {
        tasks.push(tokio::spawn(feed_test_tone(
            Arc::clone(&tap),
            Arc::clone(&visualizer),
            cancel.clone(),
        )));
    }

    if ident.enabled {
        let capture = SampleCapture::new(
            Arc::clone(&tap),
            CaptureSettings {
                poll_interval: ident.poll_interval(),
                idle_timeout: ident.idle_timeout(),
            },
        );
        let lookup = MetadataLookupService::new(Arc::clone(&db), ident.lookup_api_key.clone());
        if !lookup.has_credential() {
            info!("No lookup credential configured; unknown audio is cached for manual tagging");
        }

        let scheduler = Arc::new(IdentificationScheduler::new(
            Arc::new(capture),
            Arc::new(DigestFingerprinter::new()),
            Arc::new(lookup),
            PlayHistoryStore::new(Arc::clone(&db)),
            Arc::clone(&events),
            SchedulerSettings::from(ident),
        ));
        tasks.push(scheduler.spawn(cancel.clone()));
    } else {
        warn!("Identification disabled in configuration");
    }

    shutdown_signal().await;
    cancel.cancel();

    for task in tasks {
        if let Err(e) = task.await {
            error!("Task ended abnormally: {}", e);
        }
    }

    db.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn stats(config: &TomlConfig, top: i64) -> Result<()> {
    let db = Arc::new(Database::open(&config.database_path));
    let stats = PlayHistoryStore::new(Arc::clone(&db))
        .statistics(top)
        .await
        .context("Failed to read play history")?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    db.close().await;
    Ok(())
}

async fn untagged(config: &TomlConfig, limit: i64) -> Result<()> {
    let db = Arc::new(Database::open(&config.database_path));
    let fingerprints = FingerprintCache::new(Arc::clone(&db))
        .list_untagged(limit)
        .await
        .context("Failed to read fingerprint cache")?;
    for cached in &fingerprints {
        println!(
            "{}\t{:.1}s\t{}",
            cached.fingerprint.hash,
            cached.fingerprint.duration,
            sonotap_common::time::to_db(&cached.fingerprint.created_at)
        );
    }
    db.close().await;
    Ok(())
}

async fn tag(
    config: &TomlConfig,
    hash: &str,
    title: String,
    artist: String,
    album: Option<String>,
) -> Result<()> {
    let db = Arc::new(Database::open(&config.database_path));
    let lookup = MetadataLookupService::new(Arc::clone(&db), None);

    let mut metadata = TrackMetadata::new(title, artist, MetadataSource::Manual);
    if let Some(album) = album {
        metadata = metadata.with_album(album);
    }

    let stored = lookup
        .tag_fingerprint(hash, metadata)
        .await
        .with_context(|| format!("Failed to tag fingerprint {}", hash))?;
    println!("{}", serde_json::to_string_pretty(&stored)?);
    db.close().await;
    Ok(())
}

fn fingerprint_file(path: &std::path::Path) -> Result<()> {
    let fingerprint = DigestFingerprinter::new()
        .fingerprint_file(path)
        .with_context(|| format!("Failed to fingerprint {}", path.display()))?;
    println!("{}\t{:.1}s", fingerprint.hash, fingerprint.duration);
    Ok(())
}

/// Stand-in for the mixing engine: a tone that changes pitch every minute
async fn feed_test_tone(
    tap: Arc<AudioTapBuffer>,
    visualizer: Arc<VisualizerFacade>,
    cancel: CancellationToken,
) {
    const BLOCK: Duration = Duration::from_millis(20);
    const TRACK_SECONDS: u64 = 60;
    const PITCHES: [f32; 4] = [220.0, 330.0, 440.0, 550.0];

    let format: AudioFormat = tap.format();
    let frames_per_block = (format.sample_rate as usize / 50).max(1);
    let channels = format.channels as usize;
    let mut block = vec![0.0f32; frames_per_block * channels];
    let mut frame_index: u64 = 0;

    let mut ticker = tokio::time::interval(BLOCK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tap.set_active(true);
    info!("Test tone feeding the audio tap");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let track = (frame_index / (format.sample_rate as u64 * TRACK_SECONDS)) as usize;
        let freq = PITCHES[track % PITCHES.len()];
        for frame in block.chunks_exact_mut(channels) {
            let t = (frame_index % (format.sample_rate as u64 * TRACK_SECONDS)) as f32
                / format.sample_rate as f32;
            let sample = 0.4 * (2.0 * std::f32::consts::PI * freq * t).sin();
            frame.fill(sample);
            frame_index += 1;
        }

        visualizer.process_samples(&block);
        tap.write(&block);
    }

    tap.set_active(false);
    debug!("Test tone stopped");
}

/// Log a visualization summary every few seconds
async fn poll_visualizer(visualizer: Arc<VisualizerFacade>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if !visualizer.is_active() {
            continue;
        }

        let level = visualizer.level_data();
        let spectrum = visualizer.spectrum_data();
        let peak_hz = spectrum
            .magnitudes
            .iter()
            .zip(&spectrum.frequencies)
            .max_by(|a, b| a.0.total_cmp(b.0))
            .map(|(_, &hz)| hz)
            .unwrap_or(0.0);

        info!(
            left_peak_db = level.left_peak_db,
            right_peak_db = level.right_peak_db,
            mono_rms_db = linear_to_db(level.mono_rms),
            peak_hz,
            clipping = level.is_clipping,
            "Visualization"
        );
    }
}

async fn log_events(
    mut rx: tokio::sync::broadcast::Receiver<TapEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = rx.recv() => event,
        };
        match event {
            Ok(TapEvent::TrackIdentified {
                metadata, confidence, ..
            }) => info!("Now playing: {} - {} ({:.2})", metadata.artist, metadata.title, confidence),
            Ok(other) => debug!(event = other.event_type(), "Event"),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!("Event log lagged, {} events dropped", n)
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
