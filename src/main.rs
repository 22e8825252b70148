//! rtmp_publisher - push a pre-recorded FLV file to an RTMP server
//!
//! Usage: rtmp_publisher <rtmp_url> <flv_file> [config_file]
//!
//! Exits 0 after the whole file has been pushed, 1 on any failure.

use std::process::ExitCode;
use std::time::Instant;

use rtmp_publisher::{PublisherConfig, RtmpPublisher, Statistics};

/// Config file consulted when the third argument is omitted
const DEFAULT_CONFIG_FILE: &str = "rtmp_publisher.conf";

fn usage(program: &str) {
    eprintln!("Usage: {} <rtmp_url> <flv_file> [config_file]", program);
    eprintln!(
        "Example: {} rtmp://localhost:1935/live/stream test.flv",
        program
    );
    eprintln!(
        "         {} rtmp://localhost:1935/live/stream test.flv rtmp_publisher.conf",
        program
    );
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        usage(&args[0]);
        return ExitCode::FAILURE;
    }

    let rtmp_url = args[1].clone();
    let flv_file = args[2].clone();
    let config_file = args
        .get(3)
        .cloned()
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

    let config = if std::path::Path::new(&config_file).exists() {
        match PublisherConfig::from_file(&config_file) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config file {}: {}", config_file, e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        PublisherConfig::default()
    };

    init_logging(&config.log_level);
    tracing::info!(url = %rtmp_url, file = %flv_file, "rtmp publisher starting");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config, &rtmp_url, &flv_file)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(()) => ExitCode::FAILURE,
    }
}

async fn run(config: PublisherConfig, rtmp_url: &str, flv_file: &str) -> Result<(), ()> {
    let file_size = match std::fs::metadata(flv_file) {
        Ok(meta) => meta.len(),
        Err(e) => {
            tracing::error!(file = %flv_file, error = %e, "flv file not accessible");
            return Err(());
        }
    };
    tracing::info!(
        file = %flv_file,
        size_mb = %format!("{:.2}", file_size as f64 / (1024.0 * 1024.0)),
        "flv file found"
    );

    let max_retries = config.max_retry_count;
    let mut publisher = RtmpPublisher::with_config(config);

    let connect_start = Instant::now();
    if let Err(e) = publisher.connect_with_retry(rtmp_url, max_retries).await {
        tracing::error!(
            error = %e,
            elapsed_ms = connect_start.elapsed().as_millis() as u64,
            "failed to connect"
        );
        log_final_stats(&publisher.statistics());
        return Err(());
    }
    tracing::info!(
        elapsed_ms = connect_start.elapsed().as_millis() as u64,
        "connection established"
    );

    publisher.start_heartbeat();

    let push_start = Instant::now();
    let result = publisher.publish_file(flv_file).await;
    publisher.stop_heartbeat().await;

    match result {
        Ok(()) => {
            tracing::info!(
                elapsed_ms = push_start.elapsed().as_millis() as u64,
                "push complete"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "push failed");
            log_final_stats(&publisher.statistics());
            return Err(());
        }
    }

    log_final_stats(&publisher.statistics());
    publisher.disconnect().await;
    Ok(())
}

fn log_final_stats(stats: &Statistics) {
    tracing::info!(
        runtime_s = stats.runtime().as_secs(),
        sent_kb = stats.bytes_sent / 1024,
        received_kb = stats.bytes_received / 1024,
        audio_frames = stats.audio_frames,
        video_frames = stats.video_frames,
        dropped_frames = stats.dropped_frames,
        avg_bitrate_kbps = stats.avg_bitrate / 1000,
        "session statistics"
    );
}

/// Map the configured log level onto an EnvFilter directive
///
/// `critical` narrows to `error` (tracing has no higher level) and `off`
/// silences output; RUST_LOG still wins when set.
fn init_logging(level: &str) {
    let directive = match level.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" | "critical" => "error",
        "off" => "off",
        other => {
            eprintln!("Unknown log level {:?}, using info", other);
            "info"
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
