//! geotrack cli - replay recorded positions through the geofence pipeline

use std::fs;
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::Arc;

use argopt::{cmd_group, subcmd};
use time::OffsetDateTime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use geotrack::pipeline::dispatch::EventDispatcher;
use geotrack::pipeline::partition::consume_partitioned;
use geotrack::pipeline::publisher::WriterSink;
use geotrack::sources::{CsvSource, GpxSource};
use geotrack::{
    Config, EventPublisher, GeofenceEngine, GeofenceTransition, IngestOutcome, OfflineMonitor,
    PositionPipeline, PositionsSource, ProcessingError, RawPositionMessage,
};

type CliPipeline = PositionPipeline<WriterSink<Stdout>>;

/// CLI of geotrack - Geofence alerts from raw position reports
#[cmd_group(commands = [json, csv, gpx])]
fn main() -> Result<(), String> {}

/// Process a file of raw position messages, one JSON document per line.
/// Fails once the file is drained if any line could not be processed.
#[subcmd]
fn json(
    /// JSON lines file
    input: String,
    /// Geofences and pipeline configuration. Default: .geotrack.yaml, ~/.geotrack.yaml
    #[opt(long)]
    config: Option<String>,
    /// Write real-time fan-out envelopes instead of topic lines
    #[opt(long)]
    fanout: bool,
    /// Report silent assets once the input is drained
    #[opt(long)]
    sweep: bool,
) -> Result<(), String> {
    init_tracing();

    let content = fs::read_to_string(input)
        .map_err(|e| format!("Failed on open the JSON file: {}", e))?;
    let payloads: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();

    let config = load_config(config)?;
    let pipeline = build_pipeline(&config, fanout)?;

    let results = consume_partitioned(&pipeline, &payloads, config.pipeline.workers);

    let (outcomes, failed) = split_results(results);

    finish(&pipeline, &config, &outcomes, sweep);

    if failed > 0 {
        return Err(format!("{} of {} messages could not be processed", failed, payloads.len()));
    }

    Ok(())
}

/// Keep the outcomes, log and count the payloads that failed
fn split_results(
    results: Vec<Result<IngestOutcome, ProcessingError>>,
) -> (Vec<IngestOutcome>, usize) {
    let mut outcomes = Vec::with_capacity(results.len());
    let mut failed = 0;

    for (line, result) in results.into_iter().enumerate() {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                warn!(line = line + 1, error = %e, "Failed to process message");
                failed += 1;
            }
        }
    }

    (outcomes, failed)
}

/// Replay a CSV file of position reports
#[subcmd]
fn csv(
    /// CSV file source
    csv_path: String,
    /// Geofences, pipeline and fields configuration. Default: .geotrack.yaml, ~/.geotrack.yaml
    #[opt(long)]
    config: Option<String>,
    /// Write real-time fan-out envelopes instead of topic lines
    #[opt(long)]
    fanout: bool,
    /// Report silent assets once the input is drained
    #[opt(long)]
    sweep: bool,
) -> Result<(), String> {
    init_tracing();

    let config = load_config(config)?;

    let mut source = CsvSource::from_path(csv_path, Some(config.fields.clone()))
        .map_err(|e| format!("Failed on open the CSV file: {}", e))?;

    replay(&mut source, &config, fanout, sweep)
}

/// Replay a GPX track as the route of one asset
#[subcmd]
fn gpx(
    /// GPX file source
    gpx_path: String,
    /// Asset the track belongs to
    asset_id: String,
    /// Geofences and pipeline configuration. Default: .geotrack.yaml, ~/.geotrack.yaml
    #[opt(long)]
    config: Option<String>,
    /// Write real-time fan-out envelopes instead of topic lines
    #[opt(long)]
    fanout: bool,
    /// Report silent assets once the input is drained
    #[opt(long)]
    sweep: bool,
) -> Result<(), String> {
    init_tracing();

    let config = load_config(config)?;

    let mut source = GpxSource::from_path(gpx_path, asset_id)
        .map_err(|e| format!("Failed on open the GPX file: {}", e))?;

    replay(&mut source, &config, fanout, sweep)
}

/// Feed a source through the pipeline, in recorded order
fn replay(
    source: &mut impl PositionsSource,
    config: &Config,
    fanout: bool,
    sweep: bool,
) -> Result<(), String> {
    let raws: Vec<RawPositionMessage> = source.fetch().map_err(|e| e.to_string())?;

    let pipeline = build_pipeline(config, fanout)?;

    let outcomes: Vec<IngestOutcome> = raws.into_iter().map(|raw| pipeline.process(raw)).collect();

    finish(&pipeline, config, &outcomes, sweep);

    Ok(())
}

fn build_pipeline(config: &Config, fanout: bool) -> Result<CliPipeline, String> {
    let engine = Arc::new(GeofenceEngine::new());
    config
        .register_geofences(&engine)
        .map_err(|e| e.to_string())?;

    let sink = if fanout {
        WriterSink::fanout(io::stdout())
    } else {
        WriterSink::new(io::stdout())
    };

    let rules = Arc::new(config.clone());

    let mut pipeline = PositionPipeline::new(engine, EventPublisher::new(sink))
        .dispatcher(EventDispatcher::new())
        .offline_monitor(Arc::new(OfflineMonitor::new()))
        .alert_filter(Arc::new(move |t: &GeofenceTransition| rules.wants_alert(t)));

    if let Some(limit) = config.pipeline.speed_limit_kmh {
        pipeline = pipeline.speed_limit(limit);
    }

    Ok(pipeline)
}

fn finish(pipeline: &CliPipeline, config: &Config, outcomes: &[IngestOutcome], sweep: bool) {
    let discarded = outcomes
        .iter()
        .filter(|o| matches!(o, IngestOutcome::Discarded(_)))
        .count();
    let events: usize = outcomes.iter().map(|o| o.events().len()).sum();

    let offline = if sweep {
        pipeline
            .sweep_offline(OffsetDateTime::now_utc(), config.pipeline.offline_after())
            .len()
    } else {
        0
    };

    info!(
        processed = outcomes.len() - discarded,
        discarded,
        events,
        offline,
        "Replay finished"
    );
}

/// Logs go to stderr, stdout carries the outbound messages
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Load the current config
fn load_config(provided: Option<String>) -> Result<Config, String> {
    let mut options = vec![];

    if let Some(sprovided) = provided {
        options.push(sprovided);
    }

    options.push(".geotrack.yaml".to_string());

    if let Some(home) = dirs::home_dir() {
        if let Some(shome) = home.to_str() {
            options.push(format!("{}/.geotrack.yaml", shome));
        }
    }

    for fi in options {
        if Path::new(&fi).is_file() {
            info!(path = %fi, "Loading config");
            return Config::from_path(&fi).map_err(|e| format!("{}: {}", fi, e));
        }
    }

    Ok(Config::default())
}

#[test]
fn load_provided_config() -> Result<(), String> {
    let path = std::env::temp_dir().join(format!("geotrack-{}.yaml", std::process::id()));
    let yaml = "\ngeofences:\n  - name: Monument\n    circle: { longitude: -1.6131, latitude: 54.9738, radius_metres: 1000 }\npipeline:\n  workers: 3";
    fs::write(&path, yaml).map_err(|e| e.to_string())?;

    let config = load_config(path.to_str().map(String::from));
    fs::remove_file(&path).map_err(|e| e.to_string())?;

    let config = config?;
    assert_eq!(1, config.geofences.len());
    assert_eq!(3, config.pipeline.workers);

    let pipeline = build_pipeline(&config, false)?;
    assert_eq!(1, pipeline.engine().get_geofence_count());

    Ok(())
}

#[test]
fn broken_config_is_an_error() -> Result<(), String> {
    let path = std::env::temp_dir().join(format!("geotrack-broken-{}.yaml", std::process::id()));
    fs::write(&path, "geofences: [").map_err(|e| e.to_string())?;

    let config = load_config(path.to_str().map(String::from));
    fs::remove_file(&path).map_err(|e| e.to_string())?;

    assert!(config.is_err());

    Ok(())
}

#[test]
fn failed_messages_are_counted() -> Result<(), String> {
    let pipeline = build_pipeline(&Config::default(), false)?;
    let payloads = vec![
        r#"{"assetId":"T","latitude":54.97,"longitude":-1.61}"#.to_string(),
        "not json".to_string(),
        r#"{"assetId":"T","latitude":0.0,"longitude":0.0}"#.to_string(),
    ];

    let (outcomes, failed) = split_results(consume_partitioned(&pipeline, &payloads, 2));

    // Discards are outcomes, not failures
    assert_eq!(2, outcomes.len());
    assert_eq!(1, failed);

    Ok(())
}
