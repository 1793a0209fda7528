use std::sync::Arc;

use serde_json::Value;
use time::macros::datetime;
use time::Duration;
use uuid::Uuid;

use super::dispatch::EventDispatcher;
use super::partition::{consume_partitioned, partition_for};
use super::publisher::{EventPublisher, MemorySink, Topic, WriterSink};
use super::{DiscardReason, IngestOutcome, PositionPipeline, RawPositionMessage};
use crate::error::{ProcessingError, ValidationError};
use crate::geofence::{GeofenceEngine, GeofenceState, GeofenceTransition};
use crate::model::{EventKind, TrackingEvent};
use crate::monitor::OfflineMonitor;

const NEWCASTLE: (f64, f64) = (54.9783, -1.6178);
const LONDON: (f64, f64) = (51.5074, -0.1276);

fn pipeline() -> Result<(PositionPipeline<MemorySink>, Uuid), String> {
    let engine = Arc::new(GeofenceEngine::new());
    let fence = Uuid::new_v4();
    engine
        .register_polygon_geofence(
            fence,
            "Newcastle City Centre",
            &[[-1.65, 54.96], [-1.58, 54.96], [-1.58, 55.00], [-1.65, 55.00]],
        )
        .map_err(|e| e.to_string())?;

    let pipeline = PositionPipeline::new(engine, EventPublisher::new(MemorySink::new()))
        .dispatcher(EventDispatcher::new());

    Ok((pipeline, fence))
}

fn payload(asset: &str, (lat, lon): (f64, f64)) -> String {
    format!(
        r#"{{"assetId":"{}","latitude":{},"longitude":{},"altitude":12.0,"speed":30.0,"heading":90.0,"timestamp":"2024-03-01T12:00:00Z"}}"#,
        asset, lat, lon
    )
}

fn kinds(outcome: &IngestOutcome) -> Vec<EventKind> {
    outcome.events().iter().map(|e| e.kind()).collect()
}

#[test]
fn first_report_only_updates_position() -> Result<(), String> {
    let (pipeline, _) = pipeline()?;

    let outcome = pipeline
        .consume(&payload("TRUCK-1", NEWCASTLE))
        .map_err(|e| e.to_string())?;
    assert_eq!(vec![EventKind::PositionUpdated], kinds(&outcome));

    let sink = pipeline.publisher().sink();
    assert_eq!(1, sink.on(Topic::ProcessedPosition).len());
    assert!(sink.on(Topic::GeofenceAlert).is_empty());

    Ok(())
}

#[test]
fn processed_position_message_shape() -> Result<(), String> {
    let (pipeline, _) = pipeline()?;
    pipeline
        .consume(&payload("TRUCK-1", NEWCASTLE))
        .map_err(|e| e.to_string())?;

    let messages = pipeline.publisher().sink().on(Topic::ProcessedPosition);
    let json: Value = serde_json::from_str(&messages[0]).map_err(|e| e.to_string())?;

    assert_eq!("TRUCK-1", json["assetId"]);
    assert!(json["eventId"].is_string());
    assert!(json["occurredAt"].is_string());
    assert!(json["previousPosition"].is_null());

    let position = &json["position"];
    assert_eq!("TRUCK-1", position["assetId"]);
    assert_eq!(54.9783, position["latitude"]);
    assert_eq!(-1.6178, position["longitude"]);
    assert_eq!(12.0, position["altitude"]);
    assert_eq!(30.0, position["speed"]);
    assert_eq!(90.0, position["heading"]);
    assert_eq!("2024-03-01T12:00:00Z", position["timestamp"]);
    assert_eq!("GPS", position["source"]);

    Ok(())
}

#[test]
fn entry_and_exit_alerts() -> Result<(), String> {
    let (pipeline, fence) = pipeline()?;

    let route = [LONDON, NEWCASTLE, (54.9800, -1.6100), LONDON];
    let mut outcomes = vec![];
    for stop in route {
        outcomes.push(
            pipeline
                .consume(&payload("TRUCK-1", stop))
                .map_err(|e| e.to_string())?,
        );
    }

    assert_eq!(vec![EventKind::PositionUpdated], kinds(&outcomes[0]));
    assert_eq!(
        vec![EventKind::GeofenceBreached, EventKind::PositionUpdated],
        kinds(&outcomes[1])
    );
    assert_eq!(vec![EventKind::PositionUpdated], kinds(&outcomes[2]));
    assert_eq!(
        vec![EventKind::GeofenceExited, EventKind::PositionUpdated],
        kinds(&outcomes[3])
    );

    let alerts = pipeline.publisher().sink().on(Topic::GeofenceAlert);
    assert_eq!(2, alerts.len());

    let breach: Value = serde_json::from_str(&alerts[0]).map_err(|e| e.to_string())?;
    assert_eq!(fence.to_string(), breach["geofenceId"]);
    assert_eq!("Newcastle City Centre", breach["geofenceName"]);
    assert_eq!("TRUCK-1", breach["assetId"]);
    assert_eq!(54.9783, breach["position"]["latitude"]);

    match &outcomes[1].events()[0] {
        TrackingEvent::GeofenceBreached(e) => {
            // The alert carries the triggering position
            let TrackingEvent::PositionUpdated(update) = &outcomes[1].events()[1] else {
                return Err("expected a position update".to_string());
            };
            assert_eq!(update.position, e.position);
        }
        other => return Err(format!("unexpected {:?}", other.kind())),
    }

    Ok(())
}

#[test]
fn filtered_alerts_still_track_state() -> Result<(), String> {
    let (pipeline, fence) = pipeline()?;
    let pipeline = pipeline.alert_filter(Arc::new(|t: &GeofenceTransition| t.is_exit()));

    let mut kinds_seen = vec![];
    for stop in [LONDON, NEWCASTLE, LONDON] {
        let outcome = pipeline
            .consume(&payload("TRUCK-1", stop))
            .map_err(|e| e.to_string())?;
        kinds_seen.push(kinds(&outcome));
    }

    // The entry is not raised but the exit still is
    assert_eq!(vec![EventKind::PositionUpdated], kinds_seen[1]);
    assert_eq!(
        vec![EventKind::GeofenceExited, EventKind::PositionUpdated],
        kinds_seen[2]
    );
    assert_eq!(GeofenceState::Outside, pipeline.engine().get_state("TRUCK-1", fence));

    Ok(())
}

#[test]
fn invalid_coordinates_are_discarded() -> Result<(), String> {
    let (pipeline, _) = pipeline()?;

    let outcome = pipeline
        .consume(&payload("TRUCK-1", (95.0, 0.0)))
        .map_err(|e| e.to_string())?;
    assert_eq!(IngestOutcome::Discarded(DiscardReason::InvalidCoordinates), outcome);

    let outcome = pipeline.process(RawPositionMessage::basic("TRUCK-1", 10.0, 181.0));
    assert_eq!(IngestOutcome::Discarded(DiscardReason::InvalidCoordinates), outcome);

    assert!(pipeline.publisher().sink().messages().is_empty());

    Ok(())
}

#[test]
fn null_island_is_discarded() -> Result<(), String> {
    let (pipeline, _) = pipeline()?;

    let outcome = pipeline.process(RawPositionMessage::basic("TRUCK-1", 0.0, 0.0));
    assert_eq!(IngestOutcome::Discarded(DiscardReason::NullIsland), outcome);
    assert!(outcome.events().is_empty());
    assert!(pipeline.publisher().sink().messages().is_empty());

    Ok(())
}

#[test]
fn bad_heading_is_discarded() -> Result<(), String> {
    let (pipeline, _) = pipeline()?;

    let mut raw = RawPositionMessage::basic("TRUCK-1", NEWCASTLE.0, NEWCASTLE.1);
    raw.heading = 400.0;

    assert_eq!(
        IngestOutcome::Discarded(DiscardReason::Invalid(ValidationError::Heading(400.0))),
        pipeline.process(raw)
    );

    let blank = RawPositionMessage::basic("", NEWCASTLE.0, NEWCASTLE.1);
    assert_eq!(
        IngestOutcome::Discarded(DiscardReason::Invalid(ValidationError::MissingAssetId)),
        pipeline.process(blank)
    );

    Ok(())
}

#[test]
fn malformed_payload_is_an_error() -> Result<(), String> {
    let (pipeline, _) = pipeline()?;

    assert!(matches!(
        pipeline.consume("{\"assetId\": \"X\", \"latitude\": "),
        Err(ProcessingError::Payload(_))
    ));
    assert!(matches!(
        pipeline.consume(r#"{"latitude": 54.0, "longitude": -1.0}"#),
        Err(ProcessingError::Payload(_))
    ));
    assert!(pipeline.publisher().sink().messages().is_empty());

    Ok(())
}

#[test]
fn missing_timestamp_defaults_to_now() -> Result<(), String> {
    let (pipeline, _) = pipeline()?;

    let before = time::OffsetDateTime::now_utc();
    let outcome = pipeline
        .consume(r#"{"assetId":"T","latitude":54.97,"longitude":-1.61,"altitude":0,"speed":0,"heading":0,"timestamp":null}"#)
        .map_err(|e| e.to_string())?;

    let TrackingEvent::PositionUpdated(update) = &outcome.events()[0] else {
        return Err("expected a position update".to_string());
    };
    assert!(update.position.timestamp() >= before);
    assert!(update.previous_position.is_none());

    Ok(())
}

#[test]
fn speed_alerts_when_configured() -> Result<(), String> {
    let (pipeline, _) = pipeline()?;
    let pipeline = pipeline.speed_limit(25.0);

    let outcome = pipeline
        .consume(&payload("TRUCK-1", LONDON))
        .map_err(|e| e.to_string())?;
    assert_eq!(
        vec![EventKind::PositionUpdated, EventKind::SpeedLimitExceeded],
        kinds(&outcome)
    );
    assert_eq!(1, pipeline.publisher().sink().on(Topic::AssetAlert).len());

    Ok(())
}

#[test]
fn offline_sweep_publishes() -> Result<(), String> {
    let (pipeline, _) = pipeline()?;
    let pipeline = pipeline.offline_monitor(Arc::new(OfflineMonitor::new()));

    pipeline
        .consume(&payload("TRUCK-1", LONDON))
        .map_err(|e| e.to_string())?;

    let events = pipeline.sweep_offline(datetime!(2024-03-01 12:30 UTC), Duration::minutes(5));
    assert_eq!(1, events.len());
    assert_eq!(EventKind::AssetOffline, events[0].kind());
    assert_eq!(1, pipeline.publisher().sink().on(Topic::AssetAlert).len());

    Ok(())
}

#[test]
fn sweep_without_monitor_is_empty() -> Result<(), String> {
    let (pipeline, _) = pipeline()?;
    assert!(pipeline
        .sweep_offline(datetime!(2024-03-01 12:30 UTC), Duration::minutes(5))
        .is_empty());

    Ok(())
}

#[test]
fn writer_sink_fanout() -> Result<(), String> {
    let engine = Arc::new(GeofenceEngine::new());
    let pipeline = PositionPipeline::new(engine, EventPublisher::new(WriterSink::fanout(Vec::new())));

    pipeline
        .consume(&payload("TRUCK-1", LONDON))
        .map_err(|e| e.to_string())?;

    let PositionPipeline { publisher, .. } = pipeline;
    let out = String::from_utf8(publisher.into_sink().into_inner()).map_err(|e| e.to_string())?;

    let line: Value = serde_json::from_str(out.trim()).map_err(|e| e.to_string())?;
    assert_eq!("POSITION_UPDATED", line["type"]);
    assert_eq!("TRUCK-1", line["payload"]["assetId"]);

    Ok(())
}

#[test]
fn partitions_are_stable() {
    assert_eq!(partition_for("TRUCK-1", 4), partition_for("TRUCK-1", 4));
    assert!(partition_for("TRUCK-1", 4) < 4);
    assert_eq!(0, partition_for("TRUCK-1", 0));
}

#[test]
fn partitioned_batch_keeps_per_asset_order() -> Result<(), String> {
    let (pipeline, fence) = pipeline()?;

    let mut payloads = vec![];
    for round in 0..10 {
        for n in 0..6 {
            let stop = if round % 2 == 0 { LONDON } else { NEWCASTLE };
            payloads.push(payload(&format!("TRUCK-{n}"), stop));
        }
    }
    payloads.insert(7, "not json".to_string());

    let results = consume_partitioned(&pipeline, &payloads, 3);
    assert_eq!(payloads.len(), results.len());
    assert!(results[7].is_err());

    let breaches = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .flat_map(|o| o.events())
        .filter(|e| e.kind() == EventKind::GeofenceBreached)
        .count();
    let exits = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .flat_map(|o| o.events())
        .filter(|e| e.kind() == EventKind::GeofenceExited)
        .count();

    // Per asset: L N L N L N L N L N -> 5 entries, 4 exits
    assert_eq!(6 * 5, breaches);
    assert_eq!(6 * 4, exits);

    for n in 0..6 {
        assert_eq!(
            GeofenceState::Inside,
            pipeline.engine().get_state(&format!("TRUCK-{n}"), fence)
        );
    }

    Ok(())
}
