//! GPX route replay
//!
//! Track points are replayed as reports of a single asset. Speed (km/h)
//! and heading are derived from each point's predecessor; the first point
//! of the file reports neither.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use geo::Point;
use gpx::Waypoint;
use time::format_description::well_known::Iso8601;
use time::OffsetDateTime;
use tracing::info;

use super::PositionsSource;
use crate::error::SourceError;
use crate::pipeline::RawPositionMessage;
use crate::spatial;

/// GPX track source
pub struct GpxSource<R: Read> {
    reader: Option<R>,
    asset_id: String,
}

impl<R: Read> GpxSource<R> {
    pub fn new(reader: R, asset_id: impl Into<String>) -> Self {
        Self {
            reader: Some(reader),
            asset_id: asset_id.into(),
        }
    }
}

impl GpxSource<BufReader<File>> {
    pub fn from_path(path: impl AsRef<Path>, asset_id: impl Into<String>) -> Result<Self, SourceError> {
        let file = File::open(path)?;

        Ok(Self::new(BufReader::new(file), asset_id))
    }
}

impl<R: Read> PositionsSource for GpxSource<R> {
    /// Reads the whole document on the first call, later calls yield nothing
    fn fetch(&mut self) -> Result<Vec<RawPositionMessage>, SourceError> {
        let Some(reader) = self.reader.take() else {
            return Ok(vec![]);
        };

        let doc = gpx::read(reader)?;

        let points: Vec<&Waypoint> = doc
            .tracks
            .iter()
            .flat_map(|t| t.segments.iter())
            .flat_map(|s| s.points.iter())
            .collect();

        info!(asset_id = %self.asset_id, points = points.len(), "Replaying GPX track");

        let mut pos = Vec::with_capacity(points.len());
        let mut prev: Option<(Point, Option<OffsetDateTime>)> = None;

        for (idx, wp) in points.into_iter().enumerate() {
            let point = wp.point();
            let time = waypoint_time(wp, idx + 1)?;

            let mut raw = RawPositionMessage::basic(self.asset_id.clone(), point.y(), point.x());
            raw.altitude = wp.elevation.unwrap_or(0.0);
            raw.timestamp = time;

            let to = spatial::create_point(point.x(), point.y());

            if let Some((from, prev_time)) = prev {
                raw.heading = spatial::bearing(&from, &to);

                if let (Some(start), Some(end)) = (prev_time, time) {
                    let hours = (end - start).as_seconds_f64() / 3600.0;
                    if hours > 0.0 {
                        raw.speed = spatial::distance_metres(&from, &to) / 1000.0 / hours;
                    }
                }
            }

            pos.push(raw);
            prev = Some((to, time));
        }

        Ok(pos)
    }
}

/// The gpx crate only hands its timestamps back as ISO 8601 text
fn waypoint_time(wp: &Waypoint, point: usize) -> Result<Option<OffsetDateTime>, SourceError> {
    let Some(time) = &wp.time else {
        return Ok(None);
    };

    let text = time.format()?;
    let parsed = OffsetDateTime::parse(&text, &Iso8601::DEFAULT).map_err(|e| SourceError::Field {
        row: point,
        field: "time",
        reason: e.to_string(),
    })?;

    Ok(Some(parsed))
}
