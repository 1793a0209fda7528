//! CSV file source integration

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{Reader, ReaderBuilder, StringRecord};
use time::format_description::well_known;
use time::OffsetDateTime;
use tracing::debug;

use super::{FieldsConfiguration, PositionsSource};
use crate::error::SourceError;
use crate::pipeline::RawPositionMessage;

/// CSV positions source
pub struct CsvSource<T>
where
    T: Read,
{
    rdr: Reader<T>,
    fields: FieldsConfiguration,
}

impl<T> CsvSource<T>
where
    T: Read,
{
    pub fn new(rdr: Reader<T>, fields: Option<FieldsConfiguration>) -> Self {
        Self {
            rdr,
            fields: fields.unwrap_or_default(),
        }
    }
}

impl CsvSource<File> {
    pub fn from_path(
        path: impl AsRef<Path>,
        fields: Option<FieldsConfiguration>,
    ) -> Result<Self, SourceError> {
        let rdr = ReaderBuilder::new().flexible(true).from_path(path)?;

        Ok(Self::new(rdr, fields))
    }
}

impl<T> PositionsSource for CsvSource<T>
where
    T: Read,
{
    fn fetch(&mut self) -> Result<Vec<RawPositionMessage>, SourceError> {
        let mut pos = vec![];

        let mut header = self.rdr.headers()?.clone();
        let header_idx = parse_header(&self.fields, &mut header)?;

        for (idx, row) in self.rdr.records().enumerate() {
            let mut rec = row?;
            // Data rows are 1-based after the header
            let line = idx + 1;

            if let Some(raw) = parse_row(&header_idx, line, &mut rec)? {
                pos.push(raw);
            }
        }

        Ok(pos)
    }
}

/// Field to index map
#[derive(Debug)]
struct FieldsIndex {
    asset_id: usize,
    latitude: usize,
    longitude: usize,
    altitude: Option<usize>,
    speed: Option<usize>,
    heading: Option<usize>,
    timestamp: Option<usize>,
}

fn parse_header(
    fields: &FieldsConfiguration,
    header: &mut StringRecord,
) -> Result<FieldsIndex, SourceError> {
    header.trim();

    let find = |name: &str| {
        let name = name.to_lowercase();
        header.iter().position(|h| h.to_lowercase() == name)
    };
    let require = |name: &str| find(name).ok_or_else(|| SourceError::MissingHeader(name.to_string()));

    Ok(FieldsIndex {
        asset_id: require(&fields.asset_id)?,
        latitude: require(&fields.latitude)?,
        longitude: require(&fields.longitude)?,
        altitude: find(&fields.altitude),
        speed: find(&fields.speed),
        heading: find(&fields.heading),
        timestamp: find(&fields.timestamp),
    })
}

fn parse_row(
    header: &FieldsIndex,
    line: usize,
    row: &mut StringRecord,
) -> Result<Option<RawPositionMessage>, SourceError> {
    row.trim();

    let cell = |i: Option<usize>| i.and_then(|i| row.get(i)).filter(|c| !c.is_empty());

    let (Some(asset_id), Some(lat), Some(lng)) = (
        cell(Some(header.asset_id)),
        cell(Some(header.latitude)),
        cell(Some(header.longitude)),
    ) else {
        debug!(line, "Skipping row without asset or coordinates");
        return Ok(None);
    };

    let number = |field: &'static str, value: &str| {
        value.parse::<f64>().map_err(|e| SourceError::Field {
            row: line,
            field,
            reason: e.to_string(),
        })
    };

    let mut raw = RawPositionMessage::basic(asset_id, number("latitude", lat)?, number("longitude", lng)?);

    if let Some(v) = cell(header.altitude) {
        raw.altitude = number("altitude", v)?;
    }
    if let Some(v) = cell(header.speed) {
        raw.speed = number("speed", v)?;
    }
    if let Some(v) = cell(header.heading) {
        raw.heading = number("heading", v)?;
    }
    if let Some(v) = cell(header.timestamp) {
        let time = OffsetDateTime::parse(v, &well_known::Rfc3339).map_err(|e| SourceError::Field {
            row: line,
            field: "timestamp",
            reason: e.to_string(),
        })?;
        raw.timestamp = Some(time);
    }

    Ok(Some(raw))
}
