//! CSV readers and writers for point, median and region tables.

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use flate2::read::GzDecoder;
use hashbrown::HashSet;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tracing::info;

use crate::error::{LocalnessError, Result};
use crate::models::{
    EntityLocation, EntityMedian, EntityRegion, EntityRegionCount, GeoPoint, PointInput,
    PointRecord,
};

pub const ENTITY_COLUMN: &str = "uid";
pub const MEDIAN_COLUMN: &str = "median";

/// Open an input file, decompressing `.gz` transparently.
pub fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    let file = BufReader::new(File::open(path)?);
    let reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(reader)
}

fn column(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| LocalnessError::MissingColumn(name.to_string()))
}

/// I/O failures stay fatal; anything else about a row makes that row malformed.
fn row_error(e: csv::Error) -> LocalnessError {
    if e.is_io_error() {
        LocalnessError::Csv(e)
    } else {
        LocalnessError::MalformedPoint(e.to_string())
    }
}

fn malformed(record: &StringRecord) -> LocalnessError {
    LocalnessError::MalformedPoint(record.iter().collect::<Vec<_>>().join(","))
}

/// Read `uid,lat,lon` rows.
///
/// Rows with unparsable or out-of-range coordinates come back as
/// [`LocalnessError::MalformedPoint`] so callers can skip them and continue.
pub fn point_records<R: Read>(reader: R) -> Result<impl Iterator<Item = Result<PointRecord>>> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let uid_idx = column(&headers, ENTITY_COLUMN)?;
    let lat_idx = column(&headers, "lat")?;
    let lon_idx = column(&headers, "lon")?;

    Ok(csv_reader.into_records().map(move |result| {
        let record = result.map_err(row_error)?;
        let (Some(uid), Some(lat), Some(lon)) =
            (record.get(uid_idx), record.get(lat_idx), record.get(lon_idx))
        else {
            return Err(malformed(&record));
        };
        let (Ok(lat), Ok(lon)) = (lat.trim().parse::<f64>(), lon.trim().parse::<f64>()) else {
            return Err(malformed(&record));
        };
        let point = GeoPoint::new(lat, lon);
        if !point.is_valid() {
            return Err(malformed(&record));
        }
        Ok(PointRecord {
            entity_id: uid.to_string(),
            point,
        })
    }))
}

/// Read `uid,<point_column>` rows where the point is `(lat, lon)` or empty.
///
/// With `passthrough_column`, that column's value is carried on each row.
pub fn point_inputs<R: Read>(
    reader: R,
    point_column: &str,
    passthrough_column: Option<&str>,
) -> Result<impl Iterator<Item = Result<PointInput>>> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let uid_idx = column(&headers, ENTITY_COLUMN)?;
    let point_idx = column(&headers, point_column)?;
    let passthrough_idx = passthrough_column
        .map(|name| column(&headers, name))
        .transpose()?;

    Ok(csv_reader.into_records().map(move |result| {
        let record = result.map_err(row_error)?;
        let Some(uid) = record.get(uid_idx) else {
            return Err(malformed(&record));
        };
        let point = match record.get(point_idx).map(str::trim) {
            None | Some("") => None,
            Some(text) => Some(text.parse::<GeoPoint>()?),
        };
        let passthrough =
            passthrough_idx.map(|idx| record.get(idx).unwrap_or_default().to_string());
        Ok(PointInput {
            entity_id: uid.to_string(),
            point,
            passthrough,
        })
    }))
}

/// Collect the entity ids already present in earlier output files.
pub fn read_entity_ids(path: &Path) -> Result<HashSet<String>> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(open_input(path)?);
    let uid_idx = column(csv_reader.headers()?, ENTITY_COLUMN)?;

    let mut ids = HashSet::new();
    for result in csv_reader.records() {
        let record = result?;
        if let Some(uid) = record.get(uid_idx) {
            ids.insert(uid.to_string());
        }
    }

    info!("Loaded {} entity ids from {}", ids.len(), path.display());
    Ok(ids)
}

fn format_point(point: Option<GeoPoint>) -> String {
    point.map(|p| p.to_string()).unwrap_or_default()
}

/// CSV output with a fixed header.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(inner: W, header: &[&str]) -> Result<Self> {
        let mut writer = WriterBuilder::new().from_writer(inner);
        writer.write_record(header)?;
        Ok(Self { writer })
    }

    /// `uid,median`
    pub fn medians(inner: W) -> Result<Self> {
        Self::new(inner, &[ENTITY_COLUMN, MEDIAN_COLUMN])
    }

    /// `uid,<region_column>`, or `uid,<passthrough>,<region_column>`
    pub fn regions(
        inner: W,
        passthrough_column: Option<&str>,
        region_column: &str,
    ) -> Result<Self> {
        match passthrough_column {
            Some(passthrough) => Self::new(inner, &[ENTITY_COLUMN, passthrough, region_column]),
            None => Self::new(inner, &[ENTITY_COLUMN, region_column]),
        }
    }

    /// `uid,median,<region_column>`
    pub fn locations(inner: W, region_column: &str) -> Result<Self> {
        Self::new(inner, &[ENTITY_COLUMN, MEDIAN_COLUMN, region_column])
    }

    pub fn write_median(&mut self, row: &EntityMedian) -> Result<()> {
        self.writer
            .write_record([row.entity_id.as_str(), format_point(row.median).as_str()])?;
        Ok(())
    }

    pub fn write_region(&mut self, row: &EntityRegion) -> Result<()> {
        let region = row.region.as_deref().unwrap_or_default();
        match &row.passthrough {
            Some(passthrough) => self.writer.write_record([
                row.entity_id.as_str(),
                passthrough.as_str(),
                region,
            ])?,
            None => self.writer.write_record([row.entity_id.as_str(), region])?,
        }
        Ok(())
    }

    pub fn write_location(&mut self, row: &EntityLocation) -> Result<()> {
        self.writer.write_record([
            row.entity_id.as_str(),
            format_point(row.median).as_str(),
            row.region.as_deref().unwrap_or_default(),
        ])?;
        Ok(())
    }

    pub fn write_region_count(&mut self, row: &EntityRegionCount) -> Result<()> {
        self.writer
            .write_record([row.entity_id.as_str(), row.regions.to_string().as_str()])?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| LocalnessError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_records_flag_malformed_rows() {
        let data = "uid,lat,lon\n1,44.97,-93.26\n1,abc,-93.26\n2,95.0,0.0\n2,10.0,20.0\n";
        let rows: Vec<Result<PointRecord>> = point_records(data.as_bytes()).unwrap().collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[0].as_ref().unwrap().point,
            GeoPoint::new(44.97, -93.26)
        );
        assert!(matches!(rows[1], Err(LocalnessError::MalformedPoint(_))));
        assert!(matches!(rows[2], Err(LocalnessError::MalformedPoint(_))));
        assert_eq!(rows[3].as_ref().unwrap().entity_id, "2");
    }

    #[test]
    fn test_point_records_requires_columns() {
        let data = "user,lat,lon\n1,1,1\n";
        assert!(matches!(
            point_records(data.as_bytes()),
            Err(LocalnessError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_point_inputs() {
        let data = "uid,median\n1,\"(44.97, -93.26)\"\n2,\n3,nonsense\n";
        let rows: Vec<Result<PointInput>> =
            point_inputs(data.as_bytes(), MEDIAN_COLUMN, None).unwrap().collect();
        assert_eq!(
            rows[0].as_ref().unwrap().point,
            Some(GeoPoint::new(44.97, -93.26))
        );
        assert_eq!(rows[0].as_ref().unwrap().passthrough, None);
        assert_eq!(rows[1].as_ref().unwrap().point, None);
        assert!(rows[2].is_err());
    }

    #[test]
    fn test_location_field_passes_through() {
        let data = "uid,loc_field,pt\n1,\"Minneapolis, MN\",\"(44.97, -93.26)\"\n2,,\n";
        let rows: Vec<PointInput> = point_inputs(data.as_bytes(), "pt", Some("loc_field"))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows[0].passthrough.as_deref(), Some("Minneapolis, MN"));
        assert_eq!(rows[1].passthrough.as_deref(), Some(""));
        assert!(matches!(
            point_inputs(data.as_bytes(), "pt", Some("location")),
            Err(LocalnessError::MissingColumn(_))
        ));

        let mut sink = CsvSink::regions(Vec::new(), Some("loc_field"), "county").unwrap();
        sink.write_region(&EntityRegion {
            entity_id: "1".to_string(),
            passthrough: rows[0].passthrough.clone(),
            region: Some("27053".to_string()),
        })
        .unwrap();
        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(text, "uid,loc_field,county\n1,\"Minneapolis, MN\",27053\n");
    }

    #[test]
    fn test_sink_writes_empty_for_none() {
        let mut sink = CsvSink::medians(Vec::new()).unwrap();
        sink.write_median(&EntityMedian {
            entity_id: "1".to_string(),
            median: Some(GeoPoint::new(1.5, -2.25)),
        })
        .unwrap();
        sink.write_median(&EntityMedian {
            entity_id: "2".to_string(),
            median: None,
        })
        .unwrap();
        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(text, "uid,median\n1,\"(1.5, -2.25)\"\n2,\n");
    }

    #[test]
    fn test_read_entity_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medians.csv");
        std::fs::write(&path, "uid,median\n7,\n8,\"(1, 2)\"\n").unwrap();
        let ids = read_entity_ids(&path).unwrap();
        assert!(ids.contains("7") && ids.contains("8"));
        assert_eq!(ids.len(), 2);
    }
}
