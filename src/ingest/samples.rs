/// Sample table loader.
///
/// Reads the CSV export of the sample spreadsheet into `Sample`s. Every
/// row must carry a known site, a parseable timestamp, and a finite number
/// in each regulated parameter column; anything else is a
/// `DataQualityError` and aborts the load. Nothing is coerced or skipped.
///
/// Header names from the spreadsheet export (`Location`, `Date`,
/// `Turbidity_NTU`, ...) and plain lowercase names (`site`, `timestamp`,
/// `turbidity`, ...) are both accepted.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::model::{DataQualityError, Sample, SampleId};

// ============================================================================
// Column Layout
// ============================================================================

/// Accepted header spellings per column, spreadsheet name first.
const SITE_COLUMN: &[&str] = &["Location", "site"];
const TIMESTAMP_COLUMN: &[&str] = &["Date", "timestamp"];
const PH_COLUMN: &[&str] = &["pH", "ph"];
const TURBIDITY_COLUMN: &[&str] = &["Turbidity_NTU", "turbidity"];
const CHLORINE_COLUMN: &[&str] = &["Chlorine_mgl", "chlorine"];
const NITRATE_COLUMN: &[&str] = &["Nitrates_mgl", "nitrate"];
const LEAD_COLUMN: &[&str] = &["Lead_ugl", "lead"];
const BACTERIA_COLUMN: &[&str] = &["Bacteria_CFU", "bacteria"];

/// Timestamp formats tried in order after RFC 3339.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Resolved column positions for one input header.
struct ColumnIndex {
    site: usize,
    timestamp: usize,
    ph: usize,
    turbidity: usize,
    chlorine: usize,
    nitrate: usize,
    lead: usize,
    bacteria: Option<usize>,
}

impl ColumnIndex {
    fn from_header(header: &csv::StringRecord) -> Result<Self, DataQualityError> {
        Ok(Self {
            site: require_column(header, SITE_COLUMN)?,
            timestamp: require_column(header, TIMESTAMP_COLUMN)?,
            ph: require_column(header, PH_COLUMN)?,
            turbidity: require_column(header, TURBIDITY_COLUMN)?,
            chlorine: require_column(header, CHLORINE_COLUMN)?,
            nitrate: require_column(header, NITRATE_COLUMN)?,
            lead: require_column(header, LEAD_COLUMN)?,
            bacteria: find_column(header, BACTERIA_COLUMN),
        })
    }
}

fn find_column(header: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    header
        .iter()
        .position(|h| names.iter().any(|n| h.trim() == *n))
}

fn require_column(header: &csv::StringRecord, names: &[&str]) -> Result<usize, DataQualityError> {
    find_column(header, names).ok_or_else(|| DataQualityError::MissingColumn(names[0].to_string()))
}

// ============================================================================
// Loading
// ============================================================================

/// Loads every sample from the CSV file at `path`.
///
/// A missing file is reported as `FileNotFound` so the caller can tell it
/// apart from a malformed one.
pub fn load_samples(path: &Path, known_sites: &[String]) -> Result<Vec<Sample>, DataQualityError> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DataQualityError::FileNotFound(path.display().to_string())
        } else {
            DataQualityError::Unreadable {
                path: path.display().to_string(),
                message: e.to_string(),
            }
        }
    })?;
    load_samples_from_reader(file, &path.display().to_string(), known_sites)
}

/// Loads samples from any CSV source. `origin` names the source in errors.
///
/// Sample ids are assigned from 0 in row order. An input with a header but
/// no data rows is `EmptyDataset`.
pub fn load_samples_from_reader<R: Read>(
    reader: R,
    origin: &str,
    known_sites: &[String],
) -> Result<Vec<Sample>, DataQualityError> {
    let unreadable = |e: csv::Error| DataQualityError::Unreadable {
        path: origin.to_string(),
        message: e.to_string(),
    };

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let header = rdr.headers().map_err(unreadable)?.clone();
    if header.is_empty() {
        return Err(DataQualityError::EmptyDataset);
    }
    let columns = ColumnIndex::from_header(&header)?;

    let mut samples = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let record = result.map_err(unreadable)?;
        samples.push(parse_record(&record, &columns, &header, i, known_sites)?);
    }

    if samples.is_empty() {
        return Err(DataQualityError::EmptyDataset);
    }
    Ok(samples)
}

// ============================================================================
// Row Parsing
// ============================================================================

fn parse_record(
    record: &csv::StringRecord,
    columns: &ColumnIndex,
    header: &csv::StringRecord,
    index: usize,
    known_sites: &[String],
) -> Result<Sample, DataQualityError> {
    // 1-based data row number, as a spreadsheet user would count it.
    let row = index + 1;
    let column_name = |i: usize| header.get(i).unwrap_or("?").to_string();

    let site = required_field(record, columns.site, row, &column_name)?;
    if !known_sites.iter().any(|s| s == site) {
        return Err(DataQualityError::UnknownSite {
            row,
            site: site.to_string(),
        });
    }

    let raw_timestamp = required_field(record, columns.timestamp, row, &column_name)?;
    let timestamp = parse_timestamp(raw_timestamp).ok_or_else(|| DataQualityError::BadTimestamp {
        row,
        value: raw_timestamp.to_string(),
    })?;

    let number = |i: usize| -> Result<f64, DataQualityError> {
        let raw = required_field(record, i, row, &column_name)?;
        parse_number(raw).ok_or_else(|| DataQualityError::NonNumeric {
            row,
            column: column_name(i),
            value: raw.to_string(),
        })
    };

    let bacteria_cfu = match columns.bacteria {
        Some(i) => match record.get(i) {
            Some(raw) if !raw.is_empty() => Some(parse_number(raw).ok_or_else(|| {
                DataQualityError::NonNumeric {
                    row,
                    column: column_name(i),
                    value: raw.to_string(),
                }
            })?),
            _ => None,
        },
        None => None,
    };

    Ok(Sample {
        id: SampleId(index),
        site: site.to_string(),
        timestamp,
        ph: number(columns.ph)?,
        turbidity_ntu: number(columns.turbidity)?,
        chlorine_mgl: number(columns.chlorine)?,
        nitrate_mgl: number(columns.nitrate)?,
        lead_ugl: number(columns.lead)?,
        bacteria_cfu,
    })
}

fn required_field<'r>(
    record: &'r csv::StringRecord,
    index: usize,
    row: usize,
    column_name: &dyn Fn(usize) -> String,
) -> Result<&'r str, DataQualityError> {
    match record.get(index) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(DataQualityError::MissingValue {
            row,
            column: column_name(index),
        }),
    }
}

/// Parses a finite number. `NaN` and infinities are rejected like text.
fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses the timestamp formats produced by spreadsheet exports.
///
/// Offsets in RFC 3339 input are normalised away (UTC wall-clock time is
/// kept); date-only values are taken as midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// ============================================================================
// Tests
// ============================================================================
