use std::io::Cursor;
use std::path::{Path, PathBuf};

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, TimeUnit, TimestampMillisecondType};
use bytes::Bytes;
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::TrendDataset;
use super::tag_refs::{TagRefs, TAG_REFS_SHEET};
use crate::error::LoadError;

type Row = (NaiveDateTime, Vec<Option<f64>>);

// ---------------------------------------------------------------------------
// SourceFile – an uploaded or opened file, kept in memory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// xlsx / xlsm / xlsb / xls / ods, one dataset per sheet.
    Workbook,
    /// A single table; the "sheet" is named after the file stem.
    Csv,
    Parquet,
}

impl SourceKind {
    pub fn from_file_name(file_name: &str) -> Result<Self, LoadError> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "xla" | "ods" => Ok(SourceKind::Workbook),
            "csv" => Ok(SourceKind::Csv),
            "parquet" | "pq" => Ok(SourceKind::Parquet),
            other => Err(LoadError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// A trend file held in memory. Construction validates the file and lists
/// its sheets; each sheet is parsed on demand.
#[derive(Debug, Clone)]
pub struct SourceFile {
    file_name: String,
    kind: SourceKind,
    bytes: Bytes,
    sheet_names: Vec<String>,
}

impl SourceFile {
    /// Read a file from disk. Windows drive paths are retried under `/mnt/<drive>`.
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        let path = resolve_input_path(path);
        let bytes = std::fs::read(&path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(file_name, bytes)
    }

    pub fn from_bytes(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Result<Self, LoadError> {
        let file_name = file_name.into();
        let bytes = bytes.into();
        let kind = SourceKind::from_file_name(&file_name)?;

        let sheet_names = match kind {
            SourceKind::Workbook => {
                let workbook = open_workbook_auto_from_rs(Cursor::new(bytes.as_ref()))?;
                workbook.sheet_names()
            }
            SourceKind::Csv | SourceKind::Parquet => vec![file_stem(&file_name)],
        };

        Ok(SourceFile {
            file_name,
            kind,
            bytes,
            sheet_names,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn sheet_names(&self) -> &[String] {
        &self.sheet_names
    }

    /// First sheet that is not the tag reference sheet.
    pub fn default_sheet(&self) -> Option<&str> {
        self.sheet_names
            .iter()
            .map(String::as_str)
            .find(|s| *s != TAG_REFS_SHEET)
    }

    /// Parse one sheet into a dataset sorted by time.
    pub fn load_sheet(&self, sheet: &str) -> Result<TrendDataset, LoadError> {
        if !self.sheet_names.iter().any(|s| s == sheet) {
            return Err(LoadError::SheetNotFound(sheet.to_string()));
        }
        let dataset = match self.kind {
            SourceKind::Workbook => {
                let range = self.worksheet(sheet)?;
                load_range(sheet, &range)?
            }
            SourceKind::Csv => load_csv(sheet, &self.bytes)?,
            SourceKind::Parquet => load_parquet(sheet, self.bytes.clone())?,
        };
        if dataset.is_empty() {
            return Err(LoadError::NoTimestampData(sheet.to_string()));
        }
        Ok(dataset)
    }

    /// Tag metadata and chart packages from the `Tag Refs` sheet, if present.
    pub fn tag_refs(&self) -> TagRefs {
        if self.kind != SourceKind::Workbook || !self.sheet_names.iter().any(|s| s == TAG_REFS_SHEET) {
            return TagRefs::default();
        }
        match self.worksheet(TAG_REFS_SHEET) {
            Ok(range) => TagRefs::from_range(&range),
            Err(e) => {
                log::warn!("ignoring unreadable '{TAG_REFS_SHEET}' sheet: {e}");
                TagRefs::default()
            }
        }
    }

    fn worksheet(&self, sheet: &str) -> Result<Range<Data>, LoadError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(self.bytes.as_ref()))?;
        workbook
            .worksheet_range(sheet)
            .map_err(|e| LoadError::SheetNotFound(format!("{sheet}: {e}")))
    }
}

fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}

/// Map `C:\dir\file.xlsx` to `/mnt/c/dir/file.xlsx` when the path does not
/// exist as given. Anything else is returned unchanged.
pub fn resolve_input_path(path: &Path) -> PathBuf {
    if path.exists() {
        return path.to_path_buf();
    }
    let raw = path.to_string_lossy();
    let bytes = raw.as_bytes();
    if bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && (bytes[2] == b'\\' || bytes[2] == b'/') {
        let drive = (bytes[0] as char).to_ascii_lowercase();
        let rest = raw[3..].replace('\\', "/");
        return PathBuf::from(format!("/mnt/{drive}/{rest}"));
    }
    path.to_path_buf()
}

// ---------------------------------------------------------------------------
// Header names
// ---------------------------------------------------------------------------

/// Names for the tag columns (header cells after the time column). Blank
/// headers become `Unnamed: N`, repeats get `.1`, `.2`, … suffixes.
fn tag_names<I>(headers: I) -> Vec<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    let mut names: Vec<String> = Vec::new();
    for (offset, header) in headers.into_iter().enumerate() {
        let base = header.unwrap_or_else(|| format!("Unnamed: {}", offset + 1));
        let mut name = base.clone();
        let mut n = 1;
        while names.contains(&name) {
            name = format!("{base}.{n}");
            n += 1;
        }
        names.push(name);
    }
    names
}

// ---------------------------------------------------------------------------
// Workbook sheets
// ---------------------------------------------------------------------------

fn load_range(sheet: &str, range: &Range<Data>) -> Result<TrendDataset, LoadError> {
    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| LoadError::EmptySheet(sheet.to_string()))?;
    let codes = tag_names(header.iter().skip(1).map(cell_text));

    let parsed: Vec<Row> = rows
        .filter_map(|row| {
            let time = row.first().and_then(cell_time)?;
            let values = row.iter().skip(1).map(cell_number).collect();
            Some((time, values))
        })
        .collect();

    log::debug!("sheet '{sheet}': {} rows with a valid timestamp", parsed.len());
    Ok(TrendDataset::from_rows(sheet, codes, parsed))
}

/// Display text of a cell, `None` for blanks and error cells.
pub(crate) fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{f:.0}")
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match excel_serial_to_datetime(dt.as_f64()) {
            Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => dt.as_f64().to_string(),
        },
    };
    (!text.is_empty()).then_some(text)
}

/// Numeric value of a cell: numbers and numeric text; everything else is a gap.
pub(crate) fn cell_number(cell: &Data) -> Option<f64> {
    let value = match cell {
        Data::Float(f) => *f,
        Data::Int(i) => *i as f64,
        Data::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

fn cell_time(cell: &Data) -> Option<NaiveDateTime> {
    match cell {
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64()),
        Data::Float(f) => excel_serial_to_datetime(*f),
        Data::Int(i) => excel_serial_to_datetime(*i as f64),
        Data::String(s) | Data::DateTimeIso(s) => parse_time_text(s),
        _ => None,
    }
}

/// Excel serial day number (1900 date system, epoch 1899-12-30) to a
/// timestamp rounded to the millisecond.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    // 2958466 is 10000-01-01, past the last date Excel can show.
    if !serial.is_finite() || !(0.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y"];

/// Parse timestamp text. Offsets are dropped (wall-clock time is kept).
pub fn parse_time_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// Header row, then one row per timestamp. First column is the time.
fn load_csv(sheet: &str, bytes: &[u8]) -> Result<TrendDataset, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(LoadError::EmptySheet(sheet.to_string()));
    }
    let codes = tag_names(
        headers
            .iter()
            .skip(1)
            .map(|h| (!h.is_empty()).then(|| h.to_string())),
    );

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(time) = record.get(0).and_then(parse_time_text) else {
            continue;
        };
        let values = (1..=codes.len())
            .map(|i| {
                record
                    .get(i)
                    .and_then(|v| v.parse::<f64>().ok())
                    .filter(|v| v.is_finite())
            })
            .collect();
        rows.push((time, values));
    }

    Ok(TrendDataset::from_rows(sheet, codes, rows))
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// First column is the time (timestamp, date, text or Excel serial); every
/// other column is cast to f64, with non-castable cells left as gaps.
fn load_parquet(sheet: &str, bytes: Bytes) -> Result<TrendDataset, LoadError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
    let schema = builder.schema().clone();
    if schema.fields().is_empty() {
        return Err(LoadError::EmptySheet(sheet.to_string()));
    }
    let codes: Vec<String> = schema
        .fields()
        .iter()
        .skip(1)
        .map(|f| f.name().clone())
        .collect();

    let mut rows = Vec::new();
    for batch in builder.build()? {
        let batch = batch?;
        let times = time_values(batch.column(0))?;
        let columns: Vec<Vec<Option<f64>>> = (1..batch.num_columns())
            .map(|i| float_values(batch.column(i)))
            .collect();

        for (row, time) in times.into_iter().enumerate() {
            let Some(time) = time else { continue };
            let values = columns.iter().map(|col| col[row]).collect();
            rows.push((time, values));
        }
    }

    Ok(TrendDataset::from_rows(sheet, codes, rows))
}

fn time_values(col: &ArrayRef) -> Result<Vec<Option<NaiveDateTime>>, LoadError> {
    match col.data_type() {
        DataType::Timestamp(_, tz) => {
            let millis = cast(col.as_ref(), &DataType::Timestamp(TimeUnit::Millisecond, tz.clone()))?;
            Ok(millis_to_times(&millis))
        }
        DataType::Date32 | DataType::Date64 => {
            let millis = cast(col.as_ref(), &DataType::Timestamp(TimeUnit::Millisecond, None))?;
            Ok(millis_to_times(&millis))
        }
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            let text = cast(col.as_ref(), &DataType::Utf8)?;
            Ok(text
                .as_string::<i32>()
                .iter()
                .map(|v| v.and_then(parse_time_text))
                .collect())
        }
        _ => Ok(float_values(col)
            .into_iter()
            .map(|v| v.and_then(excel_serial_to_datetime))
            .collect()),
    }
}

fn millis_to_times(col: &ArrayRef) -> Vec<Option<NaiveDateTime>> {
    col.as_primitive::<TimestampMillisecondType>()
        .iter()
        .map(|v| v.and_then(DateTime::from_timestamp_millis).map(|t| t.naive_utc()))
        .collect()
}

fn float_values(col: &ArrayRef) -> Vec<Option<f64>> {
    match cast(col.as_ref(), &DataType::Float64) {
        Ok(values) => values
            .as_primitive::<Float64Type>()
            .iter()
            .map(|v| v.filter(|f| f.is_finite()))
            .collect(),
        Err(e) => {
            log::debug!("column of type {:?} is not numeric: {e}", col.data_type());
            vec![None; col.len()]
        }
    }
}
