use std::fmt;
use std::ops::Range;

use chrono::NaiveDateTime;

// ---------------------------------------------------------------------------
// TagColumn – one measured signal
// ---------------------------------------------------------------------------

/// One tag column of the source sheet. `values[i]` belongs to `times[i]` of
/// the owning dataset; `None` is a gap (blank or non-numeric cell).
#[derive(Debug, Clone, PartialEq)]
pub struct TagColumn {
    pub code: String,
    pub values: Vec<Option<f64>>,
}

// ---------------------------------------------------------------------------
// TrendSeries – a borrowed (x, y) view used by the plot builder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct TrendSeries<'a> {
    pub code: &'a str,
    pub x: &'a [NaiveDateTime],
    pub y: &'a [Option<f64>],
}

impl TrendSeries<'_> {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

// ---------------------------------------------------------------------------
// TrendDataset – the complete loaded sheet
// ---------------------------------------------------------------------------

/// A loaded sheet: a sorted time axis plus one column per tag.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendDataset {
    /// Sheet (or file stem) the data came from.
    pub sheet: String,
    /// Row timestamps, ascending.
    pub times: Vec<NaiveDateTime>,
    /// Tag columns in sheet order (time column excluded).
    pub tags: Vec<TagColumn>,
}

impl TrendDataset {
    /// Build a dataset from parsed rows. Rows are sorted by time; rows with
    /// equal timestamps keep their sheet order.
    pub fn from_rows(
        sheet: impl Into<String>,
        codes: Vec<String>,
        mut rows: Vec<(NaiveDateTime, Vec<Option<f64>>)>,
    ) -> Self {
        rows.sort_by_key(|(t, _)| *t);

        let mut tags: Vec<TagColumn> = codes
            .into_iter()
            .map(|code| TagColumn {
                code,
                values: Vec::with_capacity(rows.len()),
            })
            .collect();
        let mut times = Vec::with_capacity(rows.len());

        for (t, values) in rows {
            times.push(t);
            for (idx, col) in tags.iter_mut().enumerate() {
                col.values.push(values.get(idx).copied().flatten());
            }
        }

        TrendDataset {
            sheet: sheet.into(),
            times,
            tags,
        }
    }

    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.times.len()
    }

    /// Number of columns including the time column.
    pub fn column_count(&self) -> usize {
        self.tags.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn tag_codes(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.code.as_str())
    }

    pub fn has_tag(&self, code: &str) -> bool {
        self.column(code).is_some()
    }

    pub fn column(&self, code: &str) -> Option<&TagColumn> {
        self.tags.iter().find(|t| t.code == code)
    }

    pub fn data_start(&self) -> Option<NaiveDateTime> {
        self.times.first().copied()
    }

    pub fn data_end(&self) -> Option<NaiveDateTime> {
        self.times.last().copied()
    }

    /// Row indices with `start <= time <= end`.
    pub fn window(&self, start: NaiveDateTime, end: NaiveDateTime) -> Range<usize> {
        let lo = self.times.partition_point(|t| *t < start);
        let hi = self.times.partition_point(|t| *t <= end);
        lo..hi.max(lo)
    }

    /// The `(time, value)` pairs of one tag over `rows`.
    pub fn series(&self, code: &str, rows: Range<usize>) -> Option<TrendSeries<'_>> {
        let col = self.column(code)?;
        Some(TrendSeries {
            code: &col.code,
            x: &self.times[rows.clone()],
            y: &col.values[rows],
        })
    }

    pub fn stats(&self) -> Option<DatasetStats> {
        Some(DatasetStats {
            start: self.data_start()?,
            end: self.data_end()?,
            points: self.row_count(),
            tags: self.tags.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// DatasetStats – the summary line shown above the charts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetStats {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub points: usize,
    pub tags: usize,
}

impl fmt::Display for DatasetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Start: {}  |  End: {}  |  Data points: {}  |  Tags: {}",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M"),
            group_thousands(self.points),
            self.tags
        )
    }
}

/// `1234567` → `"1,234,567"`.
pub fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn sample() -> TrendDataset {
        TrendDataset::from_rows(
            "Data",
            vec!["FT101".into(), "TT200".into()],
            vec![
                (at(0, 10), vec![Some(3.0), None]),
                (at(0, 0), vec![Some(1.0), Some(10.0)]),
                (at(0, 5), vec![Some(2.0), Some(20.0)]),
            ],
        )
    }

    #[test]
    fn rows_are_sorted_by_time() {
        let ds = sample();
        assert_eq!(ds.times, vec![at(0, 0), at(0, 5), at(0, 10)]);
        assert_eq!(ds.column("FT101").unwrap().values, vec![Some(1.0), Some(2.0), Some(3.0)]);
        assert_eq!(ds.column("TT200").unwrap().values, vec![Some(10.0), Some(20.0), None]);
    }

    #[test]
    fn counts_include_time_column() {
        let ds = sample();
        assert_eq!(ds.row_count(), 3);
        assert_eq!(ds.column_count(), 3);
        assert_eq!(ds.tag_codes().collect::<Vec<_>>(), vec!["FT101", "TT200"]);
    }

    #[test]
    fn window_is_inclusive() {
        let ds = sample();
        assert_eq!(ds.window(at(0, 5), at(0, 10)), 1..3);
        assert_eq!(ds.window(at(0, 1), at(0, 4)), 1..1);
        assert_eq!(ds.window(at(1, 0), at(2, 0)), 3..3);
    }

    #[test]
    fn series_borrows_the_window() {
        let ds = sample();
        let s = ds.series("TT200", 0..2).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.y, &[Some(10.0), Some(20.0)]);
        assert!(ds.series("missing", 0..2).is_none());
    }

    #[test]
    fn stats_line_format() {
        let stats = sample().stats().unwrap();
        assert_eq!(
            stats.to_string(),
            "Start: 2024-03-01 00:00  |  End: 2024-03-01 00:10  |  Data points: 3  |  Tags: 2"
        );
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }
}
