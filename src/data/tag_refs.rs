//! The optional `Tag Refs` sheet: per-tag display metadata and predefined
//! chart packages. Cells are addressed by absolute position (row 1 and
//! column A are index 0).

use std::collections::BTreeMap;

use calamine::{Data, Range};
use serde::Serialize;

use super::loader::{cell_number, cell_text};
use crate::state::NUM_SERIES;

pub const TAG_REFS_SHEET: &str = "Tag Refs";

const TAG_ROWS: std::ops::Range<u32> = 8..28;
const PACKAGE_ROWS: std::ops::Range<u32> = 31..49;

const COL_PKG_NUM: u32 = 3;
const COL_NAME: u32 = 4;
const COL_CODE: u32 = 5;
const COL_DECIMALS: u32 = 11;
const COL_UNITS: u32 = 12;
const COLS_Y_HIGH: [u32; 2] = [15, 18];
const COLS_Y_LOW: [u32; 2] = [16, 19];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagInfo {
    pub name: String,
    pub units: String,
    pub decimals: u32,
    pub y_high: Option<f64>,
    pub y_low: Option<f64>,
}

/// A predefined chart: left tag, right tag and an optional second right tag,
/// given by friendly name or code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPackage {
    pub num: String,
    pub tags: [Option<String>; 3],
}

impl ChartPackage {
    pub fn label(&self) -> String {
        let names: Vec<&str> = self.tags.iter().flatten().map(String::as_str).collect();
        format!("Pkg {}: {}", self.num, names.join(" / "))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagRefs {
    /// Tag code → metadata.
    pub tags: BTreeMap<String, TagInfo>,
    pub packages: Vec<ChartPackage>,
    /// Friendly name → tag code; later rows win on duplicate names.
    pub name_to_code: BTreeMap<String, String>,
}

impl TagRefs {
    pub fn from_range(range: &Range<Data>) -> Self {
        let text = |row: u32, col: u32| range.get_value((row, col)).and_then(cell_text);
        let number = |row: u32, col: u32| range.get_value((row, col)).and_then(cell_number);

        let mut refs = TagRefs::default();

        for row in TAG_ROWS {
            let Some(code) = text(row, COL_CODE) else {
                continue;
            };
            let name = text(row, COL_NAME).unwrap_or_else(|| code.clone());
            let decimals = number(row, COL_DECIMALS)
                .map(|d| d.round().clamp(0.0, 10.0) as u32)
                .unwrap_or(1);
            let info = TagInfo {
                name: name.clone(),
                units: text(row, COL_UNITS).unwrap_or_default(),
                decimals,
                y_high: COLS_Y_HIGH.iter().find_map(|&c| number(row, c)),
                y_low: COLS_Y_LOW.iter().find_map(|&c| number(row, c)),
            };
            refs.name_to_code.insert(name, code.clone());
            refs.tags.insert(code, info);
        }

        let mut row = PACKAGE_ROWS.start;
        while row < PACKAGE_ROWS.end {
            let Some(num) = text(row, COL_PKG_NUM) else {
                row += 1;
                continue;
            };
            let left = text(row, COL_NAME);
            let right = text(row, COL_CODE);
            let mut right_2 = None;
            // A continuation row (blank package number) carries a second right-axis tag.
            if text(row + 1, COL_PKG_NUM).is_none() {
                right_2 = text(row + 1, COL_CODE);
                row += 1;
            }
            if left.is_some() || right.is_some() {
                refs.packages.push(ChartPackage {
                    num,
                    tags: [left, right, right_2],
                });
            }
            row += 1;
        }

        log::info!(
            "tag refs: {} tags, {} chart packages",
            refs.tags.len(),
            refs.packages.len()
        );
        refs
    }

    pub fn info(&self, code: &str) -> Option<&TagInfo> {
        self.tags.get(code)
    }

    /// `CODE - Name [units]` for known tags, the bare code otherwise.
    pub fn tag_label(&self, code: &str) -> String {
        match self.tags.get(code) {
            Some(info) if info.units.is_empty() => format!("{code} - {}", info.name),
            Some(info) => format!("{code} - {} [{}]", info.name, info.units),
            None => code.to_string(),
        }
    }

    pub fn package(&self, num: &str) -> Option<&ChartPackage> {
        self.packages.iter().find(|p| p.num == num)
    }

    /// Series codes for a package: each entry is resolved by friendly name,
    /// then as a literal code present in the data, else left empty.
    pub fn resolve_package<F>(&self, num: &str, in_data: F) -> Option<[Option<String>; NUM_SERIES]>
    where
        F: Fn(&str) -> bool,
    {
        let pkg = self.package(num)?;
        let mut series: [Option<String>; NUM_SERIES] = Default::default();
        for (slot, name) in series.iter_mut().zip(pkg.tags.iter()) {
            *slot = name.as_deref().and_then(|n| {
                self.name_to_code
                    .get(n)
                    .cloned()
                    .or_else(|| in_data(n).then(|| n.to_string()))
            });
        }
        Some(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Data {
        Data::String(v.to_string())
    }

    fn sheet() -> Range<Data> {
        let mut r = Range::new((0, 0), (50, 20));
        r.set_value((0, 0), s("Tag reference"));
        // tag rows
        r.set_value((8, COL_NAME), s("Steam Flow"));
        r.set_value((8, COL_CODE), s("FT101"));
        r.set_value((8, COL_DECIMALS), Data::Float(2.0));
        r.set_value((8, COL_UNITS), s("t/hr"));
        r.set_value((8, 15), Data::Float(120.0));
        r.set_value((8, 16), Data::Float(0.0));
        r.set_value((9, COL_CODE), s("TT200"));
        r.set_value((9, 18), Data::Float(900.0));
        r.set_value((10, COL_NAME), s("no code here"));
        r.set_value((28, COL_CODE), s("OUTSIDE"));
        // packages
        r.set_value((31, COL_PKG_NUM), Data::Float(1.0));
        r.set_value((31, COL_NAME), s("Steam Flow"));
        r.set_value((31, COL_CODE), s("TT200"));
        r.set_value((32, COL_CODE), s("PT300"));
        r.set_value((34, COL_PKG_NUM), s("2"));
        r.set_value((34, COL_NAME), s("Unknown Tag"));
        r.set_value((35, COL_PKG_NUM), s("3"));
        r
    }

    #[test]
    fn tag_rows() {
        let refs = TagRefs::from_range(&sheet());
        assert_eq!(refs.tags.len(), 2);
        let ft = refs.info("FT101").unwrap();
        assert_eq!(ft.name, "Steam Flow");
        assert_eq!(ft.units, "t/hr");
        assert_eq!(ft.decimals, 2);
        assert_eq!((ft.y_low, ft.y_high), (Some(0.0), Some(120.0)));

        let tt = refs.info("TT200").unwrap();
        assert_eq!(tt.name, "TT200");
        assert_eq!(tt.decimals, 1);
        assert_eq!((tt.y_low, tt.y_high), (None, Some(900.0)));
        assert!(refs.info("OUTSIDE").is_none());
    }

    #[test]
    fn labels() {
        let refs = TagRefs::from_range(&sheet());
        assert_eq!(refs.tag_label("FT101"), "FT101 - Steam Flow [t/hr]");
        assert_eq!(refs.tag_label("TT200"), "TT200 - TT200");
        assert_eq!(refs.tag_label("XX1"), "XX1");
    }

    #[test]
    fn packages_with_continuation_rows() {
        let refs = TagRefs::from_range(&sheet());
        assert_eq!(refs.packages.len(), 2);
        let p1 = &refs.packages[0];
        assert_eq!(p1.num, "1");
        assert_eq!(
            p1.tags,
            [Some("Steam Flow".into()), Some("TT200".into()), Some("PT300".into())]
        );
        assert_eq!(p1.label(), "Pkg 1: Steam Flow / TT200 / PT300");
        // package 3 names no tags and is dropped
        assert_eq!(refs.packages[1].num, "2");
    }

    #[test]
    fn package_resolution() {
        let refs = TagRefs::from_range(&sheet());
        let series = refs.resolve_package("1", |c| c == "TT200").unwrap();
        assert_eq!(series[0].as_deref(), Some("FT101"));
        assert_eq!(series[1].as_deref(), Some("TT200"));
        assert_eq!(series[2], None);
        assert!(series[3..].iter().all(Option::is_none));
        assert!(refs.resolve_package("9", |_| true).is_none());
    }

    #[test]
    fn empty_sheet_has_nothing() {
        let refs = TagRefs::from_range(&Range::empty());
        assert_eq!(refs, TagRefs::default());
    }
}
