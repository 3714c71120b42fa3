/// Data layer: core types, loading, tag metadata and time windows.
///
/// Architecture:
/// ```text
///  .xlsx / .xls / .ods / .csv / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  bytes → SourceFile (sheets) → TrendDataset
///   └──────────┘
///        │                      ┌──────────┐
///        ▼                      │ tag_refs  │  "Tag Refs" sheet → names, units, packages
///   ┌──────────────┐            └──────────┘
///   │ TrendDataset  │  sorted times + tag columns
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  window   │  per-chart time span → row range
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod tag_refs;
pub mod window;
