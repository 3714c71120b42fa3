use std::collections::BTreeMap;
use std::ops::Range;

use serde_json::{json, Map, Value};

use crate::color::{css_hex, css_rgba, THEME};
use crate::data::model::TrendDataset;
use crate::data::tag_refs::TagRefs;
use crate::state::TagOverride;

// ---------------------------------------------------------------------------
// Plotly figure builder
// ---------------------------------------------------------------------------

const FONT_FAMILY: &str = "Consolas, monospace";

/// Side and outward offset (fraction of the plot width) of each series' y axis.
const AXIS_SLOTS: [(Side, f64); 6] = [
    (Side::Left, 0.0),
    (Side::Right, 0.0),
    (Side::Left, 0.05),
    (Side::Right, 0.05),
    (Side::Left, 0.10),
    (Side::Right, 0.10),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// Everything needed to draw one chart.
pub struct FigureInput<'a> {
    pub dataset: &'a TrendDataset,
    pub rows: Range<usize>,
    /// One entry per series slot; `None` or unknown codes are skipped.
    pub series: &'a [Option<String>],
    pub refs: &'a TagRefs,
    pub overrides: &'a BTreeMap<String, TagOverride>,
    /// Changes whenever the window start changes so Plotly resets the x zoom.
    pub x_revision: &'a str,
}

struct ActiveAxis {
    num: usize,
    side: Side,
    offset: f64,
    color: String,
    range: Option<[f64; 2]>,
    label: String,
    code: String,
}

fn base_layout() -> Map<String, Value> {
    let bg = css_hex(THEME.chart);
    let mut layout = Map::new();
    layout.insert("paper_bgcolor".into(), json!(bg));
    layout.insert("plot_bgcolor".into(), json!(bg));
    layout.insert(
        "font".into(),
        json!({ "family": FONT_FAMILY, "size": 11, "color": css_hex(THEME.text) }),
    );
    layout
}

/// Placeholder shown before any data is loaded, or for an empty window.
pub fn empty_figure(message: &str) -> Value {
    let mut layout = base_layout();
    layout.insert("xaxis".into(), json!({ "visible": false }));
    layout.insert("yaxis".into(), json!({ "visible": false }));
    layout.insert(
        "annotations".into(),
        json!([{
            "text": message,
            "showarrow": false,
            "font": { "size": 14, "color": css_hex(THEME.muted) },
            "xref": "paper", "yref": "paper", "x": 0.5, "y": 0.5,
        }]),
    );
    json!({ "data": [], "layout": layout })
}

/// Display label for a tag: nickname over friendly name, unit override over
/// sheet units, rendered `Name [unit]`.
pub fn series_label(code: &str, refs: &TagRefs, overrides: &BTreeMap<String, TagOverride>) -> String {
    let info = refs.info(code);
    let over = overrides.get(code);

    let name = over
        .map(|o| o.nickname.as_str())
        .filter(|n| !n.is_empty())
        .or(info.map(|i| i.name.as_str()))
        .unwrap_or(code);
    let unit = over
        .map(|o| o.unit.as_str())
        .filter(|u| !u.is_empty())
        .or(info.map(|i| i.units.as_str()))
        .unwrap_or("");

    if unit.is_empty() {
        name.to_string()
    } else {
        format!("{name} [{unit}]")
    }
}

fn axis_key(prefix: &str, num: usize) -> String {
    if num == 1 {
        prefix.to_string()
    } else {
        format!("{prefix}{num}")
    }
}

pub fn build_figure(input: &FigureInput<'_>) -> Value {
    if input.dataset.is_empty() {
        return empty_figure("Load data to begin");
    }
    if input.rows.is_empty() {
        return empty_figure("No data in this window");
    }

    let mut traces = Vec::new();
    let mut axes: Vec<ActiveAxis> = Vec::new();

    for (slot, code) in input.series.iter().enumerate().take(AXIS_SLOTS.len()) {
        let Some(code) = code.as_deref().filter(|c| !c.is_empty()) else {
            continue;
        };
        let Some(series) = input.dataset.series(code, input.rows.clone()) else {
            continue;
        };
        if series.is_empty() {
            continue;
        }
        let info = input.refs.info(code);
        let label = series_label(code, input.refs, input.overrides);
        let color = css_hex(THEME.trace(slot));
        let num = slot + 1;
        let decimals = info.map(|i| i.decimals).unwrap_or(1);

        let mut x = Vec::with_capacity(series.len());
        x.extend(series.x.iter().map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()));
        traces.push(json!({
            "type": "scattergl",
            "mode": "lines",
            "name": label,
            "x": x,
            "y": series.y,
            "yaxis": axis_key("y", num),
            "line": { "color": color, "width": 1.5 },
            "hovertemplate": format!("%{{y:.{decimals}f}}"),
        }));

        let range = match info.map(|i| (i.y_low, i.y_high)) {
            Some((Some(lo), Some(hi))) => Some([lo, hi]),
            _ => None,
        };
        let (side, offset) = AXIS_SLOTS[slot];
        axes.push(ActiveAxis {
            num,
            side,
            offset,
            color,
            range,
            label,
            code: series.code.to_string(),
        });
    }

    let max_offset = |side: Side| {
        axes.iter()
            .filter(|a| a.side == side)
            .map(|a| a.offset)
            .fold(0.0_f64, f64::max)
    };
    let max_left = max_offset(Side::Left);
    let max_right = max_offset(Side::Right);

    let mut layout = base_layout();
    layout.insert(
        "margin".into(),
        json!({
            "l": if max_left > 0.0 { 45 } else { 10 },
            "r": if max_right > 0.0 { 45 } else { 10 },
            "t": 10,
            "b": 35,
        }),
    );
    layout.insert(
        "legend".into(),
        json!({
            "orientation": "h", "yanchor": "bottom", "y": 1.02,
            "xanchor": "left", "x": 0, "font": { "size": 10 },
        }),
    );
    layout.insert(
        "xaxis".into(),
        json!({
            "gridcolor": css_hex(THEME.grid),
            "showgrid": true,
            "zeroline": false,
            "tickformat": "%H:%M\n%d-%b",
            "domain": [max_left, 1.0 - max_right],
            "uirevision": input.x_revision,
        }),
    );
    layout.insert("uirevision".into(), json!("keep"));
    layout.insert("hovermode".into(), json!("x unified"));
    layout.insert(
        "hoverlabel".into(),
        json!({ "bgcolor": css_rgba(THEME.panel, 0.9) }),
    );

    for axis in &axes {
        let position = match axis.side {
            Side::Left => max_left - axis.offset,
            Side::Right => (1.0 - max_right) + axis.offset,
        };
        let primary = axis.num == 1;
        let mut y = json!({
            "title": { "text": axis.label, "font": { "color": axis.color, "size": 10 } },
            "tickfont": { "color": axis.color, "size": 9 },
            "gridcolor": if primary { css_hex(THEME.grid) } else { css_rgba(THEME.chart, 0.0) },
            "showgrid": primary,
            "zeroline": false,
            "side": axis.side.as_str(),
            // zoom on this axis survives re-renders until its tag changes
            "uirevision": axis.code,
        });
        if let Some(range) = axis.range {
            y["range"] = json!(range);
        }
        if !primary {
            y["overlaying"] = json!("y");
            y["position"] = json!(position);
            y["anchor"] = json!("free");
        }
        layout.insert(axis_key("yaxis", axis.num), y);
    }

    json!({ "data": traces, "layout": layout })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::data::tag_refs::TagInfo;

    fn dataset() -> TrendDataset {
        let t0 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let rows = (0..4)
            .map(|i| {
                (
                    t0 + chrono::Duration::minutes(i),
                    vec![Some(i as f64), Some(10.0 * i as f64), None],
                )
            })
            .collect();
        TrendDataset::from_rows("Data", vec!["A".into(), "B".into(), "C".into()], rows)
    }

    fn refs() -> TagRefs {
        let mut refs = TagRefs::default();
        refs.tags.insert(
            "A".into(),
            TagInfo {
                name: "Steam".into(),
                units: "t/hr".into(),
                decimals: 2,
                y_high: Some(50.0),
                y_low: Some(0.0),
            },
        );
        refs
    }

    fn figure(series: &[Option<String>], overrides: &BTreeMap<String, TagOverride>) -> Value {
        let ds = dataset();
        let refs = refs();
        build_figure(&FigureInput {
            dataset: &ds,
            rows: 0..ds.row_count(),
            series,
            refs: &refs,
            overrides,
            x_revision: "2024-01-01T00:00:00",
        })
    }

    #[test]
    fn empty_dataset_shows_placeholder() {
        let ds = TrendDataset::from_rows("x", vec![], vec![]);
        let refs = TagRefs::default();
        let fig = build_figure(&FigureInput {
            dataset: &ds,
            rows: 0..0,
            series: &[],
            refs: &refs,
            overrides: &BTreeMap::new(),
            x_revision: "",
        });
        assert_eq!(fig["data"], json!([]));
        assert_eq!(fig["layout"]["annotations"][0]["text"], "Load data to begin");
    }

    #[test]
    fn one_trace_per_known_series() {
        let series = vec![Some("A".into()), None, Some("missing".into()), Some("B".into())];
        let fig = figure(&series, &BTreeMap::new());
        let data = fig["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["name"], "Steam [t/hr]");
        assert_eq!(data[0]["yaxis"], "y");
        assert_eq!(data[0]["hovertemplate"], "%{y:.2f}");
        assert_eq!(data[0]["x"][1], "2024-01-01 00:01:00");
        assert_eq!(data[1]["name"], "B");
        assert_eq!(data[1]["yaxis"], "y4");
        assert_eq!(data[1]["line"]["color"], css_hex(THEME.trace(3)));
        assert_eq!(data[1]["y"][2], 20.0);
    }

    #[test]
    fn axis_layout() {
        let series = vec![Some("A".into()), Some("B".into()), Some("C".into())];
        let fig = figure(&series, &BTreeMap::new());
        let layout = &fig["layout"];
        assert_eq!(layout["yaxis"]["range"], json!([0.0, 50.0]));
        assert!(layout["yaxis"].get("overlaying").is_none());
        assert_eq!(layout["yaxis2"]["side"], "right");
        assert_eq!(layout["yaxis2"]["position"], 1.0);
        assert_eq!(layout["yaxis3"]["overlaying"], "y");
        assert_eq!(layout["yaxis3"]["position"], 0.0);
        assert_eq!(layout["xaxis"]["domain"], json!([0.05, 1.0]));
        assert_eq!(layout["margin"]["l"], 45);
        assert_eq!(layout["margin"]["r"], 10);
    }

    #[test]
    fn overrides_win_over_sheet_metadata() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "A".to_string(),
            TagOverride {
                nickname: "Main steam".into(),
                unit: String::new(),
            },
        );
        overrides.insert(
            "B".to_string(),
            TagOverride {
                nickname: String::new(),
                unit: "°C".into(),
            },
        );
        assert_eq!(series_label("A", &refs(), &overrides), "Main steam [t/hr]");
        assert_eq!(series_label("B", &refs(), &overrides), "B [°C]");
        assert_eq!(series_label("C", &refs(), &overrides), "C");
    }

    #[test]
    fn identical_input_renders_identically() {
        let series = vec![Some("A".into()), Some("B".into())];
        let a = figure(&series, &BTreeMap::new());
        let b = figure(&series, &BTreeMap::new());
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }
}
