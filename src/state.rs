use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::loader::{parse_time_text, SourceFile};
use crate::data::model::TrendDataset;
use crate::data::tag_refs::TagRefs;
use crate::data::window::{whole_minutes, TimeWindow, MAX_SPAN_MIN};
use crate::error::{DashboardError, LoadError, Result, SetupError};
use crate::setups::{ChartSetup, Setup, SetupOption, SetupStore};
use crate::ui::plot::{build_figure, empty_figure, FigureInput};

pub const MAX_CHARTS: usize = 8;
pub const NUM_SERIES: usize = 6;
pub const INITIAL_VISIBLE: usize = 4;

pub const UNIT_OPTIONS: [&str; 12] = [
    "", "m³/hr", "%", "t/hr", "mbar", "°C", "MW", "bar", "kg/s", "RPM", "mm", "l/hr",
];

pub type SeriesSlots = [Option<String>; NUM_SERIES];

// ---------------------------------------------------------------------------
// Chart panel configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartWidth {
    Quarter,
    #[default]
    Half,
    Full,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartHeight {
    Small,
    #[default]
    Medium,
    Large,
    Xl,
}

impl ChartHeight {
    pub fn px(self) -> u32 {
        match self {
            ChartHeight::Small => 200,
            ChartHeight::Medium => 300,
            ChartHeight::Large => 450,
            ChartHeight::Xl => 600,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChartSlot {
    pub series: SeriesSlots,
    pub width: ChartWidth,
    pub height: ChartHeight,
    pub window: TimeWindow,
}

/// Nickname / unit set in the tag manager. Empty strings mean "no override".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagOverride {
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub unit: String,
}

/// Time navigation requested from a chart's controls. Resize values are
/// minutes (hours for `win_hr`) as typed; they are rounded when applied.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WindowAction {
    Goto {
        #[serde(default)]
        date: String,
        #[serde(default)]
        time: String,
    },
    ScrollLeft,
    ScrollRight,
    Resize {
        win_min: f64,
        win_hr: f64,
        step_min: f64,
    },
}

fn checked_minutes(field: &'static str, value: f64, max: i64) -> Result<i64> {
    whole_minutes(value, max).ok_or(DashboardError::InvalidWindow { field, value, max })
}

struct LoadedSheet {
    dataset: TrendDataset,
    refs: TagRefs,
}

// ---------------------------------------------------------------------------
// Dashboard – all state behind the page
// ---------------------------------------------------------------------------

/// The single dashboard session: loaded file, current sheet, chart panels,
/// sync state, tag overrides and saved setups. Chart ids are 1-based.
pub struct Dashboard {
    source: Option<SourceFile>,
    /// Bumped on every accepted upload; tags sheets parsed off the lock.
    generation: u64,
    sheet: Option<LoadedSheet>,
    charts: Vec<ChartSlot>,
    visible: Vec<usize>,
    sync_master: Option<usize>,
    overrides: BTreeMap<String, TagOverride>,
    setups: SetupStore,
    /// Error or notice shown in place of the stats line.
    notice: Option<String>,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new(SetupStore::in_memory())
    }
}

impl Dashboard {
    pub fn new(setups: SetupStore) -> Self {
        Self {
            source: None,
            generation: 0,
            sheet: None,
            charts: vec![ChartSlot::default(); MAX_CHARTS],
            visible: (1..=INITIAL_VISIBLE).collect(),
            sync_master: None,
            overrides: BTreeMap::new(),
            setups,
            notice: None,
        }
    }

    /// The current file and its generation, for parsing a sheet without
    /// holding the dashboard.
    pub fn loaded_source(&self) -> Option<(u64, SourceFile)> {
        self.source.as_ref().map(|s| (self.generation, s.clone()))
    }

    pub fn dataset(&self) -> Option<&TrendDataset> {
        self.sheet.as_ref().map(|s| &s.dataset)
    }

    pub fn chart(&self, id: usize) -> Result<&ChartSlot> {
        id.checked_sub(1)
            .and_then(|i| self.charts.get(i))
            .ok_or(DashboardError::UnknownChart(id))
    }

    fn chart_mut(&mut self, id: usize) -> Result<&mut ChartSlot> {
        id.checked_sub(1)
            .and_then(|i| self.charts.get_mut(i))
            .ok_or(DashboardError::UnknownChart(id))
    }

    fn data_bounds(&self) -> Result<(NaiveDateTime, NaiveDateTime)> {
        let ds = self.dataset().ok_or(DashboardError::NoData)?;
        match (ds.data_start(), ds.data_end()) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(DashboardError::NoData),
        }
    }

    // -- file & sheet ------------------------------------------------------

    /// Install a freshly parsed upload and return its generation. A failed
    /// parse keeps the previous file and data and only sets the notice.
    pub fn upload(&mut self, parsed: std::result::Result<SourceFile, LoadError>) -> Result<u64> {
        match parsed {
            Ok(source) => {
                log::info!(
                    "loaded '{}' ({:?}) with sheets {:?}",
                    source.file_name(),
                    source.kind(),
                    source.sheet_names()
                );
                self.source = Some(source);
                self.generation += 1;
                self.sheet = None;
                self.notice = None;
                Ok(self.generation)
            }
            Err(e) => {
                log::error!("upload rejected: {e}");
                self.notice = Some(format!("Error: {e}"));
                Err(e.into())
            }
        }
    }

    /// Install a sheet parsed from the file of `generation`. Every chart's
    /// series are cleared and its window moved to the start of the data.
    /// A sheet from a file that has since been replaced is dropped.
    pub fn install_sheet(
        &mut self,
        generation: u64,
        parsed: std::result::Result<(TrendDataset, TagRefs), LoadError>,
    ) -> Result<()> {
        if generation != self.generation || self.source.is_none() {
            log::warn!("dropping sheet parsed from a replaced file");
            return Err(DashboardError::SourceChanged);
        }
        let (dataset, refs) = match parsed {
            Ok(v) => v,
            Err(e @ LoadError::NoTimestampData(_)) => {
                log::warn!("{e}");
                self.notice = Some("No timestamp data found in this sheet.".into());
                return Err(e.into());
            }
            Err(e) => {
                log::error!("sheet load failed: {e}");
                self.notice = Some(format!("Error loading sheet: {e}"));
                return Err(e.into());
            }
        };

        log::info!(
            "sheet '{}': {} rows x {} columns",
            dataset.sheet,
            dataset.row_count(),
            dataset.column_count()
        );
        let start = dataset.data_start();
        for chart in &mut self.charts {
            chart.series = Default::default();
            chart.window.start = start;
        }
        self.sheet = Some(LoadedSheet { dataset, refs });
        self.notice = None;
        Ok(())
    }

    /// First sheet of the current file that is not the tag reference sheet.
    pub fn default_sheet(&self) -> Option<String> {
        self.source.as_ref()?.default_sheet().map(str::to_string)
    }

    /// Parse and install `sheet` of the current file on the calling thread.
    pub fn select_sheet(&mut self, sheet: &str) -> Result<()> {
        let source = self.source.as_ref().ok_or(DashboardError::NoFile)?;
        let parsed = load_sheet_with_refs(source, sheet);
        self.install_sheet(self.generation, parsed)
    }

    // -- chart panels ------------------------------------------------------

    /// Show the first hidden chart. `None` when all are visible.
    pub fn add_chart(&mut self) -> Option<usize> {
        let id = (1..=MAX_CHARTS).find(|id| !self.visible.contains(id))?;
        self.visible.push(id);
        Some(id)
    }

    /// Hide a chart unless it is the last one visible. Closing the sync
    /// master ends sync.
    pub fn close_chart(&mut self, id: usize) -> Result<bool> {
        self.chart(id)?;
        if !self.visible.contains(&id) || self.visible.len() <= 1 {
            return Ok(false);
        }
        self.visible.retain(|v| *v != id);
        if self.sync_master.is_some_and(|m| !self.visible.contains(&m)) {
            log::info!("sync master {id} closed; sync off");
            self.sync_master = None;
        }
        Ok(true)
    }

    pub fn set_size(&mut self, id: usize, width: ChartWidth, height: ChartHeight) -> Result<()> {
        let chart = self.chart_mut(id)?;
        chart.width = width;
        chart.height = height;
        Ok(())
    }

    pub fn set_series(&mut self, id: usize, series: &[Option<String>]) -> Result<()> {
        let chart = self.chart_mut(id)?;
        chart.series = pad_series(series);
        Ok(())
    }

    // -- time navigation & sync -------------------------------------------

    fn ensure_unlocked(&self, id: usize) -> Result<()> {
        match self.sync_master {
            Some(master) if master != id => Err(DashboardError::ChartLocked { chart: id, master }),
            _ => Ok(()),
        }
    }

    pub fn window_action(&mut self, id: usize, action: &WindowAction) -> Result<()> {
        self.chart(id)?;
        self.ensure_unlocked(id)?;
        let (data_start, data_end) = self.data_bounds()?;

        // validate everything before touching the stored window
        let resize = match action {
            WindowAction::Resize {
                win_min,
                win_hr,
                step_min,
            } => Some((
                checked_minutes("win_min", *win_min, MAX_SPAN_MIN)?,
                checked_minutes("win_hr", *win_hr, MAX_SPAN_MIN / 60)?,
                checked_minutes("step_min", *step_min, MAX_SPAN_MIN)?,
            )),
            _ => None,
        };

        let window = &mut self.chart_mut(id)?.window;
        match action {
            WindowAction::Goto { date, time } => window.goto(date, time, data_start),
            WindowAction::ScrollLeft => window.scroll_left(data_start),
            WindowAction::ScrollRight => window.scroll_right(data_start),
            WindowAction::Resize { .. } => {
                if let Some((win_min, win_hr, step_min)) = resize {
                    window.win_min = win_min;
                    window.win_hr = win_hr;
                    window.step_min = step_min;
                }
            }
        }
        window.clamp(data_start, data_end);

        if self.sync_master == Some(id) {
            self.propagate_from_master();
        }
        Ok(())
    }

    /// Toggle sync from chart `id`'s button. Unsynced: `id` becomes master.
    /// Synced: only the master can turn sync off; locked charts are ignored.
    pub fn toggle_sync(&mut self, id: usize) -> Result<Option<usize>> {
        self.chart(id)?;
        match self.sync_master {
            Some(master) if master == id => {
                log::info!("sync off (master {id})");
                self.sync_master = None;
            }
            Some(_) => {}
            None => {
                log::info!("sync on, master chart {id}");
                self.sync_master = Some(id);
                self.propagate_from_master();
            }
        }
        Ok(self.sync_master)
    }

    /// Copy the master's window to every other visible chart.
    fn propagate_from_master(&mut self) {
        let Some(master) = self.sync_master else {
            return;
        };
        let Ok(source) = self.chart(master).map(|c| c.window) else {
            return;
        };
        for id in self.visible.clone() {
            if id == master {
                continue;
            }
            if let Ok(chart) = self.chart_mut(id) {
                chart.window = source;
            }
        }
    }

    /// Apply a zoomed x range from the master chart to every visible chart.
    /// Returns `false` (and changes nothing) when `id` is not the sync master
    /// or the range is unusable.
    pub fn zoom(&mut self, id: usize, x0: &str, x1: &str) -> Result<bool> {
        self.chart(id)?;
        if self.sync_master != Some(id) {
            return Ok(false);
        }
        let (Some(t0), Some(t1)) = (parse_time_text(x0), parse_time_text(x1)) else {
            return Ok(false);
        };
        if t1 <= t0 {
            return Ok(false);
        }
        log::debug!("zoom from master {id}: {t0} .. {t1}");
        for id in self.visible.clone() {
            let chart = self.chart_mut(id)?;
            if let Some(z) = chart.window.zoomed(t0, t1) {
                chart.window = z;
            }
        }
        Ok(true)
    }

    // -- chart packages & tag manager -------------------------------------

    /// Load a chart package's tags into chart 1.
    pub fn load_package(&mut self, num: &str) -> Result<()> {
        let sheet = self.sheet.as_ref().ok_or(DashboardError::NoData)?;
        let series = sheet
            .refs
            .resolve_package(num, |code| sheet.dataset.has_tag(code))
            .ok_or_else(|| DashboardError::UnknownPackage(num.to_string()))?;
        self.chart_mut(1)?.series = series;
        Ok(())
    }

    pub fn set_tag_override(&mut self, code: &str, nickname: &str, unit: &str) {
        let entry = self.overrides.entry(code.to_string()).or_default();
        entry.nickname = nickname.trim().to_string();
        entry.unit = unit.trim().to_string();
    }

    pub fn tag_rows(&self) -> Vec<TagRow> {
        let Some(sheet) = &self.sheet else {
            return Vec::new();
        };
        sheet
            .dataset
            .tag_codes()
            .map(|code| {
                let info = sheet.refs.info(code);
                let saved = self.overrides.get(code);
                TagRow {
                    code: code.to_string(),
                    name: info.map(|i| i.name.clone()).unwrap_or_else(|| code.to_string()),
                    nickname: saved.map(|s| s.nickname.clone()).unwrap_or_default(),
                    unit: saved
                        .map(|s| s.unit.clone())
                        .filter(|u| !u.is_empty())
                        .or_else(|| info.map(|i| i.units.clone()))
                        .unwrap_or_default(),
                }
            })
            .collect()
    }

    // -- rendering ---------------------------------------------------------

    /// Clamp chart `id`'s window to the data and render its figure.
    pub fn figure(&mut self, id: usize) -> Result<ChartFigure> {
        self.chart(id)?;
        let Ok((data_start, data_end)) = self.data_bounds() else {
            return Ok(ChartFigure {
                figure: empty_figure("Load data to begin"),
                window: WindowView::from(&self.chart(id)?.window),
            });
        };

        let span = self.chart_mut(id)?.window.clamp(data_start, data_end);
        let chart = self.chart(id)?;
        let sheet = self.sheet.as_ref().ok_or(DashboardError::NoData)?;
        let x_revision = span.start.format("%Y-%m-%dT%H:%M:%S").to_string();
        let figure = build_figure(&FigureInput {
            dataset: &sheet.dataset,
            rows: sheet.dataset.window(span.start, span.end),
            series: &chart.series,
            refs: &sheet.refs,
            overrides: &self.overrides,
            x_revision: &x_revision,
        });
        Ok(ChartFigure {
            figure,
            window: WindowView::from(&chart.window),
        })
    }

    // -- saved setups ------------------------------------------------------

    pub fn save_setup(&mut self, name: &str) -> Result<String> {
        let charts = self
            .charts
            .iter()
            .enumerate()
            .map(|(i, c)| {
                (
                    (i + 1).to_string(),
                    ChartSetup {
                        series: c.series.to_vec(),
                        width: c.width,
                        height: c.height,
                    },
                )
            })
            .collect();
        let setup = Setup {
            visible: self.visible.clone(),
            charts,
            file_name: self.source.as_ref().map(|s| s.file_name().to_string()),
            sheet_name: self.dataset().map(|d| d.sheet.clone()),
        };
        let name = self.setups.save(name, setup)?;
        log::info!("saved setup '{name}'");
        Ok(format!("Saved \"{name}\"."))
    }

    pub fn load_setup(&mut self, name: &str) -> Result<String> {
        let setup = self
            .setups
            .get(name)
            .cloned()
            .ok_or_else(|| SetupError::NotFound(name.to_string()))?;

        let mut visible: Vec<usize> = Vec::new();
        for id in setup.visible {
            if (1..=MAX_CHARTS).contains(&id) && !visible.contains(&id) {
                visible.push(id);
            }
        }
        if visible.is_empty() {
            visible = (1..=INITIAL_VISIBLE).collect();
        }
        self.visible = visible;

        for (i, chart) in self.charts.iter_mut().enumerate() {
            let saved = setup.charts.get(&(i + 1).to_string()).cloned().unwrap_or_default();
            chart.series = pad_series(&saved.series);
            chart.width = saved.width;
            chart.height = saved.height;
        }
        if self.sync_master.is_some_and(|m| !self.visible.contains(&m)) {
            self.sync_master = None;
        }
        log::info!("loaded setup '{name}'");
        Ok(format!("Loaded \"{name}\"."))
    }

    pub fn delete_setup(&mut self, name: &str) -> Result<String> {
        self.setups.delete(name)?;
        log::info!("deleted setup '{name}'");
        Ok(format!("Deleted \"{name}\"."))
    }

    pub fn setup_options(&self) -> Vec<SetupOption> {
        self.setups.options()
    }

    // -- snapshot ----------------------------------------------------------

    pub fn view(&self) -> DashboardView {
        let sheet = self.sheet.as_ref();

        let status = match (&self.notice, sheet.and_then(|s| s.dataset.stats())) {
            (Some(notice), _) => notice.clone(),
            (None, Some(stats)) => stats.to_string(),
            (None, None) if self.source.is_some() => "Select a sheet to load its data.".into(),
            (None, None) => "Load an Excel file and select a data sheet to begin.".into(),
        };

        let tag_options = sheet
            .map(|s| {
                s.dataset
                    .tag_codes()
                    .map(|code| SelectOption {
                        value: code.to_string(),
                        label: s.refs.tag_label(code),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let packages = sheet
            .map(|s| {
                s.refs
                    .packages
                    .iter()
                    .map(|p| SelectOption {
                        value: p.num.clone(),
                        label: p.label(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let charts = self
            .charts
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let id = i + 1;
                ChartView {
                    id,
                    visible: self.visible.contains(&id),
                    series: c.series.clone(),
                    width: c.width,
                    height: c.height,
                    height_px: c.height.px(),
                    window: WindowView::from(&c.window),
                    sync: match self.sync_master {
                        Some(m) if m == id => SyncRole::Master,
                        Some(_) => SyncRole::Locked,
                        None => SyncRole::Free,
                    },
                }
            })
            .collect();

        DashboardView {
            file_name: self.source.as_ref().map(|s| s.file_name().to_string()),
            sheets: self
                .source
                .as_ref()
                .map(|s| s.sheet_names().to_vec())
                .unwrap_or_default(),
            sheet: sheet.map(|s| s.dataset.sheet.clone()),
            status,
            tag_options,
            packages,
            visible: self.visible.clone(),
            charts,
            sync: SyncView {
                active: self.sync_master.is_some(),
                master: self.sync_master,
            },
            tags: self.tag_rows(),
            unit_options: UNIT_OPTIONS.iter().map(|u| u.to_string()).collect(),
            setups: self.setup_options(),
        }
    }
}

/// Parse one sheet plus the workbook's tag refs. Runs off the async runtime.
pub fn load_sheet_with_refs(
    source: &SourceFile,
    sheet: &str,
) -> std::result::Result<(TrendDataset, TagRefs), LoadError> {
    let dataset = source.load_sheet(sheet)?;
    Ok((dataset, source.tag_refs()))
}

fn pad_series(series: &[Option<String>]) -> SeriesSlots {
    let mut slots: SeriesSlots = Default::default();
    for (slot, code) in slots.iter_mut().zip(series) {
        *slot = code.clone().filter(|c| !c.is_empty());
    }
    slots
}

// ---------------------------------------------------------------------------
// Serializable snapshot sent to the page
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagRow {
    pub code: String,
    pub name: String,
    pub nickname: String,
    pub unit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncRole {
    Free,
    Master,
    Locked,
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowView {
    pub start: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub win_min: i64,
    pub win_hr: i64,
    pub step_min: i64,
}

impl From<&TimeWindow> for WindowView {
    fn from(w: &TimeWindow) -> Self {
        WindowView {
            start: w.start.map(|s| s.format("%Y-%m-%dT%H:%M:%S").to_string()),
            date: w.goto_date(),
            time: w.goto_time(),
            win_min: w.win_min,
            win_hr: w.win_hr,
            step_min: w.step_min,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartView {
    pub id: usize,
    pub visible: bool,
    pub series: SeriesSlots,
    pub width: ChartWidth,
    pub height: ChartHeight,
    pub height_px: u32,
    pub window: WindowView,
    pub sync: SyncRole,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncView {
    pub active: bool,
    pub master: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub file_name: Option<String>,
    pub sheets: Vec<String>,
    pub sheet: Option<String>,
    pub status: String,
    pub tag_options: Vec<SelectOption>,
    pub packages: Vec<SelectOption>,
    pub visible: Vec<usize>,
    pub charts: Vec<ChartView>,
    pub sync: SyncView,
    pub tags: Vec<TagRow>,
    pub unit_options: Vec<String>,
    pub setups: Vec<SetupOption>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartFigure {
    pub figure: Value,
    pub window: WindowView,
}
