use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TimeWindow – the visible time span of one chart
// ---------------------------------------------------------------------------

pub const DEFAULT_WIN_MIN: i64 = 60;
pub const DEFAULT_WIN_HR: i64 = 0;
pub const DEFAULT_STEP_MIN: i64 = 15;

/// Width used when the configured width is zero or negative.
const FALLBACK_WIDTH_MIN: i64 = 60;
/// Step used when the configured step is zero or negative.
const FALLBACK_STEP_MIN: i64 = 5;
/// Upper bound for a window width or step: 100 years.
pub const MAX_SPAN_MIN: i64 = 100 * 366 * 24 * 60;

/// Whole minutes from a UI number input. Rounded; `None` when not finite or
/// outside `0..=max`.
pub fn whole_minutes(value: f64, max: i64) -> Option<i64> {
    let rounded = value.round();
    (rounded.is_finite() && rounded >= 0.0 && rounded <= max as f64).then_some(rounded as i64)
}

fn minutes(m: i64) -> Duration {
    Duration::try_minutes(m.min(MAX_SPAN_MIN)).unwrap_or_else(|| Duration::minutes(FALLBACK_WIDTH_MIN))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// `None` until a dataset is loaded; treated as the data start.
    pub start: Option<NaiveDateTime>,
    pub win_min: i64,
    pub win_hr: i64,
    pub step_min: i64,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            start: None,
            win_min: DEFAULT_WIN_MIN,
            win_hr: DEFAULT_WIN_HR,
            step_min: DEFAULT_STEP_MIN,
        }
    }
}

/// Start/end of a window after clamping to the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    /// Configured width, capped at [`MAX_SPAN_MIN`].
    pub fn width(&self) -> Duration {
        let total = self
            .win_hr
            .checked_mul(60)
            .and_then(|h| h.checked_add(self.win_min))
            .unwrap_or(MAX_SPAN_MIN);
        minutes(if total <= 0 { FALLBACK_WIDTH_MIN } else { total })
    }

    pub fn step(&self) -> Duration {
        minutes(if self.step_min > 0 { self.step_min } else { FALLBACK_STEP_MIN })
    }

    /// Jump to `date` + `time`. An empty date means the data start date, an
    /// empty time means midnight. Unparseable input leaves the window as is.
    pub fn goto(&mut self, date: &str, time: &str, data_start: NaiveDateTime) {
        let date = date.trim();
        let time = time.trim();
        let day = if date.is_empty() {
            Some(data_start.date())
        } else {
            NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
        };
        let clock = if time.is_empty() {
            NaiveTime::from_hms_opt(0, 0, 0)
        } else {
            NaiveTime::parse_from_str(time, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
                .ok()
        };
        match (day, clock) {
            (Some(d), Some(t)) => self.start = Some(d.and_time(t)),
            _ => log::debug!("ignoring unparseable goto '{date} {time}'"),
        }
    }

    pub fn scroll_left(&mut self, data_start: NaiveDateTime) {
        let start = self.start.unwrap_or(data_start);
        self.start = Some(start.checked_sub_signed(self.step()).unwrap_or(start));
    }

    pub fn scroll_right(&mut self, data_start: NaiveDateTime) {
        let start = self.start.unwrap_or(data_start);
        self.start = Some(start.checked_add_signed(self.step()).unwrap_or(start));
    }

    /// Fit the window inside `[data_start, data_end]` and store the new start.
    pub fn clamp(&mut self, data_start: NaiveDateTime, data_end: NaiveDateTime) -> Span {
        let width = self.width();
        let mut start = self.start.unwrap_or(data_start).max(data_start);
        let mut end = start.checked_add_signed(width).unwrap_or(data_end);
        if end > data_end {
            end = data_end;
            start = data_start.max(end.checked_sub_signed(width).unwrap_or(data_start));
        }
        self.start = Some(start);
        Span { start, end }
    }

    /// Window matching a zoomed x range: start at `x0`, width rounded to
    /// whole minutes (at least one). `None` when the range is empty.
    pub fn zoomed(&self, x0: NaiveDateTime, x1: NaiveDateTime) -> Option<TimeWindow> {
        if x1 <= x0 {
            return None;
        }
        let total_minutes = (x1 - x0).num_milliseconds() as f64 / 60_000.0;
        let win_hr = (total_minutes / 60.0).floor() as i64;
        let mut win_min = (total_minutes - win_hr as f64 * 60.0).round() as i64;
        if win_hr == 0 && win_min == 0 {
            win_min = 1;
        }
        Some(TimeWindow {
            start: Some(x0),
            win_min,
            win_hr,
            step_min: self.step_min,
        })
    }

    pub fn goto_date(&self) -> Option<String> {
        self.start.map(|s| s.format("%Y-%m-%d").to_string())
    }

    pub fn goto_time(&self) -> Option<String> {
        self.start.map(|s| s.format("%H:%M").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    const START: &str = "2024-01-01 00:00";
    const END: &str = "2024-01-02 00:00";

    #[test]
    fn width_and_step_fallbacks() {
        let mut w = TimeWindow::default();
        assert_eq!(w.width(), Duration::minutes(60));
        assert_eq!(w.step(), Duration::minutes(15));
        w.win_min = 30;
        w.win_hr = 2;
        assert_eq!(w.width(), Duration::minutes(150));
        w.win_min = 0;
        w.win_hr = 0;
        w.step_min = 0;
        assert_eq!(w.width(), Duration::minutes(60));
        assert_eq!(w.step(), Duration::minutes(5));
    }

    #[test]
    fn clamp_keeps_window_inside_data() {
        let mut w = TimeWindow::default();
        let span = w.clamp(t(START), t(END));
        assert_eq!(span, Span { start: t(START), end: t("2024-01-01 01:00") });

        w.start = Some(t("2023-12-31 12:00"));
        assert_eq!(w.clamp(t(START), t(END)).start, t(START));

        w.start = Some(t("2024-01-01 23:30"));
        let span = w.clamp(t(START), t(END));
        assert_eq!(span, Span { start: t("2024-01-01 23:00"), end: t(END) });
        assert_eq!(w.start, Some(t("2024-01-01 23:00")));
    }

    #[test]
    fn window_wider_than_data() {
        let mut w = TimeWindow { win_hr: 48, ..TimeWindow::default() };
        let span = w.clamp(t(START), t(END));
        assert_eq!(span, Span { start: t(START), end: t(END) });
    }

    #[test]
    fn scrolling_moves_by_step() {
        let mut w = TimeWindow { start: Some(t("2024-01-01 06:00")), ..TimeWindow::default() };
        w.scroll_right(t(START));
        assert_eq!(w.start, Some(t("2024-01-01 06:15")));
        w.step_min = -3;
        w.scroll_left(t(START));
        assert_eq!(w.start, Some(t("2024-01-01 06:10")));
    }

    #[test]
    fn huge_sizes_do_not_overflow() {
        let mut w = TimeWindow { win_hr: 10_000_000_000, win_min: 0, ..TimeWindow::default() };
        assert_eq!(w.width(), Duration::minutes(MAX_SPAN_MIN));
        let span = w.clamp(t(START), t(END));
        assert_eq!(span, Span { start: t(START), end: t(END) });

        w.win_hr = i64::MAX;
        w.win_min = i64::MAX;
        assert_eq!(w.width(), Duration::minutes(MAX_SPAN_MIN));
        // repeatable: a stored oversized window still renders
        assert_eq!(w.clamp(t(START), t(END)), span);
    }

    #[test]
    fn huge_step_scroll_stays_in_range() {
        let mut w = TimeWindow { step_min: 1_000_000_000_000, ..TimeWindow::default() };
        w.start = Some(NaiveDateTime::MAX - Duration::days(1));
        w.scroll_right(t(START));
        assert_eq!(w.start, Some(NaiveDateTime::MAX - Duration::days(1)));

        w.start = Some(NaiveDateTime::MIN + Duration::days(1));
        w.scroll_left(t(START));
        assert_eq!(w.start, Some(NaiveDateTime::MIN + Duration::days(1)));
        assert_eq!(w.clamp(t(START), t(END)).start, t(START));
    }

    #[test]
    fn ui_numbers_round_to_whole_minutes() {
        assert_eq!(whole_minutes(1.5, 60), Some(2));
        assert_eq!(whole_minutes(14.4, 60), Some(14));
        assert_eq!(whole_minutes(0.0, 60), Some(0));
        assert_eq!(whole_minutes(61.0, 60), None);
        assert_eq!(whole_minutes(-1.0, 60), None);
        assert_eq!(whole_minutes(f64::NAN, 60), None);
        assert_eq!(whole_minutes(1e300, MAX_SPAN_MIN), None);
    }

    #[test]
    fn goto_parsing() {
        let mut w = TimeWindow::default();
        w.goto("2024-01-01", "13:45", t(START));
        assert_eq!(w.start, Some(t("2024-01-01 13:45")));
        w.goto("", "", t("2024-01-05 08:00"));
        assert_eq!(w.start, Some(t("2024-01-05 00:00")));
        w.goto("garbage", "10:00", t(START));
        assert_eq!(w.start, Some(t("2024-01-05 00:00")));
        assert_eq!(w.goto_date().as_deref(), Some("2024-01-05"));
        assert_eq!(w.goto_time().as_deref(), Some("00:00"));
    }

    #[test]
    fn zoom_to_window() {
        let w = TimeWindow::default();
        let z = w.zoomed(t("2024-01-01 01:00"), t("2024-01-01 03:20")).unwrap();
        assert_eq!((z.win_hr, z.win_min), (2, 20));
        assert_eq!(z.start, Some(t("2024-01-01 01:00")));

        let tiny = w
            .zoomed(t(START), t(START) + Duration::seconds(10))
            .unwrap();
        assert_eq!((tiny.win_hr, tiny.win_min), (0, 1));
        assert!(w.zoomed(t(END), t(START)).is_none());
    }
}
