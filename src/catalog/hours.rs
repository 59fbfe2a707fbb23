use chrono::{Datelike, Duration, FixedOffset, NaiveDateTime, Offset, Timelike, Utc};
use serde::Serialize;
use utoipa::ToSchema;

const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// A half-open span of service, in minutes after local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceWindow {
    pub opens: u32,
    pub closes: u32,
}

impl ServiceWindow {
    const fn hm(open_h: u32, open_m: u32, close_h: u32, close_m: u32) -> Self {
        Self {
            opens: open_h * 60 + open_m,
            closes: close_h * 60 + close_m,
        }
    }

    fn contains(&self, minute: u32) -> bool {
        minute >= self.opens && minute < self.closes
    }
}

/// Whether the restaurant is serving at a given moment and when that changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct OpenStatus {
    pub open: bool,
    /// "Open Now" or "Closed"
    pub label: String,
    /// e.g. "Closes in 1h 5min" or "Opens Wednesday at 11:30am"
    pub detail: Option<String>,
    /// Local wall-clock time of the next open/close transition
    #[schema(value_type = Option<String>)]
    pub next_change: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DaySchedule {
    pub day: String,
    /// Formatted windows, empty when closed all day
    pub windows: Vec<String>,
}

/// Weekly opening hours in the restaurant's local time.
#[derive(Debug, Clone)]
pub struct OpeningHours {
    /// Indexed from Sunday
    week: [Vec<ServiceWindow>; 7],
    offset: FixedOffset,
}

impl OpeningHours {
    /// Lunch and dinner service, closed Tuesdays, late close Friday and Saturday.
    pub fn haveli(offset: FixedOffset) -> Self {
        let regular = || {
            vec![
                ServiceWindow::hm(11, 30, 15, 0),
                ServiceWindow::hm(17, 0, 22, 0),
            ]
        };
        let late = || {
            vec![
                ServiceWindow::hm(11, 30, 15, 0),
                ServiceWindow::hm(17, 0, 23, 0),
            ]
        };
        Self {
            week: [
                regular(),
                regular(),
                Vec::new(),
                regular(),
                regular(),
                late(),
                late(),
            ],
            offset,
        }
    }

    /// Builds hours from an offset in minutes east of UTC, falling back to UTC when out of range.
    pub fn haveli_with_offset_minutes(minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix());
        Self::haveli(offset)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn status_now(&self) -> OpenStatus {
        let local = Utc::now().with_timezone(&self.offset).naive_local();
        self.status_at(local)
    }

    /// Status at a local wall-clock time.
    pub fn status_at(&self, now: NaiveDateTime) -> OpenStatus {
        let today = now.weekday().num_days_from_sunday() as usize;
        let minute = now.hour() * 60 + now.minute();
        let now_secs = i64::from(now.num_seconds_from_midnight());

        if let Some(window) = self.week[today].iter().find(|w| w.contains(minute)) {
            let until = i64::from(window.closes) * 60 - now_secs;
            let mins = until / 60;
            let detail = if mins < 60 {
                format!("Closes in {mins} min")
            } else {
                format!("Closes in {}h {}min", mins / 60, mins % 60)
            };
            return OpenStatus {
                open: true,
                label: "Open Now".to_string(),
                detail: Some(detail),
                next_change: Some(now + Duration::seconds(until)),
            };
        }

        let next = (0..=7usize).find_map(|days_ahead| {
            let day = (today + days_ahead) % 7;
            let windows = &self.week[day];
            let start = if days_ahead == 0 {
                windows.iter().find(|w| w.opens > minute).map(|w| w.opens)
            } else {
                windows.first().map(|w| w.opens)
            };
            start.map(|opens| (days_ahead, day, opens))
        });

        let (detail, next_change) = match next {
            Some((days_ahead, day, opens)) => {
                let until = days_ahead as i64 * 86_400 + i64::from(opens) * 60 - now_secs;
                let mins = until / 60;
                let detail = if days_ahead == 0 && mins < 60 {
                    format!("Opens in {mins} min")
                } else if days_ahead == 0 {
                    format!("Opens in {}h {}min", mins / 60, mins % 60)
                } else {
                    format!("Opens {} at {}", DAY_NAMES[day], format_clock(opens))
                };
                (Some(detail), Some(now + Duration::seconds(until)))
            }
            None => (None, None),
        };

        OpenStatus {
            open: false,
            label: "Closed".to_string(),
            detail,
            next_change,
        }
    }

    pub fn weekly_schedule(&self) -> Vec<DaySchedule> {
        self.week
            .iter()
            .enumerate()
            .map(|(idx, windows)| DaySchedule {
                day: DAY_NAMES[idx].to_string(),
                windows: windows
                    .iter()
                    .map(|w| format!("{} - {}", format_clock(w.opens), format_clock(w.closes)))
                    .collect(),
            })
            .collect()
    }
}

/// 12-hour clock, e.g. `11:30am`, `5:00pm`.
fn format_clock(minute_of_day: u32) -> String {
    let hours = minute_of_day / 60;
    let minutes = minute_of_day % 60;
    let period = if hours >= 12 { "pm" } else { "am" };
    let display = match hours % 12 {
        0 => 12,
        h => h,
    };
    format!("{display}:{minutes:02}{period}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use test_case::test_case;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn hours() -> OpeningHours {
        OpeningHours::haveli_with_offset_minutes(0)
    }

    // 2024-06-03 is a Monday
    #[test_case(at(2024, 6, 3, 12, 0), true, "Closes in 3h 0min" ; "monday lunch")]
    #[test_case(at(2024, 6, 3, 21, 15), true, "Closes in 45 min" ; "monday late dinner")]
    #[test_case(at(2024, 6, 3, 15, 30), false, "Opens in 1h 30min" ; "between services")]
    #[test_case(at(2024, 6, 3, 16, 20), false, "Opens in 40 min" ; "just before dinner")]
    #[test_case(at(2024, 6, 3, 22, 30), false, "Opens Wednesday at 11:30am" ; "skips closed tuesday")]
    #[test_case(at(2024, 6, 4, 12, 0), false, "Opens Wednesday at 11:30am" ; "tuesday closed")]
    #[test_case(at(2024, 6, 7, 22, 30), true, "Closes in 30 min" ; "friday late close")]
    fn status_labels(now: NaiveDateTime, open: bool, detail: &str) {
        let status = hours().status_at(now);
        assert_eq!(status.open, open);
        assert_eq!(status.detail.as_deref(), Some(detail));
        assert_eq!(status.label, if open { "Open Now" } else { "Closed" });
    }

    #[test]
    fn closing_minute_is_exclusive() {
        let status = hours().status_at(at(2024, 6, 3, 15, 0));
        assert!(!status.open);
        assert_eq!(status.next_change, Some(at(2024, 6, 3, 17, 0)));
    }

    #[test]
    fn schedule_formats_windows() {
        let schedule = hours().weekly_schedule();
        assert_eq!(schedule.len(), 7);
        assert!(schedule[2].windows.is_empty());
        assert_eq!(schedule[5].windows[1], "5:00pm - 11:00pm");
        assert_eq!(schedule[0].windows[0], "11:30am - 3:00pm");
    }
}
