use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::Appointment;

// ── Schedule policy ──

/// One operating window within a day, `HH:MM` inclusive start / exclusive end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySchedule {
    pub enabled: bool,
    pub windows: Vec<TimeWindow>,
}

impl DaySchedule {
    fn closed() -> Self {
        Self {
            enabled: false,
            windows: vec![],
        }
    }

    fn open(start: &str, end: &str) -> Self {
        Self {
            enabled: true,
            windows: vec![TimeWindow {
                start: start.into(),
                end: end.into(),
            }],
        }
    }
}

/// Admin-configured booking policy. Read-mostly; mutated only via the admin
/// schedule endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    pub monday: DaySchedule,
    pub tuesday: DaySchedule,
    pub wednesday: DaySchedule,
    pub thursday: DaySchedule,
    pub friday: DaySchedule,
    pub saturday: DaySchedule,
    pub sunday: DaySchedule,
    pub slot_duration_minutes: u32,
    pub break_between_slots_minutes: u32,
    pub max_appointments_per_slot: u32,
    /// Minimum lead time between "now" and a bookable slot.
    pub booking_buffer_hours: i64,
}

impl ScheduleSettings {
    pub fn day(&self, weekday: Weekday) -> &DaySchedule {
        match weekday {
            Weekday::Mon => &self.monday,
            Weekday::Tue => &self.tuesday,
            Weekday::Wed => &self.wednesday,
            Weekday::Thu => &self.thursday,
            Weekday::Fri => &self.friday,
            Weekday::Sat => &self.saturday,
            Weekday::Sun => &self.sunday,
        }
    }
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            monday: DaySchedule::closed(),
            tuesday: DaySchedule::open("09:00", "17:00"),
            wednesday: DaySchedule::open("09:00", "17:00"),
            thursday: DaySchedule::open("09:00", "17:00"),
            friday: DaySchedule::open("09:00", "17:00"),
            saturday: DaySchedule::open("10:00", "16:00"),
            sunday: DaySchedule::closed(),
            slot_duration_minutes: 60,
            break_between_slots_minutes: 0,
            max_appointments_per_slot: 1,
            booking_buffer_hours: 24,
        }
    }
}

// ── Slot availability ──

/// Bookable slot labels for `date`, in chronological order per window,
/// windows in their configured order.
///
/// A slot is emitted while its full duration fits inside the window, then
/// removed when the date's paid, non-cancelled appointments fill it to
/// `max_appointments_per_slot`, or when it is not strictly more than
/// `booking_buffer_hours` ahead of `now`.
pub fn available_slots(
    date: NaiveDate,
    settings: &ScheduleSettings,
    appointments: &[Appointment],
    now: DateTime<Utc>,
) -> Vec<String> {
    let day = settings.day(date.weekday());
    if !day.enabled || day.windows.is_empty() {
        return vec![];
    }

    let duration = settings.slot_duration_minutes;
    // Guard against a zero step from misconfigured settings.
    let step = (duration + settings.break_between_slots_minutes).max(1);

    let mut labels: Vec<String> = Vec::new();
    for window in &day.windows {
        let (Some(start), Some(end)) = (parse_label(&window.start), parse_label(&window.end))
        else {
            tracing::warn!(
                "skipping unparseable schedule window {}-{}",
                window.start,
                window.end
            );
            continue;
        };

        let mut current = start;
        while current + duration <= end {
            labels.push(format_label(current));
            current += step;
        }
    }

    // Paid appointments per slot label for this date.
    let date_str = date.format("%Y-%m-%d").to_string();
    let mut taken: HashMap<&str, u32> = HashMap::new();
    for appt in appointments {
        if appt.date == date_str && appt.occupies_slot() {
            *taken.entry(appt.time.as_str()).or_insert(0) += 1;
        }
    }

    let cutoff = now + Duration::hours(settings.booking_buffer_hours);
    labels.retain(|label| {
        if taken.get(label.as_str()).copied().unwrap_or(0) >= settings.max_appointments_per_slot {
            return false;
        }
        // Strict comparison: a slot exactly at the buffer boundary is out.
        match NaiveTime::parse_from_str(label, "%H:%M") {
            Ok(t) => date.and_time(t).and_utc() > cutoff,
            Err(_) => false,
        }
    });

    labels
}

/// `HH:MM` → minutes from midnight.
fn parse_label(label: &str) -> Option<u32> {
    let (h, m) = label.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

fn format_label(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

// ── Tests ──
