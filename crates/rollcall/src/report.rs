//! Daily attendance reports.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::Result;
use crate::records::{AttendanceEntry, AttendanceStatus};
use crate::storage::{Storage, DATE_FORMAT, TIME_FORMAT};

const CSV_HEADER: [&str; 5] = ["Name", "Roll Number", "Date", "Time", "Status"];

/// Attendance recorded on one day, optionally for one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyReport {
    /// Day covered by the report.
    pub date: NaiveDate,
    /// Class filter, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<i64>,
    /// Records, newest first.
    pub entries: Vec<AttendanceEntry>,
}

/// Headline counts for a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Records marked present.
    pub present: usize,
    /// All other records.
    pub absent: usize,
    /// All records.
    pub total: usize,
    /// `present / total` as a rounded percentage; 0 for an empty report.
    pub present_percentage: usize,
}

impl DailyReport {
    /// Load the report for `date`, restricted to `class_id` when given.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn build(storage: &Storage, date: NaiveDate, class_id: Option<i64>) -> Result<Self> {
        Ok(Self {
            date,
            class_id,
            entries: storage.attendance_for_date(date, class_id)?,
        })
    }

    /// Count present and absent records.
    #[must_use]
    pub fn summary(&self) -> Summary {
        let total = self.entries.len();
        let present = self
            .entries
            .iter()
            .filter(|e| e.record.status == AttendanceStatus::Present)
            .count();

        // Integer rounding, halves round up
        let present_percentage = if total == 0 {
            0
        } else {
            (present * 100 + total / 2) / total
        };

        Summary {
            present,
            absent: total - present,
            total,
            present_percentage,
        }
    }

    /// Suggested file name for a CSV export.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("attendance-{}.csv", self.date.format(DATE_FORMAT))
    }

    /// Render as CSV: a header line, then one line per record.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        push_row(&mut out, CSV_HEADER);
        for entry in &self.entries {
            let date = entry.record.date.format(DATE_FORMAT).to_string();
            let time = entry.record.time.format(TIME_FORMAT).to_string();
            let status = entry.record.status.to_string();
            push_row(
                &mut out,
                [
                    entry.student_name.as_str(),
                    entry.roll_number.as_str(),
                    &date,
                    &time,
                    &status,
                ],
            );
        }
        out
    }
}

fn push_row<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape(field));
    }
    out.push('\n');
}

/// Quote a field when it contains a separator, quote or line break.
fn escape(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        let mut quoted = String::with_capacity(field.len() + 2);
        quoted.push('"');
        for c in field.chars() {
            if c == '"' {
                quoted.push('"');
            }
            quoted.push(c);
        }
        quoted.push('"');
        std::borrow::Cow::Owned(quoted)
    } else {
        std::borrow::Cow::Borrowed(field)
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "present {} / absent {} / total {} ({}% present)",
            self.present, self.absent, self.total, self.present_percentage
        )
    }
}
