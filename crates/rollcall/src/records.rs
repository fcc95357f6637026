//! Core record types for rollcall.
//!
//! This module defines the rows the storage layer persists: classes,
//! students, teachers, profiles and attendance records.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Maximum stored length of a device identifier.
pub const MAX_DEVICE_ID_LEN: usize = 50;

/// A class (form group) students are enrolled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRecord {
    /// Row identifier.
    pub id: i64,
    /// Display name, unique across classes.
    pub name: String,
}

/// An enrolled student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    /// Row identifier.
    pub id: i64,
    /// Full name.
    pub name: String,
    /// Roll number, unique within the class.
    pub roll_number: String,
    /// Class the student belongs to.
    pub class_id: i64,
    /// Name of the class, when loaded with a join.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Face embedding as stored: JSON-encoded array of floats.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_embedding: Option<String>,
    /// Path of the enrollment photo in the photo store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_path: Option<PathBuf>,
}

impl Student {
    /// Whether this student can take part in face matching.
    #[must_use]
    pub fn has_embedding(&self) -> bool {
        self.face_embedding.is_some()
    }

    /// Class name for display, falling back to "Unknown".
    #[must_use]
    pub fn class_label(&self) -> &str {
        self.class_name.as_deref().unwrap_or("Unknown")
    }
}

/// Fields for creating a student.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewStudent {
    /// Full name.
    pub name: String,
    /// Roll number.
    pub roll_number: String,
    /// Class to enroll into.
    pub class_id: i64,
    /// JSON-encoded embedding, if one was extracted.
    pub face_embedding: Option<String>,
    /// Enrollment photo location.
    pub photo_path: Option<PathBuf>,
}

/// A partial update to a student. `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StudentUpdate {
    /// New name.
    pub name: Option<String>,
    /// New roll number.
    pub roll_number: Option<String>,
    /// New class.
    pub class_id: Option<i64>,
    /// Replacement embedding.
    pub face_embedding: Option<String>,
    /// Replacement photo.
    pub photo_path: Option<PathBuf>,
}

impl StudentUpdate {
    /// Whether the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.roll_number.is_none()
            && self.class_id.is_none()
            && self.face_embedding.is_none()
            && self.photo_path.is_none()
    }
}

/// Role carried by a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Manages classes, students and teachers.
    Admin,
    /// Views attendance for classes.
    Teacher,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Teacher => write!(f, "teacher"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "teacher" => Ok(Self::Teacher),
            other => Err(crate::Error::invalid_input(format!("unknown role: {other}"))),
        }
    }
}

/// An identity with a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Row identifier.
    pub id: i64,
    /// Assigned role.
    pub role: Role,
}

/// A teacher. Its `id` is the id of its profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    /// Profile identifier.
    pub id: i64,
    /// Full name.
    pub name: String,
    /// Contact email, unique across teachers.
    pub email: String,
    /// Subject taught.
    pub subject: String,
}

/// Attendance status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    /// The student was seen.
    Present,
    /// The student was marked absent.
    Absent,
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

impl std::str::FromStr for AttendanceStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            other => Err(crate::Error::invalid_input(format!(
                "unknown attendance status: {other}"
            ))),
        }
    }
}

/// A stored attendance event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// Row identifier.
    pub id: i64,
    /// Student the record belongs to.
    pub student_id: i64,
    /// Calendar day.
    pub date: NaiveDate,
    /// Time of day the record was taken.
    pub time: NaiveTime,
    /// Recorded status.
    pub status: AttendanceStatus,
    /// Device that took the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Fields for inserting an attendance record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttendance {
    /// Student to record.
    pub student_id: i64,
    /// Calendar day.
    pub date: NaiveDate,
    /// Time of day.
    pub time: NaiveTime,
    /// Status to record.
    pub status: AttendanceStatus,
    /// Recording device, truncated to [`MAX_DEVICE_ID_LEN`] characters.
    pub device_id: Option<String>,
}

impl NewAttendance {
    /// Create a new attendance insert, truncating the device id.
    #[must_use]
    pub fn new(
        student_id: i64,
        date: NaiveDate,
        time: NaiveTime,
        status: AttendanceStatus,
        device_id: Option<&str>,
    ) -> Self {
        Self {
            student_id,
            date,
            time,
            status,
            device_id: device_id.map(|d| d.chars().take(MAX_DEVICE_ID_LEN).collect()),
        }
    }
}

/// An attendance record joined to the student it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    /// The stored record.
    #[serde(flatten)]
    pub record: AttendanceRecord,
    /// Student name.
    pub student_name: String,
    /// Student roll number.
    pub roll_number: String,
    /// Student class.
    pub class_id: i64,
    /// Class name.
    pub class_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(embedding: Option<&str>) -> Student {
        Student {
            id: 1,
            name: "Ada".to_string(),
            roll_number: "R-1".to_string(),
            class_id: 1,
            class_name: None,
            face_embedding: embedding.map(str::to_string),
            photo_path: None,
        }
    }

    #[test]
    fn test_role_display_and_parse() {
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(Role::Teacher.to_string(), "teacher");
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn test_status_display_and_parse() {
        assert_eq!(AttendanceStatus::Present.to_string(), "present");
        assert_eq!(AttendanceStatus::Absent.to_string(), "absent");
        assert_eq!(
            "present".parse::<AttendanceStatus>().unwrap(),
            AttendanceStatus::Present
        );
        assert!("late".parse::<AttendanceStatus>().is_err());
    }

    #[test]
    fn test_student_has_embedding() {
        assert!(student(Some("[0.1]")).has_embedding());
        assert!(!student(None).has_embedding());
    }

    #[test]
    fn test_student_class_label() {
        let mut s = student(None);
        assert_eq!(s.class_label(), "Unknown");
        s.class_name = Some("7B".to_string());
        assert_eq!(s.class_label(), "7B");
    }

    #[test]
    fn test_new_attendance_truncates_device_id() {
        let long = "x".repeat(80);
        let new = NewAttendance::new(
            1,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            AttendanceStatus::Present,
            Some(&long),
        );
        assert_eq!(new.device_id.unwrap().len(), MAX_DEVICE_ID_LEN);
    }

    #[test]
    fn test_student_update_is_empty() {
        assert!(StudentUpdate::default().is_empty());
        let update = StudentUpdate {
            name: Some("New".to_string()),
            ..StudentUpdate::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_student_serialization_skips_missing() {
        let json = serde_json::to_string(&student(None)).unwrap();
        assert!(!json.contains("face_embedding"));
        assert!(json.contains("roll_number"));
    }
}
