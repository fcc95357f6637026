//! `SQLite` schema definitions for rollcall.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the classes table.
pub const CREATE_CLASSES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS classes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create the students table.
pub const CREATE_STUDENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS students (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    roll_number TEXT NOT NULL,
    class_id INTEGER NOT NULL REFERENCES classes(id) ON DELETE RESTRICT,
    face_embedding TEXT,
    photo_path TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (class_id, roll_number)
)
";

/// SQL statement to create the profiles table.
pub const CREATE_PROFILES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS profiles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    role TEXT NOT NULL CHECK (role IN ('admin', 'teacher'))
)
";

/// SQL statement to create the teachers table.
pub const CREATE_TEACHERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS teachers (
    id INTEGER PRIMARY KEY REFERENCES profiles(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    subject TEXT NOT NULL
)
";

/// SQL statement to create the attendance table.
///
/// The `(student_id, date)` uniqueness is the authority for "one record per
/// student per day".
pub const CREATE_ATTENDANCE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS attendance (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id INTEGER NOT NULL REFERENCES students(id) ON DELETE CASCADE,
    date TEXT NOT NULL,
    time TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('present', 'absent')),
    device_id TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (student_id, date)
)
";

/// SQL statement to create an index on attendance date for daily listings.
pub const CREATE_ATTENDANCE_DATE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date, time DESC)
";

/// SQL statement to create an index on `class_id` for class filtering.
pub const CREATE_STUDENTS_CLASS_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_CLASSES_TABLE,
    CREATE_STUDENTS_TABLE,
    CREATE_PROFILES_TABLE,
    CREATE_TEACHERS_TABLE,
    CREATE_ATTENDANCE_TABLE,
    CREATE_ATTENDANCE_DATE_INDEX,
    CREATE_STUDENTS_CLASS_INDEX,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.is_empty());
        }
    }

    #[test]
    fn test_attendance_table_is_unique_per_day() {
        assert!(CREATE_ATTENDANCE_TABLE.contains("UNIQUE (student_id, date)"));
        assert!(CREATE_ATTENDANCE_TABLE.contains("ON DELETE CASCADE"));
    }

    #[test]
    fn test_students_table_contains_required_columns() {
        assert!(CREATE_STUDENTS_TABLE.contains("roll_number TEXT NOT NULL"));
        assert!(CREATE_STUDENTS_TABLE.contains("face_embedding TEXT"));
        assert!(CREATE_STUDENTS_TABLE.contains("photo_path TEXT"));
        assert!(CREATE_STUDENTS_TABLE.contains("UNIQUE (class_id, roll_number)"));
    }

    #[test]
    fn test_create_metadata_table_structure() {
        assert!(CREATE_METADATA_TABLE.contains("key TEXT PRIMARY KEY"));
        assert!(CREATE_METADATA_TABLE.contains("value TEXT NOT NULL"));
    }
}
