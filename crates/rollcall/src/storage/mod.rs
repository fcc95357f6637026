//! Storage layer for rollcall.
//!
//! This module provides `SQLite`-based persistent storage for classes,
//! students, teachers, profiles and attendance records.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{is_unique_violation, Error, Result};
use crate::records::{
    AttendanceEntry, AttendanceRecord, AttendanceStatus, ClassRecord, NewAttendance, NewStudent,
    Profile, Role, Student, StudentUpdate, Teacher,
};

/// Date column format.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Time column format.
pub const TIME_FORMAT: &str = "%H:%M:%S";

const STUDENT_SELECT: &str = r"
    SELECT s.id, s.name, s.roll_number, s.class_id, c.name, s.face_embedding, s.photo_path
    FROM students s LEFT JOIN classes c ON c.id = s.class_id
";

const ATTENDANCE_COLUMNS: &str = "id, student_id, date, time, status, device_id";

/// Storage engine for attendance data.
///
/// Provides persistent storage using `SQLite` with support for:
/// - Class, student and teacher management
/// - Role-bearing profiles
/// - Attendance records, unique per student and day
/// - Change detection for dashboards
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL lets the change feed read while the scanner writes
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // === Classes ===

    /// Create a class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if the name is taken, or an error if the
    /// database operation fails.
    pub fn add_class(&self, name: &str) -> Result<ClassRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_input("class name must not be empty"));
        }
        self.conn
            .execute("INSERT INTO classes (name) VALUES (?1)", [name])
            .map_err(|e| unique_or(e, || Error::conflict(format!("class '{name}' already exists"))))?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted class {} with id {}", name, id);
        Ok(ClassRecord {
            id,
            name: name.to_string(),
        })
    }

    /// Get a class by its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_class(&self, id: i64) -> Result<Option<ClassRecord>> {
        let class = self
            .conn
            .query_row("SELECT id, name FROM classes WHERE id = ?1", [id], |row| {
                Ok(ClassRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .optional()?;
        Ok(class)
    }

    /// List all classes ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_classes(&self) -> Result<Vec<ClassRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM classes ORDER BY name")?;
        let classes = stmt
            .query_map([], |row| {
                Ok(ClassRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(classes)
    }

    /// Delete a class.
    ///
    /// Returns `true` if a class was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] while students are still enrolled in it.
    pub fn remove_class(&self, id: i64) -> Result<bool> {
        let enrolled: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM students WHERE class_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        if enrolled > 0 {
            return Err(Error::conflict(format!(
                "class {id} still has {enrolled} enrolled students"
            )));
        }
        let affected = self.conn.execute("DELETE FROM classes WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    // === Students ===

    /// Enroll a student.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the class does not exist,
    /// [`Error::Conflict`] if the roll number is taken within the class, or an
    /// error if the database operation fails.
    pub fn add_student(&self, student: &NewStudent) -> Result<Student> {
        self.require_class(student.class_id)?;

        let photo = student.photo_path.as_deref().map(path_to_text);
        self.conn
            .execute(
                r"
                INSERT INTO students (name, roll_number, class_id, face_embedding, photo_path)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
                params![
                    student.name,
                    student.roll_number,
                    student.class_id,
                    student.face_embedding,
                    photo,
                ],
            )
            .map_err(|e| {
                unique_or(e, || {
                    Error::conflict(format!(
                        "roll number {} already exists in class {}",
                        student.roll_number, student.class_id
                    ))
                })
            })?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted student with id {}", id);
        self.get_student(id)?
            .ok_or_else(|| Error::internal(format!("student {id} missing after insert")))
    }

    /// Apply a partial update to a student.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown student or class,
    /// [`Error::Conflict`] for a roll number clash, or an error if the
    /// database operation fails.
    pub fn update_student(&self, id: i64, update: &StudentUpdate) -> Result<Student> {
        if let Some(class_id) = update.class_id {
            self.require_class(class_id)?;
        }

        let photo = update.photo_path.as_deref().map(path_to_text);
        let affected = self
            .conn
            .execute(
                r"
                UPDATE students SET
                    name = COALESCE(?1, name),
                    roll_number = COALESCE(?2, roll_number),
                    class_id = COALESCE(?3, class_id),
                    face_embedding = COALESCE(?4, face_embedding),
                    photo_path = COALESCE(?5, photo_path)
                WHERE id = ?6
                ",
                params![
                    update.name,
                    update.roll_number,
                    update.class_id,
                    update.face_embedding,
                    photo,
                    id,
                ],
            )
            .map_err(|e| unique_or(e, || Error::conflict("roll number already exists in class")))?;

        if affected == 0 {
            return Err(Error::not_found("student", id));
        }
        self.get_student(id)?
            .ok_or_else(|| Error::not_found("student", id))
    }

    /// Get a student by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_student(&self, id: i64) -> Result<Option<Student>> {
        let student = self
            .conn
            .query_row(
                &format!("{STUDENT_SELECT} WHERE s.id = ?1"),
                [id],
                Self::row_to_student,
            )
            .optional()?;
        Ok(student)
    }

    /// List students ordered by name, optionally restricted to one class.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_students(&self, class_id: Option<i64>) -> Result<Vec<Student>> {
        let mut stmt = self.conn.prepare(&format!(
            "{STUDENT_SELECT} WHERE (?1 IS NULL OR s.class_id = ?1) ORDER BY s.name, s.id"
        ))?;
        let students = stmt
            .query_map([class_id], Self::row_to_student)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(students)
    }

    /// Students that carry a stored embedding, in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn students_with_embeddings(&self) -> Result<Vec<Student>> {
        let mut stmt = self.conn.prepare(&format!(
            "{STUDENT_SELECT} WHERE s.face_embedding IS NOT NULL ORDER BY s.id"
        ))?;
        let students = stmt
            .query_map([], Self::row_to_student)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(students)
    }

    /// Delete a student and their attendance history.
    ///
    /// Returns `true` if a student was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn remove_student(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM students WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Count students whose stored photo is `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_photo_references(&self, path: &Path) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM students WHERE photo_path = ?1",
            [path_to_text(path)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // === Profiles & teachers ===

    /// Create a profile with the given role.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn create_profile(&self, role: Role) -> Result<Profile> {
        self.conn
            .execute("INSERT INTO profiles (role) VALUES (?1)", [role.to_string()])?;
        Ok(Profile {
            id: self.conn.last_insert_rowid(),
            role,
        })
    }

    /// Get a profile by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the stored role
    /// is unknown.
    pub fn get_profile(&self, id: i64) -> Result<Option<Profile>> {
        let role: Option<String> = self
            .conn
            .query_row("SELECT role FROM profiles WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;
        match role {
            Some(role) => Ok(Some(Profile {
                id,
                role: role.parse()?,
            })),
            None => Ok(None),
        }
    }

    /// Count profiles holding `role`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_profiles(&self, role: Role) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM profiles WHERE role = ?1",
            [role.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Register a teacher together with their teacher profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if the email is taken, or an error if the
    /// database operation fails.
    pub fn add_teacher(&self, name: &str, email: &str, subject: &str) -> Result<Teacher> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO profiles (role) VALUES (?1)",
            [Role::Teacher.to_string()],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO teachers (id, name, email, subject) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, email, subject],
        )
        .map_err(|e| unique_or(e, || Error::conflict(format!("teacher email {email} already exists"))))?;
        tx.commit()?;

        debug!("Inserted teacher with id {}", id);
        Ok(Teacher {
            id,
            name: name.to_string(),
            email: email.to_string(),
            subject: subject.to_string(),
        })
    }

    /// List teachers ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_teachers(&self) -> Result<Vec<Teacher>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, email, subject FROM teachers ORDER BY name, id")?;
        let teachers = stmt
            .query_map([], |row| {
                Ok(Teacher {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    subject: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(teachers)
    }

    /// Delete a teacher and their profile.
    ///
    /// Returns `true` if a teacher was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn remove_teacher(&self, id: i64) -> Result<bool> {
        let affected = self.conn.execute(
            "DELETE FROM profiles WHERE id = ?1 AND id IN (SELECT id FROM teachers)",
            [id],
        )?;
        Ok(affected > 0)
    }

    // === Attendance ===

    /// Look up the attendance record of a student for a day.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_attendance(
        &self,
        student_id: i64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE student_id = ?1 AND date = ?2"
                ),
                params![student_id, date.format(DATE_FORMAT).to_string()],
                Self::row_to_attendance,
            )
            .optional()?;
        Ok(record)
    }

    /// Insert an attendance record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateAttendance`] when a record for the same
    /// student and day already exists, or an error if the database operation
    /// fails.
    pub fn insert_attendance(&self, new: &NewAttendance) -> Result<AttendanceRecord> {
        let time = new.time.format(TIME_FORMAT).to_string();
        self.conn
            .execute(
                r"
                INSERT INTO attendance (student_id, date, time, status, device_id)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
                params![
                    new.student_id,
                    new.date.format(DATE_FORMAT).to_string(),
                    time,
                    new.status.to_string(),
                    new.device_id,
                ],
            )
            .map_err(|e| {
                unique_or(e, || Error::DuplicateAttendance {
                    student_id: new.student_id,
                    date: new.date,
                })
            })?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted attendance with id {}", id);
        Ok(AttendanceRecord {
            id,
            student_id: new.student_id,
            date: new.date,
            time: parse_time(3, &time)?,
            status: new.status,
            device_id: new.device_id.clone(),
        })
    }

    /// Attendance for a day joined to students, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn attendance_for_date(
        &self,
        date: NaiveDate,
        class_id: Option<i64>,
    ) -> Result<Vec<AttendanceEntry>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT a.id, a.student_id, a.date, a.time, a.status, a.device_id,
                   s.name, s.roll_number, s.class_id, c.name
            FROM attendance a
            JOIN students s ON s.id = a.student_id
            JOIN classes c ON c.id = s.class_id
            WHERE a.date = ?1 AND (?2 IS NULL OR s.class_id = ?2)
            ORDER BY a.time DESC, a.id DESC
            ",
        )?;
        let entries = stmt
            .query_map(
                params![date.format(DATE_FORMAT).to_string(), class_id],
                |row| {
                    Ok(AttendanceEntry {
                        record: Self::row_to_attendance(row)?,
                        student_name: row.get(6)?,
                        roll_number: row.get(7)?,
                        class_id: row.get(8)?,
                        class_name: row.get(9)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Count all attendance records.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_attendance(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM attendance", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Row count and highest id of the attendance table.
    ///
    /// Attendance rows are only ever inserted or deleted, so any change to
    /// the table changes this pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn attendance_marker(&self) -> Result<(i64, i64)> {
        let marker = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(MAX(id), 0) FROM attendance",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(marker)
    }

    /// `SQLite`'s data version for this connection.
    ///
    /// The value changes whenever another connection commits a change to the
    /// database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the pragma cannot be read.
    pub fn data_version(&self) -> Result<i64> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA data_version", [], |row| row.get(0))?;
        Ok(version)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let count = |sql: &str| -> Result<i64> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            classes: count("SELECT COUNT(*) FROM classes")?,
            students: count("SELECT COUNT(*) FROM students")?,
            enrolled_faces: count("SELECT COUNT(*) FROM students WHERE face_embedding IS NOT NULL")?,
            teachers: count("SELECT COUNT(*) FROM teachers")?,
            attendance_records: self.count_attendance()?,
            db_size_bytes,
        })
    }

    fn require_class(&self, class_id: i64) -> Result<()> {
        if self.get_class(class_id)?.is_none() {
            return Err(Error::not_found("class", class_id));
        }
        Ok(())
    }

    /// Convert a database row to a Student struct.
    fn row_to_student(row: &rusqlite::Row) -> rusqlite::Result<Student> {
        let photo_path: Option<String> = row.get(6)?;
        Ok(Student {
            id: row.get(0)?,
            name: row.get(1)?,
            roll_number: row.get(2)?,
            class_id: row.get(3)?,
            class_name: row.get(4)?,
            face_embedding: row.get(5)?,
            photo_path: photo_path.map(PathBuf::from),
        })
    }

    /// Convert a database row to an `AttendanceRecord` struct.
    fn row_to_attendance(row: &rusqlite::Row) -> rusqlite::Result<AttendanceRecord> {
        let date: String = row.get(2)?;
        let time: String = row.get(3)?;
        let status: String = row.get(4)?;

        let status = status
            .parse::<AttendanceStatus>()
            .map_err(|e| conversion_error(4, e.to_string()))?;

        Ok(AttendanceRecord {
            id: row.get(0)?,
            student_id: row.get(1)?,
            date: parse_date(2, &date)?,
            time: parse_time(3, &time)?,
            status,
            device_id: row.get(5)?,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of classes.
    pub classes: i64,
    /// Number of enrolled students.
    pub students: i64,
    /// Students with a stored face embedding.
    pub enrolled_faces: i64,
    /// Number of teachers.
    pub teachers: i64,
    /// Total attendance records.
    pub attendance_records: i64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

fn unique_or(err: rusqlite::Error, conflict: impl FnOnce() -> Error) -> Error {
    if is_unique_violation(&err) {
        conflict()
    } else {
        err.into()
    }
}

fn path_to_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::<dyn std::error::Error + Send + Sync>::from(message),
    )
}

fn parse_date(idx: usize, text: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .map_err(|e| conversion_error(idx, format!("bad date '{text}': {e}")))
}

fn parse_time(idx: usize, text: &str) -> rusqlite::Result<NaiveTime> {
    NaiveTime::parse_from_str(text, TIME_FORMAT)
        .map_err(|e| conversion_error(idx, format!("bad time '{text}': {e}")))
}
