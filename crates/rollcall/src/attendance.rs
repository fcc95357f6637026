//! Recognition and attendance marking.
//!
//! [`AttendanceService`] ties the matcher to a backend: it reads the enrolled
//! embeddings, picks the closest student and records at most one attendance
//! row per student per day. The backend's uniqueness constraint is the final
//! word on duplicates; a rejected insert is reported as "already marked".

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use crate::config::Config;
use crate::embedding::Embedding;
use crate::error::{Error, Result};
use crate::matcher::FaceMatcher;
use crate::records::{AttendanceRecord, AttendanceStatus, NewAttendance, Student};
use crate::storage::Storage;

/// The reads and writes recognition needs from the store.
pub trait AttendanceBackend {
    /// All students carrying a stored embedding, in a stable order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn enrolled_students(&self) -> Result<Vec<Student>>;

    /// A student by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn student(&self, student_id: i64) -> Result<Option<Student>>;

    /// The record of `student_id` on `date`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn find_attendance(&self, student_id: i64, date: NaiveDate)
        -> Result<Option<AttendanceRecord>>;

    /// Insert a record.
    ///
    /// # Errors
    ///
    /// Must return [`Error::DuplicateAttendance`] when the per-day uniqueness
    /// rule rejects the insert.
    fn insert_attendance(&self, new: &NewAttendance) -> Result<AttendanceRecord>;
}

impl AttendanceBackend for Storage {
    fn enrolled_students(&self) -> Result<Vec<Student>> {
        self.students_with_embeddings()
    }

    fn student(&self, student_id: i64) -> Result<Option<Student>> {
        self.get_student(student_id)
    }

    fn find_attendance(
        &self,
        student_id: i64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>> {
        Storage::find_attendance(self, student_id, date)
    }

    fn insert_attendance(&self, new: &NewAttendance) -> Result<AttendanceRecord> {
        Storage::insert_attendance(self, new)
    }
}

impl<T: AttendanceBackend + ?Sized> AttendanceBackend for &T {
    fn enrolled_students(&self) -> Result<Vec<Student>> {
        (**self).enrolled_students()
    }

    fn student(&self, student_id: i64) -> Result<Option<Student>> {
        (**self).student(student_id)
    }

    fn find_attendance(
        &self,
        student_id: i64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>> {
        (**self).find_attendance(student_id, date)
    }

    fn insert_attendance(&self, new: &NewAttendance) -> Result<AttendanceRecord> {
        (**self).insert_attendance(new)
    }
}

/// Result of marking one student for one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkOutcome {
    /// A new record was written.
    Marked(AttendanceRecord),
    /// The student already had a record for the day.
    ///
    /// `existing` is `None` when the duplicate was detected by the backend
    /// rejecting the insert rather than by the lookup.
    AlreadyMarked {
        /// The record found by the lookup.
        existing: Option<AttendanceRecord>,
    },
}

impl MarkOutcome {
    /// Whether this call wrote a new row.
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Marked(_))
    }
}

/// Result of one recognition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
    /// Nobody was close enough.
    NoMatch {
        /// Stored embeddings compared.
        compared: usize,
        /// Stored embeddings skipped as unusable.
        skipped: usize,
    },
    /// A student matched and was marked present.
    Marked {
        /// The matched student.
        student: Student,
        /// Match distance.
        distance: f32,
        /// The new record.
        record: AttendanceRecord,
    },
    /// A student matched but was already marked today.
    AlreadyMarked {
        /// The matched student.
        student: Student,
        /// Match distance.
        distance: f32,
        /// The earlier record, when known.
        existing: Option<AttendanceRecord>,
    },
}

impl Recognition {
    /// The matched student, if any.
    #[must_use]
    pub fn student(&self) -> Option<&Student> {
        match self {
            Self::NoMatch { .. } => None,
            Self::Marked { student, .. } | Self::AlreadyMarked { student, .. } => Some(student),
        }
    }
}

/// Matches captured faces and records attendance.
#[derive(Debug)]
pub struct AttendanceService<B> {
    backend: B,
    matcher: FaceMatcher,
    device_id: Option<String>,
}

impl<B: AttendanceBackend> AttendanceService<B> {
    /// Create a service over a backend.
    #[must_use]
    pub fn new(backend: B, matcher: FaceMatcher, device_id: Option<String>) -> Self {
        Self {
            backend,
            matcher,
            device_id,
        }
    }

    /// Create a service using the recognition and attendance settings of `config`.
    #[must_use]
    pub fn from_config(backend: B, config: &Config) -> Self {
        Self::new(
            backend,
            FaceMatcher::new(
                config.recognition.match_threshold,
                config.recognition.embedding_dimensions,
            ),
            Some(config.attendance.device_id.clone()),
        )
    }

    /// The backend this service writes to.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The matcher in use.
    #[must_use]
    pub fn matcher(&self) -> &FaceMatcher {
        &self.matcher
    }

    /// Record `status` for a student on the day of `at`.
    ///
    /// Looks for an existing record first and inserts only when there is
    /// none. A uniqueness rejection from the backend (another device won the
    /// race) is reported as [`MarkOutcome::AlreadyMarked`].
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails for any other reason.
    pub fn mark(
        &self,
        student_id: i64,
        status: AttendanceStatus,
        at: NaiveDateTime,
    ) -> Result<MarkOutcome> {
        let date = at.date();
        debug!("Checking attendance for student {} on {}", student_id, date);

        if let Some(existing) = self.backend.find_attendance(student_id, date)? {
            info!("Attendance already marked for student {} on {}", student_id, date);
            return Ok(MarkOutcome::AlreadyMarked {
                existing: Some(existing),
            });
        }

        let new = NewAttendance::new(
            student_id,
            date,
            at.time(),
            status,
            self.device_id.as_deref(),
        );
        match self.backend.insert_attendance(&new) {
            Ok(record) => {
                info!("Marked student {} {} on {}", student_id, status, date);
                Ok(MarkOutcome::Marked(record))
            }
            Err(e) if e.is_duplicate_attendance() => {
                info!(
                    "Attendance already marked for student {} on {} (insert rejected)",
                    student_id, date
                );
                Ok(MarkOutcome::AlreadyMarked { existing: None })
            }
            Err(e) => Err(e),
        }
    }

    /// Mark a student by id, checking they exist first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown student, or a backend error.
    pub fn mark_student(
        &self,
        student_id: i64,
        status: AttendanceStatus,
        at: NaiveDateTime,
    ) -> Result<MarkOutcome> {
        if self.backend.student(student_id)?.is_none() {
            return Err(Error::not_found("student", student_id));
        }
        self.mark(student_id, status, at)
    }

    /// Match `query` against the enrolled students and mark the winner present.
    ///
    /// Every call re-reads the enrolled embeddings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEmbedding`] if `query` has the wrong
    /// dimensionality, or a backend error.
    pub fn recognize_and_mark(&self, query: &Embedding, at: NaiveDateTime) -> Result<Recognition> {
        if query.dimensions() != self.matcher.dimensions() {
            return Err(Error::invalid_embedding(format!(
                "expected {} values, got {}",
                self.matcher.dimensions(),
                query.dimensions()
            )));
        }

        let students = self.backend.enrolled_students()?;
        if students.is_empty() {
            info!("No students with face embeddings enrolled");
            return Ok(Recognition::NoMatch {
                compared: 0,
                skipped: 0,
            });
        }
        debug!("Comparing against {} enrolled students", students.len());

        let scan = self.matcher.best_match(query, &students);
        let Some(best) = scan.best else {
            info!(
                "No matching student (compared {}, threshold {})",
                scan.compared,
                self.matcher.threshold()
            );
            return Ok(Recognition::NoMatch {
                compared: scan.compared,
                skipped: scan.skipped,
            });
        };

        info!(
            "Match found: {} (distance: {:.3})",
            best.student.name, best.distance
        );
        let student = best.student.clone();
        let distance = best.distance;

        Ok(match self.mark(student.id, AttendanceStatus::Present, at)? {
            MarkOutcome::Marked(record) => Recognition::Marked {
                student,
                distance,
                record,
            },
            MarkOutcome::AlreadyMarked { existing } => Recognition::AlreadyMarked {
                student,
                distance,
                existing,
            },
        })
    }
}
