//! Student enrollment.
//!
//! [`Enrollment`] validates roll numbers and embeddings, copies photos into
//! the [`PhotoStore`] and writes the student through [`Storage`].

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embedding::Embedding;
use crate::error::{Error, Result};
use crate::photos::PhotoStore;
use crate::records::{NewStudent, Student, StudentUpdate};
use crate::storage::Storage;

/// Input for enrolling a student.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrollRequest {
    /// Full name.
    pub name: String,
    /// Roll number.
    pub roll_number: String,
    /// Class to enroll into.
    pub class_id: i64,
    /// Embedding as a JSON array of numbers.
    pub embedding: Option<String>,
    /// Photo file to copy into the store.
    pub photo: Option<PathBuf>,
}

/// Input for updating a student. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    /// New name.
    pub name: Option<String>,
    /// New roll number.
    pub roll_number: Option<String>,
    /// New class.
    pub class_id: Option<i64>,
    /// Replacement embedding as a JSON array of numbers.
    pub embedding: Option<String>,
    /// Replacement photo file.
    pub photo: Option<PathBuf>,
}

/// Enrolls, updates and removes students.
#[derive(Debug)]
pub struct Enrollment<'a> {
    storage: &'a Storage,
    photos: PhotoStore,
    roll_pattern: Regex,
    dimensions: usize,
    require_embedding: bool,
}

impl<'a> Enrollment<'a> {
    /// Build from the enrollment, recognition and storage settings of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] if the roll number pattern is not a
    /// valid regex.
    pub fn from_config(storage: &'a Storage, config: &Config) -> Result<Self> {
        let pattern = &config.enrollment.roll_number_pattern;
        let roll_pattern = Regex::new(pattern).map_err(|e| Error::ConfigValidation {
            message: format!("invalid roll number pattern {pattern}: {e}"),
        })?;

        Ok(Self {
            storage,
            photos: PhotoStore::new(config.photos_dir()),
            roll_pattern,
            dimensions: config.recognition.embedding_dimensions,
            require_embedding: config.enrollment.require_embedding,
        })
    }

    /// The photo store in use.
    #[must_use]
    pub fn photos(&self) -> &PhotoStore {
        &self.photos
    }

    /// Check a roll number against the configured pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if it does not match.
    pub fn check_roll_number(&self, roll_number: &str) -> Result<()> {
        if self.roll_pattern.is_match(roll_number) {
            Ok(())
        } else {
            Err(Error::invalid_input(format!(
                "roll number {roll_number:?} does not match {}",
                self.roll_pattern.as_str()
            )))
        }
    }

    /// Validate embedding JSON and return its normalized stored form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEmbedding`] if the text is not an array of
    /// the configured number of finite values.
    pub fn normalize_embedding(&self, text: &str) -> Result<String> {
        Embedding::from_json(text, self.dimensions)?.to_json()
    }

    /// Enroll a new student.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails, the photo cannot be stored or
    /// the database rejects the student.
    pub fn enroll(&self, request: &EnrollRequest) -> Result<Student> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(Error::invalid_input("student name must not be empty"));
        }
        self.check_roll_number(&request.roll_number)?;

        let face_embedding = match &request.embedding {
            Some(text) => Some(self.normalize_embedding(text)?),
            None if self.require_embedding => {
                return Err(Error::invalid_input(
                    "an embedding is required to enroll a student",
                ))
            }
            None => {
                warn!(
                    "Enrolling {} without an embedding; they cannot be recognised",
                    name
                );
                None
            }
        };

        let photo_path = request
            .photo
            .as_deref()
            .map(|p| self.photos.store(p, request.class_id, &request.roll_number))
            .transpose()?;

        let added = self.storage.add_student(&NewStudent {
            name: name.to_string(),
            roll_number: request.roll_number.clone(),
            class_id: request.class_id,
            face_embedding,
            photo_path: photo_path.clone(),
        });
        let student = match added {
            Ok(student) => student,
            Err(e) => {
                self.discard_after_failure(photo_path.as_deref());
                return Err(e);
            }
        };
        info!(
            "Enrolled {} (roll {}) in class {}",
            student.name,
            student.roll_number,
            student.class_label()
        );
        Ok(student)
    }

    /// Update a student, replacing only the given fields.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails, the student does not exist or
    /// the database rejects the update.
    pub fn update(&self, student_id: i64, request: &UpdateRequest) -> Result<Student> {
        let current = self
            .storage
            .get_student(student_id)?
            .ok_or_else(|| Error::not_found("student", student_id))?;

        if let Some(roll) = &request.roll_number {
            self.check_roll_number(roll)?;
        }
        let face_embedding = request
            .embedding
            .as_deref()
            .map(|text| self.normalize_embedding(text))
            .transpose()?;

        let roll = request.roll_number.as_deref().unwrap_or(&current.roll_number);
        let class_id = request.class_id.unwrap_or(current.class_id);
        let photo_path = request
            .photo
            .as_deref()
            .map(|p| self.photos.store(p, class_id, roll))
            .transpose()?;

        let update = StudentUpdate {
            name: request.name.as_ref().map(|n| n.trim().to_string()),
            roll_number: request.roll_number.clone(),
            class_id: request.class_id,
            face_embedding,
            photo_path,
        };
        if update.is_empty() {
            debug!("Nothing to update for student {}", student_id);
            return Ok(current);
        }

        let updated = match self.storage.update_student(student_id, &update) {
            Ok(updated) => updated,
            Err(e) => {
                self.discard_after_failure(update.photo_path.as_deref());
                return Err(e);
            }
        };
        if update.photo_path.is_some() && update.photo_path != current.photo_path {
            if let Some(old) = &current.photo_path {
                self.discard(old)?;
            }
        }
        info!("Updated student {}", student_id);
        Ok(updated)
    }

    /// Remove a student, their attendance and their stored photo.
    ///
    /// Returns whether the student existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation or photo removal fails.
    pub fn remove(&self, student_id: i64) -> Result<bool> {
        let Some(student) = self.storage.get_student(student_id)? else {
            return Ok(false);
        };
        let removed = self.storage.remove_student(student_id)?;
        if let Some(photo) = &student.photo_path {
            self.discard(photo)?;
        }
        Ok(removed)
    }

    /// Delete a stored photo once no student refers to it.
    fn discard(&self, path: &Path) -> Result<bool> {
        if self.storage.count_photo_references(path)? > 0 {
            debug!("Photo {} is still in use", path.display());
            return Ok(false);
        }
        self.photos.remove(path)
    }

    /// Clean up a photo stored for a write the database rejected.
    fn discard_after_failure(&self, path: Option<&Path>) {
        if let Some(path) = path {
            if let Err(e) = self.discard(path) {
                warn!("Could not remove unused photo {}: {}", path.display(), e);
            }
        }
    }
}
