//! Nearest-neighbour face matching.
//!
//! A linear scan over enrolled students: the closest stored embedding wins,
//! provided its distance is strictly below the acceptance threshold.

use tracing::{debug, warn};

use crate::embedding::{Embedding, DEFAULT_DIMENSIONS};
use crate::records::Student;

/// Default acceptance threshold.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.45;

/// The best candidate found by [`FaceMatcher::best_match`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match<'a> {
    /// The matched student.
    pub student: &'a Student,
    /// Distance between the query and the student's stored embedding.
    pub distance: f32,
}

/// Summary of one scan over the candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchScan<'a> {
    /// The accepted match, if any.
    pub best: Option<Match<'a>>,
    /// Candidates whose stored embedding was compared.
    pub compared: usize,
    /// Candidates skipped because their stored embedding was unusable.
    pub skipped: usize,
}

/// Threshold nearest-neighbour matcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMatcher {
    threshold: f32,
    dimensions: usize,
}

impl Default for FaceMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD, DEFAULT_DIMENSIONS)
    }
}

impl FaceMatcher {
    /// Create a matcher with the given threshold and expected dimensionality.
    #[must_use]
    pub fn new(threshold: f32, dimensions: usize) -> Self {
        Self {
            threshold,
            dimensions,
        }
    }

    /// The acceptance threshold.
    #[must_use]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// The embedding dimensionality candidates must have.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Find the enrolled student closest to `query`.
    ///
    /// Students without a stored embedding are never selected. A stored
    /// embedding that fails to parse, or has the wrong dimensionality, is
    /// logged and skipped; the scan carries on with the rest.
    ///
    /// Ties: the first candidate in iteration order holding the minimum
    /// distance wins, since a later candidate must be strictly closer to
    /// replace it.
    #[must_use]
    pub fn best_match<'a>(&self, query: &Embedding, candidates: &'a [Student]) -> MatchScan<'a> {
        let mut best: Option<Match<'a>> = None;
        let mut compared = 0;
        let mut skipped = 0;

        for student in candidates {
            let Some(text) = student.face_embedding.as_deref() else {
                continue;
            };

            let stored = match Embedding::from_json(text, self.dimensions) {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(
                        student_id = student.id,
                        "Skipping unusable embedding for {}: {}", student.name, e
                    );
                    skipped += 1;
                    continue;
                }
            };

            let distance = match query.distance(&stored) {
                Ok(d) => d,
                Err(e) => {
                    warn!(student_id = student.id, "Skipping {}: {}", student.name, e);
                    skipped += 1;
                    continue;
                }
            };
            compared += 1;

            debug!(
                "{}: distance = {:.3} (threshold: {})",
                student.name, distance, self.threshold
            );

            if distance < self.threshold && best.map_or(true, |b| distance < b.distance) {
                best = Some(Match { student, distance });
            }
        }

        MatchScan {
            best,
            compared,
            skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(value: f32) -> Vec<f32> {
        let mut v = vec![0.0; DEFAULT_DIMENSIONS];
        v[0] = value;
        v
    }

    fn student(id: i64, embedding: Option<Vec<f32>>) -> Student {
        Student {
            id,
            name: format!("Student {id}"),
            roll_number: format!("R-{id}"),
            class_id: 1,
            class_name: None,
            face_embedding: embedding.map(|v| serde_json::to_string(&v).unwrap()),
            photo_path: None,
        }
    }

    fn query() -> Embedding {
        Embedding::new(axis(0.0), DEFAULT_DIMENSIONS).unwrap()
    }

    #[test]
    fn test_no_candidates_is_no_match() {
        let scan = FaceMatcher::default().best_match(&query(), &[]);
        assert!(scan.best.is_none());
        assert_eq!(scan.compared, 0);
    }

    #[test]
    fn test_identical_embedding_selected_among_others() {
        let q = Embedding::new(axis(0.2), DEFAULT_DIMENSIONS).unwrap();
        let students = vec![
            student(1, Some(axis(0.4))),
            student(2, Some(axis(0.2))),
            student(3, Some(axis(0.3))),
        ];
        let scan = FaceMatcher::default().best_match(&q, &students);
        let best = scan.best.unwrap();
        assert_eq!(best.student.id, 2);
        assert_eq!(best.distance, 0.0);
    }

    #[test]
    fn test_selects_closest_of_three() {
        let students = vec![
            student(1, Some(axis(0.5))),
            student(2, Some(axis(0.1))),
            student(3, Some(axis(0.3))),
        ];
        let scan = FaceMatcher::default().best_match(&query(), &students);
        assert_eq!(scan.best.unwrap().student.id, 2);
        assert_eq!(scan.compared, 3);
    }

    #[test]
    fn test_distance_at_or_above_threshold_never_matches() {
        for value in [0.45_f32, 0.4501, 0.5, 0.9, 3.0] {
            let students = vec![student(1, Some(axis(value)))];
            let scan = FaceMatcher::default().best_match(&query(), &students);
            assert!(scan.best.is_none(), "matched at distance {value}");
        }
    }

    #[test]
    fn test_just_below_threshold_matches() {
        let students = vec![student(1, Some(axis(0.449)))];
        let scan = FaceMatcher::default().best_match(&query(), &students);
        assert!(scan.best.is_some());
    }

    #[test]
    fn test_student_without_embedding_never_selected() {
        let students = vec![student(1, None), student(2, Some(axis(0.6)))];
        let scan = FaceMatcher::default().best_match(&query(), &students);
        assert!(scan.best.is_none());
        assert_eq!(scan.compared, 1);
        assert_eq!(scan.skipped, 0);
    }

    #[test]
    fn test_tie_goes_to_first_candidate() {
        let students = vec![
            student(7, Some(axis(0.2))),
            student(3, Some(axis(-0.2))),
        ];
        let scan = FaceMatcher::default().best_match(&query(), &students);
        assert_eq!(scan.best.unwrap().student.id, 7);
    }

    #[test]
    fn test_malformed_embeddings_skipped() {
        let mut broken = student(1, None);
        broken.face_embedding = Some("{not json".to_string());
        let short = student(2, Some(vec![0.0; 5]));
        let good = student(3, Some(axis(0.1)));

        let students = vec![broken, short, good];
        let scan = FaceMatcher::default().best_match(&query(), &students);
        assert_eq!(scan.best.unwrap().student.id, 3);
        assert_eq!(scan.skipped, 2);
        assert_eq!(scan.compared, 1);
    }

    #[test]
    fn test_custom_threshold() {
        let students = vec![student(1, Some(axis(0.5)))];
        let matcher = FaceMatcher::new(0.6, DEFAULT_DIMENSIONS);
        assert_eq!(matcher.threshold(), 0.6);
        assert!(matcher.best_match(&query(), &students).best.is_some());
    }
}
