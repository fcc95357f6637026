//! Face embeddings.
//!
//! An embedding is the fixed-length vector an external face model produces
//! for one face. Embeddings are stored as JSON arrays of numbers and compared
//! by Euclidean distance.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Dimensionality of the embeddings produced by the usual recognition model.
pub const DEFAULT_DIMENSIONS: usize = 128;

/// A face embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Wrap raw values, checking they form a usable vector of `dimensions` values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEmbedding`] if the length differs from
    /// `dimensions` or any value is not finite.
    pub fn new(values: Vec<f32>, dimensions: usize) -> Result<Self> {
        if values.len() != dimensions {
            return Err(Error::invalid_embedding(format!(
                "expected {dimensions} values, got {}",
                values.len()
            )));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(Error::invalid_embedding(format!(
                "value at index {pos} is not finite"
            )));
        }
        Ok(Self(values))
    }

    /// Parse the JSON text form stored in the `face_embedding` column.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON array of numbers or fails
    /// the checks in [`Embedding::new`].
    pub fn from_json(text: &str, dimensions: usize) -> Result<Self> {
        let values: Vec<f32> = serde_json::from_str(text)
            .map_err(|e| Error::invalid_embedding(format!("not a JSON number array: {e}")))?;
        Self::new(values, dimensions)
    }

    /// Serialize to the JSON text form stored in the database.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Number of values in the vector.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// The raw values.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Euclidean distance to another embedding of the same dimensionality.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEmbedding`] if the dimensions differ.
    pub fn distance(&self, other: &Self) -> Result<f32> {
        if self.0.len() != other.0.len() {
            return Err(Error::invalid_embedding(format!(
                "dimension mismatch: {} vs {}",
                self.0.len(),
                other.0.len()
            )));
        }
        Ok(euclidean_distance(&self.0, &other.0))
    }
}

/// Euclidean distance between two equal-length slices.
///
/// Extra elements of the longer slice are ignored; callers check lengths.
#[must_use]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(dimensions: usize, value: f32) -> Vec<f32> {
        let mut v = vec![0.0; dimensions];
        v[0] = value;
        v
    }

    #[test]
    fn test_new_checks_length() {
        assert!(Embedding::new(vec![0.0; 128], 128).is_ok());
        let err = Embedding::new(vec![0.0; 3], 128).unwrap_err();
        assert!(err.to_string().contains("expected 128 values, got 3"));
    }

    #[test]
    fn test_new_rejects_non_finite() {
        let mut values = vec![0.0; 4];
        values[2] = f32::NAN;
        let err = Embedding::new(values, 4).unwrap_err();
        assert!(err.to_string().contains("index 2"));
    }

    #[test]
    fn test_from_json() {
        let e = Embedding::from_json("[0.5, -0.25, 1]", 3).unwrap();
        assert_eq!(e.as_slice(), &[0.5, -0.25, 1.0]);
        assert_eq!(e.dimensions(), 3);
    }

    #[test]
    fn test_from_json_malformed() {
        assert!(Embedding::from_json("not json", 3).is_err());
        assert!(Embedding::from_json("{\"a\": 1}", 3).is_err());
        assert!(Embedding::from_json("[\"a\", \"b\", \"c\"]", 3).is_err());
        assert!(Embedding::from_json("[1, 2]", 3).is_err());
    }

    #[test]
    fn test_to_json_parses_back() {
        let e = Embedding::new(vec![0.125, 0.5], 2).unwrap();
        let text = e.to_json().unwrap();
        assert_eq!(Embedding::from_json(&text, 2).unwrap(), e);
    }

    #[test]
    fn test_distance_identical_is_zero() {
        let e = Embedding::new(axis(128, 0.3), 128).unwrap();
        assert_eq!(e.distance(&e).unwrap(), 0.0);
    }

    #[test]
    fn test_distance_single_axis() {
        let a = Embedding::new(axis(128, 0.0), 128).unwrap();
        let b = Embedding::new(axis(128, 0.45), 128).unwrap();
        assert_eq!(a.distance(&b).unwrap(), 0.45);
    }

    #[test]
    fn test_distance_three_four_five() {
        let a = Embedding::new(vec![0.0, 0.0], 2).unwrap();
        let b = Embedding::new(vec![3.0, 4.0], 2).unwrap();
        assert_eq!(a.distance(&b).unwrap(), 5.0);
    }

    #[test]
    fn test_distance_dimension_mismatch() {
        let a = Embedding::new(vec![0.0; 2], 2).unwrap();
        let b = Embedding::new(vec![0.0; 3], 3).unwrap();
        assert!(a.distance(&b).is_err());
    }
}
