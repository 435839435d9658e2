//! Observation tensors and their expected shapes

use ndarray::{Array1, ArrayD, ArrayView1, IxDyn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{RLError, Result};

/// How the game board is presented to the networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationType {
    /// `columns x rows x 2` image with a paddle channel and a ball channel
    #[default]
    Pixel,
    /// `[paddle_x, ball_x, ball_y]`
    Vector,
}

impl FromStr for ObservationType {
    type Err = RLError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pixel" => Ok(ObservationType::Pixel),
            "vector" => Ok(ObservationType::Vector),
            other => Err(RLError::Configuration(format!(
                "unknown observation type '{other}', expected 'pixel' or 'vector'"
            ))),
        }
    }
}

impl fmt::Display for ObservationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationType::Pixel => f.write_str("pixel"),
            ObservationType::Vector => f.write_str("vector"),
        }
    }
}

/// Observation type together with the board size it was produced for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationSpec {
    /// Observation encoding
    pub kind: ObservationType,
    /// Board rows
    pub rows: usize,
    /// Board columns
    pub columns: usize,
}

impl ObservationSpec {
    /// Create a spec for a board of the given size
    #[must_use]
    pub fn new(kind: ObservationType, rows: usize, columns: usize) -> Self {
        Self { kind, rows, columns }
    }

    /// Shape of a single observation
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        match self.kind {
            ObservationType::Pixel => vec![self.columns, self.rows, 2],
            ObservationType::Vector => vec![3],
        }
    }

    /// Number of scalar features once flattened
    #[must_use]
    pub fn flat_dim(&self) -> usize {
        self.shape().iter().product()
    }

    /// Check that an observation has exactly this spec's shape
    pub fn check(&self, observation: &Observation) -> Result<()> {
        let expected = self.shape();
        if observation.shape() == expected.as_slice() {
            Ok(())
        } else {
            Err(RLError::Environment(format!(
                "observation shape {:?} does not match {} shape {:?}",
                observation.shape(),
                self.kind,
                expected
            )))
        }
    }
}

/// A single observation with its natural (unbatched) shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    data: ArrayD<f32>,
}

impl Observation {
    /// Wrap an n-dimensional array
    #[must_use]
    pub fn new(data: ArrayD<f32>) -> Self {
        Self { data }
    }

    /// Build an observation from flat data and a shape
    pub fn from_shape_vec(shape: &[usize], data: Vec<f32>) -> Result<Self> {
        Ok(Self {
            data: ArrayD::from_shape_vec(IxDyn(shape), data)?,
        })
    }

    /// Shape of the observation
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Underlying array
    #[must_use]
    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    /// Row-major flattened copy
    #[must_use]
    pub fn flatten(&self) -> Array1<f32> {
        self.data.iter().copied().collect()
    }

    /// Rebuild an observation from a flattened row
    pub fn unflatten(row: ArrayView1<'_, f32>, shape: &[usize]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if row.len() != expected {
            return Err(RLError::DimensionMismatch {
                expected,
                actual: row.len(),
            });
        }
        Self::from_shape_vec(shape, row.to_vec())
    }

    /// Whether every element is finite
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_shape_is_columns_rows_channels() {
        let spec = ObservationSpec::new(ObservationType::Pixel, 7, 5);
        assert_eq!(spec.shape(), vec![5, 7, 2]);
        assert_eq!(spec.flat_dim(), 70);
    }

    #[test]
    fn test_vector_shape() {
        let spec = ObservationSpec::new(ObservationType::Vector, 7, 7);
        assert_eq!(spec.shape(), vec![3]);
        assert_eq!(spec.flat_dim(), 3);
    }

    #[test]
    fn test_parse_observation_type() {
        assert_eq!("pixel".parse::<ObservationType>().unwrap(), ObservationType::Pixel);
        assert_eq!("Vector".parse::<ObservationType>().unwrap(), ObservationType::Vector);
        assert!(matches!(
            "rgb".parse::<ObservationType>(),
            Err(RLError::Configuration(_))
        ));
    }

    #[test]
    fn test_flatten_round_trip_keeps_layout() {
        let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let obs = Observation::from_shape_vec(&[2, 3, 2], data.clone()).unwrap();
        let flat = obs.flatten();
        assert_eq!(flat.to_vec(), data);

        let back = Observation::unflatten(flat.view(), &[2, 3, 2]).unwrap();
        assert_eq!(back, obs);
    }

    #[test]
    fn test_check_rejects_wrong_shape() {
        let spec = ObservationSpec::new(ObservationType::Vector, 7, 7);
        let obs = Observation::from_shape_vec(&[4], vec![0.0; 4]).unwrap();
        assert!(matches!(spec.check(&obs), Err(RLError::Environment(_))));
    }
}
