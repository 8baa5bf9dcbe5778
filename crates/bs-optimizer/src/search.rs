//! Search space definitions and the shuffled parameter grid.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use bs_types::{BsResult, ParamSet, ParamValue, SearchError};

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Hyperparameter name as the backend expects it (e.g. "num_leaves").
    pub name: String,
    /// How the candidate values are produced.
    pub kind: ParameterKind,
}

/// Describes the candidate values of one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Explicit candidate list, evaluated in the given order.
    Choice { values: Vec<ParamValue> },
    /// Integer range [low, high] inclusive.
    IntRange {
        low: i64,
        high: i64,
        #[serde(default = "default_step")]
        step: i64,
    },
    /// `steps` evenly spaced values over [low, high].
    FloatRange { low: f64, high: f64, steps: usize },
    /// `steps` values evenly spaced in log-space over [low, high].
    LogRange { low: f64, high: f64, steps: usize },
}

fn default_step() -> i64 {
    1
}

impl ParameterKind {
    /// Expand the dimension to its candidate list.
    pub fn candidates(&self) -> Vec<ParamValue> {
        match self {
            Self::Choice { values } => values.clone(),
            Self::IntRange { low, high, step } => {
                let step = (*step).max(1) as usize;
                (*low..=*high).step_by(step).map(ParamValue::Int).collect()
            }
            Self::FloatRange { low, high, steps } => linspace(*low, *high, *steps)
                .into_iter()
                .map(ParamValue::Float)
                .collect(),
            Self::LogRange { low, high, steps } => linspace(low.ln(), high.ln(), *steps)
                .into_iter()
                .map(|v| ParamValue::Float(v.exp()))
                .collect(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Choice { values } => values.len(),
            Self::IntRange { low, high, step } if high >= low => {
                ((high - low) / (*step).max(1)) as usize + 1
            }
            Self::IntRange { .. } => 0,
            Self::FloatRange { steps, .. } | Self::LogRange { steps, .. } => *steps,
        }
    }
}

fn linspace(low: f64, high: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => Vec::new(),
        1 => vec![low],
        _ => (0..steps)
            .map(|i| {
                let t = i as f64 / (steps - 1) as f64;
                low + t * (high - low)
            })
            .collect(),
    }
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_choice(mut self, name: impl Into<String>, values: Vec<ParamValue>) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Choice { values },
        });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64, step: i64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::IntRange { low, high, step },
        });
        self
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64, steps: usize) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::FloatRange { low, high, steps },
        });
        self
    }

    pub fn add_log(mut self, name: impl Into<String>, low: f64, high: f64, steps: usize) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::LogRange { low, high, steps },
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Total number of grid points, `None` on overflow.
    pub fn grid_size(&self) -> Option<usize> {
        self.parameters
            .iter()
            .try_fold(1usize, |total, p| total.checked_mul(p.kind.len()))
    }

    /// Reject duplicate names and malformed ranges.
    pub fn validate(&self) -> BsResult<()> {
        let mut seen = HashSet::new();
        for param in &self.parameters {
            let invalid = |message: String| SearchError::InvalidParameter {
                parameter: param.name.clone(),
                message,
            };
            if !seen.insert(param.name.as_str()) {
                return Err(invalid("declared more than once".to_string()).into());
            }
            match &param.kind {
                ParameterKind::IntRange { step, .. } if *step < 1 => {
                    return Err(invalid(format!("step must be positive, got {step}")).into());
                }
                ParameterKind::LogRange { low, high, .. } if *low <= 0.0 || *high <= 0.0 => {
                    return Err(invalid(format!(
                        "log range bounds must be positive, got [{low}, {high}]"
                    ))
                    .into());
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Every combination of a search space, in evaluation order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterGrid {
    points: Vec<ParamSet>,
}

impl ParameterGrid {
    /// Cartesian product of all dimensions; the first dimension varies
    /// slowest and each point lists parameters in declaration order.
    pub fn new(space: &SearchSpace) -> Self {
        let mut points = vec![ParamSet::new()];
        for param in &space.parameters {
            let axis = param.kind.candidates();
            let mut next = Vec::with_capacity(points.len() * axis.len());
            for existing in &points {
                for value in &axis {
                    next.push(existing.clone().with(param.name.clone(), value.clone()));
                }
            }
            points = next;
        }
        Self { points }
    }

    /// Uniformly shuffle the evaluation order. A seed makes the order
    /// reproducible; without one the thread RNG is used.
    pub fn shuffle(&mut self, seed: Option<u64>) {
        match seed {
            Some(seed) => self.points.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => self.points.shuffle(&mut rand::rng()),
        }
    }

    /// Build, shuffle and optionally cap the grid in one step.
    pub fn shuffled(space: &SearchSpace, seed: Option<u64>, max_trials: Option<usize>) -> Self {
        let mut grid = Self::new(space);
        grid.shuffle(seed);
        if let Some(max) = max_trials {
            grid.points.truncate(max);
        }
        grid
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[ParamSet] {
        &self.points
    }
}

impl IntoIterator for ParameterGrid {
    type Item = ParamSet;
    type IntoIter = std::vec::IntoIter<ParamSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}
