//! Search space definition for hyperparameters

use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Type of parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterType {
    /// Continuous float parameter
    Float {
        low: f64,
        high: f64,
        log_scale: bool,
    },
    /// Integer parameter
    Int {
        low: i64,
        high: i64,
    },
    /// Categorical parameter
    Categorical {
        choices: Vec<String>,
    },
    /// Boolean parameter
    Boolean,
    /// Explicit list of values, sampled uniformly (grid-style spaces)
    Choice {
        values: Vec<ParameterValue>,
    },
}

/// A single hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParameterType,
}

impl Parameter {
    /// Create a float parameter
    pub fn float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float {
                low,
                high,
                log_scale: false,
            },
        }
    }

    /// Create a log-scale float parameter
    pub fn log_float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float {
                low,
                high,
                log_scale: true,
            },
        }
    }

    /// Create an integer parameter (inclusive bounds)
    pub fn int(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Int { low, high },
        }
    }

    /// Create a categorical parameter
    pub fn categorical(name: impl Into<String>, choices: Vec<&str>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Categorical {
                choices: choices.into_iter().map(String::from).collect(),
            },
        }
    }

    /// Create a boolean parameter
    pub fn boolean(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Boolean,
        }
    }

    /// Create a parameter from an explicit value list
    pub fn choice(name: impl Into<String>, values: Vec<ParameterValue>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Choice { values },
        }
    }

    /// Sample a random value
    pub fn sample(&self, rng: &mut impl Rng) -> ParameterValue {
        match &self.param_type {
            ParameterType::Float { low, high, log_scale } => {
                let val = if *log_scale {
                    let log_low = low.ln();
                    let log_high = high.ln();
                    (rng.gen::<f64>() * (log_high - log_low) + log_low).exp()
                } else {
                    rng.gen::<f64>() * (high - low) + low
                };
                ParameterValue::Float(val)
            }
            ParameterType::Int { low, high } => ParameterValue::Int(rng.gen_range(*low..=*high)),
            ParameterType::Categorical { choices } => {
                let idx = rng.gen_range(0..choices.len());
                ParameterValue::String(choices[idx].clone())
            }
            ParameterType::Boolean => ParameterValue::Bool(rng.gen()),
            ParameterType::Choice { values } => {
                let idx = rng.gen_range(0..values.len());
                values[idx].clone()
            }
        }
    }

    /// Every value of a discrete parameter, `None` for continuous ranges
    fn discrete_values(&self) -> Option<Vec<ParameterValue>> {
        match &self.param_type {
            ParameterType::Float { .. } => None,
            ParameterType::Int { low, high } => Some((*low..=*high).map(ParameterValue::Int).collect()),
            ParameterType::Categorical { choices } => {
                Some(choices.iter().cloned().map(ParameterValue::String).collect())
            }
            ParameterType::Boolean => Some(vec![ParameterValue::Bool(false), ParameterValue::Bool(true)]),
            ParameterType::Choice { values } => Some(values.clone()),
        }
    }
}

/// Sampled parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Float(f64),
    Int(i64),
    String(String),
    Bool(bool),
    /// Explicit "unset", e.g. an unbounded tree depth
    None,
}

impl ParameterValue {
    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            ParameterValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Get as a non-negative integer
    pub fn as_usize(&self) -> Option<usize> {
        self.as_int().and_then(|v| usize::try_from(v).ok())
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ParameterValue::None)
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::String(v) => write!(f, "{}", v),
            ParameterValue::Bool(v) => write!(f, "{}", v),
            ParameterValue::None => write!(f, "None"),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Int(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::String(v.to_string())
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        ParameterValue::Bool(v)
    }
}

/// Search space for hyperparameter optimization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    parameters: Vec<Parameter>,
}

impl SearchSpace {
    /// Create a new empty search space
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter to the search space
    pub fn add(mut self, param: Parameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// Add a float parameter
    pub fn float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(Parameter::float(name, low, high))
    }

    /// Add a log-scale float parameter
    pub fn log_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(Parameter::log_float(name, low, high))
    }

    /// Add an integer parameter
    pub fn int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(Parameter::int(name, low, high))
    }

    /// Add a categorical parameter
    pub fn categorical(self, name: impl Into<String>, choices: Vec<&str>) -> Self {
        self.add(Parameter::categorical(name, choices))
    }

    /// Add a boolean parameter
    pub fn boolean(self, name: impl Into<String>) -> Self {
        self.add(Parameter::boolean(name))
    }

    /// Add an explicit value list
    pub fn choice(self, name: impl Into<String>, values: Vec<ParameterValue>) -> Self {
        self.add(Parameter::choice(name, values))
    }

    /// Get all parameters
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Sample a random configuration
    pub fn sample(&self, rng: &mut impl Rng) -> TrialParams {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.sample(rng)))
            .collect()
    }

    /// Every configuration of a fully discrete space, `None` if any
    /// parameter is continuous.
    pub fn grid(&self) -> Option<Vec<TrialParams>> {
        let mut grid: Vec<TrialParams> = vec![TrialParams::new()];
        for param in &self.parameters {
            let values = param.discrete_values()?;
            grid = grid
                .into_iter()
                .flat_map(|partial| {
                    values.iter().map(move |v| {
                        let mut next = partial.clone();
                        next.insert(param.name.clone(), v.clone());
                        next
                    })
                })
                .collect();
        }
        Some(grid)
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Get parameter names in order
    pub fn param_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }
}

/// Sampled configuration, ordered by name so iteration is deterministic
pub type TrialParams = BTreeMap<String, ParameterValue>;

#[cfg(test)]
mod tests {
    use super::*;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_search_space_builder() {
        let space = SearchSpace::new()
            .float("learning_rate", 0.001, 0.1)
            .int("n_estimators", 10, 1000)
            .categorical("criterion", vec!["gini", "entropy"])
            .boolean("fit_intercept");

        assert_eq!(space.len(), 4);
        assert!(space.grid().is_none());
    }

    #[test]
    fn test_parameter_sampling() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

        let param = Parameter::float("lr", 0.0, 1.0);
        let val = param.sample(&mut rng);

        if let ParameterValue::Float(v) = val {
            assert!((0.0..=1.0).contains(&v));
        } else {
            panic!("Expected float value");
        }
    }

    #[test]
    fn test_log_scale_sampling() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let param = Parameter::log_float("lr", 0.0001, 0.1);

        for _ in 0..100 {
            let v = param.sample(&mut rng).as_float().unwrap();
            assert!((0.0001..=0.1).contains(&v));
        }
    }

    #[test]
    fn test_grid_enumeration() {
        let space = SearchSpace::new()
            .categorical("criterion", vec!["gini"])
            .choice("min_samples_split", vec![2i64.into(), 4i64.into()])
            .int("max_depth", 1, 3);

        let grid = space.grid().unwrap();
        assert_eq!(grid.len(), 6);
        assert!(grid
            .iter()
            .all(|p| p["criterion"] == ParameterValue::String("gini".to_string())));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(ParameterValue::Float(3.0).as_usize(), Some(3));
        assert_eq!(ParameterValue::Float(2.5).as_int(), None);
        assert_eq!(ParameterValue::Int(-1).as_usize(), None);
        assert_eq!(ParameterValue::None.to_string(), "None");
    }
}
