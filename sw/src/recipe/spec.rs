//! ParameterSpec and SweepRecipe - the supplied sweep configuration

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SweepError;

/// The value type a parameter produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Integer,
    Float,
    Flag,
    Choice,
    TimeRange,
}

/// How a parameter's values are generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// start..=end stepping by increment
    #[default]
    Range,
    /// Union of several ranges
    Clusters,
    /// Explicit value list
    List,
    /// Exactly one constant value
    Locked,
    /// Time ranges only: start candidates x end candidates
    Cartesian,
}

/// A scalar as written in the recipe (number, bool or text)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Parse as a finite number
    pub fn as_f64(&self) -> Option<f64> {
        let v = match self {
            Self::Bool(_) => return None,
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
            Self::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        v.is_finite().then_some(v)
    }

    /// Interpret as a flag value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(0) => Some(false),
            Self::Int(1) => Some(true),
            Self::Int(_) | Self::Float(_) => None,
            Self::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
        }
    }

    /// Text form, as a choice label or time string
    pub fn as_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(s) => s.trim().to_string(),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// An inclusive numeric range with a step, bounds as written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub start: Scalar,
    pub end: Scalar,
    pub increment: Scalar,
}

impl NumericRange {
    pub fn new(start: f64, end: f64, increment: f64) -> Self {
        Self {
            start: Scalar::Float(start),
            end: Scalar::Float(end),
            increment: Scalar::Float(increment),
        }
    }

    /// (start, end, increment), if all three parse as numbers
    pub fn bounds(&self) -> Option<(f64, f64, f64)> {
        Some((self.start.as_f64()?, self.end.as_f64()?, self.increment.as_f64()?))
    }
}

/// A closed interval of values to drop from generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub from: Scalar,
    pub to: Scalar,
}

impl Exclusion {
    pub fn new(from: f64, to: f64) -> Self {
        Self {
            from: Scalar::Float(from),
            to: Scalar::Float(to),
        }
    }

    pub fn bounds(&self) -> Option<(f64, f64)> {
        Some((self.from.as_f64()?, self.to.as_f64()?))
    }

    /// False when either bound is unparsable
    pub fn contains(&self, v: f64) -> bool {
        self.bounds().is_some_and(|(from, to)| v >= from && v <= to)
    }
}

/// One sweepable input
///
/// Only the fields relevant to `kind` and `mode` are read; the rest are
/// ignored. Missing or unparsable fields make the parameter produce no
/// values rather than failing the recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,

    pub kind: ParamKind,

    #[serde(default)]
    pub mode: GenerationMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Scalar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Scalar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub increment: Option<Scalar>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<NumericRange>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Scalar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<Scalar>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<Exclusion>,

    /// Candidates for choice and flag parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Scalar>,

    // Time-range candidates, "HHMM" text with minute increments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_from: Option<Scalar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_to: Option<Scalar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_increment: Option<Scalar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_from: Option<Scalar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_to: Option<Scalar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_increment: Option<Scalar>,
}

impl ParameterSpec {
    /// Create a spec with no generation fields set
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            mode: GenerationMode::default(),
            start: None,
            end: None,
            increment: None,
            clusters: Vec::new(),
            values: Vec::new(),
            constant: None,
            exclusions: Vec::new(),
            choices: Vec::new(),
            start_from: None,
            start_to: None,
            start_increment: None,
            end_from: None,
            end_to: None,
            end_increment: None,
        }
    }

    pub fn range(mut self, start: f64, end: f64, increment: f64) -> Self {
        self.mode = GenerationMode::Range;
        self.start = Some(Scalar::Float(start));
        self.end = Some(Scalar::Float(end));
        self.increment = Some(Scalar::Float(increment));
        self
    }

    pub fn clusters(mut self, clusters: Vec<NumericRange>) -> Self {
        self.mode = GenerationMode::Clusters;
        self.clusters = clusters;
        self
    }

    pub fn list<S: Into<Scalar>>(mut self, values: impl IntoIterator<Item = S>) -> Self {
        self.mode = GenerationMode::List;
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn locked(mut self, constant: impl Into<Scalar>) -> Self {
        self.mode = GenerationMode::Locked;
        self.constant = Some(constant.into());
        self
    }

    pub fn choices<S: Into<Scalar>>(mut self, choices: impl IntoIterator<Item = S>) -> Self {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude(mut self, from: f64, to: f64) -> Self {
        self.exclusions.push(Exclusion::new(from, to));
        self
    }

    pub fn start_times(mut self, from: &str, to: &str, increment: u32) -> Self {
        self.mode = GenerationMode::Cartesian;
        self.start_from = Some(from.into());
        self.start_to = Some(to.into());
        self.start_increment = Some(Scalar::Int(i64::from(increment)));
        self
    }

    pub fn end_times(mut self, from: &str, to: &str, increment: u32) -> Self {
        self.mode = GenerationMode::Cartesian;
        self.end_from = Some(from.into());
        self.end_to = Some(to.into());
        self.end_increment = Some(Scalar::Int(i64::from(increment)));
        self
    }

    /// The configured single range, if all three bounds are present
    pub fn single_range(&self) -> Option<NumericRange> {
        Some(NumericRange {
            start: self.start.clone()?,
            end: self.end.clone()?,
            increment: self.increment.clone()?,
        })
    }
}

/// Ordered parameter list plus resumption metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRecipe {
    #[serde(default)]
    pub name: String,

    pub parameters: Vec<ParameterSpec>,

    /// First index to process (checkpoint)
    #[serde(default)]
    pub start_index: u64,

    /// Correlation token of an interrupted run being resumed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    /// Target runs in its expensive processing mode
    #[serde(default)]
    pub deep_mode: bool,
}

impl SweepRecipe {
    pub fn new(name: impl Into<String>, parameters: Vec<ParameterSpec>) -> Self {
        Self {
            name: name.into(),
            parameters,
            start_index: 0,
            run_id: None,
            deep_mode: false,
        }
    }

    /// Continue an earlier run at the given index
    pub fn resume_at(mut self, start_index: u64, run_id: impl Into<String>) -> Self {
        self.start_index = start_index;
        self.run_id = Some(run_id.into());
        self
    }

    /// Load a recipe from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SweepError> {
        let path = path.as_ref();
        debug!(?path, "SweepRecipe::load: called");

        let content = fs::read_to_string(path).map_err(|e| SweepError::Recipe {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let recipe: Self = serde_yaml::from_str(&content).map_err(|e| SweepError::Recipe {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        info!(
            name = %recipe.name,
            parameters = recipe.parameters.len(),
            start_index = recipe.start_index,
            "Loaded recipe from {}",
            path.display()
        );
        Ok(recipe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_scalar_parsing() {
        assert_eq!(Scalar::Text(" 2.5 ".to_string()).as_f64(), Some(2.5));
        assert_eq!(Scalar::Text("abc".to_string()).as_f64(), None);
        assert_eq!(Scalar::Text("NaN".to_string()).as_f64(), None);
        assert_eq!(Scalar::Bool(true).as_f64(), None);
        assert_eq!(Scalar::Int(1).as_bool(), Some(true));
        assert_eq!(Scalar::Text("Off".to_string()).as_bool(), Some(false));
        assert_eq!(Scalar::Text("maybe".to_string()).as_bool(), None);
    }

    #[test]
    fn test_deserialize_recipe() {
        let yaml = r#"
name: ma-cross
deep_mode: true
parameters:
  - name: fast
    kind: integer
    start: 5
    end: 20
    increment: 5
    exclusions:
      - { from: 10, to: 10 }
  - name: slow
    kind: float
    mode: clusters
    clusters:
      - { start: 0.5, end: 1.0, increment: 0.25 }
  - name: source
    kind: choice
    choices: [close, hl2]
  - name: trail
    kind: flag
    mode: locked
    constant: true
  - name: session
    kind: time_range
    mode: cartesian
    start_from: "0900"
    start_to: "1000"
    start_increment: 30
    end_from: "1500"
    end_to: "1600"
    end_increment: 60
  - name: stops
    kind: integer
    mode: list
    values: [1, "2", x, 3.0]
"#;

        let recipe: SweepRecipe = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(recipe.name, "ma-cross");
        assert!(recipe.deep_mode);
        assert_eq!(recipe.start_index, 0);
        assert!(recipe.run_id.is_none());
        assert_eq!(recipe.parameters.len(), 6);

        let fast = &recipe.parameters[0];
        assert_eq!(fast.mode, GenerationMode::Range);
        assert_eq!(fast.single_range().unwrap().bounds(), Some((5.0, 20.0, 5.0)));
        assert!(fast.exclusions[0].contains(10.0));

        assert_eq!(recipe.parameters[1].clusters.len(), 1);
        assert_eq!(recipe.parameters[3].constant, Some(Scalar::Bool(true)));
        assert_eq!(recipe.parameters[4].start_from, Some(Scalar::Text("0900".to_string())));
        assert_eq!(recipe.parameters[5].values.len(), 4);
    }

    #[test]
    fn test_unparsable_values_still_load() {
        let yaml = r#"
name: partly-broken
parameters:
  - name: good
    kind: integer
    start: 1
    end: 3
    increment: 1
  - name: bad
    kind: integer
    start: abc
    end: 10
    increment: 1
    exclusions:
      - { from: low, to: 2 }
  - name: session
    kind: time_range
    mode: cartesian
    start_from: "0900"
    start_to: "1000"
    start_increment: half-hour
"#;

        let recipe: SweepRecipe = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(recipe.parameters.len(), 3);
        let bad = &recipe.parameters[1];
        assert_eq!(bad.start, Some(Scalar::Text("abc".to_string())));
        assert!(bad.single_range().unwrap().bounds().is_none());
        assert!(bad.exclusions[0].bounds().is_none());
        assert!(!bad.exclusions[0].contains(1.0));
        assert_eq!(
            recipe.parameters[2].start_increment,
            Some(Scalar::Text("half-hour".to_string()))
        );
    }

    #[test]
    fn test_load_missing_file() {
        let temp = tempdir().unwrap();
        let err = SweepRecipe::load(temp.path().join("nope.yml")).unwrap_err();
        assert!(matches!(err, SweepError::Recipe { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("recipe.yml");
        let recipe = SweepRecipe::new("demo", vec![ParameterSpec::new("a", ParamKind::Integer).range(1.0, 3.0, 1.0)])
            .resume_at(7, "run-1");
        fs::write(&path, serde_yaml::to_string(&recipe).unwrap()).unwrap();

        let loaded = SweepRecipe::load(&path).unwrap();
        assert_eq!(loaded, recipe);
    }
}
