use crate::normality::NormalityMethod;
use crate::ols::OlsOptions;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub fn default_alpha() -> f64 {
    0.05
}

pub fn default_spline_degree() -> usize {
    2
}

pub fn default_spline_step() -> f64 {
    0.1
}

/// The five regions of the perception-index survey.
pub fn default_regions() -> Vec<String> {
    ["America_do_sul", "Asia", "EUA_e_Canada", "Europa", "Oceania"]
        .iter()
        .map(|r| r.to_string())
        .collect()
}

pub fn default_preview_rows() -> usize {
    5
}

pub fn default_corruption_html() -> PathBuf {
    PathBuf::from("EXEMPLO3.html")
}

pub fn default_predict_at_weeks() -> f64 {
    52.0
}

pub fn default_lambda_bounds() -> (f64, f64) {
    (-10.0, 10.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorruptionColumns {
    pub country: String,
    pub region: String,
    pub index: String,
}

impl Default for CorruptionColumns {
    fn default() -> Self {
        Self {
            country: "pais".to_string(),
            region: "regiao".to_string(),
            index: "cpi".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthColumns {
    pub age: String,
    pub length: String,
}

impl Default for GrowthColumns {
    fn default() -> Self {
        Self {
            age: "idade".to_string(),
            length: "comprimento".to_string(),
        }
    }
}

/// Settings for the region/perception-index study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorruptionConfig {
    #[serde(default)]
    pub columns: CorruptionColumns,
    /// Admissible region labels. An explicit empty list accepts whatever
    /// labels the data contains.
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,
    /// Explicit ordinal code order; `None` uses sorted label order.
    #[serde(default)]
    pub ordinal_order: Option<Vec<String>>,
    /// Reference region of the indicator encoding; `None` uses the first sorted label.
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_spline_degree")]
    pub spline_degree: usize,
    #[serde(default = "default_spline_step")]
    pub spline_step: f64,
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
    #[serde(default = "default_corruption_html")]
    pub html_out: PathBuf,
    #[serde(default)]
    pub ols: OlsOptions,
}

impl Default for CorruptionConfig {
    fn default() -> Self {
        Self {
            columns: CorruptionColumns::default(),
            regions: default_regions(),
            ordinal_order: None,
            reference: None,
            alpha: default_alpha(),
            spline_degree: default_spline_degree(),
            spline_step: default_spline_step(),
            preview_rows: default_preview_rows(),
            html_out: default_corruption_html(),
            ols: OlsOptions::default(),
        }
    }
}

impl CorruptionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_alpha(self.alpha)?;
        if self.spline_degree == 0 {
            return Err(ConfigError::Invalid(
                "spline degree must be at least 1".to_string(),
            ));
        }
        if !(self.spline_step.is_finite() && self.spline_step > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "spline step must be positive, got {}",
                self.spline_step
            )));
        }
        self.ols.validate()
    }
}

/// Settings for the age/length growth study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthConfig {
    #[serde(default)]
    pub columns: GrowthColumns,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub normality_method: NormalityMethod,
    #[serde(default = "default_predict_at_weeks")]
    pub predict_at_weeks: f64,
    #[serde(default = "default_lambda_bounds")]
    pub lambda_bounds: (f64, f64),
    #[serde(default)]
    pub html_out: Option<PathBuf>,
    #[serde(default)]
    pub ols: OlsOptions,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            columns: GrowthColumns::default(),
            alpha: default_alpha(),
            normality_method: NormalityMethod::default(),
            predict_at_weeks: default_predict_at_weeks(),
            lambda_bounds: default_lambda_bounds(),
            html_out: None,
            ols: OlsOptions::default(),
        }
    }
}

impl GrowthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_alpha(self.alpha)?;
        if !(self.predict_at_weeks.is_finite() && self.predict_at_weeks >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "prediction age must be a non-negative number of weeks, got {}",
                self.predict_at_weeks
            )));
        }
        let (lo, hi) = self.lambda_bounds;
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(ConfigError::Invalid(format!(
                "lambda bounds must satisfy lo < hi, got ({lo}, {hi})"
            )));
        }
        self.ols.validate()
    }
}

fn validate_alpha(alpha: f64) -> Result<(), ConfigError> {
    if alpha > 0.0 && alpha < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "significance level must be in (0,1), got {alpha}"
        )))
    }
}

pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let payload = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&payload).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}
