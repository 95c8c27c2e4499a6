#![deny(dead_code)]
#![deny(unused_imports)]

pub mod boxcox;
pub mod config;
pub mod data;
pub mod descriptive;
pub mod encoding;
pub mod linalg;
pub mod normality;
pub mod ols;
pub mod pipeline;
pub mod plot;
pub mod probability;
pub mod report;
pub mod spline;
pub mod table;

pub use boxcox::{BoxCoxError, BoxCoxFit, boxcox, boxcox_transform, fit_lambda, inverse_boxcox};
pub use config::{ConfigError, CorruptionConfig, GrowthConfig, load_config};
pub use data::{DataError, load_corruption_table, load_growth_table};
pub use encoding::{
    EncodingError, IndicatorEncoding, OrdinalEncoding, indicator_encode, ordinal_encode,
};
pub use normality::{NormalityMethod, NormalityTest, shapiro_francia, shapiro_wilk};
pub use ols::{DesignMatrix, NumericalWarning, OlsError, OlsFit, OlsOptions, fit_ols};
pub use pipeline::{
    CorruptionReport, GrowthReport, PipelineError, run_corruption, run_corruption_file,
    run_growth, run_growth_file,
};
pub use spline::{InterpolatingSpline, SplineError, SplineGrid};
pub use table::{Column, WorkingTable};
