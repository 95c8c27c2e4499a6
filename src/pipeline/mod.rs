//! End-to-end analyses. Each stage consumes the previous `WorkingTable` and
//! returns a new one together with the quantities it derived.

pub mod corruption;
pub mod growth;

use crate::boxcox::BoxCoxError;
use crate::config::ConfigError;
use crate::data::DataError;
use crate::descriptive::DescriptiveError;
use crate::encoding::EncodingError;
use crate::normality::NormalityError;
use crate::ols::OlsError;
use crate::report::ReportError;
use crate::spline::SplineError;
use crate::table::TableError;
use thiserror::Error;

pub use corruption::{CorruptionReport, RegionMedian, run_corruption, run_corruption_file};
pub use growth::{GrowthPrediction, GrowthReport, run_growth, run_growth_file};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Descriptive(#[from] DescriptiveError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Ols(#[from] OlsError),
    #[error(transparent)]
    Normality(#[from] NormalityError),
    #[error(transparent)]
    BoxCox(#[from] BoxCoxError),
    #[error(transparent)]
    Spline(#[from] SplineError),
    #[error(transparent)]
    Report(#[from] ReportError),
}
