use super::PipelineError;
use crate::boxcox::{BoxCoxFit, boxcox, inverse_boxcox};
use crate::config::GrowthConfig;
use crate::data::load_growth_table;
use crate::descriptive::{Summary, describe};
use crate::normality::{NormalityMethod, NormalityTest, normality_test};
use crate::ols::{DesignMatrix, OlsFit, fit_ols};
use crate::plot::{growth_figure, write_figure_html};
use crate::table::WorkingTable;
use ndarray::Array1;
use serde::Serialize;
use std::path::Path;

pub fn transformed_column_name(length_column: &str) -> String {
    format!("{length_column}_boxcox")
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GrowthPrediction {
    pub age_weeks: f64,
    pub linear_cm: f64,
    /// Box-Cox model prediction on the transformed scale.
    pub boxcox_transformed: f64,
    /// `None` when the transformed prediction lies outside the range of the
    /// transform (`λ v + 1 <= 0`).
    pub boxcox_cm: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct GrowthReport {
    pub n_obs: usize,
    pub age_summary: Summary,
    pub length_summary: Summary,
    pub linear_fit: OlsFit,
    pub alpha: f64,
    /// Residual normality of the linear model, with the configured method.
    pub normality: NormalityTest,
    /// The other method, when it applies to this sample size.
    pub normality_secondary: Option<NormalityTest>,
    pub boxcox: BoxCoxFit,
    pub boxcox_fit: OlsFit,
    pub boxcox_normality: Option<NormalityTest>,
    pub prediction: GrowthPrediction,
    /// Box-Cox fitted values mapped back to centimetres; NaN where the
    /// fitted value has no preimage.
    pub boxcox_fitted_cm: Array1<f64>,
    #[serde(skip)]
    pub table: WorkingTable,
}

impl GrowthReport {
    pub fn r_squared_gain(&self) -> f64 {
        self.boxcox_fit.r_squared - self.linear_fit.r_squared
    }
}

fn other_method(method: NormalityMethod) -> NormalityMethod {
    match method {
        NormalityMethod::ShapiroWilk => NormalityMethod::ShapiroFrancia,
        NormalityMethod::ShapiroFrancia => NormalityMethod::ShapiroWilk,
    }
}

fn optional_normality(residuals: &Array1<f64>, method: NormalityMethod) -> Option<NormalityTest> {
    match normality_test(residuals.view(), method) {
        Ok(test) => Some(test),
        Err(e) => {
            log::warn!("[Growth] {} skipped: {e}", method.label());
            None
        }
    }
}

pub fn run_growth(
    table: &WorkingTable,
    config: &GrowthConfig,
) -> Result<GrowthReport, PipelineError> {
    config.validate()?;
    let cols = &config.columns;
    let age = table.numeric(&cols.age)?;
    let length = table.numeric(&cols.length)?.to_owned();

    let age_summary = describe(age)?;
    let length_summary = describe(length.view())?;

    // length ~ age
    let design = DesignMatrix::from_table(table, &[cols.age.as_str()])?;
    let linear_fit = fit_ols(&design, length.view(), &config.ols)?;
    log::info!(
        "[Growth] linear model: R2={:.4}, slope={:.4} cm/week",
        linear_fit.r_squared,
        linear_fit.coefficient(&cols.age).unwrap_or(f64::NAN)
    );

    let normality = normality_test(linear_fit.residuals.view(), config.normality_method)?;
    log::info!("[Growth] {}", normality.describe(config.alpha));
    let normality_secondary =
        optional_normality(&linear_fit.residuals, other_method(config.normality_method));

    // boxcox(length) ~ age
    let (transformed, boxcox_params) = boxcox(length.view(), config.lambda_bounds)?;
    let transformed_column = transformed_column_name(&cols.length);
    let table = table.with_numeric_column(&transformed_column, transformed.clone())?;
    let boxcox_fit = fit_ols(&design, transformed.view(), &config.ols)?;
    log::info!(
        "[Growth] Box-Cox model: lambda={:.4}, R2={:.4}",
        boxcox_params.lambda,
        boxcox_fit.r_squared
    );
    let boxcox_normality = optional_normality(&boxcox_fit.residuals, config.normality_method);

    if boxcox_fit.r_squared < linear_fit.r_squared {
        log::warn!(
            "[Growth] transformed model fits worse ({:.4} < {:.4})",
            boxcox_fit.r_squared,
            linear_fit.r_squared
        );
    }

    let at = config.predict_at_weeks;
    let boxcox_transformed = boxcox_fit.predict_named(&[(cols.age.as_str(), at)])?;
    let prediction = GrowthPrediction {
        age_weeks: at,
        linear_cm: linear_fit.predict_named(&[(cols.age.as_str(), at)])?,
        boxcox_transformed,
        boxcox_cm: inverse_boxcox(boxcox_transformed, boxcox_params.lambda).ok(),
    };
    match prediction.boxcox_cm {
        Some(cm) => log::info!(
            "[Growth] predicted length at {} weeks: linear {:.2} cm, Box-Cox {:.2} cm",
            at,
            prediction.linear_cm,
            cm
        ),
        None => log::warn!(
            "[Growth] Box-Cox prediction {:.4} at {} weeks is beyond the transform range for lambda {:.4}; no length in cm",
            boxcox_transformed,
            at,
            boxcox_params.lambda
        ),
    }

    let boxcox_fitted_cm = boxcox_fit
        .fitted
        .mapv(|v| inverse_boxcox(v, boxcox_params.lambda).unwrap_or(f64::NAN));
    let undefined = boxcox_fitted_cm.iter().filter(|v| v.is_nan()).count();
    if undefined > 0 {
        log::warn!(
            "[Growth] {undefined} Box-Cox fitted values have no preimage in cm and are left undefined"
        );
    }

    Ok(GrowthReport {
        n_obs: table.n_rows(),
        age_summary,
        length_summary,
        linear_fit,
        alpha: config.alpha,
        normality,
        normality_secondary,
        boxcox: boxcox_params,
        boxcox_fit,
        boxcox_normality,
        prediction,
        boxcox_fitted_cm,
        table,
    })
}

/// Loads `csv`, runs the analysis and, when configured, writes the HTML
/// figure.
pub fn run_growth_file(csv: &Path, config: &GrowthConfig) -> Result<GrowthReport, PipelineError> {
    config.validate()?;
    let table = load_growth_table(csv, &config.columns)?;
    let report = run_growth(&table, config)?;
    if let Some(path) = &config.html_out {
        let figure = growth_figure(&report, &config.columns)?;
        write_figure_html(&figure, path)?;
        log::info!("[Growth] figure written to {}", path.display());
    }
    Ok(report)
}
