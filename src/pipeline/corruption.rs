use super::PipelineError;
use crate::config::CorruptionConfig;
use crate::data::load_corruption_table;
use crate::descriptive::{
    FrequencyRow, GroupSummary, Summary, describe, describe_by_group, frequency_table,
    group_median,
};
use crate::encoding::{OrdinalEncoding, indicator_encode, ordinal_encode};
use crate::ols::{DesignMatrix, OlsFit, fit_ols};
use crate::plot::{corruption_figure, write_figure_html};
use crate::spline::{InterpolatingSpline, SplineGrid};
use crate::table::WorkingTable;
use ndarray::Array1;
use serde::Serialize;
use std::path::Path;

pub const FITTED_COLUMN: &str = "fitted";

pub fn ordinal_column_name(region_column: &str) -> String {
    format!("{region_column}_code")
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegionMedian {
    pub code: f64,
    pub region: String,
    pub median_fitted: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct CorruptionReport {
    pub n_obs: usize,
    pub index_summary: Summary,
    pub by_region: Vec<GroupSummary>,
    pub frequencies: Vec<FrequencyRow>,
    pub ordinal: OrdinalEncoding,
    pub ordinal_fit: OlsFit,
    pub reference: String,
    pub indicator_names: Vec<String>,
    pub omitted_regions: Vec<String>,
    pub indicator_fit: OlsFit,
    pub alpha: f64,
    /// Regions whose effect differs from the reference at level `alpha`.
    pub significant_regions: Vec<String>,
    pub medians: Vec<RegionMedian>,
    pub spline: InterpolatingSpline,
    pub spline_grid: SplineGrid,
    /// Final table: input columns plus the ordinal code, the indicators and
    /// the fitted values of the indicator model.
    #[serde(skip)]
    pub table: WorkingTable,
}

impl CorruptionReport {
    /// Indicator model explains strictly more variance than the ordinal one.
    pub fn indicator_model_preferred(&self) -> bool {
        self.indicator_fit.r_squared > self.ordinal_fit.r_squared
    }
}

pub fn run_corruption(
    table: &WorkingTable,
    config: &CorruptionConfig,
) -> Result<CorruptionReport, PipelineError> {
    config.validate()?;
    let cols = &config.columns;
    let regions = table.categorical(&cols.region)?.to_vec();
    let index = table.numeric(&cols.index)?.to_owned();

    let index_summary = describe(index.view())?;
    let by_region = describe_by_group(&regions, index.view())?;
    let frequencies = frequency_table(&regions);

    // Ordinal baseline: cpi ~ region_code.
    let ordinal = ordinal_encode(&regions, config.ordinal_order.as_deref())?;
    let code_column = ordinal_column_name(&cols.region);
    let table = table.with_numeric_column(&code_column, ordinal.codes.clone())?;
    let ordinal_design = DesignMatrix::from_table(&table, &[code_column.as_str()])?;
    let ordinal_fit = fit_ols(&ordinal_design, index.view(), &config.ols)?;
    log::info!(
        "[Corruption] ordinal model: R2={:.4}, slope={:.4}",
        ordinal_fit.r_squared,
        ordinal_fit.coefficient(&code_column).unwrap_or(f64::NAN)
    );

    // Indicator model: cpi ~ region_A + region_B + ...
    let indicators = indicator_encode(
        &regions,
        &config.regions,
        config.reference.as_deref(),
        &cols.region,
    )?;
    indicators.check_reserved(&code_column)?;
    indicators.check_reserved(FITTED_COLUMN)?;
    let table = indicators.columns.iter().try_fold(table, |t, c| {
        t.with_numeric_column(&c.name, c.values.clone())
    })?;
    let indicator_names = indicators.names();
    let predictors: Vec<&str> = indicator_names.iter().map(String::as_str).collect();
    let indicator_design = DesignMatrix::from_table(&table, &predictors)?;
    let indicator_fit = fit_ols(&indicator_design, index.view(), &config.ols)?;
    log::info!(
        "[Corruption] indicator model (reference '{}'): R2={:.4}",
        indicators.reference,
        indicator_fit.r_squared
    );

    let significant_regions: Vec<String> = indicators
        .columns
        .iter()
        .filter(|c| {
            indicator_fit
                .p_value(&c.name)
                .is_some_and(|p| p < config.alpha)
        })
        .map(|c| c.category.clone())
        .collect();
    log::info!(
        "[Corruption] regions differing from '{}' at alpha={}: {:?}",
        indicators.reference,
        config.alpha,
        significant_regions
    );

    let table = table.with_numeric_column(FITTED_COLUMN, indicator_fit.fitted.clone())?;

    // Post-fit smoother over the per-region median fitted values.
    let medians = group_median(ordinal.codes.view(), indicator_fit.fitted.view())?
        .into_iter()
        .map(|(code, median_fitted)| RegionMedian {
            code,
            region: ordinal
                .category_of(code as usize)
                .unwrap_or_default()
                .to_string(),
            median_fitted,
        })
        .collect::<Vec<_>>();
    let xs: Array1<f64> = medians.iter().map(|m| m.code).collect();
    let ys: Array1<f64> = medians.iter().map(|m| m.median_fitted).collect();
    let spline = InterpolatingSpline::fit(xs.view(), ys.view(), config.spline_degree)?;
    let spline_grid = spline.evaluate_grid(config.spline_step)?;

    if indicator_fit.r_squared > ordinal_fit.r_squared {
        log::info!(
            "[Corruption] indicator encoding explains more variance ({:.4} > {:.4})",
            indicator_fit.r_squared,
            ordinal_fit.r_squared
        );
    } else {
        log::warn!(
            "[Corruption] indicator encoding did not improve R2 ({:.4} <= {:.4})",
            indicator_fit.r_squared,
            ordinal_fit.r_squared
        );
    }

    Ok(CorruptionReport {
        n_obs: table.n_rows(),
        index_summary,
        by_region,
        frequencies,
        ordinal,
        ordinal_fit,
        reference: indicators.reference,
        indicator_names,
        omitted_regions: indicators.omitted,
        indicator_fit,
        alpha: config.alpha,
        significant_regions,
        medians,
        spline_grid,
        table,
        spline,
    })
}

/// Loads `csv`, runs the analysis and writes the HTML figure to
/// `config.html_out`.
pub fn run_corruption_file(
    csv: &Path,
    config: &CorruptionConfig,
) -> Result<CorruptionReport, PipelineError> {
    config.validate()?;
    let table = load_corruption_table(csv, &config.columns, &config.regions)?;
    let report = run_corruption(&table, config)?;
    let figure = corruption_figure(&report, &config.columns)?;
    write_figure_html(&figure, &config.html_out)?;
    log::info!("[Corruption] figure written to {}", config.html_out.display());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{corruption_table, read_csv};
    use approx::assert_abs_diff_eq;

    const CSV: &str = "pais,cpi,regiao
A1,4.0,America_do_sul
A2,3.0,America_do_sul
B1,2.0,Asia
B2,2.5,Asia
B3,1.5,Asia
C1,8.0,EUA_e_Canada
C2,7.6,EUA_e_Canada
D1,6.0,Europa
D2,7.0,Europa
E1,9.0,Oceania
E2,8.8,Oceania
";

    fn table() -> WorkingTable {
        let raw = read_csv(CSV.as_bytes()).expect("csv parses");
        corruption_table(&raw, &Default::default(), &[]).expect("table builds")
    }

    #[test]
    fn stages_add_columns_without_touching_input() {
        let input = table();
        let report = run_corruption(&input, &CorruptionConfig::default()).expect("runs");
        assert!(!input.has_column(FITTED_COLUMN));
        assert!(report.table.has_column(FITTED_COLUMN));
        assert!(report.table.has_column("regiao_code"));
        assert!(report.table.has_column("regiao_Oceania"));
        assert_eq!(report.reference, "America_do_sul");
        assert_eq!(report.indicator_names.len(), 4);
    }

    #[test]
    fn fitted_values_are_region_means_and_medians_feed_the_spline() {
        let report = run_corruption(&table(), &CorruptionConfig::default()).expect("runs");
        assert!(report.indicator_model_preferred());
        let asia = report
            .medians
            .iter()
            .find(|m| m.region == "Asia")
            .expect("Asia present");
        assert_abs_diff_eq!(asia.median_fitted, 2.0, epsilon = 1e-9);
        assert_eq!(asia.code, 2.0);
        for m in &report.medians {
            assert_abs_diff_eq!(report.spline.evaluate(m.code), m.median_fitted, epsilon = 1e-8);
        }
        assert_abs_diff_eq!(report.spline_grid.x[0], 1.0);
    }

    #[test]
    fn region_named_like_a_derived_column_is_an_encoding_error() {
        let raw = read_csv(
            "pais,cpi,regiao\na,1.0,Asia\nb,2.0,code\nc,5.0,Europa\nd,6.0,Oceania\n".as_bytes(),
        )
        .expect("csv parses");
        let t = corruption_table(&raw, &Default::default(), &[]).expect("table builds");
        let config = CorruptionConfig {
            regions: Vec::new(),
            ..CorruptionConfig::default()
        };
        let err = run_corruption(&t, &config).expect_err("must fail");
        assert!(matches!(
            err,
            PipelineError::Encoding(crate::encoding::EncodingError::ReservedColumn { ref category, .. })
                if category == "code"
        ));
    }

    #[test]
    fn two_regions_cannot_support_a_quadratic_spline() {
        let raw = read_csv("pais,cpi,regiao\na,1.0,X\nb,2.0,X\nc,5.0,Y\nd,6.0,Y\n".as_bytes())
            .expect("csv parses");
        let t = corruption_table(&raw, &Default::default(), &[]).expect("table builds");
        let config = CorruptionConfig {
            regions: Vec::new(),
            ..CorruptionConfig::default()
        };
        let err = run_corruption(&t, &config).expect_err("must fail");
        assert!(matches!(
            err,
            PipelineError::Spline(crate::spline::SplineError::InsufficientData { .. })
        ));
    }
}
