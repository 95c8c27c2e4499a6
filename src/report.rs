//! Console tables and machine-readable summaries.

use crate::descriptive::{FrequencyRow, GroupSummary, Summary};
use crate::normality::{NormalityDecision, NormalityTest};
use crate::ols::OlsFit;
use crate::pipeline::corruption::{CorruptionReport, FITTED_COLUMN, ordinal_column_name};
use crate::pipeline::growth::GrowthReport;
use crate::table::TableError;
use comfy_table::{Cell, ContentArrangement, Row, Table, presets::UTF8_FULL};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to write '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Table(#[from] TableError),
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn fmt_stat(v: f64) -> String {
    if v.is_nan() {
        "-".to_string()
    } else if v != 0.0 && (v.abs() < 1e-4 || v.abs() >= 1e6) {
        format!("{v:.3e}")
    } else {
        format!("{v:.4}")
    }
}

fn fmt_p(p: f64) -> String {
    if p.is_nan() {
        "-".to_string()
    } else if p < 1e-4 {
        "<0.0001".to_string()
    } else {
        format!("{p:.4}")
    }
}

/// Fit statistics of a regression, one per row.
pub fn fit_statistics_table(title: &str, fit: &OlsFit) -> Table {
    let mut table = new_table(vec![title, "Value"]);
    let rows: [(&str, String); 12] = [
        ("No. observations", fit.n_obs.to_string()),
        ("Df model / resid", format!("{} / {}", fit.df_model, fit.df_resid)),
        ("R-squared", format!("{:.4}", fit.r_squared)),
        ("Adj. R-squared", format!("{:.4}", fit.adj_r_squared)),
        ("F-statistic", fmt_stat(fit.f_statistic)),
        ("Prob (F-statistic)", fmt_p(fit.f_p_value)),
        ("Residual std. error", fmt_stat(fit.sigma)),
        ("Log-likelihood", fmt_stat(fit.log_likelihood)),
        ("AIC", fmt_stat(fit.aic)),
        ("BIC", fmt_stat(fit.bic)),
        ("Durbin-Watson", format!("{:.3}", fit.durbin_watson)),
        ("Cond. No.", fmt_stat(fit.condition_number)),
    ];
    for (label, value) in rows {
        table.add_row(Row::from(vec![Cell::new(label), Cell::new(value)]));
    }
    table
}

/// Coefficient rows; terms with `p < alpha` are starred.
pub fn coefficient_table(fit: &OlsFit, alpha: f64) -> Table {
    let ci_open = format!("[{:.0}%", fit.confidence_level * 100.0);
    let sig = format!("p<{alpha}");
    let mut table = new_table(vec![
        "Term",
        "coef",
        "std err",
        "t",
        "P>|t|",
        ci_open.as_str(),
        "]",
        sig.as_str(),
    ]);
    for row in fit.coefficient_rows() {
        table.add_row(Row::from(vec![
            Cell::new(row.name),
            Cell::new(fmt_stat(row.estimate)),
            Cell::new(fmt_stat(row.std_error)),
            Cell::new(fmt_stat(row.t_value)),
            Cell::new(fmt_p(row.p_value)),
            Cell::new(fmt_stat(row.ci_lower)),
            Cell::new(fmt_stat(row.ci_upper)),
            Cell::new(if row.p_value < alpha { "*" } else { "" }),
        ]));
    }
    table
}

pub fn frequency_table_view(rows: &[FrequencyRow]) -> Table {
    let mut table = new_table(vec!["Category", "Count", "%"]);
    for row in rows {
        table.add_row(Row::from(vec![
            Cell::new(&row.category),
            Cell::new(row.count),
            Cell::new(format!("{:.4}", row.proportion)),
        ]));
    }
    table
}

fn summary_cells(s: &Summary) -> Vec<Cell> {
    vec![
        Cell::new(s.count),
        Cell::new(fmt_stat(s.mean)),
        Cell::new(fmt_stat(s.std)),
        Cell::new(fmt_stat(s.min)),
        Cell::new(fmt_stat(s.q25)),
        Cell::new(fmt_stat(s.median)),
        Cell::new(fmt_stat(s.q75)),
        Cell::new(fmt_stat(s.max)),
    ]
}

const SUMMARY_HEADER: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

/// `describe()` layout: one row per variable.
pub fn describe_table(rows: &[(&str, &Summary)]) -> Table {
    let mut header = vec![""];
    header.extend(SUMMARY_HEADER);
    let mut table = new_table(header);
    for (name, summary) in rows {
        let mut cells = vec![Cell::new(name)];
        cells.extend(summary_cells(summary));
        table.add_row(Row::from(cells));
    }
    table
}

pub fn grouped_describe_table(group_label: &str, groups: &[GroupSummary]) -> Table {
    let mut header = vec![group_label];
    header.extend(SUMMARY_HEADER);
    let mut table = new_table(header);
    for g in groups {
        let mut cells = vec![Cell::new(&g.group)];
        cells.extend(summary_cells(&g.summary));
        table.add_row(Row::from(cells));
    }
    table
}

pub fn normality_table(tests: &[&NormalityTest], alpha: f64) -> Table {
    let mut table = new_table(vec!["Test", "n", "Statistic", "p-value", "Decision"]);
    for t in tests {
        let decision = match t.decision(alpha) {
            NormalityDecision::RejectNormality => "reject normality",
            NormalityDecision::FailToReject => "fail to reject",
        };
        table.add_row(Row::from(vec![
            Cell::new(t.method.label()),
            Cell::new(t.n),
            Cell::new(format!("{:.4}", t.statistic)),
            Cell::new(fmt_p(t.p_value)),
            Cell::new(decision),
        ]));
    }
    table
}

/// Leading rows of the region code, the index and the fitted values.
pub fn fitted_preview_table(
    report: &CorruptionReport,
    region_column: &str,
    index_column: &str,
    n: usize,
) -> Result<Table, ReportError> {
    let code = ordinal_column_name(region_column);
    let names = [code.as_str(), index_column, FITTED_COLUMN];
    let mut table = new_table(names.to_vec());
    for row in report.table.head_rows(&names, n)? {
        table.add_row(Row::from(row));
    }
    Ok(table)
}

pub fn corruption_comparison_table(report: &CorruptionReport) -> Table {
    let mut table = new_table(vec!["Model", "Predictors", "R-squared", "Adj. R-squared", "AIC"]);
    for (label, fit) in [
        ("Ordinal code", &report.ordinal_fit),
        ("Indicators", &report.indicator_fit),
    ] {
        table.add_row(Row::from(vec![
            Cell::new(label),
            Cell::new(fit.names.len() - 1),
            Cell::new(format!("{:.4}", fit.r_squared)),
            Cell::new(format!("{:.4}", fit.adj_r_squared)),
            Cell::new(fmt_stat(fit.aic)),
        ]));
    }
    table
}

pub fn growth_comparison_table(report: &GrowthReport) -> Table {
    let mut table = new_table(vec!["Model", "R-squared", "Durbin-Watson", "Prediction (cm)"]);
    let p = &report.prediction;
    table.add_row(Row::from(vec![
        Cell::new("Linear"),
        Cell::new(format!("{:.4}", report.linear_fit.r_squared)),
        Cell::new(format!("{:.3}", report.linear_fit.durbin_watson)),
        Cell::new(format!("{:.2}", p.linear_cm)),
    ]));
    table.add_row(Row::from(vec![
        Cell::new(format!("Box-Cox (λ={:.4})", report.boxcox.lambda)),
        Cell::new(format!("{:.4}", report.boxcox_fit.r_squared)),
        Cell::new(format!("{:.3}", report.boxcox_fit.durbin_watson)),
        Cell::new(p.boxcox_cm.map_or_else(|| "-".to_string(), |cm| format!("{cm:.2}"))),
    ]));
    table
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String, ReportError> {
    Ok(serde_json::to_string_pretty(value)?)
}
