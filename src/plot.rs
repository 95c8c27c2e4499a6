//! Interactive Plotly.js figures written as standalone HTML.

use crate::config::{CorruptionColumns, GrowthColumns};
use crate::pipeline::corruption::{CorruptionReport, FITTED_COLUMN, ordinal_column_name};
use crate::pipeline::growth::GrowthReport;
use crate::report::ReportError;
use serde::Serialize;
use std::fs;
use std::path::Path;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

#[derive(Clone, Debug, Serialize)]
pub struct Marker {
    pub color: String,
    pub size: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Line {
    pub color: String,
    pub width: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub mode: &'static str,
    pub name: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<Marker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<Line>,
}

impl Trace {
    pub fn markers(name: &str, x: Vec<f64>, y: Vec<f64>, marker: Marker) -> Self {
        Self {
            kind: "scatter",
            mode: "markers",
            name: name.to_string(),
            x,
            y,
            marker: Some(marker),
            line: None,
        }
    }

    pub fn lines(name: &str, x: Vec<f64>, y: Vec<f64>, line: Line) -> Self {
        Self {
            kind: "scatter",
            mode: "lines",
            name: name.to_string(),
            x,
            y,
            marker: None,
            line: Some(line),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Font {
    pub size: f64,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Annotation {
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub showarrow: bool,
    pub xshift: f64,
    pub yshift: f64,
    pub xref: &'static str,
    pub yref: &'static str,
    pub font: Font,
}

#[derive(Clone, Debug, Serialize)]
pub struct Title {
    pub text: String,
    pub font: Font,
    pub x: f64,
    pub y: f64,
    pub xanchor: &'static str,
    pub yanchor: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct Axis {
    pub title: AxisTitle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tickvals: Option<Vec<f64>>,
    pub tickfont: Font,
    pub showgrid: bool,
    pub gridwidth: f64,
    pub gridcolor: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct AxisTitle {
    pub text: String,
}

impl Axis {
    fn new(title: &str, tickvals: Option<Vec<f64>>) -> Self {
        Self {
            title: AxisTitle {
                text: title.to_string(),
            },
            tickvals,
            tickfont: Font {
                size: 14.0,
                color: "black".to_string(),
                family: None,
            },
            showgrid: true,
            gridwidth: 1.0,
            gridcolor: "lightgray",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Layout {
    pub title: Title,
    pub xaxis: Axis,
    pub yaxis: Axis,
    pub plot_bgcolor: &'static str,
    pub paper_bgcolor: &'static str,
    pub annotations: Vec<Annotation>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

fn centered_title(text: &str) -> Title {
    Title {
        text: text.to_string(),
        font: Font {
            size: 20.0,
            color: "black".to_string(),
            family: Some("Arial".to_string()),
        },
        x: 0.5,
        y: 0.95,
        xanchor: "center",
        yanchor: "top",
    }
}

fn layout(title: &str, xaxis: Axis, yaxis: Axis, annotations: Vec<Annotation>) -> Layout {
    Layout {
        title: centered_title(title),
        xaxis,
        yaxis,
        plot_bgcolor: "white",
        paper_bgcolor: "white",
        annotations,
    }
}

/// Raw index by region code, fitted values of the indicator model, the
/// interpolating spline, and one `"<country> <index>"` label per point.
pub fn corruption_figure(
    report: &CorruptionReport,
    columns: &CorruptionColumns,
) -> Result<Figure, ReportError> {
    let table = &report.table;
    let codes = table.numeric(&ordinal_column_name(&columns.region))?.to_vec();
    let index = table.numeric(&columns.index)?.to_vec();
    let fitted = table.numeric(FITTED_COLUMN)?.to_vec();
    let countries = table.categorical(&columns.country)?;

    let annotations = countries
        .iter()
        .zip(codes.iter().zip(index.iter()))
        .map(|(country, (&x, &y))| Annotation {
            x,
            y,
            text: format!("{country} {y:?}"),
            showarrow: false,
            xshift: 50.0,
            yshift: 0.0,
            xref: "x",
            yref: "y",
            font: Font {
                size: 11.0,
                color: "black".to_string(),
                family: None,
            },
        })
        .collect();

    let n_codes = report.ordinal.mapping.len();
    let data = vec![
        Trace::markers(
            "CPI",
            codes.clone(),
            index,
            Marker {
                color: "darkorange".to_string(),
                size: 14.0,
                opacity: Some(0.5),
            },
        ),
        Trace::markers(
            "Fitted",
            codes,
            fitted,
            Marker {
                color: "limegreen".to_string(),
                size: 17.0,
                opacity: None,
            },
        ),
        Trace::lines(
            "Interpolated",
            report.spline_grid.x.clone(),
            report.spline_grid.y.clone(),
            Line {
                color: "indigo".to_string(),
                width: 3.5,
            },
        ),
    ];

    Ok(Figure {
        data,
        layout: layout(
            "Ajuste Não Linear do Modelo com Variáveis Dummy",
            Axis::new("Região", Some((1..=n_codes).map(|c| c as f64).collect())),
            Axis::new(
                "Corruption Perception Index",
                Some((0..=10).map(f64::from).collect()),
            ),
            annotations,
        ),
    })
}

/// Pairs sorted by `x`; points with an undefined `y` are dropped.
fn sorted_by_x(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut pairs: Vec<(f64, f64)> = x
        .iter()
        .copied()
        .zip(y.iter().copied())
        .filter(|(_, v)| v.is_finite())
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    pairs.into_iter().unzip()
}

/// Observations with the linear fit and the back-transformed Box-Cox fit.
pub fn growth_figure(
    report: &GrowthReport,
    columns: &GrowthColumns,
) -> Result<Figure, ReportError> {
    let age = report.table.numeric(&columns.age)?.to_vec();
    let length = report.table.numeric(&columns.length)?.to_vec();
    let (lx, ly) = sorted_by_x(&age, &report.linear_fit.fitted.to_vec());
    let (bx, by) = sorted_by_x(&age, &report.boxcox_fitted_cm.to_vec());

    let data = vec![
        Trace::markers(
            "Dados Reais",
            age,
            length,
            Marker {
                color: "grey".to_string(),
                size: 10.0,
                opacity: Some(0.6),
            },
        ),
        Trace::lines(
            "Ajuste Linear",
            lx,
            ly,
            Line {
                color: "orange".to_string(),
                width: 2.5,
            },
        ),
        Trace::lines(
            &format!("Ajuste Box-Cox (λ={:.3})", report.boxcox.lambda),
            bx,
            by,
            Line {
                color: "purple".to_string(),
                width: 2.5,
            },
        ),
    ];

    Ok(Figure {
        data,
        layout: layout(
            "Dispersão dos Dados com Ajustes Linear e Box-Cox",
            Axis::new("Idade (semanas)", None),
            Axis::new("Comprimento (cm)", None),
            Vec::new(),
        ),
    })
}

pub fn render_html(figure: &Figure) -> Result<String, ReportError> {
    let data = serde_json::to_string(&figure.data)?.replace("</", "<\\/");
    let layout = serde_json::to_string(&figure.layout)?.replace("</", "<\\/");
    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<script src="{PLOTLY_CDN}"></script>
</head>
<body>
<div id="figure" style="width:100%;height:90vh;"></div>
<script>
Plotly.newPlot("figure", {data}, {layout}, {{"responsive": true}});
</script>
</body>
</html>
"#,
        title = html_escape(&figure.layout.title.text),
    ))
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Writes the figure, silently replacing any existing file.
pub fn write_figure_html(figure: &Figure, path: &Path) -> Result<(), ReportError> {
    let html = render_html(figure)?;
    fs::write(path, html).map_err(|source| ReportError::Write {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_figure() -> Figure {
        Figure {
            data: vec![Trace::lines(
                "curve",
                vec![1.0, 2.0],
                vec![3.0, 4.0],
                Line {
                    color: "indigo".to_string(),
                    width: 3.5,
                },
            )],
            layout: layout(
                "A <b>title</b>",
                Axis::new("x", None),
                Axis::new("y", Some(vec![0.0, 1.0])),
                vec![Annotation {
                    x: 1.0,
                    y: 3.0,
                    text: "</script> 3.0".to_string(),
                    showarrow: false,
                    xshift: 50.0,
                    yshift: 0.0,
                    xref: "x",
                    yref: "y",
                    font: Font {
                        size: 11.0,
                        color: "black".to_string(),
                        family: None,
                    },
                }],
            ),
        }
    }

    #[test]
    fn html_embeds_traces_and_escapes_script_breakers() {
        let html = render_html(&tiny_figure()).expect("renders");
        assert!(html.contains("Plotly.newPlot"));
        assert!(html.contains(r#""mode":"lines""#));
        assert!(html.contains(r#""type":"scatter""#));
        assert!(html.contains("<title>A &lt;b&gt;title&lt;/b&gt;</title>"));
        assert!(html.contains(r"<\/script> 3.0"));
        assert!(!html.contains(r#""marker""#));
    }

    #[test]
    fn write_replaces_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("figure.html");
        fs::write(&path, "old").expect("seed file");
        write_figure_html(&tiny_figure(), &path).expect("writes");
        let html = fs::read_to_string(&path).expect("reads back");
        assert!(html.starts_with("<!DOCTYPE html>"));
    }
}
