use approx::assert_abs_diff_eq;
use regstudy::config::{CorruptionConfig, load_config};
use regstudy::data::{DataError, load_corruption_table};
use regstudy::pipeline::{PipelineError, run_corruption, run_corruption_file};
use regstudy::spline::SplineError;
use std::path::PathBuf;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/corrupcao.csv")
}

fn default_run() -> regstudy::CorruptionReport {
    let config = CorruptionConfig::default();
    let table = load_corruption_table(&fixture(), &config.columns, &config.regions)
        .expect("fixture loads");
    run_corruption(&table, &config).expect("pipeline runs")
}

#[test]
fn indicator_encoding_beats_ordinal_codes() {
    let report = default_run();
    assert_eq!(report.n_obs, 38);
    assert!(report.indicator_fit.r_squared > report.ordinal_fit.r_squared);
    assert_abs_diff_eq!(report.ordinal_fit.r_squared, 0.424196, epsilon = 1e-5);
    assert_abs_diff_eq!(report.indicator_fit.r_squared, 0.671607, epsilon = 1e-5);
    assert_abs_diff_eq!(
        report.ordinal_fit.coefficient("regiao_code").expect("slope"),
        1.464156,
        epsilon = 1e-5
    );
}

#[test]
fn ordinal_codes_follow_sorted_labels() {
    let report = default_run();
    let mapping: Vec<(&str, usize)> = report
        .ordinal
        .mapping
        .iter()
        .map(|(c, k)| (c.as_str(), *k))
        .collect();
    assert_eq!(
        mapping,
        vec![
            ("America_do_sul", 1),
            ("Asia", 2),
            ("EUA_e_Canada", 3),
            ("Europa", 4),
            ("Oceania", 5),
        ]
    );
}

#[test]
fn reference_region_rows_have_no_active_indicator() {
    let report = default_run();
    assert_eq!(report.reference, "America_do_sul");
    let regions = report.table.categorical("regiao").expect("region column");
    for name in &report.indicator_names {
        let values = report.table.numeric(name).expect("indicator column");
        for (region, v) in regions.iter().zip(values.iter()) {
            if region == "America_do_sul" {
                assert_eq!(*v, 0.0);
            }
        }
    }
    assert_eq!(
        report.indicator_names,
        vec![
            "regiao_Asia",
            "regiao_EUA_e_Canada",
            "regiao_Europa",
            "regiao_Oceania"
        ]
    );
}

#[test]
fn fitted_values_and_medians_are_region_means() {
    let report = default_run();
    let expected = [
        ("America_do_sul", 4.18),
        ("Asia", 2.329412),
        ("EUA_e_Canada", 8.0),
        ("Europa", 6.258333),
        ("Oceania", 9.0),
    ];
    assert_eq!(report.medians.len(), expected.len());
    for (m, (region, mean)) in report.medians.iter().zip(expected) {
        assert_eq!(m.region, region);
        assert_abs_diff_eq!(m.median_fitted, mean, epsilon = 1e-5);
        assert_abs_diff_eq!(report.spline.evaluate(m.code), mean, epsilon = 1e-6);
    }
    let grid = &report.spline_grid;
    assert_eq!(grid.x.len(), 41);
    assert_abs_diff_eq!(grid.y[0], 4.18, epsilon = 1e-6);
    assert_abs_diff_eq!(grid.y[40], 9.0, epsilon = 1e-6);
}

#[test]
fn changing_the_reference_keeps_the_fit() {
    let base = default_run();
    let config = CorruptionConfig {
        reference: Some("Europa".to_string()),
        ..CorruptionConfig::default()
    };
    let table = load_corruption_table(&fixture(), &config.columns, &config.regions)
        .expect("fixture loads");
    let report = run_corruption(&table, &config).expect("pipeline runs");
    assert!(!report.indicator_names.contains(&"regiao_Europa".to_string()));
    assert_abs_diff_eq!(
        report.indicator_fit.r_squared,
        base.indicator_fit.r_squared,
        epsilon = 1e-10
    );
    assert_abs_diff_eq!(
        report.indicator_fit.coefficient("Intercept").expect("intercept"),
        6.258333,
        epsilon = 1e-5
    );
}

#[test]
fn file_entry_point_writes_the_figure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("EXEMPLO3.html");
    let config = CorruptionConfig {
        html_out: out.clone(),
        ..CorruptionConfig::default()
    };
    run_corruption_file(&fixture(), &config).expect("pipeline runs");
    let html = std::fs::read_to_string(&out).expect("figure written");
    assert!(html.contains("Interpolated"));
    assert!(html.contains("Brasil 4.0"));
    assert!(html.contains("limegreen"));
}

#[test]
fn unknown_region_is_a_load_error() {
    let config = CorruptionConfig {
        regions: vec!["Asia".to_string(), "Europa".to_string()],
        ..CorruptionConfig::default()
    };
    let err = run_corruption_file(&fixture(), &config).expect_err("must fail");
    assert!(matches!(
        err,
        PipelineError::Data(DataError::UnknownCategory { .. })
    ));
}

#[test]
fn default_config_rejects_regions_outside_the_survey() {
    let dir = tempfile::tempdir().expect("tempdir");
    let csv = dir.path().join("antarctica.csv");
    std::fs::write(
        &csv,
        "pais,cpi,regiao\nBrasil,4.0,America_do_sul\nBase,5.0,Antarctica\nJapao,7.3,Asia\n",
    )
    .expect("write csv");
    let config = CorruptionConfig::default();
    let err = load_corruption_table(&csv, &config.columns, &config.regions)
        .expect_err("unknown region");
    match err {
        DataError::UnknownCategory { row, column, value } => {
            assert_eq!(row, 2);
            assert_eq!(column, "regiao");
            assert_eq!(value, "Antarctica");
        }
        other => panic!("unexpected error: {other}"),
    }

    let open = CorruptionConfig {
        regions: Vec::new(),
        ..CorruptionConfig::default()
    };
    let table = load_corruption_table(&csv, &open.columns, &open.regions)
        .expect("an empty region list accepts any label");
    assert_eq!(table.n_rows(), 3);
}

#[test]
fn too_few_regions_for_spline_fails_before_writing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let csv = dir.path().join("two.csv");
    std::fs::write(&csv, "pais,cpi,regiao\na,2.0,Asia\nb,3.0,Asia\nc,7.0,Europa\nd,8.0,Europa\n")
        .expect("write csv");
    let config = CorruptionConfig {
        html_out: dir.path().join("out.html"),
        ..CorruptionConfig::default()
    };
    let err = run_corruption_file(&csv, &config).expect_err("must fail");
    assert!(matches!(
        err,
        PipelineError::Spline(SplineError::InsufficientData {
            degree: 2,
            required: 3,
            provided: 2
        })
    ));
    assert!(!dir.path().join("out.html").exists());
}

#[test]
fn json_config_overrides_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"reference": "Asia", "spline_step": 0.5, "ordinal_order": ["Oceania", "Europa", "EUA_e_Canada", "Asia", "America_do_sul"]}"#,
    )
    .expect("write config");
    let config: CorruptionConfig = load_config(&path).expect("config parses");
    let table = load_corruption_table(&fixture(), &config.columns, &config.regions)
        .expect("fixture loads");
    let report = run_corruption(&table, &config).expect("pipeline runs");
    assert_eq!(report.reference, "Asia");
    assert_eq!(report.spline_grid.x.len(), 9);
    assert_eq!(report.ordinal.code_of("Oceania"), Some(1));
}

#[test]
fn significance_level_selects_region_effects() {
    let report = default_run();
    assert_eq!(report.alpha, 0.05);
    assert_eq!(
        report.significant_regions,
        vec!["Asia", "EUA_e_Canada", "Europa", "Oceania"]
    );

    let config = CorruptionConfig {
        alpha: 0.005,
        ..CorruptionConfig::default()
    };
    let table = load_corruption_table(&fixture(), &config.columns, &config.regions)
        .expect("fixture loads");
    let strict = run_corruption(&table, &config).expect("pipeline runs");
    assert_eq!(strict.significant_regions, vec!["Oceania"]);
    assert_abs_diff_eq!(
        strict.indicator_fit.r_squared,
        report.indicator_fit.r_squared,
        epsilon = 1e-12
    );
}
