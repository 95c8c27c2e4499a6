use clap::{Args, Parser, Subcommand, ValueEnum};
use regstudy::config::{CorruptionConfig, GrowthConfig, load_config};
use regstudy::normality::NormalityMethod;
use regstudy::pipeline::{CorruptionReport, GrowthReport, run_corruption_file, run_growth_file};
use regstudy::report::{
    coefficient_table, corruption_comparison_table, describe_table, fit_statistics_table,
    fitted_preview_table, frequency_table_view, grouped_describe_table, growth_comparison_table,
    normality_table, to_json,
};
use std::path::PathBuf;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (built ",
    env!("REGSTUDY_BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "regstudy", version, long_version = LONG_VERSION)]
#[command(about = "Exploratory regression studies", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Print the full report as JSON instead of tables.
    #[arg(long = "json", global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Perception index by region: ordinal vs indicator encoding.
    #[command(alias = "cpi")]
    Corruption(CorruptionArgs),
    /// Infant length by age: OLS, residual normality, Box-Cox.
    #[command(alias = "babies")]
    Growth(GrowthArgs),
}

#[derive(Args, Debug)]
struct CorruptionArgs {
    data: PathBuf,
    #[arg(long = "config")]
    config: Option<PathBuf>,
    #[arg(long = "out")]
    out: Option<PathBuf>,
    /// Reference region for the indicator encoding.
    #[arg(long = "reference")]
    reference: Option<String>,
    /// Comma-separated region order for the ordinal codes.
    #[arg(long = "order", value_delimiter = ',')]
    order: Option<Vec<String>>,
    #[arg(long = "alpha")]
    alpha: Option<f64>,
    #[arg(long = "spline-step")]
    spline_step: Option<f64>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum NormalityArg {
    ShapiroWilk,
    ShapiroFrancia,
}

impl From<NormalityArg> for NormalityMethod {
    fn from(value: NormalityArg) -> Self {
        match value {
            NormalityArg::ShapiroWilk => NormalityMethod::ShapiroWilk,
            NormalityArg::ShapiroFrancia => NormalityMethod::ShapiroFrancia,
        }
    }
}

#[derive(Args, Debug)]
struct GrowthArgs {
    data: PathBuf,
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Age in weeks at which both models predict length.
    #[arg(long = "predict-at")]
    predict_at: Option<f64>,
    #[arg(long = "alpha")]
    alpha: Option<f64>,
    #[arg(long = "normality", value_enum)]
    normality: Option<NormalityArg>,
    #[arg(long = "html")]
    html: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let cli = Cli::parse();
    match cli.command {
        Command::Corruption(args) => run_corruption_cmd(args, cli.json),
        Command::Growth(args) => run_growth_cmd(args, cli.json),
    }
}

fn run_corruption_cmd(args: CorruptionArgs, json: bool) -> Result<(), String> {
    let mut config: CorruptionConfig = match &args.config {
        Some(path) => load_config(path).map_err(|e| e.to_string())?,
        None => CorruptionConfig::default(),
    };
    if let Some(out) = args.out {
        config.html_out = out;
    }
    if let Some(reference) = args.reference {
        config.reference = Some(reference);
    }
    if let Some(order) = args.order {
        config.ordinal_order = Some(order.into_iter().map(|s| s.trim().to_string()).collect());
    }
    if let Some(alpha) = args.alpha {
        config.alpha = alpha;
    }
    if let Some(step) = args.spline_step {
        config.spline_step = step;
    }

    let report = run_corruption_file(&args.data, &config).map_err(|e| e.to_string())?;
    if json {
        println!("{}", to_json(&report).map_err(|e| e.to_string())?);
        return Ok(());
    }
    print_corruption(&report, &config)
}

fn print_corruption(report: &CorruptionReport, config: &CorruptionConfig) -> Result<(), String> {
    let cols = &config.columns;
    println!("{}", describe_table(&[(cols.index.as_str(), &report.index_summary)]));
    println!("{}", grouped_describe_table(&cols.region, &report.by_region));
    println!("{}", frequency_table_view(&report.frequencies));

    println!("\nOrdinal region codes:");
    for (region, code) in &report.ordinal.mapping {
        println!("  {code} = {region}");
    }

    println!("\n--- {} ~ {}_code (ordinal encoding) ---", cols.index, cols.region);
    println!("{}", coefficient_table(&report.ordinal_fit, report.alpha));
    println!("{}", fit_statistics_table("Ordinal model", &report.ordinal_fit));

    println!(
        "\n--- {} ~ indicators (reference: {}) ---",
        cols.index, report.reference
    );
    println!("{}", coefficient_table(&report.indicator_fit, report.alpha));
    println!("{}", fit_statistics_table("Indicator model", &report.indicator_fit));
    println!(
        "Regions differing from {} at alpha = {}: {}",
        report.reference,
        report.alpha,
        if report.significant_regions.is_empty() {
            "none".to_string()
        } else {
            report.significant_regions.join(", ")
        }
    );
    for w in report.ordinal_fit.warnings.iter().chain(&report.indicator_fit.warnings) {
        println!("warning: {w}");
    }

    println!("\nFitted values (indicator model):");
    let preview = fitted_preview_table(report, &cols.region, &cols.index, config.preview_rows)
        .map_err(|e| e.to_string())?;
    println!("{preview}");

    println!("{}", corruption_comparison_table(report));
    if report.indicator_model_preferred() {
        println!("The indicator encoding explains more of the index than the ordinal codes.");
    } else {
        println!("The indicator encoding did not improve on the ordinal codes.");
    }
    println!("Figure written to {}", config.html_out.display());
    Ok(())
}

fn run_growth_cmd(args: GrowthArgs, json: bool) -> Result<(), String> {
    let mut config: GrowthConfig = match &args.config {
        Some(path) => load_config(path).map_err(|e| e.to_string())?,
        None => GrowthConfig::default(),
    };
    if let Some(at) = args.predict_at {
        config.predict_at_weeks = at;
    }
    if let Some(alpha) = args.alpha {
        config.alpha = alpha;
    }
    if let Some(method) = args.normality {
        config.normality_method = method.into();
    }
    if let Some(html) = args.html {
        config.html_out = Some(html);
    }

    let report = run_growth_file(&args.data, &config).map_err(|e| e.to_string())?;
    if json {
        println!("{}", to_json(&report).map_err(|e| e.to_string())?);
        return Ok(());
    }
    print_growth(&report, &config);
    Ok(())
}

fn print_growth(report: &GrowthReport, config: &GrowthConfig) {
    let cols = &config.columns;
    println!(
        "{}",
        describe_table(&[
            (cols.age.as_str(), &report.age_summary),
            (cols.length.as_str(), &report.length_summary),
        ])
    );

    println!("\n--- {} ~ {} ---", cols.length, cols.age);
    println!("{}", coefficient_table(&report.linear_fit, report.alpha));
    println!("{}", fit_statistics_table("Linear model", &report.linear_fit));

    let mut tests = vec![&report.normality];
    tests.extend(report.normality_secondary.as_ref());
    println!("\nResidual normality (linear model):");
    println!("{}", normality_table(&tests, report.alpha));
    println!("{}", report.normality.describe(report.alpha));

    println!(
        "\n--- boxcox({}) ~ {} (lambda = {:.4}) ---",
        cols.length, cols.age, report.boxcox.lambda
    );
    println!("{}", coefficient_table(&report.boxcox_fit, report.alpha));
    println!("{}", fit_statistics_table("Box-Cox model", &report.boxcox_fit));
    if let Some(t) = &report.boxcox_normality {
        println!("{}", t.describe(report.alpha));
    }

    println!("{}", growth_comparison_table(report));
    let p = &report.prediction;
    match p.boxcox_cm {
        Some(cm) => println!(
            "At {} weeks: linear {:.2} cm; Box-Cox {:.4} (transformed) = {:.2} cm",
            p.age_weeks, p.linear_cm, p.boxcox_transformed, cm
        ),
        None => println!(
            "At {} weeks: linear {:.2} cm; Box-Cox {:.4} (transformed, outside the invertible range for lambda {:.4})",
            p.age_weeks, p.linear_cm, p.boxcox_transformed, report.boxcox.lambda
        ),
    }
    for w in report.linear_fit.warnings.iter().chain(&report.boxcox_fit.warnings) {
        println!("warning: {w}");
    }
}
