use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Modules that hold the numerical core. They must not print, parse CSV or
/// render tables; that belongs to `data`, `report`, `plot` and the binary.
const CORE_MODULES: [&str; 9] = [
    "src/boxcox.rs",
    "src/descriptive.rs",
    "src/encoding.rs",
    "src/normality.rs",
    "src/ols.rs",
    "src/probability.rs",
    "src/spline.rs",
    "src/table.rs",
    "src/linalg",
];

fn main() {
    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");

    let build_ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=REGSTUDY_BUILD_TIMESTAMP={build_ts}");

    enforce_core_boundary();
}

fn collect_sources(root: PathBuf, out: &mut Vec<PathBuf>) {
    if root.is_file() {
        out.push(root);
        return;
    }
    let mut stack = vec![root];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|s| s.to_str()) == Some("rs") {
                out.push(path);
            }
        }
    }
}

fn enforce_core_boundary() {
    let forbidden = ["println!", "print!(", "clap::", "comfy_table", "csv::"];

    let mut files = Vec::new();
    for module in CORE_MODULES {
        collect_sources(PathBuf::from(module), &mut files);
    }

    let mut violations = Vec::new();
    for path in files {
        let rel = path.to_string_lossy().to_string();
        let src = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(_) => continue,
        };
        for (line_no, line) in src.lines().enumerate() {
            for token in &forbidden {
                if line.contains(token) {
                    violations.push(format!(
                        "{}:{} contains forbidden token '{}'",
                        rel,
                        line_no + 1,
                        token
                    ));
                }
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\nerror: presentation code detected in numerical core modules:");
        for v in violations {
            eprintln!("  - {v}");
        }
        panic!("presentation leakage into numerical core");
    }
}
