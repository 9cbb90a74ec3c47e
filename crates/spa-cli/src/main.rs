use std::{fs, path::Path};

use anyhow::{ensure, Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use serde::{Deserialize, Serialize};
use spa_optim::dataset::{PoseGraphInput, PoseRecord};
use spa_optim::{optimize_pose_graph, JacobianMode, PoseGraphSolveOptions, PoseGraphSummary};

/// Sparse pose adjustment for 2-D pose graphs.
#[derive(Debug, Parser)]
#[command(author, version, about = "2-D sparse pose adjustment")]
struct Args {
    /// Path to JSON file containing a PoseGraphInput. Defaults to the built-in triangle.
    #[arg(long)]
    input: Option<String>,

    /// Optional path to JSON PoseGraphSolveOptions. Defaults are used if omitted.
    #[arg(long)]
    config: Option<String>,

    /// Jacobian source; overrides the config file.
    #[arg(long, value_enum)]
    jacobian: Option<JacobianArg>,

    /// Time N solves with each Jacobian mode instead of printing the solution.
    #[arg(long, value_name = "N")]
    bench: Option<usize>,

    /// Log the solve summary.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum JacobianArg {
    Analytic,
    Autodiff,
}

impl From<JacobianArg> for JacobianMode {
    fn from(arg: JacobianArg) -> Self {
        match arg {
            JacobianArg::Analytic => JacobianMode::Analytic,
            JacobianArg::Autodiff => JacobianMode::AutoDiff,
        }
    }
}

/// Optimized poses plus solver diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SolveOutput {
    summary: PoseGraphSummary,
    poses: Vec<PoseRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BenchTiming {
    jacobian: JacobianMode,
    mean_time_secs: f64,
    max_time_secs: f64,
    final_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BenchOutput {
    runs: usize,
    timings: Vec<BenchTiming>,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value =
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(value)
}

fn load_inputs(
    input_path: Option<&str>,
    config_path: Option<&str>,
) -> Result<(PoseGraphInput, PoseGraphSolveOptions)> {
    let input = match input_path {
        Some(path) => load_json_file(Path::new(path))?,
        None => PoseGraphInput::triangle(),
    };
    let config = match config_path {
        Some(path) => load_json_file(Path::new(path))?,
        None => PoseGraphSolveOptions::default(),
    };
    Ok((input, config))
}

fn solve(input: &PoseGraphInput, config: &PoseGraphSolveOptions) -> Result<SolveOutput> {
    let (constraints, mut poses) = input.to_graph()?;
    let summary = optimize_pose_graph(&constraints, &mut poses, config)?;
    let poses = poses
        .iter()
        .map(|(id, p)| PoseRecord::from_pose(*id, p))
        .collect();
    Ok(SolveOutput { summary, poses })
}

/// Repeat the solve `runs` times per Jacobian mode from the same initial estimates.
fn bench(
    input: &PoseGraphInput,
    config: &PoseGraphSolveOptions,
    runs: usize,
) -> Result<BenchOutput> {
    ensure!(runs > 0, "--bench needs at least one run");
    let (constraints, poses) = input.to_graph()?;

    let mut timings = Vec::new();
    for jacobian in [JacobianMode::AutoDiff, JacobianMode::Analytic] {
        let opts = PoseGraphSolveOptions {
            jacobian,
            ..config.clone()
        };
        let mut total = 0.0;
        let mut max = 0.0_f64;
        let mut final_cost = 0.0;
        for _ in 0..runs {
            let mut working = poses.clone();
            let summary = optimize_pose_graph(&constraints, &mut working, &opts)?;
            total += summary.total_time_secs;
            max = max.max(summary.total_time_secs);
            final_cost = summary.final_cost;
        }
        let timing = BenchTiming {
            jacobian,
            mean_time_secs: total / runs as f64,
            max_time_secs: max,
            final_cost,
        };
        info!(
            "{:?}: mean {:.3e}s, max {:.3e}s over {} runs",
            timing.jacobian, timing.mean_time_secs, timing.max_time_secs, runs
        );
        timings.push(timing);
    }
    Ok(BenchOutput { runs, timings })
}

fn run_from_files(
    input_path: Option<&str>,
    config_path: Option<&str>,
    jacobian: Option<JacobianMode>,
    verbose: bool,
    bench_runs: Option<usize>,
) -> Result<String> {
    let (input, mut config) = load_inputs(input_path, config_path)?;
    if let Some(jacobian) = jacobian {
        config.jacobian = jacobian;
    }
    config.solver.verbose |= verbose;

    let json = match bench_runs {
        Some(runs) => serde_json::to_string_pretty(&bench(&input, &config, runs)?)?,
        None => serde_json::to_string_pretty(&solve(&input, &config)?)?,
    };
    Ok(json)
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let json = run_from_files(
        args.input.as_deref(),
        args.config.as_deref(),
        args.jacobian.map(JacobianMode::from),
        args.verbose,
        args.bench,
    )?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;
    use tempfile::NamedTempFile;

    fn write_json<T: serde::Serialize>(value: &T, path: &Path) {
        serde_json::to_writer_pretty(fs::File::create(path).unwrap(), value).unwrap();
    }

    #[test]
    fn helper_smoke_test() {
        let input_file = NamedTempFile::new().unwrap();
        let config_file = NamedTempFile::new().unwrap();

        let mut config = PoseGraphSolveOptions::default();
        config.solver.max_iters = 100;
        write_json(&PoseGraphInput::triangle(), input_file.path());
        write_json(&config, config_file.path());

        let json = run_from_files(
            Some(input_file.path().to_str().unwrap()),
            Some(config_file.path().to_str().unwrap()),
            Some(JacobianMode::AutoDiff),
            false,
            None,
        )
        .expect("cli helper should succeed");

        let out: SolveOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(out.summary.jacobian, JacobianMode::AutoDiff);
        assert!(
            out.summary.final_cost < 1e-10,
            "final cost too high: {}",
            out.summary.final_cost
        );
        let p1 = out.poses.iter().find(|p| p.id == 1).unwrap();
        assert!((p1.x - 4.0).abs() < 1e-3 && p1.y.abs() < 1e-3);
        assert!((p1.theta - FRAC_PI_2).abs() < 1e-3);
    }

    #[test]
    fn default_input_is_triangle() {
        let json = run_from_files(None, None, None, false, None).unwrap();
        let out: SolveOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(out.poses.len(), 3);
        assert_eq!(out.summary.jacobian, JacobianMode::Analytic);
    }

    #[test]
    fn bench_reports_both_modes() {
        let json = run_from_files(None, None, None, false, Some(3)).unwrap();
        let out: BenchOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(out.runs, 3);
        assert_eq!(out.timings.len(), 2);
        for t in &out.timings {
            assert!(t.max_time_secs >= t.mean_time_secs * (1.0 - 1e-9));
            assert!(t.final_cost < 1e-10);
        }
    }

    #[test]
    fn zero_bench_runs_is_an_error() {
        assert!(run_from_files(None, None, None, false, Some(0)).is_err());
    }

    #[test]
    fn invalid_graph_is_reported() {
        let input_file = NamedTempFile::new().unwrap();
        let mut input = PoseGraphInput::triangle();
        input.constraints[0].target = 5;
        write_json(&input, input_file.path());

        let err = run_from_files(
            Some(input_file.path().to_str().unwrap()),
            None,
            None,
            false,
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid pose graph"), "got {err}");
    }
}
