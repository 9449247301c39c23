use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use env_logger::Env;
use jitjoin::{
    build_join_ir, run_join, CompilationBackend, ConsoleReport, InterpBackend, JitEngine,
    JitError, JitjoinConfig, ReportSink, StringColumn, Table,
};
use log::info;

#[derive(Parser)]
#[command(name = "jitjoin")]
#[command(about = "Join one column of two CSV files with a JIT-compiled nested loop")]
#[command(version)]
struct Cli {
    /// Left input table (comma-delimited)
    left: PathBuf,

    /// Right input table (comma-delimited)
    right: PathBuf,

    /// Column of the left table to join on [default: 3]
    #[arg(long)]
    left_column: Option<usize>,

    /// Column of the right table to join on [default: 1]
    #[arg(long)]
    right_column: Option<usize>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Compilation backend
    #[arg(short, long, value_enum, default_value_t = Backend::Native)]
    backend: Backend,

    /// Print the join IR before compiling
    #[arg(long)]
    dump_ir: bool,

    /// Print both input tables after loading
    #[arg(long)]
    print_tables: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// Cranelift native code
    Native,
    /// IR interpreter
    Interp,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = load_config(&cli).and_then(|config| match cli.backend {
        Backend::Native => execute(JitEngine::new(config.backend.clone()), &cli, &config),
        Backend::Interp => execute(InterpBackend::new(), &cli, &config),
    });

    match result {
        Ok(()) => println!("PASS"),
        Err(e) => {
            match e.status_code() {
                0 => eprintln!("FAIL: {e}"),
                status => eprintln!("FAIL: {e} (status {status})"),
            }
            process::exit(e.exit_code());
        }
    }
}

fn load_config(cli: &Cli) -> Result<JitjoinConfig, JitError> {
    let mut config = match &cli.config {
        Some(path) => JitjoinConfig::from_json_file(path)?,
        None => JitjoinConfig::default(),
    };
    if let Some(column) = cli.left_column {
        config.left_column = column;
    }
    if let Some(column) = cli.right_column {
        config.right_column = column;
    }
    Ok(config)
}

fn execute<B: CompilationBackend>(
    mut backend: B,
    cli: &Cli,
    config: &JitjoinConfig,
) -> Result<(), JitError> {
    let started = Instant::now();
    let step = |n: u32, what: &str| info!("step {n}: {what} ({:?})", started.elapsed());

    step(0, "read tables");
    let left = load_table(&cli.left)?;
    let right = load_table(&cli.right)?;
    info!(
        "loaded {} rows from {} and {} rows from {}",
        left.len(),
        cli.left.display(),
        right.len(),
        cli.right.display()
    );
    let mut report = ConsoleReport::stdout();
    if cli.print_tables {
        report.write_table(&left).map_err(report_err)?;
        report.write_table(&right).map_err(report_err)?;
    }

    step(1, "extract join columns");
    let left_keys = StringColumn::from_table(&left, config.left_column)?;
    let right_keys = StringColumn::from_table(&right, config.right_column)?;

    step(2, "initialize JIT");
    backend.initialize()?;

    step(3, "build join IR");
    let func = build_join_ir(&config.join)?;
    if cli.dump_ir {
        println!("{func}");
    }

    step(4, "compile");
    let entry = backend.compile(&func)?;

    step(5, "invoke");
    let output = run_join(&entry, &left_keys, &right_keys)?;
    report.report(&output).map_err(report_err)?;

    step(6, "shutdown JIT");
    backend.shutdown();
    Ok(())
}

fn load_table(path: &Path) -> Result<Table, JitError> {
    Ok(Table::from_path(path)?)
}

fn report_err(e: std::io::Error) -> JitError {
    JitError::InvalidParams(format!("failed to write report: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["jitjoin", "left.csv", "right.csv"]).unwrap();
        assert!(matches!(cli.backend, Backend::Native));
        let config = load_config(&cli).unwrap();
        assert_eq!(config.left_column, 3);
        assert_eq!(config.right_column, 1);
    }

    #[test]
    fn test_interp_backend_flag() {
        let cli =
            Cli::try_parse_from(["jitjoin", "l.csv", "r.csv", "--backend", "interp"]).unwrap();
        assert!(matches!(cli.backend, Backend::Interp));
        assert!(Cli::try_parse_from(["jitjoin", "l.csv", "r.csv", "--backend", "llvm"]).is_err());
    }

    #[test]
    fn test_column_flags_override_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("jitjoin.json");
        std::fs::write(
            &path,
            r#"{"left_column": 5, "right_column": 6, "join": {"not_found": "-"}}"#,
        )
        .unwrap();
        let config_arg = path.to_str().unwrap();

        let cli = Cli::try_parse_from(["jitjoin", "l.csv", "r.csv", "--config", config_arg])
            .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!((config.left_column, config.right_column), (5, 6));

        let cli = Cli::try_parse_from([
            "jitjoin",
            "l.csv",
            "r.csv",
            "--config",
            config_arg,
            "--left-column",
            "0",
            "--right-column",
            "2",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!((config.left_column, config.right_column), (0, 2));
        assert_eq!(config.join.not_found, "-");
    }

    #[test]
    fn test_bad_config_exits_as_data_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let cli = Cli::try_parse_from([
            "jitjoin",
            "l.csv",
            "r.csv",
            "--config",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let err = load_config(&cli).unwrap_err();
        assert_eq!(err.exit_code(), -3);
    }

    #[test]
    fn test_missing_table_exits_as_data_error() {
        let err = load_table(Path::new("/nonexistent/left.csv")).unwrap_err();
        assert!(matches!(err, JitError::Table(_)));
        assert_eq!(err.exit_code(), -3);
    }
}
