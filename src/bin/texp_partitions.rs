//! texp-partitions
//!
//! Command-line front end for querying monitoring-safe partitions of a
//! dependency artifact.

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use texp_monitor::condition::{self, Condition};
use texp_monitor::partition::wire;
use texp_monitor::{
    DependencyOracle, OracleSession, Partition, ProtocolSpecification, SpecificationConfig,
    TexpResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Minimal,
    First,
    Random,
    All,
    Check(String),
}

#[derive(Debug)]
struct Config {
    spec: PathBuf,
    config: Option<PathBuf>,
    mode: Mode,
    together: Vec<(String, String)>,
    apart: Vec<(String, String)>,
    max_blocks: Option<usize>,
    json: bool,
}

fn usage() {
    println!("texp-partitions - monitoring-safe partitions of a trace expression");
    println!();
    println!("USAGE:");
    println!("    texp-partitions --spec <FILE> [MODE] [OPTIONS]");
    println!();
    println!("MODES:");
    println!("        --minimal             Minimal monitoring-safe partitions [default]");
    println!("        --first               First monitoring-safe partition");
    println!("        --random              Randomly selected monitoring-safe partition");
    println!("        --all                 Every monitoring-safe partition");
    println!("        --check <WIRE>        Judge one partition, e.g. \"[[ a, b ][ c ] ]\"");
    println!();
    println!("OPTIONS:");
    println!("    -s, --spec <FILE>         Specification artifact");
    println!("    -c, --config <FILE>       Retrieval configuration (TOML)");
    println!("        --together <A,B>      Require A and B in the same block (repeatable)");
    println!("        --apart <A,B>         Require A and B in different blocks (repeatable)");
    println!("        --max-blocks <N>      At most N monitors");
    println!("        --json                Print partitions as JSON");
    println!("    -h, --help                Print help information");
}

fn fail(message: &str) -> ! {
    eprintln!("error: {message}");
    std::process::exit(1);
}

fn pair(value: &str) -> (String, String) {
    match value.split_once(',') {
        Some((a, b)) if !a.is_empty() && !b.is_empty() => (a.to_string(), b.to_string()),
        _ => fail(&format!("expected A,B but got '{value}'")),
    }
}

fn value_at(args: &[String], i: usize) -> &str {
    match args.get(i + 1) {
        Some(value) => value,
        None => fail(&format!("{} requires a value", args[i])),
    }
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut spec = None;
    let mut config = Config {
        spec: PathBuf::new(),
        config: None,
        mode: Mode::Minimal,
        together: Vec::new(),
        apart: Vec::new(),
        max_blocks: None,
        json: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--spec" | "-s" => {
                spec = Some(PathBuf::from(value_at(&args, i)));
                i += 2;
            }
            "--config" | "-c" => {
                config.config = Some(PathBuf::from(value_at(&args, i)));
                i += 2;
            }
            "--minimal" => {
                config.mode = Mode::Minimal;
                i += 1;
            }
            "--first" => {
                config.mode = Mode::First;
                i += 1;
            }
            "--random" => {
                config.mode = Mode::Random;
                i += 1;
            }
            "--all" => {
                config.mode = Mode::All;
                i += 1;
            }
            "--check" => {
                config.mode = Mode::Check(value_at(&args, i).to_string());
                i += 2;
            }
            "--together" => {
                config.together.push(pair(value_at(&args, i)));
                i += 2;
            }
            "--apart" => {
                config.apart.push(pair(value_at(&args, i)));
                i += 2;
            }
            "--max-blocks" => {
                let value = value_at(&args, i);
                let n = value
                    .parse()
                    .unwrap_or_else(|_| fail(&format!("invalid block count: {value}")));
                config.max_blocks = Some(n);
                i += 2;
            }
            "--json" => {
                config.json = true;
                i += 1;
            }
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            arg => fail(&format!("unknown argument: {arg}")),
        }
    }

    config.spec = spec.unwrap_or_else(|| fail("--spec is required"));
    config
}

fn print_partitions(partitions: &[Partition<String>], json: bool) {
    if json {
        match serde_json::to_string_pretty(partitions) {
            Ok(text) => println!("{text}"),
            Err(e) => fail(&format!("serialize partitions: {e}")),
        }
        return;
    }
    for partition in partitions {
        println!("{partition}");
    }
}

fn run(config: Config) -> TexpResult<()> {
    let retrieval = match &config.config {
        Some(path) => SpecificationConfig::from_file(path)?,
        None => SpecificationConfig::default(),
    };

    let session = Arc::new(OracleSession::new(DependencyOracle::new()));
    let spec = ProtocolSpecification::load_with_config(session, &config.spec, retrieval)?;

    let mut owned: Vec<Box<dyn Condition<String>>> = Vec::new();
    for (a, b) in config.together {
        owned.push(Box::new(condition::monitored_together(a, b)));
    }
    for (a, b) in config.apart {
        owned.push(Box::new(condition::monitored_apart(a, b)));
    }
    if let Some(n) = config.max_blocks {
        owned.push(Box::new(condition::max_blocks::<String>(n)));
    }
    let conditions: Vec<&dyn Condition<String>> = owned
        .iter()
        .map(|c| c.as_ref() as &dyn Condition<String>)
        .collect();

    match config.mode {
        Mode::Minimal => print_partitions(&spec.minimal_safe_partitions(&conditions)?, config.json),
        Mode::First => print_partitions(&[spec.first_safe_partition(&conditions)?], config.json),
        Mode::Random => print_partitions(&[spec.random_safe_partition(&conditions)?], config.json),
        Mode::All => {
            let all = spec
                .safe_partitions(&conditions)?
                .collect::<Result<Vec<_>, _>>()?;
            print_partitions(&all, config.json);
        }
        Mode::Check(text) => {
            let partition = wire::parse(&text)?;
            println!("{}", spec.is_monitoring_safe(&partition)?);
        }
    }
    Ok(())
}

/// `RUST_LOG` when set, `info` otherwise.
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .init();

    let config = parse_args();
    if let Err(err) = run(config) {
        fail(&err.to_string());
    }
}
