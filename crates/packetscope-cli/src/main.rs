use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use packetscope_core::{
    CaptureBackend, CaptureConfig, DatalinkBackend, Event, ServeConfig, StatisticsReport,
    analyze_pcap_file, serve,
};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("PACKETSCOPE_BUILD_COMMIT"),
    " ",
    env!("PACKETSCOPE_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "packetscope")]
#[command(version = VERSION)]
#[command(
    about = "Local network diagnostics agent: live capture and offline capture analysis.",
    long_about = None,
    after_help = "Examples:\n  packetscope serve\n  packetscope pcap analyse capture.pcapng --stdout --pretty\n  packetscope interfaces"
)]
struct Cli {
    /// Enable debug logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the agent, reading JSON commands on stdin and writing JSON events on stdout.
    Serve(ServeArgs),
    /// Operations on PCAP/PCAPNG inputs.
    Pcap {
        #[command(subcommand)]
        command: PcapCommands,
    },
    /// List capturable network interfaces as JSON.
    Interfaces,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Records buffered between capture and forwarding before the oldest are dropped
    #[arg(long, default_value_t = 4096)]
    queue_capacity: usize,

    /// Command channel poll interval in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_interval_ms: u64,

    /// Forwarding loop wait on an empty queue, in milliseconds
    #[arg(long, default_value_t = 500)]
    forward_timeout_ms: u64,

    /// Live capture read timeout in milliseconds
    #[arg(long, default_value_t = 100)]
    read_timeout_ms: u64,
}

#[derive(Subcommand, Debug)]
enum PcapCommands {
    /// Analyse a capture file and write its statistics report as JSON.
    #[command(alias = "analyze")]
    #[command(
        after_help = "Examples:\n  packetscope pcap analyse capture.pcapng -o report.json\n  packetscope pcap analyze capture.pcap --stdout"
    )]
    Analyse {
        /// Path to a .pcap or .pcapng file
        input: PathBuf,

        /// Output report path (JSON)
        #[arg(short = 'o', long, required_unless_present = "stdout")]
        report: Option<PathBuf>,

        /// Write JSON report to stdout
        #[arg(long, conflicts_with = "report")]
        stdout: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Suppress non-error output
        #[arg(long)]
        quiet: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let result = match cli.command {
        Commands::Serve(args) => cmd_serve(args),
        Commands::Pcap { command } => match command {
            PcapCommands::Analyse {
                input,
                report,
                stdout,
                pretty,
                quiet,
            } => cmd_pcap_analyse(&input, report, stdout, pretty, quiet),
        },
        Commands::Interfaces => cmd_interfaces(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(err.code)
        }
    }
}

fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
    code: u8,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
            code: 2,
        }
    }

    /// The controller can no longer be reached.
    fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            hint: None,
            code: 1,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(format!("{err:#}"), None)
    }
}

fn cmd_serve(args: ServeArgs) -> Result<(), CliError> {
    if args.queue_capacity == 0 {
        return Err(CliError::new(
            "queue capacity must be at least 1",
            Some("pass --queue-capacity with a positive value".to_string()),
        ));
    }

    let capture = CaptureConfig {
        queue_capacity: args.queue_capacity,
        read_timeout: Duration::from_millis(args.read_timeout_ms),
        forward_timeout: Duration::from_millis(args.forward_timeout_ms),
    };
    let config = ServeConfig {
        poll_interval: Duration::from_millis(args.poll_interval_ms.max(1)),
        capture: capture.clone(),
        version: VERSION.to_string(),
    };
    let backend: Arc<dyn CaptureBackend> = Arc::new(DatalinkBackend::new(capture.read_timeout));

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    }) {
        warn!("failed to install signal handler: {}", e);
    }

    let input = BufReader::new(io::stdin());
    serve(input, io::stdout(), config, backend, shutdown_rx)
        .map_err(|e| CliError::fatal(format!("output channel failed: {e}")))?;
    info!("agent stopped");
    Ok(())
}

fn cmd_interfaces() -> Result<(), CliError> {
    let interfaces = DatalinkBackend::default()
        .interfaces()
        .context("Failed to list interfaces")?;
    let json = serde_json::to_string(&Event::Interfaces { interfaces })
        .context("JSON serialization failed")?;
    println!("{}", json);
    Ok(())
}

fn cmd_pcap_analyse(
    input: &Path,
    report: Option<PathBuf>,
    stdout: bool,
    pretty: bool,
    quiet: bool,
) -> Result<(), CliError> {
    validate_input_file(input)?;
    let report = if stdout {
        None
    } else {
        Some(report.ok_or_else(|| {
            CliError::new(
                "missing output path",
                Some("use -o/--report or --stdout".to_string()),
            )
        })?)
    };

    if let Some(report_path) = report.as_ref() {
        ensure_distinct_output(input, report_path)?;
    }

    let rep = analyze_pcap_file(input).context("PCAP/PCAPNG analysis failed")?;
    let json = serialize_report(&rep, pretty)?;

    let Some(report) = report else {
        println!("{}", json);
        return Ok(());
    };

    if let Some(parent) = report.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
    }
    fs::write(&report, json)
        .with_context(|| format!("Failed to write report: {}", report.display()))?;

    if !quiet {
        eprintln!(
            "OK: {} frames analysed, report written -> {}",
            rep.packet_count,
            report.display()
        );
    }
    Ok(())
}

fn ensure_distinct_output(input: &Path, report_path: &Path) -> Result<(), CliError> {
    let input_abs = fs::canonicalize(input)
        .with_context(|| format!("Failed to resolve input path: {}", input.display()))?;
    let report_dir = match report_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::canonicalize(parent).ok(),
        _ => fs::canonicalize(".").ok(),
    };
    let (Some(report_dir), Some(name)) = (report_dir, report_path.file_name()) else {
        return Ok(());
    };
    if report_dir.join(name) == input_abs {
        return Err(CliError::new(
            format!(
                "report path must differ from input: {}",
                report_path.display()
            ),
            Some("choose a different output path".to_string()),
        ));
    }
    Ok(())
}

fn serialize_report(rep: &StatisticsReport, pretty: bool) -> Result<String, CliError> {
    let json = if pretty {
        serde_json::to_string_pretty(rep)
    } else {
        serde_json::to_string(rep)
    };
    json.context("JSON serialization failed").map_err(Into::into)
}

fn validate_input_file(input: &Path) -> Result<(), CliError> {
    if !input.exists() {
        return Err(CliError::new(
            format!("input file not found: {}", input.display()),
            Some("use a .pcap or .pcapng file".to_string()),
        ));
    }
    if !input.is_file() {
        return Err(CliError::new(
            format!("input is not a file: {}", input.display()),
            Some("use a .pcap or .pcapng file".to_string()),
        ));
    }
    let ext = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext != "pcap" && ext != "pcapng" {
        return Err(CliError::new(
            format!("unsupported input format '{}'", input.display()),
            Some("expected a .pcap or .pcapng file".to_string()),
        ));
    }
    Ok(())
}
