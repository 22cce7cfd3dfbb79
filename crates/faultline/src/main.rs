use std::path::{Path, PathBuf};
use std::{fs, process, ptr};

use chrono::DateTime;
use clap::{Parser, Subcommand};
use faultline_core::config::{DEFAULT_SCAN_WINDOW_WORDS, HANDLER_FRAMES_TO_SKIP, MAX_SCAN_WINDOW_WORDS};
use faultline_core::platform::DynamicBackends;
use faultline_core::prelude::*;
use faultline_core::types::{Architecture, MAX_FRAMES};
use faultline_core::unwind::UnwindBackends;
use faultline_utils::{info, init_logging, init_logging_with_level, warn, LogFormat, LogLevel};

/// Host harness for the faultline native crash-capture engine.
#[derive(Parser, Debug)]
#[command(name = "faultline")]
#[command(version)]
#[command(about = "Install the faultline crash handler, provoke native faults and inspect the reports", long_about = None)]
struct Cli
{
    /// Log level, overriding RUST_LOG (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Log format used with --log-level (pretty or json)
    #[arg(long, global = true, default_value = "pretty")]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Install the crash handler and crash this process with a fatal signal
    Crash
    {
        /// Signal to die from (segv, bus, fpe, ill, trap, abrt or a number)
        #[arg(short, long, default_value = "segv", value_parser = parse_signal)]
        signal: FatalSignal,
        /// Directory reports are written to (default: FAULTLINE_STORAGE_DIR)
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Maximum number of raw frames to collect
        #[arg(long)]
        max_depth: Option<usize>,
        /// Stack words examined per manual-scan step
        #[arg(long)]
        scan_window: Option<usize>,
        /// Extra report metadata as section.key=value (repeatable)
        #[arg(short, long = "metadata", value_parser = parse_metadata)]
        metadata: Vec<(String, String, String)>,
    },
    /// List persisted crash reports in a directory
    Reports
    {
        /// Directory to list
        dir: PathBuf,
    },
    /// Show engine limits and which unwinding libraries this system provides
    Info,
}

fn parse_signal(value: &str) -> Result<FatalSignal, String>
{
    FatalSignal::parse(value).ok_or_else(|| format!("{value} is not a fatal signal"))
}

fn parse_metadata(value: &str) -> Result<(String, String, String), String>
{
    let (path, entry_value) = value
        .split_once('=')
        .ok_or_else(|| format!("expected section.key=value, got {value}"))?;
    let (section, key) = path
        .split_once('.')
        .ok_or_else(|| format!("expected section.key=value, got {value}"))?;
    Ok((section.to_string(), key.to_string(), entry_value.to_string()))
}

fn main()
{
    let cli = Cli::parse();

    // Without --log-level: RUST_LOG, FAULTLINE_LOG_FORMAT and FAULTLINE_LOG_FILE
    let logging = match cli.log_level {
        Some(level) => init_logging_with_level(level, cli.log_format),
        None => init_logging(),
    };
    if let Err(e) = logging {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_command(cli: Cli) -> Result<(), Box<dyn std::error::Error>>
{
    match cli.command {
        Commands::Crash {
            signal,
            dir,
            max_depth,
            scan_window,
            metadata,
        } => {
            let mut config = match dir {
                Some(dir) => CaptureConfig::new(dir),
                None => CaptureConfig::from_env()?,
            };
            if let Some(depth) = max_depth {
                config = config.with_max_depth(depth);
            }
            if let Some(window) = scan_window {
                config = config.with_scan_window(window);
            }

            let mut report_metadata = ReportMetadata::new()
                .with("app", "name", env!("CARGO_PKG_NAME"))
                .with("app", "version", env!("CARGO_PKG_VERSION"))
                .with("device", "arch", Architecture::current().name());
            for (section, key, value) in metadata {
                report_metadata.insert(section, key, value);
            }

            let storage_dir = config.storage_dir().to_path_buf();
            let handler = CrashHandler::install(config, report_metadata, JsonSerializer)?;
            info!(%signal, "crashing");
            println!("Crash handler installed, writing reports to {}", storage_dir.display());
            println!("Raising {signal}...");

            crash_now(signal);

            // Only reached if the previous disposition let the process survive.
            warn!(%signal, "process survived its own crash");
            handler.teardown();
            Ok(())
        }
        Commands::Reports { dir } => list_reports(&dir),
        Commands::Info => {
            print_engine_info();
            Ok(())
        }
    }
}

/// Die from `signal`. Segmentation faults are real; the rest are raised.
#[inline(never)]
fn crash_now(signal: FatalSignal)
{
    match signal {
        FatalSignal::Segv => {
            // SAFETY: deliberately not safe; this write faults with SEGV_MAPERR.
            unsafe { ptr::write_volatile(ptr::null_mut::<u32>(), 0xdead) };
        }
        _ => {
            // SAFETY: raise has no memory-safety preconditions.
            unsafe {
                libc::raise(signal.as_raw());
            }
        }
    }
}

fn list_reports(dir: &Path) -> Result<(), Box<dyn std::error::Error>>
{
    let mut reports: Vec<(i64, PathBuf, u64)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        // Report files are named after the unix second they were written in.
        let Some(timestamp) = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<i64>().ok())
        else {
            continue;
        };
        reports.push((timestamp, path, entry.metadata()?.len()));
    }
    reports.sort();

    if reports.is_empty() {
        println!("No crash reports in {}", dir.display());
        return Ok(());
    }

    println!("{} crash report(s) in {}:", reports.len(), dir.display());
    for (timestamp, path, size) in reports {
        let when = DateTime::from_timestamp(timestamp, 0)
            .map_or_else(|| timestamp.to_string(), |time| time.format("%Y-%m-%d %H:%M:%S UTC").to_string());
        println!("  {when}  {size:>8} bytes  {}", path.display());
    }
    Ok(())
}

fn print_engine_info()
{
    let backends = DynamicBackends;
    let available = |present: bool| if present { "available" } else { "not found" };

    println!("\nEngine Information:");
    println!("  Architecture: {}", Architecture::current());
    println!(
        "  Fatal Signals: {}",
        FatalSignal::ALL.iter().map(|signal| signal.name()).collect::<Vec<_>>().join(", ")
    );
    println!("  Max Frames: {MAX_FRAMES}");
    println!("  Scan Window: {DEFAULT_SCAN_WINDOW_WORDS} words (max {MAX_SCAN_WINDOW_WORDS})");
    println!("  Handler Frames Skipped: {HANDLER_FRAMES_TO_SKIP}");
    println!("  libunwind: {}", available(backends.full_unwinder().is_available()));
    println!("  libcorkscrew: {}", available(backends.legacy_backtrace().is_available()));
    println!("  Installed: {}", CrashHandler::is_installed());
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_metadata()
    {
        assert_eq!(
            parse_metadata("device.model=Pixel 7").unwrap(),
            ("device".to_string(), "model".to_string(), "Pixel 7".to_string())
        );
        assert_eq!(
            parse_metadata("app.flags=a=b").unwrap(),
            ("app".to_string(), "flags".to_string(), "a=b".to_string())
        );
        assert!(parse_metadata("novalue").is_err());
        assert!(parse_metadata("nosection=1").is_err());
    }

    #[test]
    fn test_parse_signal()
    {
        assert_eq!(parse_signal("abrt").unwrap(), FatalSignal::Abrt);
        assert!(parse_signal("hup").is_err());
    }

    #[test]
    fn test_cli_parses_crash_command()
    {
        let cli = Cli::try_parse_from(["faultline", "crash", "--signal", "bus", "--dir", "/tmp", "-m", "app.build=7"])
            .unwrap();
        match cli.command {
            Commands::Crash {
                signal, dir, metadata, ..
            } => {
                assert_eq!(signal, FatalSignal::Bus);
                assert_eq!(dir, Some(PathBuf::from("/tmp")));
                assert_eq!(metadata.len(), 1);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.log_level, None);
    }

    #[test]
    fn test_cli_parses_log_level()
    {
        let cli = Cli::try_parse_from(["faultline", "info", "--log-level", "debug", "--log-format", "json"]).unwrap();
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert_eq!(cli.log_format, LogFormat::Json);

        assert!(Cli::try_parse_from(["faultline", "--log-level", "loud", "info"]).is_err());
    }
}
