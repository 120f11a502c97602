//! treecopy - Command-line interface for the tree copy engine.
//!
//! Argument parsing, console progress and an optional JSON report.

use clap::Parser;
use engine::{
    CopierStrategy, CopyListener, CopyOptions, CopyReport, Difference, FilterSpec, NextFile,
    PostCopyCommand, ProcessStream, TreeCopier, DEFAULT_BUFFER_SIZE,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// treecopy - Mirror a file or directory tree into a target directory
#[derive(Parser, Debug)]
#[command(name = "treecopy")]
#[command(version = "0.1.0")]
#[command(about = "Copy files and directory trees with filters and change detection")]
struct Args {
    /// Source file or directory
    #[arg(long, value_name = "PATH")]
    src: PathBuf,

    /// Target root directory
    #[arg(long, value_name = "PATH")]
    dst: PathBuf,

    /// Replace files that already exist in the target
    #[arg(long)]
    overwrite: bool,

    /// Change detection when overwriting: ignore, modified, or size
    #[arg(long, value_name = "POLICY", default_value = "ignore")]
    difference: String,

    /// Descend into subdirectories
    #[arg(long)]
    recursive: bool,

    /// Create the target root if it does not exist
    #[arg(long)]
    create_target: bool,

    /// Show what would be copied without touching the filesystem
    #[arg(long)]
    dry_run: bool,

    /// Only copy files matching these wildcards (e.g. "*.jpg|*.png")
    #[arg(long, value_name = "PATTERNS", conflicts_with = "exclude")]
    include: Option<String>,

    /// Never copy files matching these wildcards (e.g. "*.tmp|~*")
    #[arg(long, value_name = "PATTERNS")]
    exclude: Option<String>,

    /// Overlap reads and writes using two buffers
    #[arg(long)]
    double_buffer: bool,

    /// Chunk size in bytes
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Program to run after a copy that was not cancelled
    #[arg(long, value_name = "PROGRAM")]
    exec: Option<PathBuf>,

    /// Argument passed to the post-copy program (repeatable)
    #[arg(long, value_name = "ARG", requires = "exec", allow_hyphen_values = true)]
    exec_arg: Vec<String>,

    /// Write the final report as JSON to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

/// Console listener displaying copy progress
struct CliListener {
    verbose: bool,
    start_time: Instant,
    last_progress_update: Mutex<Instant>,
}

impl CliListener {
    fn new(verbose: bool) -> Self {
        let now = Instant::now();
        CliListener {
            verbose,
            start_time: now,
            last_progress_update: Mutex::new(now),
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn progress_bar(percent: u32) -> String {
        let filled = (percent.min(100) / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }
}

impl CopyListener for CliListener {
    fn on_next_file(&self, event: &mut NextFile) {
        if self.verbose {
            eprintln!(
                "[{:3}/{}] {} -> {}",
                event.index() + 1,
                event.total(),
                Self::file_name(event.source_path()),
                event.target_path.display()
            );
        }
    }

    fn on_chunk_copied(&self, file_size: u64, bytes_copied: u64) {
        // Throttle progress updates to avoid spam (max once per 200ms)
        let mut last = match self.last_progress_update.lock() {
            Ok(last) => last,
            Err(poisoned) => poisoned.into_inner(),
        };
        if bytes_copied < file_size && last.elapsed().as_millis() < 200 {
            return;
        }
        *last = Instant::now();

        let total = file_size.max(1);
        let percent = (bytes_copied as f64 / total as f64 * 100.0) as u32;
        eprint!(
            "\rProgress: {} | {}/{}",
            Self::progress_bar(percent),
            Self::format_bytes(bytes_copied),
            Self::format_bytes(file_size)
        );
        let _ = std::io::Write::flush(&mut std::io::stderr());
    }

    fn on_copy_ended(&self, report: &CopyReport) {
        eprintln!();
        if report.aborted() {
            eprintln!("Copy aborted.");
            return;
        }
        if report.cancelled() {
            eprintln!("Copy cancelled.");
        } else {
            eprintln!("Copy complete!");
        }

        let started = report.begin_time().with_timezone(&chrono::Local);
        eprintln!("Started: {}", started.format("%Y-%m-%d %H:%M:%S"));
        eprintln!(
            "Summary: {} copied, {} skipped, {} failed",
            report.successes().len(),
            report.skips().len(),
            report.failures().len()
        );
        eprintln!("Bytes copied: {}", Self::format_bytes(report.total_bytes_copied()));
        let elapsed = report.elapsed().to_std().unwrap_or_else(|_| self.start_time.elapsed());
        eprintln!("Elapsed: {}", Self::format_duration(elapsed));

        if self.verbose && !report.skips().is_empty() {
            eprintln!();
            eprintln!("Skipped files:");
            for file in report.skips() {
                let reason = file
                    .skip_reason()
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "(unknown)".to_string());
                eprintln!("  {}: {}", Self::file_name(&file.source_path), reason);
            }
        }

        if let Some(file) = report.interrupted() {
            eprintln!("Interrupted: {}", file.source_path.display());
        }

        if report.has_failures() {
            eprintln!();
            eprintln!("Failed files:");
            for file in report.failures() {
                let name = Self::file_name(&file.source_path);
                match file.error_message() {
                    Some(msg) => eprintln!("  {}: {}", name, msg),
                    None => eprintln!("  {}: (unknown error)", name),
                }
            }
        }
    }

    fn on_process_output(&self, line: &str, stream: ProcessStream) {
        match stream {
            ProcessStream::Stdout => println!("{}", line),
            ProcessStream::Stderr => eprintln!("{}", line),
        }
    }

    fn on_process_ended(&self, exit_code: Option<i32>) {
        match exit_code {
            Some(code) => eprintln!("Post-copy process exited with code {}", code),
            None => eprintln!("Post-copy process terminated by a signal"),
        }
    }
}

/// Parse command-line arguments, run the copy and map the result to an exit code
fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let exit_code = match run_cli(&args) {
        Ok(report) if report.has_failures() || report.cancelled() => 1,
        Ok(_) => 0,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// `RUST_LOG` wins over the `--verbose` default.
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_difference(value: &str) -> Result<Difference, String> {
    match value.to_lowercase().as_str() {
        "ignore" => Ok(Difference::Ignore),
        "modified" | "last-modified" | "mtime" => Ok(Difference::LastModifiedDate),
        "size" => Ok(Difference::Size),
        _ => Err(format!(
            "Invalid difference policy '{}'. Must be 'ignore', 'modified', or 'size'",
            value
        )),
    }
}

fn build_options(args: &Args) -> Result<CopyOptions, String> {
    if args.buffer_size == 0 {
        return Err("Buffer size must be greater than zero".to_string());
    }

    let mut options = CopyOptions::new(&args.src, &args.dst);
    options.overwrite = args.overwrite;
    options.difference = parse_difference(&args.difference)?;
    options.recursive = args.recursive;
    options.create_target = args.create_target;
    options.dry_run = args.dry_run;
    options.buffer_size = args.buffer_size;
    options.filter = match (&args.include, &args.exclude) {
        (Some(patterns), _) => FilterSpec::whitelist(patterns.as_str()),
        (None, Some(patterns)) => FilterSpec::blacklist(patterns.as_str()),
        (None, None) => FilterSpec::default(),
    };
    options.post_copy = args.exec.as_ref().map(|program| PostCopyCommand {
        program: program.clone(),
        args: args.exec_arg.clone(),
    });
    Ok(options)
}

fn write_report(path: &Path, report: &CopyReport) -> Result<(), String> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| format!("Failed to serialize report: {}", e))?;
    std::fs::write(path, json)
        .map_err(|e| format!("Failed to write report {}: {}", path.display(), e))?;
    tracing::info!(path = %path.display(), "Wrote report");
    Ok(())
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> Result<CopyReport, String> {
    let options = build_options(args)?;

    let strategy = if args.double_buffer {
        CopierStrategy::DoubleBuffer
    } else {
        CopierStrategy::SingleBuffer
    };
    let mut copier = TreeCopier::new(strategy);
    copier.add_listener(Box::new(CliListener::new(args.verbose)));

    let report = copier
        .copy(&options)
        .map_err(|e| format!("Copy failed: {}", e.detailed_message()))?;

    if let Some(path) = &args.report {
        write_report(path, &report)?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(src: &Path, dst: &Path) -> Args {
        Args {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            overwrite: false,
            difference: "ignore".to_string(),
            recursive: false,
            create_target: false,
            dry_run: false,
            include: None,
            exclude: None,
            double_buffer: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            exec: None,
            exec_arg: Vec::new(),
            report: None,
            verbose: false,
        }
    }

    #[test]
    fn test_cli_with_valid_directories() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("test.txt"), "hello").expect("Failed to write file");

        let report = run_cli(&args(src_dir.path(), dst_dir.path())).expect("CLI should succeed");
        assert_eq!(report.successes().len(), 1);
        assert!(!report.has_failures());
        assert_eq!(
            std::fs::read_to_string(dst_dir.path().join("test.txt")).unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_cli_recursive_double_buffer_with_exclude() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let target = dst_dir.path().join("out");
        std::fs::create_dir_all(src_dir.path().join("nested")).unwrap();
        std::fs::write(src_dir.path().join("nested/keep.txt"), "keep").unwrap();
        std::fs::write(src_dir.path().join("drop.tmp"), "drop").unwrap();

        let mut cli_args = args(src_dir.path(), &target);
        cli_args.recursive = true;
        cli_args.create_target = true;
        cli_args.double_buffer = true;
        cli_args.buffer_size = 2;
        cli_args.exclude = Some("*.tmp".to_string());

        let report = run_cli(&cli_args).expect("CLI should succeed");
        assert_eq!(report.successes().len(), 1);
        assert!(target.join("nested/keep.txt").exists());
        assert!(!target.join("drop.tmp").exists());
    }

    #[test]
    fn test_cli_include_acts_as_whitelist() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("a.jpg"), "a").unwrap();
        std::fs::write(src_dir.path().join("b.txt"), "b").unwrap();

        let mut cli_args = args(src_dir.path(), dst_dir.path());
        cli_args.include = Some("*.jpg".to_string());

        let report = run_cli(&cli_args).expect("CLI should succeed");
        assert_eq!(report.successes().len(), 1);
        assert!(dst_dir.path().join("a.jpg").exists());
        assert!(!dst_dir.path().join("b.txt").exists());
    }

    #[test]
    fn test_cli_dry_run_writes_nothing() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let target = dst_dir.path().join("out");
        std::fs::write(src_dir.path().join("test.txt"), "hello").unwrap();

        let mut cli_args = args(src_dir.path(), &target);
        cli_args.create_target = true;
        cli_args.dry_run = true;

        let report = run_cli(&cli_args).expect("CLI should succeed");
        assert_eq!(report.total_bytes_copied(), 0);
        assert!(!target.exists());
    }

    #[test]
    fn test_cli_writes_json_report() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let report_dir = TempDir::new().expect("Failed to create temp dir");
        let report_path = report_dir.path().join("report.json");
        std::fs::write(src_dir.path().join("test.txt"), "hello").unwrap();

        let mut cli_args = args(src_dir.path(), dst_dir.path());
        cli_args.report = Some(report_path.clone());
        run_cli(&cli_args).expect("CLI should succeed");

        let json = std::fs::read_to_string(&report_path).expect("report should exist");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");
        assert_eq!(value["successes"].as_array().map(|a| a.len()), Some(1));
        assert_eq!(value["total_bytes_copied"], 5);
        assert_eq!(value["cancelled"], false);
    }

    #[test]
    fn test_cli_reports_file_failures() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("test.txt"), "hello").unwrap();

        let cli_args = args(src_dir.path(), &dst_dir.path().join("missing"));
        let report = run_cli(&cli_args).expect("run completes");
        assert!(report.has_failures());
    }

    #[test]
    fn test_cli_rejects_missing_source() {
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let cli_args = args(Path::new("/nonexistent/path"), dst_dir.path());
        assert!(run_cli(&cli_args).is_err(), "CLI should reject missing source");
    }

    #[test]
    fn test_cli_rejects_invalid_difference() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let mut cli_args = args(src_dir.path(), dst_dir.path());
        cli_args.difference = "checksum".to_string();
        assert!(run_cli(&cli_args).is_err(), "CLI should reject invalid difference");
    }

    #[test]
    fn test_cli_rejects_zero_buffer() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let mut cli_args = args(src_dir.path(), dst_dir.path());
        cli_args.buffer_size = 0;
        assert!(run_cli(&cli_args).is_err(), "CLI should reject a zero buffer size");
    }

    #[test]
    fn test_parse_difference_aliases() {
        assert_eq!(parse_difference("Size"), Ok(Difference::Size));
        assert_eq!(parse_difference("modified"), Ok(Difference::LastModifiedDate));
        assert_eq!(parse_difference("IGNORE"), Ok(Difference::Ignore));
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(CliListener::format_bytes(512), "512.00 B");
        assert_eq!(CliListener::format_bytes(2048), "2.00 KB");
        assert_eq!(CliListener::format_duration(Duration::from_secs(3725)), "1h 2m 5s");
        assert_eq!(CliListener::progress_bar(50), "[==========          ] 50%");
    }

    #[test]
    fn test_args_parse_from_command_line() {
        let parsed = Args::try_parse_from([
            "treecopy",
            "--src",
            "a",
            "--dst",
            "b",
            "--exec",
            "echo",
            "--exec-arg",
            "-n",
            "--exec-arg",
            "done",
        ])
        .expect("should parse");
        assert_eq!(parsed.exec_arg, vec!["-n", "done"]);

        let conflict = Args::try_parse_from([
            "treecopy", "--src", "a", "--dst", "b", "--include", "*.a", "--exclude", "*.b",
        ]);
        assert!(conflict.is_err());
    }
}
