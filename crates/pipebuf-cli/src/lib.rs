use std::io::{self, Write};

use clap::error::ErrorKind;
use clap::{CommandFactory, FromArgMatches, Parser};
use pipebuf_core::{
    BackingMode, PipeBuffer, PipeBufferConfig, RunReport, TelemetryEvent, TelemetrySink,
    TransferProgressEvent,
};
use tracing_subscriber::EnvFilter;

const ANSI_UP: &str = "\x1b[A";
const ANSI_DOWN_BACK: &str = "\x1b[B\r";
const ANSI_CLEAR: &str = "\x1b[K";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Buffer a pipe so a fast producer is never stalled by a slow consumer",
    long_about = "Reads standard input into fixed-size chunks and writes them to standard \
                  output in order from a second thread. Takes no arguments."
)]
struct Cli {}

/// Binary name for `mode`.
pub fn binary_name(mode: BackingMode) -> &'static str {
    match mode {
        BackingMode::Memory => "writebuffer",
        BackingMode::Spill => "fwritebuffer",
    }
}

/// One-line usage shown when the binary is given arguments.
pub fn usage(mode: BackingMode) -> &'static str {
    match mode {
        BackingMode::Memory => "command | writebuffer > file",
        BackingMode::Spill => "command | writebuffer | fwritebuffer > file",
    }
}

/// Line printed to stderr before exiting 1 on unexpected arguments.
pub fn usage_line(mode: BackingMode) -> String {
    format!("Use: {}", usage(mode))
}

fn command(mode: BackingMode) -> clap::Command {
    Cli::command()
        .name(binary_name(mode))
        .override_usage(usage(mode))
}

/// Parses `args` (program name first) for the binary running in `mode`.
pub fn check_args<I, T>(mode: BackingMode, args: I) -> Result<(), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = command(mode).try_get_matches_from(args)?;
    Cli::from_arg_matches(&matches).map(|_| ())
}

/// Entry point shared by both binaries; never returns on failure.
pub fn main_for(mode: BackingMode) {
    if let Err(error) = check_args(mode, std::env::args_os()) {
        match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => error.exit(),
            _ => {
                eprintln!("{}", usage_line(mode));
                std::process::exit(1);
            }
        }
    }

    init_logging();

    if let Err(error) = run(mode) {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(true)
        .try_init();
}

fn run(mode: BackingMode) -> anyhow::Result<()> {
    let buffer = PipeBuffer::new(PipeBufferConfig::for_mode(mode))?;
    let input = io::stdin().lock();
    let output = io::stdout();
    let (_output, report) = buffer.run(input, output, ProgressReporter::new(io::stderr()))?;
    tracing::debug!(
        bytes = report.bytes_written,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "transfer finished"
    );
    Ok(())
}

/// Renders progress events as a single status line rewritten in place.
///
/// Memory mode draws one line above the cursor and file mode two, so that
/// `cmd | writebuffer | fwritebuffer > out` stacks both displays.
pub struct ProgressReporter<E> {
    out: E,
    exit_on_failure: bool,
}

impl<E: Write + Send> ProgressReporter<E> {
    pub fn new(out: E) -> Self {
        Self {
            out,
            exit_on_failure: true,
        }
    }

    /// Keeps the process alive on `WriterFailed` and leaves the error to the caller.
    pub fn without_exit(out: E) -> Self {
        Self {
            out,
            exit_on_failure: false,
        }
    }

    pub fn into_inner(self) -> E {
        self.out
    }

    fn draw(&mut self, event: &TransferProgressEvent) {
        let line = progress_line(event);
        // The display is best effort; a closed stderr must not stop the transfer.
        let _ = self.out.write_all(line.as_bytes());
        let _ = self.out.flush();
    }

    fn finish(&mut self, report: &RunReport) {
        tracing::info!(
            mode = report.mode.label(),
            written = %format_bytes(report.bytes_written),
            rate = %format_rate(report.write_bps()),
            "buffer drained"
        );
    }
}

impl<E: Write + Send> TelemetrySink for ProgressReporter<E> {
    fn on_event(&mut self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::Progress(progress) => self.draw(&progress),
            TelemetryEvent::Completed(report) => self.finish(&report),
            TelemetryEvent::WriterFailed { message } => {
                let _ = writeln!(self.out, "error: {message}");
                if self.exit_on_failure {
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Status line for one progress event, cursor movement included.
pub fn progress_line(event: &TransferProgressEvent) -> String {
    let buffered = format_bytes(event.buffered_bytes);
    let written = format_bytes(event.bytes_written);
    match event.mode {
        BackingMode::Memory => format!(
            "{ANSI_UP}(mem)  buffer: {buffered}    written: {written}{ANSI_CLEAR}{ANSI_DOWN_BACK}"
        ),
        BackingMode::Spill => format!(
            "{ANSI_UP}{ANSI_UP}(file) buffer: {buffered}    written: {written}{ANSI_CLEAR}{ANSI_DOWN_BACK}{ANSI_DOWN_BACK}"
        ),
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

fn format_rate(bytes_per_second: f64) -> String {
    if !bytes_per_second.is_finite() || bytes_per_second <= 0.0 {
        return "0 B/s".to_string();
    }
    format!("{}/s", format_bytes(bytes_per_second as u64))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pipebuf_core::Disposition;

    use super::*;

    fn progress(mode: BackingMode, buffered_bytes: u64, bytes_written: u64) -> TransferProgressEvent {
        TransferProgressEvent {
            mode,
            elapsed: Duration::from_millis(5),
            chunk_capacity: 16 * 1024 * 1024,
            chunks_allocated: 2,
            buffered_bytes,
            pending_chunks: 1,
            chunks_written: 1,
            bytes_written,
            disposition: Disposition::Recycled,
        }
    }

    #[test]
    fn memory_line_moves_up_once() {
        let line = progress_line(&progress(BackingMode::Memory, 32 * 1024 * 1024, 1024));
        assert_eq!(
            line,
            "\x1b[A(mem)  buffer: 32.00 MiB    written: 1.00 KiB\x1b[K\x1b[B\r"
        );
    }

    #[test]
    fn file_line_moves_up_twice() {
        let line = progress_line(&progress(BackingMode::Spill, 0, 512));
        assert!(line.starts_with("\x1b[A\x1b[A(file) buffer: 0 B    written: 512 B"));
        assert!(line.ends_with("\x1b[K\x1b[B\r\x1b[B\r"));
    }

    #[test]
    fn format_bytes_picks_binary_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.50 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GiB");
        assert_eq!(format_rate(0.0), "0 B/s");
    }

    #[test]
    fn reporter_renders_progress_and_keeps_running_on_failure() {
        let mut reporter = ProgressReporter::without_exit(Vec::new());
        reporter.on_event(TelemetryEvent::Progress(progress(BackingMode::Memory, 0, 4)));
        reporter.on_event(TelemetryEvent::WriterFailed {
            message: "broken pipe".to_string(),
        });

        let rendered = String::from_utf8(reporter.into_inner()).expect("utf8");
        assert!(rendered.contains("(mem)  buffer: 0 B    written: 4 B"));
        assert!(rendered.ends_with("error: broken pipe\n"));
    }

    #[test]
    fn extra_arguments_are_rejected() {
        let error = check_args(BackingMode::Memory, ["writebuffer", "extra"])
            .expect_err("positional arguments must be rejected");
        assert_eq!(error.kind(), ErrorKind::UnknownArgument);

        let error = check_args(BackingMode::Spill, ["fwritebuffer", "--chunk-size", "4"])
            .expect_err("unknown flags must be rejected");
        assert_eq!(error.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn bare_invocation_and_help_are_accepted() {
        assert!(check_args(BackingMode::Memory, ["writebuffer"]).is_ok());

        let help = check_args(BackingMode::Spill, ["fwritebuffer", "--help"])
            .expect_err("help is reported through clap");
        assert_eq!(help.kind(), ErrorKind::DisplayHelp);
        assert!(help.to_string().contains(usage(BackingMode::Spill)));
    }

    #[test]
    fn usage_line_names_the_pipeline_shape() {
        assert_eq!(
            usage_line(BackingMode::Memory),
            "Use: command | writebuffer > file"
        );
        assert_eq!(
            usage_line(BackingMode::Spill),
            "Use: command | writebuffer | fwritebuffer > file"
        );
    }
}
