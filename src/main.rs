use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use xlog_decoder::container::ContainerKind;
use xlog_decoder::discover::{collect_candidates, output_path};
use xlog_decoder::recovery::{check_frame, find_next_start};
use xlog_decoder::session::{decode_with, AnchorPolicy, DecodeFailure, DecodeOptions, DecodeReport};
use xlog_decoder::FrameHeader;

#[derive(Parser)]
#[command(name = "xlog-decode", about = "Recovering decoder for xlog log files")]
struct Cli {
    /// Log debug events (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode one file, or every .xlog/.mmap3 file under a directory
    Decode {
        path: PathBuf,
        /// Output file (single-file mode only; default <stem>_.log)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        opts: OptionArgs,
        /// Print the session report as JSON
        #[arg(long)]
        report: bool,
    },
    /// Walk frame boundaries without decompressing
    Scan {
        input: PathBuf,
    },
}

#[derive(Args)]
struct OptionArgs {
    /// Start at offset 0 when no anchor is found instead of failing
    #[arg(long)]
    lenient: bool,
    /// Frames that must validate back to back to anchor a session
    #[arg(long, default_value = "2")]
    lookahead: usize,
    /// Tag written inside inline [F] markers
    #[arg(long, default_value = xlog_decoder::session::DEFAULT_SOURCE_TAG)]
    tag: String,
}

impl OptionArgs {
    fn to_options(&self) -> DecodeOptions {
        DecodeOptions {
            anchor:           if self.lenient { AnchorPolicy::Lenient } else { AnchorPolicy::Strict },
            anchor_lookahead: self.lookahead,
            source_tag:       self.tag.clone(),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {

        // ── Decode ───────────────────────────────────────────────────────────
        Commands::Decode { path, output, opts, report } => {
            let options = opts.to_options();
            if path.is_dir() {
                let files = collect_candidates(&path)?;
                let written = decode_all(&files, &options, report);
                println!("Decoded {} of {} file(s)", written.len(), files.len());
                for out in &written {
                    println!("- {}", out.display());
                }
            } else {
                let out = output.unwrap_or_else(|| output_path(&path));
                match decode_one_file(&path, &out, &options, report) {
                    Ok(()) => println!("Decoded: {}", out.display()),
                    Err(e) => {
                        eprintln!("Failed to decode {}: {e}", path.display());
                        std::process::exit(1);
                    }
                }
            }
        }

        // ── Scan ─────────────────────────────────────────────────────────────
        Commands::Scan { input } => {
            let bytes = std::fs::read(&input)?;
            println!("{:>10} {:>5} {:>6} {:>5} {:>10}  Compression", "Offset", "Magic", "Seq", "Hours", "Length");
            let mut offset = 0usize;
            while offset < bytes.len() {
                match check_frame(&bytes, offset) {
                    Ok(next) => {
                        let h = FrameHeader::read(&bytes[offset..])?;
                        println!("{:>10} {:>5} {:>6} {:>2}-{:<2} {:>10}  {}",
                            offset,
                            format!("{:02x}", h.format.magic),
                            h.sequence, h.begin_hour, h.end_hour,
                            h.payload_len, h.format.compression);
                        offset = next;
                    }
                    Err(fault) => {
                        println!("{:>10} !! {fault}", offset);
                        match find_next_start(&bytes, offset, 1) {
                            Some(found) => {
                                println!("{:>10} .. {} byte(s) skipped", found, found - offset);
                                offset = found;
                            }
                            None => {
                                println!("{:>10} .. no further frames ({} byte(s) left)", offset, bytes.len() - offset);
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// Decode one input and write its output.  Errors are reported as strings so
/// directory mode can log them and move on.
fn decode_one_file(input: &Path, out: &Path, options: &DecodeOptions, report: bool) -> Result<(), String> {
    let bytes = std::fs::read(input).map_err(|e| DecodeFailure::Io(e).to_string())?;
    let kind = ContainerKind::detect(&bytes);
    if !kind.try_xlog() {
        tracing::warn!(path = %input.display(), "ZIP container, extraction is not supported");
        return Err("input is a ZIP container".into());
    }
    if kind == ContainerKind::Unknown {
        let head = &bytes[..bytes.len().min(8)];
        tracing::info!(path = %input.display(), head = %hex::encode(head), "unrecognised leading bytes, trying xlog anyway");
    }

    let decoded = decode_with(&bytes, options).map_err(|e| e.to_string())?;
    std::fs::write(out, &decoded.output).map_err(|e| e.to_string())?;
    tracing::info!(path = %input.display(), summary = %decoded.report.summary(), "decoded");
    if report {
        print_report(input, &decoded.report);
    }
    Ok(())
}

fn print_report(input: &Path, report: &DecodeReport) {
    let json = serde_json::json!({ "input": input.display().to_string(), "report": report });
    println!("{json}");
}

/// Decode every file; each gets its own session.  Returns written outputs.
fn decode_all(files: &[PathBuf], options: &DecodeOptions, report: bool) -> Vec<PathBuf> {
    let run = |input: &PathBuf| -> Option<PathBuf> {
        let out = output_path(input);
        match decode_one_file(input, &out, options, report) {
            Ok(()) => Some(out),
            Err(e) => {
                eprintln!("Error processing {}: {e}", input.display());
                None
            }
        }
    };

    #[cfg(feature = "parallel")]
    let written = {
        use rayon::prelude::*;
        files.par_iter().filter_map(run).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let written = files.iter().filter_map(run).collect();

    written
}
