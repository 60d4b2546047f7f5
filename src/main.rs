//! CLI entry point for `emlparse`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use emlparse::config::{self, Config};
use emlparse::model::address::{display_list, Address};
use emlparse::{parse_eml, Message, ParseOptions, Parsed};

#[derive(Parser)]
#[command(name = "emlparse", version, about = "Inspect and extract .eml email messages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Record malformed address headers as warnings instead of failing
    #[arg(long, global = true)]
    ignore_header_errors: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a message summary and its text body
    Show {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print every header of a message, decoded
    Headers { path: PathBuf },
    /// Extract the attachments of a message
    Attachments {
        path: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Parse many messages and report totals
    Scan {
        /// Files or directories (searched recursively for *.eml)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config {
        /// Save it to the configuration file
        #[arg(long)]
        write: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level, &config);

    if cli.ignore_header_errors {
        config.parser.ignore_header_errors = true;
    }

    match cli.command {
        Commands::Show { path, json } => cmd_show(&path, json, &config.parser),
        Commands::Headers { path } => cmd_headers(&path, &config.parser),
        Commands::Attachments { path, output } => {
            let output = output
                .or_else(|| config.export.default_output_dir.clone())
                .unwrap_or_else(|| PathBuf::from("."));
            cmd_attachments(&path, &output, &config.parser)
        }
        Commands::Scan { paths, json } => cmd_scan(&paths, json, &config.parser),
        Commands::Config { write } => cmd_config(&config, write),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "emlparse.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "emlparse", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

fn cmd_show(path: &Path, json: bool, options: &ParseOptions) -> anyhow::Result<()> {
    let parsed = parse_eml(path, options)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&message_json(&parsed))?);
        return Ok(());
    }

    let msg = &parsed.message;
    println!();
    print_field("Message-ID", &msg.message_id);
    print_field("Id", &msg.id);
    print_field(
        "Date",
        &msg.date.map(|d| d.to_rfc2822()).unwrap_or_default(),
    );
    print_field("From", &display_list(&msg.from));
    if let Some(sender) = &msg.sender {
        print_field("Sender", &sender.to_string());
    }
    print_field("To", &display_list(&msg.to));
    print_field("Cc", &display_list(&msg.cc));
    print_field("Subject", &msg.subject);
    print_field("Content-Type", &msg.content_type);
    print_field("Parts", &msg.parts.len().to_string());

    for att in &msg.attachments {
        println!(
            "  {:<14} {} ({}, {})",
            "Attachment",
            att.filename,
            att.content_type,
            format_size(att.size(), BINARY)
        );
    }
    for warning in &parsed.warnings {
        println!("  {:<14} {warning}", "Warning");
    }

    println!();
    println!("{}", msg.text_lossy());
    Ok(())
}

fn cmd_headers(path: &Path, options: &ParseOptions) -> anyhow::Result<()> {
    let parsed = parse_eml(path, options)?;
    for header in &parsed.message.full_headers {
        println!("{}: {}", header.key, header.value);
    }
    Ok(())
}

fn cmd_attachments(path: &Path, output: &Path, options: &ParseOptions) -> anyhow::Result<()> {
    let parsed = parse_eml(path, options)?;
    if !parsed.message.has_attachments() {
        println!("  No attachments found.");
        return Ok(());
    }

    let paths = emlparse::export::attachment::export_attachments(&parsed.message, output)?;
    for p in &paths {
        println!("  {}", p.display());
    }
    println!(
        "  Extracted {} attachment(s) to {}",
        paths.len(),
        output.display()
    );
    Ok(())
}

/// Totals reported by `scan`.
#[derive(Debug, Default, serde::Serialize)]
struct ScanStats {
    files: usize,
    parsed: usize,
    failed: usize,
    warnings: usize,
    attachments: usize,
    attachment_bytes: u64,
    input_bytes: u64,
    elapsed_ms: u64,
    failures: Vec<ScanFailure>,
}

#[derive(Debug, serde::Serialize)]
struct ScanFailure {
    path: String,
    error: String,
}

fn cmd_scan(paths: &[PathBuf], json: bool, options: &ParseOptions) -> anyhow::Result<()> {
    let mut files = Vec::new();
    for path in paths {
        if !path.exists() {
            anyhow::bail!("File not found: {}", path.display());
        }
        collect_eml_files(path, &mut files)?;
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Parsing [{bar:40.cyan/blue}] {pos}/{len}")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let mut stats = ScanStats {
        files: files.len(),
        ..ScanStats::default()
    };

    for file in &files {
        if let Ok(meta) = std::fs::metadata(file) {
            stats.input_bytes += meta.len();
        }
        match parse_eml(file, options) {
            Ok(parsed) => {
                stats.parsed += 1;
                stats.warnings += parsed.warnings.len();
                stats.attachments += parsed.message.attachments.len();
                stats.attachment_bytes += parsed
                    .message
                    .attachments
                    .iter()
                    .map(|a| a.size())
                    .sum::<u64>();
            }
            Err(e) => {
                tracing::warn!(path = %file.display(), error = %e, "Failed to parse message");
                stats.failed += 1;
                stats.failures.push(ScanFailure {
                    path: file.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    stats.elapsed_ms = start.elapsed().as_millis() as u64;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("  {:<20} {}", "Files", stats.files);
    println!("  {:<20} {}", "Parsed", stats.parsed);
    println!("  {:<20} {}", "Failed", stats.failed);
    println!("  {:<20} {}", "Warnings", stats.warnings);
    println!(
        "  {:<20} {} ({})",
        "Attachments",
        stats.attachments,
        format_size(stats.attachment_bytes, BINARY)
    );
    println!(
        "  {:<20} {}",
        "Input size",
        format_size(stats.input_bytes, BINARY)
    );
    println!("  {:<20} {} ms", "Time", stats.elapsed_ms);
    for failure in &stats.failures {
        println!("    {}: {}", failure.path, failure.error);
    }
    println!();
    Ok(())
}

fn cmd_config(config: &Config, write: bool) -> anyhow::Result<()> {
    if write {
        let path = config::save_config(config)?;
        println!("  Saved configuration to {}", path.display());
        return Ok(());
    }
    if let Some(path) = config::config_file_path() {
        println!("# {}", path.display());
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Add `path` itself, or every `.eml` file below it.
fn collect_eml_files(path: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    if path.is_file() {
        out.push(path.to_path_buf());
        return Ok(());
    }

    let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for entry in entries {
        if entry.is_dir() {
            collect_eml_files(&entry, out)?;
        } else if entry
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("eml"))
        {
            out.push(entry);
        }
    }
    Ok(())
}

fn print_field(label: &str, value: &str) {
    if !value.is_empty() {
        println!("  {label:<14} {value}");
    }
}

fn addresses_json(addresses: &[Address]) -> serde_json::Value {
    serde_json::to_value(addresses).unwrap_or(serde_json::Value::Null)
}

/// JSON view of a parsed message for `show --json`.
fn message_json(parsed: &Parsed) -> serde_json::Value {
    let msg: &Message = &parsed.message;
    serde_json::json!({
        "message_id": msg.message_id,
        "id": msg.id,
        "date": msg.date.map(|d| d.to_rfc3339()),
        "sender": msg.sender.as_ref().map(|s| s.to_string()),
        "from": addresses_json(&msg.from),
        "reply_to": addresses_json(&msg.reply_to),
        "to": addresses_json(&msg.to),
        "cc": addresses_json(&msg.cc),
        "bcc": addresses_json(&msg.bcc),
        "subject": msg.subject,
        "content_type": msg.content_type,
        "comments": msg.comments,
        "keywords": msg.keywords,
        "in_reply_to": msg.in_reply_to,
        "references": msg.references,
        "headers": msg.full_headers,
        "text": msg.text_lossy(),
        "html": msg.html_lossy(),
        "parts": msg.parts.iter().map(|p| serde_json::json!({
            "media_type": p.media_type,
            "charset": p.charset,
            "size": p.raw_data.len(),
        })).collect::<Vec<_>>(),
        "attachments": msg.attachments.iter().map(|a| serde_json::json!({
            "filename": a.filename,
            "content_type": a.content_type,
            "size": a.size(),
        })).collect::<Vec<_>>(),
        "warnings": parsed.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
    })
}
