//! Glyph command-line tool
//!
//! Encodes an HTML page into a sequence of QR frames, decodes a captured
//! frame list back into the page, and inspects single frames.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use glyph_protocol::bundle::{TemplateType, WebBundle, decode_bundle};
use glyph_protocol::chunking::{SessionId, SessionState};
use glyph_protocol::config::{ProtocolConfig, ProtocolConfigBuilder};
use glyph_protocol::frame::ParsedFrame;
use glyph_protocol::render::FrameRenderer;
use glyph_protocol::session_store::SessionStore;
use glyph_protocol::transmission::encode_transmission;

/// Glyph QR transport tool
///
/// Moves small web bundles through sequences of scannable QR frames.
#[derive(Parser, Debug)]
#[command(name = "glyph")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "GLYPH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format (plain, json)
    #[arg(long, global = true, env = "GLYPH_LOG_FORMAT", default_value = "plain")]
    log_format: String,

    /// JSON configuration file
    #[arg(long, global = true, env = "GLYPH_CONFIG")]
    config: Option<PathBuf>,

    /// Base64 characters per chunk (overrides the configuration file)
    #[arg(long, global = true, env = "GLYPH_MAX_CHUNK_BYTES")]
    max_chunk_bytes: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode an HTML page into frames and QR images
    Encode(EncodeArgs),
    /// Reassemble a list of scanned frames into the page
    Decode(DecodeArgs),
    /// Describe a single scanned frame
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// HTML file to encode ("-" for stdin)
    input: PathBuf,

    /// Bundle title
    #[arg(short, long)]
    title: String,

    /// Template type (trivia, article, art, adventure, or any tag)
    #[arg(long)]
    template: Option<String>,

    /// Session id (generated when omitted)
    #[arg(long)]
    session_id: Option<String>,

    /// Output directory for frames.txt and PNG images
    #[arg(short, long, default_value = "glyph-out")]
    out_dir: PathBuf,

    /// Write frames.txt only, without PNG images
    #[arg(long)]
    no_render: bool,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// File with one scanned frame per line ("-" for stdin)
    frames: PathBuf,

    /// Write the HTML of the first decoded bundle here
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// The frame text
    frame: String,
}

fn setup_logging(log_level: &str, log_format: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Logs go to stderr; stdout carries command output.
    match log_format.to_lowercase().as_str() {
        "json" => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set subscriber")?;
        }
        _ => {
            let subscriber = fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .with_target(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("Failed to set subscriber")?;
        }
    }

    Ok(())
}

/// Build protocol configuration from the config file and CLI overrides
fn build_config(path: Option<&Path>, max_chunk_bytes: Option<usize>) -> Result<ProtocolConfig> {
    let base = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            ProtocolConfig::from_json(&text)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => ProtocolConfig::default(),
    };

    let mut builder = ProtocolConfigBuilder::from_config(base);
    if let Some(bytes) = max_chunk_bytes {
        builder = builder.with_max_chunk_bytes(bytes);
    }

    builder.build_validated().context("Invalid configuration")
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        Ok(text)
    } else {
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

fn run_encode(args: &EncodeArgs, config: &ProtocolConfig) -> Result<serde_json::Value> {
    let html = read_input(&args.input)?;
    let bundle = WebBundle::new(
        args.title.clone(),
        html,
        args.template.as_deref().map(TemplateType::from),
    );
    let session_id = match &args.session_id {
        Some(id) => SessionId::new(id.clone()).context("Invalid session id")?,
        None => SessionId::generate(),
    };

    let transmission =
        encode_transmission(&bundle, session_id, config).context("Failed to encode bundle")?;

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Failed to create {}", args.out_dir.display()))?;
    let frames_path = args.out_dir.join("frames.txt");
    let mut listing = transmission.frame_strings().join("\n");
    listing.push('\n');
    fs::write(&frames_path, listing)
        .with_context(|| format!("Failed to write {}", frames_path.display()))?;

    let rendered = if args.no_render {
        None
    } else {
        let renderer = FrameRenderer::new(config.render.clone());
        let rendered = transmission
            .render(&renderer)
            .context("Failed to render frames")?;
        for (i, frame) in rendered.iter().enumerate() {
            let path = args.out_dir.join(format!("frame-{i:03}.png"));
            fs::write(&path, &frame.png)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        Some(rendered)
    };

    let summary = transmission.summary(rendered.as_deref());
    info!(
        session_id = %summary.session_id,
        frames = summary.frame_count,
        out_dir = %args.out_dir.display(),
        "Encoded bundle"
    );
    Ok(serde_json::to_value(summary)?)
}

fn run_decode(args: &DecodeArgs, config: &ProtocolConfig) -> Result<serde_json::Value> {
    let text = read_input(&args.frames)?;
    let store = SessionStore::new(&config.reassembly);

    let mut sessions: Vec<SessionId> = Vec::new();
    let mut rejected = 0usize;
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match store.add_frame(line) {
            Ok((id, _)) => {
                if !sessions.contains(&id) {
                    sessions.push(id);
                }
            }
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "Rejected frame");
                rejected += 1;
            }
        }
    }

    let mut report = Vec::with_capacity(sessions.len());
    let mut html_written = false;
    for id in &sessions {
        let state = store.state(id);
        let mut entry = json!({ "session_id": id, "state": state });

        if let Some(bundle) = store.take_completed(id) {
            entry["title"] = json!(bundle.title());
            entry["template_type"] = json!(bundle.template_type());
            entry["created_at"] = json!(bundle.created_at());
            entry["html_bytes"] = json!(bundle.html().len());

            if let (Some(path), false) = (&args.output, html_written) {
                fs::write(path, bundle.html())
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                html_written = true;
            }
        }
        report.push(entry);
    }

    if !sessions.iter().any(|id| store.state(id).is_complete()) {
        bail!(
            "No bundle decoded from {} session(s), {rejected} frame(s) rejected",
            sessions.len()
        );
    }

    Ok(json!({ "sessions": report, "rejected_frames": rejected }))
}

fn run_inspect(args: &InspectArgs) -> Result<serde_json::Value> {
    let frame = args.frame.trim();
    let parsed = ParsedFrame::parse(frame).context("Unrecognized frame")?;

    let value = match parsed {
        ParsedFrame::Chunk(chunk) => json!({
            "kind": "chunk",
            "byte_len": frame.len(),
            "session_id": chunk.session_id(),
            "index": chunk.index(),
            "total": chunk.total(),
            "data_len": chunk.data().len(),
        }),
        ParsedFrame::Bundle(payload) => {
            let bundle = decode_bundle(&payload).context("Corrupt bundle payload")?;
            json!({
                "kind": "bundle",
                "byte_len": frame.len(),
                "session_id": SessionId::for_bare_payload(&payload),
                "title": bundle.title(),
                "template_type": bundle.template_type(),
                "created_at": bundle.created_at(),
                "html_bytes": bundle.html().len(),
            })
        }
    };
    Ok(value)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.log_level, &cli.log_format)?;

    let config = build_config(cli.config.as_deref(), cli.max_chunk_bytes)?;

    let output = match &cli.command {
        Command::Encode(args) => run_encode(args, &config)?,
        Command::Decode(args) => run_decode(args, &config)?,
        Command::Inspect(args) => run_inspect(args)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
