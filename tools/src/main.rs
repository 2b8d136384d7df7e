use std::fs;
use std::net::{SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codec::{Dispatcher, Registry};
use hpcrpc_tools::{
    collect_frame_entries, inspect_frame, ping, serve_connection, sort_by_size, BodySummary,
    InspectReport,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use transport::{TransportConfig, TransportError};
use wire::ProtocolVersion;

#[derive(Parser)]
#[command(
    name = "hpcrpc-tools",
    version,
    about = "hpcrpc frame inspection and ping tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect captured frames.
    Inspect {
        /// Path to a frame file or a directory of frame files.
        frame_path: PathBuf,
        /// Optional glob filter when inspecting a directory.
        #[arg(long)]
        glob: Option<String>,
        /// Sort inspected frames.
        #[arg(long, value_enum)]
        sort: Option<InspectSort>,
        /// Limit the number of inspected frames (after sorting).
        #[arg(long)]
        limit: Option<usize>,
        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },
    /// Send a ping and print the return code.
    Ping {
        addr: SocketAddr,
        /// Protocol version to speak, as a raw number (e.g. 0x2700).
        #[arg(long, value_parser = parse_version)]
        protocol: Option<ProtocolVersion>,
        /// Timeout in milliseconds.
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
    /// Answer pings, one connection at a time.
    Serve {
        addr: SocketAddr,
        /// Stop after this many connections.
        #[arg(long)]
        count: Option<usize>,
        /// Per-connection timeout in milliseconds.
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
        /// Stop when no connection arrives within this many milliseconds.
        #[arg(long)]
        idle_timeout_ms: Option<u64>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InspectSort {
    Size,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let dispatcher = Dispatcher::new(Registry::with_builtin());
    let config = TransportConfig::default();
    match cli.command {
        Command::Inspect {
            frame_path,
            glob,
            sort,
            limit,
            format,
        } => {
            if frame_path.is_dir() {
                let mut entries = collect_frame_entries(&frame_path, glob.as_deref())?;
                if let Some(InspectSort::Size) = sort {
                    sort_by_size(&mut entries);
                }
                let limit = limit.or(sort.map(|InspectSort::Size| 10));
                if let Some(limit) = limit {
                    entries.truncate(limit);
                }
                for entry in entries {
                    let report = inspect_path(&entry.path, &dispatcher)?;
                    if let OutputFormat::Pretty = format {
                        println!("== {} ({} bytes) ==", entry.path.display(), entry.size);
                    }
                    print_report(&report, format)?;
                }
            } else {
                let report = inspect_path(&frame_path, &dispatcher)?;
                print_report(&report, format)?;
            }
        }
        Command::Ping {
            addr,
            protocol,
            timeout_ms,
        } => {
            let version = protocol.unwrap_or(ProtocolVersion::CURRENT);
            let started = Instant::now();
            let rc = ping(
                addr,
                &dispatcher,
                version,
                Duration::from_millis(timeout_ms),
                &config,
            )?;
            println!(
                "{addr}: rc={} protocol={version} time={:.3}ms",
                rc.rc,
                started.elapsed().as_secs_f64() * 1000.0
            );
            if !rc.is_success() {
                anyhow::bail!("peer answered with rc {}", rc.rc);
            }
        }
        Command::Serve {
            addr,
            count,
            timeout_ms,
            idle_timeout_ms,
        } => {
            let listener = TcpListener::bind(addr).with_context(|| format!("bind {addr}"))?;
            info!(addr = %listener.local_addr()?, "serving");
            let timeout = Duration::from_millis(timeout_ms);
            let idle = idle_timeout_ms.map(Duration::from_millis);
            let mut served = 0;
            while count.map_or(true, |count| served < count) {
                let (mut stream, peer) =
                    match transport::accept(&listener, idle.unwrap_or(timeout), &config) {
                        Ok(accepted) => accepted,
                        Err(TransportError::Timeout { .. }) if idle.is_none() => continue,
                        Err(TransportError::Timeout { .. }) => {
                            info!(served, "idle, stopping");
                            break;
                        }
                        Err(err) => return Err(err).context("accept"),
                    };
                served += 1;
                match serve_connection(&mut stream, &dispatcher, timeout, &config) {
                    Ok(rc) => info!(%peer, rc = rc.rc, "answered"),
                    Err(err) => warn!(%peer, "{err:#}"),
                }
            }
        }
    }
    Ok(())
}

fn parse_version(value: &str) -> Result<ProtocolVersion> {
    let raw = match value.strip_prefix("0x") {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse(),
    }
    .with_context(|| format!("invalid protocol version {value}"))?;
    Ok(ProtocolVersion::from_raw(raw).check()?)
}

fn inspect_path(path: &Path, dispatcher: &Dispatcher) -> Result<InspectReport> {
    let bytes = fs::read(path).with_context(|| format!("read frame {}", path.display()))?;
    inspect_frame(&bytes, dispatcher).with_context(|| format!("inspect {}", path.display()))
}

fn print_report(report: &InspectReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report).context("serialize json")?;
            println!("{json}");
        }
        OutputFormat::Pretty => print_pretty(report),
    }
    Ok(())
}

fn print_pretty(report: &InspectReport) {
    let header = &report.header;
    println!(
        "version: {} (0x{:04x}) flags: 0x{:04x} [{}]",
        header.version,
        header.version_raw,
        header.flags,
        header.flag_names.join(" ")
    );
    if let Some(deferred) = report.deferred_type {
        println!("deferred type: {deferred}");
    }
    println!(
        "msg_type: {} body_length: {} bytes frame: {} bytes",
        header.msg_type, header.body_length, report.frame_len
    );
    if let Some(origin) = &header.origin {
        println!("origin: {origin}");
    }
    if let Some(forward) = &header.forward {
        println!(
            "forward: {} nodes {} timeout={}ms width={} depth={} alias={} bytes",
            forward.count,
            forward.nodelist,
            forward.timeout_ms,
            forward.tree_width,
            forward.tree_depth,
            forward.alias_bytes
        );
    }
    if !header.returns.is_empty() {
        println!("returns:");
        for item in &header.returns {
            println!(
                "  {} err={} type={} {}",
                item.node_name, item.err, item.msg_type, item.payload
            );
        }
    }
    match report.auth_len {
        Some(len) => println!("credential: {len} bytes"),
        None => println!("credential: none"),
    }
    match &report.body {
        BodySummary::Decoded { type_name, value } => println!("body: {type_name} {value}"),
        BodySummary::Undecoded { bytes, error } => {
            println!("body: {bytes} bytes, not decoded ({error})");
        }
    }
}
