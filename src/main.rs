use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use h2relay::{
    BufferedConnection, Config, Exchange, Frontend, MessageState, PauseReason, Result,
};
use serde::Serialize;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Replay a captured backend response through a single exchange and print what
/// the frontend would have seen.
#[derive(Parser)]
#[command(name = "h2relay")]
#[command(about = "Replay a raw HTTP/1.x backend response through the h2relay exchange core")]
struct Cli {
    /// File holding the raw response bytes
    input: PathBuf,

    /// Method of the request the response answers
    #[arg(short, long, default_value = "GET")]
    method: String,

    #[arg(short, long, default_value = "/")]
    path: String,

    /// Bytes delivered per simulated socket read
    #[arg(long, default_value = "4096")]
    chunk_size: usize,

    #[arg(short, long)]
    verbose: bool,

    #[arg(long)]
    config: Option<PathBuf>,
}

/// Stages body bytes the way a real frontend would before framing them for
/// the client, pausing the backend when the stage is full.
#[derive(Default)]
struct Collector {
    body: Vec<u8>,
}

impl Collector {
    fn flush(&mut self, exchange: &mut Exchange) {
        let data = exchange.drain_response_body(usize::MAX);
        self.body.extend_from_slice(&data);
    }
}

impl Frontend for Collector {
    fn on_header_complete(&mut self, exchange: &mut Exchange) -> Result<()> {
        exchange.init_response_body_buf();
        Ok(())
    }

    fn on_body(&mut self, exchange: &mut Exchange, data: &[u8]) -> Result<usize> {
        exchange.append_response_body(data);
        if exchange.response_body_buf_full() {
            exchange.pause_read(PauseReason::NoBuffer);
        }
        Ok(data.len())
    }

    fn on_body_complete(&mut self, exchange: &mut Exchange) -> Result<()> {
        debug!(
            "Stream {} response complete",
            exchange.client_stream_id()
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct Summary {
    status: u16,
    version: String,
    headers: Vec<(String, String)>,
    chunked: bool,
    connection_close: bool,
    tunnel: bool,
    state: MessageState,
    body_len: usize,
    request_bytes: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if cli.chunk_size == 0 {
        bail!("--chunk-size must be at least 1");
    }

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };

    let raw = std::fs::read(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    info!("Replaying {} response bytes from {}", raw.len(), cli.input.display());

    let mut exchange = Exchange::new(1, 0, &config);
    exchange.set_request_method(cli.method.as_str());
    exchange.set_request_path(cli.path.as_str());
    exchange.add_request_header("Host", "backend");

    let connection = BufferedConnection::new();
    let interest = connection.read_interest();
    exchange.set_backend_connection(Some(Box::new(connection)));
    exchange.push_request_headers()?;
    exchange.end_upload_data()?;
    exchange.advance_request_state(MessageState::HeaderComplete)?;
    exchange.advance_request_state(MessageState::MsgComplete)?;
    let request_bytes = exchange
        .backend_connection()
        .map_or(0, |backend| backend.output_len());

    let mut collector = Collector::default();
    for chunk in raw.chunks(cli.chunk_size) {
        if !interest.is_enabled() {
            // The event loop would stop reading here until the client drains.
            collector.flush(&mut exchange);
        }
        if let Some(backend) = exchange.backend_connection_mut() {
            backend.input_mut().extend_from_slice(chunk);
        }
        exchange
            .parse_http_response(&mut collector)
            .context("parsing backend response")?;
    }
    if exchange.response().state() != MessageState::MsgComplete {
        exchange
            .on_backend_eof(&mut collector)
            .context("backend closed the connection")?;
    }
    collector.flush(&mut exchange);

    if exchange.response().connection_close() {
        warn!("Backend connection would not be reused");
    }

    let response = exchange.response();
    let (major, minor) = response.version();
    let summary = Summary {
        status: response.status(),
        version: format!("HTTP/{}.{}", major, minor),
        headers: response
            .headers()
            .iter()
            .map(|h| (h.name_str().into_owned(), h.value_str().into_owned()))
            .collect(),
        chunked: response.is_chunked(),
        connection_close: response.connection_close(),
        tunnel: exchange.tunnel_established(),
        state: response.state(),
        body_len: collector.body.len(),
        request_bytes,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    exchange.detach_backend_connection();
    Ok(())
}
