use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use feedwalk::config::Config;
use feedwalk::crypto::{EnvelopeDecryptor, KeyServiceClient};
use feedwalk::feed::{ArchivePage, ArchiveWalker, Entry, FeedReader, Fetcher, Scheme};
use feedwalk::util::strip_control_chars;
use futures::TryStreamExt;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Get the default config file path (~/.config/feedwalk/config.toml)
fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("feedwalk")
            .join("config.toml"),
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "feedwalk",
    about = "Replay an Atom archive feed from its oldest page to its newest"
)]
struct Args {
    /// Config file (defaults to ~/.config/feedwalk/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Feed host, optionally with port
    #[arg(long, env = "ATOMFEED_ENDPOINT")]
    endpoint: Option<String>,

    #[arg(long, env = "FEED_PROTO", value_enum)]
    scheme: Option<Scheme>,

    /// Key reference; enables envelope decryption
    #[arg(long, env = "KEY_ALIAS")]
    key_alias: Option<String>,

    /// Unwrap endpoint of the key service
    #[arg(long, env = "KEY_SERVICE_URL")]
    key_service_url: Option<String>,

    /// Bearer token for the key service
    #[arg(long, env = "KEY_SERVICE_TOKEN", hide_env_values = true)]
    key_service_token: Option<String>,

    /// Accept invalid TLS certificates (https only)
    #[arg(long)]
    insecure: bool,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

impl Args {
    /// Flags and environment variables win over the config file.
    fn apply(self, config: &mut Config) {
        if let Some(endpoint) = self.endpoint {
            config.endpoint = Some(endpoint);
        }
        if let Some(scheme) = self.scheme {
            config.scheme = scheme;
        }
        if let Some(alias) = self.key_alias {
            config.key_alias = Some(alias);
        }
        if let Some(url) = self.key_service_url {
            config.key_service_url = Some(url);
        }
        if let Some(token) = self.key_service_token {
            config.key_service_token = Some(token);
        }
        if self.insecure {
            config.insecure_tls = true;
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout_secs = timeout;
        }
    }
}

/// One line of `--format json` output.
#[derive(Debug, Serialize)]
struct EntryRecord<'a> {
    feed_id: Option<&'a str>,
    id: &'a str,
    body: &'a str,
    content_type: &'a str,
    published: &'a str,
    published_at: Option<String>,
}

impl<'a> EntryRecord<'a> {
    fn new(page: &'a ArchivePage, entry: &'a Entry) -> Self {
        Self {
            feed_id: page.feed_id.as_deref(),
            id: &entry.id,
            body: &entry.content.body,
            content_type: &entry.content.content_type,
            published: &entry.published,
            published_at: entry.published_at().map(|t| t.to_rfc3339()),
        }
    }
}

/// Terminal-safe single-line rendering of a field.
fn one_line(s: &str) -> String {
    strip_control_chars(s)
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect()
}

fn render_text(entry: &Entry) -> String {
    format!(
        "{} {} {} {}",
        one_line(&entry.id),
        one_line(&entry.content.body),
        one_line(&entry.published),
        one_line(&entry.content.content_type)
    )
}

fn build_reader(config: &Config) -> Result<FeedReader> {
    let endpoint = config
        .endpoint
        .as_deref()
        .context("No feed endpoint configured")?;
    let fetcher = Fetcher::new(config.fetcher_options()).context("Failed to build HTTP client")?;
    let reader = FeedReader::new(fetcher, config.scheme, endpoint.trim());

    match config.key_service_options()? {
        Some(options) => {
            let key_ref = options.key_id.clone();
            let client = reqwest::Client::builder()
                .build()
                .context("Failed to build key service client")?;
            let unwrap = Arc::new(KeyServiceClient::new(client, options));
            tracing::info!(key_ref = %key_ref, "Envelope decryption enabled");
            Ok(reader.with_decryptor(EnvelopeDecryptor::new(key_ref, unwrap)))
        }
        None => Ok(reader),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries entries only
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let format = args.format;

    let mut config = match args.config.clone().or_else(default_config_path) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    tracing::debug!(?config, "Effective configuration");

    let reader = build_reader(&config)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut pages = Box::pin(ArchiveWalker::new(&reader).pages());
    let mut count = 0usize;

    while let Some(page) = pages.try_next().await.context("Archive walk failed")? {
        for entry in &page.feed.entries {
            match format {
                OutputFormat::Text => writeln!(out, "{}", render_text(entry))?,
                OutputFormat::Json => {
                    let line = serde_json::to_string(&EntryRecord::new(&page, entry))?;
                    writeln!(out, "{}", line)?;
                }
            }
            count += 1;
        }
        out.flush()?;
    }

    tracing::info!(entries = count, "Archive walk complete");
    Ok(())
}
