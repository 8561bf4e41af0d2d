use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use vexhub_crawler::{
    CrawlExecutor, Crawler, CrawlerConfig, GitCli, GitFetcher, PackageUrl, SourceLocation,
};

#[derive(Parser, Debug)]
#[command(
    name = "vexhub-crawler",
    version,
    about = "Crawls package sources for VEX documents and publishes them into a VEX hub"
)]
struct Cli {
    /// Root of the VEX hub checkout
    #[arg(long, default_value = ".")]
    hub: PathBuf,

    /// TOML configuration (settings and the package list)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Crawl only this package (requires --url)
    #[arg(long, requires = "url")]
    purl: Option<String>,

    /// Source location of --purl
    #[arg(long, requires = "purl")]
    url: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => CrawlerConfig::from_file(path).context("Failed to load configuration")?,
        None => CrawlerConfig::default(),
    };

    let packages = match (cli.purl, cli.url) {
        (Some(purl), Some(url)) => {
            let purl = purl
                .parse::<PackageUrl>()
                .with_context(|| format!("Invalid --purl '{purl}'"))?;
            let url = SourceLocation::parse(&url)
                .with_context(|| format!("Invalid --url '{url}'"))?;
            vec![(purl, url)]
        }
        _ => config
            .packages()
            .context("Invalid package list in configuration")?,
    };
    if packages.is_empty() {
        bail!("no packages to crawl: pass --purl/--url or list [[packages]] in --config");
    }

    let crawler = Crawler::from_config(GitFetcher::new(), Arc::new(GitCli::new()), &config);
    let executor = CrawlExecutor::new(crawler, cli.hub);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let report = executor.run(&cancel, &packages).await;
    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
