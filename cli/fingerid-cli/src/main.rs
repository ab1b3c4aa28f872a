// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use fingerid_client::{
    ClientRegistry, FingerprintSchema, JobOutcome, JobRunner, NetworkConfig, PredictionRequest,
    ProxyMode, RunnerConfig,
};

#[derive(Parser)]
#[command(name = "fingerid")]
#[command(about = "CLI for the CSI:FingerID fingerprint prediction service", long_about = None)]
struct Cli {
    /// Base URL of the prediction service
    #[arg(long, env = "FINGERID_URL")]
    url: Option<String>,

    /// JSON network config file; environment settings are used otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    /// Proxy URL for all requests
    #[arg(long, conflicts_with = "no_proxy")]
    proxy: Option<String>,

    /// Ignore any proxy configuration and connect directly
    #[arg(long)]
    no_proxy: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the service is reachable
    Probe,
    /// Show the published release and database versions
    Version {
        /// Installed version to compare against
        #[arg(long)]
        current: Option<String>,
    },
    /// Print the per-feature performance table
    Statistics,
    /// Submit a prediction job and wait for the fingerprint
    Predict {
        /// Spectrum document (.ms)
        #[arg(long)]
        ms: PathBuf,
        /// Fragmentation tree (JSON)
        #[arg(long)]
        ft: PathBuf,
        /// Fingerprint schema the result is interpreted with
        #[arg(long, default_value = "default")]
        schema: String,
        /// Give up after this many status polls
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Download the compounds for a molecular formula
    Compounds {
        #[arg(long)]
        formula: String,
        /// Use the biological database subset
        #[arg(long)]
        bio: bool,
        /// Where to store the gzipped response
        #[arg(long)]
        cache: PathBuf,
    },
    /// Print the confidence model
    Confidence {
        #[arg(long)]
        bio: bool,
    },
    /// Save the covariance scoring model
    Covariance {
        #[arg(long)]
        output: PathBuf,
    },
    /// Send an error report
    Report {
        /// JSON report body
        #[arg(long)]
        file: PathBuf,
        /// Reporting software name
        #[arg(long, default_value = "fingerid-cli")]
        name: String,
    },
}

async fn network_config(cli: &Cli) -> Result<NetworkConfig> {
    let mut config = match &cli.config {
        Some(path) => NetworkConfig::from_file(path)
            .await
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => NetworkConfig::from_env().context("Invalid FINGERID_* environment")?,
    };

    if let Some(url) = &cli.url {
        config.base_url = url.clone();
    }
    if cli.no_proxy {
        config.proxy.mode = ProxyMode::None;
    } else if let Some(proxy) = &cli.proxy {
        config.proxy.mode = ProxyMode::Custom;
        config.proxy.url = Some(proxy.clone());
    }

    config.validate().context("Invalid network configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "fingerid_client=info,fingerid=info".to_string()),
        ))
        .init();

    let cli = Cli::parse();
    let config = network_config(&cli).await?;
    tracing::debug!(base_url = %config.base_url, proxy = ?config.proxy.mode, "Using prediction service");
    let registry = ClientRegistry::new(config);
    let client = registry.create().context("Failed to create client")?;

    match cli.command {
        Commands::Probe => {
            if !client.is_connected().await {
                bail!("{} is unreachable", registry.config().snapshot().base_url);
            }
            println!("reachable");
        }

        Commands::Version { current } => {
            let info = client.version_info().await?;
            println!("Release:  {} ({})", info.gui_version, info.release_date);
            println!("Database: {}", info.database_version);
            if let Some(current) = current {
                if info.is_newer_than(&current) {
                    println!("Update available: {} -> {}", current, info.gui_version);
                } else {
                    println!("Up to date");
                }
            }
            for entry in &info.news {
                println!("News: {}", entry);
            }
        }

        Commands::Statistics => {
            let stats = client.statistics().await?;
            println!("index\ttp\tfp\ttn\tfn\trecall\tprecision");
            for (index, perf) in stats.indices.iter().zip(&stats.performances) {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{:.3}\t{:.3}",
                    index,
                    perf.tp,
                    perf.fp,
                    perf.tn,
                    perf.fn_,
                    perf.recall(),
                    perf.precision()
                );
            }
        }

        Commands::Predict {
            ms,
            ft,
            schema,
            max_attempts,
        } => {
            let ms = tokio::fs::read_to_string(&ms)
                .await
                .with_context(|| format!("Failed to read {}", ms.display()))?;
            let ft = tokio::fs::read_to_string(&ft)
                .await
                .with_context(|| format!("Failed to read {}", ft.display()))?;

            let mut runner_config = RunnerConfig::from_env()?;
            if let Some(max_attempts) = max_attempts {
                runner_config.poll.max_attempts = max_attempts;
            }
            let runner = JobRunner::new(client.shared(), runner_config);
            let handle = runner.run(PredictionRequest::new(ms, ft, FingerprintSchema::new(schema)));

            let outcome = tokio::select! {
                outcome = handle.wait() => outcome?,
                _ = tokio::signal::ctrl_c() => bail!("Interrupted"),
            };
            match outcome {
                JobOutcome::Completed { job, fingerprint } => {
                    eprintln!("Job {} finished with {} values", job.id(), fingerprint.len());
                    for value in fingerprint.values() {
                        println!("{}", value);
                    }
                }
                other => {
                    other.into_fingerprint()?;
                }
            }
        }

        Commands::Compounds {
            formula,
            bio,
            cache,
        } => {
            let records = client.compounds_for(&formula, bio, &cache).await?;
            eprintln!("{} compounds, cached at {}", records.len(), cache.display());
            for record in records {
                println!("{}", record.inchikey.as_deref().unwrap_or("-"));
            }
        }

        Commands::Confidence { bio } => {
            for line in client.confidence_model(bio).await? {
                println!("{}", line);
            }
        }

        Commands::Covariance { output } => {
            let model = client.covariance_scoring().await?;
            tokio::fs::write(&output, &model)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            eprintln!("Wrote {} bytes to {}", model.len(), output.display());
        }

        Commands::Report { file, name } => {
            let contents = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let report: serde_json::Value =
                serde_json::from_str(&contents).context("Report is not valid JSON")?;
            println!("{}", client.report_error(&report, &name).await?);
        }
    }

    client.close().await;
    Ok(())
}
