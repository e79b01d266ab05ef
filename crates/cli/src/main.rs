mod metrics;
mod report;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::AsyncReadExt;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leap_core::pipeline::suggested_file_name;
use leap_core::{
    load_config, load_config_from_env, validate_config, AssetStatus, Config,
    LocalProcessingService, Locator, PastedAsset, PipelineProcessor, ProcessingService,
};

use report::RunReport;

#[derive(Parser, Debug)]
#[clap(name = "leap-compress", version, about = "Compress images to a target size")]
struct CliArgs {
    /// Images to compress.
    pub files: Vec<PathBuf>,

    /// Read one pasted image from stdin and store it under this name.
    #[clap(long, value_name = "NAME")]
    pub paste: Option<String>,

    /// Target size per image in KB.
    #[clap(long)]
    pub max_size_kb: Option<u32>,

    /// Maximum parallel compression jobs.
    #[clap(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Write every compressed image into this ZIP archive.
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Write every compressed image into this directory.
    #[clap(long)]
    pub export_dir: Option<PathBuf>,

    /// Print the final records as JSON.
    #[clap(long)]
    pub json: bool,

    /// Print Prometheus metrics after the run.
    #[clap(long)]
    pub print_metrics: bool,

    /// Path to a TOML configuration file.
    #[clap(short, long)]
    pub config: Option<PathBuf>,
}

impl CliArgs {
    fn has_input(&self) -> bool {
        !self.files.is_empty() || self.paste.is_some()
    }

    /// Applies command line overrides on top of the loaded configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(kb) = self.max_size_kb {
            config.pipeline.max_size_kb = kb;
        }
        if let Some(limit) = self.concurrency {
            config.pipeline.concurrency = Some(limit);
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Logs go to stderr so stdout stays clean for reports
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();
    if !args.has_input() {
        bail!("No input images given (pass file paths or --paste <NAME>)");
    }

    let config = load(&args)?;
    info!(
        max_size_kb = config.pipeline.max_size_kb,
        concurrency = config.pipeline.effective_concurrency(),
        "Configuration loaded"
    );

    let service = LocalProcessingService::new(config.service.clone());
    if let Err(e) = service.validate().await {
        warn!("ImageMagick check failed, compression will likely fail: {}", e);
    }

    let processor = PipelineProcessor::new(config.pipeline.clone(), service);

    // Ingest
    let picked = processor
        .ingest(args.files.iter().map(|p| Locator::from(p.as_path())))
        .await;
    let mut hydrations = vec![picked.hydration];

    if let Some(name) = &args.paste {
        let mut data = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut data)
            .await
            .context("Failed to read pasted image from stdin")?;
        if data.is_empty() {
            warn!("Nothing to paste: stdin was empty");
        } else {
            let pasted = processor
                .ingest_pasted(vec![PastedAsset::new(data, Some(name.clone()))])
                .await;
            hydrations.push(pasted.hydration);
        }
    }

    for hydration in hydrations {
        hydration.wait().await;
    }

    // Compress
    let summary = tokio::select! {
        result = processor.compress_all() => result.context("Compression batch failed")?,
        _ = shutdown_signal() => bail!("Interrupted"),
    };

    // Export
    let export = match &args.output {
        Some(path) => {
            let summary = processor
                .export_all(path)
                .await
                .with_context(|| format!("Failed to write archive {:?}", path))?;
            Some(summary)
        }
        None => None,
    };

    let mut exported_files = Vec::new();
    if let Some(dir) = &args.export_dir {
        for record in processor.store().with_status(AssetStatus::Succeeded).await {
            let destination = dir.join(suggested_file_name(&record));
            match processor.export_one(&record.id, &destination).await {
                Ok(info) => exported_files.push(info),
                Err(e) => warn!(asset = %record.display_name, "Export failed: {}", e),
            }
        }
        info!(count = exported_files.len(), dir = ?dir, "Exported compressed images");
    }

    // Report
    let records = processor.records().await;
    if args.json {
        let run_report = RunReport {
            batch: &summary,
            records: records.iter().map(|r| r.as_ref()).collect(),
            export: export.as_ref(),
            exported_files,
        };
        let json =
            serde_json::to_string_pretty(&run_report).context("Failed to serialize report")?;
        println!("{}", json);
    } else {
        for record in &records {
            println!("{}", report::record_line(record));
        }
        println!("{}", report::summary_line(&summary));
        if let Some(export) = export.as_ref().and_then(|e| e.destination.as_ref()) {
            println!("Archive written to {}", export.display());
        }
    }

    if args.print_metrics {
        metrics::collect_dynamic_metrics(&processor).await;
        print!("{}", metrics::encode_metrics()?);
    }

    Ok(())
}

/// Loads the configuration file (or environment only) and applies overrides.
fn load(args: &CliArgs) -> Result<Config> {
    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var("LEAP_CONFIG").ok().map(PathBuf::from));

    let mut config = match &config_path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?
        }
        None => load_config_from_env().context("Failed to load config from environment")?,
    };

    args.apply(&mut config);
    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_files_and_flags() {
        let args = CliArgs::try_parse_from([
            "leap-compress",
            "a.jpg",
            "b.png",
            "--max-size-kb",
            "200",
            "-j",
            "3",
            "--output",
            "out.zip",
            "--json",
        ])
        .unwrap();

        assert_eq!(args.files, vec![PathBuf::from("a.jpg"), PathBuf::from("b.png")]);
        assert_eq!(args.max_size_kb, Some(200));
        assert_eq!(args.concurrency, Some(3));
        assert_eq!(args.output, Some(PathBuf::from("out.zip")));
        assert!(args.json);
        assert!(!args.print_metrics);
        assert!(args.has_input());
    }

    #[test]
    fn test_paste_counts_as_input() {
        let args = CliArgs::try_parse_from(["leap-compress", "--paste", "clip.png"]).unwrap();
        assert!(args.files.is_empty());
        assert_eq!(args.paste.as_deref(), Some("clip.png"));
        assert!(args.has_input());

        let args = CliArgs::try_parse_from(["leap-compress"]).unwrap();
        assert!(!args.has_input());
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let args =
            CliArgs::try_parse_from(["leap-compress", "a.jpg", "--max-size-kb", "80", "-j", "1"])
                .unwrap();
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.pipeline.max_size_kb, 80);
        assert_eq!(config.pipeline.effective_concurrency(), 1);
    }

    #[test]
    fn test_zero_concurrency_fails_validation() {
        let args = CliArgs::try_parse_from(["leap-compress", "a.jpg", "-j", "0"]).unwrap();
        let mut config = Config::default();
        args.apply(&mut config);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_from_config_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nmax_size_kb = 120\n").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let args = CliArgs::try_parse_from(["leap-compress", "a.jpg", "--config", &path]).unwrap();
        let config = load(&args).unwrap();
        assert_eq!(config.pipeline.max_size_kb, 120);
    }
}
