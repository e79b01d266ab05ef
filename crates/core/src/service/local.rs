//! Local processing service backed by the file system and ImageMagick.

use async_trait::async_trait;
use regex_lite::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

use super::config::LocalServiceConfig;
use super::error::ServiceError;
use super::progress::{ProgressHub, ProgressTopic};
use super::traits::ProcessingService;
use super::types::{CompressedAsset, ExportItem, HydratedAsset, ProgressStream};
use crate::asset::{mime_for_extension, AssetData, AssetId, Locator, PreviewHandle};

/// JPEG qualities tried when searching for the best fit, lowest first.
const JPEG_QUALITY_LADDER: [u8; 7] = [25, 35, 45, 55, 65, 75, 85];

/// Expected number of search steps, used to scale progress.
const EXPECTED_ATTEMPTS: usize = 4;

/// Deflate level for combined exports.
const ZIP_COMPRESSION_LEVEL: i64 = 6;

/// Image formats the local service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageFormat {
    Jpeg,
    Png,
    WebP,
    Bmp,
    Gif,
}

impl ImageFormat {
    fn from_locator(locator: &Locator) -> Result<Self, ServiceError> {
        let ext = locator.extension().unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::WebP),
            "bmp" => Ok(Self::Bmp),
            "gif" => Ok(Self::Gif),
            _ => Err(ServiceError::UnsupportedFormat { format: ext }),
        }
    }
}

/// How one encoder pass writes its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Jpeg { quality: u8 },
    /// 256-colour palette PNG at maximum zlib level.
    PalettePng,
}

impl Encoding {
    fn file_name(&self) -> String {
        match self {
            Self::Jpeg { quality } => format!("q{}.jpg", quality),
            Self::PalettePng => "palette.png".to_string(),
        }
    }
}

/// Maps encoder-internal progress (0-100) into the 40-90 band of the job.
fn encoder_percent(percent: u8) -> u8 {
    40 + percent.min(100) / 2
}

/// Processing service that works on local files.
///
/// Compression shells out to ImageMagick; everything else is plain file I/O.
#[derive(Debug)]
pub struct LocalProcessingService {
    config: LocalServiceConfig,
    progress: ProgressHub,
}

impl LocalProcessingService {
    /// Creates a new service with the given configuration.
    pub fn new(config: LocalServiceConfig) -> Self {
        Self {
            config,
            progress: ProgressHub::default(),
        }
    }

    /// Creates a service with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(LocalServiceConfig::default())
    }

    pub fn config(&self) -> &LocalServiceConfig {
        &self.config
    }

    /// Builds ImageMagick arguments for one encoder pass.
    fn build_args(input: &Path, output: &Path, encoding: Encoding) -> Vec<String> {
        // First frame only, animated GIFs included
        let mut args = vec![format!("{}[0]", input.to_string_lossy()), "-strip".to_string()];

        match encoding {
            Encoding::Jpeg { quality } => {
                args.extend(["-quality".to_string(), quality.to_string()]);
                args.push(format!("jpg:{}", output.to_string_lossy()));
            }
            Encoding::PalettePng => {
                args.extend([
                    "-dither".to_string(),
                    "FloydSteinberg".to_string(),
                    "-colors".to_string(),
                    "256".to_string(),
                    "-define".to_string(),
                    "png:compression-level=9".to_string(),
                ]);
                args.push(format!("png8:{}", output.to_string_lossy()));
            }
        }

        args
    }

    /// Runs ImageMagick with the configured timeout.
    async fn run_magick(&self, args: &[String]) -> Result<Vec<u8>, ServiceError> {
        let child = Command::new(&self.config.magick_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ServiceError::ToolNotFound {
                        path: self.config.magick_path.clone(),
                    }
                } else {
                    ServiceError::Io(e)
                }
            })?;

        let output = timeout(
            Duration::from_secs(self.config.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| ServiceError::Timeout {
            timeout_secs: self.config.timeout_secs,
        })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ServiceError::compression_failed(
                format!("ImageMagick exited with {}", output.status),
                (!stderr.is_empty()).then_some(stderr),
            ));
        }

        Ok(output.stdout)
    }

    /// Encodes `input` once and returns the encoded bytes.
    async fn encode(
        &self,
        input: &Path,
        work_dir: &Path,
        encoding: Encoding,
    ) -> Result<Vec<u8>, ServiceError> {
        let output = work_dir.join(encoding.file_name());
        let args = Self::build_args(input, &output, encoding);
        self.run_magick(&args).await?;
        let data = tokio::fs::read(&output).await?;
        debug!(
            input = %input.display(),
            ?encoding,
            size_kb = data.len() as f64 / 1024.0,
            "Encoder pass finished"
        );
        Ok(data)
    }

    /// Binary search over the quality ladder for the best JPEG under `target`.
    async fn compress_jpeg(
        &self,
        input: &Path,
        work_dir: &Path,
        target: u64,
        topic: &ProgressTopic,
    ) -> Result<Vec<u8>, ServiceError> {
        let mut left = 0usize;
        let mut right = JPEG_QUALITY_LADDER.len() - 1;
        let mut best: Option<Vec<u8>> = None;
        let mut lowest: Option<Vec<u8>> = None;
        let mut attempts = 0usize;

        topic.report(encoder_percent(0));

        while left <= right {
            let mid = (left + right) / 2;
            let quality = JPEG_QUALITY_LADDER[mid];

            attempts += 1;
            topic.report(encoder_percent(
                (attempts * 100 / EXPECTED_ATTEMPTS).min(90) as u8,
            ));

            let data = self
                .encode(input, work_dir, Encoding::Jpeg { quality })
                .await?;

            if data.len() as u64 <= target {
                best = Some(data);
                if mid == JPEG_QUALITY_LADDER.len() - 1 {
                    break;
                }
                left = mid + 1;
            } else {
                if mid == 0 {
                    lowest = Some(data);
                    break;
                }
                right = mid - 1;
            }
        }

        topic.report(encoder_percent(100));

        match (best, lowest) {
            (Some(data), _) => Ok(data),
            (None, Some(data)) => Ok(data),
            (None, None) => {
                self.encode(
                    input,
                    work_dir,
                    Encoding::Jpeg {
                        quality: JPEG_QUALITY_LADDER[0],
                    },
                )
                .await
            }
        }
    }

    async fn compress_png(
        &self,
        input: &Path,
        work_dir: &Path,
        topic: &ProgressTopic,
    ) -> Result<Vec<u8>, ServiceError> {
        topic.report(encoder_percent(0));
        topic.report(encoder_percent(40));
        let data = self.encode(input, work_dir, Encoding::PalettePng).await?;
        topic.report(encoder_percent(100));
        Ok(data)
    }

    async fn compress_file(
        &self,
        locator: &Locator,
        target_size_kb: u32,
        topic: &ProgressTopic,
    ) -> Result<CompressedAsset, ServiceError> {
        topic.report(0);

        let path = Path::new(locator.as_str());
        let original = tokio::fs::read(path)
            .await
            .map_err(|e| ServiceError::read_failed(locator, e))?;
        let original_size = original.len() as u64;
        topic.report(10);

        let target = u64::from(target_size_kb) * 1024;
        if original_size <= target {
            debug!(locator = %locator, original_size, target, "Already within target size");
            topic.report(100);
            return Ok(CompressedAsset {
                original_size_bytes: original_size,
                compressed_size_bytes: original_size,
                data: AssetData::new(original),
            });
        }

        topic.report(20);
        let format = ImageFormat::from_locator(locator)?;

        let work_dir = self.config.work_dir.join(topic.job_id().to_string());
        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|_| ServiceError::WorkDirFailed {
                path: work_dir.clone(),
            })?;
        topic.report(30);

        // Non-PNG formats are re-encoded as JPEG
        let encoded = match format {
            ImageFormat::Png => self.compress_png(path, &work_dir, topic).await,
            ImageFormat::Jpeg | ImageFormat::WebP | ImageFormat::Bmp | ImageFormat::Gif => {
                self.compress_jpeg(path, &work_dir, target, topic).await
            }
        };
        let _ = tokio::fs::remove_dir_all(&work_dir).await;
        let encoded = encoded?;

        topic.report(90);

        let data = if encoded.len() as u64 > original_size {
            debug!(
                locator = %locator,
                encoded = encoded.len(),
                original_size,
                "Encoded output is larger, keeping original"
            );
            original
        } else {
            encoded
        };

        topic.report(100);

        Ok(CompressedAsset {
            original_size_bytes: original_size,
            compressed_size_bytes: data.len() as u64,
            data: AssetData::new(data),
        })
    }

    /// Returns the ImageMagick version string.
    pub async fn version(&self) -> Result<String, ServiceError> {
        let stdout = self.run_magick(&["-version".to_string()]).await?;
        let text = String::from_utf8_lossy(&stdout);
        let re = Regex::new(r"Version: ImageMagick (\S+)").map_err(|e| {
            ServiceError::Other(format!("Invalid version pattern: {}", e))
        })?;
        re.captures(&text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ServiceError::Other("Unrecognised ImageMagick version output".into()))
    }

    /// Keeps only the final path component of a user-supplied name.
    fn sanitize_filename(name: &str) -> String {
        let base = Locator::from(name).display_name();
        // `display_name` falls back to "unknown" when the last component is empty
        let no_component = name.is_empty() || name.ends_with(['/', '\\']);
        if base.trim().is_empty()
            || base == "."
            || base == ".."
            || (base == "unknown" && no_component)
        {
            return "pasted-image.png".to_string();
        }
        base
    }

    fn write_zip(items: &[ExportItem], destination: &Path) -> Result<(), ServiceError> {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(destination).map_err(|e| {
            ServiceError::export_failed(format!("Failed to create zip file: {}", e))
        })?;

        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .compression_level(Some(ZIP_COMPRESSION_LEVEL));

        for item in items {
            zip.start_file(item.name.as_str(), options).map_err(|e| {
                ServiceError::export_failed(format!("Failed to start file {}: {}", item.name, e))
            })?;
            zip.write_all(item.data.as_bytes()).map_err(|e| {
                ServiceError::export_failed(format!("Failed to write file {}: {}", item.name, e))
            })?;
        }

        zip.finish()
            .map_err(|e| ServiceError::export_failed(format!("Failed to finish zip: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl ProcessingService for LocalProcessingService {
    fn name(&self) -> &str {
        "local"
    }

    async fn hydrate(&self, locator: &Locator) -> Result<HydratedAsset, ServiceError> {
        let path = Path::new(locator.as_str());
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| ServiceError::read_failed(locator, e))?;
        if !metadata.is_file() {
            return Err(ServiceError::read_failed(locator, "not a regular file"));
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ServiceError::read_failed(locator, e))?;

        let mime = mime_for_extension(locator.extension().as_deref());
        Ok(HydratedAsset {
            size_bytes: metadata.len(),
            preview: PreviewHandle::from_bytes(mime, &bytes),
        })
    }

    async fn compress(
        &self,
        locator: &Locator,
        target_size_kb: u32,
        job_id: &AssetId,
    ) -> Result<CompressedAsset, ServiceError> {
        // Dropping the topic at the end of this call ends every subscriber stream
        let topic = self.progress.open(job_id);
        self.compress_file(locator, target_size_kb, &topic).await
    }

    async fn subscribe_progress(&self, job_id: &AssetId) -> Result<ProgressStream, ServiceError> {
        Ok(self.progress.subscribe(job_id))
    }

    async fn persist_pasted_asset(
        &self,
        data: &[u8],
        filename: &str,
    ) -> Result<Locator, ServiceError> {
        tokio::fs::create_dir_all(&self.config.paste_dir).await?;
        let path: PathBuf = self
            .config
            .paste_dir
            .join(format!("leap_{}", Self::sanitize_filename(filename)));
        tokio::fs::write(&path, data).await?;
        debug!(path = %path.display(), bytes = data.len(), "Persisted pasted image");
        Ok(Locator::from(path.as_path()))
    }

    async fn export_single(
        &self,
        data: &AssetData,
        destination: &Path,
    ) -> Result<(), ServiceError> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(destination, data.as_bytes())
            .await
            .map_err(|e| ServiceError::export_failed(format!("Failed to write file: {}", e)))
    }

    async fn export_batch(
        &self,
        items: Vec<ExportItem>,
        destination: &Path,
    ) -> Result<(), ServiceError> {
        let destination = destination.to_path_buf();
        tokio::task::spawn_blocking(move || Self::write_zip(&items, &destination))
            .await
            .map_err(|e| ServiceError::export_failed(format!("Task join error: {}", e)))?
    }

    async fn validate(&self) -> Result<(), ServiceError> {
        let version = self.version().await?;
        info!("Using ImageMagick {}", version);
        Ok(())
    }
}
