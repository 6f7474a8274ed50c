//! Demucs model catalog and weight cache
//!
//! Models are ONNX exports of the pretrained demucs checkpoints. They are
//! downloaded on first use and cached locally; most ship their weights in
//! an external `.onnx.data` file next to the graph.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, SeparationError};

/// A pretrained waveform separation model
#[derive(Debug, PartialEq, Eq)]
pub struct WaveformModel {
    /// Identifier accepted in configuration (`htdemucs`)
    pub id: &'static str,
    /// Graph filename. Must match the name used during ONNX export, since
    /// external data files reference it by name.
    pub filename: &'static str,
    pub url: &'static str,
    /// External weights file, if the export uses one
    pub data_filename: Option<&'static str>,
    pub data_url: Option<&'static str>,
    /// Stem names in the order of the model's output tensor
    pub stems: &'static [&'static str],
    pub sample_rate: u32,
    /// Samples per inference segment the graph was exported with
    pub segment_samples: usize,
}

impl WaveformModel {
    pub fn stem_count(&self) -> usize {
        self.stems.len()
    }
}

/// Standard hybrid transformer demucs, 4 stems
pub const HTDEMUCS: WaveformModel = WaveformModel {
    id: "htdemucs",
    filename: "htdemucs.onnx",
    url: "https://github.com/dataO1/Mesh/releases/download/models/htdemucs.onnx",
    data_filename: Some("htdemucs.onnx.data"),
    data_url: Some("https://github.com/dataO1/Mesh/releases/download/models/htdemucs.onnx.data"),
    stems: &["drums", "bass", "other", "vocals"],
    sample_rate: 44100,
    segment_samples: 343_980,
};

pub const ALL_MODELS: &[&WaveformModel] = &[&HTDEMUCS];

/// Look up a model by identifier
pub fn find_model(id: &str) -> Option<&'static WaveformModel> {
    ALL_MODELS.iter().find(|m| m.id == id).copied()
}

/// Manages model downloads and caching
pub struct ModelManager {
    /// Directory where models are cached
    cache_dir: PathBuf,
}

impl ModelManager {
    /// Create a ModelManager with the default cache directory
    ///
    /// Default location: `~/.cache/stemsplit/models/`
    pub fn new() -> Result<Self> {
        let cache_dir = Self::default_cache_dir()?;
        Ok(Self { cache_dir })
    }

    /// Create a ModelManager with a custom cache directory
    pub fn with_cache_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn default_cache_dir() -> Result<PathBuf> {
        let base = dirs::cache_dir().ok_or_else(|| {
            SeparationError::InvalidConfig("Could not determine cache directory".to_string())
        })?;
        Ok(base.join("stemsplit").join("models"))
    }

    /// Local path where a model graph is stored
    pub fn model_path(&self, model: &WaveformModel) -> PathBuf {
        self.cache_dir.join(model.filename)
    }

    /// Local path of the external data file, if the model has one
    pub fn data_path(&self, model: &WaveformModel) -> Option<PathBuf> {
        model.data_filename.map(|name| self.cache_dir.join(name))
    }

    /// Whether the graph and any external data are already cached
    pub fn is_model_available(&self, model: &WaveformModel) -> bool {
        let data_exists = self.data_path(model).map_or(true, |p| p.exists());
        self.model_path(model).exists() && data_exists
    }

    /// Path to the model graph, downloading missing files first
    pub fn ensure_model(&self, model: &WaveformModel) -> Result<PathBuf> {
        let model_path = self.model_path(model);

        if self.is_model_available(model) {
            log::info!("Model {} found at {:?}", model.id, model_path);
            return Ok(model_path);
        }

        if !model_path.exists() {
            log::info!("Downloading model {} from {}", model.id, model.url);
            self.download_file(model.url, &model_path)?;
        }

        if let (Some(data_path), Some(data_url)) = (self.data_path(model), model.data_url) {
            if !data_path.exists() {
                log::info!("Downloading model data from {}", data_url);
                self.download_file(data_url, &data_path)?;
            }
        }

        Ok(model_path)
    }

    /// Download a URL into the cache
    fn download_file(&self, url: &str, target_path: &Path) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        let response = ureq::get(url)
            .call()
            .map_err(|e| SeparationError::ModelDownloadFailed(e.to_string()))?;

        let content_length: Option<u64> = response
            .header("Content-Length")
            .and_then(|s| s.parse().ok());

        save_download(response.into_reader(), content_length, target_path)
    }
}

/// Stream `reader` into `<target>.tmp` and rename it into place once complete
///
/// The temporary file is removed on any failure, so an interrupted download
/// never leaves partial data in the cache.
fn save_download(reader: impl Read, content_length: Option<u64>, target_path: &Path) -> Result<()> {
    let temp_path = target_path.with_extension("tmp");

    let actual_size = match stream_to_file(reader, &temp_path) {
        Ok(size) => size,
        Err(e) => {
            fs::remove_file(&temp_path).ok();
            return Err(SeparationError::ModelDownloadFailed(format!(
                "Download interrupted: {}",
                e
            )));
        }
    };

    if let Some(expected) = content_length {
        if actual_size != expected {
            fs::remove_file(&temp_path).ok();
            return Err(SeparationError::ModelDownloadFailed(format!(
                "Download incomplete: expected {} bytes, got {}",
                expected, actual_size
            )));
        }
    }

    fs::rename(&temp_path, target_path)?;

    log::info!(
        "Downloaded {:?} ({} bytes)",
        target_path.file_name().unwrap_or_default(),
        actual_size
    );
    Ok(())
}

/// Copy everything from `reader` into a fresh file, returning the byte count
fn stream_to_file(mut reader: impl Read, path: &Path) -> std::io::Result<u64> {
    let mut file = fs::File::create(path)?;
    let mut buffer = [0u8; 8192];
    let mut written = 0u64;

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        file.write_all(&buffer[..bytes_read])?;
        written += bytes_read as u64;
    }

    file.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Yields `good` bytes, then fails
    struct BrokenReader {
        good: usize,
    }

    impl Read for BrokenReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.good == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                ));
            }
            let n = self.good.min(buf.len());
            buf[..n].fill(0xAB);
            self.good -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_find_model() {
        assert_eq!(find_model("htdemucs"), Some(&HTDEMUCS));
        assert_eq!(find_model("htdemucs_6s"), None);
        assert_eq!(find_model("mdx_extra"), None);
    }

    #[test]
    fn test_save_download_renames_complete_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("htdemucs.onnx");

        save_download(&b"onnx graph"[..], Some(10), &target).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"onnx graph");
        assert!(!dir.path().join("htdemucs.tmp").exists());
    }

    #[test]
    fn test_save_download_interrupted_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("htdemucs.onnx");

        let err = save_download(BrokenReader { good: 20_000 }, Some(50_000), &target).unwrap_err();

        assert!(matches!(err, SeparationError::ModelDownloadFailed(_)));
        assert!(err.is_contained());
        assert!(!dir.path().join("htdemucs.tmp").exists());
        assert!(!target.exists());
    }

    #[test]
    fn test_save_download_short_body_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("htdemucs.onnx");

        let err = save_download(&b"short"[..], Some(1024), &target).unwrap_err();

        assert!(err.to_string().contains("expected 1024 bytes, got 5"));
        assert!(!dir.path().join("htdemucs.tmp").exists());
        assert!(!target.exists());
    }

    #[test]
    fn test_default_model_stem_order() {
        assert_eq!(HTDEMUCS.stems, &["drums", "bass", "other", "vocals"]);
    }

    #[test]
    fn test_model_paths() {
        let cache_dir = PathBuf::from("/tmp/stemsplit-test-models");
        let manager = ModelManager::with_cache_dir(cache_dir.clone());

        assert_eq!(manager.model_path(&HTDEMUCS), cache_dir.join("htdemucs.onnx"));
        assert_eq!(
            manager.data_path(&HTDEMUCS),
            Some(cache_dir.join("htdemucs.onnx.data"))
        );
    }

    #[test]
    fn test_availability_requires_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::with_cache_dir(dir.path().to_path_buf());
        assert!(!manager.is_model_available(&HTDEMUCS));

        fs::write(manager.model_path(&HTDEMUCS), b"graph").unwrap();
        assert!(!manager.is_model_available(&HTDEMUCS));

        fs::write(manager.data_path(&HTDEMUCS).unwrap(), b"weights").unwrap();
        assert!(manager.is_model_available(&HTDEMUCS));
    }

    #[test]
    fn test_ensure_model_uses_cache_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::with_cache_dir(dir.path().to_path_buf());
        fs::write(manager.model_path(&HTDEMUCS), b"graph").unwrap();
        fs::write(manager.data_path(&HTDEMUCS).unwrap(), b"weights").unwrap();

        let path = manager.ensure_model(&HTDEMUCS).unwrap();
        assert_eq!(path, dir.path().join("htdemucs.onnx"));
    }
}
