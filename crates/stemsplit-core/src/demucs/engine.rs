//! Demucs inference through ONNX Runtime
//!
//! The exported graph takes a fixed-length stereo segment `[1, 2, T]` and
//! returns `[1, stems, 2, T]`. Tracks are cut into segments overlapping by
//! a quarter, each segment is run on its own, and the results are blended
//! back with a triangular window.

use std::path::{Path, PathBuf};

use ndarray::{s, Array1, Array3, Axis};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use super::audio::{decode_audio, resample, to_stereo};
use super::models::{find_model, ModelManager, WaveformModel};
use super::{Device, WaveformEngine, WaveformEngineLoader};
use crate::error::{Result, SeparationError};
use crate::stems::{StemSet, Waveform};

/// Fraction of each segment shared with its neighbour
const OVERLAP: f32 = 0.25;

/// Guards the normalization against silent input
const NORM_EPS: f32 = 1e-8;

/// Loads demucs ONNX models, downloading weights on first use
pub struct OrtDemucsLoader {
    /// Overrides the default weight cache directory
    cache_dir: Option<PathBuf>,
}

impl OrtDemucsLoader {
    /// Loader caching weights in `cache_dir`, or the default cache when `None`
    pub fn with_cache_dir(cache_dir: Option<PathBuf>) -> Self {
        Self { cache_dir }
    }

    fn model_manager(&self) -> Result<ModelManager> {
        match &self.cache_dir {
            Some(dir) => Ok(ModelManager::with_cache_dir(dir.clone())),
            None => ModelManager::new(),
        }
    }
}

impl WaveformEngineLoader for OrtDemucsLoader {
    fn gpu_available(&self) -> bool {
        probe_cuda()
    }

    fn load(&self, model_name: &str, device: Device) -> Result<Box<dyn WaveformEngine>> {
        let model = find_model(model_name)
            .ok_or_else(|| SeparationError::UnknownModel(model_name.to_string()))?;
        let model_path = self.model_manager()?.ensure_model(model)?;
        let engine = OrtDemucsEngine::open(model, &model_path, device)?;
        Ok(Box::new(engine))
    }
}

/// Probe for a usable CUDA execution provider
#[cfg(feature = "cuda")]
fn probe_cuda() -> bool {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

    CUDAExecutionProvider::default()
        .is_available()
        .unwrap_or(false)
}

#[cfg(not(feature = "cuda"))]
fn probe_cuda() -> bool {
    false
}

/// A demucs ONNX session bound to one device
pub struct OrtDemucsEngine {
    session: Session,
    model: &'static WaveformModel,
}

impl OrtDemucsEngine {
    /// Create a session for `model` from the graph at `model_path`
    pub fn open(model: &'static WaveformModel, model_path: &Path, device: Device) -> Result<Self> {
        log::info!("Loading ONNX model from {:?} on {}", model_path, device);

        let builder = Session::builder()
            .map_err(|e| SeparationError::BackendInitFailed(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| SeparationError::BackendInitFailed(e.to_string()))?;

        #[cfg(feature = "cuda")]
        let builder = match device {
            Device::Cuda => {
                use ort::execution_providers::CUDAExecutionProvider;
                builder
                    .with_execution_providers([CUDAExecutionProvider::default().build()])
                    .map_err(|e| SeparationError::BackendInitFailed(e.to_string()))?
            }
            Device::Cpu => builder,
        };

        let session = builder.commit_from_file(model_path).map_err(|e| {
            SeparationError::BackendInitFailed(format!("Failed to load ONNX model: {}", e))
        })?;

        Ok(Self { session, model })
    }
}

impl WaveformEngine for OrtDemucsEngine {
    fn sample_rate(&self) -> u32 {
        self.model.sample_rate
    }

    fn separate_audio_file(&mut self, input: &Path) -> Result<(Waveform, StemSet)> {
        let (audio, sample_rate) = decode_audio(input)?;
        log::info!(
            "Decoded audio: {} channels, {} samples, {}Hz",
            audio.nrows(),
            audio.ncols(),
            sample_rate
        );

        let mix = resample(&to_stereo(audio)?, sample_rate, self.model.sample_rate)?;
        let (normalized, mean, std) = normalize(&mix);

        let stem_count = self.model.stem_count();
        let segment = self.model.segment_samples;
        let session = &mut self.session;
        let mut separated = apply_segmented(&normalized, stem_count, segment, |chunk| {
            run_segment(session, chunk, stem_count)
        })?;
        separated.mapv_inplace(|x| x * std + mean);

        let stems = self
            .model
            .stems
            .iter()
            .zip(separated.outer_iter())
            .map(|(name, audio)| (*name, audio.to_owned()))
            .collect::<StemSet>();

        log::info!(
            "Separation complete: {} stems, {} samples per stem",
            stems.len(),
            mix.ncols()
        );
        Ok((mix, stems))
    }
}

/// Run one `[1, 2, T]` segment, returning `[stems, 2, T]`
fn run_segment(session: &mut Session, chunk: Array3<f32>, stem_count: usize) -> Result<Array3<f32>> {
    let input_tensor = Tensor::from_array(chunk).map_err(|e| {
        SeparationError::Inference(format!("Failed to create input tensor: {}", e))
    })?;

    let outputs = session
        .run(ort::inputs!["input" => input_tensor])
        .map_err(|e| SeparationError::Inference(format!("Inference failed: {}", e)))?;

    let output = outputs
        .iter()
        .next()
        .ok_or_else(|| SeparationError::Inference("No output tensor".to_string()))?
        .1;

    let (shape, data) = output.try_extract_tensor::<f32>().map_err(|e| {
        SeparationError::Inference(format!("Failed to extract output: {}", e))
    })?;

    let output_shape: Vec<i64> = shape.iter().copied().collect();
    if output_shape.len() != 4
        || output_shape[0] != 1
        || output_shape[1] as usize != stem_count
        || output_shape[2] != 2
    {
        return Err(SeparationError::InvalidValue(format!(
            "Unexpected output shape: {:?}, expected [1, {}, 2, N]",
            output_shape, stem_count
        )));
    }

    Array3::from_shape_vec((stem_count, 2, output_shape[3] as usize), data.to_vec())
        .map_err(|e| SeparationError::InvalidValue(e.to_string()))
}

/// Normalize by the mono reference, returning `(normalized, mean, std)`
fn normalize(mix: &Waveform) -> (Waveform, f32, f32) {
    let reference = mix
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(mix.ncols()));
    let n = reference.len();
    if n == 0 {
        return (mix.clone(), 0.0, 1.0);
    }

    let mean = reference.sum() / n as f32;
    let variance = reference.iter().map(|x| (x - mean).powi(2)).sum::<f32>()
        / (n.saturating_sub(1).max(1)) as f32;
    let std = variance.sqrt() + NORM_EPS;

    (mix.mapv(|x| (x - mean) / std), mean, std)
}

/// Start offsets covering `total` samples with `segment`-long windows
fn segment_starts(total: usize, segment: usize) -> Vec<usize> {
    let hop = ((segment as f32 * (1.0 - OVERLAP)) as usize).max(1);
    let mut starts = Vec::new();
    let mut start = 0;
    loop {
        starts.push(start);
        if start + segment >= total {
            break;
        }
        start += hop;
    }
    starts
}

/// Triangular weights, strictly positive so every sample is covered
fn blend_window(len: usize) -> Array1<f32> {
    let peak = (len + 1) as f32 / 2.0;
    Array1::from_iter((0..len).map(|i| (i + 1).min(len - i) as f32 / peak))
}

/// Run `run` over overlapping zero-padded segments of `mix` and blend the results
///
/// `run` receives `[1, 2, segment]` and must return `[stems, 2, segment]`.
fn apply_segmented<F>(
    mix: &Waveform,
    stem_count: usize,
    segment: usize,
    mut run: F,
) -> Result<Array3<f32>>
where
    F: FnMut(Array3<f32>) -> Result<Array3<f32>>,
{
    if segment == 0 {
        return Err(SeparationError::InvalidValue(
            "Segment length must be positive".to_string(),
        ));
    }

    let (channels, total) = mix.dim();
    let mut out = Array3::<f32>::zeros((stem_count, channels, total));
    let mut weight = Array1::<f32>::zeros(total);
    let window = blend_window(segment);
    let starts = segment_starts(total, segment);

    for (index, &start) in starts.iter().enumerate() {
        let len = segment.min(total - start);
        log::debug!(
            "Segment {}/{}: samples {}..{}",
            index + 1,
            starts.len(),
            start,
            start + len
        );

        let mut chunk = Array3::<f32>::zeros((1, channels, segment));
        chunk
            .slice_mut(s![0, .., ..len])
            .assign(&mix.slice(s![.., start..start + len]));

        let result = run(chunk)?;
        if result.dim() != (stem_count, channels, segment) {
            return Err(SeparationError::InvalidValue(format!(
                "Segment result has shape {:?}, expected {:?}",
                result.dim(),
                (stem_count, channels, segment)
            )));
        }

        let w = window.slice(s![..len]);
        let mut target = out.slice_mut(s![.., .., start..start + len]);
        target += &(&result.slice(s![.., .., ..len]) * &w);
        let mut weight_target = weight.slice_mut(s![start..start + len]);
        weight_target += &w;
    }

    out /= &weight;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DemucsConfig;
    use crate::demucs::{DemucsSeparator, HTDEMUCS};
    use crate::separator::{AudioSeparator, SeparationOutcome};
    use ndarray::Array2;

    #[test]
    fn test_segment_starts_single_segment() {
        assert_eq!(segment_starts(100, 400), vec![0]);
        assert_eq!(segment_starts(400, 400), vec![0]);
    }

    #[test]
    fn test_segment_starts_overlap() {
        // hop = 300, last segment reaches the end
        assert_eq!(segment_starts(1000, 400), vec![0, 300, 600]);
    }

    #[test]
    fn test_blend_window_positive() {
        let window = blend_window(5);
        assert!(window.iter().all(|&w| w > 0.0));
        assert_eq!(window[2], 1.0);
        assert_eq!(window[0], window[4]);
    }

    #[test]
    fn test_normalize_roundtrip() {
        let mix = Array2::from_shape_fn((2, 64), |(c, i)| (i as f32 * 0.1).sin() + c as f32 * 0.05);
        let (normalized, mean, std) = normalize(&mix);

        let reference = normalized.mean_axis(Axis(0)).unwrap();
        assert!(reference.mean().unwrap().abs() < 1e-5);

        let restored = normalized.mapv(|x| x * std + mean);
        for (a, b) in restored.iter().zip(mix.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_normalize_silence_is_finite() {
        let (normalized, _, std) = normalize(&Array2::zeros((2, 32)));
        assert!(std > 0.0);
        assert!(normalized.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_apply_segmented_reconstructs_scaled_stems() {
        let mix = Array2::from_shape_fn((2, 1000), |(c, i)| i as f32 + 1000.0 * c as f32);
        let mut calls = 0;

        // Stem k is the mix scaled by k + 1
        let out = apply_segmented(&mix, 3, 400, |chunk| {
            calls += 1;
            let segment = chunk.index_axis(Axis(0), 0).to_owned();
            let stems: Vec<_> = (0..3).map(|k| &segment * (k + 1) as f32).collect();
            let views: Vec<_> = stems.iter().map(|s| s.view()).collect();
            Ok(ndarray::stack(Axis(0), &views).unwrap())
        })
        .unwrap();

        assert_eq!(calls, 3);
        assert_eq!(out.dim(), (3, 2, 1000));
        for k in 0..3 {
            for c in 0..2 {
                for i in [0, 299, 300, 650, 999] {
                    let expected = mix[[c, i]] * (k + 1) as f32;
                    assert!(
                        (out[[k, c, i]] - expected).abs() < 1e-2,
                        "stem {} ch {} sample {}: {} vs {}",
                        k,
                        c,
                        i,
                        out[[k, c, i]],
                        expected
                    );
                }
            }
        }
    }

    #[test]
    fn test_apply_segmented_pads_short_input() {
        let mix = Array2::from_elem((2, 10), 0.5);
        let out = apply_segmented(&mix, 1, 64, |chunk| {
            assert_eq!(chunk.dim(), (1, 2, 64));
            assert_eq!(chunk[[0, 0, 9]], 0.5);
            assert_eq!(chunk[[0, 0, 10]], 0.0);
            Ok(chunk)
        })
        .unwrap();

        assert_eq!(out.dim(), (1, 2, 10));
        assert!(out.iter().all(|&x| (x - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_apply_segmented_rejects_bad_shape() {
        let mix = Array2::zeros((2, 10));
        let err = apply_segmented(&mix, 4, 16, |_| Ok(Array3::zeros((2, 2, 16)))).unwrap_err();
        assert!(matches!(err, SeparationError::InvalidValue(_)));
    }

    #[test]
    fn test_unknown_model_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let loader = OrtDemucsLoader::with_cache_dir(Some(dir.path().to_path_buf()));
        match loader.load("mdx_extra", Device::Cpu) {
            Err(err @ SeparationError::UnknownModel(_)) => {
                assert!(err.is_contained());
                assert!(err.to_string().contains("mdx_extra"));
            }
            Err(other) => panic!("expected UnknownModel, got {:?}", other),
            Ok(_) => panic!("expected UnknownModel"),
        }
        // Nothing is downloaded for a name outside the catalog
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_separator_contains_unknown_model() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("song.mp3");
        std::fs::write(&input, b"not really audio").unwrap();
        let config = DemucsConfig {
            model_name: "mdx_extra".to_string(),
            model_dir: Some(dir.path().join("models")),
            ..Default::default()
        };

        let outcome = DemucsSeparator::new(config)
            .separate(&input, &dir.path().join("out"))
            .unwrap();

        assert!(matches!(
            outcome,
            SeparationOutcome::Contained(SeparationError::UnknownModel(_))
        ));
        assert!(!dir.path().join("out").join("mdx_extra").exists());
    }

    #[test]
    fn test_corrupt_cached_model_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::with_cache_dir(dir.path().to_path_buf());
        std::fs::write(manager.model_path(&HTDEMUCS), b"not onnx").unwrap();
        std::fs::write(manager.data_path(&HTDEMUCS).unwrap(), b"nope").unwrap();

        let loader = OrtDemucsLoader::with_cache_dir(Some(dir.path().to_path_buf()));
        match loader.load("htdemucs", Device::Cpu) {
            Err(err) => assert!(err.is_contained(), "{:?}", err),
            Ok(_) => panic!("corrupt model should not load"),
        }
    }
}
