//! Separated stems and their on-disk form

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use ndarray::Array2;

use crate::config::StemEncoding;
use crate::error::{Result, SeparationError};

/// Audio buffer laid out as `[channels, samples]`
pub type Waveform = Array2<f32>;

/// One named stem
#[derive(Debug, Clone)]
pub struct Stem {
    pub name: String,
    pub audio: Waveform,
}

/// Stems produced by one separation, in the order the backend produced them
#[derive(Debug, Clone, Default)]
pub struct StemSet {
    stems: Vec<Stem>,
}

impl StemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a stem, replacing any existing stem with the same name
    pub fn insert(&mut self, name: impl Into<String>, audio: Waveform) {
        let name = name.into();
        match self.stems.iter_mut().find(|stem| stem.name == name) {
            Some(existing) => existing.audio = audio,
            None => self.stems.push(Stem { name, audio }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stem> {
        self.stems.iter()
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Waveform)> for StemSet {
    fn from_iter<I: IntoIterator<Item = (S, Waveform)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, audio) in iter {
            set.insert(name, audio);
        }
        set
    }
}

/// Write a waveform to a WAV file, truncating any existing file at `path`
pub fn write_stem_wav(
    path: &Path,
    audio: &Waveform,
    sample_rate: u32,
    encoding: StemEncoding,
) -> Result<()> {
    let channels = u16::try_from(audio.nrows()).map_err(|_| {
        SeparationError::InvalidValue(format!("Too many channels: {}", audio.nrows()))
    })?;
    if channels == 0 {
        return Err(SeparationError::InvalidValue(
            "Stem has no channels".to_string(),
        ));
    }

    let wrap = |source: hound::Error| SeparationError::StemWriteError {
        path: path.to_path_buf(),
        source,
    };

    match encoding {
        StemEncoding::Pcm16 => {
            let spec = WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            };
            let scale = rescale_factor(audio);
            let mut writer = WavWriter::create(path, spec).map_err(wrap)?;
            for frame in audio.columns() {
                for &sample in frame {
                    let clamped = (sample * scale).clamp(-1.0, 1.0);
                    writer
                        .write_sample((clamped * i16::MAX as f32) as i16)
                        .map_err(wrap)?;
                }
            }
            writer.finalize().map_err(wrap)?;
        }
        StemEncoding::Float32 => {
            let spec = WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 32,
                sample_format: SampleFormat::Float,
            };
            let mut writer = WavWriter::create(path, spec).map_err(wrap)?;
            for frame in audio.columns() {
                for &sample in frame {
                    writer.write_sample(sample).map_err(wrap)?;
                }
            }
            writer.finalize().map_err(wrap)?;
        }
    }

    Ok(())
}

/// Gain that brings an over-full-scale buffer just under 1.0
fn rescale_factor(audio: &Waveform) -> f32 {
    let peak = audio.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
    1.0 / (1.01 * peak).max(1.0)
}
