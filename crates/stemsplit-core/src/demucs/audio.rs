//! Audio decoding and conditioning for waveform inference

use std::fs::File;
use std::path::Path;

use ndarray::{s, Array2};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Result, SeparationError};
use crate::stems::Waveform;

/// Decode an audio file to a `[channels, samples]` buffer using Symphonia
pub fn decode_audio(path: &Path) -> Result<(Waveform, u32)> {
    let file = File::open(path).map_err(|e| SeparationError::AudioReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| SeparationError::UnsupportedFormat(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SeparationError::UnsupportedFormat("No audio track found".to_string()))?;

    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SeparationError::UnsupportedFormat("Unknown sample rate".to_string()))?;

    let mut channels = track.codec_params.channels.map(|c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SeparationError::UnsupportedFormat(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                log::warn!("Error decoding packet: {}", e);
                continue;
            }
            Err(e) => return Err(SeparationError::UnsupportedFormat(e.to_string())),
        };

        // Channel count is unknown upfront for some codecs (AAC)
        if sample_buf.is_none() {
            let spec = *decoded.spec();
            channels.get_or_insert(spec.channels.count());
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    let channels = channels.unwrap_or(2);
    if channels == 0 || samples.is_empty() {
        return Err(SeparationError::InvalidValue(format!(
            "No audio decoded from {}",
            path.display()
        )));
    }

    let frames = samples.len() / channels;
    samples.truncate(frames * channels);
    // Interleaved [frames, channels] -> planar [channels, frames]
    let interleaved = Array2::from_shape_vec((frames, channels), samples)
        .map_err(|e| SeparationError::InvalidValue(e.to_string()))?;

    Ok((interleaved.reversed_axes().as_standard_layout().to_owned(), sample_rate))
}

/// Coerce a buffer to two channels
///
/// Mono is duplicated; anything wider keeps its first two channels.
pub fn to_stereo(audio: Waveform) -> Result<Waveform> {
    match audio.nrows() {
        0 => Err(SeparationError::InvalidValue(
            "Audio has no channels".to_string(),
        )),
        1 => {
            let mono = audio.row(0);
            let mut stereo = Array2::zeros((2, audio.ncols()));
            stereo.row_mut(0).assign(&mono);
            stereo.row_mut(1).assign(&mono);
            Ok(stereo)
        }
        2 => Ok(audio),
        _ => Ok(audio.slice(s![0..2, ..]).to_owned()),
    }
}

/// Resample a single channel from `from_rate` to `to_rate`
///
/// Returns the input unchanged if rates already match.
pub fn resample_channel(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let chunk_size = 1024;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
        .map_err(|e| SeparationError::InvalidValue(format!("failed to create resampler: {}", e)))?;

    let expected_len = (samples.len() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(expected_len + chunk_size);

    let mut pos = 0;
    while pos + chunk_size <= samples.len() {
        let chunk = &samples[pos..pos + chunk_size];
        let result = resampler
            .process(&[chunk], None)
            .map_err(|e| SeparationError::Inference(format!("resample error: {}", e)))?;
        output.extend_from_slice(&result[0]);
        pos += chunk_size;
    }

    if pos < samples.len() {
        let result = resampler
            .process_partial(Some(&[&samples[pos..]][..]), None)
            .map_err(|e| SeparationError::Inference(format!("resample error: {}", e)))?;
        output.extend_from_slice(&result[0]);
    }

    // Flush the filter tail so the delayed samples come out
    let result = resampler
        .process_partial(None::<&[&[f32]]>, None)
        .map_err(|e| SeparationError::Inference(format!("resample error: {}", e)))?;
    output.extend_from_slice(&result[0]);

    // Drop the filter delay from the front and trim to the exact length
    let delay = resampler.output_delay().min(output.len());
    output.drain(..delay);
    output.resize(expected_len, 0.0);
    Ok(output)
}

/// Resample every channel of a buffer
pub fn resample(audio: &Waveform, from_rate: u32, to_rate: u32) -> Result<Waveform> {
    if from_rate == to_rate {
        return Ok(audio.clone());
    }

    let channels = audio
        .rows()
        .into_iter()
        .map(|row| resample_channel(&row.to_vec(), from_rate, to_rate))
        .collect::<Result<Vec<_>>>()?;

    let frames = channels.first().map_or(0, Vec::len);
    let flat: Vec<f32> = channels.into_iter().flatten().collect();
    Array2::from_shape_vec((audio.nrows(), frames), flat)
        .map_err(|e| SeparationError::InvalidValue(e.to_string()))
}
