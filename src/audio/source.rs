//! # Signal Sources
//!
//! Adapters that turn uploaded bytes into a [`Waveform`]. Decoding is done
//! entirely in memory over a `Cursor`, so there are no temp files to clean up
//! and every buffer is released when the call returns, success or not.
//!
//! ## Implementations:
//! - **WavSource**: RIFF/WAVE, the canonical container, read with the `wav` crate
//! - **SymphoniaSource**: anything Symphonia can probe (MP3, FLAC, Ogg, AAC/MP4, MKV/WebM, ...).
//!   Opus tracks are demuxed by Symphonia and decoded by [`OpusPacketDecoder`]
//! - **AudioDecoder**: sniffs the header and dispatches to one of the above

use crate::analysis::error::{AnalysisError, AnalysisResult};
use crate::audio::opus::{OpusPacketDecoder, OPUS_SAMPLE_RATE};
use crate::audio::waveform::Waveform;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL, CODEC_TYPE_OPUS};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

const FLOAT_PCM_SCALE: f64 = 32768.0;

/// Anything that can produce a mono PCM waveform from raw upload bytes.
///
/// ## Contract:
/// - empty input → `AnalysisError::EmptyInput`
/// - bytes that are not decodable audio → `AnalysisError::Decode`
pub trait SignalSource: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> AnalysisResult<Waveform>;
}

/// Reader for uncompressed RIFF/WAVE files.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavSource;

impl WavSource {
    /// Convert any supported WAVE bit depth to 16-bit signed samples.
    ///
    /// ## Conversions:
    /// - **8-bit**: unsigned, centered on 128 → `(x - 128) << 8`
    /// - **24-bit**: drop the low byte → `x >> 8`
    /// - **32-bit float**: scale by 2^15 and clamp, so `-1.0` is `i16::MIN` like integer PCM
    fn to_pcm16(data: wav::BitDepth) -> AnalysisResult<Vec<i16>> {
        match data {
            wav::BitDepth::Eight(samples) => Ok(samples
                .into_iter()
                .map(|s| ((s as i16) - 128) << 8)
                .collect()),
            wav::BitDepth::Sixteen(samples) => Ok(samples),
            wav::BitDepth::TwentyFour(samples) => Ok(samples
                .into_iter()
                .map(|s| (s >> 8).clamp(i16::MIN as i32, i16::MAX as i32) as i16)
                .collect()),
            wav::BitDepth::ThirtyTwoFloat(samples) => Ok(samples
                .into_iter()
                .map(|s| (s as f64 * FLOAT_PCM_SCALE).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16)
                .collect()),
            wav::BitDepth::Empty => Err(AnalysisError::Decode("WAVE file has no data chunk".to_string())),
        }
    }
}

impl SignalSource for WavSource {
    fn decode(&self, bytes: &[u8]) -> AnalysisResult<Waveform> {
        if bytes.is_empty() {
            return Err(AnalysisError::EmptyInput);
        }

        let mut cursor = Cursor::new(bytes);
        let (header, data) = wav::read(&mut cursor)
            .map_err(|e| AnalysisError::Decode(format!("invalid WAVE data: {}", e)))?;

        debug!(
            sample_rate = header.sampling_rate,
            channels = header.channel_count,
            bits_per_sample = header.bits_per_sample,
            "Read WAVE header"
        );

        let samples = Self::to_pcm16(data)?;
        Waveform::from_interleaved(samples, header.channel_count, header.sampling_rate)
    }
}

/// General-purpose decoder backed by Symphonia's probe and codec registry.
#[derive(Debug, Default, Clone)]
pub struct SymphoniaSource {
    /// File extension used to speed up probing (e.g. "mp3")
    extension: Option<String>,
}

impl SymphoniaSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give the prober a hint taken from the uploaded filename.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }
}

impl SignalSource for SymphoniaSource {
    fn decode(&self, bytes: &[u8]) -> AnalysisResult<Waveform> {
        if bytes.is_empty() {
            return Err(AnalysisError::EmptyInput);
        }

        // MediaSourceStream needs an owned, 'static source
        let cursor = Cursor::new(bytes.to_vec());
        let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = &self.extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| AnalysisError::Decode(format!("unrecognized audio container: {}", e)))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AnalysisError::Decode("no decodable audio track found".to_string()))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let mut decoder = if codec_params.codec == CODEC_TYPE_OPUS {
            let channels = OpusPacketDecoder::channels_for(
                codec_params.extra_data.as_deref(),
                codec_params.channels.map(|c| c.count()),
            );
            TrackDecoder::Opus(OpusPacketDecoder::new(channels)?)
        } else {
            let decoder = symphonia::default::get_codecs()
                .make(&codec_params, &DecoderOptions::default())
                .map_err(|e| AnalysisError::Decode(format!("unsupported codec: {}", e)))?;
            TrackDecoder::Registry(decoder)
        };

        let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
        let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(0);
        let mut interleaved: Vec<i16> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(AnalysisError::Decode(format!("failed to read packet: {}", e))),
            };

            if packet.track_id() != track_id {
                continue;
            }

            match &mut decoder {
                TrackDecoder::Registry(decoder) => match decoder.decode(&packet) {
                    Ok(decoded) => {
                        let spec = *decoded.spec();
                        sample_rate = spec.rate;
                        channels = spec.channels.count();

                        let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                        buffer.copy_interleaved_ref(decoded);
                        interleaved.extend_from_slice(buffer.samples());
                    }
                    Err(SymphoniaError::DecodeError(reason)) => {
                        warn!(reason = %reason, "Skipping undecodable packet");
                    }
                    Err(e) => return Err(AnalysisError::Decode(format!("decoder failure: {}", e))),
                },
                TrackDecoder::Opus(decoder) => {
                    sample_rate = OPUS_SAMPLE_RATE;
                    channels = decoder.channels();
                    let trimmed = decoder.decode_into(
                        &packet.data,
                        packet.trim_start as usize,
                        packet.trim_end as usize,
                        &mut interleaved,
                    );
                    if let Err(e) = trimmed {
                        warn!(error = %e, "Skipping undecodable Opus packet");
                    }
                }
            }
        }

        debug!(
            sample_rate,
            channels,
            samples = interleaved.len(),
            "Decoded audio stream"
        );

        let channels = u16::try_from(channels)
            .map_err(|_| AnalysisError::Decode(format!("unsupported channel count: {}", channels)))?;
        Waveform::from_interleaved(interleaved, channels, sample_rate)
    }
}

/// Per-track decoder: Symphonia's own codecs, or libopus for Opus tracks.
enum TrackDecoder {
    Registry(Box<dyn Decoder>),
    Opus(OpusPacketDecoder),
}

/// Dispatching source used by the pipeline.
///
/// RIFF/WAVE bytes go to [`WavSource`]; everything else, and any WAVE
/// variant the `wav` crate rejects (e.g. WAVE_FORMAT_EXTENSIBLE), goes to
/// [`SymphoniaSource`].
#[derive(Debug, Default, Clone)]
pub struct AudioDecoder {
    symphonia: SymphoniaSource,
}

impl AudioDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the extension of an uploaded filename as a probe hint.
    pub fn for_filename(filename: Option<&str>) -> Self {
        let extension = filename
            .and_then(|name| std::path::Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension {
            Some(ext) => Self {
                symphonia: SymphoniaSource::new().with_extension(ext),
            },
            None => Self::new(),
        }
    }
}

/// `RIFF....WAVE`
pub fn is_riff_wave(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

impl SignalSource for AudioDecoder {
    fn decode(&self, bytes: &[u8]) -> AnalysisResult<Waveform> {
        if bytes.is_empty() {
            return Err(AnalysisError::EmptyInput);
        }

        if is_riff_wave(bytes) {
            match WavSource.decode(bytes) {
                Ok(waveform) => return Ok(waveform),
                Err(e) => debug!(error = %e, "WAVE reader declined input, probing with Symphonia"),
            }
        }

        self.symphonia.decode(bytes)
    }
}
