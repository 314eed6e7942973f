//! # Opus Packets
//!
//! Symphonia demuxes Ogg and Matroska/WebM Opus streams but ships no Opus
//! codec, so packets from those tracks are decoded here with libopus.
//! Browser `MediaRecorder` uploads are WebM/Opus.

use crate::analysis::error::{AnalysisError, AnalysisResult};

/// libopus always decodes at 48 kHz when asked to.
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

/// 120 ms at 48 kHz, the longest frame a single Opus packet may carry.
const MAX_PACKET_SAMPLES: usize = 5_760;

/// Offset of the channel count in an `OpusHead` identification header.
const OPUS_HEAD_CHANNELS: usize = 9;

/// Stateful decoder for the packets of one Opus track.
pub struct OpusPacketDecoder {
    decoder: opus::Decoder,
    channels: usize,
    scratch: Vec<i16>,
}

impl OpusPacketDecoder {
    /// ## Errors:
    /// `Decode` for more than two channels (multistream mapping) or when
    /// libopus refuses to initialize.
    pub fn new(channels: usize) -> AnalysisResult<Self> {
        let layout = match channels {
            1 => opus::Channels::Mono,
            2 => opus::Channels::Stereo,
            other => {
                return Err(AnalysisError::Decode(format!(
                    "unsupported Opus channel count: {}",
                    other
                )))
            }
        };

        let decoder = opus::Decoder::new(OPUS_SAMPLE_RATE, layout)
            .map_err(|e| AnalysisError::Decode(format!("failed to create Opus decoder: {}", e)))?;

        Ok(Self {
            decoder,
            channels,
            scratch: vec![0; MAX_PACKET_SAMPLES * channels],
        })
    }

    /// Pick the channel count from the `OpusHead` carried as codec extra
    /// data, falling back to what the container declared, then to mono.
    pub fn channels_for(extra_data: Option<&[u8]>, declared: Option<usize>) -> usize {
        extra_data
            .filter(|head| head.starts_with(b"OpusHead"))
            .and_then(|head| head.get(OPUS_HEAD_CHANNELS))
            .map(|&count| count as usize)
            .filter(|&count| count > 0)
            .or(declared)
            .unwrap_or(1)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Decode one packet and append its interleaved samples to `out`.
    ///
    /// `trim_start` and `trim_end` are per-channel sample counts removed from
    /// the decoded frame (encoder pre-skip and end padding). Returns the
    /// number of sample frames appended.
    pub fn decode_into(
        &mut self,
        packet: &[u8],
        trim_start: usize,
        trim_end: usize,
        out: &mut Vec<i16>,
    ) -> AnalysisResult<usize> {
        let frames = self
            .decoder
            .decode(packet, &mut self.scratch, false)
            .map_err(|e| AnalysisError::Decode(format!("invalid Opus packet: {}", e)))?;

        let start = trim_start.min(frames);
        let end = frames.saturating_sub(trim_end).max(start);
        out.extend_from_slice(&self.scratch[start * self.channels..end * self.channels]);
        Ok(end - start)
    }
}

impl std::fmt::Debug for OpusPacketDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpusPacketDecoder")
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}
