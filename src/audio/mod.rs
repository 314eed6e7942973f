//! # Audio Input Module
//!
//! Everything between the uploaded bytes and the floating-point signal the
//! analysis runs on.
//!
//! ## Key Components:
//! - **Signal sources**: WAVE reader and general container decoder behind one trait
//! - **Opus**: packet decoder for the Opus tracks Symphonia demuxes but cannot decode
//! - **Waveform**: canonical mono 16-bit PCM with its sample rate
//! - **Processor**: scaling, DC removal and peak normalization
//!
//! ## Canonical Format:
//! - **Bit Depth**: 16-bit signed PCM
//! - **Channels**: mono, multi-channel input averaged per sample frame
//! - **Sample Rate**: whatever the upload was recorded at (no resampling)

pub mod opus;         // libopus packet decoding for Ogg and WebM tracks
pub mod processor;    // Signal normalization for analysis
pub mod source;       // SignalSource trait and decoders
pub mod waveform;     // Canonical decoded waveform
