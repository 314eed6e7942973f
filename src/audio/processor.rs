//! # Signal Preprocessing
//!
//! Turns a canonical [`Waveform`] into the floating-point signal the feature
//! extractor works on. The thresholds of the emotion rule were tuned against
//! this exact normalization, so it must not change casually.
//!
//! ## Steps:
//! 1. **Scale**: 16-bit integers to [-1.0, 1.0) by dividing by 2^15
//! 2. **Remove DC offset**: subtract the mean of the whole recording
//! 3. **Peak-normalize**: divide by the largest absolute value (plus 1e-10)

use crate::audio::waveform::Waveform;

/// Added to the peak before dividing so silence stays silence instead of NaN.
const PEAK_FLOOR: f64 = 1e-10;

/// Full-scale value of 16-bit PCM.
const PCM_SCALE: f64 = 32768.0;

/// Produce the normalized analysis signal for a waveform.
pub fn normalize_signal(waveform: &Waveform) -> Vec<f64> {
    let mut signal = pcm_to_float(waveform.samples());
    remove_dc_offset(&mut signal);
    normalize_peak(&mut signal);
    signal
}

/// Convert 16-bit PCM samples to floats in [-1.0, 1.0).
pub fn pcm_to_float(samples: &[i16]) -> Vec<f64> {
    samples.iter().map(|&sample| sample as f64 / PCM_SCALE).collect()
}

/// Center the signal around zero.
fn remove_dc_offset(signal: &mut [f64]) {
    if signal.is_empty() {
        return;
    }

    let mean = signal.iter().sum::<f64>() / signal.len() as f64;
    for sample in signal.iter_mut() {
        *sample -= mean;
    }
}

/// Scale so the loudest sample sits just under 1.0 in magnitude.
fn normalize_peak(signal: &mut [f64]) {
    let peak = signal.iter().fold(0.0_f64, |max, &x| max.max(x.abs()));
    let divisor = peak + PEAK_FLOOR;
    for sample in signal.iter_mut() {
        *sample /= divisor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_conversion() {
        let floats = pcm_to_float(&[0, 16384, -16384, -32768]);
        assert_eq!(floats, vec![0.0, 0.5, -0.5, -1.0]);
    }

    #[test]
    fn test_normalized_signal_is_centered_and_peaked() {
        // Constant offset of 1000 on top of a square wave
        let samples: Vec<i16> = (0..100).map(|i| if i % 2 == 0 { 3000 } else { -1000 }).collect();
        let waveform = Waveform::from_interleaved(samples, 1, 8000).unwrap();

        let signal = normalize_signal(&waveform);

        let mean = signal.iter().sum::<f64>() / signal.len() as f64;
        assert!(mean.abs() < 1e-9);

        let peak = signal.iter().fold(0.0_f64, |m, &x| m.max(x.abs()));
        assert!((peak - 1.0).abs() < 1e-6);
        assert!(peak < 1.0);
    }

    #[test]
    fn test_silence_stays_zero() {
        let waveform = Waveform::from_interleaved(vec![0; 64], 1, 8000).unwrap();
        let signal = normalize_signal(&waveform);
        assert!(signal.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_empty_waveform() {
        let waveform = Waveform::from_interleaved(Vec::new(), 1, 8000).unwrap();
        assert!(normalize_signal(&waveform).is_empty());
    }
}
