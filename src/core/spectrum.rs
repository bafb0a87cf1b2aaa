//! Spectrum analysis
//!
//! Hann-windowed radix-2 FFT over fixed-size frames. Magnitudes are
//! reported in dBFS: a full-scale sine reads ~0 dB at its bin.

use std::f64::consts::PI;
use std::ops::RangeInclusive;

use crate::types::{ChallengeError, FrequencyBand};

/// Magnitude reported for an empty bin (dBFS)
pub const MAGNITUDE_FLOOR_DB: f64 = -240.0;

/// Strongest bin inside a band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralPeak {
    /// Interpolated peak frequency (Hz)
    pub hz: f64,
    pub magnitude_db: f64,
    pub bin: usize,
}

/// Reusable analyzer for one (sample rate, transform size) pair
pub struct SpectrumAnalyzer {
    sample_rate: u32,
    size: usize,
    window: Vec<f64>,
    window_sum: f64,
    re: Vec<f64>,
    im: Vec<f64>,
}

impl SpectrumAnalyzer {
    pub fn new(sample_rate: u32, size: usize) -> Result<Self, ChallengeError> {
        if !size.is_power_of_two() || size < 256 {
            return Err(ChallengeError::InvalidTransformSize(size));
        }
        let window = hann_window(size);
        let window_sum = window.iter().sum();
        Ok(Self {
            sample_rate,
            size,
            window,
            window_sum,
            re: vec![0.0; size],
            im: vec![0.0; size],
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn bin_width_hz(&self) -> f64 {
        self.sample_rate as f64 / self.size as f64
    }

    /// Bins whose center lies inside `band`, None if the band falls
    /// between bins or above Nyquist
    pub fn band_bins(&self, band: &FrequencyBand) -> Option<RangeInclusive<usize>> {
        let bw = self.bin_width_hz();
        let lo = (band.low_hz / bw).ceil().max(1.0) as usize;
        let hi = ((band.high_hz / bw).floor() as usize).min(self.size / 2 - 1);
        (lo <= hi).then_some(lo..=hi)
    }

    /// Transform one frame. `frame.len()` must equal the transform size.
    fn transform(&mut self, frame: &[f32]) {
        for (i, (&x, &w)) in frame.iter().zip(&self.window).enumerate() {
            self.re[i] = x as f64 * w;
            self.im[i] = 0.0;
        }
        fft_in_place(&mut self.re, &mut self.im);
    }

    fn bin_db(&self, k: usize) -> f64 {
        let mag = (self.re[k] * self.re[k] + self.im[k] * self.im[k]).sqrt();
        let amplitude = 2.0 * mag / self.window_sum;
        if amplitude > 0.0 {
            (20.0 * amplitude.log10()).max(MAGNITUDE_FLOOR_DB)
        } else {
            MAGNITUDE_FLOOR_DB
        }
    }

    /// Strongest in-band peak of one frame.
    /// Returns None for a short frame or a band with no bins.
    pub fn band_peak(&mut self, frame: &[f32], band: &FrequencyBand) -> Option<SpectralPeak> {
        if frame.len() != self.size {
            return None;
        }
        let bins = self.band_bins(band)?;
        self.transform(frame);

        let mut best: Option<(usize, f64)> = None;
        for k in bins {
            let db = self.bin_db(k);
            if best.map_or(true, |(_, b)| db > b) {
                best = Some((k, db));
            }
        }
        let (k, b) = best?;

        // Parabolic interpolation on log magnitude
        let a = self.bin_db(k - 1);
        let c = self.bin_db(k + 1);
        let denom = a - 2.0 * b + c;
        let p = if denom < 0.0 {
            (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        let hz = ((k as f64 + p) * self.bin_width_hz()).clamp(band.low_hz, band.high_hz);
        let magnitude_db = b - 0.25 * (a - c) * p;

        Some(SpectralPeak {
            hz,
            magnitude_db,
            bin: k,
        })
    }
}

/// Periodic Hann window
pub fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

/// Iterative radix-2 Cooley-Tukey FFT. Buffers of unequal length, or
/// not a power of two, are left untouched.
fn fft_in_place(re: &mut [f64], im: &mut [f64]) {
    let n = re.len();
    if n != im.len() || !n.is_power_of_two() || n < 2 {
        return;
    }

    // Bit-reversal permutation
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f64;
        let (w_im, w_re) = angle.sin_cos();
        for start in (0..n).step_by(len) {
            let mut cur_re = 1.0;
            let mut cur_im = 0.0;
            for k in 0..len / 2 {
                let a = start + k;
                let b = a + len / 2;
                let t_re = re[b] * cur_re - im[b] * cur_im;
                let t_im = re[b] * cur_im + im[b] * cur_re;
                re[b] = re[a] - t_re;
                im[b] = im[a] - t_im;
                re[a] += t_re;
                im[a] += t_im;

                let next_re = cur_re * w_re - cur_im * w_im;
                cur_im = cur_re * w_im + cur_im * w_re;
                cur_re = next_re;
            }
        }
        len <<= 1;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(hz: f64, amplitude: f64, sample_rate: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (amplitude * (2.0 * PI * hz * i as f64 / sample_rate as f64).sin()) as f32)
            .collect()
    }

    #[test]
    fn test_fft_impulse_is_flat() {
        let mut re = vec![0.0; 8];
        let mut im = vec![0.0; 8];
        re[0] = 1.0;
        fft_in_place(&mut re, &mut im);
        for k in 0..8 {
            assert!((re[k] - 1.0).abs() < 1e-12);
            assert!(im[k].abs() < 1e-12);
        }
    }

    #[test]
    fn test_fft_single_cosine() {
        let n = 16;
        let mut re: Vec<f64> = (0..n).map(|i| (2.0 * PI * 3.0 * i as f64 / n as f64).cos()).collect();
        let mut im = vec![0.0; n];
        fft_in_place(&mut re, &mut im);
        assert!((re[3] - 8.0).abs() < 1e-9);
        assert!((re[13] - 8.0).abs() < 1e-9);
        assert!(re[5].abs() < 1e-9);
    }

    #[test]
    fn test_fft_leaves_unusable_buffers_alone() {
        let mut re = vec![1.0, 2.0, 3.0, 4.0];
        let mut im = vec![0.0; 3];
        fft_in_place(&mut re, &mut im);
        assert_eq!(re, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(im, vec![0.0; 3]);

        let mut re = vec![1.0, 2.0, 3.0];
        let mut im = vec![0.0; 3];
        fft_in_place(&mut re, &mut im);
        assert_eq!(re, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_rejects_bad_size() {
        assert!(SpectrumAnalyzer::new(48_000, 1000).is_err());
        assert!(SpectrumAnalyzer::new(48_000, 128).is_err());
        assert!(SpectrumAnalyzer::new(48_000, 4096).is_ok());
    }

    #[test]
    fn test_band_bins() {
        let a = SpectrumAnalyzer::new(48_000, 32_768).unwrap();
        let band = FrequencyBand::new(18_999.0, 19_401.0).unwrap();
        let bins = a.band_bins(&band).unwrap();
        assert!(*bins.start() as f64 * a.bin_width_hz() >= 18_999.0);
        assert!(*bins.end() as f64 * a.bin_width_hz() <= 19_401.0);
        assert_eq!(bins.count(), 275);
    }

    #[test]
    fn test_peak_locates_tone() {
        let mut a = SpectrumAnalyzer::new(48_000, 8192).unwrap();
        let band = FrequencyBand::new(18_999.0, 19_401.0).unwrap();
        let frame = sine(19_200.0, 0.5, 48_000, 8192);

        let peak = a.band_peak(&frame, &band).unwrap();
        assert!((peak.hz - 19_200.0).abs() < a.bin_width_hz() / 2.0, "got {}", peak.hz);
        // 0.5 full scale ≈ -6 dBFS, minus at most Hann scalloping
        assert!(peak.magnitude_db > -8.0 && peak.magnitude_db < -5.0, "got {}", peak.magnitude_db);
    }

    #[test]
    fn test_silence_reads_floor() {
        let mut a = SpectrumAnalyzer::new(48_000, 4096).unwrap();
        let band = FrequencyBand::new(18_999.0, 19_401.0).unwrap();
        let peak = a.band_peak(&vec![0.0; 4096], &band).unwrap();
        assert_eq!(peak.magnitude_db, MAGNITUDE_FLOOR_DB);
    }

    #[test]
    fn test_short_frame_is_ignored() {
        let mut a = SpectrumAnalyzer::new(48_000, 4096).unwrap();
        let band = FrequencyBand::new(18_999.0, 19_401.0).unwrap();
        assert!(a.band_peak(&vec![0.0; 100], &band).is_none());
    }
}
