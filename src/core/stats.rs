//! Per-channel histograms, mean and variance of host image bytes.
//!
//! Channels 0..2 are the colour channels; channel 3 aggregates all three.
//! Mean and variance are over normalised values (`v / 255`).

use rayon::prelude::*;

/// Index of the aggregate channel.
pub const AGGREGATE: usize = 3;

/// 256-bin histogram per channel.
pub type Histograms = [[u32; 256]; 4];

/// Cached statistics of one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageStats {
    /// Bin counts per channel, channel 3 is the sum of channels 0..2.
    pub histograms: Box<Histograms>,
    /// Mean of normalised values per channel.
    pub mean: [f32; 4],
    /// Population variance of normalised values per channel.
    pub variance: [f32; 4],
}

impl ImageStats {
    /// Derive mean and variance from finished histograms.
    pub fn from_histograms(histograms: Box<Histograms>) -> Self {
        let mut mean = [0.0f32; 4];
        let mut variance = [0.0f32; 4];
        for channel in 0..4 {
            let (mut n, mut sum, mut sum_sq) = (0u64, 0.0f64, 0.0f64);
            for (v, &count) in histograms[channel].iter().enumerate() {
                let x = v as f64 / 255.0;
                n += count as u64;
                sum += count as f64 * x;
                sum_sq += count as f64 * x * x;
            }
            if n > 0 {
                let m = sum / n as f64;
                mean[channel] = m as f32;
                variance[channel] = (sum_sq / n as f64 - m * m).max(0.0) as f32;
            }
        }
        Self {
            histograms,
            mean,
            variance,
        }
    }

    /// Compute statistics of interleaved RGB bytes.
    pub fn compute(rgb: &[u8]) -> Self {
        let histograms = rgb
            .par_chunks(3 * 4096)
            .fold(HistogramAccumulator::default, |mut acc, chunk| {
                acc.add_pixels(chunk);
                acc
            })
            .reduce(HistogramAccumulator::default, HistogramAccumulator::merge);
        Self::from_histograms(histograms.finish())
    }
}

/// Running histogram, fed pixel by pixel during upload.
#[derive(Debug, Clone)]
pub(crate) struct HistogramAccumulator {
    bins: Box<Histograms>,
}

impl Default for HistogramAccumulator {
    fn default() -> Self {
        Self {
            bins: Box::new([[0; 256]; 4]),
        }
    }
}

impl HistogramAccumulator {
    pub(crate) fn add_pixel(&mut self, r: u8, g: u8, b: u8) {
        for (channel, v) in [r, g, b].into_iter().enumerate() {
            self.bins[channel][v as usize] += 1;
            self.bins[AGGREGATE][v as usize] += 1;
        }
    }

    pub(crate) fn add_pixels(&mut self, rgb: &[u8]) {
        for px in rgb.chunks_exact(3) {
            self.add_pixel(px[0], px[1], px[2]);
        }
    }

    pub(crate) fn merge(mut self, other: Self) -> Self {
        for (mine, theirs) in self.bins.iter_mut().zip(other.bins.iter()) {
            for (a, b) in mine.iter_mut().zip(theirs.iter()) {
                *a += *b;
            }
        }
        self
    }

    pub(crate) fn finish(self) -> Box<Histograms> {
        self.bins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_solid_colour() {
        let rgb: Vec<u8> = [255u8, 0, 51].repeat(100);
        let stats = ImageStats::compute(&rgb);
        assert_eq!(stats.histograms[0][255], 100);
        assert_eq!(stats.histograms[1][0], 100);
        assert_eq!(stats.histograms[2][51], 100);
        assert_eq!(stats.histograms[AGGREGATE][255], 100);
        assert!((stats.mean[0] - 1.0).abs() < 1e-6);
        assert!((stats.mean[2] - 0.2).abs() < 1e-6);
        assert!(stats.variance[0].abs() < 1e-6);
        assert!((stats.mean[AGGREGATE] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_variance_two_levels() {
        let mut rgb = vec![0u8; 3 * 2];
        rgb[0] = 255;
        let stats = ImageStats::compute(&rgb);
        assert!((stats.mean[0] - 0.5).abs() < 1e-6);
        assert!((stats.variance[0] - 0.25).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn aggregate_is_sum_of_channels(pixels in prop::collection::vec(any::<u8>(), 3..3000)) {
            let len = pixels.len() - pixels.len() % 3;
            let stats = ImageStats::compute(&pixels[..len]);
            for v in 0..256 {
                let sum: u32 = (0..3).map(|c| stats.histograms[c][v]).sum();
                prop_assert_eq!(stats.histograms[AGGREGATE][v], sum);
            }
            let total: u32 = stats.histograms[AGGREGATE].iter().sum();
            prop_assert_eq!(total as usize, len);
        }
    }
}
