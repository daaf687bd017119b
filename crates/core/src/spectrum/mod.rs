use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{Result, WaveSceneError};

/// Hann-windowed magnitude spectrum over a block of PCM samples.
///
/// Hosts whose audio engines deliver spectra alongside PCM can ignore
/// this; the synthetic feed and engines that only expose raw samples use
/// it to fill the spectrum channels of a slice. The FFT plan and scratch
/// space are cached and only rebuilt when the block size changes, so
/// steady-state analysis does not allocate.
pub struct SpectrumAnalyzer {
    planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    /// Computes magnitudes into `out`, resizing it to `samples.len() / 2 + 1`
    /// bins. Blocks must hold at least two samples.
    pub fn analyze(&mut self, samples: &[f32], out: &mut Vec<f32>) -> Result<()> {
        if samples.len() < 2 {
            return Err(WaveSceneError::invalid_argument(
                "spectrum analysis requires blocks with at least two samples",
            ));
        }

        let len = samples.len();
        let fft = self.prepare_fft(len);

        for (index, value) in samples.iter().enumerate() {
            fft.input[index] = *value * hann_value(index, len);
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let scale = 2.0 / len as f32;
        out.clear();
        out.extend(fft.spectrum.iter().map(|bin| bin.norm() * scale));
        Ok(())
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        let rebuild = self
            .fft
            .as_ref()
            .map(|fft| fft.size != size)
            .unwrap_or(true);

        if rebuild {
            let plan = self.planner.plan_fft_forward(size);
            let scratch = plan.make_scratch_vec();
            let spectrum = plan.make_output_vec();
            let input = plan.make_input_vec();
            self.fft = Some(FftResources {
                size,
                plan,
                scratch,
                spectrum,
                input,
            });
        }

        self.fft.as_mut().expect("fft resources must exist")
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("block_size", &self.fft.as_ref().map(|fft| fft.size))
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_blocks() {
        let mut analyzer = SpectrumAnalyzer::new();
        let mut out = Vec::new();

        assert!(analyzer.analyze(&[1.0], &mut out).is_err());
    }

    #[test]
    fn produces_half_spectrum_bins() {
        let mut analyzer = SpectrumAnalyzer::new();
        let mut out = Vec::new();

        analyzer.analyze(&vec![0.0; 64], &mut out).unwrap();

        assert_eq!(out.len(), 33);
        assert!(out.iter().all(|magnitude| *magnitude == 0.0));
    }

    #[test]
    fn sine_peaks_in_the_matching_bin() {
        let len = 128_usize;
        let cycles = 8.0_f32;
        let samples: Vec<f32> = (0..len)
            .map(|i| (2.0 * PI * cycles * i as f32 / len as f32).sin())
            .collect();

        let mut analyzer = SpectrumAnalyzer::new();
        let mut out = Vec::new();
        analyzer.analyze(&samples, &mut out).unwrap();

        let peak = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();

        assert_eq!(peak, 8);
    }

    #[test]
    fn reuses_the_plan_for_matching_block_sizes() {
        let mut analyzer = SpectrumAnalyzer::new();
        let mut out = Vec::new();

        analyzer.analyze(&vec![0.5; 64], &mut out).unwrap();
        analyzer.analyze(&vec![0.25; 64], &mut out).unwrap();
        analyzer.analyze(&vec![0.25; 32], &mut out).unwrap();

        assert_eq!(out.len(), 17);
    }
}
