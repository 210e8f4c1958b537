use log::trace;
use ndarray::{ArrayBase, ArrayView1, Data, Dimension};
use rustfft::{num_complex::Complex, FftPlanner};
use serde::Serialize;

use crate::data_loading::FrameStack;

/// Below this length the autocorrelation is summed directly; above it the
/// zero-padded FFT route is cheaper.
const DIRECT_CORRELATION_MAX_LEN: usize = 256;

/// Population statistics over a set of samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalStats {
    pub count: usize,
    pub mean: f64,
    pub variance: f64,
    pub total: f64,
}

impl SignalStats {
    pub fn compute(x: &[f64]) -> Self {
        Self::from_array(&ArrayView1::from(x))
    }

    /// Frames are pooled into one multiset of samples, not summarised per pixel.
    pub fn from_frames(frames: &FrameStack) -> Self {
        Self::from_array(frames.array())
    }

    fn from_array<S, D>(data: &ArrayBase<S, D>) -> Self
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let count = data.len();
        let (mean, variance) = match data.mean() {
            Some(mean) => (mean, data.var(0.0)),
            None => (f64::NAN, f64::NAN),
        };
        Self {
            count,
            mean,
            variance,
            total: data.sum(),
        }
    }
}

pub fn mean(x: &[f64]) -> f64 {
    SignalStats::compute(x).mean
}

pub fn variance(x: &[f64]) -> f64 {
    SignalStats::compute(x).variance
}

pub fn sum(x: &[f64]) -> f64 {
    x.iter().sum()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Autocorrelation {
    pub lags: Vec<i64>,
    pub values: Vec<f64>,
}

impl Autocorrelation {
    pub fn compute(x: &[f64]) -> Self {
        Self {
            lags: lag_axis(x.len()),
            values: autocorrelation(x),
        }
    }

    pub fn at_lag(&self, lag: i64) -> Option<f64> {
        let zero = self.lags.first().map(|first| -first)?;
        let idx = usize::try_from(lag + zero).ok()?;
        self.values.get(idx).copied()
    }
}

/// Symmetric lag axis `-(n-1)..=(n-1)` matching [`autocorrelation`] output.
pub fn lag_axis(n: usize) -> Vec<i64> {
    if n == 0 {
        return Vec::new();
    }
    let max_lag = n as i64 - 1;
    (-max_lag..=max_lag).collect()
}

/// Full cross-correlation of `x` with itself, every output divided by
/// `x.len()`. Output index `i` holds lag `i - (n - 1)`.
pub fn autocorrelation(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    if n <= DIRECT_CORRELATION_MAX_LEN {
        autocorrelation_direct(x)
    } else {
        autocorrelation_fft(x)
    }
}

fn autocorrelation_direct(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    let max_lag = n - 1;
    (0..2 * n - 1)
        .map(|i| {
            let lag = i.abs_diff(max_lag);
            x[..n - lag]
                .iter()
                .zip(&x[lag..])
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / n as f64
        })
        .collect()
}

fn autocorrelation_fft(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    // Linear (not circular) correlation needs at least 2n-1 points.
    let size = (2 * n - 1).next_power_of_two();
    trace!("Autocorrelation of {} samples via {}-point FFT", n, size);

    let mut planner = FftPlanner::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let mut buffer: Vec<Complex<f64>> = x
        .iter()
        .map(|&v| Complex::new(v, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();

    forward.process(&mut buffer);
    for c in buffer.iter_mut() {
        *c = Complex::new(c.norm_sqr(), 0.0);
    }
    inverse.process(&mut buffer);

    // rustfft leaves the inverse unnormalised
    let scale = (size * n) as f64;
    let positive: Vec<f64> = buffer[..n].iter().map(|c| c.re / scale).collect();

    // Negative lags mirror the positive ones so the output is exactly even.
    positive[1..]
        .iter()
        .rev()
        .chain(positive.iter())
        .copied()
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Spectrum {
    pub frequencies: Vec<f64>,
    pub magnitudes: Vec<f64>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Strongest non-DC bin as `(frequency, magnitude)`.
    pub fn dominant(&self) -> Option<(f64, f64)> {
        self.frequencies
            .iter()
            .zip(&self.magnitudes)
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(&f, &m)| (f, m))
    }
}

/// Magnitude spectrum at unit sample spacing, non-negative half only:
/// bins `0..n/2` with frequency `k / n`.
pub fn fft_spectrum(x: &[f64]) -> Spectrum {
    let n = x.len();
    let half = n / 2;
    if half == 0 {
        return Spectrum::default();
    }

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);

    let mut buffer: Vec<Complex<f64>> = x.iter().map(|&v| Complex::new(v, 0.0)).collect();
    fft.process(&mut buffer);

    Spectrum {
        frequencies: (0..half).map(|k| k as f64 / n as f64).collect(),
        magnitudes: buffer[..half].iter().map(|c| c.norm()).collect(),
    }
}

/// Collapse each frame to its total pressure.
pub fn pressure_over_time(frames: &FrameStack) -> Vec<f64> {
    frames.frames().map(|frame| frame.sum()).collect()
}

/// Statistics plus signal-domain views of one recording.
#[derive(Debug, Clone, Serialize)]
pub struct SignalAnalysis {
    pub stats: SignalStats,
    /// The series the autocorrelation and spectrum were computed from.
    pub series: Vec<f64>,
    pub autocorrelation: Autocorrelation,
    pub spectrum: Spectrum,
}

pub fn analyze_signal(x: &[f64]) -> SignalAnalysis {
    SignalAnalysis {
        stats: SignalStats::compute(x),
        series: x.to_vec(),
        autocorrelation: Autocorrelation::compute(x),
        spectrum: fft_spectrum(x),
    }
}

/// Stats over all samples; autocorrelation and spectrum over the
/// pressure-over-time series.
pub fn analyze_frames(frames: &FrameStack) -> SignalAnalysis {
    let series = pressure_over_time(frames);
    SignalAnalysis {
        stats: SignalStats::from_frames(frames),
        autocorrelation: Autocorrelation::compute(&series),
        spectrum: fft_spectrum(&series),
        series,
    }
}
