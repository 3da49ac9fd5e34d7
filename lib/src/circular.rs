//! Circular statistics over angles in degrees
//!
//! Angles are averaged as unit vectors, so that 350° and 10° average to 0°
//! instead of 180°. The filters keep their history in a fixed size
//! [`RingBuffer`].
use num_complex::Complex32;

use crate::errors::DfeError;

/// Capacity of the angle history buffers (one slot stays free).
pub const RING_CAPACITY: usize = 20;

/// Reject angles outside `[0, 360)` degrees, NaN included.
pub(crate) fn check_angle(degrees: f32) -> Result<(), DfeError> {
    if !(0.0..360.0).contains(&degrees) {
        return Err(DfeError::InvalidArgument(format!(
            "angle {degrees} is outside [0, 360)"
        )));
    }
    Ok(())
}

/// Convert an angle in `[0, 360)` degrees to a unit vector.
pub fn angle_to_vector(degrees: f32) -> Result<Complex32, DfeError> {
    check_angle(degrees)?;
    Ok(Complex32::from_polar(1.0, degrees.to_radians()))
}

/// Convert a vector to its angle in `[0, 360)` degrees.
///
/// The vector does not need to be normalized. A zero vector yields 0°.
pub fn vector_to_angle(vector: Complex32) -> f32 {
    let mut degrees = vector.im.atan2(vector.re).to_degrees();
    if degrees < 0.0 {
        degrees += 360.0;
    }
    // -tiny + 360 rounds up to 360 in f32
    if degrees >= 360.0 {
        degrees = 0.0;
    }
    degrees
}

/// Fixed capacity FIFO that overwrites its oldest entry when full.
///
/// One of the `N` slots is kept free to tell a full buffer from an empty one,
/// so at most `N - 1` values are held.
#[derive(Debug, Clone)]
pub struct RingBuffer<T, const N: usize> {
    data: [T; N],
    head: usize,
    tail: usize,
}

impl<T: Copy + Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default, const N: usize> RingBuffer<T, N> {
    pub fn new() -> Self {
        assert!(N >= 2, "ring buffer needs at least two slots");
        Self {
            data: [T::default(); N],
            head: 0,
            tail: 0,
        }
    }

    /// Number of values held.
    pub fn len(&self) -> usize {
        (self.head + N - self.tail) % N
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// True once `N - 1` values are held.
    pub fn is_full(&self) -> bool {
        (self.head + 1) % N == self.tail
    }

    /// Largest number of values the buffer holds.
    pub const fn depth(&self) -> usize {
        N - 1
    }

    /// Append a value. Returns the evicted oldest value if the buffer was full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.is_full() { self.pop() } else { None };
        self.data[self.head] = value;
        self.head = (self.head + 1) % N;
        evicted
    }

    /// Remove and return the oldest value.
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let value = self.data[self.tail];
        self.tail = (self.tail + 1) % N;
        Some(value)
    }

    /// Iterate from the oldest to the newest value.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len()).map(move |offset| &self.data[(self.tail + offset) % N])
    }

    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
    }
}

/// Windowed circular mean over the latest `RING_CAPACITY - 1` angles.
#[derive(Debug, Clone, Default)]
pub struct CircularMean {
    vectors: RingBuffer<Complex32, RING_CAPACITY>,
    sum: Complex32,
}

impl CircularMean {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an angle and return the mean of the window, in degrees.
    pub fn update(&mut self, degrees: f32) -> Result<f32, DfeError> {
        let vector = angle_to_vector(degrees)?;
        if let Some(oldest) = self.vectors.push(vector) {
            self.sum -= oldest;
        }
        self.sum += vector;
        Ok(vector_to_angle(self.sum))
    }

    /// Number of angles in the window.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn reset(&mut self) {
        self.vectors.reset();
        self.sum = Complex32::new(0.0, 0.0);
    }
}

/// First order IIR smoothing of the raw degree value.
///
/// Not wrap aware: a track crossing 0°/360° is dragged through 180°.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IirFilter {
    alpha: f32,
    state: f32,
}

impl IirFilter {
    /// Create a filter with smoothing factor `alpha` in `[0, 1]`.
    ///
    /// `alpha = 1` follows the input, `alpha = 0` holds the state. The state
    /// starts at 0°.
    pub fn new(alpha: f32) -> Result<Self, DfeError> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(DfeError::InvalidArgument(format!(
                "IIR coefficient {alpha} is outside [0, 1]"
            )));
        }
        Ok(Self { alpha, state: 0.0 })
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Feed an angle in `[0, 360)`; anything else leaves the state untouched.
    pub fn update(&mut self, degrees: f32) -> Result<f32, DfeError> {
        check_angle(degrees)?;
        self.state -= self.alpha * (self.state - degrees);
        Ok(self.state)
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

/// Weights of the FIR filter for `n` buffered values, oldest first.
///
/// Weights grow linearly (`a, 2a, ..., na` with `a = 2 / (n (n + 1))`) and sum
/// to one.
pub fn fir_weights(n: usize) -> impl Iterator<Item = f32> {
    let alpha = if n == 0 {
        0.0
    } else {
        2.0 / (n as f32 * (n as f32 + 1.0))
    };
    (1..=n).map(move |k| k as f32 * alpha)
}

/// Linearly weighted FIR smoothing in the vector domain.
#[derive(Debug, Clone, Default)]
pub struct FirFilter {
    vectors: RingBuffer<Complex32, RING_CAPACITY>,
}

impl FirFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an angle and return the weighted mean of the window, in degrees.
    pub fn update(&mut self, degrees: f32) -> Result<f32, DfeError> {
        self.vectors.push(angle_to_vector(degrees)?);

        let sum: Complex32 = self
            .vectors
            .iter()
            .zip(fir_weights(self.vectors.len()))
            .map(|(vector, weight)| *vector * weight)
            .sum();
        Ok(vector_to_angle(sum))
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn reset(&mut self) {
        self.vectors.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-3;

    /// Distance of two angles on the circle
    fn angle_diff(a: f32, b: f32) -> f32 {
        let d = (a - b).rem_euclid(360.0);
        d.min(360.0 - d)
    }

    #[test]
    fn vector_round_trip() {
        let mut degrees = 0.0f32;
        while degrees < 360.0 {
            let back = vector_to_angle(angle_to_vector(degrees).unwrap());
            assert!(
                angle_diff(back, degrees) < EPSILON,
                "{degrees} came back as {back}"
            );
            assert!((0.0..360.0).contains(&back));
            degrees += 0.5;
        }
    }

    #[test]
    fn out_of_range_angles_are_rejected() {
        assert!(angle_to_vector(360.0).is_err());
        assert!(angle_to_vector(-0.1).is_err());
        assert!(angle_to_vector(f32::NAN).is_err());
    }

    #[test]
    fn vector_to_angle_normalizes() {
        assert!((vector_to_angle(Complex32::new(0.0, -2.0)) - 270.0).abs() < EPSILON);
        assert_eq!(vector_to_angle(Complex32::new(1.0, -1e-9)), 0.0);
        assert_eq!(vector_to_angle(Complex32::new(0.0, 0.0)), 0.0);
    }

    #[test]
    fn mean_across_wraparound() {
        let mut mean = CircularMean::new();
        mean.update(10.0).unwrap();
        let result = mean.update(350.0).unwrap();
        assert!(angle_diff(result, 0.0) < EPSILON, "got {result}");
    }

    #[test]
    fn mean_window_drops_oldest() {
        let mut mean = CircularMean::new();
        for _ in 0..RING_CAPACITY {
            mean.update(90.0).unwrap();
        }
        // After a full window of new values the old ones no longer count
        let mut result = 0.0;
        for _ in 0..RING_CAPACITY - 1 {
            result = mean.update(180.0).unwrap();
        }
        assert!(angle_diff(result, 180.0) < EPSILON);
        assert_eq!(mean.len(), RING_CAPACITY - 1);
    }

    #[test]
    fn ring_buffer_keeps_latest_values() {
        let mut ring: RingBuffer<u32, RING_CAPACITY> = RingBuffer::new();
        for value in 0..25 {
            ring.push(value);
            assert_eq!(ring.is_full(), ring.len() == RING_CAPACITY - 1);
        }
        assert_eq!(ring.len(), 19);
        assert!(ring.is_full());
        let held: Vec<u32> = ring.iter().copied().collect();
        assert_eq!(held, (6..25).collect::<Vec<_>>());
    }

    #[test]
    fn ring_buffer_push_pop() {
        let mut ring: RingBuffer<u8, 4> = RingBuffer::new();
        assert!(ring.is_empty());
        assert_eq!(ring.pop(), None);
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.push(3), None);
        assert!(ring.is_full());
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.len(), 2);
        ring.reset();
        assert!(ring.is_empty());
        assert_eq!(ring.depth(), 3);
    }

    #[test]
    fn fir_weights_sum_to_one() {
        for n in 1..RING_CAPACITY {
            let weights: Vec<f32> = fir_weights(n).collect();
            assert_eq!(weights.len(), n);
            let sum: f32 = weights.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "n = {n}: {sum}");
            assert!(weights.windows(2).all(|w| w[0] < w[1]));
        }
        assert_eq!(fir_weights(0).count(), 0);
    }

    #[test]
    fn fir_favours_recent_angles() {
        let mut fir = FirFilter::new();
        fir.update(0.0).unwrap();
        let result = fir.update(90.0).unwrap();
        // weights 1/3 and 2/3
        let expected = vector_to_angle(Complex32::new(1.0 / 3.0, 2.0 / 3.0));
        assert!((result - expected).abs() < EPSILON);
        assert!(result > 45.0);
    }

    #[test]
    fn fir_across_wraparound() {
        let mut fir = FirFilter::new();
        fir.update(355.0).unwrap();
        let result = fir.update(5.0).unwrap();
        assert!(angle_diff(result, 1.666) < 0.1, "got {result}");
    }

    #[test]
    fn iir_alpha_is_validated() {
        assert!(IirFilter::new(-0.01).is_err());
        assert!(IirFilter::new(1.01).is_err());
        assert!(IirFilter::new(f32::NAN).is_err());
        assert!(IirFilter::new(0.0).is_ok());
        assert!(IirFilter::new(1.0).is_ok());
    }

    #[test]
    fn iir_smooths_raw_degrees() {
        let mut iir = IirFilter::new(0.5).unwrap();
        assert_eq!(iir.update(100.0).unwrap(), 50.0);
        assert_eq!(iir.update(100.0).unwrap(), 75.0);

        let mut follow = IirFilter::new(1.0).unwrap();
        assert_eq!(follow.update(42.0).unwrap(), 42.0);

        iir.reset();
        assert_eq!(iir.update(10.0).unwrap(), 5.0);
    }

    #[test]
    fn iir_state_survives_bad_input() {
        let mut iir = IirFilter::new(0.5).unwrap();
        assert_eq!(iir.update(100.0).unwrap(), 50.0);
        assert!(matches!(iir.update(f32::NAN), Err(DfeError::InvalidArgument(_))));
        assert!(iir.update(360.0).is_err());
        assert!(iir.update(-1.0).is_err());
        assert_eq!(iir.update(100.0).unwrap(), 75.0);
    }
}
