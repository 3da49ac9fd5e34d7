//! Phase drift correction and angle estimation
//!
//! The radio samples one antenna at a time, so the carrier keeps rotating
//! between two samples. The drift per sample interval is measured on the
//! reference period and removed from every sample, which makes the samples
//! look like they were all taken at the same instant. The phase difference of
//! two antennas then converts into an angle.
use std::f32::consts::PI;

use num_complex::Complex32;

use crate::config::AntennaId;
use crate::dfe_data::{Angles, IqSample, MappedPacket, ReferenceSamples};
use crate::errors::DfeError;

/// Propagation speed of the radio wave, in m/s.
pub const WAVE_SPEED: f32 = 299_792_458.0;

/// Two antennas of the array and their separation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AntennaPair {
    pub a: AntennaId,
    pub b: AntennaId,
    /// Distance between the antennas, in meters
    pub distance_m: f32,
}

impl AntennaPair {
    pub fn new(a: AntennaId, b: AntennaId, distance_m: f32) -> Result<Self, DfeError> {
        let pair = Self { a, b, distance_m };
        pair.validate()?;
        Ok(pair)
    }

    pub fn validate(&self) -> Result<(), DfeError> {
        if !(self.distance_m.is_finite() && self.distance_m > 0.0) {
            return Err(DfeError::InvalidArgument(format!(
                "antenna distance {} m must be positive",
                self.distance_m
            )));
        }
        if self.a == self.b || !self.a.is_valid() || !self.b.is_valid() {
            return Err(DfeError::InvalidArgument(format!(
                "antenna pair ({}, {}) must name two distinct antennas",
                self.a, self.b
            )));
        }
        Ok(())
    }
}

/// Antenna pairs used to evaluate the angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorConfig {
    pub azimuth: AntennaPair,
    /// Pair across the azimuth axis; no elevation is reported without it
    pub elevation: Option<AntennaPair>,
}

impl Default for EstimatorConfig {
    /// First two antennas of the default switch sequence, 5cm apart.
    fn default() -> Self {
        Self {
            azimuth: AntennaPair {
                a: AntennaId(12),
                b: AntennaId(1),
                distance_m: 0.05,
            },
            elevation: None,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), DfeError> {
        self.azimuth.validate()?;
        if let Some(elevation) = &self.elevation {
            elevation.validate()?;
        }
        Ok(())
    }
}

/// Outcome of [`estimate_angles`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseEstimate {
    /// Phase difference of the azimuth pair, in radians
    pub phase: f32,
    pub angles: Angles,
    /// Switching period samples summed for the azimuth pair
    pub samples_used: usize,
}

/// Reject zero and non-finite samples.
fn ensure_usable(sample: IqSample, what: &'static str) -> Result<(), DfeError> {
    if !sample.is_finite() || sample.norm_sqr() == 0.0 {
        return Err(DfeError::DegenerateSignal(what));
    }
    Ok(())
}

/// Average phase rotation between consecutive reference samples, in radians.
///
/// The value is `arg(z[k] / z[k+1])`, which is the rotation that brings a
/// sample back onto its predecessor.
pub fn estimate_phase_drift(reference: &ReferenceSamples) -> Result<f32, DfeError> {
    let samples = &reference.samples;
    if samples.len() < 2 {
        return Err(DfeError::DegenerateSignal(
            "phase drift needs at least two reference samples",
        ));
    }

    let mut sum = 0.0;
    for pair in samples.windows(2) {
        ensure_usable(pair[1], "zero magnitude or non-finite reference sample")?;
        sum += (pair[0] / pair[1]).arg();
    }

    let drift = sum / (samples.len() - 1) as f32;
    if !drift.is_finite() {
        return Err(DfeError::DegenerateSignal("non-finite reference sample"));
    }
    Ok(drift)
}

/// Rotate every sample of `packet` back to the instant of the first reference
/// sample.
///
/// Switching period sampling starts half a switch spacing after the reference
/// period, and every slot is followed by a switch slot of the same length.
/// Must run on a packet without switch slots.
pub fn correct_phase_drift(packet: &mut MappedPacket, samples_per_slot: usize, drift: f32) {
    let rotation = |delay: usize| Complex32::from_polar(1.0, drift * delay as f32);

    for (idx, sample) in packet.reference.samples.iter_mut().enumerate() {
        *sample *= rotation(idx);
    }

    let time_delay = packet.reference.samples.len() + samples_per_slot;
    let slot_stride = samples_per_slot * 2;
    for slot_idx in 0..packet.len() {
        if let Some(mut samples) = packet.slot_samples_mut(slot_idx) {
            for (idx, sample) in samples.iter_mut().enumerate() {
                *sample *= rotation(time_delay + idx + slot_idx * slot_stride);
            }
        }
    }
}

/// Phase difference between the summed samples of antennas `a` and `b`.
///
/// Returns the phase in radians and the number of samples summed.
pub fn antenna_phase_difference(
    packet: &MappedPacket,
    a: AntennaId,
    b: AntennaId,
) -> Result<(f32, usize), DfeError> {
    if a == b {
        return Err(DfeError::InvalidArgument(format!(
            "phase difference needs two distinct antennas, got {a} twice"
        )));
    }

    let mut sum_a = IqSample::new(0.0, 0.0);
    let mut sum_b = IqSample::new(0.0, 0.0);
    let mut count = 0;

    for slot in packet.slots() {
        let sum = if slot.antenna_id == a {
            &mut sum_a
        } else if slot.antenna_id == b {
            &mut sum_b
        } else {
            continue;
        };
        *sum += slot.samples.sum();
        count += slot.samples.len();
    }

    ensure_usable(sum_a, "no usable signal on the first antenna of the pair")?;
    ensure_usable(sum_b, "no usable signal on the second antenna of the pair")?;
    Ok(((sum_a / sum_b).arg(), count))
}

/// Convert a phase difference into the angle between the antenna axis and the
/// incoming wave, in degrees. A phase of zero is broadside (90°).
pub fn phase_to_angle(phase: f32, distance_m: f32, frequency_hz: f32) -> Result<f32, DfeError> {
    if !phase.is_finite() {
        return Err(DfeError::InvalidArgument(format!("phase {phase} is not finite")));
    }
    if !(distance_m.is_finite() && distance_m > 0.0) {
        return Err(DfeError::InvalidArgument(format!(
            "antenna distance {distance_m} m must be positive"
        )));
    }
    if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
        return Err(DfeError::InvalidArgument(format!(
            "frequency {frequency_hz} Hz must be positive"
        )));
    }

    let arg = (phase * WAVE_SPEED) / (2.0 * PI * frequency_hz * distance_m);
    Ok(arg.clamp(-1.0, 1.0).acos().to_degrees())
}

/// Evaluate azimuth (and elevation if configured) of a drift corrected packet.
pub fn estimate_angles(
    packet: &MappedPacket,
    config: &EstimatorConfig,
) -> Result<PhaseEstimate, DfeError> {
    let frequency_hz = packet.header.frequency as f32 * 1.0e6;
    let pair = &config.azimuth;

    let (phase, samples_used) = antenna_phase_difference(packet, pair.a, pair.b)?;
    let azimuth = phase_to_angle(phase, pair.distance_m, frequency_hz)?;

    let elevation = match &config.elevation {
        Some(pair) => {
            let (phase, _) = antenna_phase_difference(packet, pair.a, pair.b)?;
            Some(phase_to_angle(phase, pair.distance_m, frequency_hz)?)
        }
        None => None,
    };

    Ok(PhaseEstimate {
        phase,
        angles: Angles { azimuth, elevation },
        samples_used,
    })
}

/// Signal quality measured on the reference period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceStats {
    /// Average phase change between consecutive samples, in degrees
    pub phase_drift_deg: f32,
    /// Average sample magnitude
    pub magnitude: f32,
}

/// Wrap a phase into `[-PI, PI)`.
fn wrap_phase(phase: f32) -> f32 {
    (phase + PI).rem_euclid(2.0 * PI) - PI
}

/// Evaluate the quality of the reference period, as an antenna tester would.
pub fn reference_stats(reference: &ReferenceSamples) -> Result<ReferenceStats, DfeError> {
    let samples = &reference.samples;
    if samples.len() < 2 {
        return Err(DfeError::DegenerateSignal(
            "reference statistics need at least two samples",
        ));
    }

    let drift: f32 = samples
        .windows(2)
        .map(|pair| wrap_phase(pair[1].arg() - pair[0].arg()))
        .sum();
    let magnitude: f32 = samples.iter().map(|s| s.norm()).sum();

    Ok(ReferenceStats {
        phase_drift_deg: (drift / (samples.len() - 1) as f32).to_degrees(),
        magnitude: magnitude / samples.len() as f32,
    })
}
