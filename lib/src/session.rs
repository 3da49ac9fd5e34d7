//! Per source smoothing state and the processing pipeline
//!
//! A [`Session`] holds the angle history of one tracked source. The
//! [`Pipeline`] is shared by all sessions of a locator: it borrows the
//! configuration and runs every step from raw samples to a smoothed angle.
use crate::circular::{check_angle, CircularMean, FirFilter, IirFilter};
use crate::config::{AntennaConfig, SamplingConfig};
use crate::dfe_data::{Angles, AoaResult, DfeReport, RawPacket};
use crate::errors::DfeError;
use crate::mapping::{map_iq_samples_to_antennas, remove_switch_slot_samples};
use crate::phase::{correct_phase_drift, estimate_angles, estimate_phase_drift, EstimatorConfig};
use crate::timing::SamplingTiming;

/// How successive angles are smoothed
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SmoothingMode {
    /// Report the raw angles
    None,
    /// Windowed circular mean
    #[default]
    CircularMean,
    /// IIR filter on the raw degree value
    Iir { alpha: f32 },
    /// Linearly weighted FIR filter
    Fir,
}

impl std::str::FromStr for SmoothingMode {
    type Err = String;

    /// Parse `none`, `mean`, `fir` or `iir:<alpha>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        match lower.as_str() {
            "none" => Ok(Self::None),
            "mean" | "circular-mean" => Ok(Self::CircularMean),
            "fir" => Ok(Self::Fir),
            _ => match lower.strip_prefix("iir:") {
                Some(alpha) => alpha
                    .parse()
                    .map(|alpha| Self::Iir { alpha })
                    .map_err(|_| format!("Invalid IIR coefficient: {}", alpha)),
                None => Err(format!("Invalid smoothing mode: {}", s)),
            },
        }
    }
}

/// Smoothing state of one angle stream
#[derive(Debug, Clone)]
enum AngleFilter {
    None,
    Mean(CircularMean),
    Iir(IirFilter),
    Fir(FirFilter),
}

impl AngleFilter {
    fn new(mode: SmoothingMode) -> Result<Self, DfeError> {
        Ok(match mode {
            SmoothingMode::None => Self::None,
            SmoothingMode::CircularMean => Self::Mean(CircularMean::new()),
            SmoothingMode::Iir { alpha } => Self::Iir(IirFilter::new(alpha)?),
            SmoothingMode::Fir => Self::Fir(FirFilter::new()),
        })
    }

    fn update(&mut self, degrees: f32) -> Result<f32, DfeError> {
        match self {
            Self::None => Ok(degrees),
            Self::Mean(mean) => mean.update(degrees),
            Self::Iir(iir) => iir.update(degrees),
            Self::Fir(fir) => fir.update(degrees),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::None => {}
            Self::Mean(mean) => mean.reset(),
            Self::Iir(iir) => iir.reset(),
            Self::Fir(fir) => fir.reset(),
        }
    }
}

/// Angle history of one tracked source
#[derive(Debug, Clone)]
pub struct Session {
    mode: SmoothingMode,
    azimuth: AngleFilter,
    elevation: AngleFilter,
    steps: u64,
}

impl Session {
    pub fn new(mode: SmoothingMode) -> Result<Self, DfeError> {
        Ok(Self {
            mode,
            azimuth: AngleFilter::new(mode)?,
            elevation: AngleFilter::new(mode)?,
            steps: 0,
        })
    }

    pub fn mode(&self) -> SmoothingMode {
        self.mode
    }

    /// Number of angles smoothed since creation or the last reset.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Forget the angle history.
    pub fn reset(&mut self) {
        self.azimuth.reset();
        self.elevation.reset();
        self.steps = 0;
    }

    /// Smooth a new pair of angles with the session history.
    ///
    /// Angles outside `[0, 360)` are rejected before either history changes.
    pub fn step(&mut self, raw: Angles) -> Result<Angles, DfeError> {
        check_angle(raw.azimuth)?;
        if let Some(elevation) = raw.elevation {
            check_angle(elevation)?;
        }

        let azimuth = self.azimuth.update(raw.azimuth)?;
        let elevation = match raw.elevation {
            Some(elevation) => Some(self.elevation.update(elevation)?),
            None => None,
        };
        self.steps += 1;
        Ok(Angles { azimuth, elevation })
    }
}

/// Processing steps from a raw CTE to an angle of arrival
#[derive(Debug, Clone)]
pub struct Pipeline<'a> {
    sampling: &'a SamplingConfig,
    antennas: &'a AntennaConfig,
    timing: SamplingTiming,
    estimator: EstimatorConfig,
}

impl<'a> Pipeline<'a> {
    /// Check the configuration and derive its timing.
    pub fn new(
        sampling: &'a SamplingConfig,
        antennas: &'a AntennaConfig,
        estimator: EstimatorConfig,
    ) -> Result<Self, DfeError> {
        antennas.validate()?;
        estimator.validate()?;
        let timing = SamplingTiming::new(sampling)?;
        Ok(Self {
            sampling,
            antennas,
            timing,
            estimator,
        })
    }

    pub fn sampling(&self) -> &SamplingConfig {
        self.sampling
    }

    pub fn antennas(&self) -> &AntennaConfig {
        self.antennas
    }

    pub fn timing(&self) -> &SamplingTiming {
        &self.timing
    }

    pub fn estimator(&self) -> &EstimatorConfig {
        &self.estimator
    }

    /// Run a raw packet through all steps and smooth the result in `session`.
    pub fn process(&self, raw: &RawPacket, session: &mut Session) -> Result<DfeReport, DfeError> {
        let mut mapped = map_iq_samples_to_antennas(raw, &self.timing, self.antennas)?;
        let removed = remove_switch_slot_samples(&mut mapped);
        log::trace!("Removed {} switch slots, {} left", removed, mapped.len());

        let drift = estimate_phase_drift(&mapped.reference)?;
        correct_phase_drift(&mut mapped, self.timing.samples_per_slot, drift);
        log::trace!("Corrected phase drift of {:.4} rad/sample", drift);

        let estimate = estimate_angles(&mapped, &self.estimator)?;
        let filtered = session.step(estimate.angles)?;
        log::debug!(
            "{} MHz: phase {:.3} rad, azimuth {:.1} -> {:.1} deg",
            mapped.header.frequency,
            estimate.phase,
            estimate.angles.azimuth,
            filtered.azimuth
        );

        Ok(DfeReport {
            result: AoaResult {
                frequency: mapped.header.frequency,
                phase: estimate.phase,
                raw: estimate.angles,
                filtered,
                samples_used: estimate.samples_used,
            },
            timing: self.timing,
            #[cfg(feature = "raw_iq")]
            mapped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AntennaId, SampleSpacing, SwitchSpacing};
    use crate::dfe_data::IqSample;
    use crate::phase::AntennaPair;
    use num_complex::Complex32;

    const EPSILON: f32 = 1e-2;

    fn sampling() -> SamplingConfig {
        SamplingConfig {
            switch_spacing: SwitchSpacing::Us2,
            sample_spacing: SampleSpacing::Ns250,
            sample_spacing_ref: SampleSpacing::Ns250,
            ..Default::default()
        }
    }

    /// Tone rotating by a fixed step per sample, received with `offset`
    /// radians more phase on antenna 1 than on every other antenna.
    fn packet(timing: &SamplingTiming, antennas: &AntennaConfig, offset: f32) -> RawPacket {
        let step = -0.4;
        let len = timing.required_raw_samples();
        let per_slot = timing.samples_per_slot;
        let samples = (0..len)
            .map(|idx| {
                let mut phase = step * idx as f32;
                if idx >= timing.reference_samples {
                    let slot = (idx - timing.reference_samples) / per_slot;
                    let ant = antennas.switch_sequence[(slot / 2) % antennas.switch_sequence.len()];
                    if slot % 2 == 0 && ant == AntennaId(1) {
                        phase += offset;
                    }
                }
                Complex32::from_polar(100.0, phase)
            })
            .collect();
        RawPacket::new(2440, samples)
    }

    fn estimator() -> EstimatorConfig {
        EstimatorConfig {
            azimuth: AntennaPair::new(AntennaId(12), AntennaId(1), 0.05).unwrap(),
            elevation: None,
        }
    }

    #[test]
    fn smoothing_mode_from_str() {
        assert_eq!("none".parse::<SmoothingMode>().unwrap(), SmoothingMode::None);
        assert_eq!("Mean".parse::<SmoothingMode>().unwrap(), SmoothingMode::CircularMean);
        assert_eq!("fir".parse::<SmoothingMode>().unwrap(), SmoothingMode::Fir);
        assert_eq!(
            "iir:0.25".parse::<SmoothingMode>().unwrap(),
            SmoothingMode::Iir { alpha: 0.25 }
        );
        assert!("iir:x".parse::<SmoothingMode>().is_err());
        assert!("median".parse::<SmoothingMode>().is_err());
    }

    #[test]
    fn session_rejects_bad_alpha() {
        assert!(matches!(
            Session::new(SmoothingMode::Iir { alpha: 2.0 }),
            Err(DfeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn sessions_are_independent() {
        let mut first = Session::new(SmoothingMode::CircularMean).unwrap();
        let mut second = Session::new(SmoothingMode::CircularMean).unwrap();

        for _ in 0..5 {
            first.step(Angles { azimuth: 30.0, elevation: None }).unwrap();
        }
        let result = second.step(Angles { azimuth: 120.0, elevation: None }).unwrap();
        assert!((result.azimuth - 120.0).abs() < EPSILON);
        assert_eq!(first.steps(), 5);
        assert_eq!(second.steps(), 1);
    }

    #[test]
    fn reset_forgets_history() {
        let mut session = Session::new(SmoothingMode::Fir).unwrap();
        session.step(Angles { azimuth: 10.0, elevation: Some(20.0) }).unwrap();
        session.reset();
        let result = session
            .step(Angles { azimuth: 200.0, elevation: Some(40.0) })
            .unwrap();
        assert!((result.azimuth - 200.0).abs() < EPSILON);
        assert!((result.elevation.unwrap() - 40.0).abs() < EPSILON);
    }

    #[test]
    fn invalid_angle_is_reported() {
        let mut session = Session::new(SmoothingMode::CircularMean).unwrap();
        assert!(session.step(Angles { azimuth: 400.0, elevation: None }).is_err());
        assert_eq!(session.steps(), 0);
    }

    #[test]
    fn bad_elevation_leaves_azimuth_history_alone() {
        let mut session = Session::new(SmoothingMode::Iir { alpha: 0.5 }).unwrap();
        let bad = Angles {
            azimuth: 100.0,
            elevation: Some(f32::NAN),
        };
        assert!(session.step(bad).is_err());
        assert_eq!(session.steps(), 0);

        let result = session.step(Angles { azimuth: 100.0, elevation: None }).unwrap();
        assert_eq!(result.azimuth, 50.0);
    }

    #[test]
    fn nan_sample_does_not_poison_the_session() {
        let (sampling, antennas) = (sampling(), AntennaConfig::default());
        let pipeline = Pipeline::new(&sampling, &antennas, estimator()).unwrap();
        let mut session = Session::new(SmoothingMode::Iir { alpha: 0.5 }).unwrap();

        // First sample of the first antenna 12 slot
        let mut broken = packet(pipeline.timing(), &antennas, 0.0);
        broken.samples[pipeline.timing().reference_samples] = IqSample::new(f32::NAN, 0.0);
        assert!(matches!(
            pipeline.process(&broken, &mut session),
            Err(DfeError::DegenerateSignal(_))
        ));
        assert_eq!(session.steps(), 0);

        let mut reference = packet(pipeline.timing(), &antennas, 0.0);
        reference.samples[1] = IqSample::new(f32::INFINITY, 0.0);
        assert!(pipeline.process(&reference, &mut session).is_err());

        let clean = packet(pipeline.timing(), &antennas, 0.0);
        let report = pipeline.process(&clean, &mut session).unwrap();
        assert!((report.result.raw.azimuth - 90.0).abs() < 0.5);
        assert!((report.result.filtered.azimuth - 45.0).abs() < 0.5);
    }

    #[test]
    fn pipeline_finds_broadside() {
        let (sampling, antennas) = (sampling(), AntennaConfig::default());
        let pipeline = Pipeline::new(&sampling, &antennas, estimator()).unwrap();
        let mut session = Session::new(SmoothingMode::None).unwrap();

        let raw = packet(pipeline.timing(), &antennas, 0.0);
        let report = pipeline.process(&raw, &mut session).unwrap();
        assert_eq!(report.result.frequency, 2440);
        assert!(report.result.phase.abs() < EPSILON);
        assert!((report.result.raw.azimuth - 90.0).abs() < 0.5);
        assert_eq!(report.result.raw, report.result.filtered);
        assert!(report.result.samples_used > 0);
    }

    #[test]
    fn pipeline_reports_phase_offset() {
        let (sampling, antennas) = (sampling(), AntennaConfig::default());
        let pipeline = Pipeline::new(&sampling, &antennas, estimator()).unwrap();
        let mut session = Session::new(SmoothingMode::CircularMean).unwrap();

        let raw = packet(pipeline.timing(), &antennas, 0.6);
        let report = pipeline.process(&raw, &mut session).unwrap();
        // antenna 12 lags antenna 1 by the offset
        assert!((report.result.phase + 0.6).abs() < EPSILON, "phase {}", report.result.phase);
        let expected = phase_angle(-0.6);
        assert!((report.result.raw.azimuth - expected).abs() < 0.5);
        #[cfg(feature = "raw_iq")]
        assert!(report.mapped.antenna_ids().iter().all(|id| id.is_valid()));
    }

    fn phase_angle(phase: f32) -> f32 {
        crate::phase::phase_to_angle(phase, 0.05, 2.44e9).unwrap()
    }

    #[test]
    fn truncated_packet_is_an_error() {
        let (sampling, antennas) = (sampling(), AntennaConfig::default());
        let pipeline = Pipeline::new(&sampling, &antennas, estimator()).unwrap();
        let mut session = Session::new(SmoothingMode::None).unwrap();

        let raw = RawPacket::new(2440, vec![IqSample::new(1.0, 0.0); 10]);
        assert!(matches!(
            pipeline.process(&raw, &mut session),
            Err(DfeError::TruncatedPacket { .. })
        ));
    }

    #[test]
    fn pipeline_checks_configuration() {
        let antennas = AntennaConfig {
            switch_sequence: vec![],
            ..Default::default()
        };
        let sampling = sampling();
        assert!(Pipeline::new(&sampling, &antennas, estimator()).is_err());
    }
}
