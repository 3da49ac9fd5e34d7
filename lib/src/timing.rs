//! Timing and sampling regime calculations
//!
//! Everything here is derived from a [`SamplingConfig`] alone. Durations are
//! compared on their decoded nanosecond values, never on the register codes,
//! since the codes run in the opposite direction of the durations.
use crate::config::SamplingConfig;
use crate::errors::DfeError;

/// Largest number of slots in a mapped packet.
///
/// 148us of switching period at the shortest (1us) switch spacing, doubled
/// when over-sampling adds a switch slot after every sampling slot.
pub const MAX_SLOTS: usize = 296;
/// Largest number of samples collected in a single slot (8us switch spacing
/// sampled every 125ns, half of which falls in the switch slot).
pub const MAX_SAMPLES_PER_SLOT: usize = 32;
/// Largest number of samples in the 8us reference period (125ns spacing).
pub const MAX_REFERENCE_SAMPLES: usize = 64;

/// How often samples are taken relative to the antenna switch clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingRegime {
    /// One sample per antenna dwell
    Regular,
    /// Several samples per dwell; every second slot is taken while switching
    OverSampling,
    /// Samples are taken only every n-th antenna dwell
    UnderSampling,
}

impl std::fmt::Display for SamplingRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SamplingRegime::Regular => "regular",
            SamplingRegime::OverSampling => "over-sampling",
            SamplingRegime::UnderSampling => "under-sampling",
        };
        f.write_str(name)
    }
}

/// Integer division of two durations, rejecting a zero divisor.
fn checked_ratio(numerator: u32, denominator: u32, what: &str) -> Result<u32, DfeError> {
    numerator.checked_div(denominator).ok_or_else(|| {
        DfeError::InvalidConfiguration(format!("{what} evaluates to a zero divisor"))
    })
}

/// Duration of the antenna switching period in nanoseconds.
pub fn switching_duration_ns(config: &SamplingConfig) -> Result<u32, DfeError> {
    let cte_ns = config.number_of_8us as u32 * 8000;
    let preamble_ns = (config.guard_period_us as u32 + config.ref_period_us as u32) * 1000;
    cte_ns.checked_sub(preamble_ns).ok_or_else(|| {
        DfeError::InvalidConfiguration(format!(
            "CTE of {cte_ns}ns is shorter than guard and reference periods ({preamble_ns}ns)"
        ))
    })
}

/// Classify the sampling regime of the switching period.
pub fn sampling_regime(config: &SamplingConfig) -> SamplingRegime {
    let switch_ns = config.switch_spacing.duration_ns();
    let sample_ns = config.sample_spacing.duration_ns();

    match switch_ns.cmp(&sample_ns) {
        std::cmp::Ordering::Equal => SamplingRegime::Regular,
        std::cmp::Ordering::Greater => SamplingRegime::OverSampling,
        std::cmp::Ordering::Less => SamplingRegime::UnderSampling,
    }
}

/// Number of slots the switching period is split into after mapping.
pub fn effective_slot_count(config: &SamplingConfig) -> Result<usize, DfeError> {
    let switch_ns = config.switch_spacing.duration_ns();
    let slots = checked_ratio(switching_duration_ns(config)?, switch_ns, "switch spacing")?;

    let slots = match sampling_regime(config) {
        SamplingRegime::Regular => slots,
        SamplingRegime::OverSampling => slots * 2,
        SamplingRegime::UnderSampling => {
            let divider = checked_ratio(
                config.sample_spacing.duration_ns(),
                switch_ns,
                "switch spacing",
            )?;
            checked_ratio(slots, divider, "sample to switch spacing ratio")?
        }
    };
    Ok(slots as usize)
}

/// Number of samples collected in a single slot.
pub fn samples_per_slot(config: &SamplingConfig) -> Result<usize, DfeError> {
    let switch_ns = config.switch_spacing.duration_ns();
    let sample_ns = config.sample_spacing.duration_ns();

    // A switch spacing holds a switch slot and a sampling slot, so only half of
    // the samples taken during it are valid.
    if switch_ns > sample_ns {
        let samples = checked_ratio(switch_ns, sample_ns * 2, "sample spacing")?;
        if samples == 0 {
            return Err(DfeError::InvalidConfiguration(
                "sampling slot holds no samples".into(),
            ));
        }
        Ok(samples as usize)
    } else {
        Ok(1)
    }
}

/// Number of samples taken in the reference period.
pub fn reference_sample_count(config: &SamplingConfig) -> Result<usize, DfeError> {
    let ref_ns = config.ref_period_us as u32 * 1000;
    let count = checked_ratio(
        ref_ns,
        config.sample_spacing_ref.duration_ns(),
        "reference sample spacing",
    )?;
    Ok(count as usize)
}

/// Delay between the last reference sample and the first switching sample.
///
/// Sampling starts in the middle of the first switch spacing.
pub fn delay_before_first_sample_ns(config: &SamplingConfig) -> u32 {
    (config.switch_spacing.duration_ns() >> 1) + config.sample_spacing_ref.duration_ns()
}

/// Step through the antenna switch sequence between two mapped slots.
pub fn antenna_step(config: &SamplingConfig) -> Result<usize, DfeError> {
    match sampling_regime(config) {
        SamplingRegime::Regular | SamplingRegime::OverSampling => Ok(1),
        SamplingRegime::UnderSampling => {
            let step = checked_ratio(
                config.sample_spacing.duration_ns(),
                config.switch_spacing.duration_ns(),
                "switch spacing",
            )?;
            if step == 0 {
                return Err(DfeError::InvalidConfiguration(
                    "antenna step evaluates to zero".into(),
                ));
            }
            Ok(step as usize)
        }
    }
}

/// All timing values of a sampling configuration, computed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingTiming {
    pub regime: SamplingRegime,
    pub switching_duration_ns: u32,
    pub switch_spacing_ns: u32,
    pub sample_spacing_ns: u32,
    pub ref_spacing_ns: u32,
    pub reference_samples: usize,
    pub effective_slots: usize,
    pub samples_per_slot: usize,
    pub antenna_step: usize,
    pub delay_before_first_sample_ns: u32,
}

impl SamplingTiming {
    /// Derive the timing of a configuration, checking it against the buffer
    /// capacities of [`crate::MappedPacket`].
    pub fn new(config: &SamplingConfig) -> Result<Self, DfeError> {
        config.validate()?;

        let timing = Self {
            regime: sampling_regime(config),
            switching_duration_ns: switching_duration_ns(config)?,
            switch_spacing_ns: config.switch_spacing.duration_ns(),
            sample_spacing_ns: config.sample_spacing.duration_ns(),
            ref_spacing_ns: config.sample_spacing_ref.duration_ns(),
            reference_samples: reference_sample_count(config)?,
            effective_slots: effective_slot_count(config)?,
            samples_per_slot: samples_per_slot(config)?,
            antenna_step: antenna_step(config)?,
            delay_before_first_sample_ns: delay_before_first_sample_ns(config),
        };

        if timing.effective_slots > MAX_SLOTS
            || timing.samples_per_slot > MAX_SAMPLES_PER_SLOT
            || timing.reference_samples > MAX_REFERENCE_SAMPLES
        {
            return Err(DfeError::InvalidConfiguration(format!(
                "{} slots of {} samples with {} reference samples exceed capacity",
                timing.effective_slots, timing.samples_per_slot, timing.reference_samples
            )));
        }
        if timing.reference_samples < 2 {
            return Err(DfeError::InvalidConfiguration(
                "phase drift estimation needs at least two reference samples".into(),
            ));
        }

        log::debug!("Derived sampling timing: {:?}", timing);
        Ok(timing)
    }

    /// Number of raw IQ samples a packet must carry to be mapped.
    pub fn required_raw_samples(&self) -> usize {
        self.reference_samples + self.effective_slots * self.samples_per_slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SampleSpacing, SwitchSpacing};

    fn cte160(
        switch: SwitchSpacing,
        sample: SampleSpacing,
        sample_ref: SampleSpacing,
    ) -> SamplingConfig {
        SamplingConfig {
            number_of_8us: 20,
            switch_spacing: switch,
            sample_spacing: sample,
            sample_spacing_ref: sample_ref,
            ..Default::default()
        }
    }

    #[test]
    fn switching_duration_of_160us_cte() {
        let config = SamplingConfig::default();
        assert_eq!(switching_duration_ns(&config).unwrap(), 148_000);
    }

    #[test]
    fn oversampling() {
        let config = cte160(SwitchSpacing::Us2, SampleSpacing::Ns250, SampleSpacing::Ns250);
        assert_eq!(sampling_regime(&config), SamplingRegime::OverSampling);
        // (148us / 2us) * 2 -> CTE divided by switch spacing, doubled by the switch slots
        assert_eq!(effective_slot_count(&config).unwrap(), 148);
        assert_eq!(samples_per_slot(&config).unwrap(), 4);
        assert_eq!(reference_sample_count(&config).unwrap(), 32);
        assert_eq!(antenna_step(&config).unwrap(), 1);
    }

    #[test]
    fn regular_1us_slot() {
        let config = cte160(SwitchSpacing::Us2, SampleSpacing::Us2, SampleSpacing::Us1);
        assert_eq!(sampling_regime(&config), SamplingRegime::Regular);
        assert_eq!(effective_slot_count(&config).unwrap(), 74);
        assert_eq!(samples_per_slot(&config).unwrap(), 1);
        assert_eq!(reference_sample_count(&config).unwrap(), 8);
    }

    #[test]
    fn regular_2us_slot() {
        let config = cte160(SwitchSpacing::Us4, SampleSpacing::Us4, SampleSpacing::Us1);
        assert_eq!(sampling_regime(&config), SamplingRegime::Regular);
        assert_eq!(effective_slot_count(&config).unwrap(), 37);
    }

    #[test]
    fn undersampling_every_2nd_slot() {
        let config = cte160(SwitchSpacing::Us2, SampleSpacing::Us4, SampleSpacing::Us1);
        assert_eq!(sampling_regime(&config), SamplingRegime::UnderSampling);
        // 148us / 2us / (4us / 2us)
        assert_eq!(effective_slot_count(&config).unwrap(), 37);
        assert_eq!(samples_per_slot(&config).unwrap(), 1);
        assert_eq!(antenna_step(&config).unwrap(), 2);
    }

    #[test]
    fn undersampling_every_4th_slot() {
        let config = cte160(SwitchSpacing::Us1, SampleSpacing::Us4, SampleSpacing::Us1);
        assert_eq!(sampling_regime(&config), SamplingRegime::UnderSampling);
        assert_eq!(effective_slot_count(&config).unwrap(), 37);
        assert_eq!(antenna_step(&config).unwrap(), 4);
    }

    #[test]
    fn delay_before_first_sample() {
        let config = cte160(SwitchSpacing::Us2, SampleSpacing::Ns250, SampleSpacing::Ns250);
        assert_eq!(delay_before_first_sample_ns(&config), 1250);
    }

    #[test]
    fn timing_of_oversampling_config() {
        let config = cte160(SwitchSpacing::Us2, SampleSpacing::Ns250, SampleSpacing::Ns250);
        let timing = SamplingTiming::new(&config).unwrap();
        assert_eq!(timing.regime, SamplingRegime::OverSampling);
        assert_eq!(timing.required_raw_samples(), 32 + 148 * 4);
    }

    #[test]
    fn densest_configs_fit_capacity() {
        let config = cte160(SwitchSpacing::Us1, SampleSpacing::Ns125, SampleSpacing::Ns125);
        let timing = SamplingTiming::new(&config).unwrap();
        assert_eq!(timing.effective_slots, MAX_SLOTS);
        assert_eq!(timing.reference_samples, MAX_REFERENCE_SAMPLES);

        let config = cte160(SwitchSpacing::Us8, SampleSpacing::Ns125, SampleSpacing::Us4);
        let timing = SamplingTiming::new(&config).unwrap();
        assert_eq!(timing.samples_per_slot, MAX_SAMPLES_PER_SLOT);
    }

    #[test]
    fn too_few_reference_samples() {
        let mut config = SamplingConfig::default();
        config.sample_spacing_ref = SampleSpacing::Us4;
        config.ref_period_us = 4;
        assert!(matches!(
            SamplingTiming::new(&config),
            Err(DfeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn negative_switching_period_is_rejected() {
        let config = SamplingConfig {
            number_of_8us: 2,
            guard_period_us: 10,
            ..Default::default()
        };
        assert!(switching_duration_ns(&config).is_err());
    }
}
