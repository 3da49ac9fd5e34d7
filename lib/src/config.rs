//! Sampling and antenna switching configuration
//!
//! Both configurations are set up once, before the first CTE is processed, and
//! are only read afterwards. The pipeline borrows them.
use crate::errors::DfeError;

/// Maximum length of the antenna switch sequence supported by the radio.
pub const MAX_SWITCH_SEQUENCE_LEN: usize = 48;
/// Maximum number of GPIO patterns (i.e. addressable antennas).
pub const MAX_GPIO_PATTERNS: usize = 16;
/// Length of the guard period (fixed by the Bluetooth Core specification).
pub const GUARD_PERIOD_US: u8 = 4;
/// Length of the reference period (fixed by the Bluetooth Core specification).
pub const REF_PERIOD_US: u8 = 8;

/// Identifier of an antenna, or the sentinel for samples taken while switching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AntennaId(pub u8);

impl AntennaId {
    /// Marks a slot collected during an antenna switch transient.
    pub const INVALID: AntennaId = AntennaId(0xFF);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl std::fmt::Display for AntennaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time between consecutive antenna switches in the switching period.
///
/// Discriminants are the radio register codes. Note that the encoding is
/// inverted: a higher code means a shorter duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchSpacing {
    Us8 = 0,
    Us4 = 1,
    Us2 = 2,
    Us1 = 3,
}

impl SwitchSpacing {
    /// Decode a register code.
    pub fn from_code(code: u8) -> Result<Self, DfeError> {
        match code {
            0 => Ok(Self::Us8),
            1 => Ok(Self::Us4),
            2 => Ok(Self::Us2),
            3 => Ok(Self::Us1),
            _ => Err(DfeError::InvalidConfiguration(format!(
                "switch spacing code {code} has no duration mapping"
            ))),
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Get the spacing in nanoseconds
    pub fn duration_ns(self) -> u32 {
        match self {
            Self::Us8 => 8000,
            Self::Us4 => 4000,
            Self::Us2 => 2000,
            Self::Us1 => 1000,
        }
    }
}

/// Time between consecutive samples, either in the reference or in the
/// switching period. Same inverted encoding as [`SwitchSpacing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSpacing {
    Us4 = 1,
    Us2 = 2,
    Us1 = 3,
    Ns500 = 4,
    Ns250 = 5,
    Ns125 = 6,
}

impl SampleSpacing {
    /// Decode a register code.
    pub fn from_code(code: u8) -> Result<Self, DfeError> {
        match code {
            1 => Ok(Self::Us4),
            2 => Ok(Self::Us2),
            3 => Ok(Self::Us1),
            4 => Ok(Self::Ns500),
            5 => Ok(Self::Ns250),
            6 => Ok(Self::Ns125),
            _ => Err(DfeError::InvalidConfiguration(format!(
                "sample spacing code {code} has no duration mapping"
            ))),
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Get the spacing in nanoseconds
    pub fn duration_ns(self) -> u32 {
        match self {
            Self::Us4 => 4000,
            Self::Us2 => 2000,
            Self::Us1 => 1000,
            Self::Ns500 => 500,
            Self::Ns250 => 250,
            Self::Ns125 => 125,
        }
    }
}

impl std::str::FromStr for SwitchSpacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "8us" => Ok(Self::Us8),
            "4us" => Ok(Self::Us4),
            "2us" => Ok(Self::Us2),
            "1us" => Ok(Self::Us1),
            _ => Err(format!("Invalid switch spacing: {}", s)),
        }
    }
}

impl std::str::FromStr for SampleSpacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "4us" => Ok(Self::Us4),
            "2us" => Ok(Self::Us2),
            "1us" => Ok(Self::Us1),
            "500ns" => Ok(Self::Ns500),
            "250ns" => Ok(Self::Ns250),
            "125ns" => Ok(Self::Ns125),
            _ => Err(format!("Invalid sample spacing: {}", s)),
        }
    }
}

/// DFE sampling configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingConfig {
    /// Length of the CTE in units of 8us
    pub number_of_8us: u8,
    /// Length of the guard period in us
    pub guard_period_us: u8,
    /// Length of the reference period in us
    pub ref_period_us: u8,
    /// Time between antenna switches in the switching period
    pub switch_spacing: SwitchSpacing,
    /// Interval between samples in the switching period
    pub sample_spacing: SampleSpacing,
    /// Interval between samples in the reference period
    pub sample_spacing_ref: SampleSpacing,
    /// Delay before sampling starts, in 16 MHz cycles
    pub sample_offset: i16,
    /// Delay before antenna switching starts, in 16 MHz cycles
    pub switch_offset: i16,
}

impl Default for SamplingConfig {
    /// Bluetooth compliant 1us slots over a 160us CTE.
    fn default() -> Self {
        Self {
            number_of_8us: 20,
            guard_period_us: GUARD_PERIOD_US,
            ref_period_us: REF_PERIOD_US,
            switch_spacing: SwitchSpacing::Us2,
            sample_spacing: SampleSpacing::Us2,
            sample_spacing_ref: SampleSpacing::Us1,
            sample_offset: 1,
            switch_offset: 0,
        }
    }
}

impl SamplingConfig {
    /// Check that the configuration describes a CTE the radio can capture.
    pub fn validate(&self) -> Result<(), DfeError> {
        if !(2..=20).contains(&self.number_of_8us) {
            return Err(DfeError::InvalidConfiguration(format!(
                "CTE length of {} x 8us is outside 2..=20",
                self.number_of_8us
            )));
        }
        let cte_us = self.number_of_8us as u32 * 8;
        let preamble_us = self.guard_period_us as u32 + self.ref_period_us as u32;
        if cte_us <= preamble_us {
            return Err(DfeError::InvalidConfiguration(format!(
                "CTE of {cte_us}us leaves no switching period after {preamble_us}us of guard and reference"
            )));
        }
        Ok(())
    }
}

/// Antenna switching configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AntennaConfig {
    /// Antenna used during the reference period
    pub ref_antenna: AntennaId,
    /// Antenna enabled before and after the CTE
    pub idle_antenna: AntennaId,
    /// Antennas enabled in consecutive switch slots (excludes reference and idle)
    pub switch_sequence: Vec<AntennaId>,
    /// GPIO pattern enabling each antenna, indexed by antenna id
    pub gpio_patterns: Vec<u8>,
}

impl Default for AntennaConfig {
    /// 12 element array of the reference locator board.
    fn default() -> Self {
        Self {
            ref_antenna: AntennaId(11),
            idle_antenna: AntennaId(11),
            switch_sequence: [12, 1, 2, 10, 3, 9, 4, 8, 7, 6, 5]
                .into_iter()
                .map(AntennaId)
                .collect(),
            gpio_patterns: vec![0, 5, 6, 4, 9, 10, 8, 13, 14, 12, 1, 2, 0],
        }
    }
}

impl AntennaConfig {
    /// Check that every referenced antenna has a GPIO pattern and all lengths
    /// fit the radio.
    pub fn validate(&self) -> Result<(), DfeError> {
        if self.switch_sequence.is_empty() {
            return Err(DfeError::InvalidConfiguration(
                "antenna switch sequence is empty".into(),
            ));
        }
        if self.switch_sequence.len() > MAX_SWITCH_SEQUENCE_LEN {
            return Err(DfeError::InvalidConfiguration(format!(
                "antenna switch sequence of {} exceeds {}",
                self.switch_sequence.len(),
                MAX_SWITCH_SEQUENCE_LEN
            )));
        }
        if self.gpio_patterns.is_empty() || self.gpio_patterns.len() > MAX_GPIO_PATTERNS {
            return Err(DfeError::InvalidConfiguration(format!(
                "{} GPIO patterns given, expected 1..={}",
                self.gpio_patterns.len(),
                MAX_GPIO_PATTERNS
            )));
        }

        let known = self.gpio_patterns.len();
        let referenced = [self.ref_antenna, self.idle_antenna];
        match referenced
            .iter()
            .chain(self.switch_sequence.iter())
            .find(|ant| ant.0 as usize >= known)
        {
            Some(ant) => Err(DfeError::InvalidConfiguration(format!(
                "antenna {ant} has no GPIO pattern ({known} known)"
            ))),
            None => Ok(()),
        }
    }

    /// GPIO patterns in switch order, as they would be handed to the radio.
    pub fn switch_patterns(&self) -> Result<Vec<u8>, DfeError> {
        self.validate()?;
        Ok(self
            .switch_sequence
            .iter()
            .map(|ant| self.gpio_patterns[ant.0 as usize])
            .collect())
    }
}
