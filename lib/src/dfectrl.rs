//! DFECTRL1 register image
//!
//! This module defines the layout of the radio's DFE control register and
//! turns a captured register word into a [`SamplingConfig`].
use bilge::prelude::*;

use crate::config::{SampleSpacing, SamplingConfig, SwitchSpacing, GUARD_PERIOD_US, REF_PERIOD_US};
use crate::errors::DfeError;

/// DFE control register 1
#[bitsize(32)]
#[derive(FromBits, DebugBits)]
pub struct DfeCtrl1 {
    pub number_of_8us: u6,        // CTE length in 8us units
    pub reserved_0: u1,           // Reserved
    pub dfe_in_extension: u1,     // Whether the CTE follows the CRC (1) or the payload (0)
    pub switch_spacing: u3,       // Antenna switch spacing code
    pub reserved_1: u1,           // Reserved
    pub sample_spacing_ref: u3,   // Sample spacing code in the reference period
    pub sample_type: u1,          // IQ (0) or magnitude/phase (1)
    pub sample_spacing: u3,       // Sample spacing code in the switching period
    pub reserved_2: u1,           // Reserved
    pub repeat_pattern: u4,       // Repetitions of each switch pattern
    pub agc_backoff_gain: u4,     // Gain backoff applied to the AGC
    pub reserved_3: u4,           // Reserved
}

impl DfeCtrl1 {
    /// Read the register from its little endian byte image (requires 4 bytes).
    pub fn from_buf(buf: &[u8]) -> Result<Self, DfeError> {
        let bytes: [u8; 4] = buf
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or(DfeError::TruncatedPacket {
                required: 4,
                available: buf.len(),
            })?;
        Ok(DfeCtrl1::from(u32::from_le_bytes(bytes)))
    }
}

impl SamplingConfig {
    /// Build a sampling configuration from a DFECTRL1 register word.
    ///
    /// Offsets live in a different register and are left at zero. Magnitude and
    /// phase sampling is rejected since the pipeline only handles IQ samples.
    pub fn from_dfectrl1(word: u32) -> Result<Self, DfeError> {
        let ctrl = DfeCtrl1::from(word);
        log::trace!("Decoding sampling configuration from {:?}", ctrl);

        if u8::from(ctrl.sample_type()) != 0 {
            return Err(DfeError::InvalidConfiguration(
                "magnitude/phase sampling is not supported".into(),
            ));
        }

        let config = SamplingConfig {
            number_of_8us: ctrl.number_of_8us().into(),
            guard_period_us: GUARD_PERIOD_US,
            ref_period_us: REF_PERIOD_US,
            switch_spacing: SwitchSpacing::from_code(ctrl.switch_spacing().into())?,
            sample_spacing: SampleSpacing::from_code(ctrl.sample_spacing().into())?,
            sample_spacing_ref: SampleSpacing::from_code(ctrl.sample_spacing_ref().into())?,
            sample_offset: 0,
            switch_offset: 0,
        };
        config.validate()?;
        Ok(config)
    }
}
