//! Mapping of raw IQ samples to antennas
//!
//! The radio delivers IQ samples without any information about the antenna
//! that was active when a sample was taken. This module recovers that
//! association from the sampling and antenna configuration, then drops the
//! slots that were sampled during an antenna switch.

use crate::config::{AntennaConfig, AntennaId};
use crate::dfe_data::{MappedHeader, MappedPacket, RawPacket};
use crate::errors::DfeError;
use crate::timing::{SamplingRegime, SamplingTiming};

/// Map the samples of a raw packet to the antennas used to collect them.
///
/// Depending on the CTE duration, the number of switch slots may exceed the
/// length of the antenna sequence. The radio then starts over with the first
/// antenna, and so does the mapping.
pub fn map_iq_samples_to_antennas(
    raw: &RawPacket,
    timing: &SamplingTiming,
    antennas: &AntennaConfig,
) -> Result<MappedPacket, DfeError> {
    if antennas.switch_sequence.is_empty() {
        return Err(DfeError::InvalidArgument(
            "antenna switch sequence is empty".into(),
        ));
    }

    let samples = raw.valid_samples();
    let required = timing.required_raw_samples();
    if samples.len() < required {
        return Err(DfeError::TruncatedPacket {
            required,
            available: samples.len(),
        });
    }

    let mut mapped = MappedPacket::for_timing(timing)?;
    let ref_count = timing.reference_samples;
    mapped.set_reference(antennas.ref_antenna, &samples[..ref_count])?;

    let sequence = &antennas.switch_sequence;
    let per_slot = timing.samples_per_slot;
    let mut ant_idx = 0;

    for slot_idx in 0..timing.effective_slots {
        // Over-sampling takes samples in the switch slots as well. Those are
        // tagged invalid and the antenna only advances on sampling slots.
        let antenna = if timing.regime == SamplingRegime::OverSampling && slot_idx % 2 == 1 {
            AntennaId::INVALID
        } else {
            let antenna = sequence[ant_idx];
            ant_idx += timing.antenna_step;
            if ant_idx >= sequence.len() {
                ant_idx = 0;
            }
            antenna
        };

        let start = ref_count + slot_idx * per_slot;
        mapped.push_slot(antenna, &samples[start..start + per_slot])?;
    }

    mapped.header = MappedHeader {
        length: timing.effective_slots,
        frequency: raw.header.frequency,
    };

    log::trace!(
        "Mapped {} raw samples into {} reference samples and {} slots ({})",
        samples.len(),
        ref_count,
        mapped.len(),
        timing.regime
    );
    Ok(mapped)
}

/// Remove slots collected during antenna switching.
///
/// Transforms and shrinks `packet` in place: valid slots are shifted to the
/// front keeping their order, and `header.length` is set to the number of
/// surviving slots. Callers must not assume the pre-filter length afterwards.
/// Filtering an already filtered packet is a no-op.
///
/// Returns the number of removed slots.
pub fn remove_switch_slot_samples(packet: &mut MappedPacket) -> usize {
    let before = packet.header.length;
    let mut write = 0;

    for read in 0..before {
        if packet.antenna_ids()[read].is_valid() {
            packet.move_slot(read, write);
            write += 1;
        }
    }

    packet.header.length = write;
    before - write
}
