//! IQ sample data structs used throughout the library.

use ndarray::{Array2, ArrayView1, ArrayViewMut1};
use num_complex::Complex32;

use crate::config::AntennaId;
use crate::errors::DfeError;
use crate::timing::{SamplingTiming, MAX_REFERENCE_SAMPLES, MAX_SAMPLES_PER_SLOT, MAX_SLOTS};

/// A single IQ sample; `re` holds I and `im` holds Q.
pub type IqSample = Complex32;

/// Header of a CTE capture as delivered by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeader {
    /// Number of IQ samples in the packet
    pub length: u32,
    /// Carrier frequency in MHz
    pub frequency: u32,
}

/// Raw IQ samples of a single CTE, in the order the radio took them.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPacket {
    pub header: PacketHeader,
    pub samples: Vec<IqSample>,
}

impl RawPacket {
    pub fn new(frequency: u32, samples: Vec<IqSample>) -> Self {
        Self {
            header: PacketHeader {
                length: samples.len() as u32,
                frequency,
            },
            samples,
        }
    }

    /// Samples that are both announced by the header and actually present.
    pub fn valid_samples(&self) -> &[IqSample] {
        let len = (self.header.length as usize).min(self.samples.len());
        &self.samples[..len]
    }
}

/// Header of a mapped packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MappedHeader {
    /// Number of slots holding samples
    pub length: usize,
    /// Carrier frequency in MHz
    pub frequency: u32,
}

/// IQ samples of the reference period, all taken on one antenna.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSamples {
    pub antenna_id: AntennaId,
    pub samples: Vec<IqSample>,
}

/// Borrowed view of a single slot of a [`MappedPacket`]
#[derive(Debug, Clone)]
pub struct SlotView<'a> {
    pub antenna_id: AntennaId,
    pub samples: ArrayView1<'a, IqSample>,
}

/// IQ samples of a single CTE, mapped to the antennas that received them.
///
/// Switching period samples live in a slot x sample matrix allocated once for
/// the capacity of the sampling configuration. `header.length` counts the slots
/// in use; the switch slot filter shrinks it in place.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedPacket {
    pub header: MappedHeader,
    pub reference: ReferenceSamples,
    antenna_ids: Vec<AntennaId>,
    sample_counts: Vec<usize>,
    samples: Array2<IqSample>,
}

impl MappedPacket {
    /// Create an empty packet able to hold `slots` slots of up to
    /// `samples_per_slot` samples each.
    pub fn with_capacity(slots: usize, samples_per_slot: usize) -> Result<Self, DfeError> {
        if slots > MAX_SLOTS || samples_per_slot > MAX_SAMPLES_PER_SLOT {
            return Err(DfeError::InvalidArgument(format!(
                "{slots} slots of {samples_per_slot} samples exceed the mapped packet limits"
            )));
        }
        Ok(Self {
            header: MappedHeader::default(),
            reference: ReferenceSamples {
                antenna_id: AntennaId::INVALID,
                samples: Vec::with_capacity(MAX_REFERENCE_SAMPLES),
            },
            antenna_ids: vec![AntennaId::INVALID; slots],
            sample_counts: vec![0; slots],
            samples: Array2::zeros((slots, samples_per_slot)),
        })
    }

    /// Create an empty packet sized for a sampling configuration.
    pub fn for_timing(timing: &SamplingTiming) -> Result<Self, DfeError> {
        Self::with_capacity(timing.effective_slots, timing.samples_per_slot)
    }

    /// Maximum number of slots this packet can hold.
    pub fn slot_capacity(&self) -> usize {
        self.antenna_ids.len()
    }

    /// Maximum number of samples a single slot can hold.
    pub fn samples_capacity(&self) -> usize {
        self.samples.ncols()
    }

    /// Replace the reference period samples.
    pub fn set_reference(
        &mut self,
        antenna_id: AntennaId,
        samples: &[IqSample],
    ) -> Result<(), DfeError> {
        if samples.len() > MAX_REFERENCE_SAMPLES {
            return Err(DfeError::InvalidArgument(format!(
                "{} reference samples exceed capacity of {}",
                samples.len(),
                MAX_REFERENCE_SAMPLES
            )));
        }
        self.reference.antenna_id = antenna_id;
        self.reference.samples.clear();
        self.reference.samples.extend_from_slice(samples);
        Ok(())
    }

    /// Append a slot after the last one in use.
    pub fn push_slot(
        &mut self,
        antenna_id: AntennaId,
        samples: &[IqSample],
    ) -> Result<(), DfeError> {
        let idx = self.header.length;
        if idx >= self.slot_capacity() {
            return Err(DfeError::InvalidArgument(format!(
                "slot capacity of {} exhausted",
                self.slot_capacity()
            )));
        }
        if samples.len() > self.samples_capacity() {
            return Err(DfeError::InvalidArgument(format!(
                "{} samples exceed slot capacity of {}",
                samples.len(),
                self.samples_capacity()
            )));
        }

        self.antenna_ids[idx] = antenna_id;
        self.sample_counts[idx] = samples.len();
        let mut row = self.samples.row_mut(idx);
        for (dst, src) in row.iter_mut().zip(samples) {
            *dst = *src;
        }
        self.header.length += 1;
        Ok(())
    }

    /// Number of slots in use.
    pub fn len(&self) -> usize {
        self.header.length
    }

    pub fn is_empty(&self) -> bool {
        self.header.length == 0
    }

    /// Get the slot at `idx`, if in use.
    pub fn slot(&self, idx: usize) -> Option<SlotView<'_>> {
        if idx >= self.header.length {
            return None;
        }
        let count = self.sample_counts[idx];
        Some(SlotView {
            antenna_id: self.antenna_ids[idx],
            samples: self.samples.slice(ndarray::s![idx, ..count]),
        })
    }

    /// Iterate over the slots in use, in capture order.
    pub fn slots(&self) -> impl Iterator<Item = SlotView<'_>> {
        (0..self.header.length).filter_map(move |idx| self.slot(idx))
    }

    /// Mutable samples of the slot at `idx`, if in use.
    pub fn slot_samples_mut(&mut self, idx: usize) -> Option<ArrayViewMut1<'_, IqSample>> {
        if idx >= self.header.length {
            return None;
        }
        let count = self.sample_counts[idx];
        Some(self.samples.slice_mut(ndarray::s![idx, ..count]))
    }

    /// Antenna ids of the slots in use.
    pub fn antenna_ids(&self) -> &[AntennaId] {
        &self.antenna_ids[..self.header.length]
    }

    /// Total number of switching period samples in use.
    pub fn switching_sample_count(&self) -> usize {
        self.sample_counts[..self.header.length].iter().sum()
    }

    /// Copy the slot at `from` over the slot at `to`.
    ///
    /// Used for in-place compaction, so `to` never lies after `from`.
    pub(crate) fn move_slot(&mut self, from: usize, to: usize) {
        debug_assert!(to <= from, "slot compaction moved a slot forward");
        if to == from {
            return;
        }
        self.antenna_ids[to] = self.antenna_ids[from];
        self.sample_counts[to] = self.sample_counts[from];
        for col in 0..self.samples.ncols() {
            self.samples[(to, col)] = self.samples[(from, col)];
        }
    }
}

/// Azimuth and optional elevation, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Angles {
    pub azimuth: f32,
    pub elevation: Option<f32>,
}

/// Angle of arrival evaluated from a single CTE.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AoaResult {
    /// Carrier frequency in MHz
    pub frequency: u32,
    /// Phase difference between the azimuth antenna pair, in radians
    pub phase: f32,
    /// Angles evaluated from this CTE alone
    pub raw: Angles,
    /// Angles after smoothing with the session history
    pub filtered: Angles,
    /// Number of switching period samples used for the azimuth pair
    pub samples_used: usize,
}

/// Everything a result sink needs to report a single CTE.
#[derive(Debug, Clone)]
pub struct DfeReport {
    pub result: AoaResult,
    pub timing: SamplingTiming,
    #[cfg(feature = "raw_iq")]
    pub mapped: MappedPacket,
}
