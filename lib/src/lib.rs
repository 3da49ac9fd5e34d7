mod capture;
mod circular;
mod config;
mod dfe_data;
mod dfectrl;
mod errors;
mod mapping;
mod packet;
mod persistence;
mod phase;
mod session;
mod timing;

// Public re-export
pub use crate::config::{
    AntennaConfig, AntennaId, SampleSpacing, SamplingConfig, SwitchSpacing, GUARD_PERIOD_US,
    MAX_GPIO_PATTERNS, MAX_SWITCH_SEQUENCE_LEN, REF_PERIOD_US,
};
pub use crate::dfe_data::{
    Angles, AoaResult, DfeReport, IqSample, MappedHeader, MappedPacket, PacketHeader, RawPacket,
    ReferenceSamples, SlotView,
};
pub use crate::dfectrl::DfeCtrl1;
pub use crate::errors::{DfeError, PersistenceError};
pub use crate::timing::{
    antenna_step, delay_before_first_sample_ns, effective_slot_count, reference_sample_count,
    sampling_regime, samples_per_slot, switching_duration_ns, SamplingRegime, SamplingTiming,
    MAX_REFERENCE_SAMPLES, MAX_SAMPLES_PER_SLOT, MAX_SLOTS,
};

pub use crate::circular::{
    angle_to_vector, fir_weights, vector_to_angle, CircularMean, FirFilter, IirFilter, RingBuffer,
    RING_CAPACITY,
};
pub use crate::mapping::{map_iq_samples_to_antennas, remove_switch_slot_samples};
pub use crate::phase::{
    antenna_phase_difference, correct_phase_drift, estimate_angles, estimate_phase_drift,
    phase_to_angle, reference_stats, AntennaPair, EstimatorConfig, PhaseEstimate, ReferenceStats,
    WAVE_SPEED,
};
pub use crate::session::{Pipeline, Session, SmoothingMode};

pub use crate::capture::{HoneySink, PacketSource, PollenSink, ScoutBee};
pub use crate::packet::{
    encode_packet, extract_from_bytes, read_capture_file, CaptureReader, CaptureWriter,
};
#[cfg(feature = "raw_iq")]
pub use crate::persistence::{iq_timeline, IqLine};
pub use crate::persistence::{
    write_text_report, FileType, ReportFile, Writer, SAMPLING_TIME_UNIT_NS,
};
