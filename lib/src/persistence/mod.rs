use crate::errors::PersistenceError;
use crate::DfeReport;
use std::path::PathBuf;

#[cfg(feature = "parquet")]
mod parquet;
mod text;

pub use text::write_text_report;

/// Smallest possible time between two samples, in ns
pub const SAMPLING_TIME_UNIT_NS: u32 = 125;

/// File formats supported for writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Line oriented `DF_BEGIN` ... `DF_END` records
    Text,
    /// Apache Parquet file
    #[cfg(feature = "parquet")]
    Parquet,
}

/// Struct specifying a file to write reports to
#[derive(Debug, Clone)]
pub struct ReportFile {
    /// Path to file
    pub file_path: PathBuf,
    /// Type of file
    pub file_type: FileType,
}

/// A writer to handle file writes
#[allow(clippy::large_enum_variant)]
pub enum Writer {
    Text(text::TextWriter),
    #[cfg(feature = "parquet")]
    Parquet(parquet::BatchWriter),
}

impl Writer {
    /// Create a new file writer.
    ///
    /// # Arguments
    ///
    /// * `file` - The file to write to
    pub fn new(file: ReportFile) -> Result<Self, PersistenceError> {
        let writer = match file.file_type {
            FileType::Text => Self::Text(text::TextWriter::new(file.file_path)?),
            #[cfg(feature = "parquet")]
            FileType::Parquet => Self::Parquet(parquet::BatchWriter::new(file.file_path)?),
        };

        Ok(writer)
    }

    /// Add a batch of reports to the writer
    ///
    /// # Arguments
    ///
    /// * `data` A batch (slice) of reports to write to the file
    pub fn add_batch(&mut self, data: &[DfeReport]) -> Result<(), PersistenceError> {
        match self {
            Writer::Text(writer) => writer.add_batch(data),
            #[cfg(feature = "parquet")]
            Writer::Parquet(writer) => writer.add_batch(data),
        }
    }

    /// Finalize the file writes, i.e. clear all buffers and make sure
    /// the data is actually written to file.
    ///
    /// Returns the number of bytes written or an error if any occured.
    pub fn finalize(&mut self) -> Result<u64, PersistenceError> {
        match self {
            Writer::Text(writer) => writer.finalize(),
            #[cfg(feature = "parquet")]
            Writer::Parquet(writer) => writer.finalize(),
        }
    }
}

impl std::str::FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(FileType::Text),
            #[cfg(feature = "parquet")]
            "parquet" => Ok(FileType::Parquet),
            _ => Err(format!("Invalid file type: {}", s)),
        }
    }
}

/// A single IQ sample placed on the CTE timeline
#[cfg(feature = "raw_iq")]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqLine {
    /// Position of the sample in the report
    pub index: usize,
    /// Sampling instant in units of [`SAMPLING_TIME_UNIT_NS`]
    pub time_unit: u32,
    pub antenna_id: crate::AntennaId,
    pub sample: crate::IqSample,
}

/// Place the samples of a report on the CTE timeline.
///
/// Reference samples come first, starting at 0. Switching period samples
/// follow after the delay before the first switching sample.
#[cfg(feature = "raw_iq")]
pub fn iq_timeline(report: &DfeReport) -> Vec<IqLine> {
    let timing = &report.timing;
    let mapped = &report.mapped;
    let mut lines =
        Vec::with_capacity(mapped.reference.samples.len() + mapped.switching_sample_count());

    let time_u = timing.ref_spacing_ns / SAMPLING_TIME_UNIT_NS;
    for (idx, sample) in mapped.reference.samples.iter().enumerate() {
        lines.push(IqLine {
            index: idx,
            time_unit: time_u * idx as u32,
            antenna_id: mapped.reference.antenna_id,
            sample: *sample,
        });
    }

    let ref_count = mapped.reference.samples.len();
    let delay = timing.delay_before_first_sample_ns / SAMPLING_TIME_UNIT_NS
        + time_u * ref_count.saturating_sub(1) as u32;
    let time_u = timing.sample_spacing_ns / SAMPLING_TIME_UNIT_NS;

    for (slot_idx, slot) in mapped.slots().enumerate() {
        let per_slot = slot.samples.len();
        for (idx, sample) in slot.samples.iter().enumerate() {
            let offset = per_slot * slot_idx + idx;
            lines.push(IqLine {
                index: ref_count + offset,
                time_unit: delay + offset as u32 * time_u,
                antenna_id: slot.antenna_id,
                sample: *sample,
            });
        }
    }
    lines
}

#[cfg(all(test, feature = "raw_iq"))]
mod tests {
    use super::*;
    use crate::{
        AntennaConfig, AoaResult, EstimatorConfig, MappedPacket, Pipeline, RawPacket,
        SampleSpacing, SamplingConfig, SamplingTiming, Session, SmoothingMode, SwitchSpacing,
    };
    use crate::{AntennaId, IqSample};

    fn report() -> DfeReport {
        let config = SamplingConfig {
            switch_spacing: SwitchSpacing::Us2,
            sample_spacing: SampleSpacing::Ns250,
            sample_spacing_ref: SampleSpacing::Ns250,
            ..Default::default()
        };
        let timing = SamplingTiming::new(&config).unwrap();
        let mut mapped = MappedPacket::with_capacity(2, 4).unwrap();
        mapped
            .set_reference(AntennaId(11), &[IqSample::new(1.0, 2.0); 3])
            .unwrap();
        mapped
            .push_slot(AntennaId(12), &[IqSample::new(3.0, 4.0); 4])
            .unwrap();
        mapped
            .push_slot(AntennaId(1), &[IqSample::new(5.0, 6.0); 4])
            .unwrap();
        DfeReport {
            result: AoaResult::default(),
            timing,
            mapped,
        }
    }

    #[test]
    fn timeline_of_oversampled_report() {
        let lines = iq_timeline(&report());
        assert_eq!(lines.len(), 11);

        // 250ns reference spacing is two time units
        assert_eq!(lines[2].index, 2);
        assert_eq!(lines[2].time_unit, 4);
        assert_eq!(lines[2].antenna_id, AntennaId(11));

        // (1000 + 250) / 125 + 2 * 2 = 14
        assert_eq!(lines[3].index, 3);
        assert_eq!(lines[3].time_unit, 14);
        assert_eq!(lines[3].antenna_id, AntennaId(12));
        assert_eq!(lines[7].time_unit, 14 + 4 * 2);
        assert_eq!(lines[7].antenna_id, AntennaId(1));
        assert_eq!(lines[10].sample, IqSample::new(5.0, 6.0));
    }

    #[test]
    fn file_type_from_str() {
        assert_eq!("TEXT".parse::<FileType>().unwrap(), FileType::Text);
        #[cfg(feature = "parquet")]
        assert_eq!("parquet".parse::<FileType>().unwrap(), FileType::Parquet);
        assert!("csv".parse::<FileType>().is_err());
    }

    #[test]
    fn text_file_holds_all_records() {
        let dir = std::env::temp_dir().join(format!("beearing-text-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("reports.txt");

        let antennas = AntennaConfig::default();
        let sampling = SamplingConfig::default();
        let pipeline = Pipeline::new(&sampling, &antennas, EstimatorConfig::default()).unwrap();
        let mut session = Session::new(SmoothingMode::None).unwrap();
        let samples = (0..pipeline.timing().required_raw_samples())
            .map(|idx| IqSample::from_polar(50.0, 0.3 * idx as f32))
            .collect();
        let report = pipeline
            .process(&RawPacket::new(2426, samples), &mut session)
            .unwrap();

        let mut writer = Writer::new(ReportFile {
            file_path: path.clone(),
            file_type: FileType::Text,
        })
        .unwrap();
        writer.add_batch(&[report.clone(), report]).unwrap();
        let bytes = writer.finalize().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.len() as u64, bytes);
        assert_eq!(content.matches("DF_BEGIN\r\n").count(), 2);
        assert_eq!(content.matches("FR:2426\r\n").count(), 2);
        // 8 reference and 74 switching samples per record
        assert_eq!(content.lines().filter(|l| l.starts_with("IQ:")).count(), 2 * 82);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
