//! Line oriented text reports
//!
//! Each report is framed by `DF_BEGIN` and `DF_END`, fields are written one per
//! line as `KEY:value` and lines end with CRLF. Numbers are truncated to
//! integers.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::errors::PersistenceError;
use crate::DfeReport;

/// Write a single report, returning the number of bytes written.
pub fn write_text_report<W: Write>(out: &mut W, report: &DfeReport) -> std::io::Result<usize> {
    let mut record = String::new();
    let result = &report.result;
    let timing = &report.timing;

    record.push_str("DF_BEGIN\r\n");
    record.push_str(&format!("SW:{}\r\n", timing.switch_spacing_ns));
    record.push_str(&format!("RR:{}\r\n", timing.ref_spacing_ns));
    record.push_str(&format!("SS:{}\r\n", timing.sample_spacing_ns));
    record.push_str(&format!("FR:{}\r\n", result.frequency));
    record.push_str(&format!("PH:{}\r\n", result.phase.to_degrees() as i32));
    if let (Some(raw), Some(filtered)) = (result.raw.elevation, result.filtered.elevation) {
        record.push_str(&format!("ME:{}\r\n", raw as i32));
        record.push_str(&format!("KE:{}\r\n", filtered as i32));
    }
    record.push_str(&format!("MA:{}\r\n", result.raw.azimuth as i32));
    record.push_str(&format!("KA:{}\r\n", result.filtered.azimuth as i32));

    #[cfg(feature = "raw_iq")]
    for line in super::iq_timeline(report) {
        record.push_str(&format!(
            "IQ:{},{},{},{},{}\r\n",
            line.index,
            line.time_unit,
            line.antenna_id,
            line.sample.im as i32,
            line.sample.re as i32
        ));
    }

    record.push_str("DF_END\r\n");
    out.write_all(record.as_bytes())?;
    Ok(record.len())
}

/// Appends text reports to a file
pub struct TextWriter {
    writer: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl TextWriter {
    pub fn new(file_path: PathBuf) -> Result<Self, PersistenceError> {
        let file = File::create(&file_path)?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            bytes_written: 0,
        })
    }

    pub fn add_batch(&mut self, data: &[DfeReport]) -> Result<(), PersistenceError> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            PersistenceError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "writer has been finalized",
            ))
        })?;
        for report in data {
            self.bytes_written += write_text_report(writer, report)? as u64;
        }
        Ok(())
    }

    /// Flush and close the file, returning the number of bytes written.
    pub fn finalize(&mut self) -> Result<u64, PersistenceError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(self.bytes_written)
    }
}
