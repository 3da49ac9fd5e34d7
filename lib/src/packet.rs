//! Binary capture format for raw CTE packets
//!
//! A capture is a plain sequence of records, each holding one CTE:
//!
//! | field          | type     | description                        |
//! |----------------|----------|------------------------------------|
//! | length         | u32 LE   | number of IQ samples               |
//! | frequency      | u32 LE   | carrier frequency in MHz           |
//! | samples        | i16 LE   | `length` pairs of I then Q         |
//!
//! This is what a sampling radio hands over, so captures can be recorded live
//! and replayed through the pipeline later.
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use crate::dfe_data::{IqSample, PacketHeader, RawPacket};
use crate::errors::DfeError;
use crate::timing::{MAX_REFERENCE_SAMPLES, MAX_SAMPLES_PER_SLOT, MAX_SLOTS};

/// Size of a record header in bytes
pub const HEADER_LEN: usize = 8;
/// Size of a single IQ pair in bytes
pub const SAMPLE_LEN: usize = 4;
/// Largest number of samples a record may announce
pub const MAX_RAW_SAMPLES: usize = MAX_REFERENCE_SAMPLES + MAX_SLOTS * MAX_SAMPLES_PER_SLOT;

fn parse_header(buf: &[u8; HEADER_LEN]) -> Result<PacketHeader, DfeError> {
    let header = PacketHeader {
        length: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
        frequency: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
    };
    if header.length as usize > MAX_RAW_SAMPLES {
        return Err(DfeError::InvalidArgument(format!(
            "record announces {} samples, at most {} are supported",
            header.length, MAX_RAW_SAMPLES
        )));
    }
    Ok(header)
}

fn parse_samples(buf: &[u8]) -> Vec<IqSample> {
    buf.chunks_exact(SAMPLE_LEN)
        .map(|chunk| {
            let i = i16::from_le_bytes([chunk[0], chunk[1]]);
            let q = i16::from_le_bytes([chunk[2], chunk[3]]);
            IqSample::new(i as f32, q as f32)
        })
        .collect()
}

/// Extract a raw packet from the start of `buf`.
///
/// Returns the packet and the number of bytes consumed.
pub fn extract_from_bytes(buf: &[u8]) -> Result<(RawPacket, usize), DfeError> {
    let header_buf: &[u8; HEADER_LEN] = buf
        .get(..HEADER_LEN)
        .and_then(|b| b.try_into().ok())
        .ok_or(DfeError::TruncatedPacket {
            required: HEADER_LEN,
            available: buf.len(),
        })?;
    let header = parse_header(header_buf)?;

    let end = HEADER_LEN + header.length as usize * SAMPLE_LEN;
    let payload = buf.get(HEADER_LEN..end).ok_or(DfeError::TruncatedPacket {
        required: end,
        available: buf.len(),
    })?;

    let packet = RawPacket {
        header,
        samples: parse_samples(payload),
    };
    Ok((packet, end))
}

/// Saturate a sample component into the i16 range of the record.
fn quantize(value: f32) -> i16 {
    value.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Encode a raw packet as a capture record.
///
/// Only the samples announced by the header are written. Components are
/// rounded to the nearest integer.
pub fn encode_packet(packet: &RawPacket) -> Vec<u8> {
    let samples = packet.valid_samples();
    let mut buf = Vec::with_capacity(HEADER_LEN + samples.len() * SAMPLE_LEN);
    buf.extend_from_slice(&(samples.len() as u32).to_le_bytes());
    buf.extend_from_slice(&packet.header.frequency.to_le_bytes());
    for sample in samples {
        buf.extend_from_slice(&quantize(sample.re).to_le_bytes());
        buf.extend_from_slice(&quantize(sample.im).to_le_bytes());
    }
    buf
}

/// Fill `buf` from `reader`, returning how many bytes were read before EOF.
fn read_until_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Iterator over the records of a capture.
///
/// Ends at a clean end of input. A record cut short yields a
/// [`DfeError::TruncatedPacket`] and ends the iteration.
pub struct CaptureReader<R> {
    reader: R,
    done: bool,
}

impl CaptureReader<BufReader<File>> {
    /// Open a capture file for reading.
    pub fn open(path: &Path) -> Result<Self, DfeError> {
        log::trace!("Opening capture file {}", path.display());
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read> CaptureReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }

    /// Read the next record, `None` at the end of the capture.
    pub fn next_packet(&mut self) -> Result<Option<RawPacket>, DfeError> {
        let mut header_buf = [0u8; HEADER_LEN];
        let read = read_until_eof(&mut self.reader, &mut header_buf)?;
        if read == 0 {
            return Ok(None);
        }
        if read < HEADER_LEN {
            return Err(DfeError::TruncatedPacket {
                required: HEADER_LEN,
                available: read,
            });
        }
        let header = parse_header(&header_buf)?;

        let mut payload = vec![0u8; header.length as usize * SAMPLE_LEN];
        let read = read_until_eof(&mut self.reader, &mut payload)?;
        if read < payload.len() {
            return Err(DfeError::TruncatedPacket {
                required: HEADER_LEN + payload.len(),
                available: HEADER_LEN + read,
            });
        }

        Ok(Some(RawPacket {
            header,
            samples: parse_samples(&payload),
        }))
    }
}

impl<R: Read> Iterator for CaptureReader<R> {
    type Item = Result<RawPacket, DfeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_packet() {
            Ok(Some(packet)) => Some(Ok(packet)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Appends records to a capture.
pub struct CaptureWriter<W: Write> {
    writer: W,
    written: usize,
}

impl CaptureWriter<BufWriter<File>> {
    /// Create (or truncate) a capture file.
    pub fn create(path: &Path) -> Result<Self, DfeError> {
        log::trace!("Creating capture file {}", path.display());
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> CaptureWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn write(&mut self, packet: &RawPacket) -> Result<(), DfeError> {
        self.writer.write_all(&encode_packet(packet))?;
        self.written += 1;
        Ok(())
    }

    /// Number of records written so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn flush(&mut self) -> Result<(), DfeError> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Read all packets of a capture file
///
/// # Parameters
/// * `path` - Path to the capture file
pub fn read_capture_file(path: &Path) -> Result<Vec<RawPacket>, DfeError> {
    log::trace!("Extracting raw packets from capture file: {}", path.display());
    let packets = CaptureReader::open(path)?.collect::<Result<Vec<_>, _>>()?;
    log::trace!("Extracted {} raw packets from capture file.", packets.len());
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn packet(frequency: u32, samples: &[(f32, f32)]) -> RawPacket {
        RawPacket::new(
            frequency,
            samples.iter().map(|&(i, q)| IqSample::new(i, q)).collect(),
        )
    }

    #[test]
    fn record_layout() {
        let bytes = encode_packet(&packet(2402, &[(1.0, -2.0), (300.0, 4.0)]));
        assert_eq!(
            bytes,
            vec![
                2, 0, 0, 0, // length
                0x62, 0x09, 0, 0, // 2402 MHz
                1, 0, 0xFE, 0xFF, // (1, -2)
                0x2C, 0x01, 4, 0, // (300, 4)
            ]
        );

        let (decoded, consumed) = extract_from_bytes(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.header.frequency, 2402);
        assert_eq!(decoded.samples[1], IqSample::new(300.0, 4.0));
    }

    #[test]
    fn encoding_saturates_and_rounds() {
        let bytes = encode_packet(&packet(2440, &[(40000.0, -40000.0), (1.6, -1.4)]));
        let (decoded, _) = extract_from_bytes(&bytes).unwrap();
        assert_eq!(decoded.samples[0], IqSample::new(32767.0, -32768.0));
        assert_eq!(decoded.samples[1], IqSample::new(2.0, -1.0));
    }

    #[test]
    fn truncated_buffers() {
        assert!(matches!(
            extract_from_bytes(&[1, 0, 0]),
            Err(DfeError::TruncatedPacket {
                required: 8,
                available: 3
            })
        ));

        let mut bytes = encode_packet(&packet(2440, &[(1.0, 1.0), (2.0, 2.0)]));
        bytes.pop();
        assert!(matches!(
            extract_from_bytes(&bytes),
            Err(DfeError::TruncatedPacket {
                required: 16,
                available: 15
            })
        ));
    }

    #[test]
    fn oversized_record_is_rejected() {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[..4].copy_from_slice(&(MAX_RAW_SAMPLES as u32 + 1).to_le_bytes());
        assert!(matches!(
            extract_from_bytes(&bytes),
            Err(DfeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn reader_iterates_records() {
        let mut writer = CaptureWriter::new(Vec::new());
        writer.write(&packet(2402, &[(1.0, 2.0)])).unwrap();
        writer.write(&packet(2480, &[(3.0, 4.0), (5.0, 6.0)])).unwrap();
        assert_eq!(writer.written(), 2);

        let reader = CaptureReader::new(Cursor::new(writer.into_inner()));
        let packets: Vec<RawPacket> = reader.map(|p| p.unwrap()).collect();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[1].header.frequency, 2480);
        assert_eq!(packets[1].samples.len(), 2);
    }

    #[test]
    fn reader_reports_cut_record_once() {
        let mut bytes = encode_packet(&packet(2402, &[(1.0, 2.0)]));
        bytes.extend_from_slice(&encode_packet(&packet(2402, &[(1.0, 2.0)]))[..10]);

        let mut reader = CaptureReader::new(Cursor::new(bytes));
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(
            reader.next(),
            Some(Err(DfeError::TruncatedPacket { .. }))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn header_length_limits_encoded_samples() {
        let mut raw = packet(2402, &[(1.0, 2.0), (3.0, 4.0)]);
        raw.header.length = 1;
        let (decoded, _) = extract_from_bytes(&encode_packet(&raw)).unwrap();
        assert_eq!(decoded.samples.len(), 1);
        assert_eq!(decoded.header.length, 1);
    }
}
