//! Stream-based locating
//!
//! Packets can either be loaded from a capture file and processed as a batch,
//! or streamed piece by piece through a [`ScoutBee`]. The bee runs the
//! pipeline on a worker thread, takes its packets from a queue fed by the
//! radio (or from a capture file) and forwards the reports to its sinks.
//!
//! Failed events never stop the bee: they are logged and the next packet is
//! awaited.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::packet::{CaptureReader, CaptureWriter};
use crate::persistence::write_text_report;
use crate::{
    AntennaConfig, DfeError, DfeReport, EstimatorConfig, Pipeline, RawPacket, ReportFile,
    SamplingConfig, Session, SmoothingMode, Writer,
};

/// Size of batches to write.
///
/// This is used in the writer background thread when doing live locating.
/// Specifically, once this critical size is reached, a batch is considered
/// sufficiently big to be commited to the writer, i.e. written to the file.
const BATCH_SIZE: usize = 1000;

/// Time to wait for a packet before checking whether to stop.
const RECV_TIMEOUT: Duration = Duration::from_millis(1000);

/// Where a bee takes its raw packets from
pub enum PacketSource {
    /// Packets pushed by the radio, one per CTE
    Queue(Receiver<RawPacket>),
    /// Packets replayed from a capture file
    File(CaptureReader<BufReader<File>>),
}

impl PacketSource {
    /// Open a capture file as a packet source.
    pub fn from_file(path: PathBuf) -> Result<Self, DfeError> {
        log::info!("Creating packet source from capture file: {}", path.display());
        Ok(Self::File(CaptureReader::open(&path)?))
    }
}

/// Outcome of waiting for the next packet
enum Next {
    Packet(RawPacket),
    Idle,
    Done,
}

impl PacketSource {
    fn next_packet(&mut self) -> Next {
        match self {
            PacketSource::Queue(rx) => match rx.recv_timeout(RECV_TIMEOUT) {
                Ok(packet) => Next::Packet(packet),
                Err(RecvTimeoutError::Timeout) => Next::Idle,
                Err(RecvTimeoutError::Disconnected) => {
                    log::trace!("Packet queue disconnected");
                    Next::Done
                }
            },
            PacketSource::File(reader) => match reader.next() {
                Some(Ok(packet)) => Next::Packet(packet),
                Some(Err(e)) => {
                    log::error!("Capture file ended with a broken record: {}", e);
                    Next::Done
                }
                None => Next::Done,
            },
        }
    }
}

/// A sink to receive honey, i.e. processed reports
pub enum HoneySink {
    File(ReportFile),
    Queue(Sender<DfeReport>),
}

/// A sink to receive pollen, i.e. raw packets.
///
/// This is mainly used to record packets received live as an intermediate
/// optional processing step, so they can be replayed later.
pub enum PollenSink {
    File(CaptureWriter<BufWriter<File>>),
}

/// Everything the scouting thread needs to run the pipeline
struct Locator {
    sampling: SamplingConfig,
    antennas: AntennaConfig,
    estimator: EstimatorConfig,
    smoothing: SmoothingMode,
}

/// Runs the locating pipeline on packets from a [`PacketSource`].
///
/// Supports option to stream raw packets and/or reports to sinks for further handling.
pub struct ScoutBee {
    source: Option<PacketSource>,
    locator: Option<Locator>,
    pollen_sink: Option<PollenSink>,
    honey_sink: Option<Sender<DfeReport>>,
    running: Arc<AtomicBool>,
    scout: Option<JoinHandle<Option<PollenSink>>>,
    file_writer: Option<JoinHandle<()>>,
}

impl ScoutBee {
    /// Creates a bee, checking that the configuration can be processed.
    pub fn new(
        source: PacketSource,
        sampling: SamplingConfig,
        antennas: AntennaConfig,
        estimator: EstimatorConfig,
        smoothing: SmoothingMode,
    ) -> Result<Self, DfeError> {
        Pipeline::new(&sampling, &antennas, estimator)?;
        Session::new(smoothing)?;

        Ok(Self {
            source: Some(source),
            locator: Some(Locator {
                sampling,
                antennas,
                estimator,
                smoothing,
            }),
            pollen_sink: None,
            honey_sink: None,
            running: Arc::new(AtomicBool::new(false)),
            scout: None,
            file_writer: None,
        })
    }

    /// Registers a sink for processed reports, supporting multiple output options.
    ///
    /// - `HoneySink::File`: Reports are batched and saved to a specified file.
    /// - `HoneySink::Queue`: Reports are sent to an in-process queue for real-time handling.
    ///
    /// # Parameters
    /// - `sink`: The sink to stream the reports to.
    pub fn subscribe_for_honey(&mut self, sink: HoneySink) -> Result<(), DfeError> {
        if self.honey_sink.is_some() {
            return Err(DfeError::InvalidArgument(
                "Cant set two report sinks (currently)".into(),
            ));
        }

        let sink = match sink {
            HoneySink::File(file) => {
                let (tx, rx) = bounded(100);

                log::trace!(
                    "Spawning background thread to write reports to file {:?}",
                    file
                );
                self.file_writer = Some(thread::spawn(|| write_reports_to_file(rx, file)));
                tx
            }
            HoneySink::Queue(queue) => queue,
        };

        self.honey_sink = Some(sink);
        Ok(())
    }

    /// Registers a sink for pollen (raw packets)
    ///
    /// - `PollenSink::File`: Specifies a capture file to write packets to
    pub fn subscribe_for_pollen(&mut self, sink: PollenSink) -> Result<(), DfeError> {
        if self.pollen_sink.is_some() {
            return Err(DfeError::InvalidArgument(
                "Cant set two raw sinks (currently)".into(),
            ));
        }
        self.pollen_sink = Some(sink);
        Ok(())
    }

    /// Starts scouting packets from the registered source
    ///
    /// Reads packets from the source, then:
    ///
    /// 1. If a `PollenSink` is registered, first records the raw packets
    /// 2. Runs the pipeline and forwards the report to the `HoneySink`, if any.
    ///
    /// Processes packets continuously until:
    /// - The source ends (capture file read or queue disconnected), or
    /// - The `stop()` method is called.
    ///
    /// # Parameters
    /// * `print` - Whether to print reports to stdout.
    pub fn start_scouting(&mut self, print: bool) -> Result<(), DfeError> {
        let source = self.source.take().ok_or_else(|| {
            DfeError::InvalidArgument("Bee has no packet source left to scout".into())
        })?;
        let locator = self.locator.take().ok_or_else(|| {
            DfeError::InvalidArgument("Bee has already been scouting".into())
        })?;

        log::info!("Starting scouting for packets! εწз");
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let pollen_sink = self.pollen_sink.take();
        let honey_sink = self.honey_sink.take();
        self.scout = Some(thread::spawn(move || {
            scout(source, locator, running, pollen_sink, honey_sink, print)
        }));
        Ok(())
    }

    /// Whether the scouting thread is still processing packets.
    pub fn is_scouting(&self) -> bool {
        self.scout
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Stops scouting gracefully by setting `running` to `false`.
    ///
    /// # Note
    ///
    /// After invoking this function, registered sinks are destroyed. A bee
    /// scouts only once.
    pub fn stop(&mut self) {
        log::info!("Stopping scouting; Resetting sinks as well.");
        self.running.store(false, Ordering::SeqCst);

        if let Some(scout) = self.scout.take() {
            match scout.join() {
                Ok(Some(PollenSink::File(mut file))) => {
                    // Ensure capture file is flushed
                    if let Err(e) = file.flush() {
                        log::error!("Error flushing capture file: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => log::error!("Couldn't join scout thread. Error: {:?}", e),
            }
        }

        // Ensure the queue is destroyed so the file writer is notified.
        self.honey_sink = None;
        if let Some(file_writer) = self.file_writer.take() {
            if let Err(e) = file_writer.join() {
                log::error!("Couldn't join file writer thread. Error: {:?}", e);
            }
        }
        self.pollen_sink = None;
    }
}

/// Function to constantly read and process packets
///
/// Owns the only session of the bee, so smoothing state never leaves this
/// thread. Returns the pollen sink for the caller to flush.
///
/// # Arguments
/// * `source` - Source to read packets from
/// * `locator` - Configuration of the pipeline
/// * `running` - A shared flag to signalize scouting to stop
/// * `pollen_sink` - Optional sink for raw packets
/// * `honey_sink` - Optional sink for reports
/// * `print` - Flag whether to print reports to `stdout`.
fn scout(
    mut source: PacketSource,
    locator: Locator,
    running: Arc<AtomicBool>,
    mut pollen_sink: Option<PollenSink>,
    mut honey_sink: Option<Sender<DfeReport>>,
    print: bool,
) -> Option<PollenSink> {
    let pipeline = match Pipeline::new(&locator.sampling, &locator.antennas, locator.estimator) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            log::error!("Couldn't set up the pipeline: {}", e);
            return pollen_sink;
        }
    };
    let mut session = match Session::new(locator.smoothing) {
        Ok(session) => session,
        Err(e) => {
            log::error!("Couldn't set up the smoothing session: {}", e);
            return pollen_sink;
        }
    };

    let (mut processed, mut dropped) = (0usize, 0usize);
    while running.load(Ordering::SeqCst) {
        let packet = match source.next_packet() {
            Next::Packet(packet) => packet,
            Next::Idle => {
                log::debug!("No data received.");
                continue;
            }
            Next::Done => break,
        };

        log::trace!(
            "Got a packet of {} samples at {} MHz",
            packet.header.length,
            packet.header.frequency
        );

        if let Some(PollenSink::File(file)) = &mut pollen_sink {
            if let Err(e) = file.write(&packet) {
                log::error!("Failed to record raw packet: {}", e);
            }
        }

        if honey_sink.is_none() && !print {
            continue;
        }

        let report = match pipeline.process(&packet, &mut session) {
            Ok(report) => report,
            Err(e) => {
                log::error!("Failed to locate packet. Skipping. Error: {}", e);
                dropped += 1;
                continue;
            }
        };
        processed += 1;

        if print {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = write_text_report(&mut stdout, &report) {
                log::error!("Failed to print report: {}", e);
            }
        }

        if let Some(sink) = &honey_sink {
            if let Err(e) = sink.send(report) {
                log::error!(
                    "Failed to forward report to sink; Dropping the sink. Error: {}",
                    e
                );
                honey_sink = None;
            }
        }
    }

    log::info!(
        "Scouting completed! {} packets located, {} dropped.",
        processed,
        dropped
    );
    pollen_sink
}

/// Writes reports to a file in batches, receiving data from a queue.
///
/// # Parameters
/// - `rx`: Receiver channel that receives the reports to write.
/// - `out_file`: The file to which reports are saved in batches.
fn write_reports_to_file(rx: Receiver<DfeReport>, out_file: ReportFile) {
    let mut report_buffer = Vec::new();
    let mut writer = match Writer::new(out_file) {
        Ok(writer) => writer,
        Err(e) => {
            log::error!("Couldn't create a file writer: {}. Exiting writer.", e);
            return;
        }
    };

    while let Ok(report) = rx.recv() {
        report_buffer.push(report);
        if report_buffer.len() < BATCH_SIZE {
            continue;
        }

        if let Err(e) = writer.add_batch(&report_buffer) {
            log::error!("Error encountered on batch writing: {}. Exiting writer.", e);
            return;
        }
        report_buffer.clear();
    }

    // Write any remaining reports when the channel is closed
    if !report_buffer.is_empty() {
        if let Err(e) = writer.add_batch(&report_buffer) {
            log::error!("Error encountered on batch writing: {}. Exiting writer.", e);
            return;
        }
    }

    match writer.finalize() {
        Ok(bytes) => log::info!("Finished writing reports ({} bytes)", bytes),
        Err(e) => log::error!("Couldn't finalize report file: {}", e),
    }
}
