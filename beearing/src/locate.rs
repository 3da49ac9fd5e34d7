use beearing_lib::{
    map_iq_samples_to_antennas, read_capture_file, reference_stats, write_text_report,
    CaptureWriter, DfeReport, HoneySink, PacketSource, Pipeline, PollenSink, RawPacket, ReportFile,
    SamplingTiming, ScoutBee, Session, Writer,
};

use std::error::Error;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::cli::{FromFileArgs, StreamArgs, TimingArgs};

pub fn run_stream(args: StreamArgs) -> Result<(), Box<dyn Error>> {
    let StreamArgs {
        input,
        out,
        format,
        raw_out,
        print,
        config,
    } = args;

    // Set up the `running` flag for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);

    // Set up CTRL+C handler for graceful shutdown
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut bee = ScoutBee::new(
        PacketSource::from_file(input)?,
        config.sampling()?,
        config.antennas()?,
        config.estimator()?,
        config.filter,
    )?;

    if let Some(raw_out_path) = raw_out {
        bee.subscribe_for_pollen(PollenSink::File(CaptureWriter::create(&raw_out_path)?))?;
    }

    if let Some(out_path) = out {
        bee.subscribe_for_honey(HoneySink::File(ReportFile {
            file_path: out_path,
            file_type: format,
        }))?;
    }

    bee.start_scouting(print)?;

    // Wait for CTRL+C or the end of the capture
    while running.load(Ordering::SeqCst) && bee.is_scouting() {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    println!("Shutting down gracefully...");
    bee.stop();
    Ok(())
}

pub fn run_from_file(args: FromFileArgs) -> Result<(), Box<dyn Error>> {
    let packets = read_capture_file(&args.input)?;
    log::info!("Read {} packets from {}", packets.len(), args.input.display());

    let sampling = args.config.sampling()?;
    let antennas = args.config.antennas()?;
    let pipeline = Pipeline::new(&sampling, &antennas, args.config.estimator()?)?;
    let mut session = Session::new(args.config.filter)?;

    if args.stats {
        print_reference_stats(&pipeline, &packets);
    }

    let mut stdout = std::io::stdout().lock();
    let mut reports: Vec<DfeReport> = Vec::with_capacity(packets.len());
    for (idx, packet) in packets.iter().enumerate() {
        match pipeline.process(packet, &mut session) {
            Ok(report) => {
                if args.print {
                    write_text_report(&mut stdout, &report)?;
                }
                reports.push(report);
            }
            Err(e) => log::warn!("Skipping packet {}: {}", idx, e),
        }
    }
    log::info!("Located {} of {} packets", reports.len(), packets.len());

    if let Some(file) = args.out {
        let mut writer = Writer::new(ReportFile {
            file_path: file,
            file_type: args.format,
        })?;
        writer.add_batch(&reports)?;
        let size = writer.finalize()?;
        log::info!("Wrote {} reports ({} bytes)", reports.len(), size);
    }
    Ok(())
}

fn print_reference_stats(pipeline: &Pipeline<'_>, packets: &[RawPacket]) {
    for (idx, packet) in packets.iter().enumerate() {
        let stats = map_iq_samples_to_antennas(packet, pipeline.timing(), pipeline.antennas())
            .and_then(|mapped| reference_stats(&mapped.reference));
        match stats {
            Ok(stats) => println!(
                "{:>5} {:>5} MHz drift {:>8.2} deg magnitude {:>8.1}",
                idx, packet.header.frequency, stats.phase_drift_deg, stats.magnitude
            ),
            Err(e) => println!("{:>5} {}", idx, e),
        }
    }
}

pub fn run_timing(args: TimingArgs) -> Result<(), Box<dyn Error>> {
    let sampling = args.config.sampling()?;
    let antennas = args.config.antennas()?;
    let timing = SamplingTiming::new(&sampling)?;

    println!("Regime:                  {}", timing.regime);
    println!("Switching period:        {} ns", timing.switching_duration_ns);
    println!("Switch spacing:          {} ns", timing.switch_spacing_ns);
    println!("Sample spacing:          {} ns", timing.sample_spacing_ns);
    println!("Reference spacing:       {} ns", timing.ref_spacing_ns);
    println!("Reference samples:       {}", timing.reference_samples);
    println!("Effective slots:         {}", timing.effective_slots);
    println!("Samples per slot:        {}", timing.samples_per_slot);
    println!("Antenna step:            {}", timing.antenna_step);
    println!("Delay before sampling:   {} ns", timing.delay_before_first_sample_ns);
    println!("Raw samples per packet:  {}", timing.required_raw_samples());
    println!("Switch patterns:         {:?}", antennas.switch_patterns()?);
    Ok(())
}
