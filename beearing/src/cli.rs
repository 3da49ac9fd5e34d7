use beearing_lib::{
    AntennaConfig, AntennaId, AntennaPair, DfeError, EstimatorConfig, FileType, SampleSpacing,
    SamplingConfig, SmoothingMode, SwitchSpacing, GUARD_PERIOD_US, REF_PERIOD_US,
};
use clap::{ArgGroup, Args, Parser, Subcommand};
use simplelog::LevelFilter;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Log level for output (error, warn, info, debug, trace)
    #[arg(global = true, long, default_value = "info", value_enum)]
    pub loglevel: LevelFilter,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process all packets of a capture file as a batch
    FromFile(FromFileArgs),

    /// Stream a capture file through the locator until done or Ctrl-C
    Stream(StreamArgs),

    /// Print the timing derived from a sampling configuration
    Timing(TimingArgs),
}

#[derive(Parser)]
#[command(group = ArgGroup::new("output")
    .required(true)
    .multiple(true)
    .args(&["out", "print", "stats"]))]
pub struct FromFileArgs {
    /// Capture file to read raw packets from
    #[arg(long)]
    pub input: PathBuf,

    /// Output file for reports
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Specify output format, e.g., 'text' or 'parquet'
    #[arg(long, default_value = "text")]
    pub format: FileType,

    /// Whether to print reports
    #[arg(long, default_value = "false")]
    pub print: bool,

    /// Whether to print reference period statistics of every packet
    #[arg(long, default_value = "false")]
    pub stats: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Parser)]
#[command(group = ArgGroup::new("output")
    .required(true)
    .multiple(true)
    .args(&["out", "raw_out", "print"]))]
pub struct StreamArgs {
    /// Capture file to replay
    #[arg(long)]
    pub input: PathBuf,

    /// Output file for reports
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Specify output format, e.g., 'text' or 'parquet'
    #[arg(long, default_value = "text")]
    pub format: FileType,

    /// Output file to record the raw packets to
    #[arg(long)]
    pub raw_out: Option<PathBuf>,

    /// Whether to print reports
    #[arg(long, default_value = "false")]
    pub print: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Parser)]
pub struct TimingArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Sampling, antenna and estimator configuration
#[derive(Args)]
pub struct ConfigArgs {
    /// CTE length in units of 8us
    #[arg(long, default_value = "20")]
    pub cte_8us: u8,

    /// Antenna switch spacing (1us, 2us, 4us, 8us)
    #[arg(long, default_value = "2us")]
    pub switch_spacing: SwitchSpacing,

    /// Sample spacing in the switching period (125ns .. 4us)
    #[arg(long, default_value = "2us")]
    pub sample_spacing: SampleSpacing,

    /// Sample spacing in the reference period (125ns .. 4us)
    #[arg(long, default_value = "1us")]
    pub ref_spacing: SampleSpacing,

    /// DFECTRL1 register word (hex) to take the sampling from instead
    #[arg(long, value_parser = parse_hex)]
    pub dfectrl1: Option<u32>,

    /// Antenna used in the reference period
    #[arg(long, default_value = "11")]
    pub ref_antenna: u8,

    /// Antenna switch sequence
    #[arg(long, value_delimiter = ',', default_value = "12,1,2,10,3,9,4,8,7,6,5")]
    pub switch_sequence: Vec<u8>,

    /// GPIO pattern of every antenna, indexed by antenna id
    #[arg(long, value_delimiter = ',', default_value = "0,5,6,4,9,10,8,13,14,12,1,2,0")]
    pub gpio_patterns: Vec<u8>,

    /// Antenna pair evaluated for the azimuth, e.g. '12,1'
    #[arg(long, value_parser = parse_pair, default_value = "12,1")]
    pub pair: (u8, u8),

    /// Distance between the azimuth antennas in meters
    #[arg(long, default_value = "0.05")]
    pub antenna_distance: f32,

    /// Antenna pair evaluated for the elevation
    #[arg(long, value_parser = parse_pair)]
    pub elevation_pair: Option<(u8, u8)>,

    /// Distance between the elevation antennas in meters (defaults to the azimuth distance)
    #[arg(long, requires = "elevation_pair")]
    pub elevation_distance: Option<f32>,

    /// Smoothing of successive angles: none, mean, fir or iir:<alpha>
    #[arg(long, default_value = "mean")]
    pub filter: SmoothingMode,
}

fn parse_hex(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|e| format!("Invalid register word {}: {}", s, e))
}

fn parse_pair(s: &str) -> Result<(u8, u8), String> {
    let (a, b) = s
        .split_once(',')
        .ok_or_else(|| format!("Expected two comma separated antennas: {}", s))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u8>()
            .map_err(|e| format!("Invalid antenna {}: {}", v, e))
    };
    Ok((parse(a)?, parse(b)?))
}

impl ConfigArgs {
    pub fn sampling(&self) -> Result<SamplingConfig, DfeError> {
        if let Some(word) = self.dfectrl1 {
            return SamplingConfig::from_dfectrl1(word);
        }
        let config = SamplingConfig {
            number_of_8us: self.cte_8us,
            guard_period_us: GUARD_PERIOD_US,
            ref_period_us: REF_PERIOD_US,
            switch_spacing: self.switch_spacing,
            sample_spacing: self.sample_spacing,
            sample_spacing_ref: self.ref_spacing,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn antennas(&self) -> Result<AntennaConfig, DfeError> {
        let config = AntennaConfig {
            ref_antenna: AntennaId(self.ref_antenna),
            idle_antenna: AntennaId(self.ref_antenna),
            switch_sequence: self.switch_sequence.iter().copied().map(AntennaId).collect(),
            gpio_patterns: self.gpio_patterns.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn estimator(&self) -> Result<EstimatorConfig, DfeError> {
        let azimuth = AntennaPair::new(
            AntennaId(self.pair.0),
            AntennaId(self.pair.1),
            self.antenna_distance,
        )?;
        let elevation = self
            .elevation_pair
            .map(|(a, b)| {
                let distance = self.elevation_distance.unwrap_or(self.antenna_distance);
                AntennaPair::new(AntennaId(a), AntennaId(b), distance)
            })
            .transpose()?;
        Ok(EstimatorConfig { azimuth, elevation })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_hex("0x00355294").unwrap(), 0x0035_5294);
        assert_eq!(parse_hex("355294").unwrap(), 0x0035_5294);
        assert!(parse_hex("0xZZ").is_err());
        assert_eq!(parse_pair("12, 1").unwrap(), (12, 1));
        assert!(parse_pair("12").is_err());
        assert!(parse_pair("12,300").is_err());
    }

    #[test]
    fn defaults_build_valid_configs() {
        let cli = Cli::parse_from(["beearing", "timing"]);
        let Commands::Timing(args) = cli.command else {
            panic!("expected timing command");
        };
        assert_eq!(args.config.sampling().unwrap(), SamplingConfig::default());
        assert_eq!(args.config.antennas().unwrap(), AntennaConfig::default());
        assert_eq!(args.config.estimator().unwrap(), EstimatorConfig::default());
        assert_eq!(args.config.filter, SmoothingMode::CircularMean);
    }

    #[test]
    fn register_word_overrides_spacings() {
        let cli = Cli::parse_from(["beearing", "timing", "--dfectrl1", "0x00355294"]);
        let Commands::Timing(args) = cli.command else {
            panic!("expected timing command");
        };
        let sampling = args.config.sampling().unwrap();
        assert_eq!(sampling.sample_spacing, SampleSpacing::Ns250);
    }

    #[test]
    fn from_file_needs_an_output() {
        assert!(Cli::try_parse_from(["beearing", "from-file", "--input", "a.bin"]).is_err());
        assert!(
            Cli::try_parse_from(["beearing", "from-file", "--input", "a.bin", "--print"]).is_ok()
        );
    }
}
