use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::simulation::routing::weights::Severity;

/// The boundary of the core: one trip request plus the path to the config file. Severity is a
/// closed enumeration, so malformed values are rejected at parse time, before the core runs.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineArgs {
    #[arg(long, short)]
    pub config: String,
    /// link the vehicle departs from
    #[arg(long)]
    pub start: String,
    /// link the vehicle must reach
    #[arg(long)]
    pub goal: String,
    #[arg(long, value_enum, default_value_t = Severity::High)]
    pub severity: Severity,
    /// simulated departure time in seconds
    #[arg(long, default_value_t = 0)]
    pub depart_time: u32,
    #[arg(long, default_value = "emergency-1")]
    pub vehicle: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub routing: Routing,
    #[serde(default)]
    pub preemption: Preemption,
    #[serde(default)]
    pub output: Output,
}

impl Config {
    pub fn from_file(config_path: &Path) -> Self {
        let file = File::open(config_path).unwrap_or_else(|e| {
            panic!(
                "Failed to open config file at {:?}. Original error was {}",
                config_path, e
            );
        });
        serde_yaml::from_reader(BufReader::new(file)).unwrap_or_else(|e| {
            panic!(
                "Failed to parse config at {:?}. Original error was: {}",
                config_path, e
            )
        })
    }
}

pub fn write_config(config: &Config, output_path: &Path) {
    let output_config = output_path.join("output_config.yml");
    let file = File::create(&output_config).expect("Failed to create output config file");
    let writer = BufWriter::new(file);
    serde_yaml::to_writer(writer, config).expect("Failed to write output config file");
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Routing {
    /// windows of the day in which the temporal weight shift applies
    #[serde(default = "default_rush_hours")]
    pub rush_hours: Vec<TimeWindow>,
    /// cadence of route progress events during a trip, in seconds
    #[serde(default = "default_to_30")]
    pub progress_interval: u32,
}

impl Default for Routing {
    fn default() -> Self {
        Routing {
            rush_hours: default_rush_hours(),
            progress_interval: default_to_30(),
        }
    }
}

/// Half-open window [begin, end) in seconds of day. A window with begin > end wraps past
/// midnight.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub begin: u32,
    pub end: u32,
}

impl TimeWindow {
    pub fn contains(&self, time_of_day: u32) -> bool {
        if self.begin <= self.end {
            self.begin <= time_of_day && time_of_day < self.end
        } else {
            time_of_day >= self.begin || time_of_day < self.end
        }
    }
}

fn default_rush_hours() -> Vec<TimeWindow> {
    vec![
        TimeWindow {
            begin: 7 * 3600,
            end: 9 * 3600,
        },
        TimeWindow {
            begin: 16 * 3600,
            end: 19 * 3600,
        },
    ]
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Preemption {
    /// remaining route distance below which a signal is preempted, in meters
    #[serde(default = "default_to_500")]
    pub trigger_distance: f64,
    /// how long each compatible phase is held while preempted, in seconds
    #[serde(default = "default_to_10")]
    pub phase_dwell: u32,
    /// speed below which the vehicle counts as stuck, in m/s
    #[serde(default = "default_stuck_speed")]
    pub stuck_speed: f32,
    /// a low-speed streak must exceed this duration (strictly) to trigger a fallback, in seconds
    #[serde(default = "default_to_10")]
    pub stuck_after: u32,
    /// how long normal timing is restored before preemption is re-attempted, in seconds
    #[serde(default = "default_to_15")]
    pub fallback_duration: u32,
    /// fallback cycles after which the intersection is quarantined
    #[serde(default = "default_to_3")]
    pub max_fallback_cycles: u32,
    /// forced normal operation after gridlock, in seconds
    #[serde(default = "default_to_30")]
    pub gridlock_cooldown: u32,
}

impl Default for Preemption {
    fn default() -> Self {
        Preemption {
            trigger_distance: default_to_500(),
            phase_dwell: default_to_10(),
            stuck_speed: default_stuck_speed(),
            stuck_after: default_to_10(),
            fallback_duration: default_to_15(),
            max_fallback_cycles: default_to_3(),
            gridlock_cooldown: default_to_30(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Output {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub write_events: WriteEvents,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            output_dir: default_output_dir(),
            logging: Logging::default(),
            write_events: WriteEvents::default(),
        }
    }
}

/// Have this extra layer of log level enum, as tracing subscriber has no off/none option by
/// default. At least it can't be parsed.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub enum Logging {
    #[default]
    None,
    Info,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub enum WriteEvents {
    #[default]
    None,
    Json,
}

fn default_output_dir() -> PathBuf {
    "./".into()
}

fn default_to_500() -> f64 {
    500.
}

fn default_stuck_speed() -> f32 {
    // 5 km/h
    5.0 / 3.6
}

fn default_to_3() -> u32 {
    3
}

fn default_to_10() -> u32 {
    10
}

fn default_to_15() -> u32 {
    15
}

fn default_to_30() -> u32 {
    30
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{write_config, CommandLineArgs, Config, Logging, TimeWindow};
    use crate::simulation::routing::weights::Severity;

    #[test]
    fn empty_config_gets_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();

        assert_eq!(500., config.preemption.trigger_distance);
        assert_eq!(10, config.preemption.phase_dwell);
        assert_eq!(3, config.preemption.max_fallback_cycles);
        assert_eq!(30, config.preemption.gridlock_cooldown);
        assert_eq!(2, config.routing.rush_hours.len());
        assert_eq!(Logging::None, config.output.logging);
    }

    #[test]
    fn partial_section_keeps_remaining_defaults() {
        let yaml = r#"
preemption:
  trigger_distance: 250.0
output:
  logging: Info
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(250., config.preemption.trigger_distance);
        assert_eq!(10, config.preemption.stuck_after);
        assert_eq!(Logging::Info, config.output.logging);
    }

    #[test]
    fn time_window_contains() {
        let morning = TimeWindow {
            begin: 7 * 3600,
            end: 9 * 3600,
        };
        assert!(morning.contains(7 * 3600));
        assert!(morning.contains(8 * 3600));
        assert!(!morning.contains(9 * 3600));
        assert!(!morning.contains(12 * 3600));

        let night = TimeWindow {
            begin: 22 * 3600,
            end: 2 * 3600,
        };
        assert!(night.contains(23 * 3600));
        assert!(night.contains(3600));
        assert!(!night.contains(12 * 3600));
    }

    #[test]
    fn config_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn written_config_can_be_loaded_again() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();

        write_config(&config, dir.path());
        let loaded = Config::from_file(&dir.path().join("output_config.yml"));

        assert_eq!(config, loaded);
    }

    #[test]
    fn command_line_args_parse() {
        let args = CommandLineArgs::parse_from([
            "greenwave",
            "--config",
            "config.yml",
            "--start",
            "in-link",
            "--goal",
            "out-link",
            "--severity",
            "critical",
            "--depart-time",
            "3600",
        ]);

        assert_eq!("config.yml", args.config);
        assert_eq!("in-link", args.start);
        assert_eq!("out-link", args.goal);
        assert_eq!(Severity::Critical, args.severity);
        assert_eq!(3600, args.depart_time);
        assert_eq!("emergency-1", args.vehicle);
    }

    #[test]
    fn malformed_severity_is_rejected_at_parse_time() {
        let result = CommandLineArgs::try_parse_from([
            "greenwave",
            "--config",
            "config.yml",
            "--start",
            "in-link",
            "--goal",
            "out-link",
            "--severity",
            "urgent",
        ]);
        assert!(result.is_err());
    }
}
