use clap::{Arg, ArgMatches, Command};

pub const ARG_RATE_LIMIT_WINDOW: &str = "rate-limit-window-seconds";
pub const ARG_RATE_LIMIT_CEILING: &str = "rate-limit-ceiling";
pub const ARG_SWEEP_INTERVAL: &str = "sweep-interval-seconds";
pub const ARG_ANON_CEILING: &str = "anon-ceiling";

#[derive(Debug, Clone)]
pub struct Options {
    pub rate_limit_window_seconds: u64,
    pub rate_limit_ceiling: usize,
    pub sweep_interval_seconds: u64,
    pub anon_ceiling_overrides: Vec<String>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            rate_limit_window_seconds: matches
                .get_one::<u64>(ARG_RATE_LIMIT_WINDOW)
                .copied()
                .unwrap_or(60),
            rate_limit_ceiling: matches
                .get_one::<usize>(ARG_RATE_LIMIT_CEILING)
                .copied()
                .unwrap_or(30),
            sweep_interval_seconds: matches
                .get_one::<u64>(ARG_SWEEP_INTERVAL)
                .copied()
                .unwrap_or(300),
            anon_ceiling_overrides: matches
                .get_many::<String>(ARG_ANON_CEILING)
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_WINDOW)
                .long(ARG_RATE_LIMIT_WINDOW)
                .help("Sliding rate-limit window length in seconds")
                .env("WORDGATE_RATE_LIMIT_WINDOW_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_CEILING)
                .long(ARG_RATE_LIMIT_CEILING)
                .help("Maximum calls per caller per endpoint within the window")
                .env("WORDGATE_RATE_LIMIT_CEILING")
                .default_value("30")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_SWEEP_INTERVAL)
                .long(ARG_SWEEP_INTERVAL)
                .help("Interval between rate-limit window sweeps in seconds")
                .env("WORDGATE_SWEEP_INTERVAL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_ANON_CEILING)
                .long(ARG_ANON_CEILING)
                .help("Anonymous usage ceiling override as path=limit (repeatable)")
                .env("WORDGATE_ANON_CEILING")
                .action(clap::ArgAction::Append),
        )
}
