//! CLI argument parsing, grounded on a shared-args-struct-embedded-by-flatten
//! composition pattern but collapsed to the single surface every stage
//! binary shares: `-S -D -A -C -T -f -v -V -h`.

use clap::Parser;

/// Shared by every stage binary. Not every field is meaningful to every
/// stage (e.g. `-A` is unused by a pure source); unused fields are simply
/// left at their defaults.
#[derive(Parser, Debug, Clone)]
pub struct StageArgs {
    /// Status socket bind address.
    #[arg(short = 'S', long = "status-address")]
    pub status_address: Option<String>,

    /// Data output socket bind address.
    #[arg(short = 'D', long = "data-address")]
    pub data_address: Option<String>,

    /// Data input socket connect address (filters, sinks).
    #[arg(short = 'A', long = "input-address")]
    pub input_address: Option<String>,

    /// Command intake socket bind address.
    #[arg(short = 'C', long = "commands-address")]
    pub commands_address: Option<String>,

    /// Base tick period, milliseconds.
    #[arg(short = 'T', long = "base-period")]
    pub base_period_ms: Option<u64>,

    /// Stage configuration file.
    #[arg(short = 'f', long = "config", default_value = "config.toml")]
    pub config_file: String,

    /// Verbose execution (`-v`), or `-V` for more detail.
    #[arg(short = 'v', action = clap::ArgAction::SetTrue)]
    pub verbose: bool,

    #[arg(short = 'V', action = clap::ArgAction::SetTrue)]
    pub very_verbose: bool,
}

impl StageArgs {
    pub fn verbosity(&self) -> u8 {
        if self.very_verbose {
            2
        } else if self.verbose {
            1
        } else {
            0
        }
    }
}

/// Extra arguments for the replay sequencer, layered on `StageArgs`.
#[derive(Parser, Debug, Clone)]
pub struct ReplayArgs {
    #[command(flatten)]
    pub stage: StageArgs,

    /// Events-output buffer size, in records.
    #[arg(short = 'B', long = "buffer-size", default_value_t = 256)]
    pub buffer_size: usize,

    /// Leading packets to suppress.
    #[arg(short = 's', long = "skip", default_value_t = 0)]
    pub skip_packets: usize,

    /// Loop the file continuously instead of stopping at EOF.
    #[arg(short = 'c', long = "continuous", action = clap::ArgAction::SetTrue)]
    pub continuous: bool,

    /// File to replay.
    pub file_name: String,
}

/// Arguments for the `daqctl` control-plane client.
#[derive(Parser, Debug, Clone)]
pub struct DaqctlArgs {
    /// Target stage's command intake address.
    #[arg(short = 'a', long = "commands-address")]
    pub commands_address: String,

    /// Target stage's status address, for `--watch`.
    #[arg(short = 'S', long = "status-address")]
    pub status_address: Option<String>,

    /// Command name (start, stop, reconfigure, off, quit, reset, snapshot).
    #[arg(short = 'c', long = "command")]
    pub command: String,

    /// JSON arguments object for the command, when it takes one.
    #[arg(long = "arguments")]
    pub arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_args_defaults() {
        let args = StageArgs::try_parse_from(["test"]).unwrap();
        assert_eq!(args.config_file, "config.toml");
        assert_eq!(args.verbosity(), 0);
        assert!(args.status_address.is_none());
    }

    #[test]
    fn stage_args_verbosity_levels() {
        let args = StageArgs::try_parse_from(["test", "-v"]).unwrap();
        assert_eq!(args.verbosity(), 1);
        let args = StageArgs::try_parse_from(["test", "-V"]).unwrap();
        assert_eq!(args.verbosity(), 2);
    }

    #[test]
    fn stage_args_addresses() {
        let args = StageArgs::try_parse_from([
            "test", "-S", "tcp://*:1", "-D", "tcp://*:2", "-A", "tcp://localhost:3", "-C",
            "tcp://*:4", "-T", "20",
        ])
        .unwrap();
        assert_eq!(args.status_address.as_deref(), Some("tcp://*:1"));
        assert_eq!(args.data_address.as_deref(), Some("tcp://*:2"));
        assert_eq!(args.input_address.as_deref(), Some("tcp://localhost:3"));
        assert_eq!(args.commands_address.as_deref(), Some("tcp://*:4"));
        assert_eq!(args.base_period_ms, Some(20));
    }

    #[test]
    fn replay_args_parses_positional_file_and_flags() {
        let args = ReplayArgs::try_parse_from(["test", "-s", "3", "-c", "run001.ade"]).unwrap();
        assert_eq!(args.skip_packets, 3);
        assert!(args.continuous);
        assert_eq!(args.file_name, "run001.ade");
    }

    #[test]
    fn daqctl_args_parses_command_and_arguments() {
        let args = DaqctlArgs::try_parse_from([
            "test",
            "-a",
            "tcp://localhost:16180",
            "-c",
            "reconfigure",
            "--arguments",
            r#"{"base_period_ms": 20}"#,
        ])
        .unwrap();
        assert_eq!(args.command, "reconfigure");
        assert_eq!(args.arguments.as_deref(), Some(r#"{"base_period_ms": 20}"#));
    }
}
