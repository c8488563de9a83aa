//! Command-line parsing into a validated [`Invocation`].

use crate::algorithm::HashAlgorithm;
use crate::plan::{ExecutionPlan, Runner};
use clap::error::ErrorKind;
use clap::builder::OsStringValueParser;
use clap::Parser;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_PROGRAM_NAME: &str = "hash_benchmark";

/// Flag enabling per-digest output; only recognised as the first argument.
pub const PRINT_FLAG: &str = "-p";

const LOG_OPTION: &str = "--log";
const POSITIONALS: usize = 4;
const STANDALONE_FLAGS: [&str; 4] = ["-h", "--help", "-V", "--version"];

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Digests computed per block
    #[arg(value_parser = OsStringValueParser::new())]
    pub hashes_per_block: OsString,

    /// Number of blocks to run
    #[arg(value_parser = OsStringValueParser::new())]
    pub num_blocks: OsString,

    /// Hash algorithm (sha224, sha256, sha1, md5, blake2b, blake2s)
    #[arg(value_parser = OsStringValueParser::new())]
    pub algorithm: OsString,

    /// Execution strategy (serial, cpu, gpu; sycl-cpu and sycl-gpu are aliases)
    #[arg(value_parser = OsStringValueParser::new())]
    pub runner: OsString,

    /// Append a timestamped record of the run to this file
    #[arg(long, env = "HASH_BENCHMARK_LOG")]
    pub log: Option<PathBuf>,
}

impl Args {
    /// Validates the positionals in order, reporting the first bad one.
    pub fn plan(&self) -> Result<ExecutionPlan, ArgumentError> {
        Ok(ExecutionPlan {
            hashes_per_block: self
                .hashes_per_block
                .to_str()
                .and_then(parse_natural)
                .ok_or(ArgumentError::new(1, Expected::NaturalNumber))?,
            num_blocks: self
                .num_blocks
                .to_str()
                .and_then(parse_natural)
                .ok_or(ArgumentError::new(2, Expected::NaturalNumber))?,
            algorithm: self
                .algorithm
                .to_str()
                .and_then(HashAlgorithm::from_name)
                .ok_or(ArgumentError::new(3, Expected::HashAlgorithm))?,
            runner: self
                .runner
                .to_str()
                .and_then(Runner::from_name)
                .ok_or(ArgumentError::new(4, Expected::Runner))?,
        })
    }
}

/// Settings that are not part of the measured work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub program_name: String,
    pub print_hashes: bool,
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub config: Config,
    pub plan: ExecutionPlan,
}

/// What a rejected argument should have been.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    NaturalNumber,
    HashAlgorithm,
    Runner,
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Expected::NaturalNumber => "a natural number",
            Expected::HashAlgorithm => "a known hash algorithm",
            Expected::Runner => "a known runner",
        })
    }
}

/// Rejection of a single positional value; `position` is 1-based and
/// counted after the print flag is removed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("argument {position} should be {expected}")]
pub struct ArgumentError {
    pub position: usize,
    pub expected: Expected,
}

impl ArgumentError {
    pub fn new(position: usize, expected: Expected) -> Self {
        Self { position, expected }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CliError {
    /// Wrong number or shape of arguments.
    #[error("{}", usage(.program))]
    Usage { program: String },

    #[error("{program}: {source}")]
    Argument {
        program: String,
        #[source]
        source: ArgumentError,
    },

    /// `--help` or `--version`; not a failure.
    #[error("{0}")]
    Help(String),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Help(_) => 0,
            CliError::Usage { .. } | CliError::Argument { .. } => 1,
        }
    }
}

pub fn usage(program: &str) -> String {
    let algorithms: Vec<&str> = HashAlgorithm::ALL.iter().map(|a| a.name()).collect();
    let runners: Vec<&str> = Runner::ALL.iter().map(|r| r.name()).collect();
    let aliases: Vec<String> = Runner::ALIASES
        .iter()
        .map(|(alias, runner)| format!("{}={}", alias, runner))
        .collect();
    format!(
        "usage: {} [-p] <hashes_per_block> <num_blocks> <algorithm> <runner>\n\
         algorithms: {}\n\
         runners: {} (aliases: {})\n",
        program,
        algorithms.join(" "),
        runners.join(" "),
        aliases.join(" ")
    )
}

/// Parses an unsigned 64-bit count the way `strtoull(s, _, 0)` picks a base:
/// `0x` hexadecimal, leading `0` octal, decimal otherwise. The whole token
/// must be consumed.
pub fn parse_natural(token: &str) -> Option<u64> {
    let (digits, radix) = if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        (hex, 16)
    } else if token.len() > 1 && token.starts_with('0') {
        (&token[1..], 8)
    } else {
        (token, 10)
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}

/// Parses a full argument vector, program name first.
pub fn parse<I, T>(argv: I) -> Result<Invocation, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
    let program_name = argv
        .first()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_PROGRAM_NAME.to_string());

    let print_hashes = argv.len() > 2 && argv[1] == PRINT_FLAG;
    if print_hashes {
        argv.remove(1);
    }

    let (options, positionals) = split_log_option(argv.split_off(1.min(argv.len())));
    let mut clap_argv = vec![OsString::from(&program_name)];
    clap_argv.extend(options);
    if positionals.len() == POSITIONALS {
        // After `--` clap takes every token as a value, so `-h` or `-x`
        // reach the positional validators.
        clap_argv.push(OsString::from("--"));
    } else if !(positionals.len() == 1 && STANDALONE_FLAGS.iter().any(|flag| positionals[0] == **flag)) {
        return Err(CliError::Usage {
            program: program_name,
        });
    }
    clap_argv.extend(positionals);

    let args = Args::try_parse_from(clap_argv).map_err(|err| classify(err, &program_name))?;
    let plan = args.plan().map_err(|source| CliError::Argument {
        program: program_name.clone(),
        source,
    })?;

    Ok(Invocation {
        config: Config {
            program_name,
            print_hashes,
            log_path: args.log,
        },
        plan,
    })
}

/// Help and version are successful exits; every other clap error means the
/// argument list itself has the wrong shape.
fn classify(err: clap::Error, program: &str) -> CliError {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => CliError::Help(err.render().to_string()),
        _ => CliError::Usage {
            program: program.to_string(),
        },
    }
}

/// Separates `--log <path>` / `--log=<path>` from the positional tokens.
fn split_log_option(tokens: Vec<OsString>) -> (Vec<OsString>, Vec<OsString>) {
    let mut options = Vec::new();
    let mut positionals = Vec::new();
    let mut tokens = tokens.into_iter().peekable();
    while let Some(token) = tokens.next() {
        let is_log = token == LOG_OPTION;
        let is_log_assignment = token
            .to_str()
            .is_some_and(|t| t.starts_with("--log="));
        if is_log && tokens.peek().is_some() {
            options.push(token);
            options.extend(tokens.next());
        } else if is_log_assignment {
            options.push(token);
        } else {
            positionals.push(token);
        }
    }
    (options, positionals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(tokens: &[&str]) -> Vec<String> {
        std::iter::once("hash_benchmark")
            .chain(tokens.iter().copied())
            .map(String::from)
            .collect()
    }

    fn argument_error(tokens: &[&str]) -> ArgumentError {
        match parse(argv(tokens)) {
            Err(CliError::Argument { source, .. }) => source,
            other => panic!("expected an argument error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_plan() {
        let inv = parse(argv(&["4", "3", "sha224", "serial"])).unwrap();
        assert_eq!(
            inv.plan,
            ExecutionPlan {
                algorithm: HashAlgorithm::Sha224,
                runner: Runner::Serial,
                hashes_per_block: 4,
                num_blocks: 3,
            }
        );
        assert_eq!(inv.config.program_name, "hash_benchmark");
        assert!(!inv.config.print_hashes);
    }

    #[test]
    fn test_print_flag_is_stripped() {
        let inv = parse(argv(&["-p", "4", "3", "sha224", "cpu"])).unwrap();
        assert!(inv.config.print_hashes);
        assert_eq!(inv.plan.runner, Runner::Cpu);

        // Positions are counted after the flag.
        assert_eq!(
            argument_error(&["-p", "x", "3", "sha224", "cpu"]),
            ArgumentError {
                position: 1,
                expected: Expected::NaturalNumber
            }
        );
    }

    #[test]
    fn test_print_flag_only_first() {
        assert!(matches!(
            parse(argv(&["4", "-p", "3", "sha224", "cpu"])),
            Err(CliError::Usage { .. })
        ));
    }

    #[test]
    fn test_count_checked_before_values() {
        assert!(matches!(parse(argv(&["abc"])), Err(CliError::Usage { .. })));
    }

    #[test]
    fn test_first_bad_position_wins() {
        assert_eq!(argument_error(&["4", "x", "sha3", "gpu-fpga"]).position, 2);
    }

    #[test]
    fn test_wrong_count_is_usage() {
        let cases: [&[&str]; 4] = [
            &[],
            &["4", "3", "sha224"],
            &["4", "3", "sha224", "serial", "extra"],
            &["-p"],
        ];
        for tokens in cases {
            match parse(argv(tokens)) {
                Err(err @ CliError::Usage { .. }) => {
                    assert_eq!(err.exit_code(), 1);
                    assert!(err.to_string().starts_with("usage: hash_benchmark "));
                }
                other => panic!("{:?}: expected usage, got {:?}", tokens, other),
            }
        }
    }

    #[test]
    fn test_bad_number() {
        let err = parse(argv(&["abc", "3", "sha224", "serial"])).unwrap_err();
        assert_eq!(err.to_string(), "hash_benchmark: argument 1 should be a natural number");
        assert_eq!(err.exit_code(), 1);

        assert_eq!(
            argument_error(&["4", "18446744073709551616", "sha224", "serial"]),
            ArgumentError {
                position: 2,
                expected: Expected::NaturalNumber
            }
        );
        assert_eq!(argument_error(&["12abc", "3", "sha224", "serial"]).position, 1);
        assert_eq!(argument_error(&["-5", "3", "sha224", "serial"]).position, 1);
    }

    #[test]
    fn test_unknown_algorithm() {
        let err = parse(argv(&["4", "3", "sha3", "serial"])).unwrap_err();
        assert_eq!(err.to_string(), "hash_benchmark: argument 3 should be a known hash algorithm");
    }

    #[test]
    fn test_runners() {
        let err = parse(argv(&["4", "3", "sha224", "gpu-fpga"])).unwrap_err();
        assert_eq!(err.to_string(), "hash_benchmark: argument 4 should be a known runner");

        for runner in Runner::ALL {
            let inv = parse(argv(&["4", "3", "sha224", runner.name()])).unwrap();
            assert_eq!(inv.plan.runner, runner);
        }
        let inv = parse(argv(&["4", "3", "sha224", "sycl-cpu"])).unwrap();
        assert_eq!(inv.plan.runner, Runner::Cpu);
        assert!(usage("hash_benchmark").contains("aliases: sycl-cpu=cpu sycl-gpu=gpu"));
    }

    #[test]
    fn test_parse_natural() {
        assert_eq!(parse_natural("0"), Some(0));
        assert_eq!(parse_natural("42"), Some(42));
        assert_eq!(parse_natural("0x1F"), Some(31));
        assert_eq!(parse_natural("010"), Some(8));
        assert_eq!(parse_natural("18446744073709551615"), Some(u64::MAX));
        assert_eq!(parse_natural("18446744073709551616"), None);
        assert_eq!(parse_natural(""), None);
        assert_eq!(parse_natural("0x"), None);
        assert_eq!(parse_natural("09"), None);
        assert_eq!(parse_natural("+5"), None);
        assert_eq!(parse_natural("5 "), None);
    }

    #[test]
    fn test_log_option() {
        let inv = parse(argv(&["--log", "run.log", "4", "3", "sha224", "serial"])).unwrap();
        assert_eq!(inv.config.log_path, Some(PathBuf::from("run.log")));
    }

    #[test]
    fn test_help_exits_zero() {
        match parse(argv(&["--help"])) {
            Err(err @ CliError::Help(_)) => assert_eq!(err.exit_code(), 0),
            other => panic!("expected help, got {:?}", other),
        }
        for flag in ["-h", "-V", "--version"] {
            assert!(matches!(parse(argv(&[flag])), Err(CliError::Help(_))), "{flag}");
        }
    }

    #[test]
    fn test_dash_token_is_argument_error() {
        let err = parse(argv(&["4", "3", "sha224", "-h"])).unwrap_err();
        assert!(matches!(err, CliError::Argument { source: ArgumentError { position: 4, .. }, .. }));
        assert_eq!(err.exit_code(), 1);

        assert_eq!(argument_error(&["4", "3", "sha224", "--version"]).position, 4);
        assert_eq!(argument_error(&["4", "3", "-x", "serial"]).position, 3);
        assert_eq!(argument_error(&["4", "3", "--", "serial"]).position, 3);
        assert_eq!(argument_error(&["--help", "3", "sha224", "serial"]).position, 1);
    }

    #[test]
    fn test_help_flag_among_other_tokens_is_usage() {
        assert!(matches!(parse(argv(&["4", "--help"])), Err(CliError::Usage { .. })));
        assert!(matches!(
            parse(argv(&["4", "3", "sha224", "serial", "-V"])),
            Err(CliError::Usage { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_token_is_argument_error() {
        use std::os::unix::ffi::OsStringExt;

        let mut tokens: Vec<OsString> = argv(&["4", "3", "sha224", "serial"])
            .into_iter()
            .map(OsString::from)
            .collect();
        tokens[3] = OsString::from_vec(vec![0x73, 0x68, 0xff]);
        match parse(tokens) {
            Err(CliError::Argument { source, .. }) => assert_eq!(
                source,
                ArgumentError {
                    position: 3,
                    expected: Expected::HashAlgorithm
                }
            ),
            other => panic!("expected an argument error, got {:?}", other),
        }
    }

    #[test]
    fn test_log_option_forms() {
        let inv = parse(argv(&["4", "3", "--log=run.log", "sha224", "serial"])).unwrap();
        assert_eq!(inv.config.log_path, Some(PathBuf::from("run.log")));

        let inv = parse(argv(&["-p", "4", "--log", "run.log", "3", "sha224", "serial"])).unwrap();
        assert!(inv.config.print_hashes);
        assert_eq!(inv.config.log_path, Some(PathBuf::from("run.log")));
    }
}
