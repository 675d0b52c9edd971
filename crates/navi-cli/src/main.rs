//! # Navi CLI Entry Point
//!
//! Runs commands against a dual storage processor array, failing over to
//! the other processor when one stops answering.
//!
//! ## Usage
//!
//! ```bash
//! # Raw output of a command
//! navi --spa 10.0.0.1 --spb 10.0.0.2 exec -- getlun -name
//!
//! # Parsed records as JSON
//! navi --spa 10.0.0.1 --spb 10.0.0.2 query --type Pool -- storagepool -list
//!
//! # Parse output captured earlier
//! navi parse --type Lun lun_list.txt
//!
//! # Probe both processors once
//! navi --config array.yaml status
//! ```
//!
//! Credentials come from `--user`/`--password`/`--scope` or `--secfile`,
//! then from `NAVI_USER`, `NAVI_PASSWORD`, `NAVI_SCOPE` and `NAVI_SECFILE`,
//! then from the config file.

use anyhow::{Context, Result};
use argh::FromArgs;
use navi_cli::{build_config, load_parsers, nodes_to_json, records_to_json, ConnectionOptions};
use navi_dispatch::{CommandDispatcher, ExecuteOptions};
use std::io::Read;
use std::path::PathBuf;

#[derive(FromArgs)]
/// Navi - failover-aware storage processor client
struct Cli {
    /// YAML client configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// address of storage processor A
    #[argh(option)]
    spa: Option<String>,

    /// address of storage processor B
    #[argh(option)]
    spb: Option<String>,

    /// user name
    #[argh(option, short = 'u')]
    user: Option<String>,

    /// password
    #[argh(option, short = 'p')]
    password: Option<String>,

    /// login scope (0 global, 1 local, 2 LDAP)
    #[argh(option)]
    scope: Option<u32>,

    /// security file to authenticate with instead of a password
    #[argh(option)]
    secfile: Option<PathBuf>,

    /// command timeout in seconds, clamped to 3..1800
    #[argh(option, short = 't')]
    timeout: Option<u64>,

    /// path to the naviseccli binary
    #[argh(option)]
    binary: Option<PathBuf>,

    /// attempts per command, including the first one
    #[argh(option)]
    attempts: Option<u32>,

    #[argh(subcommand)]
    command: Commands,
}

impl Cli {
    fn connection(&self) -> ConnectionOptions {
        ConnectionOptions {
            config: self.config.clone(),
            spa: self.spa.clone(),
            spb: self.spb.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            scope: self.scope,
            secfile: self.secfile.clone(),
            timeout_secs: self.timeout,
            binary: self.binary.clone(),
            attempts: self.attempts,
        }
    }
}

/// Available CLI subcommands.
///
/// - **Exec**: run a command and print its raw output
/// - **Query**: run a command and print parsed records
/// - **Parse**: parse saved output without contacting the array
/// - **Status**: probe both storage processors and print their state
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Exec(ExecArgs),
    Query(QueryArgs),
    Parse(ParseArgs),
    Status(StatusArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "exec")]
/// run a command and print its output
struct ExecArgs {
    /// do not wait for the array to finish the task
    #[argh(switch)]
    no_poll: bool,

    /// fail when the command exits with a non-zero code
    #[argh(switch)]
    check_exit_code: bool,

    /// fail only when the command exits with this code
    #[argh(option)]
    raise_on: Option<i32>,

    /// command tokens, after `--`
    #[argh(positional)]
    tokens: Vec<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "query")]
/// run a command and print the parsed records as JSON
struct QueryArgs {
    /// record type to parse the output as
    #[argh(option, long = "type")]
    record_type: String,

    /// YAML parser configuration, instead of the builtin one
    #[argh(option)]
    parsers: Option<PathBuf>,

    /// print only the first record
    #[argh(switch)]
    single: bool,

    /// pretty-print the JSON
    #[argh(switch)]
    pretty: bool,

    /// command tokens, after `--`
    #[argh(positional)]
    tokens: Vec<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "parse")]
/// parse saved command output and print the records as JSON
struct ParseArgs {
    /// record type to parse the output as
    #[argh(option, long = "type")]
    record_type: String,

    /// YAML parser configuration, instead of the builtin one
    #[argh(option)]
    parsers: Option<PathBuf>,

    /// pretty-print the JSON
    #[argh(switch)]
    pretty: bool,

    /// file holding the output; reads stdin when omitted or `-`
    #[argh(positional)]
    input: Option<PathBuf>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "status")]
/// probe both storage processors and print their state as JSON
struct StatusArgs {
    /// pretty-print the JSON
    #[argh(switch)]
    pretty: bool,
}

fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Logs go to stderr so stdout stays clean for piping (jq etc.).
    // Default level is INFO, RUST_LOG overrides.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Exec(args) => run_exec(&cli, args),
        Commands::Query(args) => run_query(&cli, args),
        Commands::Parse(args) => run_parse(args),
        Commands::Status(args) => run_status(&cli, args),
    }
}

fn dispatcher(cli: &Cli) -> Result<CommandDispatcher> {
    let config = build_config(&cli.connection(), |key| std::env::var(key).ok())?;
    Ok(CommandDispatcher::new(config)?)
}

fn run_exec(cli: &Cli, args: &ExecArgs) -> Result<()> {
    anyhow::ensure!(!args.tokens.is_empty(), "No command given");

    let mut options = ExecuteOptions::new();
    if args.no_poll {
        options = options.no_poll();
    }
    if args.check_exit_code {
        options = options.check_exit_code();
    }
    if let Some(code) = args.raise_on {
        options = options.raise_on_code(code);
    }

    let dispatcher = dispatcher(cli)?;
    let result = dispatcher.execute_with(&args.tokens, &options, dispatcher.retry_policy())?;
    tracing::info!(
        "{} answered in {:?} (exit code {:?})",
        result.address,
        result.elapsed,
        result.exit_code
    );

    print!("{}", result.stdout);
    if !result.stderr.is_empty() {
        eprint!("{}", result.stderr);
    }
    Ok(())
}

fn run_query(cli: &Cli, args: &QueryArgs) -> Result<()> {
    anyhow::ensure!(!args.tokens.is_empty(), "No command given");

    // Resolve the parser first so a typo fails before touching the array
    let registry = load_parsers(args.parsers.as_deref())?;
    let parser = registry.parser(&args.record_type)?;

    let dispatcher = dispatcher(cli)?;
    let result = dispatcher.execute(&args.tokens)?;

    let mut records = parser.parse_all(&result.text);
    if args.single {
        records.truncate(1);
    }
    println!("{}", records_to_json(&records, args.pretty)?);
    Ok(())
}

fn run_parse(args: &ParseArgs) -> Result<()> {
    let registry = load_parsers(args.parsers.as_deref())?;
    let parser = registry.parser(&args.record_type)?;

    let text = match &args.input {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let records = parser.parse_all(&text);
    println!("{}", records_to_json(&records, args.pretty)?);
    Ok(())
}

fn run_status(cli: &Cli, args: &StatusArgs) -> Result<()> {
    let dispatcher = dispatcher(cli)?;
    for outcome in dispatcher.probe_now() {
        tracing::info!(
            "{} ({}) is {}",
            outcome.role,
            outcome.address,
            if outcome.available { "up" } else { "down" }
        );
    }
    println!("{}", nodes_to_json(&dispatcher.nodes(), args.pretty)?);
    Ok(())
}
