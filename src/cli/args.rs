//! Command-line argument parsing.

use std::fmt;

/// Parsed CLI command to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// Show version information
    Version,
    /// Show usage
    Help,
    /// Describe the stored session
    Status,
    /// Store a credential pair
    Login(LoginArgs),
    /// End the session
    Logout,
    /// Refresh now
    Refresh,
    /// Authenticated GET of one or more URLs, sent concurrently
    Get { urls: Vec<String> },
    /// Run the watcher and session notice until interrupted
    Watch,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoginArgs {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Option<u64>,
    pub role: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgsError {
    MissingValue(&'static str),
    InvalidNumber { flag: &'static str, value: String },
    UnknownCommand(String),
    UnexpectedArgument(String),
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue(what) => write!(f, "missing {}", what),
            ArgsError::InvalidNumber { flag, value } => {
                write!(f, "{} expects a number, got '{}'", flag, value)
            }
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command '{}'", cmd),
            ArgsError::UnexpectedArgument(arg) => write!(f, "unexpected argument '{}'", arg),
        }
    }
}

impl std::error::Error for ArgsError {}

pub const USAGE: &str = "\
usage: sessionkeep <command>

commands:
  status                         show the stored session
  login <access> <refresh>       store a credential pair
        [--expires-in SECS] [--role ROLE] [--user-id ID]
  logout                         end the session
  refresh                        refresh the access token now
  get <url>...                   authenticated GET (relative to SESSIONKEEP_API_URL)
  watch                          watch for expiry until Ctrl-C

flags:
  -V, --version                  print version
  -h, --help                     print this help";

/// Parse command-line arguments (program name first).
///
/// # Examples
///
/// ```
/// use sessionkeep::cli::args::{parse_args, CliCommand};
///
/// let args = vec!["sessionkeep".to_string(), "--version".to_string()];
/// assert_eq!(parse_args(args.into_iter()), Ok(CliCommand::Version));
/// ```
pub fn parse_args<I>(args: I) -> Result<CliCommand, ArgsError>
where
    I: Iterator<Item = String>,
{
    let mut args = args.skip(1);

    let Some(command) = args.next() else {
        return Ok(CliCommand::Help);
    };

    match command.as_str() {
        "--version" | "-V" => Ok(CliCommand::Version),
        "--help" | "-h" | "help" => Ok(CliCommand::Help),
        "status" => no_more(args, CliCommand::Status),
        "logout" => no_more(args, CliCommand::Logout),
        "refresh" => no_more(args, CliCommand::Refresh),
        "watch" => no_more(args, CliCommand::Watch),
        "get" => {
            let urls: Vec<String> = args.collect();
            if urls.is_empty() {
                return Err(ArgsError::MissingValue("url"));
            }
            Ok(CliCommand::Get { urls })
        }
        "login" => parse_login(args),
        other => Err(ArgsError::UnknownCommand(other.to_string())),
    }
}

fn no_more<I>(mut args: I, command: CliCommand) -> Result<CliCommand, ArgsError>
where
    I: Iterator<Item = String>,
{
    match args.next() {
        Some(extra) => Err(ArgsError::UnexpectedArgument(extra)),
        None => Ok(command),
    }
}

fn parse_login<I>(args: I) -> Result<CliCommand, ArgsError>
where
    I: Iterator<Item = String>,
{
    let mut login = LoginArgs::default();
    let mut positional = Vec::new();
    let mut args = args;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--expires-in" => {
                let value = args
                    .next()
                    .ok_or(ArgsError::MissingValue("--expires-in value"))?;
                let secs = value.parse().map_err(|_| ArgsError::InvalidNumber {
                    flag: "--expires-in",
                    value: value.clone(),
                })?;
                login.expires_in = Some(secs);
            }
            "--role" => {
                login.role = Some(args.next().ok_or(ArgsError::MissingValue("--role value"))?);
            }
            "--user-id" => {
                login.user_id = Some(
                    args.next()
                        .ok_or(ArgsError::MissingValue("--user-id value"))?,
                );
            }
            flag if flag.starts_with("--") => {
                return Err(ArgsError::UnexpectedArgument(flag.to_string()))
            }
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    login.access_token = positional
        .next()
        .ok_or(ArgsError::MissingValue("access token"))?;
    login.refresh_token = positional
        .next()
        .ok_or(ArgsError::MissingValue("refresh token"))?;
    if let Some(extra) = positional.next() {
        return Err(ArgsError::UnexpectedArgument(extra));
    }
    Ok(CliCommand::Login(login))
}
