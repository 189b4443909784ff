//! Command-line parsing
//!
//! Arguments are few and positional, so they are parsed by hand like the
//! `--config` flag always was.

use std::path::PathBuf;

use withings_api::{MeasureCategory, MeasureTypes};

use crate::error::{Error, Result};

pub const USAGE: &str = "\
usage: withings [--config <path>] <command>

commands:
  authorize                          print the authorization URL
  connect <code>                     exchange an authorization code for tokens
  refresh                            force a token refresh
  devices                            list linked devices
  goals                              show the user's goals
  measures <type[,type...]> [real|objective]
                                     stream all measure groups
  notify-list                        list notification subscriptions";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Authorize,
    Connect { code: String },
    Refresh,
    Devices,
    Goals,
    Measures {
        types: MeasureTypes,
        category: MeasureCategory,
    },
    NotifyList,
}

impl Command {
    /// Whether the command needs stored tokens to run.
    pub fn needs_tokens(&self) -> bool {
        !matches!(self, Command::Authorize | Command::Connect { .. })
    }
}

/// Parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub config_path: Option<PathBuf>,
    pub command: Command,
}

impl Invocation {
    /// Parse arguments, excluding the program name.
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config_path = None;
        let mut positional = Vec::new();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            if arg == "--config" {
                let path = args
                    .next()
                    .ok_or_else(|| Error::Usage("--config needs a path".into()))?;
                config_path = Some(PathBuf::from(path));
            } else if let Some(path) = arg.strip_prefix("--config=") {
                config_path = Some(PathBuf::from(path));
            } else {
                positional.push(arg);
            }
        }

        let mut positional = positional.into_iter();
        let name = positional
            .next()
            .ok_or_else(|| Error::Usage("missing command".into()))?;
        let rest: Vec<String> = positional.collect();

        let command = match (name.as_str(), rest.as_slice()) {
            ("authorize", []) => Command::Authorize,
            ("connect", [code]) => Command::Connect { code: code.clone() },
            ("refresh", []) => Command::Refresh,
            ("devices", []) => Command::Devices,
            ("goals", []) => Command::Goals,
            ("measures", [types]) => Command::Measures {
                types: parse_types(types)?,
                category: MeasureCategory::Real,
            },
            ("measures", [types, category]) => Command::Measures {
                types: parse_types(types)?,
                category: parse_category(category)?,
            },
            ("notify-list", []) => Command::NotifyList,
            (
                "authorize" | "connect" | "refresh" | "devices" | "goals" | "measures"
                | "notify-list",
                _,
            ) => {
                return Err(Error::Usage(format!("wrong arguments for {name}")));
            }
            _ => return Err(Error::Usage(format!("unknown command: {name}"))),
        };

        Ok(Self {
            config_path,
            command,
        })
    }
}

fn parse_types(raw: &str) -> Result<MeasureTypes> {
    let kinds = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| Error::Usage(format!("invalid measure type: {part}")))
        })
        .collect::<Result<Vec<u32>>>()?;
    match kinds.as_slice() {
        [kind] => Ok(MeasureTypes::Single(*kind)),
        _ => Ok(MeasureTypes::Many(kinds)),
    }
}

fn parse_category(raw: &str) -> Result<MeasureCategory> {
    match raw {
        "real" | "1" => Ok(MeasureCategory::Real),
        "objective" | "2" => Ok(MeasureCategory::Objective),
        other => Err(Error::Usage(format!("invalid measure category: {other}"))),
    }
}
