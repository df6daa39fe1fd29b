use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::filter::StatusFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "daylist",
    version,
    about = "daylist: day-scoped task list with weekly recurrence",
    disable_help_subcommand = true,
    arg_required_else_help = false
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.KEY=VALUE` / `rc.KEY:VALUE` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

/// `date:` and `status:` terms given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewTerms {
    pub date: Option<String>,
    pub status: Option<StatusFilter>,
}

impl ViewTerms {
    /// Returns `Ok(false)` when `token` is not a view term.
    fn absorb(&mut self, token: &str) -> anyhow::Result<bool> {
        if let Some(raw) = token.strip_prefix("date:") {
            self.date = Some(raw.to_string());
            return Ok(true);
        }
        if let Some(raw) = token.strip_prefix("status:") {
            self.status = Some(raw.parse()?);
            return Ok(true);
        }
        Ok(false)
    }
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub view: ViewTerms,
    pub command: String,
    pub command_args: Vec<String>,
}

impl Invocation {
    #[tracing::instrument(skip(rest))]
    pub fn parse(rest: Vec<OsString>) -> anyhow::Result<Self> {
        let tokens: Vec<String> = rest
            .into_iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();

        if tokens.len() == 1 && tokens[0].parse::<u64>().is_ok() {
            debug!(token = %tokens[0], "single numeric token interpreted as task info query");
            return Ok(Self {
                view: ViewTerms::default(),
                command: "info".to_string(),
                command_args: tokens,
            });
        }

        let (leading, command, args) = split_view_command(&tokens);

        let mut view = ViewTerms::default();
        for term in &leading {
            if !view.absorb(term)? {
                return Err(anyhow!(
                    "unexpected term before command: {term} \
                     (expected date:<when> or status:<filter>)"
                ));
            }
        }

        // `add` keeps its words verbatim; other commands also accept view
        // terms after the command name.
        let command_args = if command == "add" {
            args
        } else {
            let mut kept = Vec::with_capacity(args.len());
            for arg in args {
                if !view.absorb(&arg)? {
                    kept.push(arg);
                }
            }
            kept
        };

        debug!(command = %command, ?view, args = ?command_args, "parsed invocation");
        Ok(Self {
            view,
            command,
            command_args,
        })
    }
}

fn split_view_command(tokens: &[String]) -> (Vec<String>, String, Vec<String>) {
    let known = crate::commands::known_command_names();

    for i in 0..tokens.len() {
        let token = tokens[i].as_str();
        if let Some(full) = crate::commands::expand_command_abbrev(token, &known) {
            debug!(
                token = %token,
                expanded = %full,
                split_index = i,
                "resolved command token"
            );
            return (
                tokens[..i].to_vec(),
                full.to_string(),
                tokens[i + 1..].to_vec(),
            );
        }
    }

    (tokens.to_vec(), "list".to_string(), vec![])
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::{Invocation, preprocess_args};
    use crate::filter::StatusFilter;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_stripped() {
        let pre = preprocess_args(&os(&[
            "daylist",
            "rc.color=off",
            "list",
            "rc.view.status:active",
        ]))
        .unwrap();
        assert_eq!(pre.cleaned_args, os(&["daylist", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.view.status".to_string(), "active".to_string()),
            ]
        );
    }

    #[test]
    fn defaults_to_list() {
        let inv = Invocation::parse(vec![]).unwrap();
        assert_eq!(inv.command, "list");
        assert!(inv.command_args.is_empty());
    }

    #[test]
    fn view_terms_before_and_after_command() {
        let inv = Invocation::parse(os(&["date:2024-01-08", "tog", "17", "status:done"])).unwrap();
        assert_eq!(inv.command, "toggle");
        assert_eq!(inv.view.date.as_deref(), Some("2024-01-08"));
        assert_eq!(inv.view.status, Some(StatusFilter::Completed));
        assert_eq!(inv.command_args, vec!["17".to_string()]);
    }

    #[test]
    fn add_keeps_its_words() {
        let inv =
            Invocation::parse(os(&["add", "Buy", "milk", "due:tomorrow", "repeat:mon"])).unwrap();
        assert_eq!(inv.command, "add");
        assert_eq!(inv.command_args, vec!["Buy", "milk", "due:tomorrow", "repeat:mon"]);
    }

    #[test]
    fn bare_terms_without_command_are_view_terms() {
        let inv = Invocation::parse(os(&["status:active"])).unwrap();
        assert_eq!(inv.command, "list");
        assert_eq!(inv.view.status, Some(StatusFilter::Active));
        assert!(Invocation::parse(os(&["whatever"])).is_err());
    }

    #[test]
    fn single_number_means_info() {
        let inv = Invocation::parse(os(&["1704100000000"])).unwrap();
        assert_eq!(inv.command, "info");
        assert_eq!(inv.command_args, vec!["1704100000000".to_string()]);
    }
}
