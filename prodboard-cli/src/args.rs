use std::path::PathBuf;

use prodboard::JobId;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run,
    Submit {
        report_type: String,
        criteria: String,
    },
    List {
        limit: Option<usize>,
        all: bool,
    },
    Show {
        id: JobId,
    },
    Delete {
        id: JobId,
    },
    Artifact {
        id: JobId,
        out: Option<PathBuf>,
    },
    Migrate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub command: Command,
}

pub fn usage() -> &'static str {
    "Usage: prodboard [--config PATH] <command>

Commands:
  run                              Run report workers until interrupted
  submit <report-type> <criteria>  Queue a report; criteria is a JSON object
  list [--limit N] [--all]         Show recent jobs, newest first
  show <job-id>                    Show one job
  delete <job-id>                  Hide a job from listings
  artifact <job-id> [--out PATH]   Write a completed job's artifact
  migrate                          Apply database migrations and exit

Report types: hauling-model, material-rehandling, operator-performance

Environment:
  PRODBOARD_CONFIG       Config file used when --config is absent
  RUST_LOG               Log filter (default: info)
  PRODBOARD_LOG_FORMAT   Set to 'json' for JSON log lines
"
}

/// Parses arguments (without the program name). `Ok(None)` means help was
/// requested.
pub fn parse_args(args: &[String]) -> Result<Option<CliArgs>, String> {
    if args.iter().any(|a| a == "-h" || a == "--help") {
        return Ok(None);
    }

    let mut config: Option<PathBuf> = None;
    let mut limit: Option<usize> = None;
    let mut all = false;
    let mut out: Option<PathBuf> = None;
    let mut positional: Vec<&str> = Vec::new();

    let mut i = 0usize;
    while i < args.len() {
        let a = args[i].as_str();
        match a {
            "--config" => {
                i += 1;
                let v = args.get(i).ok_or("--config requires PATH")?;
                config = Some(PathBuf::from(v));
            }
            "--limit" => {
                i += 1;
                let v = args.get(i).ok_or("--limit requires N")?;
                limit = Some(
                    v.parse::<usize>()
                        .map_err(|_| "--limit must be a non-negative integer")?,
                );
            }
            "--all" => all = true,
            "--out" => {
                i += 1;
                let v = args.get(i).ok_or("--out requires PATH")?;
                out = Some(PathBuf::from(v));
            }
            other if other.starts_with("--") => {
                return Err(format!("unknown option: {}", other));
            }
            other => positional.push(other),
        }
        i += 1;
    }

    let (name, rest) = positional
        .split_first()
        .ok_or("missing command")?;

    let command = match (*name, rest) {
        ("run", []) => Command::Run,
        ("migrate", []) => Command::Migrate,
        ("submit", [report_type, criteria]) => Command::Submit {
            report_type: report_type.to_string(),
            criteria: criteria.to_string(),
        },
        ("submit", _) => return Err("submit requires <report-type> <criteria-json>".to_string()),
        ("list", []) => Command::List { limit, all },
        ("show", [id]) => Command::Show { id: parse_id(id)? },
        ("delete", [id]) => Command::Delete { id: parse_id(id)? },
        ("artifact", [id]) => Command::Artifact {
            id: parse_id(id)?,
            out: out.take(),
        },
        ("show" | "delete" | "artifact", _) => {
            return Err(format!("{} requires exactly one <job-id>", name))
        }
        (cmd, _) if matches!(cmd, "run" | "migrate" | "list") => {
            return Err(format!("{} takes no positional arguments", cmd))
        }
        (other, _) => return Err(format!("unknown command: {}", other)),
    };

    if out.is_some() {
        return Err("--out is only valid with artifact".to_string());
    }

    Ok(Some(CliArgs { config, command }))
}

fn parse_id(raw: &str) -> Result<JobId, String> {
    raw.parse::<JobId>()
        .map_err(|_| format!("invalid job id: {}", raw))
}
