use crate::api::{JobId, NewJob};
use crate::commands::submit::parse_submit;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub enum AppCommand {
    Submit(NewJob),
    Refresh,
    Runs,
    RunDetail { run_id: i64 },
    JobResult { job_id: JobId },
    Strategies,
    Help,
    Quit,
    Unknown(String),
}

pub const HELP_TEXT: &str = "可用命令: submit <strategy> <capital> [key=value ...] | refresh | runs | run <id> | result <job_id> | strategies | filter active|all | help | quit";

impl FromStr for AppCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(AppCommand::Unknown("".to_string()));
        }

        match parts[0] {
            "submit" | "new" => match parse_submit(&parts[1..]) {
                Ok(job) => Ok(AppCommand::Submit(job)),
                Err(msg) => Ok(AppCommand::Unknown(msg)),
            },
            "refresh" | "r" => Ok(AppCommand::Refresh),
            "runs" => Ok(AppCommand::Runs),
            "run" => match parts.get(1).and_then(|s| s.trim_start_matches('#').parse().ok()) {
                Some(run_id) => Ok(AppCommand::RunDetail { run_id }),
                None => Ok(AppCommand::Unknown("用法: run <id>".to_string())),
            },
            "result" => match parts.get(1).and_then(|s| s.trim_start_matches('#').parse().ok()) {
                Some(job_id) => Ok(AppCommand::JobResult { job_id }),
                None => Ok(AppCommand::Unknown("用法: result <job_id>".to_string())),
            },
            "strategies" | "strategy" => Ok(AppCommand::Strategies),
            "help" | "h" => Ok(AppCommand::Help),
            "quit" | "q" | "exit" => Ok(AppCommand::Quit),
            _ => Ok(AppCommand::Unknown(format!("未知命令: {}", parts[0]))),
        }
    }
}
