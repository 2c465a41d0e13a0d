//! Diagnostic console commands
//! This module defines the line commands that can be entered on stdin.

use std::fmt::Write as _;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::core::bluetooth::RadioTransport;
use crate::state::AppState;
use crate::utils::format_pairs;

const DEFAULT_LOG_LINES: usize = 20;

const HELP: &str = "\
commands:
  scan             search for the sensor unit
  connect          connect to the unit found by the last scan
  reconnect        reset, scan and connect within the reconnect timeout
  disconnect       close the link
  reset            cancel everything and return to idle
  ping <text>      write <text> to the unit
  status           show the link status
  values           show the latest KEY=VALUE pairs
  gauges           show the current gauge readout as JSON
  logs [n]         show the last n log lines
  help             show this text
  quit             exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Scan,
    Connect,
    Reconnect,
    Disconnect,
    Reset,
    Ping(String),
    Status,
    Values,
    Gauges,
    Logs(usize),
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let command = match word.to_ascii_lowercase().as_str() {
            "scan" => Self::Scan,
            "connect" => Self::Connect,
            "reconnect" => Self::Reconnect,
            "disconnect" => Self::Disconnect,
            "reset" => Self::Reset,
            "ping" if !rest.is_empty() => Self::Ping(rest.to_string()),
            "ping" => return Err("ping needs a payload".to_string()),
            "status" => Self::Status,
            "values" => Self::Values,
            "gauges" => Self::Gauges,
            "logs" if rest.is_empty() => Self::Logs(DEFAULT_LOG_LINES),
            "logs" => Self::Logs(
                rest.parse()
                    .map_err(|_| format!("not a line count: {}", rest))?,
            ),
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command: {}", other)),
        };
        Ok(command)
    }
}

/// Runs one command and returns the text to print.
pub async fn execute<T: RadioTransport>(state: &AppState<T>, command: &ConsoleCommand) -> Result<String> {
    let supervisor = &state.supervisor;
    let link = &state.config.link;

    let output = match command {
        ConsoleCommand::Scan => {
            let peripheral = supervisor.scan(link.scan_timeout()).await?;
            format!("found {}", peripheral)
        }
        ConsoleCommand::Connect => {
            let peripheral = supervisor
                .peripheral()
                .ok_or_else(|| anyhow!("no peripheral found yet, run scan first"))?;
            supervisor.connect(peripheral.clone()).await?;
            format!("connected to {}", peripheral)
        }
        ConsoleCommand::Reconnect => {
            let peripheral = supervisor.reconnect(link.reconnect_timeout()).await?;
            format!("connected to {}", peripheral)
        }
        ConsoleCommand::Disconnect => {
            supervisor.disconnect().await?;
            "disconnected".to_string()
        }
        ConsoleCommand::Reset => {
            supervisor.reset().await;
            state.diagnostics.clear();
            "reset".to_string()
        }
        ConsoleCommand::Ping(payload) => {
            if supervisor.write_channel().is_none() {
                "no write channel, ping skipped".to_string()
            } else {
                supervisor.send_ping(payload).await?;
                format!("sent {}", payload)
            }
        }
        ConsoleCommand::Status => status_report(state),
        ConsoleCommand::Values => {
            let entries = state.diagnostics.entries();
            if entries.is_empty() {
                "no telemetry received yet".to_string()
            } else {
                format_pairs(entries)
            }
        }
        ConsoleCommand::Gauges => serde_json::to_string_pretty(&state.render.latest())?,
        ConsoleCommand::Logs(count) => match &state.logs {
            Some(history) => history
                .recent(*count)
                .iter()
                .map(|m| format!("{} [{}] {}", m.timestamp, m.level, m.message))
                .collect::<Vec<_>>()
                .join("\n"),
            None => "log history is not available".to_string(),
        },
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => "bye".to_string(),
    };
    Ok(output)
}

fn status_report<T: RadioTransport>(state: &AppState<T>) -> String {
    let supervisor = &state.supervisor;
    let status = supervisor.status();
    let mut report = format!("link: {}", status.state);
    if !status.message.is_empty() {
        let _ = write!(report, " ({})", status.message);
    }
    if let Some(peripheral) = supervisor.peripheral() {
        let _ = write!(report, "\nperipheral: {}", peripheral);
        if let Some(address) = &peripheral.address {
            let _ = write!(report, " [{}]", address);
        }
    }
    if let Some(channel) = supervisor.notify_channel() {
        let _ = write!(report, "\nnotify channel: {}", channel.uuid);
    }
    if let Some(channel) = supervisor.write_channel() {
        let _ = write!(report, "\nwrite channel: {}", channel.uuid);
    }
    let _ = write!(report, "\nsubscribers: {}", state.registry.len());
    report
}

/// Forwards stdin lines from a dedicated thread. The thread is detached, so a
/// pending read never holds up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read console input: {}", e);
                    break;
                }
            }
        }
        debug!("Console reader thread stopped.");
    });
    rx
}

/// Reads commands from stdin until `quit`. At end of input the console goes
/// quiet and waits for shutdown.
pub async fn run_console<T: RadioTransport>(state: &AppState<T>) -> Result<()> {
    let shutdown = state.shutdown_token();
    let mut lines = spawn_stdin_reader();
    println!("{}", HELP);

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            info!("Console input closed.");
            shutdown.cancelled().await;
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<ConsoleCommand>() {
            Ok(command) => {
                match execute(state, &command).await {
                    Ok(output) => println!("{}", output),
                    Err(e) => {
                        error!("Command {:?} failed: {}", command, e);
                        println!("error: {}", e);
                    }
                }
                if command == ConsoleCommand::Quit {
                    return Ok(());
                }
            }
            Err(e) => println!("{}\n{}", e, HELP),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!("scan".parse(), Ok(ConsoleCommand::Scan));
        assert_eq!("  RECONNECT ".parse(), Ok(ConsoleCommand::Reconnect));
        assert_eq!(
            "ping hello there".parse(),
            Ok(ConsoleCommand::Ping("hello there".to_string()))
        );
        assert_eq!("logs".parse(), Ok(ConsoleCommand::Logs(DEFAULT_LOG_LINES)));
        assert_eq!("logs 5".parse(), Ok(ConsoleCommand::Logs(5)));
        assert_eq!("exit".parse(), Ok(ConsoleCommand::Quit));
    }

    #[test]
    fn rejects_bad_input() {
        assert!("ping".parse::<ConsoleCommand>().is_err());
        assert!("logs many".parse::<ConsoleCommand>().is_err());
        assert!("launch".parse::<ConsoleCommand>().is_err());
    }
}
