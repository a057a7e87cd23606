//! Line console.
//!
//! Reads operator commands from stdin, one per line:
//!
//! ```text
//! move_rel x 5.0
//! to_point x&y 12 40
//! help | stats | quit
//! ```

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use commander_command::CommandInterpreter;
use commander_common::catalog::{CatalogKind, CommandCatalog};
use commander_link::SerialTransport;
use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use thiserror::Error;
use tracing::{error, info, warn};

/// How often the console re-checks the running flag while idle.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// List public commands.
    Help,
    /// Print transport counters.
    Stats,
    /// Leave the console.
    Quit,
    /// Send a public command.
    Send {
        name: String,
        group: String,
        params: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("'{0}' needs an axis group, e.g. '{0} x'")]
    MissingAxisGroup(String),
}

/// Parse one line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let command = match head {
        "help" | "?" => ConsoleCommand::Help,
        "stats" => ConsoleCommand::Stats,
        "quit" | "exit" => ConsoleCommand::Quit,
        name => {
            let group = words
                .next()
                .ok_or_else(|| ConsoleError::MissingAxisGroup(name.to_string()))?;
            ConsoleCommand::Send {
                name: name.to_string(),
                group: group.to_string(),
                params: words.map(str::to_string).collect(),
            }
        }
    };
    Ok(Some(command))
}

/// Run the console until `quit`, end of input or the running flag clears.
pub fn run(interpreter: &CommandInterpreter, transport: &SerialTransport, running: &AtomicBool) {
    let lines = spawn_stdin_reader();
    info!("Console ready, type 'help' for commands");

    while running.load(Ordering::SeqCst) {
        let line = match lines.recv_timeout(POLL_INTERVAL) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                info!("Console input closed");
                drain(transport, running);
                break;
            }
        };

        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(ConsoleCommand::Help)) => print_help(interpreter.catalog()),
            Ok(Some(ConsoleCommand::Stats)) => info!("{:?}", transport.stats()),
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(ConsoleCommand::Send {
                name,
                group,
                params,
            })) => {
                let blocking = interpreter
                    .catalog()
                    .get(CatalogKind::Public, &name)
                    .is_none_or(|def| def.blocking);
                match interpreter.send(&name, &group, &params, blocking) {
                    Ok(n) => info!("Queued {} command(s)", n),
                    Err(e) => error!("{}", e),
                }
            }
            Err(e) => warn!("{}", e),
        }
    }
}

/// Wait until everything queued so far has been written or dropped.
fn drain(transport: &SerialTransport, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) && transport.stats().in_flight() > 0 {
        thread::sleep(POLL_INTERVAL);
    }
}

fn print_help(catalog: &CommandCatalog) {
    for def in catalog.definitions(CatalogKind::Public) {
        info!(
            "  {:<12} axes={:<14} params={:?}",
            def.name,
            def.axis_groups.join(","),
            def.param_names
        );
    }
    info!("  help | stats | quit");
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    let spawned = thread::Builder::new()
        .name("commander-console".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("stdin read failed: {}", e);
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        error!("Failed to start console reader: {}", e);
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_send_with_params() {
        assert_eq!(
            parse_line("  to_point x&y 12 40 ").unwrap(),
            Some(ConsoleCommand::Send {
                name: "to_point".to_string(),
                group: "x&y".to_string(),
                params: vec!["12".to_string(), "40".to_string()],
            })
        );
    }

    #[test]
    fn test_parses_keywords_and_blanks() {
        assert_eq!(parse_line("help").unwrap(), Some(ConsoleCommand::Help));
        assert_eq!(parse_line("exit").unwrap(), Some(ConsoleCommand::Quit));
        assert_eq!(parse_line("stats").unwrap(), Some(ConsoleCommand::Stats));
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# comment").unwrap(), None);
    }

    #[test]
    fn test_send_without_group_is_an_error() {
        assert_eq!(
            parse_line("z_up"),
            Err(ConsoleError::MissingAxisGroup("z_up".to_string()))
        );
    }
}
