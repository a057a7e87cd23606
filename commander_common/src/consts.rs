//! System-wide constants for the commander workspace.
//!
//! Single source of truth for the physical line parameters, queue sizing
//! and the fixed bus ids. The line parameters are dictated by the
//! marshaller firmware and are not exposed through configuration.

use std::time::Duration;

/// Serial baud rate expected by the marshaller.
pub const BAUD_RATE: u32 = 115_200;

/// Per-poll read timeout on the serial link.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Minimum spacing between two physical writes.
pub const MIN_WRITE_INTERVAL: Duration = Duration::from_millis(500);

/// Delay between opening the link and discarding stale input (1.2 x read timeout).
pub const SETTLE_DELAY: Duration = Duration::from_millis(120);

/// Default capacity of the outbound queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 50;

/// Default serial device.
pub const DEFAULT_DEVICE: &str = "/dev/serial0";

/// Default component directory file.
pub const DEFAULT_DIRECTORY_PATH: &str = "componentIds.json";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/commander/commander.toml";

/// Frame delimiter appended after every encoded command.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Longest inbound text held while waiting for a delimiter.
pub const MAX_INBOUND_FRAME: usize = 4096;

/// Maximum nested dispatch depth on one thread before the bus refuses.
pub const MAX_DISPATCH_DEPTH: usize = 8;

/// Bus id of the serial transport worker.
pub const TRANSPORT_ID: &str = "DataLink_1";

/// Bus id of the command interpreter.
pub const INTERPRETER_ID: &str = "CommandInterpreter";

/// Bus id of the commander (composition root / operator console).
pub const COMMANDER_ID: &str = "Commander";

/// Separator joining member axes of a multi-axis group (`x&y`).
pub const AXIS_SEPARATOR: char = '&';
