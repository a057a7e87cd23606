//! Serial port link.
//!
//! Opens the device with the marshaller's fixed line parameters:
//! 115200 baud, eight data bits, no parity, one stop bit, no flow control,
//! and a short read timeout so the worker can notice a stop request.

use std::io::{ErrorKind, Read, Write};

use commander_common::consts::BAUD_RATE;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::link::{Link, LinkError, LinkSettings};

/// Link over a physical serial port.
pub struct SerialLink {
    device: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialLink {
    /// Open `settings.device`.
    ///
    /// # Errors
    /// Returns `LinkError::Open` if the device is missing, busy or refuses the settings.
    pub fn open(settings: &LinkSettings) -> Result<Self, LinkError> {
        let port = serialport::new(settings.device.as_str(), BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|e| LinkError::Open {
                device: settings.device.clone(),
                reason: e.to_string(),
            })?;
        info!("Opened serial link {} @ {} baud", settings.device, BAUD_RATE);
        Ok(Self {
            device: settings.device.clone(),
            port: Some(port),
        })
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, LinkError> {
        self.port.as_mut().ok_or(LinkError::Closed)
    }
}

/// Factory registered as `serial`.
pub fn open_link(settings: &LinkSettings) -> Result<Box<dyn Link>, LinkError> {
    Ok(Box::new(SerialLink::open(settings)?))
}

impl Link for SerialLink {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn bytes_to_read(&mut self) -> Result<usize, LinkError> {
        let n = self
            .port()?
            .bytes_to_read()
            .map_err(|e| LinkError::Io(e.into()))?;
        Ok(n as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        match self.port()?.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(LinkError::Io(e)),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        self.port()?
            .clear(ClearBuffer::Input)
            .map_err(|e| LinkError::Io(e.into()))
    }

    fn close(&mut self) -> Result<(), LinkError> {
        if self.port.take().is_some() {
            debug!("Closed serial link {}", self.device);
        }
        Ok(())
    }
}
