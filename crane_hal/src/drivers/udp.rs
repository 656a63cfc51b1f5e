//! Datagram receiver (`udp`).
//!
//! Binds `transport.bind` and returns one received datagram per fetch. The
//! load-cell sensor pushes a fixed-size datagram; the sender address is
//! only logged.

use crane_common::hal::config::AcquisitionConfig;
use crane_common::hal::driver::{HalDriver, HalError, RawSample, RegisterRequest};
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::time::Duration;
use tracing::{info, trace};

/// Driver name.
pub const DRIVER_NAME: &str = "udp";

/// Driver version.
pub const DRIVER_VERSION: &str = "0.1.0";

/// Receive buffer; larger datagrams are truncated by the socket.
const MAX_DATAGRAM_SIZE: usize = 1500;

/// UDP datagram driver.
pub struct UdpDriver {
    socket: Option<UdpSocket>,
    recv_buf: Vec<u8>,
}

impl Default for UdpDriver {
    fn default() -> Self {
        Self {
            socket: None,
            recv_buf: vec![0u8; MAX_DATAGRAM_SIZE],
        }
    }
}

impl UdpDriver {
    /// Create an unbound driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Local address once bound.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }
}

/// Factory function for the driver registry.
pub fn create_driver() -> Box<dyn HalDriver> {
    Box::new(UdpDriver::new())
}

impl HalDriver for UdpDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn version(&self) -> &'static str {
        DRIVER_VERSION
    }

    fn init(&mut self, config: &AcquisitionConfig) -> Result<(), HalError> {
        let bind = config
            .transport
            .bind
            .as_deref()
            .ok_or_else(|| HalError::ConfigError("transport.bind is not set".to_string()))?;
        let socket = UdpSocket::bind(bind)
            .map_err(|e| HalError::ConnectFailed(format!("bind {bind}: {e}")))?;
        info!("{}: listening on {}", config.name, bind);
        self.socket = Some(socket);
        Ok(())
    }

    fn fetch(
        &mut self,
        _request: &RegisterRequest,
        timeout: Duration,
    ) -> Result<RawSample, HalError> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| HalError::TransientRead("socket not bound".to_string()))?;

        // A zero timeout would mean "block forever" to the socket.
        socket.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;

        match socket.recv_from(&mut self.recv_buf) {
            Ok((len, from)) => {
                trace!("datagram of {} bytes from {}", len, from);
                Ok(RawSample::Datagram(self.recv_buf[..len].to_vec()))
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Err(
                HalError::Timeout(format!("no datagram within {}ms", timeout.as_millis())),
            ),
            Err(e) => Err(e.into()),
        }
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        self.socket = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crane_common::hal::config::{Profile, TransportConfig};

    fn config(bind: Option<&str>) -> AcquisitionConfig {
        AcquisitionConfig {
            name: "cells".to_string(),
            driver: DRIVER_NAME.to_string(),
            profile: Profile::LoadCells,
            transport: TransportConfig {
                bind: bind.map(str::to_string),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    const ANY: RegisterRequest = RegisterRequest {
        unit_id: 0,
        address: 0,
        count: 0,
    };

    #[test]
    fn receives_datagram() {
        let mut driver = UdpDriver::new();
        driver.init(&config(Some("127.0.0.1:0"))).unwrap();
        let addr = driver.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&[7u8; 25], addr).unwrap();

        match driver.fetch(&ANY, Duration::from_secs(2)).unwrap() {
            RawSample::Datagram(bytes) => assert_eq!(bytes, vec![7u8; 25]),
            other => panic!("unexpected sample {other:?}"),
        }
    }

    #[test]
    fn silence_is_timeout() {
        let mut driver = UdpDriver::new();
        driver.init(&config(Some("127.0.0.1:0"))).unwrap();
        let err = driver.fetch(&ANY, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, HalError::Timeout(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn missing_bind_is_config_error() {
        let mut driver = UdpDriver::new();
        let err = driver.init(&config(None)).unwrap_err();
        assert!(matches!(err, HalError::ConfigError(_)));
    }

    #[test]
    fn fetch_before_init_fails() {
        let mut driver = UdpDriver::new();
        assert!(driver.fetch(&ANY, Duration::from_millis(1)).is_err());
    }
}
