//! Health probe against the game server's query port.
//!
//! The monitor treats the probe as an opaque call: it either yields a
//! [`HealthSnapshot`] or a [`ProbeError`]. [`A2sProbe`] speaks the Source
//! A2S_INFO query through the `a2s` crate.

use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use a2s::A2SClient;
use tokio::runtime::{self, Runtime};

use crate::error::ProbeError;

/// Host and UDP query port of the monitored server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn resolve(&self) -> Result<SocketAddr, ProbeError> {
        let resolve_err = |reason: String| ProbeError::Resolve {
            endpoint: self.to_string(),
            reason,
        };
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| resolve_err(e.to_string()))?
            .next()
            .ok_or_else(|| resolve_err("no addresses found".to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// What a successful probe reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub players: u32,
    pub max_players: u32,
    pub map: String,
}

impl fmt::Display for HealthSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "players: {}/{} map: {}", self.players, self.max_players, self.map)
    }
}

pub trait HealthProbe {
    fn query(&self, endpoint: &Endpoint, timeout: Duration) -> Result<HealthSnapshot, ProbeError>;
}

impl<T: HealthProbe + ?Sized> HealthProbe for Box<T> {
    fn query(&self, endpoint: &Endpoint, timeout: Duration) -> Result<HealthSnapshot, ProbeError> {
        (**self).query(endpoint, timeout)
    }
}

impl<T: HealthProbe + ?Sized> HealthProbe for &T {
    fn query(&self, endpoint: &Endpoint, timeout: Duration) -> Result<HealthSnapshot, ProbeError> {
        (**self).query(endpoint, timeout)
    }
}

/// A2S_INFO probe. Each query runs on a private current-thread runtime and
/// opens a fresh UDP socket.
#[derive(Debug)]
pub struct A2sProbe {
    runtime: Runtime,
}

impl A2sProbe {
    pub fn new() -> io::Result<Self> {
        let runtime = runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()?;
        Ok(Self { runtime })
    }
}

impl HealthProbe for A2sProbe {
    fn query(&self, endpoint: &Endpoint, timeout: Duration) -> Result<HealthSnapshot, ProbeError> {
        let addr = endpoint.resolve()?;
        let query_err = |reason: String| ProbeError::Query {
            endpoint: endpoint.to_string(),
            reason,
        };

        let info = self.runtime.block_on(async {
            let client = A2SClient::new().await.map_err(|e| query_err(e.to_string()))?;
            match tokio::time::timeout(timeout, client.info(addr)).await {
                Ok(result) => result.map_err(|e| query_err(e.to_string())),
                Err(_) => Err(query_err(format!(
                    "no answer within {:.1}s",
                    timeout.as_secs_f64()
                ))),
            }
        })?;

        Ok(HealthSnapshot {
            players: info.players.into(),
            max_players: info.max_players.into(),
            map: info.map,
        })
    }
}
