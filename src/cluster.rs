//! Cluster sessions and the training backend seam.

use std::fmt;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

use crate::booster::Booster;
use crate::boosting::{self, TrainingError};
use crate::evaluation::EvalsResult;
use crate::matrix::DistributedMatrix;
use crate::params::{BoosterParams, TrainOptions};

pub const CLUSTER_SCHEME: &str = "ray";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("not connected to a cluster")]
    NotConnected,
    #[error("already connected to {address}")]
    AlreadyConnected { address: ClusterAddress },
    #[error("invalid cluster address {0:?}: expected ray://<host>:<port>")]
    InvalidAddress(String),
    #[error("could not resolve {address}: {source}")]
    Resolve {
        address: ClusterAddress,
        source: std::io::Error,
    },
    #[error("could not reach cluster head at {address}: {source}")]
    Unreachable {
        address: ClusterAddress,
        source: std::io::Error,
    },
    #[error("training failed: {0}")]
    Training(#[from] TrainingError),
}

/// Head node endpoint, rendered as `ray://<host>:<port>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAddress {
    host: String,
    port: u16,
}

impl ClusterAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ClusterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CLUSTER_SCHEME}://{}:{}", self.host, self.port)
    }
}

impl FromStr for ClusterAddress {
    type Err = ClusterError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let invalid = || ClusterError::InvalidAddress(uri.to_string());
        let rest = uri
            .strip_prefix(CLUSTER_SCHEME)
            .and_then(|rest| rest.strip_prefix("://"))
            .ok_or_else(invalid)?;
        let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(host, port))
    }
}

/// Connection handle to a distributed training backend.
///
/// Callers check [`ClusterBackend::is_connected`] before connecting; a
/// second `connect` on a live session is an error.
pub trait ClusterBackend {
    fn is_connected(&self) -> bool;

    fn connect(&mut self, address: &ClusterAddress) -> Result<(), ClusterError>;

    /// Blocks until every boosting round has finished or the backend fails.
    fn train(
        &self,
        params: &BoosterParams,
        dtrain: &DistributedMatrix,
        evals: &[(&DistributedMatrix, &str)],
        evals_result: &mut EvalsResult,
        options: &TrainOptions,
    ) -> Result<Booster, ClusterError>;
}

#[derive(Debug)]
struct Session {
    address: ClusterAddress,
    head: SocketAddr,
}

/// Backend whose worker actors run on a thread pool in this process once a
/// session with the head node is open.
#[derive(Debug, Default)]
pub struct LocalCluster {
    session: Option<Session>,
}

impl LocalCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(&self) -> Option<&ClusterAddress> {
        self.session.as_ref().map(|session| &session.address)
    }
}

impl ClusterBackend for LocalCluster {
    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn connect(&mut self, address: &ClusterAddress) -> Result<(), ClusterError> {
        if let Some(session) = &self.session {
            return Err(ClusterError::AlreadyConnected {
                address: session.address.clone(),
            });
        }

        let head = (address.host(), address.port())
            .to_socket_addrs()
            .map_err(|source| ClusterError::Resolve {
                address: address.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| ClusterError::Resolve {
                address: address.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no addresses for host",
                ),
            })?;

        TcpStream::connect_timeout(&head, CONNECT_TIMEOUT).map_err(|source| {
            ClusterError::Unreachable {
                address: address.clone(),
                source,
            }
        })?;

        tracing::info!(%address, %head, "connected to cluster");
        self.session = Some(Session {
            address: address.clone(),
            head,
        });
        Ok(())
    }

    fn train(
        &self,
        params: &BoosterParams,
        dtrain: &DistributedMatrix,
        evals: &[(&DistributedMatrix, &str)],
        evals_result: &mut EvalsResult,
        options: &TrainOptions,
    ) -> Result<Booster, ClusterError> {
        let session = self.session.as_ref().ok_or(ClusterError::NotConnected)?;
        tracing::debug!(head = %session.head, "submitting training job");
        boosting::train(params, dtrain, evals, evals_result, options)
            .map_err(ClusterError::Training)
    }
}
