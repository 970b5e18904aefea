//! Network reachability precheck
//!
//! Run once per start. Decides whether network tests run at all and which
//! address family the route test should use. A timeout counts as
//! unreachable, never as an error.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::debug;

/// Usable address families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StackType {
    Ipv4,
    Ipv6,
    DualStack,
    None,
}

impl StackType {
    fn from_flags(v4: bool, v6: bool) -> Self {
        match (v4, v6) {
            (true, true) => StackType::DualStack,
            (true, false) => StackType::Ipv4,
            (false, true) => StackType::Ipv6,
            (false, false) => StackType::None,
        }
    }
}

/// Precheck result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkStatus {
    pub reachable: bool,
    pub stack: StackType,
}

impl NetworkStatus {
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            stack: StackType::None,
        }
    }

    pub fn from_stack(stack: StackType) -> Self {
        Self {
            reachable: stack != StackType::None,
            stack,
        }
    }
}

/// Reachability probe used by the orchestrator
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn check(&self, timeout: Duration) -> NetworkStatus;
}

/// Public DNS resolvers used when nothing is configured
pub const DEFAULT_IPV4_TARGETS: [&str; 2] = ["1.1.1.1:443", "8.8.8.8:53"];
pub const DEFAULT_IPV6_TARGETS: [&str; 2] = ["[2606:4700:4700::1111]:443", "[2001:4860:4860::8888]:53"];

/// TCP connect probe against well-known endpoints
#[derive(Debug, Clone)]
pub struct TcpProbe {
    ipv4: Vec<SocketAddr>,
    ipv6: Vec<SocketAddr>,
}

impl TcpProbe {
    pub fn new(ipv4: Vec<SocketAddr>, ipv6: Vec<SocketAddr>) -> Self {
        Self { ipv4, ipv6 }
    }

    /// Parse `host:port` targets; invalid entries are dropped with a log line
    pub fn from_strings(ipv4: &[String], ipv6: &[String]) -> Self {
        let parse = |list: &[String]| -> Vec<SocketAddr> {
            list.iter()
                .filter_map(|s| match s.parse() {
                    Ok(addr) => Some(addr),
                    Err(e) => {
                        debug!(target = %s, error = %e, "Ignoring invalid precheck target");
                        None
                    }
                })
                .collect()
        };
        Self::new(parse(ipv4), parse(ipv6))
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        let v4: Vec<String> = DEFAULT_IPV4_TARGETS.iter().map(|s| s.to_string()).collect();
        let v6: Vec<String> = DEFAULT_IPV6_TARGETS.iter().map(|s| s.to_string()).collect();
        Self::from_strings(&v4, &v6)
    }
}

#[async_trait]
impl NetworkProbe for TcpProbe {
    async fn check(&self, timeout: Duration) -> NetworkStatus {
        let (v4, v6) = tokio::join!(
            tokio::time::timeout(timeout, any_reachable(&self.ipv4)),
            tokio::time::timeout(timeout, any_reachable(&self.ipv6)),
        );
        let v4 = v4.unwrap_or(false);
        let v6 = v6.unwrap_or(false);
        let status = NetworkStatus::from_stack(StackType::from_flags(v4, v6));
        debug!(ipv4 = v4, ipv6 = v6, stack = ?status.stack, "Network precheck finished");
        status
    }
}

/// True as soon as any target accepts a connection
async fn any_reachable(targets: &[SocketAddr]) -> bool {
    let mut set = JoinSet::new();
    for &addr in targets {
        set.spawn(async move { TcpStream::connect(addr).await.is_ok() });
    }
    while let Some(result) = set.join_next().await {
        if matches!(result, Ok(true)) {
            return true;
        }
    }
    false
}

/// Probe with a fixed answer, used for offline runs
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub NetworkStatus);

#[async_trait]
impl NetworkProbe for FixedProbe {
    async fn check(&self, _timeout: Duration) -> NetworkStatus {
        self.0
    }
}
