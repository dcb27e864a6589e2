//! Listener setup and local-address detection.

use local_ip_address::list_afinet_netifas;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, warn};

/// Create a TCP listener with SO_REUSEPORT enabled for multi-worker setup.
///
/// This allows multiple workers to bind to the same port, enabling
/// load distribution across multiple processes.
pub fn create_reusable_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;

    #[cfg(any(target_os = "linux", target_os = "macos", target_os = "ios"))]
    {
        use std::os::fd::AsRawFd;
        unsafe {
            let optval: libc::c_int = 1;
            let ret = libc::setsockopt(
                socket.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_REUSEPORT,
                &optval as *const _ as *const libc::c_void,
                std::mem::size_of_val(&optval) as libc::socklen_t,
            );
            if ret != 0 {
                return Err(std::io::Error::last_os_error());
            }
        }
    }
    socket.set_nonblocking(true)?;

    socket.bind(&addr.into())?;
    socket.listen(1024)?; // Backlog size

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

/// Addresses of this host's network interfaces.
///
/// A request whose Host names one of these addresses is addressed to the
/// proxy itself rather than to an origin.
#[derive(Debug, Clone)]
pub struct LocalAddrs(Arc<Vec<IpAddr>>);

impl LocalAddrs {
    /// Snapshot the interface addresses. Loopback is always included.
    pub fn discover() -> Self {
        let mut addrs = match list_afinet_netifas() {
            Ok(interfaces) => interfaces.into_iter().map(|(_, ip)| ip).collect(),
            Err(e) => {
                warn!("Failed to list network interfaces: {}", e);
                Vec::new()
            }
        };
        for loopback in [IpAddr::V4(Ipv4Addr::LOCALHOST), IpAddr::V6(Ipv6Addr::LOCALHOST)] {
            if !addrs.contains(&loopback) {
                addrs.push(loopback);
            }
        }
        debug!("Local interface addresses: {:?}", addrs);
        Self(Arc::new(addrs))
    }

    pub fn from_addrs(addrs: Vec<IpAddr>) -> Self {
        Self(Arc::new(addrs))
    }

    /// True when `host` (optionally with a port) is a local interface address.
    pub fn is_local_host(&self, host: &str) -> bool {
        host_ip(host).is_some_and(|ip| self.0.contains(&ip))
    }
}

/// The IP literal in a Host value, if it is one.
fn host_ip(host: &str) -> Option<IpAddr> {
    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Some(addr.ip());
    }
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    bare.parse().ok()
}
