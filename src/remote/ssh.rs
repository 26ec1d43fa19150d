//! SSH connector built on libssh2

use super::tester::{remaining, ConnectError, Connector, RemoteTarget};
use ssh2::Session;
use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Connects over TCP, completes the SSH handshake and authenticates with a
/// password. Every blocking step is bounded by the deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

impl Connector for SshConnector {
    fn connect(
        &self,
        target: &RemoteTarget,
        username: &str,
        password: &[u8],
        deadline: Instant,
    ) -> Result<(), ConnectError> {
        let addr = resolve(target, deadline)?;
        debug!(remote = %target, addr = %addr, "resolved");

        let tcp = TcpStream::connect_timeout(&addr, remaining(deadline)?).map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ConnectError::Timeout,
            _ => ConnectError::Unreachable(e),
        })?;
        let left = remaining(deadline)?;
        tcp.set_read_timeout(Some(left))?;
        tcp.set_write_timeout(Some(left))?;

        let mut session = Session::new()?;
        session.set_timeout(millis(left));
        session.set_tcp_stream(tcp);
        session.handshake()?;

        let password = std::str::from_utf8(password)
            .map_err(|_| ConnectError::AuthRejected("password is not valid UTF-8".to_string()))?;
        session.set_timeout(millis(remaining(deadline)?));
        session
            .userauth_password(username, password)
            .map_err(|e| ConnectError::AuthRejected(e.message().to_string()))?;
        if !session.authenticated() {
            return Err(ConnectError::AuthRejected("server did not confirm authentication".to_string()));
        }

        if let Err(e) = session.disconnect(None, "connection test complete", None) {
            debug!(remote = %target, error = %e, "disconnect failed");
        }
        Ok(())
    }
}

/// Resolve the target within the deadline.
///
/// The system resolver has no timeout of its own, so the lookup runs on a
/// helper thread that is abandoned if it overruns.
fn resolve(target: &RemoteTarget, deadline: Instant) -> Result<SocketAddr, ConnectError> {
    if let Ok(ip) = target.host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, target.port));
    }

    let (tx, rx) = mpsc::channel();
    let host = target.host.clone();
    let port = target.port;
    thread::spawn(move || {
        let result = (host.as_str(), port).to_socket_addrs().map(|mut addrs| addrs.next());
        let _ = tx.send(result);
    });

    let resolve_error = |reason: String| ConnectError::Resolve {
        host: target.host.clone(),
        reason,
    };
    match rx.recv_timeout(remaining(deadline)?) {
        Ok(Ok(Some(addr))) => Ok(addr),
        Ok(Ok(None)) => Err(resolve_error("no addresses".to_string())),
        Ok(Err(e)) => Err(resolve_error(e.to_string())),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(ConnectError::Timeout),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(resolve_error("resolver thread exited".to_string())),
    }
}

/// libssh2 reads a zero timeout as "wait forever"
fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX).max(1)
}
