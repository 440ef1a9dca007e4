/// TCP transport on tokio: one task per connection, results reported as engine events.
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, lookup_host};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::Event;
use crate::transport::{ConnId, Resolution, Transport, TransportError};

const READ_BUFFER_SIZE: usize = 2048;

struct Connection {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    task: JoinHandle<()>,
}

pub struct TcpTransport {
    events: mpsc::UnboundedSender<Event>,
    next_conn: u64,
    conns: HashMap<ConnId, Connection>,
}

impl TcpTransport {
    pub fn new(events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            events,
            next_conn: 1,
            conns: HashMap::new(),
        }
    }

    /// Connections whose task is still running.
    pub fn open_connections(&mut self) -> usize {
        self.reap();
        self.conns.len()
    }

    /// Drop entries of connections the peer closed or that failed.
    fn reap(&mut self) {
        self.conns.retain(|conn, connection| {
            let alive = !connection.task.is_finished();
            if !alive {
                debug!("Released {}", conn);
            }
            alive
        });
    }
}

impl Transport for TcpTransport {
    fn resolve(&mut self, host: &str, generation: u64) -> Result<Resolution, TransportError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(Resolution::Ready(ip));
        }
        if host.is_empty() || host.contains(|c: char| c.is_whitespace() || c == '/') {
            return Err(TransportError::InvalidHost(host.to_string()));
        }

        let events = self.events.clone();
        let host = host.to_string();
        tokio::spawn(async move {
            let addr = match lookup_host((host.as_str(), 0)).await {
                Ok(mut addrs) => addrs.next().map(|a| a.ip()),
                Err(e) => {
                    warn!("Lookup of {} failed: {}", host, e);
                    None
                }
            };
            debug!("Resolved {} to {:?}", host, addr);
            let _ = events.send(Event::Resolved { generation, addr });
        });
        Ok(Resolution::Pending)
    }

    fn connect(&mut self, addr: SocketAddr) -> Result<ConnId, TransportError> {
        self.reap();
        let conn = ConnId(self.next_conn);
        self.next_conn += 1;

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            run_connection(conn, addr, outbound_rx, events).await;
        });
        self.conns.insert(conn, Connection { outbound, task });
        Ok(conn)
    }

    fn send(&mut self, conn: ConnId, bytes: &[u8]) -> Result<(), TransportError> {
        self.reap();
        let connection = self
            .conns
            .get(&conn)
            .ok_or(TransportError::NotConnected(conn))?;
        connection
            .outbound
            .send(bytes.to_vec())
            .map_err(|_| TransportError::NotConnected(conn))
    }

    fn disconnect(&mut self, conn: ConnId) {
        if let Some(connection) = self.conns.remove(&conn) {
            connection.task.abort();
            debug!("Closed {}", conn);
            let _ = self.events.send(Event::Disconnected { conn });
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        for (_, connection) in self.conns.drain() {
            connection.task.abort();
        }
    }
}

async fn run_connection(
    conn: ConnId,
    addr: SocketAddr,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::UnboundedSender<Event>,
) {
    let mut stream = match TcpStream::connect(addr).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = events.send(Event::Error {
                conn,
                error: TransportError::Connect(e),
            });
            return;
        }
    };
    info!("{} connected to {}", conn, addr);
    let _ = events.send(Event::Connected { conn });

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            read = stream.read(&mut buf) => match read {
                Ok(0) => {
                    let _ = events.send(Event::Disconnected { conn });
                    return;
                }
                Ok(n) => {
                    let _ = events.send(Event::Received { conn, data: buf[..n].to_vec() });
                }
                Err(e) => {
                    let _ = events.send(Event::Error { conn, error: e.into() });
                    return;
                }
            },
            Some(bytes) = outbound.recv() => {
                if let Err(e) = stream.write_all(&bytes).await {
                    let _ = events.send(Event::Error { conn, error: e.into() });
                    return;
                }
            }
        }
    }
}
