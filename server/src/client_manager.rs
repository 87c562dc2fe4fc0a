//! WebSocket connection registry for the simulation server
//!
//! This module handles the server-side bookkeeping of connected clients, including:
//! - Client id assignment for new connections, starting from 1
//! - Capacity management against the configured client limit
//! - Routing of outbound frames to the writer task of each connection
//! - Cleanup when a connection closes or the transport stops
//!
//! The manager itself is plain data. The transport wraps it in a
//! `tokio::sync::Mutex` and shares it between the accept loop, the
//! connection tasks and the outbound dispatcher.

use log::{debug, info};
use shared::ClientId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Sending half of a connection's writer channel
pub type FrameSender = mpsc::UnboundedSender<Message>;

/// Represents one open WebSocket connection
///
/// Each client maintains:
/// - Connection metadata (ID, peer address, connect time)
/// - The sender feeding its writer task
/// - Frame counters for monitoring
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: ClientId,
    /// Peer address of the TCP connection
    pub addr: SocketAddr,
    /// When the WebSocket handshake completed
    pub connected_at: Instant,
    /// Frames queued towards this client so far
    pub frames_sent: u64,
    sender: FrameSender,
}

impl Client {
    /// Creates a new client record for an accepted connection
    pub fn new(id: ClientId, addr: SocketAddr, sender: FrameSender) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            frames_sent: 0,
            sender,
        }
    }

    /// Queues a frame for the connection's writer task
    ///
    /// Returns false if the writer task has already ended, which happens
    /// when the socket closed underneath us.
    pub fn send(&mut self, frame: Message) -> bool {
        if self.sender.send(frame).is_err() {
            return false;
        }
        self.frames_sent += 1;
        true
    }

    /// How long the connection has been open
    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Manages all open connections and routes frames to them
///
/// The ClientManager enforces the server capacity limit and owns the only
/// mapping from client ids to connections. Nothing outside the transport
/// sees connection handles; the rest of the server addresses clients by id.
pub struct ClientManager {
    /// Open connections indexed by their unique ID
    clients: HashMap<ClientId, Client>,
    /// Next available client ID for new connections
    next_client_id: u64,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Client IDs start from 1 and increment for each new connection.
    /// IDs are never reused while the server runs.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to register a new connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    /// The sender is used for every frame later addressed to this client.
    pub fn add_client(&mut self, addr: SocketAddr, sender: FrameSender) -> Option<ClientId> {
        // Enforce server capacity limits
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = ClientId(self.next_client_id);
        self.next_client_id += 1;

        info!("{} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, sender));

        Some(client_id)
    }

    /// Removes a connection from the registry
    ///
    /// Returns true if the client was found and removed, false if it was
    /// already gone. Dropping the record drops its sender, which ends the
    /// writer task once its queue is empty.
    pub fn remove_client(&mut self, client_id: &ClientId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!(
                "{} disconnected after {:.1}s, {} frames sent",
                client.id,
                client.uptime().as_secs_f64(),
                client.frames_sent
            );
            true
        } else {
            false
        }
    }

    /// Queues a frame for one client
    ///
    /// Unknown clients and closed writers are not an error; the frame is
    /// dropped and false is returned.
    pub fn send_to(&mut self, client_id: &ClientId, frame: Message) -> bool {
        match self.clients.get_mut(client_id) {
            Some(client) => {
                let sent = client.send(frame);
                if !sent {
                    debug!("Writer of {} is gone, dropping frame", client_id);
                }
                sent
            }
            None => {
                debug!("Dropping frame for unknown {}", client_id);
                false
            }
        }
    }

    /// Finds a client ID by its peer address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ClientId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Gets the IDs of all open connections
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.keys().copied().collect()
    }

    /// Sends a frame to every client and forgets all of them
    ///
    /// Used when the transport stops: each writer receives the frame,
    /// typically a close frame, and then ends.
    pub fn close_all(&mut self, frame: Message) -> usize {
        let count = self.clients.len();
        for (_, mut client) in self.clients.drain() {
            client.send(frame.clone());
        }
        count
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
