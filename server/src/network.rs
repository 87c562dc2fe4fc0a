//! Server network layer handling WebSocket connections
//!
//! The transport never touches simulated state. It turns text frames into
//! [`InboundMessage`]s for the broker, delivers [`OutboundMessage`]s to the
//! right connection and queues a closed event behind the last frame of a
//! connection that goes away.

use crate::broker::Shutdown;
use crate::client_manager::ClientManager;
use crate::error::ServerError;
use crate::queue::{InboundMessage, InboundSender, OutboundReceiver};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::ClientId;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::interval;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// How often the outbound queue is drained.
pub const DISPATCH_INTERVAL: Duration = Duration::from_millis(10);

fn close_frame(code: CloseCode, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }))
}

/// Stop switch of a running [`NetworkServer`].
#[derive(Debug, Clone)]
pub struct TransportControl {
    stopped: Arc<watch::Sender<bool>>,
}

impl TransportControl {
    fn new() -> Self {
        let (stopped, _) = watch::channel(false);
        Self {
            stopped: Arc::new(stopped),
        }
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.stopped.subscribe()
    }

    /// Stops accepting, closes every open connection and ends the dispatcher.
    /// Calling it again does nothing.
    pub fn stop(&self) {
        if !self.stopped.send_replace(true) {
            info!("Network shutdown requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }
}

impl Shutdown for TransportControl {
    fn shutdown(&self) {
        self.stop();
    }
}

/// Resolves once the transport has been stopped or its control dropped.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// WebSocket server feeding the broker and delivering its responses
pub struct NetworkServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    clients: Arc<Mutex<ClientManager>>,
    inbound: InboundSender,
    outbound: OutboundReceiver,
    control: TransportControl,
}

impl NetworkServer {
    pub async fn bind(
        address: &str,
        max_clients: usize,
        inbound: InboundSender,
        outbound: OutboundReceiver,
    ) -> Result<Self, ServerError> {
        let bind_error = |source| ServerError::Bind {
            address: address.to_string(),
            source,
        };
        let listener = TcpListener::bind(address).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        info!("Server listening on ws://{}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            clients: Arc::new(Mutex::new(ClientManager::new(max_clients))),
            inbound,
            outbound,
            control: TransportControl::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn control(&self) -> TransportControl {
        self.control.clone()
    }

    /// Accepts connections until [`TransportControl::stop`] is called.
    pub async fn run(self) {
        let NetworkServer {
            listener,
            clients,
            inbound,
            outbound,
            control,
            ..
        } = self;

        let dispatcher = tokio::spawn(dispatch_outbound(
            outbound,
            Arc::clone(&clients),
            control.subscribe(),
        ));

        let mut shutdown = control.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        tokio::spawn(serve_connection(
                            stream,
                            addr,
                            Arc::clone(&clients),
                            inbound.clone(),
                            control.subscribe(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
                _ = stopped(&mut shutdown) => break,
            }
        }

        let closed = clients
            .lock()
            .await
            .close_all(close_frame(CloseCode::Normal, "Server shutting down"));
        info!("Network stopped, closed {} connections", closed);

        if let Err(e) = dispatcher.await {
            warn!("Outbound dispatcher ended abnormally: {}", e);
        }
    }
}

/// Handles one connection from handshake to close.
async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    clients: Arc<Mutex<ClientManager>>,
    inbound: InboundSender,
    mut shutdown: watch::Receiver<bool>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Message>();
    let client_id = clients.lock().await.add_client(addr, frame_tx);
    let Some(client_id) = client_id else {
        info!("Rejecting {}: server full", addr);
        if let Err(e) = ws_tx.send(close_frame(CloseCode::Again, "Server full")).await {
            debug!("Rejection of {} not delivered: {}", addr, e);
        }
        return;
    };

    // Writer: drains the per-connection queue until it is dropped or a close frame went out
    let writer = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            let closing = matches!(frame, Message::Close(_));
            if let Err(e) = ws_tx.send(frame).await {
                debug!("Send to {} failed: {}", client_id, e);
                break;
            }
            if closing {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !forward(&inbound, client_id, text.to_string()) {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => {
                        if !forward(&inbound, client_id, text) {
                            break;
                        }
                    }
                    Err(_) => warn!("Ignoring non UTF-8 binary frame from {}", client_id),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Read from {} failed: {}", client_id, e);
                    break;
                }
            },
            _ = stopped(&mut shutdown) => {
                clients
                    .lock()
                    .await
                    .send_to(&client_id, close_frame(CloseCode::Normal, "Server shutting down"));
                break;
            }
        }
    }

    clients.lock().await.remove_client(&client_id);
    if inbound.send(InboundMessage::closed(client_id)).is_err() {
        debug!("Broker queue closed, close of {} not reported", client_id);
    }
    if let Err(e) = writer.await {
        debug!("Writer of {} ended abnormally: {}", client_id, e);
    }
}

fn forward(inbound: &InboundSender, client_id: ClientId, text: String) -> bool {
    if inbound.send(InboundMessage::text(client_id, text)).is_err() {
        warn!("Broker queue closed, dropping {}", client_id);
        return false;
    }
    true
}

/// Delivers queued outbound messages every [`DISPATCH_INTERVAL`].
///
/// Messages for unknown or closed clients are dropped.
async fn dispatch_outbound(
    mut outbound: OutboundReceiver,
    clients: Arc<Mutex<ClientManager>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(DISPATCH_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut batch = Vec::new();
                while let Ok(message) = outbound.try_recv() {
                    batch.push(message);
                }
                if batch.is_empty() {
                    continue;
                }

                let mut clients = clients.lock().await;
                for message in batch {
                    clients.send_to(&message.client_id, Message::text(message.text));
                }
            }
            _ = stopped(&mut shutdown) => break,
        }
    }
    debug!("Outbound dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{InboundEvent, InboundReceiver, OutboundMessage, OutboundSender};
    use tokio::time::timeout;
    use tokio_tungstenite::connect_async;

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct Harness {
        addr: SocketAddr,
        control: TransportControl,
        inbound_rx: InboundReceiver,
        outbound_tx: OutboundSender,
    }

    async fn start(max_clients: usize) -> Harness {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let server = NetworkServer::bind("127.0.0.1:0", max_clients, inbound_tx, outbound_rx)
            .await
            .unwrap();
        let addr = server.local_addr();
        let control = server.control();
        tokio::spawn(server.run());
        Harness {
            addr,
            control,
            inbound_rx,
            outbound_tx,
        }
    }

    #[test]
    fn test_stop_wakes_waiters() {
        let control = TransportControl::new();
        let mut watcher = control.subscribe();
        let mut waiting = tokio_test::task::spawn(async move { stopped(&mut watcher).await });
        tokio_test::assert_pending!(waiting.poll());

        control.stop();
        control.stop();
        assert!(waiting.is_woken());
        tokio_test::assert_ready!(waiting.poll());
        assert!(control.is_stopped());
    }

    #[tokio::test]
    async fn test_bind_port_zero() {
        let harness = start(1).await;
        assert_ne!(harness.addr.port(), 0);
        harness.control.stop();
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let (inbound_tx, _) = mpsc::unbounded_channel();
        let (_, outbound_rx) = mpsc::unbounded_channel();
        let result = NetworkServer::bind("256.0.0.1:0", 1, inbound_tx, outbound_rx).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_text_frames_reach_broker_and_back() {
        let mut harness = start(4).await;
        let (mut ws, _) = connect_async(format!("ws://{}", harness.addr)).await.unwrap();

        ws.send(Message::text("hello")).await.unwrap();
        let inbound = timeout(TIMEOUT, harness.inbound_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inbound.client_id, ClientId(1));
        assert_eq!(inbound.event, InboundEvent::Text("hello".to_string()));

        harness
            .outbound_tx
            .send(OutboundMessage {
                client_id: inbound.client_id,
                text: "world".to_string(),
            })
            .unwrap();
        let reply = timeout(TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(reply, Message::text("world"));

        harness.control.stop();
    }

    #[tokio::test]
    async fn test_close_reports_disconnect() {
        let mut harness = start(4).await;
        let (mut ws, _) = connect_async(format!("ws://{}", harness.addr)).await.unwrap();
        ws.send(Message::text("ping")).await.unwrap();
        let inbound = timeout(TIMEOUT, harness.inbound_rx.recv())
            .await
            .unwrap()
            .unwrap();

        ws.send(Message::text("last")).await.unwrap();
        ws.close(None).await.unwrap();

        let last = timeout(TIMEOUT, harness.inbound_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last, InboundMessage::text(inbound.client_id, "last"));
        let closed = timeout(TIMEOUT, harness.inbound_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed, InboundMessage::closed(inbound.client_id));

        harness.control.stop();
    }

    #[tokio::test]
    async fn test_server_full() {
        let mut harness = start(1).await;
        let (mut first, _) = connect_async(format!("ws://{}", harness.addr)).await.unwrap();
        first.send(Message::text("registered")).await.unwrap();
        timeout(TIMEOUT, harness.inbound_rx.recv()).await.unwrap();

        let (mut second, _) = connect_async(format!("ws://{}", harness.addr)).await.unwrap();

        match timeout(TIMEOUT, second.next()).await.unwrap() {
            Some(Ok(Message::Close(Some(frame)))) => assert_eq!(frame.reason.as_str(), "Server full"),
            other => panic!("Expected close frame, got {:?}", other),
        }

        harness.control.stop();
    }

    #[tokio::test]
    async fn test_stop_closes_connections() {
        let mut harness = start(2).await;
        let (mut ws, _) = connect_async(format!("ws://{}", harness.addr)).await.unwrap();
        ws.send(Message::text("hi")).await.unwrap();
        timeout(TIMEOUT, harness.inbound_rx.recv()).await.unwrap();

        harness.control.stop();
        harness.control.stop();
        assert!(harness.control.is_stopped());

        let closed = timeout(TIMEOUT, async {
            while let Some(frame) = ws.next().await {
                if matches!(frame, Ok(Message::Close(_)) | Err(_)) {
                    return true;
                }
            }
            true
        })
        .await
        .unwrap();
        assert!(closed);
    }
}
