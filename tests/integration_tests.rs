//! Integration tests for the galaxy simulation server
//!
//! These tests validate the broker → scheduler → outbound pipeline in-process
//! and the full server over a real WebSocket connection.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use server::queue::{InboundEvent, InboundMessage, OutboundReceiver};
use server::{MessageBroker, NetworkServer, ServerConfig, SimulationScheduler};
use shared::{codec, ClientId};
use std::time::Duration;
use tokio::sync::mpsc;

const ALICE: ClientId = ClientId(1);
const BOB: ClientId = ClientId(2);

/// Broker and scheduler wired together, with the scheduler ticked by hand
struct Pipeline {
    broker: MessageBroker,
    scheduler: SimulationScheduler,
    outbound: OutboundReceiver,
}

impl Pipeline {
    fn new() -> Self {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (sim_tx, sim_rx) = mpsc::unbounded_channel();
        let config = ServerConfig {
            star_systems: 2,
            ..ServerConfig::default()
        };
        Self {
            broker: MessageBroker::new(out_tx.clone(), sim_tx)
                .with_shutdown_grace(Duration::ZERO),
            scheduler: SimulationScheduler::new(sim_rx, out_tx, &config),
            outbound: out_rx,
        }
    }

    fn send(&mut self, client_id: ClientId, text: &str) {
        self.broker.handle(InboundMessage::text(client_id, text));
    }

    fn request(&mut self, client_id: ClientId, method: &str, params: Value, id: u32) {
        let text = json!({"jsonrpc": "2.0", "method": method, "params": params, "id": id}).to_string();
        self.send(client_id, &text);
    }

    fn tick(&mut self, elapsed: Duration) {
        self.scheduler.tick(elapsed);
    }

    fn drain(&mut self) -> Vec<(ClientId, Value)> {
        let mut messages = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            messages.push((message.client_id, codec::parse(&message.text).unwrap()));
        }
        messages
    }
}

/// REQUEST HANDLING TESTS
mod request_tests {
    use super::*;

    /// Neither method nor id: exactly one REQUEST error for the sender
    #[test]
    fn missing_method_and_id() {
        let mut pipeline = Pipeline::new();
        pipeline.send(ALICE, r#"{"jsonrpc":"2.0","params":[]}"#);
        pipeline.tick(Duration::from_millis(10));

        let messages = pipeline.drain();
        assert_eq!(messages.len(), 1);
        let (client_id, document) = &messages[0];
        assert_eq!(*client_id, ALICE);
        assert_eq!(document["error"]["code"], -32600);
        assert_eq!(document["error"]["message"], "Invalid Request");
        assert_eq!(document["error"]["data"], "Missing field <method>/<id>");
        assert!(document["id"].is_null());
    }

    /// Malformed JSON is answered and nothing reaches the simulation
    #[test]
    fn parse_error() {
        let mut pipeline = Pipeline::new();
        pipeline.send(BOB, "not json at all");
        pipeline.tick(Duration::from_millis(10));

        let messages = pipeline.drain();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, BOB);
        assert_eq!(messages[0].1["error"]["code"], -32700);
    }

    /// Clamping outside [0.1, 1.0e6], plain success inside
    #[test]
    fn accelerate_clamping() {
        let mut pipeline = Pipeline::new();
        pipeline.request(ALICE, "cmd_accelerate_simulation", json!([2.0e6]), 1);
        pipeline.tick(Duration::ZERO);
        assert_eq!(pipeline.scheduler.simulation().clock.acceleration(), 1.0e6);

        pipeline.request(ALICE, "cmd_accelerate_simulation", json!([0.05]), 2);
        pipeline.tick(Duration::ZERO);
        assert_eq!(pipeline.scheduler.simulation().clock.acceleration(), 0.1);

        pipeline.request(ALICE, "cmd_accelerate_simulation", json!([100.0]), 3);
        pipeline.tick(Duration::ZERO);
        assert_eq!(pipeline.scheduler.simulation().clock.acceleration(), 100.0);

        let results: Vec<Value> = pipeline
            .drain()
            .into_iter()
            .map(|(_, document)| document["result"].clone())
            .collect();
        let clamped = json!({
            "success": true,
            "notification": "Out of bounds, valid interval is [0.1, 1.0e6]. Clamping value."
        });
        assert_eq!(results, vec![clamped.clone(), clamped, json!({"success": true})]);
    }

    /// Missing or unknown tier token: METHOD error, no subscription
    #[test]
    fn subscription_without_valid_tier() {
        let mut pipeline = Pipeline::new();
        pipeline.request(ALICE, "sub_perf_stats", json!([]), 1);
        pipeline.request(ALICE, "sub_perf_stats_s7", json!([]), 2);
        pipeline.tick(Duration::from_secs(10));

        let messages = pipeline.drain();
        assert_eq!(messages.len(), 2);
        for (_, document) in &messages {
            assert_eq!(document["error"]["code"], -32601);
            assert_eq!(document["error"]["message"], "Method not found");
        }
        assert_eq!(
            pipeline.scheduler.simulation().subscriptions.client_count(),
            0
        );
    }

    /// A second start while running does not reset the clock
    #[test]
    fn start_is_idempotent() {
        let mut pipeline = Pipeline::new();
        pipeline.request(ALICE, "cmd_start_simulation", json!([]), 1);
        pipeline.tick(Duration::from_millis(100));
        pipeline.tick(Duration::from_millis(100));
        let before = pipeline.scheduler.simulation().clock.total_seconds();

        pipeline.request(BOB, "cmd_start_simulation", json!([]), 2);
        pipeline.tick(Duration::from_millis(100));
        let after = pipeline.scheduler.simulation().clock.total_seconds();

        assert!(after > before);
        assert!(pipeline.scheduler.simulation().clock.is_active());
        let responses = pipeline.drain();
        assert_eq!(responses[1].0, BOB);
        assert_eq!(responses[1].1["result"]["success"], true);
    }

    /// Stop halts physics while ticks keep going
    #[test]
    fn stop_freezes_bodies() {
        let mut pipeline = Pipeline::new();
        pipeline.request(ALICE, "cmd_start_simulation", json!([]), 1);
        pipeline.request(ALICE, "cmd_accelerate_simulation", json!([3600.0]), 2);
        pipeline.tick(Duration::from_millis(100));
        pipeline.request(ALICE, "cmd_stop_simulation", json!([]), 3);
        pipeline.tick(Duration::from_millis(100));

        let earth = pipeline.scheduler.simulation().galaxy.bodies()[1].motion;
        pipeline.tick(Duration::from_secs(1));
        assert_eq!(
            pipeline.scheduler.simulation().galaxy.bodies()[1].motion,
            earth
        );
        assert!(!pipeline.scheduler.simulation().clock.is_active());
    }

    /// cmd_shutdown runs in the broker and replies right away
    #[test]
    fn shutdown_inline() {
        let mut pipeline = Pipeline::new();
        pipeline.request(ALICE, "cmd_shutdown", json!([]), 9);

        let messages = pipeline.drain();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].1["result"]["success"], true);
        assert_eq!(messages[0].1["id"], 9);
        assert!(pipeline.broker.is_shut_down());
    }
}

/// SCHEDULER TIMING TESTS
mod timing_tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// Overrun: no sleep before the next tick, counted in the statistics
    #[test]
    fn overrun_skips_sleep() {
        let mut pipeline = Pipeline::new();
        assert_eq!(
            pipeline.scheduler.pace(Duration::from_millis(35)),
            Duration::ZERO
        );
        assert_eq!(pipeline.scheduler.simulation().perf.overruns, 1);
        assert!(pipeline.scheduler.pace(Duration::from_millis(1)) > Duration::ZERO);
    }

    /// The clock follows measured elapsed time times acceleration
    #[test]
    fn clock_follows_measured_time() {
        let mut pipeline = Pipeline::new();
        pipeline.request(ALICE, "cmd_start_simulation", json!([]), 1);
        pipeline.request(ALICE, "cmd_accelerate_simulation", json!([10.0]), 2);
        pipeline.tick(Duration::from_millis(37));

        assert_approx_eq!(
            pipeline.scheduler.simulation().clock.total_seconds(),
            0.37
        );
    }
}

/// SUBSCRIPTION TESTS
mod subscription_tests {
    use super::*;
    use server::telemetry::{notifications_for, PerfStats, Snapshot};
    use server::{clock::SimulationClock, galaxy::Galaxy};
    use shared::Channel;
    use std::collections::BTreeSet;

    fn methods_for(messages: &[(ClientId, Value)], client_id: ClientId) -> Vec<String> {
        messages
            .iter()
            .filter(|(id, document)| *id == client_id && document.get("id").is_none())
            .map(|(_, document)| document["method"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Each client only gets the channels it subscribed, at its own rate
    #[test]
    fn tiers_are_independent() {
        let mut pipeline = Pipeline::new();
        pipeline.request(ALICE, "sub_sim_stats_s01", json!([]), 1);
        pipeline.request(BOB, "sub_perf_stats_s1", json!([]), 2);
        pipeline.tick(Duration::ZERO);
        pipeline.drain();

        for _ in 0..5 {
            pipeline.tick(Duration::from_millis(100));
        }
        let messages = pipeline.drain();
        assert_eq!(methods_for(&messages, ALICE), vec!["sim_stats"; 5]);
        assert!(methods_for(&messages, BOB).is_empty());

        for _ in 0..5 {
            pipeline.tick(Duration::from_millis(100));
        }
        let messages = pipeline.drain();
        assert_eq!(methods_for(&messages, BOB), vec!["perf_stats"]);
    }

    /// Galaxy data goes out once per subscription
    #[test]
    fn event_tier_pushes_once() {
        let mut pipeline = Pipeline::new();
        pipeline.request(ALICE, "sub_galaxy_data_evt", json!([]), 1);
        pipeline.tick(Duration::from_millis(10));
        let first = methods_for(&pipeline.drain(), ALICE);
        assert_eq!(first.len(), 6);

        pipeline.request(ALICE, "sub_galaxy_data_evt", json!([]), 2);
        for _ in 0..3 {
            pipeline.tick(Duration::from_secs(1));
        }
        assert!(methods_for(&pipeline.drain(), ALICE).is_empty());
    }

    /// Closing the connection drops every subscription of the client
    #[test]
    fn disconnect_cleans_up() {
        let mut pipeline = Pipeline::new();
        pipeline.request(ALICE, "sub_dynamic_data_s01", json!([]), 1);
        pipeline.request(ALICE, "sub_sim_stats_s01", json!([]), 2);
        pipeline.tick(Duration::ZERO);
        pipeline.drain();

        pipeline.broker.handle(InboundMessage::closed(ALICE));
        pipeline.tick(Duration::from_millis(100));

        assert!(pipeline.drain().is_empty());
        assert_eq!(
            pipeline.scheduler.simulation().subscriptions.client_count(),
            0
        );
    }

    /// A subscribe still queued in the broker when the connection closes is undone
    #[test]
    fn close_behind_pending_subscribe() {
        let mut pipeline = Pipeline::new();
        pipeline.request(ALICE, "sub_perf_stats_s01", json!([]), 1);
        pipeline.broker.handle(InboundMessage::closed(ALICE));
        pipeline.tick(Duration::from_millis(100));

        let messages = pipeline.drain();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].1["id"], 1);
        assert_eq!(
            pipeline.scheduler.simulation().subscriptions.client_count(),
            0
        );
    }

    /// Re-parsing any notification exposes the same method and key set
    #[test]
    fn notifications_survive_reparse() {
        let galaxy = Galaxy::seeded(3, 5);
        let mut clock = SimulationClock::new();
        clock.start();
        clock.advance(1.0e5);
        let perf = PerfStats::default();
        let snapshot = Snapshot {
            galaxy: &galaxy,
            clock: &clock,
            perf: &perf,
        };
        let selection = [galaxy.systems()[0].id];

        for channel in Channel::ALL {
            let notifications = notifications_for(channel, &selection, snapshot);
            assert!(!notifications.is_empty(), "{}", channel);
            for notification in notifications {
                let parsed = codec::parse(&notification.to_text()).unwrap();
                assert_eq!(parsed["method"], notification.method());
                assert!(parsed.get("id").is_none());

                let inserted: BTreeSet<&String> = notification.params().keys().collect();
                let reparsed: BTreeSet<&String> =
                    parsed["params"].as_object().unwrap().keys().collect();
                assert_eq!(inserted, reparsed);
            }
        }
    }
}

/// WEBSOCKET TESTS
mod websocket_tests {
    use super::*;
    use tokio::time::{timeout, Instant};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    const TIMEOUT: Duration = Duration::from_secs(10);

    /// Frames and the close of one connection reach the scheduler in order
    #[tokio::test]
    async fn close_right_after_subscribe() {
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        let (_outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let network = NetworkServer::bind("127.0.0.1:0", 4, inbound_tx, outbound_rx)
            .await
            .unwrap();
        let addr = network.local_addr();
        let transport = network.control();
        let network_handle = tokio::spawn(network.run());

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let request = json!({"jsonrpc": "2.0", "method": "sub_perf_stats_s01", "id": 1});
        ws.send(Message::text(request.to_string())).await.unwrap();
        ws.close(None).await.unwrap();

        // The broker only runs once the connection is already gone
        let mut events = Vec::new();
        loop {
            let message = timeout(TIMEOUT, inbound_rx.recv())
                .await
                .expect("no close event")
                .expect("inbound queue ended");
            let closed = message.event == InboundEvent::Closed;
            events.push(message);
            if closed {
                break;
            }
        }

        let mut pipeline = Pipeline::new();
        for message in events {
            pipeline.broker.handle(message);
        }
        for _ in 0..10 {
            pipeline.tick(Duration::from_millis(100));
        }

        assert_eq!(
            pipeline.scheduler.simulation().subscriptions.client_count(),
            0
        );
        let messages = pipeline.drain();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].1["result"]["success"], true);

        transport.stop();
        timeout(TIMEOUT, network_handle).await.unwrap().unwrap();
    }

    /// Full server on an ephemeral port: subscribe, start, receive, shut down
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn websocket_round_trip() {
        let config = ServerConfig {
            star_systems: 2,
            shutdown_grace_ms: 0,
            ..ServerConfig::default()
        };
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (sim_tx, sim_rx) = mpsc::unbounded_channel();

        let network = NetworkServer::bind("127.0.0.1:0", 4, inbound_tx, outbound_rx)
            .await
            .unwrap();
        let addr = network.local_addr();
        let transport = network.control();
        let network_handle = tokio::spawn(network.run());

        let scheduler = SimulationScheduler::new(sim_rx, outbound_tx.clone(), &config)
            .spawn()
            .unwrap();
        let mut broker = MessageBroker::new(outbound_tx, sim_tx)
            .with_simulation(Box::new(scheduler.control()))
            .with_transport(Box::new(transport.clone()))
            .with_shutdown_grace(config.shutdown_grace());
        let broker_thread = std::thread::spawn(move || {
            while let Some(message) = inbound_rx.blocking_recv() {
                broker.handle(message);
                if broker.is_shut_down() {
                    break;
                }
            }
        });

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        for (method, id) in [("sub_sim_stats_s01", 1), ("cmd_start_simulation", 2)] {
            let request = json!({"jsonrpc": "2.0", "method": method, "params": [], "id": id});
            ws.send(Message::text(request.to_string())).await.unwrap();
        }

        let mut responses = 0;
        let mut running_stats = false;
        let deadline = Instant::now() + TIMEOUT;
        while responses < 2 || !running_stats {
            let frame = timeout(deadline.saturating_duration_since(Instant::now()), ws.next())
                .await
                .expect("server went quiet")
                .expect("connection ended")
                .unwrap();
            let Message::Text(text) = frame else { continue };
            let document = codec::parse(text.as_str()).unwrap();
            if document.get("id").is_some() {
                assert_eq!(document["result"]["success"], true);
                responses += 1;
            } else if document["method"] == "sim_stats" && document["params"]["running"] == true {
                running_stats = true;
            }
        }

        let shutdown = json!({"jsonrpc": "2.0", "method": "cmd_shutdown", "id": 3});
        ws.send(Message::text(shutdown.to_string())).await.unwrap();

        let closed = timeout(TIMEOUT, async {
            while let Some(frame) = ws.next().await {
                if matches!(frame, Ok(Message::Close(_)) | Err(_)) {
                    break;
                }
            }
        })
        .await;
        assert!(closed.is_ok());

        assert!(transport.is_stopped());
        scheduler.join().unwrap();
        timeout(TIMEOUT, network_handle).await.unwrap().unwrap();
        broker_thread.join().unwrap();
    }
}
