use clap::Parser;
use log::{error, info};
use server::{MessageBroker, NetworkServer, ServerConfig, SimulationScheduler};
use std::time::Duration;
use tokio::sync::mpsc;

/// Main-method of the application.
/// Parses command-line arguments, starts the network runtime and the
/// simulation thread, then runs the message broker on this thread.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_filter()))
        .init();
    config.validate()?;

    // Queues between transport, broker and simulation
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (sim_tx, sim_rx) = mpsc::unbounded_channel();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("network")
        .build()?;

    let network = runtime.block_on(NetworkServer::bind(
        &config.address(),
        config.max_clients,
        inbound_tx,
        outbound_rx,
    ))?;
    let transport = network.control();
    let network_handle = runtime.spawn(network.run());

    let scheduler = SimulationScheduler::new(sim_rx, outbound_tx.clone(), &config).spawn()?;
    let simulation = scheduler.control();

    // Ctrl+C stops both workers. The broker loop ends once the transport has dropped its senders
    {
        let transport = transport.clone();
        let simulation = simulation.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down gracefully...");
                simulation.stop();
                transport.stop();
            }
        });
    }

    let mut broker = MessageBroker::new(outbound_tx, sim_tx)
        .with_simulation(Box::new(simulation.clone()))
        .with_transport(Box::new(transport.clone()))
        .with_shutdown_grace(config.shutdown_grace());

    info!("Server started successfully");
    while let Some(message) = inbound_rx.blocking_recv() {
        broker.handle(message);
        if broker.is_shut_down() {
            break;
        }
    }

    simulation.stop();
    transport.stop();
    if let Err(e) = scheduler.join() {
        error!("{}", e);
    }
    if let Err(e) = runtime.block_on(network_handle) {
        error!("Network task panicked: {}", e);
    }
    runtime.shutdown_timeout(Duration::from_secs(1));

    info!("Server stopped");
    Ok(())
}
