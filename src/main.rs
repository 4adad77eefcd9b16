use std::error::Error;
use std::sync::Arc;

use tracing::info;

use onion_overlay::{Client, Directory, InMemoryNetwork, OverlayConfig, Relay};

/// Boots a whole overlay in one process (a directory, three relays and
/// two clients on the in-memory network) and routes one message through
/// a fresh 3-hop circuit.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = OverlayConfig::local_sim();
    let network = InMemoryNetwork::new();
    let directory = Arc::new(Directory::new());

    for id in 0..3 {
        let relay = Arc::new(Relay::bootstrap(id, &config, &directory, network.clone())?);
        network.bind(relay.address().clone(), relay.clone());
    }

    let alice = Arc::new(Client::new(0, &config, directory.clone(), network.clone()));
    let bob = Arc::new(Client::new(1, &config, directory.clone(), network.clone()));
    network.bind(alice.address().clone(), alice.clone());
    network.bind(bob.address().clone(), bob.clone());

    let receipt = alice.send("hello", bob.id()).await?;
    info!(circuit = ?receipt.circuit, "message handed into the circuit");

    match bob.last_received_message() {
        Some(message) => info!(%message, "destination client received plaintext"),
        None => info!("nothing delivered"),
    }

    Ok(())
}
