//! Whole-overlay tests: envelope round-trips across real relays, tamper
//! behavior, and the end-to-end scenario over the in-memory network.

use std::sync::Arc;

use crate::channel::testing::UnreachableChannel;
use crate::channel::{InMemoryNetwork, MessageChannel};
use crate::client::{build_envelope, Circuit, Client};
use crate::config::OverlayConfig;
use crate::directory::Directory;
use crate::envelope::HopAddress;
use crate::error::OverlayError;
use crate::relay::Relay;

/// Three relays registered in a fresh directory, not wired to any
/// network. Enough to exercise peel chains hop by hop.
fn standalone_relays() -> (OverlayConfig, Directory, Vec<Relay>) {
    let config = OverlayConfig::local_sim();
    let directory = Directory::new();
    let channel: Arc<dyn MessageChannel> = Arc::new(UnreachableChannel);
    let relays = (0..3)
        .map(|id| Relay::bootstrap(id, &config, &directory, channel.clone()).unwrap())
        .collect();
    (config, directory, relays)
}

fn fixed_circuit(directory: &Directory) -> Circuit {
    Circuit::new(directory.list()).unwrap()
}

#[test]
fn envelope_round_trips_through_the_circuit_in_order() {
    let (config, directory, relays) = standalone_relays();
    let circuit = fixed_circuit(&directory);
    let destination = HopAddress::from_port(config.ports.user_port(1));

    let wire = build_envelope("hello through the onion", &destination, &circuit, &config.ports)
        .unwrap();

    // Hop 0 and 1 must each reveal the next relay's address.
    let (hop1, layer1) = relays[0].peel(&wire).unwrap();
    assert_eq!(hop1.port(), u64::from(config.ports.relay_port(1)));

    let (hop2, layer2) = relays[1].peel(&layer1).unwrap();
    assert_eq!(hop2.port(), u64::from(config.ports.relay_port(2)));

    // The exit hop reveals the original destination and the plaintext.
    let (dest, plaintext) = relays[2].peel(&layer2).unwrap();
    assert_eq!(dest, destination);
    assert_eq!(plaintext, "hello through the onion");
}

#[test]
fn layer_count_matches_circuit_length() {
    let (config, directory, relays) = standalone_relays();
    let circuit = fixed_circuit(&directory);
    let destination = HopAddress::from_port(config.ports.user_port(0));
    let wire = build_envelope("x", &destination, &circuit, &config.ports).unwrap();

    // Exactly three peels: after the third, what remains is plaintext,
    // not another parseable layer.
    let (_, layer1) = relays[0].peel(&wire).unwrap();
    let (_, layer2) = relays[1].peel(&layer1).unwrap();
    let (_, plaintext) = relays[2].peel(&layer2).unwrap();
    assert_eq!(plaintext, "x");
}

#[test]
fn tampered_outer_layer_fails_at_the_entry_relay() {
    let (config, directory, relays) = standalone_relays();
    let circuit = fixed_circuit(&directory);
    let destination = HopAddress::from_port(config.ports.user_port(1));
    let wire = build_envelope("hello", &destination, &circuit, &config.ports).unwrap();

    // Flip one character inside the sealed-payload segment (the tail of
    // the envelope, well past the prefix and wrap blob).
    let mut tampered: Vec<char> = wire.chars().collect();
    let idx = tampered.len() - 2;
    tampered[idx] = if tampered[idx] == 'A' { 'B' } else { 'A' };
    let tampered: String = tampered.into_iter().collect();

    // Never a plausible-but-wrong address or payload: the hop errors out.
    let err = relays[0].peel(&tampered).unwrap_err();
    assert!(matches!(
        err,
        OverlayError::Decryption(_) | OverlayError::Envelope(_)
    ));
}

#[test]
fn tampered_wrap_blob_fails_at_the_corresponding_hop() {
    let (config, directory, relays) = standalone_relays();
    let circuit = fixed_circuit(&directory);
    let destination = HopAddress::from_port(config.ports.user_port(1));
    let wire = build_envelope("hello", &destination, &circuit, &config.ports).unwrap();

    // The middle relay's layer, tampered inside its wrapped-key segment.
    let (_, layer1) = relays[0].peel(&wire).unwrap();
    let mut tampered: Vec<char> = layer1.chars().collect();
    tampered[10] = if tampered[10] == 'A' { 'B' } else { 'A' };
    let tampered: String = tampered.into_iter().collect();

    let err = relays[1].peel(&tampered).unwrap_err();
    assert!(matches!(
        err,
        OverlayError::Decryption(_) | OverlayError::Envelope(_)
    ));
}

#[tokio::test]
async fn hello_reaches_the_destination_through_three_relays() {
    let config = OverlayConfig::local_sim();
    let network = InMemoryNetwork::new();
    let directory = Arc::new(Directory::new());

    for id in 0..3 {
        let relay = Arc::new(
            Relay::bootstrap(id, &config, &directory, network.clone()).unwrap(),
        );
        network.bind(relay.address().clone(), relay.clone());
    }

    let alice = Arc::new(Client::new(0, &config, directory.clone(), network.clone()));
    let bob = Arc::new(Client::new(1, &config, directory.clone(), network.clone()));
    network.bind(alice.address().clone(), alice.clone());
    network.bind(bob.address().clone(), bob.clone());

    let receipt = alice.send("hello", 1).await.unwrap();

    // Delivery: the in-memory chain completes before send returns.
    assert_eq!(bob.last_received_message().unwrap(), "hello");

    // Audit trail: three distinct relays, all drawn from the directory.
    assert_eq!(receipt.circuit.len(), 3);
    let mut ids = receipt.circuit.clone();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert!(receipt.circuit.iter().all(|id| *id < 3));
    assert_eq!(alice.last_circuit().unwrap(), receipt.circuit);
    assert_eq!(alice.last_sent_message().unwrap(), "hello");
}

#[tokio::test]
async fn concurrent_sends_all_arrive() {
    let config = OverlayConfig::local_sim();
    let network = InMemoryNetwork::new();
    let directory = Arc::new(Directory::new());

    for id in 0..3 {
        let relay = Arc::new(
            Relay::bootstrap(id, &config, &directory, network.clone()).unwrap(),
        );
        network.bind(relay.address().clone(), relay.clone());
    }

    let alice = Arc::new(Client::new(0, &config, directory.clone(), network.clone()));
    let bob = Arc::new(Client::new(1, &config, directory.clone(), network.clone()));
    network.bind(alice.address().clone(), alice.clone());
    network.bind(bob.address().clone(), bob.clone());

    let (a, b) = tokio::join!(alice.send("first", 1), alice.send("second", 1));
    a.unwrap();
    b.unwrap();

    // Telemetry is last-writer-wins; whichever message finished last is
    // the one visible.
    let last = bob.last_received_message().unwrap();
    assert!(last == "first" || last == "second");
}

#[tokio::test]
async fn every_node_answers_the_liveness_probe() {
    let config = OverlayConfig::local_sim();
    let network = InMemoryNetwork::new();
    let directory = Arc::new(Directory::new());

    let relay = Relay::bootstrap(0, &config, &directory, network.clone()).unwrap();
    let client = Client::new(0, &config, directory.clone(), network);

    assert_eq!(directory.status(), "live");
    assert_eq!(relay.status(), "live");
    assert_eq!(client.status(), "live");
}
