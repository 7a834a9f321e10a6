//! Full circuits over the in-process network.

use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use rand::thread_rng;

use shallot_core::config::Config;
use shallot_core::errors::*;
use shallot_core::mem_network::*;
use shallot_core::node::Node;
use shallot_core::substrate::*;
use shallot_crypto::*;
use shallot_packet::*;
use shallot_packet::onion::*;

/// Substrate of a misbehaving relay that breaks signatures of build requests
/// it sends.
struct TamperingSubstrate {
    inner: MemEndpoint,
}

#[async_trait]
impl Substrate for TamperingSubstrate {
    async fn find_successor(&self, key: &DhtKey) -> Result<DhtKey, CallError> {
        self.inner.find_successor(key).await
    }

    async fn lookup_item(&self, key: &DhtKey) -> Result<Option<Vec<u8>>, CallError> {
        self.inner.lookup_item(key).await
    }

    async fn call(&self, node: &DhtKey, tag: HandlerTag, mut params: Vec<u8>) -> Result<Vec<u8>, CallError> {
        if tag == HandlerTag::Build {
            let last = params.len() - 1;
            params[last] ^= 0x01;
        }
        self.inner.call(node, tag, params).await
    }
}

async fn join(network: &MemNetwork, node: &Node) {
    network.publish_identity(&node.public_identity()).await;
    network.join(node.dht_key(), Arc::new(node.clone())).await;
}

async fn create_node(network: &MemNetwork) -> Node {
    let config = Config::default();
    let node = Node::new(NodeKeys::generate(&mut thread_rng()), Arc::new(network.endpoint(&config)), config);
    join(network, &node).await;
    node
}

async fn create_nodes(network: &MemNetwork, count: usize) -> Vec<Node> {
    let mut nodes = Vec::with_capacity(count);
    for _ in 0 .. count {
        nodes.push(create_node(network).await);
    }
    nodes
}

fn identities(nodes: &[Node]) -> Vec<PublicIdentity> {
    nodes.iter().map(|node| node.public_identity()).collect()
}

#[tokio::test]
async fn end_to_end() {
    let network = MemNetwork::new();
    let origin = create_node(&network).await;
    let hops = create_nodes(&network, 3).await;
    let destination = create_node(&network).await;
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded();
    destination.set_inbound_sink(inbound_tx).await;

    let session = origin.connect_via(identities(&hops), destination.public_identity()).await.unwrap();
    assert_eq!(session.destination(), destination.dht_key());
    assert_eq!(session.route().len(), 4);

    let mut inbound = inbound_rx.next().await.unwrap();
    assert_eq!(inbound.entry(), origin.dht_key());

    session.send(b"hello").await.unwrap();
    assert_eq!(inbound.next().await, Some(b"hello".to_vec()));
}

#[tokio::test]
async fn data_arrives_in_order() {
    let network = MemNetwork::new();
    let origin = create_node(&network).await;
    let hops = create_nodes(&network, 3).await;
    let destination = create_node(&network).await;
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded();
    destination.set_inbound_sink(inbound_tx).await;

    let session = origin.connect_via(identities(&hops), destination.public_identity()).await.unwrap();
    let mut inbound = inbound_rx.next().await.unwrap();

    let messages = (0 .. 10u8).map(|i| vec![i; i as usize + 1]).collect::<Vec<_>>();
    for message in &messages {
        session.send(message).await.unwrap();
    }
    for message in messages {
        assert_eq!(inbound.next().await, Some(message));
    }
}

#[tokio::test]
async fn connect_to_random_route() {
    let network = MemNetwork::new();
    let nodes = create_nodes(&network, 8).await;
    let origin = &nodes[0];
    let destination = &nodes[7];
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded();
    destination.set_inbound_sink(inbound_tx).await;

    let session = origin.connect_to(&destination.dht_key()).await.unwrap();
    assert_eq!(session.route().len(), origin.config().route_length + 1);
    assert_eq!(session.route()[3], destination.public_identity());

    let mut inbound = inbound_rx.next().await.unwrap();
    session.send(b"random route").await.unwrap();
    assert_eq!(inbound.next().await, Some(b"random route".to_vec()));
}

#[tokio::test]
async fn relays_do_not_link_ends() {
    let network = MemNetwork::new();
    let origin = create_node(&network).await;
    let hops = create_nodes(&network, 3).await;
    let destination = create_node(&network).await;

    let session = origin.connect_via(identities(&hops), destination.public_identity()).await.unwrap();
    session.send(b"hello").await.unwrap();

    for hop in &hops {
        let circuit_ids = hop.circuit_ids().await;
        assert_eq!(circuit_ids.len(), 1);
        let snapshot = hop.circuit_snapshot(&circuit_ids[0]).await.unwrap();
        assert!(!(snapshot.references(&origin.dht_key()) && snapshot.references(&destination.dht_key())));
        assert_eq!(snapshot.entry, None);
    }
    // every hop knows its neighbours only
    let first = hops[0].circuit_snapshot(&hops[0].circuit_ids().await[0]).await.unwrap();
    assert_eq!(first.prev_hop, origin.dht_key());
    assert_eq!(first.next.map(|next| next.node), Some(hops[1].dht_key()));
    let last = hops[2].circuit_snapshot(&hops[2].circuit_ids().await[0]).await.unwrap();
    assert_eq!(last.prev_hop, hops[1].dht_key());
    assert_eq!(last.next.map(|next| next.node), Some(destination.dht_key()));
}

#[tokio::test]
async fn data_waits_for_inbound_sink() {
    let network = MemNetwork::new();
    let origin = create_node(&network).await;
    let hops = create_nodes(&network, 3).await;
    let destination = create_node(&network).await;

    let session = origin.connect_via(identities(&hops), destination.public_identity()).await.unwrap();
    session.send(b"early").await.unwrap();
    session.send(b"bird").await.unwrap();
    assert!(!session.is_closed());

    let (inbound_tx, mut inbound_rx) = mpsc::unbounded();
    destination.set_inbound_sink(inbound_tx).await;
    let mut inbound = inbound_rx.next().await.unwrap();
    assert_eq!(inbound.circuit_id(), destination.circuit_ids().await[0]);
    assert_eq!(inbound.next().await, Some(b"early".to_vec()));
    assert_eq!(inbound.next().await, Some(b"bird".to_vec()));
}

#[tokio::test]
async fn circuit_ids_differ_per_hop() {
    let network = MemNetwork::new();
    let origin = create_node(&network).await;
    let hops = create_nodes(&network, 3).await;
    let destination = create_node(&network).await;

    let session = origin.connect_via(identities(&hops), destination.public_identity()).await.unwrap();

    let mut ids = vec![session.circuit_id()];
    for node in hops.iter().skip(1).chain(Some(&destination)) {
        ids.extend(node.circuit_ids().await);
    }
    assert_eq!(ids.len(), 4);
    for (i, id) in ids.iter().enumerate() {
        assert!(ids[i + 1 ..].iter().all(|other| other != id));
    }
}

#[tokio::test]
async fn invalid_signature_at_hop_2() {
    let network = MemNetwork::new();
    let origin = create_node(&network).await;
    let hop_0 = create_node(&network).await;
    let config = Config::default();
    let substrate = TamperingSubstrate { inner: network.endpoint(&config) };
    let hop_1 = Node::new(NodeKeys::generate(&mut thread_rng()), Arc::new(substrate), config);
    join(&network, &hop_1).await;
    let hop_2 = create_node(&network).await;
    let destination = create_node(&network).await;

    let route = vec![hop_0.public_identity(), hop_1.public_identity(), hop_2.public_identity()];
    let error = origin.connect_via(route, destination.public_identity()).await.err().unwrap();

    assert!(matches!(error, ConnectError::Extend { step: 2, .. }));
    assert_eq!(error.remote_cause(), Some(&HandleRequestError::SignatureInvalid));

    // no rollback: the admitted part of the circuit stays in place
    let hop_0_circuits = hop_0.circuit_ids().await;
    assert_eq!(hop_0_circuits.len(), 1);
    let snapshot = hop_0.circuit_snapshot(&hop_0_circuits[0]).await.unwrap();
    assert_eq!(snapshot.next.map(|next| next.node), Some(hop_1.dht_key()));
    let hop_1_circuits = hop_1.circuit_ids().await;
    assert_eq!(hop_1_circuits.len(), 1);
    let snapshot = hop_1.circuit_snapshot(&hop_1_circuits[0]).await.unwrap();
    assert_eq!(snapshot.prev_hop, hop_0.dht_key());
    assert_eq!(snapshot.next.map(|next| next.node), Some(hop_2.dht_key()));
    // the circuit wasn't admitted on the rejecting hop
    assert!(hop_2.circuit_ids().await.is_empty());
    assert!(destination.circuit_ids().await.is_empty());
}

#[tokio::test]
async fn unreachable_destination() {
    let network = MemNetwork::new();
    let nodes = create_nodes(&network, 5).await;
    let destination = DhtKey::random(&mut thread_rng());

    let error = nodes[0].connect_to(&destination).await.err().unwrap();
    assert_eq!(error, ConnectError::Route(RouteError::DestinationUnreachable(destination)));
    for node in &nodes {
        assert!(node.circuit_ids().await.is_empty());
    }
}

#[tokio::test]
async fn destination_left() {
    let network = MemNetwork::new();
    let origin = create_node(&network).await;
    let hops = create_nodes(&network, 2).await;
    let destination = create_node(&network).await;
    network.leave(&destination.dht_key()).await;

    let error = origin.connect_via(identities(&hops), destination.public_identity()).await.err().unwrap();
    assert!(matches!(error, ConnectError::Extend { step: 2, .. }));
    assert_eq!(
        error,
        ConnectError::Extend {
            step: 2,
            error: CallError::from(HandleRequestError::Forward(
                CallError::from(HandleRequestError::Forward(CallError::Unreachable(destination.dht_key())))
            )),
        }
    );
}

#[tokio::test]
async fn repeated_extension_reuses_next_hop() {
    let network = MemNetwork::new();
    let origin_keys = NodeKeys::generate(&mut thread_rng());
    network.publish_identity(&origin_keys.public()).await;
    let hop = create_node(&network).await;
    let next = create_node(&network).await;
    let endpoint = network.endpoint(&Config::default());
    let mut rng = thread_rng();

    // admit circuit on the first hop
    let circuit_id = CircuitId::random(&mut rng);
    let hop_key = LayerKey::generate(&mut rng);
    let hop_pk = hop.public_identity().box_pk;
    let request = BuildRequest::new(
        &origin_keys,
        KeyPayload { key: hop_key.clone() }.seal(&mut rng, &hop_pk),
        CircuitOriginPayload { circuit_id, origin: origin_keys.dht_key() }.seal(&mut rng, &hop_pk),
    );
    endpoint.call(&hop.dht_key(), HandlerTag::Build, request.to_vec().unwrap()).await.unwrap();

    // extend it twice with the same packet
    let packet = InnerPacket::Build(BuildPayload {
        next_hop: NextHopPayload { next_hop: next.dht_key() }.seal(&mut rng, &hop_pk),
        key: KeyPayload { key: LayerKey::generate(&mut rng) }.seal(&mut rng, &next.public_identity().box_pk),
    });
    let mut next_hops = Vec::new();
    for _ in 0 .. 2 {
        let iv = Iv::random(&mut rng);
        let ciphertext = wrap_packet(&packet, &[hop_key.clone()], &iv);
        let request = RelayRequest::new(&mut rng, &hop_pk, &SecuredHeaderPayload { circuit_id, iv }, ciphertext);
        endpoint.call(&hop.dht_key(), HandlerTag::Relay, request.to_vec().unwrap()).await.unwrap();
        next_hops.push(hop.circuit_snapshot(&circuit_id).await.unwrap().next.unwrap());
    }

    assert_eq!(next_hops[0], next_hops[1]);
    assert_eq!(next_hops[0].node, next.dht_key());
    assert_eq!(next.circuit_ids().await, vec![next_hops[0].circuit_id]);
}

#[tokio::test]
async fn send_failure_closes_session() {
    let network = MemNetwork::new();
    let origin = create_node(&network).await;
    let hops = create_nodes(&network, 3).await;
    let destination = create_node(&network).await;

    let mut session = origin.connect_via(identities(&hops), destination.public_identity()).await.unwrap();
    let (close_tx, mut close_rx) = mpsc::unbounded();
    session.set_close_sink(close_tx);
    network.leave(&hops[1].dht_key()).await;

    let error = session.send(b"lost").await.err().unwrap();
    assert!(matches!(error, SendError::Call(_)));
    assert!(session.is_closed());
    assert_eq!(close_rx.next().await, Some(destination.dht_key()));

    assert_eq!(session.send(b"after close").await, Err(SendError::Closed));
    // relays are not torn down
    assert_eq!(hops[0].circuit_ids().await.len(), 1);
    assert_eq!(hops[2].circuit_ids().await.len(), 1);
}

#[tokio::test]
async fn inbound_sessions_are_independent() {
    let network = MemNetwork::new();
    let first_origin = create_node(&network).await;
    let second_origin = create_node(&network).await;
    let hops = create_nodes(&network, 2).await;
    let destination = create_node(&network).await;
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded();
    destination.set_inbound_sink(inbound_tx).await;

    let first = first_origin.connect_via(identities(&hops), destination.public_identity()).await.unwrap();
    let mut first_inbound = inbound_rx.next().await.unwrap();
    let second = second_origin.connect_via(identities(&hops), destination.public_identity()).await.unwrap();
    let mut second_inbound = inbound_rx.next().await.unwrap();

    assert_eq!(first_inbound.entry(), first_origin.dht_key());
    assert_eq!(second_inbound.entry(), second_origin.dht_key());
    assert_ne!(first_inbound.circuit_id(), second_inbound.circuit_id());

    second.send(b"second").await.unwrap();
    first.send(b"first").await.unwrap();
    assert_eq!(first_inbound.next().await, Some(b"first".to_vec()));
    assert_eq!(second_inbound.next().await, Some(b"second".to_vec()));
}
