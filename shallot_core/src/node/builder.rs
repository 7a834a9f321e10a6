/*! Originator side of circuits: route selection and telescoping build.
*/

use futures::future;
use rand::thread_rng;

use shallot_crypto::*;
use shallot_packet::*;
use shallot_packet::onion::*;

use crate::errors::*;
use crate::node::Node;
use crate::node::session::Session;
use crate::substrate::HandlerTag;

impl Node {
    /** Choose route to `destination`.

    Waypoints are successors of random keys so that the originator can't pick
    them. The destination must be exactly the node owning `destination` key.
    Returns `route_length` waypoints followed by the destination.
    */
    pub async fn create_route_to(&self, destination: &DhtKey) -> Result<Vec<PublicIdentity>, RouteError> {
        let waypoints = (0 .. self.config.route_length)
            .map(|_| self.resolve_waypoint(destination))
            .collect::<Vec<_>>();

        let (mut route, destination) = futures::try_join!(
            future::try_join_all(waypoints),
            self.resolve_destination(destination),
        )?;
        route.push(destination);
        Ok(route)
    }

    /// Resolve successor of a random key. Ends of the route are skipped by
    /// moving to the next node on the ring unless there is no other node.
    async fn resolve_waypoint(&self, destination: &DhtKey) -> Result<PublicIdentity, RouteError> {
        let own_key = self.dht_key();
        let is_end = |node: &DhtKey| *node == own_key || node == destination;

        let key = DhtKey::random(&mut thread_rng());
        let mut node = self.substrate.find_successor(&key).await
            .map_err(RouteError::Call)?;
        // at most two nodes have to be skipped
        for _ in 0 .. 2 {
            if !is_end(&node) {
                break;
            }
            node = self.substrate.find_successor(&node.next()).await
                .map_err(RouteError::Call)?;
        }
        if is_end(&node) {
            debug!("No waypoint on the way to {} except the ends", destination);
        }

        self.directory.resolve(&node).await
            .map_err(RouteError::Lookup)
    }

    async fn resolve_destination(&self, destination: &DhtKey) -> Result<PublicIdentity, RouteError> {
        let node = self.substrate.find_successor(destination).await
            .map_err(RouteError::Call)?;
        if node != *destination {
            return Err(RouteError::DestinationUnreachable(*destination));
        }
        self.directory.resolve(destination).await
            .map_err(RouteError::Lookup)
    }

    /// Build circuit to `destination` through random waypoints.
    pub async fn connect_to(&self, destination: &DhtKey) -> Result<Session, ConnectError> {
        let mut route = self.create_route_to(destination).await
            .map_err(ConnectError::Route)?;
        let destination = route.pop()
            .ok_or(ConnectError::Route(RouteError::DestinationUnreachable(*destination)))?;
        self.connect_via(route, destination).await
    }

    /** Build circuit to `destination` through the given waypoints.

    Every step waits for the acknowledgement of the previous one. The first
    failed step fails the whole build; hops admitted before it keep their
    circuit states.
    */
    pub async fn connect_via(&self, waypoints: Vec<PublicIdentity>, destination: PublicIdentity) -> Result<Session, ConnectError> {
        let mut route = waypoints;
        route.push(destination);

        let (keys, circuit_id) = {
            let mut rng = thread_rng();
            let keys = route.iter().map(|_| LayerKey::generate(&mut rng)).collect::<Vec<_>>();
            (keys, CircuitId::random(&mut rng))
        };

        let request = {
            let mut rng = thread_rng();
            let entry_pk = &route[0].box_pk;
            let wrapped_key = KeyPayload { key: keys[0].clone() }.seal(&mut rng, entry_pk);
            let wrapped_circuit = CircuitOriginPayload { circuit_id, origin: self.dht_key() }.seal(&mut rng, entry_pk);
            BuildRequest::new(&self.keys, wrapped_key, wrapped_circuit)
        };
        let params = request.to_vec()
            .expect("BuildRequest has fixed size");
        debug!("Building circuit {} via {}", circuit_id, route[0].dht_key());
        self.substrate.call(&route[0].dht_key(), HandlerTag::Build, params).await
            .map_err(ConnectError::Build)?;

        for step in 1 .. route.len() {
            let packet = {
                let mut rng = thread_rng();
                InnerPacket::Build(BuildPayload {
                    next_hop: NextHopPayload { next_hop: route[step].dht_key() }.seal(&mut rng, &route[step - 1].box_pk),
                    key: KeyPayload { key: keys[step].clone() }.seal(&mut rng, &route[step].box_pk),
                })
            };
            debug!("Extending circuit {} to {}", circuit_id, route[step].dht_key());
            self.send_onion(&route[0], circuit_id, &keys[.. step], &packet).await
                .map_err(|error| ConnectError::Extend { step, error })?;
        }

        let packet = InnerPacket::Finish(FinishPayload { origin: self.dht_key() });
        self.send_onion(&route[0], circuit_id, &keys, &packet).await
            .map_err(ConnectError::Finish)?;

        info!("Established circuit {} to {}", circuit_id, route[route.len() - 1].dht_key());
        Ok(Session::new(self.clone(), route, keys, circuit_id))
    }

    /// Wrap `packet` with `keys` and send it along the circuit starting at
    /// `entry`.
    pub(crate) async fn send_onion(
        &self,
        entry: &PublicIdentity,
        circuit_id: CircuitId,
        keys: &[LayerKey],
        packet: &InnerPacket
    ) -> Result<Vec<u8>, CallError> {
        let request = {
            let mut rng = thread_rng();
            let iv = Iv::random(&mut rng);
            let ciphertext = wrap_packet(packet, keys, &iv);
            RelayRequest::new(&mut rng, &entry.box_pk, &SecuredHeaderPayload { circuit_id, iv }, ciphertext)
        };
        let params = request.to_vec()
            .expect("RelayRequest buffer is sized by its ciphertext");
        self.substrate.call(&entry.dht_key(), HandlerTag::Relay, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::Config;
    use crate::mem_network::MemNetwork;

    async fn create_node(network: &MemNetwork) -> Node {
        let keys = NodeKeys::generate(&mut thread_rng());
        let config = Config::default();
        let node = Node::new(keys, Arc::new(network.endpoint(&config)), config);
        network.publish_identity(&node.public_identity()).await;
        network.join(node.dht_key(), Arc::new(node.clone())).await;
        node
    }

    #[tokio::test]
    async fn create_route_to() {
        let network = MemNetwork::new();
        let mut nodes = Vec::new();
        for _ in 0 .. 5 {
            nodes.push(create_node(&network).await);
        }
        let destination = nodes[4].public_identity();

        let route = nodes[0].create_route_to(&destination.dht_key()).await.unwrap();
        assert_eq!(route.len(), 4);
        assert_eq!(route[3], destination);
        let members = nodes.iter().map(|node| node.public_identity()).collect::<Vec<_>>();
        assert!(route.iter().all(|identity| members.contains(identity)));
        assert!(route[.. 3].iter().all(|identity| *identity != destination && *identity != nodes[0].public_identity()));
    }

    #[tokio::test]
    async fn create_route_to_skips_ends() {
        let network = MemNetwork::new();
        let origin = create_node(&network).await;
        let waypoint = create_node(&network).await;
        let destination = create_node(&network).await;

        for _ in 0 .. 10 {
            let route = origin.create_route_to(&destination.dht_key()).await.unwrap();
            assert_eq!(route.len(), 4);
            assert!(route[.. 3].iter().all(|identity| *identity == waypoint.public_identity()));
        }
    }

    #[tokio::test]
    async fn create_route_to_only_ends() {
        let network = MemNetwork::new();
        let origin = create_node(&network).await;
        let destination = create_node(&network).await;

        let route = origin.create_route_to(&destination.dht_key()).await.unwrap();
        assert_eq!(route.len(), 4);
        assert_eq!(route[3], destination.public_identity());
    }

    #[tokio::test]
    async fn create_route_to_unreachable() {
        let network = MemNetwork::new();
        let node = create_node(&network).await;
        create_node(&network).await;
        let destination = DhtKey::random(&mut thread_rng());

        let res = node.create_route_to(&destination).await;
        assert_eq!(res, Err(RouteError::DestinationUnreachable(destination)));
    }

    #[tokio::test]
    async fn create_route_to_unpublished() {
        let network = MemNetwork::new();
        let node = create_node(&network).await;
        let keys = NodeKeys::generate(&mut thread_rng());
        let hidden = Node::new(keys, Arc::new(network.endpoint(&Config::default())), Config::default());
        network.join(hidden.dht_key(), Arc::new(hidden.clone())).await;

        let res = node.create_route_to(&hidden.dht_key()).await;
        assert!(matches!(res, Err(RouteError::Lookup(_))));
    }

    #[tokio::test]
    async fn connect_via_first_hop_gone() {
        let network = MemNetwork::new();
        let node = create_node(&network).await;
        let first = create_node(&network).await;
        let destination = create_node(&network).await;
        network.leave(&first.dht_key()).await;

        let res = node.connect_via(vec![first.public_identity()], destination.public_identity()).await;
        assert_eq!(res.err(), Some(ConnectError::Build(CallError::Unreachable(first.dht_key()))));
    }
}
