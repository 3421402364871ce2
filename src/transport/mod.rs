//! Transport adapter (C2): topic-prefixed framing over brokerless PUB/SUB
//! and PUSH/PULL sockets, grounded on the ØMQ non-blocking receive pattern
//! in `original_source/src/socket_functions.cpp`.
//!
//! Every send is atomic: topic and payload leave as one message with the
//! space separator embedded, never as a multipart frame. Receives never
//! block; the caller's tick loop polls `recv_nonblocking`.

use std::time::Duration;

use thiserror::Error;

use crate::wire::topic::{self, TopicError};

/// Delay mandated between a bind and the stage's first publication, so late
/// subscribers have time to connect and register their subscription before
/// anything is sent (PUB/SUB has no retained-message semantics).
pub const SLOW_JOINER_WAIT: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("zmq error: {0}")]
    Zmq(#[from] zmq::Error),
    #[error("topic framing error: {0}")]
    Topic(#[from] TopicError),
}

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketRole {
    Pub,
    Sub,
    Push,
    Pull,
}

impl SocketRole {
    fn zmq_type(self) -> zmq::SocketType {
        match self {
            SocketRole::Pub => zmq::PUB,
            SocketRole::Sub => zmq::SUB,
            SocketRole::Push => zmq::PUSH,
            SocketRole::Pull => zmq::PULL,
        }
    }
}

/// A bound or connected ØMQ socket plus the role it plays in the pipeline.
pub struct Socket {
    inner: zmq::Socket,
    role: SocketRole,
}

impl Socket {
    /// Binds a new socket of the given role (used by publishers and PULL
    /// command intakes, the passive side of the connection).
    pub fn bind(ctx: &zmq::Context, role: SocketRole, address: &str) -> TransportResult<Self> {
        let inner = ctx.socket(role.zmq_type())?;
        inner.bind(address)?;
        Ok(Self { inner, role })
    }

    /// Connects to an existing bound socket (used by subscribers and PUSH
    /// command senders, the active side of the connection).
    pub fn connect(ctx: &zmq::Context, role: SocketRole, address: &str) -> TransportResult<Self> {
        let inner = ctx.socket(role.zmq_type())?;
        inner.connect(address)?;
        Ok(Self { inner, role })
    }

    /// Subscribes a SUB socket to a topic prefix. No-op contract violation
    /// to call this on a non-SUB socket is caught with a panic in debug
    /// builds via the role assertion below.
    pub fn subscribe(&self, topic_prefix: &str) -> TransportResult<()> {
        debug_assert_eq!(self.role, SocketRole::Sub, "subscribe is SUB-only");
        self.inner.set_subscribe(topic_prefix.as_bytes())?;
        Ok(())
    }

    /// Sends `payload` under `topic` as one atomic message.
    pub fn send(&self, topic: &str, payload: &[u8]) -> TransportResult<()> {
        let envelope = topic::build_envelope(topic, payload);
        self.inner.send(envelope, 0)?;
        Ok(())
    }

    /// Polls for one message without blocking. Returns `None` immediately
    /// if nothing is queued; never suspends the caller.
    pub fn recv_nonblocking(&self) -> TransportResult<Option<(String, Vec<u8>)>> {
        match self.inner.recv_bytes(zmq::DONTWAIT) {
            Ok(bytes) => {
                let (topic, payload) = topic::split_envelope(&bytes)?;
                Ok(Some((topic.to_string(), payload.to_vec())))
            }
            Err(zmq::Error::EAGAIN) => Ok(None),
            Err(e) => Err(TransportError::Zmq(e)),
        }
    }

    pub fn role(&self) -> SocketRole {
        self.role
    }
}

/// Rewrites a bind address's wildcard host (`tcp://*:port`) into a concrete
/// host a subscriber can connect to verbatim: a status message publishing
/// its own address must not leak `*`.
pub fn publishable_address(bind_address: &str, advertise_host: &str) -> String {
    bind_address.replacen("://*:", &format!("://{advertise_host}:"), 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishable_address_replaces_wildcard_host() {
        assert_eq!(
            publishable_address("tcp://*:16180", "127.0.0.1"),
            "tcp://127.0.0.1:16180"
        );
    }

    #[test]
    fn publishable_address_leaves_concrete_host_alone() {
        assert_eq!(
            publishable_address("tcp://192.168.1.5:16180", "127.0.0.1"),
            "tcp://192.168.1.5:16180"
        );
    }

    #[test]
    fn pub_sub_roundtrip_over_inproc() {
        let ctx = zmq::Context::new();
        let publisher = Socket::bind(&ctx, SocketRole::Pub, "inproc://transport-test").unwrap();
        let subscriber = Socket::connect(&ctx, SocketRole::Sub, "inproc://transport-test").unwrap();
        subscriber.subscribe("data_x").unwrap();

        // inproc PUB/SUB has no real slow-joiner race in this single-threaded
        // test since both ends exist before the first send, but we still
        // sleep briefly to mirror the real-world bind/subscribe/publish order.
        std::thread::sleep(std::time::Duration::from_millis(10));

        publisher.send("data_x_events_v0_s4", &[1, 2, 3, 4]).unwrap();

        let mut received = None;
        for _ in 0..50 {
            if let Some(msg) = subscriber.recv_nonblocking().unwrap() {
                received = Some(msg);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let (topic, payload) = received.expect("message should have arrived");
        assert_eq!(topic, "data_x_events_v0_s4");
        assert_eq!(payload, vec![1, 2, 3, 4]);
    }

    #[test]
    fn recv_nonblocking_returns_none_when_idle() {
        let ctx = zmq::Context::new();
        let subscriber = Socket::bind(&ctx, SocketRole::Pull, "inproc://transport-idle").unwrap();
        assert!(subscriber.recv_nonblocking().unwrap().is_none());
    }
}
