//! In-process group transport
//!
//! A [`MemoryHub`] plays the role of the multicast group for nodes living in
//! one process: every datagram sent by a member is delivered to all current
//! members, sender included. A drop filter can simulate lossy links.

use super::{NetworkEvent, Transport};
use crate::{Error, Result};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Decides whether a datagram to `recipient` is lost
type DropFilter = Box<dyn Fn(&str, &[u8]) -> bool + Send>;

struct Member {
    id: u64,
    name: String,
    tx: mpsc::UnboundedSender<NetworkEvent>,
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    members: Vec<Member>,
    drop_filter: Option<DropFilter>,
    dropped: u64,
}

/// Shared in-memory broadcast group
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

/// One member's handle on a [`MemoryHub`]
pub struct MemoryTransport {
    id: u64,
    name: String,
    hub: Arc<Mutex<HubInner>>,
    closed: AtomicBool,
}

fn lock(inner: &Mutex<HubInner>) -> MutexGuard<'_, HubInner> {
    // A panicking test thread must not wedge the other members
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member. `name` is reported as the datagram source.
    pub fn join(&self, name: impl Into<String>) -> (MemoryTransport, mpsc::UnboundedReceiver<NetworkEvent>) {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.members.push(Member {
            id,
            name: name.clone(),
            tx,
        });

        let transport = MemoryTransport {
            id,
            name,
            hub: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        };
        (transport, rx)
    }

    /// Install a filter returning `true` for deliveries that should be lost
    pub fn set_drop_filter<F>(&self, filter: F)
    where
        F: Fn(&str, &[u8]) -> bool + Send + 'static,
    {
        lock(&self.inner).drop_filter = Some(Box::new(filter));
    }

    pub fn clear_drop_filter(&self) {
        lock(&self.inner).drop_filter = None;
    }

    /// Number of deliveries lost to the drop filter so far
    pub fn dropped(&self) -> u64 {
        lock(&self.inner).dropped
    }

    pub fn member_count(&self) -> usize {
        lock(&self.inner).members.len()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, data: Bytes) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Network(format!("Transport for {} is closed", self.name)));
        }

        let mut inner = lock(&self.hub);
        inner.members.retain(|m| !m.tx.is_closed());

        let mut dropped = 0;
        for member in &inner.members {
            let lost = inner
                .drop_filter
                .as_ref()
                .map(|filter| filter(&member.name, &data))
                .unwrap_or(false);
            if lost {
                dropped += 1;
                continue;
            }
            let _ = member.tx.send(NetworkEvent::Datagram {
                data: data.clone(),
                source: self.name.clone(),
            });
        }
        inner.dropped += dropped;

        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        lock(&self.hub).members.retain(|m| m.id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(event: NetworkEvent) -> (Bytes, String) {
        let NetworkEvent::Datagram { data, source } = event;
        (data, source)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone_including_sender() {
        let hub = MemoryHub::new();
        let (a, mut a_rx) = hub.join("a");
        let (_b, mut b_rx) = hub.join("b");

        a.send(Bytes::from_static(b"hello")).unwrap();

        let (data, source) = payload(a_rx.recv().await.unwrap());
        assert_eq!(&data[..], b"hello");
        assert_eq!(source, "a");
        let (data, _) = payload(b_rx.recv().await.unwrap());
        assert_eq!(&data[..], b"hello");
    }

    #[tokio::test]
    async fn test_drop_filter_loses_deliveries() {
        let hub = MemoryHub::new();
        let (a, _a_rx) = hub.join("a");
        let (_b, mut b_rx) = hub.join("b");

        hub.set_drop_filter(|recipient, _| recipient == "b");
        a.send(Bytes::from_static(b"lost")).unwrap();
        assert_eq!(hub.dropped(), 1);
        assert!(b_rx.try_recv().is_err());

        hub.clear_drop_filter();
        a.send(Bytes::from_static(b"kept")).unwrap();
        let (data, _) = payload(b_rx.recv().await.unwrap());
        assert_eq!(&data[..], b"kept");
    }

    #[tokio::test]
    async fn test_closed_transport_leaves_group() {
        let hub = MemoryHub::new();
        let (a, _a_rx) = hub.join("a");
        let (b, _b_rx) = hub.join("b");
        assert_eq!(hub.member_count(), 2);

        b.close();
        assert_eq!(hub.member_count(), 1);
        assert!(b.send(Bytes::from_static(b"x")).is_err());
        assert!(a.send(Bytes::from_static(b"y")).is_ok());
    }
}
