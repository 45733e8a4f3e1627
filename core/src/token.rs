//! Token-based mutual exclusion
//!
//! Only the node holding the token may originate chat. Requests are
//! broadcast to the whole group; the holder queues them in arrival order and
//! serves the front of the queue when it releases. The rest of the queue
//! travels inside the grant so the next holder keeps serving in the same order.
//!
//! A holder with an empty queue keeps the token indefinitely, and a lost
//! grant is never detected: the requester simply waits. Both are known
//! limitations of the protocol.
//!
//! These functions only mutate [`NodeState`] and return the messages to
//! broadcast; the caller owns the transport and the state lock.

use crate::message::Message;
use crate::state::NodeState;
use crate::types::{NodeId, TokenState};
use crate::{Error, Result};

/// Result of a local token request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Broadcast this TOKEN_REQUEST
    Broadcast(Message),
    /// This node already holds the token, nothing to send
    AlreadyHolding,
}

/// Effect of an incoming token message on this node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    /// A request was added to our queue (1-based position)
    Queued { from: NodeId, position: usize },
    /// The token was handed to us
    Acquired { from: NodeId },
    /// Not addressed to us, not holding, duplicate, or our own echo
    Ignored,
}

/// Ask the group for the token.
///
/// Safe to call repeatedly; holders ignore requesters already queued.
pub fn request_token(state: &mut NodeState) -> RequestOutcome {
    if state.has_token() {
        return RequestOutcome::AlreadyHolding;
    }

    state.token = TokenState::Requesting;
    let timestamp = state.next_timestamp();
    RequestOutcome::Broadcast(Message::token_request(state.node_id().clone(), timestamp))
}

/// Handle TOKEN_REQUEST from `from`. Only the holder queues requests.
pub fn on_request(state: &mut NodeState, from: &NodeId) -> TokenEvent {
    if !state.has_token() || from == state.node_id() {
        return TokenEvent::Ignored;
    }

    if state.queue.push(from.clone()) {
        TokenEvent::Queued {
            from: from.clone(),
            position: state.queue.len(),
        }
    } else {
        TokenEvent::Ignored
    }
}

/// Handle TOKEN_GRANT. Takes the token if `recipient` is us, whatever
/// state we were in, and adopts the forwarded queue.
pub fn on_grant(state: &mut NodeState, from: &NodeId, recipient: &NodeId, forwarded: &[NodeId]) -> TokenEvent {
    if recipient != state.node_id() {
        return TokenEvent::Ignored;
    }

    let stale = state.queue.take();
    for id in forwarded.iter().cloned().chain(stale) {
        if &id != state.node_id() {
            state.queue.push(id);
        }
    }
    state.token = TokenState::Holding;

    TokenEvent::Acquired { from: from.clone() }
}

/// Dispatch an incoming TOKEN_REQUEST or TOKEN_GRANT
pub fn handle_message(state: &mut NodeState, message: &Message) -> TokenEvent {
    match message {
        Message::TokenRequest { sender_id, .. } => on_request(state, sender_id),
        Message::TokenGrant {
            sender_id,
            recipient_id,
            queue,
            ..
        } => on_grant(state, sender_id, recipient_id, queue),
        _ => TokenEvent::Ignored,
    }
}

/// Pass the token to the front of the queue.
///
/// Returns the TOKEN_GRANT to broadcast. With an empty queue the holder
/// keeps the token and `None` is returned; a non-holder always gets `None`.
pub fn release_token(state: &mut NodeState) -> Option<Message> {
    if !state.has_token() {
        return None;
    }

    let next = state.queue.pop_front()?;
    let remaining = state.queue.take();
    state.token = TokenState::Waiting;

    let timestamp = state.next_timestamp();
    Some(Message::token_grant(
        state.node_id().clone(),
        next,
        remaining,
        timestamp,
    ))
}

/// Refuse to originate chat unless we hold the token
pub fn ensure_holding(state: &NodeState) -> Result<()> {
    if state.has_token() {
        Ok(())
    } else {
        Err(Error::NotTokenHolder(state.node_id().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holder(id: &str) -> NodeState {
        NodeState::new(NodeId::new(id), true)
    }

    fn waiter(id: &str) -> NodeState {
        NodeState::new(NodeId::new(id), false)
    }

    fn grant_parts(message: &Message) -> (NodeId, NodeId, Vec<NodeId>) {
        match message {
            Message::TokenGrant {
                sender_id,
                recipient_id,
                queue,
                ..
            } => (sender_id.clone(), recipient_id.clone(), queue.clone()),
            other => panic!("expected a grant, got {:?}", other),
        }
    }

    #[test]
    fn test_request_moves_to_requesting_and_is_repeatable() {
        let mut b = waiter("b");
        let first = request_token(&mut b);
        assert!(matches!(first, RequestOutcome::Broadcast(Message::TokenRequest { .. })));
        assert_eq!(b.token(), TokenState::Requesting);

        let second = request_token(&mut b);
        assert!(matches!(second, RequestOutcome::Broadcast(_)));
        assert_eq!(b.token(), TokenState::Requesting);
    }

    #[test]
    fn test_holder_does_not_request() {
        let mut a = holder("a");
        assert_eq!(request_token(&mut a), RequestOutcome::AlreadyHolding);
        assert!(a.has_token());
    }

    #[test]
    fn test_holder_queues_requests_once() {
        let mut a = holder("a");
        let b = NodeId::new("b");
        assert_eq!(
            on_request(&mut a, &b),
            TokenEvent::Queued { from: b.clone(), position: 1 }
        );
        assert_eq!(on_request(&mut a, &b), TokenEvent::Ignored);
        assert_eq!(a.queue().len(), 1);
    }

    #[test]
    fn test_holder_ignores_own_request() {
        let mut a = holder("a");
        let own = a.node_id().clone();
        assert_eq!(on_request(&mut a, &own), TokenEvent::Ignored);
        assert!(a.queue().is_empty());
    }

    #[test]
    fn test_non_holder_ignores_requests() {
        let mut c = waiter("c");
        assert_eq!(on_request(&mut c, &NodeId::new("b")), TokenEvent::Ignored);
        assert!(c.queue().is_empty());
    }

    #[test]
    fn test_release_with_empty_queue_keeps_token() {
        let mut a = holder("a");
        assert!(release_token(&mut a).is_none());
        assert!(a.has_token());
    }

    #[test]
    fn test_release_without_token_is_noop() {
        let mut b = waiter("b");
        b.queue.push(NodeId::new("c"));
        assert!(release_token(&mut b).is_none());
        assert_eq!(b.queue().len(), 1);
    }

    #[test]
    fn test_grants_follow_arrival_order() {
        let mut a = holder("a");
        for id in ["b", "c", "d"] {
            on_request(&mut a, &NodeId::new(id));
        }

        let grant = release_token(&mut a).unwrap();
        let (_, recipient, queue) = grant_parts(&grant);
        assert_eq!(recipient, NodeId::new("b"));
        assert_eq!(queue, vec![NodeId::new("c"), NodeId::new("d")]);
        assert_eq!(a.token(), TokenState::Waiting);
        assert!(a.queue().is_empty());
    }

    #[test]
    fn test_grant_for_someone_else_is_ignored() {
        let mut c = waiter("c");
        let event = on_grant(&mut c, &NodeId::new("a"), &NodeId::new("b"), &[]);
        assert_eq!(event, TokenEvent::Ignored);
        assert_eq!(c.token(), TokenState::Waiting);
    }

    #[test]
    fn test_grant_taken_from_any_state() {
        for initial in [TokenState::Waiting, TokenState::Requesting] {
            let mut b = waiter("b");
            b.token = initial;
            let event = on_grant(&mut b, &NodeId::new("a"), &NodeId::new("b"), &[]);
            assert_eq!(event, TokenEvent::Acquired { from: NodeId::new("a") });
            assert!(b.has_token());
        }
    }

    #[test]
    fn test_adopted_queue_never_contains_self() {
        let mut b = waiter("b");
        let forwarded = vec![NodeId::new("c"), NodeId::new("b"), NodeId::new("c")];
        on_grant(&mut b, &NodeId::new("a"), &NodeId::new("b"), &forwarded);
        assert_eq!(b.queue().to_vec(), vec![NodeId::new("c")]);
    }

    #[test]
    fn test_send_requires_token() {
        let b = waiter("b");
        assert!(matches!(ensure_holding(&b), Err(Error::NotTokenHolder(id)) if id == NodeId::new("b")));
        assert!(ensure_holding(&holder("a")).is_ok());
    }

    /// Holder A hears B then C, sends, releases to B; B releases to C.
    #[test]
    fn test_token_passes_b_then_c() {
        let mut a = holder("a");
        let mut b = waiter("b");
        let mut c = waiter("c");

        let request_b = Message::token_request(NodeId::new("b"), 100);
        let request_c = Message::token_request(NodeId::new("c"), 105);
        for node in [&mut a, &mut b, &mut c] {
            handle_message(node, &request_b);
            handle_message(node, &request_c);
        }
        assert!(ensure_holding(&a).is_ok());

        let grant_to_b = release_token(&mut a).unwrap();
        assert_eq!(grant_parts(&grant_to_b).1, NodeId::new("b"));
        for node in [&mut a, &mut b, &mut c] {
            handle_message(node, &grant_to_b);
        }
        assert!(!a.has_token());
        assert!(b.has_token());
        assert!(!c.has_token());

        let grant_to_c = release_token(&mut b).unwrap();
        assert_eq!(grant_parts(&grant_to_c).1, NodeId::new("c"));
        for node in [&mut a, &mut b, &mut c] {
            handle_message(node, &grant_to_c);
        }
        assert!(c.has_token());
        assert!(!a.has_token() && !b.has_token());
    }
}
