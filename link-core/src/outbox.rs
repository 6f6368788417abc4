//! Outbox for accepted sends.
//!
//! This module provides a bounded queue between `PeerLink::send` and the
//! delivery worker with:
//! - FIFO ordering for delivery
//! - Most-recent-wins for control messages (only one is ever queued)
//! - Eviction of the oldest metric when full, since only the latest
//!   sample matters for live display
//!
//! Every accepted message gets a [`SendTicket`] so that the asynchronous
//! delivery outcome can be correlated with the original call.

use std::collections::VecDeque;
use std::fmt;
use wristlink_types::PayloadKind;

/// Identifier of one accepted send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SendTicket(u64);

impl fmt::Display for SendTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An encoded message waiting for the delivery worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedSend {
    /// Ticket handed back to the sender.
    pub ticket: SendTicket,
    /// Routing class of the payload.
    pub kind: PayloadKind,
    /// Encoded message bytes.
    pub payload: Vec<u8>,
}

/// What happened to the queue when a message was pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended without touching anything else.
    Queued,
    /// Replaced a queued control message.
    Superseded {
        /// Ticket of the control message that will never be sent.
        replaced: SendTicket,
    },
    /// The queue was full; one entry was dropped to make room.
    Evicted {
        /// Ticket of the dropped message (may be the one just pushed).
        dropped: SendTicket,
    },
}

/// Bounded outbox.
#[derive(Debug)]
pub struct Outbox {
    capacity: usize,
    queue: VecDeque<QueuedSend>,
    next_ticket: u64,
}

impl Outbox {
    /// Create an outbox holding at most `capacity` messages (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            queue: VecDeque::with_capacity(capacity),
            next_ticket: 1,
        }
    }

    /// Queue an encoded message and return its ticket.
    pub fn push(&mut self, kind: PayloadKind, payload: Vec<u8>) -> (SendTicket, PushOutcome) {
        let ticket = SendTicket(self.next_ticket);
        self.next_ticket += 1;
        let item = QueuedSend {
            ticket,
            kind,
            payload,
        };

        if kind == PayloadKind::Control {
            if let Some(slot) = self.queue.iter_mut().find(|q| q.kind == PayloadKind::Control) {
                let replaced = slot.ticket;
                *slot = item;
                return (ticket, PushOutcome::Superseded { replaced });
            }
        }

        if self.queue.len() < self.capacity {
            self.queue.push_back(item);
            return (ticket, PushOutcome::Queued);
        }

        // Full: the oldest metric goes. A metric never displaces the control
        // message, so with nothing else to drop the new metric is discarded.
        match self.queue.iter().position(|q| q.kind == PayloadKind::Metric) {
            Some(index) => {
                let dropped = self.queue.remove(index).map(|q| q.ticket).unwrap_or(ticket);
                self.queue.push_back(item);
                (ticket, PushOutcome::Evicted { dropped })
            }
            None => (ticket, PushOutcome::Evicted { dropped: ticket }),
        }
    }

    /// Remove and return the next message to deliver.
    pub fn pop(&mut self) -> Option<QueuedSend> {
        self.queue.pop_front()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop everything, returning the tickets that will never be sent.
    pub fn clear(&mut self) -> Vec<SendTicket> {
        self.queue.drain(..).map(|q| q.ticket).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(outbox: &mut Outbox, byte: u8) -> (SendTicket, PushOutcome) {
        outbox.push(PayloadKind::Metric, vec![byte])
    }

    fn control(outbox: &mut Outbox, byte: u8) -> (SendTicket, PushOutcome) {
        outbox.push(PayloadKind::Control, vec![byte])
    }

    #[test]
    fn outbox_queues_messages() {
        let mut outbox = Outbox::new(8);
        let (_, outcome) = metric(&mut outbox, 1);

        assert_eq!(outcome, PushOutcome::Queued);
        assert_eq!(outbox.len(), 1);
    }

    #[test]
    fn tickets_increase() {
        let mut outbox = Outbox::new(8);
        let (a, _) = metric(&mut outbox, 1);
        let (b, _) = control(&mut outbox, 2);
        assert!(b > a);
        assert_eq!(a.to_string(), "#1");
    }

    #[test]
    fn outbox_pops_in_order() {
        let mut outbox = Outbox::new(8);
        metric(&mut outbox, 1);
        metric(&mut outbox, 2);

        assert_eq!(outbox.pop().unwrap().payload, vec![1]);
        assert_eq!(outbox.pop().unwrap().payload, vec![2]);
        assert!(outbox.pop().is_none());
    }

    // ===========================================
    // Control coalescing
    // ===========================================

    #[test]
    fn newer_control_replaces_queued_control() {
        let mut outbox = Outbox::new(8);
        let (first, _) = control(&mut outbox, 1);
        metric(&mut outbox, 9);
        let (second, outcome) = control(&mut outbox, 0);

        assert_eq!(outcome, PushOutcome::Superseded { replaced: first });
        assert_eq!(outbox.len(), 2);

        let head = outbox.pop().unwrap();
        assert_eq!(head.ticket, second);
        assert_eq!(head.payload, vec![0]);
    }

    #[test]
    fn control_after_delivery_is_queued_again() {
        let mut outbox = Outbox::new(8);
        control(&mut outbox, 1);
        outbox.pop();

        let (_, outcome) = control(&mut outbox, 0);
        assert_eq!(outcome, PushOutcome::Queued);
    }

    // ===========================================
    // Capacity
    // ===========================================

    #[test]
    fn full_outbox_evicts_oldest_metric() {
        let mut outbox = Outbox::new(2);
        let (oldest, _) = metric(&mut outbox, 1);
        metric(&mut outbox, 2);
        let (_, outcome) = metric(&mut outbox, 3);

        assert_eq!(outcome, PushOutcome::Evicted { dropped: oldest });
        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox.pop().unwrap().payload, vec![2]);
        assert_eq!(outbox.pop().unwrap().payload, vec![3]);
    }

    #[test]
    fn control_evicts_metric_not_itself() {
        let mut outbox = Outbox::new(2);
        let (oldest, _) = metric(&mut outbox, 1);
        metric(&mut outbox, 2);
        let (ticket, outcome) = control(&mut outbox, 7);

        assert_eq!(outcome, PushOutcome::Evicted { dropped: oldest });
        assert!(std::iter::from_fn(|| outbox.pop()).any(|q| q.ticket == ticket));
    }

    #[test]
    fn metric_never_displaces_control() {
        let mut outbox = Outbox::new(1);
        let (ctl, _) = control(&mut outbox, 1);
        let (ticket, outcome) = metric(&mut outbox, 2);

        assert_eq!(outcome, PushOutcome::Evicted { dropped: ticket });
        assert_eq!(outbox.pop().unwrap().ticket, ctl);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut outbox = Outbox::new(0);
        let (first, _) = metric(&mut outbox, 1);
        let (_, outcome) = metric(&mut outbox, 2);

        assert_eq!(outcome, PushOutcome::Evicted { dropped: first });
        assert_eq!(outbox.len(), 1);
    }

    #[test]
    fn clear_returns_undelivered_tickets() {
        let mut outbox = Outbox::new(4);
        let (a, _) = metric(&mut outbox, 1);
        let (b, _) = control(&mut outbox, 1);

        assert_eq!(outbox.clear(), vec![a, b]);
        assert!(outbox.is_empty());
    }
}
