//! Unidirectional, non-blocking queues between the worker and the controller.
//!
//! Both directions are single-producer/single-consumer from the loops' point of view;
//! senders are cloneable so bootstrap can inject `Close` on interrupts.

use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::msg::{Command, Event};

pub type CommandSender = Sender<Command>;
pub type CommandReceiver = Receiver<Command>;
pub type EventSender = Sender<Event>;
pub type EventReceiver = Receiver<Event>;

/// Creates the controller -> worker queue.
pub fn command_channel() -> (CommandSender, CommandReceiver) {
    channel()
}

/// Creates the worker -> controller queue.
pub fn event_channel() -> (EventSender, EventReceiver) {
    channel()
}

fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Sender { tx },
        Receiver {
            rx,
            disconnected: false,
        },
    )
}

/// Producing end. Never blocks.
#[derive(Debug)]
pub struct Sender<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Sender<T> {
    /// Enqueues a message.
    ///
    /// # Returns
    /// `false` if the consuming loop is gone and the message was dropped.
    pub fn send(&self, msg: T) -> bool {
        self.tx.send(msg).is_ok()
    }
}

/// Consuming end.
#[derive(Debug)]
pub struct Receiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
    disconnected: bool,
}

impl<T> Receiver<T> {
    /// Takes the messages queued right now, in order, without ever waiting.
    ///
    /// The amount is sampled once when the drain starts, so a fast producer cannot
    /// keep the consumer inside the drain forever. Messages not pulled from the
    /// returned iterator stay queued.
    pub fn drain(&mut self) -> Drain<'_, T> {
        let remaining = self.rx.len().max(1);
        Drain {
            receiver: self,
            remaining,
        }
    }

    /// Waits for the next message. Only used outside the two loops (headless bootstrap).
    pub async fn recv(&mut self) -> Option<T> {
        let msg = self.rx.recv().await;
        if msg.is_none() {
            self.disconnected = true;
        }
        msg
    }

    /// Whether every sender is gone and the queue has been fully consumed.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}

/// Iterator returned by [`Receiver::drain`].
pub struct Drain<'a, T> {
    receiver: &'a mut Receiver<T>,
    remaining: usize,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        match self.receiver.rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) => {
                self.remaining = 0;
                None
            }
            Err(TryRecvError::Disconnected) => {
                self.remaining = 0;
                self.receiver.disconnected = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_preserves_order() {
        let (tx, mut rx) = command_channel();
        tx.send(Command::Save);
        tx.send(Command::Backup);
        tx.send(Command::Close);

        let got: Vec<_> = rx.drain().collect();
        assert_eq!(got, vec![Command::Save, Command::Backup, Command::Close]);
    }

    #[test]
    fn drain_is_bounded_by_queue_len_at_start() {
        let (tx, mut rx) = command_channel();
        tx.send(Command::Save);
        tx.send(Command::Save);

        let mut seen = 0;
        for _ in rx.drain() {
            seen += 1;
            tx.send(Command::Backup);
        }

        assert_eq!(seen, 2);
        assert_eq!(rx.drain().count(), 2);
    }

    #[test]
    fn drain_on_empty_queue_returns_immediately() {
        let (_tx, mut rx) = command_channel();
        assert_eq!(rx.drain().count(), 0);
        assert!(!rx.is_disconnected());
    }

    #[test]
    fn unpulled_messages_stay_queued() {
        let (tx, mut rx) = command_channel();
        tx.send(Command::Close);
        tx.send(Command::Save);

        assert_eq!(rx.drain().next(), Some(Command::Close));
        assert_eq!(rx.drain().next(), Some(Command::Save));
    }

    #[test]
    fn detects_disconnected_producer() {
        let (tx, mut rx) = event_channel();
        tx.send(Event::Closed);
        drop(tx);

        assert_eq!(rx.drain().collect::<Vec<_>>(), vec![Event::Closed]);
        assert!(!rx.is_disconnected());
        assert_eq!(rx.drain().count(), 0);
        assert!(rx.is_disconnected());
    }

    #[test]
    fn send_reports_dropped_consumer() {
        let (tx, rx) = command_channel();
        drop(rx);
        assert!(!tx.send(Command::Close));
    }
}
