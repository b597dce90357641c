//! Progress channel between the workflows and the CLI listener thread.

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::Event;

/// Workflow side of the channel. Sends never block or fail.
#[derive(Clone)]
pub struct EventSender {
    inner: Sender<Event>,
}

impl EventSender {
    /// Events sent after the listener hung up are dropped
    pub fn send(&self, event: Event) {
        let _ = self.inner.send(event);
    }
}

/// Listener side of the channel
pub struct EventReceiver {
    inner: Receiver<Event>,
}

impl EventReceiver {
    /// Events in send order, ending once every sender is dropped
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter()
    }
}

pub struct EventChannel;

impl EventChannel {
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (EventSender { inner: sender }, EventReceiver { inner: receiver })
    }
}

/// A sender nobody listens to
pub fn null_sender() -> EventSender {
    let (sender, _receiver) = EventChannel::new();
    sender
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{PipelineEvent, TileEvent, Workflow};
    use std::thread;

    #[test]
    fn listener_thread_sees_events_in_order() {
        let (sender, receiver) = EventChannel::new();

        let listener = thread::spawn(move || {
            receiver
                .iter()
                .filter_map(|event| match event {
                    Event::Tile(TileEvent::Started { total }) => Some(total),
                    _ => None,
                })
                .collect::<Vec<_>>()
        });

        sender.send(Event::Tile(TileEvent::Started { total: 3 }));
        sender.send(Event::Tile(TileEvent::Started { total: 5 }));
        drop(sender);

        assert_eq!(listener.join().unwrap(), vec![3, 5]);
    }

    #[test]
    fn null_sender_discards_events() {
        let sender = null_sender();
        sender.send(Event::Pipeline(PipelineEvent::Started {
            workflow: Workflow::Validate,
        }));
    }

    #[test]
    fn cloned_senders_keep_channel_open() {
        let (sender, receiver) = EventChannel::new();
        let clone = sender.clone();
        drop(sender);
        clone.send(Event::Tile(TileEvent::Completed {
            compared: 1,
            skipped: 0,
        }));
        drop(clone);

        assert_eq!(receiver.iter().count(), 1);
    }
}
