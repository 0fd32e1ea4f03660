//! Unbounded multi-producer channel that an actor consumes via
//! `ActorControl::consume`.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use super::condition::ActorCondition;

struct ChannelState<T> {
    items: VecDeque<T>,
    consumer: Option<ActorCondition>,
}

struct Shared<T> {
    state: Mutex<ChannelState<T>>,
}

/// Create a connected sender/receiver pair.
pub fn channel<T: Send + 'static>() -> (ChannelSender<T>, ChannelReceiver<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(ChannelState {
            items: VecDeque::new(),
            consumer: None,
        }),
    });
    (
        ChannelSender {
            shared: Arc::clone(&shared),
        },
        ChannelReceiver { shared },
    )
}

/// Sending half; cheap to clone.
pub struct ChannelSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ChannelSender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for ChannelSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSender")
            .field("queued", &self.shared.state.lock().items.len())
            .finish()
    }
}

impl<T: Send + 'static> ChannelSender<T> {
    /// Append `item` and wake the consuming actor, if one is bound.
    pub fn send(&self, item: T) {
        let consumer = {
            let mut state = self.shared.state.lock();
            state.items.push_back(item);
            state.consumer.clone()
        };
        if let Some(consumer) = consumer {
            consumer.signal();
        }
    }
}

/// Receiving half, handed to exactly one actor.
pub struct ChannelReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> fmt::Debug for ChannelReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ChannelReceiver")
            .field("queued", &state.items.len())
            .field("bound", &state.consumer.is_some())
            .finish()
    }
}

impl<T: Send + 'static> ChannelReceiver<T> {
    pub fn len(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pop one item without a consuming actor.
    pub fn try_recv(&self) -> Option<T> {
        self.shared.state.lock().items.pop_front()
    }

    /// Attach the consumer condition; signals it at once if items are waiting.
    pub(crate) fn bind(&self, consumer: ActorCondition) {
        let backlog = {
            let mut state = self.shared.state.lock();
            state.consumer = Some(consumer.clone());
            !state.items.is_empty()
        };
        if backlog {
            consumer.signal();
        }
    }

    /// Take up to `max` items. The flag is true if more are left.
    pub(crate) fn drain(&self, max: usize) -> (Vec<T>, bool) {
        let mut state = self.shared.state.lock();
        let take = max.min(state.items.len());
        let batch: Vec<T> = state.items.drain(..take).collect();
        (batch, !state.items.is_empty())
    }

    /// Re-signal the bound consumer.
    pub(crate) fn wake_consumer(&self) {
        let consumer = self.shared.state.lock().consumer.clone();
        if let Some(consumer) = consumer {
            consumer.signal();
        }
    }
}
