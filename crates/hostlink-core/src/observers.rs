//! Message and error notifications.
//!
//! Handlers run synchronously on the listener task, in registration order,
//! so every observer sees inbound envelopes in wire order. Error handlers
//! are purely observational; nothing they do can halt the channel.

use crate::error::ChannelError;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Returns `false` once the handler wants to be unregistered.
pub type MessageHandler<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&ChannelError) + Send + Sync>;

pub struct Observers<T> {
    message: RwLock<Vec<MessageHandler<T>>>,
    error: RwLock<Vec<ErrorHandler>>,
}

impl<T> Observers<T> {
    pub fn new() -> Self {
        Self {
            message: RwLock::new(Vec::new()),
            error: RwLock::new(Vec::new()),
        }
    }

    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.message.write().push(Arc::new(move |message: &T| {
            handler(message);
            true
        }));
    }

    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&ChannelError) + Send + Sync + 'static,
    {
        self.error.write().push(Arc::new(handler));
    }

    pub fn notify_message(&self, message: &T) {
        // Snapshot so a handler may register further handlers.
        let handlers = self.message.read().clone();
        let retired: Vec<MessageHandler<T>> = handlers
            .into_iter()
            .filter(|handler| !handler(message))
            .collect();
        if !retired.is_empty() {
            self.message
                .write()
                .retain(|handler| !retired.iter().any(|gone| Arc::ptr_eq(gone, handler)));
        }
    }

    pub fn notify_error(&self, error: &ChannelError) {
        let handlers = self.error.read().clone();
        for handler in &handlers {
            handler(error);
        }
    }

    pub fn message_handler_count(&self) -> usize {
        self.message.read().len()
    }
}

impl<T: Clone + Send + 'static> Observers<T> {
    /// Forward every inbound envelope into an unbounded channel.
    ///
    /// The forwarding handler unregisters itself on the first envelope
    /// after the receiver is dropped.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.message
            .write()
            .push(Arc::new(move |message: &T| tx.send(message.clone()).is_ok()));
        rx
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}
