//! Deferred calls and property writes.
//!
//! The core only pushes. Whoever drives frames calls [`MessageQueue::flush`]
//! between ticks; targets are resolved by id at that point, so a message to
//! an object freed in the meantime is dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::object_db::{ObjectDb, ObjectId};
use crate::variant::Variant;

#[derive(Debug, Clone)]
pub enum Message {
    Call {
        target: ObjectId,
        method: String,
        args: Vec<Variant>,
        /// Log a failed call. Signal deliveries set this.
        show_error: bool,
    },
    Set {
        target: ObjectId,
        property: String,
        value: Variant,
    },
}

impl Message {
    #[must_use]
    pub fn target(&self) -> ObjectId {
        match self {
            Self::Call { target, .. } | Self::Set { target, .. } => *target,
        }
    }
}

/// FIFO of deferred work.
#[derive(Debug, Default)]
pub struct MessageQueue {
    messages: Mutex<VecDeque<Message>>,
    flushing: AtomicBool,
}

impl MessageQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_call(&self, target: ObjectId, method: &str, args: Vec<Variant>, show_error: bool) {
        trace!("Deferred call {}::{}", target, method);
        self.messages.lock().push_back(Message::Call {
            target,
            method: method.to_owned(),
            args,
            show_error,
        });
    }

    pub fn push_set(&self, target: ObjectId, property: &str, value: Variant) {
        trace!("Deferred set {}::{}", target, property);
        self.messages.lock().push_back(Message::Set {
            target,
            property: property.to_owned(),
            value,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    /// Deliver everything queued, including messages pushed while flushing.
    ///
    /// Returns the number of messages delivered to a live target.
    pub fn flush(&self, object_db: &ObjectDb) -> usize {
        if self.flushing.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let mut delivered = 0;
        loop {
            let Some(message) = self.messages.lock().pop_front() else {
                break;
            };
            let Some(object) = object_db.get_instance(message.target()) else {
                trace!("Dropped deferred message to vanished {}", message.target());
                continue;
            };
            delivered += 1;
            match message {
                Message::Call {
                    method,
                    args,
                    show_error,
                    ..
                } => {
                    if let Err(err) = object.call(&method, &args) {
                        if show_error {
                            error!(
                                "Error calling deferred method: {}",
                                err.describe(object.get_class(), &method, &args)
                            );
                        }
                    }
                }
                Message::Set {
                    property, value, ..
                } => {
                    object.set(&property, &value);
                }
            }
        }
        self.flushing.store(false, Ordering::Release);
        delivered
    }
}
