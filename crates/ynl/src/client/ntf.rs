//! Notification queue and stream.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio_stream::Stream;

use super::YnlFamily;
use crate::codec::message::Message;
use crate::error::Result;
use crate::transport::Transport;

/// Bounded FIFO of decoded notifications.
#[derive(Debug)]
pub(crate) struct NtfQueue {
    items: VecDeque<Message>,
    depth: usize,
    dropped: u64,
}

impl NtfQueue {
    pub(crate) fn new(depth: usize) -> Self {
        Self {
            items: VecDeque::new(),
            depth: depth.max(1),
            dropped: 0,
        }
    }

    /// Queue a notification, dropping the oldest one when full.
    pub(crate) fn push(&mut self, msg: Message) {
        if self.items.len() >= self.depth {
            if let Some(old) = self.items.pop_front() {
                self.dropped += 1;
                tracing::warn!(
                    op = %old.op,
                    dropped = self.dropped,
                    "notification queue full, dropping oldest"
                );
            }
        }
        self.items.push_back(msg);
    }

    pub(crate) fn pop(&mut self) -> Option<Message> {
        self.items.pop_front()
    }

    pub(crate) fn drain(&mut self) -> Vec<Message> {
        self.items.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
    }
}

type NextNtf<'a> = Pin<Box<dyn Future<Output = Result<Message>> + Send + 'a>>;

/// Stream of notifications from a [`YnlFamily`].
///
/// Created by [`YnlFamily::notifications`]. Transport failures are yielded
/// as errors and the stream keeps reading afterwards, except for a closed
/// transport: that error is yielded once and the stream then ends.
///
/// # Example
///
/// ```ignore
/// use tokio_stream::StreamExt;
///
/// family.subscribe("mgmt").await?;
/// let mut ntfs = family.notifications();
/// while let Some(msg) = ntfs.next().await {
///     let msg = msg?;
///     println!("{}: {}", msg.op, msg.attrs);
/// }
/// ```
pub struct Notifications<'a, T: Transport> {
    family: &'a YnlFamily<T>,
    pending: Option<NextNtf<'a>>,
    closed: bool,
}

impl<'a, T: Transport> Notifications<'a, T> {
    pub(crate) fn new(family: &'a YnlFamily<T>) -> Self {
        Self {
            family,
            pending: None,
            closed: false,
        }
    }
}

impl<T: Transport> Stream for Notifications<'_, T> {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.closed {
            return Poll::Ready(None);
        }
        let family = self.family;
        let fut = self
            .pending
            .get_or_insert_with(|| Box::pin(family.next_ntf()));
        match fut.as_mut().poll(cx) {
            Poll::Ready(item) => {
                self.pending = None;
                if matches!(&item, Err(e) if e.is_closed()) {
                    self.closed = true;
                }
                Poll::Ready(Some(item))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
