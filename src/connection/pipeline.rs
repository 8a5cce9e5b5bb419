//! Background receive pipeline.
//!
//! Two tasks per open connection:
//!
//! ```text
//! transport ──recv──> reader ──on_datagram──> (acks, status dispatch)
//!                       │
//!                       └── BusEvent ──mpsc──> consumer ──on_event──> handler
//! ```
//!
//! The reader does all protocol work inline and only queues validated
//! events, so a slow application callback never delays acknowledgments.
//! Both tasks watch one [`CancellationToken`]; [`ReceivePipeline::stop`]
//! cancels it, closes the transport to wake a pending receive, and waits
//! for both tasks before returning.

use crate::addressing::KnxAddress;
use crate::error::{KnxError, Result};
use crate::net::AsyncTransport;
use crate::protocol::constants::MAX_FRAME_SIZE;
use core::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// An application event waiting for the consumer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BusEvent {
    pub destination: KnxAddress,
    pub data: Vec<u8>,
}

/// Producer side of the event queue
pub(crate) type EventQueue = mpsc::UnboundedSender<BusEvent>;

/// Protocol side of a connection, driven by the pipeline tasks.
pub(crate) trait PipelineHandler<T: AsyncTransport>: Send + Sync + 'static {
    /// Handle one inbound datagram on the reader task.
    ///
    /// An error drops the datagram; the reader keeps running.
    fn on_datagram(
        &self,
        transport: &T,
        datagram: &[u8],
        queue: &EventQueue,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Deliver one queued event on the consumer task
    fn on_event(&self, event: BusEvent);

    /// The transport failed outside of a [`ReceivePipeline::stop`].
    ///
    /// Called from the reader just before it exits. Anything that stops this
    /// pipeline must run on another task.
    fn on_transport_lost(self: Arc<Self>, error: KnxError);
}

/// Reader and consumer tasks bound to one transport
#[derive(Debug)]
pub(crate) struct ReceivePipeline<T: AsyncTransport> {
    transport: Arc<T>,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

impl<T: AsyncTransport> ReceivePipeline<T> {
    /// Spawn both tasks
    pub fn start<H: PipelineHandler<T>>(transport: Arc<T>, handler: Arc<H>) -> Self {
        let cancel = CancellationToken::new();
        let (queue, events) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(
            Arc::clone(&transport),
            Arc::clone(&handler),
            queue,
            cancel.clone(),
        ));
        let consumer = tokio::spawn(consume_loop::<T, H>(handler, events, cancel.clone()));

        Self {
            transport,
            cancel,
            reader,
            consumer,
        }
    }

    /// Signal both tasks and close the transport without waiting
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.transport.close();
    }

    /// Cancel both tasks, close the transport and wait for the tasks to end.
    ///
    /// Events still queued are dropped. Must not be awaited from the
    /// consumer task (an application callback).
    pub async fn stop(self) {
        self.cancel();

        for (name, task) in [("reader", self.reader), ("consumer", self.consumer)] {
            if let Err(err) = task.await {
                if err.is_panic() {
                    knx_log!(error, "Pipeline {} task panicked", name);
                }
            }
        }
        knx_log!(debug, "Receive pipeline stopped");
    }
}

async fn read_loop<T, H>(
    transport: Arc<T>,
    handler: Arc<H>,
    queue: EventQueue,
    cancel: CancellationToken,
) where
    T: AsyncTransport,
    H: PipelineHandler<T>,
{
    let mut buf = [0u8; MAX_FRAME_SIZE];

    loop {
        let received = tokio::select! {
            () = cancel.cancelled() => break,
            received = transport.recv_from(&mut buf) => received,
        };

        match received {
            Ok((len, from)) => {
                let datagram = &buf[..len];
                knx_log!(trace, "Received {} bytes from {}", len, from);
                if let Err(err) = handler.on_datagram(&*transport, datagram, &queue).await {
                    knx_log!(warn, "Dropping datagram from {}: {}", from, err);
                }
            }
            Err(err) => {
                if !cancel.is_cancelled() {
                    knx_log!(error, "Transport lost: {}", err);
                    handler.on_transport_lost(err);
                }
                break;
            }
        }
    }
}

async fn consume_loop<T, H>(
    handler: Arc<H>,
    mut events: mpsc::UnboundedReceiver<BusEvent>,
    cancel: CancellationToken,
) where
    T: AsyncTransport,
    H: PipelineHandler<T>,
{
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Some(event) => handler.on_event(event),
            None => break,
        }
    }
}
