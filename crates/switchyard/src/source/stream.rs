//! Asynchronous sources driven by a tokio task.
//!
//! The subscription handle owns the task: cancelling it aborts the task at its
//! next suspension point, and any item produced after the cancel is dropped
//! rather than delivered. When the stream ends on its own, the handle reports
//! itself cancelled so owners can prune it.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{AbortHandle, Abortable};
use futures::stream::{self, Stream, StreamExt};

use crate::cancellable::{lock, Cancellable};
use crate::sink::Sink;

use super::{SharedSource, Source, SourceId};

type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

struct StreamSource<T> {
    id: SourceId,
    stream: Mutex<Option<BoxStream<T>>>,
}

impl<T: Send + 'static> Source<T> for StreamSource<T> {
    fn subscribe(&self, sink: Sink<T>) -> Cancellable {
        let Some(mut stream) = lock(&self.stream).take() else {
            tracing::warn!(source = %self.id, "stream source already consumed; subscriber gets nothing");
            return Cancellable::finished();
        };
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(source = %self.id, error = %err, "no tokio runtime to drive stream source");
                return Cancellable::finished();
            }
        };

        let stopped = Arc::new(AtomicBool::new(false));
        let (abort, registration) = AbortHandle::new_pair();
        let handle = {
            let stopped = stopped.clone();
            Cancellable::new(move || {
                stopped.store(true, Ordering::Release);
                abort.abort();
            })
        };

        let id = self.id;
        let pump = Abortable::new(
            async move {
                while let Some(item) = stream.next().await {
                    if stopped.load(Ordering::Acquire) {
                        break;
                    }
                    sink.accept(item);
                }
            },
            registration,
        );
        let finished = handle.clone();
        runtime.spawn(async move {
            if pump.await.is_err() {
                tracing::debug!(source = %id, "stream source aborted");
            }
            finished.cancel();
        });

        handle
    }

    fn source_id(&self) -> SourceId {
        self.id
    }
}

/// Source that forwards every item of `stream` to its subscriber.
///
/// The stream is consumed by the first subscriber; later subscribers finish
/// immediately. Subscribing requires a tokio runtime context.
pub fn from_stream<T, S>(stream: S) -> SharedSource<T>
where
    T: Send + 'static,
    S: Stream<Item = T> + Send + 'static,
{
    Arc::new(StreamSource {
        id: SourceId::next(),
        stream: Mutex::new(Some(Box::pin(stream))),
    })
}

/// Source emitting the output of `future` once it resolves.
pub fn from_future<T, F>(future: F) -> SharedSource<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    from_stream(stream::once(future))
}
