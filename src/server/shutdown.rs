use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Pair used to stop a server task. The server runs until the handle is dropped.
pub(crate) fn shutdown_signal() -> (ServerShutdownHandle, ServerShutdownSignal) {
    let (tx, rx) = oneshot::channel();

    (ServerShutdownHandle { _tx: tx }, ServerShutdownSignal { rx })
}

pub(crate) struct ServerShutdownHandle {
    _tx: oneshot::Sender<()>,
}

pub(crate) struct ServerShutdownSignal {
    rx: oneshot::Receiver<()>,
}

impl Future for ServerShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let rx = Pin::new(&mut self.rx);

        match rx.poll(cx) {
            Poll::Pending => Poll::Pending,
            // Nothing is ever sent. Completion means the handle was dropped.
            Poll::Ready(_) => Poll::Ready(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn signal_fires_when_handle_dropped() {
        let (handle, mut signal) = shutdown_signal();
        assert!(timeout(Duration::from_millis(20), &mut signal).await.is_err());

        drop(handle);
        assert!(timeout(Duration::from_millis(20), signal).await.is_ok());
    }
}
