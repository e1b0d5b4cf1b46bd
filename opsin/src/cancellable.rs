use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_channel::oneshot;

/// Handle to cancel pending loader operations
///
/// Cloned handles share the same state. Once canceled, every operation using
/// the handle fails with [`Error::Canceled`](crate::Error::Canceled) and the
/// affected loader is torn down.
#[derive(Debug, Clone, Default)]
pub struct Cancellable {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    canceled: AtomicBool,
    waiters: Mutex<Vec<oneshot::Sender<()>>>,
}

impl Cancellable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::SeqCst);

        let waiters = std::mem::take(&mut *self.inner.waiters.lock().unwrap());
        for waiter in waiters {
            let _result = waiter.send(());
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) is called
    ///
    /// Pends forever if the operation is never canceled.
    pub async fn canceled(&self) {
        if self.is_canceled() {
            return;
        }

        let (send, recv) = oneshot::channel();
        self.inner.waiters.lock().unwrap().push(send);

        // The flag might have flipped while registering
        if self.is_canceled() {
            return;
        }

        if recv.await.is_ok() {
            return;
        }

        // Waiter list was dropped without a cancel
        futures_lite::future::pending::<()>().await;
    }
}
