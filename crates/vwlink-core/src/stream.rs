// ── Reactive vehicle streams ──
//
// Subscription types over the store's vehicle and command snapshots.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::{CommandRecord, Vehicle};

/// A subscription to a snapshot collection.
///
/// Gives point-in-time access plus change notification, either through
/// [`changed()`](Self::changed) or by converting into a `Stream`.
pub struct SnapshotStream<T: Send + Sync + 'static> {
    current: Arc<Vec<Arc<T>>>,
    receiver: watch::Receiver<Arc<Vec<Arc<T>>>>,
}

pub type VehicleStream = SnapshotStream<Vehicle>;
pub type CommandStream = SnapshotStream<CommandRecord>;

impl<T: Send + Sync + 'static> SnapshotStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Arc<Vec<Arc<T>>>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot as of creation or the last `changed()`.
    pub fn current(&self) -> &Arc<Vec<Arc<T>>> {
        &self.current
    }

    /// Latest snapshot, which may be newer than `current()`.
    pub fn latest(&self) -> Arc<Vec<Arc<T>>> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Arc<Vec<Arc<T>>>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    pub fn into_stream(self) -> SnapshotWatchStream<T> {
        SnapshotWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

impl SnapshotStream<Vehicle> {
    /// One vehicle out of the current snapshot.
    pub fn vehicle(&self, vin: &str) -> Option<Arc<Vehicle>> {
        self.current.iter().find(|v| v.vin == vin).cloned()
    }
}

/// `Stream` adapter that yields every new snapshot, starting with the
/// current one.
pub struct SnapshotWatchStream<T: Send + Sync + 'static> {
    inner: WatchStream<Arc<Vec<Arc<T>>>>,
}

impl<T: Send + Sync + 'static> Stream for SnapshotWatchStream<T> {
    type Item = Arc<Vec<Arc<T>>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;

    use super::*;
    use crate::store::DataStore;
    use vwlink_api::models::RawVehicle;

    fn raw(vin: &str) -> RawVehicle {
        RawVehicle {
            vin: vin.into(),
            nickname: None,
            model: None,
        }
    }

    #[tokio::test]
    async fn changed_tracks_store_mutations() {
        let store = DataStore::new();
        let mut stream = VehicleStream::new(store.subscribe_vehicles());
        assert!(stream.current().is_empty());

        store.apply_garage(&[raw("A")]);
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.len(), 1);
        assert!(stream.vehicle("A").is_some());
        assert!(stream.vehicle("B").is_none());
    }

    #[tokio::test]
    async fn into_stream_yields_current_first() {
        let store = DataStore::new();
        store.apply_garage(&[raw("A")]);
        let mut stream = VehicleStream::new(store.subscribe_vehicles()).into_stream();
        let first = stream.next().await.unwrap();
        assert_eq!(first[0].vin, "A");
    }
}
