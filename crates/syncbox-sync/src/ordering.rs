//! Result ordering for batch operations
//!
//! Concurrent lookups finish in any order. Each result carries the
//! [`ResultOrder`] of the request that produced it, and consumers restore
//! request order from that tag before matching results to requests.

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use syncbox_core::domain::{
    DomainError, HasResultOrder, PossiblyStreamableAndPossiblyChangedFileChange,
    PossiblyStreamableAndPossiblyChangedFileChangeWithError, PossiblyStreamableFileChange,
    ResultSlot, TransferFailure,
};
use syncbox_core::ports::ISyncDataProvider;
use tracing::{debug, warn};

/// Outcome of looking up one change
pub type LookupResult = Result<
    PossiblyStreamableAndPossiblyChangedFileChange,
    PossiblyStreamableAndPossiblyChangedFileChangeWithError,
>;

/// Stable-sorts results back into request order
pub fn restore_request_order<T: HasResultOrder>(results: &mut [T]) {
    results.sort_by_key(|result| result.result_order());
}

/// Places each result into the slot of its request
///
/// Returns `len` slots; requests that produced no result keep an empty slot.
///
/// # Errors
/// Returns `DomainError::ValidationFailed` if a result's order is out of
/// range or two results claim the same request
pub fn collect_into_slots<T: HasResultOrder>(
    len: usize,
    results: impl IntoIterator<Item = T>,
) -> Result<Vec<ResultSlot<T>>, DomainError> {
    let mut slots: Vec<ResultSlot<T>> = std::iter::repeat_with(ResultSlot::default)
        .take(len)
        .collect();

    for result in results {
        let order = result.result_order();
        let slot = slots.get_mut(order.index()).ok_or_else(|| {
            DomainError::ValidationFailed(format!(
                "result order {order} out of range for {len} requests"
            ))
        })?;
        if slot.fill(result).is_some() {
            return Err(DomainError::ValidationFailed(format!(
                "duplicate result for request {order}"
            )));
        }
    }

    Ok(slots)
}

/// Looks up the current local state of every change concurrently
///
/// A change is flagged as changed when the provider knows nothing about its
/// path or its recorded state differs. Lookup errors become transient
/// failures on the error variant. Results are returned in request order.
pub async fn lookup_batch(
    provider: &dyn ISyncDataProvider,
    requests: Vec<PossiblyStreamableFileChange>,
) -> Vec<LookupResult> {
    let mut pending: FuturesUnordered<_> = requests
        .into_iter()
        .map(|request| async move {
            let order = request.result_order();
            let (change, stream) = request.into_parts();
            match provider.lookup(change.path()).await {
                Ok(current) => {
                    let changed = current
                        .as_ref()
                        .map_or(true, |current| change.differs_from(current));
                    Ok(PossiblyStreamableAndPossiblyChangedFileChange::new(
                        order, changed, change, stream,
                    ))
                }
                Err(err) => {
                    warn!(
                        path = %change.path().display(),
                        error = %err,
                        "Lookup failed"
                    );
                    Err(PossiblyStreamableAndPossiblyChangedFileChangeWithError::new(
                        order,
                        true,
                        change,
                        stream,
                        TransferFailure::transient(format!("lookup failed: {err:#}")),
                    ))
                }
            }
        })
        .collect();

    let mut results = Vec::with_capacity(pending.len());
    while let Some(result) = pending.next().await {
        results.push(result);
    }

    debug!(count = results.len(), "Batch lookup finished");
    restore_request_order(&mut results);
    results
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use syncbox_core::domain::{
        ChangeKind, EventId, FileChange, Md5Hash, PossiblyChangedFileChange, ResultOrder,
        TransferDirection,
    };

    use super::*;

    fn change(path: &str) -> FileChange {
        FileChange::new(ChangeKind::Modified, path, TransferDirection::Upload).unwrap()
    }

    /// Provider whose lookups finish later the earlier they were requested
    struct ReverseLatencyProvider {
        known: Vec<FileChange>,
    }

    #[async_trait::async_trait]
    impl ISyncDataProvider for ReverseLatencyProvider {
        async fn complete_event(
            &self,
            _event_id: EventId,
            _temp_download_folder: Option<&Path>,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn merge_metadata(&self, _change: &FileChange) -> anyhow::Result<()> {
            Ok(())
        }

        async fn lookup(&self, path: &Path) -> anyhow::Result<Option<FileChange>> {
            let index: u64 = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(1000 - index * 10)).await;
            if path.starts_with("/broken") {
                anyhow::bail!("provider offline");
            }
            Ok(self.known.iter().find(|c| c.path() == path).cloned())
        }

        async fn report_terminal_failure(
            &self,
            _change: &FileChange,
            _failure: &TransferFailure,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_restore_request_order_is_stable() {
        let mut results = vec![
            PossiblyChangedFileChange::new(ResultOrder::new(2), true, change("/c")),
            PossiblyChangedFileChange::new(ResultOrder::new(0), true, change("/a1")),
            PossiblyChangedFileChange::new(ResultOrder::new(1), true, change("/b")),
            PossiblyChangedFileChange::new(ResultOrder::new(0), false, change("/a2")),
        ];
        restore_request_order(&mut results);

        let paths: Vec<&str> = results
            .iter()
            .map(|r| r.file_change().path().to_str().unwrap())
            .collect();
        assert_eq!(paths, vec!["/a1", "/a2", "/b", "/c"]);
    }

    #[test]
    fn test_collect_into_slots_leaves_gaps_empty() {
        let results = vec![
            PossiblyChangedFileChange::new(ResultOrder::new(2), true, change("/c")),
            PossiblyChangedFileChange::new(ResultOrder::new(0), false, change("/a")),
        ];
        let slots = collect_into_slots(3, results).unwrap();

        assert!(slots[0].is_valid());
        assert!(!slots[1].is_valid());
        assert!(matches!(
            slots[1].get(),
            Err(DomainError::InvalidState {
                type_name: "PossiblyChangedFileChange"
            })
        ));
        assert_eq!(
            slots[2].get().unwrap().file_change().path(),
            Path::new("/c")
        );
    }

    #[test]
    fn test_collect_into_slots_rejects_out_of_range_and_duplicates() {
        let out_of_range = vec![PossiblyChangedFileChange::new(
            ResultOrder::new(5),
            true,
            change("/x"),
        )];
        assert!(matches!(
            collect_into_slots(2, out_of_range),
            Err(DomainError::ValidationFailed(_))
        ));

        let duplicate = vec![
            PossiblyChangedFileChange::new(ResultOrder::new(0), true, change("/x")),
            PossiblyChangedFileChange::new(ResultOrder::new(0), true, change("/y")),
        ];
        assert!(matches!(
            collect_into_slots(2, duplicate),
            Err(DomainError::ValidationFailed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_batch_restores_request_order() {
        let known_same = change("/docs/1").with_size(10);
        let provider = ReverseLatencyProvider {
            known: vec![known_same.clone(), change("/docs/2").with_size(99)],
        };

        let requests: Vec<PossiblyStreamableFileChange> = (0..8)
            .map(|i| {
                let c = if i == 1 {
                    known_same.clone()
                } else {
                    change(&format!("/docs/{i}")).with_size(10)
                };
                PossiblyStreamableFileChange::new(ResultOrder::new(i), c, None)
            })
            .collect();

        let results = lookup_batch(&provider, requests).await;
        assert_eq!(results.len(), 8);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.result_order(), ResultOrder::new(i));
            let ok = result.as_ref().unwrap();
            assert_eq!(
                ok.file_change().path(),
                Path::new(&format!("/docs/{i}"))
            );
        }

        // 1 matches what the provider knows; 2 differs in size; the rest are unknown
        assert!(!results[1].as_ref().unwrap().changed());
        assert!(results[2].as_ref().unwrap().changed());
        assert!(results[5].as_ref().unwrap().changed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_errors_carry_change_and_failure() {
        let provider = ReverseLatencyProvider { known: Vec::new() };
        let hashed = change("/broken/3").with_md5(Md5Hash::compute(b"x"));
        let requests = vec![
            PossiblyStreamableFileChange::new(ResultOrder::new(0), change("/ok/1"), None),
            PossiblyStreamableFileChange::new(ResultOrder::new(1), hashed, None),
        ];

        let results = lookup_batch(&provider, requests).await;
        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert_eq!(err.file_change().path(), Path::new("/broken/3"));
        assert!(err.error().message().contains("provider offline"));
        assert_eq!(err.result_order(), ResultOrder::new(1));
    }
}
