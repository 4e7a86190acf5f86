//! Ordered joining of concurrent branches.

use std::future::Future;

use futures::StreamExt;
use futures::stream::FuturesUnordered;

/// Run `branches` concurrently and collect their results in input order.
///
/// Each branch is tagged with its position when launched, so the output
/// order is the source order no matter which branch finishes first. The
/// first error is returned as soon as it is observed; the remaining
/// branches are dropped and nothing from them is emitted.
pub async fn join_ordered<I, F, T, E>(branches: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    let mut pending: FuturesUnordered<_> = branches
        .into_iter()
        .enumerate()
        .map(|(index, branch)| async move { (index, branch.await) })
        .collect();

    let mut slots: Vec<Option<T>> = Vec::with_capacity(pending.len());
    slots.resize_with(pending.len(), || None);

    while let Some((index, result)) = pending.next().await {
        let value = result?;
        if let Some(slot) = slots.get_mut(index) {
            *slot = Some(value);
        }
    }
    Ok(slots.into_iter().flatten().collect())
}
