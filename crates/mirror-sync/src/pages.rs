use std::future::Future;

use mirror_core::Result;

/// Walk a cursor-paginated remote query to exhaustion.
///
/// Each call passes the current cursor; the cursor for the next call is
/// derived from the last item of the returned page, and an empty page ends
/// the walk. `seed` resumes from a previously known position (`None` starts
/// from the beginning). With exclusive cursors and a finite remote set of
/// `n` items this terminates after `ceil(n / page)` fetches plus the final
/// empty page, with no duplicates and no omissions.
pub async fn drain<T, C, Fut>(
    seed: Option<C>,
    cursor_of: impl Fn(&T) -> C,
    mut fetch: impl FnMut(Option<C>) -> Fut,
) -> Result<Vec<T>>
where
    C: Clone,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut cursor = seed;
    let mut items = Vec::new();
    loop {
        let page = fetch(cursor.clone()).await?;
        let Some(last) = page.last() else {
            return Ok(items);
        };
        cursor = Some(cursor_of(last));
        items.extend(page);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Paged fetch over a fixed ascending set, counting calls.
    async fn run(total: u64, page: usize) -> (Vec<u64>, usize) {
        let calls = Cell::new(0usize);
        let items = drain(
            None,
            |item: &u64| *item,
            |cursor: Option<u64>| {
                calls.set(calls.get() + 1);
                let start = cursor.map(|c| c + 1).unwrap_or(1);
                let page: Vec<u64> = (start..=total).take(page).collect();
                async move { Ok(page) }
            },
        )
        .await
        .unwrap();
        (items, calls.get())
    }

    #[tokio::test]
    async fn terminates_with_no_duplicates_or_omissions() {
        let (items, calls) = run(10, 3).await;
        assert_eq!(items, (1..=10).collect::<Vec<_>>());
        // ceil(10 / 3) = 4 full fetches plus the terminating empty page
        assert_eq!(calls, 5);
    }

    #[tokio::test]
    async fn exact_page_boundary_still_terminates() {
        let (items, calls) = run(9, 3).await;
        assert_eq!(items.len(), 9);
        assert_eq!(calls, 4);
    }

    #[tokio::test]
    async fn empty_remote_set_is_one_call() {
        let (items, calls) = run(0, 3).await;
        assert!(items.is_empty());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn seed_resumes_past_known_items() {
        let calls = Cell::new(0usize);
        let items = drain(
            Some(7u64),
            |item: &u64| *item,
            |cursor: Option<u64>| {
                calls.set(calls.get() + 1);
                let start = cursor.map(|c| c + 1).unwrap_or(1);
                let page: Vec<u64> = (start..=10).take(2).collect();
                async move { Ok(page) }
            },
        )
        .await
        .unwrap();
        assert_eq!(items, vec![8, 9, 10]);
    }

    #[tokio::test]
    async fn errors_propagate() {
        let result: Result<Vec<u64>> = drain(
            None,
            |item: &u64| *item,
            |_| async { Err(mirror_core::MirrorError::Transport("down".into())) },
        )
        .await;
        assert!(result.is_err());
    }
}
