/*
    spotify-export-rs | Rust CLI tool to export playlists and Liked Songs to CSV.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use crate::api::ApiError;
use crate::models::{Cursor, Page};
use crate::retry::RequestExecutor;
use log::debug;
use std::future::Future;

/// Drains a cursor-paginated listing, page by page, into one ordered list.
///
/// `fetch_page` is called with `None` for the first page and with the
/// previous page's cursor afterwards. Every fetch goes through `executor`.
/// Items are neither reordered nor deduplicated.
pub async fn collect_all<T, F, Fut>(
    executor: &RequestExecutor,
    mut fetch_page: F,
) -> Result<Vec<T>, ApiError>
where
    F: FnMut(Option<Cursor>) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<Cursor> = None;

    loop {
        let page = executor.execute(|| fetch_page(cursor.clone())).await?;
        let Page { items: batch, next, total } = page;
        items.extend(batch);

        match total {
            Some(total) => debug!("Fetched {}/{} items", items.len(), total),
            None => debug!("Fetched {} items", items.len()),
        }

        match next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Backoff;
    use std::future::{ready, Ready};
    use std::sync::Mutex;

    /// A listing split into fixed pages; page `n` is addressed by cursor `"n"`.
    struct PagedSource {
        pages: Vec<Vec<&'static str>>,
        requested: Mutex<Vec<Option<String>>>,
        failures_before_page: Mutex<Vec<(usize, u32)>>,
    }

    impl PagedSource {
        fn new(pages: Vec<Vec<&'static str>>) -> Self {
            Self {
                pages,
                requested: Mutex::new(Vec::new()),
                failures_before_page: Mutex::new(Vec::new()),
            }
        }

        fn fail_page(self, page: usize, times: u32) -> Self {
            self.failures_before_page.lock().unwrap().push((page, times));
            self
        }

        fn fetch(&self, cursor: Option<Cursor>) -> Ready<Result<Page<&'static str>, ApiError>> {
            self.requested
                .lock()
                .unwrap()
                .push(cursor.as_ref().map(|c| c.as_str().to_string()));

            let index: usize = cursor.map(|c| c.as_str().parse().unwrap()).unwrap_or(0);

            let mut failures = self.failures_before_page.lock().unwrap();
            if let Some(entry) = failures.iter_mut().find(|(p, left)| *p == index && *left > 0) {
                entry.1 -= 1;
                return ready(Err(ApiError::Status {
                    status: 502,
                    retry_after: None,
                    message: "502 Bad Gateway".to_string(),
                }));
            }

            let next = (index + 1 < self.pages.len()).then(|| Cursor::new((index + 1).to_string()));
            ready(Ok(Page {
                items: self.pages[index].clone(),
                next,
                total: Some(self.pages.iter().map(Vec::len).sum::<usize>() as u32),
            }))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_collects_every_page_in_order() {
        let source = PagedSource::new(vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]]);

        let items = collect_all(&RequestExecutor::default(), |cursor| source.fetch(cursor))
            .await
            .unwrap();

        assert_eq!(items, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(
            *source.requested.lock().unwrap(),
            vec![None, Some("1".to_string()), Some("2".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_empty_page() {
        let source = PagedSource::new(vec![vec![]]);

        let items = collect_all(&RequestExecutor::default(), |cursor| source.fetch(cursor))
            .await
            .unwrap();

        assert!(items.is_empty());
        assert_eq!(source.requested.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_page_fetch_is_retried() {
        let source =
            PagedSource::new(vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]]).fail_page(1, 2);

        let items = collect_all(&RequestExecutor::default(), |cursor| source.fetch(cursor))
            .await
            .unwrap();

        assert_eq!(items.len(), 5);
        // page 1 requested three times: two failures, one success
        assert_eq!(source.requested.lock().unwrap().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_page_fetch_fails_the_traversal() {
        let source = PagedSource::new(vec![vec!["a"], vec!["b"]]).fail_page(1, 10);
        let executor = RequestExecutor::new(2, Backoff::default());

        let result = collect_all(&executor, |cursor| source.fetch(cursor)).await;

        assert_eq!(result.unwrap_err().status(), Some(502));
    }
}
