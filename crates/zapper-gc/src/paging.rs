//! Lazy keyset pagination over id-ordered listings.

use std::future::Future;

use futures::stream::{self, BoxStream, StreamExt};
use uuid::Uuid;

use zapper_core::{Attachment, ContentExport, ContentMigration, EpubExport, Result, SisBatch};

/// Rows that can be paged by id.
pub(crate) trait Keyed {
    fn key(&self) -> Uuid;
}

macro_rules! keyed_by_id {
    ($($ty:ty),*) => {
        $(impl Keyed for $ty {
            fn key(&self) -> Uuid {
                self.id
            }
        })*
    };
}

keyed_by_id!(Attachment, ContentExport, EpubExport, ContentMigration, SisBatch);

/// Stream pages from `fetch(after)` until a short or empty page.
///
/// `fetch` receives the id of the last row already yielded. Each page is
/// only requested once the previous one has been consumed.
pub(crate) fn keyset_pages<'a, T, F, Fut>(page_size: i64, fetch: F) -> BoxStream<'a, Result<Vec<T>>>
where
    T: Keyed + Send + 'a,
    F: FnMut(Option<Uuid>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Vec<T>>> + Send + 'a,
{
    let page_size = usize::try_from(page_size).unwrap_or(0);
    stream::try_unfold(
        (fetch, None::<Uuid>, false),
        move |(mut fetch, after, done)| async move {
            if done {
                return Ok(None);
            }
            let page = fetch(after).await?;
            let Some(last) = page.last().map(Keyed::key) else {
                return Ok(None);
            };
            let done = page.len() < page_size;
            Ok(Some((page, (fetch, Some(last), done))))
        },
    )
    .boxed()
}
