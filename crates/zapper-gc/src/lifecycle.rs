//! Ownership transitions shared by the deduplicator and the disposer.
//!
//! A root attachment owns its bytes; children only point at it. Before a
//! root loses its bytes, [`demote`] moves them to a hidden holder row and
//! re-points every child there, so no child is ever left pointing at a root
//! without content.

use tracing::{debug, warn};
use uuid::Uuid;

use zapper_core::{
    logging, with_extension_suffix, Attachment, AttachmentState, MediaClass, NewAttachment,
    Result, StoreOutcome,
};

use crate::Stores;

/// Give the children of `root` a new owner of the bytes.
///
/// Returns the holder id, or `None` when `root` has no children (nothing
/// depends on the bytes, so nothing is copied).
pub async fn demote(stores: &Stores, root: &Attachment) -> Result<Option<Uuid>> {
    let children = stores.attachments.count_children(root.id).await?;
    if children == 0 {
        return Ok(None);
    }

    let holder = stores
        .attachments
        .insert(NewAttachment::holder_of(root, AttachmentState::Hidden))
        .await?;

    let copied = match stores.content.copy(root.id, holder.id).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // Children are not moved yet; the empty holder has no users.
            if let Err(cleanup) = stores.attachments.hard_delete(holder.id).await {
                warn!(
                    subsystem = logging::DEDUP,
                    op = "demote",
                    holder_id = %holder.id,
                    error = %cleanup,
                    "Could not remove holder after failed copy"
                );
            }
            return Err(e);
        }
    };
    match copied {
        StoreOutcome::Done => {}
        other => warn!(
            subsystem = logging::DEDUP,
            op = "demote",
            root_id = %root.id,
            holder_id = %holder.id,
            outcome = ?other,
            "Root had no bytes to hand over"
        ),
    }

    let moved = stores
        .attachments
        .reparent_children(root.id, holder.id)
        .await?;

    debug!(
        subsystem = logging::DEDUP,
        op = "demote",
        root_id = %root.id,
        holder_id = %holder.id,
        children = moved,
        "Demoted root"
    );
    Ok(Some(holder.id))
}

/// Delete the bytes and thumbnail owned by `att`. Missing files are logged.
pub async fn purge_content(stores: &Stores, att: &Attachment) -> Result<()> {
    if let StoreOutcome::NotFound = stores.content.delete(att.id).await? {
        warn!(
            subsystem = logging::CONTENT,
            op = "purge",
            attachment_id = %att.id,
            "Content already missing"
        );
    }
    if let StoreOutcome::NotFound = stores.content.delete_thumbnail(att.id).await? {
        if att.has_thumbnail {
            debug!(
                subsystem = logging::CONTENT,
                op = "purge",
                attachment_id = %att.id,
                "Thumbnail already missing"
            );
        }
    }
    Ok(())
}

/// Point `att` at `placeholder` and take over its content metadata.
///
/// The display name keeps its text and gains the placeholder extension
/// unless it already ends with it.
pub fn apply_placeholder(att: &mut Attachment, placeholder: &Attachment, class: MediaClass) {
    att.root_attachment_id = Some(placeholder.id);
    att.filename = placeholder.filename.clone();
    att.content_hash = placeholder.content_hash.clone();
    att.size_bytes = placeholder.size_bytes;
    att.content_type = placeholder.content_type.clone();
    att.display_name = with_extension_suffix(&att.display_name, class.extension());
}

/// Whether `att` already carries `placeholder`'s content metadata.
pub fn carries_placeholder(att: &Attachment, placeholder: &Attachment, class: MediaClass) -> bool {
    att.root_attachment_id == Some(placeholder.id)
        && att.filename == placeholder.filename
        && att.content_hash == placeholder.content_hash
        && att.size_bytes == placeholder.size_bytes
        && att.content_type == placeholder.content_type
        && att.display_name.ends_with(class.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use std::sync::Arc;
    use zapper_core::ContextRef;

    #[tokio::test]
    async fn test_demote_without_children_creates_nothing() {
        let store = Arc::new(MemoryStore::new());
        let stores = Stores::from_memory(store.clone());
        let root = store.add_root(ContextRef::course(Uuid::now_v7()), "a.txt", "text/plain", b"a");

        assert_eq!(demote(&stores, &root).await.unwrap(), None);
        assert_eq!(store.attachments().len(), 1);
        assert!(store.calls().content_copies.is_empty());
    }

    #[tokio::test]
    async fn test_demote_moves_children_to_one_holder() {
        let store = Arc::new(MemoryStore::new());
        let stores = Stores::from_memory(store.clone());
        let ctx = ContextRef::course(Uuid::now_v7());
        let root = store.add_root(ctx, "a.txt", "text/plain", b"bytes");
        let c1 = store.add_child(&root, ctx, "copy1.txt");
        let c2 = store.add_child(&root, ctx, "copy2.txt");

        let holder = demote(&stores, &root).await.unwrap().unwrap();

        let holder_row = store.attachment(holder).unwrap();
        assert!(holder_row.is_root());
        assert_eq!(holder_row.state, AttachmentState::Hidden);
        assert_eq!(holder_row.content_hash, root.content_hash);
        assert_eq!(store.content_of(holder).unwrap(), b"bytes");
        for child in [c1.id, c2.id] {
            assert_eq!(store.attachment(child).unwrap().root_attachment_id, Some(holder));
        }
        assert!(store.children_of(root.id).is_empty());
    }

    #[tokio::test]
    async fn test_purge_tolerates_missing_bytes() {
        let store = Arc::new(MemoryStore::new());
        let stores = Stores::from_memory(store.clone());
        let root = store.add_root(ContextRef::course(Uuid::now_v7()), "a.txt", "text/plain", b"a");
        store.lose_content(root.id);

        purge_content(&stores, &root).await.unwrap();
        let calls = store.calls();
        assert_eq!(calls.content_deletes, vec![root.id]);
        assert_eq!(calls.thumbnail_deletes, vec![root.id]);
    }

    #[test]
    fn test_apply_placeholder_copies_metadata() {
        let store = MemoryStore::new();
        let owner = ContextRef::account(Uuid::now_v7());
        let placeholder = store.add_root(owner, "file_removed.png", "image/png", b"png");
        let mut att = store.add_root(ContextRef::course(Uuid::now_v7()), "cat.jpg", "image/jpeg", b"jpg");

        apply_placeholder(&mut att, &placeholder, MediaClass::Image);

        assert_eq!(att.root_attachment_id, Some(placeholder.id));
        assert_eq!(att.filename, "file_removed.png");
        assert_eq!(att.content_type, "image/png");
        assert_eq!(att.size_bytes, placeholder.size_bytes);
        assert_eq!(att.content_hash, placeholder.content_hash);
        assert_eq!(att.display_name, "cat.jpg.png");
        assert!(carries_placeholder(&att, &placeholder, MediaClass::Image));
    }
}
