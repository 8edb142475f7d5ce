use std::cmp;

use log::debug;

use crate::{
    btree::{
        page::{
            BTreeInternalPage, BTreeInternalPageIterator, BTreeLeafPage,
            BTreeLeafPageIterator, Entry,
        },
        table::table::BTreeTable,
    },
    common::Database,
    error::DbError,
    storage::{
        page::{Page, PageCategory, PageId},
        tuple::StoredTuple,
    },
    transaction::{Permission, Transaction},
    types::{DbResult, Pod},
    utils::HandyRwLock,
};

// delete-related methods
impl BTreeTable {
    /// Delete a tuple by its record id. Pages falling below half-full
    /// steal from a sibling or merge with one, possibly collapsing the
    /// root.
    pub fn delete_tuple(&self, tx: &Transaction, tuple: &StoredTuple) -> DbResult {
        let pid = tuple.get_pid();
        let leaf_pod = Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &pid)?;

        // hold the leaf
        {
            let mut leaf = leaf_pod.wl();
            leaf.delete_tuple(tuple.get_slot_index());
            leaf.mark_dirty(Some(tx));
        }
        // release the leaf

        if leaf_pod.rl().stable() {
            return Ok(());
        }
        self.handle_deficient_leaf(tx, leaf_pod)
    }

    /// A leaf went below half-full. Prefer the left sibling when it
    /// hangs off the same parent, else the right one; a sibling with
    /// spare tuples donates, otherwise the two pages merge.
    fn handle_deficient_leaf(
        &self,
        tx: &Transaction,
        page_pod: Pod<BTreeLeafPage>,
    ) -> DbResult {
        if page_pod.rl().get_parent_pid().category == PageCategory::RootPointer {
            return Ok(());
        }

        let parent_pid = page_pod.rl().get_parent_pid();
        let left_pid = page_pod.rl().get_left_pid();
        let right_pid = page_pod.rl().get_right_pid();

        if let Some(left_pid) = left_pid {
            let left_pod =
                Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &left_pid)?;
            if left_pod.rl().get_parent_pid() == parent_pid {
                return self.balance_leaf_pages(tx, left_pod, page_pod);
            }
        }

        if let Some(right_pid) = right_pid {
            let right_pod =
                Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &right_pid)?;
            if right_pod.rl().get_parent_pid() == parent_pid {
                return self.balance_leaf_pages(tx, page_pod, right_pod);
            }
        }

        Err(DbError::new(&format!(
            "leaf {} has no same-parent sibling to balance with",
            page_pod.rl().get_pid()
        )))
    }

    /// Merge the two leaves when everything fits in one page,
    /// otherwise move tuples until both sides are balanced and update
    /// the parent key to the first key of the right-hand page.
    fn balance_leaf_pages(
        &self,
        tx: &Transaction,
        left_pod: Pod<BTreeLeafPage>,
        right_pod: Pod<BTreeLeafPage>,
    ) -> DbResult {
        let parent_pod = Database::buffer_pool().get_internal_page(
            tx,
            Permission::ReadWrite,
            &left_pod.rl().get_parent_pid(),
        )?;
        let mut entry = parent_pod
            .rl()
            .get_entry_by_children(&left_pod.rl().get_pid(), &right_pod.rl().get_pid())
            .ok_or_else(|| {
                DbError::new(&format!(
                    "no parent entry between {} and {}",
                    left_pod.rl().get_pid(),
                    right_pod.rl().get_pid()
                ))
            })?;

        let left_tuples = left_pod.rl().tuples_count();
        let right_tuples = right_pod.rl().tuples_count();

        if left_tuples + right_tuples <= left_pod.rl().get_slots_count() {
            return self.merge_leaf_pages(tx, left_pod, right_pod, parent_pod, &entry);
        }

        let move_count =
            (left_tuples + right_tuples) / 2 - cmp::min(left_tuples, right_tuples);

        // hold the left and right page
        {
            let mut left = left_pod.wl();
            let mut right = right_pod.wl();

            if left_tuples < right_tuples {
                // steal from the right: its smallest tuples move left
                let mut deleted_slots = Vec::new();
                {
                    let it = BTreeLeafPageIterator::new(&right);
                    for tuple in it.take(move_count) {
                        deleted_slots.push(tuple.get_slot_index());
                        left.insert_tuple(&tuple);
                    }
                }
                for slot in deleted_slots {
                    right.delete_tuple(slot);
                }
            } else {
                // steal from the left: its largest tuples move right
                let mut deleted_slots = Vec::new();
                {
                    let it = BTreeLeafPageIterator::new(&left);
                    for tuple in it.rev().take(move_count) {
                        deleted_slots.push(tuple.get_slot_index());
                        right.insert_tuple(&tuple);
                    }
                }
                for slot in deleted_slots {
                    left.delete_tuple(slot);
                }
            }

            left.mark_dirty(Some(tx));
            right.mark_dirty(Some(tx));

            // the separator follows the right page's new first tuple
            let mut it = BTreeLeafPageIterator::new(&right);
            let key = it.next().unwrap().get_cell(self.key_field);
            entry.set_key(key);
        }
        // release the left and right page

        let mut parent = parent_pod.wl();
        parent.update_entry(&entry);
        parent.mark_dirty(Some(tx));
        Ok(())
    }

    /// Move every tuple of the right page into the left one, splice
    /// the sibling chain around the dead page, reclaim it, and delete
    /// the separating entry from the parent.
    fn merge_leaf_pages(
        &self,
        tx: &Transaction,
        left_pod: Pod<BTreeLeafPage>,
        right_pod: Pod<BTreeLeafPage>,
        parent_pod: Pod<BTreeInternalPage>,
        entry: &Entry,
    ) -> DbResult {
        debug!(
            "merging leaf {} into {}",
            right_pod.rl().get_pid(),
            left_pod.rl().get_pid()
        );

        // hold the left and right page
        {
            let mut left = left_pod.wl();
            let mut right = right_pod.wl();

            let mut deleted_slots = Vec::new();
            {
                let it = BTreeLeafPageIterator::new(&right);
                for tuple in it {
                    deleted_slots.push(tuple.get_slot_index());
                    left.insert_tuple(&tuple);
                }
            }
            for slot in deleted_slots {
                right.delete_tuple(slot);
            }

            left.set_right_pid(right.get_right_pid());
            if let Some(new_right_pid) = right.get_right_pid() {
                let new_right_pod = Database::buffer_pool().get_leaf_page(
                    tx,
                    Permission::ReadWrite,
                    &new_right_pid,
                )?;
                let mut new_right = new_right_pod.wl();
                new_right.set_left_pid(Some(left.get_pid()));
                new_right.mark_dirty(Some(tx));
            }

            left.mark_dirty(Some(tx));

            self.reclaim_page(tx, &right.get_pid())?;
        }
        // release the left and right page

        self.delete_parent_entry(tx, left_pod, parent_pod, entry)
    }

    /// Remove an entry (key plus right child) from a parent. An empty
    /// root hands its last child over to the root pointer; a parent
    /// below half-full rebalances against its own siblings.
    fn delete_parent_entry<PAGE: Page>(
        &self,
        tx: &Transaction,
        left_pod: Pod<PAGE>,
        parent_pod: Pod<BTreeInternalPage>,
        entry: &Entry,
    ) -> DbResult {
        // hold the parent and the surviving child
        {
            let mut parent = parent_pod.wl();
            let mut left = left_pod.wl();

            parent.delete_key_and_right_child(entry.get_record_id());
            parent.mark_dirty(Some(tx));

            if parent.entries_count() == 0 {
                if parent.get_parent_pid().category != PageCategory::RootPointer {
                    return Err(DbError::new(&format!(
                        "non-root internal page {} became empty",
                        parent.get_pid()
                    )));
                }

                // root collapse: the surviving child is the new root
                let root_ptr_pod = self.get_root_ptr_page(tx)?;
                {
                    let mut root_ptr = root_ptr_pod.wl();
                    left.set_parent_pid(&root_ptr.get_pid());
                    left.mark_dirty(Some(tx));
                    root_ptr.set_root_pid(&left.get_pid());
                    root_ptr.mark_dirty(Some(tx));
                }

                self.reclaim_page(tx, &parent.get_pid())?;
                return Ok(());
            }

            if parent.stable() {
                return Ok(());
            }
        }
        // release the parent and the surviving child

        self.handle_deficient_internal(tx, parent_pod)
    }

    /// An internal page went below half-full; rebalance it against a
    /// same-parent sibling found through the grandparent.
    fn handle_deficient_internal(
        &self,
        tx: &Transaction,
        page_pod: Pod<BTreeInternalPage>,
    ) -> DbResult {
        if page_pod.rl().get_parent_pid().category == PageCategory::RootPointer {
            return Ok(());
        }

        let (left_pid, right_pid) = self.internal_siblings(tx, &page_pod)?;

        if let Some(left_pid) = left_pid {
            let left_pod =
                Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &left_pid)?;
            return self.balance_internal_pages(tx, left_pod, page_pod);
        }
        if let Some(right_pid) = right_pid {
            let right_pod = Database::buffer_pool().get_internal_page(
                tx,
                Permission::ReadWrite,
                &right_pid,
            )?;
            return self.balance_internal_pages(tx, page_pod, right_pod);
        }

        Err(DbError::new(&format!(
            "internal page {} has no sibling to balance with",
            page_pod.rl().get_pid()
        )))
    }

    /// Internal pages carry no sibling pointers; the neighbors come
    /// from the adjacent children in the parent.
    fn internal_siblings(
        &self,
        tx: &Transaction,
        page_pod: &Pod<BTreeInternalPage>,
    ) -> Result<(Option<PageId>, Option<PageId>), DbError> {
        let pid = page_pod.rl().get_pid();
        let parent_pid = page_pod.rl().get_parent_pid();

        let parent_pod =
            Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &parent_pid)?;
        let parent = parent_pod.rl();

        let mut left: Option<PageId> = None;
        let mut right: Option<PageId> = None;
        for e in BTreeInternalPageIterator::new(&parent) {
            if e.get_right_child() == pid {
                left = Some(e.get_left_child());
            }
            if e.get_left_child() == pid {
                right = Some(e.get_right_child());
            }
        }

        Ok((left, right))
    }

    /// Merge when both fit into one page; otherwise rotate entries
    /// through the parent: the parent key comes down into the
    /// deficient page, the donor's adjacent key goes up to replace it,
    /// and the moved subtree is reparented.
    fn balance_internal_pages(
        &self,
        tx: &Transaction,
        left_pod: Pod<BTreeInternalPage>,
        right_pod: Pod<BTreeInternalPage>,
    ) -> DbResult {
        let parent_pod = Database::buffer_pool().get_internal_page(
            tx,
            Permission::ReadWrite,
            &left_pod.rl().get_parent_pid(),
        )?;
        let mut entry = parent_pod
            .rl()
            .get_entry_by_children(&left_pod.rl().get_pid(), &right_pod.rl().get_pid())
            .ok_or_else(|| {
                DbError::new(&format!(
                    "no parent entry between {} and {}",
                    left_pod.rl().get_pid(),
                    right_pod.rl().get_pid()
                ))
            })?;

        let left_children = left_pod.rl().children_count();
        let right_children = right_pod.rl().children_count();

        if left_children + right_children <= left_pod.rl().get_children_cap() {
            return self.merge_internal_pages(tx, left_pod, right_pod, parent_pod, &entry);
        }

        let move_count =
            (left_children + right_children) / 2 - cmp::min(left_children, right_children);
        if move_count == 0 {
            return Ok(());
        }

        let mut middle_key = entry.get_key();

        if left_children < right_children {
            // rotate entries from the right page's front into the left
            let moved: Vec<Entry> = {
                let right = right_pod.rl();
                BTreeInternalPageIterator::new(&right)
                    .take(move_count)
                    .collect()
            };

            let mut edge_child = left_pod.rl().get_last_child_pid();
            for e in moved {
                {
                    let mut left = left_pod.wl();
                    let new_entry = Entry::new(&middle_key, &edge_child, &e.get_left_child());
                    left.insert_entry(&new_entry)?;
                    left.mark_dirty(Some(tx));
                }
                self.set_parent(tx, &e.get_left_child(), &left_pod.rl().get_pid())?;

                {
                    let mut right = right_pod.wl();
                    right.delete_key_and_left_child(e.get_record_id());
                    right.mark_dirty(Some(tx));
                }

                middle_key = e.get_key();
                edge_child = e.get_left_child();
            }
        } else {
            // rotate entries from the left page's back into the right
            let moved: Vec<Entry> = {
                let left = left_pod.rl();
                BTreeInternalPageIterator::new(&left)
                    .rev()
                    .take(move_count)
                    .collect()
            };

            let mut edge_child = right_pod.rl().get_first_child_pid();
            for e in moved {
                {
                    let mut right = right_pod.wl();
                    let new_entry = Entry::new(&middle_key, &e.get_right_child(), &edge_child);
                    right.insert_entry(&new_entry)?;
                    right.mark_dirty(Some(tx));
                }
                self.set_parent(tx, &e.get_right_child(), &right_pod.rl().get_pid())?;

                {
                    let mut left = left_pod.wl();
                    left.delete_key_and_right_child(e.get_record_id());
                    left.mark_dirty(Some(tx));
                }

                middle_key = e.get_key();
                edge_child = e.get_right_child();
            }
        }

        entry.set_key(middle_key);
        let mut parent = parent_pod.wl();
        parent.update_entry(&entry);
        parent.mark_dirty(Some(tx));
        Ok(())
    }

    /// Pull the parent key down as the separator between left's last
    /// child and right's first child, move every right entry over,
    /// reparent the moved children, reclaim the dead page and drop the
    /// parent entry.
    fn merge_internal_pages(
        &self,
        tx: &Transaction,
        left_pod: Pod<BTreeInternalPage>,
        right_pod: Pod<BTreeInternalPage>,
        parent_pod: Pod<BTreeInternalPage>,
        entry: &Entry,
    ) -> DbResult {
        debug!(
            "merging internal {} into {}",
            right_pod.rl().get_pid(),
            left_pod.rl().get_pid()
        );

        // stage 1: pull the parent key down
        let edge_entry = Entry::new(
            &entry.get_key(),
            &left_pod.rl().get_last_child_pid(),
            &right_pod.rl().get_first_child_pid(),
        );
        self.set_parent(
            tx,
            &right_pod.rl().get_first_child_pid(),
            &left_pod.rl().get_pid(),
        )?;
        {
            let mut left = left_pod.wl();
            left.insert_entry(&edge_entry)?;
            left.mark_dirty(Some(tx));
        }

        // stage 2: move the right page's entries over
        let moved: Vec<Entry> = {
            let right = right_pod.rl();
            BTreeInternalPageIterator::new(&right).collect()
        };
        for e in &moved {
            {
                let mut left = left_pod.wl();
                left.insert_entry(e)?;
                left.mark_dirty(Some(tx));
            }
            self.set_parent(tx, &e.get_right_child(), &left_pod.rl().get_pid())?;
        }
        {
            let mut right = right_pod.wl();
            for e in &moved {
                right.delete_key_and_right_child(e.get_record_id());
            }
            right.mark_dirty(Some(tx));
        }

        // stage 3: reclaim the dead page
        self.reclaim_page(tx, &right_pod.rl().get_pid())?;

        // stage 4: the separating entry leaves the parent
        self.delete_parent_entry(tx, left_pod, parent_pod, entry)
    }

    /// Register the page in the header bitmap (creating the first
    /// header page on demand) and drop it from the cache so the slot
    /// can be handed out again.
    pub(crate) fn reclaim_page(&self, tx: &Transaction, pid: &PageId) -> DbResult {
        Database::buffer_pool().discard_page(pid);

        let root_ptr_pod = self.get_root_ptr_page(tx)?;

        let header_pod = match root_ptr_pod.rl().get_header_pid() {
            Some(header_pid) => Database::buffer_pool().get_header_page(
                tx,
                Permission::ReadWrite,
                &header_pid,
            )?,
            None => self.get_empty_header_page(tx)?,
        };

        {
            let mut root_ptr = root_ptr_pod.wl();
            root_ptr.set_header_pid(&header_pod.rl().get_pid());
            root_ptr.mark_dirty(Some(tx));
        }

        // hold the header page
        {
            let mut header = header_pod.wl();
            let slot_index = pid.page_index as usize % header.get_slots_count();
            header.mark_slot_status(slot_index, true);
            header.mark_dirty(Some(tx));
        }
        // release the header page

        debug!("page {} reclaimed", pid);
        Ok(())
    }
}
