use crate::{
    btree::{
        page::{BTreeLeafPage, BTreeLeafPageIteratorRc},
        table::table::{BTreeTable, SearchFor},
    },
    common::Database,
    execution::{Op, Predicate},
    storage::tuple::StoredTuple,
    transaction::{Permission, Transaction},
    types::Pod,
    utils::HandyRwLock,
};

impl BTreeTable {
    pub fn iter<'t>(&self, tx: &'t Transaction) -> BTreeTableIterator<'t> {
        BTreeTableIterator::new(tx, self)
    }

    pub fn search<'t>(
        &self,
        tx: &'t Transaction,
        predicate: &Predicate,
    ) -> BTreeTableSearchIterator<'t> {
        BTreeTableSearchIterator::new(tx, self, predicate)
    }
}

/// Walks every tuple in key order by following the leaf sibling
/// chain. Leaves are taken shared, one at a time.
pub struct BTreeTableIterator<'t> {
    tx: &'t Transaction,

    page_pod: Pod<BTreeLeafPage>,
    page_it: BTreeLeafPageIteratorRc,

    last_page_pod: Pod<BTreeLeafPage>,
    last_page_it: BTreeLeafPageIteratorRc,
}

impl<'t> BTreeTableIterator<'t> {
    pub fn new(tx: &'t Transaction, table: &BTreeTable) -> Self {
        let page_pod = table.get_first_page(tx, Permission::ReadOnly).unwrap();
        let last_page_pod = table.get_last_page(tx, Permission::ReadOnly).unwrap();

        Self {
            tx,
            page_pod: page_pod.clone(),
            page_it: BTreeLeafPageIteratorRc::new(page_pod),
            last_page_pod: last_page_pod.clone(),
            last_page_it: BTreeLeafPageIteratorRc::new(last_page_pod),
        }
    }
}

impl Iterator for BTreeTableIterator<'_> {
    type Item = StoredTuple;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(t) = self.page_it.next() {
            return Some(t);
        }

        // this leaf is exhausted, follow the chain right
        let right = self.page_pod.rl().get_right_pid();
        match right {
            Some(right) => {
                let sibling_pod = Database::buffer_pool()
                    .get_leaf_page(self.tx, Permission::ReadOnly, &right)
                    .unwrap();

                self.page_pod = sibling_pod.clone();
                self.page_it = BTreeLeafPageIteratorRc::new(sibling_pod);
                self.page_it.next()
            }
            None => None,
        }
    }
}

impl DoubleEndedIterator for BTreeTableIterator<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if let Some(t) = self.last_page_it.next_back() {
            return Some(t);
        }

        let left = self.last_page_pod.rl().get_left_pid();
        match left {
            Some(left) => {
                let sibling_pod = Database::buffer_pool()
                    .get_leaf_page(self.tx, Permission::ReadOnly, &left)
                    .unwrap();

                self.last_page_pod = sibling_pod.clone();
                self.last_page_it = BTreeLeafPageIteratorRc::new(sibling_pod);
                self.last_page_it.next_back()
            }
            None => None,
        }
    }
}

/// Key-aware scan: starts at the leaf the predicate points at (for
/// predicates on the key field) and stops as soon as key order rules
/// further matches out.
pub struct BTreeTableSearchIterator<'t> {
    tx: &'t Transaction,

    current_page_pod: Pod<BTreeLeafPage>,
    page_it: BTreeLeafPageIteratorRc,
    predicate: Predicate,
    search_field: usize,
    is_key_search: bool,
}

impl<'t> BTreeTableSearchIterator<'t> {
    pub fn new(tx: &'t Transaction, table: &BTreeTable, predicate: &Predicate) -> Self {
        let root_pid = table.get_root_pid(tx).unwrap();
        let is_key_search = predicate.field_index == table.key_field;

        let start_page_pod = if is_key_search {
            match predicate.op {
                Op::Equals | Op::GreaterThan | Op::GreaterThanOrEq => table
                    .find_leaf_page(
                        tx,
                        Permission::ReadOnly,
                        root_pid,
                        &SearchFor::Target(predicate.cell.clone()),
                    )
                    .unwrap(),
                _ => table
                    .find_leaf_page(tx, Permission::ReadOnly, root_pid, &SearchFor::LeftMost)
                    .unwrap(),
            }
        } else {
            table
                .find_leaf_page(tx, Permission::ReadOnly, root_pid, &SearchFor::LeftMost)
                .unwrap()
        };

        Self {
            tx,
            current_page_pod: start_page_pod.clone(),
            page_it: BTreeLeafPageIteratorRc::new(start_page_pod),
            predicate: predicate.clone(),
            search_field: predicate.field_index,
            is_key_search,
        }
    }
}

impl Iterator for BTreeTableSearchIterator<'_> {
    type Item = StoredTuple;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.page_it.next() {
                Some(t) => {
                    let field = t.get_cell(self.search_field);

                    if self.predicate.matches(&field) {
                        return Some(t);
                    }

                    // key-ordered short circuits
                    if self.is_key_search {
                        match self.predicate.op {
                            Op::Equals if field > self.predicate.cell => return None,
                            Op::LessThan | Op::LessThanOrEq
                                if field > self.predicate.cell =>
                            {
                                return None
                            }
                            _ => {}
                        }
                    }
                }
                None => {
                    // move to the next leaf
                    let right = self.current_page_pod.rl().get_right_pid();
                    match right {
                        Some(pid) => {
                            let pod = Database::buffer_pool()
                                .get_leaf_page(self.tx, Permission::ReadOnly, &pid)
                                .unwrap();
                            self.current_page_pod = pod.clone();
                            self.page_it = BTreeLeafPageIteratorRc::new(pod);
                        }
                        None => return None,
                    }
                }
            }
        }
    }
}
