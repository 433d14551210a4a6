// B-tree engine over the paged file.
//
// A single file holds a forest of B-trees sharing one paged address
// space: one table or index per tree, nodes referencing children by page
// number. This module owns the classical algorithms (search, insert,
// split) for the four node variants; all I/O goes through the pager.

use std::path::Path;

use tracing::{debug, trace};

use crate::error::{LarchError, Result};
use crate::format::{DatabaseHeader, PageType, DEFAULT_PAGE_SIZE, HEADER_SIZE, LEAF_HEADER_SIZE};
use crate::node::{BTreeCell, BTreeNode, SearchOutcome};
use crate::pager::{Page, PageNumber, Pager};
use crate::varint;

/// Handle to an open B-tree file. Owns the pager, which owns the file.
pub struct BTree {
    pager: Pager,
}

impl BTree {
    /// Open a database file, verifying its header; an empty or missing
    /// file is initialised with the default page size and an empty
    /// table-leaf root on page 1.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut pager = Pager::open(path)?;
        match pager.read_header() {
            Ok(buf) => {
                let header = DatabaseHeader::parse(&buf)?;
                // The page size is configuration, not a checked constant,
                // but the geometry must be usable: page 1 has to hold the
                // database header plus a node.
                if header.page_size < 512 {
                    return Err(LarchError::CorruptHeader(format!(
                        "unusable page size: {}",
                        header.page_size
                    )));
                }
                pager.set_page_size(header.page_size as usize)?;
                debug!(page_size = header.page_size, "opened existing database");
                Ok(Self { pager })
            }
            Err(LarchError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                let mut bt = Self { pager };
                bt.pager.set_page_size(DEFAULT_PAGE_SIZE as usize)?;
                let npage = bt.new_node(PageType::TableLeaf)?;
                let mut page = bt.pager.read_page(npage)?;
                let mut header_buf = [0u8; HEADER_SIZE];
                DatabaseHeader::new(DEFAULT_PAGE_SIZE).write(&mut header_buf);
                page.data[..HEADER_SIZE].copy_from_slice(&header_buf);
                bt.pager.write_page(&page)?;
                debug!(page_size = DEFAULT_PAGE_SIZE, "initialised new database");
                Ok(bt)
            }
            Err(e) => Err(e),
        }
    }

    /// Sync and close the underlying file.
    pub fn close(self) -> Result<()> {
        self.pager.close()
    }

    /// The file's page size.
    pub fn page_size(&self) -> usize {
        self.pager.page_size()
    }

    /// Number of pages in the file.
    pub fn n_pages(&self) -> u32 {
        self.pager.n_pages()
    }

    /// Load the node on page `npage`.
    pub fn load_node(&mut self, npage: PageNumber) -> Result<BTreeNode> {
        let page = self.pager.read_page(npage)?;
        BTreeNode::parse(page)
    }

    /// Release a node without writing it back. Dropping the node is
    /// equivalent; the method keeps load/release pairs visible.
    pub fn free_node(&mut self, node: BTreeNode) {
        drop(node);
    }

    /// Write a node's header and page back to the file.
    pub fn store_node(&mut self, node: &mut BTreeNode) -> Result<()> {
        node.write_header();
        self.pager.write_page(node.page())
    }

    /// Allocate a fresh page and initialise it as an empty node.
    pub fn new_node(&mut self, page_type: PageType) -> Result<PageNumber> {
        let npage = self.pager.allocate_page()?;
        self.init_empty(npage, page_type)?;
        Ok(npage)
    }

    /// Initialise an already-allocated page as an empty node of the given
    /// type.
    pub fn init_empty(&mut self, npage: PageNumber, page_type: PageType) -> Result<()> {
        let page = self.pager.read_page(npage)?;
        let mut node = BTreeNode::init(page, page_type, self.pager.page_size());
        self.store_node(&mut node)
    }

    /// Find the payload stored under `key` in the table tree rooted at
    /// `nroot`.
    pub fn find(&mut self, nroot: PageNumber, key: u32) -> Result<Vec<u8>> {
        self.lookup(nroot, nroot, key)
    }

    /// Find a payload through an index: locate `key_idx` in the index
    /// tree, then look its keyPk up in the table tree.
    pub fn find_via_index(
        &mut self,
        index_root: PageNumber,
        table_root: PageNumber,
        key_idx: u32,
    ) -> Result<Vec<u8>> {
        self.lookup(index_root, table_root, key_idx)
    }

    fn lookup(&mut self, start: PageNumber, table_root: PageNumber, mut key: u32) -> Result<Vec<u8>> {
        let mut npage = start;
        let mut restarted = false;
        loop {
            let node = self.load_node(npage)?;
            match node.search(key)? {
                SearchOutcome::Found(ncell) => match node.cell(ncell)? {
                    BTreeCell::TableLeaf { payload, .. } => return Ok(payload.to_vec()),
                    // Keys up to and including an interior table key live
                    // in the child to its left.
                    BTreeCell::TableInterior { child, .. } => npage = child,
                    BTreeCell::IndexInterior { key_pk, .. }
                    | BTreeCell::IndexLeaf { key_pk, .. } => {
                        // An index hit resolves in the table tree; two
                        // hits in a row mean the table root is itself an
                        // index tree.
                        if restarted {
                            return Err(LarchError::CorruptHeader(
                                "index entry resolves into another index tree".into(),
                            ));
                        }
                        trace!(key_idx = key, key_pk, "index hit, restarting at table root");
                        restarted = true;
                        key = key_pk;
                        npage = table_root;
                    }
                },
                SearchOutcome::NotFound(ncell) => {
                    if node.page_type.is_leaf() {
                        return Err(LarchError::NotFound);
                    }
                    npage = node.child_page(ncell)?;
                }
            }
        }
    }

    /// Whether `key` exists in the tree rooted at `nroot`.
    fn contains(&mut self, nroot: PageNumber, key: u32) -> Result<bool> {
        let mut npage = nroot;
        loop {
            let node = self.load_node(npage)?;
            match node.search(key)? {
                SearchOutcome::Found(_) => return Ok(true),
                SearchOutcome::NotFound(ncell) => {
                    if node.page_type.is_leaf() {
                        return Ok(false);
                    }
                    npage = node.child_page(ncell)?;
                }
            }
        }
    }

    /// Insert a row into the table tree rooted at `nroot`.
    pub fn insert_in_table(&mut self, nroot: PageNumber, key: u32, data: &[u8]) -> Result<()> {
        self.insert(
            nroot,
            &BTreeCell::TableLeaf {
                key,
                payload: data,
            },
        )
    }

    /// Insert an entry into the index tree rooted at `nroot`.
    pub fn insert_in_index(&mut self, nroot: PageNumber, key_idx: u32, key_pk: u32) -> Result<()> {
        self.insert(nroot, &BTreeCell::IndexLeaf { key_idx, key_pk })
    }

    /// Insert a cell into the tree rooted at `nroot`.
    ///
    /// The root's page number is preserved across a root split: table and
    /// index directories hold root page numbers, so the root must never
    /// move.
    pub fn insert(&mut self, nroot: PageNumber, cell: &BTreeCell) -> Result<()> {
        // A cell that cannot fit even an empty leaf would make every
        // split recurse without progress.
        if cell.size_on_disk() + LEAF_HEADER_SIZE + 2 > self.pager.page_size() {
            return Err(LarchError::CellTooLarge(cell.size_on_disk()));
        }
        // Table keys travel as varints; reject one that cannot encode
        // before any node is touched.
        if cell.page_type().is_table() && cell.key() > varint::MAX_VARINT32 {
            return Err(LarchError::VarintOverflow);
        }
        // Probe before touching any page, so a duplicate leaves the file
        // untouched.
        if self.contains(nroot, cell.key())? {
            return Err(LarchError::Duplicate(cell.key()));
        }

        let root = self.load_node(nroot)?;
        if !root.fits_on_descent(cell) {
            self.split_root(root)?;
        } else {
            self.free_node(root);
        }
        self.insert_non_full(nroot, cell)
    }

    /// Split a full root in place: its contents move to a fresh page, the
    /// root page becomes an interior node over that copy, and the copy is
    /// split as its first child.
    fn split_root(&mut self, root: BTreeNode) -> Result<()> {
        let nroot = root.page_number();
        let root_type = root.page_type;
        debug!(root = nroot, "root full, splitting in place");

        let ncopy = self.pager.allocate_page()?;
        let copy_page = self.pager.read_page(ncopy)?;
        let mut copy = BTreeNode::init(copy_page, root_type, self.pager.page_size());
        for ncell in 0..root.n_cells {
            let cell = root.cell(ncell)?;
            copy.insert_cell(ncell, &cell)?;
        }
        copy.right_page = root.right_page;
        self.store_node(&mut copy)?;
        self.free_node(copy);

        let mut new_root = self.blank_node(root.page(), root_type.as_interior());
        new_root.right_page = ncopy;
        self.store_node(&mut new_root)?;
        self.free_node(new_root);
        self.free_node(root);

        self.split(nroot, ncopy, 0)?;
        Ok(())
    }

    fn insert_non_full(&mut self, npage: PageNumber, cell: &BTreeCell) -> Result<()> {
        let node = self.load_node(npage)?;
        let ncell = match node.search(cell.key())? {
            SearchOutcome::Found(_) => return Err(LarchError::Duplicate(cell.key())),
            SearchOutcome::NotFound(ncell) => ncell,
        };

        if node.page_type.is_leaf() {
            let mut node = node;
            node.insert_cell(ncell, cell)?;
            return self.store_node(&mut node);
        }

        let nchild = node.child_page(ncell)?;
        let child = self.load_node(nchild)?;
        let child_full = !child.fits_on_descent(cell);
        self.free_node(child);

        let next = if child_full {
            self.free_node(node);
            self.split(npage, nchild, ncell)?;
            // The split rewrote this node; re-read it to pick the side of
            // the promoted key the new cell belongs on.
            let node = self.load_node(npage)?;
            let ncell = match node.search(cell.key())? {
                SearchOutcome::Found(_) => return Err(LarchError::Duplicate(cell.key())),
                SearchOutcome::NotFound(ncell) => ncell,
            };
            let next = node.child_page(ncell)?;
            self.free_node(node);
            next
        } else {
            self.free_node(node);
            nchild
        };
        self.insert_non_full(next, cell)
    }

    /// Split the child at `parent_ncell` of `npage_parent`, promoting its
    /// median into the parent. Returns the page number of the new left
    /// sibling.
    pub fn split(
        &mut self,
        npage_parent: PageNumber,
        npage_child: PageNumber,
        parent_ncell: u16,
    ) -> Result<PageNumber> {
        let mut parent = self.load_node(npage_parent)?;
        let child = self.load_node(npage_child)?;
        if child.n_cells == 0 {
            return Err(LarchError::Empty);
        }

        let npage_new = self.new_node(child.page_type)?;
        let mut new = self.load_node(npage_new)?;
        let median = child.n_cells / 2;

        // Cells below the median move to the new left sibling.
        for ncell in 0..median {
            let cell = child.cell(ncell)?;
            new.insert_cell(ncell, &cell)?;
        }

        // Promote the median. A table-leaf split keeps a copy of the
        // median row in the left sibling; the other variants move the
        // median up entirely, an interior median donating its child as
        // the left sibling's rightmost pointer.
        let promoted: BTreeCell<'static> = match child.cell(median)? {
            cell @ BTreeCell::TableLeaf { .. } => {
                new.insert_cell(median, &cell)?;
                BTreeCell::TableInterior {
                    key: cell.key(),
                    child: npage_new,
                }
            }
            BTreeCell::TableInterior {
                key,
                child: median_child,
            } => {
                new.right_page = median_child;
                BTreeCell::TableInterior {
                    key,
                    child: npage_new,
                }
            }
            BTreeCell::IndexInterior {
                key_idx,
                key_pk,
                child: median_child,
            } => {
                new.right_page = median_child;
                BTreeCell::IndexInterior {
                    key_idx,
                    key_pk,
                    child: npage_new,
                }
            }
            BTreeCell::IndexLeaf { key_idx, key_pk } => BTreeCell::IndexInterior {
                key_idx,
                key_pk,
                child: npage_new,
            },
        };

        // Rebuild the split child from its upper half on a fresh buffer,
        // compacting the cell area.
        let mut rebuilt = self.blank_node(child.page(), child.page_type);
        rebuilt.right_page = child.right_page;
        let mut pos = 0u16;
        for ncell in (median + 1)..child.n_cells {
            let cell = child.cell(ncell)?;
            rebuilt.insert_cell(pos, &cell)?;
            pos += 1;
        }

        parent.insert_cell(parent_ncell, &promoted)?;

        self.store_node(&mut new)?;
        self.store_node(&mut rebuilt)?;
        self.store_node(&mut parent)?;
        self.free_node(child);

        debug!(
            parent = npage_parent,
            child = npage_child,
            sibling = npage_new,
            promoted_key = promoted.key(),
            "split node"
        );
        Ok(npage_new)
    }

    /// A zeroed buffer for `old`'s page, viewed as an empty node. Page 1
    /// keeps its database header bytes.
    fn blank_node(&self, old: &Page, page_type: PageType) -> BTreeNode {
        let mut page = Page::new(old.number, self.pager.page_size());
        if old.number == 1 {
            page.data[..HEADER_SIZE].copy_from_slice(&old.data[..HEADER_SIZE]);
        }
        BTreeNode::init(page, page_type, self.pager.page_size())
    }
}
