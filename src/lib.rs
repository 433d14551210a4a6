//! larch: a didactic single-file B-tree storage engine.
//!
//! One database file holds a forest of B-trees (one per table or index)
//! over a shared, fixed-size paged address space, laid out in the SQLite
//! file format subset documented in `format`. The `BTree` handle owns a
//! `Pager` that performs all file I/O; nodes are typed views over pages
//! and reference each other by page number only.
//!
//! ```no_run
//! use larch::BTree;
//!
//! # fn main() -> larch::Result<()> {
//! let mut bt = BTree::open("inventory.cdb")?;
//! bt.insert_in_table(1, 1, b"Hard Drive")?;
//! assert_eq!(bt.find(1, 1)?, b"Hard Drive");
//! bt.close()?;
//! # Ok(())
//! # }
//! ```

pub mod btree;
pub mod error;
pub mod format;
pub mod node;
pub mod pager;
pub mod varint;

pub use btree::BTree;
pub use error::{LarchError, Result};
pub use format::{DatabaseHeader, PageType};
pub use node::{BTreeCell, BTreeNode, SearchOutcome};
pub use pager::{Page, PageNumber, Pager};
