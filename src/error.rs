use thiserror::Error;

use crate::pager::PageNumber;

#[derive(Error, Debug)]
pub enum LarchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt database: {0}")]
    CorruptHeader(String),

    #[error("invalid page number: {0}")]
    PageNo(PageNumber),

    #[error("invalid cell number: {0}")]
    CellNo(u16),

    #[error("key not found")]
    NotFound,

    #[error("duplicate key: {0}")]
    Duplicate(u32),

    #[error("node has no cells")]
    Empty,

    /// Reported when the OS signals an allocation failure through the
    /// file layer. Heap allocation failure aborts the process instead.
    #[error("out of memory")]
    NoMem,

    #[error("value does not fit in a 4-byte varint")]
    VarintOverflow,

    #[error("cell of {0} bytes cannot fit in a page")]
    CellTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, LarchError>;
