// Page-based I/O layer between the B-tree and the filesystem.
//
// The pager reads and writes fixed-size pages. Each read hands out an
// owned buffer, so the tree layer can hold several pages at once (a split
// touches three); releasing a page is dropping it. Writes go straight
// through to the file, with a sync on close.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::{LarchError, Result};
use crate::format::HEADER_SIZE;

/// A page number. Page 1 is the first page (contains the database header).
/// Page 0 is invalid.
pub type PageNumber = u32;

/// A single database page, read from or destined for disk.
#[derive(Clone)]
pub struct Page {
    /// The page number (1-based).
    pub number: PageNumber,
    /// Raw page data.
    pub data: Vec<u8>,
}

impl Page {
    pub fn new(number: PageNumber, page_size: usize) -> Self {
        Self {
            number,
            data: vec![0u8; page_size],
        }
    }
}

/// The pager manages reading and writing pages from/to the database file.
pub struct Pager {
    path: PathBuf,
    file: File,
    /// Page size in bytes. Zero until `set_page_size` is called.
    page_size: usize,
    /// Number of pages the file logically holds. Pages allocated but not
    /// yet written read back as zeroes.
    n_pages: u32,
}

impl Pager {
    /// Open a database file, creating it if it does not exist.
    ///
    /// The page size is not yet known at this point; the caller reads the
    /// header (or picks a default) and calls `set_page_size` before any
    /// page is touched.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;
        debug!(path = %path.display(), "pager opened");
        Ok(Self {
            path,
            file,
            page_size: 0,
            n_pages: 0,
        })
    }

    /// Sync and close the file.
    pub fn close(self) -> Result<()> {
        self.file.sync_all().map_err(io_err)?;
        Ok(())
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configure the page size and derive the page count from the file
    /// length. Must be called before the first page allocation or read.
    ///
    /// A trailing partial page does not count; a file shorter than one
    /// page holds no pages, so the first allocation returns page 1.
    pub fn set_page_size(&mut self, size: usize) -> Result<()> {
        let len = self.file.metadata().map_err(io_err)?.len();
        self.page_size = size;
        self.n_pages = (len / size as u64) as u32;
        trace!(size, n_pages = self.n_pages, "page size set");
        Ok(())
    }

    /// The configured page size.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages in the file.
    pub fn n_pages(&self) -> u32 {
        self.n_pages
    }

    /// Read the 100-byte file header.
    ///
    /// A file shorter than the header reports `UnexpectedEof`; the caller
    /// treats that as an empty database to initialise.
    pub fn read_header(&mut self) -> Result<[u8; HEADER_SIZE]> {
        let len = self.file.metadata().map_err(io_err)?.len();
        if len < HEADER_SIZE as u64 {
            return Err(LarchError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file is shorter than the database header",
            )));
        }
        let mut buf = [0u8; HEADER_SIZE];
        self.file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        self.file.read_exact(&mut buf).map_err(io_err)?;
        Ok(buf)
    }

    /// Append a page to the address space, returning its number. The page
    /// contents come into existence on the first write.
    pub fn allocate_page(&mut self) -> Result<PageNumber> {
        debug_assert!(self.page_size > 0, "page size must be set first");
        self.n_pages += 1;
        trace!(npage = self.n_pages, "page allocated");
        Ok(self.n_pages)
    }

    /// Read a page by number into an owned buffer.
    ///
    /// A page past the end of the file (allocated but never written) reads
    /// as zeroes.
    pub fn read_page(&mut self, npage: PageNumber) -> Result<Page> {
        if npage == 0 || npage > self.n_pages {
            return Err(LarchError::PageNo(npage));
        }
        let mut page = Page::new(npage, self.page_size);
        let offset = (npage as u64 - 1) * self.page_size as u64;
        let file_len = self.file.metadata().map_err(io_err)?.len();
        if offset < file_len {
            let available = (file_len - offset).min(self.page_size as u64) as usize;
            self.file.seek(SeekFrom::Start(offset)).map_err(io_err)?;
            self.file
                .read_exact(&mut page.data[..available])
                .map_err(io_err)?;
        }
        Ok(page)
    }

    /// Write a page back to the file.
    pub fn write_page(&mut self, page: &Page) -> Result<()> {
        if page.number == 0 || page.number > self.n_pages {
            return Err(LarchError::PageNo(page.number));
        }
        debug_assert_eq!(page.data.len(), self.page_size);
        let offset = (page.number as u64 - 1) * self.page_size as u64;
        self.file.seek(SeekFrom::Start(offset)).map_err(io_err)?;
        self.file.write_all(&page.data).map_err(io_err)?;
        Ok(())
    }
}

/// The offset within a page where the B-tree node starts.
/// For page 1, this is after the 100-byte database header.
/// For all other pages, it's at the start.
pub fn btree_header_offset(page_num: PageNumber) -> usize {
    if page_num == 1 {
        HEADER_SIZE
    } else {
        0
    }
}

fn io_err(e: io::Error) -> LarchError {
    if e.kind() == io::ErrorKind::OutOfMemory {
        LarchError::NoMem
    } else {
        LarchError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::DEFAULT_PAGE_SIZE;

    fn test_pager(dir: &tempfile::TempDir, name: &str) -> Pager {
        let mut pager = Pager::open(dir.path().join(name)).unwrap();
        pager.set_page_size(DEFAULT_PAGE_SIZE as usize).unwrap();
        pager
    }

    #[test]
    fn test_allocate_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = test_pager(&dir, "alloc.db");

        assert_eq!(pager.n_pages(), 0);
        assert_eq!(pager.allocate_page().unwrap(), 1);
        assert_eq!(pager.allocate_page().unwrap(), 2);

        let mut page = pager.read_page(2).unwrap();
        page.data[0] = 0xAB;
        page.data[1023] = 0xCD;
        pager.write_page(&page).unwrap();

        let page = pager.read_page(2).unwrap();
        assert_eq!(page.data[0], 0xAB);
        assert_eq!(page.data[1023], 0xCD);
    }

    #[test]
    fn test_unwritten_page_reads_zeroed() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = test_pager(&dir, "zeroed.db");
        let npage = pager.allocate_page().unwrap();
        let page = pager.read_page(npage).unwrap();
        assert!(page.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_invalid_page_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = test_pager(&dir, "bounds.db");
        pager.allocate_page().unwrap();

        assert!(matches!(pager.read_page(0), Err(LarchError::PageNo(0))));
        assert!(matches!(pager.read_page(2), Err(LarchError::PageNo(2))));
        let stray = Page::new(5, DEFAULT_PAGE_SIZE as usize);
        assert!(matches!(
            pager.write_page(&stray),
            Err(LarchError::PageNo(5))
        ));
    }

    #[test]
    fn test_read_header_short_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(dir.path().join("short.db")).unwrap();
        let err = pager.read_header().unwrap_err();
        match err {
            LarchError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reopen_sees_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.db");

        {
            let mut pager = Pager::open(&path).unwrap();
            pager.set_page_size(DEFAULT_PAGE_SIZE as usize).unwrap();
            let npage = pager.allocate_page().unwrap();
            let mut page = pager.read_page(npage).unwrap();
            page.data[7] = 0x77;
            pager.write_page(&page).unwrap();
            pager.close().unwrap();
        }

        let mut pager = Pager::open(&path).unwrap();
        pager.set_page_size(DEFAULT_PAGE_SIZE as usize).unwrap();
        assert_eq!(pager.n_pages(), 1);
        let page = pager.read_page(1).unwrap();
        assert_eq!(page.data[7], 0x77);
    }

    #[test]
    fn test_btree_header_offset() {
        assert_eq!(btree_header_offset(1), 100);
        assert_eq!(btree_header_offset(2), 0);
        assert_eq!(btree_header_offset(100), 0);
    }
}
