use std::fs::File;
use std::io::{Error, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

/// Size of a single cached page of file data.
pub const PAGE_SIZE: u64 = 32 * 1024;

/// Maximum number of pages held in memory at once.
pub const PAGE_CACHE_CAPACITY: usize = 3;

#[derive(Debug)]
struct Page {
	index: u64,
	bytes: Box<[u8]>,
}

/// A random-access byte source over an opened file, presenting a movable logical cursor that
/// can be repositioned freely (including backwards) between reads. Bytes are served out of a
/// small cache of fixed-size pages kept in most-recently-used order, so that walking the same
/// region of the file repeatedly does not re-read it from disk.
///
/// `PagedReader` implements [std::io::Read], so the usual [byteorder::ReadBytesExt] methods
/// can be used to pull little-endian integers out of it. Reads past the end of the file stop
/// short, which surfaces as [std::io::ErrorKind::UnexpectedEof] from `read_exact` and friends.
#[derive(Debug)]
pub struct PagedReader {
	file: Option<File>,
	size: u64,
	position: u64,
	// cached pages, most recently used first
	pages: Vec<Page>,
}

impl PagedReader {
	/// Opens the file at the given path for reading and captures its total size. No pages are
	/// read until the first read request.
	pub fn open(path: &Path) -> Result<PagedReader, Error> {
		let file = File::open(path)?;
		let size = file.metadata()?.len();
		Ok(PagedReader {
			file: Some(file), //
			size,
			position: 0,
			pages: Vec::with_capacity(PAGE_CACHE_CAPACITY),
		})
	}

	/// Returns the total size of the underlying file in bytes.
	#[inline]
	pub fn size(&self) -> u64 {
		self.size
	}

	/// Returns the current logical cursor position.
	#[inline]
	pub fn position(&self) -> u64 {
		self.position
	}

	/// Moves the logical cursor to an absolute offset. The offset is not validated here; a
	/// subsequent read fails if it lies past the end of the file.
	#[inline]
	pub fn jump(&mut self, offset: u64) {
		self.position = offset;
	}

	/// Moves the logical cursor by a relative amount, which may be negative. Fails if the
	/// resulting offset would fall before the start of the file.
	pub fn skip(&mut self, delta: i64) -> Result<(), Error> {
		let new_position = if delta < 0 {
			self.position.checked_sub(delta.unsigned_abs())
		} else {
			self.position.checked_add(delta as u64)
		};
		match new_position {
			Some(position) => {
				self.position = position;
				Ok(())
			}
			None => Err(Error::new(ErrorKind::InvalidInput, "cannot seek before the start of the file")),
		}
	}

	/// Releases the underlying file handle and the page cache. Any read after this fails.
	/// Closing an already closed reader does nothing.
	pub fn close(&mut self) {
		self.file = None;
		self.pages.clear();
		self.pages.shrink_to_fit();
	}

	/// Returns the page covering the given page index, reading it from the file on a cache
	/// miss. The returned page is moved to the most-recently-used position unless it is
	/// already there; on a miss with a full cache the least recently used page is dropped.
	fn page(&mut self, index: u64) -> Result<&Page, Error> {
		if let Some(cached_at) = self.pages.iter().position(|page| page.index == index) {
			if cached_at != 0 {
				let page = self.pages.remove(cached_at);
				self.pages.insert(0, page);
			}
			return Ok(&self.pages[0]);
		}

		let file = match self.file.as_mut() {
			Some(file) => file,
			None => return Err(Error::new(ErrorKind::Other, "the reader has been closed")),
		};

		let start = index * PAGE_SIZE;
		let length = (self.size - start.min(self.size)).min(PAGE_SIZE) as usize;
		let mut bytes = vec![0u8; length];
		file.seek(SeekFrom::Start(start))?;
		file.read_exact(&mut bytes)?;

		if self.pages.len() == PAGE_CACHE_CAPACITY {
			self.pages.pop();
		}
		self.pages.insert(0, Page { index, bytes: bytes.into_boxed_slice() });
		Ok(&self.pages[0])
	}

	#[cfg(test)]
	fn cached_page_indexes(&self) -> Vec<u64> {
		self.pages.iter().map(|page| page.index).collect()
	}
}

impl Read for PagedReader {
	fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
		if self.file.is_none() {
			return Err(Error::new(ErrorKind::Other, "the reader has been closed"));
		}

		let available = self.size.saturating_sub(self.position.min(self.size));
		let wanted = (buf.len() as u64).min(available) as usize;
		let mut copied = 0;
		while copied < wanted {
			let page_index = self.position / PAGE_SIZE;
			let page_offset = (self.position % PAGE_SIZE) as usize;
			let page = self.page(page_index)?;
			let take = (wanted - copied).min(page.bytes.len() - page_offset);
			buf[copied..copied + take].copy_from_slice(&page.bytes[page_offset..page_offset + take]);
			copied += take;
			self.position += take as u64;
		}
		Ok(copied)
	}
}
