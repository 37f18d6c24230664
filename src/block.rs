//! Block Device Adapter (§4.1).
//!
//! Wraps the external read/write-block primitives. Every metadata and data
//! access funnels through `BlockDevice`; there is no caching layer, so
//! callers must batch any updates they make within a single block into one
//! read-modify-write instead of issuing several reads of the same block.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::trace;

use crate::layout::{Block, BLOCK_SIZE};
use crate::Result;

/// The external block-addressable storage primitive this filesystem is
/// built on: `read_block`/`write_block` at a given logical block index.
/// Implementations are assumed synchronous and reliable, per §1.
pub trait BlockDevice {
	/// Reads block `index` in full.
	fn read_block(&mut self, index: u32, buf: &mut Block) -> Result<()>;
	/// Writes block `index` in full.
	fn write_block(&mut self, index: u32, buf: &Block) -> Result<()>;
}

/// A `BlockDevice` backed by a single flat disk-image file.
pub struct FileBlockDevice {
	file: File,
}

impl FileBlockDevice {
	/// Opens (creating if necessary) the disk image at `path` for
	/// read/write block access.
	pub fn open(path: &Path) -> Result<Self> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.open(path)?;
		Ok(Self { file })
	}
}

impl BlockDevice for FileBlockDevice {
	fn read_block(&mut self, index: u32, buf: &mut Block) -> Result<()> {
		trace!("read_block({index})");
		let offset = (index as u64) * (BLOCK_SIZE as u64);
		self.file.seek(SeekFrom::Start(offset))?;
		// A block past the current end of a freshly created image hasn't
		// been written yet; treat it as all-zero rather than erroring.
		match self.file.read_exact(buf) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
				buf.fill(0);
				Ok(())
			}
			Err(e) => Err(e.into()),
		}
	}

	fn write_block(&mut self, index: u32, buf: &Block) -> Result<()> {
		trace!("write_block({index})");
		let offset = (index as u64) * (BLOCK_SIZE as u64);
		self.file.seek(SeekFrom::Start(offset))?;
		self.file.write_all(buf)?;
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use tempfile::NamedTempFile;

	#[test]
	fn round_trip() {
		let tmp = NamedTempFile::new().unwrap();
		let mut dev = FileBlockDevice::open(tmp.path()).unwrap();

		let mut block = [0u8; BLOCK_SIZE];
		block[0] = 0xAB;
		block[511] = 0xCD;
		dev.write_block(3, &block).unwrap();

		let mut out = [0u8; BLOCK_SIZE];
		dev.read_block(3, &mut out).unwrap();
		assert_eq!(out, block);
	}

	#[test]
	fn unwritten_block_reads_as_zero() {
		let tmp = NamedTempFile::new().unwrap();
		let mut dev = FileBlockDevice::open(tmp.path()).unwrap();

		let mut out = [0xffu8; BLOCK_SIZE];
		dev.read_block(42, &mut out).unwrap();
		assert_eq!(out, [0u8; BLOCK_SIZE]);
	}
}
