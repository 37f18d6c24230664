//! Inode Table (§4.3): inode records, five per block, read-modify-write
//! with no caching — the containing block is re-read on every call.

use crate::block::BlockDevice;
use crate::layout::{inode_block, inode_slot, zeroed_block, Block, DIRECT_BLOCKS};
use crate::Result;

/// File type: unused inode slot.
pub const TYPE_UNUSED: i32 = 0;
/// File type: regular file (directories are not used, per §3).
pub const TYPE_REGULAR: i32 = 2;

const TYPE_OFF: usize = 0;
const LINK_COUNT_OFF: usize = TYPE_OFF + 4;
const SIZE_OFF: usize = LINK_COUNT_OFF + 4;
const MODE_OFF: usize = SIZE_OFF + 4;
const DB_OFF: usize = MODE_OFF + 4;
/// Effective per-slot stride: fields take 60 bytes, but inodes are packed
/// five per 512-byte block (102 bytes/slot effective), per §6.
const SLOT_STRIDE: usize = 512 / 5;

/// In-memory view of one inode record.
#[derive(Debug, Clone, Copy)]
pub struct Inode {
	pub r#type: i32,
	pub link_count: i32,
	pub size: i32,
	pub mode: i32,
	pub db: [i32; DIRECT_BLOCKS],
}

impl Inode {
	/// A freshly allocated, empty inode: live (`TYPE_REGULAR`), one link,
	/// zero size, no data blocks yet.
	pub fn new_regular(mode: i32) -> Self {
		Self {
			r#type: TYPE_REGULAR,
			link_count: 1,
			size: 0,
			mode,
			db: [-1; DIRECT_BLOCKS],
		}
	}

	/// An all-zero, unused inode, as written by `init`.
	pub fn empty() -> Self {
		Self {
			r#type: TYPE_UNUSED,
			link_count: 0,
			size: 0,
			mode: 0,
			db: [-1; DIRECT_BLOCKS],
		}
	}

	pub fn is_live(&self) -> bool {
		self.r#type != TYPE_UNUSED
	}

	fn write_into(&self, block: &mut Block, slot: usize) {
		let base = slot * SLOT_STRIDE;
		block[base + TYPE_OFF..base + TYPE_OFF + 4].copy_from_slice(&self.r#type.to_ne_bytes());
		block[base + LINK_COUNT_OFF..base + LINK_COUNT_OFF + 4]
			.copy_from_slice(&self.link_count.to_ne_bytes());
		block[base + SIZE_OFF..base + SIZE_OFF + 4].copy_from_slice(&self.size.to_ne_bytes());
		block[base + MODE_OFF..base + MODE_OFF + 4].copy_from_slice(&self.mode.to_ne_bytes());
		for (i, d) in self.db.iter().enumerate() {
			let off = base + DB_OFF + i * 4;
			block[off..off + 4].copy_from_slice(&d.to_ne_bytes());
		}
	}

	fn read_from(block: &Block, slot: usize) -> Self {
		let base = slot * SLOT_STRIDE;
		let r#type = i32::from_ne_bytes(block[base + TYPE_OFF..base + TYPE_OFF + 4].try_into().unwrap());
		let link_count = i32::from_ne_bytes(
			block[base + LINK_COUNT_OFF..base + LINK_COUNT_OFF + 4].try_into().unwrap(),
		);
		let size = i32::from_ne_bytes(block[base + SIZE_OFF..base + SIZE_OFF + 4].try_into().unwrap());
		let mode = i32::from_ne_bytes(block[base + MODE_OFF..base + MODE_OFF + 4].try_into().unwrap());
		let mut db = [0i32; DIRECT_BLOCKS];
		for (i, slot_val) in db.iter_mut().enumerate() {
			let off = base + DB_OFF + i * 4;
			*slot_val = i32::from_ne_bytes(block[off..off + 4].try_into().unwrap());
		}
		Self {
			r#type,
			link_count,
			size,
			mode,
			db,
		}
	}
}

/// Loads inode `n`'s containing block and returns its record by value.
pub fn read_inode<D: BlockDevice>(dev: &mut D, n: u32) -> Result<Inode> {
	let mut block = zeroed_block();
	dev.read_block(inode_block(n), &mut block)?;
	Ok(Inode::read_from(&block, inode_slot(n)))
}

/// Read-modify-write: loads inode `n`'s containing block, overwrites its
/// slot, writes the block back.
pub fn write_inode<D: BlockDevice>(dev: &mut D, n: u32, inode: &Inode) -> Result<()> {
	let disk_block = inode_block(n);
	let mut block = zeroed_block();
	dev.read_block(disk_block, &mut block)?;
	inode.write_into(&mut block, inode_slot(n));
	dev.write_block(disk_block, &block)
}

/// Writes every inode table block to the freshly-initialized state: all
/// slots unused, as `init` does (§3 Lifecycle).
pub fn init_inode_table<D: BlockDevice>(dev: &mut D) -> Result<()> {
	let empty = Inode::empty();
	for disk_block in
		crate::layout::INODE_TABLE_BLOCK_START..crate::layout::INODE_TABLE_BLOCK_START + crate::layout::INODE_TABLE_BLOCK_COUNT
	{
		let mut block = zeroed_block();
		for slot in 0..crate::layout::INODES_PER_BLOCK as usize {
			empty.write_into(&mut block, slot);
		}
		dev.write_block(disk_block, &block)?;
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::block::FileBlockDevice;
	use tempfile::NamedTempFile;

	fn fresh_dev() -> FileBlockDevice {
		let tmp = NamedTempFile::new().unwrap();
		let mut dev = FileBlockDevice::open(tmp.path()).unwrap();
		init_inode_table(&mut dev).unwrap();
		dev
	}

	#[test]
	fn round_trip_preserves_all_fields() {
		let mut dev = fresh_dev();
		let mut inode = Inode::new_regular(0o644);
		inode.size = 1234;
		inode.db[0] = 7;
		inode.db[10] = 1099;
		write_inode(&mut dev, 42, &inode).unwrap();

		let back = read_inode(&mut dev, 42).unwrap();
		assert_eq!(back.r#type, TYPE_REGULAR);
		assert_eq!(back.size, 1234);
		assert_eq!(back.mode, 0o644);
		assert_eq!(back.db[0], 7);
		assert_eq!(back.db[10], 1099);
		assert_eq!(back.db[1], -1);
	}

	#[test]
	fn sibling_slots_in_same_block_are_independent() {
		let mut dev = fresh_dev();
		// inodes 0..5 share disk block 4
		write_inode(&mut dev, 0, &Inode::new_regular(1)).unwrap();
		write_inode(&mut dev, 1, &Inode::new_regular(2)).unwrap();

		assert_eq!(read_inode(&mut dev, 0).unwrap().mode, 1);
		assert_eq!(read_inode(&mut dev, 1).unwrap().mode, 2);
		assert!(!read_inode(&mut dev, 2).unwrap().is_live());
	}
}
