//! Superblock (block 0): image tag, free/total counts, inode bitmap.

use crate::block::BlockDevice;
use crate::layout::{zeroed_block, Block, SUPERBLOCK_BLOCK, TOTAL_INODES};
use crate::Result;

/// The constant 5-byte tag stamped into every image this crate creates.
pub const IMAGE_TAG: [u8; 5] = *b"bfs01";

const NAME_OFF: usize = 0;
const NAME_LEN: usize = 5;
const FREE_INODES_OFF: usize = NAME_OFF + NAME_LEN;
const FREE_DATA_OFF: usize = FREE_INODES_OFF + 4;
const TOTAL_INODES_OFF: usize = FREE_DATA_OFF + 4;
const TOTAL_DATA_OFF: usize = TOTAL_INODES_OFF + 4;
const INODE_BITMAP_OFF: usize = TOTAL_DATA_OFF + 4;
const INODE_BITMAP_LEN: usize = TOTAL_INODES as usize;

/// In-memory view of the on-disk superblock.
#[derive(Debug, Clone)]
pub struct Superblock {
	pub name: [u8; 5],
	pub free_inodes: i32,
	pub free_data: i32,
	pub total_inodes: i32,
	pub total_data: i32,
	pub inode_bitmap: [u8; INODE_BITMAP_LEN],
}

impl Superblock {
	/// A fresh superblock as written by `init` (§3 Lifecycle): every inode
	/// free, full counts.
	pub fn fresh() -> Self {
		Self {
			name: IMAGE_TAG,
			free_inodes: TOTAL_INODES as i32,
			free_data: crate::layout::DATA_BLOCK_COUNT as i32,
			total_inodes: TOTAL_INODES as i32,
			total_data: crate::layout::DATA_BLOCK_COUNT as i32,
			inode_bitmap: [0u8; INODE_BITMAP_LEN],
		}
	}

	pub fn to_block(&self) -> Block {
		let mut block = zeroed_block();
		block[NAME_OFF..NAME_OFF + NAME_LEN].copy_from_slice(&self.name);
		block[FREE_INODES_OFF..FREE_INODES_OFF + 4]
			.copy_from_slice(&self.free_inodes.to_ne_bytes());
		block[FREE_DATA_OFF..FREE_DATA_OFF + 4].copy_from_slice(&self.free_data.to_ne_bytes());
		block[TOTAL_INODES_OFF..TOTAL_INODES_OFF + 4]
			.copy_from_slice(&self.total_inodes.to_ne_bytes());
		block[TOTAL_DATA_OFF..TOTAL_DATA_OFF + 4].copy_from_slice(&self.total_data.to_ne_bytes());
		block[INODE_BITMAP_OFF..INODE_BITMAP_OFF + INODE_BITMAP_LEN]
			.copy_from_slice(&self.inode_bitmap);
		block
	}

	pub fn from_block(block: &Block) -> Self {
		let mut name = [0u8; 5];
		name.copy_from_slice(&block[NAME_OFF..NAME_OFF + NAME_LEN]);
		let free_inodes = i32::from_ne_bytes(
			block[FREE_INODES_OFF..FREE_INODES_OFF + 4].try_into().unwrap(),
		);
		let free_data =
			i32::from_ne_bytes(block[FREE_DATA_OFF..FREE_DATA_OFF + 4].try_into().unwrap());
		let total_inodes = i32::from_ne_bytes(
			block[TOTAL_INODES_OFF..TOTAL_INODES_OFF + 4].try_into().unwrap(),
		);
		let total_data = i32::from_ne_bytes(
			block[TOTAL_DATA_OFF..TOTAL_DATA_OFF + 4].try_into().unwrap(),
		);
		let mut inode_bitmap = [0u8; INODE_BITMAP_LEN];
		inode_bitmap.copy_from_slice(&block[INODE_BITMAP_OFF..INODE_BITMAP_OFF + INODE_BITMAP_LEN]);
		Self {
			name,
			free_inodes,
			free_data,
			total_inodes,
			total_data,
			inode_bitmap,
		}
	}
}

/// Reads the superblock from disk.
pub fn read_superblock<D: BlockDevice>(dev: &mut D) -> Result<Superblock> {
	let mut block = zeroed_block();
	dev.read_block(SUPERBLOCK_BLOCK, &mut block)?;
	Ok(Superblock::from_block(&block))
}

/// Persists the superblock to disk.
pub fn write_superblock<D: BlockDevice>(dev: &mut D, sb: &Superblock) -> Result<()> {
	dev.write_block(SUPERBLOCK_BLOCK, &sb.to_block())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn round_trip() {
		let mut sb = Superblock::fresh();
		sb.inode_bitmap[3] = 1;
		sb.free_inodes -= 1;
		let block = sb.to_block();
		let back = Superblock::from_block(&block);
		assert_eq!(back.name, sb.name);
		assert_eq!(back.free_inodes, sb.free_inodes);
		assert_eq!(back.inode_bitmap[3], 1);
	}

	#[test]
	fn fresh_counts_match_spec() {
		let sb = Superblock::fresh();
		assert_eq!(sb.free_inodes, 100);
		assert_eq!(sb.free_data, 1100);
		assert_eq!(sb.total_inodes, 100);
		assert_eq!(sb.total_data, 1100);
		assert!(sb.inode_bitmap.iter().all(|&b| b == 0));
	}
}
