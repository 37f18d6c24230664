//! Allocators (§4.2): the inode bitmap (inside the superblock) and the
//! three-block data bitmap. Both provide allocate/free of a single unit,
//! lowest-index-wins, with no caching — every call re-reads what it needs.

use log::debug;

use crate::block::BlockDevice;
use crate::error::Error;
use crate::layout::{
	bitmap_block_for, bitmap_byte_for, data_block, zeroed_block, BITMAP_BLOCK_START,
	BITMAP_BYTES_PER_BLOCK, BITMAP_SENTINEL_BYTE, BITMAP_SENTINEL_VALUE, DATA_BLOCK_COUNT,
	TOTAL_INODES,
};
use crate::superblock::{read_superblock, write_superblock};
use crate::Result;

/// Allocates the lowest-numbered free inode, marking it used and
/// persisting the superblock. Fails with `OutOfInodes` when none remain.
pub fn allocate_inode<D: BlockDevice>(dev: &mut D) -> Result<u32> {
	let mut sb = read_superblock(dev)?;
	if sb.free_inodes <= 0 {
		return Err(Error::OutOfInodes);
	}
	let slot = (0..TOTAL_INODES).find(|&n| sb.inode_bitmap[n as usize] == 0);
	let Some(n) = slot else {
		return Err(Error::OutOfInodes);
	};
	sb.inode_bitmap[n as usize] = 1;
	sb.free_inodes -= 1;
	write_superblock(dev, &sb)?;
	debug!("allocate_inode -> {n}");
	Ok(n)
}

/// Frees inode `n`, incrementing the free count and persisting the
/// superblock.
pub fn free_inode<D: BlockDevice>(dev: &mut D, n: u32) -> Result<()> {
	let mut sb = read_superblock(dev)?;
	sb.inode_bitmap[n as usize] = 0;
	sb.free_inodes += 1;
	write_superblock(dev, &sb)?;
	debug!("free_inode({n})");
	Ok(())
}

/// Allocates the lowest-numbered free logical data block, marking it used
/// and persisting both the bitmap block and the superblock. Fails with
/// `OutOfDataBlocks` when none remain.
pub fn allocate_data<D: BlockDevice>(dev: &mut D) -> Result<u32> {
	let mut sb = read_superblock(dev)?;
	if sb.free_data <= 0 {
		return Err(Error::OutOfDataBlocks);
	}

	for block_idx in 0..crate::layout::BITMAP_BLOCK_COUNT {
		let disk_block = BITMAP_BLOCK_START + block_idx;
		let mut buf = zeroed_block();
		dev.read_block(disk_block, &mut buf)?;
		let limit = if block_idx == crate::layout::BITMAP_BLOCK_COUNT - 1 {
			BITMAP_SENTINEL_BYTE
		} else {
			BITMAP_BYTES_PER_BLOCK
		};
		if let Some(byte_idx) = (0..limit).find(|&i| buf[i as usize] == 0) {
			buf[byte_idx as usize] = 1;
			dev.write_block(disk_block, &buf)?;
			sb.free_data -= 1;
			write_superblock(dev, &sb)?;
			let d = block_idx * BITMAP_BYTES_PER_BLOCK + byte_idx;
			debug!("allocate_data -> {d}");
			return Ok(d);
		}
	}
	Err(Error::OutOfDataBlocks)
}

/// Frees logical data block `d`: zeroes the backing data block, clears its
/// bitmap byte, increments the free count, persists both.
pub fn free_data<D: BlockDevice>(dev: &mut D, d: u32) -> Result<()> {
	dev.write_block(data_block(d), &zeroed_block())?;

	let disk_block = bitmap_block_for(d);
	let mut buf = zeroed_block();
	dev.read_block(disk_block, &mut buf)?;
	buf[bitmap_byte_for(d)] = 0;
	dev.write_block(disk_block, &buf)?;

	let mut sb = read_superblock(dev)?;
	sb.free_data += 1;
	write_superblock(dev, &sb)?;
	debug!("free_data({d})");
	Ok(())
}

/// Writes the three data-bitmap blocks to their freshly-initialized state
/// (all zero except the sentinel byte), as `init` does (§3 Lifecycle).
pub fn init_data_bitmap<D: BlockDevice>(dev: &mut D) -> Result<()> {
	for block_idx in 0..crate::layout::BITMAP_BLOCK_COUNT {
		let mut buf = zeroed_block();
		if block_idx == crate::layout::BITMAP_BLOCK_COUNT - 1 {
			buf[BITMAP_SENTINEL_BYTE as usize] = BITMAP_SENTINEL_VALUE;
		}
		dev.write_block(BITMAP_BLOCK_START + block_idx, &buf)?;
	}
	Ok(())
}

/// Counts free data blocks by scanning the bitmap directly, bypassing the
/// superblock's cached `free_data` counter. Used by tests to check
/// invariant 1 of §8 (`free_data == count(data_bitmap[d] == 0)`).
#[cfg(test)]
pub fn count_free_data<D: BlockDevice>(dev: &mut D) -> Result<u32> {
	let mut free = 0;
	for d in 0..DATA_BLOCK_COUNT {
		let disk_block = bitmap_block_for(d);
		let mut buf = zeroed_block();
		dev.read_block(disk_block, &mut buf)?;
		if buf[bitmap_byte_for(d)] == 0 {
			free += 1;
		}
	}
	Ok(free)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::block::FileBlockDevice;
	use tempfile::NamedTempFile;

	fn fresh_dev() -> FileBlockDevice {
		let tmp = NamedTempFile::new().unwrap();
		let mut dev = FileBlockDevice::open(tmp.path()).unwrap();
		write_superblock(&mut dev, &crate::superblock::Superblock::fresh()).unwrap();
		init_data_bitmap(&mut dev).unwrap();
		dev
	}

	#[test]
	fn inode_allocation_is_lowest_index_first() {
		let mut dev = fresh_dev();
		assert_eq!(allocate_inode(&mut dev).unwrap(), 0);
		assert_eq!(allocate_inode(&mut dev).unwrap(), 1);
		free_inode(&mut dev, 0).unwrap();
		assert_eq!(allocate_inode(&mut dev).unwrap(), 0);
	}

	#[test]
	fn inode_exhaustion() {
		let mut dev = fresh_dev();
		for _ in 0..TOTAL_INODES {
			allocate_inode(&mut dev).unwrap();
		}
		assert!(matches!(allocate_inode(&mut dev), Err(Error::OutOfInodes)));
	}

	#[test]
	fn data_allocation_skips_sentinel_and_is_lowest_index_first() {
		let mut dev = fresh_dev();
		assert_eq!(allocate_data(&mut dev).unwrap(), 0);
		assert_eq!(allocate_data(&mut dev).unwrap(), 1);
		assert_eq!(count_free_data(&mut dev).unwrap(), DATA_BLOCK_COUNT - 2);
	}

	#[test]
	fn data_exhaustion_respects_sentinel_boundary() {
		let mut dev = fresh_dev();
		for _ in 0..DATA_BLOCK_COUNT {
			allocate_data(&mut dev).unwrap();
		}
		assert!(matches!(allocate_data(&mut dev), Err(Error::OutOfDataBlocks)));
		assert_eq!(count_free_data(&mut dev).unwrap(), 0);
	}

	#[test]
	fn free_data_zeroes_block_and_clears_bitmap() {
		let mut dev = fresh_dev();
		let d = allocate_data(&mut dev).unwrap();
		dev.write_block(data_block(d), &[0x42; crate::layout::BLOCK_SIZE]).unwrap();
		free_data(&mut dev, d).unwrap();

		let mut buf = zeroed_block();
		dev.read_block(data_block(d), &mut buf).unwrap();
		assert_eq!(buf, zeroed_block());
		assert_eq!(count_free_data(&mut dev).unwrap(), DATA_BLOCK_COUNT);
	}
}
