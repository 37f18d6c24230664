//! File I/O Engine (§4.5): maps `(offset, size)` to a sequence of direct
//! block slots, performs partial-block reads/writes, lazily allocates on
//! write, and maintains the in-inode size. No partial-block zero-fill and
//! no hole reads: the direct table is small and allocated contiguously on
//! write, so skipping holes keeps the read path branch-free over gap
//! semantics (§4.5 rationale).

use crate::bitmap::allocate_data;
use crate::block::BlockDevice;
use crate::inode::{read_inode, write_inode};
use crate::layout::{data_block, zeroed_block, BLOCK_SIZE, DIRECT_BLOCKS, MAX_FILE_SIZE};
use crate::Result;

/// First and last direct-block slot (inclusive) touched by `[offset,
/// offset+size)`, already clamped to the 11-slot direct table (§4.5).
fn slot_range(offset: u64, size: u64) -> (usize, usize) {
	let first = (offset / BLOCK_SIZE as u64) as usize;
	let last_exclusive_block = (offset + size).div_ceil(BLOCK_SIZE as u64) as usize;
	let last = last_exclusive_block.saturating_sub(1).min(DIRECT_BLOCKS - 1);
	(first, last)
}

/// Reads up to `out.len()` bytes starting at `offset` from inode
/// `inode_num`. Stops at the first unallocated slot (a hole) without
/// zero-filling past it. Returns the number of bytes actually produced.
pub fn read<D: BlockDevice>(dev: &mut D, inode_num: u32, offset: u64, out: &mut [u8]) -> Result<usize> {
	if out.is_empty() || offset >= MAX_FILE_SIZE {
		return Ok(0);
	}
	let inode = read_inode(dev, inode_num)?;
	let size = out.len() as u64;
	let (first, last) = slot_range(offset, size);

	let mut produced = 0u64;
	for x in first..=last {
		if inode.db[x] < 0 {
			break;
		}
		let slot_start = (x as u64) * BLOCK_SIZE as u64;
		let slot_end = slot_start + BLOCK_SIZE as u64;
		let win_start = offset.max(slot_start);
		let win_end = (offset + size).min(slot_end);
		if win_end <= win_start {
			break;
		}

		let mut buf = zeroed_block();
		dev.read_block(data_block(inode.db[x] as u32), &mut buf)?;
		let src = (win_start - slot_start) as usize..(win_end - slot_start) as usize;
		let dst = (win_start - offset) as usize..(win_end - offset) as usize;
		out[dst].copy_from_slice(&buf[src]);
		produced = produced.max(win_end - offset);
	}
	Ok(produced as usize)
}

/// Writes `data` starting at `offset` into inode `inode_num`, allocating
/// fresh data blocks as needed and preserving bytes outside the written
/// window in every touched block. Truncates to `MAX_FILE_SIZE` when the
/// requested range would need a 12th direct block (§4.5, §7), returning the
/// truncated byte count rather than erroring.
pub fn write<D: BlockDevice>(dev: &mut D, inode_num: u32, offset: u64, data: &[u8]) -> Result<usize> {
	if offset >= MAX_FILE_SIZE || data.is_empty() {
		return Ok(0);
	}
	let mut inode = read_inode(dev, inode_num)?;

	let capped_end = (offset + data.len() as u64).min(MAX_FILE_SIZE);
	let capped_len = (capped_end - offset) as usize;
	let data = &data[..capped_len];
	let size = data.len() as u64;
	let (first, last) = slot_range(offset, size);

	for x in first..=last {
		if inode.db[x] < 0 {
			let d = allocate_data(dev)?;
			dev.write_block(data_block(d), &zeroed_block())?;
			inode.db[x] = d as i32;
		}
	}

	let mut written = 0u64;
	for x in first..=last {
		let slot_start = (x as u64) * BLOCK_SIZE as u64;
		let slot_end = slot_start + BLOCK_SIZE as u64;
		let win_start = offset.max(slot_start);
		let win_end = (offset + size).min(slot_end);
		if win_end <= win_start {
			break;
		}

		let disk_block = data_block(inode.db[x] as u32);
		let mut buf = zeroed_block();
		dev.read_block(disk_block, &mut buf)?;
		let dst = (win_start - slot_start) as usize..(win_end - slot_start) as usize;
		let src = (win_start - offset) as usize..(win_end - offset) as usize;
		buf[dst].copy_from_slice(&data[src]);
		dev.write_block(disk_block, &buf)?;
		written = written.max(win_end - offset);
	}

	inode.size = inode.size.max((offset + written) as i32);
	write_inode(dev, inode_num, &inode)?;
	Ok(written as usize)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::bitmap::init_data_bitmap;
	use crate::block::FileBlockDevice;
	use crate::inode::{init_inode_table, Inode};
	use crate::superblock::{write_superblock, Superblock};
	use tempfile::NamedTempFile;

	fn fresh_dev_with_inode() -> FileBlockDevice {
		let tmp = NamedTempFile::new().unwrap();
		let mut dev = FileBlockDevice::open(tmp.path()).unwrap();
		write_superblock(&mut dev, &Superblock::fresh()).unwrap();
		init_data_bitmap(&mut dev).unwrap();
		init_inode_table(&mut dev).unwrap();
		write_inode(&mut dev, 0, &Inode::new_regular(0o644)).unwrap();
		dev
	}

	#[test]
	fn write_then_read_within_one_block() {
		let mut dev = fresh_dev_with_inode();
		let n = write(&mut dev, 0, 0, b"hello").unwrap();
		assert_eq!(n, 5);

		let mut out = [0u8; 5];
		let got = read(&mut dev, 0, 0, &mut out).unwrap();
		assert_eq!(got, 5);
		assert_eq!(&out, b"hello");
		assert_eq!(read_inode(&mut dev, 0).unwrap().size, 5);
	}

	#[test]
	fn cross_block_write_spans_two_slots() {
		let mut dev = fresh_dev_with_inode();
		let payload = vec![b'x'; 20];
		let n = write(&mut dev, 0, 500, &payload).unwrap();
		assert_eq!(n, 20);

		let inode = read_inode(&mut dev, 0).unwrap();
		assert!(inode.db[0] >= 0);
		assert!(inode.db[1] >= 0);
		assert_eq!(inode.size, 520);

		let mut out = vec![0u8; 20];
		let got = read(&mut dev, 0, 500, &mut out).unwrap();
		assert_eq!(got, 20);
		assert_eq!(out, payload);
	}

	#[test]
	fn write_beyond_cap_is_truncated() {
		let mut dev = fresh_dev_with_inode();
		let payload = vec![b'z'; 6000];
		let n = write(&mut dev, 0, 0, &payload).unwrap();
		assert_eq!(n, MAX_FILE_SIZE as usize);

		let inode = read_inode(&mut dev, 0).unwrap();
		assert!(inode.db.iter().all(|&d| d >= 0));
		assert_eq!(inode.size, MAX_FILE_SIZE as i32);
	}

	#[test]
	fn later_write_overrides_earlier_overlap() {
		let mut dev = fresh_dev_with_inode();
		write(&mut dev, 0, 0, b"aaaaaaaaaa").unwrap();
		write(&mut dev, 0, 3, b"BBB").unwrap();

		let mut out = [0u8; 10];
		read(&mut dev, 0, 0, &mut out).unwrap();
		assert_eq!(&out, b"aaaBBBaaaa");
	}

	#[test]
	fn read_stops_at_hole_without_zero_fill() {
		let mut dev = fresh_dev_with_inode();
		// only write into slot 0; slot 1 (bytes 512..) stays a hole
		write(&mut dev, 0, 0, b"hi").unwrap();

		let mut out = [0xffu8; 600];
		let got = read(&mut dev, 0, 0, &mut out).unwrap();
		assert_eq!(got, 2);
	}

	#[test]
	fn read_with_no_allocated_first_slot_returns_zero() {
		let mut dev = fresh_dev_with_inode();
		let mut out = [0u8; 10];
		let got = read(&mut dev, 0, 0, &mut out).unwrap();
		assert_eq!(got, 0);
	}
}
