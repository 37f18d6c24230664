//! Directory (§4.4): a flat name-to-inode mapping, four entries per block
//! across 25 blocks. Directory slot `s` always corresponds to inode `s`
//! (the allocator pairs them one-to-one at creation, §3 invariant).

use crate::block::BlockDevice;
use crate::layout::{dirent_block, dirent_slot, zeroed_block, Block, MAX_NAME_LEN, NAME_FIELD_LEN};
use crate::Result;

const NAME_OFF: usize = 0;
const INODE_NUM_OFF: usize = NAME_OFF + NAME_FIELD_LEN;
const ENTRY_LEN: usize = INODE_NUM_OFF + 4;

/// Sentinel `inode_num` value for an unused directory slot.
pub const FREE_SLOT: i32 = -1;

/// In-memory view of one directory entry.
#[derive(Debug, Clone)]
pub struct DirEntry {
	pub name: [u8; NAME_FIELD_LEN],
	pub inode_num: i32,
}

impl DirEntry {
	pub fn free() -> Self {
		Self {
			name: [0u8; NAME_FIELD_LEN],
			inode_num: FREE_SLOT,
		}
	}

	pub fn is_free(&self) -> bool {
		self.name[0] == 0
	}

	/// The stored name as a `&str`, up to the zero terminator. Lossy on
	/// non-UTF8 input; host paths are expected to be UTF-8.
	pub fn name_str(&self) -> &str {
		let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
		std::str::from_utf8(&self.name[..end]).unwrap_or("")
	}

	fn write_into(&self, block: &mut Block, slot: usize) {
		let base = slot * ENTRY_LEN;
		block[base + NAME_OFF..base + NAME_OFF + NAME_FIELD_LEN].copy_from_slice(&self.name);
		block[base + INODE_NUM_OFF..base + INODE_NUM_OFF + 4]
			.copy_from_slice(&self.inode_num.to_ne_bytes());
	}

	fn read_from(block: &Block, slot: usize) -> Self {
		let base = slot * ENTRY_LEN;
		let mut name = [0u8; NAME_FIELD_LEN];
		name.copy_from_slice(&block[base + NAME_OFF..base + NAME_OFF + NAME_FIELD_LEN]);
		let inode_num = i32::from_ne_bytes(
			block[base + INODE_NUM_OFF..base + INODE_NUM_OFF + 4].try_into().unwrap(),
		);
		Self { name, inode_num }
	}
}

/// The location of a directory slot that has already been looked up, so a
/// caller that wants to mutate it (insert/remove) doesn't have to re-scan.
#[derive(Debug, Clone, Copy)]
pub struct Location {
	pub slot: u32,
	pub disk_block: u32,
	pub slot_in_block: usize,
}

/// Looks up `path` by C-string-style equality over the full 120-byte
/// field (§4.4, §9 "path equality"): the entire received path, including
/// the leading `/`, is compared. Returns `None` on a miss.
pub fn lookup<D: BlockDevice>(dev: &mut D, path: &str) -> Result<Option<(i32, Location)>> {
	for block_offset in 0..crate::layout::DIR_BLOCK_COUNT {
		let disk_block = crate::layout::DIR_BLOCK_START + block_offset;
		let mut block = zeroed_block();
		dev.read_block(disk_block, &mut block)?;
		for slot_in_block in 0..crate::layout::DIRENTS_PER_BLOCK as usize {
			let entry = DirEntry::read_from(&block, slot_in_block);
			if !entry.is_free() && entry.name_str() == path {
				let slot = block_offset * crate::layout::DIRENTS_PER_BLOCK + slot_in_block as u32;
				return Ok(Some((
					entry.inode_num,
					Location {
						slot,
						disk_block,
						slot_in_block,
					},
				)));
			}
		}
	}
	Ok(None)
}

/// Reads the directory entry at slot `s` directly, without scanning: the
/// directory slot index equals the inode number by construction (§3
/// invariant), so a caller that already has an inode number can recover
/// its name in one block read instead of a full 100-slot scan.
pub fn get<D: BlockDevice>(dev: &mut D, s: u32) -> Result<DirEntry> {
	let mut block = zeroed_block();
	dev.read_block(dirent_block(s), &mut block)?;
	Ok(DirEntry::read_from(&block, dirent_slot(s)))
}

/// Places `path` at the directory slot equal to `inode_num` (block
/// `24 + n/4`, slot `n%4`); copies up to `MAX_NAME_LEN` bytes of `path` and
/// zero-terminates, per §4.4.
pub fn insert<D: BlockDevice>(dev: &mut D, path: &str, inode_num: u32) -> Result<()> {
	let bytes = &path.as_bytes()[..path.len().min(MAX_NAME_LEN)];
	let mut name = [0u8; NAME_FIELD_LEN];
	name[..bytes.len()].copy_from_slice(bytes);
	let entry = DirEntry {
		name,
		inode_num: inode_num as i32,
	};

	let disk_block = dirent_block(inode_num);
	let slot_in_block = dirent_slot(inode_num);
	let mut block = zeroed_block();
	dev.read_block(disk_block, &mut block)?;
	entry.write_into(&mut block, slot_in_block);
	dev.write_block(disk_block, &block)
}

/// Clears the name field at a previously looked-up location.
pub fn remove<D: BlockDevice>(dev: &mut D, loc: Location) -> Result<()> {
	let mut block = zeroed_block();
	dev.read_block(loc.disk_block, &mut block)?;
	DirEntry::free().write_into(&mut block, loc.slot_in_block);
	dev.write_block(loc.disk_block, &block)
}

/// Calls `emit` with every non-empty directory entry's name, backing the
/// `readdir` host operation (§4.4).
pub fn iterate<D: BlockDevice>(dev: &mut D, mut emit: impl FnMut(&str)) -> Result<()> {
	for block_offset in 0..crate::layout::DIR_BLOCK_COUNT {
		let disk_block = crate::layout::DIR_BLOCK_START + block_offset;
		let mut block = zeroed_block();
		dev.read_block(disk_block, &mut block)?;
		for slot_in_block in 0..crate::layout::DIRENTS_PER_BLOCK as usize {
			let entry = DirEntry::read_from(&block, slot_in_block);
			if !entry.is_free() {
				emit(entry.name_str());
			}
		}
	}
	Ok(())
}

/// Writes every directory block to the freshly-initialized state: every
/// slot free, as `init` does (§3 Lifecycle).
pub fn init_directory<D: BlockDevice>(dev: &mut D) -> Result<()> {
	let free = DirEntry::free();
	for block_offset in 0..crate::layout::DIR_BLOCK_COUNT {
		let mut block = zeroed_block();
		for slot in 0..crate::layout::DIRENTS_PER_BLOCK as usize {
			free.write_into(&mut block, slot);
		}
		dev.write_block(crate::layout::DIR_BLOCK_START + block_offset, &block)?;
	}
	Ok(())
}
