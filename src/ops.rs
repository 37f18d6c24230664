//! Filesystem Operations Layer (§4.6): the host-visible operations,
//! implemented in terms of the block device, allocators, inode table,
//! directory, and file I/O engine below it.

use std::path::Path;

use log::{debug, warn};

use crate::bitmap::{allocate_data, allocate_inode, free_data, free_inode, init_data_bitmap};
use crate::block::{BlockDevice, FileBlockDevice};
use crate::dirent;
use crate::error::Error;
use crate::fileio;
use crate::inode::{init_inode_table, read_inode, write_inode, Inode};
use crate::layout::{data_block, zeroed_block, DIRECT_BLOCKS};
use crate::superblock::{read_superblock, write_superblock, Superblock};
use crate::Result;

/// The root path. `getattr("/")` and `readdir("/")` are special-cased on
/// it; every other path is a flat entry in the single root directory.
pub const ROOT_PATH: &str = "/";

/// The single, fixed file-handle token `open` hands back (§4.6: "per-open
/// state is otherwise not tracked").
pub const FILE_HANDLE: u64 = 1;

/// `mode_t` bits identifying a directory, matching the host ABI's
/// `S_IFDIR`. Stored as a plain constant rather than pulled from `libc` so
/// this module stays host-agnostic; `libc::S_IFDIR` has the same value on
/// every target this crate supports.
pub const S_IFDIR: u32 = 0o040000;
/// `mode_t` bits identifying a regular file (`S_IFREG`).
pub const S_IFREG: u32 = 0o100000;

/// Attributes returned by `getattr`, the fields a FUSE-style host needs to
/// populate a `stat` structure (§4.6).
#[derive(Debug, Clone, Copy)]
pub struct Attr {
	pub mode: u32,
	pub link_count: u32,
	pub size: u64,
	pub is_dir: bool,
}

/// Aggregate free/total counts, the `statfs`-style introspection dropped
/// by the distilled spec and restored per SPEC_FULL.md §10.
#[derive(Debug, Clone, Copy)]
pub struct Stats {
	pub free_inodes: u32,
	pub total_inodes: u32,
	pub free_data: u32,
	pub total_data: u32,
}

/// The mounted filesystem: an opaque handle wrapping the backing device.
/// There is no in-memory cache (§5): every operation that mutates a
/// superblock, bitmap, inode, or directory block persists before
/// returning, so the only "lock" needed is the host never issuing
/// overlapping calls.
pub struct Filesystem<D: BlockDevice = FileBlockDevice> {
	device: D,
}

impl Filesystem<FileBlockDevice> {
	/// Opens the disk image at `path` and initializes it to a fresh,
	/// empty filesystem (§4.6 `init`): superblock, bitmaps, inode table,
	/// and directory table all zeroed to the state described in §3.
	pub fn init(path: &Path) -> Result<Self> {
		let mut device = FileBlockDevice::open(path)?;
		write_superblock(&mut device, &Superblock::fresh())?;
		init_data_bitmap(&mut device)?;
		init_inode_table(&mut device)?;
		dirent::init_directory(&mut device)?;
		debug!("init({})", path.display());
		Ok(Self { device })
	}
}

impl<D: BlockDevice> Filesystem<D> {
	/// Wraps an already-open device without reinitializing it, e.g. to
	/// remount an existing image.
	pub fn from_device(device: D) -> Self {
		Self { device }
	}

	/// Clean up filesystem (§4.6 `destroy`): zero every data-bitmap
	/// allocated block, then close the device. Best-effort, per §3
	/// Lifecycle.
	pub fn destroy(mut self) -> Result<()> {
		for d in 0..crate::layout::DATA_BLOCK_COUNT {
			let bm_block = crate::layout::bitmap_block_for(d);
			let mut buf = zeroed_block();
			self.device.read_block(bm_block, &mut buf)?;
			if buf[crate::layout::bitmap_byte_for(d)] == 1 {
				self.device.write_block(data_block(d), &zeroed_block())?;
			}
		}
		debug!("destroy()");
		Ok(())
	}

	/// `getattr(path)` (§4.6): root is a fixed directory entry; any other
	/// existing path is a regular file sized from its inode.
	pub fn getattr(&mut self, path: &str) -> Result<Attr> {
		debug!("getattr({path})");
		if path == ROOT_PATH {
			return Ok(Attr {
				mode: S_IFDIR | 0o777,
				link_count: 2,
				size: 0,
				is_dir: true,
			});
		}
		let (inode_num, _) = dirent::lookup(&mut self.device, path)?.ok_or(Error::NoSuchEntry)?;
		let inode = read_inode(&mut self.device, inode_num as u32)?;
		Ok(Attr {
			mode: S_IFREG | 0o777,
			link_count: 1,
			size: inode.size as u64,
			is_dir: false,
		})
	}

	/// `access`-style existence check (SPEC_FULL.md §10): no permission
	/// bits are evaluated, only presence.
	pub fn exists(&mut self, path: &str) -> Result<bool> {
		if path == ROOT_PATH {
			return Ok(true);
		}
		Ok(dirent::lookup(&mut self.device, path)?.is_some())
	}

	/// `create(path, mode)` (§4.6): allocate an inode, allocate its first
	/// data block, install the directory entry at the inode's slot.
	pub fn create(&mut self, path: &str, mode: u32) -> Result<()> {
		debug!("create({path}, mode={mode:#o})");
		let inode_num = allocate_inode(&mut self.device)?;
		let data_block_alloc = match allocate_data(&mut self.device) {
			Ok(d) => d,
			Err(e) => {
				// roll the inode back so it doesn't leak on the common
				// "out of data blocks" path; the spec has no transaction
				// layer for the rest, but this one step is cheap and
				// keeps create() atomic from the caller's point of view.
				free_inode(&mut self.device, inode_num)?;
				return Err(e);
			}
		};
		self.device.write_block(data_block(data_block_alloc), &zeroed_block())?;

		let mut inode = Inode::new_regular(mode as i32);
		inode.db[0] = data_block_alloc as i32;
		write_inode(&mut self.device, inode_num, &inode)?;

		dirent::insert(&mut self.device, path, inode_num)?;
		Ok(())
	}

	/// `unlink(path)` (§4.6): free every allocated data block, free the
	/// inode, clear the directory name. Missing paths are a no-op success
	/// (§7 `BadHandle`-style leniency applies to unlink too).
	pub fn unlink(&mut self, path: &str) -> Result<()> {
		debug!("unlink({path})");
		let Some((inode_num, loc)) = dirent::lookup(&mut self.device, path)? else {
			return Ok(());
		};
		let inode_num = inode_num as u32;
		let inode = read_inode(&mut self.device, inode_num)?;
		for i in 0..DIRECT_BLOCKS {
			if inode.db[i] >= 0 {
				free_data(&mut self.device, inode.db[i] as u32)?;
			}
		}
		free_inode(&mut self.device, inode_num)?;
		dirent::remove(&mut self.device, loc)?;
		Ok(())
	}

	/// `open(path, flags)` (§4.6): succeeds with the fixed handle if the
	/// path exists; if `flags` carries `O_CREAT`, creates it first (§9
	/// open question, resolved in SPEC_FULL.md). Otherwise reports a
	/// zero-status, non-opened outcome by returning `NoSuchEntry`.
	pub fn open(&mut self, path: &str, flags: i32) -> Result<u64> {
		debug!("open({path}, flags={flags:#x})");
		if self.exists(path)? {
			return Ok(FILE_HANDLE);
		}
		if flags & libc::O_CREAT != 0 {
			self.create(path, 0o644)?;
			return Ok(FILE_HANDLE);
		}
		Err(Error::NoSuchEntry)
	}

	/// `release` (§4.6): no persisted per-handle state to clear. Unknown
	/// handles are accepted silently (§7 `BadHandle`).
	pub fn release(&mut self, handle: u64) -> Result<()> {
		if handle != FILE_HANDLE {
			warn!("release: unknown handle {handle}");
		}
		Ok(())
	}

	/// `read(path, offset, buf)` (§4.6): resolves the path, delegates to
	/// the file I/O engine.
	pub fn read(&mut self, path: &str, offset: u64, out: &mut [u8]) -> Result<usize> {
		let (inode_num, _) = dirent::lookup(&mut self.device, path)?.ok_or(Error::NoSuchEntry)?;
		fileio::read(&mut self.device, inode_num as u32, offset, out)
	}

	/// `write(path, offset, data)` (§4.6): resolves the path, creating the
	/// file first if it's missing (§9 open question: the source invokes
	/// create on a write that targets a missing path).
	pub fn write(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
		let inode_num = match dirent::lookup(&mut self.device, path)? {
			Some((n, _)) => n as u32,
			None => {
				self.create(path, 0o644)?;
				dirent::lookup(&mut self.device, path)?.unwrap().0 as u32
			}
		};
		fileio::write(&mut self.device, inode_num, offset, data)
	}

	/// `readdir("/")` (§4.6): always emits `.` and `..`, then every
	/// non-empty directory slot.
	pub fn readdir(&mut self, mut emit: impl FnMut(&str)) -> Result<()> {
		emit(".");
		emit("..");
		dirent::iterate(&mut self.device, |name| emit(name))
	}

	/// `mkdir`/`rmdir`/`opendir`/`releasedir` (§4.6): no-ops returning
	/// success; this core only ever has the single flat root directory.
	pub fn mkdir(&mut self, _path: &str, _mode: u32) -> Result<()> {
		Ok(())
	}

	pub fn rmdir(&mut self, _path: &str) -> Result<()> {
		Ok(())
	}

	pub fn opendir(&mut self, _path: &str) -> Result<u64> {
		Ok(FILE_HANDLE)
	}

	pub fn releasedir(&mut self, _handle: u64) -> Result<()> {
		Ok(())
	}

	/// Resolves `path` to its inode number, without fetching the inode
	/// itself. Used by the `fuser` front-end to mint a FUSE inode number
	/// for a freshly looked-up or created path.
	pub fn inode_number_for(&mut self, path: &str) -> Result<Option<u32>> {
		Ok(dirent::lookup(&mut self.device, path)?.map(|(n, _)| n as u32))
	}

	/// Recovers the path stored at inode `inode_num`'s directory slot
	/// (the slot index equals the inode number, §3 invariant), in a single
	/// block read rather than a full directory scan. Used by the `fuser`
	/// front-end to translate FUSE's numeric inodes back to paths.
	pub fn path_for_inode(&mut self, inode_num: u32) -> Result<Option<String>> {
		let entry = dirent::get(&mut self.device, inode_num)?;
		if entry.is_free() {
			return Ok(None);
		}
		Ok(Some(entry.name_str().to_owned()))
	}

	/// Free/total inode and data-block counts (SPEC_FULL.md §10).
	pub fn stats(&mut self) -> Result<Stats> {
		let sb = read_superblock(&mut self.device)?;
		Ok(Stats {
			free_inodes: sb.free_inodes.max(0) as u32,
			total_inodes: sb.total_inodes as u32,
			free_data: sb.free_data.max(0) as u32,
			total_data: sb.total_data as u32,
		})
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use tempfile::NamedTempFile;

	fn fresh_fs() -> Filesystem<FileBlockDevice> {
		let tmp = NamedTempFile::new().unwrap();
		Filesystem::init(tmp.path()).unwrap()
	}

	#[test]
	fn s1_create_write_read_within_one_block() {
		let mut fs = fresh_fs();
		fs.create("/a", 0o644).unwrap();
		let n = fs.write("/a", 0, b"hello").unwrap();
		assert_eq!(n, 5);

		let mut out = [0u8; 5];
		let got = fs.read("/a", 0, &mut out).unwrap();
		assert_eq!(got, 5);
		assert_eq!(&out, b"hello");
		assert_eq!(fs.getattr("/a").unwrap().size, 5);
	}

	#[test]
	fn s2_cross_block_write() {
		let mut fs = fresh_fs();
		fs.create("/b", 0o644).unwrap();
		let payload = vec![b'x'; 20];
		let n = fs.write("/b", 500, &payload).unwrap();
		assert_eq!(n, 20);

		let mut out = vec![0u8; 20];
		let got = fs.read("/b", 500, &mut out).unwrap();
		assert_eq!(got, 20);
		assert!(out.iter().all(|&b| b == b'x'));
		assert_eq!(fs.getattr("/b").unwrap().size, 520);
	}

	#[test]
	fn s3_cap() {
		let mut fs = fresh_fs();
		fs.create("/c", 0o644).unwrap();
		let payload = vec![b'z'; 6000];
		let n = fs.write("/c", 0, &payload).unwrap();
		assert_eq!(n, crate::layout::MAX_FILE_SIZE as usize);
	}

	#[test]
	fn s4_unlink_and_recreate_reuses_slots() {
		let mut fs = fresh_fs();
		fs.create("/d", 0o644).unwrap();
		fs.unlink("/d").unwrap();
		fs.create("/e", 0o644).unwrap();

		let mut names = Vec::new();
		fs.readdir(|n| names.push(n.to_owned())).unwrap();
		assert_eq!(names, vec![".".to_owned(), "..".to_owned(), "/e".to_owned()]);
	}

	#[test]
	fn s5_readdir_on_empty_fs() {
		let mut fs = fresh_fs();
		let mut names = Vec::new();
		fs.readdir(|n| names.push(n.to_owned())).unwrap();
		assert_eq!(names, vec![".".to_owned(), "..".to_owned()]);
	}

	#[test]
	fn s6_getattr_on_root() {
		let mut fs = fresh_fs();
		let attr = fs.getattr("/").unwrap();
		assert!(attr.is_dir);
		assert_eq!(attr.link_count, 2);
		assert_eq!(attr.mode, S_IFDIR | 0o777);
	}

	#[test]
	fn unlink_inversion_frees_and_zeroes_blocks() {
		let mut fs = fresh_fs();
		fs.create("/p", 0o644).unwrap();
		fs.write("/p", 0, &vec![b'q'; 600]).unwrap();
		let before = fs.stats().unwrap();

		fs.unlink("/p").unwrap();
		assert!(matches!(fs.getattr("/p"), Err(Error::NoSuchEntry)));

		let after = fs.stats().unwrap();
		assert_eq!(after.free_inodes, before.free_inodes + 1);
		assert_eq!(after.free_data, before.free_data + 2);

		let mut names = Vec::new();
		fs.readdir(|n| names.push(n.to_owned())).unwrap();
		assert!(!names.contains(&"/p".to_owned()));
	}

	#[test]
	fn open_without_o_creat_on_missing_path_errors() {
		let mut fs = fresh_fs();
		assert!(matches!(fs.open("/missing", 0), Err(Error::NoSuchEntry)));
	}

	#[test]
	fn open_with_o_creat_creates_missing_path() {
		let mut fs = fresh_fs();
		let handle = fs.open("/new", libc::O_CREAT).unwrap();
		assert_eq!(handle, FILE_HANDLE);
		assert!(fs.exists("/new").unwrap());
	}

	#[test]
	fn write_to_missing_path_creates_it() {
		let mut fs = fresh_fs();
		fs.write("/auto", 0, b"hi").unwrap();
		assert!(fs.exists("/auto").unwrap());
	}

	#[test]
	fn mkdir_rmdir_opendir_are_noops() {
		let mut fs = fresh_fs();
		fs.mkdir("/sub", 0o755).unwrap();
		assert!(!fs.exists("/sub").unwrap());
		fs.rmdir("/sub").unwrap();
		let h = fs.opendir("/").unwrap();
		fs.releasedir(h).unwrap();
	}

	#[test]
	fn path_for_inode_round_trips_through_create() {
		let mut fs = fresh_fs();
		fs.create("/named", 0o644).unwrap();
		let (inode_num, _) = dirent::lookup(&mut fs.device, "/named").unwrap().unwrap();
		assert_eq!(
			fs.path_for_inode(inode_num as u32).unwrap(),
			Some("/named".to_owned())
		);
	}

	#[test]
	fn release_accepts_unknown_handle() {
		let mut fs = fresh_fs();
		fs.release(999).unwrap();
	}

	#[test]
	fn create_with_overlong_name_truncates_without_leaking_allocations() {
		let mut fs = fresh_fs();
		let long_name = format!("/{}", "n".repeat(200));
		let before = fs.stats().unwrap();

		fs.create(&long_name, 0o644).unwrap();

		let after = fs.stats().unwrap();
		assert_eq!(after.free_inodes, before.free_inodes - 1);
		assert_eq!(after.free_data, before.free_data - 1);
	}
}
