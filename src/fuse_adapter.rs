//! Host interface adapter: wires [`Filesystem`] up to `fuser`'s
//! `Filesystem` trait. This is the "external collaborator" §1 puts out of
//! scope for the core — only the operation signatures and return-value
//! conventions it dispatches into are consumed here.
//!
//! FUSE addresses files by numeric inode, while the core addresses them by
//! path. The root directory is always FUSE inode 1; every other FUSE
//! inode is the core's inode number plus two (inode numbers 0 and 1 stay
//! reserved for the host's root/null convention).

use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

use fuser::{
	FileAttr, FileType, Filesystem as FuseFilesystem, ReplyAttr, ReplyCreate, ReplyData,
	ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request,
};
use log::debug;

use crate::block::FileBlockDevice;
use crate::error::Error;
use crate::ops::{self, Attr, Filesystem};

const ROOT_INO: u64 = 1;
const INO_OFFSET: u64 = 2;
/// Attribute cache TTL handed back to the kernel. There is no concurrent
/// mutation from outside this process (§5), so any value is sound; one
/// second matches what small reference FUSE filesystems typically use.
const TTL: Duration = Duration::from_secs(1);

fn core_inode(fuse_ino: u64) -> u32 {
	(fuse_ino - INO_OFFSET) as u32
}

fn fuse_ino(core_inode: u32) -> u64 {
	core_inode as u64 + INO_OFFSET
}

fn file_attr(ino: u64, attr: Attr) -> FileAttr {
	FileAttr {
		ino,
		size: attr.size,
		blocks: attr.size.div_ceil(crate::layout::BLOCK_SIZE as u64),
		atime: std::time::UNIX_EPOCH,
		mtime: std::time::UNIX_EPOCH,
		ctime: std::time::UNIX_EPOCH,
		crtime: std::time::UNIX_EPOCH,
		kind: if attr.is_dir { FileType::Directory } else { FileType::RegularFile },
		perm: (attr.mode & 0o7777) as u16,
		nlink: attr.link_count,
		uid: unsafe { libc::getuid() },
		gid: unsafe { libc::getgid() },
		rdev: 0,
		blksize: crate::layout::BLOCK_SIZE as u32,
		flags: 0,
	}
}

/// Bridges the path-addressed core to FUSE's inode-addressed trait.
pub struct FuseAdapter {
	fs: Filesystem<FileBlockDevice>,
}

impl FuseAdapter {
	pub fn new(fs: Filesystem<FileBlockDevice>) -> Self {
		Self { fs }
	}

	/// Resolves a FUSE inode number to the path the core understands,
	/// special-casing the root.
	fn path_of(&mut self, ino: u64) -> Result<String, i32> {
		if ino == ROOT_INO {
			return Ok(ops::ROOT_PATH.to_owned());
		}
		self.fs
			.path_for_inode(core_inode(ino))
			.map_err(|e| e.to_errno())?
			.ok_or(-libc::ENOENT)
	}

	/// Builds the flat root path for a directory entry name: for this
	/// filesystem (§9 "flat directory") the only valid parent is root, so
	/// this always collapses to `"/" + name`.
	fn child_path(name: &OsStr) -> Result<String, i32> {
		let name = name.to_str().ok_or(-libc::EINVAL)?;
		Ok(format!("/{name}"))
	}

	/// Looks up `path`'s core inode number and attributes together, the
	/// pair `lookup`/`create` need to build a FUSE reply entry.
	fn entry_of(&mut self, path: &str) -> Result<(u64, Attr), i32> {
		let attr = self.fs.getattr(path).map_err(|e| e.to_errno())?;
		let ino = match self.fs.inode_number_for(path).map_err(|e| e.to_errno())? {
			Some(n) => fuse_ino(n),
			None => ROOT_INO,
		};
		Ok((ino, attr))
	}
}

impl FuseFilesystem for FuseAdapter {
	fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
		if parent != ROOT_INO {
			reply.error(libc::ENOENT);
			return;
		}
		let path = match Self::child_path(name) {
			Ok(p) => p,
			Err(e) => return reply.error(-e),
		};
		match self.entry_of(&path) {
			Ok((ino, attr)) => reply.entry(&TTL, &file_attr(ino, attr), 0),
			Err(e) if e == -libc::ENOENT => reply.error(libc::ENOENT),
			Err(e) => reply.error(-e),
		}
	}

	fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
		let path = match self.path_of(ino) {
			Ok(p) => p,
			Err(e) => return reply.error(-e),
		};
		match self.fs.getattr(&path) {
			Ok(attr) => reply.attr(&TTL, &file_attr(ino, attr)),
			Err(Error::NoSuchEntry) => reply.error(libc::ENOENT),
			Err(e) => reply.error(-e.to_errno()),
		}
	}

	fn create(
		&mut self,
		_req: &Request,
		parent: u64,
		name: &OsStr,
		mode: u32,
		_umask: u32,
		flags: i32,
		reply: ReplyCreate,
	) {
		if parent != ROOT_INO {
			reply.error(libc::ENOENT);
			return;
		}
		let path = match Self::child_path(name) {
			Ok(p) => p,
			Err(e) => return reply.error(-e),
		};
		debug!("fuse create {path} mode={mode:#o} flags={flags:#x}");
		if let Err(e) = self.fs.create(&path, mode) {
			reply.error(-e.to_errno());
			return;
		}
		match self.entry_of(&path) {
			Ok((ino, attr)) => reply.created(&TTL, &file_attr(ino, attr), 0, ops::FILE_HANDLE, 0),
			Err(e) => reply.error(-e),
		}
	}

	fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		if parent != ROOT_INO {
			reply.error(libc::ENOENT);
			return;
		}
		let path = match Self::child_path(name) {
			Ok(p) => p,
			Err(e) => return reply.error(-e),
		};
		match self.fs.unlink(&path) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(-e.to_errno()),
		}
	}

	fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
		let path = match self.path_of(ino) {
			Ok(p) => p,
			Err(e) => return reply.error(-e),
		};
		match self.fs.open(&path, flags) {
			Ok(handle) => reply.opened(handle, 0),
			Err(e) => reply.error(-e.to_errno()),
		}
	}

	fn release(
		&mut self,
		_req: &Request,
		_ino: u64,
		fh: u64,
		_flags: i32,
		_lock_owner: Option<u64>,
		_flush: bool,
		reply: ReplyEmpty,
	) {
		let _ = self.fs.release(fh);
		reply.ok();
	}

	fn read(
		&mut self,
		_req: &Request,
		ino: u64,
		_fh: u64,
		offset: i64,
		size: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyData,
	) {
		let path = match self.path_of(ino) {
			Ok(p) => p,
			Err(e) => return reply.error(-e),
		};
		let mut buf = vec![0u8; size as usize];
		match self.fs.read(&path, offset as u64, &mut buf) {
			Ok(n) => reply.data(&buf[..n]),
			Err(e) => reply.error(-e.to_errno()),
		}
	}

	fn write(
		&mut self,
		_req: &Request,
		ino: u64,
		_fh: u64,
		offset: i64,
		data: &[u8],
		_write_flags: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyWrite,
	) {
		let path = match self.path_of(ino) {
			Ok(p) => p,
			Err(e) => return reply.error(-e),
		};
		match self.fs.write(&path, offset as u64, data) {
			Ok(n) => reply.written(n as u32),
			Err(e) => reply.error(-e.to_errno()),
		}
	}

	fn readdir(&mut self, _req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
		if ino != ROOT_INO {
			reply.error(libc::ENOTDIR);
			return;
		}
		let mut names = Vec::new();
		if let Err(e) = self.fs.readdir(|name| names.push(name.to_owned())) {
			reply.error(-e.to_errno());
			return;
		}
		for (i, name) in names.into_iter().enumerate().skip(offset as usize) {
			let (ino, kind) = match name.as_str() {
				"." | ".." => (ROOT_INO, FileType::Directory),
				_ => match self.fs.inode_number_for(&name) {
					Ok(Some(n)) => (fuse_ino(n), FileType::RegularFile),
					_ => continue,
				},
			};
			// `i + 1` so a resumed readdir starts after the last entry seen.
			if reply.add(ino, (i + 1) as i64, kind, &name) {
				break;
			}
		}
		reply.ok();
	}

	fn mkdir(&mut self, _req: &Request, parent: u64, name: &OsStr, mode: u32, _umask: u32, reply: ReplyEntry) {
		if parent != ROOT_INO {
			reply.error(libc::ENOENT);
			return;
		}
		let path = match Self::child_path(name) {
			Ok(p) => p,
			Err(e) => return reply.error(-e),
		};
		// §4.6: mkdir is a no-op returning success; this core only ever has
		// the single flat root directory, so there is no new entry to
		// describe back to the kernel beyond the root's own attributes.
		if let Err(e) = self.fs.mkdir(&path, mode) {
			reply.error(-e.to_errno());
			return;
		}
		match self.fs.getattr(ops::ROOT_PATH) {
			Ok(attr) => reply.entry(&TTL, &file_attr(ROOT_INO, attr), 0),
			Err(e) => reply.error(-e.to_errno()),
		}
	}

	fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		if parent != ROOT_INO {
			reply.error(libc::ENOENT);
			return;
		}
		let path = match Self::child_path(name) {
			Ok(p) => p,
			Err(e) => return reply.error(-e),
		};
		match self.fs.rmdir(&path) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(-e.to_errno()),
		}
	}

	fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
		if ino != ROOT_INO {
			reply.error(libc::ENOTDIR);
			return;
		}
		match self.fs.opendir(ops::ROOT_PATH) {
			Ok(handle) => reply.opened(handle, 0),
			Err(e) => reply.error(-e.to_errno()),
		}
	}

	fn releasedir(&mut self, _req: &Request, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
		let _ = self.fs.releasedir(fh);
		reply.ok();
	}

	fn destroy(&mut self) {
		debug!("fuse destroy");
	}
}

/// Mounts `fs` at `mountpoint`, blocking until unmounted.
pub fn mount(
	fs: Filesystem<FileBlockDevice>,
	mountpoint: &Path,
	options: &[fuser::MountOption],
) -> std::io::Result<()> {
	fuser::mount2(FuseAdapter::new(fs), mountpoint, options)
}
