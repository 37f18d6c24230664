//! Error kinds surfaced by the filesystem core, mapped from §7 of the spec.

use std::io;

use thiserror::Error;

/// Errors the filesystem core can return.
///
/// Propagation policy: device errors abort the current operation without
/// rolling back whatever was already written in the same operation — there
/// is no transaction layer. Allocator exhaustion is locally recoverable; the
/// operations layer decides whether to surface it or degrade to a partial
/// success, per §7.
#[derive(Debug, Error)]
pub enum Error {
	/// A path is not present in the root directory.
	#[error("no such entry")]
	NoSuchEntry,
	/// The inode allocator has no free inode left.
	#[error("out of inodes")]
	OutOfInodes,
	/// The data-block allocator has no free block left.
	#[error("out of data blocks")]
	OutOfDataBlocks,
	/// `release` (or any per-handle operation) was given a handle that does
	/// not correspond to the fixed token `open` hands out.
	#[error("unknown file handle")]
	BadHandle,
	/// The backing block device failed.
	#[error("device I/O error: {0}")]
	Device(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
	/// Maps an error to a POSIX-style negative errno, per §6's "return
	/// values follow POSIX conventions" contract. Hosts that speak raw
	/// errno (rather than a richer `Result`) call this at the boundary.
	pub fn to_errno(&self) -> i32 {
		match self {
			Error::NoSuchEntry => -libc::ENOENT,
			Error::OutOfInodes | Error::OutOfDataBlocks => -libc::ENOSPC,
			Error::BadHandle => -libc::EBADF,
			Error::Device(e) => -e.raw_os_error().unwrap_or(libc::EIO),
		}
	}
}
