//! Core of a minimal block-structured filesystem, backed by a single flat
//! disk-image file and addressed in fixed 512-byte blocks.
//!
//! This crate implements the on-disk layout, the allocators, the inode
//! table, the flat root directory, and the offset/length read/write path.
//! It knows nothing about any particular host: [`ops::Filesystem`] exposes
//! plain methods (`create`, `unlink`, `open`, `release`, `read`, `write`,
//! `readdir`, `getattr`, ...) that a FUSE-style front-end — or a test —
//! calls directly. See `src/main.rs` for the `fuser`-based front-end this
//! repo ships.

#![forbid(unsafe_op_in_unsafe_fn)]

pub mod bitmap;
pub mod block;
pub mod dirent;
pub mod error;
pub mod fileio;
pub mod fuse_adapter;
pub mod inode;
pub mod layout;
pub mod ops;
pub mod superblock;

pub use error::{Error, Result};
pub use ops::{Attr, Filesystem, Stats};
