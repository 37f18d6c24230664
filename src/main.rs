//! `blockfs` mounts a disk image formatted with the block-structured
//! layout this crate implements as a FUSE filesystem.

use std::path::PathBuf;
use std::process::exit;

use blockfs::block::FileBlockDevice;
use blockfs::ops::Filesystem;
use clap::Parser;
use fuser::MountOption;
use log::info;

/// Mount a block-structured filesystem image over FUSE.
#[derive(Parser)]
#[command(name = "blockfs", version, about)]
struct Args {
	/// Path to the backing disk-image file.
	image: PathBuf,

	/// Directory to mount the filesystem at.
	mountpoint: PathBuf,

	/// Format `image` as a fresh, empty filesystem before mounting.
	#[arg(long)]
	mkfs: bool,

	/// Run in the foreground instead of daemonizing.
	#[arg(short = 'f', long)]
	foreground: bool,

	/// Enable verbose (debug-level) logging.
	#[arg(short = 'd', long)]
	debug: bool,

	/// Additional FUSE mount options, e.g. `-o ro,allow_other`.
	#[arg(short = 'o', long = "option", value_delimiter = ',')]
	options: Vec<String>,
}

fn mount_options(args: &Args) -> Vec<MountOption> {
	let mut opts = vec![MountOption::FSName("blockfs".to_owned())];
	for raw in &args.options {
		opts.push(match raw.as_str() {
			"ro" => MountOption::RO,
			"rw" => MountOption::RW,
			"allow_other" => MountOption::AllowOther,
			"allow_root" => MountOption::AllowRoot,
			"auto_unmount" => MountOption::AutoUnmount,
			other => MountOption::CUSTOM(other.to_owned()),
		});
	}
	opts
}

fn main() {
	let args = Args::parse();

	let level = if args.debug { "debug" } else { "info" };
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

	let fs = if args.mkfs {
		Filesystem::init(&args.image)
	} else {
		FileBlockDevice::open(&args.image).map(Filesystem::from_device)
	}
	.unwrap_or_else(|e| {
		eprintln!("blockfs: {}: {}", args.image.display(), e);
		exit(1);
	});

	info!("mounting {} at {}", args.image.display(), args.mountpoint.display());
	if args.foreground {
		log::debug!("running in foreground");
	}
	if let Err(e) = blockfs::fuse_adapter::mount(fs, &args.mountpoint, &mount_options(&args)) {
		eprintln!("blockfs: failed to mount {}: {}", args.mountpoint.display(), e);
		exit(1);
	}
}
