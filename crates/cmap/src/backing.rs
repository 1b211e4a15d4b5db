//! Opens and probes the raw container store.
//!
//! A block device is opened `O_DIRECT | O_SYNC` and its size is read with
//! `BLKGETSIZE64`; a regular file is created/grown to the capacity hint with
//! `set_len`. TRIM on release is only attempted for block devices.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

pub struct Probe {
    pub total_cap: u64,
    pub discard: bool,
}

#[cfg(unix)]
fn is_block_device(path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::FileTypeExt;
    Ok(std::fs::metadata(path)?.file_type().is_block_device())
}

#[cfg(not(unix))]
fn is_block_device(_path: &Path) -> io::Result<bool> {
    Ok(false)
}

#[cfg(unix)]
fn open_block_device(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_DIRECT | libc::O_SYNC)
        .open(path)
}

#[cfg(not(unix))]
fn open_block_device(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

pub fn open_raw(path: &Path, cap_hint: u64) -> io::Result<File> {
    if path.exists() && is_block_device(path)? {
        return open_block_device(path);
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)?;
    let len = file.metadata()?.len();
    if len < cap_hint {
        file.set_len(cap_hint)?;
    }
    Ok(file)
}

#[cfg(unix)]
fn block_device_size(file: &File) -> io::Result<u64> {
    use std::os::unix::io::AsRawFd;
    let mut size: u64 = 0;
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), libc_blkgetsize64(), &mut size) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(size)
}

#[cfg(unix)]
const fn libc_blkgetsize64() -> libc::c_ulong {
    // _IOR(0x12, 114, size_t), Linux's <linux/fs.h> BLKGETSIZE64.
    0x80081272
}

pub fn probe(file: &File, path: &Path) -> io::Result<Probe> {
    if is_block_device(path)? {
        #[cfg(unix)]
        {
            let total_cap = block_device_size(file)?;
            return Ok(Probe {
                total_cap,
                discard: true,
            });
        }
        #[cfg(not(unix))]
        {
            let total_cap = file.metadata()?.len();
            return Ok(Probe {
                total_cap,
                discard: false,
            });
        }
    }
    Ok(Probe {
        total_cap: file.metadata()?.len(),
        discard: false,
    })
}

#[cfg(unix)]
pub fn trim(file: &File, offset: u64, len: u64) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let range: [u64; 2] = [offset, len];
    // _IO(0x12, 119), Linux's <linux/fs.h> BLKDISCARD.
    const BLKDISCARD: libc::c_ulong = 0x1277;
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), BLKDISCARD, range.as_ptr()) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn trim(_file: &File, _offset: u64, _len: u64) -> io::Result<()> {
    Ok(())
}
