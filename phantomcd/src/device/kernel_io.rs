//! Kernel transport bridge.
//!
//! The kernel's virtual SCSI adapter forwards CDBs over a character device.
//! One blocking I/O thread per device reads a request frame, runs the
//! dispatcher under the device mutex, and writes the response frame back.
//! Frame header fields are native-endian; the kernel module shares the
//! structs.
//!
//! Request: `{u32 tag, u32 lun, u8 cdb[16], u8 cdb_len, u32 data_len}`
//! (32 bytes with C struct padding), then `data_len` bytes of data-out.
//! Response: `{u32 tag, u32 status, u32 data_len}`, then the data-in.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};

use std::os::fd::OwnedFd;

use nix::fcntl::{OFlag, open};
use nix::sys::stat::Mode;
use nix::unistd::{read, write};
use tracing::{debug, warn};

use crate::commands;
use crate::device::DeviceInner;

pub const MAX_SECTORS: usize = 256;
pub const MAX_SENSE: usize = 256;

/// Offsets within the request header.
const REQ_TAG: usize = 0;
const REQ_CDB: usize = 8;
const REQ_CDB_LEN: usize = 24;
const REQ_DATA_LEN: usize = 28;
pub const REQUEST_HEADER_LEN: usize = 32;
pub const RESPONSE_HEADER_LEN: usize = 12;

const fn to_sectors(bytes: usize) -> usize {
    bytes.div_ceil(512)
}

/// Shared I/O buffer size, fixed by the kernel module contract.
pub const BUF_SIZE: usize = 512 * (MAX_SECTORS + to_sectors(MAX_SENSE + RESPONSE_HEADER_LEN));

pub const STATUS_GOOD: u32 = 0;
pub const STATUS_CHECK_CONDITION: u32 = 2;

pub fn open_control_device(path: &Path) -> std::io::Result<OwnedFd> {
    Ok(open(path, OFlag::O_RDWR, Mode::empty())?)
}

pub fn spawn_io_thread(inner: Arc<DeviceInner>, fd: OwnedFd) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("kernel-io-{}", inner.number))
        .spawn(move || io_loop(&inner, fd))
        .expect("spawning I/O thread cannot fail")
}

fn io_loop(inner: &DeviceInner, fd: OwnedFd) {
    let mut buf = vec![0u8; BUF_SIZE];

    while !inner.shutdown.load(Ordering::Relaxed) {
        let received = match read(&fd, &mut buf) {
            Ok(received) => received,
            Err(err) => {
                warn!(%err, "failed to read request from control device");
                break;
            }
        };
        if received < REQUEST_HEADER_LEN {
            warn!(received, "short request from control device");
            break;
        }

        let tag = u32::from_ne_bytes(buf[REQ_TAG..REQ_TAG + 4].try_into().unwrap());
        let cdb_len = buf[REQ_CDB_LEN] as usize;
        let data_len =
            u32::from_ne_bytes(buf[REQ_DATA_LEN..REQ_DATA_LEN + 4].try_into().unwrap()) as usize;

        // The dispatcher always sees a 12-byte CDB; shorter ones are
        // zero-padded.
        let mut cdb = [0u8; 12];
        let copy = cdb_len.min(12);
        cdb[..copy].copy_from_slice(&buf[REQ_CDB..REQ_CDB + copy]);

        let data_in_end = (REQUEST_HEADER_LEN + data_len).min(received).min(BUF_SIZE);
        let out_limit = data_len.min(BUF_SIZE - RESPONSE_HEADER_LEN);

        let response = {
            let mut state = match inner.state.lock() {
                Ok(state) => state,
                Err(_) => break,
            };
            commands::execute(
                &mut state,
                &cdb,
                &buf[REQUEST_HEADER_LEN..data_in_end],
                out_limit,
            )
        };

        debug!(tag, status = response.status, len = response.data.len(), "response");

        // Request and response share the buffer; the tag must round-trip.
        buf[0..4].copy_from_slice(&tag.to_ne_bytes());
        buf[4..8].copy_from_slice(&response.status.to_ne_bytes());
        buf[8..12].copy_from_slice(&(response.data.len() as u32).to_ne_bytes());
        buf[RESPONSE_HEADER_LEN..RESPONSE_HEADER_LEN + response.data.len()]
            .copy_from_slice(&response.data);

        if let Err(err) = write(&fd, &buf) {
            warn!(%err, "failed to write response to control device");
            break;
        }
    }

    debug!("transport loop finished");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn buffer_size_matches_kernel_contract() {
        // 512 * (256 + ceil((256 + 12) / 512)) = 512 * 257
        assert_eq!(BUF_SIZE, 512 * 257);
    }
}
