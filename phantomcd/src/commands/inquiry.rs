//! INQUIRY.

use crate::commands::{CmdIo, cdb_u16};
use crate::device::DeviceState;
use crate::sense::CommandError;

/// Size of the standard inquiry data we serve: the 36 mandatory bytes plus
/// padding up to the first version descriptor.
const INQUIRY_DATA_LEN: usize = 96;

pub fn inquiry(
    state: &mut DeviceState,
    cdb: &[u8; 12],
    io: &mut CmdIo,
) -> Result<(), CommandError> {
    let evpd = cdb[1] & 0x01 != 0;
    let page_code = cdb[2];
    // Vital product data pages are not supported.
    if evpd || page_code != 0 {
        return Err(CommandError::InvalidFieldInCdb);
    }

    let allocation_length = cdb_u16(cdb, 3) as usize;

    io.flush();
    let data = io.scratch();
    data.resize(INQUIRY_DATA_LEN, 0);

    data[0] = 0x05; // CD-ROM peripheral
    data[1] = 0x80; // removable medium
    data[2] = 0x00; // version, per INF-8090 (ATAPI version 3 device)
    data[3] = 0x02; // response data format 2
    data[4] = 0x1F; // additional length
    data[8..16].copy_from_slice(&state.device_id.vendor_bytes());
    data[16..32].copy_from_slice(&state.device_id.product_bytes());
    data[32..36].copy_from_slice(&state.device_id.revision_bytes());
    data[36..56].copy_from_slice(&state.device_id.vendor_specific_bytes());
    data[58..60].copy_from_slice(&0x02A0u16.to_be_bytes()); // MMC-3

    io.write_buffer(allocation_length);
    Ok(())
}
