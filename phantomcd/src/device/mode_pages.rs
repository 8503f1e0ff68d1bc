//! Mode page database.
//!
//! Each supported page exists in triplicate: the live values, the power-on
//! defaults, and a mask of the bits MODE SELECT may change. All three
//! buffers share one layout: byte 0 is the page code, byte 1 the length
//! minus 2, the rest page-specific fields in big-endian.

use tracing::{debug, warn};

use crate::sense::CommandError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFlavor {
    Current,
    Default,
    Mask,
}

type Validator = fn(current: &[u8], new: &[u8]) -> bool;

pub struct ModePage {
    current: Vec<u8>,
    default: Vec<u8>,
    mask: Vec<u8>,
    validator: Option<Validator>,
}

impl ModePage {
    fn new(code: u8, size: usize, validator: Option<Validator>) -> ModePage {
        let mut default = vec![0u8; size];
        default[0] = code;
        default[1] = (size - 2) as u8;
        let mut mask = vec![0u8; size];
        mask[0] = code;
        mask[1] = (size - 2) as u8;

        ModePage {
            current: Vec::new(), // copied from default on registration
            default,
            mask,
            validator,
        }
    }

    pub fn code(&self) -> u8 {
        self.default[0]
    }

    pub fn get(&self, flavor: PageFlavor) -> &[u8] {
        match flavor {
            PageFlavor::Current => &self.current,
            PageFlavor::Default => &self.default,
            PageFlavor::Mask => &self.mask,
        }
    }
}

pub struct ModePageStore {
    pages: Vec<ModePage>,
}

/// Write-parameters page validator: a write-type change would retune the
/// recording engine, which this device does not carry; it is only reported.
fn validate_write_parameters(current: &[u8], new: &[u8]) -> bool {
    let old_type = current[2] & 0x0F;
    let new_type = new[2] & 0x0F;
    if old_type != new_type {
        debug!(old_type, new_type, "write type changed");
    }
    true
}

impl ModePageStore {
    pub fn new() -> ModePageStore {
        let mut store = ModePageStore { pages: Vec::new() };

        // Page 0x01: Read/Write Error Recovery. A virtual device needs no
        // retries; read retry count is 1, matching what hardware-emulating
        // peers report. DCR is changeable since INF-8020 ties it to the
        // subchannel read path.
        let mut page = ModePage::new(0x01, 8, None);
        page.default[3] = 0x01; // read retry count
        page.mask[2] = 0x01; // DCR
        page.mask[3] = 0xFF;
        store.register(page);

        // Page 0x05: Write Parameters.
        let mut page = ModePage::new(0x05, 52, Some(validate_write_parameters));
        page.default[2] = 0x30; // LS_V, test write
        page.mask[2] = 0x7F; // BUFE, LS_V, test write, write type
        page.default[3] = 0x05; // track mode 5
        page.mask[3] = 0xFF; // multisession, FP, copy, track mode
        page.default[4] = 0x08; // data block type: Mode 1
        page.mask[4] = 0x0F;
        page.default[5] = 0x07; // link size
        page.mask[5] = 0xFF;
        page.mask[7] = 0x3F; // initiator application code
        page.mask[8] = 0xFF; // session format
        page.default[10..14].copy_from_slice(&16u32.to_be_bytes()); // packet size
        page.mask[10..14].fill(0xFF);
        page.default[14..16].copy_from_slice(&150u16.to_be_bytes()); // audio pause
        page.mask[14..16].fill(0xFF);
        page.mask[16..32].fill(0xFF); // MCN
        page.mask[32..48].fill(0xFF); // ISRC
        page.mask[48..52].fill(0xFF); // subheader
        store.register(page);

        // Page 0x0D: CD Device Parameters. Fixed 60 s/min, 75 f/s.
        let mut page = ModePage::new(0x0D, 8, None);
        page.default[4..6].copy_from_slice(&60u16.to_be_bytes());
        page.default[6..8].copy_from_slice(&75u16.to_be_bytes());
        store.register(page);

        // Page 0x0E: CD Audio Control. Ports 0/1 routed to channels 1/2 at
        // full volume; SOTC and all port fields changeable.
        let mut page = ModePage::new(0x0E, 16, None);
        page.default[6] = 75; // obsolete, per ATAPI
        page.default[7] = 75;
        page.default[8] = 0x01; // port 0 -> channel 1
        page.default[9] = 0xFF;
        page.default[10] = 0x02; // port 1 -> channel 2
        page.default[11] = 0xFF;
        page.mask[2] = 0x02; // SOTC
        for port in 0..4 {
            page.mask[8 + port * 2] = 0x0F;
            page.mask[9 + port * 2] = 0xFF;
        }
        store.register(page);

        // Page 0x1A: Power Condition. Timers settable, nothing set.
        let mut page = ModePage::new(0x1A, 12, None);
        page.mask[3] = 0x03; // idle, standby
        page.mask[4..12].fill(0xFF); // both timers
        store.register(page);

        // Page 0x2A: CD/DVD Capabilities and Mechanical Status. Nothing is
        // changeable; six write-speed performance descriptors are appended
        // to the current flavor only.
        let mut page = ModePage::new(0x2A, 32, None);
        page.default[2] = 0x1F; // DVD-R/DVD-ROM/method2/CD-RW/CD-R read
        page.default[3] = 0x37; // DVD-RAM/DVD-R/test/CD-RW/CD-R write
        page.default[4] = 0x71; // multisession, Mode 2 form 1+2, audio play
        page.default[5] = 0xFF; // barcode, UPC, ISRC, C2, R-W, CD-DA
        page.default[6] = 0x29; // tray loader, eject, lock
        page.default[7] = 0x23; // R-W in lead-in, separate mute/volume
        page.default[8..10].copy_from_slice(&0x2113u16.to_be_bytes()); // max read speed
        page.default[10..12].copy_from_slice(&0x0100u16.to_be_bytes()); // volume levels
        page.default[12..14].copy_from_slice(&0x0100u16.to_be_bytes()); // buffer size
        page.default[14..16].copy_from_slice(&0x2113u16.to_be_bytes()); // current read speed
        page.default[18..20].copy_from_slice(&0x2113u16.to_be_bytes()); // max write speed
        page.default[20..22].copy_from_slice(&0x2113u16.to_be_bytes()); // current write speed
        page.default[22..24].copy_from_slice(&0x0001u16.to_be_bytes()); // copy management rev
        page.default[27] = 0x01; // rotation control selected
        page.default[28..30].copy_from_slice(&0x2113u16.to_be_bytes()); // selected write speed
        store.register(page);

        // Current page 0x2A grows by the six write-speed performance
        // descriptors that MODE SENSE reports but MODE SELECT cannot touch.
        let page = store.page_mut(0x2A).unwrap();
        page.current[30..32].copy_from_slice(&6u16.to_be_bytes());
        page.current.extend_from_slice(&[0u8; 6 * 4]);
        page.current[1] = (page.current.len() - 2) as u8;

        store
    }

    fn register(&mut self, mut page: ModePage) {
        page.current = page.default.clone();
        let position = self
            .pages
            .iter()
            .position(|p| p.code() > page.code())
            .unwrap_or(self.pages.len());
        self.pages.insert(position, page);
    }

    fn page_mut(&mut self, code: u8) -> Option<&mut ModePage> {
        self.pages.iter_mut().find(|p| p.code() == code)
    }

    pub fn get(&self, code: u8, flavor: PageFlavor) -> Option<&[u8]> {
        self.pages
            .iter()
            .find(|p| p.code() == code)
            .map(|p| p.get(flavor))
    }

    /// Mutable access to a page's live bytes, for state the device itself
    /// mirrors into pages (lock state, current speed).
    pub fn current_mut(&mut self, code: u8) -> Option<&mut Vec<u8>> {
        self.page_mut(code).map(|p| &mut p.current)
    }

    /// Ordered iteration for MODE SENSE 0x3F.
    pub fn iter(&self) -> impl Iterator<Item = &ModePage> {
        self.pages.iter()
    }

    /// Apply a MODE SELECT page image. The page must exist, declare the
    /// registered length, change only masked bits past byte 1, and satisfy
    /// the page's validator; on success the image becomes the live page.
    pub fn modify(&mut self, new_data: &[u8]) -> Result<(), CommandError> {
        if new_data.len() < 2 {
            return Err(CommandError::InvalidFieldInParameterList);
        }
        let code = new_data[0] & 0x3F;

        let Some(page) = self.page_mut(code) else {
            warn!(code, "mode select for unknown page");
            return Err(CommandError::InvalidFieldInParameterList);
        };

        // Never accept the descriptor-extended current length; the base
        // default length is the wire contract.
        let expected_len = page.default.len();
        if new_data.len() != expected_len || new_data[1] as usize != expected_len - 2 {
            warn!(code, "mode select length mismatch");
            return Err(CommandError::InvalidFieldInParameterList);
        }

        for i in 2..expected_len {
            if (page.current[i] ^ new_data[i]) & !page.mask[i] != 0 {
                warn!(code, byte = i, "mode select touches unchangeable bit");
                return Err(CommandError::InvalidFieldInParameterList);
            }
        }

        if let Some(validator) = page.validator {
            if !validator(&page.current, new_data) {
                return Err(CommandError::InvalidFieldInParameterList);
            }
        }

        page.current[..expected_len].copy_from_slice(new_data);
        // Strip the PS bit a host may set in byte 0.
        page.current[0] = code;
        Ok(())
    }
}
