//! The emulated device: state, lifecycle, options, observers.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use disc_lib::{Disc, DiscError, Lba};
use num_enum::IntoPrimitive;
use thiserror::Error;
use tracing::{debug, info};

use crate::device::audio::AudioPlay;
use crate::device::delay::DelayEmulation;
use crate::device::features::{FeatureSet, Profile};
use crate::device::mode_pages::ModePageStore;
use crate::sense::CommandError;

pub mod audio;
pub mod delay;
pub mod features;
pub mod kernel_io;
pub mod load;
pub mod mode_pages;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("device is already loaded")]
    AlreadyLoaded,
    #[error("device is locked")]
    DeviceLocked,
    #[error("invalid option `{0}`")]
    InvalidOption(String),
    #[error(transparent)]
    Image(#[from] DiscError),
}

/// Latched media event, reported (and cleared) by GET EVENT/STATUS
/// NOTIFICATION.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum MediaEvent {
    NoChange = 0,
    EjectRequest = 1,
    NewMedia = 2,
    MediaRemoval = 3,
    MediaChanged = 4,
}

/// INQUIRY identity strings, space-padded to their wire widths.
#[derive(Debug, Clone)]
pub struct DeviceId {
    pub vendor: String,
    pub product: String,
    pub revision: String,
    pub vendor_specific: String,
}

impl DeviceId {
    fn padded(text: &str, width: usize) -> Vec<u8> {
        let mut bytes = vec![b' '; width];
        for (slot, byte) in bytes.iter_mut().zip(text.bytes()) {
            *slot = byte;
        }
        bytes
    }

    pub fn vendor_bytes(&self) -> Vec<u8> {
        Self::padded(&self.vendor, 8)
    }

    pub fn product_bytes(&self) -> Vec<u8> {
        Self::padded(&self.product, 16)
    }

    pub fn revision_bytes(&self) -> Vec<u8> {
        Self::padded(&self.revision, 4)
    }

    pub fn vendor_specific_bytes(&self) -> Vec<u8> {
        Self::padded(&self.vendor_specific, 20)
    }
}

impl Default for DeviceId {
    fn default() -> DeviceId {
        DeviceId {
            vendor: "PhantomC".to_string(),
            product: "Virt. CD/DVD-ROM".to_string(),
            revision: "1.0".to_string(),
            vendor_specific: String::new(),
        }
    }
}

/// Observer interface the control layer registers against; replaces ad-hoc
/// signal plumbing. Callbacks run with the device mutex held.
pub trait DeviceMonitor: Send {
    fn status_changed(&self, _device: u32) {}
    fn option_changed(&self, _device: u32, _option: &str) {}
}

/// Typed option values for the control-plane get/set surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Bool(bool),
    Int(i32),
    DeviceId {
        vendor: String,
        product: String,
        revision: String,
        vendor_specific: String,
    },
}

/// Everything the device mutex guards.
pub struct DeviceState {
    pub number: u32,
    pub loaded: bool,
    pub disc: Option<Disc>,
    pub locked: bool,
    pub media_event: MediaEvent,
    pub current_address: Lba,
    pub mode_pages: ModePageStore,
    pub features: FeatureSet,
    pub audio: AudioPlay,
    pub delay: DelayEmulation,
    pub bad_sector_emulation: bool,
    pub device_id: DeviceId,
    pub daemon_debug_mask: i32,
    pub library_debug_mask: i32,
    monitors: Vec<Box<dyn DeviceMonitor>>,
}

impl DeviceState {
    fn new(number: u32) -> DeviceState {
        DeviceState {
            number,
            loaded: false,
            disc: None,
            locked: false,
            media_event: MediaEvent::NoChange,
            current_address: Lba::ZERO,
            mode_pages: ModePageStore::new(),
            features: FeatureSet::new(),
            audio: AudioPlay::new(),
            delay: DelayEmulation::new(),
            bad_sector_emulation: false,
            device_id: DeviceId::default(),
            daemon_debug_mask: 0,
            library_debug_mask: 0,
            monitors: Vec::new(),
        }
    }

    /// The loaded disc, or the NOT READY sense every medium-requiring
    /// command reports.
    pub fn disc_loaded(&self) -> Result<&Disc, CommandError> {
        if self.loaded {
            self.disc.as_ref().ok_or(CommandError::MediumNotPresent)
        } else {
            Err(CommandError::MediumNotPresent)
        }
    }

    /// Split-borrow helper: delay bookkeeping needs the disc's DPM data.
    pub fn delay_begin(&mut self, address: Lba, num_sectors: i32) {
        let DeviceState { disc, delay, .. } = self;
        delay.begin(disc.as_ref(), address, num_sectors);
    }

    pub fn delay_finalize(&mut self) {
        self.delay.finalize();
    }

    /// Mirror the locked flag into mode page 0x2A's lock-state bit.
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
        if let Some(page) = self.mode_pages.current_mut(0x2A) {
            if locked {
                page[6] |= 0x02;
            } else {
                page[6] &= !0x02;
            }
        }
    }

    pub(crate) fn emit_status_changed(&self) {
        for monitor in &self.monitors {
            monitor.status_changed(self.number);
        }
    }

    pub(crate) fn emit_option_changed(&self, option: &str) {
        for monitor in &self.monitors {
            monitor.option_changed(self.number, option);
        }
    }
}

pub struct DeviceInner {
    pub number: u32,
    pub state: Mutex<DeviceState>,
    pub shutdown: AtomicBool,
}

/// One emulated drive: a mutex-guarded state block plus the transport and
/// playback threads that serialize against it.
pub struct Device {
    inner: Arc<DeviceInner>,
    io_thread: Option<JoinHandle<()>>,
    audio_thread: Option<JoinHandle<()>>,
}

impl Device {
    pub fn new(number: u32) -> Device {
        info!(device = number, "creating device");
        Device {
            inner: Arc::new(DeviceInner {
                number,
                state: Mutex::new(DeviceState::new(number)),
                shutdown: AtomicBool::new(false),
            }),
            io_thread: None,
            audio_thread: None,
        }
    }

    pub fn inner(&self) -> &Arc<DeviceInner> {
        &self.inner
    }

    /// Open the kernel control device and start the transport and audio
    /// playback threads.
    pub fn start(&mut self, ctl_device: &std::path::Path, audio_driver: &str) -> std::io::Result<()> {
        let fd = kernel_io::open_control_device(ctl_device)?;
        self.io_thread = Some(kernel_io::spawn_io_thread(Arc::clone(&self.inner), fd));
        self.audio_thread = Some(audio::spawn_playback_thread(
            Arc::clone(&self.inner),
            audio::backend_for(audio_driver),
        ));
        Ok(())
    }

    /// Block until the transport loop ends.
    pub fn wait(&mut self) {
        if let Some(io_thread) = self.io_thread.take() {
            let _ = io_thread.join();
        }
    }

    pub fn add_monitor(&self, monitor: Box<dyn DeviceMonitor>) {
        if let Ok(mut state) = self.inner.state.lock() {
            state.monitors.push(monitor);
        }
    }

    /// Control-plane status: loaded flag plus the image filenames.
    pub fn status(&self) -> (bool, Vec<PathBuf>) {
        let state = match self.inner.state.lock() {
            Ok(state) => state,
            Err(_) => return (false, Vec::new()),
        };
        let filenames = state
            .disc
            .as_ref()
            .map(|d| d.filenames().to_vec())
            .unwrap_or_default();
        (state.loaded, filenames)
    }

    pub fn get_option(&self, name: &str) -> Result<OptionValue, DeviceError> {
        let state = self
            .inner
            .state
            .lock()
            .map_err(|_| DeviceError::InvalidOption(name.to_string()))?;

        match name {
            "dpm-emulation" => Ok(OptionValue::Bool(state.delay.dpm_emulation)),
            "tr-emulation" => Ok(OptionValue::Bool(state.delay.tr_emulation)),
            "bad-sector-emulation" => Ok(OptionValue::Bool(state.bad_sector_emulation)),
            "device-id" => Ok(OptionValue::DeviceId {
                vendor: state.device_id.vendor.clone(),
                product: state.device_id.product.clone(),
                revision: state.device_id.revision.clone(),
                vendor_specific: state.device_id.vendor_specific.clone(),
            }),
            "daemon-debug-mask" => Ok(OptionValue::Int(state.daemon_debug_mask)),
            "library-debug-mask" => Ok(OptionValue::Int(state.library_debug_mask)),
            _ => Err(DeviceError::InvalidOption(name.to_string())),
        }
    }

    pub fn set_option(&self, name: &str, value: OptionValue) -> Result<(), DeviceError> {
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| DeviceError::InvalidOption(name.to_string()))?;

        match (name, value) {
            ("dpm-emulation", OptionValue::Bool(enabled)) => {
                state.delay.dpm_emulation = enabled;
            }
            ("tr-emulation", OptionValue::Bool(enabled)) => {
                state.delay.tr_emulation = enabled;
            }
            ("bad-sector-emulation", OptionValue::Bool(enabled)) => {
                state.bad_sector_emulation = enabled;
            }
            (
                "device-id",
                OptionValue::DeviceId {
                    vendor,
                    product,
                    revision,
                    vendor_specific,
                },
            ) => {
                state.device_id = DeviceId {
                    vendor,
                    product,
                    revision,
                    vendor_specific,
                };
            }
            ("daemon-debug-mask", OptionValue::Int(mask)) => {
                state.daemon_debug_mask = mask;
                debug!(mask, "daemon debug mask set");
            }
            ("library-debug-mask", OptionValue::Int(mask)) => {
                state.library_debug_mask = mask;
                debug!(mask, "library debug mask set");
            }
            (name, _) => return Err(DeviceError::InvalidOption(name.to_string())),
        }

        state.emit_option_changed(name);
        Ok(())
    }

    /// Cooperative teardown: raise the flag and join the worker threads.
    /// The transport read unblocks when the control device goes away.
    pub fn shutdown(&mut self) {
        self.inner.shutdown.store(true, Ordering::Relaxed);
        self.wait();
        if let Some(audio_thread) = self.audio_thread.take() {
            let _ = audio_thread.join();
        }
    }

    /// Map a medium type onto the profile the drive morphs into.
    pub(crate) fn profile_for_medium(medium: disc_lib::MediumType) -> Option<Profile> {
        match medium {
            disc_lib::MediumType::Cd => Some(Profile::CdRom),
            disc_lib::MediumType::Dvd => Some(Profile::DvdRom),
            _ => None,
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use std::sync::Arc;

    use disc_lib::fragment::{Fragment, MainFormat, SubFormat};
    use disc_lib::session::SessionType;
    use disc_lib::track::Track;
    use disc_lib::{Disc, MediumType, SectorType};

    use super::{DeviceState, MediaEvent};

    pub fn state() -> DeviceState {
        DeviceState::new(0)
    }

    /// One-track CD-DA disc: 150-sector pregap plus a 30-second track,
    /// laid out from sector 0 the way text-format images are.
    pub fn audio_disc() -> Disc {
        let mut disc = Disc::new(MediumType::Cd);
        disc.set_layout_start(0);
        let session = disc.add_session(SessionType::CdDa);
        let mut track = Track::new(SectorType::Audio);
        track.add_fragment(Fragment::Null { len: 150 });
        track.add_fragment(Fragment::Binary {
            stream: Arc::new(vec![0u8; 2250 * 2352]),
            main_offset: 0,
            main_size: 2352,
            main_format: MainFormat::Audio,
            sub_offset: 0,
            sub_size: 0,
            sub_format: SubFormat::empty(),
            len: 2250,
        });
        track.set_track_start(150);
        session.add_track(track);
        disc.relayout();
        disc
    }

    /// One-track Mode 1 data disc with a 16-sector payload after the pregap.
    pub fn data_disc() -> Disc {
        let mut disc = Disc::new(MediumType::Cd);
        disc.set_layout_start(0);
        let session = disc.add_session(SessionType::CdRom);
        let mut track = Track::new(SectorType::Mode1);
        track.add_fragment(Fragment::Null { len: 150 });
        track.add_fragment(Fragment::Binary {
            stream: Arc::new((0..16u8).flat_map(|i| vec![i; 2048]).collect::<Vec<u8>>()),
            main_offset: 0,
            main_size: 2048,
            main_format: MainFormat::Data,
            sub_offset: 0,
            sub_size: 0,
            sub_format: SubFormat::empty(),
            len: 16,
        });
        track.set_track_start(150);
        session.add_track(track);
        disc.relayout();
        disc
    }

    pub fn loaded_state(disc: Disc) -> DeviceState {
        let mut state = DeviceState::new(0);
        if let Some(profile) = super::Device::profile_for_medium(disc.medium_type()) {
            state.features.set_profile(profile);
        }
        state.disc = Some(disc);
        state.loaded = true;
        state.media_event = MediaEvent::NewMedia;
        state
    }
}
