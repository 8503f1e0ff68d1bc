//! Medium load/unload lifecycle.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::device::features::Profile;
use crate::device::{Device, DeviceError, DeviceState, MediaEvent};

/// Options accepted by the load RPC.
#[derive(Debug, Default, Clone)]
pub struct LoadOptions {
    /// Create a blank recordable disc instead of loading an image. The
    /// writer path is not part of this device; the option is recognized so
    /// clients get a typed rejection.
    pub create: bool,
    /// Character encoding for text-format index files.
    pub encoding: Option<String>,
}

impl DeviceState {
    /// Eject path shared by the control RPC and START/STOP UNIT. The eject
    /// request is latched even when the lock wins, so a host daemon can
    /// release the lock and retry.
    pub fn unload_disc(&mut self, force: bool) -> Result<(), DeviceError> {
        self.media_event = MediaEvent::EjectRequest;

        if !force && self.locked {
            debug!("device is locked");
            return Err(DeviceError::DeviceLocked);
        }

        if self.loaded {
            self.disc = None;
            self.loaded = false;
            self.media_event = MediaEvent::MediaRemoval;
            self.features.set_profile(Profile::None);
            self.emit_status_changed();
        }

        Ok(())
    }
}

impl Device {
    pub fn load(&self, filenames: &[PathBuf], options: &LoadOptions) -> Result<(), DeviceError> {
        let mut state = self
            .inner()
            .state
            .lock()
            .map_err(|_| DeviceError::AlreadyLoaded)?;

        if state.loaded {
            debug!("device already loaded");
            return Err(DeviceError::AlreadyLoaded);
        }

        if options.create {
            return Err(DeviceError::InvalidOption("create".to_string()));
        }
        if let Some(encoding) = &options.encoding {
            if !encoding.eq_ignore_ascii_case("utf-8") {
                warn!(encoding, "only UTF-8 index files are supported");
            }
        }

        let disc = disc_lib::parsers::load_image(filenames)?;

        match Device::profile_for_medium(disc.medium_type()) {
            Some(profile) => state.features.set_profile(profile),
            None => warn!(medium = ?disc.medium_type(), "no profile for medium type"),
        }

        info!(files = filenames.len(), "medium loaded");
        state.disc = Some(disc);
        state.loaded = true;
        state.media_event = MediaEvent::NewMedia;
        state.emit_status_changed();

        Ok(())
    }

    /// Unload via the control RPC. A lock rejection is reported to the
    /// caller; host daemons typically unlock and retry on the latched eject
    /// request.
    pub fn unload(&self, force: bool) -> Result<(), DeviceError> {
        let mut state = self
            .inner()
            .state
            .lock()
            .map_err(|_| DeviceError::DeviceLocked)?;
        state.unload_disc(force)
    }
}
