//! Feature database and profile model.
//!
//! GET CONFIGURATION serves an ordered list of feature descriptors; which of
//! them carry the `current` bit follows the active profile. Persistent
//! features are always current.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum Profile {
    None = 0x0000,
    CdRom = 0x0008,
    CdR = 0x0009,
    DvdRom = 0x0010,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum FeatureCode {
    ProfileList = 0x0000,
    Core = 0x0001,
    Morphing = 0x0002,
    RemovableMedium = 0x0003,
    RandomReadable = 0x0010,
    MultiRead = 0x001D,
    CdRead = 0x001E,
    DvdRead = 0x001F,
    IncrementalStreamingWritable = 0x0021,
    CdTrackAtOnce = 0x002D,
    PowerManagement = 0x0100,
    CdExternalAudioPlay = 0x0103,
    DvdCss = 0x0106,
    RealTimeStreaming = 0x0107,
}

pub struct Feature {
    pub code: u16,
    pub version: u8,
    pub persistent: bool,
    pub current: bool,
    pub data: Vec<u8>,
}

impl Feature {
    fn new(code: FeatureCode, version: u8, persistent: bool, data: Vec<u8>) -> Feature {
        Feature {
            code: code.into(),
            version,
            persistent,
            current: false,
            data,
        }
    }

    /// Wire form: 4-byte header (code, version/persistent/current flags,
    /// additional length) followed by the payload.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.data.len());
        out.extend_from_slice(&self.code.to_be_bytes());
        out.push((self.version << 2) | (u8::from(self.persistent) << 1) | u8::from(self.current));
        out.push(self.data.len() as u8);
        out.extend_from_slice(&self.data);
        out
    }
}

/// Features activated by each profile, on top of the persistent set.
const ACTIVE_CDROM: &[u16] = &[0x0010, 0x001D, 0x001E, 0x0103, 0x0107];
const ACTIVE_CDR: &[u16] = &[0x0010, 0x001D, 0x001E, 0x0021, 0x002D, 0x0103, 0x0107];
const ACTIVE_DVDROM: &[u16] = &[0x0010, 0x001F, 0x0106, 0x0107];

/// Byte offsets of the three profile descriptors inside feature 0x0000.
const PROFILE_DESCRIPTORS: [(Profile, usize); 3] = [
    (Profile::CdRom, 0),
    (Profile::CdR, 4),
    (Profile::DvdRom, 8),
];

pub struct FeatureSet {
    features: Vec<Feature>,
    pub current_profile: Profile,
}

impl FeatureSet {
    pub fn new() -> FeatureSet {
        let mut features = Vec::new();

        // 0x0000 Profile List: the three profiles we morph between.
        let mut profiles = Vec::with_capacity(12);
        for (profile, _) in PROFILE_DESCRIPTORS {
            profiles.extend_from_slice(&u16::from(profile).to_be_bytes());
            profiles.extend_from_slice(&[0x00, 0x00]);
        }
        features.push(Feature::new(FeatureCode::ProfileList, 0x00, true, profiles));

        // 0x0001 Core: ATAPI physical interface.
        let mut core = vec![0u8; 8];
        core[0..4].copy_from_slice(&2u32.to_be_bytes());
        features.push(Feature::new(FeatureCode::Core, 0x02, true, core));

        // 0x0002 Morphing: neither async nor OC events.
        features.push(Feature::new(FeatureCode::Morphing, 0x01, true, vec![0u8; 4]));

        // 0x0003 Removable Medium: tray, eject, lock.
        features.push(Feature::new(
            FeatureCode::RemovableMedium,
            0x00,
            true,
            vec![0x29, 0x00, 0x00, 0x00],
        ));

        // 0x0010 Random Readable: 2048-byte blocks, blocking 1, error
        // recovery page present.
        let mut random_readable = vec![0u8; 8];
        random_readable[0..4].copy_from_slice(&2048u32.to_be_bytes());
        random_readable[4..6].copy_from_slice(&1u16.to_be_bytes());
        random_readable[6] = 0x01;
        features.push(Feature::new(
            FeatureCode::RandomReadable,
            0x00,
            false,
            random_readable,
        ));

        // 0x001D Multi-read: presence is the payload.
        features.push(Feature::new(FeatureCode::MultiRead, 0x00, false, Vec::new()));

        // 0x001E CD Read: C2 flags and CD-Text, no DAP.
        features.push(Feature::new(
            FeatureCode::CdRead,
            0x02,
            false,
            vec![0x03, 0x00, 0x00, 0x00],
        ));

        // 0x001F DVD Read: DVD-Multi 1.1, dual-layer DVD-R.
        features.push(Feature::new(
            FeatureCode::DvdRead,
            0x01,
            false,
            vec![0x01, 0x00, 0x01, 0x00],
        ));

        // 0x0021 Incremental Streaming: all data block types, link size 7.
        let mut incremental = vec![0u8; 8];
        incremental[0..2].copy_from_slice(&0x00FFu16.to_be_bytes());
        incremental[2] = 0x01; // BUF
        incremental[3] = 1; // one link size
        incremental[4] = 7;
        features.push(Feature::new(
            FeatureCode::IncrementalStreamingWritable,
            0x01,
            false,
            incremental,
        ));

        // 0x002D CD Track-at-Once.
        let mut tao = vec![0u8; 4];
        tao[0] = 0x5F; // BUF, R-W raw/pack, test write, CD-RW, R-W subcode
        tao[2..4].copy_from_slice(&0xFFFFu16.to_be_bytes());
        features.push(Feature::new(FeatureCode::CdTrackAtOnce, 0x02, false, tao));

        // 0x0100 Power Management.
        features.push(Feature::new(
            FeatureCode::PowerManagement,
            0x00,
            true,
            Vec::new(),
        ));

        // 0x0103 CD External Audio Play: scan, separate volume and mute,
        // 0x100 volume levels.
        let mut audio_play = vec![0u8; 4];
        audio_play[0] = 0x07;
        audio_play[2..4].copy_from_slice(&0x0100u16.to_be_bytes());
        features.push(Feature::new(
            FeatureCode::CdExternalAudioPlay,
            0x00,
            false,
            audio_play,
        ));

        // 0x0106 DVD CSS v1.
        features.push(Feature::new(
            FeatureCode::DvdCss,
            0x00,
            false,
            vec![0x00, 0x00, 0x00, 0x01],
        ));

        // 0x0107 Real Time Streaming: READ BUFFER CAPACITY and SET CD SPEED.
        features.push(Feature::new(
            FeatureCode::RealTimeStreaming,
            0x03,
            false,
            vec![0x03, 0x00, 0x00, 0x00],
        ));

        features.sort_by_key(|f| f.code);

        let mut set = FeatureSet {
            features,
            current_profile: Profile::None,
        };
        set.set_profile(Profile::None);
        set
    }

    pub fn get(&self, code: u16) -> Option<&Feature> {
        self.features.iter().find(|f| f.code == code)
    }

    fn get_mut(&mut self, code: u16) -> Option<&mut Feature> {
        self.features.iter_mut().find(|f| f.code == code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Whether a profile's `current` bit is set in the profile list.
    pub fn profile_current(&self, profile: Profile) -> bool {
        let Some(list) = self.get(FeatureCode::ProfileList.into()) else {
            return false;
        };
        PROFILE_DESCRIPTORS
            .iter()
            .find(|(p, _)| *p == profile)
            .is_some_and(|&(_, offset)| list.data[offset + 2] & 0x01 != 0)
    }

    /// Switch the active profile: non-persistent `current` bits are cleared,
    /// the profile's feature set is marked current, and the profile list
    /// descriptors are updated. CD-R implies the CD-ROM bit.
    pub fn set_profile(&mut self, profile: Profile) {
        self.current_profile = profile;

        for feature in &mut self.features {
            feature.current = feature.persistent;
        }

        let active: &[u16] = match profile {
            Profile::None => &[],
            Profile::CdRom => ACTIVE_CDROM,
            Profile::CdR => ACTIVE_CDR,
            Profile::DvdRom => ACTIVE_DVDROM,
        };

        for &code in active {
            match self.get_mut(code) {
                Some(feature) => feature.current = true,
                None => warn!(code, "active feature missing from feature list"),
            }
        }

        let current_profiles: &[Profile] = match profile {
            Profile::None => &[],
            Profile::CdRom => &[Profile::CdRom],
            Profile::CdR => &[Profile::CdR, Profile::CdRom],
            Profile::DvdRom => &[Profile::DvdRom],
        };

        if let Some(list) = self.get_mut(FeatureCode::ProfileList.into()) {
            for (descriptor, offset) in PROFILE_DESCRIPTORS {
                let bit = current_profiles.contains(&descriptor);
                list.data[offset + 2] = u8::from(bit);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ordered_by_code() {
        let set = FeatureSet::new();
        let codes: Vec<u16> = set.iter().map(|f| f.code).collect();
        let mut sorted = codes.clone();
        sorted.sort_unstable();
        assert_eq!(codes, sorted);
        assert_eq!(codes[0], 0x0000);
    }

    #[test]
    fn persistent_features_always_current() {
        let set = FeatureSet::new();
        for feature in set.iter().filter(|f| f.persistent) {
            assert!(feature.current, "feature {:#06X}", feature.code);
        }
    }

    #[test]
    fn cdr_profile_implies_cdrom_bit() {
        let mut set = FeatureSet::new();
        set.set_profile(Profile::CdR);
        assert!(set.profile_current(Profile::CdR));
        assert!(set.profile_current(Profile::CdRom));
        assert!(!set.profile_current(Profile::DvdRom));
        assert!(set.get(0x002D).unwrap().current);
    }

    #[test]
    fn dvdrom_profile_clears_cd_bits() {
        let mut set = FeatureSet::new();
        set.set_profile(Profile::CdR);
        set.set_profile(Profile::DvdRom);
        assert!(!set.profile_current(Profile::CdRom));
        assert!(!set.profile_current(Profile::CdR));
        assert!(set.profile_current(Profile::DvdRom));
        assert!(set.get(0x001F).unwrap().current);
        assert!(!set.get(0x001E).unwrap().current);
    }

    #[test]
    fn serialization_header() {
        let set = FeatureSet::new();
        let core = set.get(0x0001).unwrap().serialize();
        assert_eq!(&core[0..2], &[0x00, 0x01]);
        assert_eq!(core[2], (0x02 << 2) | 0x02 | 0x01); // version, persistent, current
        assert_eq!(core[3], 8);
        assert_eq!(&core[4..8], &[0, 0, 0, 2]); // ATAPI
    }
}
