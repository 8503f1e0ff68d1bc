//! End-to-end scenarios: images loaded through the real parsers, CDBs
//! dispatched byte-for-byte.

use std::io::Write;
use std::path::PathBuf;

use phantomcd::commands::execute;
use phantomcd::device::Device;
use phantomcd::device::load::LoadOptions;

const STATUS_GOOD: u32 = 0;
const STATUS_CHECK_CONDITION: u32 = 2;

struct TestDir(PathBuf);

impl TestDir {
    fn new(name: &str) -> TestDir {
        let dir = std::env::temp_dir().join(format!("phantomcd-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        TestDir(dir)
    }

    fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.0.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// One-track CD-DA image: implicit 150-sector pregap, 30 seconds of silence.
fn audio_device(dir: &TestDir) -> Device {
    let toc = dir.write("audio.toc", b"CD_DA\nTRACK AUDIO\nSILENCE 00:30:00\n");
    let device = Device::new(0);
    device.load(&[toc], &LoadOptions::default()).unwrap();
    device
}

/// Audio track followed by a Mode 1 data track.
fn mixed_device(dir: &TestDir) -> Device {
    dir.write("data.bin", &vec![0u8; 10 * 2048]);
    let toc = dir.write(
        "mixed.toc",
        br#"CD_ROM
TRACK AUDIO
SILENCE 00:00:10
TRACK MODE1
DATAFILE "data.bin"
"#,
    );
    let device = Device::new(0);
    device.load(&[toc], &LoadOptions::default()).unwrap();
    device
}

fn run(device: &Device, cdb: [u8; 12]) -> (u32, Vec<u8>) {
    let mut state = device.inner().state.lock().unwrap();
    let response = execute(&mut state, &cdb, &[], 1 << 16);
    (response.status, response.data)
}

#[test]
fn s1_inquiry_identity() {
    let device = Device::new(0);
    let (status, data) = run(&device, [0x12, 0, 0, 0, 0x24, 0, 0, 0, 0, 0, 0, 0]);

    assert_eq!(status, STATUS_GOOD);
    assert_eq!(data.len(), 36);
    assert_eq!(data[0], 0x05);
    assert_eq!(data[1], 0x80);
    assert_eq!(data[2], 0x00);
    assert_eq!(data[3], 0x02);
    assert_eq!(data[4], 0x1F);

    // With enough allocation the MMC-3 version descriptor appears.
    let (_, full) = run(&device, [0x12, 0, 0, 0, 96, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(&full[58..60], &[0x02, 0xA0]);
}

#[test]
fn s2_read_without_medium() {
    let device = Device::new(0);
    let (status, data) = run(&device, [0x28, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0]);

    assert_eq!(status, STATUS_CHECK_CONDITION);
    assert_eq!(data[2] & 0x0F, 0x02);
    assert_eq!(data[12], 0x3A);
    assert_eq!(data[13], 0x00);
}

#[test]
fn s3_read_capacity() {
    let dir = TestDir::new("s3");
    let device = audio_device(&dir);

    let (status, data) = run(&device, [0x25, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(status, STATUS_GOOD);
    assert_eq!(
        u32::from_be_bytes(data[0..4].try_into().unwrap()),
        150 + 2250 - 1
    );
    assert_eq!(u32::from_be_bytes(data[4..8].try_into().unwrap()), 2048);
}

#[test]
fn s4_mode_sense_all_pages() {
    let device = Device::new(0);
    let (status, data) = run(&device, [0x5A, 0, 0x3F, 0, 0, 0, 0, 0x02, 0x00, 0, 0, 0]);

    assert_eq!(status, STATUS_GOOD);
    let header_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    assert_eq!(header_len, data.len() - 2);

    let mut codes = Vec::new();
    let mut at = 8;
    while at < data.len() {
        codes.push(data[at]);
        at += data[at + 1] as usize + 2;
    }
    assert_eq!(codes, vec![0x01, 0x05, 0x0D, 0x0E, 0x1A, 0x2A]);
}

#[test]
fn s5_get_configuration_one_shot() {
    let dir = TestDir::new("s5");
    let device = audio_device(&dir);

    let (status, data) = run(&device, [0x46, 0x02, 0, 0, 0, 0, 0, 0x01, 0x00, 0, 0, 0]);
    assert_eq!(status, STATUS_GOOD);

    // Exactly the profile list feature after the 8-byte header.
    assert_eq!(&data[8..10], &[0x00, 0x00]);
    assert_eq!(data.len(), 8 + 4 + data[11] as usize);
    // Current profile: CD-ROM after loading a CD.
    assert_eq!(&data[6..8], &[0x00, 0x08]);
}

#[test]
fn s6_read_subchannel_position() {
    let dir = TestDir::new("s6");
    let device = audio_device(&dir);

    {
        let mut state = device.inner().state.lock().unwrap();
        state.current_address = disc_lib::Lba::from(166);
    }

    let (status, data) = run(&device, [0x42, 0x02, 0x40, 0x01, 0, 0, 0, 0x00, 0x40, 0, 0, 0]);
    assert_eq!(status, STATUS_GOOD);
    assert_eq!(data[4], 0x01); // format
    assert_eq!(data[5], 0x10); // ADR 1, audio CTL 0
    assert_eq!(data[6], 1); // track, binary
    // Absolute 166 -> 00:04:16; relative 16 -> 00:00:16.
    assert_eq!(&data[8..12], &[0, 0, 4, 16]);
    assert_eq!(&data[12..16], &[0, 0, 0, 16]);
}

#[test]
fn unit_attention_after_load() {
    let dir = TestDir::new("events");
    let device = audio_device(&dir);

    // First TEST UNIT READY: unit attention; second: good.
    let (status, data) = run(&device, [0x00; 12]);
    assert_eq!(status, STATUS_CHECK_CONDITION);
    assert_eq!(data[2], 0x06);
    assert_eq!(data[12], 0x28);
    let (status, _) = run(&device, [0x00; 12]);
    assert_eq!(status, STATUS_GOOD);
}

#[test]
fn media_event_latch_reports_new_media_once() {
    let dir = TestDir::new("latch");
    let device = audio_device(&dir);

    // GET EVENT/STATUS: NewMedia once, then NoChange. The latch is shared
    // with TEST UNIT READY, so the event is polled first here.
    let cdb = [0x4A, 0x01, 0, 0, 0x10, 0, 0, 0x00, 0x10, 0, 0, 0];
    let (_, data) = run(&device, cdb);
    assert_eq!(data[4], 0x02);
    let (_, data) = run(&device, cdb);
    assert_eq!(data[4], 0x00);
}

#[test]
fn read_boundary_fails_past_layout() {
    let dir = TestDir::new("boundary");
    let device = mixed_device(&dir);

    // Layout: 150 pregap + 750 audio + 10 data = 910 sectors.
    let last = 909u32;
    let cdb = [0x28, 0, 0, 0, (last >> 8) as u8, (last & 0xFF) as u8, 0, 0, 1, 0, 0, 0];
    let (status, _) = run(&device, cdb);
    assert_eq!(status, STATUS_GOOD);

    let out = 910u32;
    let cdb = [0x28, 0, 0, 0, (out >> 8) as u8, (out & 0xFF) as u8, 0, 0, 1, 0, 0, 0];
    let (status, data) = run(&device, cdb);
    assert_eq!(status, STATUS_CHECK_CONDITION);
    assert_eq!(data[12], 0x64);
    assert_eq!(&data[3..7], &out.to_be_bytes());
}

#[test]
fn read_cd_stops_at_type_transition() {
    let dir = TestDir::new("transition");
    let device = mixed_device(&dir);

    // Two sectors across the audio/data boundary at LBA 900, expected
    // type 0: the transfer must stop at the transition.
    let cdb = [0xBE, 0x00, 0, 0, 0x03, 0x83, 0, 0, 2, 0x10, 0, 0];
    let (status, data) = run(&device, cdb);
    assert_eq!(status, STATUS_CHECK_CONDITION);
    assert_eq!(data[12], 0x64);
}

#[test]
fn formatted_toc_lists_both_tracks() {
    let dir = TestDir::new("toc");
    let device = mixed_device(&dir);

    let (status, data) = run(&device, [0x43, 0, 0, 0, 0, 0, 0, 0x04, 0x00, 0, 0, 0]);
    assert_eq!(status, STATUS_GOOD);
    // Header + 2 tracks + lead-out.
    assert_eq!(data.len(), 4 + 3 * 8);
    assert_eq!(data[3], 2);
    // Track 2 is a data track starting at LBA 900.
    assert_eq!(data[13], 0x14);
    assert_eq!(data[14], 2);
    assert_eq!(&data[16..20], &900u32.to_be_bytes());
}

#[test]
fn profile_morphs_with_medium() {
    let dir = TestDir::new("profiles");
    let device = audio_device(&dir);

    let (_, data) = run(&device, [0x46, 0x02, 0, 0, 0, 0, 0, 0x01, 0x00, 0, 0, 0]);
    // CD-ROM profile descriptor is current.
    assert_eq!(&data[12..14], &[0x00, 0x08]);
    assert_eq!(data[14] & 0x01, 0x01);

    device.unload(false).unwrap();
    let (_, data) = run(&device, [0x46, 0x02, 0, 0, 0, 0, 0, 0x01, 0x00, 0, 0, 0]);
    assert_eq!(&data[6..8], &[0x00, 0x00]); // profile gone
    assert_eq!(data[14] & 0x01, 0x00);
}
