//! Audio playback state machine and playback thread.
//!
//! The playback thread consumes one sector every frame period under the
//! device mutex and hands the PCM to an [`AudioBackend`]. Command handlers
//! drive the state machine while holding the same mutex, so a
//! dispatcher-initiated stop is never observed mid-command.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use disc_lib::Lba;
use num_enum::IntoPrimitive;
use tracing::{debug, warn};

use crate::device::DeviceInner;
use crate::sense::CommandError;

/// Audio status byte as reported by REQUEST SENSE and READ SUBCHANNEL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum AudioStatus {
    Stopped = 0x00,
    Playing = 0x11,
    Paused = 0x12,
    Completed = 0x13,
    ErrorStopped = 0x14,
}

/// Sink for decoded audio frames. The real PCM output lives outside this
/// daemon; the backend contract is one 2352-byte frame per sector, `false`
/// signalling an unrecoverable output error.
pub trait AudioBackend: Send {
    fn play_frame(&mut self, pcm: &[u8]) -> bool;
}

/// Discards all frames; playback is pure state emulation.
pub struct NullBackend;

impl AudioBackend for NullBackend {
    fn play_frame(&mut self, _pcm: &[u8]) -> bool {
        true
    }
}

pub fn backend_for(driver: &str) -> Box<dyn AudioBackend> {
    match driver {
        "null" | "" => Box::new(NullBackend),
        other => {
            warn!(driver = other, "unknown audio driver, using null output");
            Box::new(NullBackend)
        }
    }
}

pub struct AudioPlay {
    pub status: AudioStatus,
    /// `[start, end)` of the running play operation.
    range: Option<(i32, i32)>,
}

impl AudioPlay {
    pub fn new() -> AudioPlay {
        AudioPlay {
            status: AudioStatus::Stopped,
            range: None,
        }
    }

    pub fn status_byte(&self) -> u8 {
        self.status.into()
    }

    pub fn end_address(&self) -> Option<i32> {
        self.range.map(|(_, end)| end)
    }

    /// Begin a play operation. Running operations must be stopped first;
    /// the dispatcher does that implicitly for disturbing commands.
    pub fn start(&mut self, start: i32, end: i32) -> Result<(), CommandError> {
        match self.status {
            AudioStatus::Playing | AudioStatus::Paused => {
                Err(CommandError::CommandSequenceError)
            }
            _ => {
                self.range = Some((start, end));
                self.status = AudioStatus::Playing;
                Ok(())
            }
        }
    }

    pub fn pause(&mut self) {
        if self.status == AudioStatus::Playing {
            self.status = AudioStatus::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.status == AudioStatus::Paused {
            self.status = AudioStatus::Playing;
        }
    }

    pub fn stop(&mut self) {
        self.status = AudioStatus::Stopped;
        self.range = None;
    }
}

/// One sector per frame period at 1x.
const FRAME_PERIOD: Duration = Duration::from_micros(1_000_000 / 75);

pub fn spawn_playback_thread(
    inner: Arc<DeviceInner>,
    mut backend: Box<dyn AudioBackend>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("audio-play".to_string())
        .spawn(move || {
            while !inner.shutdown.load(Ordering::Relaxed) {
                thread::sleep(FRAME_PERIOD);

                let mut state = match inner.state.lock() {
                    Ok(state) => state,
                    Err(_) => break,
                };

                if state.audio.status != AudioStatus::Playing {
                    continue;
                }
                let Some(end) = state.audio.end_address() else {
                    state.audio.stop();
                    continue;
                };

                let address = state.current_address;
                if address.raw() >= end {
                    state.audio.status = AudioStatus::Completed;
                    continue;
                }

                let frame = state
                    .disc
                    .as_ref()
                    .ok_or(())
                    .and_then(|disc| disc.get_sector(address).map_err(drop))
                    .map(|sector| sector.data().to_vec());

                match frame {
                    Ok(pcm) if backend.play_frame(&pcm) => {
                        state.current_address = address.offset(1);
                        if state.current_address.raw() >= end {
                            debug!(end, "playback complete");
                            state.audio.status = AudioStatus::Completed;
                        }
                    }
                    _ => {
                        warn!(address = address.raw(), "playback error");
                        state.audio.status = AudioStatus::ErrorStopped;
                    }
                }
            }
        })
        .expect("spawning audio thread cannot fail")
}

impl crate::device::DeviceState {
    /// PLAY AUDIO entry: validate the range starts on an audio sector, then
    /// hand `[start, end)` to the playback engine.
    pub fn audio_start(&mut self, start: i32, end: i32) -> Result<(), CommandError> {
        let disc = self.disc_loaded()?;

        if end > start {
            let first = disc.get_sector(Lba::from(start)).map_err(|_| {
                CommandError::IllegalModeForThisTrack {
                    ili: false,
                    address: start,
                }
            })?;
            if first.kind() != disc_lib::SectorType::Audio {
                return Err(CommandError::IllegalModeForThisTrack {
                    ili: false,
                    address: start,
                });
            }
        }

        self.current_address = Lba::from(start);
        self.audio.start(start, end)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::device::{Device, test_support};
    use std::time::Instant;

    #[test]
    fn playback_thread_runs_to_completion() {
        let device = Device::new(0);
        {
            let mut state = device.inner().state.lock().unwrap();
            *state = test_support::loaded_state(test_support::audio_disc());
            state.audio_start(150, 160).unwrap();
        }

        let handle =
            spawn_playback_thread(Arc::clone(device.inner()), Box::new(NullBackend));

        // Ten sectors at 75/s; give the thread ample slack.
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            {
                let state = device.inner().state.lock().unwrap();
                if state.audio.status == AudioStatus::Completed {
                    assert_eq!(state.current_address.raw(), 160);
                    break;
                }
            }
            assert!(Instant::now() < deadline, "playback never completed");
            thread::sleep(Duration::from_millis(10));
        }

        device
            .inner()
            .shutdown
            .store(true, std::sync::atomic::Ordering::Relaxed);
        handle.join().unwrap();
    }

    #[test]
    fn transitions() {
        let mut play = AudioPlay::new();
        assert_eq!(play.status_byte(), 0x00);

        play.start(0, 100).unwrap();
        assert_eq!(play.status, AudioStatus::Playing);

        // A second start without a stop is a sequence error.
        assert!(play.start(0, 100).is_err());

        play.pause();
        assert_eq!(play.status, AudioStatus::Paused);
        assert!(play.start(0, 100).is_err());

        play.resume();
        assert_eq!(play.status, AudioStatus::Playing);

        play.stop();
        assert_eq!(play.status, AudioStatus::Stopped);

        // Completed and error states accept a new start.
        play.status = AudioStatus::Completed;
        play.start(5, 10).unwrap();
        play.stop();
        play.status = AudioStatus::ErrorStopped;
        play.start(5, 10).unwrap();
    }
}
