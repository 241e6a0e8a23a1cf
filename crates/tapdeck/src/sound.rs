//! Audible feedback.
//!
//! Two short cues: success on a recognized arrival, fail on errors. The
//! production implementation materializes generated WAV files under the
//! runtime directory at service start and fires `aplay` at them without
//! waiting; sound must never stall the poll loop. Tests and the
//! sounds-disabled configuration use [`NullSound`].

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use tapdeck_core::Result;

/// Sound effect sink.
pub trait Sound: Send + Sync {
    fn success(&self);
    fn fail(&self);
}

/// Plays WAV files through an external `aplay` process.
#[derive(Debug)]
pub struct AplaySound {
    success_path: PathBuf,
    fail_path: PathBuf,
}

impl AplaySound {
    /// Write the sound files and return the player.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the files cannot be written; the caller
    /// falls back to [`NullSound`].
    pub fn install(success_path: PathBuf, fail_path: PathBuf) -> Result<Self> {
        std::fs::write(&success_path, success_wav())?;
        std::fs::write(&fail_path, fail_wav())?;
        Ok(Self {
            success_path,
            fail_path,
        })
    }

    fn play(&self, path: &Path) {
        let result = Command::new("aplay")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match result {
            Ok(_) => debug!(path = %path.display(), "playing"),
            Err(e) => warn!(error = %e, "could not spawn aplay"),
        }
    }
}

impl Sound for AplaySound {
    fn success(&self) {
        self.play(&self.success_path);
    }

    fn fail(&self) {
        self.play(&self.fail_path);
    }
}

/// Silent implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSound;

impl Sound for NullSound {
    fn success(&self) {}
    fn fail(&self) {}
}

const SAMPLE_RATE: u32 = 8_000;

/// Two rising notes.
fn success_wav() -> Vec<u8> {
    render_wav(&[(660.0, 80), (880.0, 120)])
}

/// One low buzz.
fn fail_wav() -> Vec<u8> {
    render_wav(&[(220.0, 220)])
}

/// Render a tone sequence as a mono 16-bit PCM WAV.
fn render_wav(tones: &[(f32, u32)]) -> Vec<u8> {
    let mut samples: Vec<i16> = Vec::new();
    for &(freq, ms) in tones {
        let count = SAMPLE_RATE * ms / 1000;
        for i in 0..count {
            let t = i as f32 / SAMPLE_RATE as f32;
            // Linear fade-out per note keeps the cue click-free
            let envelope = 1.0 - (i as f32 / count as f32);
            let value = (t * freq * std::f32::consts::TAU).sin() * envelope * 0.5;
            samples.push((value * f32::from(i16::MAX)) as i16);
        }
    }

    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + samples.len() * 2);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    out.extend_from_slice(&(SAMPLE_RATE * 2).to_le_bytes()); // byte rate
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}
