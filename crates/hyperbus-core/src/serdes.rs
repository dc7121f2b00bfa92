//! Double-data-rate serializer/deserializer
//!
//! Each clock cycle carries two beats, one per edge. On an x8 bus a word
//! takes two beats (high byte on the rising edge), on x16 one beat.

use alloc::vec::Vec;

use crate::config::BusWidth;
use crate::error::{Error, Result};
use crate::transaction::ByteEnable;

/// One beat on DQ with its RWDS write mask
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WireBeat {
    /// DQ value (x8 uses bits 7..0)
    pub data: u16,
    /// RWDS level per byte lane; 1 = byte masked (x8 uses bit 0)
    pub mask: u8,
}

impl WireBeat {
    /// Unmasked beat
    pub const fn new(data: u16) -> Self {
        Self { data, mask: 0 }
    }

    /// Beat with every lane masked, used to fill the last x16 edge
    pub const fn padding() -> Self {
        Self { data: 0, mask: 0b11 }
    }
}

/// Serialize `words` into wire beats
///
/// `masks` is either empty (all bytes enabled) or one entry per word. Masks
/// are carried to the PHY; masked words are still sent.
pub fn serialize(words: &[u16], masks: &[ByteEnable], width: BusWidth) -> Vec<WireBeat> {
    let mut beats = Vec::with_capacity(words.len() * width.beats_per_word() + 1);

    for (i, &word) in words.iter().enumerate() {
        let enable = masks.get(i).copied().unwrap_or(ByteEnable::WORD);
        match width {
            BusWidth::X8 => {
                beats.push(WireBeat {
                    data: word >> 8,
                    mask: u8::from(!enable.contains(ByteEnable::HIGH)),
                });
                beats.push(WireBeat {
                    data: word & 0xFF,
                    mask: u8::from(!enable.contains(ByteEnable::LOW)),
                });
            }
            BusWidth::X16 => {
                beats.push(WireBeat {
                    data: word,
                    mask: (!enable & ByteEnable::WORD).bits(),
                });
            }
        }
    }

    if beats.len() % 2 != 0 {
        beats.push(WireBeat::padding());
    }
    beats
}

/// Reassemble words from received beats
///
/// Fails with [`Error::Framing`] if an x8 stream ends on half a word.
pub fn deserialize(beats: &[u16], width: BusWidth) -> Result<Vec<u16>> {
    let mut de = Deserializer::new(width);
    for &beat in beats {
        de.push(beat);
    }
    de.finish()
}

/// Incremental deserializer used during the data phase
#[derive(Debug, Clone)]
pub struct Deserializer {
    width: BusWidth,
    pending: Option<u8>,
    words: Vec<u16>,
}

impl Deserializer {
    /// Empty deserializer
    pub fn new(width: BusWidth) -> Self {
        Self {
            width,
            pending: None,
            words: Vec::new(),
        }
    }

    /// Feed one received beat
    pub fn push(&mut self, beat: u16) {
        match self.width {
            BusWidth::X8 => match self.pending.take() {
                Some(high) => self.words.push(u16::from_be_bytes([high, beat as u8])),
                None => self.pending = Some(beat as u8),
            },
            BusWidth::X16 => self.words.push(beat),
        }
    }

    /// Complete words received so far
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Returns true if no complete word has been received
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Drop words beyond `len` (x16 padding on odd bursts)
    pub fn truncate(&mut self, len: usize) {
        self.words.truncate(len);
    }

    /// Finish, rejecting a dangling half word
    pub fn finish(self) -> Result<Vec<u16>> {
        if self.pending.is_some() {
            return Err(Error::Framing);
        }
        Ok(self.words)
    }

    /// Take the words received so far, discarding any half word
    pub fn into_words(self) -> Vec<u16> {
        self.words
    }
}
