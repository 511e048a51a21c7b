//! Typed buffers exchanged between pipeline stages.
//!
//! Each buffer is owned by exactly one stage at a time; batches cross stage
//! boundaries inside an `Arc`, so the hand-off is a move of shared ownership
//! with no back-references.

use serde::{Deserialize, Serialize};

/// Object categories the pipeline knows how to track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetClass {
    Unknown,
    Person,
    Pet,
    Vehicle,
}

impl TargetClass {
    /// Fixed dictionary mapping model label strings to classes. Anything
    /// not listed is `Unknown` and gets filtered before publication.
    pub fn from_label(label: &str) -> Self {
        match label {
            "person" => Self::Person,
            "cat" | "dog" => Self::Pet,
            "car" | "bus" | "truck" | "bicycle" | "motorcycle" => Self::Vehicle,
            _ => Self::Unknown,
        }
    }

    /// Every class the tracker can follow.
    pub fn tracked() -> [Self; 3] {
        [Self::Person, Self::Pet, Self::Vehicle]
    }
}

/// One raw camera frame: RGB24, `width × height × 3`, 8 bits per channel.
#[derive(Debug, Clone)]
pub struct FrameBuf {
    /// Monotonically increasing frame number.
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FrameBuf {
    pub fn new(id: u32, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            id,
            width,
            height,
            data,
        }
    }

    /// Buffer length in bytes.
    pub fn length(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer length matches the declared geometry.
    pub fn validate(&self) -> bool {
        self.length() == (self.width * self.height * 3) as usize
    }
}

/// One detection, in source-frame pixels. `id` has no cross-frame meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxBuf {
    pub class: TargetClass,
    pub id: u32,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// One live track. Same geometry as [`BoxBuf`], but `id` is the persistent
/// tracker-assigned track id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackBuf {
    pub class: TargetClass,
    pub id: u32,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_dictionary() {
        assert_eq!(TargetClass::from_label("person"), TargetClass::Person);
        assert_eq!(TargetClass::from_label("cat"), TargetClass::Pet);
        assert_eq!(TargetClass::from_label("dog"), TargetClass::Pet);
        assert_eq!(TargetClass::from_label("car"), TargetClass::Vehicle);
        assert_eq!(TargetClass::from_label("motorcycle"), TargetClass::Vehicle);
        assert_eq!(TargetClass::from_label("toaster"), TargetClass::Unknown);
        assert_eq!(TargetClass::from_label(""), TargetClass::Unknown);
    }

    #[test]
    fn frame_validation() {
        let frame = FrameBuf::new(0, 4, 2, vec![0u8; 24]);
        assert!(frame.validate());
        assert_eq!(frame.length(), 24);

        let short = FrameBuf::new(0, 4, 2, vec![0u8; 23]);
        assert!(!short.validate());
    }
}
