//! Detection, landmark estimation and tracking of human hands.

pub mod detection;
pub mod landmark;
pub mod tracking;

/// Names for the 21 hand landmarks, in the order landmark networks output them.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: Placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

impl LandmarkIdx {
    /// Number of hand landmarks.
    pub const COUNT: usize = 21;

    /// All landmarks, ordered by index.
    pub const ALL: [LandmarkIdx; Self::COUNT] = {
        use LandmarkIdx::*;
        [
            Wrist,
            ThumbCmc,
            ThumbMcp,
            ThumbIp,
            ThumbTip,
            IndexFingerMcp,
            IndexFingerPip,
            IndexFingerDip,
            IndexFingerTip,
            MiddleFingerMcp,
            MiddleFingerPip,
            MiddleFingerDip,
            MiddleFingerTip,
            RingFingerMcp,
            RingFingerPip,
            RingFingerDip,
            RingFingerTip,
            PinkyMcp,
            PinkyPip,
            PinkyDip,
            PinkyTip,
        ]
    };

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// The landmarks that surround the palm.
pub const PALM_LANDMARKS: &[LandmarkIdx] = {
    use LandmarkIdx::*;
    &[
        Wrist,
        ThumbCmc,
        IndexFingerMcp,
        MiddleFingerMcp,
        RingFingerMcp,
        PinkyMcp,
    ]
};

/// Skeleton edges connecting the hand landmarks.
pub const CONNECTIONS: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Palm:
        (Wrist, ThumbCmc),
        (Wrist, IndexFingerMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (Wrist, PinkyMcp),
        // Thumb:
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index:
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle:
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring:
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky:
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

/// Which hand was seen, assuming the camera image is not mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// Interprets the raw handedness output of a landmark network.
    pub fn from_raw(raw: f32) -> Self {
        if raw > 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }
}
