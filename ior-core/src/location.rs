use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixation point the participant must eventually look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaccadeLoc {
    Upper,
    Lower,
}

impl SaccadeLoc {
    pub const ALL: [SaccadeLoc; 2] = [SaccadeLoc::Lower, SaccadeLoc::Upper];

    pub fn opposite(self) -> Self {
        match self {
            SaccadeLoc::Upper => SaccadeLoc::Lower,
            SaccadeLoc::Lower => SaccadeLoc::Upper,
        }
    }
}

impl fmt::Display for SaccadeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SaccadeLoc::Upper => "upper",
            SaccadeLoc::Lower => "lower",
        })
    }
}

/// Pro blocks signal the saccade location itself, anti blocks its opposite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockCondition {
    Pro,
    Anti,
}

impl fmt::Display for BlockCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BlockCondition::Pro => "pro",
            BlockCondition::Anti => "anti",
        })
    }
}

/// The three fixation points; each owns a circular gaze boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixationPoint {
    Upper,
    Middle,
    Lower,
}

impl FixationPoint {
    pub const ALL: [FixationPoint; 3] = [
        FixationPoint::Upper,
        FixationPoint::Middle,
        FixationPoint::Lower,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl From<SaccadeLoc> for FixationPoint {
    fn from(loc: SaccadeLoc) -> Self {
        match loc {
            SaccadeLoc::Upper => FixationPoint::Upper,
            SaccadeLoc::Lower => FixationPoint::Lower,
        }
    }
}

impl fmt::Display for FixationPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FixationPoint::Upper => "upper",
            FixationPoint::Middle => "middle",
            FixationPoint::Lower => "lower",
        })
    }
}

/// One of the eight placeholders, numbered 1..=8 row by row from the top
/// left: odd ids sit left of the vertical midline, even ids right of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PlaceholderId(u8);

impl PlaceholderId {
    pub const COUNT: usize = 8;

    pub fn new(id: u8) -> Option<Self> {
        (1..=Self::COUNT as u8).contains(&id).then_some(Self(id))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based slot, handy for indexing fixed-size arrays.
    pub fn slot(self) -> usize {
        (self.0 - 1) as usize
    }

    pub fn row(self) -> usize {
        self.slot() / 2
    }

    pub fn is_left(self) -> bool {
        self.slot() % 2 == 0
    }

    pub fn all() -> impl Iterator<Item = PlaceholderId> {
        (1..=Self::COUNT as u8).map(PlaceholderId)
    }
}

impl TryFrom<u8> for PlaceholderId {
    type Error = String;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        PlaceholderId::new(id).ok_or_else(|| format!("placeholder {id} is outside 1..=8"))
    }
}

impl From<PlaceholderId> for u8 {
    fn from(id: PlaceholderId) -> u8 {
        id.0
    }
}

impl fmt::Display for PlaceholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
