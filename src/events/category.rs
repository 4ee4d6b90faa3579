//! Forensic category taxonomy and the raw-label lookup table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of categories the masker produces stems for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForensicCategory {
    Vocals,
    Background,
    Vehicles,
    Footsteps,
    Animals,
    Wind,
    Gunshots,
    Screams,
    Sirens,
    Impact,
}

impl ForensicCategory {
    /// Every category, in stem-output order.
    pub const ALL: [ForensicCategory; 10] = [
        ForensicCategory::Vocals,
        ForensicCategory::Background,
        ForensicCategory::Vehicles,
        ForensicCategory::Footsteps,
        ForensicCategory::Animals,
        ForensicCategory::Wind,
        ForensicCategory::Gunshots,
        ForensicCategory::Screams,
        ForensicCategory::Sirens,
        ForensicCategory::Impact,
    ];

    /// Stem key, also the output file stem.
    pub fn name(self) -> &'static str {
        match self {
            ForensicCategory::Vocals => "vocals",
            ForensicCategory::Background => "background",
            ForensicCategory::Vehicles => "vehicles",
            ForensicCategory::Footsteps => "footsteps",
            ForensicCategory::Animals => "animals",
            ForensicCategory::Wind => "wind",
            ForensicCategory::Gunshots => "gunshots",
            ForensicCategory::Screams => "screams",
            ForensicCategory::Sirens => "sirens",
            ForensicCategory::Impact => "impact",
        }
    }

    /// Human-readable label used in event listings.
    pub fn display_name(self) -> &'static str {
        match self {
            ForensicCategory::Vocals => "Human Voice",
            ForensicCategory::Background => "Musical Content",
            ForensicCategory::Vehicles => "Vehicle Sound",
            ForensicCategory::Footsteps => "Footsteps",
            ForensicCategory::Animals => "Animal Signal",
            ForensicCategory::Wind => "Atmospheric Wind",
            ForensicCategory::Gunshots => "Gunshot / Explosion",
            ForensicCategory::Screams => "Scream / Aggression",
            ForensicCategory::Sirens => "Siren / Alarm",
            ForensicCategory::Impact => "Impact / Breach",
        }
    }

    /// Whether the separator can supply this stem itself.
    pub fn is_separable(self) -> bool {
        matches!(self, ForensicCategory::Vocals | ForensicCategory::Background)
    }
}

impl fmt::Display for ForensicCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lowercase substring patterns, evaluated top to bottom.
///
/// Order matters: the first pattern contained in the lowercased label wins.
/// Every display name resolves back to its own category, so labels that were
/// already mapped by the classification front-end round-trip.
pub const LABEL_TABLE: &[(&str, ForensicCategory)] = &[
    ("speech", ForensicCategory::Vocals),
    ("singing", ForensicCategory::Vocals),
    ("voice", ForensicCategory::Vocals),
    ("music", ForensicCategory::Background),
    ("vehicle", ForensicCategory::Vehicles),
    ("car", ForensicCategory::Vehicles),
    ("bus", ForensicCategory::Vehicles),
    ("truck", ForensicCategory::Vehicles),
    ("motorcycle", ForensicCategory::Vehicles),
    ("engine", ForensicCategory::Vehicles),
    ("footsteps", ForensicCategory::Footsteps),
    ("animal", ForensicCategory::Animals),
    ("dog", ForensicCategory::Animals),
    ("cat", ForensicCategory::Animals),
    ("bird", ForensicCategory::Animals),
    ("bark", ForensicCategory::Animals),
    ("meow", ForensicCategory::Animals),
    ("wind", ForensicCategory::Wind),
    ("thunder", ForensicCategory::Wind),
    ("breeze", ForensicCategory::Wind),
    ("gunshot", ForensicCategory::Gunshots),
    ("gunfire", ForensicCategory::Gunshots),
    ("explosion", ForensicCategory::Gunshots),
    ("cap gun", ForensicCategory::Gunshots),
    ("fusillade", ForensicCategory::Gunshots),
    ("artillery", ForensicCategory::Gunshots),
    ("scream", ForensicCategory::Screams),
    ("shout", ForensicCategory::Screams),
    ("yell", ForensicCategory::Screams),
    ("siren", ForensicCategory::Sirens),
    ("alarm", ForensicCategory::Sirens),
    ("buzzer", ForensicCategory::Sirens),
    ("impact", ForensicCategory::Impact),
    ("glass", ForensicCategory::Impact),
    ("shatter", ForensicCategory::Impact),
    ("smash", ForensicCategory::Impact),
    ("hammer", ForensicCategory::Impact),
    ("door", ForensicCategory::Impact),
    ("knock", ForensicCategory::Impact),
    ("slam", ForensicCategory::Impact),
    ("breach", ForensicCategory::Impact),
];

/// Resolve a raw classifier label for masking. Unknown labels are `None`.
pub fn categorize(label: &str) -> Option<ForensicCategory> {
    let label = label.to_lowercase();
    LABEL_TABLE
        .iter()
        .find(|(pattern, _)| label.contains(pattern))
        .map(|&(_, category)| category)
}

/// Resolve a raw classifier label for display. Unknown labels pass through.
pub fn display_label(label: &str) -> String {
    match categorize(label) {
        Some(category) => category.display_name().to_string(),
        None => label.to_string(),
    }
}
