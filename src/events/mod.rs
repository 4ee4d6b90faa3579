pub mod category;
pub mod classification;

pub use category::{ForensicCategory, LABEL_TABLE, categorize, display_label};
pub use classification::{ClassificationReport, SoundEvent, load_classification};
