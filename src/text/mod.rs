pub mod dates;
pub mod detector;
pub mod processor;

pub use detector::{CachedDetector, DetectorCache, MentionDetector, NoDetector, StaticDetector};
pub use processor::TextProcessor;
