pub mod interaction;
pub mod paper;

pub use interaction::{InteractionRow, InteractionSourceSpec};
pub use paper::PaperRecord;
