mod args;
mod driver;
mod identifications;
mod progress;
mod spectra;
mod time_range;
mod write;

pub use args::*;
pub use driver::{MZMider, MZMiderError, BUFFER_SIZE};
pub use identifications::{IdentificationLoadError, LoadOptions};
pub use progress::ProgressRecord;
pub use spectra::load_spectral_index;
pub use time_range::{TimeRange, TimeRangeParseError};
pub use write::{write_output, MidTableWriter};
