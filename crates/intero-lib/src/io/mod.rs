pub mod recording;
pub mod text;

pub use recording::{read_recording, write_recording};
pub use text::{read_f64_series, read_indices};
