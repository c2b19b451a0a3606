// Audio module - Device access, sample decoding and signal helpers for the click sinks

pub mod device;
pub mod dsp_utils;
pub mod export;
pub mod format_conversion;
pub mod loader;
pub mod parameters;

pub use device::{AudioDeviceManager, OutputDeviceInfo};
pub use loader::{LoadedSample, load_sample};
pub use parameters::{AtomicF32, AtomicF64};
