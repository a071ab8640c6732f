//! Tag post-processing: threshold, ordering, top-N and display-name overrides.

pub mod overrides;
pub mod postprocess;

pub use overrides::OverrideMap;
pub use postprocess::{TagFilter, TagPostProcessor};
