//! Image intake stages.
//!
//! - **discovery**: expand inputs into ordered `ImageTask`s
//! - **validate**: magic-byte sniffing
//! - **loader**: bomb-safe decode (`SafeImageLoader`)
//! - **preprocess**: resize and normalize for the classifier
//! - **batch**: split tasks into inference windows (`BatchPlanner`)

pub mod batch;
pub mod discovery;
pub mod loader;
pub mod preprocess;
pub mod validate;

// Re-exports for convenient access
pub use batch::{BatchPlanner, BatchWindow};
pub use discovery::FileDiscovery;
pub use loader::{DecodedImage, ResidencyTracker, SafeImageLoader};
pub use preprocess::{preprocess, Normalization};
