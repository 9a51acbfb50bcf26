//! Image builders and the file helpers they share.
//!
//! - [`ext`] - ext2/ext3/ext4 images, regenerated or incrementally injected
//! - [`filesystem`] - padding image files and splicing data into them

pub mod ext;
pub mod filesystem;
