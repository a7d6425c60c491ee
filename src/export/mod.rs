//! Model persistence
//!
//! Selected models are stored as a binary `.model` envelope (bincode, with a
//! magic tag, format version and FNV-1a checksum) plus a `.meta.json` sidecar.
//! Saving the same name again replaces the previous artifact.

mod artifact;

pub use artifact::{
    fnv1a, ArtifactHandle, ArtifactMetadata, ArtifactStore, FORMAT_VERSION, MAGIC,
};
