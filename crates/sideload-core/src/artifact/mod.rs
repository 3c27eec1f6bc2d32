//! Turning package inputs into installable file sets.
//!
//! Single packages pass straight through. Bundles are zip archives under
//! another extension; they are unpacked into `<output_root>/<stem>` and the
//! split packages found at the top level of that directory are returned.

mod archive;
mod resolver;

pub use archive::extract_archive;
pub use resolver::{ArtifactResolver, Resolved};
