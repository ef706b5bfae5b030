//! Tally Artifact Model
//!
//! Identities shared by every stage of build report aggregation.
//!
//! # Core Concepts
//!
//! - [`TargetLabel`]: `cell//package:name` identifier of a build target
//! - [`ConfigurationDescriptor`]: resolved configuration, or `<unspecified>`
//! - [`ConfiguredTargetKey`]: a target under one configuration
//! - [`ContentHash`]: Blake3 content identity of an executed action
//! - [`OutputPathResolver`]: maps action outputs to content-addressed paths
//!
//! # Example
//!
//! ```rust
//! use tally_artifact::{
//!     ActionKey, ActionOutput, ConfigurationDescriptor, ConfiguredTargetKey, ContentHash,
//!     OutputPathResolver, TargetLabel,
//! };
//!
//! let owner = ConfiguredTargetKey::new(
//!     TargetLabel::parse("root//:rule1").unwrap(),
//!     ConfigurationDescriptor::unspecified(),
//! );
//! let output = ActionOutput::declared(ActionKey::new(owner, 0), "out.txt")
//!     .executed(ContentHash::compute(b"contents"));
//!
//! let path = OutputPathResolver::default().resolve(&output).unwrap();
//! assert_eq!(path.without_digest(), "buck-out/v2/gen/root/__rule1__/out.txt");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod hash;
mod label;
mod path;

pub use hash::{ContentHash, HashError, DIGEST_SEGMENT_LEN};
pub use label::{
    CellName, CellResolver, ConfigurationDescriptor, ConfiguredTargetKey, LabelError,
    ProvidersLabel, ProvidersName, TargetLabel,
};
pub use path::{
    ActionKey, ActionOutput, OutputPath, OutputPathResolver, PathError, DEFAULT_OUTPUT_ROOT,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
