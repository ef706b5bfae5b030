//! Content-addressed output paths
//!
//! Every action output lands under
//! `<root>/gen/<cell>/<digest>/<package>/__<rule>__/<file>`, where `<root>`
//! defaults to `buck-out/v2` and the package segment is absent for
//! root-package targets. The digest segment is derived from the producing
//! action's identity together with its content hash, so it only exists once
//! the action has executed.

use crate::hash::ContentHash;
use crate::label::ConfiguredTargetKey;
use std::fmt::{self, Display, Formatter};

/// Default output root, relative to the project root
pub const DEFAULT_OUTPUT_ROOT: &str = "buck-out/v2";

/// Identifies one action among those registered by a configured target
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionKey {
    pub owner: ConfiguredTargetKey,
    pub index: u32,
}

impl ActionKey {
    #[inline]
    #[must_use]
    pub fn new(owner: ConfiguredTargetKey, index: u32) -> Self {
        Self { owner, index }
    }
}

impl Display for ActionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "(target: `{}`, id: `{}`)", self.owner, self.index)
    }
}

/// An output declared by an action
///
/// `content` stays `None` until the action has run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionOutput {
    pub action: ActionKey,
    pub short_path: String,
    pub content: Option<ContentHash>,
}

impl ActionOutput {
    /// An output whose action has not executed yet
    #[must_use]
    pub fn declared(action: ActionKey, short_path: impl Into<String>) -> Self {
        Self {
            action,
            short_path: short_path.into(),
            content: None,
        }
    }

    /// Attach the content identity produced by execution
    #[must_use]
    pub fn executed(mut self, content: ContentHash) -> Self {
        self.content = Some(content);
        self
    }

    /// Digest segment for this output, once its content is known
    #[must_use]
    pub fn digest(&self) -> Option<String> {
        let content = self.content?;
        let owner = &self.action.owner;
        let label = owner.label.to_string();
        let configuration = owner.configuration.to_string();
        let index = self.action.index.to_le_bytes();
        Some(
            ContentHash::compute_parts([
                label.as_bytes(),
                configuration.as_bytes(),
                &index[..],
                self.short_path.as_bytes(),
                &content.as_bytes()[..],
            ])
            .short(),
        )
    }
}

/// A resolved on-disk output path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutputPath {
    rendered: String,
    digest_start: usize,
    digest_len: usize,
}

impl OutputPath {
    /// Full project-relative path
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    /// The content digest segment
    #[inline]
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.rendered[self.digest_start..self.digest_start + self.digest_len]
    }

    /// The path with its digest segment removed
    ///
    /// Two builds of an unchanged target agree on this value even when their
    /// digests differ.
    #[must_use]
    pub fn without_digest(&self) -> String {
        let mut out = String::with_capacity(self.rendered.len());
        out.push_str(&self.rendered[..self.digest_start]);
        // Skip the digest and the separator that follows it.
        out.push_str(&self.rendered[self.digest_start + self.digest_len + 1..]);
        out
    }
}

impl Display for OutputPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl AsRef<str> for OutputPath {
    fn as_ref(&self) -> &str {
        &self.rendered
    }
}

impl serde::Serialize for OutputPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.rendered)
    }
}

/// Maps declared action outputs to their canonical paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPathResolver {
    root: String,
}

impl Default for OutputPathResolver {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_ROOT)
    }
}

impl OutputPathResolver {
    /// Resolver rooted at a project-relative output directory
    #[must_use]
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    /// Output root this resolver writes under
    #[inline]
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Resolve an executed action output to its path
    ///
    /// # Errors
    /// Returns error if the action has not executed yet or the declared path
    /// is not a clean relative path
    pub fn resolve(&self, output: &ActionOutput) -> Result<OutputPath, PathError> {
        validate_short_path(&output.short_path)?;
        let digest = output.digest().ok_or_else(|| PathError::DigestUnknown {
            action: output.action.to_string(),
            path: output.short_path.clone(),
        })?;

        let label = &output.action.owner.label;
        let prefix = format!("{}/gen/{}/", self.root, label.cell());
        let mut rendered = prefix.clone();
        rendered.push_str(&digest);
        rendered.push('/');
        if !label.package().is_empty() {
            rendered.push_str(label.package());
            rendered.push('/');
        }
        rendered.push_str("__");
        rendered.push_str(label.name());
        rendered.push_str("__/");
        rendered.push_str(&output.short_path);

        Ok(OutputPath {
            rendered,
            digest_start: prefix.len(),
            digest_len: digest.len(),
        })
    }
}

fn validate_short_path(path: &str) -> Result<(), PathError> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(PathError::InvalidRelativePath(path.to_string()));
    }
    Ok(())
}

/// Errors raised while resolving output paths
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// The producing action has no content identity yet
    #[error("output `{path}` of action {action} has not been executed")]
    DigestUnknown { action: String, path: String },

    /// Declared output path escapes or is empty
    #[error("invalid output path `{0}`")]
    InvalidRelativePath(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::{ConfigurationDescriptor, TargetLabel};

    fn action(label: &str, index: u32) -> ActionKey {
        ActionKey::new(
            ConfiguredTargetKey::new(
                TargetLabel::parse(label).unwrap(),
                ConfigurationDescriptor::Unspecified,
            ),
            index,
        )
    }

    #[test]
    fn resolves_root_package_output() {
        let resolver = OutputPathResolver::default();
        let output = ActionOutput::declared(action("root//:rule1", 0), "out.txt")
            .executed(ContentHash::compute(b"hello"));
        let path = resolver.resolve(&output).unwrap();

        assert_eq!(path.digest().len(), crate::hash::DIGEST_SEGMENT_LEN);
        assert_eq!(
            path.as_str(),
            format!("buck-out/v2/gen/root/{}/__rule1__/out.txt", path.digest())
        );
        assert_eq!(path.without_digest(), "buck-out/v2/gen/root/__rule1__/out.txt");
    }

    #[test]
    fn resolves_nested_package_output() {
        let resolver = OutputPathResolver::new("buck-out/v2/");
        let output = ActionOutput::declared(action("root//subdir:rule", 0), "dir/out.txt")
            .executed(ContentHash::compute(b"x"));
        let path = resolver.resolve(&output).unwrap();
        assert_eq!(
            path.as_str(),
            format!("buck-out/v2/gen/root/{}/subdir/__rule__/dir/out.txt", path.digest())
        );
    }

    #[test]
    fn unexecuted_output_has_no_path() {
        let resolver = OutputPathResolver::default();
        let output = ActionOutput::declared(action("root//:rule1", 0), "out.txt");
        assert!(matches!(
            resolver.resolve(&output),
            Err(PathError::DigestUnknown { .. })
        ));
    }

    #[test]
    fn rejects_escaping_paths() {
        let resolver = OutputPathResolver::default();
        for bad in ["", "/abs", "../up", "a//b", "a/./b"] {
            let output = ActionOutput::declared(action("root//:r", 0), bad)
                .executed(ContentHash::compute(b"x"));
            assert!(
                matches!(resolver.resolve(&output), Err(PathError::InvalidRelativePath(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn distinct_actions_get_distinct_digests() {
        let content = ContentHash::compute(b"same bytes");
        let a = ActionOutput::declared(action("root//:rule1", 0), "out.txt").executed(content);
        let b = ActionOutput::declared(action("root//:rule1", 1), "out.txt").executed(content);
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn digest_tracks_content() {
        let resolver = OutputPathResolver::default();
        let first = ActionOutput::declared(action("root//:rule1", 0), "out.txt")
            .executed(ContentHash::compute(b"v1"));
        let second = ActionOutput::declared(action("root//:rule1", 0), "out.txt")
            .executed(ContentHash::compute(b"v2"));
        let p1 = resolver.resolve(&first).unwrap();
        let p2 = resolver.resolve(&second).unwrap();

        assert_ne!(p1.digest(), p2.digest());
        assert_eq!(p1.without_digest(), p2.without_digest());
    }
}
