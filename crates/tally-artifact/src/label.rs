//! Target labels, cells and configurations
//!
//! A [`TargetLabel`] names a build unit as `cell//package:name`. Building a
//! label under a [`ConfigurationDescriptor`] yields a [`ConfiguredTargetKey`],
//! the identity used by the dependency graph and the result collector.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Name of a cell (a namespace of packages)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellName(String);

impl CellName {
    /// Create a cell name
    ///
    /// # Errors
    /// Returns error if the name is empty or contains characters other than
    /// ASCII alphanumerics, `_` and `-`
    pub fn new(name: impl Into<String>) -> Result<Self, LabelError> {
        let name = name.into();
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(LabelError::InvalidCell(name));
        }
        Ok(Self(name))
    }

    /// Cell name as a string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CellName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A build target: `cell//package:name`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetLabel {
    cell: CellName,
    package: String,
    name: String,
}

impl TargetLabel {
    /// Create a label from already separated parts
    ///
    /// # Errors
    /// Returns error if the package or name is malformed
    pub fn new(
        cell: CellName,
        package: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, LabelError> {
        let package = package.into();
        let name = name.into();
        validate_package(&package)?;
        if name.is_empty() || name.contains(['/', ':', '[', ']']) {
            return Err(LabelError::InvalidName(name));
        }
        Ok(Self {
            cell,
            package,
            name,
        })
    }

    /// Parse a fully qualified label such as `root//subdir:rule`
    ///
    /// # Errors
    /// Returns error if the string is not of the form `cell//package:name`
    pub fn parse(s: &str) -> Result<Self, LabelError> {
        let (cell, rest) = s
            .split_once("//")
            .ok_or_else(|| LabelError::Malformed(s.to_string()))?;
        let (package, name) = rest
            .rsplit_once(':')
            .ok_or_else(|| LabelError::Malformed(s.to_string()))?;
        Self::new(CellName::new(cell)?, package, name)
    }

    /// Parse a label that may omit its cell (`//pkg:name`), resolving it
    /// against `root`
    ///
    /// # Errors
    /// Returns error if the label is malformed
    pub fn parse_relative(s: &str, root: &CellName) -> Result<Self, LabelError> {
        match s.strip_prefix("//") {
            Some(rest) => Self::parse(&format!("{root}//{rest}")),
            None => Self::parse(s),
        }
    }

    /// Cell this target belongs to
    #[inline]
    #[must_use]
    pub fn cell(&self) -> &CellName {
        &self.cell
    }

    /// Cell-relative package path (empty for the cell root package)
    #[inline]
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Rule name within the package
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for TargetLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}//{}:{}", self.cell, self.package, self.name)
    }
}

impl FromStr for TargetLabel {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn validate_package(package: &str) -> Result<(), LabelError> {
    if package.is_empty() {
        return Ok(());
    }
    let bad = package
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == ".." || seg.contains([':', '[', ']']));
    if bad {
        return Err(LabelError::InvalidPackage(package.to_string()));
    }
    Ok(())
}

/// Which providers of a target were requested
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ProvidersName {
    /// The bare target, reported as the `DEFAULT` output group
    #[default]
    Default,
    /// A named sub-target, e.g. `out1` in `//:rule2[out1]`
    Named(String),
}

impl ProvidersName {
    /// Key of the output group this providers name is reported under
    #[must_use]
    pub fn group_key(&self) -> &str {
        match self {
            Self::Default => "DEFAULT",
            Self::Named(name) => name,
        }
    }
}

/// A target plus the providers requested from it: `root//:rule2[out1]`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProvidersLabel {
    pub target: TargetLabel,
    pub name: ProvidersName,
}

impl ProvidersLabel {
    /// Parse a providers label, resolving a missing cell against `root`
    ///
    /// # Errors
    /// Returns error on a malformed label or an unterminated `[...]` suffix
    pub fn parse(s: &str, root: &CellName) -> Result<Self, LabelError> {
        let Some(open) = s.find('[') else {
            return Ok(Self {
                target: TargetLabel::parse_relative(s, root)?,
                name: ProvidersName::Default,
            });
        };
        let inner = s[open + 1..]
            .strip_suffix(']')
            .filter(|inner| !inner.is_empty() && !inner.contains(['[', ']']))
            .ok_or_else(|| LabelError::Malformed(s.to_string()))?;
        Ok(Self {
            target: TargetLabel::parse_relative(&s[..open], root)?,
            name: ProvidersName::Named(inner.to_string()),
        })
    }
}

impl Display for ProvidersLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.name {
            ProvidersName::Default => write!(f, "{}", self.target),
            ProvidersName::Named(name) => write!(f, "{}[{name}]", self.target),
        }
    }
}

/// A resolved configuration, or `<unspecified>` when none was bound
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ConfigurationDescriptor {
    #[default]
    Unspecified,
    Named(String),
}

impl ConfigurationDescriptor {
    /// Sentinel text of the unbound configuration
    pub const UNSPECIFIED: &'static str = "<unspecified>";

    /// The unbound configuration
    #[inline]
    #[must_use]
    pub fn unspecified() -> Self {
        Self::Unspecified
    }

    /// A named configuration; the sentinel name yields [`Self::Unspecified`]
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        if name == Self::UNSPECIFIED {
            Self::Unspecified
        } else {
            Self::Named(name)
        }
    }
}

impl Display for ConfigurationDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspecified => f.write_str(Self::UNSPECIFIED),
            Self::Named(name) => f.write_str(name),
        }
    }
}

impl FromStr for ConfigurationDescriptor {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err(LabelError::InvalidConfiguration(s.to_string())),
            Self::UNSPECIFIED => Ok(Self::Unspecified),
            other => Ok(Self::Named(other.to_string())),
        }
    }
}

/// Identity of a target built under one configuration
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfiguredTargetKey {
    pub label: TargetLabel,
    pub configuration: ConfigurationDescriptor,
}

impl ConfiguredTargetKey {
    #[inline]
    #[must_use]
    pub fn new(label: TargetLabel, configuration: ConfigurationDescriptor) -> Self {
        Self {
            label,
            configuration,
        }
    }
}

impl Display for ConfiguredTargetKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.configuration)
    }
}

/// Maps cell names to their location relative to the project root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellResolver {
    root: CellName,
    paths: BTreeMap<CellName, String>,
}

impl CellResolver {
    /// Resolver with only the root cell, located at the project root
    #[must_use]
    pub fn new(root: CellName) -> Self {
        let mut paths = BTreeMap::new();
        paths.insert(root.clone(), String::new());
        Self { root, paths }
    }

    /// Register a non-root cell at a project-relative path
    ///
    /// # Errors
    /// Returns error if the path is malformed
    pub fn insert(&mut self, cell: CellName, path: impl Into<String>) -> Result<(), LabelError> {
        let path = path.into();
        validate_package(&path)?;
        self.paths.insert(cell, path);
        Ok(())
    }

    /// The root cell
    #[inline]
    #[must_use]
    pub fn root_cell(&self) -> &CellName {
        &self.root
    }

    /// Project-relative path of a cell
    ///
    /// # Errors
    /// Returns error if the cell was never registered
    pub fn project_relative_path(&self, cell: &CellName) -> Result<&str, LabelError> {
        self.paths
            .get(cell)
            .map(String::as_str)
            .ok_or_else(|| LabelError::UnknownCell(cell.to_string()))
    }

    /// Path of the target's package relative to the project root
    ///
    /// Targets in the root package of the root cell yield `""`.
    ///
    /// # Errors
    /// Returns error if the target's cell is unknown
    pub fn package_project_relative_path(&self, label: &TargetLabel) -> Result<String, LabelError> {
        let cell_path = self.project_relative_path(label.cell())?;
        Ok(match (cell_path.is_empty(), label.package().is_empty()) {
            (true, _) => label.package().to_string(),
            (false, true) => cell_path.to_string(),
            (false, false) => format!("{cell_path}/{}", label.package()),
        })
    }
}

macro_rules! string_serde {
    ($ty:ty, $expecting:literal) => {
        impl serde::Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                struct StrVisitor;

                impl serde::de::Visitor<'_> for StrVisitor {
                    type Value = $ty;

                    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
                        f.write_str($expecting)
                    }

                    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
                    where
                        E: serde::de::Error,
                    {
                        value.parse().map_err(E::custom)
                    }
                }

                deserializer.deserialize_str(StrVisitor)
            }
        }
    };
}

string_serde!(TargetLabel, "a target label like `cell//package:name`");
string_serde!(ConfigurationDescriptor, "a configuration name or `<unspecified>`");

/// Errors related to labels and cells
#[derive(Debug, thiserror::Error)]
pub enum LabelError {
    #[error("malformed target label `{0}`")]
    Malformed(String),

    #[error("invalid cell name `{0}`")]
    InvalidCell(String),

    #[error("invalid package path `{0}`")]
    InvalidPackage(String),

    #[error("invalid target name `{0}`")]
    InvalidName(String),

    #[error("invalid configuration `{0}`")]
    InvalidConfiguration(String),

    #[error("unknown cell `{0}`")]
    UnknownCell(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> CellName {
        CellName::new("root").unwrap()
    }

    #[test]
    fn parse_root_package_label() {
        let label = TargetLabel::parse("root//:rule1").unwrap();
        assert_eq!(label.cell().as_str(), "root");
        assert_eq!(label.package(), "");
        assert_eq!(label.name(), "rule1");
        assert_eq!(label.to_string(), "root//:rule1");
    }

    #[test]
    fn parse_nested_package_label() {
        let label = TargetLabel::parse("root//a/b:lib").unwrap();
        assert_eq!(label.package(), "a/b");
        assert_eq!(label.name(), "lib");
    }

    #[test]
    fn parse_relative_uses_root_cell() {
        let label = TargetLabel::parse_relative("//subdir:rule", &root()).unwrap();
        assert_eq!(label.to_string(), "root//subdir:rule");

        let other = TargetLabel::parse_relative("tp//x:y", &root()).unwrap();
        assert_eq!(other.cell().as_str(), "tp");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(matches!(TargetLabel::parse("rule1"), Err(LabelError::Malformed(_))));
        assert!(matches!(TargetLabel::parse("root//:"), Err(LabelError::InvalidName(_))));
        assert!(matches!(
            TargetLabel::parse("root//a//b:c"),
            Err(LabelError::InvalidPackage(_))
        ));
        assert!(matches!(
            TargetLabel::parse("root//../x:c"),
            Err(LabelError::InvalidPackage(_))
        ));
        assert!(matches!(TargetLabel::parse("r t//:c"), Err(LabelError::InvalidCell(_))));
    }

    #[test]
    fn providers_label_with_subtarget() {
        let label = ProvidersLabel::parse("//:rule2[out1]", &root()).unwrap();
        assert_eq!(label.target.to_string(), "root//:rule2");
        assert_eq!(label.name, ProvidersName::Named("out1".into()));
        assert_eq!(label.name.group_key(), "out1");
        assert_eq!(label.to_string(), "root//:rule2[out1]");
    }

    #[test]
    fn providers_label_default() {
        let label = ProvidersLabel::parse("//:rule2", &root()).unwrap();
        assert_eq!(label.name.group_key(), "DEFAULT");
    }

    #[test]
    fn providers_label_rejects_unterminated() {
        assert!(ProvidersLabel::parse("//:rule2[out1", &root()).is_err());
        assert!(ProvidersLabel::parse("//:rule2[]", &root()).is_err());
    }

    #[test]
    fn configuration_display_and_parse() {
        assert_eq!(ConfigurationDescriptor::unspecified().to_string(), "<unspecified>");
        assert_eq!(
            "<unspecified>".parse::<ConfigurationDescriptor>().unwrap(),
            ConfigurationDescriptor::Unspecified
        );
        assert_eq!(
            "linux-x86_64#abc".parse::<ConfigurationDescriptor>().unwrap(),
            ConfigurationDescriptor::named("linux-x86_64#abc")
        );
        assert!("".parse::<ConfigurationDescriptor>().is_err());
    }

    #[test]
    fn named_sentinel_is_unspecified() {
        let named = ConfigurationDescriptor::named("<unspecified>");
        assert_eq!(named, ConfigurationDescriptor::Unspecified);

        let keys: std::collections::BTreeSet<_> =
            [named, ConfigurationDescriptor::unspecified()].into_iter().collect();
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn package_project_relative_paths() {
        let mut cells = CellResolver::new(root());
        cells
            .insert(CellName::new("tp").unwrap(), "third-party")
            .unwrap();

        let rule1 = TargetLabel::parse("root//:rule1").unwrap();
        let sub = TargetLabel::parse("root//subdir:rule").unwrap();
        let tp_root = TargetLabel::parse("tp//:zlib").unwrap();
        let tp_nested = TargetLabel::parse("tp//zlib/src:zlib").unwrap();

        assert_eq!(cells.package_project_relative_path(&rule1).unwrap(), "");
        assert_eq!(cells.package_project_relative_path(&sub).unwrap(), "subdir");
        assert_eq!(cells.package_project_relative_path(&tp_root).unwrap(), "third-party");
        assert_eq!(
            cells.package_project_relative_path(&tp_nested).unwrap(),
            "third-party/zlib/src"
        );
    }

    #[test]
    fn unknown_cell_is_error() {
        let cells = CellResolver::new(root());
        let label = TargetLabel::parse("other//:x").unwrap();
        assert!(matches!(
            cells.package_project_relative_path(&label),
            Err(LabelError::UnknownCell(_))
        ));
    }

    #[test]
    fn label_serde_as_string() {
        let label = TargetLabel::parse("root//subdir:rule").unwrap();
        let json = serde_json::to_string(&label).unwrap();
        assert_eq!(json, "\"root//subdir:rule\"");
        let back: TargetLabel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, label);
    }

    #[test]
    fn configured_key_display() {
        let key = ConfiguredTargetKey::new(
            TargetLabel::parse("root//:rule1").unwrap(),
            ConfigurationDescriptor::Unspecified,
        );
        assert_eq!(key.to_string(), "root//:rule1 (<unspecified>)");
    }
}
