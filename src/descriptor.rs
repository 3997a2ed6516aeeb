//! The buildpack descriptor (`buildpack.toml`) shipped inside the layer.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The embedded `buildpack.toml`.  Written verbatim into the layer and parsed
/// once at startup.
pub const BUILDPACK_TOML: &str = r#"api = "0.2"

[buildpack]
id = "hybrid"
version = "0.0.1"
name = "Hybrid OS Buildpack"

[[stacks]]
id = "io.buildpacks.samples.stacks.nanoserver-1809"

[[stacks]]
id = "io.buildpacks.samples.stacks.alpine""#;

/// Identity and compatibility record of a buildpack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildpackDescriptor {
    pub id: String,
    pub version: String,
    pub name: Option<String>,
    pub api: String,
    pub stacks: Vec<Stack>,
}

/// A stack the buildpack declares compatibility with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mixins: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BuildpackToml {
    api: String,
    buildpack: BuildpackSection,
    #[serde(default)]
    stacks: Vec<Stack>,
}

#[derive(Debug, Deserialize)]
struct BuildpackSection {
    id: String,
    version: String,
    #[serde(default)]
    name: Option<String>,
}

impl BuildpackDescriptor {
    /// Parse the descriptor compiled into the binary.
    pub fn embedded() -> Result<Self> {
        Self::parse(BUILDPACK_TOML)
    }

    /// Parse a `buildpack.toml` document.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: BuildpackToml = toml::from_str(text)?;

        for (field, value) in [
            ("api", &raw.api),
            ("buildpack.id", &raw.buildpack.id),
            ("buildpack.version", &raw.buildpack.version),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Descriptor(format!("{} must not be empty", field)));
            }
        }
        if let Some(stack) = raw.stacks.iter().find(|s| s.id.trim().is_empty()) {
            return Err(Error::Descriptor(format!(
                "stack entry with empty id (mixins: {:?})",
                stack.mixins
            )));
        }

        Ok(Self {
            id: raw.buildpack.id,
            version: raw.buildpack.version,
            name: raw.buildpack.name,
            api: raw.api,
            stacks: raw.stacks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_descriptor_parses() {
        let d = BuildpackDescriptor::embedded().unwrap();
        assert_eq!(d.id, "hybrid");
        assert_eq!(d.version, "0.0.1");
        assert_eq!(d.api, "0.2");
        assert_eq!(d.name.as_deref(), Some("Hybrid OS Buildpack"));
        let stacks: Vec<&str> = d.stacks.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            stacks,
            vec![
                "io.buildpacks.samples.stacks.nanoserver-1809",
                "io.buildpacks.samples.stacks.alpine",
            ]
        );
    }

    #[test]
    fn embedded_text_has_no_surrounding_whitespace() {
        assert_eq!(BUILDPACK_TOML, BUILDPACK_TOML.trim());
    }

    #[test]
    fn mixins_are_kept() {
        let text = r#"
api = "0.4"
[buildpack]
id = "x"
version = "1"
[[stacks]]
id = "s"
mixins = ["build:git"]
"#;
        let d = BuildpackDescriptor::parse(text).unwrap();
        assert_eq!(d.stacks[0].mixins, vec!["build:git".to_string()]);
        assert!(d.name.is_none());
    }

    #[test]
    fn missing_section_is_parse_error() {
        let err = BuildpackDescriptor::parse("api = \"0.2\"").unwrap_err();
        assert!(matches!(err, Error::Toml(_)), "{err}");
    }

    #[test]
    fn empty_id_is_rejected() {
        let text = "api = \"0.2\"\n[buildpack]\nid = \"\"\nversion = \"1\"\n";
        let err = BuildpackDescriptor::parse(text).unwrap_err();
        assert!(err.to_string().contains("buildpack.id"), "{err}");
    }

    #[test]
    fn empty_stack_id_is_rejected() {
        let text = "api = \"0.2\"\n[buildpack]\nid = \"x\"\nversion = \"1\"\n[[stacks]]\nid = \" \"\n";
        assert!(matches!(
            BuildpackDescriptor::parse(text),
            Err(Error::Descriptor(_))
        ));
    }
}
