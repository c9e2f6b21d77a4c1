//! YAML documents printed by the `lxc` client

use declarative::{Assignment, Command, Error, RawValue, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Any `lxc <object> show` document; only the `config` mapping matters
#[derive(Debug, Default, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub config: BTreeMap<String, serde_yaml::Value>,
}

impl ConfigDocument {
    /// Config entries as raw values, ready for a snapshot
    pub fn entries(&self) -> impl Iterator<Item = (&str, RawValue)> + '_ {
        self.config.iter().map(|(k, v)| (k.as_str(), raw_from_yaml(v)))
    }
}

/// `lxc storage show` output
#[derive(Debug, Default, Deserialize)]
pub struct StorageDocument {
    #[serde(default)]
    pub driver: String,
    #[serde(flatten)]
    pub document: ConfigDocument,
}

/// Stdin for `lxc profile edit`
#[derive(Debug, Serialize)]
struct EditDocument<'a> {
    config: BTreeMap<&'a str, &'a str>,
}

/// `lxc` with the given arguments
pub fn lxc<I, S>(args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Command::new("lxc").args(args)
}

/// Parse a YAML document printed by the daemon
pub fn parse<T: DeserializeOwned + Default>(what: &str, text: &str) -> Result<T> {
    if text.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(text).map_err(|e| Error::Parse {
        what: what.to_string(),
        message: e.to_string(),
    })
}

/// Render assignments as the `config:` document accepted by `lxc ... edit`
pub fn edit_document(assignments: &[Assignment]) -> Result<String> {
    let doc = EditDocument {
        config: assignments
            .iter()
            .map(|a| (a.key.as_str(), a.value.as_str()))
            .collect(),
    };
    serde_yaml::to_string(&doc).map_err(|e| Error::Parse {
        what: "profile document".into(),
        message: e.to_string(),
    })
}

/// Convert a YAML node into uncoerced property input
pub fn raw_from_yaml(value: &serde_yaml::Value) -> RawValue {
    use serde_yaml::Value as Y;
    match value {
        Y::Null => RawValue::Str(String::new()),
        Y::Bool(b) => RawValue::Bool(*b),
        Y::Number(n) => n
            .as_i64()
            .map_or_else(|| RawValue::Str(n.to_string()), RawValue::Int),
        Y::String(s) => RawValue::Str(s.clone()),
        Y::Sequence(items) => RawValue::List(items.iter().map(raw_from_yaml).collect()),
        Y::Mapping(map) => RawValue::Table(
            map.iter()
                .filter_map(|(k, v)| yaml_key(k).map(|k| (k, raw_from_yaml(v))))
                .collect(),
        ),
        Y::Tagged(tagged) => raw_from_yaml(&tagged.value),
    }
}

fn yaml_key(key: &serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile_document() {
        let doc: ConfigDocument = parse(
            "profile default",
            "config:\n  boot.autostart: \"true\"\n  limits.cpu: 2\ndescription: Default LXD profile\ndevices: {}\nname: default\n",
        )
        .unwrap();
        let entries: BTreeMap<&str, RawValue> = doc.entries().collect();
        assert_eq!(entries["boot.autostart"], RawValue::from("true"));
        assert_eq!(entries["limits.cpu"], RawValue::Int(2));
    }

    #[test]
    fn test_parse_storage_document() {
        let doc: StorageDocument = parse(
            "storage pool default",
            "config:\n  source: /var/lib/lxd/storage-pools/default\ndriver: dir\nname: default\n",
        )
        .unwrap();
        assert_eq!(doc.driver, "dir");
        assert_eq!(doc.document.config.len(), 1);
    }

    #[test]
    fn test_parse_error_names_the_document() {
        let err = parse::<ConfigDocument>("network lxdbr0", "config: [unterminated").unwrap_err();
        assert!(err.to_string().starts_with("failed to parse network lxdbr0"));
    }

    #[test]
    fn test_edit_document() {
        let doc = edit_document(&[
            Assignment::new("raw.lxc", "lxc.aa_profile=unconfined"),
            Assignment::new("boot.autostart", "true"),
        ])
        .unwrap();
        assert!(doc.starts_with("config:\n"));

        let back: ConfigDocument = parse("profile document", &doc).unwrap();
        let entries: BTreeMap<&str, RawValue> = back.entries().collect();
        assert_eq!(entries["boot.autostart"], RawValue::from("true"));
        assert_eq!(entries["raw.lxc"], RawValue::from("lxc.aa_profile=unconfined"));
    }
}
