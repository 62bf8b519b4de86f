//! Hadoop-style key/value configuration with XML site-file resources.
//!
//! Resources are loaded eagerly when added. Later resources override earlier
//! ones unless a property was declared `<final>true</final>`; values assigned
//! with [`Configuration::set`] override every resource.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{HdfsError, Result};

/// Maximum number of `${...}` expansions applied to a single value.
const MAX_SUBST: usize = 20;

/// Mutable cluster-client configuration.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    resources: Vec<String>,
    properties: BTreeMap<String, String>,
    finals: BTreeSet<String>,
    overlay: BTreeMap<String, String>,
}

impl Configuration {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, taking precedence over every resource.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.overlay.insert(key.into(), value.into());
    }

    /// Removes a programmatic value and any resource value for `key`.
    pub fn unset(&mut self, key: &str) {
        self.overlay.remove(key);
        self.properties.remove(key);
    }

    /// Returns the value for `key` with variables expanded.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_raw(key).map(|v| self.substitute(v))
    }

    /// Returns the value for `key` without variable expansion.
    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.overlay
            .get(key)
            .or_else(|| self.properties.get(key))
            .map(String::as_str)
    }

    /// Returns the value for `key` or `default` when unset.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Parses `key` as a boolean, falling back to `default` when unset or unparsable.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "true" => true,
            Some(v) if v == "false" => false,
            _ => default,
        }
    }

    /// Parses `key` as an unsigned integer.
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    /// Splits a comma-separated value, trimming entries and dropping empty ones.
    pub fn get_trimmed_strings(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Loads a Hadoop site XML file as a resource.
    pub fn add_resource(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path).map_err(|e| {
            HdfsError::config(format!("cannot read resource {}: {}", path.display(), e))
        })?;
        self.add_resource_str(&path.display().to_string(), &xml)
    }

    /// Loads Hadoop site XML held in memory; `name` identifies it in diagnostics.
    pub fn add_resource_str(&mut self, name: &str, xml: &str) -> Result<()> {
        let parsed = parse_site_xml(name, xml)?;
        let mut loaded = 0usize;
        for property in parsed {
            if self.finals.contains(&property.name) {
                tracing::warn!(
                    resource = name,
                    key = %property.name,
                    "attempt to override final parameter ignored"
                );
                continue;
            }
            if property.is_final {
                self.finals.insert(property.name.clone());
            }
            self.properties.insert(property.name, property.value);
            loaded += 1;
        }
        tracing::debug!(resource = name, properties = loaded, "configuration resource loaded");
        self.resources.push(name.to_string());
        Ok(())
    }

    /// Names of the resources loaded so far, in load order.
    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    /// Effective raw key/value pairs, sorted by key.
    pub fn iter(&self) -> Vec<(String, String)> {
        let mut merged = self.properties.clone();
        merged.extend(self.overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.into_iter().collect()
    }

    /// Number of effective keys.
    pub fn len(&self) -> usize {
        self.properties
            .keys()
            .chain(self.overlay.keys())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// True when no key is set.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.overlay.is_empty()
    }

    fn substitute(&self, value: &str) -> String {
        let mut current = value.to_string();
        for _ in 0..MAX_SUBST {
            let Some(start) = current.find("${") else {
                return current;
            };
            let Some(len) = current[start + 2..].find('}') else {
                return current;
            };
            let var = &current[start + 2..start + 2 + len];
            let resolved = match var.strip_prefix("env.") {
                Some(name) => std::env::var(name).ok(),
                None => self.get_raw(var).map(str::to_string),
            };
            let Some(resolved) = resolved else {
                return current;
            };
            current = format!(
                "{}{}{}",
                &current[..start],
                resolved,
                &current[start + 3 + len..]
            );
        }
        tracing::warn!(value, "variable substitution depth exceeded");
        current
    }
}

#[derive(Debug, Default)]
struct SiteProperty {
    name: String,
    value: String,
    is_final: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    Value,
    Final,
}

fn parse_site_xml(resource: &str, xml: &str) -> Result<Vec<SiteProperty>> {
    let invalid = |e: &dyn std::fmt::Display| {
        HdfsError::config(format!("malformed configuration resource {resource}: {e}"))
    };

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut properties = Vec::new();
    let mut current: Option<SiteProperty> = None;
    let mut field: Option<Field> = None;
    let mut saw_root = false;

    loop {
        match reader.read_event().map_err(|e| invalid(&e))? {
            Event::Start(e) => match e.name().as_ref() {
                b"configuration" => saw_root = true,
                b"property" => current = Some(SiteProperty::default()),
                b"name" if current.is_some() => field = Some(Field::Name),
                b"value" if current.is_some() => field = Some(Field::Value),
                b"final" if current.is_some() => field = Some(Field::Final),
                _ => field = None,
            },
            Event::Empty(e) if e.name().as_ref() == b"configuration" => saw_root = true,
            Event::Text(t) => {
                if let (Some(property), Some(f)) = (current.as_mut(), field) {
                    let text = t.unescape().map_err(|e| invalid(&e))?;
                    assign(property, f, &text);
                }
            }
            Event::CData(c) => {
                if let (Some(property), Some(f)) = (current.as_mut(), field) {
                    let text = String::from_utf8_lossy(&c).into_owned();
                    assign(property, f, &text);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"property" => {
                    if let Some(property) = current.take() {
                        if property.name.is_empty() {
                            tracing::warn!(resource, "property without a name skipped");
                        } else {
                            properties.push(property);
                        }
                    }
                }
                b"name" | b"value" | b"final" => field = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(HdfsError::config(format!(
            "configuration resource {resource} has no <configuration> root"
        )));
    }

    Ok(properties)
}

fn assign(property: &mut SiteProperty, field: Field, text: &str) {
    match field {
        Field::Name => property.name.push_str(text.trim()),
        Field::Value => property.value.push_str(text),
        Field::Final => property.is_final = text.trim().eq_ignore_ascii_case("true"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CORE_SITE: &str = r#"<?xml version="1.0"?>
<?xml-stylesheet type="text/xsl" href="configuration.xsl"?>
<configuration>
  <property>
    <name>fs.defaultFS</name>
    <value>hdfs://prod-cluster</value>
  </property>
  <property>
    <name>hadoop.tmp.dir</name>
    <value>/data/tmp/${user.name}</value>
  </property>
  <property>
    <name>user.name</name>
    <value>etl</value>
  </property>
</configuration>
"#;

    #[test]
    fn test_set_and_get() {
        let mut conf = Configuration::new();
        assert!(conf.is_empty());
        conf.set("dfs.replication", "2");
        assert_eq!(conf.get("dfs.replication").as_deref(), Some("2"));
        assert_eq!(conf.get_u32("dfs.replication"), Some(2));
        assert_eq!(conf.len(), 1);
        conf.unset("dfs.replication");
        assert!(conf.get("dfs.replication").is_none());
    }

    #[test]
    fn test_add_resource_from_file() {
        let mut file = NamedTempFile::with_suffix(".xml").unwrap();
        file.write_all(CORE_SITE.as_bytes()).unwrap();

        let mut conf = Configuration::new();
        conf.add_resource(file.path()).unwrap();
        assert_eq!(conf.get("fs.defaultFS").as_deref(), Some("hdfs://prod-cluster"));
        assert_eq!(conf.resources().len(), 1);
    }

    #[test]
    fn test_variable_expansion() {
        let mut conf = Configuration::new();
        conf.add_resource_str("core-site.xml", CORE_SITE).unwrap();
        assert_eq!(conf.get("hadoop.tmp.dir").as_deref(), Some("/data/tmp/etl"));
        assert_eq!(conf.get_raw("hadoop.tmp.dir"), Some("/data/tmp/${user.name}"));
    }

    #[test]
    fn test_unresolved_variable_left_in_place() {
        let mut conf = Configuration::new();
        conf.set("a", "x-${missing.key}-y");
        assert_eq!(conf.get("a").as_deref(), Some("x-${missing.key}-y"));
    }

    #[test]
    fn test_self_reference_terminates() {
        let mut conf = Configuration::new();
        conf.set("loop", "${loop}");
        assert_eq!(conf.get("loop").as_deref(), Some("${loop}"));
    }

    #[test]
    fn test_later_resource_overrides_but_set_wins() {
        let mut conf = Configuration::new();
        conf.add_resource_str(
            "a.xml",
            "<configuration><property><name>k</name><value>a</value></property></configuration>",
        )
        .unwrap();
        conf.add_resource_str(
            "b.xml",
            "<configuration><property><name>k</name><value>b</value></property></configuration>",
        )
        .unwrap();
        assert_eq!(conf.get("k").as_deref(), Some("b"));

        conf.set("k", "programmatic");
        conf.add_resource_str(
            "c.xml",
            "<configuration><property><name>k</name><value>c</value></property></configuration>",
        )
        .unwrap();
        assert_eq!(conf.get("k").as_deref(), Some("programmatic"));
    }

    #[test]
    fn test_final_property_not_overridden_by_resource() {
        let mut conf = Configuration::new();
        conf.add_resource_str(
            "a.xml",
            "<configuration><property><name>k</name><value>a</value><final>true</final></property></configuration>",
        )
        .unwrap();
        conf.add_resource_str(
            "b.xml",
            "<configuration><property><name>k</name><value>b</value></property></configuration>",
        )
        .unwrap();
        assert_eq!(conf.get("k").as_deref(), Some("a"));
    }

    #[test]
    fn test_get_trimmed_strings() {
        let mut conf = Configuration::new();
        conf.set("dfs.ha.namenodes.ns", " nn0, nn1 ,,nn2");
        assert_eq!(conf.get_trimmed_strings("dfs.ha.namenodes.ns"), vec!["nn0", "nn1", "nn2"]);
        assert!(conf.get_trimmed_strings("absent").is_empty());
    }

    #[test]
    fn test_get_bool() {
        let mut conf = Configuration::new();
        conf.set("flag", "TRUE");
        assert!(conf.get_bool("flag", false));
        conf.set("flag", "nonsense");
        assert!(!conf.get_bool("flag", false));
        assert!(conf.get_bool("absent", true));
    }

    #[test]
    fn test_missing_file_is_config_invalid() {
        let mut conf = Configuration::new();
        let err = conf.add_resource("/nonexistent/core-site.xml").unwrap_err();
        assert!(matches!(err, HdfsError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_malformed_xml_is_config_invalid() {
        let mut conf = Configuration::new();
        let err = conf
            .add_resource_str("bad.xml", "<configuration><property><name>k</value>")
            .unwrap_err();
        assert!(matches!(err, HdfsError::ConfigInvalid { .. }));

        let err = conf.add_resource_str("empty.xml", "<other/>").unwrap_err();
        assert!(matches!(err, HdfsError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_iter_is_sorted_and_merged() {
        let mut conf = Configuration::new();
        conf.add_resource_str("core-site.xml", CORE_SITE).unwrap();
        conf.set("fs.defaultFS", "hdfs://override");
        let pairs = conf.iter();
        let keys: Vec<_> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["fs.defaultFS", "hadoop.tmp.dir", "user.name"]);
        assert_eq!(pairs[0].1, "hdfs://override");
    }
}
