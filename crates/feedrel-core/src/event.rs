//! Inbound events as flat maps of dotted field names to string values.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::{
  Error, Result,
  entity::{ClassificationKey, DomainName, OTHER_TAXONOMY},
};

pub const FEED_PROVIDER: &str = "feed.provider";
pub const FEED_NAME: &str = "feed.name";
pub const CLASSIFICATION_TAXONOMY: &str = "classification.taxonomy";
pub const CLASSIFICATION_TYPE: &str = "classification.type";
pub const EXTRA: &str = "extra";
pub const EXTRA_CLASSIFICATION_TYPE: &str = "extra.classification_type";
pub const SOURCE_IP: &str = "source.ip";
pub const SOURCE_NETWORK: &str = "source.network";
pub const SOURCE_FQDN: &str = "source.fqdn";

/// The observable an event is about, in lookup precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observable {
  Ip(String),
  /// A CIDR network; stored in the ip fact table.
  Network(String),
  Fqdn(DomainName),
}

impl Observable {
  /// The raw value for log context.
  pub fn value(&self) -> &str {
    match self {
      Self::Ip(v) | Self::Network(v) => v,
      Self::Fqdn(d) => d.as_str(),
    }
  }
}

/// Feed context of an event. Either half may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedRef<'a> {
  pub provider: Option<&'a str>,
  pub name:     Option<&'a str>,
}

/// A decoded event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
  fields: BTreeMap<String, String>,
}

impl Event {
  /// Decode a JSON object.
  ///
  /// Nested objects are flattened to dotted keys. With `jsondict_as_string`
  /// set, every `extra.*` field is collapsed into a single `extra` field
  /// holding a compact JSON object.
  pub fn from_json(value: &Value, jsondict_as_string: bool) -> Result<Self> {
    let Value::Object(map) = value else {
      return Err(Error::InvalidEvent(format!(
        "expected a JSON object, got {}",
        kind_name(value)
      )));
    };

    let mut flat = BTreeMap::new();
    if !jsondict_as_string {
      flatten_into(&mut flat, None, map);
      return Ok(Self { fields: flat });
    }

    let (extra, rest) = split_extra(map);
    flatten_into(&mut flat, None, &rest);
    if !extra.is_empty() {
      flat.insert(EXTRA.to_owned(), serde_json::to_string(&extra)?);
    }
    Ok(Self { fields: flat })
  }

  pub fn from_line(line: &str, jsondict_as_string: bool) -> Result<Self> {
    let value: Value = serde_json::from_str(line)?;
    Self::from_json(&value, jsondict_as_string)
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.fields.get(key).map(String::as_str)
  }

  pub fn contains(&self, key: &str) -> bool { self.fields.contains_key(key) }

  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.fields.insert(key.into(), value.into());
  }

  pub fn feed(&self) -> FeedRef<'_> {
    FeedRef { provider: self.get(FEED_PROVIDER), name: self.get(FEED_NAME) }
  }

  /// The classification natural key.
  ///
  /// An explicit taxonomy wins; otherwise the non-standard
  /// `extra.classification_type` field is used under the "other" taxonomy,
  /// whether `extra` was kept flat or collapsed to a JSON string.
  pub fn classification(&self) -> Option<ClassificationKey> {
    if let Some(taxonomy) = self.get(CLASSIFICATION_TAXONOMY) {
      let kind = self.get(CLASSIFICATION_TYPE)?;
      return Some(ClassificationKey::new(taxonomy, kind));
    }
    self
      .extra_classification_type()
      .map(|kind| ClassificationKey::new(OTHER_TAXONOMY, kind))
  }

  fn extra_classification_type(&self) -> Option<String> {
    if let Some(kind) = self.get(EXTRA_CLASSIFICATION_TYPE) {
      return Some(kind.to_owned());
    }
    let extra: Value = serde_json::from_str(self.get(EXTRA)?).ok()?;
    match extra.get("classification_type")? {
      Value::String(s) => Some(s.clone()),
      Value::Null => None,
      other => Some(other.to_string()),
    }
  }

  /// The first non-empty observable: ip, then network, then fqdn.
  pub fn observable(&self) -> Option<Observable> {
    let non_empty = |key: &str| self.get(key).map(str::trim).filter(|v| !v.is_empty());

    if let Some(ip) = non_empty(SOURCE_IP) {
      return Some(Observable::Ip(ip.to_owned()));
    }
    if let Some(net) = non_empty(SOURCE_NETWORK) {
      return Some(Observable::Network(net.to_owned()));
    }
    non_empty(SOURCE_FQDN)
      .and_then(DomainName::parse)
      .map(Observable::Fqdn)
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Event {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self {
      fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
    }
  }
}

/// Separate the `extra` subtree from the rest of the event.
///
/// Both an `extra` object and dotted `extra.*` keys are merged, and values
/// keep their JSON types. An `extra` string holding a JSON object is merged
/// too, so re-decoding a collapsed event is stable.
fn split_extra(map: &Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
  let mut extra = Map::new();
  let mut rest = Map::new();
  for (key, value) in map {
    if let Some(sub) = key.strip_prefix(EXTRA).and_then(|k| k.strip_prefix('.')) {
      if !value.is_null() {
        extra.insert(sub.to_owned(), value.clone());
      }
      continue;
    }
    if key == EXTRA {
      let inner = match value {
        Value::Object(inner) => Some(inner.clone()),
        Value::String(s) => match serde_json::from_str(s) {
          Ok(Value::Object(inner)) => Some(inner),
          _ => None,
        },
        _ => None,
      };
      if let Some(inner) = inner {
        extra.extend(inner.into_iter().filter(|(_, v)| !v.is_null()));
        continue;
      }
    }
    rest.insert(key.clone(), value.clone());
  }
  (extra, rest)
}

fn flatten_into(
  out: &mut BTreeMap<String, String>,
  prefix: Option<&str>,
  map: &Map<String, Value>,
) {
  for (key, value) in map {
    let key = match prefix {
      Some(p) => format!("{p}.{key}"),
      None => key.clone(),
    };
    match value {
      Value::Null => {}
      Value::Object(inner) => flatten_into(out, Some(&key), inner),
      Value::String(s) => {
        out.insert(key, s.clone());
      }
      other => {
        out.insert(key, other.to_string());
      }
    }
  }
}

fn kind_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}
