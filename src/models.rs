use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Field name to placeholder value. Ordered so serialized output is stable.
pub type FieldSet = BTreeMap<String, serde_json::Value>;

/// A source file read from the corpus
#[derive(Debug, Clone, PartialEq)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub text: String,
}

/// Where a handler was found and its body text, braces excluded
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerLocation {
    pub path: PathBuf,
    pub body: String,
}

/// A route path registered for a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub path: String,
    pub handler: String,
}

/// The HTTP request a generated case sends
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct RequestSpec {
    #[serde(default, deserialize_with = "null_as_default")]
    pub method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: FieldSet,
}

/// The response a generated case expects
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ExpectSpec {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: FieldSet,
}

/// One generated test case, written to `case.yml`
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct CaseSpec {
    pub name: String,
    pub request: RequestSpec,
    pub expect: ExpectSpec,
}

/// Field shapes inferred from a handler body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inference {
    pub request_fields: FieldSet,
    pub response_fields: FieldSet,
}

/// Reads an explicit `null` the same way as a missing key
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Converts inferred field names into a placeholder FieldSet
pub fn placeholder_fields<I, S>(names: I) -> FieldSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names
        .into_iter()
        .map(|name| (name.into(), serde_json::Value::String(String::new())))
        .collect()
}
