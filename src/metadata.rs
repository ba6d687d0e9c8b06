//! Typed profile metadata
//!
//! Profiles carry a metadata document that accumulates onboarding flags and
//! lead-linkage bookkeeping. The fields this crate reads or writes are typed;
//! every other key lives in an opaque extension bucket so documents written by
//! other clients survive a round trip untouched. The document serializes flat,
//! exactly like the untyped JSON object stored in the `metadata` column.
//!
//! Reading is lenient: a typed key holding a value of the wrong JSON type is
//! kept verbatim in the extension bucket and the typed field stays `None`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Current layout version stamped on documents written by this crate.
pub const METADATA_VERSION: u32 = 1;

/// Keys owned by the typed fields; never valid as extension keys.
pub const RESERVED_KEYS: [&str; 5] = [
    "version",
    "onboarding_completed",
    "leads_linked_at",
    "linked_leads_count",
    "companyName",
];

/// Profile metadata: known optional fields plus an extension bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    /// Layout version of the document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Set once the account went through onboarding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding_completed: Option<bool>,
    /// When anonymous leads were last linked to the account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leads_linked_at: Option<DateTime<Utc>>,
    /// Number of leads linked during the last onboarding run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_leads_count: Option<u64>,
    /// Company name captured at signup; drives company profile creation
    #[serde(rename = "companyName", default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    /// Every key this crate does not interpret, plus typed keys whose
    /// stored value had an unexpected type
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::<String, Value>::deserialize(deserializer).map(Self::from_map)
    }
}

impl Metadata {
    /// Shallow merge: keys present in `incoming` win, absent keys survive.
    ///
    /// A typed field set to `None` counts as absent.
    pub fn merge(&mut self, incoming: &Self) {
        if incoming.version.is_some() {
            self.version = incoming.version;
        }
        if incoming.onboarding_completed.is_some() {
            self.onboarding_completed = incoming.onboarding_completed;
        }
        if incoming.leads_linked_at.is_some() {
            self.leads_linked_at = incoming.leads_linked_at;
        }
        if incoming.linked_leads_count.is_some() {
            self.linked_leads_count = incoming.linked_leads_count;
        }
        if incoming.company_name.is_some() {
            self.company_name.clone_from(&incoming.company_name);
        }
        for (key, value) in &incoming.extensions {
            self.extensions.insert(key.clone(), value.clone());
        }
        self.drop_shadowed_extensions();
    }

    /// Merge and return the result, leaving `self` untouched.
    #[must_use]
    pub fn merged_with(&self, incoming: &Self) -> Self {
        let mut merged = self.clone();
        merged.merge(incoming);
        merged
    }

    /// Record that onboarding ran and how many leads it linked.
    pub fn stamp_onboarding(&mut self, linked_leads_count: u64, now: DateTime<Utc>) {
        self.version = Some(METADATA_VERSION);
        self.onboarding_completed = Some(true);
        self.leads_linked_at = Some(now);
        self.linked_leads_count = Some(linked_leads_count);
        self.drop_shadowed_extensions();
    }

    /// Company name, trimmed, if present and non-empty.
    #[must_use]
    pub fn company_name(&self) -> Option<&str> {
        self.company_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Whether `key` belongs to a typed field.
    #[must_use]
    pub fn is_reserved_key(key: &str) -> bool {
        RESERVED_KEYS.contains(&key)
    }

    /// Builder-style helper for setting an extension key.
    ///
    /// Reserved keys are ignored; set the typed field instead.
    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if !Self::is_reserved_key(&key) {
            self.extensions.insert(key, value.into());
        }
        self
    }

    /// Parse the stored JSON text of a metadata column.
    ///
    /// Empty and `null` columns yield an empty document.
    pub fn from_column(raw: Option<&str>) -> serde_json::Result<Self> {
        match raw.map(str::trim) {
            None | Some("" | "null") => Ok(Self::default()),
            Some(text) => serde_json::from_str(text),
        }
    }

    /// JSON text for storing in a metadata column.
    pub fn to_column(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    fn from_map(mut map: Map<String, Value>) -> Self {
        let version = take_typed(&mut map, "version");
        let onboarding_completed = take_typed(&mut map, "onboarding_completed");
        let leads_linked_at = take_typed(&mut map, "leads_linked_at");
        let linked_leads_count = take_typed(&mut map, "linked_leads_count");
        let company_name = take_typed(&mut map, "companyName");
        Self {
            version,
            onboarding_completed,
            leads_linked_at,
            linked_leads_count,
            company_name,
            extensions: map,
        }
    }

    /// A typed value replaces any mistyped raw value kept under its key.
    fn drop_shadowed_extensions(&mut self) {
        let shadowed = [
            ("version", self.version.is_some()),
            ("onboarding_completed", self.onboarding_completed.is_some()),
            ("leads_linked_at", self.leads_linked_at.is_some()),
            ("linked_leads_count", self.linked_leads_count.is_some()),
            ("companyName", self.company_name.is_some()),
        ];
        for (key, is_set) in shadowed {
            if is_set {
                self.extensions.remove(key);
            }
        }
    }
}

/// Pull `key` out of `map` as `T`; a value of another type goes back untouched.
fn take_typed<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Option<T> {
    let value = map.remove(key)?;
    if value.is_null() {
        return None;
    }
    match T::deserialize(&value) {
        Ok(typed) => Some(typed),
        Err(e) => {
            warn!(key, error = %e, "Metadata key has an unexpected type; keeping it as an extension");
            map.insert(key.to_string(), value);
            None
        }
    }
}
