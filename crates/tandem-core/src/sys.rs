//! Entity metadata (`sys`) and the `{sys, fields}` entity envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ─── Links ───────────────────────────────────────────────────────────────────

/// A reference to another resource, in the `{sys: {type: "Link", ...}}` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
  pub sys: LinkSys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSys {
  #[serde(rename = "type")]
  pub kind:      String,
  pub link_type: String,
  pub id:        String,
}

impl Link {
  pub fn new(link_type: impl Into<String>, id: impl Into<String>) -> Self {
    Self {
      sys: LinkSys {
        kind:      "Link".to_owned(),
        link_type: link_type.into(),
        id:        id.into(),
      },
    }
  }

  pub fn user(id: impl Into<String>) -> Self { Self::new("User", id) }

  pub fn id(&self) -> &str { &self.sys.id }
}

// ─── Sys ─────────────────────────────────────────────────────────────────────

/// Versioned, server-authoritative metadata of an entity.
///
/// Keys this type does not model are kept in `extra` so that deep equality
/// and re-serialisation see the whole block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sys {
  pub id:                String,
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub kind:              Option<String>,
  #[serde(default)]
  pub version:           u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at:        Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_by:        Option<Link>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at:        Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_by:        Option<Link>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub published_version: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub published_counter: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub published_at:      Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub published_by:      Option<Link>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub archived_version:  Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub archived_by:       Option<Link>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub deleted_version:   Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub environment:       Option<Link>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content_type:      Option<Link>,
  #[serde(flatten)]
  pub extra:             Map<String, Value>,
}

impl Sys {
  pub fn is_archived(&self) -> bool { self.archived_version.is_some() }

  pub fn is_deleted(&self) -> bool { self.deleted_version.is_some() }

  pub fn is_published(&self) -> bool { self.published_version.is_some() }

  /// The entity type (`Entry`, `Asset`, ...), defaulting to `Entry`.
  pub fn entity_type(&self) -> &str { self.kind.as_deref().unwrap_or("Entry") }
}

// ─── Entity ──────────────────────────────────────────────────────────────────

fn empty_object() -> Value { Value::Object(Map::new()) }

/// The `{sys, fields}` envelope of an entry or asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
  pub sys:    Sys,
  #[serde(default = "empty_object")]
  pub fields: Value,
}

impl Entity {
  pub fn new(sys: Sys, fields: Value) -> Self { Self { sys, fields } }

  /// The entity as a JSON document, the shape OT snapshots use.
  pub fn to_snapshot(&self) -> crate::Result<Value> {
    Ok(serde_json::to_value(self)?)
  }
}
