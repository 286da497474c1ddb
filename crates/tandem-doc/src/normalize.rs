//! Snapshot normalization: drop field and locale keys the current schema and
//! locale configuration do not know about.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::{Map, Value};
use tandem_core::{Path, path::FIELDS_KEY, tree};

/// The field ids of the entity's content type and the active locale codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Schema {
  pub field_ids: BTreeSet<String>,
  pub locales:   BTreeSet<String>,
}

impl Schema {
  pub fn new<F, L>(field_ids: F, locales: L) -> Self
  where
    F: IntoIterator,
    F::Item: Into<String>,
    L: IntoIterator,
    L::Item: Into<String>,
  {
    Self {
      field_ids: field_ids.into_iter().map(Into::into).collect(),
      locales:   locales.into_iter().map(Into::into).collect(),
    }
  }
}

/// Paths of every unknown field and every unknown locale of a known field in
/// `fields` (the value of the snapshot's `fields` key). Fields whose value is
/// not an object are left alone.
pub fn stray_paths(fields: &Value, schema: &Schema) -> Vec<Path> {
  let Value::Object(fields) = fields else {
    return Vec::new();
  };

  let mut strays = Vec::new();
  for (field_id, locales) in fields {
    let field = Path::fields().child(field_id.as_str());
    if !schema.field_ids.contains(field_id) {
      strays.push(field);
      continue;
    }
    if let Value::Object(locales) = locales {
      strays.extend(
        locales
          .keys()
          .filter(|code| !schema.locales.contains(*code))
          .map(|code| field.child(code.as_str())),
      );
    }
  }
  strays
}

/// Remove every stray path from `snapshot` (a full `{sys, fields}` value).
/// Returns the removed paths.
pub fn normalize(snapshot: &mut Value, schema: &Schema) -> Vec<Path> {
  let strays = match tree::get_at(snapshot, &Path::fields()) {
    Some(fields) => stray_paths(fields, schema),
    None => return Vec::new(),
  };
  for path in &strays {
    // Paths come from the snapshot itself, so removal cannot fail.
    let _ = tree::remove_at(snapshot, path);
  }
  strays
}

/// A copy of `fields` (the value of a snapshot's `fields` key) without the
/// keys [`normalize`] would remove.
pub fn normalized_fields(fields: &Value, schema: &Schema) -> Value {
  let mut snapshot =
    Value::Object(Map::from_iter([(FIELDS_KEY.to_owned(), fields.clone())]));
  normalize(&mut snapshot, schema);
  snapshot.get_mut(FIELDS_KEY).map(Value::take).unwrap_or_default()
}
