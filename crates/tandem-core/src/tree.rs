//! Reading and editing JSON values by [`Path`].
//!
//! Writes create missing intermediate containers as objects, matching the
//! behaviour of OT document backends, so `set_at(["fields", "new", "en-US"])`
//! works on a snapshot that has no `new` field yet.

use serde_json::{Map, Value};

use crate::{Error, Path, Result, Segment};

/// The value at `path`, if present.
pub fn get_at<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
  path
    .segments()
    .iter()
    .try_fold(root, |value, segment| step(value, segment))
}

fn step<'a>(value: &'a Value, segment: &Segment) -> Option<&'a Value> {
  match value {
    Value::Object(map) => map.get(&segment.as_key()),
    Value::Array(items) => items.get(segment.as_index()?),
    _ => None,
  }
}

/// Walk to the container addressed by `segments`, creating objects for missing
/// or null intermediate values.
fn container_mut<'a>(
  root: &'a mut Value,
  segments: &[Segment],
  path: &Path,
) -> Result<&'a mut Value> {
  let mut current = root;
  for segment in segments {
    if current.is_null() {
      *current = Value::Object(Map::new());
    }
    current = match current {
      Value::Object(map) => map.entry(segment.as_key()).or_insert(Value::Null),
      Value::Array(items) => {
        let index = segment
          .as_index()
          .ok_or_else(|| Error::PathTypeMismatch(path.clone()))?;
        items
          .get_mut(index)
          .ok_or_else(|| Error::IndexOutOfBounds { path: path.clone(), index })?
      }
      _ => return Err(Error::PathTypeMismatch(path.clone())),
    };
  }
  Ok(current)
}

/// Replace the value at `path`, creating intermediate objects as needed.
/// Setting a list index equal to the list length appends.
pub fn set_at(root: &mut Value, path: &Path, value: Value) -> Result<()> {
  let Some((parent, last)) = path.split_last() else {
    *root = value;
    return Ok(());
  };

  let container = container_mut(root, parent, path)?;
  if container.is_null() {
    *container = Value::Object(Map::new());
  }
  match container {
    Value::Object(map) => {
      map.insert(last.as_key(), value);
      Ok(())
    }
    Value::Array(items) => {
      let index = last
        .as_index()
        .ok_or_else(|| Error::PathTypeMismatch(path.clone()))?;
      match index.cmp(&items.len()) {
        std::cmp::Ordering::Less => items[index] = value,
        std::cmp::Ordering::Equal => items.push(value),
        std::cmp::Ordering::Greater => {
          return Err(Error::IndexOutOfBounds { path: path.clone(), index });
        }
      }
      Ok(())
    }
    _ => Err(Error::PathTypeMismatch(path.clone())),
  }
}

/// Remove and return the value at `path`. Absent paths are not an error.
pub fn remove_at(root: &mut Value, path: &Path) -> Result<Option<Value>> {
  let Some((parent, last)) = path.split_last() else {
    return Err(Error::RemoveRoot);
  };

  let parent_path: Path = parent.iter().cloned().collect();
  let container = parent
    .iter()
    .try_fold(&mut *root, |value, segment| match value {
      Value::Object(map) => map.get_mut(&segment.as_key()),
      Value::Array(items) => items.get_mut(segment.as_index()?),
      _ => None,
    });

  let Some(container) = container else {
    return Ok(None);
  };
  match container {
    Value::Object(map) => Ok(map.remove(&last.as_key())),
    Value::Array(items) => match last.as_index() {
      Some(index) if index < items.len() => Ok(Some(items.remove(index))),
      Some(_) => Ok(None),
      None => Err(Error::PathTypeMismatch(parent_path)),
    },
    _ => Ok(None),
  }
}

/// Insert `value` at `index` into the list at `path`; a missing list is
/// created.
pub fn insert_at(
  root: &mut Value,
  path: &Path,
  index: usize,
  value: Value,
) -> Result<()> {
  let list = list_mut(root, path)?;
  if index > list.len() {
    return Err(Error::IndexOutOfBounds { path: path.clone(), index });
  }
  list.insert(index, value);
  Ok(())
}

/// Append `value` to the list at `path`; a missing list is created.
pub fn push_at(root: &mut Value, path: &Path, value: Value) -> Result<()> {
  list_mut(root, path)?.push(value);
  Ok(())
}

fn list_mut<'a>(root: &'a mut Value, path: &Path) -> Result<&'a mut Vec<Value>> {
  let target = container_mut(root, path.segments(), path)?;
  if target.is_null() {
    *target = Value::Array(Vec::new());
  }
  match target {
    Value::Array(items) => Ok(items),
    _ => Err(Error::NotAList(path.clone())),
  }
}
