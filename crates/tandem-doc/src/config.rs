//! Per-session configuration.

use serde::Deserialize;

fn default_user_id() -> String { "anonymous".to_owned() }

fn default_track_presence() -> bool { true }

/// Settings for one document session, deserialisable from any `serde`
/// source (the replay tool reads it from TOML and the environment).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentConfig {
  /// The user editing the document; announced to collaborators.
  #[serde(default = "default_user_id")]
  pub user_id:        String,
  /// Whether to join the presence channel at all.
  #[serde(default = "default_track_presence")]
  pub track_presence: bool,
}

impl DocumentConfig {
  pub fn for_user(user_id: impl Into<String>) -> Self {
    Self { user_id: user_id.into(), ..Self::default() }
  }
}

impl Default for DocumentConfig {
  fn default() -> Self {
    Self {
      user_id:        default_user_id(),
      track_presence: default_track_presence(),
    }
  }
}
