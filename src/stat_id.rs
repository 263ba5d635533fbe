//! Stat names.
//!
//! A `StatId` names a stat within one owner ("Strength", "MaxHealth").
//! Names are only used at the lookup boundary; inside the graph every
//! stat is addressed by its [`StatHandle`](crate::StatHandle).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::sync::Arc;

/// Interned stat name.
///
/// Backed by `Arc<str>`, so clones are a reference-count bump. Lookups
/// accept a plain `&str` through the `Borrow<str>` impl.
///
/// # Examples
///
/// ```rust
/// use statarena::StatId;
///
/// let strength = StatId::from_str("Strength");
/// let same: StatId = "Strength".into();
/// let owned: StatId = String::from("Strength").into();
///
/// assert_eq!(strength, same);
/// assert_eq!(strength, owned);
/// assert_eq!(strength.as_str(), "Strength");
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StatId(Arc<str>);

impl StatId {
    /// Create a `StatId` from a string slice.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for StatId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StatId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(StatId::from(s))
    }
}

// `Arc<str>` hashes and compares like `str`, so map lookups by `&str` agree
// with lookups by `StatId`.
impl Borrow<str> for StatId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StatId {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

impl From<String> for StatId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&StatId> for StatId {
    fn from(id: &StatId) -> Self {
        id.clone()
    }
}

impl std::fmt::Display for StatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
