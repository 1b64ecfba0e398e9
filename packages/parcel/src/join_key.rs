//! Legacy parcel join key.
//!
//! The county's current parcel ids carry a two-digit segment in the middle
//! that older city datasets never had. The legacy key keeps the first six
//! and the last two characters: `"060123045601"` -> `"06012301"`.

/// Minimum identifier length the six-plus-two split is defined for.
pub const MIN_SOURCE_ID_LEN: usize = 8;

const HEAD_LEN: usize = 6;
const TAIL_LEN: usize = 2;

/// How a join key was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinKey {
    /// First six plus last two characters.
    Derived(String),
    /// The identifier was shorter than [`MIN_SOURCE_ID_LEN`] and is passed
    /// through unchanged (trimmed).
    PassedThrough(String),
}

impl JoinKey {
    /// The key value.
    #[must_use]
    pub fn into_value(self) -> String {
        match self {
            Self::Derived(s) | Self::PassedThrough(s) => s,
        }
    }
}

/// Derives the legacy join key from a county parcel identifier.
///
/// Works on characters, not bytes. Surrounding whitespace is ignored.
#[must_use]
pub fn derive_join_key(source_id: &str) -> JoinKey {
    let id = source_id.trim();
    let len = id.chars().count();
    if len < MIN_SOURCE_ID_LEN {
        return JoinKey::PassedThrough(id.to_string());
    }

    let mut key: String = id.chars().take(HEAD_LEN).collect();
    key.extend(id.chars().skip(len - TAIL_LEN));
    JoinKey::Derived(key)
}

/// [`derive_join_key`] returning just the value.
#[must_use]
pub fn derive(source_id: &str) -> String {
    derive_join_key(source_id).into_value()
}
