use crate::errors::Result;
use crate::types::{StringID, ANY_STRING_ID};
use crate::util::regex_match_range;
use malloc_size_of_derive::MallocSizeOf;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::Bound;

/// Interns every namespace, name and value used by a corpus into small integer IDs.
///
/// ID `0` is reserved for the wildcard "any" value and is never assigned by [`add`](StringStorage::add).
/// IDs are stable for the lifetime of the corpus: `add` is idempotent and always
/// returns the smallest free ID when a new string has to be interned.
#[derive(Serialize, Deserialize, Clone, Default, MallocSizeOf)]
pub struct StringStorage {
    by_id: FxHashMap<StringID, String>,
    by_value: FxHashMap<String, StringID>,
}

impl StringStorage {
    pub fn new() -> StringStorage {
        StringStorage::default()
    }

    /// Look up the interned string for `id`, `None` for the wildcard ID or an unknown one.
    pub fn str(&self, id: StringID) -> Option<&str> {
        self.by_id.get(&id).map(|s| s.as_str())
    }

    /// Intern `val`, returning its existing ID if already known or assigning a fresh one.
    pub fn add(&mut self, val: &str) -> StringID {
        if let Some(existing) = self.by_value.get(val) {
            return *existing;
        }
        let mut id: StringID = 1;
        while self.by_id.contains_key(&id) {
            id += 1;
        }
        self.by_id.insert(id, val.to_owned());
        self.by_value.insert(val.to_owned(), id);
        id
    }

    /// Look up the ID of an already interned string, without creating one.
    pub fn find_id(&self, val: &str) -> Option<StringID> {
        if val.is_empty() {
            return None;
        }
        self.by_value.get(val).copied()
    }

    /// Every ID whose interned string fully matches `pattern`.
    ///
    /// An invalid pattern is not an error: it simply matches nothing. The search is
    /// narrowed to the candidates sharing the pattern's literal prefix before the
    /// full match is attempted, so a selective prefix avoids scanning the whole pool.
    pub fn find_regex(&self, pattern: &str) -> FxHashSet<StringID> {
        let mut result = FxHashSet::default();

        let full_pattern = crate::util::regex_full_match(pattern);
        let re = match Regex::new(&full_pattern) {
            Ok(re) => re,
            Err(_) => return result,
        };

        if let Some((lower, upper)) = regex_match_range(pattern) {
            for (s, id) in self.by_value.iter() {
                if s.as_str() >= lower.as_str() && s.as_str() < upper.as_str() && re.is_match(s) {
                    result.insert(*id);
                }
            }
        } else {
            for (s, id) in self.by_value.iter() {
                if re.is_match(s) {
                    result.insert(*id);
                }
            }
        }
        result
    }

    pub fn avg_length(&self) -> f64 {
        if self.by_value.is_empty() {
            return 0.0;
        }
        let sum: usize = self.by_value.keys().map(|s| s.len()).sum();
        sum as f64 / self.by_value.len() as f64
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_value.clear();
    }

    pub fn save_to(&self, writer: &mut dyn std::io::Write) -> Result<()> {
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    pub fn load_from(reader: &mut dyn std::io::Read) -> Result<StringStorage> {
        let result = bincode::deserialize_from(reader)?;
        Ok(result)
    }
}

/// Helper used by callers that need a `(min, max)` ID range for a closed value
/// range, treating `None` for either bound as unbounded (i.e. the wildcard side).
pub fn id_range_bound(id: Option<StringID>) -> (Bound<StringID>, Bound<StringID>) {
    match id {
        Some(id) => (Bound::Included(id), Bound::Included(id)),
        None => (
            Bound::Included(ANY_STRING_ID + 1),
            Bound::Included(StringID::MAX),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let mut s = StringStorage::new();
        let a = s.add("hello");
        let b = s.add("hello");
        assert_eq!(a, b);
        assert_eq!(s.str(a), Some("hello"));
    }

    #[test]
    fn add_reuses_smallest_free_id() {
        let mut s = StringStorage::new();
        let a = s.add("a");
        let _b = s.add("b");
        assert_eq!(s.find_id("a"), Some(a));
        assert!(a >= 1);
    }

    #[test]
    fn find_regex_matches_only_full_strings() {
        let mut s = StringStorage::new();
        let bilharziose = s.add("Bilharziose");
        s.add("the");
        let ids = s.find_regex("Bilh.*");
        assert_eq!(ids, [bilharziose].into_iter().collect());
        let ids = s.find_regex("ilh.*");
        assert!(ids.is_empty(), "a partial match must not be returned");
    }

    #[test]
    fn find_regex_on_invalid_pattern_is_empty() {
        let mut s = StringStorage::new();
        s.add("anything");
        assert!(s.find_regex("(unterminated").is_empty());
    }

    #[test]
    fn wildcard_id_is_never_assigned() {
        let mut s = StringStorage::new();
        for i in 0..5 {
            assert_ne!(s.add(&format!("v{}", i)), ANY_STRING_ID);
        }
    }
}
