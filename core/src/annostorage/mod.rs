use crate::types::{AnnoKey, Annotation, Match, StringID};
use std::hash::Hash;

pub mod inmemory;

/// Capability set shared by the node-annotation index and every graph storage's
/// edge-annotation index.
///
/// `T` is the kind of item the annotations are attached to (`NodeID` or `Edge`).
/// All containers are backed by the three correlated views from the corpus
/// query engine's data model: `by_node`/`by_container` (item -> annotations),
/// `by_anno` (annotation -> items) and `by_key` (key -> population count), kept
/// mutually consistent by every mutating call.
pub trait AnnotationStorage<T: Ord + Hash + Clone>: Sync + Send {
    fn insert(&mut self, item: T, anno: Annotation);

    /// Remove the annotation for `key` on `item`, returning its value if it existed.
    fn remove_annotation_for_item(&mut self, item: &T, key: &AnnoKey) -> Option<StringID>;

    fn get_value_for_item(&self, item: &T, key: &AnnoKey) -> Option<StringID>;

    fn get_annotations_for_item(&self, item: &T) -> Vec<Annotation>;

    fn get_all_keys(&self) -> Vec<AnnoKey>;

    /// Every `(ns, name)` sharing `name`, used to resolve an unqualified search.
    fn get_qualified_keys(&self, name: StringID) -> Vec<AnnoKey>;

    fn num_of_annotations(&self, ns: Option<StringID>, name: StringID) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_largest_item(&self) -> Option<T>;

    fn clear(&mut self);

    /// Estimate the number of annotations with key `(name, ns)` whose interned
    /// *value string* falls into `[lower_val, upper_val]`, using the per-key
    /// histogram computed by [`calculate_statistics`](AnnotationStorage::calculate_statistics).
    fn guess_max_count(
        &self,
        ns: Option<StringID>,
        name: StringID,
        lower_val: &str,
        upper_val: &str,
    ) -> usize;

    /// Same estimate, but derived from a regular expression's literal prefix.
    fn guess_max_count_regex(&self, ns: Option<StringID>, name: StringID, pattern: &str) -> usize;

    /// (Re-)build the value histograms used by `guess_max_count`. Must be given
    /// access to the string pool since histogram bounds are stored as decoded
    /// value strings, not interned IDs, so bucket comparisons reflect lexicographic
    /// string order rather than assignment order.
    fn calculate_statistics(&mut self, strings: &crate::stringstorage::StringStorage);
}

/// Node-annotation specific lookups that return [`Match`]es rather than bare values.
pub trait NodeAnnotationSearch: AnnotationStorage<crate::types::NodeID> {
    fn exact_anno_search<'a>(
        &'a self,
        ns: Option<StringID>,
        name: StringID,
        value: Option<StringID>,
    ) -> Box<dyn Iterator<Item = Match> + 'a>;

    fn regex_anno_search<'a>(
        &'a self,
        strings: &'a crate::stringstorage::StringStorage,
        ns: Option<StringID>,
        name: StringID,
        pattern: &'a str,
    ) -> Box<dyn Iterator<Item = Match> + 'a>;
}

/// Edge-annotation specific lookups; a `Match` is reported with the edge's source node.
pub trait EdgeAnnotationSearch: AnnotationStorage<crate::types::Edge> {
    fn exact_anno_search<'a>(
        &'a self,
        ns: Option<StringID>,
        name: StringID,
        value: Option<StringID>,
    ) -> Box<dyn Iterator<Item = Match> + 'a>;
}
