use super::{AnnotationStorage, EdgeAnnotationSearch, NodeAnnotationSearch};
use crate::stringstorage::StringStorage;
use crate::types::{AnnoKey, Annotation, Edge, Match, NodeID, StringID};
use malloc_size_of_derive::MallocSizeOf;
use rand::seq::index::sample;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, Bound::Included};
use std::hash::Hash;

/// Maximum number of histogram buckets per key (251 boundaries, per the spec's
/// cardinality estimation model).
const MAX_HISTOGRAM_BUCKETS: usize = 250;
/// Maximum number of values sampled per key before building a histogram.
const MAX_SAMPLED_ANNOTATIONS: usize = 2500;

/// In-memory annotation index over items of type `T` (a `NodeID` or an `Edge`).
///
/// Keeps three mutually consistent views: `by_item` mirrors the spec's `by_node`
/// (sorted annotations per item), `by_anno` mirrors `by_anno` (item set per
/// annotation, ordered so range scans over a value interval are cheap) and
/// `anno_keys` mirrors `by_key` (population count per key).
#[derive(Serialize, Deserialize, Clone, MallocSizeOf)]
pub struct AnnoStorage<T: Ord + Hash + Clone + malloc_size_of::MallocSizeOf> {
    by_item: rustc_hash::FxHashMap<T, Vec<Annotation>>,
    by_anno: BTreeMap<Annotation, FxHashSet<T>>,
    anno_keys: BTreeMap<AnnoKey, usize>,
    histogram_bounds: BTreeMap<AnnoKey, Vec<String>>,
    largest_item: Option<T>,
    total_number_of_annos: usize,
}

impl<T> Default for AnnoStorage<T>
where
    T: Ord + Hash + Clone + malloc_size_of::MallocSizeOf,
{
    fn default() -> Self {
        AnnoStorage {
            by_item: rustc_hash::FxHashMap::default(),
            by_anno: BTreeMap::new(),
            anno_keys: BTreeMap::new(),
            histogram_bounds: BTreeMap::new(),
            largest_item: None,
            total_number_of_annos: 0,
        }
    }
}

impl<T> AnnoStorage<T>
where
    T: Ord + Hash + Clone + malloc_size_of::MallocSizeOf,
{
    pub fn new() -> AnnoStorage<T> {
        AnnoStorage::default()
    }

    fn remove_element_from_by_anno(&mut self, anno: &Annotation, item: &T) {
        let now_empty = if let Some(items) = self.by_anno.get_mut(anno) {
            items.remove(item);
            items.is_empty()
        } else {
            false
        };
        if now_empty {
            self.by_anno.remove(anno);
        }
    }

    fn qualified_key_range(&self, name: StringID) -> (AnnoKey, AnnoKey) {
        (
            AnnoKey {
                name,
                ns: StringID::MIN,
            },
            AnnoKey {
                name,
                ns: StringID::MAX,
            },
        )
    }

    /// All `(Included(min), Included(max))` ranges over `by_anno` that realise an
    /// exact-equal search for `(ns, name, value)`, expanding an unqualified `ns` to
    /// every namespace that uses `name`.
    fn anno_ranges(
        &self,
        ns: Option<StringID>,
        name: StringID,
        value: Option<StringID>,
    ) -> Vec<(Annotation, Annotation)> {
        let keys: Vec<AnnoKey> = match ns {
            Some(ns) => vec![AnnoKey { name, ns }],
            None => self.get_qualified_keys(name),
        };
        let (val_lo, val_hi) = match value {
            Some(v) => (v, v),
            None => (StringID::MIN, StringID::MAX),
        };
        keys.into_iter()
            .map(|key| {
                (
                    Annotation { key, val: val_lo },
                    Annotation { key, val: val_hi },
                )
            })
            .collect()
    }
}

impl<T> AnnotationStorage<T> for AnnoStorage<T>
where
    T: Ord + Hash + Clone + malloc_size_of::MallocSizeOf,
{
    fn insert(&mut self, item: T, anno: Annotation) {
        let replaced = {
            let entry = self.by_item.entry(item.clone()).or_insert_with(Vec::new);
            match entry.binary_search_by_key(&anno.key, |a| a.key) {
                Ok(idx) => {
                    let old = entry[idx];
                    entry[idx] = anno;
                    Some(old)
                }
                Err(idx) => {
                    entry.insert(idx, anno);
                    None
                }
            }
        };

        if let Some(old) = replaced {
            self.remove_element_from_by_anno(&old, &item);
        }

        self.by_anno
            .entry(anno)
            .or_insert_with(FxHashSet::default)
            .insert(item.clone());

        if replaced.is_none() {
            self.total_number_of_annos += 1;
            match &self.largest_item {
                Some(largest) if *largest >= item => {}
                _ => self.largest_item = Some(item.clone()),
            }
            *self.anno_keys.entry(anno.key).or_insert(0) += 1;
        }
    }

    fn remove_annotation_for_item(&mut self, item: &T, key: &AnnoKey) -> Option<StringID> {
        let mut result = None;
        if let Some(mut annos) = self.by_item.remove(item) {
            if let Ok(idx) = annos.binary_search_by_key(key, |a| a.key) {
                let removed = annos[idx];
                self.remove_element_from_by_anno(&removed, item);
                annos.remove(idx);
                if let Some(count) = self.anno_keys.get_mut(key) {
                    *count -= 1;
                }
                self.total_number_of_annos -= 1;
                result = Some(removed.val);
            }
            if !annos.is_empty() {
                self.by_item.insert(item.clone(), annos);
            }
        }
        result
    }

    fn get_value_for_item(&self, item: &T, key: &AnnoKey) -> Option<StringID> {
        let annos = self.by_item.get(item)?;
        let idx = annos.binary_search_by_key(key, |a| a.key).ok()?;
        Some(annos[idx].val)
    }

    fn get_annotations_for_item(&self, item: &T) -> Vec<Annotation> {
        self.by_item.get(item).cloned().unwrap_or_default()
    }

    fn get_all_keys(&self) -> Vec<AnnoKey> {
        self.anno_keys.keys().cloned().collect()
    }

    fn get_qualified_keys(&self, name: StringID) -> Vec<AnnoKey> {
        let (lo, hi) = self.qualified_key_range(name);
        self.anno_keys
            .range((Included(lo), Included(hi)))
            .map(|(k, _)| *k)
            .collect()
    }

    fn num_of_annotations(&self, ns: Option<StringID>, name: StringID) -> usize {
        match ns {
            Some(ns) => self.anno_keys.get(&AnnoKey { name, ns }).copied().unwrap_or(0),
            None => {
                let (lo, hi) = self.qualified_key_range(name);
                self.anno_keys
                    .range((Included(lo), Included(hi)))
                    .map(|(_, count)| *count)
                    .sum()
            }
        }
    }

    fn len(&self) -> usize {
        self.total_number_of_annos
    }

    fn get_largest_item(&self) -> Option<T> {
        self.largest_item.clone()
    }

    fn clear(&mut self) {
        self.by_item.clear();
        self.by_anno.clear();
        self.anno_keys.clear();
        self.histogram_bounds.clear();
        self.largest_item = None;
        self.total_number_of_annos = 0;
    }

    fn guess_max_count(
        &self,
        ns: Option<StringID>,
        name: StringID,
        lower_val: &str,
        upper_val: &str,
    ) -> usize {
        let keys: Vec<AnnoKey> = match ns {
            Some(ns) => vec![AnnoKey { name, ns }],
            None => self.get_qualified_keys(name),
        };

        let mut universe_size: usize = 0;
        let mut total_buckets: usize = 0;
        let mut matching_buckets: usize = 0;

        for key in keys {
            universe_size += self.anno_keys.get(&key).copied().unwrap_or(0);

            if let Some(histo) = self.histogram_bounds.get(&key) {
                if histo.len() >= 2 {
                    total_buckets += histo.len() - 1;
                    for window in histo.windows(2) {
                        let (bucket_lo, bucket_hi) = (&window[0], &window[1]);
                        if bucket_lo.as_str() <= upper_val && lower_val <= bucket_hi.as_str() {
                            matching_buckets += 1;
                        }
                    }
                }
            }
        }

        if total_buckets == 0 {
            return 0;
        }
        let selectivity = matching_buckets as f64 / total_buckets as f64;
        (selectivity * universe_size as f64).round() as usize
    }

    fn guess_max_count_regex(&self, ns: Option<StringID>, name: StringID, pattern: &str) -> usize {
        match crate::util::regex_match_range(pattern) {
            Some((lower, upper)) => self.guess_max_count(ns, name, &lower, &upper),
            None => 0,
        }
    }

    fn calculate_statistics(&mut self, strings: &StringStorage) {
        let mut rng = rand::thread_rng();
        self.histogram_bounds.clear();

        let keys: Vec<AnnoKey> = self.anno_keys.keys().cloned().collect();
        for key in keys {
            let min_anno = Annotation {
                key,
                val: StringID::MIN,
            };
            let max_anno = Annotation {
                key,
                val: StringID::MAX,
            };

            // repeat each value once per item carrying it so the histogram reflects
            // population density, not just distinct values
            let all_values: Vec<&str> = self
                .by_anno
                .range(min_anno..=max_anno)
                .flat_map(|(anno, items)| {
                    let s = strings.str(anno.val);
                    std::iter::repeat(s).take(items.len())
                })
                .flatten()
                .collect();

            let sample_size = all_values.len().min(MAX_SAMPLED_ANNOTATIONS);
            let sampled_idx: FxHashSet<usize> =
                sample(&mut rng, all_values.len(), sample_size).into_iter().collect();

            let mut sampled: Vec<&str> = all_values
                .into_iter()
                .enumerate()
                .filter(|(i, _)| sampled_idx.contains(i))
                .map(|(_, v)| v)
                .collect();
            sampled.sort_unstable();

            let num_bounds = if sampled.len() < MAX_HISTOGRAM_BUCKETS + 1 {
                sampled.len()
            } else {
                MAX_HISTOGRAM_BUCKETS + 1
            };

            if num_bounds >= 2 {
                let mut bounds = vec![String::new(); num_bounds];
                let delta = (sampled.len() - 1) / (num_bounds - 1);
                let delta_fraction = (sampled.len() - 1) % (num_bounds - 1);

                let mut pos = 0usize;
                let mut pos_fraction = 0usize;
                for bound in bounds.iter_mut() {
                    *bound = sampled[pos].to_owned();
                    pos += delta;
                    pos_fraction += delta_fraction;
                    if pos_fraction >= num_bounds - 1 {
                        pos += 1;
                        pos_fraction -= num_bounds - 1;
                    }
                }
                self.histogram_bounds.insert(key, bounds);
            }
        }
    }
}

impl AnnoStorage<NodeID> {
    pub fn save_to(&self, writer: &mut dyn std::io::Write) -> crate::errors::Result<()> {
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    pub fn load_from(reader: &mut dyn std::io::Read) -> crate::errors::Result<AnnoStorage<NodeID>> {
        Ok(bincode::deserialize_from(reader)?)
    }
}

impl NodeAnnotationSearch for AnnoStorage<NodeID> {
    fn exact_anno_search<'a>(
        &'a self,
        ns: Option<StringID>,
        name: StringID,
        value: Option<StringID>,
    ) -> Box<dyn Iterator<Item = Match> + 'a> {
        let ranges = self.anno_ranges(ns, name, value);
        let it = ranges
            .into_iter()
            .flat_map(move |(lo, hi)| self.by_anno.range((Included(lo), Included(hi))))
            .flat_map(|(anno, items)| items.iter().map(move |n| Match::new(*n, *anno)));
        Box::new(it)
    }

    fn regex_anno_search<'a>(
        &'a self,
        strings: &'a StringStorage,
        ns: Option<StringID>,
        name: StringID,
        pattern: &'a str,
    ) -> Box<dyn Iterator<Item = Match> + 'a> {
        let full_pattern = crate::util::regex_full_match(pattern);
        let re = match regex::Regex::new(&full_pattern) {
            Ok(re) => re,
            Err(_) => return Box::new(std::iter::empty()),
        };

        let keys: Vec<AnnoKey> = match ns {
            Some(ns) => vec![AnnoKey { name, ns }],
            None => self.get_qualified_keys(name),
        };

        let it = keys
            .into_iter()
            .flat_map(move |key| {
                let min_anno = Annotation {
                    key,
                    val: StringID::MIN,
                };
                let max_anno = Annotation {
                    key,
                    val: StringID::MAX,
                };
                self.by_anno.range((Included(min_anno), Included(max_anno)))
            })
            .filter(move |(anno, _)| match strings.str(anno.val) {
                Some(v) => re.is_match(v),
                None => false,
            })
            .flat_map(|(anno, items)| items.iter().map(move |n| Match::new(*n, *anno)));
        Box::new(it)
    }
}

impl EdgeAnnotationSearch for AnnoStorage<Edge> {
    fn exact_anno_search<'a>(
        &'a self,
        ns: Option<StringID>,
        name: StringID,
        value: Option<StringID>,
    ) -> Box<dyn Iterator<Item = Match> + 'a> {
        let ranges = self.anno_ranges(ns, name, value);
        let it = ranges
            .into_iter()
            .flat_map(move |(lo, hi)| self.by_anno.range((Included(lo), Included(hi))))
            .flat_map(|(anno, items)| items.iter().map(move |e: &Edge| Match::new(e.source, *anno)));
        Box::new(it)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ANY_STRING_ID;

    fn anno(key_name: StringID, key_ns: StringID, val: StringID) -> Annotation {
        Annotation {
            key: AnnoKey {
                name: key_name,
                ns: key_ns,
            },
            val,
        }
    }

    #[test]
    fn insert_keeps_all_three_views_consistent() {
        let mut store: AnnoStorage<NodeID> = AnnoStorage::new();
        store.insert(1, anno(10, 20, 30));
        store.insert(2, anno(10, 20, 31));

        assert_eq!(store.get_value_for_item(&1, &AnnoKey { name: 10, ns: 20 }), Some(30));
        assert_eq!(store.num_of_annotations(Some(20), 10), 2);
        assert_eq!(store.len(), 2);

        let matches: Vec<_> = store
            .exact_anno_search(Some(20), 10, Some(30))
            .map(|m| m.node)
            .collect();
        assert_eq!(matches, vec![1]);
    }

    #[test]
    fn overwrite_updates_by_anno_and_keeps_count() {
        let mut store: AnnoStorage<NodeID> = AnnoStorage::new();
        let key = AnnoKey { name: 1, ns: ANY_STRING_ID };
        store.insert(5, Annotation { key, val: 100 });
        store.insert(5, Annotation { key, val: 200 });

        assert_eq!(store.len(), 1);
        assert_eq!(store.get_value_for_item(&5, &key), Some(200));
        assert!(store.exact_anno_search(None, 1, Some(100)).next().is_none());
    }

    #[test]
    fn remove_cleans_up_empty_buckets() {
        let mut store: AnnoStorage<NodeID> = AnnoStorage::new();
        let key = AnnoKey { name: 1, ns: 2 };
        store.insert(7, Annotation { key, val: 9 });
        assert_eq!(store.remove_annotation_for_item(&7, &key), Some(9));
        assert_eq!(store.len(), 0);
        assert!(store.get_annotations_for_item(&7).is_empty());
    }

    #[test]
    fn histogram_guess_is_proportional_to_overlap() {
        let mut strings = StringStorage::new();
        let mut store: AnnoStorage<NodeID> = AnnoStorage::new();
        let key = AnnoKey {
            name: strings.add("pos"),
            ns: ANY_STRING_ID,
        };
        for (i, word) in ["ART", "NN", "NN", "VVFIN"].iter().enumerate() {
            let val = strings.add(word);
            store.insert(i as NodeID, Annotation { key, val });
        }
        store.calculate_statistics(&strings);
        let count = store.guess_max_count(None, key.name, "NN", "NN");
        assert!(count >= 1, "expected at least one match for NN, got {}", count);
    }
}
