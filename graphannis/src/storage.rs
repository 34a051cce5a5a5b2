use crate::config::Config;
use crate::corpus::Corpus;
use crate::errors::Result;
use crate::query::conjunction::Conjunction;
use crate::query::Query;
use crate::threadpool::JoinThreadPool;
use graphannis_core::annostorage::AnnotationStorage;
use graphannis_core::types::{AnnoKey, Match, ANNIS_NS, NODE_NAME};
use lru::LruCache;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Matches the teacher's `SALT_URI_ENCODE_SET`
/// (`corpusstorage.rs`): annotation namespace/name segments of a match
/// descriptor are percent-encoded so they stay safe as URI path segments.
const SALT_URI_ENCODE_SET: &AsciiSet = &CONTROLS.add(b' ').add(b':').add(b'%');

/// The embedder-facing façade of spec.md §6: a cache of loaded [`Corpus`]es
/// plus `count`/`find`, mirroring the teacher's
/// `annis::db::corpusstorage::CorpusStorage` (simplified to a flat,
/// single-level corpus namespace — this crate has no sub-corpus hierarchy of
/// its own, see DESIGN.md).
pub struct CorpusStorage {
    data_dir: PathBuf,
    config: Config,
    pool: Option<JoinThreadPool>,
    cache: Mutex<LruCache<String, Arc<Corpus>>>,
}

impl CorpusStorage {
    /// `cache_capacity` bounds the number of distinct corpora kept loaded at
    /// once; the least-recently-used one is evicted to make room for a new
    /// load (spec.md §5 "corpus cache ... evicts least-recently-used").
    pub fn with_config(data_dir: impl Into<PathBuf>, config: Config, cache_capacity: usize) -> CorpusStorage {
        let pool = if config.use_parallel_joins {
            Some(JoinThreadPool::new(config.num_of_background_tasks))
        } else {
            None
        };
        CorpusStorage {
            data_dir: data_dir.into(),
            config,
            pool,
            cache: Mutex::new(LruCache::new(cache_capacity.max(1))),
        }
    }

    /// Register an already-built corpus under `name`, bypassing disk load
    /// (used by tests and by embedders that build a corpus in memory).
    pub fn register_corpus(&self, name: impl Into<String>, corpus: Corpus) {
        let name = name.into();
        let mut cache = self.cache.lock().unwrap();
        if cache.put(name.clone(), Arc::new(corpus)).is_some() {
            log::debug!("replaced already-cached corpus '{}'", name);
        }
    }

    fn get_loaded_corpus(&self, name: &str) -> Result<Arc<Corpus>> {
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(corpus) = cache.get(name) {
                return Ok(corpus.clone());
            }
        }

        let dir = self.data_dir.join(name);
        log::debug!("loading corpus '{}' from {}", name, dir.display());
        let corpus = Arc::new(Corpus::load_from(&dir)?);

        let mut cache = self.cache.lock().unwrap();
        if cache.len() >= cache.cap() && !cache.contains(name) {
            log::debug!("cache full, evicting least-recently-used corpus to load '{}'", name);
        }
        cache.put(name.to_string(), corpus.clone());
        Ok(corpus)
    }

    /// `count(query)` of spec.md §6: the number of result tuples, without
    /// materialising the descriptor strings `find` builds.
    pub fn count(&self, corpus_name: &str, query: Query) -> Result<u64> {
        let corpus = self.get_loaded_corpus(corpus_name)?;
        let plan = Conjunction::new(query).make_plan(&corpus, &self.config, self.pool.as_ref())?;
        Ok(plan.count() as u64)
    }

    /// `find(query, offset, limit)` of spec.md §6: the `[offset, offset+limit)`
    /// slice of result tuples, each rendered as a space-separated list of
    /// match descriptors `"<ns>::<name>::<corpus>/<document>/#<node_name>"`
    /// (the `<ns>::<name>::` prefix omitted for a tuple position whose
    /// matched annotation is the wildcard — an unconstrained node or `tok`
    /// search carries no specific key to name).
    pub fn find(&self, corpus_name: &str, query: Query, offset: usize, limit: Option<usize>) -> Result<Vec<String>> {
        let corpus = self.get_loaded_corpus(corpus_name)?;
        let plan = Conjunction::new(query).make_plan(&corpus, &self.config, self.pool.as_ref())?;

        let mut results = Vec::new();
        for tuple in plan.skip(offset) {
            if let Some(limit) = limit {
                if results.len() >= limit {
                    break;
                }
            }
            results.push(format_tuple(&corpus, corpus_name, &tuple));
        }
        Ok(results)
    }

    pub fn unload(&self, name: &str) {
        self.cache.lock().unwrap().pop(name);
    }
}

fn format_tuple(corpus: &Corpus, corpus_name: &str, tuple: &[Match]) -> String {
    tuple
        .iter()
        .map(|m| format_match(corpus, corpus_name, m))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_match(corpus: &Corpus, corpus_name: &str, m: &Match) -> String {
    let prefix = if m.anno.key.is_wildcard() {
        String::new()
    } else {
        let name = utf8_percent_encode(corpus.strings.str(m.anno.key.name).unwrap_or_default(), SALT_URI_ENCODE_SET);
        if m.anno.key.ns == graphannis_core::types::ANY_STRING_ID {
            format!("{}::", name)
        } else {
            let ns = corpus.strings.str(m.anno.key.ns).unwrap_or_default();
            format!("{}::{}::", utf8_percent_encode(ns, SALT_URI_ENCODE_SET), name)
        }
    };
    let (document, node_name) = node_path(corpus, m.node);
    if document.is_empty() {
        format!("{}{}/#{}", prefix, corpus_name, node_name)
    } else {
        format!("{}{}/{}/#{}", prefix, corpus_name, document, node_name)
    }
}

/// Splits a node's `annis::node_name` value into `(document, node_id)`: the
/// convention (mirrored from the teacher's relANNIS-derived corpora) is
/// `"document/path#id"`; a name with no `/` has no document component.
fn node_path(corpus: &Corpus, node: graphannis_core::types::NodeID) -> (String, String) {
    let key = AnnoKey {
        name: match corpus.strings.find_id(NODE_NAME) {
            Some(id) => id,
            None => return (String::new(), node.to_string()),
        },
        ns: match corpus.strings.find_id(ANNIS_NS) {
            Some(id) => id,
            None => return (String::new(), node.to_string()),
        },
    };
    let name = corpus
        .node_annos
        .get_value_for_item(&node, &key)
        .and_then(|id| corpus.strings.str(id))
        .map(str::to_string)
        .unwrap_or_else(|| node.to_string());

    match name.rsplit_once('/') {
        Some((document, id)) => (document.to_string(), id.to_string()),
        None => (String::new(), name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{AnnotationSearch, NodeSpec, ValueMatching};
    use graphannis_core::types::Annotation;
    use rustc_hash::FxHashMap;

    fn one_node_corpus() -> Corpus {
        let mut corpus = Corpus::new();
        let pos_key = AnnoKey { name: corpus.strings.add("pos"), ns: 0 };
        let name_key = corpus.node_name_key();
        let tok1 = 1;
        let val = corpus.strings.add("NN");
        corpus.node_annos.insert(tok1, Annotation { key: pos_key, val });
        let name_val = corpus.strings.add("doc1/tok1");
        corpus.node_annos.insert(tok1, Annotation { key: name_key, val: name_val });
        corpus
    }

    fn pos_nn_query() -> Query {
        let mut nodes = FxHashMap::default();
        nodes.insert(
            1,
            NodeSpec::Annotations {
                annotations: vec![AnnotationSearch {
                    ns: None,
                    name: "pos".into(),
                    value: Some("NN".into()),
                    matching: ValueMatching::ExactEqual,
                }],
            },
        );
        Query { nodes, joins: vec![] }
    }

    #[test]
    fn count_and_find_agree_on_a_registered_corpus() {
        let storage = CorpusStorage::with_config(
            std::env::temp_dir(),
            Config { use_parallel_joins: false, ..Config::default() },
            4,
        );
        storage.register_corpus("testcorpus", one_node_corpus());

        let count = storage.count("testcorpus", pos_nn_query()).unwrap();
        assert_eq!(count, 1);

        let found = storage.find("testcorpus", pos_nn_query(), 0, None).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("testcorpus/doc1/#tok1"));
    }

    #[test]
    fn find_respects_offset_and_limit() {
        let storage = CorpusStorage::with_config(
            std::env::temp_dir(),
            Config { use_parallel_joins: false, ..Config::default() },
            4,
        );
        storage.register_corpus("testcorpus", one_node_corpus());

        let found = storage.find("testcorpus", pos_nn_query(), 1, None).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn unknown_corpus_surfaces_as_storage_io_error() {
        let storage = CorpusStorage::with_config(
            std::env::temp_dir().join("does-not-exist-graphannis-test"),
            Config::default(),
            4,
        );
        let result = storage.count("missing", pos_nn_query());
        assert!(result.is_err());
    }
}
