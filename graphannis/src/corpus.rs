use crate::errors::Result;
use graphannis_core::annostorage::inmemory::AnnoStorage;
use graphannis_core::annostorage::AnnotationStorage;
use graphannis_core::graph::registry::{self, GraphStorage, GraphStorageRegistry};
use graphannis_core::graph::ReadableGraphStorage;
use graphannis_core::stringstorage::StringStorage;
use graphannis_core::types::{Component, NodeID, ANNIS_NS, NODE_NAME, TOK};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// A component whose storage may not have been read from disk yet (§3
/// "graph storage may be not-yet-loaded").
enum ComponentEntry {
    Loaded(Arc<GraphStorage>),
    NotLoaded(PathBuf, &'static str),
}

/// The in-memory representation of one corpus: the string pool, the node
/// annotation index, and every component's graph storage (§3). Immutable
/// during query execution — every accessor takes `&self` and internal
/// mutability is confined to the lazy-load guard of `components`.
pub struct Corpus {
    pub strings: StringStorage,
    pub node_annos: AnnoStorage<NodeID>,
    components: RwLock<FxHashMap<Component, ComponentEntry>>,
    registry: GraphStorageRegistry,
}

impl Default for Corpus {
    fn default() -> Self {
        Corpus::new()
    }
}

impl Corpus {
    pub fn new() -> Corpus {
        Corpus {
            strings: StringStorage::new(),
            node_annos: AnnoStorage::new(),
            components: RwLock::new(FxHashMap::default()),
            registry: GraphStorageRegistry::new(),
        }
    }

    pub fn registry(&self) -> &GraphStorageRegistry {
        &self.registry
    }

    /// Register an already materialised storage for `component` (used while
    /// building a corpus).
    pub fn insert_graphstorage(&mut self, component: Component, gs: GraphStorage) {
        self.components
            .get_mut()
            .unwrap()
            .insert(component, ComponentEntry::Loaded(Arc::new(gs)));
    }

    pub fn all_components(&self) -> Vec<Component> {
        self.components.read().unwrap().keys().cloned().collect()
    }

    /// Fetch (materialising from disk on first access) the storage for
    /// `component`, `None` if the component does not exist in this corpus.
    ///
    /// Lazy loading is guarded by the shared lock on `components`: a reader
    /// holds the shared lock for an already-loaded component; the first
    /// access to a not-yet-loaded one briefly upgrades to an exclusive lock
    /// to perform the load (§5 "shared-resource policy").
    pub fn get_graphstorage(&self, component: &Component) -> Option<Arc<GraphStorage>> {
        {
            let components = self.components.read().unwrap();
            match components.get(component)? {
                ComponentEntry::Loaded(gs) => return Some(gs.clone()),
                ComponentEntry::NotLoaded(..) => {}
            }
        }

        let mut components = self.components.write().unwrap();
        // someone else might have loaded it while we waited for the write lock
        let (path, impl_name) = match components.get(component) {
            Some(ComponentEntry::Loaded(gs)) => return Some(gs.clone()),
            Some(ComponentEntry::NotLoaded(path, impl_name)) => (path.clone(), *impl_name),
            None => return None,
        };

        log::debug!("materialising component {} from {}", component, path.display());
        let gs = load_component_file(&path, impl_name).ok()?;
        let gs = Arc::new(gs);
        components.insert(component.clone(), ComponentEntry::Loaded(gs.clone()));
        Some(gs)
    }

    /// Every node carrying the built-in `tok` annotation, in node-id order.
    pub fn is_token(&self, node: NodeID) -> bool {
        let key = graphannis_core::types::AnnoKey {
            name: match self.strings.find_id(TOK) {
                Some(id) => id,
                None => return false,
            },
            ns: match self.strings.find_id(ANNIS_NS) {
                Some(id) => id,
                None => return false,
            },
        };
        self.node_annos.get_value_for_item(&node, &key).is_some()
    }

    pub fn node_name_key(&mut self) -> graphannis_core::types::AnnoKey {
        graphannis_core::types::AnnoKey {
            name: self.strings.add(NODE_NAME),
            ns: self.strings.add(ANNIS_NS),
        }
    }

    pub fn save_to(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;

        let strings_path = dir.join("strings");
        self.strings
            .save_to(&mut BufWriter::new(File::create(&strings_path)?))?;

        let nodes_path = dir.join("nodes");
        self.node_annos
            .save_to(&mut BufWriter::new(File::create(&nodes_path)?))?;

        for (component, entry) in self.components.read().unwrap().iter() {
            let gs = match entry {
                ComponentEntry::Loaded(gs) => gs.clone(),
                ComponentEntry::NotLoaded(path, impl_name) => {
                    Arc::new(load_component_file(path, impl_name)?)
                }
            };
            let component_dir = component_directory(dir, component);
            std::fs::create_dir_all(&component_dir)?;
            let mut writer = BufWriter::new(File::create(component_dir.join("storage"))?);
            gs.save_to(&mut writer)?;
            std::fs::write(component_dir.join("implementation"), gs.implementation_name())?;
        }
        Ok(())
    }

    pub fn load_from(dir: &Path) -> Result<Corpus> {
        let mut corpus = Corpus::new();

        let strings_path = dir.join("strings");
        corpus.strings = StringStorage::load_from(&mut BufReader::new(File::open(strings_path)?))?;

        let nodes_path = dir.join("nodes");
        corpus.node_annos =
            AnnoStorage::load_from(&mut BufReader::new(File::open(nodes_path)?))?;

        let gs_root = dir.join("gs");
        if gs_root.is_dir() {
            for component in discover_components(&gs_root)? {
                let component_dir = component_directory(dir, &component);
                let impl_name: &'static str = Box::leak(
                    std::fs::read_to_string(component_dir.join("implementation"))?
                        .trim()
                        .to_owned()
                        .into_boxed_str(),
                );
                corpus.components.get_mut().unwrap().insert(
                    component,
                    ComponentEntry::NotLoaded(component_dir.join("storage"), impl_name),
                );
            }
        }

        Ok(corpus)
    }
}

fn load_component_file(path: &Path, impl_name: &str) -> Result<GraphStorage> {
    let mut reader = BufReader::new(File::open(path)?);
    Ok(registry::load_by_name(impl_name, &mut reader)?)
}

fn component_directory(corpus_dir: &Path, component: &Component) -> PathBuf {
    let mut p = corpus_dir
        .join("gs")
        .join(component.ctype.to_string())
        .join(&component.layer);
    if !component.name.is_empty() {
        p = p.join(&component.name);
    }
    p
}

/// Walk `gs_root` rebuilding the `Component` each `implementation` marker
/// file belongs to, from the `<type>/<layer>/[<name>/]` directory layout.
fn discover_components(gs_root: &Path) -> Result<Vec<Component>> {
    let mut result = Vec::new();
    for ctype_entry in std::fs::read_dir(gs_root)? {
        let ctype_entry = ctype_entry?;
        if !ctype_entry.file_type()?.is_dir() {
            continue;
        }
        let ctype = match ctype_entry.file_name().to_string_lossy().as_ref() {
            "Coverage" => graphannis_core::types::ComponentType::Coverage,
            "InverseCoverage" => graphannis_core::types::ComponentType::InverseCoverage,
            "Dominance" => graphannis_core::types::ComponentType::Dominance,
            "Pointing" => graphannis_core::types::ComponentType::Pointing,
            "Ordering" => graphannis_core::types::ComponentType::Ordering,
            "LeftToken" => graphannis_core::types::ComponentType::LeftToken,
            "RightToken" => graphannis_core::types::ComponentType::RightToken,
            "PartOfSubcorpus" => graphannis_core::types::ComponentType::PartOfSubcorpus,
            _ => continue,
        };
        for layer_entry in std::fs::read_dir(ctype_entry.path())? {
            let layer_entry = layer_entry?;
            if !layer_entry.file_type()?.is_dir() {
                continue;
            }
            let layer = layer_entry.file_name().to_string_lossy().into_owned();
            if layer_entry.path().join("implementation").is_file() {
                result.push(Component::new(ctype.clone(), layer, ""));
                continue;
            }
            for name_entry in std::fs::read_dir(layer_entry.path())? {
                let name_entry = name_entry?;
                if name_entry.path().join("implementation").is_file() {
                    let name = name_entry.file_name().to_string_lossy().into_owned();
                    result.push(Component::new(ctype.clone(), layer.clone(), name));
                }
            }
        }
    }
    Ok(result)
}

