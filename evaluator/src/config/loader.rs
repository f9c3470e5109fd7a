use super::{
    descriptors::{Descriptor, ValidationError},
    processors::lexical_normalize,
    Config, ConfigErrors, GENERAL_KEY,
};
use crate::sync::locking;
use serde_yaml::{Mapping, Value};
use std::{
    collections::BTreeSet,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};

/// Assembles component schemas into a root schema and loads documents against it
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    schema: Descriptor,
}

/// the reserved `general` section injected into every root schema
pub fn general_schema() -> Descriptor {
    Descriptor::dictionary([
        (
            "config_files",
            Descriptor::string()
                .glob()
                .with_description("Glob pattern of additional config files merged over this one"),
        ),
        (
            "lock_timeout",
            Descriptor::integer()
                .with_default(10)
                .with_description("Default timeout [s] for acquiring locks of data files"),
        ),
    ])
    .with_description("Global configuration")
}

impl ConfigLoader {
    /// wrap a root dictionary schema, fails if it declares the reserved `general` key
    pub fn new(schema: Descriptor) -> Result<Self, ConfigErrors> {
        if !schema.is_dictionary() {
            return Err(ConfigErrors::RootNotDictionary);
        }
        if schema.item(GENERAL_KEY).is_some() {
            return Err(ConfigErrors::ReservedKey(GENERAL_KEY.to_string()));
        }

        let mut schema = schema;
        schema.push_item(GENERAL_KEY, general_schema());

        Ok(Self { schema })
    }

    /// build the root schema out of `(key, schema)` pairs of individual components
    pub fn from_components<I, K>(components: I) -> Result<Self, ConfigErrors>
    where
        I: IntoIterator<Item = (K, Descriptor)>,
        K: Into<String>,
    {
        let mut items: Vec<(String, Descriptor)> = Vec::new();

        for (name, schema) in components {
            let name = name.into();
            if items.iter().any(|(existing, _)| *existing == name) {
                return Err(ConfigErrors::DuplicateComponent(name));
            }
            items.push((name, schema));
        }

        Self::new(Descriptor::dictionary(items))
    }

    pub fn schema(&self) -> &Descriptor {
        &self.schema
    }

    /// Load `root_file` and every auxiliary file it refers to through `general.config_files`.
    ///
    /// Nothing is validated here, malformed values are replaced by merged or default values.
    /// Use [`ConfigLoader::load_validated`] to reject them instead.
    pub fn load(&self, root_file: impl AsRef<Path>) -> Result<Config, ConfigErrors> {
        self.load_with(root_file.as_ref(), false)
    }

    /// same as [`ConfigLoader::load`] but every document is validated before it is merged
    pub fn load_validated(&self, root_file: impl AsRef<Path>) -> Result<Config, ConfigErrors> {
        self.load_with(root_file.as_ref(), true)
    }

    /// Validate a single document, errors are appended to `errors`
    pub fn validate_file(
        &self,
        file: impl AsRef<Path>,
        errors: &mut Vec<ValidationError>,
    ) -> Result<bool, ConfigErrors> {
        let path = absolute(file.as_ref())?;
        let document = read_document(&path)?;

        Ok(self.schema.validate(&document, &path, errors))
    }

    fn load_with(&self, root_file: &Path, strict: bool) -> Result<Config, ConfigErrors> {
        let root = absolute(root_file)?;
        let mut tree = self.load_document(&root, None, strict)?;

        // each auxiliary file is merged once, in the order the globs resolved them
        let mut merged = BTreeSet::from([root]);
        loop {
            let pending = pending_files(&tree).find(|file| !merged.contains(file));
            let Some(file) = pending else { break };

            tree = self.load_document(&file, Some(&tree), strict)?;
            merged.insert(file);
        }

        let config = Config::new(tree);
        let general = config.general()?;
        locking::set_default_timeout(Duration::from_secs(general.lock_timeout));

        info!(
            files = merged.len(),
            lock_timeout = general.lock_timeout,
            "Configuration loaded"
        );

        Ok(config)
    }

    fn load_document(
        &self,
        path: &Path,
        merge_with: Option<&Value>,
        strict: bool,
    ) -> Result<Value, ConfigErrors> {
        let document = read_document(path)?;

        if strict {
            let mut errors = Vec::new();
            if !self.schema.validate(&document, path, &mut errors) {
                return Err(ConfigErrors::Invalid(errors));
            }
        }

        debug!(file = ?path, merge = merge_with.is_some(), "Loading config file");
        self.schema.load(&document, path, merge_with)
    }
}

/// resolved `general.config_files` of a loaded tree
fn pending_files(tree: &Value) -> impl Iterator<Item = PathBuf> + '_ {
    tree.get(GENERAL_KEY)
        .and_then(|general| general.get("config_files"))
        .and_then(Value::as_sequence)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(PathBuf::from)
}

fn absolute(path: &Path) -> Result<PathBuf, ConfigErrors> {
    if path.is_absolute() {
        Ok(lexical_normalize(path))
    } else {
        let cwd = env::current_dir().map_err(ConfigErrors::WorkingDirectory)?;
        Ok(lexical_normalize(&cwd.join(path)))
    }
}

/// Parse a YAML document, a missing or empty file yields an empty mapping
fn read_document(path: &Path) -> Result<Value, ConfigErrors> {
    if !path.exists() {
        debug!(file = ?path, "Config file not found, using an empty document");
        return Ok(Value::Mapping(Mapping::new()));
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigErrors::Read {
        path: path.to_path_buf(),
        source,
    })?;

    match serde_yaml::from_str(&content) {
        Ok(Value::Null) => Ok(Value::Mapping(Mapping::new())),
        Ok(document) => Ok(document),
        Err(source) => Err(ConfigErrors::Parse {
            path: path.to_path_buf(),
            source,
        }),
    }
}
