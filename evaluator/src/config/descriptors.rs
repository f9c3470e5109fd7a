//! Declarative schema nodes used to validate, default and merge configuration documents.
//!
//! A schema is built once at start up and never mutated while documents are processed. The
//! position of a node inside the document being processed is carried by a [`Scope`] that is
//! threaded through [`Descriptor::validate_in`] and [`Descriptor::load_in`].

use super::{processors, ConfigErrors};
use serde_yaml::{Mapping, Value};
use std::{
    borrow::Cow,
    fmt::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::warn;

/// transform applied to a raw value before it is validated or loaded
pub type Preprocessor = Arc<dyn Fn(Value, &Path) -> Value + Send + Sync>;

/// transform applied to a present value right before `load` returns it,
/// receives the source file and the previously loaded value
pub type Postprocessor =
    Arc<dyn Fn(Value, &Path, Option<&Value>) -> Result<Value, ConfigErrors> + Send + Sync>;

static NULL: Value = Value::Null;

/// A single step in the path from the document root to a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

/// Request scoped position of a descriptor inside the processed document.
///
/// Scopes form a chain of borrowed parent links, the full name of a value is derived by
/// walking it, so nothing about the current traversal is stored in the schema.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    source: &'a Path,
    parent: Option<&'a Scope<'a>>,
    segment: Option<Segment<'a>>,
}

impl<'a> Scope<'a> {
    pub fn root(source: &'a Path) -> Self {
        Self {
            source,
            parent: None,
            segment: None,
        }
    }

    /// file the processed document was read from
    pub fn source(&self) -> &'a Path {
        self.source
    }

    pub fn key<'b>(&'b self, key: &'b str) -> Scope<'b> {
        Scope {
            source: self.source,
            parent: Some(self),
            segment: Some(Segment::Key(key)),
        }
    }

    pub fn index(&self, index: usize) -> Scope<'_> {
        Scope {
            source: self.source,
            parent: Some(self),
            segment: Some(Segment::Index(index)),
        }
    }

    /// dotted/bracketed name like `parent.list[2].item`, empty for the root
    pub fn full_name(&self) -> String {
        let mut segments = Vec::new();
        let mut current = Some(self);

        while let Some(scope) = current {
            if let Some(segment) = scope.segment {
                segments.push(segment);
            }
            current = scope.parent;
        }

        segments
            .into_iter()
            .rev()
            .fold(String::new(), |mut name, segment| {
                match segment {
                    Segment::Key(key) => {
                        if !name.is_empty() {
                            name.push('.');
                        }
                        name.push_str(key);
                    }
                    Segment::Index(index) => {
                        let _ = write!(name, "[{index}]");
                    }
                }
                name
            })
    }
}

/// A single validation failure, collected rather than raised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub full_name: String,
    pub source: PathBuf,
    pub message: String,
}

impl ValidationError {
    fn new(scope: &Scope, message: String) -> Self {
        Self {
            full_name: scope.full_name(),
            source: scope.source().to_path_buf(),
            message,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.full_name.is_empty() {
            write!(f, "<root>")?;
        } else {
            write!(f, "'{}'", self.full_name)?;
        }

        write!(f, " (in '{}'): {}", self.source.display(), self.message)
    }
}

#[derive(Clone)]
enum Kind {
    Integer,
    String {
        choices: Vec<String>,
    },
    Bool,
    Dictionary {
        items: Vec<(String, Descriptor)>,
    },
    List {
        item: Box<Descriptor>,
        collapsible: bool,
        append: bool,
    },
    NamedList {
        item: Box<Descriptor>,
    },
}

/// Schema node describing one value: its type, default and validation/loading rules
#[derive(Clone)]
pub struct Descriptor {
    kind: Kind,
    default: Value,
    description: Option<String>,
    preprocessor: Option<Preprocessor>,
    postprocessor: Option<Postprocessor>,
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Descriptor");
        debug
            .field("kind", &self.kind_name())
            .field("default", &self.default)
            .field("description", &self.description);

        match &self.kind {
            Kind::String { choices } if !choices.is_empty() => debug.field("choices", choices),
            Kind::Dictionary { items } => debug.field("items", items),
            Kind::List {
                item,
                collapsible,
                append,
            } => debug
                .field("item", item)
                .field("collapsible", collapsible)
                .field("append", append),
            Kind::NamedList { item } => debug.field("item", item),
            _ => &mut debug,
        };

        debug.finish()
    }
}

impl Descriptor {
    fn new(kind: Kind, default: Value) -> Self {
        Self {
            kind,
            default,
            description: None,
            preprocessor: None,
            postprocessor: None,
        }
    }

    pub fn integer() -> Self {
        Self::new(Kind::Integer, Value::Null)
    }

    pub fn string() -> Self {
        Self::new(
            Kind::String {
                choices: Vec::new(),
            },
            Value::Null,
        )
    }

    pub fn boolean() -> Self {
        Self::new(Kind::Bool, Value::Null)
    }

    /// container of a fixed set of named descriptors, kept in declaration order
    pub fn dictionary<I, K>(items: I) -> Self
    where
        I: IntoIterator<Item = (K, Descriptor)>,
        K: Into<String>,
    {
        let items = items
            .into_iter()
            .map(|(name, descriptor)| (name.into(), descriptor))
            .collect();

        Self::new(Kind::Dictionary { items }, Value::Mapping(Mapping::new()))
    }

    /// sequence of values sharing one descriptor
    pub fn list(item: Descriptor) -> Self {
        Self::new(
            Kind::List {
                item: Box::new(item),
                collapsible: false,
                append: false,
            },
            Value::Sequence(Vec::new()),
        )
    }

    /// open ended mapping of arbitrary keys to values sharing one descriptor
    pub fn named_list(item: Descriptor) -> Self {
        Self::new(
            Kind::NamedList {
                item: Box::new(item),
            },
            Value::Mapping(Mapping::new()),
        )
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    pub fn with_postprocessor(mut self, postprocessor: Postprocessor) -> Self {
        self.postprocessor = Some(postprocessor);
        self
    }

    /// Restrict a string to a closed set of values. Repeated calls extend the set.
    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Kind::String { choices } = &mut self.kind {
            choices.extend(values.into_iter().map(Into::into));
        }
        self
    }

    /// Treat the value as a path, relative paths are resolved against the source file's directory.
    pub fn path(self) -> Self {
        self.with_postprocessor(processors::path())
    }

    /// Treat the value as a glob pattern. Loading yields the list of matching paths appended to
    /// the previously loaded list.
    pub fn glob(mut self) -> Self {
        if self.default.is_null() {
            self.default = Value::Sequence(Vec::new());
        }
        self.with_postprocessor(processors::glob())
    }

    /// accept a bare value as shorthand for a single element list
    pub fn collapsible(mut self) -> Self {
        if let Kind::List { collapsible, .. } = &mut self.kind {
            *collapsible = true;
        }
        self
    }

    /// merge by extending the previously loaded list instead of replacing it
    pub fn append(mut self) -> Self {
        if let Kind::List { append, .. } = &mut self.kind {
            *append = true;
        }
        self
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            Kind::Integer => "integer",
            Kind::String { .. } => "string",
            Kind::Bool => "bool",
            Kind::Dictionary { .. } => "dictionary",
            Kind::List { .. } => "list",
            Kind::NamedList { .. } => "named list",
        }
    }

    pub fn is_dictionary(&self) -> bool {
        matches!(self.kind, Kind::Dictionary { .. })
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, Kind::Integer | Kind::String { .. } | Kind::Bool)
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, Kind::List { .. })
    }

    /// declared child of a dictionary
    pub fn item(&self, name: &str) -> Option<&Descriptor> {
        match &self.kind {
            Kind::Dictionary { items } => items
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, descriptor)| descriptor),
            _ => None,
        }
    }

    /// names of the declared children of a dictionary
    pub fn item_names(&self) -> impl Iterator<Item = &str> {
        let items = match &self.kind {
            Kind::Dictionary { items } => items.as_slice(),
            _ => &[],
        };
        items.iter().map(|(name, _)| name.as_str())
    }

    pub(crate) fn push_item(&mut self, name: impl Into<String>, descriptor: Descriptor) {
        if let Kind::Dictionary { items } = &mut self.kind {
            items.push((name.into(), descriptor));
        }
    }

    fn preprocess<'v>(&self, value: &'v Value, source: &Path) -> Cow<'v, Value> {
        match &self.preprocessor {
            Some(preprocessor) => Cow::Owned(preprocessor(value.clone(), source)),
            None => Cow::Borrowed(value),
        }
    }

    fn postprocess(
        &self,
        value: Value,
        source: &Path,
        merge_with: Option<&Value>,
    ) -> Result<Value, ConfigErrors> {
        match &self.postprocessor {
            Some(postprocessor) => postprocessor(value, source, merge_with),
            None => Ok(value),
        }
    }

    /// Validate `value` read from `source`. Every failure is appended to `errors`; returns `true`
    /// when none occurred.
    pub fn validate(
        &self,
        value: &Value,
        source: impl AsRef<Path>,
        errors: &mut Vec<ValidationError>,
    ) -> bool {
        self.validate_in(value, &Scope::root(source.as_ref()), errors)
    }

    /// Validate a value located at `scope`. An explicit `null` is rejected for scalars, an empty
    /// container (`section:` or an empty file) is valid and loads as the merged or default value.
    pub fn validate_in(&self, value: &Value, scope: &Scope, errors: &mut Vec<ValidationError>) -> bool {
        let value = self.preprocess(value, scope.source());
        let value: &Value = &value;

        if value.is_null() && !self.is_scalar() {
            return true;
        }

        match &self.kind {
            Kind::Integer => {
                if value.as_i64().is_none() && value.as_u64().is_none() {
                    errors.push(ValidationError::new(
                        scope,
                        format!("Integer value expected, {} given.", type_name(value)),
                    ));
                    return false;
                }
                true
            }
            Kind::String { choices } => {
                let Some(string) = value.as_str() else {
                    errors.push(ValidationError::new(
                        scope,
                        format!("String value expected, {} given.", type_name(value)),
                    ));
                    return false;
                };

                if !choices.is_empty() && !choices.iter().any(|choice| choice == string) {
                    errors.push(ValidationError::new(
                        scope,
                        format!("Value {string} is not in enum [{}]", choices.join(", ")),
                    ));
                    return false;
                }
                true
            }
            Kind::Bool => {
                if !value.is_bool() {
                    errors.push(ValidationError::new(
                        scope,
                        format!("Bool value expected, {} given.", type_name(value)),
                    ));
                    return false;
                }
                true
            }
            Kind::Dictionary { items } => {
                let Some(mapping) = value.as_mapping() else {
                    errors.push(ValidationError::new(
                        scope,
                        format!("Value '{}' is not a dict.", render(value)),
                    ));
                    return false;
                };

                let mut valid = true;
                for (key, item_value) in mapping {
                    let declared = key.as_str().and_then(|name| {
                        items
                            .iter()
                            .find(|(item_name, _)| item_name == name)
                            .map(|(item_name, descriptor)| (item_name.as_str(), descriptor))
                    });

                    match declared {
                        Some((name, descriptor)) => {
                            valid &= descriptor.validate_in(item_value, &scope.key(name), errors);
                        }
                        None => {
                            errors.push(ValidationError::new(
                                scope,
                                format!("Unexpected dict key '{}'.", render(key)),
                            ));
                            valid = false;
                        }
                    }
                }
                valid
            }
            Kind::List {
                item, collapsible, ..
            } => match value.as_sequence() {
                Some(sequence) => {
                    let mut valid = true;
                    for (index, item_value) in sequence.iter().enumerate() {
                        valid &= item.validate_in(item_value, &scope.index(index), errors);
                    }
                    valid
                }
                None if *collapsible && !item.is_list() => {
                    item.validate_in(value, &scope.index(0), errors)
                }
                None => {
                    errors.push(ValidationError::new(
                        scope,
                        format!("Value '{}' is not a list.", render(value)),
                    ));
                    false
                }
            },
            Kind::NamedList { item } => {
                let Some(mapping) = value.as_mapping() else {
                    errors.push(ValidationError::new(
                        scope,
                        format!("Value '{}' is not a dict.", render(value)),
                    ));
                    return false;
                };

                let mut valid = true;
                for (key, item_value) in mapping {
                    match key.as_str() {
                        Some(name) => {
                            valid &= item.validate_in(item_value, &scope.key(name), errors);
                        }
                        None => {
                            errors.push(ValidationError::new(
                                scope,
                                format!("Key '{}' is not a string.", render(key)),
                            ));
                            valid = false;
                        }
                    }
                }
                valid
            }
        }
    }

    /// Load `value` read from `source`, merging it over `merge_with` (a previously loaded value).
    ///
    /// Absent values (`null`, empty lists and mappings) fall back to `merge_with` and then to the
    /// default. This does not validate: malformed input is coerced towards the merged or default
    /// value, call [`Descriptor::validate`] first when that is not acceptable.
    pub fn load(
        &self,
        value: &Value,
        source: impl AsRef<Path>,
        merge_with: Option<&Value>,
    ) -> Result<Value, ConfigErrors> {
        self.load_in(value, &Scope::root(source.as_ref()), merge_with)
    }

    pub fn load_in(
        &self,
        value: &Value,
        scope: &Scope,
        merge_with: Option<&Value>,
    ) -> Result<Value, ConfigErrors> {
        let value = self.preprocess(value, scope.source());
        let merge_with = merge_with.filter(|prior| !prior.is_null());

        match &self.kind {
            Kind::Dictionary { items } => self.load_dictionary(items, &value, scope, merge_with),
            Kind::List { item, append, .. } => {
                let sequence = match &*value {
                    Value::Sequence(sequence) if !sequence.is_empty() => Cow::Borrowed(sequence),
                    Value::Null | Value::Sequence(_) => {
                        return Ok(self.fallback(merge_with));
                    }
                    Value::Mapping(mapping) if mapping.is_empty() => {
                        return Ok(self.fallback(merge_with));
                    }
                    bare if self.collapses() => Cow::Owned(vec![bare.clone()]),
                    other => {
                        warn!(
                            name = %scope.full_name(),
                            source = ?scope.source(),
                            "Ignoring value '{}' which is not a list",
                            render(other)
                        );
                        return Ok(self.fallback(merge_with));
                    }
                };

                let mut loaded = match merge_with {
                    Some(Value::Sequence(prior)) if *append => prior.clone(),
                    _ => Vec::with_capacity(sequence.len()),
                };
                for (index, item_value) in sequence.iter().enumerate() {
                    loaded.push(item.load_in(item_value, &scope.index(index), None)?);
                }

                self.postprocess(Value::Sequence(loaded), scope.source(), merge_with)
            }
            Kind::NamedList { item } => {
                let mut loaded = self.merged_mapping(merge_with);

                let input = match &*value {
                    Value::Mapping(mapping) if !mapping.is_empty() => mapping,
                    Value::Null | Value::Mapping(_) => return Ok(Value::Mapping(loaded)),
                    other => {
                        warn!(
                            name = %scope.full_name(),
                            source = ?scope.source(),
                            "Ignoring value '{}' which is not a dict",
                            render(other)
                        );
                        return Ok(Value::Mapping(loaded));
                    }
                };

                for (key, item_value) in input {
                    let name = render(key);
                    let prior = merge_with.and_then(|prior| prior.get(key));
                    let item_loaded = item.load_in(item_value, &scope.key(&name), prior)?;
                    loaded.insert(key.clone(), item_loaded);
                }

                self.postprocess(Value::Mapping(loaded), scope.source(), merge_with)
            }
            Kind::Integer | Kind::String { .. } | Kind::Bool => {
                if !value.is_null() {
                    self.postprocess(value.into_owned(), scope.source(), merge_with)
                } else {
                    Ok(self.fallback(merge_with))
                }
            }
        }
    }

    fn load_dictionary(
        &self,
        items: &[(String, Descriptor)],
        value: &Value,
        scope: &Scope,
        merge_with: Option<&Value>,
    ) -> Result<Value, ConfigErrors> {
        let input = match value {
            Value::Mapping(mapping) if !mapping.is_empty() => Some(mapping),
            Value::Null | Value::Mapping(_) => None,
            other => {
                warn!(
                    name = %scope.full_name(),
                    source = ?scope.source(),
                    "Ignoring value '{}' which is not a dict",
                    render(other)
                );
                None
            }
        };

        // start from the defaults and previous values so the result is always complete
        let mut loaded = self.merged_mapping(merge_with);

        for (name, descriptor) in items {
            let item_value = input
                .and_then(|mapping| mapping.get(name.as_str()))
                .unwrap_or(&NULL);
            let prior = merge_with.and_then(|prior| prior.get(name.as_str()));

            let item_loaded = descriptor.load_in(item_value, &scope.key(name), prior)?;
            loaded.insert(Value::String(name.clone()), item_loaded);
        }

        match input {
            Some(_) => self.postprocess(Value::Mapping(loaded), scope.source(), merge_with),
            None => Ok(Value::Mapping(loaded)),
        }
    }

    fn collapses(&self) -> bool {
        match &self.kind {
            Kind::List {
                item, collapsible, ..
            } => *collapsible && !item.is_list(),
            _ => false,
        }
    }

    fn fallback(&self, merge_with: Option<&Value>) -> Value {
        merge_with.cloned().unwrap_or_else(|| self.default.clone())
    }

    /// default mapping with the previously loaded entries laid over it
    fn merged_mapping(&self, merge_with: Option<&Value>) -> Mapping {
        let mut mapping = self.default.as_mapping().cloned().unwrap_or_default();

        if let Some(Value::Mapping(prior)) = merge_with {
            for (key, value) in prior {
                mapping.insert(key.clone(), value.clone());
            }
        }
        mapping
    }

    /// Render an indented, human readable listing of the schema
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.describe_into(&mut out, "<root>", 0);
        out
    }

    fn describe_into(&self, out: &mut String, name: &str, depth: usize) {
        let _ = write!(out, "{:indent$}{name}: {}", "", self.kind_name(), indent = depth * 2);

        if let Kind::String { choices } = &self.kind {
            if !choices.is_empty() {
                let _ = write!(out, " [{}]", choices.join(", "));
            }
        }
        if is_shown_default(&self.default) {
            let _ = write!(out, " = {}", render(&self.default));
        }
        if let Some(description) = &self.description {
            let _ = write!(out, "  # {description}");
        }
        out.push('\n');

        match &self.kind {
            Kind::Dictionary { items } => {
                for (item_name, descriptor) in items {
                    descriptor.describe_into(out, item_name, depth + 1);
                }
            }
            Kind::List { item, .. } => item.describe_into(out, "[]", depth + 1),
            Kind::NamedList { item } => item.describe_into(out, "<name>", depth + 1),
            _ => {}
        }
    }
}

fn is_shown_default(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Sequence(sequence) => !sequence.is_empty(),
        Value::Mapping(mapping) => !mapping.is_empty(),
        _ => true,
    }
}

/// short type name used in validation messages
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(number) if number.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "dict",
        Value::Tagged(_) => "tagged",
    }
}

/// inline rendering of a value for messages
fn render(value: &Value) -> String {
    match value {
        Value::String(string) => string.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{other:?}")),
    }
}
