use super::{descriptors::Postprocessor, ConfigErrors};
use globset::GlobBuilder;
use ignore::{DirEntry, WalkBuilder};
use itertools::Itertools;
use serde_yaml::Value;
use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, trace};

/// Resolve a relative `path` against the directory of the `source` file, absolute paths are
/// returned untouched
pub fn normalize_path(path: impl AsRef<Path>, source: &Path) -> PathBuf {
    let path = path.as_ref();

    if path.is_absolute() {
        return path.to_path_buf();
    }

    let base = source.parent().unwrap_or_else(|| Path::new(""));
    lexical_normalize(&base.join(path))
}

/// Collapse `.` and `..` components without touching the filesystem
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                // there is nothing above the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }

    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}

/// postprocessor installed by `Descriptor::path`
pub fn path() -> Postprocessor {
    Arc::new(|value: Value, source: &Path, _: Option<&Value>| {
        Ok(match value {
            Value::String(path) => Value::String(
                normalize_path(&path, source)
                    .to_string_lossy()
                    .into_owned(),
            ),
            other => other,
        })
    })
}

/// postprocessor installed by `Descriptor::glob`, accumulates matches over merged documents
pub fn glob() -> Postprocessor {
    Arc::new(|value: Value, source: &Path, merge_with: Option<&Value>| {
        let mut matches = match merge_with {
            Some(Value::Sequence(prior)) => prior.clone(),
            _ => Vec::new(),
        };

        if let Value::String(pattern) = &value {
            matches.extend(
                expand_glob(pattern, source)?
                    .into_iter()
                    .map(|path| Value::String(path.to_string_lossy().into_owned())),
            );
        }

        Ok(Value::Sequence(matches))
    })
}

/// Expand a (possibly relative to `source`) glob pattern against the filesystem.
/// Matches are returned sorted.
pub fn expand_glob(pattern: &str, source: &Path) -> Result<Vec<PathBuf>, ConfigErrors> {
    let pattern = normalize_path(pattern, source);
    let matcher = GlobBuilder::new(&pattern.to_string_lossy())
        .literal_separator(true)
        .build()?
        .compile_matcher();

    // walk only below the literal part of the pattern
    let literal: PathBuf = pattern
        .components()
        .take_while(|component| !is_glob_component(component))
        .collect();
    let depth = pattern.components().count() - literal.components().count();
    let root = if literal.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        literal
    };

    let mut builder = WalkBuilder::new(&root);
    builder.standard_filters(false);
    if !pattern.to_string_lossy().contains("**") {
        builder.max_depth(Some(depth));
    }

    debug!(pattern = ?pattern, root = ?root, "Expanding glob");

    let matches = builder
        .build()
        .filter_map(Result::ok)
        .map(DirEntry::into_path)
        .filter(|path| matcher.is_match(path.strip_prefix(".").unwrap_or(path.as_path())))
        .sorted()
        .collect_vec();

    trace!(matches = ?matches, "Glob expanded");

    Ok(matches)
}

fn is_glob_component(component: &Component) -> bool {
    component
        .as_os_str()
        .to_string_lossy()
        .contains(|c: char| matches!(c, '*' | '?' | '[' | '{'))
}
