pub mod codec;
pub mod datum;
pub mod json_file;
pub mod registry;

#[cfg(test)]
mod codec_test;

use crate::sync::locking::LockError;
use std::{io, path::PathBuf};
use thiserror::Error;

pub use codec::{deserialize, serialize};
pub use datum::{Attributes, Datum, FromDatum, Serializable};
pub use json_file::JsonFile;

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("Property {path} has unserializable value: {reason}")]
    Unserializable { path: String, reason: String },
    #[error("Type '{0}' is not registered for deserialization")]
    UnknownType(String),
    #[error("Deserialization type mismatch, property {name} is expected to be {expected} but {given} was given")]
    TypeMismatch {
        name: String,
        expected: String,
        given: String,
    },
    #[error("Expected {expected}, {given} was given")]
    UnexpectedValue {
        expected: &'static str,
        given: String,
    },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("No serialization file was specified")]
    NoFile,
    #[error("Unable to acquire a lock for file {0:?}")]
    LockTimeout(PathBuf),
    #[error("Failed to lock data file")]
    Lock(#[from] LockError),
    #[error("Failed to access data file")]
    Io(#[from] io::Error),
    #[error("Data file does not contain valid JSON")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}
