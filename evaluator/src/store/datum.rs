//! Dynamic values exchanged between persisted objects and the codec.
//!
//! A [`Serializable`] object exposes its persisted state as [`Attributes`], a map of attribute
//! names to [`Datum`] values. Leaves are limited to null, booleans, integers, floats and strings;
//! lists, string keyed maps and nested serializable objects may be combined freely.

use super::SerializationError;
use std::{any::Any, collections::BTreeMap, fmt};

pub type Attributes = BTreeMap<String, Datum>;

/// Object safe helpers every `Serializable` gets for free (cloning, comparison and downcasting
/// of boxed objects)
pub trait Erased: Any {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn clone_boxed(&self) -> Box<dyn Serializable>;
    fn eq_dyn(&self, other: &dyn Serializable) -> bool;
}

impl<T> Erased for T
where
    T: Serializable + Clone + PartialEq,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_boxed(&self) -> Box<dyn Serializable> {
        Box::new(self.clone())
    }

    fn eq_dyn(&self, other: &dyn Serializable) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }
}

/// An object whose public state can be persisted and restored.
///
/// Types that appear nested inside other objects must also be registered with
/// [`super::registry::register`] so they can be rebuilt from their type tag.
pub trait Serializable: Erased + fmt::Debug {
    /// Stable identifier of the concrete type, written next to nested instances
    fn type_tag(&self) -> &'static str;

    /// Persisted state. Internal fields (caches, indices, file handles) are left out.
    fn attributes(&self) -> Attributes;

    /// Replace one attribute with a deserialized value. Names that are not attributes are ignored.
    fn set_attribute(&mut self, name: &str, value: Datum) -> Result<(), SerializationError>;

    /// Called after all attributes were restored, e.g. to rebuild internal indices
    fn deserialized(&mut self) {}
}

#[derive(Debug, Default)]
pub enum Datum {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Datum>),
    Map(BTreeMap<String, Datum>),
    Object(Box<dyn Serializable>),
}

impl Datum {
    pub fn object<T: Serializable>(object: T) -> Self {
        Self::Object(Box::new(object))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// type name used in error messages and type checks, nested objects report their tag
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Object(object) => object.type_tag(),
        }
    }

    /// Take the concrete object out of an `Object` value
    pub fn into_object<T: Serializable>(self) -> Result<T, SerializationError> {
        match self {
            Self::Object(object) => {
                let given = object.type_tag();
                object
                    .into_any()
                    .downcast::<T>()
                    .map(|object| *object)
                    .map_err(|_| SerializationError::UnexpectedValue {
                        expected: std::any::type_name::<T>(),
                        given: given.to_string(),
                    })
            }
            other => Err(other.unexpected(std::any::type_name::<T>())),
        }
    }

    fn unexpected(&self, expected: &'static str) -> SerializationError {
        SerializationError::UnexpectedValue {
            expected,
            given: self.type_name().to_string(),
        }
    }
}

impl Clone for Datum {
    fn clone(&self) -> Self {
        match self {
            Self::Null => Self::Null,
            Self::Bool(value) => Self::Bool(*value),
            Self::Integer(value) => Self::Integer(*value),
            Self::Float(value) => Self::Float(*value),
            Self::String(value) => Self::String(value.clone()),
            Self::List(items) => Self::List(items.clone()),
            Self::Map(map) => Self::Map(map.clone()),
            Self::Object(object) => Self::Object(object.clone_boxed()),
        }
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.eq_dyn(&**b),
            _ => false,
        }
    }
}

impl From<bool> for Datum {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for Datum {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Datum>> From<Vec<T>> for Datum {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Datum>> From<BTreeMap<String, T>> for Datum {
    fn from(map: BTreeMap<String, T>) -> Self {
        Self::Map(map.into_iter().map(|(key, value)| (key, value.into())).collect())
    }
}

/// Conversion of a deserialized value back into a typed attribute
pub trait FromDatum: Sized {
    fn from_datum(datum: Datum) -> Result<Self, SerializationError>;
}

impl FromDatum for Datum {
    fn from_datum(datum: Datum) -> Result<Self, SerializationError> {
        Ok(datum)
    }
}

impl FromDatum for bool {
    fn from_datum(datum: Datum) -> Result<Self, SerializationError> {
        match datum {
            Datum::Bool(value) => Ok(value),
            other => Err(other.unexpected("bool")),
        }
    }
}

impl FromDatum for i64 {
    fn from_datum(datum: Datum) -> Result<Self, SerializationError> {
        match datum {
            Datum::Integer(value) => Ok(value),
            other => Err(other.unexpected("integer")),
        }
    }
}

impl FromDatum for f64 {
    fn from_datum(datum: Datum) -> Result<Self, SerializationError> {
        match datum {
            Datum::Float(value) => Ok(value),
            other => Err(other.unexpected("float")),
        }
    }
}

impl FromDatum for String {
    fn from_datum(datum: Datum) -> Result<Self, SerializationError> {
        match datum {
            Datum::String(value) => Ok(value),
            other => Err(other.unexpected("string")),
        }
    }
}

impl<T: FromDatum> FromDatum for Option<T> {
    fn from_datum(datum: Datum) -> Result<Self, SerializationError> {
        match datum {
            Datum::Null => Ok(None),
            other => T::from_datum(other).map(Some),
        }
    }
}

impl<T: FromDatum> FromDatum for Vec<T> {
    fn from_datum(datum: Datum) -> Result<Self, SerializationError> {
        match datum {
            Datum::List(items) => items.into_iter().map(T::from_datum).collect(),
            other => Err(other.unexpected("list")),
        }
    }
}

impl<T: FromDatum> FromDatum for BTreeMap<String, T> {
    fn from_datum(datum: Datum) -> Result<Self, SerializationError> {
        match datum {
            Datum::Map(map) => map
                .into_iter()
                .map(|(key, value)| T::from_datum(value).map(|value| (key, value)))
                .collect(),
            other => Err(other.unexpected("map")),
        }
    }
}
