use super::{
    codec::{deserialize, serialize},
    datum::{Attributes, Datum, FromDatum, Serializable},
    registry, JsonFile, PersistenceError, SerializationError,
};
use serde_json::json;
use std::{collections::BTreeMap, fs, time::Duration};
use tempfile::TempDir;

const DATA1_TAG: &str = concat!(module_path!(), "::Data1");
const DATA2_TAG: &str = concat!(module_path!(), "::Data2");
const COUNTER_TAG: &str = concat!(module_path!(), "::Counter");

#[derive(Debug, Clone, Default, PartialEq)]
struct Data1 {
    a: Datum,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Data2 {
    a: Datum,
    b: Datum,
    // internal, never persisted
    _hits: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Counter {
    name: String,
    count: i64,
    ratio: f64,
    restored: bool,
}

impl Serializable for Data1 {
    fn type_tag(&self) -> &'static str {
        DATA1_TAG
    }

    fn attributes(&self) -> Attributes {
        Attributes::from([("a".to_string(), self.a.clone())])
    }

    fn set_attribute(&mut self, name: &str, value: Datum) -> Result<(), SerializationError> {
        if name == "a" {
            self.a = value;
        }
        Ok(())
    }
}

impl Serializable for Data2 {
    fn type_tag(&self) -> &'static str {
        DATA2_TAG
    }

    fn attributes(&self) -> Attributes {
        Attributes::from([
            ("a".to_string(), self.a.clone()),
            ("b".to_string(), self.b.clone()),
        ])
    }

    fn set_attribute(&mut self, name: &str, value: Datum) -> Result<(), SerializationError> {
        match name {
            "a" => self.a = value,
            "b" => self.b = value,
            _ => {}
        }
        Ok(())
    }
}

impl Serializable for Counter {
    fn type_tag(&self) -> &'static str {
        COUNTER_TAG
    }

    fn attributes(&self) -> Attributes {
        Attributes::from([
            ("name".to_string(), Datum::from(self.name.clone())),
            ("count".to_string(), Datum::from(self.count)),
            ("ratio".to_string(), Datum::from(self.ratio)),
        ])
    }

    fn set_attribute(&mut self, name: &str, value: Datum) -> Result<(), SerializationError> {
        match name {
            "name" => self.name = String::from_datum(value)?,
            "count" => self.count = i64::from_datum(value)?,
            "ratio" => self.ratio = f64::from_datum(value)?,
            _ => {}
        }
        Ok(())
    }

    fn deserialized(&mut self) {
        self.restored = true;
    }
}

fn register_types() {
    registry::register::<Data1>();
    registry::register::<Data2>();
    registry::register::<Counter>();
}

fn data1(a: impl Into<Datum>) -> Datum {
    Datum::object(Data1 { a: a.into() })
}

fn data2(a: impl Into<Datum>, b: impl Into<Datum>) -> Data2 {
    Data2 {
        a: a.into(),
        b: b.into(),
        _hits: 0,
    }
}

fn map<const N: usize>(entries: [(&str, Datum); N]) -> Datum {
    Datum::Map(
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
    )
}

fn round_trip<T: Serializable + Default>(object: &T) -> T {
    let dir = TempDir::new().unwrap();
    let mut file = JsonFile::new(dir.path().join("data.json"));
    file.save(object, false).unwrap();
    assert!(!file.is_open());

    let mut restored = T::default();
    JsonFile::new(dir.path().join("data.json"))
        .load(&mut restored, false, false)
        .unwrap();
    restored
}

#[test]
pub fn scalars_round_trip() {
    let data = data2(Datum::Integer(1), "foo");
    assert_eq!(round_trip(&data), data);

    let counter = Counter {
        name: "jobs".to_string(),
        count: 7,
        ratio: 0.5,
        restored: false,
    };
    let restored = round_trip(&counter);
    assert!(restored.restored);
    assert_eq!(restored.name, "jobs");
    assert_eq!(restored.count, 7);
    assert_eq!(restored.ratio, 0.5);
}

#[test]
pub fn nested_structures_round_trip() {
    let data = data2(
        Datum::List(vec![
            Datum::from(vec![1i64, 2]),
            Datum::from(vec!["a", "b"]),
            Datum::List(vec![Datum::Bool(true), Datum::from(vec![false])]),
        ]),
        map([
            (
                "list1",
                Datum::List(vec![map([
                    ("foo", Datum::Integer(1)),
                    ("bar", Datum::Integer(2)),
                    ("nestedlist", Datum::from(vec![1i64, 2, 3])),
                ])]),
            ),
            (
                "dict1",
                map([
                    (
                        "nestedlist2",
                        Datum::List(vec![
                            Datum::from("a"),
                            Datum::from("b"),
                            Datum::Null,
                            Datum::from("c"),
                            map([]),
                        ]),
                    ),
                    ("flag", Datum::Bool(true)),
                    ("nothing", Datum::Null),
                ]),
            ),
        ]),
    );

    assert_eq!(round_trip(&data), data);
}

#[test]
pub fn objects_round_trip() {
    register_types();

    let data = data2(
        Datum::List(vec![
            data1(Datum::Integer(42)),
            Datum::object(data2("a", Datum::Integer(54))),
            map([("data", data1("str"))]),
            Datum::List(vec![data1(Datum::Integer(1))]),
        ]),
        map([
            (
                "key1",
                Datum::object(data2(data1(Datum::Integer(42)), data1(Datum::Integer(54)))),
            ),
            (
                "list",
                Datum::List(vec![data1(Datum::Integer(1)), Datum::object(data2("a", "b"))]),
            ),
        ]),
    );

    assert_eq!(round_trip(&data), data);
}

#[test]
pub fn tags_and_envelopes() {
    let data = data2(
        data1(Datum::Integer(1)),
        Datum::List(vec![
            map([("x", Datum::Integer(1))]),
            data1("y"),
            Datum::Integer(3),
        ]),
    );

    let tree = serialize(&data).unwrap();
    assert_eq!(
        tree,
        json!({
            format!("a@{DATA1_TAG}"): {"a": 1},
            "b": [
                {"type": "dict", "value": {"x": 1}},
                {"type": DATA1_TAG, "value": {"a": "y"}},
                3
            ]
        })
    );
}

#[test]
pub fn internal_fields_are_not_persisted() {
    let mut data = data2(Datum::Integer(1), Datum::Null);
    data._hits = 3;

    let tree = serialize(&data).unwrap();
    assert_eq!(tree, json!({"a": 1, "b": null}));
}

#[test]
pub fn unknown_keys_are_ignored() {
    let mut counter = Counter::default();
    deserialize(
        &mut counter,
        &json!({"name": "x", "count": 2, "ratio": 1.5, "extra": [1, 2]}),
    )
    .unwrap();

    assert_eq!(counter.name, "x");
    assert_eq!(counter.count, 2);
    assert!(counter.restored);
}

#[test]
pub fn type_mismatch_is_an_error() {
    let mut counter = Counter::default();
    let result = deserialize(&mut counter, &json!({"count": "many"}));

    assert!(matches!(
        result,
        Err(SerializationError::TypeMismatch { ref name, .. }) if name == "count"
    ));
}

#[test]
pub fn unknown_type_tag_is_an_error() {
    let mut data = Data1::default();
    let result = deserialize(&mut data, &json!({"a@no::such::Type": {}}));

    assert!(matches!(result, Err(SerializationError::UnknownType(tag)) if tag == "no::such::Type"));
}

#[test]
pub fn keys_may_contain_separator() {
    register_types();

    let data = data2(
        map([
            ("jd@uni.cz", data1(Datum::Integer(1))),
            ("plain@key", Datum::Integer(2)),
            ("a@b@c", map([("x@y", Datum::from("z"))])),
        ]),
        Datum::Null,
    );

    let tree = serialize(&data).unwrap();
    assert_eq!(
        tree["a"],
        json!({
            format!("jd@uni.cz@{DATA1_TAG}"): {"a": 1},
            "plain@key": 2,
            "a@b@c": {"x@y": "z"}
        })
    );
    assert_eq!(round_trip(&data), data);
}

#[test]
pub fn non_finite_float_is_unserializable() {
    let data = data2(
        Datum::Integer(1),
        map([("inner", Datum::List(vec![Datum::Float(f64::NAN)]))]),
    );

    match serialize(&data) {
        Err(SerializationError::Unserializable { path, .. }) => assert_eq!(path, "b.inner[0]"),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
pub fn save_creates_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nonexist.json");

    let mut file = JsonFile::new(&path);
    assert!(!file.exists());
    file.save(&data2(Datum::Integer(42), Datum::Null), false).unwrap();
    assert!(file.exists());

    let mut restored = Data2::default();
    file.load(&mut restored, false, false).unwrap();
    assert_eq!(restored, data2(Datum::Integer(42), Datum::Null));
}

#[test]
pub fn save_overwrites_longer_content() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.json");
    fs::write(&path, format!("{{\"a\": \"{}\"}}", "x".repeat(128))).unwrap();

    let mut file = JsonFile::new(&path);
    file.save(&data2("short", Datum::Null), false).unwrap();

    let tree: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(tree, json!({"a": "short", "b": null}));
}

#[test]
pub fn update_holds_exclusive_lock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.json");
    fs::write(&path, r#"{"a": 1, "b": null}"#).unwrap();

    let mut file = JsonFile::new(&path);
    let mut data = Data2::default();
    file.load(&mut data, true, true).unwrap();
    assert!(file.is_exclusive());

    let mut other = JsonFile::new(&path).with_timeout(Duration::ZERO);
    assert!(!other.try_open(false).unwrap());
    assert!(matches!(
        other.load(&mut Data2::default(), false, false),
        Err(PersistenceError::LockTimeout(_))
    ));

    data.b = Datum::from("updated");
    file.save(&data, false).unwrap();
    assert!(!file.is_open());

    let mut restored = Data2::default();
    other.load(&mut restored, false, false).unwrap();
    assert_eq!(restored.b, Datum::from("updated"));
}

#[test]
pub fn update_of_missing_file_is_locked_before_read() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.json");

    let mut file = JsonFile::new(&path);
    let mut data = data2(Datum::Integer(1), Datum::Null);
    file.load(&mut data, true, true).unwrap();

    assert!(file.exists());
    assert!(file.is_exclusive());
    assert_eq!(data, data2(Datum::Integer(1), Datum::Null));

    let mut other = JsonFile::new(&path).with_timeout(Duration::ZERO);
    assert!(!other.try_open(false).unwrap());

    file.save(&data, false).unwrap();
    let mut restored = Data2::default();
    other.load(&mut restored, false, false).unwrap();
    assert_eq!(restored, data);
}

#[test]
pub fn failed_load_releases_lock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.json");
    fs::write(&path, "not json").unwrap();

    let mut file = JsonFile::new(&path);
    let result = file.load(&mut Data1::default(), true, true);
    assert!(matches!(result, Err(PersistenceError::Json(_))));
    assert!(!file.is_open());
}

#[test]
pub fn typed_attributes_convert() {
    let values = BTreeMap::from([("x".to_string(), 1i64), ("y".to_string(), 2)]);
    let datum = Datum::from(values.clone());

    assert_eq!(BTreeMap::<String, i64>::from_datum(datum).unwrap(), values);
    assert_eq!(Option::<String>::from_datum(Datum::Null).unwrap(), None);
    assert!(i64::from_datum(Datum::from("1")).is_err());
}
