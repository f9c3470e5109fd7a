use super::{
    assignments::Assignments,
    logging::{Level, Logger, LoggerConfig, Sink},
    register_types,
    solutions::{Solution, Solutions},
    users::{User, UserUpdate, Users},
    Component, RecordError,
};
use crate::{config::Config, store::JsonFile};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn john(id: Option<&str>, index: usize) -> User {
    User::new(
        id,
        "John",
        format!("Doe{index}"),
        format!("john.doe{index}@email.domain"),
    )
}

fn create_users(path: &Path, count: usize) {
    register_types();

    let mut users = Users::default();
    for index in 1..=count {
        users.add(john(Some(index.to_string().as_str()), index).with_external_id(format!("eid{index}")));
    }
    JsonFile::new(path).save(&users, false).unwrap();
}

fn load_users(path: &Path) -> Users {
    let mut users = Users::default();
    JsonFile::new(path).load(&mut users, false, false).unwrap();
    users
}

#[test]
pub fn users_round_trip() {
    register_types();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.json");

    let mut file = JsonFile::new(&path);
    assert!(!file.exists());

    let mut users = Users::default();
    let id = users.add(john(Some("42"), 1).with_external_id("forty-two"));
    assert_eq!(id, "42");
    assert_eq!(users.len(), 1);
    assert_eq!(users.get("42").unwrap().email, "john.doe1@email.domain");
    file.save(&users, false).unwrap();
    assert!(file.exists());

    let restored = load_users(&path);
    assert_eq!(restored.len(), 1);
    assert_eq!(restored.get("42"), users.get("42"));
    assert_eq!(
        restored.get_by_external_id("forty-two").and_then(|user| user.id.as_deref()),
        Some("42")
    );
}

#[test]
pub fn user_ids_may_look_like_emails() {
    register_types();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.json");

    let mut users = Users::default();
    users.add(john(Some("jd@uni.cz"), 1).with_external_id("jd@ext"));
    JsonFile::new(&path).save(&users, false).unwrap();

    let restored = load_users(&path);
    assert_eq!(restored.len(), 1);
    assert_eq!(restored.get("jd@uni.cz"), users.get("jd@uni.cz"));
    assert!(restored.get_by_external_id("jd@ext").is_some());
}

#[test]
pub fn generated_ids_start_at_zero() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.json");
    create_users(&path, 0);

    let mut users = load_users(&path);
    let id = users.add(john(None, 1));
    assert_eq!(id, "0");
    assert_eq!(users.add(john(None, 2)), "1");
}

#[test]
pub fn generated_ids_follow_loaded_ones() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.json");
    create_users(&path, 2);

    let mut file = JsonFile::new(&path);
    let mut users = Users::default();
    file.load(&mut users, true, true).unwrap();
    let id = users.add(john(None, 3));
    assert_eq!(id, "3");
    file.save(&users, false).unwrap();

    let restored = load_users(&path);
    assert_eq!(restored.len(), 3);
    assert_eq!(restored.get(&id), users.get(&id));
}

#[test]
pub fn existing_user_is_not_replaced() {
    let mut users = Users::default();
    users.add(john(Some("1"), 1).with_external_id("eid1"));

    assert_eq!(users.add(john(Some("1"), 5)), "1");
    assert_eq!(users.add(john(None, 6).with_external_id("eid1")), "1");
    assert_eq!(users.len(), 1);
    assert_eq!(users.get("1").unwrap().last_name, "Doe1");
}

#[test]
pub fn update_user() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.json");
    create_users(&path, 3);

    let update = UserUpdate {
        external_id: Some("foo".to_string()),
        first_name: Some("Jane".to_string()),
        last_name: Some("Smith".to_string()),
        email: None,
    };

    let mut file = JsonFile::new(&path);
    let mut users = Users::default();
    file.load(&mut users, true, true).unwrap();
    assert!(!users.get("2").unwrap().matches(&update));
    users.update("2", update.clone()).unwrap();
    assert_eq!(users.len(), 3);
    file.save(&users, false).unwrap();

    let restored = load_users(&path);
    let user = restored.get("2").unwrap();
    assert_eq!(user.external_id.as_deref(), Some("foo"));
    assert_eq!(user.first_name, "Jane");
    assert_eq!(user.last_name, "Smith");
    assert_eq!(user.email, "john.doe2@email.domain");
    assert!(user.matches(&update));

    assert!(restored.get_by_external_id("eid2").is_none());
    assert_eq!(restored.get_by_external_id("foo"), Some(user));
}

#[test]
pub fn update_unknown_user_fails() {
    let mut users = Users::default();

    assert_eq!(
        users.update("7", UserUpdate::default()),
        Err(RecordError::UnknownUser("7".to_string()))
    );
}

#[test]
pub fn remove_user() {
    let mut users = Users::default();
    users.add(john(Some("1"), 1).with_external_id("eid1"));

    assert_eq!(users.remove("2"), None);
    let removed = users.remove("1").unwrap();
    assert_eq!(removed.last_name, "Doe1");
    assert!(users.is_empty());
    assert!(users.get_by_external_id("eid1").is_none());
}

#[test]
pub fn user_ids_are_trimmed() {
    assert_eq!(john(Some(" 7 "), 1).id.as_deref(), Some("7"));
    assert_eq!(john(Some("  "), 1).id, None);
}

#[test]
pub fn solutions_round_trip() {
    register_types();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("solutions.json");

    let mut solutions = Solutions::default();
    let first = solutions
        .add(Solution::new("1", "hello").with_external_id("upload-1"))
        .unwrap();
    assert_eq!(first.as_deref(), Some("0"));
    let second = solutions.add(Solution::new("2", "hello").with_id("10")).unwrap();
    assert_eq!(second.as_deref(), Some("10"));
    assert_eq!(solutions.add(Solution::new("3", "hello").with_id("10")).unwrap(), None);

    JsonFile::new(&path).save(&solutions, false).unwrap();

    let mut restored = Solutions::default();
    JsonFile::new(&path).load(&mut restored, false, false).unwrap();
    assert_eq!(restored, solutions);
    assert_eq!(
        restored.get_by_external_id("upload-1").and_then(|solution| solution.id.as_deref()),
        Some("0")
    );
    assert_eq!(restored.add(Solution::new("4", "hello")).unwrap().as_deref(), Some("11"));
}

#[test]
pub fn solutions_need_references() {
    let mut solutions = Solutions::default();

    let mut solution = Solution::new("1", "hello");
    solution.assignment_id = None;
    assert_eq!(
        solutions.add(solution),
        Err(RecordError::MissingReference("assignment"))
    );
    assert_eq!(
        solutions.add(Solution::default()),
        Err(RecordError::MissingReference("user"))
    );
    assert!(solutions.is_empty());
}

#[test]
pub fn assignments_from_config() {
    let schema = Assignments::config_schema();
    let document: Value = serde_yaml::from_str(
        r#"
hello:
  builds:
    default:
      overlay: ./overlay
      run: [[make, all], "make install"]
  tests:
    small:
      build: default
      inputs: [data/small.txt]
"#,
    )
    .unwrap();

    let mut errors = Vec::new();
    assert!(schema.validate(&document, "/opt/eval/config.yaml", &mut errors));

    let loaded = schema.load(&document, "/opt/eval/config.yaml", None).unwrap();
    let mut tree = serde_yaml::Mapping::new();
    tree.insert(Value::from(Assignments::KEY), loaded);
    let assignments = Assignments::from_config(&Config::new(Value::Mapping(tree))).unwrap();

    assert_eq!(assignments.len(), 1);
    let hello = assignments.get("hello").unwrap();
    let build = hello.build_of("small").unwrap();
    assert_eq!(build.overlay, Some(PathBuf::from("/opt/eval/overlay")));
    assert_eq!(
        build.run,
        [
            vec!["make".to_string(), "all".to_string()],
            vec!["make install".to_string()],
        ]
    );
    assert_eq!(
        hello.tests["small"].inputs,
        [PathBuf::from("/opt/eval/data/small.txt")]
    );
}

#[test]
pub fn logger_config() {
    let schema = Logger::config_schema();
    let loaded = schema
        .load(
            &serde_yaml::from_str::<Value>("{level: DEBUG, sink: logs/eval.log}").unwrap(),
            "/opt/eval/config.yaml",
            None,
        )
        .unwrap();
    let config: LoggerConfig = serde_yaml::from_value(loaded).unwrap();

    assert_eq!(config.level, Level::Debug);
    assert!(config.ansi);
    assert_eq!(config.sink(), Sink::File(PathBuf::from("/opt/eval/logs/eval.log")));

    let loaded = schema
        .load(
            &serde_yaml::from_str::<Value>("{sink: '@stdout'}").unwrap(),
            "/opt/eval/config.yaml",
            None,
        )
        .unwrap();
    let config: LoggerConfig = serde_yaml::from_value(loaded).unwrap();
    assert_eq!(config.level, Level::Info);
    assert_eq!(config.sink(), Sink::Stdout);

    assert_eq!(LoggerConfig::default().sink(), Sink::Stderr);
}
