use clap::Parser;
use hpc_eval::{
    commands::{report, Cli, CommandError},
    config::ConfigErrors,
    components::{self, users::Users},
    store::JsonFile,
};
use std::{fs, io, path::Path};
use tempfile::TempDir;

fn setup() -> TempDir {
    components::register_types();

    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("config.yaml"),
        "
users:
  file: ./users.json
logger:
  level: DEBUG
",
    )
    .unwrap();
    dir
}

fn run(dir: &Path, args: &[&str]) -> Result<(), CommandError> {
    let config = dir.join("config.yaml");
    let mut argv = vec!["hpc-eval", "--config", config.to_str().unwrap()];
    argv.extend_from_slice(args);

    let cli = Cli::try_parse_from(argv).unwrap();
    let loader = components::config_loader().unwrap();
    let config = cli.load_config(&loader)?;

    cli.command.execute(&loader, &config)
}

fn stored_users(dir: &Path) -> Users {
    let mut users = Users::default();
    JsonFile::new(dir.join("users.json"))
        .load(&mut users, false, false)
        .unwrap();
    users
}

const JOHN: [&str; 6] = [
    "--first-name",
    "John",
    "--last-name",
    "Doe",
    "--email",
    "john.doe@email.domain",
];

#[test]
fn add_user_creates_store() {
    let dir = setup();

    let mut args = vec!["add-user", "--external-id", "jd"];
    args.extend(JOHN);
    run(dir.path(), &args).unwrap();

    let users = stored_users(dir.path());
    assert_eq!(users.len(), 1);
    let user = users.get_by_external_id("jd").unwrap();
    assert_eq!(user.id.as_deref(), Some("0"));
    assert_eq!(user.email, "john.doe@email.domain");
}

#[test]
fn add_user_requires_update_flag() {
    let dir = setup();

    let mut args = vec!["add-user", "--id", "7"];
    args.extend(JOHN);
    run(dir.path(), &args).unwrap();
    // same data, nothing to do
    run(dir.path(), &args).unwrap();

    let changed = [
        "add-user",
        "--id",
        "7",
        "--first-name",
        "Jane",
        "--last-name",
        "Doe",
        "--email",
        "jane.doe@email.domain",
    ];
    assert!(matches!(
        run(dir.path(), &changed),
        Err(CommandError::UserExists(id)) if id == "7"
    ));
    assert_eq!(stored_users(dir.path()).get("7").unwrap().first_name, "John");

    let mut updating = changed.to_vec();
    updating.push("--update");
    run(dir.path(), &updating).unwrap();

    let users = stored_users(dir.path());
    assert_eq!(users.len(), 1);
    assert_eq!(users.get("7").unwrap().first_name, "Jane");
    assert_eq!(users.get("7").unwrap().email, "jane.doe@email.domain");
}

#[test]
fn add_user_needs_identity() {
    let mut argv = vec!["hpc-eval", "add-user"];
    argv.extend(JOHN);

    assert!(Cli::try_parse_from(argv).is_err());
    assert!(Cli::try_parse_from(["hpc-eval", "add-user", "--id", "1", "--first-name", ""]).is_err());
}

#[test]
fn listing_users_without_store() {
    let dir = setup();

    run(dir.path(), &["users"]).unwrap();
    assert!(!dir.path().join("users.json").exists());
}

#[test]
fn check_and_schema() {
    let dir = setup();

    run(dir.path(), &["check"]).unwrap();
    run(dir.path(), &["--strict", "schema"]).unwrap();
}

#[test]
fn strict_mode_reports_invalid_config() {
    let dir = setup();
    fs::write(dir.path().join("config.yaml"), "logger: {level: LOUD}").unwrap();

    assert!(run(dir.path(), &["check"]).is_ok());
    assert!(matches!(
        run(dir.path(), &["--strict", "check"]),
        Err(CommandError::Config(_))
    ));
}

#[test]
fn report_lists_error_chain() {
    let err = CommandError::Config(ConfigErrors::Read {
        path: "config.yaml".into(),
        source: io::Error::new(io::ErrorKind::NotFound, "missing"),
    });

    let message = report(&err);
    assert!(message.starts_with("Configuration could not be loaded: "), "{message}");
    assert!(message.ends_with(": missing"), "{message}");
}
