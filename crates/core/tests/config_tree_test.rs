//! Integration tests for the configuration tree and the plugin lifecycle

use modbuild_core::config::{ConfigTree, KeySpec, PluginConfig, SectionType, Settings, ValueKind};
use modbuild_core::{ConfigView, Error, Pipeline, Plugin, PluginRegistry, Result};
use std::path::PathBuf;

static A_KEYS: [KeySpec; 1] = [KeySpec::new("x", ValueKind::Int)];
static A: SectionType = SectionType::new("a", &A_KEYS);
static B_KEYS: [KeySpec; 1] = [KeySpec::new("y", ValueKind::Int)];
static B: SectionType = SectionType::new("b", &B_KEYS);

struct First;

impl Plugin for First {
    fn name(&self) -> &str {
        "a"
    }

    fn init(&self, config: &mut PluginConfig<'_>) -> Result<()> {
        config.get_or_create("a", &A)?;
        config.set_default("a.x", 1)
    }

    fn execute(&self, _config: &ConfigView<'_>) -> Result<i32> {
        Ok(0)
    }
}

struct Second;

impl Plugin for Second {
    fn name(&self) -> &str {
        "b"
    }

    fn init(&self, config: &mut PluginConfig<'_>) -> Result<()> {
        config.get_or_create("b", &B).map(|_| ())
    }

    fn configure(&self, config: &mut PluginConfig<'_>) -> Result<()> {
        config.derive("b.y", "a.x", |x: i64| x + 1)
    }

    fn execute(&self, config: &ConfigView<'_>) -> Result<i32> {
        let y: i64 = config.get("b.y")?;
        Ok(if y > 0 { 0 } else { 1 })
    }
}

fn pipeline() -> Pipeline {
    let mut registry = PluginRegistry::new();
    registry.register(Second);
    registry.register(First);
    Pipeline::new(registry)
}

#[test]
fn test_derived_value_follows_its_source() {
    let mut tree = ConfigTree::new();
    pipeline().setup(&mut tree, &Settings::new()).unwrap();
    assert_eq!(tree.get::<i64>("b.y").unwrap(), 2);

    tree.set("a.x", 5).unwrap();
    assert_eq!(tree.get::<i64>("b.y").unwrap(), 6);
}

#[test]
fn test_settings_land_between_init_and_configure() {
    let mut tree = ConfigTree::new();
    let settings = Settings::from_toml_str("[a]\nx = 10\n").unwrap();
    let code = pipeline().run(&mut tree, &settings, &["a", "b"]).unwrap();
    assert_eq!(code, 0);
    assert_eq!(tree.get::<i64>("b.y").unwrap(), 11);
}

#[test]
fn test_set_then_get_round_trips() {
    let mut tree = ConfigTree::new();
    pipeline().setup(&mut tree, &Settings::new()).unwrap();
    for value in [-3, 0, 42] {
        tree.set("a.x", value).unwrap();
        assert_eq!(tree.get::<i64>("a.x").unwrap(), i64::from(value));
    }
    tree.set("b.y", 7).unwrap();
    assert_eq!(tree.get::<i64>("b.y").unwrap(), 7);
}

#[test]
fn test_read_only_and_frozen_sections_reject_writes() {
    let mut tree = ConfigTree::new();
    pipeline().setup(&mut tree, &Settings::new()).unwrap();

    assert!(matches!(
        tree.set("a.undeclared", 1),
        Err(Error::FrozenKey { .. })
    ));
    tree.mark_read_only("a").unwrap();
    assert!(matches!(tree.set("a.x", 2), Err(Error::ReadOnly(_))));
    assert_eq!(tree.get::<i64>("a.x").unwrap(), 1);
}

#[test]
fn test_plugins_only_write_their_own_namespace() {
    let mut tree = ConfigTree::new();
    pipeline().setup(&mut tree, &Settings::new()).unwrap();
    let mut config = tree.as_checked("b");
    assert!(matches!(
        config.set("a.x", 3),
        Err(Error::Permission { .. })
    ));
    assert_eq!(config.get::<i64>("a.x").unwrap(), 1);
}

#[test]
fn test_duplicate_is_independent() {
    let mut tree = ConfigTree::new();
    pipeline().setup(&mut tree, &Settings::new()).unwrap();
    let mut copy = tree.duplicate();

    tree.set("a.x", 20).unwrap();
    assert_eq!(copy.get::<i64>("b.y").unwrap(), 2);
    assert_eq!(tree.get::<i64>("b.y").unwrap(), 21);

    copy.set("a.x", 100).unwrap();
    assert_eq!(copy.get::<i64>("b.y").unwrap(), 101);
    assert_eq!(tree.get::<i64>("b.y").unwrap(), 21);
}

#[test]
fn test_missing_keys() {
    let mut tree = ConfigTree::new();
    pipeline().setup(&mut tree, &Settings::new()).unwrap();
    assert!(matches!(tree.get::<i64>("c.z"), Err(Error::NoSuchKey(_))));
    assert_eq!(tree.get_opt::<i64>("c.z").unwrap(), None);
    assert!(matches!(
        tree.get::<PathBuf>("a.x"),
        Err(Error::TypeMismatch { .. })
    ));
}

#[test]
fn test_rendering_evaluates_derivations() {
    let mut tree = ConfigTree::new();
    pipeline().setup(&mut tree, &Settings::new()).unwrap();
    let flat: Vec<(String, String)> = tree
        .flatten()
        .into_iter()
        .map(|(key, value)| (key, value.unwrap().to_string()))
        .collect();
    assert_eq!(
        flat,
        vec![
            ("a.x".to_string(), "1".to_string()),
            ("b.y".to_string(), "2".to_string()),
        ]
    );
    assert!(tree.to_string().contains('2'));
}
