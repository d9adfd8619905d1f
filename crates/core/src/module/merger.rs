//! Merging a module with its test counterpart

use super::descriptor::{ModuleDescriptor, RequiresModifier};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

/// Merge a library module and its test module into one descriptor.
///
/// - the result is open if either side is open
/// - a module required by both sides is transitive if either side says so
///   and static only if both sides do; mandated and synthetic modifiers
///   are dropped
/// - an export or open without targets on either side stays unrestricted,
///   otherwise the targets are unioned
/// - packages, uses and provides are unioned
///
/// Name, version and main class come from `source`, falling back to `test`.
pub fn merge(source: &ModuleDescriptor, test: &ModuleDescriptor) -> ModuleDescriptor {
    let mut merged = ModuleDescriptor::new(source.name())
        .with_open(source.is_open() || test.is_open())
        .with_packages(source.packages().iter().chain(test.packages()).cloned());

    if let Some(version) = source.version().or(test.version()) {
        merged = merged.with_version(version);
    }
    if let Some(main_class) = source.main_class().or(test.main_class()) {
        merged = merged.with_main_class(main_class);
    }

    for (module, modifiers) in merge_requires(source, test) {
        merged = merged.with_requires(module, modifiers);
    }
    for (package, targets) in merge_targets(source.exports(), test.exports()) {
        merged = merged.with_exports_to(package, targets);
    }
    for (package, targets) in merge_targets(source.opens(), test.opens()) {
        merged = merged.with_opens_to(package, targets);
    }
    for service in source.uses().iter().chain(test.uses()) {
        merged = merged.with_uses(service.clone());
    }
    for descriptor in [source, test] {
        for (service, providers) in descriptor.provides() {
            merged = merged.with_provides(service.clone(), providers.iter().cloned());
        }
    }
    merged
}

fn merge_requires(
    source: &ModuleDescriptor,
    test: &ModuleDescriptor,
) -> BTreeMap<String, BTreeSet<RequiresModifier>> {
    let keep = |modifiers: &BTreeSet<RequiresModifier>| -> BTreeSet<RequiresModifier> {
        modifiers
            .iter()
            .copied()
            .filter(|m| matches!(m, RequiresModifier::Transitive | RequiresModifier::Static))
            .collect()
    };

    let mut merged: BTreeMap<String, BTreeSet<RequiresModifier>> = source
        .requires()
        .iter()
        .map(|(module, modifiers)| (module.clone(), keep(modifiers)))
        .collect();

    for (module, modifiers) in test.requires() {
        let theirs = keep(modifiers);
        let Some(ours) = merged.get_mut(module) else {
            merged.insert(module.clone(), theirs);
            continue;
        };
        let transitive = ours.contains(&RequiresModifier::Transitive)
            || theirs.contains(&RequiresModifier::Transitive);
        let is_static = ours.contains(&RequiresModifier::Static)
            && theirs.contains(&RequiresModifier::Static);
        ours.clear();
        if transitive {
            ours.insert(RequiresModifier::Transitive);
        }
        if is_static {
            ours.insert(RequiresModifier::Static);
        }
    }
    merged
}

fn merge_targets(
    ours: &BTreeMap<String, BTreeSet<String>>,
    theirs: &BTreeMap<String, BTreeSet<String>>,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut merged = ours.clone();
    for (package, targets) in theirs {
        match merged.get_mut(package) {
            // an empty target set means "to everyone"
            Some(existing) if existing.is_empty() => {}
            Some(_) if targets.is_empty() => {
                merged.insert(package.clone(), BTreeSet::new());
            }
            Some(existing) => existing.extend(targets.iter().cloned()),
            None => {
                merged.insert(package.clone(), targets.clone());
            }
        }
    }
    merged
}

/// Render a descriptor as a `module-info.java` compilation unit.
///
/// Directives are grouped (requires, exports, opens, uses, provides) and
/// sorted by name; mandated and synthetic modifiers have no source form and
/// are omitted.
pub fn render_source(descriptor: &ModuleDescriptor) -> String {
    let mut groups: Vec<Vec<String>> = Vec::new();

    groups.push(
        descriptor
            .requires()
            .iter()
            .map(|(module, modifiers)| {
                let mut line = String::from("requires ");
                if modifiers.contains(&RequiresModifier::Transitive) {
                    line.push_str("transitive ");
                }
                if modifiers.contains(&RequiresModifier::Static) {
                    line.push_str("static ");
                }
                line.push_str(module);
                line.push(';');
                line
            })
            .collect(),
    );
    groups.push(render_targets("exports", descriptor.exports()));
    groups.push(render_targets("opens", descriptor.opens()));
    groups.push(
        descriptor
            .uses()
            .iter()
            .map(|service| format!("uses {service};"))
            .collect(),
    );
    groups.push(
        descriptor
            .provides()
            .iter()
            .map(|(service, providers)| format!("provides {service} with {};", providers.join(", ")))
            .collect(),
    );

    let mut out = String::new();
    if descriptor.is_open() {
        out.push_str("open ");
    }
    let _ = writeln!(out, "module {} {{", descriptor.name());
    let mut first = true;
    for group in groups.into_iter().filter(|group| !group.is_empty()) {
        if !first {
            out.push('\n');
        }
        first = false;
        for line in group {
            let _ = writeln!(out, "  {line}");
        }
    }
    out.push_str("}\n");
    out
}

fn render_targets(keyword: &str, entries: &BTreeMap<String, BTreeSet<String>>) -> Vec<String> {
    entries
        .iter()
        .map(|(package, targets)| {
            if targets.is_empty() {
                format!("{keyword} {package};")
            } else {
                let targets: Vec<_> = targets.iter().map(String::as_str).collect();
                format!("{keyword} {package} to {};", targets.join(", "))
            }
        })
        .collect()
}
