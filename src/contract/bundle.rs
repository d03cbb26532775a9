//! Contract export/import bundles.
//!
//! A bundle is a zip archive holding `context.toml` and one entry per save
//! file referenced by the exported contexts. `context.toml` lists the
//! exported sub-paths under `contexts` and carries each subtree with its
//! placeholders intact.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::context::path::split_key;
use crate::context::State;
use crate::types::{GuardianError, Result};

pub const BUNDLE_CONTEXT: &str = "context.toml";
const CONTEXTS: &str = "contexts";

/// Export the `paths` below `prefix` and their save files into `archive`
pub fn export_bundle(state: &State, prefix: &str, paths: &[&str], archive: &Path) -> Result<()> {
    let root = split_key(prefix);
    let mut exported = toml::Table::new();
    exported.insert(
        CONTEXTS.into(),
        toml::Value::Array(paths.iter().map(|p| toml::Value::from(*p)).collect()),
    );
    exported.insert("initialized".into(), toml::Value::Boolean(true));

    let mut save_files = BTreeSet::new();
    for path in paths {
        let mut full = root.clone();
        full.extend(split_key(path));
        let subtree = state
            .raw_at(&full)?
            .ok_or_else(|| GuardianError::resolution(full.join("."), "no such context to export"))?;
        collect_save_files(&subtree, &mut save_files);
        insert_at(&mut exported, &split_key(path), subtree)?;
    }

    for save_file in &save_files {
        check_save_file_name(save_file)?;
    }

    let cache_dir = state.contract_cache_dir();
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(File::create(archive)?);

    writer.start_file(BUNDLE_CONTEXT, options)?;
    writer.write_all(toml::to_string(&exported)?.as_bytes())?;

    for save_file in &save_files {
        let bytes = std::fs::read(cache_dir.join(save_file)).map_err(|e| {
            GuardianError::Platform(format!("unable to read save file {}: {}", save_file, e))
        })?;
        writer.start_file(save_file.as_str(), options)?;
        writer.write_all(&bytes)?;
        debug!(save_file = %save_file, "Added save file to bundle");
    }
    writer.finish()?;

    info!(archive = %archive.display(), prefix, contexts = paths.len(), save_files = save_files.len(), "Exported contract bundle");
    Ok(())
}

/// Write the bundle's `context.toml` to `context_file` and extract its save
/// files into the contract cache. Returns the imported context table.
pub fn import_bundle(state: &State, archive: &Path, context_file: &Path) -> Result<toml::Table> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;

    let mut text = String::new();
    zip.by_name(BUNDLE_CONTEXT)
        .map_err(|_| GuardianError::Validation(format!("{} has no {}", archive.display(), BUNDLE_CONTEXT)))?
        .read_to_string(&mut text)?;
    let imported: toml::Table = toml::from_str(&text)?;

    let mut save_files = BTreeSet::new();
    collect_save_files(&toml::Value::Table(imported.clone()), &mut save_files);
    for save_file in &save_files {
        check_save_file_name(save_file)?;
    }

    if let Some(parent) = context_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(context_file, &text)?;

    let cache_dir = state.contract_cache_dir();
    std::fs::create_dir_all(&cache_dir)?;
    for save_file in &save_files {
        let mut entry = zip.by_name(save_file).map_err(|_| {
            GuardianError::Validation(format!("bundle is missing save file {}", save_file))
        })?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        std::fs::write(cache_dir.join(save_file), bytes)?;
    }

    info!(archive = %archive.display(), context_file = %context_file.display(), save_files = save_files.len(), "Imported contract bundle");
    Ok(imported)
}

/// Literal `save_file` strings and `token_save_file_list` entries below `value`
fn collect_save_files(value: &toml::Value, found: &mut BTreeSet<String>) {
    let toml::Value::Table(table) = value else {
        return;
    };
    for (key, child) in table {
        match (key.as_str(), child) {
            ("save_file", toml::Value::String(name)) if is_literal(name) => {
                found.insert(name.clone());
            }
            ("token_save_file_list", toml::Value::Array(names)) => {
                found.extend(names.iter().filter_map(|n| n.as_str()).filter(|n| is_literal(n)).map(str::to_string));
            }
            (_, toml::Value::Table(_)) => collect_save_files(child, found),
            _ => {}
        }
    }
}

/// Save files live directly in the contract cache
fn check_save_file_name(name: &str) -> Result<()> {
    if Path::new(name).file_name() == Some(OsStr::new(name)) {
        Ok(())
    } else {
        Err(GuardianError::Validation(format!("invalid save file name {}", name)))
    }
}

fn is_literal(text: &str) -> bool {
    !text.contains("${") && !text.contains("@{")
}

fn insert_at(table: &mut toml::Table, path: &[String], value: toml::Value) -> Result<()> {
    let (last, parents) = path
        .split_last()
        .ok_or_else(|| GuardianError::Config("empty export path".into()))?;
    let mut current = table;
    for key in parents {
        let next = current
            .entry(key.clone())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        current = next
            .as_table_mut()
            .ok_or_else(|| GuardianError::Config(format!("export path {} crosses a value", key)))?;
    }
    current.insert(last.clone(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    fn state_in(dir: &Path) -> State {
        State::new(ClientConfig {
            data_dir: dir.to_path_buf(),
            ..ClientConfig::default()
        })
    }

    #[test]
    fn test_export_then_import() {
        let source_dir = tempfile::tempdir().unwrap();
        let state = state_in(source_dir.path());
        let context = state.context("token.t1");
        context.set("token_issuer.save_file", "token_issuer_1.pdo").unwrap();
        context.set("token_issuer.identity", "${..identity}").unwrap();
        context.set("guardian.save_file", "guardian_2.pdo").unwrap();
        context.set("asset_type.save_file", "asset_type_3.pdo").unwrap();

        let cache = state.contract_cache_dir();
        std::fs::create_dir_all(&cache).unwrap();
        std::fs::write(cache.join("token_issuer_1.pdo"), b"issuer").unwrap();
        std::fs::write(cache.join("guardian_2.pdo"), b"guardian").unwrap();

        let archive = source_dir.path().join("bundle.zip");
        export_bundle(&state, "token.t1", &["token_issuer", "guardian"], &archive).unwrap();

        let target_dir = tempfile::tempdir().unwrap();
        let target = state_in(target_dir.path());
        let context_file = target_dir.path().join("imported.toml");
        let imported = import_bundle(&target, &archive, &context_file).unwrap();

        assert_eq!(imported["initialized"].as_bool(), Some(true));
        assert_eq!(imported[CONTEXTS].as_array().unwrap().len(), 2);
        assert!(imported.get("asset_type").is_none());
        assert_eq!(imported["token_issuer"]["identity"].as_str(), Some("${..identity}"));

        let cache = target.contract_cache_dir();
        assert_eq!(std::fs::read(cache.join("guardian_2.pdo")).unwrap(), b"guardian");
        assert!(!cache.join("asset_type_3.pdo").exists());
        assert!(context_file.is_file());
    }

    #[test]
    fn test_export_missing_save_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        state.context("p").set("issuer.save_file", "issuer_9.pdo").unwrap();

        let result = export_bundle(&state, "p", &["issuer"], &dir.path().join("b.zip"));
        assert!(matches!(result, Err(GuardianError::Platform(_))));
    }

    #[test]
    fn test_import_missing_save_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        let mut writer = ZipWriter::new(File::create(&archive).unwrap());
        writer.start_file(BUNDLE_CONTEXT, SimpleFileOptions::default()).unwrap();
        writer
            .write_all(b"contexts = [\"issuer\"]\n[issuer]\nsave_file = \"issuer_1.pdo\"\n")
            .unwrap();
        writer.finish().unwrap();

        let state = state_in(dir.path());
        let result = import_bundle(&state, &archive, &dir.path().join("ctx.toml"));
        assert!(matches!(result, Err(GuardianError::Validation(ref msg)) if msg.contains("issuer_1.pdo")));
    }

    fn bundle_with_save_file(path: &Path, save_file: &str) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        writer.start_file(BUNDLE_CONTEXT, SimpleFileOptions::default()).unwrap();
        writer
            .write_all(format!("contexts = [\"issuer\"]\n[issuer]\nsave_file = \"{}\"\n", save_file).as_bytes())
            .unwrap();
        writer.start_file(save_file, SimpleFileOptions::default()).unwrap();
        writer.write_all(b"escaped").unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_import_rejects_paths_outside_cache() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let state = state_in(&data_dir);

        for name in ["../../escaped.pdo", "../x.pdo", "nested/x.pdo", "/tmp/abs.pdo"] {
            let archive = dir.path().join("evil.zip");
            bundle_with_save_file(&archive, name);
            let context_file = dir.path().join("ctx.toml");

            let result = import_bundle(&state, &archive, &context_file);
            assert!(
                matches!(result, Err(GuardianError::Validation(ref msg)) if msg.contains("invalid save file name")),
                "{} accepted",
                name
            );
            assert!(!context_file.exists());
        }
        assert!(!dir.path().join("escaped.pdo").exists());
        assert!(!data_dir.join("x.pdo").exists());
    }

    #[test]
    fn test_export_rejects_paths_outside_cache() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        state.context("p").set("issuer.save_file", "../secret.pdo").unwrap();

        let result = export_bundle(&state, "p", &["issuer"], &dir.path().join("b.zip"));
        assert!(matches!(result, Err(GuardianError::Validation(_))));
    }

    #[test]
    fn test_collect_skips_placeholders() {
        let value: toml::Value = toml::from_str(
            r#"
            [a]
            save_file = "a_1.pdo"
            [b]
            save_file = "${..a.save_file}"
            token_save_file_list = ["t_1.pdo", "t_2.pdo"]
            "#,
        )
        .unwrap();
        let mut found = BTreeSet::new();
        collect_save_files(&value, &mut found);
        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec!["a_1.pdo", "t_1.pdo", "t_2.pdo"]);
    }
}
