use super::{find_package, json_pretty, Session, EXIT_SUCCESS};
use modorder_core::{diff_trees, Action, Catalog, Engine, Outcome, UserDataStore};
use modorder_schema::{PackageId, DESCRIPTOR_PATH};

fn store(engine: &Engine) -> Result<&UserDataStore, String> {
    engine
        .user_data()
        .ok_or_else(|| "no user data directory configured".to_owned())
}

/// The recorded source of `id`.
fn source_of(engine: &Engine, id: &PackageId) -> Result<PackageId, String> {
    store(engine)?
        .get(id)
        .map_err(|e| e.to_string())?
        .and_then(|d| d.source)
        .ok_or_else(|| format!("{id} has no recorded source"))
}

pub fn set(session: &Session, input: &str, source_input: &str) -> Result<u8, String> {
    let mut engine = session.engine()?;
    let id = find_package(&engine, input)?;
    let source = find_package(&engine, source_input)?;
    if id == source {
        return Err(format!("{id} cannot be its own source"));
    }
    engine
        .apply(&Action::RecordSourceHash {
            id: id.clone(),
            source: source.clone(),
        })
        .map_err(|e| e.to_string())?;

    if session.json {
        let out = serde_json::json!({ "id": id.to_string(), "source": source.to_string() });
        println!("{}", json_pretty(&out)?);
    } else {
        println!("{id} now tracks {source}");
    }
    Ok(EXIT_SUCCESS)
}

pub fn clear(session: &Session, input: &str) -> Result<u8, String> {
    let engine = session.engine()?;
    let id = find_package(&engine, input)?;
    store(&engine)?
        .clear_source(&id)
        .map_err(|e| e.to_string())?;
    if !session.json {
        println!("{id} no longer tracks a source");
    }
    Ok(EXIT_SUCCESS)
}

pub fn diff(session: &Session, input: &str) -> Result<u8, String> {
    let engine = session.engine()?;
    let id = find_package(&engine, input)?;
    let source = source_of(&engine, &id)?;
    let catalog = engine.catalog();
    let copy_root = &catalog
        .get(&id)
        .ok_or_else(|| format!("package not installed: {id}"))?
        .root;
    let source_root = &catalog
        .get(&source)
        .ok_or_else(|| format!("source package not installed: {source}"))?
        .root;

    let mut report = diff_trees(source_root, copy_root).map_err(|e| e.to_string())?;
    // The copy keeps its own descriptor.
    report.modified.retain(|f| f != DESCRIPTOR_PATH);
    report.has_drift =
        !report.added.is_empty() || !report.modified.is_empty() || !report.removed.is_empty();

    if session.json {
        println!("{}", json_pretty(&report)?);
    } else if report.has_drift {
        println!("{id} differs from {source}:");
        for f in &report.added {
            println!("  + {f}");
        }
        for f in &report.modified {
            println!("  ~ {f}");
        }
        for f in &report.removed {
            println!("  - {f}");
        }
    } else {
        println!("{id} matches {source}");
    }
    Ok(EXIT_SUCCESS)
}

pub fn sync(session: &Session, input: &str) -> Result<u8, String> {
    let mut engine = session.engine()?;
    let id = find_package(&engine, input)?;
    let source = source_of(&engine, &id)?;
    let outcome = engine
        .apply(&Action::SyncFromSource {
            id: id.clone(),
            source: source.clone(),
        })
        .map_err(|e| e.to_string())?;
    let files = match outcome {
        Outcome::SourceUpdated { files } => files,
        _ => 0,
    };

    if session.json {
        let out = serde_json::json!({
            "id": id.to_string(),
            "source": source.to_string(),
            "files": files,
        });
        println!("{}", json_pretty(&out)?);
    } else {
        println!("updated {id} from {source} ({files} files)");
    }
    Ok(EXIT_SUCCESS)
}
