use super::{colorize_severity, json_pretty, wait_for_checks, Session, EXIT_SUCCESS};
use modorder_core::{Catalog, Context};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct PackageRow {
    id: String,
    name: String,
    folder: String,
    /// Load position among active packages.
    position: Option<usize>,
    version: Option<String>,
    severity: u8,
}

pub fn run(session: &Session, active_only: bool) -> Result<u8, String> {
    let engine = session.engine()?;
    let catalog = engine.catalog();

    // Evaluate active packages first so their version checks run together.
    for id in catalog.active_order() {
        engine.manifest(id);
    }
    wait_for_checks(&engine, Duration::from_secs(15), session.json);

    let mut rows: Vec<PackageRow> = catalog
        .installed()
        .iter()
        .filter(|p| !active_only || catalog.is_active(&p.id))
        .map(|p| PackageRow {
            id: p.id.to_string(),
            name: p.name.clone(),
            folder: p.folder.clone(),
            position: catalog.position(&p.id),
            version: engine.version_of(&p.id).map(|v| v.to_string()),
            severity: engine.severity_of(&p.id),
        })
        .collect();
    rows.sort_by(|a, b| match (a.position, b.position) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    });

    if session.json {
        println!("{}", json_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("no packages found");
    } else {
        println!("{:<5} {:<32} {:<10} {:<9} ID", "POS", "NAME", "VERSION", "STATUS");
        for row in &rows {
            let pos = row.position.map_or_else(|| "-".to_owned(), |p| p.to_string());
            let status = if row.position.is_some() {
                colorize_severity(row.severity)
            } else {
                "inactive".to_owned()
            };
            println!(
                "{pos:<5} {:<32} {:<10} {status:<9} {}",
                row.name,
                row.version.as_deref().unwrap_or("?"),
                row.id
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
