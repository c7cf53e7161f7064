use super::{find_package, json_pretty, Session, EXIT_SUCCESS};
use modorder_core::{content_hash, Catalog};

pub fn run(session: &Session, input: &str) -> Result<u8, String> {
    let engine = session.engine()?;
    let id = find_package(&engine, input)?;
    let package = engine
        .catalog()
        .get(&id)
        .ok_or_else(|| format!("package not installed: {id}"))?;
    let hash = content_hash(&package.root).map_err(|e| e.to_string())?;

    if session.json {
        let out = serde_json::json!({
            "id": id.to_string(),
            "root": package.root.display().to_string(),
            "hash": hash.to_string(),
        });
        println!("{}", json_pretty(&out)?);
    } else {
        println!("{hash}  {id}");
    }
    Ok(EXIT_SUCCESS)
}
