use super::{json_pretty, Session, EXIT_ISSUES, EXIT_SUCCESS};
use modorder_core::{Action, Catalog, Engine, SEVERITY_CRITICAL};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct FixReport {
    applied: Vec<String>,
    remaining: usize,
    order: Vec<String>,
    saved: bool,
}

/// Remedies that only touch the active order. Searches, downloads, and file
/// changes are left to the user.
fn changes_order(action: &Action) -> bool {
    matches!(
        action,
        Action::Activate { .. }
            | Action::Deactivate { .. }
            | Action::MoveBefore { .. }
            | Action::MoveAfter { .. }
            | Action::MoveToFront { .. }
    )
}

/// Apply order remedies until no critical issue has one left, bounded so
/// that conflicting constraints cannot cycle forever.
fn fix_order(engine: &mut Engine) -> Result<Vec<String>, String> {
    let limit = engine.catalog().installed().len() * 4 + 4;
    let mut applied = Vec::new();
    while applied.len() < limit {
        let next = engine.blocking_issues().into_iter().find_map(|issue| {
            issue
                .requirement
                .resolutions(&*engine)
                .into_iter()
                .find(|r| changes_order(&r.action))
        });
        let Some(resolution) = next else {
            break;
        };
        engine.apply(&resolution.action).map_err(|e| e.to_string())?;
        tracing::info!("applied: {}", resolution.label);
        applied.push(resolution.label);
    }
    Ok(applied)
}

pub fn run(session: &Session, dry_run: bool) -> Result<u8, String> {
    let mut engine = session.engine()?;
    let applied = fix_order(&mut engine)?;
    let remaining = engine
        .issues()
        .iter()
        .filter(|i| i.severity >= SEVERITY_CRITICAL)
        .count();

    let saved = !dry_run && !applied.is_empty();
    if saved {
        session.save(&engine)?;
    }

    if session.json {
        let report = FixReport {
            applied,
            remaining,
            order: engine
                .catalog()
                .active_order()
                .iter()
                .map(ToString::to_string)
                .collect(),
            saved,
        };
        println!("{}", json_pretty(&report)?);
    } else {
        if applied.is_empty() {
            println!("nothing to fix automatically");
        }
        for label in &applied {
            let verb = if dry_run { "would apply" } else { "applied" };
            println!("{verb}: {label}");
        }
        if saved {
            println!("saved {}", session.modlist.display());
        }
        if remaining > 0 {
            println!("{remaining} critical problems need manual attention (run `modorder check`)");
        }
    }

    Ok(if remaining > 0 { EXIT_ISSUES } else { EXIT_SUCCESS })
}

#[cfg(test)]
mod tests {
    use super::*;
    use modorder_schema::PackageId;

    #[test]
    fn only_order_actions_are_automatic() {
        let id = PackageId::new("a.b");
        assert!(changes_order(&Action::MoveToFront { id: id.clone() }));
        assert!(changes_order(&Action::Deactivate { id: id.clone() }));
        assert!(!changes_order(&Action::SearchWorkshop {
            query: "a.b".into()
        }));
        assert!(!changes_order(&Action::SyncFromSource {
            id: id.clone(),
            source: id
        }));
    }
}
