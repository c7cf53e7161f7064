use super::{
    colorize_severity, group_view, json_pretty, wait_for_checks, Session, EXIT_ISSUES,
    EXIT_SUCCESS,
};
use modorder_core::Action;
use std::time::Duration;

pub fn run(session: &Session, fail_on: u8, wait_secs: u64) -> Result<u8, String> {
    let engine = session.engine()?;
    // First pass builds manifests and starts version checks.
    engine.issues();
    wait_for_checks(&engine, Duration::from_secs(wait_secs), session.json);

    let groups: Vec<_> = engine
        .report()
        .iter()
        .map(|g| group_view(&engine, g))
        .collect();

    if session.json {
        println!("{}", json_pretty(&groups)?);
    } else if groups.is_empty() {
        println!("no problems found");
    } else {
        for group in &groups {
            println!(
                "{} ({}) {}",
                group.name,
                group.id,
                colorize_severity(group.severity)
            );
            for issue in &group.issues {
                println!("  [{}] {}", colorize_severity(issue.severity), issue.description);
                for r in &issue.resolutions {
                    let marker = if matches!(r.action, Action::NoMatchingInstalled { .. }) {
                        " "
                    } else {
                        "→"
                    };
                    println!("      {marker} {}", r.label);
                }
            }
        }
    }

    Ok(if engine.any_issue(fail_on) {
        EXIT_ISSUES
    } else {
        EXIT_SUCCESS
    })
}
