use crate::requirement::Requirement;
use modorder_schema::PackageId;
use std::rc::Rc;

/// An applicable, unsatisfied requirement with its evaluation frozen at the
/// time the issue list was computed.
#[derive(Debug, Clone)]
pub struct Issue {
    pub requirement: Rc<Requirement>,
    pub severity: u8,
    pub description: String,
}

impl Issue {
    pub fn owner(&self) -> &PackageId {
        self.requirement.owner()
    }

    pub fn kind(&self) -> &'static str {
        self.requirement.kind().name()
    }
}

/// All issues of one owning package.
#[derive(Debug, Clone)]
pub struct IssueGroup {
    pub owner: PackageId,
    pub name: String,
    /// Worst severity among `issues`.
    pub severity: u8,
    pub issues: Vec<Issue>,
}

/// Group issues by owner. Groups are ordered by worst severity (descending),
/// then owner display name, then id; issues within a group by severity
/// (descending), then description.
pub(crate) fn group(issues: &[Issue], name_of: impl Fn(&PackageId) -> String) -> Vec<IssueGroup> {
    let mut groups: Vec<IssueGroup> = Vec::new();
    for issue in issues {
        match groups.iter_mut().find(|g| &g.owner == issue.owner()) {
            Some(g) => {
                g.severity = g.severity.max(issue.severity);
                g.issues.push(issue.clone());
            }
            None => groups.push(IssueGroup {
                owner: issue.owner().clone(),
                name: name_of(issue.owner()),
                severity: issue.severity,
                issues: vec![issue.clone()],
            }),
        }
    }
    for g in &mut groups {
        g.issues.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.description.cmp(&b.description))
        });
    }
    groups.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.owner.cmp(&b.owner))
    });
    groups
}
