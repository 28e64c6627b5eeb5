//! Problem-level merge of a remote contest into the local one.
//!
//! Problems are matched by `key`:
//!
//! | local | remote | result                         |
//! |-------|--------|--------------------------------|
//! | yes   | no     | kept                           |
//! | no    | yes    | appended in remote order       |
//! | same  | same   | kept                           |
//! | A     | B      | conflict, resolved per problem |
//!
//! Meta and template stay local. Images are the union by uuid.

use rustc_hash::FxHashSet;

use crate::contest::{Contest, Problem, problem_letter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    KeepLocal,
    TakeRemote,
}

/// Both sides changed the same problem.
#[derive(Debug, Clone, Copy)]
pub struct Conflict<'a> {
    /// Display letter in the local contest.
    pub letter: &'a str,
    pub local: &'a Problem,
    pub remote: &'a Problem,
}

/// An answer to one conflict, optionally applied to the rest of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub resolution: Resolution,
    pub remember: bool,
}

impl Decision {
    pub fn once(resolution: Resolution) -> Self {
        Self {
            resolution,
            remember: false,
        }
    }

    pub fn always(resolution: Resolution) -> Self {
        Self {
            resolution,
            remember: true,
        }
    }
}

/// Remembered conflict choice. Lives as long as the sync connector.
#[derive(Debug, Default)]
pub struct MergeSession {
    remembered: Option<Resolution>,
}

impl MergeSession {
    pub fn remembered(&self) -> Option<Resolution> {
        self.remembered
    }

    fn decide(&mut self, conflict: &Conflict<'_>, ask: &mut dyn FnMut(&Conflict<'_>) -> Decision) -> Resolution {
        if let Some(resolution) = self.remembered {
            return resolution;
        }
        let decision = ask(conflict);
        if decision.remember {
            self.remembered = Some(decision.resolution);
        }
        decision.resolution
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub added: usize,
    pub kept_local: usize,
    pub took_remote: usize,
}

impl MergeReport {
    pub fn conflicts(&self) -> usize {
        self.kept_local + self.took_remote
    }
}

/// Per-problem comparison without resolving anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProblemDiff {
    pub only_local: usize,
    pub only_remote: usize,
    pub differing: usize,
}

impl ProblemDiff {
    pub fn between(local: &Contest, remote: &Contest) -> Self {
        let mut diff = Self::default();
        for problem in &local.problems {
            match remote.problems.iter().find(|p| p.key == problem.key) {
                None => diff.only_local += 1,
                Some(other) if other != problem => diff.differing += 1,
                Some(_) => {}
            }
        }
        diff.only_remote = remote
            .problems
            .iter()
            .filter(|p| local.position(&p.key).is_none())
            .count();
        diff
    }

    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Merge `remote` into `local`, asking `ask` for each conflict the session
/// has no remembered answer for.
pub fn merge(
    local: &Contest,
    remote: &Contest,
    session: &mut MergeSession,
    ask: &mut dyn FnMut(&Conflict<'_>) -> Decision,
) -> (Contest, MergeReport) {
    let mut report = MergeReport::default();
    let mut problems = Vec::with_capacity(local.problems.len().max(remote.problems.len()));

    for (index, ours) in local.problems.iter().enumerate() {
        let theirs = remote.problems.iter().find(|p| p.key == ours.key);
        let chosen = match theirs {
            Some(theirs) if theirs != ours => {
                let letter = problem_letter(index);
                let conflict = Conflict {
                    letter: &letter,
                    local: ours,
                    remote: theirs,
                };
                match session.decide(&conflict, ask) {
                    Resolution::KeepLocal => {
                        report.kept_local += 1;
                        ours
                    }
                    Resolution::TakeRemote => {
                        report.took_remote += 1;
                        theirs
                    }
                }
            }
            _ => ours,
        };
        problems.push(chosen.clone());
    }

    for theirs in &remote.problems {
        if local.position(&theirs.key).is_none() {
            problems.push(theirs.clone());
            report.added += 1;
        }
    }

    let known: FxHashSet<&str> = local.images.iter().map(|i| i.uuid.as_str()).collect();
    let images = local
        .images
        .iter()
        .chain(remote.images.iter().filter(|i| !known.contains(i.uuid.as_str())))
        .cloned()
        .collect();

    let merged = Contest {
        meta: local.meta.clone(),
        problems,
        images,
        template: local.template.clone(),
    };
    (merged, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contest::{ImageMeta, StatementFormat};

    fn problem(key: &str, name: &str) -> Problem {
        let mut problem = Problem::new(name, StatementFormat::Markdown);
        problem.key = key.into();
        problem
    }

    fn contest(problems: Vec<Problem>) -> Contest {
        Contest {
            problems,
            ..Default::default()
        }
    }

    fn names(contest: &Contest) -> Vec<&str> {
        contest
            .problems
            .iter()
            .map(|p| p.problem.display_name.as_str())
            .collect()
    }

    #[test]
    fn test_local_only_kept_remote_only_appended() {
        let local = contest(vec![problem("a", "A"), problem("b", "B")]);
        let remote = contest(vec![problem("c", "C"), problem("a", "A")]);

        let mut asked = 0;
        let (merged, report) = merge(&local, &remote, &mut MergeSession::default(), &mut |_| {
            asked += 1;
            Decision::once(Resolution::KeepLocal)
        });

        assert_eq!(names(&merged), ["A", "B", "C"]);
        assert_eq!(report, MergeReport { added: 1, kept_local: 0, took_remote: 0 });
        assert_eq!(asked, 0);
    }

    #[test]
    fn test_conflicts_resolved_per_problem() {
        let local = contest(vec![problem("a", "A local"), problem("b", "B local")]);
        let remote = contest(vec![problem("a", "A remote"), problem("b", "B remote")]);

        let mut letters = Vec::new();
        let (merged, report) = merge(&local, &remote, &mut MergeSession::default(), &mut |c| {
            letters.push(c.letter.to_string());
            if c.letter == "A" {
                Decision::once(Resolution::TakeRemote)
            } else {
                Decision::once(Resolution::KeepLocal)
            }
        });

        assert_eq!(letters, ["A", "B"]);
        assert_eq!(names(&merged), ["A remote", "B local"]);
        assert_eq!(report.conflicts(), 2);
    }

    #[test]
    fn test_remembered_choice_applies_to_rest_of_session() {
        let local = contest(vec![problem("a", "1"), problem("b", "1"), problem("c", "1")]);
        let remote = contest(vec![problem("a", "2"), problem("b", "2"), problem("c", "2")]);
        let mut session = MergeSession::default();

        let mut asked = 0;
        let (merged, _) = merge(&local, &remote, &mut session, &mut |_| {
            asked += 1;
            Decision::always(Resolution::TakeRemote)
        });
        assert_eq!(asked, 1);
        assert_eq!(names(&merged), ["2", "2", "2"]);
        assert_eq!(session.remembered(), Some(Resolution::TakeRemote));

        // a later merge in the same session does not ask again
        let (_, report) = merge(&local, &remote, &mut session, &mut |_| unreachable!());
        assert_eq!(report.took_remote, 3);

        // a new session asks again
        let mut session = MergeSession::default();
        let (_, report) = merge(&local, &remote, &mut session, &mut |_| {
            Decision::once(Resolution::KeepLocal)
        });
        assert_eq!(report.kept_local, 3);
    }

    #[test]
    fn test_images_union_meta_local() {
        let mut local = contest(vec![]);
        local.meta.title = "Local".into();
        local.images = vec![ImageMeta { uuid: "1".into(), name: "one.png".into() }];
        let mut remote = contest(vec![]);
        remote.meta.title = "Remote".into();
        remote.images = vec![
            ImageMeta { uuid: "2".into(), name: "two.png".into() },
            ImageMeta { uuid: "1".into(), name: "renamed.png".into() },
        ];

        let (merged, _) = merge(&local, &remote, &mut MergeSession::default(), &mut |_| unreachable!());
        assert_eq!(merged.meta.title, "Local");
        let uuids: Vec<&str> = merged.images.iter().map(|i| i.uuid.as_str()).collect();
        assert_eq!(uuids, ["1", "2"]);
        assert_eq!(merged.images[0].name, "one.png");
    }

    #[test]
    fn test_problem_diff() {
        let local = contest(vec![problem("a", "A"), problem("b", "B"), problem("d", "D")]);
        let remote = contest(vec![problem("a", "A"), problem("b", "B2"), problem("c", "C")]);

        let diff = ProblemDiff::between(&local, &remote);
        assert_eq!(diff, ProblemDiff { only_local: 1, only_remote: 1, differing: 1 });
        assert!(ProblemDiff::between(&local, &local).is_clean());
    }
}
