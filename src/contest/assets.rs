//! Asset reference checks.
//!
//! Statements embed images as `/asset/{uuid}`. A reference with no matching
//! entry in `Contest::images` is a content error: compilation fails when the
//! engine tries to read the file. These helpers report such references before
//! the engine does.

use std::sync::LazyLock;

use regex::Regex;

use super::{Contest, Problem};

/// Virtual path prefix under which images are mounted.
pub const ASSET_PREFIX: &str = "/asset/";

static ASSET_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/asset/([0-9A-Za-z][0-9A-Za-z-]*)").expect("asset pattern is valid")
});

/// Virtual path of an image.
pub fn asset_path(uuid: &str) -> String {
    format!("{ASSET_PREFIX}{uuid}")
}

/// A reference to an image that is not registered on the contest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingRef {
    /// Index of the problem holding the reference.
    pub problem: usize,
    pub uuid: String,
}

/// Every asset uuid referenced by a problem's statement text.
pub fn referenced_uuids(problem: &Problem) -> Vec<String> {
    let statement = &problem.statement;
    let texts = [
        Some(&statement.description),
        statement.input.as_ref(),
        statement.output.as_ref(),
        statement.notes.as_ref(),
    ];

    let mut uuids = Vec::new();
    for text in texts.into_iter().flatten() {
        for caps in ASSET_REF.captures_iter(text) {
            let uuid = caps[1].to_string();
            if !uuids.contains(&uuid) {
                uuids.push(uuid);
            }
        }
    }
    uuids
}

/// References that do not resolve to a registered image.
pub fn dangling_references(contest: &Contest) -> Vec<DanglingRef> {
    let mut dangling = Vec::new();
    for (index, problem) in contest.problems.iter().enumerate() {
        for uuid in referenced_uuids(problem) {
            if !contest.images.iter().any(|image| image.uuid == uuid) {
                dangling.push(DanglingRef {
                    problem: index,
                    uuid,
                });
            }
        }
    }
    dangling
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contest::{ImageMeta, StatementFormat};

    #[test]
    fn test_referenced_uuids_dedup() {
        let mut problem = Problem::new("P", StatementFormat::Markdown);
        problem.statement.description = "![a](/asset/abc-1) and ![b](/asset/abc-1)".into();
        problem.statement.notes = Some("#image(\"/asset/def-2\")".into());
        assert_eq!(referenced_uuids(&problem), ["abc-1", "def-2"]);
    }

    #[test]
    fn test_dangling_references() {
        let mut problem = Problem::new("P", StatementFormat::Typst);
        problem.statement.description = "#image(\"/asset/known\") #image(\"/asset/gone\")".into();
        let contest = Contest {
            problems: vec![Problem::new("Q", StatementFormat::Latex), problem],
            images: vec![ImageMeta {
                uuid: "known".into(),
                name: "k.png".into(),
            }],
            ..Contest::default()
        };

        assert_eq!(
            dangling_references(&contest),
            [DanglingRef {
                problem: 1,
                uuid: "gone".into()
            }]
        );
    }

    #[test]
    fn test_asset_path() {
        assert_eq!(asset_path("x"), "/asset/x");
    }
}
