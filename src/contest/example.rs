//! Built-in example contest, used when there is no persisted state.

use std::sync::Arc;

use super::{
    Contest, ContestMeta, ImageBlobs, ImageMeta, Problem, ProblemMeta, Sample, Statement,
    StatementFormat,
};

const EXAMPLE_IMAGE_UUID: &str = "6f1f2c3e-0000-4000-8000-00000000e0e0";

const EXAMPLE_IMAGE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="120" height="60">
  <circle cx="30" cy="30" r="20" fill="none" stroke="black"/>
  <circle cx="90" cy="30" r="20" fill="none" stroke="black"/>
  <line x1="50" y1="30" x2="70" y2="30" stroke="black"/>
</svg>
"##;

/// The example contest and its image blobs.
pub fn example_contest() -> (Contest, ImageBlobs) {
    let meta = ContestMeta {
        title: "Example Contest".to_string(),
        subtitle: "Problem Set".to_string(),
        author: "Problem Setters".to_string(),
        date: "2025-01-01".to_string(),
        ..ContestMeta::default()
    };

    let sum = Problem {
        key: super::new_key(),
        problem: ProblemMeta {
            display_name: "A + B".to_string(),
            format: StatementFormat::Latex,
            samples: vec![Sample {
                input: "1 2\n".to_string(),
                output: "3\n".to_string(),
            }],
        },
        statement: Statement {
            description: r"Given two integers $a$ and $b$, compute $a + b$.".to_string(),
            input: Some(r"One line with two integers $a, b$ ($|a|, |b| \le 10^9$).".to_string()),
            output: Some("Print the sum.".to_string()),
            notes: None,
        },
    };

    let graph = Problem {
        key: super::new_key(),
        problem: ProblemMeta {
            display_name: "Two Vertices".to_string(),
            format: StatementFormat::Markdown,
            samples: vec![
                Sample {
                    input: "2 1\n1 2\n".to_string(),
                    output: "YES\n".to_string(),
                },
                Sample {
                    input: "2 0\n".to_string(),
                    output: "NO\n".to_string(),
                },
            ],
        },
        statement: Statement {
            description: format!(
                "Decide whether the graph is connected.\n\n![graph](/asset/{EXAMPLE_IMAGE_UUID})"
            ),
            input: Some("The first line holds `n` and `m`, followed by `m` edges.".to_string()),
            output: Some("Print `YES` or `NO`.".to_string()),
            notes: Some("The picture shows the first sample.".to_string()),
        },
    };

    let contest = Contest {
        meta,
        problems: vec![sum, graph],
        images: vec![ImageMeta {
            uuid: EXAMPLE_IMAGE_UUID.to_string(),
            name: "graph.svg".to_string(),
        }],
        template: None,
    };

    let mut blobs = ImageBlobs::default();
    blobs.insert(
        EXAMPLE_IMAGE_UUID.to_string(),
        Arc::from(EXAMPLE_IMAGE.as_bytes()),
    );

    (contest, blobs)
}
