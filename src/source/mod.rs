//! Contest -> Typst source serialization.
//!
//! The generated `/main.typ` is a single invocation of the template's
//! `conf(..)` function:
//!
//! ```text
//! #import "/lib.typ": conf
//! #conf(
//!   title: "Example Contest",
//!   ...
//!   problems: (
//!     (
//!       problem: (display_name: .., format: "latex", samples: (..)),
//!       statement: (description: .., input: ..),
//!     ),
//!   ),
//! )
//! ```
//!
//! Every string goes through [`escape`]. Problem keys and image names are
//! never emitted.

mod escape;
mod literal;

pub use escape::escape;

use crate::contest::{Contest, ContestMeta, Problem};
use literal::Value;

/// Virtual path of the generated main file.
pub const MAIN_PATH: &str = "/main.typ";

/// Virtual path of the built-in library template.
pub const LIBRARY_PATH: &str = "/lib.typ";

/// Virtual path of a contest's template override.
pub const OVERRIDE_PATH: &str = "/template.typ";

/// Path the main file imports `conf` from.
pub fn template_path(contest: &Contest) -> &'static str {
    if contest.template.is_some() {
        OVERRIDE_PATH
    } else {
        LIBRARY_PATH
    }
}

/// Render the main source file for `contest`.
pub fn render_main(contest: &Contest) -> String {
    let mut args = meta_args(&contest.meta);
    args.push((
        "problems",
        Value::Array(contest.problems.iter().map(problem_record).collect()),
    ));

    let mut out = String::with_capacity(256 + contest.problems.len() * 512);
    out.push_str("#import \"");
    out.push_str(template_path(contest));
    out.push_str("\": conf\n");
    out.push_str("#conf");
    literal::write_args(&mut out, &args);
    out.push('\n');
    out
}

fn meta_args(meta: &ContestMeta) -> Vec<(&'static str, Value)> {
    vec![
        ("title", Value::str(&meta.title)),
        ("subtitle", Value::str(&meta.subtitle)),
        ("author", Value::str(&meta.author)),
        ("date", Value::str(&meta.date)),
        ("language", Value::str(&meta.language)),
        ("enable_titlepage", Value::Bool(meta.enable_titlepage)),
        ("enable_header_footer", Value::Bool(meta.enable_header_footer)),
        ("enable_problem_list", Value::Bool(meta.enable_problem_list)),
        ("titlepage_language", Value::opt_str(meta.titlepage_language.as_deref())),
        ("problem_language", Value::opt_str(meta.problem_language.as_deref())),
    ]
}

fn problem_record(problem: &Problem) -> Value {
    let meta = &problem.problem;
    let samples = meta
        .samples
        .iter()
        .map(|sample| {
            Value::Dict(vec![
                ("input", Value::str(&sample.input)),
                ("output", Value::str(&sample.output)),
            ])
        })
        .collect();

    let statement = &problem.statement;
    let mut fields = vec![("description", Value::str(&statement.description))];
    let optional = [
        ("input", &statement.input),
        ("output", &statement.output),
        ("notes", &statement.notes),
    ];
    for (name, text) in optional {
        // empty sections fall back to the template defaults
        if let Some(text) = text.as_deref().filter(|t| !t.is_empty()) {
            fields.push((name, Value::str(text)));
        }
    }

    Value::Dict(vec![
        (
            "problem",
            Value::Dict(vec![
                ("display_name", Value::str(&meta.display_name)),
                ("format", Value::str(meta.format.as_str())),
                ("samples", Value::Array(samples)),
            ]),
        ),
        ("statement", Value::Dict(fields)),
    ])
}
