//! Source readers chosen by file name.
//!
//! `NAME.nutmeg` is Nutmeg source text. `NAME.txt` becomes the single
//! binding `const NAME := "<contents>"`.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::ast::{Codelet, RefType};
use crate::error::Mishap;
use crate::parser::Parser;

/// Reads a file's text given the name captured from its file name and the
/// unit to record in assertions.
type Reader = fn(name: &str, unit: &str, text: &str) -> Result<Vec<Codelet>, Mishap>;

static READERS: LazyLock<Vec<(Regex, Reader)>> = LazyLock::new(|| {
    let table: [(&str, Reader); 2] = [
        (r"\A(.*)\.nutmeg\z", read_nutmeg),
        (r"\A(.*)\.txt\z", read_text),
    ];
    table
        .into_iter()
        .map(|(pattern, reader)| {
            let pattern = Regex::new(pattern).expect("reader pattern is a valid regex");
            (pattern, reader)
        })
        .collect()
});

/// Reads the top-level codelets of the file at `path`, picking a reader by
/// the file name.
pub fn read_source(path: &str, unit: &str, text: &str) -> Result<Vec<Codelet>, Mishap> {
    let file_name = Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path);
    let Some((name, reader)) = READERS.iter().find_map(|(pattern, reader)| {
        pattern
            .captures(file_name)
            .map(|found| (found.get(1).map_or("", |m| m.as_str()), *reader))
    }) else {
        return Err(Mishap::syntax("No parser found for file").culprit("file", path));
    };
    debug!(file = path, name, "selected source reader");
    reader(name, unit, text)
}

fn read_nutmeg(_name: &str, unit: &str, text: &str) -> Result<Vec<Codelet>, Mishap> {
    Parser::new(text).with_unit(unit).collect()
}

fn read_text(name: &str, _unit: &str, text: &str) -> Result<Vec<Codelet>, Mishap> {
    Ok(vec![Codelet::binding(
        Codelet::id(name, RefType::Const),
        Codelet::string(text),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MishapKind;

    #[test]
    fn nutmeg_files_are_parsed_as_source() {
        let trees = read_source("src/main.nutmeg", "main", "x := 1\ny := 2").unwrap();
        assert_eq!(trees.len(), 2);
        assert_eq!(trees[0].kind(), "binding");
    }

    #[test]
    fn text_files_become_constant_strings() {
        let trees = read_source("assets/greeting.txt", "greeting", "hello\nworld\n").unwrap();
        assert_eq!(
            trees,
            vec![Codelet::binding(
                Codelet::id("greeting", RefType::Const),
                Codelet::string("hello\nworld\n"),
            )]
        );
    }

    #[test]
    fn only_the_final_extension_counts() {
        let trees = read_source("notes.nutmeg.txt", "notes", "x").unwrap();
        let Codelet::Binding { lhs, .. } = &trees[0] else {
            panic!("expected binding");
        };
        assert_eq!(lhs.as_id().map(|id| id.name.as_str()), Some("notes.nutmeg"));
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let mishap = read_source("picture.gif", "picture", "").unwrap_err();
        assert_eq!(mishap.kind(), MishapKind::Syntax);
        assert_eq!(mishap.message(), "No parser found for file");
        assert_eq!(mishap.culprit_value("file"), Some("picture.gif"));
    }

    #[test]
    fn unit_reaches_assertions() {
        let trees = read_source("checks.nutmeg", "checks", "assert ok").unwrap();
        assert!(matches!(&trees[0], Codelet::Syscall { name, .. } if name == "assertTrue"));
        let mut units = Vec::new();
        trees[0].walk(&mut |c| {
            if let Codelet::String { value } = c {
                units.push(value.clone());
            }
        });
        assert_eq!(units, vec!["checks".to_string()]);
    }
}
