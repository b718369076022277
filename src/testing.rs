//! Test host with a trivial whitespace grammar
//!
//! Tokens are whitespace-separated. `#`-prefixed tokens are comments,
//! digit runs are numbers, identifier-shaped tokens are identifiers and
//! everything else is punctuation. Symbols bind by name: every identifier
//! token with the same text is an occurrence of the same symbol.

use crate::host::{Host, ParseError, Scope, SymbolId, SymbolLocation};
use crate::span::Span;
use crate::tree::{NodeId, SourceTree, TreeBuilder};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub(crate) fn symbol_for(name: &str) -> SymbolId {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    SymbolId(hasher.finish())
}

fn classify(token: &str) -> &'static str {
    if token.starts_with('#') {
        "comment"
    } else if token.bytes().all(|b| b.is_ascii_digit()) {
        "number"
    } else if crate::host::default_identifier_check(token) {
        "identifier"
    } else {
        "punct"
    }
}

/// Tokenize `text` into a single-level tree under a "document" root.
pub(crate) fn tokenize(path: &Path, text: &str, version: u32) -> SourceTree {
    let mut builder = TreeBuilder::new(path, text).with_version(version);
    builder.open("document", Span::new(0, text.len() as u32));

    let mut offset = 0usize;
    for chunk in text.split_whitespace() {
        let start = text[offset..].find(chunk).map(|i| offset + i).unwrap_or(offset);
        let span = Span::new(start as u32, (start + chunk.len()) as u32);
        builder.token(classify(chunk), span);
        offset = start + chunk.len();
    }

    builder.close();
    builder.finish()
}

/// Host over the whitespace grammar, with by-name symbol resolution. Every
/// parse re-registers the resulting tree so reference lookups always see
/// the current text.
#[derive(Default)]
pub(crate) struct MockHost {
    trees: Mutex<HashMap<PathBuf, SourceTree>>,
    names: Mutex<HashMap<u64, String>>,
}

impl MockHost {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Parse and register a file up front.
    pub(crate) fn add_file(&self, path: &str, text: &str) -> SourceTree {
        self.parse(Path::new(path), text, 1)
            .unwrap_or_else(|e| panic!("fixture failed to parse: {}", e))
    }

    fn remember(&self, tree: &SourceTree) {
        let mut names = self.names.lock().unwrap();
        for node in tree.preorder() {
            if tree.kind(node) == "identifier" {
                let text = tree.node_text(node).to_string();
                names.insert(symbol_for(&text).0, text);
            }
        }
        self.trees
            .lock()
            .unwrap()
            .insert(tree.path().to_path_buf(), tree.clone());
    }
}

impl Host for MockHost {
    fn parse(&self, path: &Path, text: &str, version: u32) -> Result<SourceTree, ParseError> {
        if text.contains("<<<") {
            return Err(ParseError::Malformed {
                file: path.to_path_buf(),
                line: 1,
                message: "unexpected '<<<'".to_string(),
            });
        }
        let tree = tokenize(path, text, version);
        self.remember(&tree);
        Ok(tree)
    }

    fn resolve_symbol(&self, tree: &SourceTree, token: NodeId) -> Option<SymbolId> {
        if tree.kind(token) != "identifier" {
            return None;
        }
        Some(symbol_for(tree.node_text(token)))
    }

    fn find_references(&self, symbol: SymbolId, scope: &Scope) -> Vec<SymbolLocation> {
        let names = self.names.lock().unwrap();
        let Some(name) = names.get(&symbol.0) else {
            return Vec::new();
        };
        let trees = self.trees.lock().unwrap();
        let mut locations = Vec::new();
        for tree in trees.values() {
            if !scope.includes(tree.path()) {
                continue;
            }
            for node in tree.preorder() {
                if tree.kind(node) == "identifier" && tree.node_text(node) == name {
                    locations.push(SymbolLocation::new(tree.path(), tree.span(node)));
                }
            }
        }
        locations.sort_by(|a, b| a.file.cmp(&b.file).then(a.span.cmp(&b.span)));
        locations
    }

    fn lookup_name(&self, name: &str, _location: &SymbolLocation) -> Option<SymbolId> {
        let trees = self.trees.lock().unwrap();
        for tree in trees.values() {
            for node in tree.preorder() {
                if tree.kind(node) == "identifier" && tree.node_text(node) == name {
                    return Some(symbol_for(name));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tokenize_kinds_and_spans() {
        let tree = tokenize(Path::new("t.src"), "foo 42 #note +", 1);
        let kinds: Vec<_> = tree
            .preorder()
            .skip(1)
            .map(|n| (tree.kind(n).to_string(), tree.node_text(n).to_string()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("identifier".to_string(), "foo".to_string()),
                ("number".to_string(), "42".to_string()),
                ("comment".to_string(), "#note".to_string()),
                ("punct".to_string(), "+".to_string()),
            ]
        );
    }

    #[test]
    fn test_resolution_by_name() {
        let host = MockHost::new();
        let tree = host.add_file("a.src", "alpha beta alpha");
        let first = tree.children(tree.root().unwrap())[0];
        let symbol = host.resolve_symbol(&tree, first).unwrap();

        let refs = host.find_references(symbol, &Scope::Project);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].span, Span::new(0, 5));
        assert_eq!(refs[1].span, Span::new(11, 16));
    }

    #[test]
    fn test_cross_file_references() {
        let host = MockHost::new();
        host.add_file("a.src", "shared");
        host.add_file("b.src", "x shared y");

        let refs = host.find_references(symbol_for("shared"), &Scope::Project);
        assert_eq!(refs.len(), 2);

        let only_a = host.find_references(
            symbol_for("shared"),
            &Scope::File(PathBuf::from("a.src")),
        );
        assert_eq!(only_a.len(), 1);
    }

    #[test]
    fn test_malformed_input() {
        let host = MockHost::new();
        assert!(host.parse(Path::new("bad.src"), "a <<< b", 1).is_err());
    }
}
