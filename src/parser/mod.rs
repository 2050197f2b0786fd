//! # Configuration Parser
//!
//! Turns raw nginx configuration text into the parent-linked
//! [`Directive`] tree the audit engine traverses.
//!
//! ## Submodules
//!
//! - [`lexer`] - tokenizer for nginx syntax (words, quotes, braces,
//!   semicolons, comments)
//!
//! The parser owns a [`DirectiveRegistry`] and constructs every statement
//! through it, so each node carries its typed payload from the start.
//! `include` statements are resolved against a base directory with glob
//! patterns; the included files' directives become children of the
//! `include` node, which shares the surrounding variable scope.

mod lexer;

pub use lexer::{Lexer, Token, TokenKind};

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::debug;
use thiserror::Error;

use crate::directives::{Directive, DirectiveError, DirectiveKind, DirectiveRegistry};

/// Errors raised while parsing configuration text.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A token that cannot start or continue a statement.
    #[error("{path}:{line}: unexpected `{token}`")]
    Unexpected {
        path: String,
        line: usize,
        token: String,
    },

    /// Input ended inside an unclosed block.
    #[error("{path}: unexpected end of input inside a block")]
    UnexpectedEof { path: String },

    /// A statement failed typed construction.
    #[error(transparent)]
    Directive(#[from] DirectiveError),

    /// An included file could not be read.
    #[error("cannot read included file `{path}`: {source}")]
    Include {
        path: String,
        source: std::io::Error,
    },

    /// An `include` argument is not a valid glob pattern.
    #[error("invalid include pattern `{pattern}`: {source}")]
    IncludePattern {
        pattern: String,
        source: glob::PatternError,
    },
}

/// Parser for nginx configuration files.
pub struct NginxParser {
    registry: DirectiveRegistry,
    base_dir: PathBuf,
    allow_includes: bool,
}

impl NginxParser {
    /// Creates a parser resolving `include` patterns against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>, allow_includes: bool) -> Self {
        Self {
            registry: DirectiveRegistry::new(),
            base_dir: base_dir.into(),
            allow_includes,
        }
    }

    /// Parses `content` into a tree rooted at a synthetic `main` block.
    ///
    /// `path` is used for diagnostics only.
    ///
    /// # Errors
    ///
    /// Any lexical, structural or include-resolution failure aborts the
    /// parse; there is no partial tree.
    pub fn parse(&self, content: &str, path: &str) -> Result<Rc<Directive>, ParseError> {
        let root = Directive::main();
        let mut lexer = Lexer::new(content);
        self.parse_children(&mut lexer, &root, path, false)?;
        Ok(root)
    }

    /// Parses statements into `parent` until end of input (top level) or
    /// the closing brace of the current block (`nested`).
    fn parse_children(
        &self,
        lexer: &mut Lexer<'_>,
        parent: &Rc<Directive>,
        path: &str,
        nested: bool,
    ) -> Result<(), ParseError> {
        loop {
            let token = match lexer.next_token() {
                Some(token) => token,
                None if nested => {
                    return Err(ParseError::UnexpectedEof {
                        path: path.to_string(),
                    })
                }
                None => return Ok(()),
            };

            match token.kind {
                TokenKind::BlockClose if nested => return Ok(()),
                TokenKind::Word(name) => {
                    self.parse_statement(lexer, parent, name, token.line, path)?;
                }
                other => {
                    return Err(ParseError::Unexpected {
                        path: path.to_string(),
                        line: token.line,
                        token: render_token(&other),
                    })
                }
            }
        }
    }

    /// Parses one statement whose name token was already consumed.
    fn parse_statement(
        &self,
        lexer: &mut Lexer<'_>,
        parent: &Rc<Directive>,
        name: String,
        line: usize,
        path: &str,
    ) -> Result<(), ParseError> {
        let mut args = Vec::new();

        loop {
            let token = lexer.next_token().ok_or_else(|| ParseError::UnexpectedEof {
                path: path.to_string(),
            })?;

            match token.kind {
                TokenKind::Word(word) => args.push(word),
                TokenKind::End => {
                    let raw = render_raw(&name, &args);
                    let directive =
                        Directive::from_parts(&name, args, Some(raw), false, &self.registry)?;
                    parent.add_child(directive.clone());
                    if let DirectiveKind::Include { pattern } = directive.kind() {
                        let pattern = pattern.clone();
                        self.resolve_include(&directive, &pattern)?;
                    }
                    return Ok(());
                }
                TokenKind::BlockOpen => {
                    let raw = render_raw(&name, &args);
                    let directive =
                        Directive::from_parts(&name, args, Some(raw), true, &self.registry)?;
                    parent.add_child(directive.clone());
                    self.parse_children(lexer, &directive, path, true)?;
                    return Ok(());
                }
                TokenKind::BlockClose => {
                    return Err(ParseError::Unexpected {
                        path: path.to_string(),
                        line,
                        token: "}".to_string(),
                    })
                }
            }
        }
    }

    /// Splices the files matched by an `include` pattern under the
    /// include node.
    fn resolve_include(&self, directive: &Rc<Directive>, pattern: &str) -> Result<(), ParseError> {
        if !self.allow_includes {
            debug!("skipping include `{pattern}`: includes disabled");
            return Ok(());
        }

        let full = if Path::new(pattern).is_absolute() {
            PathBuf::from(pattern)
        } else {
            self.base_dir.join(pattern)
        };
        let pattern_text = full.to_string_lossy().into_owned();

        let mut paths: Vec<PathBuf> = glob::glob(&pattern_text)
            .map_err(|source| ParseError::IncludePattern {
                pattern: pattern_text.clone(),
                source,
            })?
            .filter_map(Result::ok)
            .collect();
        paths.sort();

        for file in paths {
            let file_path = file.display().to_string();
            debug!("including `{file_path}`");
            let content = fs::read_to_string(&file).map_err(|source| ParseError::Include {
                path: file_path.clone(),
                source,
            })?;
            let mut lexer = Lexer::new(&content);
            self.parse_children(&mut lexer, directive, &file_path, false)?;
        }

        Ok(())
    }
}

fn render_raw(name: &str, args: &[String]) -> String {
    if args.is_empty() {
        name.to_string()
    } else {
        format!("{} {}", name, args.join(" "))
    }
}

fn render_token(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Word(word) => word.clone(),
        TokenKind::BlockOpen => "{".to_string(),
        TokenKind::BlockClose => "}".to_string(),
        TokenKind::End => ";".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Rc<Directive> {
        NginxParser::new(".", false)
            .parse(content, "test.conf")
            .unwrap()
    }

    #[test]
    fn test_parse_flat_statements() {
        let root = parse("user nginx;\nworker_processes 4;");
        let children = root.children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].name(), "user");
        assert_eq!(children[1].args(), ["4"]);
    }

    #[test]
    fn test_parse_nested_blocks() {
        let root =
            parse("http {\n  server {\n    location / {\n      root /srv;\n    }\n  }\n}\n");
        let http = &root.children()[0];
        assert_eq!(http.name(), "http");
        let server = &http.children()[0];
        let location = &server.children()[0];
        assert_eq!(location.name(), "location");
        assert_eq!(location.children()[0].name(), "root");
    }

    #[test]
    fn test_parent_links_wired() {
        let root = parse("server { set $a 1; }");
        let server = &root.children()[0];
        let set = &server.children()[0];
        assert!(Rc::ptr_eq(&set.parent().unwrap(), server));
        assert!(Rc::ptr_eq(&server.parent().unwrap(), &root));
    }

    #[test]
    fn test_typed_construction_through_registry() {
        let root = parse(r#"rewrite "^/(\d+)$" /n last;"#);
        let rewrite = &root.children()[0];
        assert!(matches!(rewrite.kind(), DirectiveKind::Rewrite { .. }));
        assert!(rewrite.provides_variables());
    }

    #[test]
    fn test_malformed_directive_fails_construction() {
        let err = NginxParser::new(".", false)
            .parse("add_header X-Only;", "test.conf")
            .unwrap_err();
        assert!(matches!(err, ParseError::Directive(_)));
    }

    #[test]
    fn test_unclosed_block_fails() {
        let err = NginxParser::new(".", false)
            .parse("server { listen 80;", "test.conf")
            .unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_stray_close_brace_fails() {
        let err = NginxParser::new(".", false)
            .parse("}", "test.conf")
            .unwrap_err();
        assert!(matches!(err, ParseError::Unexpected { .. }));
    }

    #[test]
    fn test_include_disabled_leaves_node_childless() {
        let root = parse("include conf.d/*.conf;");
        let include = &root.children()[0];
        assert!(matches!(include.kind(), DirectiveKind::Include { .. }));
        assert!(include.children().is_empty());
    }
}
