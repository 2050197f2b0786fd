//! # Directive Model
//!
//! Typed representation of nginx configuration statements and the
//! explicit registry that maps statement names to variant constructors.
//!
//! ## Architecture
//!
//! Every statement is a [`Directive`] node carrying its raw `name` and
//! `args` plus a typed [`DirectiveKind`] payload parsed at construction
//! time. The tree owns top-down: a parent holds `Rc` handles to its
//! children, while the `parent` back-link is a `Weak` reference used only
//! for ancestor iteration, never for ownership.
//!
//! The set of recognized statement names lives in [`DirectiveRegistry`],
//! built once with explicit registration calls so the mapping is total,
//! inspectable and order-independent. Unrecognized names construct a
//! generic untyped directive.
//!
//! ## Variable extraction
//!
//! [`Directive::variables`] returns the bindings a statement's execution
//! would introduce. Regex-bearing variants (`rewrite`, regex `location`,
//! `if` comparisons) delegate capture-group analysis to
//! [`crate::regexp::Regexp`].

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use std::collections::HashMap;
use thiserror::Error;

use crate::regexp::Regexp;
use crate::scope::Variable;

/// Outer boundary of what a `rewrite` substitution target can contain:
/// any non-whitespace character.
pub const REWRITE_BOUNDARY: &str = r"[^\s\r\n]";

/// Errors raised while constructing directives or extracting variables.
#[derive(Debug, Error)]
pub enum DirectiveError {
    /// A variant's required positional argument is missing. Malformed
    /// input from the parser; fails fast instead of crashing later.
    #[error("directive `{directive}` is missing required argument at position {index}")]
    MissingArgument { directive: String, index: usize },

    /// `variables()` was invoked on a variant that declares variable
    /// provision but carries no extraction logic. A defect in the variant
    /// taxonomy, never a runtime input condition.
    #[error("`variables()` is not implemented for variable-providing directive `{0}`")]
    VariablesNotImplemented(String),
}

/// Typed payload of one configuration statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveKind {
    /// Synthetic root of the tree (nginx "main" context).
    Main,

    /// `http { ... }`
    Http,

    /// `server { ... }`
    Server,

    /// `location [modifier] path { ... }`
    Location {
        modifier: Option<String>,
        path: String,
    },

    /// `if (condition) { ... }` with surrounding parens stripped.
    If { condition: Vec<String> },

    /// `include pattern;` with children spliced from the included files;
    /// does not open a scope of its own.
    Include { pattern: String },

    /// `add_header name value [always];`
    AddHeader {
        header: String,
        value: String,
        always: bool,
    },

    /// `set $name value;`
    Set { variable: String, value: String },

    /// `auth_request_set $name value;`
    AuthRequestSet { variable: String, value: String },

    /// `perl_set $name 'sub { ... }';` (value not statically known).
    PerlSet { variable: String },

    /// `set_by_lua $name 'return ...';` (value not statically known).
    SetByLua { variable: String },

    /// `rewrite pattern replacement [flag];`
    Rewrite {
        pattern: String,
        replace: String,
        flag: Option<String>,
    },

    /// `root path;`
    Root { path: String },

    /// `alias path;`
    Alias { path: String },

    /// Any statement without a registered constructor.
    Unknown { block: bool },
}

impl DirectiveKind {
    /// Whether this variant carries a body of child directives.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            DirectiveKind::Main
                | DirectiveKind::Http
                | DirectiveKind::Server
                | DirectiveKind::Location { .. }
                | DirectiveKind::If { .. }
                | DirectiveKind::Include { .. }
                | DirectiveKind::Unknown { block: true }
        )
    }

    /// Whether this block declares its own variable scope.
    ///
    /// `include` splices children into the surrounding context and does
    /// not; generic unknown blocks are treated the same way.
    pub fn self_context(&self) -> bool {
        matches!(
            self,
            DirectiveKind::Main
                | DirectiveKind::Http
                | DirectiveKind::Server
                | DirectiveKind::Location { .. }
                | DirectiveKind::If { .. }
        )
    }

    /// Whether executing this statement introduces variables. Fixed per
    /// variant (regex `location`/`if` provide only in their regex forms).
    pub fn provides_variables(&self) -> bool {
        match self {
            DirectiveKind::Set { .. }
            | DirectiveKind::AuthRequestSet { .. }
            | DirectiveKind::PerlSet { .. }
            | DirectiveKind::SetByLua { .. }
            | DirectiveKind::Rewrite { .. }
            | DirectiveKind::Root { .. } => true,
            DirectiveKind::Location { modifier, .. } => is_regex_modifier(modifier),
            DirectiveKind::If { condition } => regex_comparison(condition).is_some(),
            _ => false,
        }
    }
}

/// One configuration statement, possibly opening a nested block.
///
/// Created once by the parser and immutable thereafter except for the
/// `parent` back-link assigned during tree construction.
#[derive(Debug)]
pub struct Directive {
    name: String,
    args: Vec<String>,
    raw: Option<String>,
    kind: DirectiveKind,
    parent: RefCell<Weak<Directive>>,
    children: RefCell<Vec<Rc<Directive>>>,
}

impl Directive {
    /// Constructs a typed directive through the registry.
    ///
    /// `has_block` reflects the parsed syntax (a `{` followed the
    /// arguments) and decides block-ness for unregistered names.
    ///
    /// # Errors
    ///
    /// Fails with [`DirectiveError::MissingArgument`] when the variant's
    /// required positional arguments are absent.
    pub fn from_parts(
        name: &str,
        args: Vec<String>,
        raw: Option<String>,
        has_block: bool,
        registry: &DirectiveRegistry,
    ) -> Result<Rc<Self>, DirectiveError> {
        let kind = registry.construct(name, &args, has_block)?;
        Ok(Rc::new(Self {
            name: name.to_string(),
            args,
            raw,
            kind,
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        }))
    }

    /// The synthetic root of a configuration tree.
    pub fn main() -> Rc<Self> {
        Rc::new(Self {
            name: "main".to_string(),
            args: Vec::new(),
            raw: None,
            kind: DirectiveKind::Main,
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    pub fn kind(&self) -> &DirectiveKind {
        &self.kind
    }

    pub fn is_block(&self) -> bool {
        self.kind.is_block()
    }

    pub fn self_context(&self) -> bool {
        self.kind.self_context()
    }

    pub fn provides_variables(&self) -> bool {
        self.kind.provides_variables()
    }

    /// Appends a child and wires its non-owning parent back-link.
    pub fn add_child(self: &Rc<Self>, child: Rc<Directive>) {
        *child.parent.borrow_mut() = Rc::downgrade(self);
        self.children.borrow_mut().push(child);
    }

    /// The enclosing directive, if this node is attached to a tree.
    pub fn parent(&self) -> Option<Rc<Directive>> {
        self.parent.borrow().upgrade()
    }

    /// Iterates ancestors from the immediate parent up to the root.
    pub fn parents(&self) -> Parents {
        Parents {
            next: self.parent(),
        }
    }

    /// Snapshot of the ordered children.
    pub fn children(&self) -> Vec<Rc<Directive>> {
        self.children.borrow().clone()
    }

    /// The ordered sequence of variables this statement's execution would
    /// introduce.
    ///
    /// Empty for variants with no variable provision. Regex-bearing
    /// variants derive one variable per capture group; regex `location`
    /// and `if` comparisons additionally bind the `"0"` full-match
    /// sentinel, which is what invalidates stale numbered captures in the
    /// current scope frame.
    ///
    /// # Errors
    ///
    /// [`DirectiveError::VariablesNotImplemented`] when a variant is
    /// flagged as variable-providing but no extraction logic exists for
    /// it, a contract violation that must not be silently swallowed.
    pub fn variables(self: &Rc<Self>) -> Result<Vec<Variable>, DirectiveError> {
        match &self.kind {
            DirectiveKind::Set { variable, value }
            | DirectiveKind::AuthRequestSet { variable, value } => {
                Ok(vec![Variable::literal(variable, value, self.clone())])
            }
            DirectiveKind::PerlSet { variable } | DirectiveKind::SetByLua { variable } => {
                Ok(vec![Variable::script(variable, self.clone())])
            }
            DirectiveKind::Root { path } => {
                Ok(vec![Variable::literal("document_root", path, self.clone())])
            }
            DirectiveKind::Rewrite { pattern, .. } => {
                let regexp = Regexp::new(pattern, true);
                Ok(regexp
                    .groups()
                    .iter()
                    .map(|group| {
                        Variable::pattern(
                            &group.id,
                            &group.class,
                            Some(REWRITE_BOUNDARY),
                            self.clone(),
                        )
                    })
                    .collect())
            }
            DirectiveKind::Location { modifier, path } if is_regex_modifier(modifier) => {
                let case_sensitive = modifier.as_deref() == Some("~");
                Ok(self.match_variables(path, case_sensitive))
            }
            DirectiveKind::If { condition } => match regex_comparison(condition) {
                Some((pattern, case_sensitive)) => {
                    Ok(self.match_variables(&pattern, case_sensitive))
                }
                None => Ok(Vec::new()),
            },
            kind if kind.provides_variables() => Err(DirectiveError::VariablesNotImplemented(
                self.name.clone(),
            )),
            _ => Ok(Vec::new()),
        }
    }

    /// Variables bound by a regex match operation: the `"0"` full-match
    /// sentinel followed by every capture group.
    fn match_variables(self: &Rc<Self>, pattern: &str, case_sensitive: bool) -> Vec<Variable> {
        let regexp = Regexp::new(pattern, case_sensitive);
        let mut vars = vec![Variable::pattern(
            "0",
            &regexp.full_match_class(),
            None,
            self.clone(),
        )];
        for group in regexp.groups() {
            vars.push(Variable::pattern(&group.id, &group.class, None, self.clone()));
        }
        vars
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} {}", self.name, self.args.join(" "))
        }?;
        if self.is_block() {
            write!(f, " {{...}}")
        } else {
            write!(f, ";")
        }
    }
}

/// Iterator over a directive's ancestors, innermost first.
pub struct Parents {
    next: Option<Rc<Directive>>,
}

impl Iterator for Parents {
    type Item = Rc<Directive>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.parent();
        Some(current)
    }
}

fn is_regex_modifier(modifier: &Option<String>) -> bool {
    matches!(modifier.as_deref(), Some("~") | Some("~*"))
}

/// Extracts `(pattern, case_sensitive)` from an `if` condition when it is
/// a regex comparison (`$var ~ pattern` / `$var !~* pattern`).
fn regex_comparison(condition: &[String]) -> Option<(String, bool)> {
    if condition.len() < 3 {
        return None;
    }
    match condition[1].as_str() {
        "~" | "!~" => Some((condition[2].clone(), true)),
        "~*" | "!~*" => Some((condition[2].clone(), false)),
        _ => None,
    }
}

/// Signature of a variant constructor: receives the raw argument tokens
/// and whether a block body follows.
pub type DirectiveConstructor =
    fn(args: &[String], has_block: bool) -> Result<DirectiveKind, DirectiveError>;

/// Explicit registry of nginx statement name → variant constructor.
///
/// Built once at initialization; never populated through runtime
/// discovery, so the recognized name set is statically inspectable and
/// independent of registration order.
pub struct DirectiveRegistry {
    entries: HashMap<&'static str, DirectiveConstructor>,
}

impl DirectiveRegistry {
    /// Creates the registry with every built-in variant registered.
    pub fn new() -> Self {
        let mut registry = Self {
            entries: HashMap::new(),
        };
        registry.register("http", |_, _| Ok(DirectiveKind::Http));
        registry.register("server", |_, _| Ok(DirectiveKind::Server));
        registry.register("location", build_location);
        registry.register("if", build_if);
        registry.register("include", build_include);
        registry.register("add_header", build_add_header);
        registry.register("set", build_set);
        registry.register("auth_request_set", build_auth_request_set);
        registry.register("perl_set", build_perl_set);
        registry.register("set_by_lua", build_set_by_lua);
        registry.register("rewrite", build_rewrite);
        registry.register("root", build_root);
        registry.register("alias", build_alias);
        registry
    }

    /// Registers (or replaces) a constructor for a statement name.
    pub fn register(&mut self, name: &'static str, constructor: DirectiveConstructor) {
        self.entries.insert(name, constructor);
    }

    /// The statement names with a typed constructor.
    pub fn known_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Constructs the typed payload for a statement, falling back to the
    /// generic untyped variant for unregistered names.
    pub fn construct(
        &self,
        name: &str,
        args: &[String],
        has_block: bool,
    ) -> Result<DirectiveKind, DirectiveError> {
        match self.entries.get(name) {
            Some(constructor) => constructor(args, has_block),
            None => Ok(DirectiveKind::Unknown { block: has_block }),
        }
    }
}

impl Default for DirectiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetches a required positional argument.
fn arg<'a>(directive: &str, args: &'a [String], index: usize) -> Result<&'a str, DirectiveError> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| DirectiveError::MissingArgument {
            directive: directive.to_string(),
            index,
        })
}

fn build_location(args: &[String], _: bool) -> Result<DirectiveKind, DirectiveError> {
    let (modifier, path) = match args {
        [path] => (None, path.clone()),
        [modifier, path, ..] => (Some(modifier.clone()), path.clone()),
        [] => {
            return Err(DirectiveError::MissingArgument {
                directive: "location".to_string(),
                index: 0,
            })
        }
    };
    Ok(DirectiveKind::Location { modifier, path })
}

fn build_if(args: &[String], _: bool) -> Result<DirectiveKind, DirectiveError> {
    arg("if", args, 0)?;
    // The lexer attaches exactly one syntactic paren to each outer token;
    // any further parens belong to the condition itself (e.g. a regex
    // ending in a capture group).
    let mut condition: Vec<String> = args.to_vec();
    if let Some(first) = condition.first_mut() {
        if let Some(stripped) = first.strip_prefix('(') {
            *first = stripped.to_string();
        }
    }
    if let Some(last) = condition.last_mut() {
        if let Some(stripped) = last.strip_suffix(')') {
            *last = stripped.to_string();
        }
    }
    condition.retain(|token| !token.is_empty());
    Ok(DirectiveKind::If { condition })
}

fn build_include(args: &[String], _: bool) -> Result<DirectiveKind, DirectiveError> {
    Ok(DirectiveKind::Include {
        pattern: arg("include", args, 0)?.to_string(),
    })
}

fn build_add_header(args: &[String], _: bool) -> Result<DirectiveKind, DirectiveError> {
    Ok(DirectiveKind::AddHeader {
        header: arg("add_header", args, 0)?.to_lowercase(),
        value: arg("add_header", args, 1)?.to_string(),
        always: args.get(2).map(String::as_str) == Some("always"),
    })
}

fn build_set(args: &[String], _: bool) -> Result<DirectiveKind, DirectiveError> {
    Ok(DirectiveKind::Set {
        variable: strip_sigil(arg("set", args, 0)?),
        value: arg("set", args, 1)?.to_string(),
    })
}

fn build_auth_request_set(args: &[String], _: bool) -> Result<DirectiveKind, DirectiveError> {
    Ok(DirectiveKind::AuthRequestSet {
        variable: strip_sigil(arg("auth_request_set", args, 0)?),
        value: arg("auth_request_set", args, 1)?.to_string(),
    })
}

fn build_perl_set(args: &[String], _: bool) -> Result<DirectiveKind, DirectiveError> {
    arg("perl_set", args, 1)?;
    Ok(DirectiveKind::PerlSet {
        variable: strip_sigil(arg("perl_set", args, 0)?),
    })
}

fn build_set_by_lua(args: &[String], _: bool) -> Result<DirectiveKind, DirectiveError> {
    arg("set_by_lua", args, 1)?;
    Ok(DirectiveKind::SetByLua {
        variable: strip_sigil(arg("set_by_lua", args, 0)?),
    })
}

fn build_rewrite(args: &[String], _: bool) -> Result<DirectiveKind, DirectiveError> {
    Ok(DirectiveKind::Rewrite {
        pattern: arg("rewrite", args, 0)?.to_string(),
        replace: arg("rewrite", args, 1)?.to_string(),
        flag: args.get(2).cloned(),
    })
}

fn build_root(args: &[String], _: bool) -> Result<DirectiveKind, DirectiveError> {
    Ok(DirectiveKind::Root {
        path: arg("root", args, 0)?.to_string(),
    })
}

fn build_alias(args: &[String], _: bool) -> Result<DirectiveKind, DirectiveError> {
    Ok(DirectiveKind::Alias {
        path: arg("alias", args, 0)?.to_string(),
    })
}

fn strip_sigil(token: &str) -> String {
    token.trim_matches('$').to_string()
}
