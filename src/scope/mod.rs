//! # Variable Scope Tracking
//!
//! Variables and the stack of nested scope frames maintained during a
//! configuration audit.
//!
//! A frame is pushed for every block that declares its own variable
//! context (`server`, `location`, `if`, ...) plus one root frame per run.
//! Lookups walk from the innermost active frame outward to the root, then
//! fall back to the table of nginx built-in variables.
//!
//! ## Key Types
//!
//! - [`Variable`] - a named binding with provenance and value shape
//! - [`Scope`] - one frame of the nesting stack
//! - [`ScopeStack`] - the ordered stack of active frames
//!
//! The reserved variable name `"0"` is the full-match sentinel of a regex
//! match: inserting it purges every numerically named variable already
//! bound in the same frame, so stale capture groups from a previous regex
//! never leak into matches of a new one.

use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::directives::Directive;
use crate::regexp::class_can_contain;

/// Errors raised by scope-stack operations.
///
/// Both variants indicate a defect in the traversal driver, never a
/// problem with user input.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// `pop` was called with only the root frame (or nothing) on the
    /// stack.
    #[error("unbalanced scope stack: pop past the root frame")]
    UnbalancedScope,

    /// A variable was added before any frame was pushed.
    #[error("no active scope frame")]
    NoActiveScope,
}

/// The shape of a variable's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableValue {
    /// A literal string known at analysis time (e.g. from `set`).
    Literal(String),

    /// A derived character-class pattern describing what the value can
    /// match (e.g. a regex capture group).
    Pattern(String),
}

/// A named value binding introduced by a directive's execution.
///
/// Tracks provenance and shape only, never a concrete runtime string.
/// The provider is set at construction and never reassigned; built-in
/// nginx variables have no provider.
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    value: Option<VariableValue>,
    provider: Option<Rc<Directive>>,
    boundary: Option<String>,
    have_script: bool,
}

impl Variable {
    /// A variable with a statically known literal value.
    pub fn literal(name: &str, value: &str, provider: Rc<Directive>) -> Self {
        debug_assert!(!name.is_empty());
        Self {
            name: name.to_string(),
            value: Some(VariableValue::Literal(value.to_string())),
            provider: Some(provider),
            boundary: None,
            have_script: true,
        }
    }

    /// A variable whose value is described by a derived character-class
    /// pattern, optionally constrained by an outer boundary class.
    pub fn pattern(
        name: &str,
        class: &str,
        boundary: Option<&str>,
        provider: Rc<Directive>,
    ) -> Self {
        debug_assert!(!name.is_empty());
        Self {
            name: name.to_string(),
            value: Some(VariableValue::Pattern(class.to_string())),
            provider: Some(provider),
            boundary: boundary.map(str::to_string),
            have_script: false,
        }
    }

    /// A provider-only variable produced by an external-evaluation
    /// directive (`perl_set`, `set_by_lua`): no literal value, and the
    /// provider supplies raw untemplated text.
    pub fn script(name: &str, provider: Rc<Directive>) -> Self {
        debug_assert!(!name.is_empty());
        Self {
            name: name.to_string(),
            value: None,
            provider: Some(provider),
            boundary: None,
            have_script: false,
        }
    }

    /// A built-in nginx variable with an optional boundary class.
    fn builtin(name: &str, boundary: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            value: None,
            provider: None,
            boundary: boundary.map(str::to_string),
            have_script: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&VariableValue> {
        self.value.as_ref()
    }

    /// The directive that introduced this binding, if any.
    pub fn provider(&self) -> Option<&Rc<Directive>> {
        self.provider.as_ref()
    }

    /// The maximal character class the value may legally contain.
    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    /// False when the provider is known to supply raw untemplated text.
    pub fn have_script(&self) -> bool {
        self.have_script
    }

    /// Whether the variable's value may contain `c`.
    ///
    /// Consults the boundary first, then the derived pattern, then the
    /// literal value. A variable with none of those is attacker-shaped:
    /// anything is possible.
    pub fn can_contain(&self, c: char) -> bool {
        if let Some(boundary) = &self.boundary {
            return class_can_contain(boundary, c);
        }
        match &self.value {
            Some(VariableValue::Pattern(class)) => class_can_contain(class, c),
            Some(VariableValue::Literal(value)) => value.contains(c),
            None => true,
        }
    }
}

/// Looks up one of the built-in nginx variables.
///
/// The table is deliberately small: only variables whose shape matters to
/// the shipped rules. Boundaries are conservative supersets of what nginx
/// guarantees.
pub fn builtin_variable(name: &str) -> Option<Variable> {
    match name {
        // Url-decoded by nginx, so an encoded %0d%0a survives into the
        // value. No boundary.
        "uri" | "document_uri" => Some(Variable::builtin(name, None)),
        // Taken verbatim from the request line, which cannot hold raw
        // control characters or spaces.
        "request_uri" | "args" | "query_string" => {
            Some(Variable::builtin(name, Some(r"[^\s\r\n]")))
        }
        "host" | "http_host" => Some(Variable::builtin(name, Some(r"[a-zA-Z0-9.\-:]"))),
        "remote_addr" => Some(Variable::builtin(name, Some(r"[0-9a-fA-F.:]"))),
        _ => None,
    }
}

/// One frame of the scope stack.
///
/// Later bindings for the same name shadow earlier ones within the frame.
#[derive(Debug, Default)]
pub struct Scope {
    owner: Option<Rc<Directive>>,
    variables: HashMap<String, Variable>,
}

impl Scope {
    fn new(owner: Option<Rc<Directive>>) -> Self {
        Self {
            owner,
            variables: HashMap::new(),
        }
    }

    /// The block directive this frame belongs to (`None` only in tests).
    pub fn owner(&self) -> Option<&Rc<Directive>> {
        self.owner.as_ref()
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Inserts a binding, applying the index-variable purge rule.
    ///
    /// The `"0"` sentinel marks the start of a new regex match: every
    /// numerically named variable still bound in this frame belongs to a
    /// previous match and is removed first.
    pub fn add_variable(&mut self, var: Variable) {
        if var.name() == "0" {
            self.clear_index_vars();
        }
        self.variables.insert(var.name().to_string(), var);
    }

    /// Removes every numerically named variable from this frame.
    pub fn clear_index_vars(&mut self) {
        self.variables
            .retain(|name, _| !name.chars().all(|c| c.is_ascii_digit()));
    }
}

/// The ordered stack of active scope frames.
///
/// Run-scoped: the traversal driver owns one instance per audit run and
/// passes it explicitly through the recursive walk, so two runs never
/// observe each other's bindings.
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<Scope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Pushes and activates a new frame tied to a scope-owning node.
    pub fn push(&mut self, owner: Option<Rc<Directive>>) {
        self.frames.push(Scope::new(owner));
    }

    /// Deactivates and discards the top frame.
    ///
    /// Fails once the stack is at its root-only floor; use
    /// [`ScopeStack::purge_all`] to release the root at the end of a run.
    pub fn pop(&mut self) -> Result<(), ScopeError> {
        if self.frames.len() <= 1 {
            return Err(ScopeError::UnbalancedScope);
        }
        self.frames.pop();
        Ok(())
    }

    /// The currently active frame.
    pub fn current(&self) -> Option<&Scope> {
        self.frames.last()
    }

    /// Inserts a variable into the currently active frame, applying the
    /// index-variable purge rule from [`Scope::add_variable`].
    pub fn add_variable(&mut self, var: Variable) -> Result<(), ScopeError> {
        let frame = self.frames.last_mut().ok_or(ScopeError::NoActiveScope)?;
        frame.add_variable(var);
        Ok(())
    }

    /// Looks up a variable from the innermost active frame outward.
    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Like [`ScopeStack::lookup`], falling back to the built-in table.
    pub fn resolve(&self, name: &str) -> Option<Variable> {
        self.lookup(name)
            .cloned()
            .or_else(|| builtin_variable(name))
    }

    /// Number of active frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Discards every frame, the root included. Used exactly once at the
    /// end (or abort) of an audit run.
    pub fn purge_all(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directives::DirectiveRegistry;

    fn provider() -> Rc<Directive> {
        let registry = DirectiveRegistry::new();
        Directive::from_parts(
            "set",
            vec!["$test".to_string(), "value".to_string()],
            None,
            false,
            &registry,
        )
        .unwrap()
    }

    fn var(name: &str) -> Variable {
        Variable::literal(name, "x", provider())
    }

    #[test]
    fn test_shadowing_within_frame() {
        let mut scope = Scope::default();
        scope.add_variable(Variable::literal("a", "first", provider()));
        scope.add_variable(Variable::literal("a", "second", provider()));
        assert_eq!(scope.len(), 1);
        assert_eq!(
            scope.get("a").unwrap().value(),
            Some(&VariableValue::Literal("second".to_string()))
        );
    }

    #[test]
    fn test_index_var_purge() {
        let mut scope = Scope::default();
        scope.add_variable(var("1"));
        scope.add_variable(var("2"));
        scope.add_variable(var("named"));
        scope.add_variable(var("0"));

        assert!(scope.get("1").is_none(), "stale capture must be purged");
        assert!(scope.get("2").is_none(), "stale capture must be purged");
        assert!(scope.get("named").is_some(), "non-numeric names untouched");
        assert!(scope.get("0").is_some());
    }

    #[test]
    fn test_lookup_inner_frame_wins() {
        let mut stack = ScopeStack::new();
        stack.push(None);
        stack.add_variable(Variable::literal("x", "outer", provider())).unwrap();
        stack.push(None);
        stack.add_variable(Variable::literal("x", "inner", provider())).unwrap();

        assert_eq!(
            stack.lookup("x").unwrap().value(),
            Some(&VariableValue::Literal("inner".to_string()))
        );

        stack.pop().unwrap();
        assert_eq!(
            stack.lookup("x").unwrap().value(),
            Some(&VariableValue::Literal("outer".to_string()))
        );
    }

    #[test]
    fn test_inner_binding_invisible_after_pop() {
        let mut stack = ScopeStack::new();
        stack.push(None);
        stack.push(None);
        stack.add_variable(var("only_inner")).unwrap();
        stack.pop().unwrap();
        assert!(stack.lookup("only_inner").is_none());
    }

    #[test]
    fn test_pop_past_root_fails() {
        let mut stack = ScopeStack::new();
        stack.push(None);
        assert!(matches!(stack.pop(), Err(ScopeError::UnbalancedScope)));
    }

    #[test]
    fn test_add_variable_without_frame_fails() {
        let mut stack = ScopeStack::new();
        assert!(matches!(
            stack.add_variable(var("x")),
            Err(ScopeError::NoActiveScope)
        ));
    }

    #[test]
    fn test_purge_all_empties_stack() {
        let mut stack = ScopeStack::new();
        stack.push(None);
        stack.push(None);
        stack.purge_all();
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_builtin_fallback() {
        let stack = {
            let mut s = ScopeStack::new();
            s.push(None);
            s
        };
        let uri = stack.resolve("uri").unwrap();
        assert!(uri.can_contain('\n'), "decoded uri may hold control chars");

        let req = stack.resolve("request_uri").unwrap();
        assert!(!req.can_contain('\n'));
        assert!(req.can_contain('/'));

        assert!(stack.resolve("no_such_builtin").is_none());
    }

    #[test]
    fn test_can_contain_literal_and_pattern() {
        let lit = Variable::literal("v", "bar", provider());
        assert!(lit.can_contain('b'));
        assert!(!lit.can_contain('\n'));

        let pat = Variable::pattern("1", r"[\d]", Some(r"[^\s\r\n]"), provider());
        assert!(!pat.can_contain('\n'), "boundary takes precedence");
        assert!(pat.can_contain('7'));

        let script = Variable::script("s", provider());
        assert!(script.can_contain('\n'), "unknown shape is permissive");
    }
}
