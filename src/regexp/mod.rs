//! # Regular Expression Model
//!
//! Compiled representation of pattern strings found in nginx directives
//! (`rewrite`, regex `location` blocks, `if` comparisons).
//!
//! The model answers two questions for the variable-tracking engine:
//!
//! 1. Which capture groups does a pattern define? Named groups are keyed
//!    by their name, unnamed capturing groups by their 1-based textual
//!    position. Non-capturing constructs consume no identifier.
//! 2. What is a conservative character-class description of what each
//!    group (or the whole pattern) can match? This is metadata for the
//!    downstream rules, not a regex-equivalence proof: a superset
//!    approximation is acceptable and expected.
//!
//! Group scanning is purely textual, so patterns using engine-specific
//! syntax the `regex` crate rejects (backreferences, recursion) still
//! yield their group table. The crate-level compile is best effort and
//! only sharpens [`class_can_contain`] answers.

use log::debug;

/// One capture group discovered in a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexGroup {
    /// Group identifier: the explicit name, or the 1-based sequential
    /// index rendered as a string.
    pub id: String,

    /// The raw sub-expression captured by this group.
    pub pattern: String,

    /// Conservative character-class description of what the group can
    /// match (e.g. `[0-9]` for `\d+`).
    pub class: String,
}

/// Compiled representation of a pattern string.
///
/// Group identifiers are unique within one instance; named groups and
/// positionally numbered groups share the same identifier space (a named
/// group still consumes a sequential index internally).
#[derive(Debug, Clone)]
pub struct Regexp {
    pattern: String,
    case_sensitive: bool,
    groups: Vec<RegexGroup>,
}

impl Regexp {
    /// Builds the model for `pattern`.
    ///
    /// Never fails: group extraction is textual. A pattern the `regex`
    /// crate cannot compile is logged and still analyzed.
    pub fn new(pattern: &str, case_sensitive: bool) -> Self {
        if regex::Regex::new(pattern).is_err() {
            debug!("pattern not compilable by the regex crate, continuing textually: {pattern}");
        }

        let groups = scan_groups(pattern)
            .into_iter()
            .map(|(id, sub)| {
                let class = character_class(&sub, case_sensitive);
                RegexGroup {
                    id,
                    pattern: sub,
                    class,
                }
            })
            .collect();

        Self {
            pattern: pattern.to_string(),
            case_sensitive,
            groups,
        }
    }

    /// The source pattern text.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether literal character classes are interpreted case-sensitively.
    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// All capture groups in textual left-to-right order of group start.
    ///
    /// The full match (group `0`) is not part of this table; see
    /// [`Regexp::full_match_class`].
    pub fn groups(&self) -> &[RegexGroup] {
        &self.groups
    }

    /// Looks up a group by identifier (name or rendered index).
    pub fn group(&self, id: &str) -> Option<&RegexGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// Conservative character class for the full match.
    pub fn full_match_class(&self) -> String {
        character_class(&self.pattern, self.case_sensitive)
    }
}

/// Scans `pattern` for capture groups.
///
/// Returns `(identifier, sub-expression)` pairs in textual order of the
/// group-opening parenthesis. Recognized named forms: `(?P<name>…)`,
/// `(?<name>…)` and `(?'name'…)`. Everything else starting with `(?` is
/// non-capturing (grouping, lookaround, inline flags).
fn scan_groups(pattern: &str) -> Vec<(String, String)> {
    let bytes = pattern.as_bytes();
    // (open position, id, sub-expression); sorted by open position at the
    // end since nested groups close inner-first.
    let mut result: Vec<(usize, String, String)> = Vec::new();
    // Some((id, body_start)) for capturing groups, None for non-capturing.
    let mut open: Vec<Option<(String, usize)>> = Vec::new();
    let mut next_index = 1usize;
    let mut in_class = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'[' if !in_class => {
                in_class = true;
                i += 1;
                // A ']' directly after '[' (or '[^') is a literal member.
                if i < bytes.len() && bytes[i] == b'^' {
                    i += 1;
                }
                if i < bytes.len() && bytes[i] == b']' {
                    i += 1;
                }
            }
            b']' if in_class => {
                in_class = false;
                i += 1;
            }
            b'(' if !in_class => {
                if bytes.get(i + 1) == Some(&b'?') {
                    if let Some((name, body_start)) = parse_group_name(pattern, i) {
                        next_index += 1;
                        open.push(Some((name, body_start)));
                        i = body_start;
                    } else {
                        open.push(None);
                        i += 2;
                    }
                } else {
                    let id = next_index.to_string();
                    next_index += 1;
                    open.push(Some((id, i + 1)));
                    i += 1;
                }
            }
            b')' if !in_class => {
                if let Some(Some((id, start))) = open.pop() {
                    result.push((start, id, pattern[start..i].to_string()));
                }
                i += 1;
            }
            _ => i += 1,
        }
    }

    result.sort_by_key(|(start, _, _)| *start);
    result.into_iter().map(|(_, id, sub)| (id, sub)).collect()
}

/// Parses a named-group header starting at the `(` at `open`.
///
/// Returns the name and the byte offset of the group body, or `None`
/// when the construct is not a named capture (including lookbehind,
/// which also starts with `(?<`).
fn parse_group_name(pattern: &str, open: usize) -> Option<(String, usize)> {
    let rest = &pattern[open..];

    let (prefix, closer) = if rest.starts_with("(?P<") {
        (4, '>')
    } else if rest.starts_with("(?<") && !rest.starts_with("(?<=") && !rest.starts_with("(?<!") {
        (3, '>')
    } else if rest.starts_with("(?'") {
        (3, '\'')
    } else {
        return None;
    };

    let name_start = open + prefix;
    let end = pattern[name_start..].find(closer)?;
    let name = &pattern[name_start..name_start + end];
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), name_start + end + closer.len_utf8()))
}

/// Derives a conservative character-class description for a
/// sub-expression.
///
/// The union of every literal, escape class and bracket class appearing
/// in the expression is a superset of any single character it can match,
/// regardless of alternation and quantifier structure. A bare `.`
/// dominates everything except the newline it never matches.
pub fn character_class(sub: &str, case_sensitive: bool) -> String {
    // A sub-expression that is exactly one bracket class (modulo anchors
    // and a trailing quantifier) keeps its form, negation included.
    if let Some(class) = sole_bracket_class(sub) {
        if case_sensitive {
            return class.to_string();
        }
        let negated = class.starts_with("[^");
        let body = class
            .trim_start_matches('[')
            .trim_start_matches('^')
            .trim_end_matches(']');
        let widened = widen(body, false);
        return if negated {
            // Widening a negated class would shrink it; keep it as-is.
            class.to_string()
        } else {
            format!("[{widened}]")
        };
    }

    let bytes = sub.as_bytes();
    let mut atoms: Vec<String> = Vec::new();
    let mut any_wildcard = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                if let Some(&next) = bytes.get(i + 1) {
                    let c = next as char;
                    match c {
                        'd' | 'D' | 'w' | 'W' | 's' | 'S' => atoms.push(format!("\\{c}")),
                        'n' | 'r' | 't' => atoms.push(format!("\\{c}")),
                        _ if c.is_ascii_alphanumeric() => {
                            // Zero-width escape (\b, \A, ...): no
                            // character contribution.
                        }
                        _ => atoms.push(literal_atom(c, case_sensitive)),
                    }
                    i += 2;
                } else {
                    i += 1;
                }
            }
            b'[' => {
                let end = class_end(sub, i);
                let body = &sub[i + 1..end.min(sub.len())];
                if body.starts_with('^') {
                    // A negated class embedded in a larger expression can
                    // match almost anything; approximate as a wildcard.
                    any_wildcard = true;
                } else {
                    atoms.push(widen(body, case_sensitive));
                }
                i = end + 1;
            }
            b'.' => {
                any_wildcard = true;
                i += 1;
            }
            b'^' | b'$' | b'*' | b'+' | b'?' | b'|' | b'(' | b')' => i += 1,
            b'{' => {
                // Quantifier bounds contribute no characters.
                i += sub[i..].find('}').map(|o| o + 1).unwrap_or(1);
            }
            c => {
                atoms.push(literal_atom(c as char, case_sensitive));
                i += 1;
            }
        }
    }

    if any_wildcard {
        return "[^\\n]".to_string();
    }
    if atoms.is_empty() {
        return sub.to_string();
    }
    format!("[{}]", atoms.concat())
}

/// Returns the bracket class when `sub` consists of exactly one, ignoring
/// surrounding anchors and a trailing quantifier.
fn sole_bracket_class(sub: &str) -> Option<&str> {
    let trimmed = sub.trim_start_matches('^').trim_end_matches('$');
    let trimmed = strip_quantifier(trimmed);
    if !trimmed.starts_with('[') {
        return None;
    }
    let end = class_end(trimmed, 0);
    if end + 1 == trimmed.len() {
        Some(trimmed)
    } else {
        None
    }
}

/// Strips one trailing quantifier: `*`, `+`, `?` or a well-formed
/// `{m}`/`{m,n}` bound. Trailing digits that are not part of a brace
/// bound are literal atoms and stay put.
fn strip_quantifier(sub: &str) -> &str {
    // A lazy marker or a bare optional quantifier.
    let sub = sub.strip_suffix('?').unwrap_or(sub);
    if let Some(rest) = sub.strip_suffix(['*', '+']) {
        return rest;
    }
    if sub.ends_with('}') {
        if let Some(brace) = sub.rfind('{') {
            let bounds = &sub[brace + 1..sub.len() - 1];
            if !bounds.is_empty()
                && bounds.chars().all(|c| c.is_ascii_digit() || c == ',')
            {
                return &sub[..brace];
            }
        }
    }
    sub
}

/// Finds the index of the `]` closing the class opened at `open`.
fn class_end(sub: &str, open: usize) -> usize {
    let bytes = sub.as_bytes();
    let mut i = open + 1;
    if bytes.get(i) == Some(&b'^') {
        i += 1;
    }
    if bytes.get(i) == Some(&b']') {
        i += 1;
    }
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b']' => return i,
            _ => i += 1,
        }
    }
    sub.len().saturating_sub(1)
}

/// Renders a literal character as a class member, escaping metacharacters
/// and widening alphabetic case when requested.
fn literal_atom(c: char, case_sensitive: bool) -> String {
    let mut out = String::new();
    push_class_char(&mut out, c);
    if !case_sensitive && c.is_ascii_alphabetic() {
        push_class_char(&mut out, swap_case(c));
    }
    out
}

/// Widens the alphabetic content of a bracket-class body for
/// case-insensitive interpretation.
fn widen(body: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        return body.to_string();
    }
    let swapped: String = body
        .chars()
        .map(|c| if c.is_ascii_alphabetic() { swap_case(c) } else { c })
        .collect();
    if swapped == body {
        body.to_string()
    } else {
        format!("{body}{swapped}")
    }
}

fn swap_case(c: char) -> char {
    if c.is_ascii_lowercase() {
        c.to_ascii_uppercase()
    } else {
        c.to_ascii_lowercase()
    }
}

fn push_class_char(out: &mut String, c: char) {
    if matches!(c, '\\' | ']' | '[' | '^' | '-') {
        out.push('\\');
    }
    out.push(c);
}

/// Tests whether a derived character class permits `c`.
///
/// Uncompilable classes answer permissively: an approximation the rules
/// must treat as "cannot rule it out".
pub fn class_can_contain(class: &str, c: char) -> bool {
    match regex::Regex::new(&format!("^(?s:{class})$")) {
        Ok(re) => re.is_match(&c.to_string()),
        Err(_) => true,
    }
}
