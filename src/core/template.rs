//! TM-003: Message templates and topic filters.
//!
//! Parses `${...}` substitution templates used in dimension values and
//! extracts the topic filter from the rule SQL so `${topic(n)}` indexes can
//! be checked against the number of topic segments.

use regex::Regex;
use std::sync::LazyLock;

/// One `${...}` substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Substitution {
    /// Payload field reference, e.g. `${temperature}` or `${reading.celsius}`
    Field(String),
    /// Topic segment (1-based); `None` is the whole topic
    Topic(Option<usize>),
    /// Any other rule-engine function, e.g. `${timestamp()}`
    Function { name: String, args: String },
    /// Any other rule-engine expression, e.g. `${temperature * 1.8 + 32}`
    /// or `${readings[0]}`. Kept opaque apart from its `topic(n)` calls.
    Expression(String),
}

impl Substitution {
    /// Topic segment indexes this substitution reads.
    pub fn topic_indexes(&self) -> Vec<usize> {
        match self {
            Self::Topic(Some(n)) => vec![*n],
            Self::Topic(None) | Self::Field(_) => Vec::new(),
            Self::Function { args, .. } => embedded_topic_indexes(args),
            Self::Expression(body) => embedded_topic_indexes(body),
        }
    }
}

static TOPIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^topic\(\s*(\d*)\s*\)$").expect("regular expression should compile")
});

static TOPIC_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\btopic\(\s*(\d+)\s*\)").expect("regular expression should compile")
});

static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("regular expression should compile")
});

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\((.*)\)$").expect("regular expression should compile")
});

static FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bFROM\s+'([^']*)'").expect("regular expression should compile")
});

/// Parse a single substitution body (the text between `${` and `}`).
pub fn parse_substitution(body: &str) -> Result<Substitution, String> {
    let body = body.trim();
    if body.is_empty() {
        return Err("empty substitution".to_string());
    }
    if let Some(caps) = TOPIC_RE.captures(body) {
        let digits = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        if digits.is_empty() {
            return Ok(Substitution::Topic(None));
        }
        return parse_topic_index(digits).map(|n| Substitution::Topic(Some(n)));
    }
    check_balanced(body)?;
    for caps in TOPIC_CALL_RE.captures_iter(body) {
        parse_topic_index(&caps[1])?;
    }
    if FIELD_RE.is_match(body) {
        return Ok(Substitution::Field(body.to_string()));
    }
    if let Some(caps) = FUNCTION_RE.captures(body) {
        // `abs(a) + abs(b)` also matches the pattern; its "args" are unbalanced.
        let args = caps[2].trim();
        if check_balanced(args).is_ok() {
            return Ok(Substitution::Function {
                name: caps[1].to_string(),
                args: args.to_string(),
            });
        }
    }
    Ok(Substitution::Expression(body.to_string()))
}

fn parse_topic_index(digits: &str) -> Result<usize, String> {
    let n: usize = digits
        .parse()
        .map_err(|e| format!("invalid topic index '{}': {}", digits, e))?;
    if n == 0 {
        return Err("topic index is 1-based, got 0".to_string());
    }
    Ok(n)
}

fn embedded_topic_indexes(body: &str) -> Vec<usize> {
    TOPIC_CALL_RE
        .captures_iter(body)
        .filter_map(|caps| caps[1].parse().ok())
        .collect()
}

/// Brackets outside single-quoted strings must nest and close.
fn check_balanced(body: &str) -> Result<(), String> {
    let mut stack = Vec::new();
    let mut in_string = false;
    for c in body.chars() {
        if in_string {
            in_string = c != '\'';
            continue;
        }
        match c {
            '\'' => in_string = true,
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(open) {
                    return Err(format!("unbalanced '{}' in: {}", c, body));
                }
            }
            _ => {}
        }
    }
    if in_string {
        return Err(format!("unterminated string in: {}", body));
    }
    if let Some(open) = stack.pop() {
        return Err(format!("unbalanced '{}' in: {}", open, body));
    }
    Ok(())
}

/// Byte offset of the `}` closing a substitution whose body starts at
/// `from`. Nested braces and quoted strings are skipped.
fn find_close(template: &str, from: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    for (offset, c) in template[from..].char_indices() {
        if in_string {
            in_string = c != '\'';
            continue;
        }
        match c {
            '\'' => in_string = true,
            '{' => depth += 1,
            '}' if depth == 0 => return Some(from + offset),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Parse every `${...}` in a template string. Literal text is skipped.
pub fn parse_template(template: &str) -> Result<Vec<Substitution>, String> {
    let mut subs = Vec::new();
    let mut start = 0;

    while let Some(open) = template[start..].find("${") {
        let open = start + open;
        let close = find_close(template, open + 2)
            .ok_or_else(|| format!("unclosed substitution at position {}", open))?;
        subs.push(parse_substitution(&template[open + 2..close])?);
        start = close + 1;
    }

    Ok(subs)
}

/// Extract the quoted topic filter from a rule query.
pub fn topic_filter(sql: &str) -> Result<String, String> {
    FROM_RE
        .captures(sql)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| format!("no FROM '<topic>' clause in: {}", sql))
}

/// Number of segments a topic filter can bind. `None` when the filter ends
/// in `#` (any depth).
pub fn topic_depth(filter: &str) -> Option<usize> {
    let segments: Vec<&str> = filter.split('/').collect();
    if segments.last() == Some(&"#") {
        return None;
    }
    Some(segments.len())
}

/// Check every `${topic(n)}` in `template` against the rule's topic filter.
pub fn check_topic_indexes(template: &str, filter: &str) -> Result<(), (usize, usize)> {
    let Some(depth) = topic_depth(filter) else {
        return Ok(());
    };
    let Ok(subs) = parse_template(template) else {
        return Ok(());
    };
    for n in subs.iter().flat_map(Substitution::topic_indexes) {
        if n > depth {
            return Err((n, depth));
        }
    }
    Ok(())
}
