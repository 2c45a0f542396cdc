// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Parser and matcher for the gRPC-gateway path template grammar:
//!
//! ```text
//! Template = "/" Segments [ ":" Verb ]
//! Segments = Segment { "/" Segment }
//! Segment  = "*" | "**" | LITERAL | Variable
//! Variable = "{" FieldPath [ "=" Segments ] "}"
//! ```
//!
//! `**` matches the remainder of the path and may only appear last. A
//! variable without an explicit pattern matches exactly one segment.

use std::collections::HashMap;

use crate::error::GatewayError;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Wildcard,
    DeepWildcard,
    Variable { field: String, pattern: Vec<Segment> },
}

/// A compiled path template. Matching yields the captured variable values
/// keyed by field path.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
    verb: Option<String>,
    fields: Vec<String>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<PathTemplate, GatewayError> {
        Parser::new(template).template()
    }

    /// The template exactly as written in the annotation.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Field paths captured by this template, in declaration order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Match `path` (absolute, no query string) against the template,
    /// returning the captured variables on success.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let path = path.strip_prefix('/')?;

        let path = match &self.verb {
            Some(verb) => {
                let suffix = format!(":{verb}");
                path.strip_suffix(suffix.as_str())?
            }
            None => path,
        };

        let parts: Vec<&str> = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/').collect()
        };
        // empty segments (doubled or trailing slashes, bare verb suffix)
        if parts.iter().any(|part| part.is_empty()) {
            return None;
        }

        let mut captures = HashMap::new();
        if match_segments(&self.segments, &parts, &mut captures) {
            Some(captures)
        } else {
            None
        }
    }
}

fn match_segments(
    template: &[Segment],
    parts: &[&str],
    captures: &mut HashMap<String, String>,
) -> bool {
    let Some(first) = template.first() else {
        return parts.is_empty();
    };

    match first {
        Segment::Literal(lit) => {
            parts.first() == Some(&lit.as_str())
                && match_segments(&template[1..], &parts[1..], captures)
        }
        Segment::Wildcard => {
            !parts.is_empty() && match_segments(&template[1..], &parts[1..], captures)
        }
        Segment::DeepWildcard => true,
        Segment::Variable { field, pattern } => {
            let Some(consumed) = match_pattern(pattern, parts) else {
                return false;
            };
            captures.insert(field.clone(), parts[..consumed].join("/"));
            match_segments(&template[1..], &parts[consumed..], captures)
        }
    }
}

/// Match a variable's inner pattern against the head of `parts`, returning
/// how many segments it consumed. Inner patterns never contain variables.
fn match_pattern(pattern: &[Segment], parts: &[&str]) -> Option<usize> {
    let deep = matches!(pattern.last(), Some(Segment::DeepWildcard));

    let fixed = if deep { &pattern[..pattern.len() - 1] } else { pattern };
    if parts.len() < fixed.len() {
        return None;
    }

    for (segment, part) in fixed.iter().zip(parts) {
        match segment {
            Segment::Literal(lit) => {
                if lit != part {
                    return None;
                }
            }
            Segment::Wildcard => {}
            Segment::DeepWildcard | Segment::Variable { .. } => return None,
        }
    }

    // `**` consumes the remainder, zero segments included
    if deep {
        Some(parts.len())
    } else {
        Some(fixed.len())
    }
}

struct Parser<'a> {
    raw: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Parser<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            raw,
            chars: raw.chars().peekable(),
        }
    }

    fn err(&self, msg: impl std::fmt::Display) -> GatewayError {
        GatewayError::ContractViolation(format!("bad path template {:?}: {msg}", self.raw))
    }

    fn template(mut self) -> Result<PathTemplate, GatewayError> {
        if self.chars.next() != Some('/') {
            return Err(self.err("must begin with '/'"));
        }

        let mut segments = Vec::new();
        let mut fields = Vec::new();
        let mut verb = None;

        loop {
            let segment = self.segment(&mut fields)?;
            segments.push(segment);

            match self.chars.next() {
                Some('/') => continue,
                Some(':') => {
                    let rest: String = self.chars.by_ref().collect();
                    if rest.is_empty() {
                        return Err(self.err("empty verb"));
                    }
                    verb = Some(rest);
                    break;
                }
                Some(c) => return Err(self.err(format!("unexpected character {c:?}"))),
                None => break,
            }
        }

        validate_deep_wildcard(&segments).map_err(|msg| self.err(msg))?;

        Ok(PathTemplate {
            raw: self.raw.to_string(),
            segments,
            verb,
            fields,
        })
    }

    fn segment(&mut self, fields: &mut Vec<String>) -> Result<Segment, GatewayError> {
        match self.chars.peek() {
            Some('*') => {
                self.chars.next();
                if self.chars.peek() == Some(&'*') {
                    self.chars.next();
                    Ok(Segment::DeepWildcard)
                } else {
                    Ok(Segment::Wildcard)
                }
            }
            Some('{') => {
                self.chars.next();
                self.variable(fields)
            }
            _ => {
                let literal = self.literal()?;
                Ok(Segment::Literal(literal))
            }
        }
    }

    fn literal(&mut self) -> Result<String, GatewayError> {
        let mut out = String::new();
        while let Some(&c) = self.chars.peek() {
            if matches!(c, '/' | ':' | '{' | '}' | '=') {
                break;
            }
            out.push(c);
            self.chars.next();
        }
        if out.is_empty() {
            return Err(self.err("empty segment"));
        }
        Ok(out)
    }

    fn variable(&mut self, fields: &mut Vec<String>) -> Result<Segment, GatewayError> {
        let mut field = String::new();
        while let Some(&c) = self.chars.peek() {
            if c == '=' || c == '}' {
                break;
            }
            if !(c.is_ascii_alphanumeric() || c == '_' || c == '.') {
                return Err(self.err(format!("invalid field path character {c:?}")));
            }
            field.push(c);
            self.chars.next();
        }
        if field.is_empty() {
            return Err(self.err("empty field path"));
        }
        if fields.contains(&field) {
            return Err(self.err(format!("duplicate field {field:?}")));
        }

        let pattern = match self.chars.next() {
            Some('}') => vec![Segment::Wildcard],
            Some('=') => {
                let mut pattern = Vec::new();
                loop {
                    let mut throwaway = Vec::new();
                    let segment = self.segment(&mut throwaway)?;
                    if matches!(segment, Segment::Variable { .. }) || !throwaway.is_empty() {
                        return Err(self.err("nested variables are not allowed"));
                    }
                    pattern.push(segment);
                    match self.chars.next() {
                        Some('/') => continue,
                        Some('}') => break,
                        _ => return Err(self.err("unterminated variable pattern")),
                    }
                }
                pattern
            }
            _ => return Err(self.err("unterminated variable")),
        };

        validate_deep_wildcard(&pattern).map_err(|msg| self.err(msg))?;

        fields.push(field.clone());
        Ok(Segment::Variable { field, pattern })
    }
}

/// `**` may only appear as the final segment.
fn validate_deep_wildcard(segments: &[Segment]) -> Result<(), String> {
    for (idx, segment) in segments.iter().enumerate() {
        if matches!(segment, Segment::DeepWildcard) && idx != segments.len() - 1 {
            return Err("'**' must be the last segment".to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(template: &str, path: &str) -> Option<HashMap<String, String>> {
        PathTemplate::parse(template).unwrap().matches(path)
    }

    #[test]
    fn test_literal_match() {
        assert!(caps("/api/echo", "/api/echo").is_some());
        assert!(caps("/api/echo", "/api/other").is_none());
        assert!(caps("/api/echo", "/api/echo/extra").is_none());
        assert!(caps("/api/echo", "/api").is_none());
    }

    #[test]
    fn test_single_capture() {
        let captured = caps("/api/users/{id}", "/api/users/42").unwrap();
        assert_eq!(captured.get("id").map(String::as_str), Some("42"));
        assert!(caps("/api/users/{id}", "/api/users").is_none());
        assert!(caps("/api/users/{id}", "/api/users/42/posts").is_none());
    }

    #[test]
    fn test_multiple_captures() {
        let captured = caps(
            "/api/users/{user_id}/posts/{post_id}",
            "/api/users/7/posts/99",
        )
        .unwrap();
        assert_eq!(captured.get("user_id").map(String::as_str), Some("7"));
        assert_eq!(captured.get("post_id").map(String::as_str), Some("99"));
    }

    #[test]
    fn test_nested_field_path() {
        let captured = caps("/api/books/{book.id}", "/api/books/5").unwrap();
        assert_eq!(captured.get("book.id").map(String::as_str), Some("5"));
    }

    #[test]
    fn test_constrained_capture() {
        let template = PathTemplate::parse("/api/files/{path=docs/*}").unwrap();
        let captured = template.matches("/api/files/docs/readme").unwrap();
        assert_eq!(
            captured.get("path").map(String::as_str),
            Some("docs/readme")
        );
        assert!(template.matches("/api/files/img/readme").is_none());
    }

    #[test]
    fn test_deep_wildcard_capture() {
        let template = PathTemplate::parse("/api/files/{path=**}").unwrap();
        let captured = template.matches("/api/files/a/b/c").unwrap();
        assert_eq!(captured.get("path").map(String::as_str), Some("a/b/c"));
    }

    #[test]
    fn test_trailing_deep_wildcard() {
        let template = PathTemplate::parse("/api/static/**").unwrap();
        assert!(template.matches("/api/static/css/site.css").is_some());
        assert!(PathTemplate::parse("/api/**/static").is_err());
    }

    #[test]
    fn test_verb_suffix() {
        let template = PathTemplate::parse("/api/users/{id}:activate").unwrap();
        let captured = template.matches("/api/users/42:activate").unwrap();
        assert_eq!(captured.get("id").map(String::as_str), Some("42"));
        assert!(template.matches("/api/users/42").is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(PathTemplate::parse("api/echo").is_err());
        assert!(PathTemplate::parse("/api//echo").is_err());
        assert!(PathTemplate::parse("/api/{id").is_err());
        assert!(PathTemplate::parse("/api/{id}/{id}").is_err());
        assert!(PathTemplate::parse("/api/{a={b}}").is_err());
        assert!(PathTemplate::parse("/api/echo:").is_err());
    }

    #[test]
    fn test_fields_in_order() {
        let template = PathTemplate::parse("/v1/{a}/x/{b}/y/{c}").unwrap();
        assert_eq!(template.fields(), &["a", "b", "c"]);
    }
}
