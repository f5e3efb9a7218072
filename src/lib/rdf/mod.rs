//! The minimal RDF term model the pipelines shuffle around, plus N-Triples
//! text in both directions. Harvested input files are N-Triples shaped, one
//! statement per line; full Turtle stays out of scope.

use std::fmt::{self, Display, Formatter};

use serde_json::Value;

use crate::errors::HarveyError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Uri(String),
    BlankNode(String),
    Literal {
        value: String,
        datatype: Option<String>,
        language: Option<String>,
    },
}

impl Term {
    pub fn uri<S: Into<String>>(uri: S) -> Term {
        Term::Uri(uri.into())
    }

    pub fn literal<S: Into<String>>(value: S) -> Term {
        Term::Literal {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn typed_literal<S: Into<String>, D: Into<String>>(value: S, datatype: D) -> Term {
        Term::Literal {
            value: value.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }

    pub fn is_uri(&self) -> bool {
        matches!(self, Term::Uri(_))
    }

    pub fn uri_value(&self) -> Option<&str> {
        match self {
            Term::Uri(uri) => Some(uri),
            _ => None,
        }
    }

    /// Decodes a term out of a SPARQL results JSON binding.
    pub fn from_binding(binding: &Value) -> Result<Term, HarveyError> {
        let kind = binding["type"].as_str().unwrap_or_default();
        let value = binding["value"]
            .as_str()
            .ok_or_else(|| HarveyError::UnexpectedResponse(binding.to_string()))?
            .to_string();
        match kind {
            "uri" => Ok(Term::Uri(value)),
            "bnode" => Ok(Term::BlankNode(value)),
            "literal" | "typed-literal" => Ok(Term::Literal {
                value,
                datatype: binding["datatype"].as_str().map(|d| d.to_string()),
                language: binding["xml:lang"].as_str().map(|l| l.to_string()),
            }),
            _ => Err(HarveyError::UnexpectedResponse(binding.to_string())),
        }
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Term::Uri(uri) => write!(f, "<{uri}>"),
            Term::BlankNode(label) => write!(f, "_:{label}"),
            Term::Literal {
                value,
                datatype,
                language,
            } => {
                write!(f, "\"{}\"", escape_literal(value))?;
                if let Some(language) = language {
                    write!(f, "@{language}")
                } else if let Some(datatype) = datatype {
                    write!(f, "^^<{datatype}>")
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Triple {
        Triple {
            subject,
            predicate,
            object,
        }
    }
}

impl Display for Triple {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

pub fn escape_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn unescape_literal(value: &str) -> String {
    let mut unescaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some('t') => unescaped.push('\t'),
            Some(other) => unescaped.push(other),
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

pub fn triples_to_ntriples(triples: &[Triple]) -> String {
    triples
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses one N-Triples line. Blank lines and full-line comments come back
/// as `None`.
pub fn parse_ntriples_line(line: &str) -> Result<Option<Triple>, HarveyError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let mut cursor = Cursor::new(line, trimmed);
    let subject = cursor.parse_term()?;
    let predicate = cursor.parse_term()?;
    let object = cursor.parse_term()?;
    cursor.expect_end()?;
    Ok(Some(Triple::new(subject, predicate, object)))
}

struct Cursor<'a> {
    line: &'a str,
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a str, trimmed: &'a str) -> Cursor<'a> {
        Cursor {
            line,
            rest: trimmed,
        }
    }

    fn invalid(&self) -> HarveyError {
        HarveyError::InvalidTriple(self.line.to_string())
    }

    fn parse_term(&mut self) -> Result<Term, HarveyError> {
        self.rest = self.rest.trim_start();
        if let Some(rest) = self.rest.strip_prefix('<') {
            let end = rest.find('>').ok_or_else(|| self.invalid())?;
            let uri = rest[..end].to_string();
            self.rest = &rest[end + 1..];
            return Ok(Term::Uri(uri));
        }
        if let Some(rest) = self.rest.strip_prefix("_:") {
            let end = rest
                .find(|c: char| c.is_whitespace())
                .unwrap_or(rest.len());
            let label = rest[..end].to_string();
            self.rest = &rest[end..];
            return Ok(Term::BlankNode(label));
        }
        if let Some(rest) = self.rest.strip_prefix('"') {
            let end = find_closing_quote(rest).ok_or_else(|| self.invalid())?;
            let value = unescape_literal(&rest[..end]);
            self.rest = &rest[end + 1..];
            if let Some(rest) = self.rest.strip_prefix("^^<") {
                let end = rest.find('>').ok_or_else(|| self.invalid())?;
                let datatype = rest[..end].to_string();
                self.rest = &rest[end + 1..];
                return Ok(Term::Literal {
                    value,
                    datatype: Some(datatype),
                    language: None,
                });
            }
            if let Some(rest) = self.rest.strip_prefix('@') {
                let end = rest
                    .find(|c: char| c.is_whitespace())
                    .unwrap_or(rest.len());
                let language = rest[..end].to_string();
                self.rest = &rest[end..];
                return Ok(Term::Literal {
                    value,
                    datatype: None,
                    language: Some(language),
                });
            }
            return Ok(Term::Literal {
                value,
                datatype: None,
                language: None,
            });
        }
        Err(self.invalid())
    }

    fn expect_end(&mut self) -> Result<(), HarveyError> {
        let rest = self.rest.trim();
        if rest == "." {
            Ok(())
        } else {
            Err(self.invalid())
        }
    }
}

fn find_closing_quote(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_terms_roundtrip() {
        let line = "<http://a.example/s> <http://a.example/p> <http://a.example/o> .";
        let triple = parse_ntriples_line(line).unwrap().unwrap();
        assert_eq!(triple.subject, Term::uri("http://a.example/s"));
        assert_eq!(triple.to_string(), line);
    }

    #[test]
    fn literal_escaping_roundtrips() {
        let triple = Triple::new(
            Term::uri("http://a.example/s"),
            Term::uri("http://a.example/p"),
            Term::literal("line one\nline \"two\"\\end"),
        );
        let parsed = parse_ntriples_line(&triple.to_string()).unwrap().unwrap();
        assert_eq!(parsed, triple);
    }

    #[test]
    fn language_and_datatype_tags_parse() {
        let line = r#"<http://a.example/s> <http://a.example/p> "hallo"@nl ."#;
        let triple = parse_ntriples_line(line).unwrap().unwrap();
        assert_eq!(
            triple.object,
            Term::Literal {
                value: "hallo".to_string(),
                datatype: None,
                language: Some("nl".to_string()),
            }
        );

        let line = r#"<http://a.example/s> <http://a.example/p> "5"^^<http://www.w3.org/2001/XMLSchema#integer> ."#;
        let triple = parse_ntriples_line(line).unwrap().unwrap();
        assert_eq!(
            triple.object,
            Term::typed_literal("5", "http://www.w3.org/2001/XMLSchema#integer")
        );
    }

    #[test]
    fn blank_nodes_parse() {
        let line = "_:b0 <http://a.example/p> _:b1 .";
        let triple = parse_ntriples_line(line).unwrap().unwrap();
        assert_eq!(triple.subject, Term::BlankNode("b0".to_string()));
        assert_eq!(triple.object, Term::BlankNode("b1".to_string()));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        assert!(parse_ntriples_line("").unwrap().is_none());
        assert!(parse_ntriples_line("   ").unwrap().is_none());
        assert!(parse_ntriples_line("# a comment").unwrap().is_none());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_ntriples_line("not a triple").is_err());
        assert!(parse_ntriples_line("<http://a.example/s> <http://a.example/p>").is_err());
    }

    #[test]
    fn bindings_decode() {
        let uri = serde_json::json!({"type": "uri", "value": "http://a.example/s"});
        assert_eq!(
            Term::from_binding(&uri).unwrap(),
            Term::uri("http://a.example/s")
        );

        let tagged = serde_json::json!({"type": "literal", "value": "hallo", "xml:lang": "nl"});
        assert_eq!(
            Term::from_binding(&tagged).unwrap(),
            Term::Literal {
                value: "hallo".to_string(),
                datatype: None,
                language: Some("nl".to_string()),
            }
        );

        let typed = serde_json::json!({
            "type": "typed-literal",
            "value": "5",
            "datatype": "http://www.w3.org/2001/XMLSchema#integer"
        });
        assert_eq!(
            Term::from_binding(&typed).unwrap(),
            Term::typed_literal("5", "http://www.w3.org/2001/XMLSchema#integer")
        );
    }
}
