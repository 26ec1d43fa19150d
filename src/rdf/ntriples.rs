//! N-Triples export and import.
//!
//! Export writes one triple per line with absolute IRIs, sorted, so two
//! ledgers with the same content produce byte-identical files. Import
//! accepts the PROV-O subset written by [`to_ntriples`], restores the
//! namespace bindings, and rebuilds the graph through the same checks live
//! recording goes through.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{
    binding_triples, escape_iri, escape_literal, triples, Term, PROV_ACTIVITY, PROV_AGENT, PROV_ENDED_AT_TIME,
    PROV_ENTITY, PROV_GENERATED, PROV_SOFTWARE_AGENT, PROV_STARTED_AT_TIME, PROV_USED, PROV_WAS_ASSOCIATED_WITH,
    PROV_WAS_DERIVED_FROM, PROV_WAS_GENERATED_BY, RDFS_LABEL, RDF_TYPE, SIMPROV_EXTRA, SIMPROV_LOCATION,
    SIMPROV_PREFIX, SIMPROV_VERSION,
};
use crate::graph::{Attributes, Namespaces, NodeId, NodeKind, ProvError, ProvNode, ProvResult, ProvenanceGraph, Relation};

/// Serialize a graph to N-Triples
#[must_use]
pub fn to_ntriples(graph: &ProvenanceGraph) -> String {
    let mut lines: Vec<String> = binding_triples(graph)
        .into_iter()
        .chain(triples(graph))
        .map(|t| format!("<{}> <{}> {} .", escape_iri(t.subject), t.predicate, object(&t.object)))
        .collect();
    lines.sort();
    lines.dedup();

    let mut out = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Parse N-Triples into a graph with the default namespace table
pub fn from_ntriples(text: &str) -> ProvResult<ProvenanceGraph> {
    from_ntriples_with_namespaces(text, Namespaces::default())
}

/// Parse N-Triples into a graph starting from the given namespace table.
///
/// `simprov:prefix` bindings in the document override the table. Triples
/// with predicates outside the PROV-O subset are skipped. Blank nodes are
/// rejected since every provenance node is named.
pub fn from_ntriples_with_namespaces(text: &str, mut namespaces: Namespaces) -> ProvResult<ProvenanceGraph> {
    let mut descriptions: BTreeMap<String, Description> = BTreeMap::new();
    let mut starts = Vec::new();
    let mut ends = Vec::new();
    let mut links = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let Some((subject, predicate, object)) = parse_line(line, raw)? else {
            continue;
        };

        match predicate.as_str() {
            RDF_TYPE => {
                let kind = match object.as_iri(line)? {
                    PROV_ENTITY => NodeKind::Entity,
                    PROV_ACTIVITY => NodeKind::Activity,
                    PROV_AGENT | PROV_SOFTWARE_AGENT => NodeKind::Agent,
                    other => {
                        debug!(line, rdf_type = other, "skipping non-PROV type");
                        continue;
                    }
                };
                let description = describe(&mut descriptions, subject, line);
                match description.kind {
                    Some(existing) if existing != kind => {
                        return Err(parse_error(
                            line,
                            format!("node typed as both {} and {}", existing, kind),
                        ));
                    }
                    _ => description.kind = Some(kind),
                }
            }
            RDFS_LABEL => {
                describe(&mut descriptions, subject, line).label = Some(object.into_literal(line)?);
            }
            SIMPROV_LOCATION => {
                describe(&mut descriptions, subject, line).location = Some(object.into_literal(line)?);
            }
            SIMPROV_VERSION => {
                let raw = object.into_literal(line)?;
                let version = raw
                    .parse::<u32>()
                    .ok()
                    .filter(|v| *v >= 1)
                    .ok_or_else(|| parse_error(line, format!("invalid version {:?}", raw)))?;
                describe(&mut descriptions, subject, line).version = Some(version);
            }
            SIMPROV_PREFIX => {
                let prefix = object.into_literal(line)?;
                if prefix.is_empty() || prefix.contains(':') {
                    return Err(parse_error(line, format!("invalid namespace prefix {:?}", prefix)));
                }
                namespaces.bind(prefix, subject);
            }
            SIMPROV_EXTRA => {
                let raw = object.into_literal(line)?;
                let extra: Attributes = serde_json::from_str(&raw)
                    .map_err(|e| parse_error(line, format!("invalid extra attributes: {}", e)))?;
                describe(&mut descriptions, subject, line).extra = Some(extra);
            }
            PROV_STARTED_AT_TIME => starts.push(Relation::StartedAtTime {
                activity: NodeId::from_string(subject),
                at: date_time(line, &object.into_literal(line)?)?,
            }),
            PROV_ENDED_AT_TIME => ends.push(Relation::EndedAtTime {
                activity: NodeId::from_string(subject),
                at: date_time(line, &object.into_literal(line)?)?,
            }),
            PROV_WAS_ASSOCIATED_WITH => links.push(Relation::WasAssociatedWith {
                activity: NodeId::from_string(subject),
                agent: NodeId::from_string(object.into_iri(line)?),
            }),
            PROV_USED => links.push(Relation::Used {
                activity: NodeId::from_string(subject),
                entity: NodeId::from_string(object.into_iri(line)?),
            }),
            PROV_WAS_GENERATED_BY => links.push(Relation::Generated {
                producer: NodeId::from_string(object.into_iri(line)?),
                product: NodeId::from_string(subject),
            }),
            PROV_GENERATED => links.push(Relation::Generated {
                producer: NodeId::from_string(subject),
                product: NodeId::from_string(object.into_iri(line)?),
            }),
            PROV_WAS_DERIVED_FROM => links.push(Relation::WasDerivedFrom {
                derived: NodeId::from_string(subject),
                source: NodeId::from_string(object.into_iri(line)?),
            }),
            other => debug!(line, predicate = other, "skipping unknown predicate"),
        }
    }

    let mut nodes = Vec::with_capacity(descriptions.len());
    for (id, description) in descriptions {
        let kind = description
            .kind
            .ok_or_else(|| parse_error(description.line, format!("{} has no PROV type", id)))?;
        nodes.push(ProvNode {
            id: NodeId::from_string(id),
            kind,
            label: description.label,
            location: description.location,
            version: description.version.unwrap_or(1),
            extra: description.extra.unwrap_or_default(),
        });
    }

    // Starts before ends so timing checks see them in causal order
    let relations = starts.into_iter().chain(ends).chain(links);
    ProvenanceGraph::restore(namespaces, nodes, relations)
}

/// Attributes collected for one subject
struct Description {
    line: usize,
    kind: Option<NodeKind>,
    label: Option<String>,
    location: Option<String>,
    version: Option<u32>,
    extra: Option<Attributes>,
}

fn describe(descriptions: &mut BTreeMap<String, Description>, subject: String, line: usize) -> &mut Description {
    descriptions.entry(subject).or_insert_with(|| Description {
        line,
        kind: None,
        label: None,
        location: None,
        version: None,
        extra: None,
    })
}

fn object(term: &Term) -> String {
    match term {
        Term::Iri(iri) => format!("<{}>", escape_iri(iri)),
        Term::Literal { value, datatype: None } => format!("\"{}\"", escape_literal(value)),
        Term::Literal {
            value,
            datatype: Some(datatype),
        } => format!("\"{}\"^^<{}>", escape_literal(value), datatype),
    }
}

fn date_time(line: usize, raw: &str) -> ProvResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| parse_error(line, format!("invalid dateTime {:?}: {}", raw, e)))
}

fn parse_error(line: usize, message: impl Into<String>) -> ProvError {
    ProvError::Parse {
        line,
        message: message.into(),
    }
}

// === Line parser ===

/// Object of a parsed triple
#[derive(Debug, PartialEq)]
enum Object {
    Iri(String),
    Literal(String),
}

impl Object {
    fn as_iri(&self, line: usize) -> ProvResult<&str> {
        match self {
            Self::Iri(iri) => Ok(iri),
            Self::Literal(_) => Err(parse_error(line, "expected an IRI object")),
        }
    }

    fn into_iri(self, line: usize) -> ProvResult<String> {
        match self {
            Self::Iri(iri) => Ok(iri),
            Self::Literal(_) => Err(parse_error(line, "expected an IRI object")),
        }
    }

    fn into_literal(self, line: usize) -> ProvResult<String> {
        match self {
            Self::Literal(value) => Ok(value),
            Self::Iri(_) => Err(parse_error(line, "expected a literal object")),
        }
    }
}

/// Parse one line; `None` for blank lines and comments
fn parse_line(line: usize, text: &str) -> ProvResult<Option<(String, String, Object)>> {
    let mut cursor = Cursor { line, input: text, pos: 0 };
    cursor.skip_whitespace();
    if matches!(cursor.peek(), None | Some('#')) {
        return Ok(None);
    }

    let subject = cursor.iri()?;
    cursor.skip_whitespace();
    let predicate = cursor.iri()?;
    cursor.skip_whitespace();
    let object = match cursor.peek() {
        Some('<') => Object::Iri(cursor.iri()?),
        Some('"') => Object::Literal(cursor.literal()?),
        Some('_') => return Err(cursor.error("blank nodes are not supported")),
        _ => return Err(cursor.error("expected an IRI or literal object")),
    };
    cursor.skip_whitespace();
    cursor.expect('.')?;
    cursor.skip_whitespace();
    if !matches!(cursor.peek(), None | Some('#')) {
        return Err(cursor.error("unexpected content after '.'"));
    }
    Ok(Some((subject, predicate, object)))
}

struct Cursor<'a> {
    line: usize,
    input: &'a str,
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
            self.bump();
        }
    }

    fn expect(&mut self, expected: char) -> ProvResult<()> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(format!("expected '{}', found end of line", expected))),
        }
    }

    fn error(&self, message: impl Into<String>) -> ProvError {
        parse_error(self.line, message)
    }

    fn iri(&mut self) -> ProvResult<String> {
        if self.input[self.pos..].starts_with("_:") {
            return Err(self.error("blank nodes are not supported"));
        }
        self.expect('<')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated IRI")),
                Some('>') => return Ok(out),
                Some('\\') => {
                    let width = match self.bump() {
                        Some('u') => 4,
                        Some('U') => 8,
                        _ => return Err(self.error("invalid escape in IRI")),
                    };
                    out.push(self.unicode(width)?);
                }
                Some(c) if c <= ' ' || c == '<' || c == '"' => {
                    return Err(self.error(format!("character {:?} not allowed in IRI", c)));
                }
                Some(c) => out.push(c),
            }
        }
    }

    /// Read a quoted literal, dropping any datatype or language tag
    fn literal(&mut self) -> ProvResult<String> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated literal")),
                Some('"') => break,
                Some('\\') => {
                    let c = match self.bump() {
                        Some('t') => '\t',
                        Some('b') => '\u{8}',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('f') => '\u{c}',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some('\\') => '\\',
                        Some('u') => self.unicode(4)?,
                        Some('U') => self.unicode(8)?,
                        _ => return Err(self.error("invalid escape in literal")),
                    };
                    out.push(c);
                }
                Some(c) => out.push(c),
            }
        }

        match self.peek() {
            Some('^') => {
                self.bump();
                self.expect('^')?;
                self.iri()?;
            }
            Some('@') => {
                self.bump();
                while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '-') {
                    self.bump();
                }
            }
            _ => {}
        }
        Ok(out)
    }

    fn unicode(&mut self, width: usize) -> ProvResult<char> {
        let start = self.pos;
        for _ in 0..width {
            match self.bump() {
                Some(c) if c.is_ascii_hexdigit() => {}
                _ => return Err(self.error("truncated unicode escape")),
            }
        }
        u32::from_str_radix(&self.input[start..self.pos], 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("invalid unicode escape"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provenance::{record_copy, record_upload, FileTransfer};
    use chrono::TimeZone;

    fn sample_graph() -> ProvenanceGraph {
        let mut graph = ProvenanceGraph::new();
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let upload = FileTransfer::new("local:sim.cfg", "remote:sim.cfg", "config", "act:upload1").with_started_at(t0);
        record_upload(&mut graph, &upload, "cluster1").unwrap();
        let copy = FileTransfer::new("local:sim.cfg", "local:my runs/sim.cfg", "config \"v1\"", "act:copy1");
        record_copy(&mut graph, &copy).unwrap();
        let mut extra = Attributes::new();
        extra.insert("checksum".to_string(), "abc123".to_string());
        graph
            .add_entity("local:sim.cfg", "config", None, Some(&extra), true)
            .unwrap();
        graph
    }

    #[test]
    fn test_every_line_is_a_triple() {
        let nt = to_ntriples(&sample_graph());
        assert!(!nt.is_empty());
        for line in nt.lines() {
            assert!(line.starts_with('<'), "line does not start with an IRI: {line}");
            assert!(line.ends_with(" ."), "line does not end with ' .': {line}");
        }
    }

    #[test]
    fn test_upload_triples_present() {
        let nt = to_ntriples(&sample_graph());
        assert!(nt.contains(
            "<ssh://cluster1/sim.cfg> <http://www.w3.org/ns/prov#wasGeneratedBy> <act:upload1> ."
        ));
        assert!(nt.contains(
            "<act:upload1> <http://www.w3.org/ns/prov#startedAtTime> \
             \"2024-03-01T09:30:00Z\"^^<http://www.w3.org/2001/XMLSchema#dateTime> ."
        ));
        assert!(nt.contains("<ssh://cluster1/sim.cfg> <urn:simprov:ns#location> \"cluster1\" ."));
    }

    #[test]
    fn test_export_import_export_is_stable() {
        let graph = sample_graph();
        let first = to_ntriples(&graph);
        let imported = from_ntriples(&first).unwrap();
        let second = to_ntriples(&imported);

        assert_eq!(first, second);
        assert_eq!(imported.node_count(), graph.node_count());
        assert_eq!(imported.relation_count(), graph.relation_count());
        let versioned = imported.get(&NodeId::from("http://localhost/sim.cfg?version=2")).unwrap();
        assert_eq!(versioned.version, 2);
        assert_eq!(versioned.extra.get("checksum").map(String::as_str), Some("abc123"));
        assert!(imported.get(&NodeId::from("http://localhost/my runs/sim.cfg")).is_some());
    }

    #[test]
    fn test_round_trip_keeps_namespace_table() {
        let graph = sample_graph();
        let nt = to_ntriples(&graph);
        assert!(nt.contains("<ssh://cluster1/> <urn:simprov:ns#prefix> \"remote\" ."));

        let imported = from_ntriples(&nt).unwrap();
        assert_eq!(imported.namespaces(), graph.namespaces());
        assert_eq!(
            imported.node("remote:sim.cfg").map(|n| n.id.as_str()),
            Some("ssh://cluster1/sim.cfg")
        );
        assert_eq!(imported, graph);
    }

    #[test]
    fn test_document_bindings_override_starting_table() {
        let text = "<ssh://hpc/> <urn:simprov:ns#prefix> \"remote\" .\n\
                    <file:///scratch/> <urn:simprov:ns#prefix> \"scratch\" .\n";
        let graph = from_ntriples_with_namespaces(text, Namespaces::new("file:///lab/")).unwrap();
        assert_eq!(graph.namespaces().base("local"), Some("file:///lab/"));
        assert_eq!(graph.namespaces().base("remote"), Some("ssh://hpc/"));
        assert_eq!(graph.resolve("scratch:out.h5").as_str(), "file:///scratch/out.h5");
    }

    #[test]
    fn test_import_rejects_malformed_prefix() {
        let text = "<ssh://hpc/> <urn:simprov:ns#prefix> \"a:b\" .\n";
        assert!(matches!(from_ntriples(text), Err(ProvError::Parse { line: 1, .. })));
    }

    #[test]
    fn test_import_accepts_generated_in_either_direction() {
        let text = r#"
# a hand-written ledger
<urn:a> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/ns/prov#Activity> .
<urn:e> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/ns/prov#Entity> .
<urn:f> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/ns/prov#Entity> .
<urn:a> <http://www.w3.org/ns/prov#generated> <urn:e> .
<urn:f> <http://www.w3.org/ns/prov#wasGeneratedBy> <urn:a> .
<urn:e> <http://example.org/unrelated> "ignored"@en .
"#;
        let graph = from_ntriples(text).unwrap();
        let e = graph.entity("urn:e").unwrap();
        let f = graph.entity("urn:f").unwrap();
        let a = graph.activity("urn:a").unwrap();
        assert_eq!(graph.generated_by(&e), vec![a.clone()]);
        assert_eq!(graph.generated_by(&f), vec![a]);
    }

    #[test]
    fn test_import_reports_line_of_malformed_triple() {
        let text = "<urn:a> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/ns/prov#Activity> .\n\
                    <urn:a> <http://www.w3.org/ns/prov#used> <urn:e>\n";
        let err = from_ntriples(text).unwrap_err();
        assert!(matches!(err, ProvError::Parse { line: 2, .. }), "got {err:?}");
    }

    #[test]
    fn test_import_rejects_blank_nodes() {
        let text = "_:b0 <http://www.w3.org/2000/01/rdf-schema#label> \"x\" .\n";
        assert!(matches!(from_ntriples(text), Err(ProvError::Parse { line: 1, .. })));
    }

    #[test]
    fn test_import_rejects_untyped_nodes() {
        let text = "<urn:x> <http://www.w3.org/2000/01/rdf-schema#label> \"x\" .\n";
        assert!(matches!(from_ntriples(text), Err(ProvError::Parse { line: 1, .. })));
    }

    #[test]
    fn test_import_rejects_dangling_relations() {
        let text = "<urn:a> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/ns/prov#Activity> .\n\
                    <urn:a> <http://www.w3.org/ns/prov#used> <urn:missing> .\n";
        assert!(matches!(from_ntriples(text), Err(ProvError::InvalidReference(_))));
    }

    #[test]
    fn test_import_decodes_escapes() {
        let text = "<urn:e\\u0020x> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/ns/prov#Entity> .\n\
                    <urn:e\\u0020x> <http://www.w3.org/2000/01/rdf-schema#label> \"tab\\there \\\"q\\\"\" .\n";
        let graph = from_ntriples(text).unwrap();
        let node = graph.get(&NodeId::from("urn:e x")).unwrap();
        assert_eq!(node.label.as_deref(), Some("tab\there \"q\""));
    }
}
