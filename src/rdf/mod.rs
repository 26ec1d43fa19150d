//! RDF interchange for provenance graphs
//!
//! Graphs are written as PROV-O triples. Attributes PROV-O has no term for
//! (host location, version number, free-form extras) use the `simprov:`
//! vocabulary. N-Triples also carries the graph's namespace table, one
//! `<base> simprov:prefix "name"` triple per binding, so an import resolves
//! short names the way the exported graph did. Turtle declares the same
//! bindings as `@prefix` lines and is export-only.

mod ntriples;
mod turtle;

pub use ntriples::{from_ntriples, from_ntriples_with_namespaces, to_ntriples};
pub use turtle::to_turtle;

use crate::graph::{NodeKind, ProvenanceGraph, Relation};
use chrono::{DateTime, SecondsFormat, Utc};

pub const PROV_NS: &str = "http://www.w3.org/ns/prov#";
pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS_NS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";
pub const SIMPROV_NS: &str = "urn:simprov:ns#";

pub(crate) const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub(crate) const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";

pub(crate) const PROV_ENTITY: &str = "http://www.w3.org/ns/prov#Entity";
pub(crate) const PROV_ACTIVITY: &str = "http://www.w3.org/ns/prov#Activity";
pub(crate) const PROV_AGENT: &str = "http://www.w3.org/ns/prov#Agent";
pub(crate) const PROV_SOFTWARE_AGENT: &str = "http://www.w3.org/ns/prov#SoftwareAgent";

pub(crate) const PROV_STARTED_AT_TIME: &str = "http://www.w3.org/ns/prov#startedAtTime";
pub(crate) const PROV_ENDED_AT_TIME: &str = "http://www.w3.org/ns/prov#endedAtTime";
pub(crate) const PROV_WAS_ASSOCIATED_WITH: &str = "http://www.w3.org/ns/prov#wasAssociatedWith";
pub(crate) const PROV_USED: &str = "http://www.w3.org/ns/prov#used";
pub(crate) const PROV_WAS_GENERATED_BY: &str = "http://www.w3.org/ns/prov#wasGeneratedBy";
pub(crate) const PROV_GENERATED: &str = "http://www.w3.org/ns/prov#generated";
pub(crate) const PROV_WAS_DERIVED_FROM: &str = "http://www.w3.org/ns/prov#wasDerivedFrom";

pub(crate) const SIMPROV_LOCATION: &str = "urn:simprov:ns#location";
pub(crate) const SIMPROV_VERSION: &str = "urn:simprov:ns#version";
pub(crate) const SIMPROV_EXTRA: &str = "urn:simprov:ns#extra";
pub(crate) const SIMPROV_PREFIX: &str = "urn:simprov:ns#prefix";

pub(crate) const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
pub(crate) const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";

/// Vocabulary prefixes declared in every Turtle document
pub(crate) const VOCABULARY_PREFIXES: [(&str, &str); 5] = [
    ("prov", PROV_NS),
    ("rdf", RDF_NS),
    ("rdfs", RDFS_NS),
    ("simprov", SIMPROV_NS),
    ("xsd", XSD_NS),
];

/// Object position of a triple
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Term {
    Iri(String),
    Literal {
        value: String,
        datatype: Option<&'static str>,
    },
}

impl Term {
    fn iri(iri: impl Into<String>) -> Self {
        Self::Iri(iri.into())
    }

    fn plain(value: impl Into<String>) -> Self {
        Self::Literal {
            value: value.into(),
            datatype: None,
        }
    }

    fn date_time(at: &DateTime<Utc>) -> Self {
        Self::Literal {
            value: at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            datatype: Some(XSD_DATE_TIME),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Triple<'a> {
    pub subject: &'a str,
    pub predicate: &'static str,
    pub object: Term,
}

/// Flatten a graph into triples: node descriptions in IRI order, then
/// relations in recording order
pub(crate) fn triples(graph: &ProvenanceGraph) -> Vec<Triple<'_>> {
    let mut out = Vec::new();

    for node in graph.nodes() {
        let subject = node.id.as_str();
        let types: &[&str] = match node.kind {
            NodeKind::Entity => &[PROV_ENTITY],
            NodeKind::Activity => &[PROV_ACTIVITY],
            NodeKind::Agent => &[PROV_AGENT, PROV_SOFTWARE_AGENT],
        };
        for ty in types {
            out.push(Triple {
                subject,
                predicate: RDF_TYPE,
                object: Term::iri(*ty),
            });
        }
        if let Some(label) = &node.label {
            out.push(Triple {
                subject,
                predicate: RDFS_LABEL,
                object: Term::plain(label.as_str()),
            });
        }
        if let Some(location) = &node.location {
            out.push(Triple {
                subject,
                predicate: SIMPROV_LOCATION,
                object: Term::plain(location.as_str()),
            });
        }
        if node.version > 1 {
            out.push(Triple {
                subject,
                predicate: SIMPROV_VERSION,
                object: Term::Literal {
                    value: node.version.to_string(),
                    datatype: Some(XSD_INTEGER),
                },
            });
        }
        if !node.extra.is_empty() {
            // Attributes are a string map, which always serializes
            let extra = serde_json::to_string(&node.extra).unwrap_or_default();
            out.push(Triple {
                subject,
                predicate: SIMPROV_EXTRA,
                object: Term::plain(extra),
            });
        }
    }

    for relation in graph.relations() {
        let triple = match relation {
            Relation::StartedAtTime { activity, at } => Triple {
                subject: activity.as_str(),
                predicate: PROV_STARTED_AT_TIME,
                object: Term::date_time(at),
            },
            Relation::EndedAtTime { activity, at } => Triple {
                subject: activity.as_str(),
                predicate: PROV_ENDED_AT_TIME,
                object: Term::date_time(at),
            },
            Relation::WasAssociatedWith { activity, agent } => Triple {
                subject: activity.as_str(),
                predicate: PROV_WAS_ASSOCIATED_WITH,
                object: Term::iri(agent.as_str()),
            },
            Relation::Used { activity, entity } => Triple {
                subject: activity.as_str(),
                predicate: PROV_USED,
                object: Term::iri(entity.as_str()),
            },
            Relation::Generated { producer, product } => Triple {
                subject: product.as_str(),
                predicate: PROV_WAS_GENERATED_BY,
                object: Term::iri(producer.as_str()),
            },
            Relation::WasDerivedFrom { derived, source } => Triple {
                subject: derived.as_str(),
                predicate: PROV_WAS_DERIVED_FROM,
                object: Term::iri(source.as_str()),
            },
        };
        out.push(triple);
    }
    out
}

/// Namespace bindings as `<base> simprov:prefix "name"` triples
pub(crate) fn binding_triples(graph: &ProvenanceGraph) -> Vec<Triple<'_>> {
    graph
        .namespaces()
        .iter()
        .map(|(prefix, base)| Triple {
            subject: base,
            predicate: SIMPROV_PREFIX,
            object: Term::plain(prefix),
        })
        .collect()
}

/// Escape a literal body for N-Triples and Turtle short strings
pub(crate) fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// Escape characters not allowed inside `<...>` as `\uXXXX`
pub(crate) fn escape_iri(iri: &str) -> String {
    let mut out = String::with_capacity(iri.len());
    for c in iri.chars() {
        if c <= ' ' || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\') {
            out.push_str(&format!("\\u{:04X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}
