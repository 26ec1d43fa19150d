//! Turtle export.
//!
//! One block per subject, sorted by IRI. Names are shortened with the
//! vocabulary prefixes and the graph's own namespace table wherever the
//! remainder is a plain local name.

use std::collections::BTreeMap;

use super::{escape_iri, escape_literal, triples, Term, RDF_TYPE, VOCABULARY_PREFIXES};
use crate::graph::{Namespaces, ProvenanceGraph};

/// Serialize a graph to Turtle
#[must_use]
pub fn to_turtle(graph: &ProvenanceGraph) -> String {
    let names = Names::new(graph.namespaces());
    let mut out = String::with_capacity(4 * 1024);

    for (prefix, base) in names.prefixes() {
        out.push_str(&format!("@prefix {}: <{}> .\n", prefix, escape_iri(base)));
    }
    out.push('\n');

    let mut subjects: BTreeMap<&str, Vec<(&'static str, Vec<Term>)>> = BTreeMap::new();
    for triple in triples(graph) {
        let predicates = subjects.entry(triple.subject).or_default();
        match predicates.iter_mut().find(|(p, _)| *p == triple.predicate) {
            Some((_, objects)) => {
                if !objects.contains(&triple.object) {
                    objects.push(triple.object);
                }
            }
            None => predicates.push((triple.predicate, vec![triple.object])),
        }
    }

    for (subject, predicates) in subjects {
        out.push_str(&names.name(subject));
        for (i, (predicate, objects)) in predicates.iter().enumerate() {
            out.push_str(if i == 0 { "\n  " } else { " ;\n  " });
            if *predicate == RDF_TYPE {
                out.push('a');
            } else {
                out.push_str(&names.name(predicate));
            }
            for (j, object) in objects.iter().enumerate() {
                out.push_str(if j == 0 { " " } else { " , " });
                out.push_str(&names.term(object));
            }
        }
        out.push_str(" .\n\n");
    }

    out
}

/// Prefix table used to shorten IRIs
struct Names<'a> {
    prefixes: Vec<(&'a str, &'a str)>,
}

impl<'a> Names<'a> {
    fn new(namespaces: &'a Namespaces) -> Self {
        let mut prefixes: Vec<(&str, &str)> = VOCABULARY_PREFIXES.to_vec();
        for (prefix, base) in namespaces.iter() {
            let reserved = VOCABULARY_PREFIXES.iter().any(|(p, _)| *p == prefix);
            if !reserved && is_prefix(prefix) && !base.is_empty() {
                prefixes.push((prefix, base));
            }
        }
        Self { prefixes }
    }

    fn prefixes(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.prefixes.iter().copied()
    }

    /// Prefixed name when one fits, `<iri>` otherwise
    fn name(&self, iri: &str) -> String {
        let best = self
            .prefixes
            .iter()
            .filter(|(_, base)| iri.starts_with(base))
            .filter(|(_, base)| is_local_name(&iri[base.len()..]))
            .max_by_key(|(_, base)| base.len());
        match best {
            Some((prefix, base)) => format!("{}:{}", prefix, &iri[base.len()..]),
            None => format!("<{}>", escape_iri(iri)),
        }
    }

    fn term(&self, term: &Term) -> String {
        match term {
            Term::Iri(iri) => self.name(iri),
            Term::Literal { value, datatype: None } => format!("\"{}\"", escape_literal(value)),
            Term::Literal {
                value,
                datatype: Some(datatype),
            } => format!("\"{}\"^^{}", escape_literal(value), self.name(datatype)),
        }
    }
}

fn is_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Local names are kept to a conservative subset that needs no escaping
fn is_local_name(local: &str) -> bool {
    if local.starts_with(['-', '.']) || local.ends_with('.') {
        return false;
    }
    local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provenance::{record_copy, record_upload, FileTransfer};

    fn sample_graph() -> ProvenanceGraph {
        let mut graph = ProvenanceGraph::new();
        let upload = FileTransfer::new("local:sim.cfg", "remote:sim.cfg", "config", "act:upload1");
        record_upload(&mut graph, &upload, "cluster1").unwrap();
        let copy = FileTransfer::new("local:sim.cfg", "local:runs/sim.cfg", "config", "act:copy1");
        record_copy(&mut graph, &copy).unwrap();
        graph
    }

    #[test]
    fn test_declares_vocabulary_and_graph_prefixes() {
        let turtle = to_turtle(&sample_graph());
        assert!(turtle.contains("@prefix prov: <http://www.w3.org/ns/prov#> ."));
        assert!(turtle.contains("@prefix xsd: <http://www.w3.org/2001/XMLSchema#> ."));
        assert!(turtle.contains("@prefix local: <http://localhost/> ."));
        assert!(turtle.contains("@prefix remote: <ssh://cluster1/> ."));
    }

    #[test]
    fn test_subject_blocks_use_prefixed_names() {
        let turtle = to_turtle(&sample_graph());
        assert!(turtle.contains("remote:sim.cfg\n  a prov:Entity ;\n  rdfs:label \"config\" ;\n  simprov:location \"cluster1\""));
        assert!(turtle.contains("local:workbench\n  a prov:Agent , prov:SoftwareAgent ."));
        assert!(turtle.contains("prov:wasGeneratedBy <act:upload1>"));
        assert!(turtle.contains("^^xsd:dateTime"));
    }

    #[test]
    fn test_names_needing_escapes_stay_absolute() {
        let turtle = to_turtle(&sample_graph());
        assert!(turtle.contains("<http://localhost/runs/sim.cfg>\n  a prov:Entity"));
    }

    #[test]
    fn test_every_block_is_terminated() {
        let turtle = to_turtle(&sample_graph());
        let blocks: Vec<_> = turtle.split("\n\n").filter(|b| !b.trim().is_empty()).skip(1).collect();
        assert_eq!(blocks.len(), sample_graph().node_count());
        for block in blocks {
            assert!(block.ends_with(" ."), "unterminated block: {block}");
        }
    }
}
