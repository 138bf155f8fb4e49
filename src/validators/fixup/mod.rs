//! Component fixup
//!
//! After every document of a construction run has been parsed, the
//! component arena holds shells: references are pending QNames and no
//! derived property has been computed. The fixup engine turns them into a
//! resolved, checked schema in a fixed sequence of global passes. Each pass
//! runs over every component before the next pass starts, because many
//! checks need an earlier pass to be complete for all components (a
//! circularity check needs every base reference resolved, the content type
//! of an extension needs the base's content type, and so on).
//!
//! Constraint violations are reported and the offending component is marked
//! invalid; later passes skip deep analysis of invalid components but the
//! run continues so one construction reports as many problems as possible.
//! Only internal errors abort the run.

mod attributes;
mod circularity;
mod complex;
mod content;
mod elements;
mod redefine;
mod resolve;
mod simple;

use std::collections::HashSet;

use tracing::debug;

use crate::error::Result;

use super::builders::ConstructionSession;

/// Run every fixup pass in order
pub fn run(session: &mut ConstructionSession) -> Result<()> {
    let passes: [(&str, fn(&mut ConstructionSession) -> Result<()>); 11] = [
        ("redefine", redefine::apply_redefinitions),
        ("register", resolve::register_globals),
        ("resolve", resolve::resolve_references),
        ("circularity", circularity::check_circularity),
        ("group-refs", resolve::substitute_group_refs),
        ("attribute-groups", attributes::expand_attribute_groups),
        ("simple-types", simple::fixup_simple_types),
        ("complex-types", complex::fixup_complex_types),
        ("declarations", elements::check_declarations),
        ("substitution-groups", elements::build_substitution_groups),
        ("content-models", content::compile_content_models),
    ];

    for (name, pass) in passes {
        let errors = session.reporter.error_count();
        pass(session)?;
        debug!(
            pass = name,
            new_errors = session.reporter.error_count() - errors,
            "fixup pass done"
        );
    }
    Ok(())
}

/// Indices that can reach themselves through `successors`
pub(crate) fn on_cycle(count: usize, successors: impl Fn(usize) -> Vec<usize>) -> Vec<bool> {
    let mut cyclic = vec![false; count];
    for start in 0..count {
        if cyclic[start] {
            continue;
        }
        let mut seen = HashSet::new();
        let mut stack = successors(start);
        while let Some(node) = stack.pop() {
            if node == start {
                cyclic[start] = true;
                break;
            }
            if node < count && seen.insert(node) {
                stack.extend(successors(node));
            }
        }
    }
    cyclic
}

#[cfg(test)]
pub(crate) mod tests_support {
    use crate::documents::Document;
    use crate::loaders::Loader;
    use crate::validators::builders::{ConstructionSession, ParserOptions};
    use crate::validators::exceptions::{ErrorCode, ErrorReporter, Level};
    use crate::validators::parsing::parse_schema_document;

    /// Parse `main` (located at `main.xsd`) plus in-memory documents and
    /// run every fixup pass; diagnostics stay in the session
    pub(crate) fn construct(main: &str, sources: &[(&str, &str)]) -> ConstructionSession {
        let mut loader = Loader::new();
        for (location, content) in sources {
            loader.add_source(*location, *content);
        }
        let mut session = ConstructionSession::new(ParserOptions::new(), loader, ErrorReporter::new());
        session
            .add_main(Document::parse(main, Some("main.xsd")).unwrap())
            .unwrap();
        while let Some(bucket) = session.next_queued() {
            let doc = session.buckets[bucket.index()].document.clone().unwrap();
            parse_schema_document(&mut session, bucket, &doc).unwrap();
        }
        super::run(&mut session).unwrap();
        session
    }

    /// Codes of the errors reported so far
    pub(crate) fn codes(session: &ConstructionSession) -> Vec<ErrorCode> {
        session
            .reporter
            .diagnostics()
            .iter()
            .filter(|d| d.level == Level::Error)
            .map(|d| d.code)
            .collect()
    }

    /// Codes of the warnings reported so far
    pub(crate) fn warning_codes(session: &ConstructionSession) -> Vec<ErrorCode> {
        session
            .reporter
            .diagnostics()
            .iter()
            .filter(|d| d.level == Level::Warning)
            .map(|d| d.code)
            .collect()
    }
}
