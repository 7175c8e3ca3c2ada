// Copyright 2026 Sentra Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ref-counted monitoring propagation over the definition graph.
//!
//! Monitoring gates whether downstream telemetry observes a definition's
//! instances. A boolean is not enough: shared sub-definitions have multiple
//! dependents, so each definition carries a counter and stays monitored as
//! long as at least one assessment still needs it. The walk visits a
//! definition, then every definition it depends on, recursively, with no
//! cycle-breaking — visits are counted per path, and enable/disable walks are
//! symmetric, so reaching a definition through several paths stays
//! consistent. Callers must ensure the declared ontology graph terminates.

use crate::instance::ElementKind;
use crate::ontology::state::SourceKind;
use crate::ontology::Ontology;
use tracing::warn;

impl Ontology {
    /// Enable monitoring over the subgraph rooted at `(kind, name)`.
    /// Used once at startup for assessments whose persisted preference says
    /// "monitor".
    pub fn set_initially_monitored(&mut self, kind: ElementKind, name: &str) {
        self.set_monitored(kind, name, true);
    }

    /// Increment (or decrement, floored at zero) the monitor ref-count of
    /// every definition in the subgraph rooted at `(kind, name)`.
    pub fn set_monitored(&mut self, kind: ElementKind, name: &str, active: bool) {
        let mut visited: Vec<(ElementKind, String)> = Vec::new();
        self.collect_subgraph(kind, name, &mut visited);
        for (kind, name) in visited {
            match self.def_common_mut(kind, &name) {
                Some(common) => {
                    if active {
                        common.add_monitor_ref();
                    } else {
                        common.release_monitor_ref();
                    }
                }
                None => {
                    warn!(%kind, %name, "monitoring walk reached an undeclared definition");
                }
            }
        }
    }

    /// The visitor walk: self first, then every dependency. Trend references
    /// have no definitions and are skipped.
    fn collect_subgraph(
        &self,
        kind: ElementKind,
        name: &str,
        out: &mut Vec<(ElementKind, String)>,
    ) {
        out.push((kind, name.to_string()));
        match kind {
            ElementKind::Primitive | ElementKind::Trend => {}
            ElementKind::Context => {
                let Some(def) = self.contexts().iter().find(|d| d.common.name() == name) else {
                    return;
                };
                let anchors: Vec<(ElementKind, String)> = def
                    .inductions
                    .iter()
                    .map(|i| (i.anchor.kind(), i.anchor.name().to_string()))
                    .collect();
                for (kind, name) in anchors {
                    if kind != ElementKind::Trend {
                        self.collect_subgraph(kind, &name, out);
                    }
                }
            }
            ElementKind::State => {
                let Some(def) = self.states().iter().find(|d| d.common.name() == name) else {
                    return;
                };
                let deps: Vec<(ElementKind, String)> = def
                    .abstracted_from
                    .iter()
                    .filter_map(|src| {
                        let kind = match src.kind {
                            SourceKind::Primitive => ElementKind::Primitive,
                            SourceKind::State => ElementKind::State,
                            SourceKind::Trend => return None,
                        };
                        Some((kind, src.name.clone()))
                    })
                    .chain(
                        def.necessary_contexts
                            .iter()
                            .map(|n| (ElementKind::Context, n.clone())),
                    )
                    .collect();
                for (kind, name) in deps {
                    self.collect_subgraph(kind, &name, out);
                }
            }
            ElementKind::Pattern => {
                let Some(def) = self.patterns().iter().find(|d| d.common.name() == name) else {
                    return;
                };
                let deps: Vec<(ElementKind, String)> = def
                    .elements
                    .iter()
                    .filter(|e| e.kind != ElementKind::Trend)
                    .map(|e| (e.kind, e.name.clone()))
                    .collect();
                for (kind, name) in deps {
                    self.collect_subgraph(kind, &name, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::condition::NumericRange;
    use crate::ontology::context::{Anchor, ContextDef, Induction};
    use crate::ontology::state::{
        InterpolationFunction, MappingRow, SourceCondition, SourceRef, StateDef,
    };
    use crate::ontology::PrimitiveDef;

    /// cpu (primitive) ← busy (context) ← cpu_load (state, also ← cpu).
    fn sample_ontology() -> Ontology {
        let context = ContextDef::new(
            "busy",
            vec![Induction {
                anchor: Anchor::Primitive {
                    name: "cpu".to_string(),
                    range: NumericRange::at_least(0.8),
                },
                gap_ms: 100,
                relative_to_start: true,
            }],
            vec![],
        );
        let state = StateDef::new(
            "cpu_load",
            vec![SourceRef::primitive("cpu")],
            vec!["busy".to_string()],
            vec![MappingRow {
                output: "High".to_string(),
                conditions: vec![SourceCondition::Primitive {
                    name: "cpu".to_string(),
                    range: NumericRange::any(),
                }],
            }],
            InterpolationFunction::default(),
        );
        Ontology::new(
            "test",
            10_000,
            vec![PrimitiveDef::new("cpu")],
            vec![context],
            vec![state],
            vec![],
        )
    }

    fn monitored(ontology: &Ontology, kind: ElementKind, name: &str) -> bool {
        ontology.def_common(kind, name).unwrap().is_monitored()
    }

    #[test]
    fn test_propagation_reaches_the_whole_subgraph() {
        let mut ontology = sample_ontology();
        ontology.set_initially_monitored(ElementKind::State, "cpu_load");

        assert!(monitored(&ontology, ElementKind::State, "cpu_load"));
        assert!(monitored(&ontology, ElementKind::Context, "busy"));
        // Reached both directly and through the context's induction anchor.
        assert!(monitored(&ontology, ElementKind::Primitive, "cpu"));
        assert_eq!(
            ontology
                .def_common(ElementKind::Primitive, "cpu")
                .unwrap()
                .monitor_refs(),
            2
        );
    }

    #[test]
    fn test_shared_definition_stays_monitored_until_last_release() {
        let mut ontology = sample_ontology();
        // Two independent assessments both monitor the shared context.
        ontology.set_monitored(ElementKind::Context, "busy", true);
        ontology.set_monitored(ElementKind::Context, "busy", true);

        ontology.set_monitored(ElementKind::Context, "busy", false);
        assert!(monitored(&ontology, ElementKind::Context, "busy"));
        assert!(monitored(&ontology, ElementKind::Primitive, "cpu"));

        ontology.set_monitored(ElementKind::Context, "busy", false);
        assert!(!monitored(&ontology, ElementKind::Context, "busy"));
        assert!(!monitored(&ontology, ElementKind::Primitive, "cpu"));
    }

    #[test]
    fn test_disable_floors_at_zero() {
        let mut ontology = sample_ontology();
        ontology.set_monitored(ElementKind::Context, "busy", false);
        ontology.set_monitored(ElementKind::Context, "busy", true);
        assert!(monitored(&ontology, ElementKind::Context, "busy"));
    }

    #[test]
    fn test_undeclared_dependency_is_tolerated() {
        let context = ContextDef::new(
            "orphan",
            vec![Induction {
                anchor: Anchor::Primitive {
                    name: "missing".to_string(),
                    range: NumericRange::any(),
                },
                gap_ms: 1,
                relative_to_start: true,
            }],
            vec![],
        );
        let mut ontology = Ontology::new("test", 10_000, vec![], vec![context], vec![], vec![]);
        // Must not panic; the declared context itself still gets counted.
        ontology.set_monitored(ElementKind::Context, "orphan", true);
        assert!(monitored(&ontology, ElementKind::Context, "orphan"));
    }
}
