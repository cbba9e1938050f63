//! Resolves a region tree against a binding specification.
//!
//! Resolution walks the tree once in document order, so every marker is
//! resolved before anything nested inside it. All problems are collected and
//! reported together; no plan is produced while any remain.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info};

use autoreport_format::FormatSpec;
use autoreport_model::{BindingEntry, BindingSpec, DataSourceDef, FieldPath};
use autoreport_template::{MarkerKind, RegionId, RegionKind, RegionTree};

use crate::error::{BindingError, BindingErrors};
use crate::plan::{
    CompiledPredicate, ConditionalBinding, ConditionalFormat, Correlation, CorrelationParameter,
    ExecutionPlan, FieldRef, FieldTarget, NodeBinding, PlaceholderBinding, RepeatBinding,
};
use crate::predicate::Predicate;
use crate::suggest::suggest;

/// Builds an execution plan, or every binding error found.
pub fn resolve(tree: RegionTree, spec: &BindingSpec) -> Result<ExecutionPlan, BindingErrors> {
    let tree = Arc::new(tree);
    let mut resolver = Resolver::new(&tree, spec);
    resolver.check_duplicate_markers();
    for id in tree.preorder() {
        match tree.kind(id) {
            RegionKind::Repeat { .. } | RegionKind::Conditional { .. } => {
                resolver.resolve_marker(id);
            }
            RegionKind::Placeholder { .. } => resolver.resolve_placeholder(id),
            RegionKind::Static { .. } | RegionKind::Group { .. } => {}
        }
    }
    resolver.report_unused();

    if !resolver.errors.is_empty() {
        info!(errors = resolver.errors.len(), "binding resolution failed");
        return Err(BindingErrors {
            errors: resolver.errors,
        });
    }
    info!(
        bindings = resolver.bindings.len(),
        prefetch = resolver.prefetch.len(),
        "binding resolution complete"
    );
    let sources = spec
        .sources()
        .map(|source| (source.name.clone(), source.clone()))
        .collect();
    Ok(ExecutionPlan::new(
        Arc::clone(&tree),
        resolver.bindings,
        sources,
        resolver.prefetch,
    ))
}

/// A marker scope visible from some node: the marker region and its source.
#[derive(Debug, Clone)]
struct ScopeEntry<'a> {
    region: RegionId,
    marker: &'a str,
    source: &'a DataSourceDef,
}

struct Resolver<'a> {
    tree: &'a RegionTree,
    spec: &'a BindingSpec,
    bindings: BTreeMap<RegionId, NodeBinding>,
    prefetch: Vec<String>,
    used: Vec<bool>,
    reported_duplicates: BTreeSet<String>,
    errors: Vec<BindingError>,
}

impl<'a> Resolver<'a> {
    fn new(tree: &'a RegionTree, spec: &'a BindingSpec) -> Self {
        Self {
            tree,
            spec,
            bindings: BTreeMap::new(),
            prefetch: Vec::new(),
            used: vec![false; spec.entries().len()],
            reported_duplicates: BTreeSet::new(),
            errors: Vec::new(),
        }
    }

    /// Entry for `name` of the given kind, exact match preferred over a
    /// case-insensitive one. Marks every candidate as used.
    fn entry(&mut self, name: &str, marker: bool) -> Option<&'a BindingEntry> {
        let matches = self.entries(name, marker);
        if matches.len() > 1 {
            self.duplicate(name);
        }
        matches.first().copied()
    }

    fn duplicate(&mut self, name: &str) {
        if self.reported_duplicates.insert(name.to_uppercase()) {
            self.errors.push(BindingError::DuplicateBinding {
                name: name.to_string(),
            });
        }
    }

    /// Every entry for `name` of the given kind, in specification order.
    fn entries(&mut self, name: &str, marker: bool) -> Vec<&'a BindingEntry> {
        let entries = self.spec.entries();
        let of_kind = |entry: &BindingEntry| entry.is_marker() == marker;
        let mut matches: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| of_kind(entry) && entry.name == name)
            .map(|(idx, _)| idx)
            .collect();
        if matches.is_empty() {
            matches = entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| of_kind(entry) && entry.name.eq_ignore_ascii_case(name))
                .map(|(idx, _)| idx)
                .collect();
        }
        for idx in &matches {
            self.used[*idx] = true;
        }
        matches.into_iter().map(|idx| &entries[idx]).collect()
    }

    fn entry_names(&self, marker: bool) -> Vec<&'a str> {
        self.spec
            .entries()
            .iter()
            .filter(|entry| entry.is_marker() == marker)
            .map(|entry| entry.name.as_str())
            .collect()
    }

    fn check_duplicate_markers(&mut self) {
        let mut seen: BTreeSet<(Option<RegionId>, String)> = BTreeSet::new();
        for id in self.tree.markers() {
            let Some(name) = self.tree.marker_name(id) else {
                continue;
            };
            let scope = self.tree.enclosing_markers(id).first().copied();
            if !seen.insert((scope, name.to_uppercase())) {
                self.errors.push(BindingError::DuplicateMarker {
                    name: name.to_string(),
                    location: self.tree.node(id).location.clone(),
                });
            }
        }
    }

    fn note_prefetch(&mut self, source: &str) {
        if !self.prefetch.iter().any(|name| name == source) {
            self.prefetch.push(source.to_string());
        }
    }

    /// Marker scopes active at `at`, innermost first, led by `own` if given.
    fn scopes(&self, at: RegionId, own: Option<ScopeEntry<'a>>) -> Vec<ScopeEntry<'a>> {
        let mut scopes: Vec<ScopeEntry<'a>> = own.into_iter().collect();
        for region in self.tree.enclosing_markers(at) {
            let Some(marker) = self.tree.marker_name(region) else {
                continue;
            };
            let source = match self.bindings.get(&region) {
                Some(NodeBinding::Repeat(binding)) => Some(binding.source.as_str()),
                Some(NodeBinding::Conditional(binding)) => binding.source.as_deref(),
                _ => None,
            };
            if let Some(source) = source.and_then(|name| self.spec.source(name)) {
                scopes.push(ScopeEntry {
                    region,
                    marker,
                    source,
                });
            }
        }
        scopes
    }

    /// Resolves `path` as seen from `at`.
    ///
    /// A qualified path binds to the innermost scope whose marker or source
    /// carries the qualifier, then to a declared source (first row). An
    /// unqualified one binds to the innermost scope declaring the column.
    fn resolve_field(
        &mut self,
        at: RegionId,
        name: &str,
        path: &FieldPath,
        own: Option<ScopeEntry<'a>>,
    ) -> Result<FieldRef, BindingError> {
        let location = self.tree.node(at).location.clone();
        if path.is_generated_at() {
            return Ok(FieldRef::new(FieldTarget::GeneratedAt, path.column.clone()));
        }
        let scopes = self.scopes(at, own);

        if let Some(qualifier) = &path.scope {
            let scoped = scopes.iter().find(|scope| {
                scope.marker.eq_ignore_ascii_case(qualifier)
                    || scope.source.name.eq_ignore_ascii_case(qualifier)
            });
            let (target, source) = match scoped {
                Some(scope) => (FieldTarget::Scope(scope.region), scope.source),
                None => {
                    let Some(source) = self.spec.source(qualifier) else {
                        return Err(BindingError::UnknownScope {
                            name: name.to_string(),
                            scope: qualifier.clone(),
                            location,
                        });
                    };
                    self.note_prefetch(&source.name);
                    (FieldTarget::Root(source.name.clone()), source)
                }
            };
            if source.declares_column(&path.column) == Some(false) {
                return Err(not_in_scope(name, &path.column, source, location));
            }
            return Ok(FieldRef::new(target, path.column.clone()));
        }

        let mut undeclared = false;
        for scope in &scopes {
            match scope.source.declares_column(&path.column) {
                Some(true) => {
                    return Ok(FieldRef::new(
                        FieldTarget::Scope(scope.region),
                        path.column.clone(),
                    ));
                }
                None => undeclared = true,
                Some(false) => {}
            }
        }
        if undeclared {
            return Ok(FieldRef::new(FieldTarget::Innermost, path.column.clone()));
        }
        match scopes.first() {
            Some(scope) => Err(not_in_scope(name, &path.column, scope.source, location)),
            None => Err(BindingError::NoSourceInScope {
                name: name.to_string(),
                location,
            }),
        }
    }

    /// Parses and resolves a predicate. Unqualified columns that do not
    /// resolve in scope are retried against `home` when given.
    fn compile_predicate(
        &mut self,
        id: RegionId,
        marker: &str,
        text: &str,
        own: Option<ScopeEntry<'a>>,
        home: Option<&str>,
    ) -> Option<CompiledPredicate> {
        let expression = match Predicate::parse(text) {
            Ok(expression) => expression,
            Err(err) => {
                self.errors.push(BindingError::InvalidPredicate {
                    marker: marker.to_string(),
                    message: err.to_string(),
                });
                return None;
            }
        };
        let mut fields = BTreeMap::new();
        let mut valid = true;
        for path in expression.fields() {
            let mut resolved = self.resolve_field(id, marker, path, own.clone());
            if let Some(home) = home.filter(|_| resolved.is_err() && path.scope.is_none()) {
                let qualified = FieldPath::scoped(home, path.column.clone());
                if let Ok(field) = self.resolve_field(id, marker, &qualified, own.clone()) {
                    resolved = Ok(field);
                }
            }
            match resolved {
                Ok(field) => {
                    fields.insert(path.clone(), field);
                }
                Err(err) => {
                    self.errors.push(err);
                    valid = false;
                }
            }
        }
        valid.then_some(CompiledPredicate { expression, fields })
    }

    fn resolve_marker(&mut self, id: RegionId) {
        let tree = self.tree;
        let node = tree.node(id);
        let Some((kind, marker)) = node.marker() else {
            return;
        };
        let location = node.location.clone();
        let Some(entry) = self.entry(marker, true) else {
            let mut candidates = self.entry_names(true);
            candidates.extend(self.spec.sources().map(|source| source.name.as_str()));
            self.errors.push(BindingError::UnresolvedReference {
                kind: kind_label(kind),
                name: marker.to_string(),
                location,
                suggestion: suggest(marker, candidates),
            });
            return;
        };

        match kind {
            MarkerKind::Repeat => self.resolve_repeat(id, marker, entry, &location),
            MarkerKind::Conditional => self.resolve_conditional(id, marker, entry, &location),
        }
    }

    fn lookup_source(
        &mut self,
        marker: &str,
        source_name: &str,
        location: &str,
    ) -> Option<&'a DataSourceDef> {
        let source = self.spec.source(source_name);
        if source.is_none() {
            self.errors.push(BindingError::UndefinedSource {
                name: marker.to_string(),
                source_name: source_name.to_string(),
                location: location.to_string(),
            });
        }
        source
    }

    fn resolve_repeat(
        &mut self,
        id: RegionId,
        marker: &'a str,
        entry: &'a BindingEntry,
        location: &str,
    ) {
        let source_name = entry.source.as_deref().unwrap_or(marker);
        let Some(source) = self.lookup_source(marker, source_name, location) else {
            return;
        };

        let correlation = match self.resolve_correlation(id, marker, entry) {
            Ok(correlation) => correlation,
            Err(err) => {
                self.errors.push(err);
                return;
            }
        };

        let own = ScopeEntry {
            region: id,
            marker,
            source,
        };
        let filter = match &entry.predicate {
            Some(text) => match self.compile_predicate(id, marker, text, Some(own), None) {
                Some(filter) => Some(filter),
                None => return,
            },
            None => None,
        };

        if correlation.is_none() {
            self.note_prefetch(&source.name);
        }
        debug!(
            marker = %marker,
            source = %source.name,
            correlated = correlation.is_some(),
            "resolved repeat"
        );
        self.bindings.insert(
            id,
            NodeBinding::Repeat(RepeatBinding {
                marker: marker.to_string(),
                source: source.name.clone(),
                correlation,
                filter,
            }),
        );
    }

    fn resolve_correlation(
        &mut self,
        id: RegionId,
        marker: &str,
        entry: &BindingEntry,
    ) -> Result<Option<Correlation>, BindingError> {
        let invalid = |reason: String| BindingError::InvalidCorrelation {
            marker: marker.to_string(),
            reason,
        };
        let Some(ancestor_name) = entry.correlate.as_deref().map(str::trim) else {
            if entry.parameters.is_empty() {
                return Ok(None);
            }
            return Err(invalid(
                "parameters are given without a correlated ancestor".to_string(),
            ));
        };
        if ancestor_name.contains([',', ';']) || ancestor_name.split_whitespace().count() > 1 {
            return Err(invalid(format!(
                "'{ancestor_name}' names more than one ancestor"
            )));
        }
        let tree = self.tree;
        let Some(ancestor) = tree.enclosing_markers(id).into_iter().find(|region| {
            tree.node(*region).is_repeat()
                && tree
                    .marker_name(*region)
                    .is_some_and(|name| name.eq_ignore_ascii_case(ancestor_name))
        }) else {
            return Err(invalid(format!(
                "'{ancestor_name}' is not an enclosing repeat"
            )));
        };
        if entry.parameters.is_empty() {
            return Err(invalid("no correlation parameters are given".to_string()));
        }

        let ancestor_source = match self.bindings.get(&ancestor) {
            Some(NodeBinding::Repeat(binding)) => self.spec.source(&binding.source),
            _ => None,
        };
        let mut parameters = Vec::with_capacity(entry.parameters.len());
        for parameter in &entry.parameters {
            let field = &parameter.field;
            if let Some(qualifier) = &field.scope {
                let names_ancestor = qualifier.eq_ignore_ascii_case(ancestor_name)
                    || ancestor_source
                        .is_some_and(|source| source.name.eq_ignore_ascii_case(qualifier));
                if !names_ancestor {
                    return Err(invalid(format!(
                        "parameter {} reads '{field}', outside ancestor '{ancestor_name}'",
                        parameter.name
                    )));
                }
            }
            if let Some(source) = ancestor_source
                && source.declares_column(&field.column) == Some(false)
            {
                return Err(invalid(format!(
                    "parameter {} reads '{}', which source '{}' does not declare",
                    parameter.name, field.column, source.name
                )));
            }
            parameters.push(CorrelationParameter {
                name: parameter.name.clone(),
                field: FieldRef::new(FieldTarget::Scope(ancestor), field.column.clone()),
            });
        }
        Ok(Some(Correlation {
            ancestor,
            parameters,
        }))
    }

    fn resolve_conditional(
        &mut self,
        id: RegionId,
        marker: &'a str,
        entry: &'a BindingEntry,
        location: &str,
    ) {
        if entry.correlate.is_some() {
            self.errors.push(BindingError::InvalidCorrelation {
                marker: marker.to_string(),
                reason: "only repeats can be correlated".to_string(),
            });
        }
        let source = match entry.source.as_deref() {
            Some(name) => match self.lookup_source(marker, name, location) {
                Some(source) => Some(source),
                None => return,
            },
            None => None,
        };
        let Some(text) = entry.predicate.as_deref() else {
            self.errors.push(BindingError::MissingPredicate {
                marker: marker.to_string(),
                location: location.to_string(),
            });
            return;
        };
        let own = source.map(|source| ScopeEntry {
            region: id,
            marker,
            source,
        });
        let Some(predicate) = self.compile_predicate(id, marker, text, own, None) else {
            return;
        };
        if let Some(source) = source {
            self.note_prefetch(&source.name);
        }
        debug!(marker = %marker, predicate = %predicate.expression, "resolved conditional");
        self.bindings.insert(
            id,
            NodeBinding::Conditional(ConditionalBinding {
                marker: marker.to_string(),
                source: source.map(|source| source.name.clone()),
                predicate,
            }),
        );
    }

    fn resolve_placeholder(&mut self, id: RegionId) {
        let tree = self.tree;
        let node = tree.node(id);
        let RegionKind::Placeholder {
            name,
            field,
            format,
            ..
        } = &node.kind
        else {
            return;
        };
        // Rows sharing a name are conditional formats; at most one may lack
        // a predicate, and that row supplies the field and fallback format.
        let rows = self.entries(name, false);
        let (conditional, plain): (Vec<_>, Vec<_>) =
            rows.into_iter().partition(|entry| entry.predicate.is_some());
        if plain.len() > 1 {
            self.duplicate(name);
        }
        let entry = plain.first().or_else(|| conditional.first()).copied();
        let fallback_format = plain.first().and_then(|entry| entry.format.as_deref());

        let resolved = match entry {
            Some(entry) => {
                let bound = entry.field.clone().unwrap_or_else(|| field.clone());
                let from_source = bound.scope.is_none() && entry.source.is_some();
                let path = FieldPath {
                    scope: bound.scope.or_else(|| entry.source.clone()),
                    column: bound.column,
                };
                self.resolve_field(id, name, &path, None)
                    .map_err(|err| match err {
                        BindingError::UnknownScope {
                            name,
                            scope,
                            location,
                        } if from_source => BindingError::UndefinedSource {
                            name,
                            source_name: scope,
                            location,
                        },
                        other => other,
                    })
            }
            None if field.is_generated_at() => {
                Ok(FieldRef::new(FieldTarget::GeneratedAt, field.column.clone()))
            }
            None => self.resolve_implicit(id, name, field),
        };
        let field_ref = match resolved {
            Ok(field_ref) => field_ref,
            Err(err) => {
                self.errors.push(err);
                return;
            }
        };

        let Some(fallback) = self.parse_format(name, format.as_deref().or(fallback_format)) else {
            return;
        };
        let mut conditional_formats = Vec::new();
        if format.is_none() {
            for row in conditional {
                let text = row.predicate.as_deref().unwrap_or_default();
                let predicate = self.compile_predicate(id, name, text, None, row.source.as_deref());
                let format = self.parse_format(name, row.format.as_deref());
                if let (Some(predicate), Some(format)) = (predicate, format) {
                    conditional_formats.push(ConditionalFormat { predicate, format });
                }
            }
        }

        debug!(placeholder = %name, column = %field_ref.column, "resolved placeholder");
        self.bindings.insert(
            id,
            NodeBinding::Placeholder(PlaceholderBinding {
                name: name.clone(),
                field: field_ref,
                format: fallback,
                conditional_formats,
                default: entry.and_then(|entry| entry.default.clone()),
            }),
        );
    }

    fn parse_format(&mut self, name: &str, text: Option<&str>) -> Option<FormatSpec> {
        match text.map(FormatSpec::parse).transpose() {
            Ok(format) => Some(format.unwrap_or_default()),
            Err(err) => {
                self.errors.push(BindingError::InvalidFormat {
                    name: name.to_string(),
                    message: err.to_string(),
                });
                None
            }
        }
    }

    /// Binding for a token with no entry: a qualified reference or a column
    /// of an enclosing marker's source.
    fn resolve_implicit(
        &mut self,
        id: RegionId,
        name: &str,
        field: &FieldPath,
    ) -> Result<FieldRef, BindingError> {
        if field.scope.is_some() {
            return self.resolve_field(id, name, field, None);
        }
        self.resolve_field(id, name, field, None).map_err(|err| match err {
            BindingError::FieldNotInScope { .. } | BindingError::NoSourceInScope { .. } => {
                let mut candidates = self.entry_names(false);
                for scope in self.scopes(id, None) {
                    if let Some(schema) = &scope.source.schema {
                        candidates.extend(schema.names());
                    }
                }
                BindingError::UnresolvedReference {
                    kind: "placeholder",
                    name: name.to_string(),
                    location: self.tree.node(id).location.clone(),
                    suggestion: suggest(name, candidates),
                }
            }
            other => other,
        })
    }

    fn report_unused(&mut self) {
        for (entry, used) in self.spec.entries().iter().zip(&self.used) {
            if !used {
                self.errors.push(BindingError::UnusedBinding {
                    name: entry.name.clone(),
                    location: entry.location(),
                });
            }
        }
    }
}

fn kind_label(kind: MarkerKind) -> &'static str {
    match kind {
        MarkerKind::Repeat => "repeat",
        MarkerKind::Conditional => "conditional",
    }
}

fn not_in_scope(
    name: &str,
    column: &str,
    source: &DataSourceDef,
    location: String,
) -> BindingError {
    let suggestion = source
        .schema
        .as_ref()
        .and_then(|schema| suggest(column, schema.names()));
    BindingError::FieldNotInScope {
        name: name.to_string(),
        column: column.to_string(),
        source_name: source.name.clone(),
        location,
        suggestion,
    }
}
