//! Executes an [`ExecutionPlan`] into an [`OutputTree`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info_span, warn};

use autoreport_bind::{
    CompiledPredicate, ConditionalBinding, ExecutionPlan, FieldRef, FieldTarget,
    PlaceholderBinding, RepeatBinding,
};
use autoreport_format::{FormatSpec, format_value};
use autoreport_model::{DataSourceDef, Dataset, FieldPath, Parameters, Value};
use autoreport_template::{RegionId, RegionKind, RunOrigin};

use crate::cancel::CancelToken;
use crate::error::{MergeError, MergeWarning};
use crate::executor::SourceExecutor;
use crate::options::MergeOptions;
use crate::output::{OutputBuilder, OutputTree, document_shell};
use crate::scope::RowScope;

/// One record of a source that stands in for that source's first row, so a
/// report can be produced per record.
#[derive(Debug, Clone)]
pub struct RecordScope {
    pub source: String,
    pub dataset: Arc<Dataset>,
    pub row: usize,
}

impl RecordScope {
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.dataset.value(self.row, column)
    }
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub tree: OutputTree,
    pub warnings: Vec<MergeWarning>,
}

/// Merges a plan against live data. Read-only, so one engine serves a whole
/// batch.
#[derive(Debug)]
pub struct MergeEngine<'a> {
    plan: &'a ExecutionPlan,
    executor: &'a SourceExecutor,
    options: MergeOptions,
    generated_at: NaiveDateTime,
}

impl<'a> MergeEngine<'a> {
    /// Fixes the generation timestamp for every merge of this engine.
    pub fn new(plan: &'a ExecutionPlan, executor: &'a SourceExecutor, options: MergeOptions) -> Self {
        let generated_at = options
            .generated_at
            .unwrap_or_else(|| Local::now().naive_local());
        Self {
            plan,
            executor,
            options,
            generated_at,
        }
    }

    pub fn plan(&self) -> &ExecutionPlan {
        self.plan
    }

    pub fn executor(&self) -> &SourceExecutor {
        self.executor
    }

    pub fn generated_at(&self) -> NaiveDateTime {
        self.generated_at
    }

    fn source(&self, name: &str) -> Result<&'a DataSourceDef, MergeError> {
        self.plan
            .source(name)
            .ok_or_else(|| MergeError::UnknownSource(name.to_string()))
    }

    /// Fetches every uncorrelated source, outer regions first, so data errors
    /// surface before any output is built.
    pub fn prefetch(&self) -> Result<(), MergeError> {
        let _span = info_span!("prefetch").entered();
        for name in self.plan.prefetch_order() {
            let source = self.source(name)?;
            self.executor.fetch_shared(source)?;
        }
        Ok(())
    }

    /// Every row of `source`, as records for per-record merges.
    pub fn records(&self, source: &str) -> Result<Vec<RecordScope>, MergeError> {
        let definition = self.source(source)?;
        let dataset = self.executor.fetch_shared(definition)?;
        Ok((0..dataset.len())
            .map(|row| RecordScope {
                source: definition.name.clone(),
                dataset: Arc::clone(&dataset),
                row,
            })
            .collect())
    }

    pub fn merge(&self, cancel: &CancelToken) -> Result<MergeOutcome, MergeError> {
        self.merge_record(None, cancel)
    }

    pub fn merge_record(
        &self,
        record: Option<&RecordScope>,
        cancel: &CancelToken,
    ) -> Result<MergeOutcome, MergeError> {
        let span = info_span!(
            "merge",
            record = record.map(|record| record.row + 1),
            duration_ms = tracing::field::Empty
        );
        let _guard = span.enter();
        let start = Instant::now();

        self.prefetch()?;
        let tree = self.plan.tree();
        let root = tree.root();
        let mut run = MergeRun {
            plan: self.plan,
            executor: self.executor,
            options: &self.options,
            generated_at: self.generated_at,
            record,
            cancel,
            builder: OutputBuilder::new(&document_shell()),
            warnings: Vec::new(),
        };
        if let RegionKind::Group { shell, children } = tree.kind(root) {
            run.builder = OutputBuilder::new(shell);
            for child in children {
                run.region(*child, None)?;
            }
        } else {
            run.region(root, None)?;
        }

        let outcome = MergeOutcome {
            tree: run.builder.finish(),
            warnings: run.warnings,
        };
        span.record("duration_ms", start.elapsed().as_millis());
        debug!(warnings = outcome.warnings.len(), "merge complete");
        Ok(outcome)
    }
}

/// State of one in-flight merge.
struct MergeRun<'e> {
    plan: &'e ExecutionPlan,
    executor: &'e SourceExecutor,
    options: &'e MergeOptions,
    generated_at: NaiveDateTime,
    record: Option<&'e RecordScope>,
    cancel: &'e CancelToken,
    builder: OutputBuilder,
    warnings: Vec<MergeWarning>,
}

impl<'e> MergeRun<'e> {
    fn region(&mut self, id: RegionId, scope: Option<&RowScope<'_>>) -> Result<(), MergeError> {
        if self.cancel.is_cancelled() {
            return Err(MergeError::Cancelled);
        }
        let plan = self.plan;
        match plan.tree().kind(id) {
            RegionKind::Static {
                text,
                style,
                origin,
            } => {
                self.builder.push_text(text, style.as_deref(), *origin);
                Ok(())
            }
            RegionKind::Placeholder { style, origin, .. } => {
                self.placeholder(id, style.as_deref(), *origin, scope)
            }
            RegionKind::Group { shell, children } => {
                self.builder.open(shell);
                for child in children {
                    self.region(*child, scope)?;
                }
                self.builder.close();
                Ok(())
            }
            RegionKind::Conditional { children, .. } => match plan.conditional(id) {
                Some(binding) => self.conditional(id, binding, children, scope),
                None => Ok(()),
            },
            RegionKind::Repeat {
                children, fallback, ..
            } => match plan.repeat(id) {
                Some(binding) => self.repeat(id, binding, children, fallback.as_deref(), scope),
                None => Ok(()),
            },
        }
    }

    fn source(&self, name: &str) -> Result<&'e DataSourceDef, MergeError> {
        self.plan
            .source(name)
            .ok_or_else(|| MergeError::UnknownSource(name.to_string()))
    }

    /// The row standing for a source outside the row scopes: the current
    /// record when merging per record, else the first row.
    fn root_row(&self, source: &str) -> Result<(Arc<Dataset>, usize), MergeError> {
        if let Some(record) = self.record
            && record.source.eq_ignore_ascii_case(source)
        {
            return Ok((Arc::clone(&record.dataset), record.row));
        }
        let dataset = self.executor.fetch_shared(self.source(source)?)?;
        Ok((dataset, 0))
    }

    fn lookup(
        &self,
        field: &FieldRef,
        scope: Option<&RowScope<'_>>,
    ) -> Result<Option<Value>, MergeError> {
        Ok(match &field.target {
            FieldTarget::Scope(region) => {
                scope.and_then(|scope| scope.value_in(*region, &field.column))
            }
            FieldTarget::Innermost => scope.and_then(|scope| scope.innermost(&field.column)),
            FieldTarget::GeneratedAt => Some(Value::DateTime(self.generated_at)),
            FieldTarget::Root(source) => {
                let (dataset, row) = self.root_row(source)?;
                dataset.value(row, &field.column).cloned()
            }
        })
    }

    fn evaluate(
        &self,
        predicate: &CompiledPredicate,
        scope: Option<&RowScope<'_>>,
    ) -> Result<bool, MergeError> {
        let mut values: BTreeMap<&FieldPath, Value> = BTreeMap::new();
        for (path, field) in &predicate.fields {
            values.insert(path, self.lookup(field, scope)?.unwrap_or(Value::Null));
        }
        Ok(predicate.expression.evaluate(&|path: &FieldPath| {
            values.get(path).cloned().unwrap_or(Value::Null)
        }))
    }

    fn warn(&mut self, warning: MergeWarning) {
        warn!(code = warning.code(), "{warning}");
        self.warnings.push(warning);
    }

    /// The first conditional format whose predicate holds, else the plain one.
    fn format_for<'b>(
        &self,
        binding: &'b PlaceholderBinding,
        scope: Option<&RowScope<'_>>,
    ) -> Result<&'b FormatSpec, MergeError> {
        for conditional in &binding.conditional_formats {
            if self.evaluate(&conditional.predicate, scope)? {
                return Ok(&conditional.format);
            }
        }
        Ok(&binding.format)
    }

    fn placeholder(
        &mut self,
        id: RegionId,
        style: Option<&str>,
        origin: RunOrigin,
        scope: Option<&RowScope<'_>>,
    ) -> Result<(), MergeError> {
        let plan = self.plan;
        let location = &plan.tree().node(id).location;
        let Some(binding) = plan.placeholder(id) else {
            return Ok(());
        };
        let text = match self.lookup(&binding.field, scope)? {
            None => {
                self.warn(MergeWarning::MissingField {
                    placeholder: binding.name.clone(),
                    column: binding.field.column.clone(),
                    location: location.clone(),
                });
                binding
                    .default
                    .clone()
                    .unwrap_or_else(|| self.options.missing_marker.clone())
            }
            Some(Value::Null) if binding.default.is_some() => {
                binding.default.clone().unwrap_or_default()
            }
            Some(value) => match format_value(&value, self.format_for(binding, scope)?) {
                Ok(text) => text,
                Err(err) => {
                    self.warn(MergeWarning::Format {
                        placeholder: binding.name.clone(),
                        message: err.to_string(),
                        location: location.clone(),
                    });
                    value.to_string()
                }
            },
        };
        self.builder.push_text(&text, style, origin);
        Ok(())
    }

    fn conditional(
        &mut self,
        id: RegionId,
        binding: &ConditionalBinding,
        children: &[RegionId],
        scope: Option<&RowScope<'_>>,
    ) -> Result<(), MergeError> {
        let own = match &binding.source {
            Some(source) => Some(self.root_row(source)?),
            None => None,
        };
        let frame = own
            .as_ref()
            .filter(|(dataset, row)| *row < dataset.len())
            .map(|(dataset, row)| RowScope::new(scope, id, dataset, *row));
        let inner: Option<&RowScope<'_>> = match &frame {
            Some(frame) => Some(frame),
            None => scope,
        };
        if !self.evaluate(&binding.predicate, inner)? {
            return Ok(());
        }
        for child in children {
            self.region(*child, inner)?;
        }
        Ok(())
    }

    fn repeat_rows(
        &self,
        binding: &RepeatBinding,
        scope: Option<&RowScope<'_>>,
    ) -> Result<Arc<Dataset>, MergeError> {
        let source = self.source(&binding.source)?;
        let Some(correlation) = &binding.correlation else {
            return Ok(self.executor.fetch_shared(source)?);
        };
        let mut parameters = Parameters::new();
        for parameter in &correlation.parameters {
            let value = self.lookup(&parameter.field, scope)?.unwrap_or(Value::Null);
            parameters.insert(parameter.name.clone(), value);
        }
        Ok(self.executor.fetch(source, &parameters)?)
    }

    fn repeat(
        &mut self,
        id: RegionId,
        binding: &RepeatBinding,
        children: &[RegionId],
        fallback: Option<&[RegionId]>,
        scope: Option<&RowScope<'_>>,
    ) -> Result<(), MergeError> {
        let dataset = self.repeat_rows(binding, scope)?;
        let mut emitted = 0usize;
        for row in 0..dataset.len() {
            let frame = RowScope::new(scope, id, &dataset, row);
            if let Some(filter) = &binding.filter
                && !self.evaluate(filter, Some(&frame))?
            {
                continue;
            }
            emitted += 1;
            for child in children {
                self.region(*child, Some(&frame))?;
            }
        }
        if emitted == 0
            && let Some(fallback) = fallback
        {
            for child in fallback {
                self.region(*child, scope)?;
            }
        }
        debug!(
            marker = %binding.marker,
            rows = dataset.len(),
            emitted,
            "repeat expanded"
        );
        Ok(())
    }
}
