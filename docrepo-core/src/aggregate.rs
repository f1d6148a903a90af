//! Incremental construction of aggregation pipelines.
//!
//! [`AggregatePipelineBuilder`] owns at most one stage of each kind it knows about
//! (`$match`, `$group`, `$sort`). Repeated calls merge into the existing stage. A stage
//! created lazily lands after every stage already in the pipeline and keeps that
//! position.

use bson::{Bson, Document};

const MATCH: &str = "$match";
const GROUP: &str = "$group";
const SORT: &str = "$sort";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageKind {
    Match,
    Group,
    Sort,
}

impl StageKind {
    fn operator(self) -> &'static str {
        match self {
            StageKind::Match => MATCH,
            StageKind::Group => GROUP,
            StageKind::Sort => SORT,
        }
    }
}

/// Builds a `$match` / `$group` / `$sort` pipeline.
///
/// # Example
///
/// ```ignore
/// use bson::doc;
/// use docrepo_core::aggregate::AggregatePipelineBuilder;
///
/// let pipeline = AggregatePipelineBuilder::new()
///     .match_with(doc! { "status": "active" })
///     .set_group_id("$team")
///     .with_group_field("members", doc! { "$sum": 1 })
///     .with_sort_field("members", false, "")
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatePipelineBuilder {
    order: Vec<StageKind>,
    filter: Document,
    group: Document,
    sort: Document,
}

impl Default for AggregatePipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregatePipelineBuilder {
    /// Starts a pipeline with an empty `$match` stage.
    pub fn new() -> Self {
        Self {
            order: vec![StageKind::Match],
            filter: Document::new(),
            group: Document::new(),
            sort: Document::new(),
        }
    }

    /// Merges `filter` into the `$match` stage. Later keys overwrite earlier ones.
    pub fn match_with(mut self, filter: Document) -> Self {
        for (key, value) in filter {
            self.filter.insert(key, value);
        }
        self
    }

    /// Sets the `_id` of the `$group` stage, creating the stage if needed.
    pub fn set_group_id(mut self, id: impl Into<Bson>) -> Self {
        self.attach(StageKind::Group);
        self.group.insert("_id", id.into());
        self
    }

    /// Adds or overwrites an accumulator field of the `$group` stage.
    ///
    /// An empty `name` is ignored.
    pub fn with_group_field(mut self, name: &str, expression: impl Into<Bson>) -> Self {
        if name.is_empty() {
            return self;
        }

        self.attach(StageKind::Group);
        self.group.insert(name, expression.into());
        self
    }

    /// Adds or overwrites a `$sort` key.
    ///
    /// A non-empty `meta` keyword (e.g. `textScore`) replaces the direction with
    /// `{ "$meta": meta }`.
    pub fn with_sort_field(mut self, name: &str, ascending: bool, meta: &str) -> Self {
        self.attach(StageKind::Sort);

        let value = if meta.is_empty() {
            Bson::Int32(if ascending { 1 } else { -1 })
        } else {
            let mut expression = Document::new();
            expression.insert("$meta", meta);
            Bson::Document(expression)
        };

        self.sort.insert(name, value);
        self
    }

    fn attach(&mut self, kind: StageKind) {
        if !self.order.contains(&kind) {
            self.order.push(kind);
        }
    }

    /// Returns the stages in the order they were first used.
    pub fn build(&self) -> Vec<Document> {
        self.order
            .iter()
            .map(|kind| {
                let body = match kind {
                    StageKind::Match => &self.filter,
                    StageKind::Group => &self.group,
                    StageKind::Sort => &self.sort,
                };

                let mut stage = Document::new();
                stage.insert(kind.operator(), body.clone());
                stage
            })
            .collect()
    }
}
