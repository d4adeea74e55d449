use crate::query::{Filter, SortSpec};
use bson::Bson;

pub(crate) const MAX_PIPELINE_STAGES: usize = 64;

/// Aggregation expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `"$path"`
    Field(String),
    Literal(Bson),
    Divide(Box<Expr>, Box<Expr>),
    Floor(Box<Expr>),
    Multiply(Vec<Expr>),
    Add(Vec<Expr>),
    Subtract(Box<Expr>, Box<Expr>),
    ToLower(Box<Expr>),
}

impl Expr {
    pub fn field(path: impl Into<String>) -> Self {
        Self::Field(path.into())
    }

    pub fn lit(v: impl Into<Bson>) -> Self {
        Self::Literal(v.into())
    }

    #[must_use]
    pub fn divide(a: Self, b: Self) -> Self {
        Self::Divide(Box::new(a), Box::new(b))
    }

    #[must_use]
    pub fn floor(a: Self) -> Self {
        Self::Floor(Box::new(a))
    }

    #[must_use]
    pub fn subtract(a: Self, b: Self) -> Self {
        Self::Subtract(Box::new(a), Box::new(b))
    }

    #[must_use]
    pub fn to_lower(a: Self) -> Self {
        Self::ToLower(Box::new(a))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Sum(Expr),
    Avg(Expr),
    Min(Expr),
    Max(Expr),
    First(Expr),
    Last(Expr),
}

impl Accumulator {
    /// `{$sum: 1}`
    #[must_use]
    pub fn count() -> Self {
        Self::Sum(Expr::lit(1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupStage {
    pub id: Expr,
    pub fields: Vec<(String, Accumulator)>,
}

impl GroupStage {
    #[must_use]
    pub const fn by(id: Expr) -> Self {
        Self { id, fields: Vec::new() }
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, acc: Accumulator) -> Self {
        self.fields.push((name.into(), acc));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectField {
    Include,
    Exclude,
    Computed(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Group(GroupStage),
    Sort(Vec<SortSpec>),
    Limit(usize),
    Skip(usize),
    Project(Vec<(String, ProjectField)>),
    Count(String),
}

impl Stage {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Match(_) => "$match",
            Self::Group(_) => "$group",
            Self::Sort(_) => "$sort",
            Self::Limit(_) => "$limit",
            Self::Skip(_) => "$skip",
            Self::Project(_) => "$project",
            Self::Count(_) => "$count",
        }
    }
}

/// Ordered list of stages; each consumes the previous stage's output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn matching(mut self, filter: Filter) -> Self {
        self.stages.push(Stage::Match(filter));
        self
    }

    #[must_use]
    pub fn group(mut self, group: GroupStage) -> Self {
        self.stages.push(Stage::Group(group));
        self
    }

    #[must_use]
    pub fn sort(mut self, keys: Vec<SortSpec>) -> Self {
        self.stages.push(Stage::Sort(keys));
        self
    }

    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.stages.push(Stage::Limit(n));
        self
    }

    #[must_use]
    pub fn skip(mut self, n: usize) -> Self {
        self.stages.push(Stage::Skip(n));
        self
    }

    #[must_use]
    pub fn project(mut self, fields: Vec<(String, ProjectField)>) -> Self {
        self.stages.push(Stage::Project(fields));
        self
    }

    #[must_use]
    pub fn count(mut self, name: impl Into<String>) -> Self {
        self.stages.push(Stage::Count(name.into()));
        self
    }
}
