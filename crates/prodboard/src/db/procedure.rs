//! Named computations: parameterized, multi-statement operations invoked by name.

use std::collections::HashMap;

use super::value::{normalize_name, ParamKind, Params};
use super::DbError;

/// Declared shape of one parameter of a named computation.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    /// Parameter name including the `:` prefix.
    pub name: &'static str,
    pub kind: ParamKind,
    /// Nullable parameters may be omitted or bound to `Null`.
    pub nullable: bool,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
        }
    }
}

/// One statement of a named computation and the name of the row-set it yields.
#[derive(Debug, Clone, Copy)]
pub struct ResultSpec {
    pub name: &'static str,
    pub sql: &'static str,
}

/// A named computation. Each result statement yields one row-set, in order.
#[derive(Debug)]
pub struct Procedure {
    pub name: &'static str,
    pub params: &'static [ParamSpec],
    pub results: &'static [ResultSpec],
}

impl Procedure {
    /// Checks `params` against the declared specs and returns the full
    /// binding set, with omitted nullable parameters bound to `Null`.
    pub fn bind(&self, params: &Params) -> Result<Params, DbError> {
        for (name, _) in params.iter() {
            if !self.params.iter().any(|spec| spec.name == name) {
                return Err(DbError::validation(
                    self.name,
                    format!("unexpected parameter '{}'", name),
                ));
            }
        }

        let mut bound = Params::new();
        for spec in self.params {
            match params.get(spec.name) {
                Some(value) => match value.kind() {
                    Some(kind) if kind != spec.kind => {
                        return Err(DbError::validation(
                            self.name,
                            format!(
                                "parameter '{}' expects {}, got {}",
                                spec.name, spec.kind, kind
                            ),
                        ));
                    }
                    None if !spec.nullable => {
                        return Err(DbError::validation(
                            self.name,
                            format!("parameter '{}' must not be null", spec.name),
                        ));
                    }
                    _ => bound.set(spec.name, value.clone()),
                },
                None if spec.nullable => bound.set(spec.name, super::Param::Null),
                None => {
                    return Err(DbError::validation(
                        self.name,
                        format!("missing required parameter '{}'", spec.name),
                    ));
                }
            }
        }
        Ok(bound)
    }
}

/// Registry of named computations known to an executor.
#[derive(Debug, Default)]
pub struct ProcedureCatalog {
    procedures: HashMap<&'static str, &'static Procedure>,
}

impl ProcedureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, procedure: &'static Procedure) {
        debug_assert!(procedure.params.iter().all(|p| p.name.starts_with(':')));
        if self.procedures.insert(procedure.name, procedure).is_some() {
            log::warn!("Named computation '{}' registered twice", procedure.name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&'static Procedure> {
        self.procedures.get(name).copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.procedures.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// What the executor should run.
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    /// Ad-hoc SQL text with named placeholders.
    Query(&'a str),
    /// A named computation from the catalog.
    Named(&'a str),
}

impl Operation<'_> {
    pub fn label(&self) -> &str {
        match self {
            Operation::Query(_) => "query",
            Operation::Named(name) => name,
        }
    }
}

/// Checks that a prepared raw statement and the provided parameters agree on names.
pub(crate) fn check_statement_params(
    stmt: &rusqlite::Statement<'_>,
    params: &Params,
) -> Result<(), DbError> {
    let mut declared = Vec::with_capacity(stmt.parameter_count());
    for index in 1..=stmt.parameter_count() {
        match stmt.parameter_name(index) {
            Some(name) => declared.push(normalize_name(name)),
            None => {
                return Err(DbError::validation(
                    "query",
                    format!("positional placeholder at index {} is not supported", index),
                ));
            }
        }
    }

    if let Some(missing) = declared.iter().find(|name| params.get(name).is_none()) {
        return Err(DbError::validation(
            "query",
            format!("missing parameter '{}'", missing),
        ));
    }
    if let Some((extra, _)) = params
        .iter()
        .find(|(name, _)| !declared.iter().any(|d| d == name))
    {
        return Err(DbError::validation(
            "query",
            format!("unexpected parameter '{}'", extra),
        ));
    }
    Ok(())
}
