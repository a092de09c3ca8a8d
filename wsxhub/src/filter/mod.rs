/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Filter predicate engine.
//!
//! A [`FilterClause`] combines compiled [`Filter`]s over every object of a
//! [`Message`]. Clauses are written as JSON:
//!
//! ```json
//! {
//!   "operator": "or",
//!   "batchOperator": "and",
//!   "not": false,
//!   "filters": [{"type": "contained", "map": {"event": "click"}}]
//! }
//! ```
//!
//! Combination rules, with `F` the filters and `O` the decoded objects:
//!
//! | operator | batchOperator | clause holds when |
//! |----------|---------------|-------------------|
//! | and      | and           | every filter matches every object |
//! | and      | or            | every filter matches at least one object |
//! | or       | and           | every object is matched by at least one filter |
//! | or       | or            | some filter matches some object |
//!
//! `not` negates the final result. A clause without filters matches every
//! message, or none when negated.

mod matcher;

pub use matcher::{Filter, MatchType, RegexMap, RegexNode};

use crate::error::{HubError, HubResult};
use crate::message::{JsonObject, Message};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Boolean combinator used across filters and across batch objects.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorType {
    And,
    Or,
}

#[derive(Debug, Default, Deserialize)]
struct FilterClauseSource {
    #[serde(default)]
    operator: Option<OperatorType>,
    #[serde(default, rename = "batchOperator")]
    batch_operator: Option<OperatorType>,
    #[serde(default)]
    not: bool,
    #[serde(default)]
    filters: Option<Vec<FilterSource>>,
}

#[derive(Debug, Deserialize)]
struct FilterSource {
    #[serde(default, rename = "type")]
    match_type: MatchType,
    #[serde(default)]
    map: JsonObject,
}

/// Compiled predicate deciding whether a connection receives a message.
#[derive(Clone, Debug)]
pub struct FilterClause {
    operator: OperatorType,
    batch_operator: OperatorType,
    filters: Vec<Filter>,
    negate: bool,
}

impl Default for FilterClause {
    fn default() -> Self {
        Self::match_all()
    }
}

impl FilterClause {
    pub const DEFAULT_OPERATOR: OperatorType = OperatorType::Or;
    pub const DEFAULT_BATCH_OPERATOR: OperatorType = OperatorType::And;

    /// Clause without filters; every message passes.
    pub fn match_all() -> Self {
        Self::new(
            Self::DEFAULT_OPERATOR,
            Self::DEFAULT_BATCH_OPERATOR,
            Vec::new(),
            false,
        )
    }

    pub fn new(
        operator: OperatorType,
        batch_operator: OperatorType,
        filters: Vec<Filter>,
        negate: bool,
    ) -> Self {
        Self {
            operator,
            batch_operator,
            filters,
            negate,
        }
    }

    /// Parses and compiles a JSON clause. Blank input yields [`FilterClause::match_all`].
    ///
    /// # Errors
    ///
    /// [`HubError::FilterParse`] for malformed JSON or unknown operator and
    /// match type names, and the regexp compile errors of [`Filter::compile`].
    pub fn parse(source: &str) -> HubResult<Self> {
        if source.trim().is_empty() {
            return Ok(Self::match_all());
        }

        let parsed: FilterClauseSource =
            serde_json::from_str(source).map_err(HubError::FilterParse)?;

        let filters = parsed
            .filters
            .unwrap_or_default()
            .into_iter()
            .map(|filter| Filter::compile(filter.match_type, filter.map))
            .collect::<HubResult<Vec<_>>>()?;

        Ok(Self::new(
            parsed.operator.unwrap_or(Self::DEFAULT_OPERATOR),
            parsed.batch_operator.unwrap_or(Self::DEFAULT_BATCH_OPERATOR),
            filters,
            parsed.not,
        ))
    }

    pub fn operator(&self) -> OperatorType {
        self.operator
    }

    pub fn batch_operator(&self) -> OperatorType {
        self.batch_operator
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    pub fn matches(&self, message: &Message) -> bool {
        self.matches_objects(message.decoded())
    }

    /// Evaluates the clause over already decoded objects.
    pub fn matches_objects(&self, objects: &[JsonObject]) -> bool {
        if self.filters.is_empty() {
            return !self.negate;
        }

        let filters = &self.filters;
        let matched = match (self.operator, self.batch_operator) {
            (OperatorType::And, OperatorType::And) => filters
                .iter()
                .all(|filter| objects.iter().all(|object| filter.matches(object))),
            (OperatorType::And, OperatorType::Or) => filters
                .iter()
                .all(|filter| objects.iter().any(|object| filter.matches(object))),
            (OperatorType::Or, OperatorType::And) => objects
                .iter()
                .all(|object| filters.iter().any(|filter| filter.matches(object))),
            (OperatorType::Or, OperatorType::Or) => filters
                .iter()
                .any(|filter| objects.iter().any(|object| filter.matches(object))),
        };

        matched != self.negate
    }
}

impl FromStr for FilterClause {
    type Err = HubError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Self::parse(source)
    }
}
