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

//! Single-filter matching against one decoded JSON object.

use crate::error::{HubError, HubResult};
use crate::message::JsonObject;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// How a filter pattern is compared with a target object.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchType {
    /// Pattern and target contain exactly the same keys and values.
    Exact,
    /// Pattern and target contain exactly the same keys.
    #[serde(alias = "exactKey")]
    ExactKey,
    /// Pattern leaves are regular expressions matched against string values.
    Regexp,
    /// Pattern is a subset of the target.
    #[default]
    Contained,
    /// Target is a subset of the pattern.
    Contain,
    /// Pattern keys are a subset of the target keys.
    #[serde(alias = "containedKey")]
    ContainedKey,
    /// Target keys are a subset of the pattern keys.
    #[serde(alias = "containKey")]
    ContainKey,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MatchType::Exact => "exact",
            MatchType::ExactKey => "exact-key",
            MatchType::Regexp => "regexp",
            MatchType::Contained => "contained",
            MatchType::Contain => "contain",
            MatchType::ContainedKey => "contained-key",
            MatchType::ContainKey => "contain-key",
        };
        f.write_str(label)
    }
}

/// Regexp pattern tree compiled from a filter map.
pub type RegexMap = BTreeMap<String, RegexNode>;

#[derive(Clone, Debug)]
pub enum RegexNode {
    Leaf(Regex),
    Nested(RegexMap),
}

/// A compiled filter.
///
/// Each variant carries the pattern representation its matcher needs, so a
/// regexp filter can never be evaluated with an uncompiled pattern.
#[derive(Clone, Debug)]
pub enum Filter {
    Exact(JsonObject),
    ExactKey(JsonObject),
    Regexp(RegexMap),
    Contained(JsonObject),
    Contain(JsonObject),
    ContainedKey(JsonObject),
    ContainKey(JsonObject),
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum Compare {
    KeysAndValues,
    KeysOnly,
}

impl Filter {
    /// Compiles a pattern for `match_type`. Regexp leaves are compiled here.
    ///
    /// # Errors
    ///
    /// Fails when a regexp leaf is not a string or does not compile.
    pub fn compile(match_type: MatchType, pattern: JsonObject) -> HubResult<Self> {
        let filter = match match_type {
            MatchType::Exact => Filter::Exact(pattern),
            MatchType::ExactKey => Filter::ExactKey(pattern),
            MatchType::Regexp => Filter::Regexp(compile_regex_map(&pattern)?),
            MatchType::Contained => Filter::Contained(pattern),
            MatchType::Contain => Filter::Contain(pattern),
            MatchType::ContainedKey => Filter::ContainedKey(pattern),
            MatchType::ContainKey => Filter::ContainKey(pattern),
        };
        Ok(filter)
    }

    pub fn match_type(&self) -> MatchType {
        match self {
            Filter::Exact(_) => MatchType::Exact,
            Filter::ExactKey(_) => MatchType::ExactKey,
            Filter::Regexp(_) => MatchType::Regexp,
            Filter::Contained(_) => MatchType::Contained,
            Filter::Contain(_) => MatchType::Contain,
            Filter::ContainedKey(_) => MatchType::ContainedKey,
            Filter::ContainKey(_) => MatchType::ContainKey,
        }
    }

    /// Evaluates this filter against one decoded object.
    pub fn matches(&self, target: &JsonObject) -> bool {
        use Compare::{KeysAndValues, KeysOnly};

        match self {
            Filter::Exact(pattern) => {
                is_subset(pattern, target, KeysAndValues) && is_subset(target, pattern, KeysAndValues)
            }
            Filter::ExactKey(pattern) => {
                is_subset(pattern, target, KeysOnly) && is_subset(target, pattern, KeysOnly)
            }
            Filter::Regexp(pattern) => regexp_match(pattern, target),
            Filter::Contained(pattern) => is_subset(pattern, target, KeysAndValues),
            Filter::Contain(pattern) => is_subset(target, pattern, KeysAndValues),
            Filter::ContainedKey(pattern) => is_subset(pattern, target, KeysOnly),
            Filter::ContainKey(pattern) => is_subset(target, pattern, KeysOnly),
        }
    }
}

fn compile_regex_map(pattern: &JsonObject) -> HubResult<RegexMap> {
    pattern
        .iter()
        .map(|(key, value)| {
            let node = match value {
                Value::Object(nested) => RegexNode::Nested(compile_regex_map(nested)?),
                Value::String(source) => {
                    let regex = Regex::new(&format!("^(?:{source})$")).map_err(|source| {
                        HubError::InvalidRegex {
                            key: key.clone(),
                            source,
                        }
                    })?;
                    RegexNode::Leaf(regex)
                }
                other => {
                    return Err(HubError::RegexValueNotString {
                        key: key.clone(),
                        value: other.clone(),
                    })
                }
            };
            Ok((key.clone(), node))
        })
        .collect()
}

// Every key of `smaller` must exist in `larger` with the same nested/leaf shape.
fn is_subset(smaller: &JsonObject, larger: &JsonObject, compare: Compare) -> bool {
    smaller.iter().all(|(key, value)| {
        let Some(other) = larger.get(key) else {
            return false;
        };

        match (value, other) {
            (Value::Object(nested), Value::Object(other_nested)) => {
                is_subset(nested, other_nested, compare)
            }
            (Value::Object(_), _) | (_, Value::Object(_)) => false,
            (leaf, other_leaf) => compare == Compare::KeysOnly || leaf_eq(leaf, other_leaf),
        }
    })
}

fn leaf_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(l), Some(r)) => l == r,
            _ => l == r,
        },
        _ => left == right,
    }
}

fn regexp_match(pattern: &RegexMap, target: &JsonObject) -> bool {
    pattern.iter().all(|(key, node)| match (node, target.get(key)) {
        (RegexNode::Leaf(regex), Some(Value::String(text))) => regex.is_match(text),
        (RegexNode::Nested(nested), Some(Value::Object(object))) => regexp_match(nested, object),
        _ => false,
    })
}
