//! Schema-driven planning.
//!
//! Turns a prior state and the proposed configuration into a
//! [`PlanResult`]: schema defaults are applied, computed attributes that
//! configuration leaves unset keep their prior value, and any change to a
//! `force_new` attribute or block marks the plan as a replacement.

use crate::schema::{Block, BlockNestingMode, Schema};
use crate::types::{AttributeChange, PlanResult};
use serde_json::{Map, Value};

/// Plan a resource change.
///
/// `prior` is `None` when the resource is being created.
pub fn plan(schema: &Schema, prior: Option<&Value>, proposed: Value) -> PlanResult {
    let mut planned = match proposed {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    apply_defaults(schema, &mut planned);

    let Some(prior) = prior.and_then(Value::as_object) else {
        let changes = planned
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| AttributeChange::added(k.clone(), v.clone()))
            .collect();
        return PlanResult::with_changes(Value::Object(planned), changes, false);
    };

    carry_computed(&schema.block, prior, &mut planned);

    let mut changes = Vec::new();
    let mut requires_replace = false;

    let attributes = schema
        .block
        .attributes
        .iter()
        .map(|(name, attr)| (name, attr.force_new));
    let blocks = schema
        .block
        .blocks
        .iter()
        .map(|(name, block)| (name, block.force_new));

    for (name, force_new) in attributes.chain(blocks) {
        let before = prior.get(name).cloned().unwrap_or(Value::Null);
        let after = planned.get(name).cloned().unwrap_or(Value::Null);
        if before == after {
            continue;
        }

        requires_replace |= force_new;
        changes.push(match (before.is_null(), after.is_null()) {
            (true, _) => AttributeChange::added(name.clone(), after),
            (false, true) => AttributeChange::removed(name.clone(), before),
            (false, false) => AttributeChange::modified(name.clone(), before, after),
        });
    }

    if changes.is_empty() {
        return PlanResult::no_change(Value::Object(planned));
    }

    if requires_replace {
        // A replacement gets fresh server-assigned values.
        for (name, attr) in &schema.block.attributes {
            if attr.flags.is_computed_only() {
                planned.insert(name.clone(), Value::Null);
            }
        }
    }

    PlanResult::with_changes(Value::Object(planned), changes, requires_replace)
}

fn apply_defaults(schema: &Schema, planned: &mut Map<String, Value>) {
    for (name, attr) in &schema.block.attributes {
        let Some(default) = &attr.default else {
            continue;
        };
        let unset = planned.get(name).map_or(true, Value::is_null);
        if unset {
            planned.insert(name.clone(), default.clone());
        }
    }
}

fn carry_computed(block: &Block, prior: &Map<String, Value>, planned: &mut Map<String, Value>) {
    for (name, attr) in &block.attributes {
        if !attr.flags.computed {
            continue;
        }
        let unset = planned.get(name).map_or(true, Value::is_null);
        if unset {
            if let Some(value) = prior.get(name) {
                planned.insert(name.clone(), value.clone());
            }
        }
    }

    for (name, nested) in &block.blocks {
        if nested.nesting_mode != BlockNestingMode::Single {
            continue;
        }
        if let (Some(Value::Object(prior_block)), Some(Value::Object(planned_block))) =
            (prior.get(name), planned.get_mut(name))
        {
            carry_computed(&nested.block, prior_block, planned_block);
        }
    }
}
