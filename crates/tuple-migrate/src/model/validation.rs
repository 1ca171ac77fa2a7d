//! Matching model validation.

use super::{DefaultValue, Match, Reference, ReferencedValue, TupleTree, ValueMatchId, ValueMatchTable};
use crate::error::{MigrateError, Result};

/// Validate the matching model. Tuple id uniqueness, the single root and
/// parent links are already enforced by [`TupleTree::build`].
pub fn validate(tree: &TupleTree, value_matches: &ValueMatchTable) -> Result<()> {
    for id in tree.pre_order() {
        let node = tree.node(id);
        let tuple = &node.tuple;

        let pk_count = tuple.matches.iter().filter(|m| m.is_pk.is_yes()).count();
        if pk_count != 1 {
            return Err(MigrateError::model(format!(
                "Tuple {} must have exactly one PK match, found {}",
                tuple.id, pk_count
            )));
        }
        if let Some(pk) = tuple.pk_match() {
            if !pk.references.iter().any(Reference::is_direct) {
                return Err(MigrateError::model(format!(
                    "PK match {} of tuple {} needs at least one direct reference",
                    pk.id, tuple.id
                )));
            }
            for r in &pk.references {
                if r.is_direct() && r.referenced_value == ReferencedValue::Equals {
                    return Err(MigrateError::model(format!(
                        "Reference {} of tuple {}: EQUALS is only valid on indirect references",
                        r.id, tuple.id
                    )));
                }
                // CURRk in the PK query reads the k-th ancestor
                check_curr(r, node.depth, 0, tuple.id)?;
            }
        }

        for m in &tuple.matches {
            validate_match(m, node.depth, tuple.id, value_matches)?;
        }

        for r in &tuple.references {
            let Some(referencee) = &r.referencee else {
                continue;
            };
            if !referencee.table.eq_ignore_ascii_case(&tuple.table) {
                continue;
            }
            if let ReferencedValue::Top(_) = r.referenced_value {
                let found = std::iter::successors(tree.parent(id), |p| tree.parent(*p))
                    .any(|p| tree.tuple(p).table.eq_ignore_ascii_case(&r.referenced.table));
                if !found {
                    return Err(MigrateError::model(format!(
                        "Self reference {} of tuple {}: no enclosing tuple maps table '{}'",
                        r.id, tuple.id, r.referenced.table
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_match(
    m: &Match,
    depth: usize,
    tuple_id: u32,
    value_matches: &ValueMatchTable,
) -> Result<()> {
    if let ValueMatchId::Group(group) = m.value_match_id {
        if value_matches.group(group).is_none() {
            return Err(MigrateError::model(format!(
                "Match {} of tuple {} uses unknown value match group {}",
                m.id, tuple_id, group
            )));
        }
    }

    if m.right.is_none() {
        match m.default_value {
            DefaultValue::AiSkipTrue | DefaultValue::AiSkipFalse => {
                return Err(MigrateError::model(format!(
                    "Match {} of tuple {}: {} needs a source column",
                    m.id, tuple_id, m.default_value
                )));
            }
            DefaultValue::Top(levels) if levels > depth => {
                return Err(MigrateError::model(format!(
                    "Match {} of tuple {}: {} climbs above the root tuple",
                    m.id, tuple_id, m.default_value
                )));
            }
            _ => {}
        }
    }

    for r in &m.references {
        // CURRk in a match query reads the (k-1)-th ancestor
        check_curr(r, depth, 1, tuple_id)?;
    }
    Ok(())
}

fn check_curr(r: &Reference, depth: usize, offset: usize, tuple_id: u32) -> Result<()> {
    if !r.is_direct() && r.referencee.is_none() {
        return Err(MigrateError::model(format!(
            "Indirect reference {} of tuple {} has no referencee",
            r.id, tuple_id
        )));
    }
    if let ReferencedValue::Curr(level) = r.referenced_value {
        if level - offset > depth {
            return Err(MigrateError::model(format!(
                "Reference {} of tuple {}: {} climbs above the root tuple",
                r.id, tuple_id, r.referenced_value
            )));
        }
    }
    Ok(())
}
