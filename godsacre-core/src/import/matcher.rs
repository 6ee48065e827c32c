//! Relational matcher
//!
//! Finds the single stored entity whose relations hold exactly the given
//! members. Subsets and supersets do not match; neither does more than one
//! candidate.

use std::collections::BTreeSet;

use crate::domain::result::Result;
use crate::domain::{EntityId, EntityKind, Record};
use crate::ports::Repository;

/// Match on every `(relation, members)` pair at once
pub fn find_exact_relational_match(
    repo: &dyn Repository,
    kind: EntityKind,
    wanted: &[(&str, Vec<EntityId>)],
) -> Result<Option<Record>> {
    let Some((first_relation, first_members)) = wanted.first() else {
        return Ok(None);
    };
    if wanted.iter().any(|(_, members)| members.is_empty()) {
        return Ok(None);
    }

    let wanted_sets: Vec<(&str, BTreeSet<EntityId>)> = wanted
        .iter()
        .map(|(relation, members)| (*relation, members.iter().copied().collect()))
        .collect();

    let mut matches = Vec::new();
    for candidate in repo.filter_by_relation_membership(kind, first_relation, first_members)? {
        let Some(id) = candidate.id else { continue };
        let mut exact = true;
        for (relation, members) in &wanted_sets {
            let current: BTreeSet<EntityId> =
                repo.relation_values(kind, id, relation)?.into_iter().collect();
            if &current != members {
                exact = false;
                break;
            }
        }
        if exact {
            matches.push(candidate);
        }
    }

    if matches.len() == 1 {
        Ok(matches.pop())
    } else {
        Ok(None)
    }
}
