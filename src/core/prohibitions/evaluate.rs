//! Container condition evaluation for prohibitions

use super::Prohibition;
use std::collections::HashSet;

/// Decide whether a prohibition applies to `target`
///
/// `reached_targets` holds every node reached while walking upward from the
/// target, the target itself included. A container named exactly like the
/// target is never treated as a match: it voids an intersection prohibition
/// and is skipped by a union prohibition.
///
/// A prohibition without containers never applies.
pub fn applies(prohibition: &Prohibition, target: &str, reached_targets: &HashSet<String>) -> bool {
    let mut applies = false;

    for (container, &complement) in &prohibition.containers {
        if container == target {
            applies = false;
            if prohibition.intersection {
                break;
            }
            continue;
        }

        let reached = reached_targets.contains(container);
        let satisfied = (!complement && reached) || (complement && !reached);

        if satisfied {
            applies = true;
            if !prohibition.intersection {
                break;
            }
        } else {
            applies = false;
            if prohibition.intersection {
                break;
            }
        }
    }

    applies
}
