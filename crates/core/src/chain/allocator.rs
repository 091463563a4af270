#![forbid(unsafe_code)]

use super::ids::LinkId;
use super::types::Chain;

/// Id for the next link of `chain`: one past the largest id the chain holds or
/// has ever issued, so an id freed by removal is never handed out again.
/// `None` once the id space is used up.
pub fn next_link_id(chain: &Chain) -> Option<LinkId> {
    chain.high_water().checked_add(1)
}
