use crate::types::events::PollUpdate;
use crate::types::jid::Jid;
use crate::types::message::PollCreationMessage;
use std::collections::HashMap;

/// Votes collected for one poll option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTally {
    pub name: String,
    pub voters: Vec<Jid>,
}

/// Folds vote updates into a per-option tally.
///
/// Each voter counts once: their most recent update (by sender timestamp)
/// replaces earlier ones, and an empty selection retracts the vote. Options
/// that are not part of the poll definition are appended in first-seen order.
pub fn aggregate_votes(poll: &PollCreationMessage, updates: &[PollUpdate]) -> Vec<PollTally> {
    let mut latest: HashMap<&Jid, &PollUpdate> = HashMap::new();
    for update in updates {
        match latest.get(&update.voter) {
            Some(existing) if existing.sender_timestamp_ms > update.sender_timestamp_ms => {}
            _ => {
                latest.insert(&update.voter, update);
            }
        }
    }

    let mut tallies: Vec<PollTally> = poll
        .options
        .iter()
        .map(|opt| PollTally {
            name: opt.option_name.clone(),
            voters: Vec::new(),
        })
        .collect();

    // Walk updates in arrival order so voter lists are stable.
    for update in updates {
        let Some(current) = latest.get(&update.voter) else {
            continue;
        };
        if !std::ptr::eq(*current, update) {
            continue;
        }
        for selected in &update.selected_options {
            let idx = match tallies.iter().position(|t| &t.name == selected) {
                Some(idx) => idx,
                None => {
                    tallies.push(PollTally {
                        name: selected.clone(),
                        voters: Vec::new(),
                    });
                    tallies.len() - 1
                }
            };
            tallies[idx].voters.push(update.voter.clone());
        }
    }

    tallies
}
