//! Prior state read before an event is accounted.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    keys::KeySpace,
    state_store::{Command, Reply},
    types::{MiningMode, RoundAnchor, Track, WorkerShareRecord},
    utils::parse_work_value,
};

/// Worker share records of one round, keyed by worker name.
pub type PriorShares = HashMap<String, WorkerShareRecord>;

/// Everything the engines need to know about the store before an event.
#[derive(Debug, Clone, Default)]
pub struct PriorState {
    shared: [PriorShares; 2],
    solo: [PriorShares; 2],
    anchors: [RoundAnchor; 2],
}

impl PriorState {
    /// The read batch, in the order `from_replies` expects.
    pub fn lookups(keys: &KeySpace) -> Vec<Command> {
        vec![
            Command::hgetall(keys.current_shares(Track::Primary, MiningMode::Shared)),
            Command::hgetall(keys.current_shares(Track::Auxiliary, MiningMode::Shared)),
            Command::hgetall(keys.current_shares(Track::Primary, MiningMode::Solo)),
            Command::hgetall(keys.current_shares(Track::Auxiliary, MiningMode::Solo)),
            Command::hgetall(keys.current_previous(Track::Primary, MiningMode::Shared)),
            Command::hgetall(keys.current_previous(Track::Auxiliary, MiningMode::Shared)),
        ]
    }

    /// Builds the snapshot from the replies of the `lookups` batch. Missing
    /// replies are treated as empty hashes.
    pub fn from_replies(replies: Vec<Reply>) -> Self {
        let mut hashes = replies.into_iter().map(Reply::into_hash);
        let mut next = || hashes.next().unwrap_or_default();

        let shared_primary = decode_shares(next());
        let shared_auxiliary = decode_shares(next());
        let solo_primary = decode_shares(next());
        let solo_auxiliary = decode_shares(next());
        let anchor_primary = decode_anchor(&next());
        let anchor_auxiliary = decode_anchor(&next());

        Self {
            shared: [shared_primary, shared_auxiliary],
            solo: [solo_primary, solo_auxiliary],
            anchors: [anchor_primary, anchor_auxiliary],
        }
    }

    pub fn shares(&self, track: Track, mode: MiningMode) -> &PriorShares {
        match mode {
            MiningMode::Shared => &self.shared[track.index()],
            MiningMode::Solo => &self.solo[track.index()],
        }
    }

    pub fn anchor(&self, track: Track) -> RoundAnchor {
        self.anchors[track.index()]
    }

    pub fn with_shares(mut self, track: Track, mode: MiningMode, shares: PriorShares) -> Self {
        match mode {
            MiningMode::Shared => self.shared[track.index()] = shares,
            MiningMode::Solo => self.solo[track.index()] = shares,
        }
        self
    }

    pub fn with_anchor(mut self, track: Track, anchor: RoundAnchor) -> Self {
        self.anchors[track.index()] = anchor;
        self
    }
}

/// Parses the raw `shares` hash. Unreadable records are skipped.
pub fn decode_shares(raw: HashMap<String, String>) -> PriorShares {
    raw.into_iter()
        .filter_map(|(worker, encoded)| {
            match serde_json::from_str::<WorkerShareRecord>(&encoded) {
                Ok(record) => Some((worker, record)),
                Err(err) => {
                    debug!("Skipping unreadable share record of {}: {}", worker, err);
                    None
                }
            }
        })
        .collect()
}

fn decode_anchor(raw: &HashMap<String, String>) -> RoundAnchor {
    let positive = |field: &str| {
        raw.get(field)
            .map(|value| parse_work_value(value))
            .filter(|value| *value > 0.0)
            .map(|value| value as u64)
    };
    RoundAnchor {
        block_time: positive("blockTime"),
        height: positive("height"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(entries: &[(&str, &str)]) -> Reply {
        Reply::Hash(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_lookups_order() {
        let lookups = PriorState::lookups(&KeySpace::new("pool"));
        assert_eq!(lookups.len(), 6);
        assert_eq!(
            lookups[2],
            Command::hgetall("pool:rounds:primary:current:solo:shares")
        );
        assert_eq!(
            lookups[5],
            Command::hgetall("pool:rounds:auxiliary:current:shared:previous")
        );
    }

    #[test]
    fn test_from_replies() {
        let replies = vec![
            hash(&[("abc.1", r#"{"work":10,"worker":"abc.1"}"#)]),
            hash(&[]),
            hash(&[("xyz.1", r#"{"work":"5","solo":true}"#), ("bad", "not json")]),
            hash(&[]),
            hash(&[("blockTime", "1700000000000"), ("height", "500")]),
        ];
        let state = PriorState::from_replies(replies);

        assert_eq!(
            state.shares(Track::Primary, MiningMode::Shared)["abc.1"].work,
            10.0
        );
        let solo = state.shares(Track::Primary, MiningMode::Solo);
        assert_eq!(solo.len(), 1);
        assert_eq!(solo["xyz.1"].work, 5.0);
        assert_eq!(
            state.anchor(Track::Primary),
            RoundAnchor {
                block_time: Some(1_700_000_000_000),
                height: Some(500)
            }
        );
        assert_eq!(state.anchor(Track::Auxiliary), RoundAnchor::default());
    }
}
