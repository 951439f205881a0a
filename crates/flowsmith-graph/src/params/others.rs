//! Execution-control fields stored flat on a node entry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `pre_wait_freezes` / `post_wait_freezes`: a duration in milliseconds or a
/// detailed object (`time`, `target`, `threshold`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WaitFreezes {
    Millis(u64),
    Detailed(Map<String, Value>),
}

param_record! {
    /// Runtime knobs shared by every pipeline node, independent of its
    /// recognition and action types.
    Others {
        rate_limit: u64,
        timeout: i64,
        inverse: bool,
        enabled: bool,
        pre_delay: u64,
        post_delay: u64,
        pre_wait_freezes: WaitFreezes,
        post_wait_freezes: WaitFreezes,
        focus: Value,
        attach: Value,
    }
}

impl Others {
    pub fn is_empty(&self) -> bool {
        use super::ParamRecord;
        self.to_map().is_empty()
    }
}
