use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::entity::Link;
use crate::ids::FrameId;
use crate::time::TimeInterval;

/// How links between the same pair of frames are reduced by time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeStrategy {
    /// Keep only the earliest link inside the interval
    Earliest,
    /// Keep every link inside the interval
    Interval,
    /// Keep only the latest link inside the interval
    Latest,
}

/// Time-based link selector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeFilter {
    pub interval: TimeInterval,
    pub strategy: TimeStrategy,
}

impl TimeFilter {
    pub fn new(interval: TimeInterval, strategy: TimeStrategy) -> Self {
        Self { interval, strategy }
    }

    /// Newest link per frame pair, any time.
    pub fn latest() -> Self {
        Self::new(TimeInterval::everything(), TimeStrategy::Latest)
    }

    /// Reduce `links`. Links are grouped by their unordered endpoint pair;
    /// within each group only links stamped inside the interval survive,
    /// and `Earliest`/`Latest` keep a single one (ties go to the lower id).
    /// The result is sorted by link id.
    pub fn apply<'a>(&self, links: impl IntoIterator<Item = &'a Link>) -> Vec<&'a Link> {
        let in_interval = links
            .into_iter()
            .filter(|l| self.interval.contains(&l.content.time));

        let mut selected: Vec<&'a Link> = match self.strategy {
            TimeStrategy::Interval => in_interval.collect(),
            TimeStrategy::Earliest | TimeStrategy::Latest => {
                let mut best: BTreeMap<(FrameId, FrameId), &'a Link> = BTreeMap::new();
                for link in in_interval {
                    let key = pair_key(link);
                    let replace = best
                        .get(&key)
                        .map_or(true, |current| self.prefers(link, current));
                    if replace {
                        best.insert(key, link);
                    }
                }
                best.into_values().collect()
            }
        };
        selected.sort_by_key(|l| l.id);
        selected
    }

    fn prefers(&self, candidate: &Link, current: &Link) -> bool {
        let (ct, cur) = (candidate.content.time, current.content.time);
        match self.strategy {
            TimeStrategy::Earliest => ct < cur || (ct == cur && candidate.id < current.id),
            TimeStrategy::Latest => ct > cur || (ct == cur && candidate.id < current.id),
            TimeStrategy::Interval => true,
        }
    }
}

fn pair_key(link: &Link) -> (FrameId, FrameId) {
    let (a, b) = (link.content.child, link.content.parent);
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Whether the label set is an allow-list or a deny-list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelStrategy {
    In,
    Out,
}

/// Label-based link selector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelFilter {
    pub labels: BTreeSet<String>,
    pub strategy: LabelStrategy,
}

impl LabelFilter {
    pub fn include<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            strategy: LabelStrategy::In,
        }
    }

    pub fn exclude<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            strategy: LabelStrategy::Out,
        }
    }

    pub fn matches(&self, label: &str) -> bool {
        let listed = self.labels.contains(label);
        match self.strategy {
            LabelStrategy::In => listed,
            LabelStrategy::Out => !listed,
        }
    }
}

/// Apply the optional label filter, then the optional time filter.
/// Output is sorted by link id.
pub fn select_links<'a>(
    links: impl IntoIterator<Item = &'a Link>,
    time: Option<&TimeFilter>,
    label: Option<&LabelFilter>,
) -> Vec<&'a Link> {
    let labelled = links
        .into_iter()
        .filter(|l| label.map_or(true, |f| f.matches(&l.content.label)));
    match time {
        Some(tf) => tf.apply(labelled),
        None => {
            let mut all: Vec<&'a Link> = labelled.collect();
            all.sort_by_key(|l| l.id);
            all
        }
    }
}
