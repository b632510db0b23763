//! Script format for `framegraph run`
//!
//! A script is a list of steps. Frames are referred to by name, links and
//! triggers by aliases the script assigns.
//!
//! ```yaml
//! steps:
//!   - op: transaction
//!     ops:
//!       - { op: create_frame, name: world }
//!       - { op: create_frame, name: robot }
//!       - { op: set_link, alias: odom, parent: world, child: robot, translation: [1, 0, 0] }
//!   - { op: watch_links, alias: w, frames: [world] }
//!   - op: transaction
//!     ops:
//!       - { op: estimate, origin: world }
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub steps: Vec<Step>,
}

impl Script {
    /// Read a script; `.json` files are parsed as JSON, anything else as YAML.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?;
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let script = if is_json {
            serde_json::from_str(&text)?
        } else {
            serde_yaml::from_str(&text)?
        };
        Ok(script)
    }
}

/// A top-level step: a transaction or trigger bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Run `ops` in one transaction, then commit (or abort when `abort`
    /// gives a reason).
    Transaction {
        ops: Vec<Op>,
        #[serde(default)]
        abort: Option<String>,
    },
    WatchLinks {
        alias: String,
        frames: Vec<String>,
    },
    WatchEstimatedTransforms {
        alias: String,
        frames: Vec<String>,
        origin: String,
        /// Translation and rotation thresholds
        #[serde(default)]
        epsilon: [f64; 2],
        #[serde(default)]
        strategy: String,
    },
    WatchFrameData {
        alias: String,
        frames: Vec<String>,
    },
    WatchLinkData {
        alias: String,
        links: Vec<String>,
    },
    DeleteTriggers {
        triggers: Vec<String>,
    },
}

/// An operation inside a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    CreateFrame {
        name: String,
    },
    SetFrameName {
        frame: String,
        name: String,
    },
    DeleteFrame {
        frame: String,
    },
    /// Create a link, or replace the one already known under `alias`.
    SetLink {
        alias: String,
        parent: String,
        child: String,
        #[serde(default)]
        translation: [f64; 3],
        /// Roll, pitch, yaw in radians
        #[serde(default)]
        rotation: [f64; 3],
        #[serde(default)]
        label: String,
        #[serde(default = "default_confidence")]
        confidence: f64,
        /// Seconds since the epoch
        #[serde(default)]
        time: i64,
    },
    DeleteLinks {
        links: Vec<String>,
    },
    SetFrameData {
        frame: String,
        data_type: String,
        value: String,
    },
    DeleteFrameData {
        frame: String,
        types: Vec<String>,
    },
    SetLinkData {
        link: String,
        data_type: String,
        value: String,
    },
    DeleteLinkData {
        link: String,
        types: Vec<String>,
    },
    /// Estimate poses relative to `origin`, over `links` when given or the
    /// `max_hops` neighbourhood otherwise.
    Estimate {
        origin: String,
        #[serde(default)]
        links: Option<Vec<String>>,
        #[serde(default = "default_max_hops")]
        max_hops: usize,
        #[serde(default)]
        strategy: String,
    },
    GetLinks {
        frames: Vec<String>,
        #[serde(default)]
        foreign: bool,
    },
    GetFrameData {
        frame: String,
    },
}

fn default_confidence() -> f64 {
    1.0
}

fn default_max_hops() -> usize {
    usize::MAX
}
