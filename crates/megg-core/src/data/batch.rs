//! Batch records and per-egg inspection results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inspection verdict for one egg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EggQuality {
    /// Passed inspection
    Good,
    /// Rejected
    Bad,
}

/// Size category for one egg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EggSize {
    /// Small
    Small,
    /// Medium
    Medium,
    /// Large
    Large,
}

impl EggSize {
    /// All size categories
    pub const ALL: [EggSize; 3] = [EggSize::Small, EggSize::Medium, EggSize::Large];
}

/// Result of inspecting a single egg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EggResult {
    /// Quality verdict
    pub quality: EggQuality,
    /// Size category
    pub size: EggSize,
    /// When the egg was inspected
    pub timestamp: DateTime<Utc>,
}

/// Accumulated statistics of a batch
///
/// Size counters only count good eggs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    /// Eggs inspected so far
    pub total_processed: u32,
    /// Eggs that passed
    pub good_eggs: u32,
    /// Eggs that were rejected
    pub bad_eggs: u32,
    /// Good small eggs
    pub small_eggs: u32,
    /// Good medium eggs
    pub medium_eggs: u32,
    /// Good large eggs
    pub large_eggs: u32,
}

impl BatchStats {
    /// Fold one inspection result into the statistics
    pub fn record(&mut self, quality: EggQuality, size: EggSize) {
        self.total_processed += 1;
        match quality {
            EggQuality::Good => {
                self.good_eggs += 1;
                match size {
                    EggSize::Small => self.small_eggs += 1,
                    EggSize::Medium => self.medium_eggs += 1,
                    EggSize::Large => self.large_eggs += 1,
                }
            }
            EggQuality::Bad => self.bad_eggs += 1,
        }
    }
}

/// One run of the sorting workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Batch identifier
    pub id: String,
    /// Number of eggs to process
    pub target_count: u32,
    /// When the batch was started
    pub start_time: DateTime<Utc>,
    /// When the batch completed, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
    /// Final statistics, frozen at completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<BatchStats>,
}

impl Batch {
    /// Start a new batch now
    pub fn new(id: impl Into<String>, target_count: u32) -> Self {
        Self {
            id: id.into(),
            target_count,
            start_time: Utc::now(),
            completion_time: None,
            stats: None,
        }
    }

    /// Default identifier derived from the current local time
    pub fn default_id() -> String {
        chrono::Local::now()
            .format("BATCH-%Y%m%d-%H%M%S")
            .to_string()
    }

    /// Freeze the batch with its final statistics
    pub fn complete(&mut self, stats: BatchStats) {
        self.completion_time = Some(Utc::now());
        self.stats = Some(stats);
    }

    /// Whether the batch has been frozen
    pub fn is_complete(&self) -> bool {
        self.completion_time.is_some()
    }
}
