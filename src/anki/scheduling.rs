use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::anki::collection::PackageCard;
use crate::anki::error::PackageError;
use crate::db::{DbCard, Hold, Stage};

// Package stage discriminators (`type` column)
const CTYPE_NEW: i64 = 0;
const CTYPE_LEARNING: i64 = 1;
const CTYPE_REVIEW: i64 = 2;
const CTYPE_RELEARNING: i64 = 3;

// Queue values carrying suspension/bury state
const QUEUE_SUSPENDED: i64 = -1;
const QUEUE_SIBLING_BURIED: i64 = -2;
const QUEUE_MANUALLY_BURIED: i64 = -3;

/// Per-card scheduling state in the package's integer encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageScheduling {
    pub ctype: i64,
    pub queue: i64,
    pub due: i64,
    pub interval: i64,
    pub factor: i64,
    pub reps: i64,
    pub lapses: i64,
}

/// Internal scheduling state decoded from a package card
#[derive(Debug, Clone, PartialEq)]
pub struct InternalScheduling {
    pub stage: Stage,
    pub hold: Hold,
    pub due: Option<DateTime<Utc>>,
    pub interval_days: i64,
    pub difficulty: f64,
    pub reps: i64,
    pub lapses: i64,
    pub position: i64,
}

impl InternalScheduling {
    /// Fresh new-card state, used when scheduling is not preserved
    pub fn fresh(position: i64) -> Self {
        InternalScheduling {
            stage: Stage::New,
            hold: Hold::Active,
            due: None,
            interval_days: 0,
            difficulty: 1.0,
            reps: 0,
            lapses: 0,
            position,
        }
    }
}

/// Bidirectional mapping of per-card scheduling state between the
/// package's integer encoding and the internal fields
///
/// The package overloads one integer (`queue`) for both stage and
/// suspension; internally those are the orthogonal `Stage` and `Hold`.
/// The due integer changes meaning per stage: a queue position for new
/// cards, epoch seconds for (re)learning cards, and days since the
/// collection's creation epoch for review cards.
pub struct SchedulingTranslator;

impl SchedulingTranslator {
    /// Encode a card's internal scheduling state for the package
    ///
    /// `collection_epoch` is the collection's `crt` in epoch seconds,
    /// computed once per operation.
    pub fn to_package_encoding(card: &DbCard, collection_epoch: i64) -> PackageScheduling {
        let ctype = match card.stage {
            Stage::New => CTYPE_NEW,
            Stage::Learning => CTYPE_LEARNING,
            Stage::Review => CTYPE_REVIEW,
            Stage::Relearning => CTYPE_RELEARNING,
        };

        let queue = match card.hold {
            Hold::Suspended => QUEUE_SUSPENDED,
            Hold::Buried => QUEUE_SIBLING_BURIED,
            Hold::Active => match card.stage {
                Stage::New => 0,
                // Relearning cards sit in the learning queue
                Stage::Learning | Stage::Relearning => 1,
                Stage::Review => 2,
            },
        };

        let due = match card.stage {
            // A monotonically increasing sequence number, not a date
            Stage::New => card.position,
            // An absolute point in time
            Stage::Learning | Stage::Relearning => {
                card.due.map(|d| d.timestamp()).unwrap_or(0)
            }
            // Days since the collection epoch
            Stage::Review => card
                .due
                .map(|d| Self::days_since_epoch(d, collection_epoch))
                .unwrap_or(0),
        };

        PackageScheduling {
            ctype,
            queue,
            due,
            interval: card.interval_days,
            factor: (((card.difficulty - 1.0) / 4.0) * 1000.0).round() as i64,
            reps: card.reps,
            lapses: card.lapses,
        }
    }

    /// Decode a package card's scheduling state; the exact inverse of
    /// `to_package_encoding` per branch
    pub fn to_internal_encoding(
        package_card: &PackageCard,
        collection_epoch: i64,
    ) -> Result<InternalScheduling, PackageError> {
        let stage = match package_card.ctype {
            CTYPE_NEW => Stage::New,
            CTYPE_LEARNING => Stage::Learning,
            CTYPE_REVIEW => Stage::Review,
            CTYPE_RELEARNING => Stage::Relearning,
            other => {
                return Err(PackageError::RowMapping(format!(
                    "card {} has unknown scheduling stage {}",
                    package_card.id, other
                )))
            }
        };

        let hold = match package_card.queue {
            QUEUE_SUSPENDED => Hold::Suspended,
            QUEUE_SIBLING_BURIED | QUEUE_MANUALLY_BURIED => Hold::Buried,
            _ => Hold::Active,
        };

        let (due, position) = match stage {
            Stage::New => (None, package_card.due),
            Stage::Learning | Stage::Relearning => {
                let due = Utc.timestamp_opt(package_card.due, 0).single().ok_or_else(|| {
                    PackageError::RowMapping(format!(
                        "card {} has out-of-range due timestamp {}",
                        package_card.id, package_card.due
                    ))
                })?;
                (Some(due), 0)
            }
            Stage::Review => {
                let epoch = Utc.timestamp_opt(collection_epoch, 0).single().ok_or_else(|| {
                    PackageError::RowMapping(format!(
                        "collection epoch {} is out of range",
                        collection_epoch
                    ))
                })?;
                (Some(epoch + Duration::days(package_card.due)), 0)
            }
        };

        Ok(InternalScheduling {
            stage,
            hold,
            due,
            interval_days: package_card.interval,
            difficulty: (package_card.factor as f64 / 1000.0) * 4.0 + 1.0,
            reps: package_card.reps,
            lapses: package_card.lapses,
            position,
        })
    }

    fn days_since_epoch(due: DateTime<Utc>, collection_epoch: i64) -> i64 {
        let epoch = Utc
            .timestamp_opt(collection_epoch, 0)
            .single()
            .unwrap_or_else(Utc::now);
        (due.date_naive() - epoch.date_naive()).num_days()
    }
}
