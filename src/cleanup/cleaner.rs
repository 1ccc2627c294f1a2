//! Delete all objects of a kind and wait until they are gone.
//!
//! One pass lists the matching objects, deletes those not yet being deleted
//! and force-finalizes those that have been stuck in deletion for longer
//! than the finalize-after period. Passes repeat on an interval until
//! nothing is left or the deadline passes. Leftover objects are a minor
//! error; every other failure ends the cleanup immediately.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use jiff::{SignedDuration, Timestamp};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::selector::Selector;
use super::target::{Cleanable, ObjectRef};
use crate::error::{Error, Result};
use crate::retry::{self, Outcome};

/// Source of the current time for finalize-after decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// When objects stuck in deletion get their finalizers removed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FinalizeAfter {
    /// After a fixed period since the object's deletion
    Fixed(SignedDuration),
    /// After a share (0.0 to 1.0) of the time left before the deadline at
    /// the start of the cleanup
    ShareOfDeadline(f64),
}

impl FinalizeAfter {
    fn resolve(self, deadline: Instant) -> SignedDuration {
        match self {
            FinalizeAfter::Fixed(period) => period,
            FinalizeAfter::ShareOfDeadline(share) => {
                let split = retry::split_deadline(deadline, share);
                let period = split.saturating_duration_since(Instant::now());
                SignedDuration::try_from(period).unwrap_or(SignedDuration::MAX)
            }
        }
    }
}

/// What a cleanup stage deletes and how.
#[derive(Clone, Debug, Default)]
pub struct CleanOptions {
    pub selector: Selector,
    /// Grace period passed with the first deletion; `None` uses the object's default
    pub grace_period_seconds: Option<u32>,
    pub finalize_after: Option<FinalizeAfter>,
    /// Only objects created before this time count as remaining
    pub gone_before: Option<Timestamp>,
}

impl CleanOptions {
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            ..Self::default()
        }
    }

    pub fn grace_period_seconds(mut self, seconds: u32) -> Self {
        self.grace_period_seconds = Some(seconds);
        self
    }

    pub fn finalize_after(mut self, finalize_after: FinalizeAfter) -> Self {
        self.finalize_after = Some(finalize_after);
        self
    }

    pub fn gone_before(mut self, cutoff: Timestamp) -> Self {
        self.gone_before = Some(cutoff);
        self
    }
}

/// Runs cleanup passes against [`Cleanable`] targets.
#[derive(Clone)]
pub struct Cleaner {
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl Default for Cleaner {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), retry::DEFAULT_INTERVAL)
    }
}

impl Cleaner {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self { clock, interval }
    }

    /// Objects that still count as remaining.
    fn remaining(objects: Vec<ObjectRef>, gone_before: Option<Timestamp>) -> Vec<ObjectRef> {
        match gone_before {
            None => objects,
            Some(cutoff) => objects
                .into_iter()
                .filter(|o| o.creation_timestamp.is_none_or(|created| created < cutoff))
                .collect(),
        }
    }

    /// Run one cleanup pass.
    ///
    /// Returns [`Error::ObjectsRemaining`] while matching objects exist.
    pub async fn clean_once(
        &self,
        target: &dyn Cleanable,
        options: &CleanOptions,
        finalize_after: Option<SignedDuration>,
    ) -> Result<()> {
        let objects = Self::remaining(target.list(&options.selector).await?, options.gone_before);
        if objects.is_empty() {
            return Ok(());
        }

        let now = self.clock.now();
        let results = join_all(
            objects
                .iter()
                .map(|object| self.clean_object(target, object, options, finalize_after, now)),
        )
        .await;

        for result in results {
            match result {
                Err(e) if !e.is_not_found() => return Err(e),
                _ => {}
            }
        }

        Err(Error::ObjectsRemaining {
            kind: target.kind().to_string(),
            names: objects.iter().map(ObjectRef::key).collect(),
        })
    }

    async fn clean_object(
        &self,
        target: &dyn Cleanable,
        object: &ObjectRef,
        options: &CleanOptions,
        finalize_after: Option<SignedDuration>,
        now: Timestamp,
    ) -> Result<()> {
        let Some(deleted_at) = object.deletion_timestamp else {
            debug!(kind = target.kind(), object = %object.key(), "Deleting object");
            return target.delete(object, options.grace_period_seconds).await;
        };

        let overdue = finalize_after
            .is_some_and(|period| now.duration_since(deleted_at) >= period);
        if !overdue {
            return Ok(());
        }

        info!(
            kind = target.kind(),
            object = %object.key(),
            finalizers = ?object.finalizers,
            "Object stuck in deletion, removing finalizers"
        );
        target.delete(object, Some(0)).await?;
        target.finalize(object).await
    }

    /// Delete all objects matched by `options` and wait until they are gone.
    ///
    /// Gives up at `deadline`, returning the last remaining-objects error.
    pub async fn clean(
        &self,
        target: &dyn Cleanable,
        options: &CleanOptions,
        deadline: Instant,
    ) -> Result<()> {
        let finalize_after = options.finalize_after.map(|f| f.resolve(deadline));
        let kind = target.kind().to_string();
        debug!(kind = %kind, selector = %options.selector.labels, "Starting cleanup");

        let result = retry::until(deadline, self.interval, move || async move {
            match self.clean_once(target, options, finalize_after).await {
                Ok(()) => Outcome::Done(()),
                Err(e) if e.is_objects_remaining() => Outcome::Minor(e),
                Err(e) if e.is_conflict() && target.tolerates_conflicts() => Outcome::Minor(e),
                Err(e) => Outcome::Severe(e),
            }
        })
        .await;

        match result {
            Ok(()) => {
                info!(kind = %kind, "Cleanup finished");
                Ok(())
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Cleanup failed");
                Err(e.into())
            }
        }
    }

    /// [`Cleaner::clean`] with a timeout instead of a deadline.
    pub async fn clean_timeout(
        &self,
        target: &dyn Cleanable,
        options: &CleanOptions,
        timeout: Duration,
    ) -> Result<()> {
        self.clean(target, options, Instant::now() + timeout).await
    }
}
