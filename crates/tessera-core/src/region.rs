//! Region trigger engine
//!
//! Consumes beacon region events and drives the presentation engine with
//! exactly-once semantics per region occupancy: one presentation per
//! inside-period, cancelled on exit, re-armed on the next entry. Events for
//! other regions are filtered out.
//!
//! The trigger owns the presentation engine; the engine reports back only
//! through its completion hook and holds no reference to its owner.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RegionConfig;
use crate::engine::PresentationEngine;
use crate::transport::ReaderTransport;
use crate::types::{CredentialResult, Occupancy};

// ----------------------------------------------------------------------------
// Region Events
// ----------------------------------------------------------------------------

/// Beacon-source notifications about the monitored region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionEvent {
    Entered(Uuid),
    Exited(Uuid),
    StateDetermined(Uuid, Occupancy),
}

impl RegionEvent {
    /// The region the event refers to.
    pub fn region(&self) -> Uuid {
        match self {
            RegionEvent::Entered(id)
            | RegionEvent::Exited(id)
            | RegionEvent::StateDetermined(id, _) => *id,
        }
    }
}

// ----------------------------------------------------------------------------
// Presenter Seam
// ----------------------------------------------------------------------------

/// What the trigger needs from the presentation side.
#[async_trait]
pub trait Presenter: Send + Sync + 'static {
    /// Run a presentation to its terminal result; `None` when cancelled or
    /// already busy.
    async fn present(&self) -> Option<CredentialResult>;

    /// Cancel the live attempt, if any.
    fn cancel(&self);
}

#[async_trait]
impl<T: ReaderTransport> Presenter for PresentationEngine<T> {
    async fn present(&self) -> Option<CredentialResult> {
        self.present_credential().await
    }

    fn cancel(&self) {
        PresentationEngine::cancel(self)
    }
}

// ----------------------------------------------------------------------------
// Region Trigger
// ----------------------------------------------------------------------------

/// Arms, suppresses, and resets credential presentation per inside-period.
pub struct RegionTrigger<P: Presenter> {
    region: RegionConfig,
    presenter: Arc<P>,
    occupancy: Occupancy,
    /// Set when a presentation was initiated for the current inside-period.
    presented: bool,
    /// The live presentation task.
    attempt: Option<JoinHandle<()>>,
    /// A cancelled task still unwinding; the next attempt waits for it so
    /// the engine is free before the fresh session starts.
    draining: Option<JoinHandle<()>>,
}

impl<P: Presenter> RegionTrigger<P> {
    pub fn new(region: RegionConfig, presenter: Arc<P>) -> Self {
        Self {
            region,
            presenter,
            occupancy: Occupancy::Unknown,
            presented: false,
            attempt: None,
            draining: None,
        }
    }

    pub fn occupancy(&self) -> Occupancy {
        self.occupancy
    }

    /// Whether presentation has been initiated for the current
    /// inside-period.
    pub fn has_presented(&self) -> bool {
        self.presented
    }

    /// Shared handle to the presenter this trigger drives.
    pub fn presenter(&self) -> Arc<P> {
        self.presenter.clone()
    }

    /// Consume region events until the source closes.
    pub async fn run(mut self, mut events: mpsc::Receiver<RegionEvent>) {
        info!(region = %self.region.name, "region trigger running");
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        debug!(region = %self.region.name, "region event stream closed");
    }

    /// Apply one beacon event. Duplicate entries within a single
    /// inside-period are no-ops.
    pub fn handle_event(&mut self, event: RegionEvent) {
        if event.region() != self.region.id {
            debug!(region = %event.region(), "ignoring event for foreign region");
            return;
        }

        match event {
            RegionEvent::Entered(_) | RegionEvent::StateDetermined(_, Occupancy::Inside) => {
                self.enter()
            }
            RegionEvent::Exited(_) | RegionEvent::StateDetermined(_, Occupancy::Outside) => {
                self.exit()
            }
            RegionEvent::StateDetermined(_, Occupancy::Unknown) => {
                debug!("region occupancy undetermined");
                self.occupancy = Occupancy::Unknown;
            }
        }
    }

    /// Present now, regardless of occupancy. Clears the guard, so the
    /// manual attempt never consumes an inside-period's automatic
    /// presentation.
    pub fn trigger_manually(&mut self) {
        info!(region = %self.region.name, "manual presentation trigger");
        self.presented = false;
        self.spawn_presentation();
    }

    fn enter(&mut self) {
        if self.occupancy == Occupancy::Inside {
            debug!("duplicate region entry; already inside");
            return;
        }
        info!(region = %self.region.name, "region entered");
        self.occupancy = Occupancy::Inside;
        if !self.presented {
            self.presented = true;
            self.spawn_presentation();
        }
    }

    fn exit(&mut self) {
        info!(region = %self.region.name, "region exited");
        self.occupancy = Occupancy::Outside;
        self.presented = false;
        self.presenter.cancel();
        // The task observes the cancellation and winds down on its own.
        self.draining = self.attempt.take();
    }

    fn spawn_presentation(&mut self) {
        let presenter = self.presenter.clone();
        let region = self.region.name.clone();
        let draining = self.draining.take();
        self.attempt = Some(tokio::spawn(async move {
            if let Some(previous) = draining {
                let _ = previous.await;
            }
            if let Some(result) = presenter.present().await {
                info!(region = %region, success = result.success, "presentation finished");
            }
        }));
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
