//! Domain-facing publishers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use vhub_proto::topic;

use crate::error::Result;
use crate::hub::{Hub, PublishReport};

/// Status of a volunteer signup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignupStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// A volunteer's signup for an event, as pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signup {
    pub id: i64,
    pub event_id: i64,
    pub volunteer_id: i64,
    pub status: SignupStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Publishes signup activity to the event's and the volunteer's topics.
#[derive(Clone)]
pub struct SignupNotifier {
    hub: Hub,
}

impl SignupNotifier {
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }

    /// Announce a newly created signup on `event:<event_id>` and
    /// `volunteer:<volunteer_id>`.
    pub fn signup_created(&self, signup: &Signup) -> Result<PublishReport> {
        let event = self.hub.publish(&topic::event(signup.event_id), signup)?;
        let volunteer = self
            .hub
            .publish(&topic::volunteer(signup.volunteer_id), signup)?;

        let report = event.merge(volunteer);
        debug!(
            signup_id = signup.id,
            event_id = signup.event_id,
            volunteer_id = signup.volunteer_id,
            delivered = report.delivered,
            "signup announced"
        );
        Ok(report)
    }
}
