//! Usage context of bundle receivers.

use std::fmt;

use cv_cfg::{CallSite, Location};
use serde::{Deserialize, Serialize};

use crate::liveness::Liveness;

/// How a call's receiver is treated after the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UsageContext {
    /// The receiver carries the explicit mutation marker
    Mutating,
    /// The receiver is not used again (or is a temporary)
    LastUse,
    /// The receiver is used again on some path
    ContinuedUse,
}

impl UsageContext {
    /// Kebab-case name used in annotations.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Mutating => "mutating",
            Self::LastUse => "last-use",
            Self::ContinuedUse => "continued-use",
        }
    }
}

impl fmt::Display for UsageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Usage context of the receiver of the bundle call at `location`, or `None`
/// for calls without a receiver.
#[must_use]
pub fn usage_context(
    liveness: &Liveness,
    location: Location,
    call: &CallSite,
) -> Option<UsageContext> {
    let receiver = call.receiver()?;
    let context = match &receiver.place {
        Some(_) if receiver.mutation_marker => UsageContext::Mutating,
        Some(place) if !liveness.is_last_use(location, place.binding) => {
            UsageContext::ContinuedUse
        }
        _ => UsageContext::LastUse,
    };
    Some(context)
}
