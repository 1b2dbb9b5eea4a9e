//! Remote endpoint abstraction.
//!
//! The data layer treats the backend as an opaque request/response service
//! keyed by [`Operation`]. Each call is a single attempt; retrying queued
//! writes is the sync loop's job.

pub mod http;
pub mod response;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;

use crate::ApiError;

pub use http::{HttpConfig, HttpEndpoint};
pub use response::ApiResponse;

/// Closed set of backend operations the data layer performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    RegisterUser,
    LoginUser,
    UpdateUserProfile,
    GetDonationCategories,
    GetDonations,
    CreateDonation,
    GetCommunityStats,
    IncrementStat,
    GetRides,
    CreateRide,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::RegisterUser,
        Operation::LoginUser,
        Operation::UpdateUserProfile,
        Operation::GetDonationCategories,
        Operation::GetDonations,
        Operation::CreateDonation,
        Operation::GetCommunityStats,
        Operation::IncrementStat,
        Operation::GetRides,
        Operation::CreateRide,
    ];

    /// Stable wire name, also used as the offline action name.
    pub fn name(self) -> &'static str {
        match self {
            Operation::RegisterUser => "register_user",
            Operation::LoginUser => "login_user",
            Operation::UpdateUserProfile => "update_user_profile",
            Operation::GetDonationCategories => "get_donation_categories",
            Operation::GetDonations => "get_donations",
            Operation::CreateDonation => "create_donation",
            Operation::GetCommunityStats => "get_community_stats",
            Operation::IncrementStat => "increment_stat",
            Operation::GetRides => "get_rides",
            Operation::CreateRide => "create_ride",
        }
    }

    /// Whether a failed call may be deferred to the offline queue and replayed by the sync loop.
    pub fn is_queueable(self) -> bool {
        matches!(
            self,
            Operation::CreateDonation | Operation::CreateRide | Operation::UpdateUserProfile | Operation::IncrementStat
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An action name outside the known operation set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation: {0}")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}

/// A request/response backend keyed by operation name.
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// Perform `operation` once with a JSON payload.
    ///
    /// `Ok` means the server answered; check [`ApiResponse::success`] for the
    /// domain outcome. `Err` covers transport failures, non-2xx statuses and
    /// malformed responses.
    async fn call(&self, operation: Operation, payload: &Value) -> Result<ApiResponse, ApiError>;
}

#[async_trait]
impl<R: RemoteEndpoint + ?Sized> RemoteEndpoint for std::sync::Arc<R> {
    async fn call(&self, operation: Operation, payload: &Value) -> Result<ApiResponse, ApiError> {
        (**self).call(operation, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        for op in Operation::ALL {
            assert_eq!(op.name().parse::<Operation>().unwrap(), op);
            assert_eq!(op.to_string(), op.name());
        }
    }

    #[test]
    fn test_unknown_name() {
        let err = "send_message".parse::<Operation>().unwrap_err();
        assert_eq!(err, UnknownOperation("send_message".into()));
    }

    #[test]
    fn test_queueable_set() {
        let queueable: Vec<&str> = Operation::ALL
            .into_iter()
            .filter(|op| op.is_queueable())
            .map(Operation::name)
            .collect();
        assert_eq!(queueable, vec!["update_user_profile", "create_donation", "increment_stat", "create_ride"]);
    }
}
