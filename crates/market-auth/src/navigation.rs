//! Maps a session snapshot to the screen the UI should show.

use crate::models::Role;
use crate::session::AuthSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Splash,
    Welcome,
    RoleSelection,
    AdminHome,
    ConsumerHome,
    ConsumerOnboarding,
    VendorHome,
    VendorOnboarding,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Splash => "splash",
            Route::Welcome => "welcome",
            Route::RoleSelection => "role_selection",
            Route::AdminHome => "admin_home",
            Route::ConsumerHome => "consumer_home",
            Route::ConsumerOnboarding => "consumer_onboarding",
            Route::VendorHome => "vendor_home",
            Route::VendorOnboarding => "vendor_onboarding",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the route for `snapshot`.
///
/// The error field does not affect the route: an authenticated session that
/// hit a transient error stays where it is.
pub fn resolve_route(snapshot: &AuthSnapshot) -> Route {
    if snapshot.is_loading {
        return Route::Splash;
    }

    let user = match &snapshot.user {
        Some(user) if snapshot.is_authenticated => user,
        _ => return Route::Welcome,
    };

    match user.role {
        Some(Role::Admin) => Route::AdminHome,
        Some(Role::Consumer) if snapshot.consumer.is_some() => Route::ConsumerHome,
        Some(Role::Consumer) => Route::ConsumerOnboarding,
        Some(Role::Vendor) if snapshot.vendor.is_some() => Route::VendorHome,
        Some(Role::Vendor) => Route::VendorOnboarding,
        None => Route::RoleSelection,
    }
}
