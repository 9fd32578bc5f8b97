/// Router Module Index
///
/// Organizes the route table into capability-segregated modules, so that the
/// protection level of every URL is visible at its registration site rather
/// than implied by framework convention.
///
/// Registration order matters: the table is evaluated first-match-wins, so the
/// modules are applied public first, then the verified group, and literal
/// paths inside each group are registered before parameterized ones.
use crate::guard::RouteTable;

/// Routes reachable by anyone, plus the auth scaffolding (login, registration,
/// password reset, email verification) and the session-independent actions
/// (logout, language switch).
pub mod public;

/// Routes requiring an authenticated AND email-verified session: the
/// dashboard, category browsing and both resource sets.
pub mod verified;

/// Assembles the complete, ordered route table for the portal.
pub fn route_table() -> RouteTable {
    verified::register(public::register(RouteTable::new()))
}
