//! Client core for the access review portal.
//!
//! [`status::StatusPoller`] keeps the emergency banner in sync,
//! [`pending::PendingCountPoller`] feeds the pending-review badge and
//! [`logs::PaginatedLogList`] accumulates pending log pages. All three talk to
//! the portal through the narrow source traits in [`api`].

pub mod api;
pub mod logs;
pub mod model;
pub mod pending;
pub mod selection;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;
