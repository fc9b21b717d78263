//! 报表
//!
//! Dashboard numbers, computed per actor under the same [`Scope`](crate::perm::Scope)
//! as the customer list.
//!
//! Revenue recognition: a closed-won customer counts toward the period its
//! `updated_at` falls in. There is no separate close date, so editing a won
//! customer later moves its revenue into the month of the edit.

mod dashboard;

pub use dashboard::{dashboard_stats, DashboardStats, RECENT_PROGRESS_LIMIT};
