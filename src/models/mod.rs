//! Domain models for DailyQuest.
//!
//! # Core Concepts
//!
//! - [`User`]: a player, carrying the progression fields ([`UserProgress`]).
//! - [`Task`]: a habit (recurring, at most once per day) or a todo (once ever).
//! - [`Completion`]: immutable record of one successful completion.
//! - [`Achievement`]: catalog entry unlocked by progression milestones.
//! - [`Tag`]: per-user label attached to tasks.

mod achievement;
mod completion;
mod dashboard;
mod tag;
mod task;
mod user;

pub use achievement::*;
pub use completion::*;
pub use dashboard::*;
pub use tag::*;
pub use task::*;
pub use user::*;
