//! Database entities.

pub mod poll;

pub use poll::Entity as PollEntity;
