//! Database repositories.

pub mod poll;

pub use poll::PollRepository;
