//! Business logic services.

#![allow(missing_docs)]

pub mod auth;
pub mod poll;
pub mod results;
pub mod session_code;
pub mod vote;

pub use auth::{AdminClaims, AdminIdentity, AdminVerifier, JwtAdminVerifier, ADMIN_ROLE, verify_admin};
pub use poll::{CreatePollInput, PollService, QuestionInput};
pub use results::{
    DeltaTally, OpenTextAppend, OpenTextSummary, OptionCount, PollClosed, PollDelta,
    PollSnapshot, PollSummary, QuestionResults, QuestionSnapshot, RatingSummary, ResponseView,
    Role,
};
pub use session_code::SessionCodeAllocator;
pub use vote::{VoteProcessor, apply_vote, parse_vote_value};
