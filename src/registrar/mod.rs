//! Registrar domain rules: waitlist promotion planning, grading, and the
//! domain error type shared by the data and web layers.

pub mod errors;
pub mod grades;
pub mod promotion;

pub use errors::RegistrarError;
pub use grades::{Grade, compute_gpa};
pub use promotion::{PromotionPlan, WaitingCandidate, plan_promotion};
