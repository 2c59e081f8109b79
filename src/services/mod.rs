pub mod quota;
pub mod rate_limiter;
pub mod reconcile;

pub use quota::{QuotaLedger, Reservation};
pub use rate_limiter::RateLimiter;
pub use reconcile::{Correction, Reconciler};
