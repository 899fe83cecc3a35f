//! Test support for convcheck
//!
//! A naive reference implementation, scripted candidates with injectable
//! failures, a call-counting reference wrapper, environment scoping, and
//! test logging setup.

pub mod candidates;
pub mod counting;
pub mod env_guard;
pub mod logging;
pub mod naive;

pub use candidates::{CallRecord, Fault, REQUIRED_ALIGNMENT, ScriptedCandidate};
pub use counting::CountingReference;
pub use env_guard::TesterEnvScope;
pub use logging::init_test_logging;
pub use naive::NaiveReference;
