//! covtrace-record - Recording requirement traces from tests
//!
//! Declare a feature's requirements, trace them from the tests that exercise
//! them, and write the result where `covtrace` reads coverage from:
//!
//! ```
//! use covtrace_core::Structure;
//! use covtrace_record::{FeatureRecorder, TestContext, write_recordings};
//!
//! let login = FeatureRecorder::new("Login").group("Auth").structure(
//!     Structure::new()
//!         .with_requirement("Valid password")
//!         .with_requirement("Wrong password"),
//! );
//!
//! let file = TestContext::new("tests/login.rs");
//! login
//!     .requirement("Valid password")
//!     .it("logs in", |_ctx| {
//!         // test body
//!     })
//!     .run(&file)
//!     .unwrap();
//!
//! let dir = tempfile::tempdir().unwrap();
//! let written = write_recordings(dir.path(), "tests/login.rs", &[&login]).unwrap();
//! assert!(written.exists());
//! ```

mod context;
pub mod matchers;
mod scope;
mod writer;

pub use context::TestContext;
pub use scope::{
    Deferred, FeatureRecorder, MatchParams, RequirementHook, Scope, TraceError, TraceMatcher,
    TraceTarget,
};
pub use writer::{recording_file_name, write_recordings};
