//! # Contact Gateway Test Suite
//!
//! End-to-end flows driven through the full router and middleware stack.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── support.rs      # Router harness over in-memory adapters
//!     ├── submission.rs   # Pipeline outcomes as seen over HTTP
//!     ├── surface.rs      # Token endpoint, headers, limits, metrics
//!     └── file_backed.rs  # Same flows against the flat-file stores
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p gateway-tests
//! cargo test -p gateway-tests integration::submission::
//! ```

pub mod integration;
