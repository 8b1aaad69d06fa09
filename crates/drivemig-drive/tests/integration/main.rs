//! Integration tests for drivemig-drive
//!
//! Uses wiremock to simulate the Google Drive v3 API and verifies
//! end-to-end behavior of listings, lookups, folder creation, copies
//! and error classification.

mod common;

mod test_listing;
mod test_mutations;
