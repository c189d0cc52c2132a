//! Evidence collected while a test runs.
//!
//! An [`EvidenceRecorder`] is created per test invocation. It issues
//! commands on behalf of the test, serves cached output, moves files, and
//! keeps one [`EvidenceTrail`] per device it touched.

pub mod recorder;
pub mod trail;
pub mod transfer;

pub use recorder::{
    CLOCK_COMMAND, CommandRequest, ConfigRequest, EvidenceRecorder, RecorderOptions,
};
pub use trail::{EvidenceEntry, EvidenceTrail};
pub use transfer::{Direction, TransferRequest, TransferResult, sha256_hex};
