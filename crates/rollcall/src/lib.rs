//! `rollcall` - Face-recognition attendance over a local SQLite store
//!
//! This library matches face embeddings produced by an external detector
//! against enrolled students and records at most one attendance entry per
//! student per day.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod access;
pub mod attendance;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod enrollment;
pub mod error;
pub mod feed;
pub mod logging;
pub mod matcher;
pub mod photos;
pub mod records;
pub mod report;
pub mod scan;
pub mod storage;

pub use attendance::{AttendanceBackend, AttendanceService, MarkOutcome, Recognition};
pub use config::Config;
pub use embedding::Embedding;
pub use enrollment::{EnrollRequest, Enrollment, UpdateRequest};
pub use error::{Error, Result};
pub use feed::{AttendanceChanged, ChangeFeed};
pub use logging::init_logging;
pub use matcher::FaceMatcher;
pub use photos::PhotoStore;
pub use records::{
    AttendanceEntry, AttendanceRecord, AttendanceStatus, ClassRecord, Profile, Role, Student,
    Teacher,
};
pub use report::{DailyReport, Summary};
pub use scan::{Frame, FrameSource, JsonLinesSource, ScanEvent, ScanHandle, ScanSession, ScanStatus};
pub use storage::{Storage, StorageStats};
