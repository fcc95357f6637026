//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Subcommand, ValueEnum};

use crate::records::{AttendanceStatus, Role};

/// Class management commands.
#[derive(Debug, Subcommand)]
pub enum ClassCommand {
    /// Create a class
    Add {
        /// Class name (e.g. "10-A")
        name: String,
    },

    /// List classes
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Remove a class that has no students
    Remove {
        /// Class ID
        id: i64,
    },
}

/// Student management commands.
#[derive(Debug, Subcommand)]
pub enum StudentCommand {
    /// Enroll a new student
    Enroll {
        /// Full name
        #[arg(short, long)]
        name: String,

        /// Roll number, unique within the class
        #[arg(short, long)]
        roll: String,

        /// Class ID
        #[arg(long)]
        class: i64,

        #[command(flatten)]
        embedding: EmbeddingArgs,

        /// Photo to store with the student
        #[arg(long, value_name = "FILE")]
        photo: Option<PathBuf>,
    },

    /// Update a student; omitted fields are kept
    Update {
        /// Student ID
        id: i64,

        /// New name
        #[arg(short, long)]
        name: Option<String>,

        /// New roll number
        #[arg(short, long)]
        roll: Option<String>,

        /// New class ID
        #[arg(long)]
        class: Option<i64>,

        #[command(flatten)]
        embedding: EmbeddingArgs,

        /// Replacement photo
        #[arg(long, value_name = "FILE")]
        photo: Option<PathBuf>,
    },

    /// List students
    List {
        /// Only students in this class
        #[arg(long)]
        class: Option<i64>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Remove a student with their attendance history and photo
    Remove {
        /// Student ID
        id: i64,
    },
}

/// Teacher management commands.
#[derive(Debug, Subcommand)]
pub enum TeacherCommand {
    /// Create a teacher and its profile
    Add {
        /// Full name
        #[arg(short, long)]
        name: String,

        /// Contact email
        #[arg(short, long)]
        email: String,

        /// Subject taught
        #[arg(short, long)]
        subject: String,
    },

    /// List teachers
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Remove a teacher and its profile
    Remove {
        /// Teacher (profile) ID
        id: i64,
    },
}

/// Profile commands.
#[derive(Debug, Subcommand)]
pub enum ProfileCommand {
    /// Create a profile
    Create {
        /// Role of the new profile
        #[arg(short, long, value_enum, default_value = "admin")]
        role: RoleArg,
    },

    /// Show a profile
    Show {
        /// Profile ID
        id: i64,
    },
}

/// Attendance commands.
#[derive(Debug, Subcommand)]
pub enum AttendanceCommand {
    /// Recognise one face and mark the student present
    Recognize {
        #[command(flatten)]
        embedding: EmbeddingArgs,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Scan detection frames (JSON lines) until a student is marked
    Scan {
        /// Read frames from this file instead of stdin
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Mark a student by ID
    Mark {
        /// Student ID
        student: i64,

        /// Status to record
        #[arg(short, long, value_enum, default_value = "present")]
        status: StatusArg,

        /// Day to record (defaults to today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// List attendance for a day
    List {
        #[command(flatten)]
        filter: DayFilter,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Report commands.
#[derive(Debug, Subcommand)]
pub enum ReportCommand {
    /// Present/absent counts for a day
    Summary {
        #[command(flatten)]
        filter: DayFilter,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Export a day's attendance as CSV
    Export {
        #[command(flatten)]
        filter: DayFilter,

        /// Write to this file ("-" for stdout; defaults to attendance-<date>.csv)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Reprint the summary whenever attendance changes
    Watch {
        #[command(flatten)]
        filter: DayFilter,
    },
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Where to read a face embedding from.
#[derive(Debug, Clone, Default, Args)]
pub struct EmbeddingArgs {
    /// Embedding as a JSON array of numbers
    #[arg(long, value_name = "JSON", conflicts_with = "embedding_file")]
    pub embedding: Option<String>,

    /// File containing the embedding JSON
    #[arg(long, value_name = "FILE")]
    pub embedding_file: Option<PathBuf>,
}

impl EmbeddingArgs {
    /// Whether neither source was given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.embedding.is_none() && self.embedding_file.is_none()
    }
}

/// Day and class selection for attendance views.
#[derive(Debug, Clone, Default, Args)]
pub struct DayFilter {
    /// Day to show (YYYY-MM-DD, defaults to today)
    #[arg(short, long)]
    pub date: Option<NaiveDate>,

    /// Only this class
    #[arg(long)]
    pub class: Option<i64>,
}

/// Role argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    /// Administrator
    Admin,
    /// Teacher
    Teacher,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Admin => Self::Admin,
            RoleArg::Teacher => Self::Teacher,
        }
    }
}

/// Attendance status argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StatusArg {
    /// Present
    #[default]
    Present,
    /// Absent
    Absent,
}

impl From<StatusArg> for AttendanceStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Present => Self::Present,
            StatusArg::Absent => Self::Absent,
        }
    }
}
