//! Command-line interface for rollcall.
//!
//! This module provides the CLI structure for the `rollcall` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AttendanceCommand, ClassCommand, ConfigCommand, DayFilter, EmbeddingArgs, ProfileCommand,
    ReportCommand, RoleArg, StatusArg, StatusCommand, StudentCommand, TeacherCommand,
};

use crate::records::Role;

/// rollcall - Face-recognition attendance
///
/// Enroll students with face embeddings, recognise them from detector output
/// and keep one attendance record per student per day.
#[derive(Debug, Parser)]
#[command(name = "rollcall")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Profile ID to act as when role checks are enabled
    #[arg(long, global = true, value_name = "ID")]
    pub profile: Option<i64>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage classes
    #[command(subcommand)]
    Class(ClassCommand),

    /// Enroll and manage students
    #[command(subcommand)]
    Student(StudentCommand),

    /// Manage teachers
    #[command(subcommand)]
    Teacher(TeacherCommand),

    /// Manage profiles
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Recognise faces and record attendance
    #[command(subcommand)]
    Attendance(AttendanceCommand),

    /// Daily attendance reports
    #[command(subcommand)]
    Report(ReportCommand),

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Show database status
    Status(StatusCommand),
}

impl Command {
    /// The role needed to run this command when role checks are enabled.
    ///
    /// `None` means anyone may run it. Creating profiles is handled
    /// separately so the first admin can be bootstrapped.
    #[must_use]
    pub fn required_role(&self) -> Option<Role> {
        match self {
            Self::Class(ClassCommand::List { .. })
            | Self::Student(StudentCommand::List { .. })
            | Self::Attendance(AttendanceCommand::Mark { .. } | AttendanceCommand::List { .. })
            | Self::Report(_) => Some(Role::Teacher),
            Self::Class(_)
            | Self::Student(_)
            | Self::Teacher(_)
            | Self::Profile(ProfileCommand::Create { .. }) => Some(Role::Admin),
            Self::Attendance(_)
            | Self::Profile(ProfileCommand::Show { .. })
            | Self::Config(_)
            | Self::Status(_) => None,
        }
    }
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.verbose, self.quiet)
    }
}
