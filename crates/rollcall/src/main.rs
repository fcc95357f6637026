//! `rollcall` - CLI for face-recognition attendance
//!
//! This binary provides the command-line interface for enrolling students,
//! recognising faces from detector output and reporting daily attendance.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::info;

use rollcall::cli::{
    AttendanceCommand, ClassCommand, Cli, Command, ConfigCommand, DayFilter, EmbeddingArgs,
    ProfileCommand, ReportCommand, StudentCommand, TeacherCommand,
};
use rollcall::{
    access, init_logging, AttendanceService, ChangeFeed, Config, DailyReport, Embedding,
    EnrollRequest, Enrollment, JsonLinesSource, MarkOutcome, Recognition, Role, ScanEvent,
    ScanSession, ScanStatus, Storage, UpdateRequest,
};

/// How long blocking readers (stdin) get to finish once a command is done.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    if let Command::Config(cmd) = &cli.command {
        return handle_config(&config, cmd);
    }

    let db_path = config.database_path();
    let storage = Storage::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    check_access(&config, &storage, cli.profile, &cli.command)?;

    // Execute the command
    match cli.command {
        Command::Class(cmd) => handle_class(&storage, cmd),
        Command::Student(cmd) => handle_student(&config, &storage, cmd),
        Command::Teacher(cmd) => handle_teacher(&storage, cmd),
        Command::Profile(cmd) => handle_profile(&storage, cmd),
        Command::Attendance(cmd) => handle_attendance(&config, &storage, cmd),
        Command::Report(cmd) => handle_report(&config, &storage, cmd),
        Command::Status(cmd) => handle_status(&config, &storage, cmd.json),
        // Handled before the database is opened
        Command::Config(_) => Ok(()),
    }
}

fn check_access(
    config: &Config,
    storage: &Storage,
    profile: Option<i64>,
    command: &Command,
) -> Result<()> {
    if !config.access.enforce_roles {
        return Ok(());
    }
    if matches!(command, Command::Profile(ProfileCommand::Create { .. }))
        && storage.count_profiles(Role::Admin)? == 0
    {
        info!("No admin profile exists yet; allowing profile creation");
        return Ok(());
    }
    let Some(required) = command.required_role() else {
        return Ok(());
    };
    let Some(profile_id) = profile else {
        bail!("this command requires --profile with the {required} role");
    };
    access::authorize(storage, profile_id, required)?;
    Ok(())
}

/// Run an async command on a fresh runtime.
fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    Ok(output)
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn day(filter: &DayFilter) -> NaiveDate {
    filter.date.unwrap_or_else(|| Local::now().date_naive())
}

fn read_embedding(args: &EmbeddingArgs) -> Result<Option<String>> {
    match (&args.embedding, &args.embedding_file) {
        (Some(text), _) => Ok(Some(text.clone())),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map(Some)
            .with_context(|| format!("failed to read embedding from {}", path.display())),
        (None, None) => Ok(None),
    }
}

fn handle_class(storage: &Storage, cmd: ClassCommand) -> Result<()> {
    match cmd {
        ClassCommand::Add { name } => {
            let class = storage.add_class(&name)?;
            println!("Created class {} (ID {})", class.name, class.id);
        }
        ClassCommand::List { json } => {
            let classes = storage.list_classes()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&classes)?);
            } else if classes.is_empty() {
                println!("No classes.");
            } else {
                println!("{:>6}  Name", "ID");
                for class in &classes {
                    println!("{:>6}  {}", class.id, class.name);
                }
            }
        }
        ClassCommand::Remove { id } => {
            if !storage.remove_class(id)? {
                bail!("class {id} not found");
            }
            println!("Removed class {id}");
        }
    }
    Ok(())
}

fn handle_student(config: &Config, storage: &Storage, cmd: StudentCommand) -> Result<()> {
    let enrollment = Enrollment::from_config(storage, config)?;
    match cmd {
        StudentCommand::Enroll {
            name,
            roll,
            class,
            embedding,
            photo,
        } => {
            let student = enrollment.enroll(&EnrollRequest {
                name,
                roll_number: roll,
                class_id: class,
                embedding: read_embedding(&embedding)?,
                photo,
            })?;
            println!(
                "Enrolled {} (ID {}, roll {}, class {})",
                student.name,
                student.id,
                student.roll_number,
                student.class_label()
            );
            if !student.has_embedding() {
                println!("No embedding stored: this student cannot be recognised yet.");
            }
        }
        StudentCommand::Update {
            id,
            name,
            roll,
            class,
            embedding,
            photo,
        } => {
            let student = enrollment.update(
                id,
                &UpdateRequest {
                    name,
                    roll_number: roll,
                    class_id: class,
                    embedding: read_embedding(&embedding)?,
                    photo,
                },
            )?;
            println!(
                "Updated {} (ID {}, roll {}, class {})",
                student.name,
                student.id,
                student.roll_number,
                student.class_label()
            );
        }
        StudentCommand::List { class, json } => {
            let students = storage.list_students(class)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&students)?);
            } else if students.is_empty() {
                println!("No students.");
            } else {
                println!(
                    "{:>6}  {:<12}  {:<24}  {:<10}  Face",
                    "ID", "Roll", "Name", "Class"
                );
                for s in &students {
                    println!(
                        "{:>6}  {:<12}  {:<24}  {:<10}  {}",
                        s.id,
                        s.roll_number,
                        s.name,
                        s.class_label(),
                        if s.has_embedding() { "yes" } else { "no" }
                    );
                }
            }
        }
        StudentCommand::Remove { id } => {
            if !enrollment.remove(id)? {
                bail!("student {id} not found");
            }
            println!("Removed student {id}");
        }
    }
    Ok(())
}

fn handle_teacher(storage: &Storage, cmd: TeacherCommand) -> Result<()> {
    match cmd {
        TeacherCommand::Add {
            name,
            email,
            subject,
        } => {
            let teacher = storage.add_teacher(&name, &email, &subject)?;
            println!("Added teacher {} (profile ID {})", teacher.name, teacher.id);
        }
        TeacherCommand::List { json } => {
            let teachers = storage.list_teachers()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&teachers)?);
            } else if teachers.is_empty() {
                println!("No teachers.");
            } else {
                println!("{:>6}  {:<24}  {:<28}  Subject", "ID", "Name", "Email");
                for t in &teachers {
                    println!("{:>6}  {:<24}  {:<28}  {}", t.id, t.name, t.email, t.subject);
                }
            }
        }
        TeacherCommand::Remove { id } => {
            if !storage.remove_teacher(id)? {
                bail!("teacher {id} not found");
            }
            println!("Removed teacher {id}");
        }
    }
    Ok(())
}

fn handle_profile(storage: &Storage, cmd: ProfileCommand) -> Result<()> {
    match cmd {
        ProfileCommand::Create { role } => {
            let profile = storage.create_profile(role.into())?;
            println!("Created {} profile {}", profile.role, profile.id);
        }
        ProfileCommand::Show { id } => {
            let profile = storage
                .get_profile(id)?
                .with_context(|| format!("profile {id} not found"))?;
            println!("Profile {}: {}", profile.id, profile.role);
        }
    }
    Ok(())
}

fn handle_attendance(config: &Config, storage: &Storage, cmd: AttendanceCommand) -> Result<()> {
    let service = AttendanceService::from_config(storage, config);
    match cmd {
        AttendanceCommand::Recognize { embedding, json } => {
            let text = read_embedding(&embedding)?
                .context("an embedding is required (--embedding or --embedding-file)")?;
            let query = Embedding::from_json(&text, config.recognition.embedding_dimensions)?;
            let recognition = service.recognize_and_mark(&query, now())?;
            print_recognition(&recognition, json)?;
        }
        AttendanceCommand::Scan { input } => {
            let session = ScanSession::new(service, config.recognition.frame_queue);
            let status = block_on(scan(
                session,
                input,
                config.recognition.embedding_dimensions,
            ))??;
            println!("{status}");
            if let ScanStatus::Error(message) = status {
                bail!("scan failed: {message}");
            }
        }
        AttendanceCommand::Mark {
            student,
            status,
            date,
        } => {
            let at = date.map_or_else(now, |d| d.and_time(Local::now().time()));
            match service.mark_student(student, status.into(), at)? {
                MarkOutcome::Marked(record) => {
                    println!(
                        "Marked student {} {} on {}",
                        record.student_id, record.status, record.date
                    );
                }
                MarkOutcome::AlreadyMarked { .. } => {
                    println!("Student {student} is already marked on {}", at.date());
                }
            }
        }
        AttendanceCommand::List { filter, json } => {
            let date = day(&filter);
            let entries = storage.attendance_for_date(date, filter.class)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No attendance recorded on {date}.");
            } else {
                println!(
                    "{:<8}  {:<12}  {:<24}  {:<10}  Status",
                    "Time", "Roll", "Name", "Class"
                );
                for e in &entries {
                    println!(
                        "{:<8}  {:<12}  {:<24}  {:<10}  {}",
                        e.record.time.format("%H:%M:%S"),
                        e.roll_number,
                        e.student_name,
                        e.class_name,
                        e.record.status
                    );
                }
            }
        }
    }
    Ok(())
}

async fn scan(
    mut session: ScanSession<&Storage>,
    input: Option<PathBuf>,
    dimensions: usize,
) -> Result<ScanStatus> {
    let (tx, mut rx) = mpsc::channel(32);
    session = session.with_events(tx);

    let handle = session.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.stop();
        }
    });
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_scan_event(&event);
        }
    });

    println!("Scanning. Press Ctrl-C to stop.");
    let report = match input {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            session
                .run(JsonLinesSource::new(BufReader::new(file), dimensions))
                .await
        }
        None => {
            session
                .run(JsonLinesSource::new(
                    BufReader::new(tokio::io::stdin()),
                    dimensions,
                ))
                .await
        }
    };
    drop(session);
    let _ = printer.await;

    info!(
        "Scan used {} frames, {} attempts, dropped {}",
        report.frames, report.attempts, report.dropped
    );
    Ok(report.status)
}

fn print_scan_event(event: &ScanEvent) {
    match event {
        ScanEvent::NoFace => println!("No face detected. Please look at the camera."),
        ScanEvent::Recognized(Recognition::NoMatch { .. }) => {
            println!("Face not recognised. Keep looking at the camera.");
        }
        // Terminal outcomes are reported once the session ends
        ScanEvent::Recognized(_) | ScanEvent::Failed(_) => {}
    }
}

fn print_recognition(recognition: &Recognition, json: bool) -> Result<()> {
    if json {
        let value = match recognition {
            Recognition::NoMatch { compared, skipped } => serde_json::json!({
                "outcome": "no_match",
                "compared": compared,
                "skipped": skipped,
            }),
            Recognition::Marked {
                student,
                distance,
                record,
            } => serde_json::json!({
                "outcome": "marked",
                "student": student,
                "distance": distance,
                "record": record,
            }),
            Recognition::AlreadyMarked {
                student,
                distance,
                existing,
            } => serde_json::json!({
                "outcome": "already_marked",
                "student": student,
                "distance": distance,
                "existing": existing,
            }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match recognition {
        Recognition::NoMatch { compared, .. } => {
            println!("Face not recognised ({compared} enrolled faces compared).");
        }
        Recognition::Marked {
            student, distance, ..
        } => {
            println!(
                "Attendance marked for {} (roll {}, class {}, distance {distance:.3})",
                student.name,
                student.roll_number,
                student.class_label()
            );
        }
        Recognition::AlreadyMarked { student, .. } => {
            println!("Attendance already marked today for {}", student.name);
        }
    }
    Ok(())
}

fn handle_report(config: &Config, storage: &Storage, cmd: ReportCommand) -> Result<()> {
    match cmd {
        ReportCommand::Summary { filter, json } => {
            let report = DailyReport::build(storage, day(&filter), filter.class)?;
            let summary = report.summary();
            if json {
                let value = serde_json::json!({
                    "date": report.date,
                    "class_id": report.class_id,
                    "summary": summary,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{}: {summary}", report.date);
            }
        }
        ReportCommand::Export { filter, output } => {
            let report = DailyReport::build(storage, day(&filter), filter.class)?;
            let csv = report.to_csv();
            match output {
                Some(path) if path == Path::new("-") => print!("{csv}"),
                output => {
                    let path = output.unwrap_or_else(|| PathBuf::from(report.file_name()));
                    std::fs::write(&path, csv)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!(
                        "Exported {} records to {}",
                        report.entries.len(),
                        path.display()
                    );
                }
            }
        }
        ReportCommand::Watch { filter } => {
            block_on(watch(config, storage, filter))??;
        }
    }
    Ok(())
}

async fn watch(config: &Config, storage: &Storage, filter: DayFilter) -> Result<()> {
    let mut feed = ChangeFeed::spawn(storage.path(), config.poll_interval())?;
    println!("Watching {}. Press Ctrl-C to stop.", feed.path().display());

    loop {
        let report = DailyReport::build(storage, day(&filter), filter.class)?;
        println!(
            "[{}] {}: {}",
            Local::now().format("%H:%M:%S"),
            report.date,
            report.summary()
        );

        tokio::select! {
            changed = feed.changed() => {
                if changed.is_none() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn handle_status(config: &Config, storage: &Storage, json: bool) -> Result<()> {
    let stats = storage.stats()?;
    if json {
        let status = serde_json::json!({
            "database_path": storage.path(),
            "photos_dir": config.photos_dir(),
            "classes": stats.classes,
            "students": stats.students,
            "enrolled_faces": stats.enrolled_faces,
            "teachers": stats.teachers,
            "attendance_records": stats.attendance_records,
            "db_size_bytes": stats.db_size_bytes,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("rollcall status");
        println!("---------------");
        println!("Database:       {}", storage.path().display());
        println!("Photos:         {}", config.photos_dir().display());
        println!("Classes:        {}", stats.classes);
        println!(
            "Students:       {} ({} with faces)",
            stats.students, stats.enrolled_faces
        );
        println!("Teachers:       {}", stats.teachers);
        println!("Attendance:     {} records", stats.attendance_records);
        println!("Size:           {} bytes", stats.db_size_bytes);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: &ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if *json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Photos directory:   {}", config.photos_dir().display());
                println!();
                println!("[Recognition]");
                println!(
                    "  Match threshold:    {}",
                    config.recognition.match_threshold
                );
                println!(
                    "  Dimensions:         {}",
                    config.recognition.embedding_dimensions
                );
                println!("  Frame queue:        {}", config.recognition.frame_queue);
                println!();
                println!("[Attendance]");
                println!("  Device ID:          {}", config.attendance.device_id);
                println!();
                println!("[Enrollment]");
                println!(
                    "  Roll pattern:       {}",
                    config.enrollment.roll_number_pattern
                );
                println!(
                    "  Require embedding:  {}",
                    config.enrollment.require_embedding
                );
                println!();
                println!("[Feed]");
                println!("  Poll interval (ms): {}", config.feed.poll_interval_ms);
                println!();
                println!("[Access]");
                println!("  Enforce roles:      {}", config.access.enforce_roles);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.clone().unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
