//! End-to-end attendance flow through the public API.

use chrono::{NaiveDate, NaiveDateTime};
use rollcall::{
    AttendanceService, ChangeFeed, Config, DailyReport, Embedding, EnrollRequest, Enrollment,
    FaceMatcher, Frame, FrameSource, MarkOutcome, Recognition, ScanSession, ScanStatus, Storage,
};

const DIMS: usize = 128;

fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 11, 4)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

/// A 128-value embedding with `offset` added to the first component.
fn face(base: f32, offset: f32) -> Embedding {
    let mut values = vec![base; DIMS];
    values[0] += offset;
    Embedding::new(values, DIMS).unwrap()
}

fn temp_root(name: &str) -> std::path::PathBuf {
    let root = std::env::temp_dir().join(format!(
        "rollcall_flow_{name}_{}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&root);
    std::fs::create_dir_all(&root).unwrap();
    root
}

fn config_for(root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.storage.database_path = Some(root.join("attendance.db"));
    config.storage.photos_dir = Some(root.join("face-images"));
    config
}

fn enroll(enrollment: &Enrollment<'_>, class_id: i64, name: &str, roll: &str, embedding: &Embedding) {
    enrollment
        .enroll(&EnrollRequest {
            name: name.to_string(),
            roll_number: roll.to_string(),
            class_id,
            embedding: Some(embedding.to_json().unwrap()),
            photo: None,
        })
        .unwrap();
}

#[test]
fn test_recognize_then_already_marked() {
    let root = temp_root("recognize");
    let config = config_for(&root);
    let storage = Storage::open(config.database_path()).unwrap();
    let class = storage.add_class("10-A").unwrap();
    let enrollment = Enrollment::from_config(&storage, &config).unwrap();

    enroll(&enrollment, class.id, "Asha", "1", &face(0.0, 0.0));
    enroll(&enrollment, class.id, "Ravi", "2", &face(1.0, 0.0));
    enrollment
        .enroll(&EnrollRequest {
            name: "Nia".to_string(),
            roll_number: "3".to_string(),
            class_id: class.id,
            ..EnrollRequest::default()
        })
        .unwrap();

    let service = AttendanceService::from_config(&storage, &config);

    // 0.2 away from Asha, far from Ravi
    let query = face(0.0, 0.2);
    match service.recognize_and_mark(&query, at(8, 55)).unwrap() {
        Recognition::Marked {
            student, distance, ..
        } => {
            assert_eq!(student.name, "Asha");
            assert!((distance - 0.2).abs() < 1e-6);
        }
        other => panic!("expected a new mark, got {other:?}"),
    }

    let again = service.recognize_and_mark(&query, at(9, 10)).unwrap();
    assert!(matches!(again, Recognition::AlreadyMarked { .. }));
    assert_eq!(storage.count_attendance().unwrap(), 1);

    let report = DailyReport::build(&storage, at(0, 0).date(), Some(class.id)).unwrap();
    let summary = report.summary();
    assert_eq!(summary.present, 1);
    assert_eq!(summary.total, 1);
    assert!(report.to_csv().contains("Asha,1,2024-11-04,08:55:00,present"));

    drop(enrollment);
    drop(storage);
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn test_far_face_is_not_matched() {
    let storage = Storage::open_in_memory().unwrap();
    let class = storage.add_class("10-B").unwrap();
    let config = Config::default();
    let enrollment = Enrollment::from_config(&storage, &config).unwrap();
    enroll(&enrollment, class.id, "Asha", "1", &face(0.0, 0.0));

    let service = AttendanceService::new(&storage, FaceMatcher::default(), None);
    let result = service.recognize_and_mark(&face(0.0, 0.5), at(9, 0)).unwrap();

    assert_eq!(
        result,
        Recognition::NoMatch {
            compared: 1,
            skipped: 0
        }
    );
    assert_eq!(storage.count_attendance().unwrap(), 0);
}

#[test]
fn test_manual_mark_is_idempotent_per_day() {
    let storage = Storage::open_in_memory().unwrap();
    let class = storage.add_class("10-C").unwrap();
    let enrollment = Enrollment::from_config(&storage, &Config::default()).unwrap();
    enroll(&enrollment, class.id, "Asha", "1", &face(0.0, 0.0));
    let student = storage.list_students(None).unwrap().remove(0);

    let service = AttendanceService::from_config(&storage, &Config::default());
    let first = service
        .mark_student(student.id, rollcall::AttendanceStatus::Present, at(8, 0))
        .unwrap();
    let second = service
        .mark_student(student.id, rollcall::AttendanceStatus::Present, at(15, 0))
        .unwrap();

    assert!(first.is_new());
    assert!(matches!(second, MarkOutcome::AlreadyMarked { existing: Some(_) }));

    let next_day = at(8, 0) + chrono::Duration::days(1);
    assert!(service
        .mark_student(student.id, rollcall::AttendanceStatus::Present, next_day)
        .unwrap()
        .is_new());
    assert_eq!(storage.count_attendance().unwrap(), 2);
}

struct Frames(Vec<Frame>);

#[async_trait::async_trait]
impl FrameSource for Frames {
    async fn next_frame(&mut self) -> rollcall::Result<Option<Frame>> {
        if self.0.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.0.remove(0)))
        }
    }
}

#[tokio::test]
async fn test_scan_session_marks_and_feed_notices() {
    let root = temp_root("scan");
    let config = config_for(&root);
    let storage = Storage::open(config.database_path()).unwrap();
    let class = storage.add_class("11-A").unwrap();
    let enrollment = Enrollment::from_config(&storage, &config).unwrap();
    enroll(&enrollment, class.id, "Ravi", "7", &face(0.5, 0.0));

    let mut feed = ChangeFeed::spawn(config.database_path(), config.poll_interval() / 100).unwrap();

    let service = AttendanceService::from_config(&storage, &config);
    let mut session = ScanSession::new(service, config.recognition.frame_queue);
    let frames = Frames(vec![
        Frame::default(),
        Frame::new(vec![face(0.5, 0.1), face(2.0, 0.0)]),
    ]);
    let report = session.run_with_clock(frames, || at(10, 30)).await;

    assert!(matches!(
        report.status,
        ScanStatus::Success { ref student_name, ref roll_number, .. }
            if student_name == "Ravi" && roll_number == "7"
    ));
    assert_eq!(report.attempts, 1);

    let changed = tokio::time::timeout(std::time::Duration::from_secs(5), feed.changed())
        .await
        .expect("change feed saw nothing");
    assert!(changed.is_some());

    drop(feed);
    drop(session);
    drop(enrollment);
    drop(storage);
    let _ = std::fs::remove_dir_all(&root);
}
