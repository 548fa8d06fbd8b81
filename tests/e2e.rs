//! End-to-end tests for badgeforge: whole generation jobs against template
//! PDFs built on the fly with lopdf.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture

use badgeforge::{
    run_job, spawn_job, AttendeeRecord, Archiver, BadgeError, GenerationConfig, GenerationProgressCallback,
    GenerationRequest, JobStatus, JobStore, PlacementRect, QrSourceKind, RecordError, RecordOutcome, Role,
};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// One-page template with a heading, MediaBox inherited from the page tree.
fn template_pdf(width: i64, height: i64, heading: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 14.into()]),
            Operation::new("Td", vec![24.into(), (height - 40).into()]),
            Operation::new("Tj", vec![Object::string_literal(heading)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::write(root.join("attendee.pdf"), template_pdf(298, 420, "ATTENDEE")).unwrap();
        std::fs::write(root.join("staff.pdf"), template_pdf(298, 420, "CREW")).unwrap();
        Self { _dir: dir, root }
    }

    fn out(&self) -> PathBuf {
        self.root.join("badges")
    }

    fn config(&self) -> GenerationConfig {
        GenerationConfig::builder()
            .output_dir(self.out())
            .concurrency(4)
            .build()
            .unwrap()
    }

    fn templates(&self) -> HashMap<Role, PathBuf> {
        HashMap::from([
            (Role::Attendee, self.root.join("attendee.pdf")),
            (Role::Staff, self.root.join("staff.pdf")),
        ])
    }
}

/// 50 staff, 49 speakers and one attendee (the last record).
fn hundred_records() -> Vec<AttendeeRecord> {
    (0..100)
        .map(|i| {
            let ticket = match i {
                0..=49 => "Helpers",
                50..=98 => "Speakers",
                _ => "Early Bird",
            };
            AttendeeRecord::new(format!("99{i:09}"), format!("First{i}"), format!("Last{i}"), ticket)
                .with_company(if i % 3 == 0 { "nan" } else { "Contoso Ltd." })
        })
        .collect()
}

/// Placements for staff and speakers only, so the attendee record fails.
fn staff_and_speaker_placements() -> HashMap<Role, PlacementRect> {
    HashMap::from([
        (Role::Staff, PlacementRect::new(89.0, 60.0, 120.0)),
        (Role::Speaker, PlacementRect::new(79.0, 50.0, 140.0)),
    ])
}

fn pdfs_in(dir: &Path) -> Vec<PathBuf> {
    let mut v: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|e| e == "pdf"))
        .collect();
    v.sort();
    v
}

fn zip_entries(path: &Path) -> usize {
    let bytes = std::fs::read(path).unwrap();
    zip::ZipArchive::new(Cursor::new(bytes)).unwrap().len()
}

fn image_xobjects(pdf: &Path) -> usize {
    let doc = Document::load(pdf).unwrap();
    doc.objects
        .values()
        .filter_map(|o| o.as_stream().ok())
        .filter(|s| matches!(s.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image"))
        .count()
}

// ── Batch generation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn hundred_records_then_incremental_rerun() {
    let fx = Fixture::new();
    let config = fx.config();
    let store = JobStore::new();

    let request = GenerationRequest {
        records: hundred_records(),
        templates: fx.templates(),
        placements: staff_and_speaker_placements(),
    };
    let handle = store.create_job(request.records.len());
    let summary = run_job(&handle, request.clone(), &config).await.unwrap();

    let job = &summary.job;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!((job.generated, job.skipped, job.failed), (99, 0, 1));
    assert_eq!(job.generated + job.skipped + job.failed, job.total_records);
    assert_eq!(job.role_counts.get(&Role::Staff), Some(&50));
    assert_eq!(job.role_counts.get(&Role::Speaker), Some(&49));
    assert!(job.started_at.is_some() && job.completed_at.is_some());

    let failure = summary.failures().next().unwrap();
    assert_eq!(failure.role, Role::Attendee);
    assert!(matches!(failure.error, Some(RecordError::MissingPlacement { .. })));

    assert_eq!(pdfs_in(&fx.out()).len(), 99);
    assert!(fx.out().join("attendee-99000000000.pdf").exists());
    assert_eq!(zip_entries(summary.archive().unwrap()), 99);
    assert_eq!(store.status(handle.id()).unwrap().status, JobStatus::Completed);

    // Remove 59 badges and run again: only those are regenerated.
    for path in pdfs_in(&fx.out()).into_iter().take(59) {
        std::fs::remove_file(path).unwrap();
    }
    let rerun = store.create_job(request.records.len());
    let summary = run_job(&rerun, request, &config).await.unwrap();
    assert_eq!(
        (summary.job.generated, summary.job.skipped, summary.job.failed),
        (59, 40, 1)
    );
    // Skipped badges are archived too.
    assert_eq!(zip_entries(summary.archive().unwrap()), 99);
}

#[tokio::test]
async fn non_incremental_run_regenerates_everything() {
    let fx = Fixture::new();
    let request = GenerationRequest {
        records: hundred_records().into_iter().take(10).collect(),
        templates: fx.templates(),
        placements: staff_and_speaker_placements(),
    };
    let first = run_job(&JobStore::new().create_job(10), request.clone(), &fx.config())
        .await
        .unwrap();
    assert_eq!(first.job.generated, 10);

    let config = GenerationConfig::builder()
        .output_dir(fx.out())
        .incremental(false)
        .build()
        .unwrap();
    let second = run_job(&JobStore::new().create_job(10), request, &config).await.unwrap();
    assert_eq!((second.job.generated, second.job.skipped), (10, 0));
}

#[tokio::test]
async fn unknown_ticket_type_uses_attendee_placement_and_template() {
    let fx = Fixture::new();
    let request = GenerationRequest {
        records: vec![
            AttendeeRecord::new("1", "Ana", "Pérez", "VIP Gold"),
            AttendeeRecord::new("2", "Bo", "Li", "helpers"),
        ],
        templates: HashMap::from([(Role::Attendee, fx.root.join("attendee.pdf"))]),
        placements: HashMap::from([(Role::Attendee, PlacementRect::new(89.0, 60.0, 120.0))]),
    };
    let summary = run_job(&JobStore::new().create_job(2), request, &fx.config())
        .await
        .unwrap();
    assert_eq!(summary.job.generated, 2);
    // Label matching is case-sensitive.
    assert!(summary.records.iter().all(|r| r.role == Role::Attendee));
    assert_eq!(summary.job.role_counts.get(&Role::Attendee), Some(&2));
}

#[tokio::test]
async fn unreadable_template_fails_only_its_records() {
    let fx = Fixture::new();
    std::fs::write(fx.root.join("staff.pdf"), b"this is not a pdf").unwrap();
    let request = GenerationRequest {
        records: vec![
            AttendeeRecord::new("1", "Ana", "Pérez", "Helpers"),
            AttendeeRecord::new("2", "Bo", "Li", "Speakers"),
        ],
        templates: fx.templates(),
        placements: staff_and_speaker_placements(),
    };
    let summary = run_job(&JobStore::new().create_job(2), request, &fx.config())
        .await
        .unwrap();
    assert_eq!(summary.job.status, JobStatus::Completed);
    assert_eq!((summary.job.generated, summary.job.failed), (1, 1));
    let failure = summary.failures().next().unwrap();
    assert_eq!(failure.id, "1");
    assert!(matches!(failure.error, Some(RecordError::ComposeFailed { .. })));
}

#[tokio::test]
async fn duplicate_ids_fail_per_record_and_job_completes() {
    let fx = Fixture::new();
    let request = GenerationRequest {
        records: vec![
            AttendeeRecord::new("A1", "Ana", "Pérez", "Helpers"),
            AttendeeRecord::new("A1", "Ana", "Pérez", "Helpers"),
            AttendeeRecord::new("B2", "Bo", "Li", "Speakers"),
            AttendeeRecord::new("a.b", "Cy", "Ng", "Helpers"),
            AttendeeRecord::new("a_b", "Di", "Ow", "Helpers"),
        ],
        templates: fx.templates(),
        placements: staff_and_speaker_placements(),
    };
    let summary = run_job(&JobStore::new().create_job(5), request, &fx.config())
        .await
        .unwrap();

    let job = &summary.job;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!((job.generated, job.skipped, job.failed), (3, 0, 2));
    assert_eq!(pdfs_in(&fx.out()).len(), job.generated);
    assert_eq!(zip_entries(summary.archive().unwrap()), 3);

    let duplicates: Vec<(&str, &str)> = summary
        .failures()
        .map(|r| match r.error {
            Some(RecordError::DuplicateId { ref id, ref first, .. }) => (id.as_str(), first.as_str()),
            ref other => panic!("unexpected failure {other:?}"),
        })
        .collect();
    assert_eq!(duplicates, vec![("A1", "A1"), ("a_b", "a.b")]);
}

#[tokio::test]
async fn vector_source_embeds_no_qr_image() {
    let fx = Fixture::new();
    let config = GenerationConfig::builder()
        .output_dir(fx.out())
        .qr_source(QrSourceKind::Vector)
        .build()
        .unwrap();
    let request = GenerationRequest {
        records: vec![AttendeeRecord::new("V1", "Ana", "Pérez", "Helpers")],
        templates: fx.templates(),
        placements: staff_and_speaker_placements(),
    };
    run_job(&JobStore::new().create_job(1), request.clone(), &config).await.unwrap();
    assert_eq!(image_xobjects(&fx.out().join("attendee-V1.pdf")), 0);

    let raster_out = fx.root.join("raster");
    let config = GenerationConfig::builder().output_dir(&raster_out).build().unwrap();
    run_job(&JobStore::new().create_job(1), request, &config).await.unwrap();
    assert_eq!(image_xobjects(&raster_out.join("attendee-V1.pdf")), 1);
}

// ── Job lifecycle ────────────────────────────────────────────────────────────

struct FailingArchiver;

impl Archiver for FailingArchiver {
    fn archive(&self, _files: &[PathBuf], output_dir: &Path) -> Result<PathBuf, BadgeError> {
        Err(BadgeError::Archive {
            path: output_dir.join("badges.zip"),
            detail: "disk full".to_string(),
        })
    }
}

#[tokio::test]
async fn archive_failure_fails_the_job() {
    let fx = Fixture::new();
    let config = GenerationConfig::builder()
        .output_dir(fx.out())
        .archiver(Arc::new(FailingArchiver))
        .build()
        .unwrap();
    let store = JobStore::new();
    let request = GenerationRequest {
        records: vec![AttendeeRecord::new("1", "Ana", "Pérez", "Helpers")],
        templates: fx.templates(),
        placements: staff_and_speaker_placements(),
    };
    let handle = store.create_job(1);
    let err = run_job(&handle, request, &config).await.unwrap_err();
    assert!(matches!(err, BadgeError::Archive { .. }));

    let job = store.status(handle.id()).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("disk full"));
    // The badge itself was still written.
    assert_eq!(job.generated, 1);
}

/// Cancels the job from inside the first completion.
struct CancelOnFirst {
    store: Arc<JobStore>,
    job_id: Mutex<Option<String>>,
}

impl GenerationProgressCallback for CancelOnFirst {
    fn on_job_start(&self, job_id: &str, _total: usize) {
        *self.job_id.lock().unwrap() = Some(job_id.to_string());
    }

    fn on_record_complete(&self, _id: &str, _role: Role, _outcome: RecordOutcome) {
        if let Some(id) = self.job_id.lock().unwrap().take() {
            self.store.cancel(&id, "stopped by test").unwrap();
        }
    }
}

#[tokio::test]
async fn cancelled_job_stays_failed() {
    let fx = Fixture::new();
    let store = Arc::new(JobStore::new());
    let config = GenerationConfig::builder()
        .output_dir(fx.out())
        .concurrency(1)
        .progress_callback(Arc::new(CancelOnFirst {
            store: Arc::clone(&store),
            job_id: Mutex::new(None),
        }))
        .build()
        .unwrap();
    let request = GenerationRequest {
        records: hundred_records().into_iter().take(5).collect(),
        templates: fx.templates(),
        placements: staff_and_speaker_placements(),
    };
    let handle = store.create_job(5);
    let err = run_job(&handle, request, &config).await.unwrap_err();
    assert!(matches!(err, BadgeError::Pipeline(_)));

    let job = store.status(handle.id()).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.generated, 1);
    assert!(job.archive.is_none());
    assert!(!handle.mark_completed(None));
    assert_eq!(pdfs_in(&fx.out()).len(), 1);
}

#[tokio::test]
async fn spawned_job_can_be_polled_to_completion() {
    let fx = Fixture::new();
    let store = JobStore::new();
    let request = GenerationRequest {
        records: hundred_records().into_iter().take(8).collect(),
        templates: fx.templates(),
        placements: staff_and_speaker_placements(),
    };
    let handle = spawn_job(&store, request, fx.config());

    let mut job = store.status(handle.id()).unwrap();
    for _ in 0..600 {
        if job.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let next = store.status(handle.id()).unwrap();
        // Counters never go backwards.
        assert!(next.generated + next.skipped + next.failed >= job.generated + job.skipped + job.failed);
        job = next;
    }
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.generated, 8);
    assert!(job.archive.is_some());
}
