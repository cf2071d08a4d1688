//! SQLite persistence and CSV export.

use chrono::{NaiveDate, NaiveTime};
use rig_daq::acquisition::{AcquisitionRequest, AcquisitionRun};
use rig_daq::channel::{Channel, ChannelRegistry};
use rig_daq::config::Settings;
use rig_daq::error::DaqError;
use rig_daq::plant::MockPlant;
use rig_daq::record::{FrameUpdate, NewFrame, NewSession, Table};
use rig_daq::stats::FilteredView;
use rig_daq::storage::{export_tables, InMemoryRepository, Repository, SqliteRepository};
use std::sync::Arc;
use tempfile::tempdir;

fn rig() -> Arc<ChannelRegistry> {
    Arc::new(ChannelRegistry::rig_default().unwrap())
}

fn new_session(operator: &str) -> NewSession {
    NewSession {
        date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
        operator: operator.to_string(),
        comment: "bench".to_string(),
    }
}

fn new_frame(session_id: i64, fill: f64) -> NewFrame {
    NewFrame {
        session_id,
        captured_at: NaiveTime::from_hms_opt(14, 5, 9).unwrap(),
        values: vec![fill; rig().field_count()],
    }
}

#[test]
fn test_records_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rig.db");
    let layout = rig().layout();

    let mut repo = SqliteRepository::open(&path, &layout).unwrap();
    let session = repo.save_session(new_session("Ivanov")).unwrap();
    let first = repo.save_frame(new_frame(session.id, 1.25)).unwrap();
    let second = repo.save_frame(new_frame(session.id, 2.5)).unwrap();
    assert!(second.id > first.id);
    repo.close().unwrap();

    let repo = SqliteRepository::open(&path, &layout).unwrap();
    let sessions = repo.load_sessions().unwrap();
    assert_eq!(sessions, vec![session]);
    let frames = repo.load_frames().unwrap();
    assert_eq!(frames, vec![first, second]);
}

#[test]
fn test_other_layout_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rig.db");
    SqliteRepository::open(&path, &rig().layout())
        .unwrap()
        .close()
        .unwrap();

    let other = ChannelRegistry::new(vec![Channel::base(1, "temperature", None)], vec![1]).unwrap();
    let err = SqliteRepository::open(&path, &other.layout()).unwrap_err();
    match err {
        DaqError::LayoutMismatch { expected, found } => {
            assert_eq!(expected, "id, research, time, temperature");
            assert!(found.contains("sensor6_var"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_update_and_delete() {
    let layout = rig().layout();
    let mut repo = SqliteRepository::open_in_memory(&layout).unwrap();
    let a = repo.save_session(new_session("Ivanov")).unwrap();
    let b = repo.save_session(new_session("Petrova")).unwrap();
    let frame = repo.save_frame(new_frame(a.id, 1.0)).unwrap();

    let update = FrameUpdate {
        session_id: Some(b.id),
        captured_at: Some(NaiveTime::from_hms_opt(15, 0, 0).unwrap()),
        values: None,
    };
    let updated = repo.update_frame(frame.id, &update).unwrap();
    assert_eq!(updated.session_id, b.id);
    assert_eq!(updated.values, frame.values);
    assert_eq!(repo.load_frames().unwrap(), vec![updated]);

    let too_short = FrameUpdate {
        values: Some(vec![1.0]),
        ..Default::default()
    };
    assert!(matches!(
        repo.update_frame(frame.id, &too_short),
        Err(DaqError::InvalidRequest(_))
    ));
    let orphan = FrameUpdate {
        session_id: Some(99),
        ..Default::default()
    };
    assert!(matches!(
        repo.update_frame(frame.id, &orphan),
        Err(DaqError::NotFound(_))
    ));

    repo.delete_frame(frame.id).unwrap();
    assert!(repo.load_frames().unwrap().is_empty());
    assert!(matches!(
        repo.delete_frame(frame.id),
        Err(DaqError::NotFound(_))
    ));
    assert!(matches!(
        repo.update_frame(frame.id, &update),
        Err(DaqError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_run_into_database_then_export_filtered() {
    let dir = tempdir().unwrap();
    let settings = Settings::default();
    let registry = rig();
    let mut repo = SqliteRepository::open(dir.path().join("rig.db"), &registry.layout()).unwrap();

    for (operator, frames) in [("Ivanov", 2), ("Petrova", 3)] {
        let plant = MockPlant::for_registry(&registry, 11, 0.0);
        let run = AcquisitionRun::new(registry.clone(), plant, &settings.acquisition);
        run.execute(&AcquisitionRequest::new(operator, frames, ""), &mut repo)
            .await
            .unwrap();
    }

    let sessions = Table::sessions(&repo.load_sessions().unwrap());
    let mut frames = FilteredView::new(Table::frames(
        &registry.layout(),
        &repo.load_frames().unwrap(),
    ));
    assert_eq!(frames.visible_count(), 5);
    frames.filters_mut().set_exact("research", "2").unwrap();
    frames.on_filter_changed();
    assert_eq!(frames.visible_count(), 3);

    let out = dir.path().join("export");
    let summary = export_tables(&out, &sessions, &frames.visible_table()).unwrap();
    assert_eq!(summary.session_rows, 2);
    assert_eq!(summary.frame_rows, 3);

    let mut reader = csv::Reader::from_path(&summary.frames_path).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(&headers[0], "ID");
    assert_eq!(&headers[8], "Sensor 6 (mean)");
    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| &r[1] == "2"));
}

#[test]
fn test_edited_values_match_displayed_precision() {
    let registry = rig();
    let layout = registry.layout();
    let pressure = layout.iter().position(|f| f.key == "pressure").unwrap();

    let mut memory = InMemoryRepository::new(registry.field_count());
    let mut sqlite = SqliteRepository::open_in_memory(&layout).unwrap();
    let repos: [&mut dyn Repository; 2] = [&mut memory, &mut sqlite];

    for repo in repos {
        let session = repo.save_session(new_session("Ivanov")).unwrap();
        let frame = repo.save_frame(new_frame(session.id, 1.0)).unwrap();
        let mut values = frame.values.clone();
        values[pressure] = 101.333_333;
        let update = FrameUpdate {
            values: Some(values),
            ..Default::default()
        };
        let updated = repo.update_frame(frame.id, &update).unwrap();
        assert_eq!(updated.values[pressure], 101.3333);

        let mut view = FilteredView::new(Table::frames(&layout, &repo.load_frames().unwrap()));
        let shown = view.visible_rows().next().unwrap()[3 + pressure].to_string();
        assert_eq!(shown, "101.3333");
        view.filters_mut()
            .set_range("pressure", Some(&shown), Some(&shown))
            .unwrap();
        view.on_filter_changed();
        assert_eq!(view.visible_count(), 1);
    }
}
