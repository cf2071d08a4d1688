//! End-to-end tests of sweep, encode and store against the simulated rig.

use anyhow::{bail, Result};
use async_trait::async_trait;
use rig_daq::acquisition::{
    AcquisitionRequest, AcquisitionRun, FrameAcquirer, FrameEncoder, SweepOutcome,
};
use rig_daq::channel::{Channel, ChannelBound, ChannelId, ChannelRegistry};
use rig_daq::config::Settings;
use rig_daq::error::DaqError;
use rig_daq::plant::{MockPlant, PlantReader, SignalModel};
use rig_daq::storage::{InMemoryRepository, Repository};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Reads per sweep of the default rig: 13 single visits plus a 7-sample burst.
const READS_PER_SWEEP: u64 = 20;

fn rig() -> Arc<ChannelRegistry> {
    Arc::new(ChannelRegistry::rig_default().unwrap())
}

/// Every channel of the default rig at a fixed, in-envelope value.
fn quiet_plant() -> MockPlant {
    let mut plant = MockPlant::new(1);
    for (id, value) in [
        (1, 20.0),
        (2, 101.3),
        (3, 60.0),
        (4, 0.5),
        (5, 7.0),
        (6, 3.0),
        (8, 8.0),
        (20, 1.0),
        (43, 2.0),
        (58, 3.0),
        (71, 5.0),
    ] {
        plant = plant.with_channel(id, SignalModel::Constant(value));
    }
    plant
}

/// Fails every read after the first `healthy_reads`.
struct FailingPlant {
    inner: MockPlant,
    healthy_reads: u64,
    reads: AtomicU64,
}

#[async_trait]
impl PlantReader for FailingPlant {
    async fn read(&self, channel: ChannelId) -> Result<f64> {
        if self.reads.fetch_add(1, Ordering::SeqCst) >= self.healthy_reads {
            bail!("serial link lost");
        }
        self.inner.read(channel).await
    }
}

#[tokio::test]
async fn test_encoded_length_matches_layout() {
    let registries = [
        ChannelRegistry::rig_default().unwrap(),
        ChannelRegistry::new(
            vec![
                Channel::multi_sample(9, "burst9", 2),
                Channel::base(3, "humidity", None),
                Channel::multi_sample(4, "burst4", 5),
                Channel::stable(1, "reference1"),
            ],
            vec![1, 9, 3, 4, 1],
        )
        .unwrap(),
    ];

    for registry in registries {
        let registry = Arc::new(registry);
        let plant = MockPlant::for_registry(&registry, 3, 0.0);
        let acquirer = FrameAcquirer::new(registry.clone(), plant, 5);
        let accepted = acquirer.acquire_frame().await.unwrap();
        let encoded = FrameEncoder::new(registry.clone()).encode(&accepted.frame);

        let base = registry
            .encoded_channels()
            .filter(|c| c.kind.field_count() == 1)
            .count();
        let multi = registry
            .encoded_channels()
            .filter(|c| c.kind.field_count() == 2)
            .count();
        assert_eq!(encoded.values.len(), base + 2 * multi);
        assert_eq!(encoded.values.len(), registry.layout().len());
    }
}

#[tokio::test]
async fn test_layout_is_ascending_channel_order() {
    let keys: Vec<String> = rig().layout().into_iter().map(|f| f.key).collect();
    assert_eq!(
        keys,
        [
            "temperature",
            "pressure",
            "humidity",
            "sensor4",
            "sensor5",
            "sensor6_mean",
            "sensor6_var",
            "observation20",
            "observation43",
            "observation58",
        ]
    );
}

#[tokio::test]
async fn test_unstable_sweep_is_discarded_not_mixed() {
    // first sweep: temperature 100.0, then reference71 disagrees (5.0 -> 5.1)
    let plant = quiet_plant()
        .with_script(71, [5.0, 5.1])
        .with_script(1, [100.0]);
    let acquirer = FrameAcquirer::new(rig(), plant, 10);

    let accepted = acquirer.acquire_frame().await.unwrap();
    assert_eq!(accepted.discarded.len(), 1);
    assert_eq!(accepted.discarded[0].channel, 71);
    assert_eq!(accepted.discarded[0].previous, 5.0);
    assert_eq!(accepted.discarded[0].current, 5.1);

    let encoded = FrameEncoder::new(rig()).encode(&accepted.frame);
    assert_eq!(encoded.values[0], 20.0);
}

#[tokio::test]
async fn test_acquire_returns_only_complete_frames() {
    let plant = quiet_plant().with_script(8, [8.0, 8.5]);
    let acquirer = FrameAcquirer::new(rig(), plant, 10);
    let frames = acquirer.acquire(3).await.unwrap();
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|f| f.stable_value(8) == Some(8.0)));
}

#[tokio::test]
async fn test_constant_burst_has_zero_variance() {
    let acquirer = FrameAcquirer::new(rig(), quiet_plant(), 10);
    let accepted = acquirer.acquire_frame().await.unwrap();
    let encoded = FrameEncoder::new(rig()).encode(&accepted.frame);
    let layout = rig().layout();
    let mean = layout.iter().position(|f| f.key == "sensor6_mean").unwrap();
    assert_eq!(encoded.values[mean], 3.0);
    assert_eq!(encoded.values[mean + 1], 0.0);
}

#[tokio::test]
async fn test_boundary_alerts_through_a_run() {
    let settings = Settings::default();
    let registry = rig();
    let plant = quiet_plant().with_script(1, [26.0, 0.0]);
    let run = AcquisitionRun::new(registry.clone(), plant, &settings.acquisition);
    let mut repo = InMemoryRepository::new(registry.field_count());

    let report = run
        .execute(&AcquisitionRequest::new("Ivanov", 3, ""), &mut repo)
        .await
        .unwrap();

    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].channel, 1);
    assert_eq!(report.alerts[0].value, 26.0);
    assert_eq!(report.alerts[0].bound, ChannelBound::new(-21.0, 25.0).unwrap());

    // out-of-envelope readings are stored anyway
    let frames = repo.load_frames().unwrap();
    let temperatures: Vec<f64> = frames.iter().map(|f| f.values[0]).collect();
    assert_eq!(temperatures, [26.0, 0.0, 20.0]);
}

#[tokio::test]
async fn test_hardware_fault_keeps_earlier_frames() {
    let settings = Settings::default();
    let registry = rig();
    let plant = FailingPlant {
        inner: quiet_plant(),
        healthy_reads: READS_PER_SWEEP + 5,
        reads: AtomicU64::new(0),
    };
    let run = AcquisitionRun::new(registry.clone(), plant, &settings.acquisition);
    let mut repo = InMemoryRepository::new(registry.field_count());

    let err = run
        .execute(&AcquisitionRequest::new("Ivanov", 5, ""), &mut repo)
        .await
        .unwrap_err();
    match err {
        DaqError::Instrument { message, .. } => assert!(message.contains("serial link lost")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(repo.load_sessions().unwrap().len(), 1);
    assert_eq!(repo.load_frames().unwrap().len(), 1);
}

#[tokio::test]
async fn test_stability_cap_aborts_run() {
    let mut settings = Settings::default();
    settings.acquisition.max_consecutive_failures = 2;
    let registry = rig();
    let plant = quiet_plant().with_script(71, [5.0, 6.0, 5.0, 6.0]);
    let run = AcquisitionRun::new(registry.clone(), plant, &settings.acquisition);
    let mut repo = InMemoryRepository::new(registry.field_count());

    let err = run
        .execute(&AcquisitionRequest::new("Ivanov", 1, ""), &mut repo)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DaqError::StabilityExhausted {
            channel: 71,
            attempts: 2
        }
    ));
    assert!(repo.load_frames().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancellation_between_reads() {
    let settings = Settings::default();
    let registry = rig();
    let plant = quiet_plant().with_read_delay(Duration::from_millis(2));
    let run = AcquisitionRun::new(registry.clone(), plant, &settings.acquisition);
    let mut repo = InMemoryRepository::new(registry.field_count());

    let cancel = run.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
    });

    let err = run
        .execute(&AcquisitionRequest::new("Ivanov", 1_000, ""), &mut repo)
        .await
        .unwrap_err();
    assert!(matches!(err, DaqError::Cancelled));
    let saved = repo.load_frames().unwrap();
    assert!(saved.len() < 1_000);
    assert!(saved.iter().all(|f| f.values.len() == registry.field_count()));
}

#[tokio::test]
async fn test_cancelled_before_start_creates_no_session() {
    let settings = Settings::default();
    let registry = rig();
    let run = AcquisitionRun::new(registry.clone(), quiet_plant(), &settings.acquisition);
    run.cancel_token().cancel();
    let mut repo = InMemoryRepository::new(registry.field_count());

    let result = run
        .execute(&AcquisitionRequest::new("Ivanov", 1, ""), &mut repo)
        .await;
    assert!(matches!(result, Err(DaqError::Cancelled)));
    assert!(repo.load_sessions().unwrap().is_empty());
}

#[tokio::test]
async fn test_single_sweep_outcome_reports_violation() {
    let plant = quiet_plant().with_script(71, [5.0, 5.1]);
    let acquirer = FrameAcquirer::new(rig(), plant, 10);
    match acquirer.sweep().await.unwrap() {
        SweepOutcome::Unstable(violation) => assert_eq!(violation.channel, 71),
        SweepOutcome::Complete(_) => panic!("expected the sweep to be abandoned"),
    }
}
