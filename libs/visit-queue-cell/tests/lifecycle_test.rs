use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use visit_queue_cell::*;

fn create_test_queue() -> VisitQueue {
    VisitQueue::new("clinic-test", QueueSettings::default())
}

async fn join(queue: &VisitQueue, patient: &str, priority: VisitPriority) -> VisitEntry {
    queue
        .join_queue(JoinQueueRequest::new(patient, &format!("Patient {}", patient), priority))
        .await
        .expect("Failed to join queue")
}

#[tokio::test]
async fn test_join_assigns_waiting_status_and_sequential_numbers() {
    let queue = create_test_queue();

    let first = join(&queue, "p1", VisitPriority::Normal).await;
    let second = join(&queue, "p2", VisitPriority::Normal).await;

    assert_eq!(first.status, VisitStatus::Waiting);
    assert_eq!(first.clinic_id, "clinic-test");
    assert_eq!(first.queue_number, 1);
    assert_eq!(second.queue_number, 2);
    assert!(second.check_in_time >= first.check_in_time);
    assert_ne!(first.id, second.id);
    assert!(first.called_time.is_none());
}

#[tokio::test]
async fn test_call_next_honours_priority_over_arrival() {
    let queue = create_test_queue();
    let normal = join(&queue, "normal", VisitPriority::Normal).await;
    let urgent = join(&queue, "urgent", VisitPriority::Urgent).await;
    let emergency = join(&queue, "emergency", VisitPriority::Emergency).await;

    let first = queue.call_next(None).await.expect("Failed to call first");
    let second = queue.call_next(None).await.expect("Failed to call second");
    let third = queue.call_next(None).await.expect("Failed to call third");

    assert_eq!(first.id, emergency.id);
    assert_eq!(second.id, urgent.id);
    assert_eq!(third.id, normal.id);
    assert_eq!(first.status, VisitStatus::Called);
    assert!(first.called_time.is_some());
    assert_eq!(first.position, None);
}

#[tokio::test]
async fn test_complete_before_call_is_rejected() {
    let queue = create_test_queue();
    let entry = join(&queue, "p1", VisitPriority::Normal).await;

    let result = queue.complete_service(entry.id).await;

    assert_matches!(
        result,
        Err(QueueError::InvalidTransition { from: VisitStatus::Waiting, operation: QueueOperation::CompleteService, .. })
    );
    let stored = queue.get_entry(entry.id).await.unwrap();
    assert_eq!(stored.status, VisitStatus::Waiting);
    assert!(stored.completed_time.is_none());
}

#[tokio::test]
async fn test_call_next_on_empty_queue() {
    let queue = create_test_queue();

    let result = queue.call_next(None).await;

    assert_eq!(result.unwrap_err(), QueueError::QueueEmpty);
    assert_eq!(queue.get_stats().await, QueueStats::default());
}

#[tokio::test]
async fn test_full_visit_updates_stats() {
    let queue = create_test_queue();
    let entry = join(&queue, "p1", VisitPriority::Normal).await;

    let called = queue.call_next(None).await.unwrap();
    assert_eq!(called.id, entry.id);
    let started = queue.start_service(entry.id).await.unwrap();
    assert_eq!(started.status, VisitStatus::InService);
    assert!(started.service_start_time.is_some());
    let completed = queue.complete_service(entry.id).await.unwrap();
    assert_eq!(completed.status, VisitStatus::Completed);

    let stats = queue.get_stats().await;
    assert_eq!(stats.total, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.called, 0);
    assert_eq!(stats.in_service, 0);
    assert_eq!(stats.cancelled, 0);
    assert_eq!(stats.no_show, 0);
    assert_eq!(stats.average_wait_time, 0.0);
    assert!(stats.average_service_time >= 0.0);
    assert!(stats.average_service_time < 1.0);

    let expected = completed.service_minutes().unwrap();
    assert!((stats.average_service_time - expected).abs() < 1e-9);
}

#[tokio::test]
async fn test_second_join_for_active_patient_fails() {
    let queue = create_test_queue();
    let entry = join(&queue, "p1", VisitPriority::Normal).await;

    let duplicate = queue
        .join_queue(JoinQueueRequest::new("p1", "Patient p1", VisitPriority::Urgent))
        .await;
    assert_matches!(duplicate, Err(QueueError::DuplicateActivePatient(ref p)) if p == "p1");
    assert_eq!(queue.get_stats().await.total, 1);

    // Still blocked while called
    queue.call_next(None).await.unwrap();
    assert_err!(
        queue
            .join_queue(JoinQueueRequest::new("p1", "Patient p1", VisitPriority::Normal))
            .await
    );

    queue.cancel_entry(entry.id, None).await.unwrap();
    let rejoined = assert_ok!(
        queue
            .join_queue(JoinQueueRequest::new("p1", "Patient p1", VisitPriority::Normal))
            .await
    );
    assert_ne!(rejoined.id, entry.id);
    assert_eq!(queue.get_entry_by_patient_id("p1").await.unwrap().id, rejoined.id);
}

#[tokio::test]
async fn test_estimates_follow_position() {
    let queue = create_test_queue();
    let a = join(&queue, "a", VisitPriority::Normal).await;
    let b = join(&queue, "b", VisitPriority::Normal).await;
    let c = join(&queue, "c", VisitPriority::Urgent).await;

    let waiting = queue.get_entries_by_status(VisitStatus::Waiting).await;
    let ids: Vec<Uuid> = waiting.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![c.id, a.id, b.id]);

    for (index, entry) in waiting.iter().enumerate() {
        assert_eq!(entry.estimated_wait_time, (index as u32 + 1) * 15);
        assert_eq!(entry.position, Some(index as u32 + 1));
    }

    // Expected call times are spaced one service slot apart
    let call_times: Vec<_> = waiting.iter().map(|e| e.estimated_call_time.unwrap()).collect();
    assert_eq!(call_times[1] - call_times[0], Duration::minutes(15));
    assert_eq!(call_times[2] - call_times[1], Duration::minutes(15));
    assert!(call_times[0] > Utc::now());

    let called = queue.call_next(None).await.unwrap();
    assert_eq!(called.id, c.id);
    assert!(called.estimated_call_time.is_none());
    let next = queue.get_entry(a.id).await.unwrap();
    assert!(next.estimated_call_time.unwrap() <= Utc::now() + Duration::minutes(15));
}

#[tokio::test]
async fn test_positions_close_gaps_after_removal() {
    let queue = create_test_queue();
    let a = join(&queue, "a", VisitPriority::Normal).await;
    let b = join(&queue, "b", VisitPriority::Normal).await;
    let c = join(&queue, "c", VisitPriority::Urgent).await;
    let d = join(&queue, "d", VisitPriority::Normal).await;

    assert_eq!(queue.get_position(c.id).await, Some(1));
    assert_eq!(queue.get_position(a.id).await, Some(2));
    assert_eq!(queue.get_position(b.id).await, Some(3));
    assert_eq!(queue.get_position(d.id).await, Some(4));

    queue.call_patient(b.id, None).await.unwrap();

    // Only d was behind b
    assert_eq!(queue.get_position(c.id).await, Some(1));
    assert_eq!(queue.get_position(a.id).await, Some(2));
    assert_eq!(queue.get_position(d.id).await, Some(3));
    assert_eq!(queue.get_position(b.id).await, None);

    queue.mark_no_show(c.id).await.unwrap();

    assert_eq!(queue.get_position(a.id).await, Some(1));
    assert_eq!(queue.get_position(d.id).await, Some(2));
    let d_entry = queue.get_entry(d.id).await.unwrap();
    assert_eq!(d_entry.estimated_wait_time, 30);
}

#[tokio::test]
async fn test_cancel_records_reason_and_rejects_in_service() {
    let queue = create_test_queue();
    let waiting = join(&queue, "p1", VisitPriority::Normal).await;
    let serving = join(&queue, "p2", VisitPriority::Emergency).await;

    let cancelled = queue
        .cancel_entry(waiting.id, Some("Left before being seen".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, VisitStatus::Cancelled);
    assert_eq!(cancelled.notes.as_deref(), Some("Left before being seen"));

    queue.call_next(None).await.unwrap();
    queue.start_service(serving.id).await.unwrap();

    assert_matches!(
        queue.cancel_entry(serving.id, None).await,
        Err(QueueError::InvalidTransition { from: VisitStatus::InService, .. })
    );
    assert_matches!(
        queue.mark_no_show(serving.id).await,
        Err(QueueError::InvalidTransition { from: VisitStatus::InService, .. })
    );
    assert_eq!(queue.get_entry(serving.id).await.unwrap().status, VisitStatus::InService);
}

#[tokio::test]
async fn test_terminal_entries_reject_every_transition() {
    let queue = create_test_queue();
    let entry = join(&queue, "p1", VisitPriority::Normal).await;
    queue.call_next(None).await.unwrap();
    queue.mark_no_show(entry.id).await.unwrap();

    assert_err!(queue.call_patient(entry.id, None).await);
    assert_err!(queue.start_service(entry.id).await);
    assert_err!(queue.complete_service(entry.id).await);
    assert_err!(queue.cancel_entry(entry.id, None).await);
    assert_err!(queue.mark_no_show(entry.id).await);

    let stored = queue.get_entry(entry.id).await.unwrap();
    assert_eq!(stored.status, VisitStatus::NoShow);
    assert!(queue.get_entry_by_patient_id("p1").await.is_none());
}

#[tokio::test]
async fn test_unknown_entry_is_not_found() {
    let queue = create_test_queue();
    let id = Uuid::new_v4();

    assert_eq!(queue.start_service(id).await.unwrap_err(), QueueError::NotFound(id));
    assert_eq!(queue.call_patient(id, None).await.unwrap_err(), QueueError::NotFound(id));
    assert_eq!(queue.get_entry(id).await.unwrap_err(), QueueError::NotFound(id));
    assert_eq!(queue.get_position(id).await, None);
}

#[tokio::test]
async fn test_call_patient_requires_waiting_status() {
    let queue = create_test_queue();
    let entry = join(&queue, "p1", VisitPriority::Normal).await;
    queue.call_patient(entry.id, None).await.unwrap();

    assert_matches!(
        queue.call_patient(entry.id, None).await,
        Err(QueueError::InvalidTransition { from: VisitStatus::Called, operation: QueueOperation::Call, .. })
    );
}

#[tokio::test]
async fn test_station_filter_limits_calls() {
    let queue = create_test_queue();
    let room_two = queue
        .join_queue(
            JoinQueueRequest::new("p1", "Patient 1", VisitPriority::Emergency).with_preferred_station("room-2"),
        )
        .await
        .unwrap();
    let anyone = join(&queue, "p2", VisitPriority::Normal).await;

    let station = AssignedStation::new("room-1");
    let called = queue.call_next(Some(&station)).await.unwrap();
    assert_eq!(called.id, anyone.id);
    assert_eq!(called.station_id.as_deref(), Some("room-1"));

    assert_eq!(queue.call_next(Some(&station)).await.unwrap_err(), QueueError::QueueEmpty);
    assert_matches!(
        queue.call_patient(room_two.id, Some(&station)).await,
        Err(QueueError::NotEligible { ref station, .. }) if station == "room-1"
    );
    assert_eq!(queue.get_entry(room_two.id).await.unwrap().status, VisitStatus::Waiting);

    let active = queue.get_active_for_station("room-1").await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, anyone.id);
    assert!(queue.get_active_for_station("room-2").await.is_empty());
}

#[tokio::test]
async fn test_closure_filter_for_call_next() {
    let queue = create_test_queue();
    join(&queue, "p1", VisitPriority::Emergency).await;
    let dermatology = queue
        .join_queue(
            JoinQueueRequest::new("p2", "Patient 2", VisitPriority::Normal).with_appointment_type("dermatology"),
        )
        .await
        .unwrap();

    let only_dermatology = |entry: &VisitEntry| entry.appointment_type == "dermatology";
    let called = queue.call_next(Some(&only_dermatology)).await.unwrap();

    assert_eq!(called.id, dermatology.id);
    assert_eq!(called.station_id, None);
}

#[tokio::test]
async fn test_update_notes() {
    let queue = create_test_queue();
    let entry = queue
        .join_queue(JoinQueueRequest::new("p1", "Patient 1", VisitPriority::Normal).with_notes("first visit"))
        .await
        .unwrap();
    assert_eq!(entry.notes.as_deref(), Some("first visit"));

    let updated = queue
        .update_notes(entry.id, Some("allergic to latex".to_string()))
        .await
        .unwrap();
    assert_eq!(updated.notes.as_deref(), Some("allergic to latex"));
    assert_eq!(updated.status, VisitStatus::Waiting);
}

#[tokio::test]
async fn test_join_validation() {
    let queue = create_test_queue();

    let result = queue
        .join_queue(JoinQueueRequest::new("  ", "Nobody", VisitPriority::Normal))
        .await;
    assert_matches!(result, Err(QueueError::Validation(_)));

    let result = queue
        .join_queue(JoinQueueRequest::new("p1", "", VisitPriority::Normal))
        .await;
    assert_matches!(result, Err(QueueError::Validation(_)));
    assert_eq!(queue.get_stats().await.total, 0);
}

#[tokio::test]
async fn test_entries_by_status_and_all() {
    let queue = create_test_queue();
    let a = join(&queue, "a", VisitPriority::Normal).await;
    let b = join(&queue, "b", VisitPriority::Normal).await;
    queue.call_patient(b.id, None).await.unwrap();

    let called = queue.get_entries_by_status(VisitStatus::Called).await;
    assert_eq!(called.len(), 1);
    assert_eq!(called[0].id, b.id);

    let all = queue.get_all_entries().await;
    let ids: Vec<Uuid> = all.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![a.id, b.id]);
    assert!(queue.get_entries_by_status(VisitStatus::Completed).await.is_empty());
}

#[tokio::test]
async fn test_stats_total_matches_status_counts() {
    let queue = create_test_queue();
    let mut ids = Vec::new();
    for i in 0..6 {
        ids.push(join(&queue, &format!("p{}", i), VisitPriority::Normal).await.id);
    }
    queue.call_patient(ids[0], None).await.unwrap();
    queue.call_patient(ids[1], None).await.unwrap();
    queue.start_service(ids[1]).await.unwrap();
    queue.cancel_entry(ids[2], None).await.unwrap();
    queue.mark_no_show(ids[3]).await.unwrap();

    let stats = queue.get_stats().await;
    assert_eq!(stats.total, 6);
    assert_eq!(
        stats.total,
        stats.waiting + stats.called + stats.in_service + stats.completed + stats.cancelled + stats.no_show
    );
    assert_eq!(stats.waiting, 2);
    assert_eq!(stats.average_wait_time, 22.5);
}

#[tokio::test]
async fn test_seed_restores_entries_and_continues_numbering() {
    let queue = create_test_queue();
    let now = Utc::now();

    let mut waiting = VisitEntry::new(
        "elsewhere",
        JoinQueueRequest::new("p1", "Patient 1", VisitPriority::Normal),
        7,
        now - Duration::seconds(2),
    );
    waiting.estimated_wait_time = 99;
    let mut done = VisitEntry::new(
        "elsewhere",
        JoinQueueRequest::new("p2", "Patient 2", VisitPriority::Normal),
        3,
        now - Duration::seconds(3),
    );
    done.status = VisitStatus::Completed;

    let count = queue.seed(vec![waiting.clone(), done.clone()]).await.unwrap();
    assert_eq!(count, 2);

    let restored = queue.get_entry(waiting.id).await.unwrap();
    assert_eq!(restored.clinic_id, "clinic-test");
    assert_eq!(restored.estimated_wait_time, 15);
    assert_eq!(restored.position, Some(1));

    let next = join(&queue, "p3", VisitPriority::Normal).await;
    assert_eq!(next.queue_number, 8);
    assert_eq!(queue.get_position(next.id).await, Some(2));
}

#[tokio::test]
async fn test_seed_rejects_conflicts_without_partial_insert() {
    let queue = create_test_queue();
    join(&queue, "p1", VisitPriority::Normal).await;

    let fresh = VisitEntry::new(
        "clinic-test",
        JoinQueueRequest::new("p9", "Patient 9", VisitPriority::Normal),
        1,
        Utc::now(),
    );
    let conflicting = VisitEntry::new(
        "clinic-test",
        JoinQueueRequest::new("p1", "Patient 1", VisitPriority::Normal),
        2,
        Utc::now(),
    );

    let result = queue.seed(vec![fresh.clone(), conflicting]).await;

    assert_matches!(result, Err(QueueError::DuplicateActivePatient(ref p)) if p == "p1");
    assert_eq!(queue.get_stats().await.total, 1);
    assert!(queue.get_entry(fresh.id).await.is_err());
}

#[tokio::test]
async fn test_smoothed_service_time_reshapes_estimates() {
    let settings = QueueSettings {
        average_service_minutes: 10,
        service_time_model: ServiceTimeModel::Smoothed { alpha: 1.0 },
        ..QueueSettings::default()
    };
    let queue = VisitQueue::new("clinic-smoothed", settings);
    let first = join(&queue, "p1", VisitPriority::Normal).await;
    let second = join(&queue, "p2", VisitPriority::Normal).await;
    assert_eq!(queue.get_entry(second.id).await.unwrap().estimated_wait_time, 20);

    queue.call_patient(first.id, None).await.unwrap();
    queue.start_service(first.id).await.unwrap();
    queue.complete_service(first.id).await.unwrap();

    // A near-instant visit pulls the average down to the one-minute floor
    let waiting = queue.get_entry(second.id).await.unwrap();
    assert_eq!(waiting.position, Some(1));
    assert_eq!(waiting.estimated_wait_time, 1);
}

#[tokio::test]
async fn test_seed_with_maximum_queue_number() {
    let queue = create_test_queue();
    let seeded = VisitEntry::new(
        "clinic-test",
        JoinQueueRequest::new("p1", "Patient 1", VisitPriority::Normal),
        u32::MAX,
        Utc::now() - Duration::seconds(1),
    );

    assert_ok!(queue.seed(vec![seeded]).await);

    let next = join(&queue, "p2", VisitPriority::Normal).await;
    assert_eq!(next.queue_number, u32::MAX);
}

#[tokio::test]
async fn test_closed_queue_rejects_mutations() {
    let registry = ClinicQueueRegistry::default();
    let queue = registry.create("clinic-closed").await.unwrap();
    let entry = join(&queue, "p1", VisitPriority::Normal).await;

    registry.destroy("clinic-closed").await.unwrap();
    assert!(queue.is_closed().await);

    let result = queue
        .join_queue(JoinQueueRequest::new("p2", "Patient 2", VisitPriority::Normal))
        .await;
    assert_matches!(result, Err(QueueError::ClinicNotFound(ref id)) if id == "clinic-closed");
    assert_matches!(queue.call_next(None).await, Err(QueueError::ClinicNotFound(_)));
    assert_matches!(queue.cancel_entry(entry.id, None).await, Err(QueueError::ClinicNotFound(_)));
    assert_matches!(queue.seed(Vec::new()).await, Err(QueueError::ClinicNotFound(_)));
    assert_eq!(queue.get_stats().await.total, 0);
}
