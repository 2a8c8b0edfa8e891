
use serde_json::json;
use test_support::{
    create_schedule, create_timeslot, request_err, request_ok, seed_fixture, spawn_sidecar,
    temp_dir,
};

#[test]
fn start_finish_guards_and_attendance_gate() {
    let workspace = temp_dir("lichday-lifecycle");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_fixture(&mut stdin, &mut reader, &workspace);

    let t1 = create_timeslot(&mut stdin, &mut reader, "T1", "08:00", "08:50");
    let schedule_id = create_schedule(
        &mut stdin,
        &mut reader,
        &fx.assignment_id,
        "2026-09-07",
        &t1,
        Some(&fx.room_id),
    );

    // Another lecturer never sees the row, let alone starts it.
    let outsider = request_ok(
        &mut stdin,
        &mut reader,
        "lecturers.create",
        json!({ "name": "Tran Thi B" }),
    );
    let outsider_id = outsider.get("lecturerId").and_then(|v| v.as_str()).unwrap();
    request_err(
        &mut stdin,
        &mut reader,
        "schedules.start",
        json!({ "scheduleId": schedule_id, "lecturerId": outsider_id }),
        "not_found",
    );

    let started = request_ok(
        &mut stdin,
        &mut reader,
        "schedules.start",
        json!({ "scheduleId": schedule_id, "lecturerId": fx.lecturer_id }),
    );
    assert_eq!(started.get("status").and_then(|v| v.as_str()), Some("teaching"));

    request_err(
        &mut stdin,
        &mut reader,
        "schedules.start",
        json!({ "scheduleId": schedule_id, "lecturerId": fx.lecturer_id }),
        "invalid_state",
    );

    // No attendance yet: finishing is refused.
    request_err(
        &mut stdin,
        &mut reader,
        "schedules.finish",
        json!({ "scheduleId": schedule_id, "lecturerId": fx.lecturer_id }),
        "precondition_failed",
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "attendance.record",
        json!({ "scheduleId": schedule_id, "studentCode": "SV001", "present": true }),
    );
    let finished = request_ok(
        &mut stdin,
        &mut reader,
        "schedules.finish",
        json!({ "scheduleId": schedule_id, "lecturerId": fx.lecturer_id }),
    );
    assert_eq!(finished.get("status").and_then(|v| v.as_str()), Some("done"));

    // Terminal: neither verb applies any more.
    request_err(
        &mut stdin,
        &mut reader,
        "schedules.finish",
        json!({ "scheduleId": schedule_id, "lecturerId": fx.lecturer_id }),
        "invalid_state",
    );
    request_err(
        &mut stdin,
        &mut reader,
        "schedules.start",
        json!({ "scheduleId": schedule_id, "lecturerId": fx.lecturer_id }),
        "invalid_state",
    );
}

#[test]
fn finish_straight_from_planned_with_attendance() {
    let workspace = temp_dir("lichday-lifecycle-direct");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_fixture(&mut stdin, &mut reader, &workspace);

    let t1 = create_timeslot(&mut stdin, &mut reader, "T1", "08:00", "08:50");
    let schedule_id = create_schedule(
        &mut stdin,
        &mut reader,
        &fx.assignment_id,
        "2026-09-07",
        &t1,
        Some(&fx.room_id),
    );

    // Finishing without starting is allowed once attendance exists.
    request_err(
        &mut stdin,
        &mut reader,
        "schedules.finish",
        json!({ "scheduleId": schedule_id, "lecturerId": fx.lecturer_id }),
        "precondition_failed",
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "attendance.record",
        json!({ "scheduleId": schedule_id, "studentCode": "SV002" }),
    );
    let finished = request_ok(
        &mut stdin,
        &mut reader,
        "schedules.finish",
        json!({ "scheduleId": schedule_id, "lecturerId": fx.lecturer_id }),
    );
    assert_eq!(finished.get("status").and_then(|v| v.as_str()), Some("done"));
}

#[test]
fn attendance_upsert_and_unknown_schedule() {
    let workspace = temp_dir("lichday-attendance");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_fixture(&mut stdin, &mut reader, &workspace);

    let t1 = create_timeslot(&mut stdin, &mut reader, "T1", "08:00", "08:50");
    let schedule_id = create_schedule(
        &mut stdin,
        &mut reader,
        &fx.assignment_id,
        "2026-09-07",
        &t1,
        Some(&fx.room_id),
    );

    request_err(
        &mut stdin,
        &mut reader,
        "attendance.record",
        json!({ "scheduleId": "nope", "studentCode": "SV001" }),
        "not_found",
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "attendance.record",
        json!({ "scheduleId": schedule_id, "studentCode": "SV001", "present": true }),
    );
    // Same student again flips the flag in place instead of duplicating.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "attendance.record",
        json!({ "scheduleId": schedule_id, "studentCode": "SV001", "present": false }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "attendance.record",
        json!({ "scheduleId": schedule_id, "studentCode": "SV002" }),
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "attendance.list",
        json!({ "scheduleId": schedule_id }),
    );
    let records = listed.get("records").and_then(|v| v.as_array()).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(
        records[0].get("studentCode").and_then(|v| v.as_str()),
        Some("SV001")
    );
    assert_eq!(records[0].get("present").and_then(|v| v.as_bool()), Some(false));
}

#[test]
fn duplicate_slot_is_rejected_with_conflict() {
    let workspace = temp_dir("lichday-slot-conflict");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_fixture(&mut stdin, &mut reader, &workspace);

    let t1 = create_timeslot(&mut stdin, &mut reader, "T1", "08:00", "08:50");
    create_schedule(
        &mut stdin,
        &mut reader,
        &fx.assignment_id,
        "2026-09-07",
        &t1,
        Some(&fx.room_id),
    );
    request_err(
        &mut stdin,
        &mut reader,
        "schedules.create",
        json!({
            "assignmentId": fx.assignment_id,
            "sessionDate": "2026-09-07",
            "timeslotId": t1,
        }),
        "conflict",
    );
}
