
use serde_json::json;
use test_support::{
    create_schedule, create_timeslot, days_from_today, request_ok, schedule_status, seed_fixture,
    spawn_sidecar, temp_dir,
};

const AUTO_NOTE: &str = "Tự động hủy do đã qua thời gian";

#[test]
fn overdue_sweep_closes_or_cancels_by_attendance() {
    let workspace = temp_dir("lichday-sweep");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_fixture(&mut stdin, &mut reader, &workspace);

    let t1 = create_timeslot(&mut stdin, &mut reader, "T1", "08:00", "08:50");
    let t2 = create_timeslot(&mut stdin, &mut reader, "T2", "08:55", "09:45");
    let t3 = create_timeslot(&mut stdin, &mut reader, "T3", "09:50", "10:40");

    let attended = create_schedule(&mut stdin, &mut reader, &fx.assignment_id, "2026-03-02", &t1, Some(&fx.room_id));
    let skipped = create_schedule(&mut stdin, &mut reader, &fx.assignment_id, "2026-03-02", &t2, Some(&fx.room_id));
    // A row the lecturer already annotated keeps its note through the
    // auto-cancel.
    let noted_result = request_ok(
        &mut stdin,
        &mut reader,
        "schedules.create",
        json!({
            "assignmentId": fx.assignment_id,
            "sessionDate": "2026-03-02",
            "timeslotId": t3,
            "roomId": fx.room_id,
            "note": "Nghỉ lễ",
        }),
    );
    let noted = noted_result
        .get("scheduleId")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    let future = create_schedule(&mut stdin, &mut reader, &fx.assignment_id, "2026-03-09", &t1, Some(&fx.room_id));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "attendance.record",
        json!({ "scheduleId": attended, "studentCode": "SV001" }),
    );

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "schedules.sweepOverdue",
        json!({ "asOf": "2026-03-03T07:00:00" }),
    );
    assert_eq!(summary.get("done").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(summary.get("canceled").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(summary.get("failed").and_then(|v| v.as_u64()), Some(0));

    let (s, _) = schedule_status(&mut stdin, &mut reader, &fx.lecturer_id, &attended);
    assert_eq!(s, "done");
    let (s, note) = schedule_status(&mut stdin, &mut reader, &fx.lecturer_id, &skipped);
    assert_eq!(s, "canceled");
    assert_eq!(note.as_deref(), Some(AUTO_NOTE));
    let (s, note) = schedule_status(&mut stdin, &mut reader, &fx.lecturer_id, &noted);
    assert_eq!(s, "canceled");
    assert_eq!(note.as_deref(), Some("Nghỉ lễ"));
    let (s, _) = schedule_status(&mut stdin, &mut reader, &fx.lecturer_id, &future);
    assert_eq!(s, "planned");

    // Rerun is a no-op; the sweep only ever moves open rows.
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "schedules.sweepOverdue",
        json!({ "asOf": "2026-03-03T07:00:00" }),
    );
    assert_eq!(summary.get("done").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(summary.get("canceled").and_then(|v| v.as_u64()), Some(0));
}

#[test]
fn overdue_sweep_respects_start_time_on_the_same_day() {
    let workspace = temp_dir("lichday-sweep-sameday");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_fixture(&mut stdin, &mut reader, &workspace);

    let t1 = create_timeslot(&mut stdin, &mut reader, "T1", "08:00", "08:50");
    let row = create_schedule(&mut stdin, &mut reader, &fx.assignment_id, "2026-03-03", &t1, Some(&fx.room_id));

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "schedules.sweepOverdue",
        json!({ "asOf": "2026-03-03T07:59:00" }),
    );
    assert_eq!(summary.get("canceled").and_then(|v| v.as_u64()), Some(0));
    let (s, _) = schedule_status(&mut stdin, &mut reader, &fx.lecturer_id, &row);
    assert_eq!(s, "planned");

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "schedules.sweepOverdue",
        json!({ "asOf": "2026-03-03T08:01:00" }),
    );
    assert_eq!(summary.get("canceled").and_then(|v| v.as_u64()), Some(1));
    let (s, _) = schedule_status(&mut stdin, &mut reader, &fx.lecturer_id, &row);
    assert_eq!(s, "canceled");
}

#[test]
fn overdue_makeup_rows_complete_as_makeup_done() {
    let workspace = temp_dir("lichday-sweep-makeup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_fixture(&mut stdin, &mut reader, &workspace);

    let t1 = create_timeslot(&mut stdin, &mut reader, "T1", "08:00", "08:50");
    // The leave deadline runs against the daemon's real clock, so the
    // original session sits safely in the real future.
    let original = create_schedule(
        &mut stdin,
        &mut reader,
        &fx.assignment_id,
        &days_from_today(5),
        &t1,
        Some(&fx.room_id),
    );
    let leave = request_ok(
        &mut stdin,
        &mut reader,
        "leave.submit",
        json!({
            "lecturerId": fx.lecturer_id,
            "scheduleId": original,
            "reason": "Đi công tác",
        }),
    );
    let leave_id = leave.get("leaveRequestId").and_then(|v| v.as_str()).unwrap();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "leave.decide",
        json!({ "leaveRequestId": leave_id, "outcome": "approved", "deciderId": "daotao" }),
    );
    let makeup = request_ok(
        &mut stdin,
        &mut reader,
        "makeup.propose",
        json!({
            "leaveRequestId": leave_id,
            "lecturerId": fx.lecturer_id,
            "suggestedDate": "2026-03-02",
            "timeslotId": t1,
        }),
    );
    let makeup_id = makeup.get("makeupRequestId").and_then(|v| v.as_str()).unwrap();
    let decided = request_ok(
        &mut stdin,
        &mut reader,
        "makeup.decide",
        json!({ "makeupRequestId": makeup_id, "outcome": "approved", "deciderId": "daotao" }),
    );
    let makeup_row = decided
        .get("makeupScheduleId")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "attendance.record",
        json!({ "scheduleId": makeup_row, "studentCode": "SV001" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "schedules.sweepOverdue",
        json!({ "asOf": "2026-03-03T07:00:00" }),
    );
    let (s, _) = schedule_status(&mut stdin, &mut reader, &fx.lecturer_id, &makeup_row);
    assert_eq!(s, "makeup_done");
}

#[test]
fn close_day_promotes_without_checking_attendance() {
    let workspace = temp_dir("lichday-closeday");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_fixture(&mut stdin, &mut reader, &workspace);

    let t1 = create_timeslot(&mut stdin, &mut reader, "T1", "08:00", "08:50");
    let t13 = create_timeslot(&mut stdin, &mut reader, "T13", "18:00", "18:50");

    let yesterday = create_schedule(&mut stdin, &mut reader, &fx.assignment_id, "2026-03-02", &t1, Some(&fx.room_id));
    let today_past = create_schedule(&mut stdin, &mut reader, &fx.assignment_id, "2026-03-03", &t1, Some(&fx.room_id));
    let today_evening = create_schedule(&mut stdin, &mut reader, &fx.assignment_id, "2026-03-03", &t13, Some(&fx.room_id));

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "schedules.closeDay",
        json!({ "asOf": "2026-03-03T17:00:00" }),
    );
    assert_eq!(summary.get("done").and_then(|v| v.as_u64()), Some(2));

    // No attendance anywhere, and still done: the end-of-day pass is the
    // blunt one.
    let (s, _) = schedule_status(&mut stdin, &mut reader, &fx.lecturer_id, &yesterday);
    assert_eq!(s, "done");
    let (s, _) = schedule_status(&mut stdin, &mut reader, &fx.lecturer_id, &today_past);
    assert_eq!(s, "done");
    let (s, _) = schedule_status(&mut stdin, &mut reader, &fx.lecturer_id, &today_evening);
    assert_eq!(s, "planned");
}
