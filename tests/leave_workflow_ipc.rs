
use serde_json::json;
use test_support::{
    create_schedule, create_timeslot, days_from_today, request_err, request_ok, seed_fixture,
    spawn_sidecar, temp_dir,
};

#[test]
fn submit_duplicate_and_deadline_rules() {
    let workspace = temp_dir("lichday-leave");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_fixture(&mut stdin, &mut reader, &workspace);

    let t1 = create_timeslot(&mut stdin, &mut reader, "T1", "08:00", "08:50");
    let t2 = create_timeslot(&mut stdin, &mut reader, "T2", "08:55", "09:45");
    let future_row = create_schedule(
        &mut stdin,
        &mut reader,
        &fx.assignment_id,
        &days_from_today(3),
        &t1,
        Some(&fx.room_id),
    );
    let today_row = create_schedule(
        &mut stdin,
        &mut reader,
        &fx.assignment_id,
        &days_from_today(0),
        &t1,
        Some(&fx.room_id),
    );
    let past_row = create_schedule(
        &mut stdin,
        &mut reader,
        &fx.assignment_id,
        &days_from_today(-1),
        &t2,
        Some(&fx.room_id),
    );

    let submitted = request_ok(
        &mut stdin,
        &mut reader,
        "leave.submit",
        json!({
            "lecturerId": fx.lecturer_id,
            "scheduleId": future_row,
            "reason": "Đi công tác",
            "proofUrl": "https://example.com/quyet-dinh.pdf",
        }),
    );
    assert_eq!(submitted.get("status").and_then(|v| v.as_str()), Some("pending"));

    // One request per (row, lecturer), full stop.
    request_err(
        &mut stdin,
        &mut reader,
        "leave.submit",
        json!({
            "lecturerId": fx.lecturer_id,
            "scheduleId": future_row,
            "reason": "Lý do khác",
        }),
        "conflict",
    );

    // Today and the past are both out of reach.
    request_err(
        &mut stdin,
        &mut reader,
        "leave.submit",
        json!({ "lecturerId": fx.lecturer_id, "scheduleId": today_row, "reason": "x" }),
        "validation_failed",
    );
    request_err(
        &mut stdin,
        &mut reader,
        "leave.submit",
        json!({ "lecturerId": fx.lecturer_id, "scheduleId": past_row, "reason": "x" }),
        "validation_failed",
    );

    // Submission queued a self-notification.
    let notifications = request_ok(
        &mut stdin,
        &mut reader,
        "notifications.list",
        json!({ "lecturerId": fx.lecturer_id }),
    );
    let items = notifications
        .get("notifications")
        .and_then(|v| v.as_array())
        .unwrap();
    assert!(!items.is_empty());
}

#[test]
fn someone_elses_schedule_reads_as_missing() {
    let workspace = temp_dir("lichday-leave-ownership");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_fixture(&mut stdin, &mut reader, &workspace);

    let t1 = create_timeslot(&mut stdin, &mut reader, "T1", "08:00", "08:50");
    let row = create_schedule(
        &mut stdin,
        &mut reader,
        &fx.assignment_id,
        &days_from_today(3),
        &t1,
        Some(&fx.room_id),
    );

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
        "leave.submit",
        json!({ "lecturerId": outsider_id, "scheduleId": row, "reason": "x" }),
        "not_found",
    );
}

#[test]
fn pending_only_edits_and_decision_immutability() {
    let workspace = temp_dir("lichday-leave-lifecycle");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_fixture(&mut stdin, &mut reader, &workspace);

    let t1 = create_timeslot(&mut stdin, &mut reader, "T1", "08:00", "08:50");
    let t2 = create_timeslot(&mut stdin, &mut reader, "T2", "08:55", "09:45");
    let row_a = create_schedule(&mut stdin, &mut reader, &fx.assignment_id, &days_from_today(3), &t1, Some(&fx.room_id));
    let row_b = create_schedule(&mut stdin, &mut reader, &fx.assignment_id, &days_from_today(4), &t2, Some(&fx.room_id));

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "leave.submit",
        json!({ "lecturerId": fx.lecturer_id, "scheduleId": row_a, "reason": "Ốm" }),
    );
    let first_id = first
        .get("leaveRequestId")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "leave.update",
        json!({
            "leaveRequestId": first_id,
            "lecturerId": fx.lecturer_id,
            "reason": "Ốm, có giấy khám",
            "proofUrl": "https://example.com/giay-kham.pdf",
        }),
    );

    let decided = request_ok(
        &mut stdin,
        &mut reader,
        "leave.decide",
        json!({ "leaveRequestId": first_id, "outcome": "approved", "deciderId": "daotao" }),
    );
    assert_eq!(decided.get("status").and_then(|v| v.as_str()), Some("approved"));

    // Decided means frozen: no edit, no cancel, no second decision.
    request_err(
        &mut stdin,
        &mut reader,
        "leave.update",
        json!({ "leaveRequestId": first_id, "lecturerId": fx.lecturer_id, "reason": "y" }),
        "conflict",
    );
    request_err(
        &mut stdin,
        &mut reader,
        "leave.cancel",
        json!({ "leaveRequestId": first_id, "lecturerId": fx.lecturer_id }),
        "conflict",
    );
    request_err(
        &mut stdin,
        &mut reader,
        "leave.decide",
        json!({ "leaveRequestId": first_id, "outcome": "rejected", "deciderId": "daotao" }),
        "conflict",
    );

    // A withdrawn request is frozen the same way.
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "leave.submit",
        json!({ "lecturerId": fx.lecturer_id, "scheduleId": row_b, "reason": "Hội thảo" }),
    );
    let second_id = second
        .get("leaveRequestId")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    let canceled = request_ok(
        &mut stdin,
        &mut reader,
        "leave.cancel",
        json!({ "leaveRequestId": second_id, "lecturerId": fx.lecturer_id }),
    );
    assert_eq!(canceled.get("status").and_then(|v| v.as_str()), Some("canceled"));
    request_err(
        &mut stdin,
        &mut reader,
        "leave.update",
        json!({ "leaveRequestId": second_id, "lecturerId": fx.lecturer_id, "reason": "z" }),
        "conflict",
    );

    let mine = request_ok(
        &mut stdin,
        &mut reader,
        "leave.listMine",
        json!({ "lecturerId": fx.lecturer_id }),
    );
    let requests = mine.get("requests").and_then(|v| v.as_array()).unwrap();
    assert_eq!(requests.len(), 2);
    // Newest first.
    assert_eq!(
        requests[0].get("id").and_then(|v| v.as_str()),
        Some(second_id.as_str())
    );

    let approved_only = request_ok(
        &mut stdin,
        &mut reader,
        "leave.listMine",
        json!({ "lecturerId": fx.lecturer_id, "status": "approved" }),
    );
    let requests = approved_only.get("requests").and_then(|v| v.as_array()).unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].get("id").and_then(|v| v.as_str()),
        Some(first_id.as_str())
    );
}
