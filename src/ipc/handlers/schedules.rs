use crate::grouping;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::status;
use chrono::{Local, NaiveDateTime, Timelike};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn query(e: rusqlite::Error) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Resolve the reference instant for time-dependent operations: an explicit
/// `asOf` wins so externally scheduled reruns are reproducible, otherwise
/// the local clock.
pub fn as_of(params: &serde_json::Value) -> Result<NaiveDateTime, HandlerErr> {
    match params.get("asOf").and_then(|v| v.as_str()) {
        Some(raw) => NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%dT%H:%M:%S")
            .map_err(|_| HandlerErr::new("bad_params", "asOf must be YYYY-MM-DDTHH:MM:SS")),
        None => Ok(Local::now().naive_local()),
    }
}

pub fn day_and_minutes(at: NaiveDateTime) -> (String, i64) {
    let today = at.format("%Y-%m-%d").to_string();
    let minutes = at.hour() as i64 * 60 + at.minute() as i64;
    (today, minutes)
}

/// The lecturer owning a schedule row, via its assignment. `not_found`
/// both for a missing row and an ownership mismatch: callers learn nothing
/// about other lecturers' calendars.
pub fn owned_schedule(
    conn: &Connection,
    schedule_id: &str,
    lecturer_id: &str,
) -> Result<(), HandlerErr> {
    let owner: Option<String> = conn
        .query_row(
            "SELECT a.lecturer_id
             FROM schedules s
             JOIN assignments a ON a.id = s.assignment_id
             WHERE s.id = ?",
            [schedule_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    match owner {
        Some(l) if l == lecturer_id => Ok(()),
        _ => Err(HandlerErr::new("not_found", "schedule not found")),
    }
}

/// Insert one calendar row. Shared with makeup approval, which materializes
/// the replacement row through the same path.
pub fn insert_schedule_row(
    conn: &Connection,
    assignment_id: &str,
    session_date: &str,
    timeslot_id: &str,
    room_id: Option<&str>,
    note: Option<&str>,
    status: status::ScheduleStatus,
    makeup_of: Option<&str>,
) -> Result<String, HandlerErr> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO schedules(id, assignment_id, session_date, timeslot_id, room_id, status, note, makeup_of)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            assignment_id,
            session_date,
            timeslot_id,
            room_id,
            status.as_str(),
            note,
            makeup_of,
        ),
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            HandlerErr::new(
                "conflict",
                "a session already occupies that assignment, date and timeslot",
            )
        } else {
            HandlerErr::new("db_insert_failed", e.to_string())
        }
    })?;
    Ok(id)
}

fn schedules_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let assignment_id = required_str(params, "assignmentId")?;
    let session_date = required_str(params, "sessionDate")?;
    let timeslot_id = required_str(params, "timeslotId")?;
    let room_id = optional_str(params, "roomId");
    let note = optional_str(params, "note");

    for (table, id) in [("assignments", &assignment_id), ("timeslots", &timeslot_id)] {
        let found: Option<i64> = conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE id = ? LIMIT 1", table),
                [id],
                |r| r.get(0),
            )
            .optional()
            .map_err(HandlerErr::query)?;
        if found.is_none() {
            return Err(HandlerErr::new(
                "not_found",
                format!("no such row in {}", table),
            ));
        }
    }

    let id = insert_schedule_row(
        conn,
        &assignment_id,
        &session_date,
        &timeslot_id,
        room_id.as_deref(),
        note.as_deref(),
        status::ScheduleStatus::Planned,
        None,
    )?;
    Ok(json!({ "scheduleId": id }))
}

fn schedules_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let lecturer_id = required_str(params, "lecturerId")?;
    let from = optional_str(params, "from");
    let to = optional_str(params, "to");
    let semester = optional_str(params, "semester");

    let rows = grouping::fetch_session_rows(
        conn,
        &lecturer_id,
        from.as_deref(),
        to.as_deref(),
        semester.as_deref(),
    )
    .map_err(HandlerErr::query)?;
    Ok(json!({ "schedules": rows }))
}

fn schedules_sessions(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let lecturer_id = required_str(params, "lecturerId")?;
    let from = optional_str(params, "from");
    let to = optional_str(params, "to");
    let semester = optional_str(params, "semester");

    let rows = grouping::fetch_session_rows(
        conn,
        &lecturer_id,
        from.as_deref(),
        to.as_deref(),
        semester.as_deref(),
    )
    .map_err(HandlerErr::query)?;
    let sessions = grouping::group_sessions(rows);
    Ok(json!({ "sessions": sessions }))
}

fn schedules_start(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let schedule_id = required_str(params, "scheduleId")?;
    let lecturer_id = required_str(params, "lecturerId")?;
    owned_schedule(conn, &schedule_id, &lecturer_id)?;
    status::start_session(conn, &schedule_id)
        .map_err(|e| HandlerErr::new(e.code, e.message))?;
    Ok(json!({ "scheduleId": schedule_id, "status": "teaching" }))
}

fn schedules_finish(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let schedule_id = required_str(params, "scheduleId")?;
    let lecturer_id = required_str(params, "lecturerId")?;
    owned_schedule(conn, &schedule_id, &lecturer_id)?;
    status::finish_session(conn, &schedule_id)
        .map_err(|e| HandlerErr::new(e.code, e.message))?;
    Ok(json!({ "scheduleId": schedule_id, "status": "done" }))
}

fn schedules_sweep_overdue(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (today, minutes) = day_and_minutes(as_of(params)?);
    let summary = status::sweep_overdue(conn, &today, minutes);
    serde_json::to_value(summary).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn schedules_close_day(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (today, minutes) = day_and_minutes(as_of(params)?);
    let summary = status::close_day(conn, &today, minutes);
    serde_json::to_value(summary).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

fn schedules_bulk_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let assignment_id = required_str(params, "assignmentId")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    // Dependency order; schema has no ON DELETE CASCADE.
    let steps: [(&str, &str); 4] = [
        (
            "attendance_records",
            "DELETE FROM attendance_records
             WHERE schedule_id IN (SELECT id FROM schedules WHERE assignment_id = ?)",
        ),
        (
            "makeup_requests",
            "DELETE FROM makeup_requests
             WHERE leave_request_id IN (
               SELECT lr.id FROM leave_requests lr
               JOIN schedules s ON s.id = lr.schedule_id
               WHERE s.assignment_id = ?
             )",
        ),
        (
            "leave_requests",
            "DELETE FROM leave_requests
             WHERE schedule_id IN (SELECT id FROM schedules WHERE assignment_id = ?)",
        ),
        ("schedules", "DELETE FROM schedules WHERE assignment_id = ?"),
    ];

    let mut deleted_rows = 0usize;
    for (table, sql) in steps {
        match tx.execute(sql, [&assignment_id]) {
            Ok(n) => {
                if table == "schedules" {
                    deleted_rows = n;
                }
            }
            Err(e) => {
                let _ = tx.rollback();
                return Err(HandlerErr {
                    code: "db_delete_failed",
                    message: e.to_string(),
                    details: Some(json!({ "table": table })),
                });
            }
        }
    }

    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "deletedSchedules": deleted_rows }))
}

fn with_conn(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedules.create" => Some(with_conn(state, req, schedules_create)),
        "schedules.list" => Some(with_conn(state, req, schedules_list)),
        "schedules.sessions" => Some(with_conn(state, req, schedules_sessions)),
        "schedules.start" => Some(with_conn(state, req, schedules_start)),
        "schedules.finish" => Some(with_conn(state, req, schedules_finish)),
        "schedules.sweepOverdue" => Some(with_conn(state, req, schedules_sweep_overdue)),
        "schedules.closeDay" => Some(with_conn(state, req, schedules_close_day)),
        "schedules.bulkDelete" => Some(with_conn(state, req, schedules_bulk_delete)),
        _ => None,
    }
}
