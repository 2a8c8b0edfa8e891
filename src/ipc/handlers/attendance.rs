use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use super::schedules::{required_str, HandlerErr};

fn schedule_exists(conn: &Connection, schedule_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row(
        "SELECT 1 FROM schedules WHERE id = ? LIMIT 1",
        [schedule_id],
        |_r| Ok(()),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::query)
}

fn attendance_record(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let schedule_id = required_str(params, "scheduleId")?;
    let student_code = required_str(params, "studentCode")?;
    let present = params
        .get("present")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    if !schedule_exists(conn, &schedule_id)? {
        return Err(HandlerErr::new("not_found", "schedule not found"));
    }

    let recorded_at = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    conn.execute(
        "INSERT INTO attendance_records(id, schedule_id, student_code, present, recorded_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(schedule_id, student_code) DO UPDATE SET
           present = excluded.present,
           recorded_at = excluded.recorded_at",
        (
            Uuid::new_v4().to_string(),
            &schedule_id,
            &student_code,
            present as i64,
            &recorded_at,
        ),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    Ok(json!({ "scheduleId": schedule_id, "studentCode": student_code, "present": present }))
}

fn attendance_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let schedule_id = required_str(params, "scheduleId")?;
    if !schedule_exists(conn, &schedule_id)? {
        return Err(HandlerErr::new("not_found", "schedule not found"));
    }

    let mut stmt = conn
        .prepare(
            "SELECT student_code, present, recorded_at
             FROM attendance_records
             WHERE schedule_id = ?
             ORDER BY student_code",
        )
        .map_err(HandlerErr::query)?;
    let records = stmt
        .query_map([&schedule_id], |row| {
            Ok(json!({
                "studentCode": row.get::<_, String>(0)?,
                "present": row.get::<_, i64>(1)? != 0,
                "recordedAt": row.get::<_, Option<String>>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    Ok(json!({ "records": records }))
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
        "attendance.record" => Some(with_conn(state, req, attendance_record)),
        "attendance.list" => Some(with_conn(state, req, attendance_list)),
        _ => None,
    }
}
