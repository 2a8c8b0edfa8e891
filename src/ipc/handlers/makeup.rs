use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::notify;
use crate::status::ScheduleStatus;
use chrono::Local;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use super::schedules::{insert_schedule_row, optional_str, required_str, HandlerErr};

const PENDING: &str = "pending";
const APPROVED: &str = "approved";
const REJECTED: &str = "rejected";

struct MakeupRow {
    lecturer_id: String,
    leave_schedule_id: String,
    suggested_date: String,
    timeslot_id: String,
    room_id: Option<String>,
    note: Option<String>,
    status: String,
}

fn makeup_row(conn: &Connection, makeup_request_id: &str) -> Result<MakeupRow, HandlerErr> {
    conn.query_row(
        "SELECT lr.lecturer_id, lr.schedule_id, m.suggested_date, m.timeslot_id,
                m.room_id, m.note, m.status
         FROM makeup_requests m
         JOIN leave_requests lr ON lr.id = m.leave_request_id
         WHERE m.id = ?",
        [makeup_request_id],
        |r| {
            Ok(MakeupRow {
                lecturer_id: r.get(0)?,
                leave_schedule_id: r.get(1)?,
                suggested_date: r.get(2)?,
                timeslot_id: r.get(3)?,
                room_id: r.get(4)?,
                note: r.get(5)?,
                status: r.get(6)?,
            })
        },
    )
    .optional()
    .map_err(HandlerErr::query)?
    .ok_or_else(|| HandlerErr::new("not_found", "makeup request not found"))
}

fn owned_pending(
    conn: &Connection,
    makeup_request_id: &str,
    lecturer_id: &str,
) -> Result<MakeupRow, HandlerErr> {
    let row = makeup_row(conn, makeup_request_id)?;
    if row.lecturer_id != lecturer_id {
        return Err(HandlerErr::new("not_found", "makeup request not found"));
    }
    if row.status != PENDING {
        return Err(HandlerErr::new(
            "conflict",
            format!("makeup request already {}", row.status),
        ));
    }
    Ok(row)
}

fn makeup_propose(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let leave_request_id = required_str(params, "leaveRequestId")?;
    let lecturer_id = required_str(params, "lecturerId")?;
    let suggested_date = required_str(params, "suggestedDate")?;
    let timeslot_id = required_str(params, "timeslotId")?;
    let room_id = optional_str(params, "roomId");
    let note = optional_str(params, "note");

    let owner: Option<String> = conn
        .query_row(
            "SELECT lecturer_id FROM leave_requests WHERE id = ?",
            [&leave_request_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let Some(owner) = owner else {
        return Err(HandlerErr::new("not_found", "leave request not found"));
    };
    if owner != lecturer_id {
        return Err(HandlerErr::new(
            "forbidden",
            "leave request belongs to another lecturer",
        ));
    }
    // No gate on the leave decision here: a proposal may be filed while
    // the leave request is still pending. The decision step settles both.

    let slot: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM timeslots WHERE id = ? LIMIT 1",
            [&timeslot_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    if slot.is_none() {
        return Err(HandlerErr::new("not_found", "timeslot not found"));
    }

    let id = Uuid::new_v4().to_string();
    let requested_at = Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    conn.execute(
        "INSERT INTO makeup_requests(id, leave_request_id, suggested_date, timeslot_id, room_id, note, status, requested_at)
         VALUES(?, ?, ?, ?, ?, ?, 'pending', ?)",
        (
            &id,
            &leave_request_id,
            &suggested_date,
            &timeslot_id,
            &room_id,
            &note,
            &requested_at,
        ),
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;

    Ok(json!({ "makeupRequestId": id, "status": PENDING }))
}

fn makeup_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let makeup_request_id = required_str(params, "makeupRequestId")?;
    let lecturer_id = required_str(params, "lecturerId")?;
    owned_pending(conn, &makeup_request_id, &lecturer_id)?;

    let mut changed = false;
    for (key, column) in [
        ("suggestedDate", "suggested_date"),
        ("timeslotId", "timeslot_id"),
        ("roomId", "room_id"),
        ("note", "note"),
    ] {
        if let Some(value) = optional_str(params, key) {
            let sql = format!("UPDATE makeup_requests SET {} = ? WHERE id = ?", column);
            conn.execute(&sql, (&value, &makeup_request_id))
                .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
            changed = true;
        }
    }
    if !changed {
        return Err(HandlerErr::new("bad_params", "nothing to update"));
    }

    Ok(json!({ "makeupRequestId": makeup_request_id }))
}

fn makeup_cancel(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let makeup_request_id = required_str(params, "makeupRequestId")?;
    let lecturer_id = required_str(params, "lecturerId")?;
    owned_pending(conn, &makeup_request_id, &lecturer_id)?;

    // Makeup requests have no withdrawn state; a canceled proposal is
    // simply removed.
    conn.execute(
        "DELETE FROM makeup_requests WHERE id = ?",
        [&makeup_request_id],
    )
    .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;

    Ok(json!({ "makeupRequestId": makeup_request_id, "deleted": true }))
}

fn makeup_decide(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let makeup_request_id = required_str(params, "makeupRequestId")?;
    let outcome = required_str(params, "outcome")?;
    let decider_id = required_str(params, "deciderId")?;
    if outcome != APPROVED && outcome != REJECTED {
        return Err(HandlerErr::new(
            "bad_params",
            "outcome must be approved or rejected",
        ));
    }

    let row = makeup_row(conn, &makeup_request_id)?;
    if row.status != PENDING {
        return Err(HandlerErr::new(
            "conflict",
            format!("makeup request already {}", row.status),
        ));
    }

    let mut makeup_schedule_id = None;
    if outcome == APPROVED {
        let assignment_id: String = conn
            .query_row(
                "SELECT assignment_id FROM schedules WHERE id = ?",
                [&row.leave_schedule_id],
                |r| r.get(0),
            )
            .map_err(HandlerErr::query)?;
        // Materialize the replacement row first; an occupied slot leaves
        // the request pending so a new date can be proposed.
        let new_id = insert_schedule_row(
            conn,
            &assignment_id,
            &row.suggested_date,
            &row.timeslot_id,
            row.room_id.as_deref(),
            row.note.as_deref(),
            ScheduleStatus::MakeupPlanned,
            Some(&row.leave_schedule_id),
        )?;
        makeup_schedule_id = Some(new_id);
    }

    let decided_at = Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    conn.execute(
        "UPDATE makeup_requests SET status = ?, decided_at = ?, decided_by = ? WHERE id = ?",
        (&outcome, &decided_at, &decider_id, &makeup_request_id),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    let title = if outcome == APPROVED {
        "Lịch dạy bù được duyệt"
    } else {
        "Đề xuất dạy bù bị từ chối"
    };
    notify::notify_lecturer(conn, &row.lecturer_id, title, "");

    Ok(json!({
        "makeupRequestId": makeup_request_id,
        "status": outcome,
        "makeupScheduleId": makeup_schedule_id,
    }))
}

fn makeup_list_mine(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let lecturer_id = required_str(params, "lecturerId")?;
    let status = optional_str(params, "status");

    let mut sql = String::from(
        "SELECT m.id, m.leave_request_id, m.suggested_date, m.timeslot_id, m.room_id,
                m.note, m.status, m.requested_at, m.decided_at, m.decided_by
         FROM makeup_requests m
         JOIN leave_requests lr ON lr.id = m.leave_request_id
         WHERE lr.lecturer_id = ?",
    );
    let mut binds: Vec<Value> = vec![Value::from(lecturer_id)];
    if let Some(status) = status {
        sql.push_str(" AND m.status = ?");
        binds.push(Value::from(status));
    }
    sql.push_str(" ORDER BY m.requested_at DESC, m.rowid DESC");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let requests = stmt
        .query_map(params_from_iter(binds), |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "leaveRequestId": row.get::<_, String>(1)?,
                "suggestedDate": row.get::<_, String>(2)?,
                "timeslotId": row.get::<_, String>(3)?,
                "roomId": row.get::<_, Option<String>>(4)?,
                "note": row.get::<_, Option<String>>(5)?,
                "status": row.get::<_, String>(6)?,
                "requestedAt": row.get::<_, String>(7)?,
                "decidedAt": row.get::<_, Option<String>>(8)?,
                "decidedBy": row.get::<_, Option<String>>(9)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    Ok(json!({ "requests": requests }))
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
        "makeup.propose" => Some(with_conn(state, req, makeup_propose)),
        "makeup.update" => Some(with_conn(state, req, makeup_update)),
        "makeup.cancel" => Some(with_conn(state, req, makeup_cancel)),
        "makeup.decide" => Some(with_conn(state, req, makeup_decide)),
        "makeup.listMine" => Some(with_conn(state, req, makeup_list_mine)),
        _ => None,
    }
}
