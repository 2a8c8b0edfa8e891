use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::notify;
use chrono::Local;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use super::schedules::{
    is_constraint_violation, optional_str, owned_schedule, required_str, HandlerErr,
};

const PENDING: &str = "pending";
const APPROVED: &str = "approved";
const REJECTED: &str = "rejected";
const CANCELED: &str = "canceled";

fn now_stamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

struct LeaveRow {
    lecturer_id: String,
    status: String,
}

fn leave_row(conn: &Connection, leave_request_id: &str) -> Result<LeaveRow, HandlerErr> {
    conn.query_row(
        "SELECT lecturer_id, status FROM leave_requests WHERE id = ?",
        [leave_request_id],
        |r| {
            Ok(LeaveRow {
                lecturer_id: r.get(0)?,
                status: r.get(1)?,
            })
        },
    )
    .optional()
    .map_err(HandlerErr::query)?
    .ok_or_else(|| HandlerErr::new("not_found", "leave request not found"))
}

fn owned_pending(
    conn: &Connection,
    leave_request_id: &str,
    lecturer_id: &str,
) -> Result<(), HandlerErr> {
    let row = leave_row(conn, leave_request_id)?;
    if row.lecturer_id != lecturer_id {
        return Err(HandlerErr::new("not_found", "leave request not found"));
    }
    if row.status != PENDING {
        return Err(HandlerErr::new(
            "conflict",
            format!("leave request already {}", row.status),
        ));
    }
    Ok(())
}

fn leave_submit(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let lecturer_id = required_str(params, "lecturerId")?;
    let schedule_id = required_str(params, "scheduleId")?;
    let reason = required_str(params, "reason")?;
    let proof_url = optional_str(params, "proofUrl");

    owned_schedule(conn, &schedule_id, &lecturer_id)?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM leave_requests WHERE schedule_id = ? AND lecturer_id = ?",
            (&schedule_id, &lecturer_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    if existing.is_some() {
        return Err(HandlerErr::new(
            "conflict",
            "a leave request for this session already exists",
        ));
    }

    // Only sessions beyond the current day are eligible; a session later
    // today is already too close to excuse.
    let session_date: String = conn
        .query_row(
            "SELECT session_date FROM schedules WHERE id = ?",
            [&schedule_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::query)?;
    let today = Local::now().format("%Y-%m-%d").to_string();
    if session_date <= today {
        return Err(HandlerErr::new(
            "validation_failed",
            "leave can only be requested for sessions after today",
        ));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO leave_requests(id, schedule_id, lecturer_id, reason, proof_url, status, requested_at)
         VALUES(?, ?, ?, ?, ?, 'pending', ?)",
        (&id, &schedule_id, &lecturer_id, &reason, &proof_url, now_stamp()),
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            HandlerErr::new("conflict", "a leave request for this session already exists")
        } else {
            HandlerErr::new("db_insert_failed", e.to_string())
        }
    })?;

    notify::notify_lecturer(
        conn,
        &lecturer_id,
        "Đã gửi đơn xin nghỉ",
        &format!("Đơn xin nghỉ buổi ngày {} đang chờ duyệt.", session_date),
    );

    Ok(json!({ "leaveRequestId": id, "status": PENDING }))
}

fn leave_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let leave_request_id = required_str(params, "leaveRequestId")?;
    let lecturer_id = required_str(params, "lecturerId")?;
    owned_pending(conn, &leave_request_id, &lecturer_id)?;

    let reason = optional_str(params, "reason");
    let proof_url = optional_str(params, "proofUrl");
    if reason.is_none() && proof_url.is_none() {
        return Err(HandlerErr::new("bad_params", "nothing to update"));
    }

    if let Some(reason) = reason {
        conn.execute(
            "UPDATE leave_requests SET reason = ? WHERE id = ?",
            (&reason, &leave_request_id),
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    if let Some(proof_url) = proof_url {
        conn.execute(
            "UPDATE leave_requests SET proof_url = ? WHERE id = ?",
            (&proof_url, &leave_request_id),
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }

    Ok(json!({ "leaveRequestId": leave_request_id }))
}

fn leave_cancel(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let leave_request_id = required_str(params, "leaveRequestId")?;
    let lecturer_id = required_str(params, "lecturerId")?;
    owned_pending(conn, &leave_request_id, &lecturer_id)?;

    conn.execute(
        "UPDATE leave_requests SET status = 'canceled' WHERE id = ?",
        [&leave_request_id],
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    Ok(json!({ "leaveRequestId": leave_request_id, "status": CANCELED }))
}

fn leave_decide(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let leave_request_id = required_str(params, "leaveRequestId")?;
    let outcome = required_str(params, "outcome")?;
    let decider_id = required_str(params, "deciderId")?;
    if outcome != APPROVED && outcome != REJECTED {
        return Err(HandlerErr::new(
            "bad_params",
            "outcome must be approved or rejected",
        ));
    }

    let row = leave_row(conn, &leave_request_id)?;
    if row.status != PENDING {
        return Err(HandlerErr::new(
            "conflict",
            format!("leave request already {}", row.status),
        ));
    }

    conn.execute(
        "UPDATE leave_requests SET status = ?, decided_at = ?, decided_by = ? WHERE id = ?",
        (&outcome, now_stamp(), &decider_id, &leave_request_id),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    let title = if outcome == APPROVED {
        "Đơn xin nghỉ được duyệt"
    } else {
        "Đơn xin nghỉ bị từ chối"
    };
    notify::notify_lecturer(conn, &row.lecturer_id, title, "");

    Ok(json!({ "leaveRequestId": leave_request_id, "status": outcome }))
}

fn leave_list_mine(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let lecturer_id = required_str(params, "lecturerId")?;
    let status = optional_str(params, "status");

    let mut sql = String::from(
        "SELECT id, schedule_id, reason, proof_url, status, requested_at, decided_at, decided_by
         FROM leave_requests
         WHERE lecturer_id = ?",
    );
    let mut binds: Vec<Value> = vec![Value::from(lecturer_id)];
    if let Some(status) = status {
        sql.push_str(" AND status = ?");
        binds.push(Value::from(status));
    }
    sql.push_str(" ORDER BY requested_at DESC, rowid DESC");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let requests = stmt
        .query_map(params_from_iter(binds), |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "scheduleId": row.get::<_, String>(1)?,
                "reason": row.get::<_, String>(2)?,
                "proofUrl": row.get::<_, Option<String>>(3)?,
                "status": row.get::<_, String>(4)?,
                "requestedAt": row.get::<_, String>(5)?,
                "decidedAt": row.get::<_, Option<String>>(6)?,
                "decidedBy": row.get::<_, Option<String>>(7)?,
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
        "leave.submit" => Some(with_conn(state, req, leave_submit)),
        "leave.update" => Some(with_conn(state, req, leave_update)),
        "leave.cancel" => Some(with_conn(state, req, leave_cancel)),
        "leave.decide" => Some(with_conn(state, req, leave_decide)),
        "leave.listMine" => Some(with_conn(state, req, leave_list_mine)),
        _ => None,
    }
}
