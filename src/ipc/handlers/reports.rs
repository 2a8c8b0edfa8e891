use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::report;
use serde_json::json;

use super::schedules::{optional_str, required_str, HandlerErr};

fn teaching_progress(
    conn: &rusqlite::Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let lecturer_id = required_str(params, "lecturerId")?;
    let semester = optional_str(params, "semester");
    let from = optional_str(params, "from");
    let to = optional_str(params, "to");

    let subjects = report::teaching_progress(
        conn,
        &lecturer_id,
        semester.as_deref(),
        from.as_deref(),
        to.as_deref(),
    )
    .map_err(HandlerErr::query)?;
    Ok(json!({ "subjects": subjects }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    if req.method != "reports.teachingProgress" {
        return None;
    }
    let Some(conn) = state.db.as_ref() else {
        return Some(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    Some(match teaching_progress(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
